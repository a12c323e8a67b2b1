//! Numeric domain fields as peers actually write them.
//!
//! Money, prices and quantities arrive from several writers. Some of them
//! write fractional values, some write `null` where a number failed to parse
//! (`NaN` serializes as `null`), and CSV imports can leave numeric strings.
//! [`Amount`] accepts all of these so one odd field never makes a whole
//! snapshot unreadable.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::fmt;

/// Largest magnitude written back as a JSON integer.
const MAX_EXACT: f64 = 9_007_199_254_740_992.0;

/// A lenient JSON number.
///
/// `null` and unparseable values are held as "missing" and written back as
/// `null`; arithmetic reads them as zero. Integral values are written back as
/// JSON integers, so `1200` stays `1200` and `1200.5` stays `1200.5`.
#[derive(Clone, Copy, Default)]
pub struct Amount(f64);

impl Amount {
    /// The missing value, written as `null`.
    pub const MISSING: Amount = Amount(f64::NAN);

    pub fn new(value: f64) -> Self {
        if value.is_finite() {
            Amount(value)
        } else {
            Self::MISSING
        }
    }

    /// The number, or `None` when missing.
    pub fn get(self) -> Option<f64> {
        (!self.0.is_nan()).then_some(self.0)
    }

    /// The number, missing counted as zero.
    pub fn value(self) -> f64 {
        self.get().unwrap_or(0.0)
    }

    /// Whole part, missing counted as zero.
    pub fn whole(self) -> i64 {
        // `as` saturates at the i64 bounds.
        self.value().trunc() as i64
    }

    /// The number when present and non-zero.
    pub fn nonzero(self) -> Option<f64> {
        self.get().filter(|v| *v != 0.0)
    }

    pub fn is_missing(self) -> bool {
        self.0.is_nan()
    }
}

impl From<i64> for Amount {
    fn from(value: i64) -> Self {
        Amount(value as f64)
    }
}

impl From<f64> for Amount {
    fn from(value: f64) -> Self {
        Amount::new(value)
    }
}

impl PartialEq for Amount {
    fn eq(&self, other: &Self) -> bool {
        match (self.get(), other.get()) {
            (Some(a), Some(b)) => a == b,
            (None, None) => true,
            _ => false,
        }
    }
}

impl PartialEq<i64> for Amount {
    fn eq(&self, other: &i64) -> bool {
        self.get() == Some(*other as f64)
    }
}

impl fmt::Debug for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.get() {
            Some(v) => write!(f, "{v}"),
            None => f.write_str("null"),
        }
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.get() {
            None => serializer.serialize_none(),
            Some(v) if v.fract() == 0.0 && v.abs() <= MAX_EXACT => serializer.serialize_i64(v as i64),
            Some(v) => serializer.serialize_f64(v),
        }
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match Value::deserialize(deserializer)? {
            Value::Number(n) => n.as_f64().map_or(Amount::MISSING, Amount::new),
            Value::String(s) => s
                .trim()
                .parse::<f64>()
                .map_or(Amount::MISSING, Amount::new),
            _ => Amount::MISSING,
        })
    }
}
