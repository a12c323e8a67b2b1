//! Snapshot: the whole store as one serializable unit.
//!
//! A snapshot is what gets persisted locally, pushed to remotes and pulled
//! back. It is always transported whole, never as per-record deltas.
//!
//! Unknown top-level keys are preserved in [`Snapshot::extra`] so peers
//! running a newer build do not lose data when an older one writes back.

use crate::{
    clock::iso_timestamp,
    error::Result,
    record::{
        null_as_default, Attendance, Course, DailyMenuConfig, DailySale, Employee, Expense,
        Product, RegularSale, Revenue, VaultTransaction,
    },
    tombstone::{self, Tombstone},
    Amount, Category, Entity, Error, Millis, Record, RecordId,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};

/// Version label written into backup files.
pub const BACKUP_VERSION: &str = "emergency-backup";

/// Full state of every collection plus tombstones and scalar counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    #[serde(default, deserialize_with = "null_as_default")]
    pub attendance: Vec<Attendance>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub daily_menu: Vec<DailySale>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub daily_menu_configs: Vec<DailyMenuConfig>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub regular_menu: Vec<RegularSale>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub other_revenue: Vec<Revenue>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub expenses: Vec<Expense>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub vault_transactions: Vec<VaultTransaction>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub products: Vec<Product>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub courses: Vec<Course>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub employees: Vec<Employee>,
    /// Half of every sale, waiting to be deposited into the vault.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_savings: Option<Amount>,
    /// Material catalog. Usually an object of name to unit price; some
    /// writers keep an array log of `{name, price, action}` entries instead.
    /// Kept as written either way, see [`Snapshot::material_prices`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub material_history: Option<Value>,
    /// Tombstones keyed by category name.
    #[serde(default, deserialize_with = "null_as_default")]
    pub deleted_records: BTreeMap<String, Vec<Tombstone>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Run `$body` with `$list` bound to the collection for `$category`.
macro_rules! with_collection {
    ($snapshot:expr, $category:expr, |$list:ident| $body:expr) => {
        match $category {
            $crate::Category::Attendance => {
                let $list = &$snapshot.attendance;
                $body
            }
            $crate::Category::DailyMenu => {
                let $list = &$snapshot.daily_menu;
                $body
            }
            $crate::Category::DailyMenuConfigs => {
                let $list = &$snapshot.daily_menu_configs;
                $body
            }
            $crate::Category::RegularMenu => {
                let $list = &$snapshot.regular_menu;
                $body
            }
            $crate::Category::OtherRevenue => {
                let $list = &$snapshot.other_revenue;
                $body
            }
            $crate::Category::Expenses => {
                let $list = &$snapshot.expenses;
                $body
            }
            $crate::Category::VaultTransactions => {
                let $list = &$snapshot.vault_transactions;
                $body
            }
            $crate::Category::Products => {
                let $list = &$snapshot.products;
                $body
            }
            $crate::Category::Courses => {
                let $list = &$snapshot.courses;
                $body
            }
            $crate::Category::Employees => {
                let $list = &$snapshot.employees;
                $body
            }
        }
    };
}

/// Mutable counterpart of `with_collection!`.
macro_rules! with_collection_mut {
    ($snapshot:expr, $category:expr, |$list:ident| $body:expr) => {
        match $category {
            $crate::Category::Attendance => {
                let $list = &mut $snapshot.attendance;
                $body
            }
            $crate::Category::DailyMenu => {
                let $list = &mut $snapshot.daily_menu;
                $body
            }
            $crate::Category::DailyMenuConfigs => {
                let $list = &mut $snapshot.daily_menu_configs;
                $body
            }
            $crate::Category::RegularMenu => {
                let $list = &mut $snapshot.regular_menu;
                $body
            }
            $crate::Category::OtherRevenue => {
                let $list = &mut $snapshot.other_revenue;
                $body
            }
            $crate::Category::Expenses => {
                let $list = &mut $snapshot.expenses;
                $body
            }
            $crate::Category::VaultTransactions => {
                let $list = &mut $snapshot.vault_transactions;
                $body
            }
            $crate::Category::Products => {
                let $list = &mut $snapshot.products;
                $body
            }
            $crate::Category::Courses => {
                let $list = &mut $snapshot.courses;
                $body
            }
            $crate::Category::Employees => {
                let $list = &mut $snapshot.employees;
                $body
            }
        }
    };
}

pub(crate) use with_collection;
pub(crate) use with_collection_mut;

impl Snapshot {
    /// Create an empty snapshot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a snapshot from JSON text.
    pub fn from_json(json: &str) -> Result<Self> {
        let value: Value =
            serde_json::from_str(json).map_err(|e| Error::MalformedSnapshot(e.to_string()))?;
        Self::from_value(value)
    }

    /// Parse a snapshot from a JSON value.
    ///
    /// Anything but an object is rejected, as is any collection entry that
    /// lacks a numeric `id`.
    pub fn from_value(value: Value) -> Result<Self> {
        if !value.is_object() {
            return Err(Error::MalformedSnapshot(format!(
                "expected an object, found {}",
                json_kind(&value)
            )));
        }
        serde_json::from_value(value).map_err(|e| Error::MalformedSnapshot(e.to_string()))
    }

    /// Load saved state over `defaults`.
    ///
    /// Each top-level key present in `saved` replaces the default wholesale;
    /// nothing is merged below the top level.
    pub fn load_over(defaults: &Snapshot, saved: Value) -> Result<Self> {
        let Value::Object(saved) = saved else {
            return Err(Error::MalformedSnapshot(format!(
                "expected an object, found {}",
                json_kind(&saved)
            )));
        };
        let mut base = match defaults.to_value()? {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        for (key, value) in saved {
            base.insert(key, value);
        }
        Self::from_value(Value::Object(base))
    }

    pub fn to_value(&self) -> Result<Value> {
        serde_json::to_value(self).map_err(|e| Error::MalformedSnapshot(e.to_string()))
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| Error::MalformedSnapshot(e.to_string()))
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::MalformedSnapshot(e.to_string()))
    }

    /// Number of records in one category.
    pub fn len(&self, category: Category) -> usize {
        with_collection!(self, category, |list| list.len())
    }

    /// Total records across all categories.
    pub fn record_count(&self) -> usize {
        Category::ALL.iter().map(|c| self.len(*c)).sum()
    }

    /// Whether the snapshot holds no records, tombstones or counters.
    pub fn is_empty(&self) -> bool {
        self.record_count() == 0
            && self.deleted_records.values().all(Vec::is_empty)
            && self.pending_savings.is_none()
            && self.material_history.is_none()
            && self.extra.is_empty()
    }

    /// Ids of one category, in order.
    pub fn ids(&self, category: Category) -> Vec<RecordId> {
        with_collection!(self, category, |list| list.iter().map(Entity::id).collect())
    }

    pub fn contains(&self, category: Category, id: RecordId) -> bool {
        with_collection!(self, category, |list| list.iter().any(|r| r.id() == id))
    }

    /// Look up a record by category and id.
    pub fn get(&self, category: Category, id: RecordId) -> Option<Record> {
        with_collection!(self, category, |list| list
            .iter()
            .find(|r| r.id() == id)
            .cloned()
            .map(Entity::into_record))
    }

    /// All records of one category, in order.
    pub fn records(&self, category: Category) -> Vec<Record> {
        with_collection!(self, category, |list| list
            .iter()
            .cloned()
            .map(Entity::into_record)
            .collect())
    }

    /// Tombstones recorded for a category.
    pub fn tombstones(&self, category: Category) -> &[Tombstone] {
        self.deleted_records
            .get(category.as_str())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn is_tombstoned(&self, category: Category, id: RecordId) -> bool {
        self.tombstones(category).iter().any(|t| t.id == id)
    }

    /// Record a tombstone, ignoring ids that already have one.
    pub fn add_tombstone(&mut self, category: Category, tombstone: Tombstone) -> bool {
        let list = self
            .deleted_records
            .entry(category.as_str().to_string())
            .or_default();
        tombstone::push_unique(list, tombstone)
    }

    /// Whether both snapshots hold the same records, tombstoned ids and
    /// scalars, ignoring the order of collections and tombstone lists.
    pub fn same_content(&self, other: &Snapshot) -> bool {
        macro_rules! same {
            ($($field:ident),*) => { $(same_records(&self.$field, &other.$field))&&* };
        }
        same!(
            attendance,
            daily_menu,
            daily_menu_configs,
            regular_menu,
            other_revenue,
            expenses,
            vault_transactions,
            products,
            courses,
            employees
        ) && self.pending_savings == other.pending_savings
            && self.material_history == other.material_history
            && self.extra == other.extra
            && Category::ALL.iter().all(|category| {
                tombstone::id_set(self.tombstones(*category))
                    == tombstone::id_set(other.tombstones(*category))
            })
    }

    /// Current pending savings (absent counts as zero).
    pub fn pending_savings(&self) -> i64 {
        self.pending_savings.map_or(0, Amount::whole)
    }

    /// Current material prices, whichever shape `materialHistory` has.
    ///
    /// An array log is replayed in order: `delete` entries remove the name,
    /// any other action sets its price.
    pub fn material_prices(&self) -> BTreeMap<String, f64> {
        let mut prices = BTreeMap::new();
        match &self.material_history {
            Some(Value::Object(map)) => {
                for (name, price) in map {
                    prices.insert(name.clone(), lenient_number(price));
                }
            }
            Some(Value::Array(log)) => {
                for entry in log {
                    let Some(name) = entry.get("name").and_then(Value::as_str) else {
                        continue;
                    };
                    if entry.get("action").and_then(Value::as_str) == Some("delete") {
                        prices.remove(name);
                    } else {
                        let price = entry.get("price").map_or(0.0, lenient_number);
                        prices.insert(name.to_string(), price);
                    }
                }
            }
            _ => {}
        }
        prices
    }
}

/// An exported backup file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Backup {
    #[serde(default)]
    pub timestamp: String,
    #[serde(default)]
    pub version: String,
    pub data: Snapshot,
}

impl Backup {
    /// Wrap a snapshot taken at `now`.
    pub fn new(data: Snapshot, now: Millis) -> Self {
        Self {
            timestamp: iso_timestamp(now),
            version: BACKUP_VERSION.to_string(),
            data,
        }
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::MalformedSnapshot(e.to_string()))
    }

    /// Parse a backup file.
    ///
    /// A bare snapshot (no `data` wrapper) is accepted as well.
    pub fn from_json(json: &str) -> Result<Self> {
        let value: Value =
            serde_json::from_str(json).map_err(|e| Error::MalformedSnapshot(e.to_string()))?;
        let wrapped = matches!(&value, Value::Object(map) if map.contains_key("data"));
        if wrapped {
            serde_json::from_value(value).map_err(|e| Error::MalformedSnapshot(e.to_string()))
        } else {
            Ok(Self {
                timestamp: String::new(),
                version: String::new(),
                data: Snapshot::from_value(value)?,
            })
        }
    }
}

fn same_records<T: Entity + PartialEq>(a: &[T], b: &[T]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let by_id: HashMap<RecordId, &T> = b.iter().map(|r| (r.id(), r)).collect();
    by_id.len() == b.len() && a.iter().all(|r| by_id.get(&r.id()) == Some(&r))
}

fn lenient_number(value: &Value) -> f64 {
    serde_json::from_value::<Amount>(value.clone()).map_or(0.0, Amount::value)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
