//! Typed business records.
//!
//! Every collection holds one record type. All record types share the
//! [`Entity`] surface (`id` + optional `timestamp`) that the merge engine
//! relies on; everything else is domain data the engine carries opaquely.
//! Unknown fields are kept in `extra` so a round-trip through an older or
//! newer peer never drops data.

use crate::{Amount, Category};
use serde::de::{self, DeserializeOwned};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Number, Value};
use std::fmt;
use std::hash::{Hash, Hasher};

/// Identity of a record within its category.
///
/// Ids are JSON numbers. Integral floats are normalized to `Int`, so `7` and
/// `7.0` name the same record.
#[derive(Debug, Clone, Copy)]
pub enum RecordId {
    Int(i64),
    Float(f64),
}

impl RecordId {
    /// The id one past this one (used for linked records).
    pub fn successor(&self) -> RecordId {
        match *self {
            RecordId::Int(n) => RecordId::Int(n.saturating_add(1)),
            RecordId::Float(f) => RecordId::from(f + 1.0),
        }
    }

    /// Integer value, if the id is integral.
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            RecordId::Int(n) => Some(n),
            RecordId::Float(_) => None,
        }
    }
}

impl From<i64> for RecordId {
    fn from(value: i64) -> Self {
        RecordId::Int(value)
    }
}

impl From<f64> for RecordId {
    fn from(value: f64) -> Self {
        if value.fract() == 0.0 && value >= i64::MIN as f64 && value <= i64::MAX as f64 {
            RecordId::Int(value as i64)
        } else {
            RecordId::Float(value)
        }
    }
}

impl TryFrom<&Number> for RecordId {
    type Error = String;

    fn try_from(number: &Number) -> Result<Self, Self::Error> {
        if let Some(n) = number.as_i64() {
            Ok(RecordId::Int(n))
        } else if let Some(f) = number.as_f64() {
            Ok(RecordId::from(f))
        } else {
            Err(format!("record id out of range: {number}"))
        }
    }
}

impl PartialEq for RecordId {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (RecordId::Int(a), RecordId::Int(b)) => a == b,
            (RecordId::Float(a), RecordId::Float(b)) => a.to_bits() == b.to_bits(),
            _ => false,
        }
    }
}

impl Eq for RecordId {}

impl Hash for RecordId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            RecordId::Int(n) => {
                0u8.hash(state);
                n.hash(state);
            }
            RecordId::Float(f) => {
                1u8.hash(state);
                f.to_bits().hash(state);
            }
        }
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordId::Int(n) => write!(f, "{n}"),
            RecordId::Float(x) => write!(f, "{x}"),
        }
    }
}

impl Serialize for RecordId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match *self {
            RecordId::Int(n) => serializer.serialize_i64(n),
            RecordId::Float(f) => serializer.serialize_f64(f),
        }
    }
}

impl<'de> Deserialize<'de> for RecordId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let number = Number::deserialize(deserializer)?;
        RecordId::try_from(&number).map_err(de::Error::custom)
    }
}

/// Deserialize `null` as the type's default.
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Common surface of every record type.
pub trait Entity: Clone + fmt::Debug + PartialEq + Serialize + DeserializeOwned {
    /// Category this record type lives in.
    const CATEGORY: Category;

    fn id(&self) -> RecordId;

    fn timestamp(&self) -> Option<&str>;

    /// Stamp the record as modified at `timestamp`.
    fn touch(&mut self, timestamp: String);

    fn into_record(self) -> Record;
}

macro_rules! impl_entity {
    ($ty:ident, $category:expr, $variant:ident) => {
        impl Entity for $ty {
            const CATEGORY: Category = $category;

            fn id(&self) -> RecordId {
                self.id
            }

            fn timestamp(&self) -> Option<&str> {
                self.timestamp.as_deref()
            }

            fn touch(&mut self, timestamp: String) {
                self.timestamp = Some(timestamp);
            }

            fn into_record(self) -> Record {
                Record::$variant(self)
            }
        }

        impl From<$ty> for Record {
            fn from(record: $ty) -> Self {
                Record::$variant(record)
            }
        }
    };
}

/// One employee clocking in on one day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attendance {
    pub id: RecordId,
    #[serde(default, deserialize_with = "null_as_default")]
    pub employee_name: String,
    /// Date-time of the shift start (`YYYY-MM-DDTHH:MM[:SS]`).
    #[serde(default, deserialize_with = "null_as_default")]
    pub date: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Sale of the daily rotating menu.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailySale {
    pub id: RecordId,
    #[serde(default, deserialize_with = "null_as_default")]
    pub date: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub menu_items: Vec<String>,
    #[serde(default)]
    pub quantity: Amount,
    #[serde(default)]
    pub price: Amount,
    #[serde(default)]
    pub total: Amount,
    /// Older imports carry the sale value here instead of `total`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<Amount>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl DailySale {
    /// Amount this sale contributes to income: `total`, else `amount`.
    pub fn income(&self) -> f64 {
        self.total
            .nonzero()
            .or_else(|| self.amount.and_then(Amount::nonzero))
            .unwrap_or(0.0)
    }
}

/// The daily menu offered on one date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyMenuConfig {
    pub id: RecordId,
    #[serde(default, deserialize_with = "null_as_default")]
    pub date: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub items: Vec<String>,
    #[serde(default)]
    pub price: Amount,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Sale of a fixed-price course.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegularSale {
    pub id: RecordId,
    #[serde(default, deserialize_with = "null_as_default")]
    pub date: String,
    #[serde(default)]
    pub quantity: Amount,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub menu_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub menu_name: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub menu_items: Vec<String>,
    #[serde(default)]
    pub price: Amount,
    #[serde(default)]
    pub total: Amount,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<Amount>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub course_id: Option<RecordId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl RegularSale {
    /// Amount this sale contributes to income: `total`, else `amount`,
    /// else `price * quantity` with an unset quantity counted as one.
    pub fn income(&self) -> f64 {
        let quantity = self.quantity.nonzero().unwrap_or(1.0);
        self.total
            .nonzero()
            .or_else(|| self.amount.and_then(Amount::nonzero))
            .or_else(|| self.price.get().map(|p| p * quantity))
            .unwrap_or(0.0)
    }
}

/// Revenue that is not a menu sale (tips, events, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Revenue {
    pub id: RecordId,
    #[serde(default, deserialize_with = "null_as_default")]
    pub date: String,
    #[serde(rename = "type", default, deserialize_with = "null_as_default")]
    pub kind: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub description: String,
    #[serde(default)]
    pub amount: Amount,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Money spent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Expense {
    pub id: RecordId,
    #[serde(default, deserialize_with = "null_as_default")]
    pub date: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub category: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub description: String,
    #[serde(default)]
    pub amount: Amount,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Direction of a vault transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VaultKind {
    #[default]
    Deposit,
    Withdrawal,
}

/// Cash moved into or out of the vault.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VaultTransaction {
    pub id: RecordId,
    #[serde(default, deserialize_with = "null_as_default")]
    pub date: String,
    #[serde(rename = "type", default, deserialize_with = "null_as_default")]
    pub kind: VaultKind,
    #[serde(default)]
    pub amount: Amount,
    #[serde(default, deserialize_with = "null_as_default")]
    pub description: String,
    /// Expense that produced this withdrawal, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linked_expense_id: Option<RecordId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl VaultTransaction {
    /// Signed effect on the vault balance.
    pub fn signed_amount(&self) -> f64 {
        match self.kind {
            VaultKind::Deposit => self.amount.value(),
            VaultKind::Withdrawal => -self.amount.value(),
        }
    }
}

/// A sellable product with its cost breakdown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: RecordId,
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub category: String,
    #[serde(default)]
    pub price: Amount,
    #[serde(default)]
    pub cost: Amount,
    #[serde(default, deserialize_with = "null_as_default")]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub materials: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub craft_yield: Option<Amount>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_material_cost: Option<Amount>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Product reference embedded in a course.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseProduct {
    pub id: RecordId,
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default)]
    pub cost: Amount,
    #[serde(default, deserialize_with = "null_as_default")]
    pub category: String,
}

/// A fixed-price course made of products.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Course {
    pub id: RecordId,
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default)]
    pub price: Amount,
    #[serde(default)]
    pub cost: Amount,
    #[serde(default, deserialize_with = "null_as_default")]
    pub description: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub ingredients: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub selected_products: Vec<CourseProduct>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_active() -> bool {
    true
}

fn null_as_active<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    Ok(Option::<bool>::deserialize(deserializer)?.unwrap_or(true))
}

/// A staff member. Deactivated rather than deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Employee {
    pub id: RecordId,
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub join_date: String,
    #[serde(default = "default_active", deserialize_with = "null_as_active")]
    pub active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl_entity!(Attendance, Category::Attendance, Attendance);
impl_entity!(DailySale, Category::DailyMenu, DailySale);
impl_entity!(DailyMenuConfig, Category::DailyMenuConfigs, DailyMenuConfig);
impl_entity!(RegularSale, Category::RegularMenu, RegularSale);
impl_entity!(Revenue, Category::OtherRevenue, Revenue);
impl_entity!(Expense, Category::Expenses, Expense);
impl_entity!(VaultTransaction, Category::VaultTransactions, VaultTransaction);
impl_entity!(Product, Category::Products, Product);
impl_entity!(Course, Category::Courses, Course);
impl_entity!(Employee, Category::Employees, Employee);

/// Any business record, tagged with its category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "category", content = "record")]
pub enum Record {
    #[serde(rename = "attendance")]
    Attendance(Attendance),
    #[serde(rename = "dailyMenu")]
    DailySale(DailySale),
    #[serde(rename = "dailyMenuConfigs")]
    DailyMenuConfig(DailyMenuConfig),
    #[serde(rename = "regularMenu")]
    RegularSale(RegularSale),
    #[serde(rename = "otherRevenue")]
    Revenue(Revenue),
    #[serde(rename = "expenses")]
    Expense(Expense),
    #[serde(rename = "vaultTransactions")]
    VaultTransaction(VaultTransaction),
    #[serde(rename = "products")]
    Product(Product),
    #[serde(rename = "courses")]
    Course(Course),
    #[serde(rename = "employees")]
    Employee(Employee),
}

impl Record {
    /// Category the record belongs to.
    pub fn category(&self) -> Category {
        match self {
            Record::Attendance(_) => Category::Attendance,
            Record::DailySale(_) => Category::DailyMenu,
            Record::DailyMenuConfig(_) => Category::DailyMenuConfigs,
            Record::RegularSale(_) => Category::RegularMenu,
            Record::Revenue(_) => Category::OtherRevenue,
            Record::Expense(_) => Category::Expenses,
            Record::VaultTransaction(_) => Category::VaultTransactions,
            Record::Product(_) => Category::Products,
            Record::Course(_) => Category::Courses,
            Record::Employee(_) => Category::Employees,
        }
    }

    pub fn id(&self) -> RecordId {
        match self {
            Record::Attendance(r) => r.id,
            Record::DailySale(r) => r.id,
            Record::DailyMenuConfig(r) => r.id,
            Record::RegularSale(r) => r.id,
            Record::Revenue(r) => r.id,
            Record::Expense(r) => r.id,
            Record::VaultTransaction(r) => r.id,
            Record::Product(r) => r.id,
            Record::Course(r) => r.id,
            Record::Employee(r) => r.id,
        }
    }

    pub fn timestamp(&self) -> Option<&str> {
        match self {
            Record::Attendance(r) => r.timestamp(),
            Record::DailySale(r) => r.timestamp(),
            Record::DailyMenuConfig(r) => r.timestamp(),
            Record::RegularSale(r) => r.timestamp(),
            Record::Revenue(r) => r.timestamp(),
            Record::Expense(r) => r.timestamp(),
            Record::VaultTransaction(r) => r.timestamp(),
            Record::Product(r) => r.timestamp(),
            Record::Course(r) => r.timestamp(),
            Record::Employee(r) => r.timestamp(),
        }
    }

    /// Amount this record adds to sales revenue, if it is a sale.
    pub fn revenue_amount(&self) -> Option<f64> {
        match self {
            Record::DailySale(r) => Some(r.income()),
            Record::RegularSale(r) => Some(r.income()),
            Record::Revenue(r) => Some(r.amount.value()),
            _ => None,
        }
    }
}
