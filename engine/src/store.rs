//! RecordStore - the single mutable owner of all records.
//!
//! Local mutations go through [`RecordStore::apply`]; merged remote state is
//! installed wholesale with [`RecordStore::replace`]. Nothing else writes to
//! the collections.

use crate::{
    clock::{calendar_day, iso_timestamp},
    error::Result,
    record::{
        Attendance, DailySale, DailyMenuConfig, Employee, Expense, RegularSale, Revenue, VaultKind,
        VaultTransaction,
    },
    snapshot::{with_collection, with_collection_mut},
    summary, Amount, Category, Entity, Error, Millis, Mutation, Record, RecordId, Snapshot,
    Tombstone,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Description written on vault deposits made from pending savings.
pub const SAVINGS_DEPOSIT_DESCRIPTION: &str = "Automatic savings from sales (50%)";

/// Result of a delete.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteOutcome {
    /// Whether the record was present before the delete.
    pub removed: bool,
    /// Vault transactions removed along with a deleted expense.
    pub cascaded: Vec<RecordId>,
}

/// Result of applying a mutation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Applied {
    /// Whether state changed (no-ops are not persisted or pushed).
    pub changed: bool,
    /// Id of the record the mutation created, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created: Option<RecordId>,
}

impl Applied {
    fn unchanged() -> Self {
        Self::default()
    }

    fn changed() -> Self {
        Self {
            changed: true,
            created: None,
        }
    }

    fn created(id: RecordId) -> Self {
        Self {
            changed: true,
            created: Some(id),
        }
    }
}

/// In-memory store of every collection plus tombstones.
#[derive(Debug, Clone, Default)]
pub struct RecordStore {
    state: Snapshot,
    last_id: i64,
}

impl RecordStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store holding `snapshot`.
    pub fn from_snapshot(snapshot: Snapshot) -> Self {
        let last_id = max_int_id(&snapshot);
        Self {
            state: snapshot,
            last_id,
        }
    }

    /// Immutable copy of the current state.
    pub fn snapshot(&self) -> Snapshot {
        self.state.clone()
    }

    /// Borrow the current state.
    pub fn state(&self) -> &Snapshot {
        &self.state
    }

    /// Install a reconciled snapshot wholesale.
    pub fn replace(&mut self, snapshot: Snapshot) {
        self.last_id = self.last_id.max(max_int_id(&snapshot));
        self.state = snapshot;
    }

    /// Hard-overwrite the state from a backup. Not a merge.
    pub fn restore(&mut self, snapshot: Snapshot) {
        tracing::info!(records = snapshot.record_count(), "restoring from backup");
        self.last_id = self.last_id.max(max_int_id(&snapshot));
        self.state = snapshot;
    }

    pub fn get(&self, category: Category, id: RecordId) -> Option<Record> {
        self.state.get(category, id)
    }

    pub fn len(&self, category: Category) -> usize {
        self.state.len(category)
    }

    /// Allocate a fresh record id: `max(now, last + 1)`.
    ///
    /// `last` starts at the largest integer id already held, so ids never
    /// collide with records loaded from storage or merged from a peer.
    pub fn next_id(&mut self, now: Millis) -> RecordId {
        let candidate = (now as i64).max(self.last_id.saturating_add(1));
        self.last_id = candidate;
        RecordId::Int(candidate)
    }

    /// Insert a record, or replace the one with the same id.
    ///
    /// Returns `true` when the record was inserted.
    pub fn upsert(&mut self, record: Record) -> bool {
        let state = &mut self.state;
        match record {
            Record::Attendance(r) => upsert_into(&mut state.attendance, r),
            Record::DailySale(r) => upsert_into(&mut state.daily_menu, r),
            Record::DailyMenuConfig(r) => upsert_into(&mut state.daily_menu_configs, r),
            Record::RegularSale(r) => upsert_into(&mut state.regular_menu, r),
            Record::Revenue(r) => upsert_into(&mut state.other_revenue, r),
            Record::Expense(r) => upsert_into(&mut state.expenses, r),
            Record::VaultTransaction(r) => upsert_into(&mut state.vault_transactions, r),
            Record::Product(r) => upsert_into(&mut state.products, r),
            Record::Course(r) => upsert_into(&mut state.courses, r),
            Record::Employee(r) => upsert_into(&mut state.employees, r),
        }
    }

    /// Remove a record and tombstone its id.
    ///
    /// The tombstone is written whether or not the record exists. Deleting
    /// an expense also removes and tombstones every vault transaction linked
    /// to it.
    pub fn delete(&mut self, category: Category, id: RecordId, deleted_at: &str) -> DeleteOutcome {
        let removed = with_collection_mut!(self.state, category, |list| remove_by_id(list, id));
        self.state
            .add_tombstone(category, Tombstone::new(id, deleted_at));

        let mut cascaded = Vec::new();
        if category == Category::Expenses {
            self.state.vault_transactions.retain(|tx| {
                if tx.linked_expense_id == Some(id) {
                    cascaded.push(tx.id);
                    false
                } else {
                    true
                }
            });
            for linked in &cascaded {
                self.state.add_tombstone(
                    Category::VaultTransactions,
                    Tombstone::new(*linked, deleted_at),
                );
            }
        }

        tracing::debug!(%category, %id, removed, cascaded = cascaded.len(), "deleted record");
        DeleteOutcome { removed, cascaded }
    }

    /// [`delete`](Self::delete) addressed by category name.
    pub fn delete_by_name(
        &mut self,
        category: &str,
        id: RecordId,
        deleted_at: &str,
    ) -> Result<DeleteOutcome> {
        let category = category.parse::<Category>()?;
        Ok(self.delete(category, id, deleted_at))
    }

    /// Apply a local mutation at time `now`.
    ///
    /// Validation failures are returned before any state changes.
    pub fn apply(&mut self, mutation: Mutation, now: Millis) -> Result<Applied> {
        let stamp = iso_timestamp(now);
        match mutation {
            Mutation::Upsert { record } => {
                let id = record.id();
                let inserted = self.upsert(record);
                Ok(if inserted {
                    Applied::created(id)
                } else {
                    Applied::changed()
                })
            }
            Mutation::Delete { category, id } => {
                self.delete(category, id, &stamp);
                Ok(Applied::changed())
            }
            Mutation::ClearCategory {
                category,
                confirmed,
            } => {
                if !confirmed {
                    return Err(Error::ConfirmationRequired(format!("clear {category}")));
                }
                let ids = self.state.ids(category);
                for id in ids {
                    self.delete(category, id, &stamp);
                }
                Ok(Applied::changed())
            }

            Mutation::AddAttendance {
                employee_name,
                date,
            } => {
                let employee_name = required("employeeName", employee_name)?;
                let day = calendar_day(&date).to_string();
                if self
                    .state
                    .attendance
                    .iter()
                    .any(|a| a.employee_name == employee_name && calendar_day(&a.date) == day)
                {
                    return Err(Error::DuplicateAttendanceConflict {
                        employee: employee_name,
                        day,
                    });
                }
                let id = self.next_id(now);
                self.state.attendance.push(Attendance {
                    id,
                    employee_name,
                    date,
                    timestamp: Some(stamp),
                    extra: Map::new(),
                });
                Ok(Applied::created(id))
            }
            Mutation::AddEmployee { name, join_date } => {
                let name = required("name", name)?;
                if self.active_employee_named(&name, None) {
                    return Err(Error::DuplicateEmployee(name));
                }
                let id = self.next_id(now);
                self.state.employees.push(Employee {
                    id,
                    name,
                    join_date,
                    active: true,
                    timestamp: Some(stamp),
                    extra: Map::new(),
                });
                Ok(Applied::created(id))
            }
            Mutation::RenameEmployee { id, name } => {
                let name = required("name", name)?;
                if self.active_employee_named(&name, Some(id)) {
                    return Err(Error::DuplicateEmployee(name));
                }
                let employee = self.employee_mut(id)?;
                employee.name = name;
                employee.touch(stamp);
                Ok(Applied::changed())
            }
            Mutation::DeactivateEmployee { id } => {
                let employee = self.employee_mut(id)?;
                employee.active = false;
                employee.touch(stamp);
                Ok(Applied::changed())
            }
            Mutation::RestoreEmployee { id } => {
                let employee = self.employee_mut(id)?;
                employee.active = true;
                employee.touch(stamp);
                Ok(Applied::changed())
            }

            Mutation::SetDailyMenuConfig { date, items, price } => {
                if price < 0 {
                    return Err(Error::InvalidAmount(price));
                }
                let replaced: Vec<RecordId> = self
                    .state
                    .daily_menu_configs
                    .iter()
                    .filter(|c| c.date == date)
                    .map(|c| c.id)
                    .collect();
                for old in replaced {
                    self.delete(Category::DailyMenuConfigs, old, &stamp);
                }
                let id = self.next_id(now);
                self.state.daily_menu_configs.push(DailyMenuConfig {
                    id,
                    date,
                    items,
                    price: Amount::from(price),
                    timestamp: Some(stamp),
                    extra: Map::new(),
                });
                Ok(Applied::created(id))
            }
            Mutation::RecordDailySale { date, quantity } => {
                positive(quantity)?;
                let config = self
                    .state
                    .daily_menu_configs
                    .iter()
                    .find(|c| c.date == date)
                    .cloned()
                    .ok_or_else(|| Error::MissingMenuConfig(date.clone()))?;
                let total = line_total(quantity, config.price)?;
                let pending = self.accrue_savings(total)?;
                let id = self.next_id(now);
                self.state.daily_menu.push(DailySale {
                    id,
                    date,
                    menu_items: config.items,
                    quantity: Amount::from(quantity),
                    price: config.price,
                    total,
                    amount: None,
                    timestamp: Some(stamp),
                    extra: Map::new(),
                });
                self.state.pending_savings = Some(pending);
                Ok(Applied::created(id))
            }
            Mutation::RecordCourseSale {
                date,
                course_id,
                quantity,
            } => {
                positive(quantity)?;
                let course = self
                    .state
                    .courses
                    .iter()
                    .find(|c| c.id == course_id)
                    .cloned()
                    .ok_or_else(|| Error::RecordNotFound {
                        category: Category::Courses.to_string(),
                        id: course_id,
                    })?;
                let menu_items = if !course.selected_products.is_empty() {
                    course.selected_products.iter().map(|p| p.name.clone()).collect()
                } else if !course.description.is_empty() {
                    vec![course.description.clone()]
                } else {
                    vec![course.name.clone()]
                };
                let total = line_total(quantity, course.price)?;
                let pending = self.accrue_savings(total)?;
                let id = self.next_id(now);
                self.state.regular_menu.push(RegularSale {
                    id,
                    date,
                    quantity: Amount::from(quantity),
                    menu_type: Some(format!("course-{course_id}")),
                    menu_name: Some(course.name),
                    menu_items,
                    price: course.price,
                    total,
                    amount: None,
                    course_id: Some(course_id),
                    timestamp: Some(stamp),
                    extra: Map::new(),
                });
                self.state.pending_savings = Some(pending);
                Ok(Applied::created(id))
            }
            Mutation::RecordRevenue {
                date,
                kind,
                description,
                amount,
            } => {
                positive(amount)?;
                let pending = self.accrue_savings(Amount::from(amount))?;
                let id = self.next_id(now);
                self.state.other_revenue.push(Revenue {
                    id,
                    date,
                    kind,
                    description,
                    amount: Amount::from(amount),
                    timestamp: Some(stamp),
                    extra: Map::new(),
                });
                self.state.pending_savings = Some(pending);
                Ok(Applied::created(id))
            }
            Mutation::RecordExpense {
                date,
                category,
                description,
                amount,
            } => {
                positive(amount)?;
                let id = self.next_id(now);
                // The linked withdrawal takes the next id.
                let withdrawal_id = self.next_id(now);
                self.state.vault_transactions.push(VaultTransaction {
                    id: withdrawal_id,
                    date: date.clone(),
                    kind: VaultKind::Withdrawal,
                    amount: Amount::from(amount),
                    description: format!("Expense: {category} - {description}"),
                    linked_expense_id: Some(id),
                    timestamp: Some(stamp.clone()),
                    extra: Map::new(),
                });
                self.state.expenses.push(Expense {
                    id,
                    date,
                    category,
                    description,
                    amount: Amount::from(amount),
                    timestamp: Some(stamp),
                    extra: Map::new(),
                });
                Ok(Applied::created(id))
            }

            Mutation::VaultDeposit {
                date,
                amount,
                description,
            } => {
                positive(amount)?;
                Ok(self.push_vault(now, date, VaultKind::Deposit, amount, description))
            }
            Mutation::VaultWithdrawal {
                date,
                amount,
                description,
            } => {
                positive(amount)?;
                Ok(self.push_vault(now, date, VaultKind::Withdrawal, amount, description))
            }
            Mutation::DepositPendingSavings => {
                let pending = self.state.pending_savings();
                if pending == 0 {
                    return Ok(Applied::unchanged());
                }
                let date = calendar_day(&stamp).to_string();
                let applied = self.push_vault(
                    now,
                    date,
                    VaultKind::Deposit,
                    pending,
                    SAVINGS_DEPOSIT_DESCRIPTION.to_string(),
                );
                self.state.pending_savings = Some(Amount::from(0));
                Ok(applied)
            }
            Mutation::ClearPendingSavings => {
                if self.state.pending_savings() == 0 {
                    return Ok(Applied::unchanged());
                }
                self.state.pending_savings = Some(Amount::from(0));
                Ok(Applied::changed())
            }
            Mutation::AdjustVaultBalance { target } => {
                if target < 0 {
                    return Err(Error::InvalidAmount(target));
                }
                let current = summary::vault_balance(&self.state);
                let adjustment = target
                    .checked_sub(current)
                    .ok_or(Error::InvalidAmount(target))?;
                let applied = if adjustment == 0 {
                    Applied::changed()
                } else {
                    let kind = if adjustment > 0 {
                        VaultKind::Deposit
                    } else {
                        VaultKind::Withdrawal
                    };
                    self.push_vault(
                        now,
                        stamp.clone(),
                        kind,
                        adjustment.abs(),
                        format!("Balance adjustment ({current} -> {target})"),
                    )
                };
                self.state.pending_savings = Some(Amount::from(0));
                Ok(applied)
            }
            Mutation::ResetVault { confirmed } => {
                if !confirmed {
                    return Err(Error::ConfirmationRequired("reset vault".to_string()));
                }
                for id in self.state.ids(Category::VaultTransactions) {
                    self.delete(Category::VaultTransactions, id, &stamp);
                }
                self.state.pending_savings = Some(Amount::from(0));
                Ok(Applied::changed())
            }

            Mutation::SetMaterialPrice { name, price } => {
                let name = required("name", name)?;
                if price < 0 {
                    return Err(Error::InvalidAmount(price));
                }
                match &mut self.state.material_history {
                    Some(Value::Object(map)) => {
                        map.insert(name, json!(price));
                    }
                    Some(Value::Array(log)) => log.push(json!({
                        "id": now,
                        "name": name,
                        "price": price,
                        "action": "add",
                        "timestamp": stamp,
                    })),
                    history => {
                        *history = Some(Value::Object(Map::from_iter([(name, json!(price))])));
                    }
                }
                Ok(Applied::changed())
            }
            Mutation::RemoveMaterial { name } => {
                if !self.state.material_prices().contains_key(&name) {
                    return Ok(Applied::unchanged());
                }
                match &mut self.state.material_history {
                    Some(Value::Object(map)) => {
                        map.remove(&name);
                    }
                    Some(Value::Array(log)) => log.push(json!({
                        "id": now,
                        "name": name,
                        "action": "delete",
                        "timestamp": stamp,
                    })),
                    _ => {}
                }
                Ok(Applied::changed())
            }

            Mutation::RemoveDuplicates { category } => {
                let categories = match category {
                    Some(category) => vec![category],
                    None => DEDUPLICATED.to_vec(),
                };
                let mut removed = 0usize;
                for category in categories {
                    for id in duplicate_ids(&self.state, category) {
                        self.delete(category, id, &stamp);
                        removed += 1;
                    }
                }
                tracing::info!(removed, "removed duplicate records");
                Ok(if removed > 0 {
                    Applied::changed()
                } else {
                    Applied::unchanged()
                })
            }
            Mutation::RemoveZeroAmountRevenue => {
                let zero: Vec<RecordId> = self
                    .state
                    .other_revenue
                    .iter()
                    .filter(|r| r.amount.value() <= 0.0)
                    .map(|r| r.id)
                    .collect();
                if zero.is_empty() {
                    return Ok(Applied::unchanged());
                }
                for id in zero {
                    self.delete(Category::OtherRevenue, id, &stamp);
                }
                Ok(Applied::changed())
            }
            Mutation::DeleteAllData { confirmed } => {
                if !confirmed {
                    return Err(Error::ConfirmationRequired("delete all data".to_string()));
                }
                for category in Category::ALL {
                    for id in self.state.ids(category) {
                        self.delete(category, id, &stamp);
                    }
                }
                self.state.pending_savings = Some(Amount::from(0));
                self.state.material_history = None;
                tracing::warn!("deleted all records");
                Ok(Applied::changed())
            }
        }
    }

    /// Pending savings after accruing half of `total`, rounded down.
    ///
    /// Computed without touching state so a failing mutation changes nothing.
    fn accrue_savings(&self, total: Amount) -> Result<Amount> {
        let savings = (total.value() * 0.5).floor();
        if savings.abs() >= i64::MAX as f64 {
            return Err(Error::InvalidAmount(total.whole()));
        }
        let savings = savings as i64;
        let pending = self.state.pending_savings.unwrap_or_default().value();
        let whole = (pending.trunc() as i64)
            .checked_add(savings)
            .ok_or(Error::InvalidAmount(savings))?;
        Ok(Amount::new(whole as f64 + pending.fract()))
    }

    fn push_vault(
        &mut self,
        now: Millis,
        date: String,
        kind: VaultKind,
        amount: i64,
        description: String,
    ) -> Applied {
        let id = self.next_id(now);
        self.state.vault_transactions.push(VaultTransaction {
            id,
            date,
            kind,
            amount: Amount::from(amount),
            description,
            linked_expense_id: None,
            timestamp: Some(iso_timestamp(now)),
            extra: Map::new(),
        });
        Applied::created(id)
    }

    fn active_employee_named(&self, name: &str, except: Option<RecordId>) -> bool {
        self.state
            .employees
            .iter()
            .any(|e| e.active && e.name == name && Some(e.id) != except)
    }

    fn employee_mut(&mut self, id: RecordId) -> Result<&mut Employee> {
        self.state
            .employees
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or_else(|| Error::RecordNotFound {
                category: Category::Employees.to_string(),
                id,
            })
    }

    /// Whether a category currently holds `id`.
    pub fn contains(&self, category: Category, id: RecordId) -> bool {
        with_collection!(self.state, category, |list| list.iter().any(|r| r.id() == id))
    }
}

fn upsert_into<T: Entity>(list: &mut Vec<T>, record: T) -> bool {
    match list.iter_mut().find(|r| r.id() == record.id()) {
        Some(existing) => {
            *existing = record;
            false
        }
        None => {
            list.push(record);
            true
        }
    }
}

fn remove_by_id<T: Entity>(list: &mut Vec<T>, id: RecordId) -> bool {
    let before = list.len();
    list.retain(|r| r.id() != id);
    list.len() != before
}

fn required(field: &str, value: String) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(Error::MissingField(field.to_string()));
    }
    Ok(trimmed.to_string())
}

/// `quantity * price`, rejecting totals that overflow.
fn line_total(quantity: i64, price: Amount) -> Result<Amount> {
    let price = price.value();
    let total = if price.fract() == 0.0 && price.abs() < i64::MAX as f64 {
        quantity.checked_mul(price as i64).map(Amount::from)
    } else {
        Some(Amount::new(price * quantity as f64)).filter(|t| !t.is_missing())
    };
    total.ok_or(Error::InvalidAmount(quantity))
}

/// Largest integer id across every collection.
fn max_int_id(snapshot: &Snapshot) -> i64 {
    Category::ALL
        .into_iter()
        .flat_map(|category| snapshot.ids(category))
        .filter_map(|id| id.as_i64())
        .max()
        .unwrap_or(0)
}

/// Categories swept by a duplicate removal that names no category.
const DEDUPLICATED: [Category; 6] = [
    Category::Attendance,
    Category::DailyMenu,
    Category::RegularMenu,
    Category::OtherRevenue,
    Category::Expenses,
    Category::VaultTransactions,
];

/// Ids of records that repeat an earlier record of the same category.
///
/// The first occurrence is kept. Categories without a duplicate rule never
/// report anything.
fn duplicate_ids(snapshot: &Snapshot, category: Category) -> Vec<RecordId> {
    match category {
        Category::Attendance => later_repeats(&snapshot.attendance, |a, b| {
            a.employee_name == b.employee_name && calendar_day(&a.date) == calendar_day(&b.date)
        }),
        Category::DailyMenu => later_repeats(&snapshot.daily_menu, |a, b| {
            a.date == b.date
                && (same_nonzero(a.total, b.total) || (a.price == b.price && a.quantity == b.quantity))
        }),
        Category::RegularMenu => later_repeats(&snapshot.regular_menu, |a, b| {
            a.date == b.date
                && (same_nonzero(a.total, b.total)
                    || (a.price == b.price && a.quantity == b.quantity)
                    || (a.menu_type.is_some()
                        && a.menu_type == b.menu_type
                        && a.menu_name == b.menu_name))
        }),
        Category::OtherRevenue => later_repeats(&snapshot.other_revenue, |a, b| {
            a.date == b.date
                && a.amount == b.amount
                && (a.description == b.description || a.kind == b.kind)
        }),
        Category::Expenses => later_repeats(&snapshot.expenses, |a, b| {
            a.date == b.date
                && a.amount == b.amount
                && (a.description == b.description || a.category == b.category)
        }),
        Category::VaultTransactions => later_repeats(&snapshot.vault_transactions, |a, b| {
            a.date == b.date && a.amount == b.amount && a.kind == b.kind
        }),
        _ => Vec::new(),
    }
}

fn later_repeats<T: Entity>(list: &[T], same: impl Fn(&T, &T) -> bool) -> Vec<RecordId> {
    let mut kept: Vec<&T> = Vec::new();
    let mut repeats = Vec::new();
    for record in list {
        if !kept.iter().any(|k| same(k, record)) {
            kept.push(record);
        } else if kept.iter().all(|k| k.id() != record.id()) {
            // A repeat sharing a kept id cannot be deleted alone.
            repeats.push(record.id());
        }
    }
    repeats
}

fn same_nonzero(a: Amount, b: Amount) -> bool {
    a.nonzero().is_some() && a == b
}

fn positive(amount: i64) -> Result<()> {
    if amount <= 0 {
        return Err(Error::InvalidAmount(amount));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Course;

    const NOW: Millis = 1_704_100_000_000;

    fn store() -> RecordStore {
        RecordStore::new()
    }

    fn expense(store: &mut RecordStore, amount: i64) -> RecordId {
        store
            .apply(
                Mutation::RecordExpense {
                    date: "2024-01-01".into(),
                    category: "supplies".into(),
                    description: "ice".into(),
                    amount,
                },
                NOW,
            )
            .unwrap()
            .created
            .unwrap()
    }

    #[test]
    fn next_id_continues_after_loaded_ids() {
        let future = NOW as i64 + 1_000;
        let snapshot = Snapshot::from_value(serde_json::json!({
            "expenses": [{"id": 3}, {"id": future}],
            "products": [{"id": 1.5}]
        }))
        .unwrap();

        let mut store = RecordStore::from_snapshot(snapshot.clone());
        assert_eq!(store.next_id(NOW), RecordId::Int(future + 1));

        let mut merged = RecordStore::new();
        merged.replace(snapshot.clone());
        assert_eq!(merged.next_id(NOW), RecordId::Int(future + 1));

        let mut restored = RecordStore::new();
        restored.restore(snapshot);
        assert_eq!(restored.next_id(NOW), RecordId::Int(future + 1));
    }

    #[test]
    fn next_id_is_monotonic_within_a_millisecond() {
        let mut store = store();
        let a = store.next_id(NOW);
        let b = store.next_id(NOW);
        let c = store.next_id(NOW - 10);
        assert_eq!(a, RecordId::Int(NOW as i64));
        assert_eq!(b, RecordId::Int(NOW as i64 + 1));
        assert_eq!(c, RecordId::Int(NOW as i64 + 2));
    }

    #[test]
    fn upsert_inserts_then_replaces() {
        let mut store = store();
        let mut employee = Employee {
            id: RecordId::Int(1),
            name: "Aiko".into(),
            join_date: "2024-01-01".into(),
            active: true,
            timestamp: None,
            extra: Map::new(),
        };
        assert!(store.upsert(employee.clone().into()));
        employee.name = "Aiko M.".into();
        assert!(!store.upsert(employee.into()));

        assert_eq!(store.len(Category::Employees), 1);
        assert_eq!(store.state().employees[0].name, "Aiko M.");
    }

    #[test]
    fn delete_tombstones_even_when_absent() {
        let mut store = store();
        let outcome = store.delete(Category::Products, RecordId::Int(99), "t");
        assert!(!outcome.removed);
        assert!(store
            .state()
            .is_tombstoned(Category::Products, RecordId::Int(99)));

        // Idempotent: a second delete neither fails nor duplicates.
        store.delete(Category::Products, RecordId::Int(99), "t2");
        assert_eq!(store.state().tombstones(Category::Products).len(), 1);
    }

    #[test]
    fn delete_by_unknown_name_fails() {
        let mut store = store();
        let err = store
            .delete_by_name("drinks", RecordId::Int(1), "t")
            .unwrap_err();
        assert_eq!(err, Error::UnknownCategory("drinks".into()));
        assert!(store.state().deleted_records.is_empty());
    }

    #[test]
    fn expense_creates_linked_withdrawal() {
        let mut store = store();
        let id = expense(&mut store, 1200);

        let tx = &store.state().vault_transactions[0];
        assert_eq!(tx.id, id.successor());
        assert_eq!(tx.kind, VaultKind::Withdrawal);
        assert_eq!(tx.linked_expense_id, Some(id));
        assert_eq!(summary::vault_balance(store.state()), -1200);
    }

    #[test]
    fn deleting_expense_cascades_to_vault() {
        let mut store = store();
        let id = expense(&mut store, 1200);
        let linked = id.successor();

        let outcome = store.delete(Category::Expenses, id, "t");
        assert!(outcome.removed);
        assert_eq!(outcome.cascaded, vec![linked]);
        assert!(store.state().expenses.is_empty());
        assert!(store.state().vault_transactions.is_empty());
        assert!(store
            .state()
            .is_tombstoned(Category::VaultTransactions, linked));
    }

    #[test]
    fn duplicate_attendance_same_day_is_rejected() {
        let mut store = store();
        store
            .apply(
                Mutation::AddAttendance {
                    employee_name: "Aiko".into(),
                    date: "2024-01-01T09:00".into(),
                },
                NOW,
            )
            .unwrap();

        let before = store.snapshot();
        let err = store
            .apply(
                Mutation::AddAttendance {
                    employee_name: "Aiko".into(),
                    date: "2024-01-01T18:00".into(),
                },
                NOW + 1,
            )
            .unwrap_err();
        assert!(err.is_rejection());
        assert_eq!(store.snapshot(), before);

        // A different day is fine.
        store
            .apply(
                Mutation::AddAttendance {
                    employee_name: "Aiko".into(),
                    date: "2024-01-02T09:00".into(),
                },
                NOW + 2,
            )
            .unwrap();
        assert_eq!(store.len(Category::Attendance), 2);
    }

    #[test]
    fn sales_accrue_half_to_pending_savings() {
        let mut store = store();
        store
            .apply(
                Mutation::SetDailyMenuConfig {
                    date: "2024-01-01".into(),
                    items: vec!["curry".into()],
                    price: 1501,
                },
                NOW,
            )
            .unwrap();
        store
            .apply(
                Mutation::RecordDailySale {
                    date: "2024-01-01".into(),
                    quantity: 1,
                },
                NOW,
            )
            .unwrap();
        store
            .apply(
                Mutation::RecordRevenue {
                    date: "2024-01-01".into(),
                    kind: "tip".into(),
                    description: String::new(),
                    amount: 1000,
                },
                NOW,
            )
            .unwrap();

        assert_eq!(store.state().pending_savings(), 750 + 500);
        assert_eq!(store.state().daily_menu[0].menu_items, vec!["curry"]);
    }

    #[test]
    fn overflowing_sale_totals_are_rejected() {
        let mut store = store();
        store
            .apply(
                Mutation::SetDailyMenuConfig {
                    date: "2024-01-01".into(),
                    items: vec!["curry".into()],
                    price: i64::MAX / 2,
                },
                NOW,
            )
            .unwrap();
        store.upsert(Record::Course(Course {
            id: RecordId::Int(5),
            name: "Premium".into(),
            price: Amount::from(i64::MAX / 2),
            cost: Amount::from(0),
            description: String::new(),
            ingredients: String::new(),
            selected_products: Vec::new(),
            timestamp: None,
            extra: Map::new(),
        }));
        let before = store.snapshot();

        let err = store
            .apply(
                Mutation::RecordDailySale {
                    date: "2024-01-01".into(),
                    quantity: 3,
                },
                NOW,
            )
            .unwrap_err();
        assert_eq!(err, Error::InvalidAmount(3));

        let err = store
            .apply(
                Mutation::RecordCourseSale {
                    date: "2024-01-01".into(),
                    course_id: RecordId::Int(5),
                    quantity: 4,
                },
                NOW,
            )
            .unwrap_err();
        assert_eq!(err, Error::InvalidAmount(4));
        assert_eq!(store.snapshot(), before);
    }

    #[test]
    fn pending_savings_overflow_is_rejected() {
        let mut store = RecordStore::from_snapshot(Snapshot {
            pending_savings: Some(Amount::from(i64::MAX - 10)),
            ..Snapshot::default()
        });
        let before = store.snapshot();
        let err = store
            .apply(
                Mutation::RecordRevenue {
                    date: "2024-01-01".into(),
                    kind: "tip".into(),
                    description: String::new(),
                    amount: 1000,
                },
                NOW,
            )
            .unwrap_err();
        assert_eq!(err, Error::InvalidAmount(500));
        assert_eq!(store.snapshot(), before);
    }

    #[test]
    fn fractional_pending_savings_keep_their_fraction() {
        let mut store = RecordStore::from_snapshot(Snapshot {
            pending_savings: Some(Amount::from(250.5)),
            ..Snapshot::default()
        });
        store
            .apply(
                Mutation::RecordRevenue {
                    date: "2024-01-01".into(),
                    kind: "tip".into(),
                    description: String::new(),
                    amount: 101,
                },
                NOW,
            )
            .unwrap();
        assert_eq!(store.state().pending_savings, Some(Amount::from(300.5)));
    }

    #[test]
    fn daily_sale_without_config_is_rejected() {
        let mut store = store();
        let err = store
            .apply(
                Mutation::RecordDailySale {
                    date: "2024-01-01".into(),
                    quantity: 1,
                },
                NOW,
            )
            .unwrap_err();
        assert_eq!(err, Error::MissingMenuConfig("2024-01-01".into()));
    }

    #[test]
    fn course_sale_uses_course_price() {
        let mut store = store();
        store.upsert(Record::Course(Course {
            id: RecordId::Int(5),
            name: "Premium".into(),
            price: Amount::from(30000),
            cost: Amount::from(0),
            description: String::new(),
            ingredients: String::new(),
            selected_products: Vec::new(),
            timestamp: None,
            extra: Map::new(),
        }));

        store
            .apply(
                Mutation::RecordCourseSale {
                    date: "2024-01-01".into(),
                    course_id: RecordId::Int(5),
                    quantity: 2,
                },
                NOW,
            )
            .unwrap();

        let sale = &store.state().regular_menu[0];
        assert_eq!(sale.total, 60000);
        assert_eq!(sale.menu_type.as_deref(), Some("course-5"));
        assert_eq!(sale.menu_items, vec!["Premium"]);
        assert_eq!(store.state().pending_savings(), 30000);
    }

    #[test]
    fn replacing_daily_config_tombstones_the_old_one() {
        let mut store = store();
        let first = store
            .apply(
                Mutation::SetDailyMenuConfig {
                    date: "2024-01-01".into(),
                    items: vec!["a".into()],
                    price: 1000,
                },
                NOW,
            )
            .unwrap()
            .created
            .unwrap();
        store
            .apply(
                Mutation::SetDailyMenuConfig {
                    date: "2024-01-01".into(),
                    items: vec!["b".into()],
                    price: 1200,
                },
                NOW + 5,
            )
            .unwrap();

        assert_eq!(store.len(Category::DailyMenuConfigs), 1);
        assert_eq!(store.state().daily_menu_configs[0].items, vec!["b"]);
        assert!(store
            .state()
            .is_tombstoned(Category::DailyMenuConfigs, first));
    }

    #[test]
    fn pending_savings_deposit_and_adjust() {
        let mut store = store();
        store.replace(Snapshot {
            pending_savings: Some(Amount::from(800)),
            ..Snapshot::default()
        });

        let applied = store.apply(Mutation::DepositPendingSavings, NOW).unwrap();
        assert!(applied.changed);
        assert_eq!(store.state().pending_savings, Some(Amount::from(0)));
        assert_eq!(summary::vault_balance(store.state()), 800);
        assert_eq!(
            store.state().vault_transactions[0].date,
            "2024-01-01"
        );

        // Nothing pending: no-op.
        let applied = store.apply(Mutation::DepositPendingSavings, NOW).unwrap();
        assert!(!applied.changed);

        store
            .apply(Mutation::AdjustVaultBalance { target: 500 }, NOW + 1)
            .unwrap();
        assert_eq!(summary::vault_balance(store.state()), 500);
        let last = store.state().vault_transactions.last().unwrap();
        assert_eq!(last.kind, VaultKind::Withdrawal);
        assert_eq!(last.amount, 300);
        // Adjustments keep the full timestamp; savings deposits the day.
        assert_eq!(last.date, iso_timestamp(NOW + 1));
        assert_eq!(store.state().vault_transactions[0].date, calendar_day(&last.date));
    }

    #[test]
    fn adjust_rejects_an_unrepresentable_difference() {
        let mut store = RecordStore::from_snapshot(
            Snapshot::from_value(serde_json::json!({
                "vaultTransactions": [{"id": 1, "type": "withdrawal", "amount": 9.3e18}]
            }))
            .unwrap(),
        );
        let before = store.snapshot();
        let err = store
            .apply(Mutation::AdjustVaultBalance { target: 1_000_000 }, NOW)
            .unwrap_err();
        assert_eq!(err, Error::InvalidAmount(1_000_000));
        assert_eq!(store.snapshot(), before);
    }

    #[test]
    fn destructive_operations_require_confirmation() {
        let mut store = store();
        expense(&mut store, 100);

        let err = store
            .apply(Mutation::ResetVault { confirmed: false }, NOW)
            .unwrap_err();
        assert!(matches!(err, Error::ConfirmationRequired(_)));
        assert_eq!(store.len(Category::VaultTransactions), 1);

        let err = store
            .apply(
                Mutation::ClearCategory {
                    category: Category::Expenses,
                    confirmed: false,
                },
                NOW,
            )
            .unwrap_err();
        assert!(matches!(err, Error::ConfirmationRequired(_)));

        store
            .apply(Mutation::ResetVault { confirmed: true }, NOW)
            .unwrap();
        assert_eq!(store.len(Category::VaultTransactions), 0);
        assert_eq!(store.state().tombstones(Category::VaultTransactions).len(), 1);
    }

    #[test]
    fn clear_category_tombstones_every_id() {
        let mut store = store();
        let a = expense(&mut store, 100);
        let b = expense(&mut store, 200);

        store
            .apply(
                Mutation::ClearCategory {
                    category: Category::Expenses,
                    confirmed: true,
                },
                NOW,
            )
            .unwrap();

        assert!(store.state().expenses.is_empty());
        assert!(store.state().is_tombstoned(Category::Expenses, a));
        assert!(store.state().is_tombstoned(Category::Expenses, b));
        // Linked withdrawals follow their expenses.
        assert!(store.state().vault_transactions.is_empty());
    }

    #[test]
    fn employee_lifecycle() {
        let mut store = store();
        let id = store
            .apply(
                Mutation::AddEmployee {
                    name: " Aiko ".into(),
                    join_date: "2024-01-01".into(),
                },
                NOW,
            )
            .unwrap()
            .created
            .unwrap();
        assert_eq!(store.state().employees[0].name, "Aiko");

        let err = store
            .apply(
                Mutation::AddEmployee {
                    name: "Aiko".into(),
                    join_date: "2024-02-01".into(),
                },
                NOW,
            )
            .unwrap_err();
        assert_eq!(err, Error::DuplicateEmployee("Aiko".into()));

        store
            .apply(Mutation::DeactivateEmployee { id }, NOW + 1)
            .unwrap();
        assert!(!store.state().employees[0].active);

        // The name is free again once the holder is inactive.
        store
            .apply(
                Mutation::AddEmployee {
                    name: "Aiko".into(),
                    join_date: "2024-02-01".into(),
                },
                NOW + 2,
            )
            .unwrap();

        store.apply(Mutation::RestoreEmployee { id }, NOW + 3).unwrap();
        assert!(store.state().employees[0].active);
        assert_eq!(
            store.state().employees[0].timestamp.as_deref(),
            Some(iso_timestamp(NOW + 3).as_str())
        );

        let err = store
            .apply(
                Mutation::RenameEmployee {
                    id: RecordId::Int(1),
                    name: "Ken".into(),
                },
                NOW,
            )
            .unwrap_err();
        assert!(matches!(err, Error::RecordNotFound { .. }));
    }

    #[test]
    fn invalid_amounts_are_rejected() {
        let mut store = store();
        let err = store
            .apply(
                Mutation::VaultDeposit {
                    date: "2024-01-01".into(),
                    amount: 0,
                    description: String::new(),
                },
                NOW,
            )
            .unwrap_err();
        assert_eq!(err, Error::InvalidAmount(0));
        assert!(store.state().vault_transactions.is_empty());
    }

    #[test]
    fn material_catalog() {
        let mut store = store();
        store
            .apply(
                Mutation::SetMaterialPrice {
                    name: "lime".into(),
                    price: 120,
                },
                NOW,
            )
            .unwrap();
        assert_eq!(store.state().material_history.as_ref().unwrap()["lime"], 120);
        assert_eq!(store.state().material_prices()["lime"], 120.0);

        assert!(store
            .apply(Mutation::RemoveMaterial { name: "lime".into() }, NOW)
            .unwrap()
            .changed);
        assert!(!store
            .apply(Mutation::RemoveMaterial { name: "lime".into() }, NOW)
            .unwrap()
            .changed);
    }

    #[test]
    fn material_log_is_appended_to() {
        let mut store = RecordStore::from_snapshot(
            Snapshot::from_value(serde_json::json!({
                "materialHistory": [
                    {"id": 1, "name": "lime", "price": 120, "action": "add"}
                ]
            }))
            .unwrap(),
        );
        store
            .apply(
                Mutation::SetMaterialPrice {
                    name: "salt".into(),
                    price: 10,
                },
                NOW,
            )
            .unwrap();
        store
            .apply(Mutation::RemoveMaterial { name: "lime".into() }, NOW + 1)
            .unwrap();

        let log = store.state().material_history.as_ref().unwrap();
        assert_eq!(log.as_array().map(Vec::len), Some(3));
        assert_eq!(log[2]["action"], "delete");
        let prices = store.state().material_prices();
        assert_eq!(prices.len(), 1);
        assert_eq!(prices["salt"], 10.0);
    }

    #[test]
    fn duplicate_removal_keeps_first_and_tombstones_the_rest() {
        let mut store = RecordStore::from_snapshot(
            Snapshot::from_value(serde_json::json!({
                "attendance": [
                    {"id": 1, "employeeName": "Aiko", "date": "2024-01-01T09:00"},
                    {"id": 2, "employeeName": "Aiko", "date": "2024-01-01T18:00"},
                    {"id": 3, "employeeName": "Ken", "date": "2024-01-01T09:00"}
                ],
                "dailyMenu": [
                    {"id": 4, "date": "2024-01-01", "total": 1500, "price": 1500, "quantity": 1},
                    {"id": 5, "date": "2024-01-01", "total": 1500, "price": 1500, "quantity": 1},
                    {"id": 6, "date": "2024-01-01", "total": 3000, "price": 1500, "quantity": 2}
                ],
                "expenses": [
                    {"id": 7, "date": "2024-01-01", "category": "ice", "amount": 500},
                    {"id": 8, "date": "2024-01-01", "category": "ice", "amount": 500},
                    {"id": 9, "date": "2024-01-02", "category": "ice", "amount": 500}
                ],
                "vaultTransactions": [
                    {"id": 10, "date": "2024-01-01", "type": "deposit", "amount": 100},
                    {"id": 11, "date": "2024-01-01", "type": "withdrawal", "amount": 100}
                ]
            }))
            .unwrap(),
        );

        let applied = store
            .apply(Mutation::RemoveDuplicates { category: None }, NOW)
            .unwrap();
        assert!(applied.changed);
        assert_eq!(store.state().ids(Category::Attendance), vec![RecordId::Int(1), RecordId::Int(3)]);
        assert_eq!(store.state().ids(Category::DailyMenu), vec![RecordId::Int(4), RecordId::Int(6)]);
        assert_eq!(store.state().ids(Category::Expenses), vec![RecordId::Int(7), RecordId::Int(9)]);
        assert_eq!(store.len(Category::VaultTransactions), 2);
        for (category, id) in [
            (Category::Attendance, 2),
            (Category::DailyMenu, 5),
            (Category::Expenses, 8),
        ] {
            assert!(store.state().is_tombstoned(category, RecordId::Int(id)));
        }

        // A second sweep finds nothing.
        let applied = store
            .apply(Mutation::RemoveDuplicates { category: None }, NOW)
            .unwrap();
        assert!(!applied.changed);
    }

    #[test]
    fn duplicate_removal_can_target_one_category() {
        let mut store = RecordStore::from_snapshot(
            Snapshot::from_value(serde_json::json!({
                "attendance": [
                    {"id": 1, "employeeName": "Aiko", "date": "2024-01-01T09:00"},
                    {"id": 2, "employeeName": "Aiko", "date": "2024-01-01"}
                ],
                "otherRevenue": [
                    {"id": 3, "date": "2024-01-01", "type": "tip", "amount": 100},
                    {"id": 4, "date": "2024-01-01", "type": "tip", "amount": 100}
                ]
            }))
            .unwrap(),
        );
        store
            .apply(
                Mutation::RemoveDuplicates {
                    category: Some(Category::Attendance),
                },
                NOW,
            )
            .unwrap();
        assert_eq!(store.len(Category::Attendance), 1);
        assert_eq!(store.len(Category::OtherRevenue), 2);
    }

    #[test]
    fn zero_amount_revenue_is_removed() {
        let mut store = RecordStore::from_snapshot(
            Snapshot::from_value(serde_json::json!({
                "otherRevenue": [
                    {"id": 1, "amount": 0},
                    {"id": 2, "amount": 500},
                    {"id": 3, "amount": null},
                    {"id": 4, "amount": -20}
                ]
            }))
            .unwrap(),
        );
        assert!(store
            .apply(Mutation::RemoveZeroAmountRevenue, NOW)
            .unwrap()
            .changed);
        assert_eq!(store.state().ids(Category::OtherRevenue), vec![RecordId::Int(2)]);
        assert_eq!(store.state().tombstones(Category::OtherRevenue).len(), 3);
        assert!(!store
            .apply(Mutation::RemoveZeroAmountRevenue, NOW)
            .unwrap()
            .changed);
    }

    #[test]
    fn delete_all_data_tombstones_every_record() {
        let mut store = store();
        let id = expense(&mut store, 100);
        store
            .apply(
                Mutation::SetMaterialPrice {
                    name: "lime".into(),
                    price: 120,
                },
                NOW,
            )
            .unwrap();
        store
            .apply(
                Mutation::RecordRevenue {
                    date: "2024-01-01".into(),
                    kind: "tip".into(),
                    description: String::new(),
                    amount: 1000,
                },
                NOW,
            )
            .unwrap();

        let err = store
            .apply(Mutation::DeleteAllData { confirmed: false }, NOW)
            .unwrap_err();
        assert!(matches!(err, Error::ConfirmationRequired(_)));
        assert_eq!(store.state().record_count(), 3);

        store
            .apply(Mutation::DeleteAllData { confirmed: true }, NOW)
            .unwrap();
        assert_eq!(store.state().record_count(), 0);
        assert_eq!(store.state().pending_savings(), 0);
        assert!(store.state().material_history.is_none());
        assert!(store.state().is_tombstoned(Category::Expenses, id));
        assert!(store
            .state()
            .is_tombstoned(Category::VaultTransactions, id.successor()));
        assert_eq!(store.state().tombstones(Category::OtherRevenue).len(), 1);
    }

    #[test]
    fn restore_is_a_hard_overwrite() {
        let mut store = store();
        expense(&mut store, 100);
        store.restore(Snapshot::new());
        assert_eq!(store.snapshot(), Snapshot::new());
    }
}
