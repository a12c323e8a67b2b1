//! Local mutations.
//!
//! Every change a user makes is expressed as a [`Mutation`] and applied by
//! [`RecordStore::apply`](crate::RecordStore::apply). Mutations are plain
//! data so they can cross a channel into the sync agent, or arrive as JSON
//! from an embedding front end.

use crate::{Category, Record, RecordId};
use serde::{Deserialize, Serialize};

/// A change requested by the local user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Mutation {
    /// Insert or replace a well-formed record (CSV import, edit forms).
    Upsert { record: Record },
    /// Delete one record, tombstoning it.
    Delete { category: Category, id: RecordId },
    /// Delete every record in a category.
    ClearCategory {
        category: Category,
        #[serde(default)]
        confirmed: bool,
    },

    // Attendance and staff
    AddAttendance {
        employee_name: String,
        /// `YYYY-MM-DDTHH:MM`
        date: String,
    },
    AddEmployee {
        name: String,
        join_date: String,
    },
    RenameEmployee {
        id: RecordId,
        name: String,
    },
    DeactivateEmployee {
        id: RecordId,
    },
    RestoreEmployee {
        id: RecordId,
    },

    // Sales and money
    SetDailyMenuConfig {
        date: String,
        items: Vec<String>,
        price: i64,
    },
    RecordDailySale {
        date: String,
        quantity: i64,
    },
    RecordCourseSale {
        date: String,
        course_id: RecordId,
        quantity: i64,
    },
    RecordRevenue {
        date: String,
        kind: String,
        description: String,
        amount: i64,
    },
    RecordExpense {
        date: String,
        category: String,
        description: String,
        amount: i64,
    },

    // Vault
    VaultDeposit {
        date: String,
        amount: i64,
        description: String,
    },
    VaultWithdrawal {
        date: String,
        amount: i64,
        description: String,
    },
    DepositPendingSavings,
    ClearPendingSavings,
    /// Move the vault balance to `target` with one correcting transaction.
    ///
    /// The correction is dated with the full ISO timestamp, unlike savings
    /// deposits which carry the calendar day, so adjustments stay
    /// distinguishable in the ledger.
    AdjustVaultBalance {
        target: i64,
    },
    ResetVault {
        #[serde(default)]
        confirmed: bool,
    },

    // Material catalog
    SetMaterialPrice {
        name: String,
        price: i64,
    },
    RemoveMaterial {
        name: String,
    },

    // Maintenance. Removed records are tombstoned like any delete.
    /// Delete records repeating an earlier one; every swept category when
    /// `category` is absent.
    RemoveDuplicates {
        #[serde(default)]
        category: Option<Category>,
    },
    /// Delete other-revenue entries whose amount is not positive.
    RemoveZeroAmountRevenue,
    /// Delete every record, zero pending savings and drop the material catalog.
    DeleteAllData {
        #[serde(default)]
        confirmed: bool,
    },
}

impl Mutation {
    /// Short name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Mutation::Upsert { .. } => "upsert",
            Mutation::Delete { .. } => "delete",
            Mutation::ClearCategory { .. } => "clear_category",
            Mutation::AddAttendance { .. } => "add_attendance",
            Mutation::AddEmployee { .. } => "add_employee",
            Mutation::RenameEmployee { .. } => "rename_employee",
            Mutation::DeactivateEmployee { .. } => "deactivate_employee",
            Mutation::RestoreEmployee { .. } => "restore_employee",
            Mutation::SetDailyMenuConfig { .. } => "set_daily_menu_config",
            Mutation::RecordDailySale { .. } => "record_daily_sale",
            Mutation::RecordCourseSale { .. } => "record_course_sale",
            Mutation::RecordRevenue { .. } => "record_revenue",
            Mutation::RecordExpense { .. } => "record_expense",
            Mutation::VaultDeposit { .. } => "vault_deposit",
            Mutation::VaultWithdrawal { .. } => "vault_withdrawal",
            Mutation::DepositPendingSavings => "deposit_pending_savings",
            Mutation::ClearPendingSavings => "clear_pending_savings",
            Mutation::AdjustVaultBalance { .. } => "adjust_vault_balance",
            Mutation::ResetVault { .. } => "reset_vault",
            Mutation::SetMaterialPrice { .. } => "set_material_price",
            Mutation::RemoveMaterial { .. } => "remove_material",
            Mutation::RemoveDuplicates { .. } => "remove_duplicates",
            Mutation::RemoveZeroAmountRevenue => "remove_zero_amount_revenue",
            Mutation::DeleteAllData { .. } => "delete_all_data",
        }
    }

    /// Whether the mutation destroys data in bulk.
    pub fn is_destructive(&self) -> bool {
        matches!(
            self,
            Mutation::ClearCategory { .. }
                | Mutation::ResetVault { .. }
                | Mutation::DeleteAllData { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn mutation_wire_format() {
        let mutation = Mutation::Delete {
            category: Category::Expenses,
            id: RecordId::Int(7),
        };
        let value = serde_json::to_value(&mutation).unwrap();
        assert_eq!(value, json!({"type": "delete", "category": "expenses", "id": 7}));

        let parsed: Mutation = serde_json::from_value(value).unwrap();
        assert_eq!(parsed, mutation);
    }

    #[test]
    fn unit_variants_parse() {
        let parsed: Mutation =
            serde_json::from_value(json!({"type": "deposit_pending_savings"})).unwrap();
        assert_eq!(parsed, Mutation::DepositPendingSavings);
    }

    #[test]
    fn confirmation_defaults_to_false() {
        let parsed: Mutation =
            serde_json::from_value(json!({"type": "reset_vault"})).unwrap();
        assert_eq!(parsed, Mutation::ResetVault { confirmed: false });
        assert!(parsed.is_destructive());
        assert_eq!(parsed.name(), "reset_vault");
    }

    #[test]
    fn maintenance_variants_parse() {
        let parsed: Mutation =
            serde_json::from_value(json!({"type": "remove_duplicates"})).unwrap();
        assert_eq!(parsed, Mutation::RemoveDuplicates { category: None });

        let parsed: Mutation = serde_json::from_value(
            json!({"type": "remove_duplicates", "category": "attendance"}),
        )
        .unwrap();
        assert_eq!(
            parsed,
            Mutation::RemoveDuplicates {
                category: Some(Category::Attendance)
            }
        );
        assert!(!parsed.is_destructive());

        let parsed: Mutation =
            serde_json::from_value(json!({"type": "delete_all_data", "confirmed": true})).unwrap();
        assert!(parsed.is_destructive());
        assert_eq!(parsed.name(), "delete_all_data");
    }
}
