//! Record categories (named collections).

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A named collection of records inside a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Category {
    Attendance,
    DailyMenu,
    DailyMenuConfigs,
    RegularMenu,
    OtherRevenue,
    Expenses,
    VaultTransactions,
    Products,
    Courses,
    Employees,
}

impl Category {
    /// Every category, in snapshot field order.
    pub const ALL: [Category; 10] = [
        Category::Attendance,
        Category::DailyMenu,
        Category::DailyMenuConfigs,
        Category::RegularMenu,
        Category::OtherRevenue,
        Category::Expenses,
        Category::VaultTransactions,
        Category::Products,
        Category::Courses,
        Category::Employees,
    ];

    /// Wire name of the category (snapshot key).
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Attendance => "attendance",
            Category::DailyMenu => "dailyMenu",
            Category::DailyMenuConfigs => "dailyMenuConfigs",
            Category::RegularMenu => "regularMenu",
            Category::OtherRevenue => "otherRevenue",
            Category::Expenses => "expenses",
            Category::VaultTransactions => "vaultTransactions",
            Category::Products => "products",
            Category::Courses => "courses",
            Category::Employees => "employees",
        }
    }

    /// Whether records of this category count as sales revenue.
    pub fn is_revenue(&self) -> bool {
        matches!(
            self,
            Category::DailyMenu | Category::RegularMenu | Category::OtherRevenue
        )
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = Error;

    fn from_str(name: &str) -> Result<Self> {
        Category::ALL
            .into_iter()
            .find(|category| category.as_str() == name)
            .ok_or_else(|| Error::UnknownCategory(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_round_trips_every_name() {
        for category in Category::ALL {
            assert_eq!(category.as_str().parse::<Category>().unwrap(), category);
        }
    }

    #[test]
    fn unknown_name_is_rejected() {
        let err = "drinks".parse::<Category>().unwrap_err();
        assert_eq!(err, Error::UnknownCategory("drinks".into()));

        // The material catalog is a keyed map, not a record collection.
        assert!("materialHistory".parse::<Category>().is_err());
    }

    #[test]
    fn serde_uses_wire_names() {
        let json = serde_json::to_string(&Category::VaultTransactions).unwrap();
        assert_eq!(json, r#""vaultTransactions""#);
    }
}
