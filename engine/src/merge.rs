//! Reconciliation of a local and a remote snapshot.
//!
//! This is the heart of multi-writer sync. The merge is a pure function of
//! its two inputs: neither is mutated, and the same inputs always produce
//! the same output.
//!
//! # Algorithm
//!
//! For every category:
//!
//! 1. Union the tombstones of both sides, deduplicated by id.
//! 2. Drop every record whose id is tombstoned, whichever side it came from
//!    and however new its timestamp is.
//! 3. Keep one-sided records as they are.
//! 4. For ids on both sides keep the record with the later `timestamp`. A
//!    missing timestamp is older than any present one; when neither side
//!    has one (or they are equal) the local record is kept.
//! 5. Emit retained local ids in local order, then remote-only ids in
//!    remote order.
//!
//! Scalars (`pendingSavings`, `materialHistory`) and unknown top-level keys
//! take the remote value whenever the remote has one.

use crate::{clock::compare_timestamps, tombstone, Category, Entity, RecordId, Snapshot};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};

/// Counters describing what a merge did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeStats {
    /// Two-sided ids where the local record won.
    pub kept_local: usize,
    /// Two-sided ids where the remote record won.
    pub took_remote: usize,
    /// Remote-only ids admitted into the result.
    pub added_remote: usize,
    /// Records dropped because their id is tombstoned.
    pub suppressed: usize,
}

impl MergeStats {
    fn absorb(&mut self, other: MergeStats) {
        self.kept_local += other.kept_local;
        self.took_remote += other.took_remote;
        self.added_remote += other.added_remote;
        self.suppressed += other.suppressed;
    }

    /// Whether the remote contributed anything to the result.
    pub fn remote_changed_anything(&self) -> bool {
        self.took_remote > 0 || self.added_remote > 0 || self.suppressed > 0
    }
}

/// Merge `remote` into `local`, returning a new snapshot.
pub fn reconcile(local: &Snapshot, remote: &Snapshot) -> Snapshot {
    reconcile_with_stats(local, remote).0
}

/// Like [`reconcile`], also reporting per-merge counters.
pub fn reconcile_with_stats(local: &Snapshot, remote: &Snapshot) -> (Snapshot, MergeStats) {
    let deleted_records = union_tombstones(local, remote);
    let mut stats = MergeStats::default();

    let suppressed = |category: Category| -> HashSet<RecordId> {
        deleted_records
            .get(category.as_str())
            .map(|list| tombstone::id_set(list))
            .unwrap_or_default()
    };

    macro_rules! merge {
        ($field:ident, $category:expr) => {{
            let (merged, s) =
                merge_collection(&local.$field, &remote.$field, &suppressed($category));
            stats.absorb(s);
            merged
        }};
    }

    let mut extra = local.extra.clone();
    for (key, value) in &remote.extra {
        extra.insert(key.clone(), value.clone());
    }

    let merged = Snapshot {
        attendance: merge!(attendance, Category::Attendance),
        daily_menu: merge!(daily_menu, Category::DailyMenu),
        daily_menu_configs: merge!(daily_menu_configs, Category::DailyMenuConfigs),
        regular_menu: merge!(regular_menu, Category::RegularMenu),
        other_revenue: merge!(other_revenue, Category::OtherRevenue),
        expenses: merge!(expenses, Category::Expenses),
        vault_transactions: merge!(vault_transactions, Category::VaultTransactions),
        products: merge!(products, Category::Products),
        courses: merge!(courses, Category::Courses),
        employees: merge!(employees, Category::Employees),
        pending_savings: remote.pending_savings.or(local.pending_savings),
        material_history: remote
            .material_history
            .clone()
            .or_else(|| local.material_history.clone()),
        deleted_records,
        extra,
    };

    tracing::debug!(
        kept_local = stats.kept_local,
        took_remote = stats.took_remote,
        added_remote = stats.added_remote,
        suppressed = stats.suppressed,
        "reconciled snapshots"
    );

    (merged, stats)
}

fn union_tombstones(local: &Snapshot, remote: &Snapshot) -> BTreeMap<String, Vec<crate::Tombstone>> {
    let mut out = BTreeMap::new();
    let keys: Vec<&String> = local
        .deleted_records
        .keys()
        .chain(remote.deleted_records.keys())
        .collect();
    for key in keys {
        if out.contains_key(key.as_str()) {
            continue;
        }
        let empty = Vec::new();
        let l = local.deleted_records.get(key).unwrap_or(&empty);
        let r = remote.deleted_records.get(key).unwrap_or(&empty);
        out.insert(key.clone(), tombstone::union(l, r));
    }
    out
}

/// Merge one collection. Exposed for benchmarks and property tests.
pub fn merge_collection<T: Entity>(
    local: &[T],
    remote: &[T],
    tombstoned: &HashSet<RecordId>,
) -> (Vec<T>, MergeStats) {
    let mut stats = MergeStats::default();
    let mut remote_by_id: HashMap<RecordId, &T> = HashMap::with_capacity(remote.len());
    for record in remote {
        remote_by_id.entry(record.id()).or_insert(record);
    }

    let mut out = Vec::with_capacity(local.len().max(remote.len()));
    let mut emitted = HashSet::with_capacity(local.len() + remote.len());

    for record in local {
        let id = record.id();
        if tombstoned.contains(&id) {
            stats.suppressed += 1;
            continue;
        }
        if !emitted.insert(id) {
            continue;
        }
        match remote_by_id.get(&id) {
            Some(theirs) if prefer_remote(record, theirs) => {
                stats.took_remote += 1;
                out.push((*theirs).clone());
            }
            Some(_) => {
                stats.kept_local += 1;
                out.push(record.clone());
            }
            None => out.push(record.clone()),
        }
    }

    for record in remote {
        let id = record.id();
        if tombstoned.contains(&id) {
            stats.suppressed += 1;
            continue;
        }
        if emitted.insert(id) {
            stats.added_remote += 1;
            out.push(record.clone());
        }
    }

    (out, stats)
}

/// Whether the remote copy of a two-sided record should win.
fn prefer_remote<T: Entity>(local: &T, remote: &T) -> bool {
    compare_timestamps(local.timestamp(), remote.timestamp()) == Ordering::Less
}
