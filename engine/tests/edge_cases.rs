//! Edge case tests for lounge-engine
//!
//! These tests cover the sync scenarios end to end through the public API,
//! plus boundary conditions and unusual inputs.

use lounge_engine::{
    reconcile, ActivityTracker, Category, FieldEvent, FieldKind, Mutation, RecordId, RecordStore,
    Snapshot, Source, SyncAction, SyncEvent, SyncScheduler,
};
use serde_json::json;

const NOW: u64 = 1_704_067_200_000;

fn snapshot(value: serde_json::Value) -> Snapshot {
    Snapshot::from_value(value).unwrap()
}

// ============================================================================
// Sync Scenarios
// ============================================================================

#[test]
fn remote_tombstone_newer_than_local_attendance() {
    let local = snapshot(json!({
        "attendance": [{
            "id": 1,
            "employeeName": "A",
            "date": "2024-01-01T09:00",
            "timestamp": "2024-01-01T09:00:00.000Z"
        }]
    }));
    let remote = snapshot(json!({
        "deletedRecords": {
            "attendance": [{"id": 1, "deletedAt": "2024-01-01T10:00:00.000Z", "deletedBy": "user"}]
        }
    }));

    let merged = reconcile(&local, &remote);
    assert!(merged.attendance.is_empty());
}

#[test]
fn remote_pending_savings_wins() {
    let local = snapshot(json!({"pendingSavings": 500}));
    let remote = snapshot(json!({"pendingSavings": 800}));

    assert_eq!(reconcile(&local, &remote).pending_savings(), 800);
}

#[test]
fn deleting_expense_seven_suppresses_vault_eight() {
    let mut store = RecordStore::from_snapshot(snapshot(json!({
        "expenses": [{"id": 7, "date": "2024-01-01", "amount": 1200}],
        "vaultTransactions": [
            {"id": 8, "date": "2024-01-01", "type": "withdrawal", "amount": 1200, "linkedExpenseId": 7}
        ]
    })));

    store.delete(Category::Expenses, RecordId::Int(7), "2024-01-02T00:00:00.000Z");
    assert!(!store.contains(Category::Expenses, RecordId::Int(7)));
    assert!(!store.contains(Category::VaultTransactions, RecordId::Int(8)));

    // A peer that never saw the delete still holds both records.
    let stale_peer = snapshot(json!({
        "expenses": [{"id": 7, "date": "2024-01-01", "amount": 1200, "timestamp": "2099-01-01T00:00:00.000Z"}],
        "vaultTransactions": [
            {"id": 8, "date": "2024-01-01", "type": "withdrawal", "amount": 1200, "linkedExpenseId": 7}
        ]
    }));

    let merged = reconcile(store.state(), &stale_peer);
    assert!(merged.expenses.is_empty());
    assert!(merged.vault_transactions.is_empty());

    // And the peer converges once it merges our state.
    let theirs = reconcile(&stale_peer, &merged);
    assert!(theirs.expenses.is_empty());
    assert!(theirs.vault_transactions.is_empty());
}

#[test]
fn burst_of_remote_snapshots_merges_once_with_the_last() {
    let mut scheduler = SyncScheduler::default();
    let mut store = RecordStore::new();
    let mut tracker = ActivityTracker::new(false);
    tracker.watch("quick-employee-name", FieldKind::Text);
    tracker.record("quick-employee-name", FieldEvent::Focus, NOW);

    let mut last_token = None;
    for i in 0..10 {
        let actions = scheduler.handle(
            &mut store,
            &tracker,
            SyncEvent::RemoteSnapshotReceived {
                source: Source::Realtime,
                snapshot: json!({"products": [{"id": i, "name": format!("p{i}")}]}),
            },
            NOW + i as u64 * 50,
        );
        for action in actions {
            if let SyncAction::ArmTimer { token, .. } = action {
                last_token = Some(token);
            }
        }
    }

    tracker.record("quick-employee-name", FieldEvent::Blur, NOW + 1_000);
    let actions = scheduler.handle(
        &mut store,
        &tracker,
        SyncEvent::TimerFired(last_token.unwrap()),
        NOW + 5_000,
    );

    assert!(actions.iter().any(|a| matches!(a, SyncAction::Persist(_))));
    assert_eq!(scheduler.merges_applied(), 1);
    assert_eq!(store.state().ids(Category::Products), vec![RecordId::Int(9)]);
}

// ============================================================================
// Identity Edge Cases
// ============================================================================

#[test]
fn float_and_integer_ids_are_the_same_record() {
    let local = snapshot(json!({"products": [{"id": 5, "name": "old", "timestamp": "2024-01-01T00:00:00Z"}]}));
    let remote = snapshot(json!({"products": [{"id": 5.0, "name": "new", "timestamp": "2024-01-02T00:00:00Z"}]}));

    let merged = reconcile(&local, &remote);
    assert_eq!(merged.products.len(), 1);
    assert_eq!(merged.products[0].name, "new");
}

#[test]
fn fractional_ids_are_distinct() {
    let local = snapshot(json!({"products": [{"id": 1.5, "name": "a"}]}));
    let remote = snapshot(json!({"products": [{"id": 1, "name": "b"}]}));

    assert_eq!(reconcile(&local, &remote).products.len(), 2);
}

#[test]
fn duplicate_ids_in_one_snapshot_collapse() {
    let local = snapshot(json!({"courses": [{"id": 1, "name": "first"}, {"id": 1, "name": "second"}]}));
    let merged = reconcile(&local, &Snapshot::new());
    assert_eq!(merged.courses.len(), 1);
    assert_eq!(merged.courses[0].name, "first");
}

#[test]
fn tombstone_in_one_category_does_not_affect_another() {
    let local = snapshot(json!({
        "products": [{"id": 3, "name": "lime soda"}],
        "deletedRecords": {"courses": [{"id": 3, "deletedAt": "2024-01-01T00:00:00Z"}]}
    }));
    let merged = reconcile(&local, &Snapshot::new());
    assert_eq!(merged.products.len(), 1);
}

// ============================================================================
// Timestamp Edge Cases
// ============================================================================

#[test]
fn mixed_timestamp_formats_compare_chronologically() {
    // 10:00+09:00 is 01:00Z, earlier than 02:00Z
    let local = snapshot(json!({"employees": [{"id": 1, "name": "tokyo", "timestamp": "2024-01-01T10:00:00+09:00"}]}));
    let remote = snapshot(json!({"employees": [{"id": 1, "name": "utc", "timestamp": "2024-01-01T02:00:00.000Z"}]}));

    assert_eq!(reconcile(&local, &remote).employees[0].name, "utc");
    assert_eq!(reconcile(&remote, &local).employees[0].name, "utc");
}

#[test]
fn unparseable_timestamps_fall_back_to_string_order() {
    let local = snapshot(json!({"employees": [{"id": 1, "name": "a", "timestamp": "b"}]}));
    let remote = snapshot(json!({"employees": [{"id": 1, "name": "z", "timestamp": "a"}]}));

    assert_eq!(reconcile(&local, &remote).employees[0].name, "a");
}

// ============================================================================
// Shape Edge Cases
// ============================================================================

#[test]
fn unicode_and_unknown_fields_round_trip() {
    let value = json!({
        "employees": [{"id": 1, "name": "日本語テスト 🎉", "joinDate": "2024-01-01", "active": true, "nickname": "Ai"}],
        "customSettings": {"currency": "JPY"}
    });
    let parsed = snapshot(value.clone());
    let back = parsed.to_value().unwrap();

    assert_eq!(back["employees"][0]["name"], "日本語テスト 🎉");
    assert_eq!(back["employees"][0]["nickname"], "Ai");
    assert_eq!(back["customSettings"]["currency"], "JPY");
}

#[test]
fn empty_snapshots_merge_to_empty() {
    let merged = reconcile(&Snapshot::new(), &Snapshot::new());
    assert_eq!(merged, Snapshot::new());
    assert!(merged.is_empty());
}

#[test]
fn large_collections_merge() {
    let local: Vec<_> = (0..2_000).map(|i| json!({"id": i, "amount": i})).collect();
    let remote: Vec<_> = (1_000..3_000).map(|i| json!({"id": i, "amount": -i})).collect();
    let merged = reconcile(
        &snapshot(json!({"expenses": local})),
        &snapshot(json!({"expenses": remote})),
    );

    assert_eq!(merged.expenses.len(), 3_000);
    // Neither side has timestamps: local copies win on overlap.
    assert_eq!(merged.expenses[1_500].amount, 1_500);
    assert_eq!(merged.expenses[2_500].id, RecordId::Int(2_500));
}

#[test]
fn mutations_deserialize_from_front_end_json() {
    let mut store = RecordStore::new();
    let mutation: Mutation = serde_json::from_value(json!({
        "type": "record_expense",
        "date": "2024-01-01",
        "category": "supplies",
        "description": "limes",
        "amount": 900
    }))
    .unwrap();

    store.apply(mutation, NOW).unwrap();
    assert_eq!(store.len(Category::Expenses), 1);
    assert_eq!(store.len(Category::VaultTransactions), 1);
}

// ============================================================================
// Maintenance Operations
// ============================================================================

/// A peer holding every record the local store had before a cleanup, each
/// stamped far in the future so recency alone would keep it.
fn stale_peer() -> Snapshot {
    snapshot(json!({
        "attendance": [
            {"id": 1, "employeeName": "Aiko", "date": "2024-01-01T09:00", "timestamp": "2099-01-01T00:00:00.000Z"},
            {"id": 2, "employeeName": "Aiko", "date": "2024-01-01T18:00", "timestamp": "2099-01-01T00:00:00.000Z"}
        ],
        "otherRevenue": [
            {"id": 3, "date": "2024-01-01", "type": "tip", "amount": 0, "timestamp": "2099-01-01T00:00:00.000Z"},
            {"id": 4, "date": "2024-01-01", "type": "tip", "amount": 800, "timestamp": "2099-01-01T00:00:00.000Z"}
        ],
        "products": [{"id": 5, "name": "tea", "timestamp": "2099-01-01T00:00:00.000Z"}],
        "pendingSavings": 400
    }))
}

#[test]
fn removed_duplicates_stay_gone_after_merging_a_stale_peer() {
    let mut store = RecordStore::from_snapshot(stale_peer());
    store
        .apply(Mutation::RemoveDuplicates { category: None }, NOW)
        .unwrap();
    assert_eq!(store.state().ids(Category::Attendance), vec![RecordId::Int(1)]);

    let merged = reconcile(store.state(), &stale_peer());
    assert_eq!(merged.ids(Category::Attendance), vec![RecordId::Int(1)]);
    assert!(merged.is_tombstoned(Category::Attendance, RecordId::Int(2)));
}

#[test]
fn removed_zero_revenue_stays_gone_after_merging_a_stale_peer() {
    let mut store = RecordStore::from_snapshot(stale_peer());
    store.apply(Mutation::RemoveZeroAmountRevenue, NOW).unwrap();

    let merged = reconcile(store.state(), &stale_peer());
    assert_eq!(merged.ids(Category::OtherRevenue), vec![RecordId::Int(4)]);

    // The peer converges from its side too.
    let theirs = reconcile(&stale_peer(), store.state());
    assert_eq!(theirs.ids(Category::OtherRevenue), vec![RecordId::Int(4)]);
}

#[test]
fn full_reset_stays_empty_after_merging_a_stale_peer() {
    let mut store = RecordStore::from_snapshot(stale_peer());
    store
        .apply(Mutation::DeleteAllData { confirmed: true }, NOW)
        .unwrap();

    let merged = reconcile(store.state(), &stale_peer());
    assert_eq!(merged.record_count(), 0);
    for category in Category::ALL {
        assert!(merged.ids(category).is_empty(), "{category} came back");
    }
}
