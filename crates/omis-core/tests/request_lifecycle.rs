use std::sync::Arc;

use omis_core::test_support::{FixedClock, TestDbPath};
use omis_core::{NewRequest, RequestStatus, RequestStore, SqliteRequestStore, UpdateOutcome};
use time::macros::datetime;
use time::Duration;

#[test]
fn submitted_request_moves_through_contractor_statuses_across_reopens() {
    let temp_db = TestDbPath::new("request-lifecycle");
    let clock = FixedClock::shared(datetime!(2025-09-27 09:00:00 UTC));

    {
        let mut store = SqliteRequestStore::open_with_clock(temp_db.path(), clock.clone())
            .expect("open store");
        store
            .add(NewRequest::new("R-100", "P-1").with_comment("initial"))
            .expect("submit request");
    }

    let mut previous = datetime!(2025-09-27 09:00:00 UTC);
    for status in [
        RequestStatus::Accepted,
        RequestStatus::InReview,
        RequestStatus::EnRoute,
        RequestStatus::OnSite,
        RequestStatus::Departed,
    ] {
        let mut store = SqliteRequestStore::open_with_clock(temp_db.path(), clock.clone())
            .expect("reopen store");
        let outcome = store
            .update_status("R-100", "P-1", status)
            .expect("update status");
        assert_eq!(outcome, UpdateOutcome::Updated);

        let record = store
            .find("R-100", "P-1")
            .expect("find record")
            .expect("record exists");
        assert_eq!(record.status, status);
        assert!(record.status_updated_at > previous);
        previous = record.status_updated_at;
    }

    let store = SqliteRequestStore::open_with_clock(temp_db.path(), clock.clone())
        .expect("reopen store");
    let records = store.list().expect("list");
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].comment.as_deref(), Some("initial"));
    assert_eq!(records[0].created_at, datetime!(2025-09-27 09:00:00 UTC));
}

#[test]
fn delayed_threshold_tracks_the_injected_clock() {
    let clock = FixedClock::shared(datetime!(2025-09-27 09:00:00 UTC));
    let mut store =
        SqliteRequestStore::in_memory_with_clock(clock.clone()).expect("in-memory store");
    store.add(NewRequest::new("R-1", "P-1")).expect("add");

    clock.advance(Duration::minutes(60));
    assert!(
        store.delayed(60).expect("delayed").is_empty(),
        "a record updated exactly at the threshold is not delayed"
    );

    clock.advance(Duration::seconds(1));
    assert_eq!(store.delayed(60).expect("delayed").len(), 1);

    store
        .update_status("R-1", "P-1", RequestStatus::Accepted)
        .expect("update");
    assert!(store.delayed(60).expect("delayed").is_empty());
}

#[test]
fn store_is_usable_through_the_trait_object() {
    let clock = FixedClock::shared(datetime!(2025-09-27 09:00:00 UTC));
    let mut store: Box<dyn RequestStore> = Box::new(
        SqliteRequestStore::in_memory_with_clock(Arc::clone(&clock) as Arc<_>)
            .expect("in-memory store"),
    );

    store.add(NewRequest::new("R-7", "P-3")).expect("add");
    assert!(store
        .update_comment("R-7", "P-3", "contractor called", Some("dispatcher"))
        .expect("comment")
        .changed());
    assert_eq!(store.list().expect("list").len(), 1);
}
