//! Tests for the anti-duplicate filter's eviction window semantics.

use std::sync::Arc;

use routerlink_core::{ChannelStore, DuplicateFilter, DEDUP_CAPACITY};

fn fresh_filter() -> (Arc<ChannelStore>, DuplicateFilter) {
    let store = Arc::new(ChannelStore::in_memory().unwrap());
    let filter = DuplicateFilter::new(store.clone()).unwrap();
    (store, filter)
}

#[test]
fn test_already_seen_is_false_exactly_once() {
    let (_store, filter) = fresh_filter();
    // Two sightings in succession: (false, true).
    assert!(!filter.already_seen(b"payload P").unwrap());
    assert!(filter.already_seen(b"payload P").unwrap());
    assert!(filter.already_seen(b"payload P").unwrap());
}

#[test]
fn test_false_returned_once_per_eviction_window() {
    let (_store, filter) = fresh_filter();
    assert!(!filter.already_seen(b"P").unwrap());

    // Push exactly enough distinct payloads through to evict P.
    for i in 0..DEDUP_CAPACITY {
        assert!(!filter.already_seen(format!("other-{}", i).as_bytes()).unwrap());
    }

    // P fell out of the window: false exactly once more.
    assert!(!filter.already_seen(b"P").unwrap());
    assert!(filter.already_seen(b"P").unwrap());
}

#[test]
fn test_window_capacity_is_bounded() {
    let (store, filter) = fresh_filter();
    for i in 0..(DEDUP_CAPACITY * 3) {
        filter.already_seen(format!("payload-{}", i).as_bytes()).unwrap();
    }
    assert_eq!(filter.len(), DEDUP_CAPACITY);
    // The persisted set is bounded the same way.
    assert_eq!(store.load_fingerprints().unwrap().len(), DEDUP_CAPACITY);
}

#[test]
fn test_filter_state_survives_reopen() {
    let store = Arc::new(ChannelStore::in_memory().unwrap());
    {
        let filter = DuplicateFilter::new(store.clone()).unwrap();
        assert!(!filter.already_seen(b"remembered").unwrap());
    }
    let reopened = DuplicateFilter::new(store).unwrap();
    assert!(reopened.already_seen(b"remembered").unwrap());
    assert!(!reopened.already_seen(b"new payload").unwrap());
}
