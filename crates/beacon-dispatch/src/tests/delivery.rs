//! Delivery outcome tests.
//!
//! Covered:
//! - A response of any kind deletes the batch
//! - Records added after a batch was read survive its deletion
//! - Large queues drain in bounded batches, oldest first
//! - Recoverable failures keep the batch and retry it with newer events
//! - Candidate URLs are tried in order on recoverable failures
//! - Unrecoverable failures drop the batch without retry
//! - The wire payload carries defaults, token, and the verbose flag

use super::harness::{settings, Response, TestHarness, PRIMARY_URL};
use beacon_store::MAX_BATCH_SIZE;
use std::time::Duration;

#[test]
fn response_without_body_still_deletes() {
    let harness = TestHarness::new();
    harness.transport.push_response(Response::NoBody);

    harness.track("a");
    harness.dispatcher.flush();

    harness.wait_for_requests(1);
    harness.wait_for_stored(0);
}

#[test]
fn rejecting_response_still_deletes() {
    let harness = TestHarness::new();
    harness.transport.push_response(Response::Body("0"));

    harness.track("a");
    harness.track("b");
    harness.dispatcher.flush();

    harness.wait_for_requests(1);
    harness.wait_for_stored(0);
}

#[test]
fn records_added_during_delivery_survive() {
    let harness = TestHarness::new();
    let store = harness.store.clone();
    harness.transport.on_request(move |index| {
        if index == 0 {
            store.append_event("late");
        }
    });

    for name in ["a", "b", "c"] {
        harness.track(name);
    }
    harness.dispatcher.flush();

    harness.wait_for_requests(2);
    harness.wait_for_stored(0);
    let requests = harness.transport.requests();
    assert_eq!(requests[0].event_names(), vec!["a", "b", "c"]);
    assert_eq!(requests[1].event_names(), vec!["late"]);
}

#[test]
fn large_queue_drains_in_bounded_batches() {
    let mut settings = settings();
    settings.bulk_upload_limit = 1000;
    let harness = TestHarness::with_settings(settings);

    for n in 0..120 {
        harness.track(&format!("event-{n}"));
    }
    harness.wait_for_stored(120);
    harness.dispatcher.flush();

    harness.wait_for_requests(3);
    harness.wait_for_stored(0);

    let requests = harness.transport.requests();
    assert_eq!(requests[0].events.len(), MAX_BATCH_SIZE);
    assert_eq!(requests[1].events.len(), MAX_BATCH_SIZE);
    assert_eq!(requests[2].events.len(), 20);

    let sent: Vec<String> = requests.iter().flat_map(|r| r.event_names()).collect();
    let expected: Vec<String> = (0..120).map(|n| format!("event-{n}")).collect();
    assert_eq!(sent, expected);
}

#[test]
fn recoverable_failure_keeps_batch_for_next_flush() {
    let harness = TestHarness::new();
    harness.transport.push_response(Response::io());

    for name in ["a", "b", "c"] {
        harness.track(name);
    }
    harness.dispatcher.flush();
    harness.wait_for_requests(1);
    assert_eq!(harness.store.count(), 3);

    harness.track("d");
    harness.wait_for_stored(4);
    harness.dispatcher.flush();

    harness.wait_for_requests(2);
    harness.wait_for_stored(0);
    let requests = harness.transport.requests();
    assert_eq!(requests[0].event_names(), vec!["a", "b", "c"]);
    assert_eq!(requests[1].event_names(), vec!["a", "b", "c", "d"]);
}

#[test]
fn recoverable_failure_schedules_retry() {
    let mut settings = settings();
    settings.flush_interval = Some(Duration::from_millis(50));
    let harness = TestHarness::with_settings(settings);
    harness.transport.push_response(Response::io());

    harness.track("a");
    harness.dispatcher.flush();

    harness.wait_for_requests(2);
    harness.wait_for_stored(0);
}

#[test]
fn fallback_url_tried_after_io_failure() {
    let mut settings = settings();
    settings.endpoints.push("https://fallback.test/v1/track".to_string());
    let harness = TestHarness::with_settings(settings);
    harness.transport.push_response(Response::io());

    harness.track("a");
    harness.dispatcher.flush();

    harness.wait_for_requests(2);
    harness.wait_for_stored(0);
    let urls: Vec<String> = harness
        .transport
        .requests()
        .into_iter()
        .map(|r| r.url)
        .collect();
    assert_eq!(urls, vec![PRIMARY_URL, "https://fallback.test/v1/track"]);
}

#[test]
fn all_urls_failing_keeps_batch() {
    let mut settings = settings();
    settings.endpoints.push("https://fallback.test/v1/track".to_string());
    let harness = TestHarness::with_settings(settings);
    harness.transport.push_response(Response::io());
    harness.transport.push_response(Response::io());

    harness.track("a");
    harness.dispatcher.flush();

    harness.wait_for_requests(2);
    std::thread::sleep(Duration::from_millis(50));
    assert_eq!(harness.store.count(), 1);
}

#[test]
fn malformed_url_drops_batch_without_retry() {
    let mut settings = settings();
    settings.flush_interval = Some(Duration::from_millis(20));
    settings.endpoints.push("https://fallback.test/v1/track".to_string());
    let harness = TestHarness::with_settings(settings);
    harness.transport.push_response(Response::malformed_url());

    harness.track("a");
    harness.dispatcher.flush();

    harness.wait_for_requests(1);
    harness.wait_for_stored(0);
    std::thread::sleep(Duration::from_millis(100));
    assert_eq!(harness.transport.request_count(), 1);
}

#[test]
fn out_of_memory_drops_batch() {
    let harness = TestHarness::new();
    harness.transport.push_response(Response::out_of_memory());

    harness.track("a");
    harness.track("b");
    harness.dispatcher.flush();

    harness.wait_for_requests(1);
    harness.wait_for_stored(0);
}

#[test]
fn payload_carries_defaults_token_and_verbose_flag() {
    let mut settings = settings();
    settings.verbose = true;
    let harness = TestHarness::with_settings(settings);

    harness.track("Opened App");
    harness.dispatcher.flush();
    harness.wait_for_requests(1);

    let request = &harness.transport.requests()[0];
    assert!(request.verbose);
    let event = &request.events[0];
    assert_eq!(event["event"], "Opened App");
    assert_eq!(event["properties"]["libName"], "beacon-test");
    assert_eq!(event["properties"]["token"], "test-token");
}
