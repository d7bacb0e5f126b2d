//! Integration tests for the watch manager's state machine: reconnect
//! backoff, terminal failures, resume markers and teardown.
//!
//! All tests run on a paused clock; sleeping in the test advances time to
//! the next pending timer.

mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use clusterview::cluster::{
    Recovery, WatchConfig, WatchError, WatchEvent, WatchEventType, WatchManager, WatchRequest,
    WatchState,
};
use common::{event, gone, settle, ScriptedTransport, Step};
use futures::channel::mpsc;
use pretty_assertions::assert_eq;

type Events = Arc<Mutex<Vec<WatchEvent>>>;
type Errors = Arc<Mutex<Vec<(String, Recovery)>>>;

const BASE: Duration = Duration::from_secs(1);

fn manager(transport: Arc<ScriptedTransport>) -> WatchManager {
    WatchManager::new(
        transport,
        WatchConfig {
            max_attempts: 5,
            base_delay: BASE,
        },
    )
}

fn start(watch: &mut WatchManager) -> (Events, Errors) {
    let events: Events = Arc::default();
    let errors: Errors = Arc::default();
    let (ev, er) = (Arc::clone(&events), Arc::clone(&errors));
    watch.start(
        WatchRequest::new("/api/v1/pods"),
        move |e| ev.lock().unwrap().push(e),
        move |e, recovery| er.lock().unwrap().push((e.to_string(), recovery)),
    );
    (events, errors)
}

fn recoveries(errors: &Errors) -> Vec<Recovery> {
    errors.lock().unwrap().iter().map(|(_, r)| *r).collect()
}

// ============================================================================
// Reconnect & Backoff
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_recovers_after_two_failures() {
    let transport = ScriptedTransport::new(vec![
        Step::Fail(WatchError::HttpStatus(503)),
        Step::Fail(WatchError::Timeout),
    ]);
    let mut watch = manager(transport.clone());
    let (_, errors) = start(&mut watch);

    tokio::time::sleep(Duration::from_millis(3_500)).await;

    assert_eq!(watch.state(), WatchState::Active);
    assert_eq!(watch.attempts(), 2);
    assert_eq!(transport.open_count(), 3);
    assert_eq!(
        recoveries(&errors),
        vec![
            Recovery::Reconnecting { attempt: 1, delay: BASE },
            Recovery::Reconnecting { attempt: 2, delay: BASE * 2 },
        ]
    );

    let times = transport.open_times();
    assert_eq!(times[1] - times[0], BASE);
    assert_eq!(times[2] - times[1], BASE * 2);
}

#[tokio::test(start_paused = true)]
async fn test_forbidden_is_terminal_without_retry() {
    let transport = ScriptedTransport::new(vec![Step::Fail(WatchError::HttpStatus(403))]);
    let mut watch = manager(transport.clone());
    let (_, errors) = start(&mut watch);

    settle().await;
    assert_eq!(watch.state(), WatchState::Stopped);
    assert_eq!(recoveries(&errors), vec![Recovery::Terminal]);

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(transport.open_count(), 1);
    assert_eq!(watch.attempts(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_textual_forbidden_is_terminal_without_retry() {
    let transport = ScriptedTransport::new(vec![Step::Fail(WatchError::Transport(
        "403 Forbidden".into(),
    ))]);
    let mut watch = manager(transport.clone());
    let (_, errors) = start(&mut watch);

    settle().await;
    assert_eq!(watch.state(), WatchState::Stopped);
    assert_eq!(recoveries(&errors), vec![Recovery::Terminal]);

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(transport.open_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_gives_up_after_max_attempts() {
    let transport = ScriptedTransport::failing();
    let mut watch = manager(transport.clone());
    let (_, errors) = start(&mut watch);

    tokio::time::sleep(Duration::from_secs(60)).await;

    assert_eq!(watch.state(), WatchState::Stopped);
    assert_eq!(watch.attempts(), 5);
    // Initial open plus five reconnects
    assert_eq!(transport.open_count(), 6);

    let recoveries = recoveries(&errors);
    assert_eq!(recoveries.len(), 6);
    assert_eq!(recoveries.last(), Some(&Recovery::Terminal));
    let delays: Vec<Duration> = recoveries
        .iter()
        .filter_map(|r| match r {
            Recovery::Reconnecting { delay, .. } => Some(*delay),
            Recovery::Terminal => None,
        })
        .collect();
    assert_eq!(delays, (1..=5).map(|n| BASE * n).collect::<Vec<_>>());
}

#[tokio::test(start_paused = true)]
async fn test_mid_stream_failure_reconnects() {
    let (tx, rx) = mpsc::unbounded();
    let transport = ScriptedTransport::new(vec![Step::Channel(rx)]);
    let mut watch = manager(transport.clone());
    let (events, errors) = start(&mut watch);

    settle().await;
    assert_eq!(watch.state(), WatchState::Active);

    tx.unbounded_send(Ok(event("ADDED", "web-1", "5"))).unwrap();
    tx.unbounded_send(Err(WatchError::Transport("connection reset".into())))
        .unwrap();
    settle().await;

    assert_eq!(events.lock().unwrap().len(), 1);
    assert_eq!(watch.state(), WatchState::Reconnecting);
    assert_eq!(
        recoveries(&errors),
        vec![Recovery::Reconnecting { attempt: 1, delay: BASE }]
    );

    tokio::time::sleep(BASE + Duration::from_millis(100)).await;
    assert_eq!(watch.state(), WatchState::Active);
    assert_eq!(transport.requests()[1].resource_version.as_deref(), Some("5"));
}

#[tokio::test(start_paused = true)]
async fn test_malformed_event_is_skipped() {
    let (tx, rx) = mpsc::unbounded();
    let transport = ScriptedTransport::new(vec![Step::Channel(rx)]);
    let mut watch = manager(transport.clone());
    let (events, errors) = start(&mut watch);

    tx.unbounded_send(Err(WatchError::Decode("expected value".into())))
        .unwrap();
    tx.unbounded_send(Ok(event("MODIFIED", "web-1", "6"))).unwrap();
    settle().await;

    assert_eq!(events.lock().unwrap().len(), 1);
    assert!(errors.lock().unwrap().is_empty());
    assert_eq!(watch.state(), WatchState::Active);
}

// ============================================================================
// Resume Marker
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_clean_close_resumes_from_last_version() {
    let transport = ScriptedTransport::new(vec![Step::EventsThenClose(vec![
        event("ADDED", "web-1", "10"),
        event("MODIFIED", "web-1", "11"),
        event("BOOKMARK", "", "12"),
    ])]);
    let mut watch = manager(transport.clone());
    let (events, errors) = start(&mut watch);

    tokio::time::sleep(BASE + Duration::from_millis(100)).await;

    let kinds: Vec<_> = events.lock().unwrap().iter().map(|e| e.kind).collect();
    assert_eq!(kinds, vec![WatchEventType::Added, WatchEventType::Modified]);
    assert!(errors.lock().unwrap().is_empty());
    assert_eq!(watch.attempts(), 0);
    assert_eq!(watch.state(), WatchState::Active);

    let requests = transport.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].resource_version, None);
    assert_eq!(requests[1].resource_version.as_deref(), Some("12"));
}

#[tokio::test(start_paused = true)]
async fn test_gone_clears_resume_marker() {
    let transport = ScriptedTransport::new(vec![Step::EventsThenClose(vec![
        event("ADDED", "web-1", "10"),
        gone(),
    ])]);
    let mut watch = manager(transport.clone());
    let (events, _) = start(&mut watch);

    tokio::time::sleep(BASE + Duration::from_millis(100)).await;

    assert_eq!(events.lock().unwrap().len(), 2);
    assert_eq!(transport.requests()[1].resource_version, None);
}

// ============================================================================
// Stop & Restart
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_stop_cancels_pending_reconnect() {
    let transport = ScriptedTransport::failing();
    let mut watch = manager(transport.clone());
    let (_, errors) = start(&mut watch);

    settle().await;
    assert_eq!(watch.state(), WatchState::Reconnecting);

    watch.stop();
    watch.stop();
    assert_eq!(watch.state(), WatchState::Stopped);

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(transport.open_count(), 1);
    assert_eq!(errors.lock().unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_no_callbacks_after_stop() {
    let (tx, rx) = mpsc::unbounded();
    let transport = ScriptedTransport::new(vec![Step::Channel(rx)]);
    let mut watch = manager(transport);
    let (events, errors) = start(&mut watch);

    tx.unbounded_send(Ok(event("ADDED", "web-1", "1"))).unwrap();
    settle().await;
    assert_eq!(events.lock().unwrap().len(), 1);

    watch.stop();
    let _ = tx.unbounded_send(Ok(event("ADDED", "web-2", "2")));
    let _ = tx.unbounded_send(Err(WatchError::Timeout));
    tokio::time::sleep(Duration::from_secs(10)).await;

    assert_eq!(events.lock().unwrap().len(), 1);
    assert!(errors.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_restart_resets_attempts() {
    let transport = ScriptedTransport::new(vec![
        Step::Fail(WatchError::HttpStatus(503)),
        Step::Fail(WatchError::HttpStatus(503)),
    ]);
    let mut watch = manager(transport.clone());
    start(&mut watch);

    tokio::time::sleep(Duration::from_millis(3_500)).await;
    assert_eq!(watch.attempts(), 2);

    watch.stop();
    start(&mut watch);
    settle().await;

    assert_eq!(watch.attempts(), 0);
    assert_eq!(watch.state(), WatchState::Active);
    assert_eq!(transport.open_count(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_stop_before_start_is_harmless() {
    let mut watch = manager(ScriptedTransport::new(Vec::new()));
    assert_eq!(watch.state(), WatchState::Idle);
    watch.stop();
    assert_eq!(watch.state(), WatchState::Stopped);
    assert!(!watch.is_active());
}
