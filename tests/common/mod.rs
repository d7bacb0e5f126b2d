//! Scripted change-feed transport shared by the integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use clusterview::cluster::{
    EventStream, WatchError, WatchEvent, WatchRequest, WatchTransport,
};
use futures::channel::mpsc;
use futures::future::BoxFuture;
use futures::stream::{self, StreamExt};
use tokio::time::Instant;

/// What one `open` call does.
pub enum Step {
    /// Fail to connect.
    Fail(WatchError),
    /// Connect, deliver these events, then stay open.
    Events(Vec<WatchEvent>),
    /// Connect, deliver these events, then close cleanly.
    EventsThenClose(Vec<WatchEvent>),
    /// Connect and forward whatever the test pushes into the channel.
    Channel(mpsc::UnboundedReceiver<Result<WatchEvent, WatchError>>),
}

/// Plays back a script of steps; once exhausted, every open fails with 503
/// when `fail_forever` is set and otherwise connects to a silent stream.
pub struct ScriptedTransport {
    script: Mutex<VecDeque<Step>>,
    fail_forever: bool,
    opens: Mutex<Vec<(Instant, WatchRequest)>>,
}

impl ScriptedTransport {
    pub fn new(steps: Vec<Step>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(steps.into()),
            fail_forever: false,
            opens: Mutex::new(Vec::new()),
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(VecDeque::new()),
            fail_forever: true,
            opens: Mutex::new(Vec::new()),
        })
    }

    pub fn open_count(&self) -> usize {
        self.opens.lock().unwrap().len()
    }

    pub fn open_times(&self) -> Vec<Instant> {
        self.opens.lock().unwrap().iter().map(|(at, _)| *at).collect()
    }

    pub fn requests(&self) -> Vec<WatchRequest> {
        self.opens.lock().unwrap().iter().map(|(_, r)| r.clone()).collect()
    }
}

impl WatchTransport for ScriptedTransport {
    fn open<'a>(&'a self, request: &'a WatchRequest) -> BoxFuture<'a, Result<EventStream, WatchError>> {
        Box::pin(async move {
            self.opens
                .lock()
                .unwrap()
                .push((Instant::now(), request.clone()));

            let step = self.script.lock().unwrap().pop_front();
            match step {
                Some(Step::Fail(e)) => Err(e),
                Some(Step::Events(events)) => Ok(stream::iter(events.into_iter().map(Ok))
                    .chain(stream::pending())
                    .boxed()),
                Some(Step::EventsThenClose(events)) => {
                    Ok(stream::iter(events.into_iter().map(Ok)).boxed())
                }
                Some(Step::Channel(rx)) => Ok(rx.boxed()),
                None if self.fail_forever => Err(WatchError::HttpStatus(503)),
                None => Ok(stream::pending().boxed()),
            }
        })
    }
}

pub fn event(kind: &str, name: &str, version: &str) -> WatchEvent {
    serde_json::from_value(serde_json::json!({
        "type": kind,
        "object": {"metadata": {"name": name, "namespace": "default", "resourceVersion": version}}
    }))
    .unwrap()
}

pub fn gone() -> WatchEvent {
    serde_json::from_value(serde_json::json!({
        "type": "ERROR",
        "object": {"kind": "Status", "code": 410, "reason": "Expired"}
    }))
    .unwrap()
}

/// Let spawned tasks run without advancing the paused clock.
pub async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}
