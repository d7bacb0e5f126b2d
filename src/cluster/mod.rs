//! Remote side of the cluster browser: listing resources and following
//! their change feeds.

pub mod client;
pub mod error;
pub mod provider;
pub mod resource;
pub mod transport;
pub mod watch;

pub use client::{parse_server_url, ClusterClient};
pub use error::{ClientError, FailureKind, WatchError};
pub use provider::ClusterTree;
pub use resource::{NodePayload, Resource, ResourceKind, ResourceNode, KNOWN_KINDS};
pub use transport::{
    EventStream, HttpWatchTransport, WatchEvent, WatchEventType, WatchRequest, WatchTransport,
};
pub use watch::{reconnect_delay, Recovery, WatchConfig, WatchManager, WatchState};
