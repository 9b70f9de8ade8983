//! Live push stream of records.
//!
//! [`StreamSink`] fans each published record out to the current subscribers
//! through bounded handoff channels; [`StreamServer`] accepts WebSocket
//! connections and runs one delivery task per subscriber.

mod server;
mod sink;

use std::io;

use thiserror::Error;

pub use server::{DEFAULT_STREAM_ADDR, StreamServer};
pub use sink::{DeliveryError, StreamSink, SubscriberId, Subscription};

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("record serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("failed to bind stream endpoint {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}
