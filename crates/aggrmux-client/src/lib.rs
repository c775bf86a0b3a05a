//! Request-aggregation multiplexer.
//!
//! An [`AggregationClient`] carries many independent, concurrently in-flight
//! request/response calls over one TCP connection:
//!
//! - calls are correlated by a fixed table of slots plus a per-use salt, so a
//!   late response to a recycled slot is dropped instead of misdelivered
//! - a load ceiling bounds how many slots may be in use at once
//! - a periodic sweep fails calls that outlive the receive timeout
//! - every accepted call's continuation runs exactly once
//!
//! Payloads are opaque bytes; [`HttpRequest`] is a convenience for building
//! HTTP/1.1-shaped requests.

mod client;
pub mod config;
mod connection;
mod dispatcher;
pub mod error;
pub mod handshake;
pub mod http;
mod load;
mod receiver;
pub mod response;
mod sender;
mod shared;
mod slots;
mod sweeper;

pub use client::{AggregationClient, ClientStats};
pub use config::{ClientConfig, MAX_SLOTS, MIN_SLOTS};
pub use error::{ClientError, Result};
pub use handshake::{handshake_client, handshake_server};
pub use http::HttpRequest;
pub use response::{Response, Unavailable, SERVICE_UNAVAILABLE};
