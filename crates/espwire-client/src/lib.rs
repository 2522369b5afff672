//! Connection engine for the ESP accessory protocol.
//!
//! [`Connection`] turns a [`Transport`](espwire_transport::Transport) into a
//! request/response session with the detector:
//!
//! - requests wait in a FIFO queue and are written by one writer task once
//!   the detector's personality is known and the bus allows it
//! - our own frames echoed back by the bus are suppressed
//! - responses are matched to the [`ResponseHandler`] of the request that
//!   asked for them, and unanswered handlers time out
//! - display data, alert tables and connection events reach registered
//!   [`EspListener`]s
//!
//! [`EspClient`] adds one typed method per request kind, and
//! [`DemoReplay`] drives a connection from recorded demo text.

pub mod aggregate;
pub mod client;
pub mod config;
pub mod connection;
pub mod correlation;
pub mod demo;
pub mod echo;
pub mod error;
pub mod listener;
pub mod personality;
mod queue;
pub mod request;
mod writer;

pub use aggregate::{AlertTableProcessor, SweepDefinitionProcessor, SweepSectionProcessor};
pub use client::EspClient;
pub use config::{ClientConfig, DemoConfig, RESPONSE_TIMEOUT};
pub use connection::{Connection, ConnectionState};
pub use demo::{parse_demo, DemoLine, DemoReplay};
pub use echo::EchoQueue;
pub use error::{ClientError, Result};
pub use listener::{ConnectionEvent, EspListener};
pub use request::{Request, RequestFailure, ResponseHandler};
