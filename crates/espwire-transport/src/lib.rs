//! Transport abstraction for the ESP protocol engine.
//!
//! The engine never owns a radio. It consumes a [`Transport`] that accepts
//! outbound bytes and is told which [`LinkKind`] the link speaks:
//! - `Stream` links (serial-over-radio) carry delimited, escaped frames
//! - `Message` links (short-range radio characteristics) carry one bare frame per delivery
//!
//! Inbound bytes are pushed into the engine by whoever reads the link.

pub mod error;
pub mod io;
pub mod memory;
pub mod traits;

pub use error::{Result, TransportError};
pub use io::IoTransport;
pub use memory::MemoryTransport;
pub use traits::{LinkKind, Transport};
