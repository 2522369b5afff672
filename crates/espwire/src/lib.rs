//! Client engine for the ESP radar-detector accessory protocol.
//!
//! # Crate Structure
//!
//! - [`transport`]: the link the engine writes to (stream or message oriented)
//! - [`frame`]: byte codec, device ids, frames and the packet factory
//! - [`client`]: connection engine, request correlation and demo replay
//!   (behind the default `client` feature)

/// Re-export transport types.
pub mod transport {
    pub use espwire_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use espwire_frame::*;
}

/// Re-export engine types (requires `client` feature).
#[cfg(feature = "client")]
pub mod client {
    pub use espwire_client::*;
}
