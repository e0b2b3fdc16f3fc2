//! Configuration types shared by the prober and the campaign transport.
//!
//! - [`timeouts`]: per-step SMTP client timeouts
//! - [`tls`]: TLS policy and certificate validation settings

pub mod timeouts;
pub mod tls;

pub use timeouts::ClientTimeouts;
pub use tls::{TlsConfig, TlsPolicy};
