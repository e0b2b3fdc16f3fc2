pub mod address;
pub mod config;
pub mod logging;
pub mod status;

pub use tracing;

pub use address::{AddressError, Mailbox, parse_address, validate};
pub use status::{ProbeStatus, VerificationStatus};
