//! Deliverability verification: syntax, MX and SMTP recipient probing.
//!
//! # Example
//!
//! ```no_run
//! use mailsift_verify::{Verifier, VerifierConfig};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run() -> Result<(), mailsift_verify::VerifyError> {
//! let verifier = Verifier::from_config(&VerifierConfig::default());
//! let report = verifier
//!     .verify_batch(vec!["user@example.com".to_string()], None, CancellationToken::new())
//!     .await?;
//!
//! for result in report.valid_and_risky() {
//!     println!("{}", result.address);
//! }
//! # Ok(())
//! # }
//! ```

pub mod dns;
pub mod error;
pub mod probe;
pub mod report;
pub mod scheduler;
pub mod types;

pub use dns::{
    DnsConfig, DnsError, DnsResolver, LookupBudget, LookupBudgets, MailExchangerLookup,
    MailServer, has_mx,
};
pub use error::{ProbeError, VerifyError};
pub use mailsift_common::{ProbeStatus, VerificationStatus};
pub use probe::{ProbeConfig, Prober};
pub use report::{Summary, VerificationReport};
pub use scheduler::{MAX_WORKERS, Verifier, VerifyProgress};
pub use types::{CheckDepth, ProbeMode, VerificationResult, VerifierConfig, VerifyOptions};
