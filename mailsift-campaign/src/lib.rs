//! Rate-limited bulk sending to verified addresses.
//!
//! ```no_run
//! use mailsift_campaign::{CampaignMessage, CampaignTarget, Dispatcher, Provider};
//!
//! # async fn run() -> Result<(), mailsift_campaign::CampaignError> {
//! let dispatcher = Dispatcher::smtp(Provider::Gmail.settings("me@gmail.com", "app-password"));
//! let handle = dispatcher.send_campaign(
//!     vec![CampaignTarget::new("ada@example.com").with_name("Ada")],
//!     CampaignMessage::new("Hello {name}", "Hi {name}, this went to {email}."),
//!     None,
//! )?;
//!
//! let report = handle.join().await;
//! println!("{} sent", report.stats.total_sent);
//! # Ok(())
//! # }
//! ```

pub mod dispatcher;
pub mod error;
pub mod provider;
pub mod settings;
pub mod template;
pub mod transport;
pub mod types;

pub use dispatcher::{CampaignHandle, DEFAULT_GRACE, Dispatcher, Termination};
pub use error::{CampaignError, SendError};
pub use mailsift_smtp::Attachment;
pub use provider::Provider;
pub use settings::SmtpSettings;
pub use transport::{OutgoingMail, SmtpTransport, Transport};
pub use types::{
    CampaignMessage, CampaignProgress, CampaignReport, CampaignStats, CampaignTarget,
    DispatcherStatus, SendOutcome, SendStatus,
};
