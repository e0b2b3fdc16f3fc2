pub mod client;

pub use client::{Attachment, ClientError, MessageBuilder, Response, SmtpClient};
