//! The `mailsift` command-line tool: configuration, input parsing and output
//! rendering around `mailsift-verify` and `mailsift-campaign`.

pub mod cli;
pub mod config;
pub mod input;
pub mod output;

pub use config::{MailsiftConfig, find_config_file, load};
