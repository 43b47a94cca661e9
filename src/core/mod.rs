pub mod config;
pub mod dispatcher;
pub mod error;
pub mod models;
pub mod pipeline;

pub use dispatcher::{dedup_emails, validate_batch, ShutdownSignal};
pub use pipeline::Validator;
