//! email-vetter core library.
//!
//! Validates addresses through a staged pipeline (syntax, disposable domain,
//! DNS, optional SMTP probe and catch-all detection) and runs batches of them
//! on a bounded pool of tokio tasks.

pub mod core;
pub mod utils;
pub mod verification;

pub use crate::core::config::{Config, ConfigBuilder};
pub use crate::core::dispatcher::{dedup_emails, validate_batch, ShutdownSignal};
pub use crate::core::error::{AppError, Result, StageFailure};
pub use crate::core::models::{Category, EmailAddress, Stage, StageCell, ValidationOutcome};
pub use crate::core::pipeline::Validator;
pub use crate::utils::lru::CacheStats;
