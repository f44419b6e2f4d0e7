pub mod config;
pub mod errors;
pub mod logging;

pub use config::{AppPaths, Settings};
pub use errors::{ApiError, PipelineError};
