pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use config::AppConfig;
pub use error::{FerryError, GraphValidationError, Result};
pub use types::*;
