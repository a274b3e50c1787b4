//! Data Validation and Filtering
//!
//! Range checks decoded engine parameters against gauge limits and smooths
//! noisy readings before they reach a display.

mod error;
mod filter;
mod validator;

pub use error::ValidationError;
pub use filter::MedianFilter;
pub use validator::{ValidationConfig, ValidationResult, Validator};
