//! Frontline Core: configuration, errors, reputation arithmetic, validation.

pub mod config;
pub mod contact;
pub mod error;
pub mod trust;
pub mod validate;

pub use config::{DataPaths, FrontlineConfig};
pub use error::{Error, Result};
pub use trust::{next_average, trust_score, TrustInputs};
