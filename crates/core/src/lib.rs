#![forbid(unsafe_code)]

pub mod command;
pub mod config;
pub mod error;
pub mod geometry;
pub mod history;
pub mod ids;
pub mod model;
pub mod placement;
pub mod similarity;
pub mod validate;

pub use error::{ConfigError, ValidationError};
