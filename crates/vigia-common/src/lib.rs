//! Shared error handling and logging for the vigia workspace.
//!
//! Every crate in the workspace uses the [`VigiaError`] taxonomy and the
//! [`Result`] alias defined here. The `logging` module provides the
//! process-wide tracing setup.

pub mod error;
pub mod logging;

pub use error::{Result, VigiaError};
