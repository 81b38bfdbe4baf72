//! Types shared between the bringup core and its consumers.

pub mod errors;

pub use errors::{BringupError, BringupResult};
