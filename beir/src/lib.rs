pub mod datasets;
pub mod error;
pub mod evaluator;
pub mod reporter;

pub use error::{BeirError, Result};
