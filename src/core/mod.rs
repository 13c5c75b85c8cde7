pub mod error;

pub use error::{HotUpdateError, Result, ServerError};
