pub mod alerts;
pub mod avl;
pub mod cmd;
pub mod error;
pub mod registry;
pub mod simulate;
pub mod tracer;

pub use error::{Error, Result};
