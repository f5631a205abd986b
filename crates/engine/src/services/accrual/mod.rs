pub mod computer;
pub mod error;

mod tests;

pub use computer::AccrualComputer;
pub use error::{AccrualError, FailureKind};
