pub mod model;
pub mod repository;

#[cfg(test)]
mod tests;

pub use model::*;
pub use repository::{AccountRepositoryTrait, DynAccountRepository};
