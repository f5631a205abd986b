pub mod config;
pub mod date;
pub mod errors;
pub mod logger;
pub mod money;

pub use config::EnvLoader;
pub use config::*;
pub use date::*;
pub use errors::*;
pub use logger::*;
pub use money::*;
