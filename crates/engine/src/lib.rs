pub mod services;

pub use services::Services;
