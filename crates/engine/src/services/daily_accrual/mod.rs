pub mod report;
pub mod service;


pub use report::{AccrualRunReport, SkipReason, UnitFailure, UnitOutcome};
pub use service::{AccrualSettings, DailyAccrualService};
