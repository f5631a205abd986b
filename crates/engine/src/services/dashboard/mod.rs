pub mod service;

mod tests;

pub use service::{DashboardService, DashboardServiceTrait, DashboardSummary, DynDashboardService};
