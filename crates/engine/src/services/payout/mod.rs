pub mod distributor;


pub use distributor::{level_percent, PayoutDistributor, PayoutSummary, LEVEL_PERCENT, MAX_LEVEL};
