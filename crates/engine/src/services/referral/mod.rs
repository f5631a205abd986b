pub mod graph;


pub use graph::{ReferralGraph, ReferralLevel, ReferralMember};
