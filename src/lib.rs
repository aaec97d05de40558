pub mod cache;
pub mod eligibility;
pub mod model;
pub mod output;
pub mod scoring;
pub mod store;
pub mod tally;
