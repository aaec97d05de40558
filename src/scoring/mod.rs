pub mod engine;
pub mod validation;

pub use engine::{contributor_key, score_delta, settings_for};
pub use validation::validate_leagues;
