use crate::eligibility::compile;
use crate::model::League;

const METHODS: &[&str] = &["minus_place"];
const SORT_ORDERS: &[&str] = &["lowest_finish_time", "highest_max_result"];
const CONTRIBUTORS: &[&str] = &["individual", "team"];

/// Validate league configuration at startup.
/// Returns all validation errors at once (not just the first).
pub fn validate_leagues(leagues: &[League]) -> Result<(), Vec<String>> {
    let mut errors = Vec::new();

    for league in leagues {
        let path = league.source.filepath.display();

        for (i, criterion) in league.eligibility.iter().enumerate() {
            if let Err(e) = compile(criterion) {
                errors.push(format!(
                    "{}: eligibility[{}]: invalid expression '{}' - {}",
                    path, i, criterion, e
                ));
            }
        }

        for (result_type, settings) in &league.scoring {
            if !METHODS.contains(&settings.method.as_str()) {
                errors.push(format!(
                    "{}: scoring.{}.method: unknown '{}'",
                    path, result_type, settings.method
                ));
            }
            if !SORT_ORDERS.contains(&settings.sort_by.as_str()) {
                errors.push(format!(
                    "{}: scoring.{}.sort_by: unknown '{}'",
                    path, result_type, settings.sort_by
                ));
            }
            if !CONTRIBUTORS.contains(&settings.contributes_to.as_str()) {
                errors.push(format!(
                    "{}: scoring.{}.contributes_to: unknown '{}'",
                    path, result_type, settings.contributes_to
                ));
            }
            if settings.method_value < 0.0 {
                errors.push(format!(
                    "{}: scoring.{}.method_value: must be non-negative",
                    path, result_type
                ));
            }
            if settings.decrement() < 0.0 {
                errors.push(format!(
                    "{}: scoring.{}.method_decrement: must be non-negative",
                    path, result_type
                ));
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
