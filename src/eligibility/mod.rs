pub mod expr;

pub use expr::{compile, Env, EvalFault, Expr, Value};

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use crate::model::{Athlete, League, ResultsDocument};

/// Whole-year age on a given date, as floor(days / 365). Matches the
/// engine's historical behavior rather than calendar-exact years.
pub fn calculate_age(born: NaiveDate, on: NaiveDate) -> i64 {
    (on - born).num_days().div_euclid(365)
}

/// Memoization table for eligibility results, keyed by the exact lookup
/// triple. Owned by the orchestrator and injected per run, so tests get
/// fresh, isolated caches. Values are indices into the run's league slice.
#[derive(Debug, Default)]
pub struct EligibilityCache {
    entries: HashMap<(PathBuf, PathBuf, PathBuf), Vec<usize>>,
}

impl EligibilityCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Determine which of `leagues` the athlete qualifies for in the context of
/// one results document. Returns indices into `leagues`.
///
/// Every eligibility expression must evaluate truthy; an expression that
/// faults at runtime (absent `event_distance`, type mismatch) renders the
/// league ineligible, while one that fails to compile aborts the run. A
/// league with no eligibility list is open to everyone.
pub fn eligible_leagues(
    athlete: &Athlete,
    results: &ResultsDocument,
    leagues: &[League],
    leagues_folder: &Path,
    cache: &mut EligibilityCache,
) -> Result<Vec<usize>> {
    let key = (
        athlete.source.filepath.clone(),
        results.source.filepath.clone(),
        leagues_folder.to_path_buf(),
    );
    if let Some(hit) = cache.entries.get(&key) {
        return Ok(hit.clone());
    }

    let env = Env {
        event_distance: results.distance,
        athlete_age: calculate_age(athlete.dob, results.date),
        athlete_gender: athlete.gender.clone(),
    };

    let mut eligible = Vec::new();
    for (idx, league) in leagues.iter().enumerate() {
        let mut athlete_eligible = true;
        for criterion in &league.eligibility {
            let ast = compile(criterion).with_context(|| {
                format!(
                    "invalid eligibility expression '{}' in {}",
                    criterion,
                    league.source.filepath.display()
                )
            })?;
            match ast.eval(&env) {
                Ok(value) if value.truthy() => {}
                Ok(_) | Err(_) => {
                    athlete_eligible = false;
                    break;
                }
            }
        }
        if athlete_eligible {
            eligible.push(idx);
        }
    }

    enforce_type_exclusivity(athlete, leagues, &eligible)?;

    cache.entries.insert(key, eligible.clone());
    Ok(eligible)
}

/// An athlete may hold at most one league per league-type. More than one is
/// a league configuration inconsistency, fatal to the whole run.
fn enforce_type_exclusivity(
    athlete: &Athlete,
    leagues: &[League],
    eligible: &[usize],
) -> Result<()> {
    let mut by_type: BTreeMap<&str, Vec<&League>> = BTreeMap::new();
    for &idx in eligible {
        let league = &leagues[idx];
        by_type.entry(&league.league_type).or_default().push(league);
    }
    for (league_type, group) in by_type {
        if group.len() > 1 {
            let paths: Vec<String> = group
                .iter()
                .map(|l| l.source.filepath.display().to_string())
                .collect();
            bail!(
                "Athlete eligible for multiple leagues of type {}: {} [{}]",
                league_type,
                athlete.id(),
                paths.join(", ")
            );
        }
    }
    Ok(())
}
