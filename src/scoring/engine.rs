use anyhow::{anyhow, bail, Result};
use std::cmp::Ordering;

use crate::model::{Athlete, FinishTime, League, ResultEntry, ResultsDocument, ScoringSettings};

/// Scoring settings a league declares for one result type. Scoring a
/// document of a type the league has no settings for is a configuration
/// error.
pub fn settings_for<'a>(league: &'a League, result_type: &str) -> Result<&'a ScoringSettings> {
    league.scoring.get(result_type).ok_or_else(|| {
        anyhow!(
            "No scoring settings for result type '{}' in league: {}",
            result_type,
            league.id()
        )
    })
}

/// Resolve which tally key this athlete's points land under: the athlete
/// for individual scoring, their team for team scoring.
pub fn contributor_key(
    league: &League,
    results: &ResultsDocument,
    athlete: &Athlete,
) -> Result<String> {
    let settings = settings_for(league, &results.result_type)?;
    match settings.contributes_to.as_str() {
        "individual" => Ok(athlete.id().to_string()),
        "team" => athlete.team.clone().ok_or_else(|| {
            anyhow!(
                "Athlete {} has no team but league {} scores to team",
                athlete.id(),
                league.id()
            )
        }),
        other => bail!(
            "No contributes_to method '{}' found for league: {}",
            other,
            league.id()
        ),
    }
}

/// Score one athlete's contribution for one league and one results
/// document. `competitors` is the subset of the document's entries whose
/// athletes are eligible for this exact league; it includes the athlete.
pub fn score_delta(
    league: &League,
    results: &ResultsDocument,
    athlete_id: &str,
    competitors: &[&ResultEntry],
) -> Result<f64> {
    let settings = settings_for(league, &results.result_type)?;
    if settings.method != "minus_place" {
        bail!(
            "No scoring method '{}' found for league: {}",
            settings.method,
            league.id()
        );
    }

    let athlete_entry = competitors
        .iter()
        .find(|entry| entry.id == athlete_id)
        .ok_or_else(|| {
            anyhow!(
                "No result entry for athlete {} in {}",
                athlete_id,
                results.source.filepath.display()
            )
        })?;

    let place = match settings.sort_by.as_str() {
        "lowest_finish_time" => {
            let my_time = finish_time_of(athlete_entry, results)?;
            let mut times = Vec::with_capacity(competitors.len());
            for competitor in competitors {
                times.push(finish_time_of(competitor, results)?);
            }
            place_by_lowest_time(my_time, &times)
        }
        "highest_max_result" => {
            let my_score = max_result_of(athlete_entry);
            let scores: Vec<Option<f64>> = competitors.iter().map(|c| max_result_of(c)).collect();
            place_by_highest_max(my_score, &scores)
        }
        other => bail!(
            "No sort_by method '{}' found for league: {} {}",
            other,
            league.id(),
            results.result_type
        ),
    };

    Ok((settings.method_value - place as f64 * settings.decrement()).max(0.0))
}

fn finish_time_of(entry: &ResultEntry, results: &ResultsDocument) -> Result<FinishTime> {
    entry.finish_time.ok_or_else(|| {
        anyhow!(
            "Missing finish_time for competitor {} in {}",
            entry.id,
            results.source.filepath.display()
        )
    })
}

/// Ranking score for highest_max_result: the best sub-result, or None when
/// there are none. None ranks below every number.
fn max_result_of(entry: &ResultEntry) -> Option<f64> {
    entry
        .results
        .as_deref()
        .unwrap_or_default()
        .iter()
        .copied()
        .fold(None, |best, value| match best {
            Some(b) if b >= value => Some(b),
            _ => Some(value),
        })
}

/// Dense ranking: tied scores share a place, the next distinct score
/// advances the place by exactly one.
fn place_by_lowest_time(mine: FinishTime, times: &[FinishTime]) -> u32 {
    let mut distinct = times.to_vec();
    distinct.sort();
    distinct.dedup();
    1 + distinct.iter().filter(|t| **t < mine).count() as u32
}

fn place_by_highest_max(mine: Option<f64>, scores: &[Option<f64>]) -> u32 {
    let mut distinct: Vec<f64> = scores.iter().filter_map(|s| *s).collect();
    distinct.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    distinct.dedup();
    match mine {
        Some(my_score) => 1 + distinct.iter().filter(|s| **s > my_score).count() as u32,
        // No sub-results at all ranks behind every scored competitor.
        None => 1 + distinct.len() as u32,
    }
}
