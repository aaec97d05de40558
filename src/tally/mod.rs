pub mod board;

pub use board::merge_add;

use anyhow::{bail, Context, Result};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::cache::{self, CacheEntry, CurrentHashes};
use crate::eligibility::{eligible_leagues, EligibilityCache};
use crate::model::{Athlete, League, Payload, ResultEntry, ResultsDocument, TallyBoard};
use crate::scoring::{self, validate_leagues};
use crate::store::{self, Loaded};

/// Athlete lookup with process-lifetime memoization, keyed by
/// (athletes folder, athlete id). Template outcomes are cached too, so a
/// placeholder athlete is only parsed once per run.
#[derive(Debug, Default)]
pub struct AthleteCache {
    entries: HashMap<(PathBuf, String), Loaded<Athlete>>,
}

impl AthleteCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve an athlete id to their record under `folder`. Exactly one
    /// file must match `**/<id>.yaml`; zero or several is fatal.
    pub fn lookup(&mut self, folder: &Path, athlete_id: &str) -> Result<Loaded<Athlete>> {
        let key = (folder.to_path_buf(), athlete_id.to_string());
        if let Some(hit) = self.entries.get(&key) {
            return Ok(hit.clone());
        }

        let pattern = folder.join("**").join(format!("{}.yaml", athlete_id));
        let pattern = pattern.to_string_lossy();
        let matches: Vec<PathBuf> = glob::glob(&pattern)
            .with_context(|| format!("Invalid athlete pattern {}", pattern))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .with_context(|| format!("Failed to search {}", folder.display()))?;

        match matches.as_slice() {
            [] => bail!("Athlete not found: {}", athlete_id),
            [path] => {
                let loaded = store::load_document::<Athlete>(path)?;
                self.entries.insert(key, loaded.clone());
                Ok(loaded)
            }
            _ => bail!("Multiple athletes found: {}", athlete_id),
        }
    }
}

/// Run options plus a place for the caller to observe what happened.
#[derive(Debug, Clone, Default)]
pub struct TallyOptions {
    /// Skip reading (but not writing) cache entries, forcing recomputation.
    pub no_cache: bool,
}

#[derive(Debug)]
pub struct TallyRun {
    pub board: TallyBoard,
    pub documents: usize,
    pub cache_hits: usize,
}

/// Compute the tally board for a data folder.
///
/// Layout consumed: `<root>/{results,athletes,leagues}/**/*.yaml` and
/// `<root>/cache/` (created if absent). Per results document the cache is
/// consulted first; a validated hit is merged as-is, anything stale is
/// deleted and recomputed. Fatal errors abort the whole run.
pub fn tally_data(data_folder: &Path, options: &TallyOptions) -> Result<TallyRun> {
    let results_folder = data_folder.join("results");
    let athletes_folder = data_folder.join("athletes");
    let leagues_folder = data_folder.join("leagues");
    let cache_folder = data_folder.join("cache");
    fs::create_dir_all(&cache_folder)
        .with_context(|| format!("Failed to create cache folder at {}", cache_folder.display()))?;

    let hashes = CurrentHashes {
        athletes: cache::hash_corpus(&athletes_folder)?,
        leagues: cache::hash_corpus(&leagues_folder)?,
        code: cache::code_fingerprint(),
    };

    let leagues = load_leagues(&leagues_folder)?;
    if let Err(errors) = validate_leagues(&leagues) {
        bail!("League configuration errors:\n  {}", errors.join("\n  "));
    }

    let mut athletes = AthleteCache::new();
    let mut eligibility = EligibilityCache::new();
    let mut board = TallyBoard::new();
    let mut documents = 0;
    let mut cache_hits = 0;

    for results_path in cache::corpus_files(&results_folder)? {
        let content = fs::read(&results_path)
            .with_context(|| format!("Failed to read {}", results_path.display()))?;
        let key = cache::cache_key_for(&results_path, &content);
        let entry_path = cache::entry_path(&cache_folder, &key);

        if !options.no_cache {
            if let Some(entry) = cache::load_entry(&entry_path) {
                if entry.is_valid(&hashes) {
                    merge_add(&mut board, &entry.payload);
                    documents += 1;
                    cache_hits += 1;
                    continue;
                }
                // Out of date; self-heal by deleting and recomputing.
                cache::invalidate(&entry_path)?;
            }
        }

        let results = match store::load_document::<ResultsDocument>(&results_path)? {
            Loaded::Record(results) => results,
            Loaded::Template => continue,
        };

        let payload = compute_payload(
            &results,
            &leagues,
            &leagues_folder,
            &athletes_folder,
            &mut athletes,
            &mut eligibility,
        )?;

        cache::store_entry(&entry_path, &CacheEntry::new(&hashes, payload.clone()))?;
        merge_add(&mut board, &payload);
        documents += 1;
    }

    Ok(TallyRun {
        board,
        documents,
        cache_hits,
    })
}

/// Load every league definition under `folder`, skipping templates.
pub fn load_leagues(folder: &Path) -> Result<Vec<League>> {
    let mut leagues = Vec::new();
    for path in cache::corpus_files(folder)? {
        match store::load_document::<League>(&path)? {
            Loaded::Record(league) => leagues.push(league),
            Loaded::Template => continue,
        }
    }
    Ok(leagues)
}

/// One results document's score contribution, per league per contributor.
fn compute_payload(
    results: &ResultsDocument,
    leagues: &[League],
    leagues_folder: &Path,
    athletes_folder: &Path,
    athletes: &mut AthleteCache,
    eligibility: &mut EligibilityCache,
) -> Result<Payload> {
    let mut payload = Payload::new();

    for entry in &results.results {
        let athlete = match athletes.lookup(athletes_folder, &entry.id)? {
            Loaded::Record(athlete) => athlete,
            Loaded::Template => continue,
        };

        let eligible =
            eligible_leagues(&athlete, results, leagues, leagues_folder, eligibility)?;

        for &league_idx in &eligible {
            let league = &leagues[league_idx];
            let contributor = scoring::contributor_key(league, results, &athlete)?;

            // Ranking happens against everyone in the document who is also
            // eligible for this exact league, not the whole field.
            let mut competitors: Vec<&ResultEntry> = Vec::new();
            for candidate in &results.results {
                let candidate_athlete = match athletes.lookup(athletes_folder, &candidate.id)? {
                    Loaded::Record(athlete) => athlete,
                    Loaded::Template => continue,
                };
                let candidate_eligible = eligible_leagues(
                    &candidate_athlete,
                    results,
                    leagues,
                    leagues_folder,
                    eligibility,
                )?;
                if candidate_eligible.contains(&league_idx) {
                    competitors.push(candidate);
                }
            }

            let delta = scoring::score_delta(league, results, &entry.id, &competitors)?;
            *payload
                .entry(league.id().to_string())
                .or_default()
                .entry(contributor)
                .or_insert(0.0) += delta;
        }
    }

    Ok(payload)
}
