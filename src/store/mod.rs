use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::model::{Athlete, League, Provenance, ResultsDocument};

/// Outcome of loading a document. Template placeholders are a normal,
/// skippable condition, not an error; anything fatal comes back as an
/// ordinary `anyhow::Error`.
#[derive(Debug, Clone)]
pub enum Loaded<T> {
    Record(T),
    Template,
}

impl<T> Loaded<T> {
    pub fn is_template(&self) -> bool {
        matches!(self, Loaded::Template)
    }
}

/// A record type the store knows how to load and stamp with provenance.
pub trait Record: DeserializeOwned {
    fn set_provenance(&mut self, provenance: Provenance);
}

impl Record for Athlete {
    fn set_provenance(&mut self, provenance: Provenance) {
        self.source = provenance;
    }
}

impl Record for League {
    fn set_provenance(&mut self, provenance: Provenance) {
        self.source = provenance;
    }
}

impl Record for ResultsDocument {
    fn set_provenance(&mut self, provenance: Provenance) {
        self.source = provenance;
    }
}

/// Minimal first-pass parse used for template classification. A template
/// file may be missing required fields, so this must run before the typed
/// parse.
#[derive(Deserialize)]
struct TemplateProbe {
    #[serde(default)]
    template: bool,
}

/// Load and parse one YAML document, injecting provenance.
///
/// A document whose top-level mapping has `template: true` is an
/// uninstantiated placeholder and comes back as `Loaded::Template`.
pub fn load_document<T: Record>(path: &Path) -> Result<Loaded<T>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read document at {}", path.display()))?;

    let probe: TemplateProbe = serde_saphyr::from_str(&content)
        .with_context(|| format!("Invalid YAML in {}", path.display()))?;
    if probe.template {
        return Ok(Loaded::Template);
    }

    let mut record: T = serde_saphyr::from_str(&content)
        .with_context(|| format!("Failed to parse document at {}", path.display()))?;
    record.set_provenance(provenance_for(path));
    Ok(Loaded::Record(record))
}

pub fn provenance_for(path: &Path) -> Provenance {
    Provenance {
        filename: path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default(),
        filepath: path.to_path_buf(),
    }
}
