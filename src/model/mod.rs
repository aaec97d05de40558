use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// Per-document score contribution: league id -> contributor id -> points.
pub type Payload = BTreeMap<String, BTreeMap<String, f64>>;

/// Running cross-document aggregation. Same shape as a payload; built by
/// additive merge, so the final board is independent of document order.
pub type TallyBoard = Payload;

/// Where a loaded record came from. Injected by the document store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Provenance {
    /// File stem, e.g. "alice-smith" for athletes/alice-smith.yaml.
    /// Doubles as the record's identifier.
    pub filename: String,
    pub filepath: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Athlete {
    #[serde(default)]
    pub name: Option<String>,
    pub dob: NaiveDate,
    pub gender: String,
    #[serde(default)]
    pub team: Option<String>,
    #[serde(skip)]
    pub source: Provenance,
}

impl Athlete {
    pub fn id(&self) -> &str {
        &self.source.filename
    }
}

/// One competitor's line in a results document: a finish time for timed
/// events, or an ordered list of numeric sub-results for measured ones.
#[derive(Debug, Clone, Deserialize)]
pub struct ResultEntry {
    pub id: String,
    #[serde(default)]
    pub finish_time: Option<FinishTime>,
    #[serde(default)]
    pub results: Option<Vec<f64>>,
}

/// One event/race worth of results.
#[derive(Debug, Clone, Deserialize)]
pub struct ResultsDocument {
    #[serde(rename = "type")]
    pub result_type: String,
    pub date: NaiveDate,
    #[serde(default)]
    pub distance: Option<f64>,
    pub results: Vec<ResultEntry>,
    #[serde(skip)]
    pub source: Provenance,
}

/// A scoring category: eligibility rules plus per-result-type scoring
/// settings. All eligibility expressions must evaluate truthy.
#[derive(Debug, Clone, Deserialize)]
pub struct League {
    #[serde(default)]
    pub name: Option<String>,
    pub league_type: String,
    #[serde(default)]
    pub eligibility: Vec<String>,
    #[serde(default)]
    pub scoring: BTreeMap<String, ScoringSettings>,
    #[serde(skip)]
    pub source: Provenance,
}

impl League {
    pub fn id(&self) -> &str {
        &self.source.filename
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScoringSettings {
    pub method: String,
    pub sort_by: String,
    pub contributes_to: String,
    pub method_value: f64,
    /// Points deducted per place. Defaults to 1 when unset.
    #[serde(default)]
    pub method_decrement: Option<f64>,
}

impl ScoringSettings {
    pub fn decrement(&self) -> f64 {
        self.method_decrement.unwrap_or(1.0)
    }
}

/// Finish time with millisecond precision, totally ordered.
///
/// Accepted formats: "MM:SS", "HH:MM:SS", optionally with a fractional
/// seconds part ("20:01.5"). Always written quoted in YAML.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FinishTime(u64);

impl FinishTime {
    pub fn from_millis(millis: u64) -> Self {
        FinishTime(millis)
    }

    pub fn as_millis(&self) -> u64 {
        self.0
    }

    pub fn parse(s: &str) -> anyhow::Result<Self> {
        let parts: Vec<&str> = s.trim().split(':').collect();
        let (hours, minutes, seconds) = match parts.as_slice() {
            [m, s] => ("0", *m, *s),
            [h, m, s] => (*h, *m, *s),
            _ => anyhow::bail!("invalid finish time '{}': expected [HH:]MM:SS", s),
        };
        let hours: u64 = hours
            .parse()
            .map_err(|_| anyhow::anyhow!("invalid hours in finish time '{}'", s))?;
        let minutes: u64 = minutes
            .parse()
            .map_err(|_| anyhow::anyhow!("invalid minutes in finish time '{}'", s))?;
        let seconds: f64 = seconds
            .parse()
            .map_err(|_| anyhow::anyhow!("invalid seconds in finish time '{}'", s))?;
        if minutes >= 60 || !(0.0..60.0).contains(&seconds) {
            anyhow::bail!("finish time '{}' out of range", s);
        }
        let millis = (hours * 3600 + minutes * 60) * 1000 + (seconds * 1000.0).round() as u64;
        Ok(FinishTime(millis))
    }
}

impl fmt::Display for FinishTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let total_secs = self.0 / 1000;
        let millis = self.0 % 1000;
        let (h, m, s) = (total_secs / 3600, (total_secs / 60) % 60, total_secs % 60);
        if h > 0 {
            write!(f, "{}:{:02}:{:02}", h, m, s)?;
        } else {
            write!(f, "{}:{:02}", m, s)?;
        }
        if millis > 0 {
            write!(f, ".{:03}", millis)?;
        }
        Ok(())
    }
}

impl<'de> Deserialize<'de> for FinishTime {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        FinishTime::parse(&raw).map_err(serde::de::Error::custom)
    }
}

impl Serialize for FinishTime {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}
