use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Skill declared by generalist workers; covers every family.
pub const GENERALIST_SKILL: &str = "ALL";

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkerId(pub String);

impl WorkerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for WorkerId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Presence reported by the worker app. Declaration order is ranking order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LiveStatus {
    Online,
    Busy,
    Offline,
}

impl fmt::Display for LiveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            LiveStatus::Online => "ONLINE",
            LiveStatus::Busy => "BUSY",
            LiveStatus::Offline => "OFFLINE",
        };
        write!(f, "{label}")
    }
}

/// Point-in-time view of a surveyor or installer as published by the
/// external worker directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerSnapshot {
    pub id: WorkerId,
    pub name: String,
    pub skill_categories: BTreeSet<String>,
    pub service_areas: BTreeSet<String>,
    pub live_status: LiveStatus,
    /// Only meaningful once merged with the engine's workload ledger.
    #[serde(default)]
    pub open_assignment_count: u32,
    /// Fraction of offers accepted historically, 0.0..=1.0.
    pub historical_accept_rate: f64,
    pub average_response_minutes: f64,
}

impl WorkerSnapshot {
    /// Whether this worker covers the skill family in the given area.
    /// Generalists cover every family.
    pub fn serves(&self, skill_family: &str, area: &str) -> bool {
        let family = normalize_key(skill_family);
        let generalist = normalize_key(GENERALIST_SKILL);
        let area = normalize_key(area);
        self.skill_categories.iter().any(|skill| {
            let skill = normalize_key(skill);
            skill == family || skill == generalist
        }) && self
                .service_areas
                .iter()
                .any(|served| normalize_key(served) == area)
    }
}

/// Order category → skill family. Categories without an entry are their
/// own family.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SkillAliases(BTreeMap<String, String>);

impl SkillAliases {
    pub fn new(aliases: impl IntoIterator<Item = (String, String)>) -> Self {
        Self(aliases.into_iter().collect())
    }

    /// Normalized skill family a worker needs for `category`.
    pub fn family(&self, category: &str) -> String {
        let category = normalize_key(category);
        self.0
            .iter()
            .find(|(alias, _)| normalize_key(alias) == category)
            .map(|(_, family)| normalize_key(family))
            .unwrap_or(category)
    }
}

impl Default for SkillAliases {
    fn default() -> Self {
        Self::new([
            ("curtain_fabric".to_string(), "curtain".to_string()),
            ("wall_fabric".to_string(), "wallcloth".to_string()),
        ])
    }
}

/// Normalization used for category and area matching: surrounding and
/// interior whitespace dropped, case folded.
pub fn normalize_key(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}
