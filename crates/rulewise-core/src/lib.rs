pub mod context;
mod error;
pub mod search;
pub mod stats;
pub mod store;

pub use error::CoreError;
pub use search::{filter_rules, RuleFilter};
pub use store::{FileStore, MemoryStore, NewRule, RuleStore};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs;
use std::path::PathBuf;
use std::str::FromStr;

// --- Types ---

/// Importance level used for conflict resolution. Serialized as 1..=4.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Priority {
    #[default]
    Low = 1,
    Medium = 2,
    High = 3,
    Critical = 4,
}

impl Priority {
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Low => "Low",
            Self::Medium => "Medium",
            Self::High => "High",
            Self::Critical => "Critical",
        }
    }

    /// One step up, saturating at Critical.
    pub fn raise(self) -> Self {
        match self {
            Self::Low => Self::Medium,
            Self::Medium => Self::High,
            Self::High | Self::Critical => Self::Critical,
        }
    }

    /// One step down, saturating at Low.
    pub fn lower(self) -> Self {
        match self {
            Self::Critical => Self::High,
            Self::High => Self::Medium,
            Self::Medium | Self::Low => Self::Low,
        }
    }
}

impl TryFrom<u8> for Priority {
    type Error = CoreError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Low),
            2 => Ok(Self::Medium),
            3 => Ok(Self::High),
            4 => Ok(Self::Critical),
            other => Err(CoreError::InvalidPriority(other)),
        }
    }
}

impl From<Priority> for u8 {
    fn from(p: Priority) -> Self {
        p.as_u8()
    }
}

pub const MIN_WEIGHT: f64 = 0.0;
pub const MAX_WEIGHT: f64 = 10.0;
pub const DEFAULT_WEIGHT: f64 = 1.0;

/// Reject weights outside 0..=10 (and NaN).
pub fn check_weight(weight: f64) -> Result<f64, CoreError> {
    if weight.is_finite() && (MIN_WEIGHT..=MAX_WEIGHT).contains(&weight) {
        Ok(weight)
    } else {
        Err(CoreError::InvalidWeight(weight))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleStatus {
    Valid,
    Warning,
    Error,
}

impl RuleStatus {
    /// Conflicts win over the validity flag; the same derivation applies at
    /// creation, edit and revalidation time.
    pub fn from_validation(validation: &ValidationResult) -> Self {
        if !validation.conflicts.is_empty() {
            Self::Error
        } else if !validation.valid {
            Self::Warning
        } else {
            Self::Valid
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Valid => "valid",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }
}

impl FromStr for RuleStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "valid" => Ok(Self::Valid),
            "warning" => Ok(Self::Warning),
            "error" => Ok(Self::Error),
            _ => Err(CoreError::InvalidStatus(s.to_string())),
        }
    }
}

/// Structured form of a rule. `parameters` and `logic` are open bags: the
/// model may put anything there, so consumers must not assume a schema.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParsedRule {
    #[serde(default)]
    pub condition: String,
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub parameters: Map<String, Value>,
    #[serde(default)]
    pub logic: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleRefinement {
    pub original_rule: String,
    pub improved_rule: String,
    #[serde(default)]
    pub improvements: Vec<String>,
    #[serde(default)]
    pub reasoning: String,
    pub is_valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation_message: Option<String>,
}

impl RuleRefinement {
    /// A refinement for text that failed the local pre-check.
    pub fn rejected(original: &str, message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            original_rule: original.to_string(),
            improved_rule: original.to_string(),
            improvements: vec![],
            reasoning: message.clone(),
            is_valid: false,
            validation_message: Some(message),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    #[serde(default)]
    pub conflicts: Vec<String>,
    #[serde(default)]
    pub suggestions: Vec<String>,
}

impl ValidationResult {
    /// Valid, no conflicts, no suggestions.
    pub fn all_clear() -> Self {
        Self {
            valid: true,
            conflicts: vec![],
            suggestions: vec![],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rule {
    pub id: String,
    pub original: String,
    #[serde(default)]
    pub parsed: ParsedRule,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default = "default_weight")]
    pub weight: f64,
    pub status: RuleStatus,
    #[serde(default)]
    pub suggestions: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn default_weight() -> f64 {
    DEFAULT_WEIGHT
}

/// Texts of all rules in store order, the shape the validator consumes.
pub fn rule_texts(rules: &[Rule]) -> Vec<String> {
    rules.iter().map(|r| r.original.clone()).collect()
}

/// Texts of every rule except `id`, in store order.
pub fn sibling_texts(rules: &[Rule], id: &str) -> Vec<String> {
    rules
        .iter()
        .filter(|r| r.id != id)
        .map(|r| r.original.clone())
        .collect()
}

// --- Storage location ---

/// Resolve the data directory: `$RULEWISE_HOME`, else `~/.rulewise/`.
pub fn data_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os("RULEWISE_HOME") {
        return PathBuf::from(dir);
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".rulewise")
}

/// Write `data` to `path` via a temp file + rename so readers never see a
/// truncated file.
pub(crate) fn write_atomic(path: &std::path::Path, data: &str) -> Result<(), CoreError> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "rules.json".to_string());
    let tmp = path.with_file_name(format!(".{}.tmp", file_name));
    fs::write(&tmp, data)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

// --- AI Settings ---

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiSettings {
    #[serde(default)]
    pub provider: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub model: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for AiSettings {
    fn default() -> Self {
        Self {
            provider: String::new(),
            api_key: String::new(),
            model: String::new(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl AiSettings {
    /// Overlay values from the environment. `lookup` is `std::env::var` in
    /// production; tests pass a closure.
    pub fn with_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(provider) = non_empty("RULEWISE_AI_PROVIDER") {
            self.provider = provider;
        }
        if let Some(model) = non_empty("RULEWISE_AI_MODEL") {
            self.model = model;
        }
        if let Some(key) = non_empty("RULEWISE_AI_API_KEY").or_else(|| non_empty("AI_API_KEY")) {
            self.api_key = key;
        }
        if let Some(secs) =
            non_empty("RULEWISE_AI_TIMEOUT_SECS").and_then(|v| v.trim().parse().ok())
        {
            self.timeout_secs = secs;
        }
        self
    }
}

fn settings_path() -> PathBuf {
    data_dir().join("settings.json")
}

/// Settings file merged with environment overrides. A missing or unreadable
/// file yields defaults.
pub fn read_settings() -> AiSettings {
    let path = settings_path();
    let from_file = if path.exists() {
        match fs::read_to_string(&path).map(|s| serde_json::from_str::<AiSettings>(&s)) {
            Ok(Ok(settings)) => settings,
            Ok(Err(e)) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "ignoring malformed settings file"
                );
                AiSettings::default()
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "cannot read settings file");
                AiSettings::default()
            }
        }
    } else {
        AiSettings::default()
    };
    from_file.with_overrides(|key| std::env::var(key).ok())
}

pub fn write_settings(settings: &AiSettings) -> Result<(), CoreError> {
    let json = serde_json::to_string_pretty(settings)?;
    write_atomic(&settings_path(), &json)
}

/// A credential is required for every provider except a local ollama.
pub fn ai_configured(settings: &AiSettings) -> bool {
    !settings.provider.is_empty()
        && !settings.model.is_empty()
        && (settings.provider == "ollama" || !settings.api_key.is_empty())
}
