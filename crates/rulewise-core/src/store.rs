use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use uuid::Uuid;

use crate::{check_weight, write_atomic, CoreError, ParsedRule, Priority, Rule, RuleStatus};

/// A rule before the store has assigned its id and timestamps.
#[derive(Debug, Clone)]
pub struct NewRule {
    pub original: String,
    pub parsed: ParsedRule,
    pub priority: Priority,
    pub weight: f64,
    pub status: RuleStatus,
    pub suggestions: Vec<String>,
}

/// Rule persistence. Rules keep insertion order; that order is the
/// numbering the cross-rule validator sees.
pub trait RuleStore: Send {
    fn list(&self) -> Result<Vec<Rule>, CoreError>;
    fn get(&self, id: &str) -> Result<Option<Rule>, CoreError>;
    fn create(&mut self, rule: NewRule) -> Result<Rule, CoreError>;
    /// Replace an existing rule. `created_at` is kept from the stored copy.
    fn update(&mut self, rule: Rule) -> Result<Rule, CoreError>;
    fn delete(&mut self, id: &str) -> Result<(), CoreError>;
}

fn check_text(text: &str) -> Result<(), CoreError> {
    if text.trim().is_empty() {
        Err(CoreError::EmptyRule)
    } else {
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    rules: Vec<Rule>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_rules(rules: Vec<Rule>) -> Self {
        Self { rules }
    }

    fn rules(&self) -> &[Rule] {
        &self.rules
    }
}

impl RuleStore for MemoryStore {
    fn list(&self) -> Result<Vec<Rule>, CoreError> {
        Ok(self.rules.clone())
    }

    fn get(&self, id: &str) -> Result<Option<Rule>, CoreError> {
        Ok(self.rules.iter().find(|r| r.id == id).cloned())
    }

    fn create(&mut self, rule: NewRule) -> Result<Rule, CoreError> {
        check_text(&rule.original)?;
        let weight = check_weight(rule.weight)?;
        let now = Utc::now();
        let created = Rule {
            id: Uuid::new_v4().to_string(),
            original: rule.original,
            parsed: rule.parsed,
            priority: rule.priority,
            weight,
            status: rule.status,
            suggestions: rule.suggestions,
            created_at: now,
            updated_at: now,
        };
        self.rules.push(created.clone());
        Ok(created)
    }

    fn update(&mut self, mut rule: Rule) -> Result<Rule, CoreError> {
        check_text(&rule.original)?;
        check_weight(rule.weight)?;
        let slot = self
            .rules
            .iter_mut()
            .find(|r| r.id == rule.id)
            .ok_or_else(|| CoreError::NotFound(rule.id.clone()))?;
        rule.created_at = slot.created_at;
        rule.updated_at = Utc::now();
        *slot = rule.clone();
        Ok(rule)
    }

    fn delete(&mut self, id: &str) -> Result<(), CoreError> {
        let index = self
            .rules
            .iter()
            .position(|r| r.id == id)
            .ok_or_else(|| CoreError::NotFound(id.to_string()))?;
        self.rules.remove(index);
        Ok(())
    }
}

/// JSON-file backend. Holds the rules in memory and writes the whole file
/// atomically after every mutation.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    inner: MemoryStore,
}

impl FileStore {
    /// Default location: `<data_dir>/rules.json`.
    pub fn default_path() -> PathBuf {
        crate::data_dir().join("rules.json")
    }

    /// Open (or lazily create) the store at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, CoreError> {
        let path = path.as_ref().to_path_buf();
        let rules: Vec<Rule> = if path.exists() {
            let raw = fs::read_to_string(&path)?;
            if raw.trim().is_empty() {
                vec![]
            } else {
                serde_json::from_str(&raw)?
            }
        } else {
            vec![]
        };
        tracing::debug!(path = %path.display(), count = rules.len(), "opened rule store");
        Ok(Self {
            path,
            inner: MemoryStore::from_rules(rules),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Apply `change` to a copy, persist the copy, then adopt it. A failed
    /// write leaves the in-memory rules untouched.
    fn commit<T>(
        &mut self,
        change: impl FnOnce(&mut MemoryStore) -> Result<T, CoreError>,
    ) -> Result<T, CoreError> {
        let mut next = self.inner.clone();
        let out = change(&mut next)?;
        let json = serde_json::to_string_pretty(next.rules())?;
        write_atomic(&self.path, &json)?;
        self.inner = next;
        Ok(out)
    }
}

impl RuleStore for FileStore {
    fn list(&self) -> Result<Vec<Rule>, CoreError> {
        self.inner.list()
    }

    fn get(&self, id: &str) -> Result<Option<Rule>, CoreError> {
        self.inner.get(id)
    }

    fn create(&mut self, rule: NewRule) -> Result<Rule, CoreError> {
        self.commit(|rules| rules.create(rule))
    }

    fn update(&mut self, rule: Rule) -> Result<Rule, CoreError> {
        self.commit(|rules| rules.update(rule))
    }

    fn delete(&mut self, id: &str) -> Result<(), CoreError> {
        self.commit(|rules| rules.delete(id))
    }
}
