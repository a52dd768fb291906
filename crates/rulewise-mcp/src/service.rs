//! Stateful rule operations: store access plus pipeline analysis, ordered by
//! the analysis tracker. The store lock is never held across a model call.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Mutex;

use rulewise_core::stats::{self, RuleStats};
use rulewise_core::{
    check_weight, filter_rules, rule_texts, sibling_texts, CoreError, NewRule, Priority, Rule,
    RuleFilter, RuleStatus, RuleStore,
};
use rulewise_suggest::{AnalysisTracker, Pipeline, Revalidation, RuleAnalysis, RulePreview};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Core(#[from] CoreError),
    #[error("a newer analysis of '{0}' superseded this one")]
    Superseded(String),
    #[error("{0} cannot be empty")]
    EmptyInput(&'static str),
}

pub type Result<T> = std::result::Result<T, ServiceError>;

/// Input for a new rule.
#[derive(Debug, Clone, Default)]
pub struct RuleDraft {
    pub text: String,
    pub priority: Option<u8>,
    pub weight: Option<f64>,
    /// Groups repeated submissions from one editor so only the newest lands.
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct RuleEdit {
    pub text: Option<String>,
    pub priority: Option<u8>,
    pub weight: Option<f64>,
}

/// Listing narrowing as submitted by a client. Unset fields do not filter.
#[derive(Debug, Clone, Default)]
pub struct RuleSearch {
    pub query: Option<String>,
    pub priority: Option<u8>,
    pub status: Option<String>,
}

impl RuleSearch {
    pub fn is_empty(&self) -> bool {
        self.query.as_deref().map_or(true, |q| q.trim().is_empty())
            && self.priority.is_none()
            && self.status.is_none()
    }

    pub fn into_filter(self) -> Result<RuleFilter> {
        let priority = self.priority.map(Priority::try_from).transpose()?;
        let status = self
            .status
            .as_deref()
            .map(str::parse::<RuleStatus>)
            .transpose()?;
        Ok(RuleFilter {
            query: self.query,
            priority,
            status,
        })
    }
}

#[derive(Clone)]
pub struct RuleService {
    pipeline: Pipeline,
    store: Arc<Mutex<Box<dyn RuleStore>>>,
    tracker: Arc<AnalysisTracker>,
}

pub fn require<'a>(value: &'a str, what: &'static str) -> Result<&'a str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(ServiceError::EmptyInput(what))
    } else {
        Ok(trimmed)
    }
}

fn priority_or(value: Option<u8>, current: Priority) -> Result<Priority> {
    match value {
        Some(p) => Ok(Priority::try_from(p)?),
        None => Ok(current),
    }
}

fn weight_or(value: Option<f64>, current: f64) -> Result<f64> {
    match value {
        Some(w) => Ok(check_weight(w)?),
        None => Ok(current),
    }
}

impl RuleService {
    pub fn new(pipeline: Pipeline, store: Box<dyn RuleStore>) -> Self {
        Self {
            pipeline,
            store: Arc::new(Mutex::new(store)),
            tracker: Arc::new(AnalysisTracker::new()),
        }
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub async fn list(&self) -> Result<Vec<Rule>> {
        Ok(self.store.lock().await.list()?)
    }

    /// Stored rules matching `search`, in store order.
    pub async fn search(&self, search: RuleSearch) -> Result<Vec<Rule>> {
        let filter = search.into_filter()?;
        let rules = filter_rules(self.list().await?, &filter);
        tracing::debug!(matched = rules.len(), ?filter, "searched rules");
        Ok(rules)
    }

    pub async fn texts(&self) -> Result<Vec<String>> {
        Ok(rule_texts(&self.list().await?))
    }

    pub async fn get(&self, id: &str) -> Result<Rule> {
        self.store
            .lock()
            .await
            .get(id)?
            .ok_or_else(|| CoreError::NotFound(id.to_string()).into())
    }

    pub async fn stats(&self) -> Result<RuleStats> {
        Ok(stats::summarize(&self.list().await?))
    }

    /// Draft feedback against the stored rules. Nothing is persisted.
    pub async fn preview(&self, text: &str) -> Result<RulePreview> {
        let text = require(text, "rule text")?;
        let existing = self.texts().await?;
        Ok(self.pipeline.preview(text, &existing).await)
    }

    /// Analyze and store a new rule.
    pub async fn create(&self, draft: RuleDraft) -> Result<(Rule, RuleAnalysis)> {
        let text = require(&draft.text, "rule text")?.to_string();
        let priority = priority_or(draft.priority, Priority::default())?;
        let weight = weight_or(draft.weight, rulewise_core::DEFAULT_WEIGHT)?;

        let others = self.texts().await?;
        let ticket = draft.session_id.map(|s| self.tracker.begin(s));
        let analysis = self.pipeline.analyze(&text, &others, None).await;

        if let Some(ticket) = &ticket {
            if !self.tracker.is_current(ticket) {
                tracing::warn!(session = ticket.key(), "dropping superseded rule submission");
                return Err(ServiceError::Superseded(ticket.key().to_string()));
            }
        }

        let created = self.store.lock().await.create(NewRule {
            original: text,
            parsed: analysis.parsed.value.clone(),
            priority,
            weight,
            status: analysis.status,
            suggestions: analysis.suggestions.value.clone(),
        });
        if let Some(ticket) = &ticket {
            self.tracker.finish(ticket);
        }
        let rule = created?;
        tracing::info!(id = %rule.id, status = rule.status.as_str(), "created rule");
        Ok((rule, analysis))
    }

    /// Apply an edit. A changed text is re-analyzed against its siblings at
    /// its own position; priority or weight alone are stored directly.
    /// A newer edit supersedes this one, and this one supersedes any
    /// revalidation still running for the rule.
    pub async fn update(&self, id: &str, edit: RuleEdit) -> Result<(Rule, Option<RuleAnalysis>)> {
        let (rules, current) = {
            let store = self.store.lock().await;
            let current = store
                .get(id)?
                .ok_or_else(|| CoreError::NotFound(id.to_string()))?;
            (store.list()?, current)
        };
        let priority = priority_or(edit.priority, current.priority)?;
        let weight = weight_or(edit.weight, current.weight)?;

        let text = match &edit.text {
            Some(t) => Some(require(t, "rule text")?.to_string()),
            None => None,
        }
        .filter(|t| *t != current.original);

        let Some(text) = text else {
            let rule = self.store.lock().await.update(Rule {
                priority,
                weight,
                ..current
            })?;
            return Ok((rule, None));
        };

        let ticket = self.tracker.begin(id);
        self.tracker.forget(&revalidation_key(id));
        let position = rules.iter().position(|r| r.id == id);
        let others = sibling_texts(&rules, id);
        let analysis = self.pipeline.analyze(&text, &others, position).await;

        let Some(analysis) = self.tracker.accept(&ticket, analysis) else {
            return Err(ServiceError::Superseded(id.to_string()));
        };

        let stored = {
            let mut store = self.store.lock().await;
            store
                .get(id)
                .and_then(|r| r.ok_or_else(|| CoreError::NotFound(id.to_string())))
                .and_then(|latest| {
                    store.update(Rule {
                        original: text,
                        parsed: analysis.parsed.value.clone(),
                        priority,
                        weight,
                        status: analysis.status,
                        suggestions: analysis.suggestions.value.clone(),
                        ..latest
                    })
                })
        };
        self.tracker.finish(&ticket);
        let rule = stored?;
        tracing::info!(id, status = rule.status.as_str(), "updated rule");
        Ok((rule, Some(analysis)))
    }

    /// Re-run recommendation and validation for a stored rule and store the
    /// new status and suggestions. Gives way to any edit of the same rule:
    /// an edit in flight at the start or finish, or a stored text that changed
    /// meanwhile, turns this into [`ServiceError::Superseded`].
    pub async fn revalidate(&self, id: &str) -> Result<(Rule, Revalidation)> {
        let rules = self.list().await?;
        let index = rules
            .iter()
            .position(|r| r.id == id)
            .ok_or_else(|| CoreError::NotFound(id.to_string()))?;
        if self.tracker.in_flight(id) {
            tracing::info!(id, "edit in flight, skipping revalidation");
            return Err(ServiceError::Superseded(id.to_string()));
        }

        let ticket = self.tracker.begin(revalidation_key(id));
        let texts = rule_texts(&rules);
        let analysed = texts[index].clone();
        let Some(revalidation) = self.pipeline.revalidate(&texts, index).await else {
            self.tracker.finish(&ticket);
            return Err(CoreError::NotFound(id.to_string()).into());
        };
        let Some(revalidation) = self.tracker.accept(&ticket, revalidation) else {
            return Err(ServiceError::Superseded(id.to_string()));
        };

        let stored = {
            let mut store = self.store.lock().await;
            match store.get(id) {
                Ok(Some(latest)) if latest.original == analysed && !self.tracker.in_flight(id) => {
                    store
                        .update(Rule {
                            status: revalidation.status,
                            suggestions: revalidation.suggestions.value.clone(),
                            ..latest
                        })
                        .map_err(ServiceError::from)
                }
                Ok(Some(_)) => Err(ServiceError::Superseded(id.to_string())),
                Ok(None) => Err(CoreError::NotFound(id.to_string()).into()),
                Err(e) => Err(e.into()),
            }
        };
        self.tracker.finish(&ticket);
        if matches!(stored, Err(ServiceError::Superseded(_))) {
            tracing::warn!(id, "rule edited during revalidation, dropping result");
        }
        Ok((stored?, revalidation))
    }

    pub async fn delete(&self, id: &str) -> Result<()> {
        self.tracker.forget(id);
        self.tracker.forget(&revalidation_key(id));
        self.store.lock().await.delete(id)?;
        tracing::info!(id, "deleted rule");
        Ok(())
    }
}

/// Tracker key for revalidations, kept apart from edits so an edit can
/// supersede a revalidation but never the reverse.
fn revalidation_key(id: &str) -> String {
    format!("revalidate:{id}")
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use rulewise_core::MemoryStore;
    use rulewise_suggest::{GatewayError, ModelGateway, Prompt};

    use super::*;

    /// Answers per template; `delay_user` slows down prompts mentioning it.
    struct Scripted {
        validate: &'static str,
        delay_user: Option<&'static str>,
    }

    #[async_trait]
    impl ModelGateway for Scripted {
        fn is_configured(&self) -> bool {
            true
        }

        async fn complete(&self, prompt: &Prompt) -> std::result::Result<String, GatewayError> {
            if let Some(marker) = self.delay_user {
                if prompt.user.contains(marker) {
                    tokio::time::sleep(Duration::from_millis(150)).await;
                }
            }
            match prompt.template {
                "validate" => Ok(self.validate.to_string()),
                "recommend" => Ok(r#"["Cap the discount"]"#.to_string()),
                _ => Err(GatewayError::Request("not scripted".into())),
            }
        }
    }

    fn service(validate: &'static str) -> RuleService {
        let gateway = Scripted {
            validate,
            delay_user: None,
        };
        RuleService::new(Pipeline::new(Arc::new(gateway)), Box::new(MemoryStore::new()))
    }

    fn slow_service(marker: &'static str) -> RuleService {
        let gateway = Scripted {
            validate: r#"{"valid": true}"#,
            delay_user: Some(marker),
        };
        RuleService::new(Pipeline::new(Arc::new(gateway)), Box::new(MemoryStore::new()))
    }

    /// Reads work; every write fails, like a store whose file is unwritable.
    #[derive(Default)]
    struct ReadOnly(MemoryStore);

    impl RuleStore for ReadOnly {
        fn list(&self) -> std::result::Result<Vec<Rule>, CoreError> {
            self.0.list()
        }

        fn get(&self, id: &str) -> std::result::Result<Option<Rule>, CoreError> {
            self.0.get(id)
        }

        fn create(&mut self, _rule: NewRule) -> std::result::Result<Rule, CoreError> {
            Err(std::io::Error::other("read-only").into())
        }

        fn update(&mut self, _rule: Rule) -> std::result::Result<Rule, CoreError> {
            Err(std::io::Error::other("read-only").into())
        }

        fn delete(&mut self, _id: &str) -> std::result::Result<(), CoreError> {
            Err(std::io::Error::other("read-only").into())
        }
    }

    fn draft(text: &str) -> RuleDraft {
        RuleDraft {
            text: text.to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn create_stores_analysis() {
        let svc = service(r#"{"valid": false, "conflicts": [], "suggestions": ["Define VIP"]}"#);
        let (rule, analysis) = svc
            .create(draft("If customer is VIP, apply 15% discount"))
            .await
            .unwrap();
        assert_eq!(rule.status, RuleStatus::Warning);
        assert_eq!(rule.suggestions, vec!["Cap the discount"]);
        assert_eq!(rule.parsed.action, "apply_discount");
        assert!(analysis.parsed.is_degraded());
        assert_eq!(svc.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn create_rejects_bad_input_before_analysis() {
        let svc = service(r#"{"valid": true}"#);
        assert!(matches!(svc.create(draft("   ")).await, Err(ServiceError::EmptyInput(_))));
        let bad = RuleDraft {
            priority: Some(7),
            ..draft("If order is over $100, apply 10% discount")
        };
        assert!(matches!(
            svc.create(bad).await,
            Err(ServiceError::Core(CoreError::InvalidPriority(7)))
        ));
        assert!(svc.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn update_priority_only_keeps_analysis() {
        let svc = service(r#"{"valid": true}"#);
        let (rule, _) = svc
            .create(draft("If order is over $100, apply 10% discount"))
            .await
            .unwrap();
        let edit = RuleEdit {
            priority: Some(4),
            ..Default::default()
        };
        let (updated, analysis) = svc.update(&rule.id, edit).await.unwrap();
        assert!(analysis.is_none());
        assert_eq!(updated.priority, Priority::Critical);
        assert_eq!(updated.parsed, rule.parsed);
        assert_eq!(updated.created_at, rule.created_at);
    }

    #[tokio::test]
    async fn update_text_reanalyzes() {
        let svc = service(r#"{"valid": true, "conflicts": ["Rule 1 and Rule 2 overlap"]}"#);
        let (rule, _) = svc
            .create(draft("If order is over $100, apply 10% discount"))
            .await
            .unwrap();
        let edit = RuleEdit {
            text: Some("If order is over $200, apply 10% discount".into()),
            ..Default::default()
        };
        let (updated, analysis) = svc.update(&rule.id, edit).await.unwrap();
        assert!(analysis.is_some());
        assert_eq!(updated.status, RuleStatus::Error);
        assert_eq!(updated.parsed.condition, "order_value > 200");
    }

    #[tokio::test]
    async fn revalidate_and_delete() {
        let svc = service(r#"{"valid": true}"#);
        let (rule, _) = svc.create(draft("When stock is under 5, notify")).await.unwrap();
        let (after, rv) = svc.revalidate(&rule.id).await.unwrap();
        assert_eq!(rv.status, RuleStatus::Valid);
        assert_eq!(after.status, RuleStatus::Valid);

        svc.delete(&rule.id).await.unwrap();
        assert!(matches!(
            svc.get(&rule.id).await,
            Err(ServiceError::Core(CoreError::NotFound(_)))
        ));
        assert!(matches!(
            svc.revalidate(&rule.id).await,
            Err(ServiceError::Core(CoreError::NotFound(_)))
        ));
    }

    #[tokio::test]
    async fn older_edit_is_superseded() {
        let gateway = Scripted {
            validate: r#"{"valid": true}"#,
            delay_user: Some("slow edit"),
        };
        let svc = RuleService::new(Pipeline::new(Arc::new(gateway)), Box::new(MemoryStore::new()));
        let (rule, _) = svc
            .create(draft("If order is over $100, apply 10% discount"))
            .await
            .unwrap();

        let slow = {
            let svc = svc.clone();
            let id = rule.id.clone();
            tokio::spawn(async move {
                let edit = RuleEdit {
                    text: Some("If order is over $300, apply 10% discount slow edit".into()),
                    ..Default::default()
                };
                svc.update(&id, edit).await
            })
        };
        tokio::time::sleep(Duration::from_millis(30)).await;
        let edit = RuleEdit {
            text: Some("If order is over $400, apply 10% discount".into()),
            ..Default::default()
        };
        svc.update(&rule.id, edit).await.unwrap();

        assert!(matches!(slow.await.unwrap(), Err(ServiceError::Superseded(_))));
        let stored = svc.get(&rule.id).await.unwrap();
        assert_eq!(stored.original, "If order is over $400, apply 10% discount");
    }

    #[tokio::test]
    async fn revalidation_gives_way_to_edit_in_flight() {
        let svc = slow_service("slow edit");
        let (rule, _) = svc
            .create(draft("If order is over $100, apply 10% discount"))
            .await
            .unwrap();

        let edit = {
            let svc = svc.clone();
            let id = rule.id.clone();
            tokio::spawn(async move {
                let edit = RuleEdit {
                    text: Some("If order is over $300, apply 10% discount slow edit".into()),
                    ..Default::default()
                };
                svc.update(&id, edit).await
            })
        };
        tokio::time::sleep(Duration::from_millis(30)).await;
        let revalidated = svc.revalidate(&rule.id).await;

        assert!(matches!(revalidated, Err(ServiceError::Superseded(_))));
        let (edited, _) = edit.await.unwrap().unwrap();
        assert_eq!(edited.original, "If order is over $300, apply 10% discount slow edit");
        let stored = svc.get(&rule.id).await.unwrap();
        assert_eq!(stored.original, edited.original);
        assert_eq!(stored.parsed.condition, "order_value > 300");
    }

    #[tokio::test]
    async fn edit_supersedes_running_revalidation() {
        let svc = slow_service("slow check");
        let (rule, _) = svc
            .create(draft("If order is over $100, apply 10% discount slow check"))
            .await
            .unwrap();

        let check = {
            let svc = svc.clone();
            let id = rule.id.clone();
            tokio::spawn(async move { svc.revalidate(&id).await })
        };
        tokio::time::sleep(Duration::from_millis(30)).await;
        let edit = RuleEdit {
            text: Some("If order is over $250, apply 10% discount".into()),
            ..Default::default()
        };
        svc.update(&rule.id, edit).await.unwrap();

        assert!(matches!(check.await.unwrap(), Err(ServiceError::Superseded(_))));
        let stored = svc.get(&rule.id).await.unwrap();
        assert_eq!(stored.original, "If order is over $250, apply 10% discount");
    }

    #[tokio::test]
    async fn failed_write_releases_ticket() {
        let seeded = MemoryStore::from_rules(vec![]);
        let gateway = Scripted {
            validate: r#"{"valid": true}"#,
            delay_user: None,
        };
        let svc = RuleService::new(Pipeline::new(Arc::new(gateway)), Box::new(ReadOnly(seeded)));
        let submission = RuleDraft {
            session_id: Some("editor-1".into()),
            ..draft("If order is over $100, apply 10% discount")
        };
        assert!(matches!(
            svc.create(submission).await,
            Err(ServiceError::Core(CoreError::Io(_)))
        ));
        assert!(!svc.tracker.in_flight("editor-1"));
    }

    #[tokio::test]
    async fn failed_update_write_releases_ticket() {
        let mut seeded = MemoryStore::new();
        let rule = seeded
            .create(NewRule {
                original: "If order is over $100, apply 10% discount".into(),
                parsed: Default::default(),
                priority: Priority::Low,
                weight: 1.0,
                status: RuleStatus::Valid,
                suggestions: vec![],
            })
            .unwrap();
        let gateway = Scripted {
            validate: r#"{"valid": true}"#,
            delay_user: None,
        };
        let svc = RuleService::new(Pipeline::new(Arc::new(gateway)), Box::new(ReadOnly(seeded)));
        let edit = RuleEdit {
            text: Some("If order is over $200, apply 10% discount".into()),
            ..Default::default()
        };
        assert!(svc.update(&rule.id, edit).await.is_err());
        assert!(!svc.tracker.in_flight(&rule.id));
        assert!(svc.revalidate(&rule.id).await.is_err());
        assert!(!svc.tracker.in_flight(&revalidation_key(&rule.id)));
    }

    #[tokio::test]
    async fn search_narrows_listing() {
        let svc = service(r#"{"valid": true}"#);
        let discount = RuleDraft {
            priority: Some(3),
            ..draft("If order is over $100, apply 10% discount")
        };
        svc.create(discount).await.unwrap();
        svc.create(draft("When stock is under 5, notify")).await.unwrap();

        let all = svc.search(RuleSearch::default()).await.unwrap();
        assert_eq!(all.len(), 2);

        let found = svc
            .search(RuleSearch {
                query: Some("DISCOUNT".into()),
                priority: Some(3),
                status: Some("valid".into()),
            })
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].priority, Priority::High);

        let none = svc
            .search(RuleSearch {
                status: Some("error".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn search_rejects_unknown_filters() {
        let svc = service(r#"{"valid": true}"#);
        let bad_priority = RuleSearch {
            priority: Some(9),
            ..Default::default()
        };
        assert!(matches!(
            svc.search(bad_priority).await,
            Err(ServiceError::Core(CoreError::InvalidPriority(9)))
        ));
        let bad_status = RuleSearch {
            status: Some("pending".into()),
            ..Default::default()
        };
        assert!(matches!(
            svc.search(bad_status).await,
            Err(ServiceError::Core(CoreError::InvalidStatus(_)))
        ));
    }

    #[tokio::test]
    async fn stats_reflect_store() {
        let svc = service(r#"{"valid": true}"#);
        svc.create(draft("If order is over $100, apply 10% discount")).await.unwrap();
        let stats = svc.stats().await.unwrap();
        assert_eq!(stats.total, 1);
        assert_eq!(stats.success_rate, 100);
    }
}
