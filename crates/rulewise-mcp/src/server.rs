use rmcp::{
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::{CallToolResult, Content, ServerCapabilities, ServerInfo},
    tool, tool_handler, tool_router, ErrorData as McpError, ServerHandler,
};
use serde::{Deserialize, Serialize};

use rulewise_core::context::DOMAIN_CONTEXT;

use crate::service::{require, RuleDraft, RuleEdit, RuleSearch, RuleService, ServiceError};

// --- Request types ---

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct RuleTextRequest {
    /// Natural-language business rule, e.g. "If order value is over $100, apply 10% discount"
    rule: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct RecommendRequest {
    /// The rule to get recommendations for
    rule: String,
    /// Other rules to consider for overlaps. Defaults to every stored rule.
    existing_rules: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct ValidateRequest {
    /// Rule texts to check together, numbered 1..N in this order. Defaults to every stored rule.
    rules: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct ModifyRequest {
    /// Free-form edit, e.g. "raise the threshold to $150"
    instruction: String,
    /// Current rule text
    current_rule: String,
}

#[derive(Debug, Default, Deserialize, schemars::JsonSchema)]
struct ListRulesRequest {
    /// Case-insensitive text matched against the rule wording and its parsed form
    query: Option<String>,
    /// Only rules with this priority, 1 (Low) to 4 (Critical)
    priority: Option<u8>,
    /// Only rules with this status: valid, warning or error
    status: Option<String>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct RuleIdRequest {
    /// ID of the stored rule
    id: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct CreateRuleRequest {
    /// Natural-language rule text
    text: String,
    /// Priority 1 (Low) to 4 (Critical). Default 1.
    priority: Option<u8>,
    /// Weight between 0 and 10. Default 1.
    weight: Option<f64>,
    /// Editor session. When the same session submits again before this one finishes, only the newest submission is stored.
    session_id: Option<String>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct UpdateRuleRequest {
    /// ID of the rule to update
    id: String,
    /// New rule text. Triggers re-analysis against the other stored rules.
    text: Option<String>,
    /// New priority 1..4
    priority: Option<u8>,
    /// New weight 0..10
    weight: Option<f64>,
}

// --- Server ---

#[derive(Clone)]
pub struct RulewiseServer {
    service: RuleService,
    tool_router: ToolRouter<Self>,
}

fn json_result<T: Serialize>(value: &T) -> Result<CallToolResult, McpError> {
    match serde_json::to_string_pretty(value) {
        Ok(json) => Ok(CallToolResult::success(vec![Content::text(json)])),
        Err(e) => Ok(CallToolResult::error(vec![Content::text(format!(
            "Failed to serialize result: {}",
            e
        ))])),
    }
}

fn service_error(e: ServiceError) -> Result<CallToolResult, McpError> {
    Ok(CallToolResult::error(vec![Content::text(e.to_string())]))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Stored<R: Serialize, A: Serialize> {
    rule: R,
    analysis: A,
}

#[tool_router]
impl RulewiseServer {
    pub fn new(service: RuleService) -> Self {
        Self {
            service,
            tool_router: Self::tool_router(),
        }
    }

    #[tool(
        description = "Parse a natural-language business rule into {condition, action, parameters, logic}. The result carries an origin: {kind: model} or {kind: fallback, reason} when a local heuristic was used."
    )]
    async fn parse_rule(
        &self,
        Parameters(req): Parameters<RuleTextRequest>,
    ) -> Result<CallToolResult, McpError> {
        let rule = match require(&req.rule, "rule text") {
            Ok(r) => r,
            Err(e) => return service_error(e),
        };
        json_result(&self.service.pipeline().parse(rule).await)
    }

    #[tool(
        description = "Rewrite a rough rule into an implementation-ready one. Returns {originalRule, improvedRule, improvements, reasoning, isValid, validationMessage?}. Gibberish or incomplete input is rejected locally with isValid: false."
    )]
    async fn refine_rule(
        &self,
        Parameters(req): Parameters<RuleTextRequest>,
    ) -> Result<CallToolResult, McpError> {
        json_result(&self.service.pipeline().refine(&req.rule).await)
    }

    #[tool(description = "Get improvement suggestions for a rule as a non-empty list of strings.")]
    async fn recommend(
        &self,
        Parameters(req): Parameters<RecommendRequest>,
    ) -> Result<CallToolResult, McpError> {
        let rule = match require(&req.rule, "rule text") {
            Ok(r) => r,
            Err(e) => return service_error(e),
        };
        let existing = match req.existing_rules {
            Some(rules) => rules,
            None => match self.service.texts().await {
                Ok(t) => t,
                Err(e) => return service_error(e),
            },
        };
        json_result(&self.service.pipeline().recommend(rule, &existing).await)
    }

    #[tool(
        description = "Check a set of rules for conflicts and ambiguities. Returns {valid, conflicts, suggestions}. An empty set is always valid."
    )]
    async fn validate_rules(
        &self,
        Parameters(req): Parameters<ValidateRequest>,
    ) -> Result<CallToolResult, McpError> {
        let rules = match req.rules {
            Some(rules) => rules,
            None => match self.service.texts().await {
                Ok(t) => t,
                Err(e) => return service_error(e),
            },
        };
        json_result(&self.service.pipeline().validate(&rules).await)
    }

    #[tool(
        description = "Apply a free-form instruction to a rule and return the new text. On failure the current text is returned unchanged with a fallback origin."
    )]
    async fn modify_rule(
        &self,
        Parameters(req): Parameters<ModifyRequest>,
    ) -> Result<CallToolResult, McpError> {
        let instruction = match require(&req.instruction, "instruction") {
            Ok(i) => i,
            Err(e) => return service_error(e),
        };
        let current = match require(&req.current_rule, "current rule") {
            Ok(c) => c,
            Err(e) => return service_error(e),
        };
        json_result(&self.service.pipeline().modify(instruction, current).await)
    }

    #[tool(
        description = "Preview a draft rule against the stored rules without saving it: recommendations, set validation and refinement."
    )]
    async fn preview_rule(
        &self,
        Parameters(req): Parameters<RuleTextRequest>,
    ) -> Result<CallToolResult, McpError> {
        match self.service.preview(&req.rule).await {
            Ok(preview) => json_result(&preview),
            Err(e) => service_error(e),
        }
    }

    #[tool(
        description = "List stored rules in store order. Optional query, priority and status narrow the list; all given filters must match."
    )]
    async fn list_rules(
        &self,
        Parameters(req): Parameters<ListRulesRequest>,
    ) -> Result<CallToolResult, McpError> {
        let search = RuleSearch {
            query: req.query,
            priority: req.priority,
            status: req.status,
        };
        let filtered = !search.is_empty();
        match self.service.search(search).await {
            Ok(rules) if rules.is_empty() && filtered => Ok(CallToolResult::success(vec![
                Content::text("No rules match the given filters."),
            ])),
            Ok(rules) if rules.is_empty() => Ok(CallToolResult::success(vec![Content::text(
                "No rules stored. Use create_rule to add one.",
            )])),
            Ok(rules) => json_result(&rules),
            Err(e) => service_error(e),
        }
    }

    #[tool(description = "Get one stored rule by id")]
    async fn get_rule(
        &self,
        Parameters(req): Parameters<RuleIdRequest>,
    ) -> Result<CallToolResult, McpError> {
        match self.service.get(&req.id).await {
            Ok(rule) => json_result(&rule),
            Err(e) => service_error(e),
        }
    }

    #[tool(
        description = "Analyze and store a new rule. Parsing, recommendations and validation against the stored rules run concurrently; the rule's status is derived from the validation."
    )]
    async fn create_rule(
        &self,
        Parameters(req): Parameters<CreateRuleRequest>,
    ) -> Result<CallToolResult, McpError> {
        let draft = RuleDraft {
            text: req.text,
            priority: req.priority,
            weight: req.weight,
            session_id: req.session_id,
        };
        match self.service.create(draft).await {
            Ok((rule, analysis)) => json_result(&Stored { rule, analysis }),
            Err(e) => service_error(e),
        }
    }

    #[tool(
        description = "Update a stored rule. Changing the text re-analyzes it against the other rules; priority and weight changes are stored directly."
    )]
    async fn update_rule(
        &self,
        Parameters(req): Parameters<UpdateRuleRequest>,
    ) -> Result<CallToolResult, McpError> {
        let edit = RuleEdit {
            text: req.text,
            priority: req.priority,
            weight: req.weight,
        };
        match self.service.update(&req.id, edit).await {
            Ok((rule, analysis)) => json_result(&Stored { rule, analysis }),
            Err(e) => service_error(e),
        }
    }

    #[tool(description = "Delete a stored rule. Any analysis still running for it is discarded.")]
    async fn delete_rule(
        &self,
        Parameters(req): Parameters<RuleIdRequest>,
    ) -> Result<CallToolResult, McpError> {
        match self.service.delete(&req.id).await {
            Ok(()) => Ok(CallToolResult::success(vec![Content::text(format!(
                "Deleted rule '{}'",
                req.id
            ))])),
            Err(e) => service_error(e),
        }
    }

    #[tool(
        description = "Re-run recommendations and validation for a stored rule against the current rule set and store the new status."
    )]
    async fn revalidate_rule(
        &self,
        Parameters(req): Parameters<RuleIdRequest>,
    ) -> Result<CallToolResult, McpError> {
        match self.service.revalidate(&req.id).await {
            Ok((rule, revalidation)) => json_result(&Stored {
                rule,
                analysis: revalidation,
            }),
            Err(e) => service_error(e),
        }
    }

    #[tool(
        description = "Counts of stored rules by status and priority, plus the share of valid rules"
    )]
    async fn rule_stats(&self) -> Result<CallToolResult, McpError> {
        match self.service.stats().await {
            Ok(stats) => json_result(&stats),
            Err(e) => service_error(e),
        }
    }

    #[tool(
        description = "Check the AI connection: reports whether a model is configured, the provider and model, and the outcome of one tiny completion. Nothing is sent when no model is configured."
    )]
    async fn check_ai(&self) -> Result<CallToolResult, McpError> {
        json_result(&self.service.pipeline().check_connection().await)
    }

    #[tool(
        description = "Business rule writing guidance: domain conventions, field names and good rule shapes"
    )]
    fn get_guidance(&self) -> Result<CallToolResult, McpError> {
        Ok(CallToolResult::success(vec![Content::text(DOMAIN_CONTEXT)]))
    }
}

const INSTRUCTIONS: &str = r#"rulewise turns natural-language business rules into structured, validated rules.

## Workflow
1. Draft a rule in plain English ("If order value is over $100, apply 10% discount").
2. Use preview_rule or refine_rule to tighten it before saving.
3. Save it with create_rule. The response includes the parse, suggestions and a status: valid, warning (ambiguous) or error (conflicts with another rule).
4. Edit with update_rule or modify_rule; use revalidate_rule after other rules change.
5. Find rules with list_rules and its query, priority and status filters.

Run check_ai first if results keep coming back with a fallback origin.

## Origins
Every pipeline result carries an `origin`. `{kind: "fallback", reason}` means a local heuristic answered because the model was unconfigured, unavailable or returned something unusable. Flag those results for manual review.

## Rules
- Rule texts and instructions must be non-empty.
- Priority is 1 (Low) to 4 (Critical); weight is 0 to 10.
- Conflicts refer to rules by their 1-based position in the set."#;

#[tool_handler]
impl ServerHandler for RulewiseServer {
    fn get_info(&self) -> ServerInfo {
        let instructions = format!("{}\n\n## Domain\n{}", INSTRUCTIONS, DOMAIN_CONTEXT);
        ServerInfo {
            instructions: Some(instructions.into()),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}
