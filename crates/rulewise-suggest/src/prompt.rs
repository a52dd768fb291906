use rulewise_core::context::DOMAIN_CONTEXT;

use crate::engine::Prompt;

/// Sampling parameters and identity of one pipeline stage's prompt. Bump
/// `version` whenever the wording of a stage's system text changes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PromptTemplate {
    pub id: &'static str,
    pub version: u32,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
}

pub const PARSE: PromptTemplate = PromptTemplate {
    id: "parse",
    version: 1,
    temperature: 0.1,
    max_tokens: None,
};

pub const REFINE: PromptTemplate = PromptTemplate {
    id: "refine",
    version: 1,
    temperature: 0.3,
    max_tokens: Some(500),
};

pub const RECOMMEND: PromptTemplate = PromptTemplate {
    id: "recommend",
    version: 1,
    temperature: 0.3,
    max_tokens: Some(300),
};

pub const VALIDATE: PromptTemplate = PromptTemplate {
    id: "validate",
    version: 1,
    temperature: 0.3,
    max_tokens: Some(400),
};

pub const MODIFY: PromptTemplate = PromptTemplate {
    id: "modify",
    version: 1,
    temperature: 0.1,
    max_tokens: None,
};

pub const CHECK: PromptTemplate = PromptTemplate {
    id: "check",
    version: 1,
    temperature: 0.1,
    max_tokens: Some(50),
};

pub const ALL: [PromptTemplate; 6] = [PARSE, REFINE, RECOMMEND, VALIDATE, MODIFY, CHECK];

impl PromptTemplate {
    fn build(&self, system: String, user: String) -> Prompt {
        Prompt {
            template: self.id,
            version: self.version,
            system,
            user,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        }
    }
}

/// Render rules as a 1-based numbered list, the numbering conflicts refer to.
pub fn numbered(rules: &[String]) -> String {
    rules
        .iter()
        .enumerate()
        .map(|(i, r)| format!("{}. {}", i + 1, r))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn parse_prompt(rule: &str) -> Prompt {
    let system = format!(
        "{DOMAIN_CONTEXT}\n\n\
You are a business rules parser. Convert a natural-language business rule into structured JSON.\n\n\
Return a JSON object with exactly these fields:\n\
- \"condition\": the logical condition to check, as an expression (e.g. \"order_value > 100\")\n\
- \"action\": a snake_case action identifier (e.g. \"apply_discount\", \"send_alert\")\n\
- \"parameters\": an object of extracted parameters and their values\n\
- \"logic\": a tree {{\"if\": {{\"field\", \"operator\", \"value\"}} or {{\"and\": [...]}}, \"then\": {{\"action\", \"value\"}}}}\n\n\
Example 1\n\
Input: If order value is over $100, apply 10% discount\n\
Output: {{\"condition\":\"order_value > 100\",\"action\":\"apply_discount\",\
\"parameters\":{{\"threshold_amount\":100,\"discount_percentage\":10,\"currency\":\"USD\"}},\
\"logic\":{{\"if\":{{\"field\":\"order_value\",\"operator\":\">\",\"value\":100}},\
\"then\":{{\"action\":\"apply_discount\",\"value\":0.1}}}}}}\n\n\
Example 2\n\
Input: When stock for an item falls below 10 units, notify the purchasing team\n\
Output: {{\"condition\":\"inventory_count < 10\",\"action\":\"send_alert\",\
\"parameters\":{{\"threshold_amount\":10,\"recipient\":\"purchasing_team\"}},\
\"logic\":{{\"if\":{{\"field\":\"inventory_count\",\"operator\":\"<\",\"value\":10}},\
\"then\":{{\"action\":\"send_alert\",\"value\":\"purchasing_team\"}}}}}}\n\n\
Output ONLY the JSON object: no markdown, no code fences, no explanation."
    );
    PARSE.build(system, rule.to_string())
}

pub fn refine_prompt(rule: &str) -> Prompt {
    let system = format!(
        "{DOMAIN_CONTEXT}\n\n\
You are a business rules expert. Rewrite the user's rough rule into a clear, precise, \
implementation-ready rule.\n\n\
Goals:\n\
1. Make conditions specific and measurable.\n\
2. Give actions exact parameters.\n\
3. Add the constraints and edge cases an implementer would ask about.\n\
4. Remove ambiguity; use professional business language.\n\n\
Return a JSON object:\n\
{{\"improvedRule\": \"<refined rule>\", \"improvements\": [\"<change made>\", ...], \
\"reasoning\": \"<why these changes matter>\"}}\n\n\
Output ONLY the JSON object, nothing else."
    );
    let user = format!(
        "Refine this business rule so it can be implemented without follow-up questions:\n\n\"{rule}\""
    );
    REFINE.build(system, user)
}

pub fn recommend_prompt(rule: &str, existing: &[String]) -> Prompt {
    let system = format!(
        "{DOMAIN_CONTEXT}\n\n\
You are a business rules expert. Give 5 to 7 specific, actionable recommendations that would \
improve the given rule. Take the existing rules into account: point out overlaps, missing \
precedence, and gaps, but do not rewrite the other rules.\n\n\
Output ONLY a JSON array of strings, nothing else."
    );
    let context = if existing.is_empty() {
        "(none)".to_string()
    } else {
        numbered(existing)
    };
    let user = format!("Rule: \"{rule}\"\n\nExisting rules:\n{context}");
    RECOMMEND.build(system, user)
}

pub fn validate_prompt(rules: &[String]) -> Prompt {
    let system = format!(
        "{DOMAIN_CONTEXT}\n\n\
You validate a set of business rules as a whole. Look for:\n\
- Logical conflicts: two rules that can fire on the same input with incompatible actions.\n\
- Ambiguities: vague thresholds, undefined terms, unclear stacking or precedence.\n\n\
Refer to rules by their number (e.g. \"Rule 1 and Rule 3 ...\").\n\
Set \"valid\" to false when the set has conflicts or ambiguities that would block implementation.\n\n\
Return a JSON object: {{\"valid\": <bool>, \"conflicts\": [\"<conflict>\", ...], \
\"suggestions\": [\"<suggestion>\", ...]}}\n\n\
Output ONLY the JSON object, nothing else."
    );
    let user = format!("Rules:\n{}", numbered(rules));
    VALIDATE.build(system, user)
}

pub fn modify_prompt(instruction: &str, current: &str) -> Prompt {
    let system = "You modify business rules. Apply the instruction to the current rule and return \
only the modified rule as one plain-English sentence. No quotes, no explanation."
        .to_string();
    let user = format!("Instruction: {instruction}\nCurrent rule: {current}");
    MODIFY.build(system, user)
}

/// Smallest possible request, used to confirm the model answers at all.
pub fn check_prompt() -> Prompt {
    CHECK.build(
        "You are a helpful assistant. Respond with a simple confirmation.".to_string(),
        "Say 'AI connection successful' if you can see this message.".to_string(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_ids_are_unique() {
        let mut ids: Vec<_> = ALL.iter().map(|t| t.id).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), ALL.len());
    }

    #[test]
    fn parse_is_low_temperature() {
        let p = parse_prompt("If order value is over $100, apply 10% discount");
        assert_eq!(p.template, "parse");
        assert!(p.temperature <= 0.1);
        assert_eq!(p.user, "If order value is over $100, apply 10% discount");
        assert!(p.system.contains("\"condition\""));
        assert!(p.system.contains("Example 2"));
    }

    #[test]
    fn validate_numbers_rules_from_one() {
        let rules = vec!["rule A".to_string(), "rule B".to_string()];
        let p = validate_prompt(&rules);
        assert!(p.user.contains("1. rule A\n2. rule B"));
        assert_eq!(p.max_tokens, Some(400));
    }

    #[test]
    fn recommend_lists_context() {
        let p = recommend_prompt("new rule", &[]);
        assert!(p.user.contains("(none)"));
        let p = recommend_prompt("new rule", &["old rule".to_string()]);
        assert!(p.user.contains("1. old rule"));
        assert!(p.system.contains("JSON array"));
    }

    #[test]
    fn check_is_tiny() {
        let p = check_prompt();
        assert_eq!(p.template, "check");
        assert_eq!(p.max_tokens, Some(50));
        assert!(p.user.contains("AI connection successful"));
    }

    #[test]
    fn modify_carries_both_inputs() {
        let p = modify_prompt(
            "raise the threshold to $150",
            "If order is over $100, apply 10% discount",
        );
        assert!(p.user.starts_with("Instruction: raise the threshold to $150\n"));
        assert!(p.user.ends_with("If order is over $100, apply 10% discount"));
    }
}
