//! Rule and predicate definitions as written in documents

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleKind {
    #[default]
    Conditional,
    Transformation,
    Constraint,
}

impl std::fmt::Display for RuleKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            RuleKind::Conditional => "conditional",
            RuleKind::Transformation => "transformation",
            RuleKind::Constraint => "constraint",
        })
    }
}

fn always() -> String {
    "true".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WhenDef {
    #[serde(default = "always")]
    pub condition: String,
    /// Applicable entity types; empty for a global rule, `"any"` for all
    #[serde(default)]
    pub entities: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThenDef {
    pub action: String,
    #[serde(default)]
    pub parameters: Map<String, JsonValue>,
}

/// A rule before compilation
///
/// `priority` stays an untyped JSON value so the validator can report a
/// fractional or textual priority by rule name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleDef {
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: RuleKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<JsonValue>,
    pub when: WhenDef,
    pub then: ThenDef,
}

/// A victory or failure predicate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PredicateDef {
    pub condition: String,
    /// Non-empty: the predicate holds if any entity of these types satisfies it
    #[serde(default)]
    pub entities: Vec<String>,
    #[serde(default)]
    pub description: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_decodes() {
        let rule: RuleDef = serde_json::from_str(
            r#"{
                "name": "player_movement",
                "type": "conditional",
                "priority": 1,
                "when": {
                    "condition": "entity.type == 'player' && can_move_to(target_x, target_y)",
                    "entities": ["player"]
                },
                "then": {"action": "move", "parameters": {"position": ["target_x", "target_y"]}}
            }"#,
        )
        .unwrap();
        assert_eq!(rule.kind, RuleKind::Conditional);
        assert_eq!(rule.when.entities, vec!["player"]);
        assert!(rule.then.parameters.contains_key("position"));
    }

    #[test]
    fn test_defaults() {
        let rule: RuleDef = serde_json::from_str(
            r#"{"name": "tick", "when": {}, "then": {"action": "destroy"}}"#,
        )
        .unwrap();
        assert_eq!(rule.kind, RuleKind::Conditional);
        assert_eq!(rule.when.condition, "true");
        assert!(rule.priority.is_none());
    }

    #[test]
    fn test_unknown_kind_rejected() {
        let result: Result<RuleDef, _> = serde_json::from_str(
            r#"{"name": "r", "type": "reaction", "when": {}, "then": {"action": "move"}}"#,
        );
        assert!(result.is_err());
    }
}
