//! Conflict precedence between candidates targeting the same cell

use flatland::simulation::SuppressionReason;
use flatland::{load, Simulation};
use serde_json::json;

/// `go_east` moves the runner at (1, 0) east, `go_west` moves the runner at
/// (3, 0) west; both aim for (2, 0). Rules are declared in the given order.
fn race(rules: [(&str, i64); 2]) -> Simulation {
    let rules: Vec<_> = rules
        .iter()
        .map(|&(name, priority)| {
            let (entity_type, dx) = if name == "go_east" { ("runner_w", 1) } else { ("runner_e", -1) };
            json!({
                "name": name,
                "priority": priority,
                "when": {"condition": "true", "entities": [entity_type]},
                "then": {"action": "move", "parameters": {"position": [format!("entity.x + {}", dx), "entity.y"]}}
            })
        })
        .collect();
    let doc = json!({
        "grid": {"width": 5, "height": 1},
        "entities": [
            {"id": "west", "type": "runner_w", "position": [1, 0]},
            {"id": "east", "type": "runner_e", "position": [3, 0]}
        ],
        "rules": rules
    });
    load(&doc.to_string()).unwrap()
}

fn occupant(sim: &Simulation) -> String {
    sim.state()
        .entities()
        .find(|e| e.position.x == 2)
        .map(|e| e.id.to_string())
        .unwrap_or_default()
}

#[test]
fn test_higher_priority_wins_in_either_declaration_order() {
    for rules in [[("go_east", 1), ("go_west", 5)], [("go_west", 5), ("go_east", 1)]] {
        let mut sim = race(rules);
        let report = sim.step().unwrap();
        assert_eq!(occupant(&sim), "east");
        match &report.suppressed_effects[..] {
            [lost] => {
                assert_eq!(lost.rule, "go_east");
                assert_eq!(
                    lost.reason,
                    SuppressionReason::Conflict {
                        winner: "go_west".into()
                    }
                );
            }
            other => panic!("Expected one suppressed effect, got {:?}", other),
        }
    }
}

#[test]
fn test_equal_priority_resolved_by_declaration_order() {
    let mut sim = race([("go_east", 3), ("go_west", 3)]);
    sim.step().unwrap();
    assert_eq!(occupant(&sim), "west");

    let mut sim = race([("go_west", 3), ("go_east", 3)]);
    sim.step().unwrap();
    assert_eq!(occupant(&sim), "east");
}

#[test]
fn test_loser_proposes_again_next_tick() {
    let mut sim = race([("go_east", 1), ("go_west", 5)]);
    sim.step().unwrap();
    // west at (1, 0) and east at (2, 0) now trade cells
    let report = sim.step().unwrap();
    let rules: Vec<_> = report.applied_mutations.iter().map(|m| m.rule.as_str()).collect();
    assert_eq!(rules, vec!["go_west", "go_east"]);
    assert_eq!(occupant(&sim), "west");
}
