//! End-to-end scenarios on the bundled documents
//!
//! - Sokoban: pushing both boxes onto goals wins on exactly that tick
//! - Snake: running into the wall fails and the head stays put
//! - Spawning at random_empty with one free cell is seed independent

use flatland::simulation::{SuppressionReason, PLAYER_INPUT_RULE};
use flatland::world::MutationKind;
use flatland::{load, EngineConfig, Simulation, TickOutcome};

const SOKOBAN: &str = include_str!("../data/documents/sokoban.json");
const SNAKE: &str = include_str!("../data/documents/snake.json");

#[test]
fn test_sokoban_victory_on_final_push() {
    let mut sim = load(SOKOBAN).unwrap();
    let inputs = ["left", "down", "up", "right", "right", "down"];

    for (i, input) in inputs.iter().enumerate() {
        let report = sim.submit_input(input).unwrap();
        assert_eq!(report.outcome, TickOutcome::Committed);
        let last = i == inputs.len() - 1;
        assert_eq!(
            report.victory, last,
            "victory should first hold on tick {}, got {} on tick {}",
            inputs.len(),
            report.victory,
            report.tick
        );
        assert!(!report.failure);
    }

    let state = sim.state();
    assert_eq!(state.tick(), 6);
    let player = state.entity(&"player".into()).unwrap();
    assert_eq!(player.position, flatland::core::Position::new(4, 3));
    assert_eq!(player.int_property("moves"), Some(6));
    for id in ["box1", "box2"] {
        let b = state.entity(&id.into()).unwrap();
        assert!(state.grid().is_goal(b.position), "{} not on a goal", id);
    }
}

#[test]
fn test_sokoban_push_moves_box_and_player_together() {
    let mut sim = load(SOKOBAN).unwrap();
    sim.submit_input("left").unwrap();
    let report = sim.submit_input("down").unwrap();

    let moved: Vec<_> = report
        .applied_mutations
        .iter()
        .filter(|m| m.mutation.kind() == MutationKind::Move)
        .map(|m| (m.rule.as_str(), m.mutation.entity_id.as_str()))
        .collect();
    assert_eq!(moved, vec![(PLAYER_INPUT_RULE, "player"), ("push_box", "box1")]);
}

#[test]
fn test_sokoban_wall_stops_push() {
    let mut sim = load(SOKOBAN).unwrap();
    // box2 sits at (4, 3); the first push takes it to (5, 3), the second
    // would put it in the east wall
    sim.submit_input("down").unwrap();
    sim.submit_input("right").unwrap();
    let report = sim.submit_input("right").unwrap();
    let box2 = report.new_snapshot.entity(&"box2".into()).unwrap();
    assert_eq!(box2.position, flatland::core::Position::new(5, 3));
    let player = report.new_snapshot.entity(&"player".into()).unwrap();
    assert_eq!(player.position, flatland::core::Position::new(4, 3));
    assert!(report
        .suppressed_by(PLAYER_INPUT_RULE)
        .any(|s| matches!(s.reason, SuppressionReason::InvalidMutation(_))));
}

#[test]
fn test_snake_hits_wall() {
    let mut sim = load(SNAKE).unwrap();
    for tick in 1..=3 {
        let report = sim.step().unwrap();
        assert!(!report.failure, "failure too early at tick {}", tick);
        let head = report.new_snapshot.entity(&"head".into()).unwrap();
        assert_eq!(head.position.y, 5 + tick);
    }

    let before = sim.state().clone();
    let report = sim.step().unwrap();
    assert_eq!(report.tick, 4);
    assert!(report.failure);
    assert!(!report.victory);

    let head_before = before.entity(&"head".into()).unwrap();
    let head_after = report.new_snapshot.entity(&"head".into()).unwrap();
    assert_eq!(head_before, head_after);
    assert!(report
        .applied_mutations
        .iter()
        .all(|m| m.mutation.entity_id.as_str() != "head"));
    assert!(report
        .suppressed_effects
        .iter()
        .any(|s| s.rule == "slither" && s.entity.as_ref().map(|e| e.as_str()) == Some("head")));
    assert_eq!(report.new_snapshot.entities_of_type("crash").count(), 1);
}

#[test]
fn test_snake_body_follows_head() {
    let mut sim = load(SNAKE).unwrap();
    let report = sim.step().unwrap();
    let y = |id: &str| report.new_snapshot.entity(&id.into()).unwrap().position.y;
    assert_eq!((y("head"), y("segment1"), y("segment2")), (6, 5, 4));
}

const ONE_FREE_CELL: &str = r#"{
    "grid": {"width": 3, "height": 3, "cells": [
        [1, 1, 1],
        [1, 0, 1],
        [1, 1, 1]
    ]},
    "rules": [
        {"name": "drop_coin",
         "when": {"condition": "count_entities('coin') == 0"},
         "then": {"action": "spawn", "parameters": {"type": "coin", "position": "random_empty"}}}
    ]
}"#;

#[test]
fn test_random_empty_with_one_free_cell() {
    for seed in [0, 1, 42, 9_999, u64::MAX] {
        let mut sim =
            Simulation::load_with_config(ONE_FREE_CELL, EngineConfig::default().with_seed(seed))
                .unwrap();
        let report = sim.step().unwrap();
        let coins: Vec<_> = report.new_snapshot.entities_of_type("coin").collect();
        assert_eq!(coins.len(), 1, "seed {}", seed);
        assert_eq!(coins[0].position, flatland::core::Position::new(1, 1));
        assert_eq!(coins[0].id.as_str(), "coin#0");
    }
}

#[test]
fn test_random_empty_with_no_free_cell_is_suppressed() {
    let always = ONE_FREE_CELL.replace("count_entities('coin') == 0", "true");
    let mut sim = load(&always).unwrap();
    sim.step().unwrap();
    // the first coin fills the only cell
    let report = sim.step().unwrap();
    assert!(report.applied_mutations.is_empty());
    assert_eq!(report.new_snapshot.len(), 1);
    match &report.suppressed_effects[..] {
        [effect] => {
            assert_eq!(effect.rule, "drop_coin");
            assert!(matches!(effect.reason, SuppressionReason::Unresolved(_)));
        }
        other => panic!("Expected one suppressed effect, got {:?}", other),
    }
}
