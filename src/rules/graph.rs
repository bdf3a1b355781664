//! Rule dependency graph
//!
//! Each rule reads and writes a set of world facts. An edge `r1 -> r2`
//! exists when something `r1` can write is something `r2` reads, i.e. firing
//! `r1` may change whether `r2` fires. The graph is built once at load.

use crate::condition::{Condition, Expr, References, Value};
use crate::rules::action::{Action, Placement, TargetSelector};
use crate::world::catalog::EntityCatalog;
use crate::world::entity::{PropertyValue, BLOCKING_PROPERTY};
use std::collections::BTreeSet;

/// A piece of world state a rule can observe or change
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Fact {
    Property(String),
    /// Entity placement and cell occupancy
    Position,
    TypeTag,
    /// Which entities of a type exist
    Population(String),
}

pub type FactSet = BTreeSet<Fact>;

/// Facts an expression reads
pub fn expression_reads(refs: &References) -> FactSet {
    let mut facts: FactSet = refs
        .properties
        .iter()
        .map(|p| Fact::Property(p.clone()))
        .chain(refs.populations.iter().map(|t| Fact::Population(t.clone())))
        .collect();
    if refs.reads_position {
        facts.insert(Fact::Position);
    }
    if refs.reads_type_tag {
        facts.insert(Fact::TypeTag);
    }
    if refs.reads_heading {
        facts.insert(Fact::Property("dx".to_string()));
        facts.insert(Fact::Property("dy".to_string()));
    }
    facts
}

/// Facts an action reads to resolve its target and values
pub fn action_reads(action: &Action) -> FactSet {
    let mut facts = FactSet::new();
    for expr in action.expressions() {
        facts.extend(expression_reads(&expr.references()));
    }
    let target = match action {
        Action::Move { target, .. }
        | Action::Transform { target, .. }
        | Action::Destroy { target } => Some(target),
        Action::Validate { failure, .. } => {
            facts.extend(action_reads(failure));
            None
        }
        Action::Spawn {
            placement: Placement::RandomEmpty,
            ..
        } => {
            facts.insert(Fact::Position);
            None
        }
        Action::Spawn { .. } => None,
    };
    if let Some(TargetSelector::Adjacent(t)) = target {
        facts.insert(Fact::Population(t.clone()));
        facts.insert(Fact::Position);
    }
    facts
}

/// Facts an action may change
///
/// `subject_types` is the rule's applicable type set, `None` when it applies
/// to every entity; destroying or retyping "self" touches all of them.
pub fn action_writes(
    action: &Action,
    subject_types: Option<&BTreeSet<String>>,
    catalog: &EntityCatalog,
) -> FactSet {
    let mut facts = FactSet::new();
    let target_types = |target: &TargetSelector| -> Vec<String> {
        match target {
            TargetSelector::Adjacent(t) => vec![t.clone()],
            TargetSelector::SelfEntity => match subject_types {
                Some(types) => types.iter().cloned().collect(),
                None => catalog.types().map(str::to_string).collect(),
            },
        }
    };
    match action {
        Action::Move { .. } => {
            facts.insert(Fact::Position);
        }
        Action::Transform {
            target,
            effect,
            retype,
        } => {
            facts.extend(effect.keys().map(|k| Fact::Property(k.clone())));
            if effect.contains_key(BLOCKING_PROPERTY) {
                facts.insert(Fact::Position);
            }
            if retype.is_some() {
                facts.insert(Fact::TypeTag);
                facts.extend(target_types(target).into_iter().map(Fact::Population));
                if let Some(new_type) = literal_type(retype) {
                    facts.insert(Fact::Population(new_type));
                }
            }
        }
        Action::Spawn {
            entity_type,
            properties,
            ..
        } => {
            facts.insert(Fact::Population(entity_type.clone()));
            let blocking = !matches!(
                properties.get(BLOCKING_PROPERTY),
                Some(PropertyValue::Bool(false))
            );
            if blocking {
                facts.insert(Fact::Position);
            }
        }
        Action::Destroy { target } => {
            facts.insert(Fact::Position);
            facts.extend(target_types(target).into_iter().map(Fact::Population));
        }
        Action::Validate { failure, .. } => {
            facts.extend(action_writes(failure, subject_types, catalog));
        }
    }
    facts
}

/// Type name of a retype written as a string literal
pub fn literal_type(retype: &Option<Condition>) -> Option<String> {
    match retype.as_ref().map(|c| &c.expr) {
        Some(Expr::Literal(Value::Str(t))) => Some(t.clone()),
        _ => None,
    }
}

/// Directed graph over compiled rules, indexed by declaration order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleGraph {
    names: Vec<String>,
    edges: Vec<Vec<usize>>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Colour {
    White,
    Grey,
    Black,
}

impl RuleGraph {
    /// Build from `(name, reads, writes)` per rule
    pub fn build(nodes: &[(String, FactSet, FactSet)]) -> Self {
        let edges = nodes
            .iter()
            .map(|(_, _, writes)| {
                nodes
                    .iter()
                    .enumerate()
                    .filter(|(_, (_, reads, _))| !writes.is_disjoint(reads))
                    .map(|(j, _)| j)
                    .collect()
            })
            .collect();
        Self {
            names: nodes.iter().map(|(name, _, _)| name.clone()).collect(),
            edges,
        }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn name(&self, node: usize) -> Option<&str> {
        self.names.get(node).map(String::as_str)
    }

    pub fn successors(&self, node: usize) -> &[usize] {
        self.edges.get(node).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Whether firing `from` can affect the condition of `to`
    pub fn affects(&self, from: &str, to: &str) -> bool {
        let index = |name: &str| self.names.iter().position(|n| n == name);
        match (index(from), index(to)) {
            (Some(f), Some(t)) => self.edges[f].contains(&t),
            _ => false,
        }
    }

    /// First cycle within the subgraph of nodes accepted by `include`,
    /// as a path that starts and ends on the same node
    pub fn find_cycle(&self, include: impl Fn(usize) -> bool) -> Option<Vec<usize>> {
        let mut colour = vec![Colour::White; self.names.len()];
        let mut stack = Vec::new();
        for start in 0..self.names.len() {
            if include(start) && colour[start] == Colour::White {
                if let Some(cycle) = self.visit(start, &include, &mut colour, &mut stack) {
                    return Some(cycle);
                }
            }
        }
        None
    }

    fn visit(
        &self,
        node: usize,
        include: &impl Fn(usize) -> bool,
        colour: &mut [Colour],
        stack: &mut Vec<usize>,
    ) -> Option<Vec<usize>> {
        colour[node] = Colour::Grey;
        stack.push(node);
        for &next in &self.edges[node] {
            if !include(next) {
                continue;
            }
            match colour[next] {
                Colour::Grey => {
                    let from = stack.iter().position(|&n| n == next).unwrap_or(0);
                    let mut cycle = stack[from..].to_vec();
                    cycle.push(next);
                    return Some(cycle);
                }
                Colour::White => {
                    if let Some(cycle) = self.visit(next, include, colour, stack) {
                        return Some(cycle);
                    }
                }
                Colour::Black => {}
            }
        }
        stack.pop();
        colour[node] = Colour::Black;
        None
    }

    /// Node names for a path of indices
    pub fn names_of(&self, path: &[usize]) -> Vec<String> {
        path.iter()
            .filter_map(|&n| self.name(n).map(str::to_string))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn facts(list: &[Fact]) -> FactSet {
        list.iter().cloned().collect()
    }

    #[test]
    fn test_edges_follow_write_read_overlap() {
        let graph = RuleGraph::build(&[
            ("mover".into(), facts(&[]), facts(&[Fact::Position])),
            ("watcher".into(), facts(&[Fact::Position]), facts(&[])),
            ("counter".into(), facts(&[Fact::Property("moves".into())]), facts(&[])),
        ]);
        assert!(graph.affects("mover", "watcher"));
        assert!(!graph.affects("mover", "counter"));
        assert!(!graph.affects("watcher", "mover"));
        assert_eq!(graph.successors(0), &[1]);
    }

    #[test]
    fn test_cycle_reported_as_path() {
        let a = Fact::Property("a".into());
        let b = Fact::Property("b".into());
        let graph = RuleGraph::build(&[
            ("first".into(), facts(&[a.clone()]), facts(&[b.clone()])),
            ("second".into(), facts(&[b]), facts(&[a])),
        ]);
        let cycle = graph.find_cycle(|_| true).unwrap();
        assert_eq!(graph.names_of(&cycle), vec!["first", "second", "first"]);
        assert!(graph.find_cycle(|n| n == 0).is_none());
    }

    #[test]
    fn test_self_loop_is_a_cycle() {
        let graph = RuleGraph::build(&[(
            "loop".into(),
            facts(&[Fact::Position]),
            facts(&[Fact::Position]),
        )]);
        assert_eq!(graph.find_cycle(|_| true), Some(vec![0, 0]));
    }

    #[test]
    fn test_non_blocking_spawn_leaves_positions_alone() {
        use serde_json::json;
        let catalog = EntityCatalog::new();
        let marker = Action::parse(
            "spawn",
            json!({"type": "crash", "position": [1, 1], "properties": {"blocking": false}})
                .as_object()
                .unwrap(),
        )
        .unwrap();
        let writes = action_writes(&marker, None, &catalog);
        assert_eq!(writes, facts(&[Fact::Population("crash".into())]));

        let solid = Action::parse("spawn", json!({"type": "rock"}).as_object().unwrap()).unwrap();
        assert!(action_writes(&solid, None, &catalog).contains(&Fact::Position));
        assert!(action_reads(&solid).contains(&Fact::Position));
    }
}
