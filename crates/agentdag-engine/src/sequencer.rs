use std::collections::{BTreeMap, BTreeSet, HashMap};

use agentdag_core::error::{DagError, Result};

use crate::graph::Graph;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    InProgress,
    Done,
}

/// Dependency-first ordering: every node appears after all of its children.
///
/// Iterative DFS with three-state marking, so deep chains never exhaust the
/// stack. Starts are visited in sorted id order, so the result is stable.
pub fn sort(graph: &Graph) -> Result<Vec<String>> {
    let mut marks: HashMap<&str, Mark> = HashMap::with_capacity(graph.len());
    let mut order = Vec::with_capacity(graph.len());

    for start in graph.ids() {
        if marks.contains_key(start) {
            continue;
        }
        marks.insert(start, Mark::InProgress);
        // (node, index of the next child to visit)
        let mut stack: Vec<(&str, usize)> = vec![(start, 0)];

        while let Some(frame) = stack.last_mut() {
            let node = frame.0;
            let children = graph.children(node);
            if frame.1 < children.len() {
                let child = children[frame.1].as_str();
                frame.1 += 1;
                match marks.get(child).copied() {
                    Some(Mark::Done) => {}
                    Some(Mark::InProgress) => {
                        return Err(DagError::Cycle(cycle_path(&stack, child)));
                    }
                    None => {
                        marks.insert(child, Mark::InProgress);
                        stack.push((child, 0));
                    }
                }
            } else {
                marks.insert(node, Mark::Done);
                order.push(node.to_string());
                stack.pop();
            }
        }
    }

    Ok(order)
}

fn cycle_path(stack: &[(&str, usize)], repeated: &str) -> String {
    let start = stack
        .iter()
        .position(|(id, _)| *id == repeated)
        .unwrap_or(0);
    let mut path: Vec<&str> = stack[start..].iter().map(|(id, _)| *id).collect();
    path.push(repeated);
    path.join(" -> ")
}

/// Group nodes into stages; every node's children live in earlier stages.
///
/// Informational only (used by `plan`); the executor does not run stage by
/// stage.
pub fn stages(graph: &Graph) -> Result<Vec<Vec<String>>> {
    let mut pending: BTreeMap<&str, usize> = graph
        .nodes()
        .map(|n| {
            let distinct: BTreeSet<&str> = n.children.iter().map(|c| c.as_str()).collect();
            (n.id.as_str(), distinct.len())
        })
        .collect();

    let mut current: Vec<&str> = pending
        .iter()
        .filter(|(_, deg)| **deg == 0)
        .map(|(id, _)| *id)
        .collect();
    let mut stages = Vec::new();
    let mut processed = 0;

    while !current.is_empty() {
        for id in &current {
            pending.remove(id);
        }
        processed += current.len();

        let mut next = Vec::new();
        for id in &current {
            for parent in graph.parents(id) {
                if let Some(deg) = pending.get_mut(parent.as_str()) {
                    *deg -= 1;
                    if *deg == 0 {
                        next.push(parent.as_str());
                    }
                }
            }
        }
        next.sort_unstable();
        next.dedup();

        stages.push(current.iter().map(|s| s.to_string()).collect());
        current = next;
    }

    if processed != graph.len() {
        let stuck: Vec<&str> = pending.keys().copied().collect();
        return Err(DagError::Cycle(stuck.join(", ")));
    }

    Ok(stages)
}
