// src/dag/cycles.rs

//! Enumeration of every elementary cycle in a directed graph.
//!
//! Johnson's algorithm: for each start node `s` (in lexical order of task
//! names), restrict the graph to nodes not before `s`, take the strongly
//! connected part containing `s`, and enumerate circuits through `s` with
//! the blocked-set bookkeeping that keeps the search polynomial per cycle.

use std::collections::{BTreeSet, VecDeque};

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;

use crate::types::TaskName;

/// Every distinct elementary cycle of `graph`.
///
/// Each cycle starts at its lexically smallest task and ends with that task
/// again (`["a", "b", "a"]`). A self-loop is reported as `["a", "a"]`.
/// Parallel edges do not produce duplicate cycles. The result is sorted.
pub fn elementary_cycles<E>(graph: &DiGraph<TaskName, E>) -> Vec<Vec<TaskName>> {
    // Positions in lexical order so output is reproducible.
    let mut order: Vec<NodeIndex> = graph.node_indices().collect();
    order.sort_by(|a, b| graph[*a].cmp(&graph[*b]));

    let mut position = vec![0usize; graph.node_count()];
    for (pos, idx) in order.iter().enumerate() {
        position[idx.index()] = pos;
    }

    let n = order.len();
    let adjacency: Vec<Vec<usize>> = order
        .iter()
        .map(|&idx| {
            let targets: BTreeSet<usize> = graph
                .edges(idx)
                .map(|e| position[e.target().index()])
                .collect();
            targets.into_iter().collect()
        })
        .collect();

    let names: Vec<&str> = order.iter().map(|&idx| graph[idx].as_str()).collect();

    let mut search = CircuitSearch {
        adjacency: &adjacency,
        names: &names,
        in_component: vec![false; n],
        blocked: vec![false; n],
        blocked_by: vec![BTreeSet::new(); n],
        stack: Vec::new(),
        cycles: Vec::new(),
    };

    for start in 0..n {
        let component = component_containing(&adjacency, start);
        let has_cycle = component.len() > 1 || adjacency[start].contains(&start);
        if !has_cycle {
            continue;
        }

        for node in 0..n {
            search.in_component[node] = false;
            search.blocked[node] = false;
            search.blocked_by[node].clear();
        }
        for &node in &component {
            search.in_component[node] = true;
        }

        search.circuit(start, start);
    }

    let mut cycles = search.cycles;
    cycles.sort();
    cycles
}

/// Nodes `>= start` that are both reachable from `start` and reach it back,
/// using only nodes `>= start`.
fn component_containing(adjacency: &[Vec<usize>], start: usize) -> Vec<usize> {
    let n = adjacency.len();

    let forward = reachable(start, n, |v| adjacency[v].iter().copied().filter(|&w| w >= start).collect());

    let mut reverse: Vec<Vec<usize>> = vec![Vec::new(); n];
    for (v, targets) in adjacency.iter().enumerate().filter(|(v, _)| *v >= start) {
        for &w in targets.iter().filter(|&&w| w >= start) {
            reverse[w].push(v);
        }
    }
    let backward = reachable(start, n, |v| reverse[v].clone());

    (start..n).filter(|&v| forward[v] && backward[v]).collect()
}

fn reachable<F>(start: usize, n: usize, next: F) -> Vec<bool>
where
    F: Fn(usize) -> Vec<usize>,
{
    let mut seen = vec![false; n];
    let mut queue = VecDeque::from([start]);
    seen[start] = true;

    while let Some(v) = queue.pop_front() {
        for w in next(v) {
            if !seen[w] {
                seen[w] = true;
                queue.push_back(w);
            }
        }
    }
    seen
}

struct CircuitSearch<'a> {
    adjacency: &'a [Vec<usize>],
    names: &'a [&'a str],
    in_component: Vec<bool>,
    blocked: Vec<bool>,
    blocked_by: Vec<BTreeSet<usize>>,
    stack: Vec<usize>,
    cycles: Vec<Vec<TaskName>>,
}

impl CircuitSearch<'_> {
    fn circuit(&mut self, v: usize, start: usize) -> bool {
        let mut found = false;
        self.stack.push(v);
        self.blocked[v] = true;

        let successors: Vec<usize> = self.adjacency[v]
            .iter()
            .copied()
            .filter(|&w| self.in_component[w])
            .collect();

        for &w in &successors {
            if w == start {
                self.record_cycle(start);
                found = true;
            } else if !self.blocked[w] && self.circuit(w, start) {
                found = true;
            }
        }

        if found {
            self.unblock(v);
        } else {
            for w in successors {
                self.blocked_by[w].insert(v);
            }
        }

        self.stack.pop();
        found
    }

    fn unblock(&mut self, u: usize) {
        let mut pending = vec![u];
        while let Some(node) = pending.pop() {
            if !self.blocked[node] {
                continue;
            }
            self.blocked[node] = false;
            let waiting = std::mem::take(&mut self.blocked_by[node]);
            pending.extend(waiting.into_iter().filter(|&w| self.blocked[w]));
        }
    }

    fn record_cycle(&mut self, start: usize) {
        let mut cycle: Vec<TaskName> = self
            .stack
            .iter()
            .map(|&i| self.names[i].to_string())
            .collect();
        cycle.push(self.names[start].to_string());
        self.cycles.push(cycle);
    }
}
