//! Deadlock detection over the wait-for graph.
//!
//! Runs only after the whole run has gone quiet with no errors recorded, so
//! every wait still registered is permanently blocked. The graph is built
//! fresh from the registry:
//!
//! - one vertex per task that owns at least one pending wait (waits of the
//!   same task are merged, since they share every outgoing edge);
//! - an edge from `v` to `w` when `v`'s task holds a live dependency on
//!   `w`'s task, or a wait of `v` names `w`'s task as a blocker. A
//!   dependency on a task that owns no wait itself is followed through that
//!   task's own dependencies, so chains through intermediate tasks still
//!   connect.
//!
//! Tarjan's algorithm then splits the graph into strongly connected
//! components, each of which is streamed to a [`CycleSink`].

use crate::task::{Task, TaskId};
use crate::wait::{PendingWait, RegisteredWait, WaitId};
use rustc_hash::{FxHashMap, FxHashSet};
use std::fmt;
use std::sync::Arc;

/// Receives deadlock components one wait at a time.
pub trait CycleSink {
    /// A member of the current component.
    fn accept(&mut self, wait: &PendingWait);

    /// The current component is complete.
    fn finish(&mut self);
}

/// Every component found by one detection pass.
#[derive(Clone, Debug, Default)]
pub struct DeadlockReport {
    cycles: Vec<Vec<PendingWait>>,
    current: Vec<PendingWait>,
}

impl DeadlockReport {
    /// Components in discovery order, each listing its waits.
    pub fn cycles(&self) -> &[Vec<PendingWait>] {
        &self.cycles
    }

    /// Stream the report into another sink.
    pub fn replay(&self, sink: &mut dyn CycleSink) {
        for cycle in &self.cycles {
            for wait in cycle {
                sink.accept(wait);
            }
            sink.finish();
        }
    }

    /// The component containing a wait whose description contains `needle`.
    pub fn cycle_containing(&self, needle: &str) -> Option<&[PendingWait]> {
        self.cycles
            .iter()
            .find(|cycle| cycle.iter().any(|wait| wait.description.contains(needle)))
            .map(Vec::as_slice)
    }
}

impl CycleSink for DeadlockReport {
    fn accept(&mut self, wait: &PendingWait) {
        self.current.push(wait.clone());
    }

    fn finish(&mut self) {
        let cycle = std::mem::take(&mut self.current);
        self.cycles.push(cycle);
    }
}

impl fmt::Display for DeadlockReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, cycle) in self.cycles.iter().enumerate() {
            writeln!(f, "Circular evaluation detected (group {}):", index + 1)?;
            for wait in cycle {
                writeln!(f, "  {wait}")?;
                write!(f, "{}", wait.trace)?;
            }
        }
        Ok(())
    }
}

struct Vertex {
    owner: Arc<Task>,
    waits: Vec<PendingWait>,
}

/// Build the wait-for graph from the registry and stream its components.
pub(crate) fn detect(waits: &[(WaitId, &RegisteredWait)], sink: &mut dyn CycleSink) {
    let mut vertices: Vec<Vertex> = Vec::new();
    let mut vertex_of: FxHashMap<TaskId, usize> = FxHashMap::default();
    let mut blockers: Vec<Vec<Arc<Task>>> = Vec::new();

    for (id, wait) in waits {
        let index = *vertex_of.entry(wait.owner.id()).or_insert_with(|| {
            vertices.push(Vertex {
                owner: Arc::clone(&wait.owner),
                waits: Vec::new(),
            });
            blockers.push(Vec::new());
            vertices.len() - 1
        });
        vertices[index].waits.push(wait.snapshot(*id));
        blockers[index].extend(wait.site.blockers().into_iter().map(|handle| handle.0));
    }

    let successors: Vec<Vec<usize>> = vertices
        .iter()
        .zip(blockers)
        .map(|(vertex, blockers)| successors_of(vertex, blockers, &vertex_of))
        .collect();

    for component in strongly_connected(&successors) {
        for index in component {
            for wait in &vertices[index].waits {
                sink.accept(wait);
            }
        }
        sink.finish();
    }
}

fn successors_of(
    vertex: &Vertex,
    blockers: Vec<Arc<Task>>,
    vertex_of: &FxHashMap<TaskId, usize>,
) -> Vec<usize> {
    let mut pending: Vec<Arc<Task>> = blockers;
    pending.extend(vertex.owner.dependencies());
    let mut seen: FxHashSet<TaskId> = FxHashSet::default();
    let mut edges: Vec<usize> = Vec::new();
    while let Some(task) = pending.pop() {
        if !seen.insert(task.id()) {
            continue;
        }
        match vertex_of.get(&task.id()) {
            Some(&target) => edges.push(target),
            None => pending.extend(task.dependencies()),
        }
    }
    edges.sort_unstable();
    edges
}

/// Tarjan's strongly connected components over index adjacency lists.
///
/// Iterative, so arbitrarily long wait chains do not grow the native stack.
/// Components come out in reverse topological order; every vertex appears
/// in exactly one component.
pub fn strongly_connected(successors: &[Vec<usize>]) -> Vec<Vec<usize>> {
    const UNVISITED: usize = usize::MAX;

    let count = successors.len();
    let mut index = vec![UNVISITED; count];
    let mut lowlink = vec![0; count];
    let mut on_stack = vec![false; count];
    let mut stack: Vec<usize> = Vec::new();
    let mut components: Vec<Vec<usize>> = Vec::new();
    let mut next_index = 0;
    // (vertex, position of the next successor to explore)
    let mut calls: Vec<(usize, usize)> = Vec::new();

    for root in 0..count {
        if index[root] != UNVISITED {
            continue;
        }
        index[root] = next_index;
        lowlink[root] = next_index;
        next_index += 1;
        stack.push(root);
        on_stack[root] = true;
        calls.push((root, 0));

        while let Some(call) = calls.last_mut() {
            let vertex = call.0;
            if let Some(&target) = successors[vertex].get(call.1) {
                call.1 += 1;
                if index[target] == UNVISITED {
                    index[target] = next_index;
                    lowlink[target] = next_index;
                    next_index += 1;
                    stack.push(target);
                    on_stack[target] = true;
                    calls.push((target, 0));
                } else if on_stack[target] {
                    lowlink[vertex] = lowlink[vertex].min(index[target]);
                }
                continue;
            }

            calls.pop();
            if let Some(&(parent, _)) = calls.last() {
                lowlink[parent] = lowlink[parent].min(lowlink[vertex]);
            }
            if lowlink[vertex] == index[vertex] {
                let mut component = Vec::new();
                while let Some(member) = stack.pop() {
                    on_stack[member] = false;
                    component.push(member);
                    if member == vertex {
                        break;
                    }
                }
                components.push(component);
            }
        }
    }
    components
}

#[cfg(test)]
mod tests;
