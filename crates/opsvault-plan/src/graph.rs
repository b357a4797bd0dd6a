//! Plan validation and dependency-ordered scheduling
//!
//! [`Plan::validate`] turns a bag of [`PhaseSpec`]s into an executable plan:
//! it rejects duplicates, unknown or self dependencies, and cycles (naming
//! the offending path), then fixes a deterministic topological order so the
//! same plan always executes the same way.

use crate::error::PlanError;
use crate::phase::{default_plan, PhaseSpec};
use petgraph::graphmap::DiGraphMap;
use petgraph::Direction;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

/// A validated, dependency-ordered recovery plan.
#[derive(Debug, Clone)]
pub struct Plan {
    phases: Vec<PhaseSpec>,
    order: Vec<usize>,
}

impl Plan {
    /// Validate a set of phases into an executable plan.
    ///
    /// The resulting order is topological with ties broken by declared
    /// execution order, then by id.
    ///
    /// # Errors
    /// See [`PlanError`] for each structural defect rejected here.
    pub fn validate(phases: Vec<PhaseSpec>) -> Result<Self, PlanError> {
        if phases.is_empty() {
            return Err(PlanError::EmptyPlan);
        }

        let mut index: HashMap<&str, usize> = HashMap::with_capacity(phases.len());
        for (i, phase) in phases.iter().enumerate() {
            if phase.retry_limit == 0 {
                return Err(PlanError::ZeroRetryLimit(phase.id.clone()));
            }
            if index.insert(phase.id.as_str(), i).is_some() {
                return Err(PlanError::DuplicatePhase(phase.id.clone()));
            }
        }

        let mut graph: DiGraphMap<usize, ()> = DiGraphMap::new();
        for i in 0..phases.len() {
            graph.add_node(i);
        }
        for (i, phase) in phases.iter().enumerate() {
            for dep in &phase.dependencies {
                if dep == &phase.id {
                    return Err(PlanError::SelfDependency(phase.id.clone()));
                }
                let Some(&d) = index.get(dep.as_str()) else {
                    return Err(PlanError::UnknownDependency {
                        phase: phase.id.clone(),
                        missing: dep.clone(),
                    });
                };
                graph.add_edge(d, i, ());
            }
        }

        let order = kahn_order(&graph, &phases)?;
        tracing::debug!(phases = phases.len(), "plan validated");
        Ok(Self { phases, order })
    }

    /// The built-in seven-phase plan. Infallible because the built-in plan
    /// is structurally valid by construction.
    #[must_use]
    pub fn builtin() -> Self {
        let phases = default_plan();
        let order = (0..phases.len()).collect();
        Self { phases, order }
    }

    /// Decode and validate a plan from a JSON array of phases.
    ///
    /// # Errors
    /// Decoding errors surface as [`PlanError::Malformed`]; structural
    /// defects as their own variants.
    pub fn from_json(json: &str) -> Result<Self, PlanError> {
        let phases: Vec<PhaseSpec> = serde_json::from_str(json)?;
        Self::validate(phases)
    }

    /// Phases in execution order.
    pub fn ordered(&self) -> impl Iterator<Item = &PhaseSpec> {
        self.order.iter().map(move |&i| &self.phases[i])
    }

    /// Look up a phase by id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&PhaseSpec> {
        self.phases.iter().find(|p| p.id == id)
    }

    /// All phases in declaration order.
    #[inline]
    #[must_use]
    pub fn phases(&self) -> &[PhaseSpec] {
        &self.phases
    }

    /// Number of phases.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.phases.len()
    }

    /// Whether the plan is empty. Always false for a validated plan.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.phases.is_empty()
    }

    /// Ids of phases that (transitively) depend on `id`, in execution order.
    /// These are the phases that must be skipped when `id` fails critically.
    #[must_use]
    pub fn dependents_of(&self, id: &str) -> Vec<String> {
        let mut tainted: Vec<&str> = vec![id];
        let mut out = Vec::new();
        for phase in self.ordered() {
            if phase.id == id {
                continue;
            }
            if phase.dependencies.iter().any(|d| tainted.contains(&d.as_str())) {
                tainted.push(phase.id.as_str());
                out.push(phase.id.clone());
            }
        }
        out
    }
}

/// Kahn's algorithm with a deterministic ready-set: among phases whose
/// dependencies are all satisfied, the lowest (execution_order, id) runs
/// first. A leftover node means a cycle; name it via DFS.
fn kahn_order(
    graph: &DiGraphMap<usize, ()>,
    phases: &[PhaseSpec],
) -> Result<Vec<usize>, PlanError> {
    let mut in_degree: Vec<usize> = (0..phases.len())
        .map(|i| graph.neighbors_directed(i, Direction::Incoming).count())
        .collect();

    let mut ready: BinaryHeap<Reverse<(u32, String, usize)>> = BinaryHeap::new();
    for (i, phase) in phases.iter().enumerate() {
        if in_degree[i] == 0 {
            ready.push(Reverse((phase.execution_order, phase.id.clone(), i)));
        }
    }

    let mut order = Vec::with_capacity(phases.len());
    while let Some(Reverse((_, _, i))) = ready.pop() {
        order.push(i);
        for next in graph.neighbors_directed(i, Direction::Outgoing) {
            in_degree[next] -= 1;
            if in_degree[next] == 0 {
                ready.push(Reverse((
                    phases[next].execution_order,
                    phases[next].id.clone(),
                    next,
                )));
            }
        }
    }

    if order.len() == phases.len() {
        return Ok(order);
    }

    let unordered: Vec<usize> = (0..phases.len()).filter(|i| !order.contains(i)).collect();
    let start = unordered.first().copied().unwrap_or(0);
    Err(PlanError::CyclicDependency { path: cycle_path(graph, phases, &unordered, start) })
}

/// Name a cycle among the unordered nodes. Every unordered node has at least
/// one unordered dependency, so walking backward through them must revisit a
/// node; the revisited segment, reversed into dependency order, is the cycle.
fn cycle_path(
    graph: &DiGraphMap<usize, ()>,
    phases: &[PhaseSpec],
    unordered: &[usize],
    start: usize,
) -> Vec<String> {
    let mut visited: Vec<usize> = Vec::new();
    let mut current = start;
    loop {
        if let Some(pos) = visited.iter().position(|&v| v == current) {
            let mut cycle: Vec<usize> = visited[pos..].to_vec();
            cycle.push(current);
            cycle.reverse();
            return cycle.into_iter().map(|i| phases[i].id.clone()).collect();
        }
        visited.push(current);
        match graph
            .neighbors_directed(current, Direction::Incoming)
            .filter(|n| unordered.contains(n))
            .min_by_key(|&n| phases[n].id.as_str())
        {
            Some(p) => current = p,
            None => return visited.into_iter().map(|i| phases[i].id.clone()).collect(),
        }
    }
}
