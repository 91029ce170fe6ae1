//! File-ownership planning.
//!
//! Partitions work items into phases so that no two items touching the same
//! file, and no item and one of its dependencies, ever share a phase. Items in
//! one phase can therefore be in flight at the same time without a runtime
//! lock.

use std::collections::{BTreeSet, HashMap, HashSet};

use handoff_core::{ExecutionPlan, Phase, WorkItem};
use tracing::debug;

use crate::error::PlanningError;

pub struct FileOwnershipPlanner;

impl FileOwnershipPlanner {
    /// Derive an execution plan from `items`.
    ///
    /// Each item lands in the earliest phase after all of its dependencies
    /// that holds no other item sharing one of its files. Items are visited
    /// in topological order, breaking ties by input position, and each phase
    /// lists its items in input order, so the result is fully deterministic.
    /// Items with identical file sets and no declared dependency still
    /// conflict and run one after the other.
    pub fn plan(items: &[WorkItem]) -> Result<ExecutionPlan, PlanningError> {
        let index = Self::index_items(items)?;
        let deps = Self::resolve_dependencies(items, &index)?;
        let order = Self::topological_order(items, &deps)?;

        let files: Vec<HashSet<String>> = items
            .iter()
            .map(|item| item.normalized_files().into_iter().collect())
            .collect();

        let mut phase_of = vec![0usize; items.len()];
        let mut phase_files: Vec<HashSet<String>> = Vec::new();
        let mut phase_members: Vec<Vec<usize>> = Vec::new();

        for i in order {
            let mut phase = deps[i]
                .iter()
                .map(|&d| phase_of[d] + 1)
                .max()
                .unwrap_or(0);

            while phase < phase_files.len() && !phase_files[phase].is_disjoint(&files[i]) {
                phase += 1;
            }

            if phase == phase_files.len() {
                phase_files.push(HashSet::new());
                phase_members.push(Vec::new());
            }

            phase_files[phase].extend(files[i].iter().cloned());
            phase_members[phase].push(i);
            phase_of[i] = phase;
        }

        let phases = phase_members
            .into_iter()
            .enumerate()
            .map(|(n, mut members)| {
                members.sort_unstable();
                Phase {
                    number: n as u32 + 1,
                    items: members
                        .into_iter()
                        .map(|i| {
                            let mut item = items[i].clone();
                            item.files = item.normalized_files();
                            item
                        })
                        .collect(),
                }
            })
            .collect::<Vec<_>>();

        debug!(
            items = items.len(),
            phases = phases.len(),
            "Execution plan derived"
        );

        Ok(ExecutionPlan { phases })
    }

    /// Whether two items may never run in the same phase.
    pub fn conflicts(a: &WorkItem, b: &WorkItem) -> bool {
        if a.depends_on.contains(&b.id) || b.depends_on.contains(&a.id) {
            return true;
        }
        let a_files: HashSet<String> = a.normalized_files().into_iter().collect();
        b.normalized_files().iter().any(|f| a_files.contains(f))
    }

    fn index_items(items: &[WorkItem]) -> Result<HashMap<&str, usize>, PlanningError> {
        let mut index = HashMap::with_capacity(items.len());
        for (i, item) in items.iter().enumerate() {
            if index.insert(item.id.as_str(), i).is_some() {
                return Err(PlanningError {
                    reason: format!("duplicate work item id {}", item.id),
                    items: vec![item.id.clone()],
                });
            }
        }
        Ok(index)
    }

    fn resolve_dependencies(
        items: &[WorkItem],
        index: &HashMap<&str, usize>,
    ) -> Result<Vec<Vec<usize>>, PlanningError> {
        items
            .iter()
            .enumerate()
            .map(|(i, item)| {
                let mut resolved = BTreeSet::new();
                for dep in &item.depends_on {
                    let &d = index.get(dep.as_str()).ok_or_else(|| PlanningError {
                        reason: format!("work item {} depends on unknown item {}", item.id, dep),
                        items: vec![item.id.clone()],
                    })?;
                    if d == i {
                        return Err(PlanningError::unsatisfiable(vec![item.id.clone()]));
                    }
                    resolved.insert(d);
                }
                Ok(resolved.into_iter().collect())
            })
            .collect()
    }

    /// Kahn's algorithm, always taking the earliest ready item.
    fn topological_order(
        items: &[WorkItem],
        deps: &[Vec<usize>],
    ) -> Result<Vec<usize>, PlanningError> {
        let mut remaining: Vec<usize> = deps.iter().map(Vec::len).collect();
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); items.len()];
        for (i, ds) in deps.iter().enumerate() {
            for &d in ds {
                dependents[d].push(i);
            }
        }

        let mut ready: BTreeSet<usize> = (0..items.len()).filter(|&i| remaining[i] == 0).collect();
        let mut order = Vec::with_capacity(items.len());

        while let Some(i) = ready.pop_first() {
            order.push(i);
            for &dependent in &dependents[i] {
                remaining[dependent] -= 1;
                if remaining[dependent] == 0 {
                    ready.insert(dependent);
                }
            }
        }

        if order.len() < items.len() {
            let stuck = (0..items.len())
                .filter(|&i| remaining[i] > 0)
                .map(|i| items[i].id.clone())
                .collect();
            return Err(PlanningError::unsatisfiable(stuck));
        }

        Ok(order)
    }
}
