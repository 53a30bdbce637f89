//! Dependency graph validation and parallel wave scheduling.

use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::core::plan::Plan;

/// A dependency cycle was found; the plan is rejected with no partial schedule.
///
/// `cycle` is an ordered id sequence that returns to its starting task, e.g.
/// `["a", "b", "c", "a"]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleError {
    pub cycle: Vec<String>,
}

impl fmt::Display for CycleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "dependency cycle: {}", self.cycle.join(" -> "))
    }
}

impl std::error::Error for CycleError {}

/// Dependency relationships extracted from a plan.
///
/// Built once per plan and shared by the scheduler and the conflict detector.
/// Edges reference only ids present in the plan; unknown ids are reported by
/// plan validation and ignored here.
#[derive(Debug)]
pub struct DependencyGraph {
    /// Task ids in plan insertion order.
    order: Vec<String>,
    /// task id -> ids it depends on.
    depends_on: HashMap<String, Vec<String>>,
    /// task id -> ids that depend on it.
    dependents: HashMap<String, Vec<String>>,
}

impl DependencyGraph {
    pub fn from_plan(plan: &Plan) -> Self {
        let ids: HashSet<&str> = plan.tasks.iter().map(|task| task.id.as_str()).collect();
        let mut order = Vec::with_capacity(plan.tasks.len());
        let mut depends_on: HashMap<String, Vec<String>> = HashMap::new();
        let mut dependents: HashMap<String, Vec<String>> = HashMap::new();

        for task in &plan.tasks {
            order.push(task.id.clone());
            let deps: Vec<String> = task
                .depends_on
                .iter()
                .filter(|dep| ids.contains(dep.as_str()))
                .cloned()
                .collect();
            for dep in &deps {
                dependents
                    .entry(dep.clone())
                    .or_default()
                    .push(task.id.clone());
            }
            depends_on.insert(task.id.clone(), deps);
        }

        Self {
            order,
            depends_on,
            dependents,
        }
    }

    /// All ids `task_id` transitively depends on.
    pub fn transitive_dependencies(&self, task_id: &str) -> HashSet<String> {
        self.closure(task_id, &self.depends_on)
    }

    /// All ids that transitively depend on `task_id`.
    pub fn transitive_dependents(&self, task_id: &str) -> HashSet<String> {
        self.closure(task_id, &self.dependents)
    }

    /// True if a dependency path connects `a` and `b` in either direction.
    pub fn is_ordered(&self, a: &str, b: &str) -> bool {
        self.transitive_dependencies(a).contains(b)
            || self.transitive_dependencies(b).contains(a)
    }

    fn closure(&self, start: &str, edges: &HashMap<String, Vec<String>>) -> HashSet<String> {
        let mut visited = HashSet::new();
        let mut stack: Vec<&str> = edges
            .get(start)
            .map(|next| next.iter().map(String::as_str).collect())
            .unwrap_or_default();

        while let Some(current) = stack.pop() {
            if !visited.insert(current.to_string()) {
                continue;
            }
            if let Some(next) = edges.get(current) {
                stack.extend(next.iter().map(String::as_str));
            }
        }

        visited
    }
}

/// Compute parallel execution waves, or reject the plan on a cycle.
///
/// Each wave holds tasks whose dependencies are all in earlier waves, so
/// members of one wave can run concurrently. Within a wave, ids keep the
/// insertion order of the input plan, which keeps output stable across runs.
pub fn compute_waves(plan: &Plan) -> Result<Vec<Vec<String>>, CycleError> {
    let graph = DependencyGraph::from_plan(plan);
    compute_waves_from_graph(&graph)
}

/// Wave computation over an already-built graph.
pub fn compute_waves_from_graph(graph: &DependencyGraph) -> Result<Vec<Vec<String>>, CycleError> {
    let mut scheduled: HashSet<&str> = HashSet::new();
    let mut remaining: Vec<&str> = graph.order.iter().map(String::as_str).collect();
    let mut waves: Vec<Vec<String>> = Vec::new();

    while !remaining.is_empty() {
        let wave: Vec<&str> = remaining
            .iter()
            .copied()
            .filter(|id| {
                graph.depends_on[*id]
                    .iter()
                    .all(|dep| scheduled.contains(dep.as_str()))
            })
            .collect();

        if wave.is_empty() {
            // Stuck with unscheduled tasks: a cycle must exist among them.
            let cycle = find_cycle(graph).unwrap_or_else(|| {
                remaining.iter().map(|id| (*id).to_string()).collect()
            });
            return Err(CycleError { cycle });
        }

        for id in &wave {
            scheduled.insert(id);
        }
        remaining.retain(|id| !scheduled.contains(id));
        waves.push(wave.into_iter().map(str::to_string).collect());
    }

    Ok(waves)
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Color {
    White,
    Gray,
    Black,
}

/// DFS cycle search with white/gray/black coloring.
///
/// Returns the path along the first gray-to-gray back edge found, closed by
/// repeating the starting id.
pub fn find_cycle(graph: &DependencyGraph) -> Option<Vec<String>> {
    let mut color: HashMap<&str, Color> = graph
        .order
        .iter()
        .map(|id| (id.as_str(), Color::White))
        .collect();
    let mut parent: HashMap<&str, &str> = HashMap::new();

    for id in &graph.order {
        if color[id.as_str()] == Color::White {
            if let Some(cycle) = dfs(graph, id, &mut color, &mut parent) {
                return Some(cycle);
            }
        }
    }

    None
}

fn dfs<'a>(
    graph: &'a DependencyGraph,
    node: &'a str,
    color: &mut HashMap<&'a str, Color>,
    parent: &mut HashMap<&'a str, &'a str>,
) -> Option<Vec<String>> {
    color.insert(node, Color::Gray);

    for dep in &graph.depends_on[node] {
        match color[dep.as_str()] {
            Color::Gray => {
                // Back edge: walk parents from `node` up to `dep` to recover the path.
                let mut path = vec![node];
                let mut current = node;
                while current != dep.as_str() {
                    match parent.get(current) {
                        Some(prev) => {
                            path.push(prev);
                            current = prev;
                        }
                        None => break,
                    }
                }
                path.reverse();
                let mut cycle: Vec<String> = path.into_iter().map(str::to_string).collect();
                cycle.push(dep.clone());
                return Some(cycle);
            }
            Color::White => {
                parent.insert(dep.as_str(), node);
                if let Some(cycle) = dfs(graph, dep, color, parent) {
                    return Some(cycle);
                }
            }
            Color::Black => {}
        }
    }

    color.insert(node, Color::Black);
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::plan::Plan;
    use crate::test_support::{plan_of, task};

    fn wave_index(waves: &[Vec<String>], id: &str) -> usize {
        waves
            .iter()
            .position(|wave| wave.iter().any(|t| t == id))
            .expect("task missing from waves")
    }

    /// Independent tasks all land in the first wave, in insertion order.
    #[test]
    fn independent_tasks_share_one_wave() {
        let plan = plan_of(vec![task("b", &[]), task("a", &[]), task("c", &[])]);
        let waves = compute_waves(&plan).expect("waves");
        assert_eq!(waves, vec![vec!["b", "a", "c"]]);
    }

    /// Every task's wave index is strictly greater than the max wave index of
    /// its dependencies.
    #[test]
    fn wave_index_exceeds_all_dependency_indices() {
        let plan = plan_of(vec![
            task("a", &[]),
            task("b", &["a"]),
            task("c", &["a"]),
            task("d", &["b", "c"]),
            task("e", &[]),
        ]);
        let waves = compute_waves(&plan).expect("waves");

        let total: usize = waves.iter().map(Vec::len).sum();
        assert_eq!(total, plan.tasks.len());

        for t in &plan.tasks {
            for dep in &t.depends_on {
                assert!(wave_index(&waves, &t.id) > wave_index(&waves, dep));
            }
        }
    }

    /// A diamond schedules in three waves with the join last.
    #[test]
    fn diamond_schedules_in_three_waves() {
        let plan = plan_of(vec![
            task("root", &[]),
            task("left", &["root"]),
            task("right", &["root"]),
            task("join", &["left", "right"]),
        ]);
        let waves = compute_waves(&plan).expect("waves");
        assert_eq!(
            waves,
            vec![vec!["root"], vec!["left", "right"], vec!["join"]]
        );
    }

    /// A true cycle is a hard rejection; the reported id sequence walks back to
    /// its starting task.
    #[test]
    fn cycle_is_rejected_and_walks_back_to_start() {
        let plan = plan_of(vec![
            task("a", &["c"]),
            task("b", &["a"]),
            task("c", &["b"]),
            task("free", &[]),
        ]);
        let err = compute_waves(&plan).expect_err("expected cycle");

        assert!(err.cycle.len() >= 2);
        assert_eq!(err.cycle.first(), err.cycle.last());
        // Every edge of the reported walk is a real dependency edge.
        for pair in err.cycle.windows(2) {
            let from = plan.task(&pair[0]).expect("task");
            assert!(from.depends_on.contains(&pair[1]));
        }
    }

    /// A self-cycle is reported as a two-entry walk.
    #[test]
    fn self_cycle_is_detected() {
        let plan = plan_of(vec![task("a", &["a"])]);
        let err = compute_waves(&plan).expect_err("expected cycle");
        assert_eq!(err.cycle, vec!["a", "a"]);
    }

    /// Reachability covers transitive paths in both directions.
    #[test]
    fn is_ordered_follows_transitive_paths() {
        let plan = plan_of(vec![
            task("a", &[]),
            task("b", &["a"]),
            task("c", &["b"]),
            task("x", &[]),
        ]);
        let graph = DependencyGraph::from_plan(&plan);

        assert!(graph.is_ordered("a", "c"));
        assert!(graph.is_ordered("c", "a"));
        assert!(!graph.is_ordered("a", "x"));
        assert_eq!(
            graph.transitive_dependents("a"),
            ["b", "c"].iter().map(|s| s.to_string()).collect()
        );
    }

    /// Unknown dependency ids are ignored by the scheduler (plan validation
    /// reports them separately).
    #[test]
    fn unknown_dependencies_do_not_block_scheduling() {
        let plan = plan_of(vec![task("a", &["missing"])]);
        let waves = compute_waves(&plan).expect("waves");
        assert_eq!(waves, vec![vec!["a"]]);
    }

    /// An empty plan yields no waves.
    #[test]
    fn empty_plan_yields_no_waves() {
        let waves = compute_waves(&Plan::default()).expect("waves");
        assert!(waves.is_empty());
    }
}
