use crate::error::{PlanError, Result};
use crate::planner::JobInstance;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

/// The job dependency DAG. Edges run from dependency to dependent, so a
/// topological order emits prerequisites first.
pub struct JobGraph {
    graph: DiGraph<String, ()>,
    node_map: HashMap<String, NodeIndex>,
}

impl JobGraph {
    pub fn build(jobs: &HashMap<String, JobInstance>) -> Self {
        let mut graph = DiGraph::new();
        let mut node_map = HashMap::new();

        let mut ids: Vec<&String> = jobs.keys().collect();
        ids.sort();
        for id in &ids {
            let idx = graph.add_node((*id).clone());
            node_map.insert((*id).clone(), idx);
        }

        for id in &ids {
            let job = &jobs[*id];
            let to = node_map[&job.id];
            for dep in &job.depends_on {
                // Unknown ids were already rejected by the planner.
                if let Some(&from) = node_map.get(dep) {
                    graph.add_edge(from, to, ());
                }
            }
        }

        JobGraph { graph, node_map }
    }

    pub fn job_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn contains_job(&self, id: &str) -> bool {
        self.node_map.contains_key(id)
    }

    /// Depth-first cycle check with the dual visited/on-stack marking.
    /// Reports the cycle as the chain of job ids that closes it.
    pub fn check_cycles(&self) -> Result<()> {
        let mut visited = vec![false; self.graph.node_count()];
        let mut on_stack = vec![false; self.graph.node_count()];
        let mut stack = Vec::new();

        let mut roots: Vec<NodeIndex> = self.graph.node_indices().collect();
        roots.sort_by(|a, b| self.graph[*a].cmp(&self.graph[*b]));

        for root in roots {
            if !visited[root.index()] {
                self.visit(root, &mut visited, &mut on_stack, &mut stack)?;
            }
        }
        Ok(())
    }

    fn visit(
        &self,
        node: NodeIndex,
        visited: &mut [bool],
        on_stack: &mut [bool],
        stack: &mut Vec<NodeIndex>,
    ) -> Result<()> {
        visited[node.index()] = true;
        on_stack[node.index()] = true;
        stack.push(node);

        for next in self.graph.neighbors_directed(node, Direction::Outgoing) {
            if on_stack[next.index()] {
                stack.push(next);
                return Err(PlanError::Cycle {
                    path: self.format_cycle(stack, next),
                });
            }
            if !visited[next.index()] {
                self.visit(next, visited, on_stack, stack)?;
            }
        }

        stack.pop();
        on_stack[node.index()] = false;
        Ok(())
    }

    fn format_cycle(&self, stack: &[NodeIndex], start: NodeIndex) -> String {
        let from = stack.iter().position(|&n| n == start).unwrap_or(0);
        stack[from..]
            .iter()
            .map(|&n| self.graph[n].as_str())
            .collect::<Vec<_>>()
            .join(" -> ")
    }

    /// Kahn's algorithm with lexicographic tie-breaking: among the jobs
    /// whose in-degree reaches zero, the smallest id is emitted first, so
    /// the plan is byte-stable across runs and hosts.
    pub fn topological_order(&self) -> Result<Vec<String>> {
        let mut in_degree: HashMap<NodeIndex, usize> = self
            .graph
            .node_indices()
            .map(|idx| {
                (
                    idx,
                    self.graph
                        .neighbors_directed(idx, Direction::Incoming)
                        .count(),
                )
            })
            .collect();

        let mut ready: BinaryHeap<Reverse<(&str, NodeIndex)>> = self
            .graph
            .node_indices()
            .filter(|idx| in_degree[idx] == 0)
            .map(|idx| Reverse((self.graph[idx].as_str(), idx)))
            .collect();

        let mut order = Vec::with_capacity(self.graph.node_count());
        while let Some(Reverse((id, idx))) = ready.pop() {
            order.push(id.to_string());
            for next in self.graph.neighbors_directed(idx, Direction::Outgoing) {
                let degree = in_degree.get_mut(&next).unwrap();
                *degree -= 1;
                if *degree == 0 {
                    ready.push(Reverse((self.graph[next].as_str(), next)));
                }
            }
        }

        // Unreachable after check_cycles, kept as defence in depth.
        if order.len() != self.graph.node_count() {
            return Err(PlanError::Cycle {
                path: format!(
                    "{} of {} jobs unreachable in topological order",
                    self.graph.node_count() - order.len(),
                    self.graph.node_count()
                ),
            });
        }

        Ok(order)
    }
}
