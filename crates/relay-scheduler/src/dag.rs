//! DAG resolution for pipeline jobs.
//!
//! Jobs are grouped into waves: wave *n* holds the jobs whose longest
//! dependency chain has length *n*. Every job of a wave may run as soon as
//! the previous wave is finished.

use petgraph::Direction;
use petgraph::algo::{tarjan_scc, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use relay_core::error::ConfigError;
use relay_core::ids::JobId;
use relay_core::pipeline::PipelineDefinition;
use std::collections::{HashMap, HashSet};

/// Directed graph over named nodes; an edge `a -> b` means `b` depends on `a`.
#[derive(Debug, Clone)]
pub(crate) struct NamedGraph {
    graph: DiGraph<String, ()>,
    index: HashMap<String, NodeIndex>,
}

impl NamedGraph {
    pub(crate) fn new<'a>(names: impl IntoIterator<Item = &'a str>) -> Self {
        let mut graph = DiGraph::new();
        let mut index = HashMap::new();
        for name in names {
            let idx = graph.add_node(name.to_string());
            index.insert(name.to_string(), idx);
        }
        Self { graph, index }
    }

    pub(crate) fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub(crate) fn add_dependency(&mut self, node: &str, depends_on: &str) {
        if let (Some(&from), Some(&to)) = (self.index.get(depends_on), self.index.get(node)) {
            self.graph.update_edge(from, to, ());
        }
    }

    /// One cycle, listed from its first declared member and closed back to it.
    pub(crate) fn find_cycle(&self) -> Option<Vec<String>> {
        let mut sccs: Vec<Vec<NodeIndex>> = tarjan_scc(&self.graph)
            .into_iter()
            .filter(|scc| scc.len() > 1 || self.graph.contains_edge(scc[0], scc[0]))
            .collect();
        for scc in &mut sccs {
            scc.sort();
        }
        sccs.sort();
        let scc = sccs.into_iter().next()?;

        let start = scc[0];
        let members: HashSet<NodeIndex> = scc.iter().copied().collect();
        let mut path = vec![start];
        let mut visited = HashSet::from([start]);
        self.walk_back(start, start, &members, &mut visited, &mut path);

        let mut names: Vec<String> = path.iter().map(|&i| self.graph[i].clone()).collect();
        names.push(self.graph[start].clone());
        Some(names)
    }

    fn walk_back(
        &self,
        start: NodeIndex,
        current: NodeIndex,
        members: &HashSet<NodeIndex>,
        visited: &mut HashSet<NodeIndex>,
        path: &mut Vec<NodeIndex>,
    ) -> bool {
        let mut deps: Vec<NodeIndex> = self
            .graph
            .neighbors_directed(current, Direction::Incoming)
            .filter(|d| members.contains(d))
            .collect();
        deps.sort();

        for dep in deps {
            if dep == start {
                return true;
            }
            if visited.insert(dep) {
                path.push(dep);
                if self.walk_back(start, dep, members, visited, path) {
                    return true;
                }
                path.pop();
            }
        }
        false
    }

    /// Longest-path levels, declaration order within a level. Acyclic only.
    pub(crate) fn levels(&self) -> Option<Vec<Vec<String>>> {
        let order = toposort(&self.graph, None).ok()?;
        let mut level: HashMap<NodeIndex, usize> = HashMap::new();
        for idx in &order {
            let l = self
                .graph
                .neighbors_directed(*idx, Direction::Incoming)
                .filter_map(|dep| level.get(&dep))
                .map(|l| l + 1)
                .max()
                .unwrap_or(0);
            level.insert(*idx, l);
        }

        let depth = level.values().copied().max().map(|m| m + 1).unwrap_or(0);
        let mut levels = vec![Vec::new(); depth];
        for idx in self.graph.node_indices() {
            if let Some(&l) = level.get(&idx) {
                levels[l].push(self.graph[idx].clone());
            }
        }
        Some(levels)
    }

    fn neighbors(&self, name: &str, direction: Direction) -> Vec<String> {
        let Some(&idx) = self.index.get(name) else {
            return Vec::new();
        };
        let mut found: Vec<NodeIndex> = self.graph.neighbors_directed(idx, direction).collect();
        found.sort();
        found.into_iter().map(|i| self.graph[i].clone()).collect()
    }
}

/// Validated dependency graph of one pipeline's jobs.
#[derive(Debug, Clone)]
pub struct JobGraph {
    graph: NamedGraph,
    waves: Vec<Vec<JobId>>,
}

impl JobGraph {
    /// Build and validate the graph for a pipeline definition.
    pub fn build(pipeline: &PipelineDefinition) -> Result<Self, ConfigError> {
        if pipeline.jobs.is_empty() {
            return Err(ConfigError::EmptyPipeline(pipeline.name.to_string()));
        }

        let mut seen = HashSet::new();
        for job in &pipeline.jobs {
            if !seen.insert(job.id.as_str()) {
                return Err(ConfigError::DuplicateJob {
                    pipeline: pipeline.name.to_string(),
                    job: job.id.to_string(),
                });
            }
        }

        let mut graph = NamedGraph::new(pipeline.jobs.iter().map(|j| j.id.as_str()));
        for job in &pipeline.jobs {
            for dep in &job.needs {
                if !graph.contains(dep.as_str()) {
                    return Err(ConfigError::UnknownDependency {
                        job: job.id.to_string(),
                        dependency: dep.to_string(),
                    });
                }
                graph.add_dependency(job.id.as_str(), dep.as_str());
            }
        }

        if let Some(cycle) = graph.find_cycle() {
            return Err(ConfigError::CycleDetected {
                scope: format!("pipeline '{}'", pipeline.name),
                cycle,
            });
        }

        let waves = graph
            .levels()
            .ok_or_else(|| ConfigError::InvalidDefinition(format!(
                "pipeline '{}' could not be ordered",
                pipeline.name
            )))?
            .into_iter()
            .map(|wave| wave.into_iter().map(JobId::from).collect())
            .collect();

        Ok(Self { graph, waves })
    }

    /// Jobs grouped into dependency waves.
    pub fn waves(&self) -> &[Vec<JobId>] {
        &self.waves
    }

    /// A valid topological order (waves flattened).
    pub fn topological_order(&self) -> Vec<JobId> {
        self.waves.iter().flatten().cloned().collect()
    }

    /// Jobs with no dependencies.
    pub fn roots(&self) -> Vec<JobId> {
        self.waves.first().cloned().unwrap_or_default()
    }

    /// Jobs `job` needs.
    pub fn dependencies(&self, job: &str) -> Vec<JobId> {
        self.graph
            .neighbors(job, Direction::Incoming)
            .into_iter()
            .map(JobId::from)
            .collect()
    }

    /// Jobs that need `job`.
    pub fn dependents(&self, job: &str) -> Vec<JobId> {
        self.graph
            .neighbors(job, Direction::Outgoing)
            .into_iter()
            .map(JobId::from)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.waves.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
