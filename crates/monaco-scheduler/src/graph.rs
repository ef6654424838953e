//! Per-environment dependency graph over configs.

use monaco_config::Config;
use monaco_core::{Coordinate, DeployError, Result};
use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet, BinaryHeap, HashMap};

/// Directed graph with an edge from every referenced config to the config referencing it.
///
/// Nodes are kept in lexical coordinate order, which makes the deployment
/// order independent of input order.
#[derive(Debug)]
pub struct DependencyGraph<'a> {
    environment: String,
    configs: Vec<&'a Config>,
    index: HashMap<&'a Coordinate, usize>,
    /// node -> nodes that must be deployed first
    dependencies: Vec<BTreeSet<usize>>,
    /// node -> nodes waiting on it
    dependents: Vec<BTreeSet<usize>>,
}

/// Deployment order of one environment plus the configs that cannot be scheduled.
#[derive(Debug)]
pub struct Schedule<'a> {
    pub order: Vec<&'a Config>,
    pub errors: Vec<DeployError>,
}

impl<'a> DependencyGraph<'a> {
    /// Build the graph for one environment's configs.
    ///
    /// References to coordinates outside `configs` do not produce edges.
    pub fn build(
        environment: impl Into<String>,
        configs: impl IntoIterator<Item = &'a Config>,
    ) -> Result<Self> {
        let mut sorted: Vec<&'a Config> = configs.into_iter().collect();
        sorted.sort_by(|a, b| a.coordinate.cmp(&b.coordinate));

        let mut index = HashMap::with_capacity(sorted.len());
        for (i, config) in sorted.iter().copied().enumerate() {
            if index.insert(&config.coordinate, i).is_some() {
                return Err(DeployError::Internal {
                    coordinate: config.coordinate.clone(),
                    message: "coordinate appears twice in one environment".to_string(),
                });
            }
        }

        let mut dependencies = vec![BTreeSet::new(); sorted.len()];
        let mut dependents = vec![BTreeSet::new(); sorted.len()];
        for (source, config) in sorted.iter().enumerate() {
            for (_, reference) in config.external_references() {
                if let Some(&target) = index.get(&reference.coordinate) {
                    dependencies[source].insert(target);
                    dependents[target].insert(source);
                }
            }
        }

        Ok(Self {
            environment: environment.into(),
            configs: sorted,
            index,
            dependencies,
            dependents,
        })
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn len(&self) -> usize {
        self.configs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.configs.is_empty()
    }

    /// Configs in lexical coordinate order.
    pub fn configs(&self) -> impl Iterator<Item = &'a Config> + '_ {
        self.configs.iter().copied()
    }

    pub fn contains(&self, coordinate: &Coordinate) -> bool {
        self.index.contains_key(coordinate)
    }

    /// Coordinates the given config has to wait for.
    pub fn dependencies_of(&self, coordinate: &Coordinate) -> Vec<&Coordinate> {
        self.index
            .get(coordinate)
            .map(|&i| {
                self.dependencies[i]
                    .iter()
                    .map(|&d| &self.configs[d].coordinate)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Topological order with the smallest ready coordinate first.
    ///
    /// Every weakly connected group of configs containing a cycle is left out
    /// of the order entirely and reported as one cyclic dependency error.
    pub fn schedule(&self) -> Schedule<'a> {
        let (sorted, remaining) = self.kahn();
        if remaining.is_empty() {
            return Schedule {
                order: sorted.into_iter().map(|i| self.configs[i]).collect(),
                errors: Vec::new(),
            };
        }

        let on_cycle = self.cycle_members(&remaining);
        let groups = self.groups();

        let mut blocked_groups: BTreeMap<usize, (Vec<usize>, Vec<usize>)> = BTreeMap::new();
        for &node in &on_cycle {
            blocked_groups.entry(groups[node]).or_default();
        }
        for node in 0..self.configs.len() {
            if let Some((cycle, blocked)) = blocked_groups.get_mut(&groups[node]) {
                if on_cycle.contains(&node) {
                    cycle.push(node);
                } else {
                    blocked.push(node);
                }
            }
        }

        let errors = blocked_groups
            .values()
            .map(|(cycle, blocked)| DeployError::CyclicDependency {
                environment: self.environment.clone(),
                cycle: self.coordinates(cycle),
                blocked: self.coordinates(blocked),
            })
            .collect();

        let order = sorted
            .into_iter()
            .filter(|&i| !blocked_groups.contains_key(&groups[i]))
            .map(|i| self.configs[i])
            .collect();

        Schedule { order, errors }
    }

    /// Kahn's algorithm. Returns the sorted nodes and the nodes left with unmet dependencies.
    fn kahn(&self) -> (Vec<usize>, BTreeSet<usize>) {
        let mut in_degree: Vec<usize> = self.dependencies.iter().map(BTreeSet::len).collect();
        let mut ready: BinaryHeap<Reverse<usize>> = in_degree
            .iter()
            .enumerate()
            .filter(|(_, d)| **d == 0)
            .map(|(i, _)| Reverse(i))
            .collect();

        let mut sorted = Vec::with_capacity(self.configs.len());
        while let Some(Reverse(node)) = ready.pop() {
            sorted.push(node);
            for &dependent in &self.dependents[node] {
                in_degree[dependent] -= 1;
                if in_degree[dependent] == 0 {
                    ready.push(Reverse(dependent));
                }
            }
        }

        let remaining = (0..self.configs.len())
            .filter(|&i| in_degree[i] > 0)
            .collect();
        (sorted, remaining)
    }

    /// Strip nodes that only hang off a cycle, leaving the nodes on (or between) cycles.
    fn cycle_members(&self, remaining: &BTreeSet<usize>) -> BTreeSet<usize> {
        let mut members = remaining.clone();
        loop {
            let leaves: Vec<usize> = members
                .iter()
                .copied()
                .filter(|&n| self.dependents[n].iter().all(|d| !members.contains(d)))
                .collect();
            if leaves.is_empty() {
                return members;
            }
            for leaf in leaves {
                members.remove(&leaf);
            }
        }
    }

    /// Weakly connected group of every node, named by its smallest member.
    fn groups(&self) -> Vec<usize> {
        let mut group: Vec<usize> = (0..self.configs.len()).collect();

        fn find(group: &mut [usize], mut n: usize) -> usize {
            while group[n] != n {
                group[n] = group[group[n]];
                n = group[n];
            }
            n
        }

        for (node, deps) in self.dependencies.iter().enumerate() {
            for &dep in deps {
                let (a, b) = (find(&mut group, node), find(&mut group, dep));
                if a != b {
                    group[a.max(b)] = a.min(b);
                }
            }
        }
        (0..group.len()).map(|n| find(&mut group, n)).collect()
    }

    fn coordinates(&self, nodes: &[usize]) -> Vec<Coordinate> {
        nodes
            .iter()
            .map(|&i| self.configs[i].coordinate.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use monaco_config::{ConfigType, Parameter, Template};
    use monaco_core::client::ClassicApi;

    fn make_config(id: &str, refs: &[&str]) -> Config {
        let parameters = refs
            .iter()
            .enumerate()
            .map(|(i, target)| {
                (
                    format!("ref{i}"),
                    Parameter::reference(coord(target), "id"),
                )
            })
            .collect();
        Config {
            coordinate: coord(id),
            template: Template::inline(id, "{}"),
            config_type: ConfigType::ClassicApi {
                api: ClassicApi::unique("alerting-profile"),
            },
            parameters,
            skip: false,
            environment: "dev".to_string(),
            group: "default".to_string(),
            origin_object_id: None,
        }
    }

    fn coord(id: &str) -> Coordinate {
        Coordinate::new("project", "alerting-profile", id)
    }

    fn ids(order: &[&Config]) -> Vec<String> {
        order
            .iter()
            .map(|c| c.coordinate.config_id.clone())
            .collect()
    }

    #[test]
    fn test_dependencies_come_first() {
        let configs = vec![
            make_config("deploy", &["build"]),
            make_config("test", &[]),
            make_config("build", &["test"]),
        ];
        let graph = DependencyGraph::build("dev", &configs).unwrap();
        let schedule = graph.schedule();

        assert!(schedule.errors.is_empty());
        assert_eq!(ids(&schedule.order), ["test", "build", "deploy"]);
    }

    #[test]
    fn test_order_is_independent_of_input_order() {
        let forward = vec![
            make_config("c", &[]),
            make_config("a", &[]),
            make_config("b", &["c"]),
        ];
        let mut backward = forward.clone();
        backward.reverse();

        let first = ids(&DependencyGraph::build("dev", &forward).unwrap().schedule().order);
        let second = ids(&DependencyGraph::build("dev", &backward).unwrap().schedule().order);
        assert_eq!(first, second);
        assert_eq!(first, ["a", "c", "b"]);
    }

    #[test]
    fn test_mutual_reference_blocks_both() {
        let configs = vec![make_config("a", &["b"]), make_config("b", &["a"])];
        let schedule = DependencyGraph::build("dev", &configs).unwrap().schedule();

        assert!(schedule.order.is_empty());
        assert_eq!(schedule.errors.len(), 1);
        match &schedule.errors[0] {
            DeployError::CyclicDependency {
                environment,
                cycle,
                blocked,
            } => {
                assert_eq!(environment, "dev");
                assert_eq!(cycle, &[coord("a"), coord("b")]);
                assert!(blocked.is_empty());
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_cycle_blocks_connected_group_only() {
        let configs = vec![
            make_config("root", &[]),
            make_config("x", &["root", "y"]),
            make_config("y", &["x"]),
            make_config("tail", &["y"]),
            make_config("free", &[]),
        ];
        let schedule = DependencyGraph::build("dev", &configs).unwrap().schedule();

        assert_eq!(ids(&schedule.order), ["free"]);
        match &schedule.errors[0] {
            DeployError::CyclicDependency { cycle, blocked, .. } => {
                assert_eq!(cycle, &[coord("x"), coord("y")]);
                assert_eq!(blocked, &[coord("root"), coord("tail")]);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_references_outside_the_set_make_no_edges() {
        let configs = vec![make_config("a", &["elsewhere"])];
        let graph = DependencyGraph::build("dev", &configs).unwrap();

        assert!(graph.dependencies_of(&coord("a")).is_empty());
        assert_eq!(ids(&graph.schedule().order), ["a"]);
    }

    #[test]
    fn test_self_reference_is_not_an_edge() {
        let mut config = make_config("a", &[]);
        config
            .parameters
            .insert("self".to_string(), Parameter::reference(coord("a"), "name"));
        let configs = vec![config];
        let schedule = DependencyGraph::build("dev", &configs).unwrap().schedule();

        assert!(schedule.errors.is_empty());
        assert_eq!(schedule.order.len(), 1);
    }

    #[test]
    fn test_duplicate_coordinate_is_rejected() {
        let configs = vec![make_config("a", &[]), make_config("a", &[])];
        assert!(matches!(
            DependencyGraph::build("dev", &configs),
            Err(DeployError::Internal { .. })
        ));
    }
}
