//! The plugin dependency DAG: cycle detection and topological layering.
//!
//! `topological_sort` here is a correct Kahn's-algorithm layering, NOT a
//! direct port of `DependencyGraph.topological_sort` in the source model —
//! that implementation computes in-degree backwards (counting dependents
//! rather than dependencies), which loads a plugin's dependents before the
//! plugin itself. `DESIGN.md` records this as a resolved Open Question.

use std::collections::{HashMap, HashSet};

use crate::error::PluginError;

/// `graph[p]` = the set of plugins `p` depends on. `reverse_graph[p]` = the
/// set of plugins that depend on `p`.
#[derive(Debug, Default)]
pub struct DependencyGraph {
	graph: HashMap<String, HashSet<String>>,
	reverse_graph: HashMap<String, HashSet<String>>,
}

impl DependencyGraph {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn add_plugin(&mut self, name: &str) {
		self.graph.entry(name.to_string()).or_default();
		self.reverse_graph.entry(name.to_string()).or_default();
	}

	/// Record that `plugin` depends on `depends_on`. Both are added as
	/// nodes if not already present — `depends_on` may be an as-yet
	/// undiscovered plugin name, tracked per spec as "unknown dependency
	/// target" by the caller rather than by this graph.
	pub fn add_dependency(&mut self, plugin: &str, depends_on: &str) {
		self.add_plugin(plugin);
		self.add_plugin(depends_on);
		self.graph.get_mut(plugin).unwrap().insert(depends_on.to_string());
		self.reverse_graph.get_mut(depends_on).unwrap().insert(plugin.to_string());
	}

	pub fn dependencies(&self, plugin: &str) -> HashSet<String> {
		self.graph.get(plugin).cloned().unwrap_or_default()
	}

	pub fn dependents(&self, plugin: &str) -> HashSet<String> {
		self.reverse_graph.get(plugin).cloned().unwrap_or_default()
	}

	pub fn contains(&self, plugin: &str) -> bool {
		self.graph.contains_key(plugin)
	}

	/// Drop every node and edge, for a fresh rediscovery pass.
	pub fn clear_and_reset(&mut self) {
		self.graph.clear();
		self.reverse_graph.clear();
	}

	pub fn has_cycle(&self) -> bool {
		let mut visited = HashSet::new();
		let mut stack = HashSet::new();
		for node in self.graph.keys() {
			if !visited.contains(node) && self.dfs_has_cycle(node, &mut visited, &mut stack) {
				return true;
			}
		}
		false
	}

	fn dfs_has_cycle<'a>(&'a self, node: &'a str, visited: &mut HashSet<&'a str>, stack: &mut HashSet<&'a str>) -> bool {
		visited.insert(node);
		stack.insert(node);

		if let Some(deps) = self.graph.get(node) {
			for dep in deps {
				if !visited.contains(dep.as_str()) {
					if self.dfs_has_cycle(dep, visited, stack) {
						return true;
					}
				} else if stack.contains(dep.as_str()) {
					return true;
				}
			}
		}

		stack.remove(node);
		false
	}

	/// Emit concurrent-load layers: layer 0 holds every node with no
	/// unresolved dependencies, layer N holds every node whose dependencies
	/// all finished in layers `< N`.
	pub fn layers(&self) -> Result<Vec<Vec<String>>, PluginError> {
		if self.has_cycle() {
			return Err(PluginError::Cycle);
		}

		let mut in_degree: HashMap<&str, usize> = self.graph.iter().map(|(name, deps)| (name.as_str(), deps.len())).collect();

		let mut ready: Vec<String> = in_degree.iter().filter(|(_, d)| **d == 0).map(|(name, _)| name.to_string()).collect();
		ready.sort();

		let mut layers = Vec::new();
		let mut processed = 0usize;

		while !ready.is_empty() {
			processed += ready.len();
			let mut next = Vec::new();
			for node in &ready {
				for dependent in self.reverse_graph.get(node).into_iter().flatten() {
					let degree = in_degree.get_mut(dependent.as_str()).expect("dependent must be a known node");
					*degree -= 1;
					if *degree == 0 {
						next.push(dependent.clone());
					}
				}
			}
			layers.push(std::mem::take(&mut ready));
			next.sort();
			ready = next;
		}

		if processed != in_degree.len() {
			return Err(PluginError::Cycle);
		}

		Ok(layers)
	}
}
