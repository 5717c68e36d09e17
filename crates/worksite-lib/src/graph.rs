//! The step dependency graph and its execution order.

use std::collections::{HashMap, HashSet};

use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use petgraph::Direction;

use crate::error::{Error, Result};
use crate::step::Step;

pub type OrderedSteps = Vec<NodeIndex>;

/// Steps as nodes, prerequisite relations as edges pointing from a step
/// to what must run before it. Steps are registered once, keyed by their
/// canonical id; a second registration folds into the first.
#[derive(Debug, Default)]
pub struct StepGraph {
	graph: StableDiGraph<Step, ()>,
	ids: HashMap<String, NodeIndex>,
}

impl StepGraph {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn len(&self) -> usize {
		self.graph.node_count()
	}

	pub fn is_empty(&self) -> bool {
		self.graph.node_count() == 0
	}

	pub fn get(&self, id: &str) -> Option<NodeIndex> {
		self.ids.get(id).copied()
	}

	pub fn step(&self, idx: NodeIndex) -> &Step {
		&self.graph[idx]
	}

	pub fn step_mut(&mut self, idx: NodeIndex) -> &mut Step {
		&mut self.graph[idx]
	}

	/// Register *step*, folding it into the already-registered step with
	/// the same id if there is one.
	pub fn add_step(&mut self, step: Step) -> NodeIndex {
		match self.ids.get(&step.id) {
			Some(&idx) => {
				self.graph[idx].insert(step);
				idx
			},
			None => {
				let id = step.id.clone();
				let idx = self.graph.add_node(step);
				self.ids.insert(id, idx);
				idx
			},
		}
	}

	/// Record that *prereq* must run before *step*.
	pub fn add_prerequisite(&mut self, step: NodeIndex, prereq: NodeIndex) {
		if step == prereq {
			return;
		}
		if self.graph.find_edge(step, prereq).is_none() {
			self.graph.add_edge(step, prereq, ());
		}
	}

	pub fn prerequisites(&self, step: NodeIndex) -> Vec<NodeIndex> {
		self.graph.neighbors_directed(step, Direction::Outgoing).collect()
	}

	/// Order the steps so every prerequisite runs before its dependents
	/// while steps with no path between them keep their class priority
	/// order. A step becomes ready once all its prerequisites are placed;
	/// it is then inserted after the last of them, pushed past any
	/// already-placed step of lower or equal priority.
	pub fn topological_order(&self) -> Result<OrderedSteps> {
		let mut remaining: Vec<NodeIndex> = self.graph.node_indices().collect();
		/* Deterministic order regardless of insertion history. */
		remaining.sort_by(|&a, &b| self.graph[a].id.cmp(&self.graph[b].id));

		let mut ordered: Vec<NodeIndex> = Vec::with_capacity(remaining.len());
		let mut placed: HashSet<NodeIndex> = HashSet::with_capacity(remaining.len());
		while !remaining.is_empty() {
			let mut deferred = Vec::new();
			for &node in &remaining {
				let prereqs = self.prerequisites(node);
				if !prereqs.iter().all(|p| placed.contains(p)) {
					deferred.push(node);
					continue;
				}
				let mut at = prereqs
					.iter()
					.map(|p| ordered.iter().position(|o| o == p).map(|i| i + 1).unwrap_or(0))
					.max()
					.unwrap_or(0);
				let priority = self.graph[node].priority;
				while at < ordered.len() && self.graph[ordered[at]].priority <= priority {
					at += 1;
				}
				ordered.insert(at, node);
				placed.insert(node);
			}
			if deferred.len() == remaining.len() {
				/* No step became ready in a whole pass. */
				let from = deferred[0];
				let to = self
					.prerequisites(from)
					.into_iter()
					.find(|p| !placed.contains(p))
					.unwrap_or(from);
				return Err(Error::Cycle {
					from: self.graph[from].id.clone(),
					to: self.graph[to].id.clone(),
				});
			}
			remaining = deferred;
		}
		Ok(ordered)
	}
}

#[cfg(test)]
mod test {
	use super::*;

	fn ids(graph: &StepGraph, order: &OrderedSteps) -> Vec<String> {
		order.iter().map(|&i| graph.step(i).id.clone()).collect()
	}

	#[test]
	fn registration_is_idempotent() {
		let mut graph = StepGraph::new();
		let a = graph.add_step(Step::make("app"));
		let b = graph.add_step(Step::make("app"));
		assert_eq!(a, b);
		assert_eq!(graph.len(), 1);
	}

	#[test]
	fn prerequisites_run_first() {
		let mut graph = StepGraph::new();
		let app = graph.add_step(Step::make("app"));
		let zlib = graph.add_step(Step::make("zlib"));
		graph.add_prerequisite(app, zlib);
		assert_eq!(ids(&graph, &graph.topological_order().unwrap()), vec!["zlib", "app"]);
	}

	#[test]
	fn unrelated_steps_order_by_priority() {
		let mut graph = StepGraph::new();
		graph.add_step(Step::make("app"));
		graph.add_step(Step::setup("zlib", None, Vec::new()));
		graph.add_step(Step::configure("app", Default::default()));
		assert_eq!(
			ids(&graph, &graph.topological_order().unwrap()),
			vec!["configure_app", "zlibSetup", "app"],
		);
	}

	#[test]
	fn priority_never_overrides_an_edge() {
		/* A build the setup of another project depends on. */
		let mut graph = StepGraph::new();
		let tool = graph.add_step(Step::make("tool"));
		let setup = graph.add_step(Step::setup("app", None, Vec::new()));
		graph.add_prerequisite(setup, tool);
		assert_eq!(ids(&graph, &graph.topological_order().unwrap()), vec!["tool", "appSetup"]);
	}

	#[test]
	fn diamonds_order_every_node_once() {
		let mut graph = StepGraph::new();
		let app = graph.add_step(Step::make("app"));
		let left = graph.add_step(Step::make("left"));
		let right = graph.add_step(Step::make("right"));
		let base = graph.add_step(Step::make("base"));
		graph.add_prerequisite(app, left);
		graph.add_prerequisite(app, right);
		graph.add_prerequisite(left, base);
		graph.add_prerequisite(right, base);
		let order = ids(&graph, &graph.topological_order().unwrap());
		assert_eq!(order.len(), 4);
		assert_eq!(order[0], "base");
		assert_eq!(order[3], "app");
	}

	#[test]
	fn a_circle_is_an_error_naming_its_edge() {
		let mut graph = StepGraph::new();
		let a = graph.add_step(Step::make("a"));
		let b = graph.add_step(Step::make("b"));
		graph.add_prerequisite(a, b);
		graph.add_prerequisite(b, a);
		match graph.topological_order() {
			Err(Error::Cycle { from, to }) => {
				assert!(["a", "b"].contains(&from.as_str()));
				assert!(["a", "b"].contains(&to.as_str()));
				assert_ne!(from, to);
			},
			other => panic!("expected a circle error, got {other:?}"),
		}
	}
}
