//! The project dependency index.
//!
//! An index is an ordered-by-name collection of [`Project`] records, each
//! describing the strategies available to satisfy that project (build from
//! a source-controlled repository, build from patched sources, install a
//! native package). The index is consumed through a pull-style iterator:
//! [`ProjectIndex::parse`] invokes an [`IndexHandler`] once per record and
//! once at the end, which is all the closure engine requires. The concrete
//! on-disk syntax is a strict JSON schema decoded directly into the typed
//! records; unknown shapes are rejected rather than accreted.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Serialize, Deserialize};

mod dependency;
pub use dependency::{Alternates, Dependency, FilePattern, InstallDir};
mod project;
pub use project::{BuildSpec, InstallFlavor, Maintainer, Project, UpdateSpec};
mod variable;
pub use variable::{Choice, ConfigureSpec, VariableSpec};

use crate::closure::ClosureEngine;
use crate::error::{Error, Result};
use crate::graph::OrderedSteps;

/// Callback interface for a project index traversal. The closure engine
/// implements this to grow its frontier as records stream past.
pub trait IndexHandler {
	fn project(&mut self, project: Project);
	fn end_parse(&mut self) {}
}

/// Include/exclude name patterns deciding which records a traversal
/// retains. Projects explicitly skipped by the user end up in the exclude
/// set so they are not expanded again.
#[derive(Debug, Default, Clone)]
pub struct Filter {
	includes: Vec<String>,
	excludes: Vec<String>,
}

impl Filter {
	pub fn include(&mut self, pat: impl Into<String>) {
		let pat = pat.into();
		if !self.includes.contains(&pat) {
			self.includes.push(pat);
		}
	}

	pub fn exclude(&mut self, pat: impl Into<String>) {
		let pat = pat.into();
		if !self.excludes.contains(&pat) {
			self.excludes.push(pat);
		}
	}

	pub fn is_excluded(&self, name: &str) -> bool {
		self.excludes.iter().any(|p| Filter::pat_match(p, name))
	}

	pub fn matches(&self, name: &str) -> bool {
		self.includes.iter().any(|p| Filter::pat_match(p, name))
			&& !self.excludes.iter().any(|p| Filter::pat_match(p, name))
	}

	fn pat_match(pat: &str, name: &str) -> bool {
		/* Project names routinely contain '+' (g++, libstdc++). */
		let escaped = pat.replace('+', "\\+");
		match regex::Regex::new(&format!("^{escaped}")) {
			Ok(re) => re.is_match(name),
			Err(_) => pat == name,
		}
	}
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct IndexFile {
	projects: Vec<Project>,
}

/// In-memory project dependency database.
#[derive(Debug, Default, Clone)]
pub struct ProjectIndex {
	projects: BTreeMap<String, Project>,
}

impl ProjectIndex {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn insert(&mut self, mut project: Project) {
		project.finalize();
		self.projects.insert(project.name.clone(), project);
	}

	pub fn get(&self, name: &str) -> Option<&Project> {
		self.projects.get(name)
	}

	pub fn len(&self) -> usize {
		self.projects.len()
	}

	pub fn is_empty(&self) -> bool {
		self.projects.is_empty()
	}

	pub fn names(&self) -> impl Iterator<Item = &str> {
		self.projects.keys().map(String::as_str)
	}

	/// Decode an index from its JSON representation, rejecting unknown
	/// fields.
	pub fn from_json_str(contents: &str) -> Result<Self> {
		let file: IndexFile = serde_json::from_str(contents)?;
		let mut index = ProjectIndex::new();
		for project in file.projects {
			if project.name.is_empty() {
				return Err(Error::generic("index record with an empty project name"));
			}
			index.insert(project);
		}
		Ok(index)
	}

	pub fn load_from_disk(path: impl AsRef<Path>) -> Result<Self> {
		let contents = std::fs::read_to_string(path.as_ref())?;
		Self::from_json_str(&contents)
	}

	/// Pull-style traversal: one callback per record, ordered by name,
	/// then a final `end_parse`.
	pub fn parse<H: IndexHandler>(&self, handler: &mut H) {
		for project in self.projects.values() {
			handler.project(project.clone());
		}
		handler.end_parse();
	}

	/// Find all dependencies from the root set held by *dgen*, iterating
	/// the traversal until the frontier is exhausted, then return the
	/// ordered steps.
	pub fn closure(&self, dgen: &mut ClosureEngine) -> Result<OrderedSteps> {
		while dgen.more() {
			self.parse(dgen);
		}
		dgen.topological()
	}
}
