//! The dependency closure engine.
//!
//! Starting from a root set of project names, the engine repeatedly
//! traverses the project index, expanding every active project into steps
//! and into the next frontier of prerequisite names, until no new name
//! appears. Records stream past through the [`IndexHandler`] callbacks;
//! the engine only reacts to names on its current frontier.
//!
//! Expansion follows a strategy. `Build` provisions everything buildable
//! from source and installs the rest. `Make` builds what is already
//! checked out and delegates the choice between checking out and
//! installing anything else to a [`Selection`]. `MakeDep` traverses like
//! `Make` but only lists: no install steps are ever created.
//!
//! Frontier entries carry a color seeded per root and a depth. A name
//! already expanded under a color at most the incoming one is not expanded
//! again, which is what terminates the traversal on diamonds and on
//! back-edges between projects.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use crate::config::WorksiteOptions;
use crate::error::Result;
use crate::graph::{OrderedSteps, StepGraph};
use crate::index::{BuildSpec, Filter, IndexHandler, InstallFlavor, Project};
use crate::installer::{self, InstallBackend};
use crate::locator;
use crate::repository::Repository;
use crate::selection::{Candidate, Selection};
use crate::step::{canonical_id, Step, StepClass, StepKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
	/// Provision every project in the closure, building from source
	/// wherever a source flavor exists.
	Build,
	/// Build the projects already checked out; ask what to do about the
	/// rest.
	Make,
	/// Traverse like `Make`, creating build steps but no installs.
	MakeDep,
}

impl Strategy {
	/// Whether a failing step aborts the run instead of being recorded.
	pub fn stop_after_error(self) -> bool {
		matches!(self, Strategy::Make)
	}

	/// Whether builds run even when nothing upstream changed.
	pub fn force_update(self) -> bool {
		matches!(self, Strategy::Make)
	}
}

/// A prerequisite reference discovered during expansion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetRef {
	pub project: String,
	pub target: Option<String>,
}

#[derive(Debug, Clone)]
struct FrontierEntry {
	color: u32,
	depth: u32,
	target: Option<String>,
}

enum Expansion {
	Decided(Vec<TargetRef>),
	NeedsDecision,
}

pub struct ClosureEngine {
	strategy: Strategy,
	options: WorksiteOptions,
	selection: Box<dyn Selection>,
	roots: Vec<String>,
	filter: Filter,
	graph: StepGraph,
	/// Names to expand on the current traversal.
	active: BTreeMap<String, FrontierEntry>,
	/// Names discovered during the current traversal.
	next: BTreeMap<String, FrontierEntry>,
	/// Color a name was last expanded under.
	colors: BTreeMap<String, u32>,
	stashed: Vec<(Project, FrontierEntry)>,
	undecided: Vec<(Project, FrontierEntry)>,
	chosen_checkouts: BTreeSet<String>,
	chosen_packages: BTreeSet<String>,
	/// Install steps deferred until the traversal is complete, so their
	/// setup steps carry every dependent's file patterns by then.
	pending_installs: Vec<(String, String, Option<String>, Option<Project>)>,
	root_steps: Vec<String>,
}

impl ClosureEngine {
	pub fn new(
		strategy: Strategy,
		roots: &[String],
		options: WorksiteOptions,
		selection: Box<dyn Selection>,
	) -> Self {
		let mut filter = Filter::default();
		let mut active = BTreeMap::new();
		for (i, name) in roots.iter().enumerate() {
			filter.include(name.clone());
			active.insert(
				name.clone(),
				FrontierEntry { color: i as u32, depth: 0, target: None },
			);
		}
		ClosureEngine {
			strategy,
			options,
			selection,
			roots: roots.to_vec(),
			filter,
			graph: StepGraph::new(),
			active,
			next: BTreeMap::new(),
			colors: BTreeMap::new(),
			stashed: Vec::new(),
			undecided: Vec::new(),
			chosen_checkouts: BTreeSet::new(),
			chosen_packages: BTreeSet::new(),
			pending_installs: Vec::new(),
			root_steps: Vec::new(),
		}
	}

	/// True while another index traversal can still grow the closure.
	pub fn more(&self) -> bool {
		!self.active.is_empty()
	}

	pub fn strategy(&self) -> Strategy {
		self.strategy
	}

	pub fn options(&self) -> &WorksiteOptions {
		&self.options
	}

	pub fn graph(&self) -> &StepGraph {
		&self.graph
	}

	pub fn graph_mut(&mut self) -> &mut StepGraph {
		&mut self.graph
	}

	/// Ids of the root projects' build steps, in discovery order.
	pub fn root_steps(&self) -> &[String] {
		&self.root_steps
	}

	/// Create the deferred install steps, then order the whole graph.
	pub fn topological(&mut self) -> Result<OrderedSteps> {
		let pending = std::mem::take(&mut self.pending_installs);
		for (_, name, target, project) in pending {
			self.add_install(&name, target.as_deref(), project.as_ref())?;
		}
		self.graph.topological_order()
	}

	fn offer(&mut self, target_ref: TargetRef, color: u32, depth: u32) {
		let TargetRef { project: name, target } = target_ref;
		if self.filter.is_excluded(&name) {
			return;
		}
		if let Some(&expanded) = self.colors.get(&name) {
			if expanded <= color {
				return;
			}
		}
		/* Retained on the next traversal through the record filter. */
		self.filter.include(name.clone());
		match self.next.get_mut(&name) {
			Some(entry) => {
				entry.color = entry.color.min(color);
				entry.depth = entry.depth.min(depth);
				if entry.target.is_none() {
					entry.target = target;
				}
			},
			None => {
				self.next.insert(name, FrontierEntry { color, depth, target });
			},
		}
	}

	fn finish(&mut self, name: &str, entry: &FrontierEntry, targets: Vec<TargetRef>) {
		self.colors.insert(name.to_string(), entry.color);
		for target_ref in targets {
			self.offer(target_ref, entry.color, entry.depth + 1);
		}
	}

	fn source_flavor<'p>(project: &'p Project) -> Option<&'p InstallFlavor> {
		project.repository.as_ref().or(project.patch.as_ref())
	}

	fn expand(&mut self, project: &Project, entry: &FrontierEntry) -> Expansion {
		match self.strategy {
			Strategy::Build => match Self::source_flavor(project) {
				Some(flavor) => Expansion::Decided(self.expand_source(project, &flavor.clone(), entry)),
				None => Expansion::Decided(self.expand_package(project, entry)),
			},
			Strategy::Make | Strategy::MakeDep => {
				let checked_out = self.options.src_dir(&project.name).exists();
				let has_source = Self::source_flavor(project).is_some();
				/* A local checkout settles the question; otherwise every
				 * declared flavor counts as a separate choice. */
				let nb_choices = if checked_out {
					1
				} else {
					project.repository.is_some() as usize
						+ project.patch.is_some() as usize
						+ project.package_flavor(self.options.host()).is_some() as usize
				};
				let build = if checked_out && has_source {
					true
				} else if self.chosen_checkouts.contains(&project.name) {
					true
				} else if self.chosen_packages.contains(&project.name) {
					false
				} else if nb_choices > 1 {
					return Expansion::NeedsDecision;
				} else {
					has_source
				};
				if build {
					let flavor = Self::source_flavor(project).cloned()
						.unwrap_or_default();
					Expansion::Decided(self.expand_source(project, &flavor, entry))
				} else {
					Expansion::Decided(self.expand_package(project, entry))
				}
			},
		}
	}

	/// Create the build, configure, update and prerequisite setup steps
	/// for a source flavor of *project*, and return the prerequisites to
	/// visit next.
	fn expand_source(
		&mut self,
		project: &Project,
		flavor: &InstallFlavor,
		entry: &FrontierEntry,
	) -> Vec<TargetRef> {
		let name = &project.name;
		let make_step = match &flavor.build {
			BuildSpec::Make => Step::make(name),
			BuildSpec::Shell(script) => Step::shell(name, script.clone()),
		};
		let make_idx = self.graph.add_step(make_step);
		if self.roots.contains(name) {
			let id = self.graph.step(make_idx).id.clone();
			if !self.root_steps.contains(&id) {
				self.root_steps.push(id);
			}
		}
		if !flavor.configure.is_empty() {
			let c = self.graph.add_step(Step::configure(name, flavor.configure.clone()));
			self.graph.add_prerequisite(make_idx, c);
		}
		if !flavor.update.is_empty() {
			/* Only a full build pulls the repository; make accepts whatever
			 * sources are already checked out. */
			let repository = match self.strategy {
				Strategy::Build => flavor.update.sync.as_deref().and_then(Repository::associate),
				Strategy::Make | Strategy::MakeDep => None,
			};
			if repository.is_some() || !flavor.update.fetches.is_empty() {
				let u = self.graph.add_step(Step::update(name, repository, flavor.update.fetches.clone()));
				self.graph.add_prerequisite(make_idx, u);
			}
		}
		let host = self.options.host().to_string();
		let mut targets = Vec::new();
		for dep in flavor.prerequisites(&host) {
			let s = self.graph.add_step(Step::setup(&dep.name, dep.target.as_deref(), vec![dep.clone()]));
			self.graph.add_prerequisite(make_idx, s);
			/* The prerequisite may have expanded already; its build step
			 * then predates this setup step. */
			if let Some(m) = self.graph.get(&canonical_id(StepClass::Make, &dep.name, None)) {
				self.graph.add_prerequisite(s, m);
			}
			targets.push(TargetRef { project: dep.name.clone(), target: dep.target.clone() });
		}
		/* Dependents plant our setup step before we expand; their links
		 * only resolve once we have built. */
		let mut setup_ids = vec![canonical_id(StepClass::Setup, name, None)];
		if entry.target.is_some() {
			setup_ids.push(canonical_id(StepClass::Setup, name, entry.target.as_deref()));
		}
		for setup_id in setup_ids {
			if let Some(s) = self.graph.get(&setup_id) {
				self.graph.add_prerequisite(s, make_idx);
			}
		}
		targets
	}

	/// Defer an install step for *project* and return the prerequisites
	/// its package flavor declares.
	fn expand_package(&mut self, project: &Project, entry: &FrontierEntry) -> Vec<TargetRef> {
		self.queue_install(&project.name, entry.target.as_deref(), Some(project.clone()));
		let host = self.options.host().to_string();
		match project.package_flavor(&host) {
			Some(flavor) => flavor
				.prerequisites(&host)
				.iter()
				.map(|dep| TargetRef { project: dep.name.clone(), target: dep.target.clone() })
				.collect(),
			None => Vec::new(),
		}
	}

	fn queue_install(&mut self, name: &str, target: Option<&str>, project: Option<Project>) {
		/* Dependency listing only: no install steps, no locator probes. */
		if self.strategy == Strategy::MakeDep {
			return;
		}
		let id = canonical_id(StepClass::Install, name, target);
		if self.pending_installs.iter().any(|(pending, ..)| *pending == id) {
			return;
		}
		self.pending_installs.push((id, name.to_string(), target.map(str::to_string), project));
	}

	/// Create the install step for *name*, unless its prerequisite files
	/// already resolve on this host.
	fn add_install(&mut self, name: &str, target: Option<&str>, project: Option<&Project>) -> Result<()> {
		let setup_idx = self
			.graph
			.get(&canonical_id(StepClass::Setup, name, target))
			.or_else(|| self.graph.get(&canonical_id(StepClass::Setup, name, None)));
		if let Some(idx) = setup_idx {
			if let StepKind::Setup { deps } = &self.graph.step(idx).kind {
				if !deps.is_empty() {
					let located = locator::find_prerequisites(&self.options, deps)?;
					if located.iter().all(|l| l.complete) {
						log::debug!("{}: prerequisites already present, no install needed", name);
						return Ok(());
					}
				}
			}
		}
		let host = self.options.host().to_string();
		let flavor = project.and_then(|p| p.package_flavor(&host));
		let install_idx = match flavor {
			Some(flavor) if !flavor.update.fetches.is_empty() => {
				/* Package archives fetched alongside the index. */
				let filenames: Vec<PathBuf> =
					flavor.update.fetches.keys().map(PathBuf::from).collect();
				let step = installer::create_package_file(name, &filenames, &self.options)
					.unwrap_or_else(|| self.placeholder(name, target));
				let fetches = flavor.update.fetches.clone();
				let idx = self.graph.add_step(step);
				let u = self.graph.add_step(Step::update(name, None, fetches));
				self.graph.add_prerequisite(idx, u);
				idx
			},
			_ => {
				let step = installer::create_managed(name, target, &self.options)
					.unwrap_or_else(|| self.placeholder(name, target));
				self.graph.add_step(step)
			},
		};
		if let Some(s) = setup_idx {
			self.graph.add_prerequisite(s, install_idx);
		}
		Ok(())
	}

	fn placeholder(&self, name: &str, target: Option<&str>) -> Step {
		Step::install(name, target, InstallBackend::Unknown, vec![name.to_string()])
	}

	/// Resolve the projects with more than one flavor through the
	/// selection; projects chosen neither way leave the traversal.
	/// Every project appears in exactly one candidate list: checkout when
	/// it has a repository, install otherwise.
	fn decide(&mut self) {
		let undecided = std::mem::take(&mut self.undecided);
		let candidate = |p: &Project| Candidate {
			name: p.name.clone(),
			description: p.title.clone(),
			installed_version: p.installed_version.clone(),
		};
		let reps: Vec<Candidate> = undecided
			.iter()
			.filter(|(p, _)| p.repository.is_some())
			.map(|(p, _)| candidate(p))
			.collect();
		let packages: Vec<Candidate> = undecided
			.iter()
			.filter(|(p, _)| p.repository.is_none())
			.map(|(p, _)| candidate(p))
			.collect();
		let (checkouts, installs) = self.selection.select_checkout(&reps, &packages);
		self.chosen_checkouts.extend(checkouts);
		self.chosen_packages.extend(installs);
		for (project, entry) in undecided {
			if self.chosen_checkouts.contains(&project.name)
				|| self.chosen_packages.contains(&project.name)
			{
				/* Re-expands on the next traversal, now decided. */
				self.next.insert(project.name.clone(), entry);
			} else {
				log::info!("{}: skipped", project.name);
				self.filter.exclude(project.name.clone());
				self.colors.insert(project.name, entry.color);
			}
		}
	}
}

impl IndexHandler for ClosureEngine {
	fn project(&mut self, project: Project) {
		if !self.filter.matches(&project.name) {
			return;
		}
		if let Some(entry) = self.active.get(&project.name) {
			self.stashed.push((project, entry.clone()));
		}
	}

	fn end_parse(&mut self) {
		let stashed = std::mem::take(&mut self.stashed);
		let mut seen = BTreeSet::new();
		for (project, entry) in stashed {
			seen.insert(project.name.clone());
			if let Some((_, held)) =
				self.undecided.iter_mut().find(|(p, _)| p.name == project.name)
			{
				held.color = held.color.min(entry.color);
				held.depth = held.depth.min(entry.depth);
				continue;
			}
			match self.expand(&project, &entry) {
				Expansion::Decided(targets) => self.finish(&project.name, &entry, targets),
				Expansion::NeedsDecision => self.undecided.push((project, entry)),
			}
		}
		/* Names with no index record are satisfied through a bare install. */
		let unknown: Vec<(String, FrontierEntry)> = self
			.active
			.iter()
			.filter(|(name, _)| !seen.contains(*name))
			.map(|(name, entry)| (name.clone(), entry.clone()))
			.collect();
		for (name, entry) in unknown {
			self.queue_install(&name, entry.target.as_deref(), None);
			self.finish(&name, &entry, Vec::new());
		}
		self.active = std::mem::take(&mut self.next);
		/* Decisions wait for the fixed point so the selection sees every
		 * undecided project in one offer. */
		if self.active.is_empty() && !self.undecided.is_empty() {
			self.decide();
			self.active = std::mem::take(&mut self.next);
		}
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::config::PlatformFamily;
	use crate::index::ProjectIndex;
	use crate::selection::Unattended;

	fn engine(strategy: Strategy, roots: &[&str]) -> ClosureEngine {
		let dir = std::env::temp_dir().join("worksite-closure-nonexistent");
		let mut options = WorksiteOptions::rooted_at(dir);
		options.set_host("Test", PlatformFamily::Unmanaged);
		let roots: Vec<String> = roots.iter().map(|s| s.to_string()).collect();
		ClosureEngine::new(strategy, &roots, options, Box::new(Unattended))
	}

	fn index() -> ProjectIndex {
		ProjectIndex::from_json_str(
			r#"{"projects": [
				{"name": "app", "repository": {"deps": {
					"libcodec": {"files": {"lib": ["codec"]}},
					"zcompress": {"files": {"include": ["zcompress.h"]}}
				}}},
				{"name": "libcodec", "repository": {"deps": {
					"zcompress": {"files": {"lib": ["zcompress"]}}
				}}},
				{"name": "zcompress", "packages": {"Test": {}}}
			]}"#,
		)
		.unwrap()
	}

	fn ordered_ids(engine: &mut ClosureEngine, index: &ProjectIndex) -> Vec<String> {
		let order = index.closure(engine).unwrap();
		order.iter().map(|&i| engine.graph().step(i).id.clone()).collect()
	}

	#[test]
	fn closure_reaches_transitive_prerequisites() {
		let mut dgen = engine(Strategy::Build, &["app"]);
		let ids = ordered_ids(&mut dgen, &index());
		assert!(ids.contains(&"install_zcompress".to_string()));
		assert!(ids.contains(&"libcodec".to_string()));
	}

	#[test]
	fn builds_run_after_their_prerequisite_setups() {
		let mut dgen = engine(Strategy::Build, &["app"]);
		let ids = ordered_ids(&mut dgen, &index());
		let pos = |id: &str| ids.iter().position(|i| i == id).unwrap();
		assert!(pos("install_zcompress") < pos("zcompressSetup"));
		assert!(pos("zcompressSetup") < pos("libcodec"));
		assert!(pos("libcodecSetup") < pos("app"));
		assert!(pos("libcodec") < pos("libcodecSetup"));
	}

	#[test]
	fn shared_prerequisites_appear_once() {
		let mut dgen = engine(Strategy::Build, &["app"]);
		let ids = ordered_ids(&mut dgen, &index());
		assert_eq!(ids.iter().filter(|i| *i == "zcompressSetup").count(), 1);
		assert_eq!(ids.iter().filter(|i| *i == "install_zcompress").count(), 1);
	}

	#[test]
	fn unknown_projects_become_installs() {
		let index = ProjectIndex::from_json_str(
			r#"{"projects": [{"name": "app", "repository": {"deps": {"mystery": {}}}}]}"#,
		)
		.unwrap();
		let mut dgen = engine(Strategy::Build, &["app"]);
		let ids = ordered_ids(&mut dgen, &index);
		assert!(ids.contains(&"install_mystery".to_string()));
	}

	#[test]
	fn makedep_recurses_without_synthesizing_installs() {
		let mut dgen = engine(Strategy::MakeDep, &["app"]);
		let ids = ordered_ids(&mut dgen, &index());
		assert!(ids.contains(&"libcodec".to_string()));
		assert!(ids.contains(&"zcompressSetup".to_string()));
		assert!(!ids.iter().any(|i| i.starts_with("install_")), "unexpected install in {ids:?}");
	}

	#[test]
	fn make_never_pulls_repositories() {
		let build: Vec<String> = {
			let mut dgen = engine(Strategy::Build, &["app"]);
			ordered_ids(&mut dgen, &index())
		};
		assert!(build.contains(&"update_app".to_string()), "no update step in {build:?}");
		let mut dgen = engine(Strategy::Make, &["app"]);
		let ids = ordered_ids(&mut dgen, &index());
		assert!(!ids.contains(&"update_app".to_string()), "unexpected update step in {ids:?}");
	}

	#[test]
	fn root_build_steps_are_recorded() {
		let mut dgen = engine(Strategy::Build, &["app"]);
		let _ = ordered_ids(&mut dgen, &index());
		assert_eq!(dgen.root_steps(), &["app".to_string()]);
	}

	#[test]
	fn cycles_surface_as_errors() {
		let index = ProjectIndex::from_json_str(
			r#"{"projects": [
				{"name": "a", "repository": {"deps": {"b": {}}}},
				{"name": "b", "repository": {"deps": {"a": {}}}}
			]}"#,
		)
		.unwrap();
		let mut dgen = engine(Strategy::Build, &["a"]);
		assert!(matches!(index.closure(&mut dgen), Err(crate::Error::Cycle { .. })));
	}
}
