//! Provisioning steps.
//!
//! Everything the tool does to a workspace is a step: answer configure
//! variables, update sources, link prerequisites into the build tree,
//! install packages, run make. Steps carry a canonical identifier derived
//! from their class and project so the same logical step is only ever
//! created once, and a priority that orders classes among steps with no
//! dependency path between them.

use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::fetch;
use crate::index::{ConfigureSpec, Dependency};
use crate::installer::InstallBackend;
use crate::locator;
use crate::repository::Repository;
use crate::scheduler::RunContext;
use crate::shell;

/// Relative order of step classes when no dependency edge decides.
/// Configuration first, then package installs (native before language so
/// interpreters exist), then source updates, prerequisite setup and
/// finally builds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Priority {
	Configure = 1,
	InstallNative = 2,
	InstallLang = 3,
	Install = 4,
	Update = 5,
	Setup = 6,
	Make = 7,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepClass {
	Configure,
	Install,
	Update,
	Setup,
	Make,
}

/// The canonical step identifier: class prefix or suffix around the
/// escaped project name, with the traversal variant folded in. Two
/// requests for the same logical step always produce the same id.
pub fn canonical_id(class: StepClass, project: &str, target: Option<&str>) -> String {
	fn escape(name: &str) -> String {
		name.replace(['/', '-'], "_")
	}
	let mut base = escape(project);
	if let Some(target) = target {
		base = format!("{}_{base}", escape(target));
	}
	match class {
		StepClass::Configure => format!("configure_{base}"),
		StepClass::Install => format!("install_{base}"),
		StepClass::Update => format!("update_{base}"),
		StepClass::Setup => format!("{base}Setup"),
		StepClass::Make => base,
	}
}

#[derive(Debug, Clone)]
pub enum StepKind {
	/// Resolve and persist the project's configure variables.
	Configure { variables: ConfigureSpec },
	/// Bring sources and fetched files up-to-date.
	Update {
		repository: Option<Repository>,
		fetches: BTreeMap<String, Option<String>>,
	},
	/// Find prerequisite files and link them into the build tree.
	Setup { deps: Vec<Dependency> },
	/// Build through the project Makefile.
	Make,
	/// Build through a shell script instead of make.
	Shell { script: String },
	/// Install packages through a manager backend.
	Install {
		backend: InstallBackend,
		managed: Vec<String>,
	},
}

#[derive(Debug, Clone)]
pub struct Step {
	pub id: String,
	pub project: String,
	pub target: Option<String>,
	pub priority: Priority,
	pub kind: StepKind,
	/// Set while running when the step changed the workspace; dependents
	/// use it to decide whether they must rebuild.
	pub updated: bool,
}

impl std::fmt::Display for Step {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(&self.id)
	}
}

impl Step {
	fn new(class: StepClass, project: &str, target: Option<&str>, priority: Priority, kind: StepKind) -> Step {
		Step {
			id: canonical_id(class, project, target),
			project: project.to_string(),
			target: target.map(str::to_string),
			priority,
			kind,
			updated: false,
		}
	}

	pub fn configure(project: &str, variables: ConfigureSpec) -> Step {
		Step::new(StepClass::Configure, project, None, Priority::Configure,
			StepKind::Configure { variables })
	}

	pub fn update(
		project: &str,
		repository: Option<Repository>,
		fetches: BTreeMap<String, Option<String>>,
	) -> Step {
		Step::new(StepClass::Update, project, None, Priority::Update,
			StepKind::Update { repository, fetches })
	}

	pub fn setup(project: &str, target: Option<&str>, deps: Vec<Dependency>) -> Step {
		Step::new(StepClass::Setup, project, target, Priority::Setup,
			StepKind::Setup { deps })
	}

	pub fn make(project: &str) -> Step {
		Step::new(StepClass::Make, project, None, Priority::Make, StepKind::Make)
	}

	pub fn shell(project: &str, script: impl Into<String>) -> Step {
		Step::new(StepClass::Make, project, None, Priority::Make,
			StepKind::Shell { script: script.into() })
	}

	pub fn class(&self) -> StepClass {
		match &self.kind {
			StepKind::Configure { .. } => StepClass::Configure,
			StepKind::Update { .. } => StepClass::Update,
			StepKind::Setup { .. } => StepClass::Setup,
			StepKind::Make | StepKind::Shell { .. } => StepClass::Make,
			StepKind::Install { .. } => StepClass::Install,
		}
	}

	/// Fold a second request for the same logical step into this one.
	/// Setup steps union their prerequisite file patterns, install steps
	/// their package lists, update steps their fetches.
	pub fn insert(&mut self, other: Step) {
		match (&mut self.kind, other.kind) {
			(StepKind::Setup { deps }, StepKind::Setup { deps: other_deps }) => {
				for other_dep in other_deps {
					match deps.iter_mut().find(|d| d.name == other_dep.name) {
						Some(dep) => {
							for (dir, patterns) in other_dep.files {
								let known = dep.files.entry(dir).or_default();
								for pattern in patterns {
									if !known.iter().any(|p| p.pattern == pattern.pattern) {
										known.push(pattern);
									}
								}
							}
							for range in other_dep.excludes {
								if !dep.excludes.contains(&range) {
									dep.excludes.push(range);
								}
							}
						},
						None => deps.push(other_dep),
					}
				}
			},
			(
				StepKind::Install { managed, .. },
				StepKind::Install { managed: other_managed, .. },
			) => {
				for pkg in other_managed {
					if !managed.contains(&pkg) {
						managed.push(pkg);
					}
				}
			},
			(
				StepKind::Update { repository, fetches },
				StepKind::Update { repository: other_rep, fetches: other_fetches },
			) => {
				if repository.is_none() {
					*repository = other_rep;
				}
				fetches.extend(other_fetches);
			},
			/* Configure and make steps carry nothing worth merging. */
			_ => {},
		}
	}

	/// Execute the step. *updated_prereqs* is true when any prerequisite
	/// step changed the workspace during this run.
	pub fn run(&mut self, ctx: &mut RunContext, updated_prereqs: bool) -> Result<()> {
		match self.kind.clone() {
			StepKind::Configure { variables } => self.run_configure(ctx, &variables),
			StepKind::Update { repository, fetches } => self.run_update(ctx, repository, &fetches),
			StepKind::Setup { deps } => self.run_setup(ctx, &deps),
			StepKind::Make => self.run_make(ctx, updated_prereqs),
			StepKind::Shell { script } => self.run_shell(ctx, &script),
			StepKind::Install { backend, managed } => {
				backend.install(&managed, &ctx.options)?;
				self.updated = true;
				Ok(())
			},
		}
	}

	fn run_configure(&mut self, ctx: &mut RunContext, variables: &ConfigureSpec) -> Result<()> {
		let mut changed = false;
		for (name, spec) in &variables.variables {
			if ctx.options.variable(name).is_some() {
				continue;
			}
			let base_value = spec
				.base()
				.and_then(|b| ctx.options.variable(b))
				.map(str::to_string);
			let value = spec.unattended_value(base_value.as_deref()).ok_or_else(|| {
				Error::for_project(&self.project, format!("no default value for variable {name}"))
			})?;
			log::info!("{}: {} = {}", self.project, name, value);
			ctx.options.set_variable(name, value);
			changed = true;
		}
		if changed {
			ctx.options.save_to_disk()?;
		}
		/* The build steps source this file; keep it current either way. */
		ctx.options.save_vars()?;
		self.updated = changed;
		Ok(())
	}

	fn run_update(
		&mut self,
		ctx: &mut RunContext,
		repository: Option<Repository>,
		fetches: &BTreeMap<String, Option<String>>,
	) -> Result<()> {
		let fetched = fetch::fetch_all(&ctx.options, fetches)?;
		self.updated = !fetched.is_empty();
		if let Some(repository) = repository {
			if repository.update(&self.project, &ctx.options)? {
				self.updated = true;
			}
			if repository.apply_patches(&self.project, &ctx.options)? {
				self.updated = true;
			}
		}
		if self.updated {
			ctx.updated_projects += 1;
		}
		Ok(())
	}

	fn run_setup(&mut self, ctx: &mut RunContext, deps: &[Dependency]) -> Result<()> {
		let located = locator::find_prerequisites(&ctx.options, deps)?;
		let missing = locator::link_dependencies(&ctx.options, &located)?;
		if !missing.is_empty() {
			return Err(Error::MissingPrerequisites {
				project: self.project.clone(),
				names: missing,
			});
		}
		self.updated = true;
		Ok(())
	}

	fn run_make(&mut self, ctx: &mut RunContext, updated_prereqs: bool) -> Result<()> {
		if !ctx.force_update && !updated_prereqs {
			log::debug!("{}: nothing updated, skipping build", self.project);
			return Ok(());
		}
		let src_dir = ctx.options.src_dir(&self.project);
		if !src_dir.join("Makefile").exists() {
			log::debug!("{}: no Makefile, skipping build", self.project);
			return Ok(());
		}
		let vars = ctx.options.vars_filename();
		let bin_build = ctx.options.bin_build_dir();
		shell::run_with_path(
			&["make", "-f", &vars.to_string_lossy(), "-f", "Makefile"],
			Some(&src_dir),
			&[&bin_build],
		)?;
		self.updated = true;
		Ok(())
	}

	fn run_shell(&mut self, ctx: &mut RunContext, script: &str) -> Result<()> {
		use std::io::Write;

		let src_dir = ctx.options.src_dir(&self.project);
		let mut file = tempfile::NamedTempFile::new()?;
		writeln!(file, "#!/bin/sh")?;
		writeln!(file, ". {}", ctx.options.vars_filename().display())?;
		writeln!(file, "{script}")?;
		file.flush()?;
		let bin_build = ctx.options.bin_build_dir();
		shell::run_with_path(
			&["sh", "-x", "-e", &file.path().to_string_lossy()],
			Some(&src_dir),
			&[&bin_build],
		)?;
		self.updated = true;
		Ok(())
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::index::{FilePattern, InstallDir};

	#[test] fn ids_escape_separators() { assert_eq!(canonical_id(StepClass::Make, "contrib/llvm-tools", None), "contrib_llvm_tools") }
	#[test] fn targets_prefix_the_id() { assert_eq!(canonical_id(StepClass::Install, "lxml", Some("python")), "install_python_lxml") }
	#[test] fn setup_ids_carry_a_suffix() { assert_eq!(canonical_id(StepClass::Setup, "zlib", None), "zlibSetup") }
	#[test] fn priorities_order_classes() { assert!(Priority::Configure < Priority::InstallNative && Priority::Setup < Priority::Make) }

	#[test]
	fn same_request_twice_yields_the_same_id() {
		let a = Step::setup("zlib", None, Vec::new());
		let b = Step::setup("zlib", None, Vec::new());
		assert_eq!(a.id, b.id);
	}

	#[test]
	fn setup_insert_unions_patterns() {
		let mut dep_a = Dependency::named("zlib");
		dep_a.files.insert(InstallDir::Include, vec![FilePattern::new("zlib.h")]);
		let mut dep_b = Dependency::named("zlib");
		dep_b.files.insert(
			InstallDir::Include,
			vec![FilePattern::new("zlib.h"), FilePattern::new("zconf.h")],
		);
		dep_b.files.insert(InstallDir::Lib, vec![FilePattern::new("z")]);

		let mut step = Step::setup("zlib", None, vec![dep_a]);
		step.insert(Step::setup("zlib", None, vec![dep_b]));
		let StepKind::Setup { deps } = &step.kind else { panic!() };
		assert_eq!(deps.len(), 1);
		assert_eq!(deps[0].patterns(InstallDir::Include).len(), 2);
		assert_eq!(deps[0].patterns(InstallDir::Lib).len(), 1);
	}

	#[test]
	fn a_resolved_configure_marks_itself_updated() {
		use crate::config::{PlatformFamily, WorksiteOptions};
		use crate::scheduler::RunContext;

		let dir = tempfile::tempdir().unwrap();
		let mut options = WorksiteOptions::rooted_at(dir.path());
		options.set_host("Test", PlatformFamily::Unmanaged);
		let mut ctx = RunContext::new(options);
		let spec: ConfigureSpec = serde_json::from_str(
			r#"{"variables": {"prefix": {"metainfo": {"value": "/usr"}}}}"#,
		)
		.unwrap();
		let mut step = Step::configure("app", spec.clone());
		step.run(&mut ctx, false).unwrap();
		assert!(step.updated);
		/* The variable persisted; a second pass answers nothing new. */
		let mut again = Step::configure("app", spec);
		again.run(&mut ctx, false).unwrap();
		assert!(!again.updated);
	}

	#[test]
	fn update_insert_keeps_the_first_repository() {
		let rep = Repository::associate("https://host/app.git");
		let mut step = Step::update("app", rep.clone(), BTreeMap::new());
		step.insert(Step::update("app", Repository::associate("https://host/other.git"), BTreeMap::new()));
		let StepKind::Update { repository, .. } = &step.kind else { panic!() };
		assert_eq!(*repository, rep);
	}
}
