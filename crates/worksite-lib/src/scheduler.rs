//! Running an ordered list of steps.
//!
//! Consecutive install steps against the same backend are folded into a
//! single package manager invocation. Every step is timed and logged; a
//! failing step either aborts the run or is recorded and skipped over,
//! depending on the strategy, with the recorded failures raised once at
//! the end.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::config::WorksiteOptions;
use crate::error::{Error, Result};
use crate::graph::{OrderedSteps, StepGraph};
use crate::step::{Priority, StepKind};

/// Mirror of the console output into a build log file.
#[derive(Debug, Default)]
pub struct RunLog {
	file: Option<std::fs::File>,
}

impl RunLog {
	pub fn to_file(path: impl AsRef<Path>) -> Result<RunLog> {
		let path = path.as_ref();
		if let Some(parent) = path.parent() {
			std::fs::create_dir_all(parent)?;
		}
		let file = std::fs::OpenOptions::new().create(true).append(true).open(path)?;
		Ok(RunLog { file: Some(file) })
	}

	fn write(&mut self, line: &str) {
		if let Some(file) = &mut self.file {
			let _ = writeln!(file, "{line}");
		}
	}

	pub fn header(&mut self, id: &str) {
		log::info!("######## {id}...");
		self.write(&format!("######## {id}..."));
	}

	pub fn footer(&mut self, id: &str, elapsed: std::time::Duration, errcode: Option<i32>) {
		let line = match errcode {
			None => format!("{id} completed in {} secs", elapsed.as_secs()),
			Some(code) => format!("{id} failed after {} secs (error {code})", elapsed.as_secs()),
		};
		log::info!("{line}");
		self.write(&line);
	}

	pub fn error(&mut self, text: &str) {
		log::error!("{text}");
		self.write(&format!("error: {text}"));
	}
}

/// Everything a running step needs from its surroundings.
#[derive(Debug)]
pub struct RunContext {
	pub options: WorksiteOptions,
	/// Ids of steps that failed while the run kept going.
	pub errors: Vec<String>,
	/// Number of projects whose sources changed during this run.
	pub updated_projects: usize,
	pub log: RunLog,
	pub unattended: bool,
	/// Run build steps even when nothing upstream changed.
	pub force_update: bool,
}

impl RunContext {
	pub fn new(options: WorksiteOptions) -> Self {
		RunContext {
			options,
			errors: Vec::new(),
			updated_projects: 0,
			log: RunLog::default(),
			unattended: true,
			force_update: false,
		}
	}

	pub fn with_log(mut self, path: impl Into<PathBuf>) -> Result<Self> {
		self.log = RunLog::to_file(path.into())?;
		Ok(self)
	}
}

fn record_or_abort(
	ctx: &mut RunContext,
	stop_after_error: bool,
	id: &str,
	err: Error,
) -> Result<()> {
	if stop_after_error {
		return Err(err);
	}
	ctx.log.error(&err.to_string());
	ctx.errors.push(id.to_string());
	Ok(())
}

/// Run the steps of *order*, restricted to *priorities* when given.
/// Returns the number of steps that changed the workspace; the number of
/// projects whose sources changed accumulates in `ctx.updated_projects`.
pub fn execute(
	graph: &mut StepGraph,
	order: &OrderedSteps,
	ctx: &mut RunContext,
	priorities: Option<&[Priority]>,
	stop_after_error: bool,
) -> Result<usize> {
	let selected: Vec<_> = order
		.iter()
		.copied()
		.filter(|&idx| match priorities {
			Some(priorities) => priorities.contains(&graph.step(idx).priority),
			None => true,
		})
		.collect();

	let mut at = 0;
	while at < selected.len() {
		let idx = selected[at];
		let backend = match &graph.step(idx).kind {
			StepKind::Install { backend, .. } => Some(*backend),
			_ => None,
		};
		if let Some(backend) = backend {
			/* Fold the run of same-backend installs into one invocation. */
			let mut batch = vec![idx];
			while at + batch.len() < selected.len() {
				match &graph.step(selected[at + batch.len()]).kind {
					StepKind::Install { backend: b, .. } if *b == backend => {
						batch.push(selected[at + batch.len()]);
					},
					_ => break,
				}
			}
			let mut packages = Vec::new();
			for &member in &batch {
				if let StepKind::Install { managed, .. } = &graph.step(member).kind {
					for pkg in managed {
						if !packages.contains(pkg) {
							packages.push(pkg.clone());
						}
					}
				}
			}
			let label: Vec<String> = batch.iter().map(|&m| graph.step(m).id.clone()).collect();
			let label = label.join(" ");
			ctx.log.header(&label);
			let started = Instant::now();
			match backend.install(&packages, &ctx.options) {
				Ok(()) => {
					for &member in &batch {
						graph.step_mut(member).updated = true;
					}
					ctx.log.footer(&label, started.elapsed(), None);
				},
				Err(err) => {
					ctx.log.footer(&label, started.elapsed(), Some(err.code()));
					record_or_abort(ctx, stop_after_error, &label, err)?;
				},
			}
			at += batch.len();
			continue;
		}

		let updated_prereqs = graph
			.prerequisites(idx)
			.iter()
			.any(|&p| graph.step(p).updated);
		let id = graph.step(idx).id.clone();
		ctx.log.header(&id);
		let started = Instant::now();
		match graph.step_mut(idx).run(ctx, updated_prereqs) {
			Ok(()) => ctx.log.footer(&id, started.elapsed(), None),
			Err(err) => {
				ctx.log.footer(&id, started.elapsed(), Some(err.code()));
				record_or_abort(ctx, stop_after_error, &id, err)?;
			},
		}
		at += 1;
	}

	if !ctx.errors.is_empty() {
		return Err(Error::Aggregate(ctx.errors.clone()));
	}
	Ok(selected.iter().filter(|&&idx| graph.step(idx).updated).count())
}
