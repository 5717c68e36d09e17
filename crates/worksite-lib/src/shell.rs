//! Spawning external collaborator processes.
//!
//! Every step ultimately shells out to a package manager, a source control
//! client or a build tool. All invocations are synchronous: the child runs
//! to completion before the next step starts, and its combined output is
//! captured so a failure can be diagnosed after the fact.

use std::path::Path;
use std::process::Command;

use crate::error::{Error, Result};

/// Run *cmdline* and return its captured stdout.
///
/// A non-zero exit status is wrapped into [`Error::Command`] carrying the
/// combined stdout/stderr output.
pub fn run(cmdline: &[&str], cwd: Option<&Path>) -> Result<String> {
	run_with_path(cmdline, cwd, &[])
}

/// Same as [`run`] but with extra directories prepended to `$PATH` for the
/// child process.
pub fn run_with_path(cmdline: &[&str], cwd: Option<&Path>, path_prefix: &[&Path]) -> Result<String> {
	assert!(!cmdline.is_empty());
	log::debug!("running: {}", cmdline.join(" "));

	let mut cmd = Command::new(cmdline[0]);
	cmd.args(&cmdline[1..]);
	if let Some(cwd) = cwd {
		cmd.current_dir(cwd);
	}
	if !path_prefix.is_empty() {
		let current = std::env::var_os("PATH").unwrap_or_default();
		let mut entries: Vec<std::path::PathBuf> =
			path_prefix.iter().map(|p| p.to_path_buf()).collect();
		entries.extend(std::env::split_paths(&current));
		if let Ok(joined) = std::env::join_paths(entries) {
			cmd.env("PATH", joined);
		}
	}

	let output = cmd.output().map_err(|e| Error::Command {
		cmdline: cmdline.join(" "),
		status: -1,
		output: e.to_string(),
	})?;

	let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
	text.push_str(&String::from_utf8_lossy(&output.stderr));
	if !output.status.success() {
		return Err(Error::Command {
			cmdline: cmdline.join(" "),
			status: output.status.code().unwrap_or(-1),
			output: text,
		});
	}
	Ok(text)
}

/// Run *cmdline* and return the lines of output matching *pat*.
pub fn run_filtered(cmdline: &[&str], pat: &regex::Regex) -> Result<Vec<String>> {
	let output = run(cmdline, None)?;
	Ok(output.lines().filter(|l| pat.is_match(l)).map(str::to_string).collect())
}
