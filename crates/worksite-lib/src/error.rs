//! Library error type.

pub type Result<T> = std::result::Result<T, Error>;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
	#[error("IO error: {0}")]
	IO(#[from] std::io::Error),
	#[error("JSON error: {0}")]
	SerdeJSON(#[from] serde_json::Error),
	#[error("fetch error: {0}")]
	Fetch(#[from] reqwest::Error),
	/// An "expected" error condition carrying a useful message. Anything
	/// else escaping a public operation is considered a bug.
	#[error("{}error: {msg} (error {code})", .project.as_ref().map(|p| format!("{p}: ")).unwrap_or_default())]
	Generic {
		code: i32,
		msg: String,
		project: Option<String>,
	},
	/// A circle was detected while ordering the step graph.
	#[error("circle detected while traversing edge from {from} to {to}")]
	Cycle { from: String, to: String },
	#[error("{project}: the following prerequisites are missing: {}", .names.join(" "))]
	MissingPrerequisites {
		project: String,
		names: Vec<String>,
	},
	/// An external collaborator exited with a non-zero status. The captured
	/// output is kept for diagnosis.
	#[error("command `{cmdline}` exited with status {status}:\n{output}")]
	Command {
		cmdline: String,
		status: i32,
		output: String,
	},
	/// Raised once at the end of a "continue after error" run, naming every
	/// step that failed.
	#[error("{} step(s) failed: {}", .0.len(), .0.join(", "))]
	Aggregate(Vec<String>),
}

impl Error {
	pub fn generic(msg: impl Into<String>) -> Self {
		Error::Generic { code: 1, msg: msg.into(), project: None }
	}

	pub fn for_project(project: impl Into<String>, msg: impl Into<String>) -> Self {
		Error::Generic { code: 1, msg: msg.into(), project: Some(project.into()) }
	}

	/// Numeric code exposed to the CLI layer for process exit mapping.
	pub fn code(&self) -> i32 {
		match self {
			Error::Generic { code, .. } => *code,
			Error::MissingPrerequisites { .. } => 2,
			Error::Command { status, .. } => *status,
			_ => 1,
		}
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test] fn generic_error_displays_message() { assert!(Error::generic("boom").to_string().contains("boom")) }
	#[test] fn project_error_is_prefixed() { assert!(Error::for_project("zlib", "boom").to_string().starts_with("zlib: ")) }
	#[test] fn missing_prerequisites_names_them() {
		let e = Error::MissingPrerequisites { project: "app".into(), names: vec!["zlib".into(), "png".into()] };
		assert!(e.to_string().contains("zlib png"));
		assert_eq!(e.code(), 2);
	}
}
