//! Prerequisite declarations inside index records.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Serialize, Deserialize};

use crate::version::ExcludedRange;

/// The installation directories a prerequisite's files are searched in,
/// ordered the way a search proceeds (executables first, data last).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstallDir {
	Bin,
	Include,
	Lib,
	Libexec,
	Etc,
	Share,
}

impl InstallDir {
	pub const ALL: [InstallDir; 6] = [
		InstallDir::Bin,
		InstallDir::Include,
		InstallDir::Lib,
		InstallDir::Libexec,
		InstallDir::Etc,
		InstallDir::Share,
	];

	pub fn as_str(self) -> &'static str {
		match self {
			InstallDir::Bin => "bin",
			InstallDir::Include => "include",
			InstallDir::Lib => "lib",
			InstallDir::Libexec => "libexec",
			InstallDir::Etc => "etc",
			InstallDir::Share => "share",
		}
	}
}

impl std::fmt::Display for InstallDir {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.as_str())
	}
}

/// A file a prerequisite must provide, as the declared search pattern plus
/// the absolute path it resolved to, once found.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "FilePatternRepr", into = "FilePatternRepr")]
pub struct FilePattern {
	pub pattern: String,
	pub resolved: Option<PathBuf>,
}

impl FilePattern {
	pub fn new(pattern: impl Into<String>) -> Self {
		FilePattern { pattern: pattern.into(), resolved: None }
	}
}

/* A bare string is the common case in indexes; the struct form only shows
 * up when a resolved path is persisted back. */
#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum FilePatternRepr {
	Plain(String),
	Resolved { pattern: String, resolved: Option<PathBuf> },
}

impl From<FilePatternRepr> for FilePattern {
	fn from(repr: FilePatternRepr) -> Self {
		match repr {
			FilePatternRepr::Plain(pattern) => FilePattern { pattern, resolved: None },
			FilePatternRepr::Resolved { pattern, resolved } => FilePattern { pattern, resolved },
		}
	}
}

impl From<FilePattern> for FilePatternRepr {
	fn from(p: FilePattern) -> Self {
		match p.resolved {
			None => FilePatternRepr::Plain(p.pattern),
			Some(resolved) => FilePatternRepr::Resolved { pattern: p.pattern, resolved: Some(resolved) },
		}
	}
}

/// A single prerequisite edge: the files the prerequisite project must
/// provide, per installation directory, and the version ranges ruled out.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Dependency {
	/// Name of the prerequisite project; filled from the map key.
	#[serde(skip)]
	pub name: String,
	/// Override for the traversal variant requested on the prerequisite.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub target: Option<String>,
	#[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
	pub files: BTreeMap<InstallDir, Vec<FilePattern>>,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub excludes: Vec<ExcludedRange>,
}

impl Dependency {
	pub fn named(name: impl Into<String>) -> Self {
		Dependency { name: name.into(), ..Dependency::default() }
	}

	pub fn patterns(&self, dir: InstallDir) -> &[FilePattern] {
		self.files.get(&dir).map(Vec::as_slice).unwrap_or(&[])
	}
}

/// Platform-conditional prerequisite sets, keyed by platform tag. Only the
/// set matching the host tag contributes prerequisites.
pub type Alternates = BTreeMap<String, BTreeMap<String, Dependency>>;
