//! Index records.

use std::collections::BTreeMap;

use serde::{Serialize, Deserialize};

use super::dependency::{Alternates, Dependency};
use super::variable::ConfigureSpec;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Maintainer {
	pub fullname: String,
	pub email: String,
}

impl std::fmt::Display for Maintainer {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{} <{}>", self.fullname, self.email)
	}
}

/// How sources and auxiliary files for a flavor are brought up-to-date:
/// an optional source control url (possibly carrying a `#revision` suffix)
/// and remote files to fetch, keyed by remote name with an optional
/// expected checksum.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateSpec {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub sync: Option<String>,
	#[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
	pub fetches: BTreeMap<String, Option<String>>,
}

impl UpdateSpec {
	pub fn is_empty(&self) -> bool {
		self.sync.is_none() && self.fetches.is_empty()
	}
}

/// How a source flavor is built once configured.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildSpec {
	/// Run make against the project Makefile.
	#[default]
	Make,
	/// Run an arbitrary shell script instead.
	Shell(String),
}

/// One way of satisfying a project: check out and build sources, apply a
/// patch series, or install a platform package. Which fields are relevant
/// depends on where the flavor appears in the [`Project`] record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InstallFlavor {
	#[serde(default, skip_serializing_if = "UpdateSpec::is_empty")]
	pub update: UpdateSpec,
	#[serde(default, skip_serializing_if = "ConfigureSpec::is_empty")]
	pub configure: ConfigureSpec,
	#[serde(default)]
	pub build: BuildSpec,
	#[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
	pub deps: BTreeMap<String, Dependency>,
	#[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
	pub alternates: Alternates,
}

impl InstallFlavor {
	/// Unconditional prerequisites plus the alternates set matching the
	/// host platform tag, in name order.
	pub fn prerequisites(&self, host: &str) -> Vec<&Dependency> {
		let mut prereqs: Vec<&Dependency> = self.deps.values().collect();
		if let Some(alt) = self.alternates.get(host) {
			prereqs.extend(alt.values());
		}
		prereqs
	}

	pub fn prerequisite_names(&self, host: &str) -> Vec<String> {
		self.prerequisites(host).iter().map(|d| d.name.clone()).collect()
	}

	fn finalize(&mut self) {
		for (name, dep) in self.deps.iter_mut() {
			dep.name = name.clone();
		}
		for alt in self.alternates.values_mut() {
			for (name, dep) in alt.iter_mut() {
				dep.name = name.clone();
			}
		}
	}
}

/// A single record of the project index.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Project {
	pub name: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub title: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub description: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub version: Option<String>,
	/// Version selected by a previous run, pinning later searches.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub installed_version: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub maintainer: Option<Maintainer>,
	/// Build from a source controlled repository.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub repository: Option<InstallFlavor>,
	/// Build from pristine sources plus a patch series.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub patch: Option<InstallFlavor>,
	/// Platform package flavors, keyed by platform tag.
	#[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
	pub packages: BTreeMap<String, InstallFlavor>,
}

impl Project {
	pub fn named(name: impl Into<String>) -> Self {
		Project { name: name.into(), ..Project::default() }
	}

	/// Normalizations applied when a record enters an index: prerequisite
	/// names are copied down from their map keys, and a repository flavor
	/// without an explicit url defaults to `<name>.git` relative to the
	/// remote site.
	pub fn finalize(&mut self) {
		if let Some(rep) = &mut self.repository {
			if rep.update.sync.is_none() {
				rep.update.sync = Some(format!("{}.git", self.name));
			}
			rep.finalize();
		}
		if let Some(patch) = &mut self.patch {
			patch.finalize();
		}
		for flavor in self.packages.values_mut() {
			flavor.finalize();
		}
	}

	/// The package flavor matching the host platform tag, if any.
	pub fn package_flavor(&self, host: &str) -> Option<&InstallFlavor> {
		self.packages.get(host)
	}

	/// Prerequisites of the source flavor (repository, else patch).
	pub fn prerequisites(&self, host: &str) -> Vec<&Dependency> {
		match (&self.repository, &self.patch) {
			(Some(rep), _) => rep.prerequisites(host),
			(None, Some(patch)) => patch.prerequisites(host),
			(None, None) => Vec::new(),
		}
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::index::InstallDir;

	fn decode(json: &str) -> Project {
		let mut p: Project = serde_json::from_str(json).unwrap();
		p.finalize();
		p
	}

	#[test]
	fn repository_url_defaults_to_project_name() {
		let p = decode(r#"{"name": "app", "repository": {}}"#);
		assert_eq!(p.repository.unwrap().update.sync.as_deref(), Some("app.git"));
	}

	#[test]
	fn explicit_repository_url_is_kept() {
		let p = decode(r#"{"name": "app", "repository": {"update": {"sync": "https://host/app.git"}}}"#);
		assert_eq!(p.repository.unwrap().update.sync.as_deref(), Some("https://host/app.git"));
	}

	#[test]
	fn dependency_names_come_from_map_keys() {
		let p = decode(
			r#"{"name": "app", "repository": {"deps": {"zlib": {"files": {"include": ["zlib.h"]}}}}}"#,
		);
		let deps = p.prerequisites("Any");
		assert_eq!(deps.len(), 1);
		assert_eq!(deps[0].name, "zlib");
		assert_eq!(deps[0].patterns(InstallDir::Include).len(), 1);
	}

	#[test]
	fn alternates_contribute_only_on_matching_host() {
		let p = decode(
			r#"{"name": "app", "repository": {
				"deps": {"zlib": {}},
				"alternates": {"Fedora": {"openssl-devel": {}}, "Debian": {"libssl-dev": {}}}
			}}"#,
		);
		let fedora = p.prerequisites("Fedora");
		assert_eq!(
			fedora.iter().map(|d| d.name.as_str()).collect::<Vec<_>>(),
			vec!["zlib", "openssl-devel"],
		);
		assert_eq!(p.prerequisites("Darwin").len(), 1);
	}

	#[test]
	fn build_defaults_to_make() {
		let p = decode(r#"{"name": "app", "repository": {}}"#);
		assert_eq!(p.repository.unwrap().build, BuildSpec::Make);
	}

	#[test]
	fn shell_build_decodes() {
		let p = decode(r#"{"name": "app", "repository": {"build": {"shell": "./bootstrap"}}}"#);
		assert_eq!(p.repository.unwrap().build, BuildSpec::Shell("./bootstrap".into()));
	}
}
