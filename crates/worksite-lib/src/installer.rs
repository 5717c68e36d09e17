//! Native and language package manager backends.
//!
//! When a prerequisite cannot be found on the filesystem, an install step
//! is created against one of these backends. Which backend depends on the
//! host platform family, on the package naming conventions of that
//! platform, and on language-specific fallbacks (pip, npm) when the native
//! manager does not carry the package.

use std::path::PathBuf;

use regex::Regex;

use crate::config::{PlatformFamily, WorksiteOptions};
use crate::error::{Error, Result};
use crate::index::ProjectIndex;
use crate::scheduler::RunContext;
use crate::shell;
use crate::step::{canonical_id, Priority, Step, StepClass, StepKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum InstallBackend {
	/// apt-get, Debian derivatives.
	Apt,
	/// yum, Fedora derivatives.
	Yum,
	/// MacPorts.
	MacPort,
	/// A fetched .deb archive.
	Dpkg,
	/// A fetched .rpm archive.
	Rpm,
	/// A fetched Darwin .pkg/.dmg archive.
	DarwinPkg,
	/// Python packages.
	Pip,
	/// Node packages.
	Npm,
	/// No backend knows this package; fails when run.
	Unknown,
}

impl InstallBackend {
	/// Native managers run before language managers so the interpreters
	/// they provide are present; unknown installs sort last so everything
	/// that can succeed does.
	pub fn priority(self) -> Priority {
		match self {
			InstallBackend::Apt
			| InstallBackend::Yum
			| InstallBackend::MacPort
			| InstallBackend::Dpkg
			| InstallBackend::Rpm
			| InstallBackend::DarwinPkg => Priority::InstallNative,
			InstallBackend::Pip | InstallBackend::Npm => Priority::InstallLang,
			InstallBackend::Unknown => Priority::Install,
		}
	}

	/// Ask the backend whether it carries *name* at all.
	pub fn knows(self, name: &str) -> bool {
		let probe = match self {
			InstallBackend::Apt => shell::run_filtered(
				&["apt-cache", "showpkg", name],
				&Regex::new(r"^Package:").expect("probe pattern is valid"),
			),
			InstallBackend::Yum => shell::run_filtered(
				&["yum", "info", name],
				&Regex::new(r"^Name\s*:").expect("probe pattern is valid"),
			),
			InstallBackend::MacPort => shell::run_filtered(
				&["/opt/local/bin/port", "info", name],
				&Regex::new(r".").expect("probe pattern is valid"),
			),
			InstallBackend::Pip => shell::run_filtered(
				&["pip", "show", name],
				&Regex::new(r"^Name:").expect("probe pattern is valid"),
			),
			InstallBackend::Npm => shell::run_filtered(
				&["npm", "view", name, "name"],
				&Regex::new(r".").expect("probe pattern is valid"),
			),
			_ => return false,
		};
		matches!(probe, Ok(lines) if !lines.is_empty())
	}

	/// Partition *names* into those the backend carries and those it does
	/// not.
	pub fn info(self, names: &[String]) -> (Vec<String>, Vec<String>) {
		names.iter().cloned().partition(|n| self.knows(n))
	}

	/// Install *packages* in one invocation of the backend tool.
	pub fn install(self, packages: &[String], _opts: &WorksiteOptions) -> Result<()> {
		if packages.is_empty() {
			return Ok(());
		}
		let names: Vec<&str> = packages.iter().map(String::as_str).collect();
		match self {
			InstallBackend::Apt => {
				shell::run(&["sudo", "apt-get", "update"], None)?;
				let mut cmdline = vec!["sudo", "apt-get", "-y", "install"];
				cmdline.extend(&names);
				shell::run(&cmdline, None)?;
			},
			InstallBackend::Yum => {
				shell::run(&["sudo", "yum", "-y", "update"], None)?;
				let mut cmdline = vec!["sudo", "yum", "-y", "install"];
				cmdline.extend(&names);
				let output = shell::run(&cmdline, None)?;
				/* yum exits 0 even when a package does not exist. */
				let re = Regex::new(r"No package (.*) available").expect("scan pattern is valid");
				if let Some(cap) = output.lines().find_map(|l| re.captures(l)) {
					return Err(Error::generic(format!("no package {} available", &cap[1])));
				}
			},
			InstallBackend::MacPort => {
				let mut cmdline = vec!["sudo", "/opt/local/bin/port", "install"];
				cmdline.extend(&names);
				shell::run(&cmdline, None)?;
			},
			InstallBackend::Dpkg => {
				let mut cmdline = vec!["sudo", "dpkg", "-i"];
				cmdline.extend(&names);
				shell::run(&cmdline, None)?;
			},
			InstallBackend::Rpm => {
				let mut cmdline = vec!["sudo", "rpm", "-i", "--force", "--nodeps"];
				cmdline.extend(&names);
				shell::run(&cmdline, None)?;
			},
			InstallBackend::DarwinPkg => {
				for name in &names {
					shell::run(&["sudo", "installer", "-pkg", name, "-target", "/"], None)?;
				}
			},
			InstallBackend::Pip => {
				let mut cmdline = vec!["pip", "install"];
				cmdline.extend(&names);
				shell::run(&cmdline, None)?;
			},
			InstallBackend::Npm => {
				let mut cmdline = vec!["npm", "install", "-g"];
				cmdline.extend(&names);
				shell::run(&cmdline, None)?;
			},
			InstallBackend::Unknown => {
				return Err(Error::generic(format!(
					"does not know how to install {}", packages.join(", ")
				)));
			},
		}
		Ok(())
	}
}

/// Translate a canonical (Debian-flavored) package name into the Fedora
/// one.
pub fn fedora_name(name: &str) -> String {
	match name {
		"libbz2-dev" => "bzip2-devel".to_string(),
		"python-all-dev" => "python-devel".to_string(),
		"zlib1g-dev" => "zlib-devel".to_string(),
		_ => match name.strip_suffix("-dev") {
			Some(stem) => format!("{stem}-devel"),
			None => name.to_string(),
		},
	}
}

/// Translate a canonical package name into the MacPorts one.
pub fn darwin_name(name: &str) -> String {
	match name {
		"libicu-dev" => "icu".to_string(),
		_ => name.strip_suffix("-dev").unwrap_or(name).to_string(),
	}
}

fn lang_fallback(name: &str, target: Option<&str>) -> Option<(InstallBackend, String)> {
	if let Some(stem) = name.strip_prefix("python-") {
		return Some((InstallBackend::Pip, stem.to_string()));
	}
	if target == Some("python") {
		return Some((InstallBackend::Pip, name.to_string()));
	}
	if target == Some("nodejs") {
		return Some((InstallBackend::Npm, name.to_string()));
	}
	None
}

/// Create the install step for *name* through the host's package manager,
/// falling back to a language manager when the native one does not carry
/// the package. `None` means no manager on this host can satisfy it.
pub fn create_managed(name: &str, target: Option<&str>, opts: &WorksiteOptions) -> Option<Step> {
	let native = match opts.family() {
		PlatformFamily::Apt => Some((InstallBackend::Apt, name.to_string())),
		PlatformFamily::Yum => Some((InstallBackend::Yum, fedora_name(name))),
		PlatformFamily::Port => Some((InstallBackend::MacPort, darwin_name(name))),
		PlatformFamily::Unmanaged => None,
	};
	let chosen = match native {
		Some((backend, pkg)) if backend.knows(&pkg) => Some((backend, pkg)),
		_ => lang_fallback(name, target),
	};
	let (backend, pkg) = chosen?;
	Some(Step::install(name, target, backend, vec![pkg]))
}

/// Create the install step for package archives fetched alongside the
/// index (.deb, .rpm, .pkg, .dmg).
pub fn create_package_file(name: &str, filenames: &[PathBuf], opts: &WorksiteOptions) -> Option<Step> {
	let backend = filenames.first().and_then(|f| {
		match f.extension().and_then(|e| e.to_str()) {
			Some("deb") => Some(InstallBackend::Dpkg),
			Some("rpm") => Some(InstallBackend::Rpm),
			Some("pkg") | Some("dmg") => Some(InstallBackend::DarwinPkg),
			_ => None,
		}
	})?;
	let managed = filenames
		.iter()
		.map(|f| opts.local_dir(&f.to_string_lossy()).to_string_lossy().into_owned())
		.collect();
	Some(Step::install(name, None, backend, managed))
}

/// Directly install the named projects, bypassing closure construction.
/// Used by the `install` command.
pub fn install(names: &[String], index: &ProjectIndex, ctx: &mut RunContext) -> Result<()> {
	let mut steps: Vec<Step> = Vec::new();
	for name in names {
		if index.get(name).is_some_and(|p| p.repository.is_some() || p.patch.is_some()) {
			log::warn!("{}: has a source flavor in the index; installing the package anyway", name);
		}
		let step = create_managed(name, None, &ctx.options).unwrap_or_else(|| {
			Step::install(name, None, InstallBackend::Unknown, vec![name.clone()])
		});
		match steps.iter_mut().find(|s| s.id == step.id || s.backend() == step.backend()) {
			Some(existing) => existing.insert(step),
			None => steps.push(step),
		}
	}
	steps.sort_by_key(|s| s.priority);
	for mut step in steps {
		step.run(ctx, false)?;
	}
	Ok(())
}

impl Step {
	pub(crate) fn install(name: &str, target: Option<&str>, backend: InstallBackend, managed: Vec<String>) -> Step {
		Step {
			id: canonical_id(StepClass::Install, name, target),
			project: name.to_string(),
			target: target.map(str::to_string),
			priority: backend.priority(),
			kind: StepKind::Install { backend, managed },
			updated: false,
		}
	}

	pub(crate) fn backend(&self) -> Option<InstallBackend> {
		match &self.kind {
			StepKind::Install { backend, .. } => Some(*backend),
			_ => None,
		}
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test] fn dev_suffix_becomes_devel_on_fedora() { assert_eq!(fedora_name("libpng-dev"), "libpng-devel") }
	#[test] fn irregular_fedora_names_are_mapped() { assert_eq!(fedora_name("libbz2-dev"), "bzip2-devel") }
	#[test] fn darwin_drops_the_dev_suffix() { assert_eq!(darwin_name("zlib-dev"), "zlib") }
	#[test] fn native_backends_run_before_language_backends() { assert!(InstallBackend::Apt.priority() < InstallBackend::Pip.priority()) }
	#[test] fn unknown_backend_runs_last() { assert!(InstallBackend::Npm.priority() < InstallBackend::Unknown.priority()) }

	#[test]
	fn python_prefix_falls_back_to_pip() {
		assert_eq!(
			lang_fallback("python-lxml", None),
			Some((InstallBackend::Pip, "lxml".to_string())),
		);
	}

	#[test]
	fn nodejs_target_falls_back_to_npm() {
		assert_eq!(
			lang_fallback("express", Some("nodejs")),
			Some((InstallBackend::Npm, "express".to_string())),
		);
	}

	#[test]
	fn unknown_install_fails_with_the_package_name() {
		let opts = WorksiteOptions::rooted_at("/tmp/ws");
		let err = InstallBackend::Unknown.install(&["mystery".to_string()], &opts).unwrap_err();
		assert!(err.to_string().contains("mystery"));
	}

	#[test]
	fn package_file_backend_follows_the_extension() {
		let opts = WorksiteOptions::rooted_at("/tmp/ws");
		let step = create_package_file("pkg", &[PathBuf::from("pkg-1.0.rpm")], &opts).unwrap();
		assert_eq!(step.backend(), Some(InstallBackend::Rpm));
		assert!(create_package_file("pkg", &[PathBuf::from("pkg-1.0.tar.gz")], &opts).is_none());
	}
}
