//! Source control repositories behind index records.
//!
//! The source control tool is inferred from the update url, never
//! configured explicitly. All operations shell out to the stock clients.

use std::path::{Path, PathBuf};

use crate::config::WorksiteOptions;
use crate::error::Result;
use crate::shell;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Repository {
	Git { url: String, rev: Option<String> },
	Svn { url: String },
}

fn is_git(url: &str) -> bool {
	if url.ends_with(".git") || url.starts_with("git@") || url.starts_with("git://") {
		return true;
	}
	/* A local checkout qualifies through its marker directory. */
	Path::new(url).join(".git").is_dir()
}

fn is_svn(url: &str) -> bool {
	url.starts_with("svn://")
		|| url.contains("/svn/")
		|| Path::new(url).join(".svn").is_dir()
}

impl Repository {
	/// Infer the repository kind from an update url. A trailing
	/// `#revision` pins git checkouts to that revision. Urls naming no
	/// known source control tool yield `None`.
	pub fn associate(sync: &str) -> Option<Repository> {
		if sync.is_empty() {
			return None;
		}
		let (url, rev) = match sync.split_once('#') {
			Some((url, rev)) => (url.to_string(), Some(rev.to_string())),
			None => (sync.to_string(), None),
		};
		if is_git(&url) {
			return Some(Repository::Git { url, rev });
		}
		if is_svn(&url) {
			return Some(Repository::Svn { url });
		}
		None
	}

	pub fn url(&self) -> &str {
		match self {
			Repository::Git { url, .. } => url,
			Repository::Svn { url } => url,
		}
	}

	/// Bring the checkout of *name* up-to-date, cloning on first contact.
	/// Returns true when the working tree changed.
	pub fn update(&self, name: &str, opts: &WorksiteOptions) -> Result<bool> {
		let target = opts.src_dir(name);
		match self {
			Repository::Git { url, rev } => {
				let changed = if !target.join(".git").is_dir() {
					std::fs::create_dir_all(opts.src_top())?;
					shell::run(&["git", "clone", url, &target.to_string_lossy()], None)?;
					true
				} else {
					let output = shell::run(&["git", "pull"], Some(&target))?;
					/* "Already up to date." vs "Updating f3a21c..9d01ab" */
					output.lines().any(|l| l.to_lowercase().starts_with("updating"))
				};
				if let Some(rev) = rev {
					shell::run(&["git", "checkout", rev], Some(&target))?;
				}
				Ok(changed)
			},
			Repository::Svn { url } => {
				if !target.join(".svn").is_dir() {
					std::fs::create_dir_all(opts.src_top())?;
					shell::run(&["svn", "co", url, &target.to_string_lossy()], None)?;
				} else {
					shell::run(&["svn", "update"], Some(&target))?;
				}
				/* svn output gives no cheap changed signal; assume changed. */
				Ok(true)
			},
		}
	}

	/// Apply the patch series stored for *name* on top of the checkout.
	/// Returns true when at least one patch was applied.
	pub fn apply_patches(&self, name: &str, opts: &WorksiteOptions) -> Result<bool> {
		let Repository::Git { .. } = self else {
			return Ok(false);
		};
		let patch_dir = opts.patch_dir(name);
		if !patch_dir.is_dir() {
			return Ok(false);
		}
		let mut patches: Vec<PathBuf> = std::fs::read_dir(&patch_dir)?
			.filter_map(|e| e.ok())
			.map(|e| e.path())
			.filter(|p| p.extension().map(|e| e == "patch").unwrap_or(false))
			.collect();
		if patches.is_empty() {
			return Ok(false);
		}
		patches.sort();
		log::info!("{}: applying {} patch(es)", name, patches.len());
		let mut cmdline = vec!["git".to_string(), "am".to_string(), "-3".to_string(), "-k".to_string()];
		cmdline.extend(patches.iter().map(|p| p.to_string_lossy().into_owned()));
		let args: Vec<&str> = cmdline.iter().map(String::as_str).collect();
		shell::run(&args, Some(&opts.src_dir(name)))?;
		Ok(true)
	}

	/// Publish local commits for *name* upstream.
	pub fn push(&self, name: &str, opts: &WorksiteOptions) -> Result<()> {
		if let Repository::Git { .. } = self {
			shell::run(&["git", "push"], Some(&opts.src_dir(name)))?;
		}
		Ok(())
	}

	/// Archive the checkout of *name* into the resource cache.
	pub fn tarball(&self, name: &str, opts: &WorksiteOptions) -> Result<PathBuf> {
		let output = opts.local_dir(&format!("{name}.tar.gz"));
		if let Some(parent) = output.parent() {
			std::fs::create_dir_all(parent)?;
		}
		let prefix = format!("--prefix={name}/");
		match self {
			Repository::Git { rev, .. } => {
				shell::run(
					&[
						"git", "archive", &prefix,
						"-o", &output.to_string_lossy(),
						rev.as_deref().unwrap_or("HEAD"),
					],
					Some(&opts.src_dir(name)),
				)?;
			},
			Repository::Svn { .. } => {
				shell::run(
					&["tar", "-czf", &output.to_string_lossy(), name],
					Some(opts.src_top()),
				)?;
			},
		}
		Ok(output)
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test] fn empty_url_has_no_repository() { assert!(Repository::associate("").is_none()) }
	#[test] fn plain_tarball_url_has_no_repository() { assert!(Repository::associate("https://host/pkg-1.0.tar.gz").is_none()) }

	#[test]
	fn dot_git_suffix_means_git() {
		assert_eq!(
			Repository::associate("https://host/app.git"),
			Some(Repository::Git { url: "https://host/app.git".into(), rev: None }),
		);
	}

	#[test]
	fn fragment_pins_the_revision() {
		assert_eq!(
			Repository::associate("https://host/app.git#v1.2"),
			Some(Repository::Git { url: "https://host/app.git".into(), rev: Some("v1.2".into()) }),
		);
	}

	#[test]
	fn svn_path_segment_means_svn() {
		assert_eq!(
			Repository::associate("https://host/svn/app/trunk"),
			Some(Repository::Svn { url: "https://host/svn/app/trunk".into() }),
		);
	}
}
