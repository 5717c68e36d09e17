//! Locating prerequisite files on the host filesystem.
//!
//! Prerequisites are declared as file patterns per installation directory
//! (`bin`, `include`, `lib`, ...). Finding them is expensive - it walks
//! every root on the search path - so results are cached at two levels:
//! a pattern that already carries a resolved path that still exists is a
//! hit, and a symlink previously planted under `build_top` that still
//! points at an existing file is a hit. Only when both miss does a scan
//! run. Version numbers embedded in filenames and directory names are
//! extracted along the way and checked against exclusion ranges, and the
//! first version found locks all remaining searches for the same
//! prerequisite to it.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use regex::Regex;
use walkdir::WalkDir;

use crate::config::WorksiteOptions;
use crate::error::{Error, Result};
use crate::index::{Dependency, FilePattern, InstallDir};
use crate::version::{excluded, lock_to_version, version_candidates, version_compare, ExcludedRange};

pub const LIB_PREFIX: &str = "lib";
pub const LIB_STATIC_SUFFIX: &str = ".a";
#[cfg(target_os = "macos")]
pub const LIB_DYN_SUFFIX: &str = ".dylib";
#[cfg(not(target_os = "macos"))]
pub const LIB_DYN_SUFFIX: &str = ".so";

/// Search outcome for one prerequisite.
#[derive(Debug, Clone, Default)]
pub struct LocatedDependency {
	pub name: String,
	/// The declared patterns, with `resolved` filled in where a file was
	/// found.
	pub files: BTreeMap<InstallDir, Vec<FilePattern>>,
	pub version: Option<String>,
	/// True when every declared pattern resolved to a file.
	pub complete: bool,
}

fn lib_stem(pattern: &str) -> &str {
	pattern
		.trim_start_matches(LIB_PREFIX)
		.split(['.', '-']).next().unwrap_or(pattern)
}

/// Name of the symlink planted for *pattern* under `build_top/<dir>`.
///
/// Library patterns are normalized so `z` and `z.*` both link as `libz.so`
/// (or `libz.a` for a static match).
pub fn link_pat_path(dir: InstallDir, pattern: &str, resolved: Option<&Path>) -> String {
	if dir == InstallDir::Lib {
		let stem = lib_stem(pattern);
		let suffix = match resolved {
			Some(p) if p.extension().map(|e| e == "a").unwrap_or(false) => LIB_STATIC_SUFFIX,
			_ => LIB_DYN_SUFFIX,
		};
		return format!("{LIB_PREFIX}{stem}{suffix}");
	}
	/* Keep any subdirectory components (openssl/ssl.h). */
	pattern.to_string()
}

/// Absolute name of the symlink for *pattern* under the build tree.
pub fn link_build_name(
	opts: &WorksiteOptions,
	dir: InstallDir,
	pattern: &str,
	resolved: Option<&Path>,
) -> PathBuf {
	opts.build_top().join(dir.as_str()).join(link_pat_path(dir, pattern, resolved))
}

fn pattern_regex(dir: InstallDir, pattern: &str) -> Result<Regex> {
	let pat = match dir {
		InstallDir::Lib => format!("^{LIB_PREFIX}{pattern}(-[0-9.]+)?(\\{LIB_STATIC_SUFFIX}|\\{LIB_DYN_SUFFIX})"),
		_ => format!("^{pattern}$"),
	};
	Regex::new(&pat).map_err(|e| Error::generic(format!("invalid file pattern {pattern}: {e}")))
}

/* Shallow for flat directories, deep where packages nest their files. */
fn walk_depth(dir: InstallDir) -> usize {
	match dir {
		InstallDir::Bin | InstallDir::Lib | InstallDir::Libexec => 1,
		InstallDir::Include | InstallDir::Etc | InstallDir::Share => 4,
	}
}

/// Scan *root* for files whose name relative to *root* matches *re*.
fn find_first_files(root: &Path, re: &Regex, depth: usize) -> Vec<PathBuf> {
	let mut found = Vec::new();
	for entry in WalkDir::new(root)
		.max_depth(depth)
		.follow_links(true)
		.into_iter()
		.filter_map(|e| e.ok())
	{
		if !entry.file_type().is_file() {
			continue;
		}
		let relative = match entry.path().strip_prefix(root) {
			Ok(r) => r,
			Err(_) => continue,
		};
		if re.is_match(&relative.to_string_lossy()) {
			found.push(entry.path().to_path_buf());
		}
	}
	found
}

fn candidate_version(path: &Path, excludes: &[ExcludedRange]) -> std::result::Result<Option<String>, ()> {
	/* The filename is the most specific source of a version number, parent
	 * directories (include/postgresql/9.4/...) the fallback. */
	for component in path.iter().rev() {
		for candidate in version_candidates(&component.to_string_lossy()) {
			if excluded(&candidate, excludes) {
				return Err(());
			}
			return Ok(Some(candidate));
		}
	}
	Ok(None)
}

fn is_dynamic(path: &Path) -> bool {
	path.to_string_lossy().contains(LIB_DYN_SUFFIX)
}

/// Resolve one pattern in one installation directory. Returns the chosen
/// file and the version embedded in its name, if any.
pub fn find_file(
	opts: &WorksiteOptions,
	dir: InstallDir,
	pattern: &str,
	excludes: &[ExcludedRange],
) -> Result<Option<(PathBuf, Option<String>)>> {
	/* Level two cache: a previously planted symlink. Libraries may have
	 * been linked under either suffix. */
	let mut links = vec![link_build_name(opts, dir, pattern, None)];
	if dir == InstallDir::Lib {
		links.push(opts.build_top().join(dir.as_str()).join(format!(
			"{LIB_PREFIX}{}{LIB_STATIC_SUFFIX}",
			lib_stem(pattern),
		)));
	}
	for link in links {
		if let Ok(target) = std::fs::read_link(&link) {
			if target.exists() {
				let version = candidate_version(&target, excludes).unwrap_or(None);
				return Ok(Some((target, version)));
			}
		}
	}

	let re = pattern_regex(dir, pattern)?;
	let depth = walk_depth(dir);
	let mut matches: Vec<(PathBuf, Option<String>)> = Vec::new();
	for root in opts.search_path(dir.as_str()) {
		if !root.is_dir() {
			continue;
		}
		for path in find_first_files(&root, &re, depth) {
			match candidate_version(&path, excludes) {
				Ok(version) => matches.push((path, version)),
				Err(()) => {},
			}
		}
	}
	/* Prefer higher versions; among libraries, dynamic over static. */
	matches.sort_by(|(lp, lv), (rp, rv)| {
		let by_version = match (lv, rv) {
			(Some(l), Some(r)) => version_compare(r, l),
			(Some(_), None) => std::cmp::Ordering::Less,
			(None, Some(_)) => std::cmp::Ordering::Greater,
			(None, None) => std::cmp::Ordering::Equal,
		};
		by_version.then_with(|| is_dynamic(rp).cmp(&is_dynamic(lp)))
	});
	Ok(matches.into_iter().next())
}

/// Resolve every pattern a prerequisite declares, walking installation
/// directories in search order. The first version found locks the rest of
/// the search.
pub fn find_prerequisite(opts: &WorksiteOptions, dep: &Dependency) -> Result<LocatedDependency> {
	let mut located = LocatedDependency {
		name: dep.name.clone(),
		files: BTreeMap::new(),
		version: None,
		complete: true,
	};
	let mut excludes = dep.excludes.clone();
	for dir in InstallDir::ALL {
		let patterns = dep.patterns(dir);
		if patterns.is_empty() {
			continue;
		}
		let mut resolved_patterns = Vec::with_capacity(patterns.len());
		for pattern in patterns {
			/* Level one cache: an already-resolved path that still exists. */
			if let Some(path) = &pattern.resolved {
				if path.exists() {
					resolved_patterns.push(pattern.clone());
					continue;
				}
			}
			match find_file(opts, dir, &pattern.pattern, &excludes)? {
				Some((path, version)) => {
					if located.version.is_none() {
						if let Some(version) = version {
							excludes.extend(lock_to_version(&version));
							located.version = Some(version);
						}
					}
					resolved_patterns.push(FilePattern {
						pattern: pattern.pattern.clone(),
						resolved: Some(path),
					});
				},
				None => {
					log::debug!("{}: no match for {} under {}", dep.name, pattern.pattern, dir);
					located.complete = false;
					resolved_patterns.push(FilePattern::new(pattern.pattern.clone()));
				},
			}
		}
		located.files.insert(dir, resolved_patterns);
	}
	Ok(located)
}

/// Resolve a whole prerequisite list.
pub fn find_prerequisites(
	opts: &WorksiteOptions,
	deps: &[Dependency],
) -> Result<Vec<LocatedDependency>> {
	deps.iter().map(|d| find_prerequisite(opts, d)).collect()
}

fn link_context(resolved: &Path, link: &Path) -> Result<()> {
	if let Some(parent) = link.parent() {
		std::fs::create_dir_all(parent)?;
	}
	if link.symlink_metadata().is_ok() {
		if !link.symlink_metadata()?.file_type().is_symlink() {
			/* Never clobber a real file that happens to be in the way. */
			return Ok(());
		}
		std::fs::remove_file(link)?;
	}
	std::os::unix::fs::symlink(resolved, link)?;
	Ok(())
}

/// Plant symlinks under `build_top` for every resolved file, so builds see
/// a single consistent tree and the next search short-circuits. Returns
/// the names of prerequisites that did not fully resolve.
pub fn link_dependencies(
	opts: &WorksiteOptions,
	located: &[LocatedDependency],
) -> Result<Vec<String>> {
	let mut missing = Vec::new();
	for dep in located {
		if !dep.complete {
			missing.push(dep.name.clone());
		}
		for (dir, patterns) in &dep.files {
			for pattern in patterns {
				if let Some(resolved) = &pattern.resolved {
					let link = link_build_name(opts, *dir, &pattern.pattern, Some(resolved));
					link_context(resolved, &link)?;
				}
			}
		}
	}
	Ok(missing)
}

#[cfg(test)]
mod test {
	use super::*;

	#[test] fn lib_links_normalize_the_pattern() { assert_eq!(link_pat_path(InstallDir::Lib, "z.*", None), format!("libz{LIB_DYN_SUFFIX}")) }
	#[test] fn static_libs_keep_their_suffix() { assert_eq!(link_pat_path(InstallDir::Lib, "z", Some(Path::new("/usr/lib/libz.a"))), "libz.a") }
	#[test] fn headers_keep_subdirectories() { assert_eq!(link_pat_path(InstallDir::Include, "openssl/ssl.h", None), "openssl/ssl.h") }

	#[test]
	fn version_comes_from_the_most_specific_component() {
		let v = candidate_version(Path::new("/usr/include/postgresql/9.4/libpq-fe.h"), &[]).unwrap();
		assert_eq!(v.as_deref(), Some("9.4"));
	}

	#[test]
	fn excluded_version_disqualifies_the_file() {
		let ranges = lock_to_version("2.0");
		assert!(candidate_version(Path::new("/usr/lib/libfoo-1.9.so"), &ranges).is_err());
		assert!(candidate_version(Path::new("/usr/lib/libfoo-2.0.so"), &ranges).is_ok());
	}

	#[test]
	fn resolved_pattern_short_circuits_the_scan() {
		let dir = tempfile::tempdir().unwrap();
		let opts = WorksiteOptions::rooted_at(dir.path());
		let hit = dir.path().join("zlib.h");
		std::fs::write(&hit, b"").unwrap();

		let mut dep = Dependency::named("zlib");
		dep.files.insert(
			InstallDir::Include,
			vec![FilePattern { pattern: "zlib.h".into(), resolved: Some(hit.clone()) }],
		);
		let located = find_prerequisite(&opts, &dep).unwrap();
		assert!(located.complete);
		assert_eq!(located.files[&InstallDir::Include][0].resolved.as_deref(), Some(hit.as_path()));
	}

	#[test]
	fn scan_finds_files_under_install_top() {
		let dir = tempfile::tempdir().unwrap();
		let opts = WorksiteOptions::rooted_at(dir.path());
		let include = dir.path().join("include");
		std::fs::create_dir_all(&include).unwrap();
		std::fs::write(include.join("zlib.h"), b"").unwrap();

		let mut dep = Dependency::named("zlib");
		dep.files.insert(InstallDir::Include, vec![FilePattern::new("zlib.h")]);
		let located = find_prerequisite(&opts, &dep).unwrap();
		assert!(located.complete);
	}

	#[test]
	fn a_planted_link_resolves_without_any_search_root() {
		let dir = tempfile::tempdir().unwrap();
		let opts = WorksiteOptions::rooted_at(dir.path());
		/* The real file lives outside every search root; only the cache
		 * link can find it. */
		let stash = dir.path().join("stash");
		std::fs::create_dir_all(&stash).unwrap();
		std::fs::write(stash.join("stashhdr.h"), b"").unwrap();
		let link = opts.build_top().join("include").join("stashhdr.h");
		std::fs::create_dir_all(link.parent().unwrap()).unwrap();
		std::os::unix::fs::symlink(stash.join("stashhdr.h"), &link).unwrap();

		let mut dep = Dependency::named("stash");
		dep.files.insert(InstallDir::Include, vec![FilePattern::new("stashhdr.h")]);
		let located = find_prerequisite(&opts, &dep).unwrap();
		assert!(located.complete);
		assert_eq!(
			located.files[&InstallDir::Include][0].resolved.as_deref(),
			Some(stash.join("stashhdr.h").as_path()),
		);
	}

	#[test]
	fn a_planted_static_link_hits_the_cache() {
		let dir = tempfile::tempdir().unwrap();
		let opts = WorksiteOptions::rooted_at(dir.path());
		let stash = dir.path().join("stash");
		std::fs::create_dir_all(&stash).unwrap();
		std::fs::write(stash.join("libquirk.a"), b"").unwrap();
		let link = opts.build_top().join("lib").join("libquirk.a");
		std::fs::create_dir_all(link.parent().unwrap()).unwrap();
		std::os::unix::fs::symlink(stash.join("libquirk.a"), &link).unwrap();

		let found = find_file(&opts, InstallDir::Lib, "quirk", &[]).unwrap();
		assert_eq!(found.map(|(p, _)| p), Some(stash.join("libquirk.a")));
	}

	#[test]
	fn incomplete_prerequisites_are_reported() {
		let dir = tempfile::tempdir().unwrap();
		let opts = WorksiteOptions::rooted_at(dir.path());
		let mut dep = Dependency::named("quirkdep");
		dep.files.insert(InstallDir::Include, vec![FilePattern::new("quirkdep.h")]);
		let located = find_prerequisites(&opts, &[dep]).unwrap();
		assert_eq!(link_dependencies(&opts, &located).unwrap(), vec!["quirkdep".to_string()]);
	}
}
