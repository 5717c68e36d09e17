//! Various helper functions for testing
//!
//! Workspaces are created under a temporary directory with the host forced
//! to an unmanaged platform, so no test ever invokes a real package
//! manager.

use std::path::Path;

use worksite::{PlatformFamily, ProjectIndex, WorksiteOptions};

/// A workspace rooted in a fresh temporary directory. Keep the guard
/// alive for the duration of the test.
pub fn test_options() -> (tempfile::TempDir, WorksiteOptions) {
	let dir = tempfile::tempdir().expect("failed to create temp workspace");
	let mut options = WorksiteOptions::rooted_at(dir.path());
	options.set_host("Test", PlatformFamily::Unmanaged);
	for sub in ["reps", "build", "include", "lib", "bin"] {
		fs_extra::dir::create_all(dir.path().join(sub), false)
			.expect("failed to create workspace tree");
	}
	(dir, options)
}

/// A small index with a source-built application, a source-built library
/// in between and a packaged leaf prerequisite.
pub fn fixture_index() -> ProjectIndex {
	ProjectIndex::from_json_str(
		r#"{"projects": [
			{"name": "app", "title": "example application", "repository": {"deps": {
				"libcodec": {"files": {"lib": ["codec"]}},
				"zcompress": {"files": {"include": ["zcompress.h"]}}
			}}},
			{"name": "libcodec", "repository": {"deps": {
				"zcompress": {"files": {"lib": ["zcompress"]}}
			}}},
			{"name": "zcompress", "packages": {"Test": {}}}
		]}"#,
	)
	.expect("fixture index is valid")
}

/// Simulate a checked-out source tree for *name*, with a Makefile.
pub fn checkout(options: &WorksiteOptions, name: &str) {
	let src_dir = options.src_dir(name);
	fs_extra::dir::create_all(&src_dir, false).expect("failed to create source dir");
	std::fs::write(src_dir.join("Makefile"), "all:\n\ttrue\n")
		.expect("failed to write Makefile");
}

/// Plant an empty file at `site_top/<relative>`, creating directories on
/// the way.
pub fn provide_file(options: &WorksiteOptions, relative: impl AsRef<Path>) {
	let path = options.site_top().join(relative.as_ref());
	if let Some(parent) = path.parent() {
		fs_extra::dir::create_all(parent, false).expect("failed to create parent dirs");
	}
	std::fs::write(path, b"").expect("failed to write file");
}
