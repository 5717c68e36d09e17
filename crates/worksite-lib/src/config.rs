//! Workspace configuration.
//!
//! The configuration holds the roots of the workspace tree (where sources
//! are checked out, where intermediate files are built, where prerequisites
//! get linked) together with the values of configure variables answered in
//! previous runs. Most other routines depend on at least `src_top` and
//! `build_top`.

use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use serde::{Serialize, Deserialize};

pub const CONFIG_NAME: &str = "worksite.json";
pub const INDEX_NAME: &str = "worksite-index.json";
/// Variables in `name=value` form, loadable by both make and sh.
pub const VARS_NAME: &str = "worksite.mk";

/// The family of native package manager available on the host, detected
/// once and dispatched statically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlatformFamily {
	/// Debian, Ubuntu.
	Apt,
	/// Fedora.
	Yum,
	/// Darwin / MacPorts.
	Port,
	/// No supported package manager; projects must build from source.
	Unmanaged,
}

impl PlatformFamily {
	pub fn from_tag(tag: &str) -> PlatformFamily {
		match tag {
			"Debian" | "Ubuntu" => PlatformFamily::Apt,
			"Fedora" => PlatformFamily::Yum,
			"Darwin" => PlatformFamily::Port,
			_ => PlatformFamily::Unmanaged,
		}
	}
}

/// Detect the host platform tag ("Debian", "Fedora", "Darwin", ...).
pub fn detect_host_tag() -> String {
	if cfg!(target_os = "macos") {
		return "Darwin".to_string();
	}
	if let Ok(release) = std::fs::read_to_string("/etc/os-release") {
		for line in release.lines() {
			if let Some(id) = line.strip_prefix("ID=") {
				let id = id.trim_matches('"');
				let mut tag: String = id.to_string();
				if let Some(first) = tag.get_mut(0..1) {
					first.make_ascii_uppercase();
				}
				return tag;
			}
		}
	}
	"Unknown".to_string()
}

/// Workspace layout and persisted configure variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorksiteOptions {
	site_top: PathBuf,
	build_top: PathBuf,
	src_top: PathBuf,
	patch_top: PathBuf,
	install_top: PathBuf,
	host_tag: String,
	family: PlatformFamily,
	/// Values for configure variables, persisted across runs so a variable
	/// is only ever prompted once.
	variables: BTreeMap<String, String>,
}

impl Default for WorksiteOptions {
	fn default() -> Self {
		let site_top = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
		let host_tag = detect_host_tag();
		let family = PlatformFamily::from_tag(&host_tag);
		WorksiteOptions {
			build_top: site_top.join("build"),
			src_top: site_top.join("reps"),
			patch_top: site_top.join("patch"),
			install_top: site_top.clone(),
			site_top,
			host_tag,
			family,
			variables: BTreeMap::new(),
		}
	}
}

impl WorksiteOptions {
	/// A workspace rooted at *site_top* with the default sub-tree layout.
	pub fn rooted_at(site_top: impl AsRef<Path>) -> Self {
		let site_top = site_top.as_ref().to_path_buf();
		let host_tag = detect_host_tag();
		let family = PlatformFamily::from_tag(&host_tag);
		WorksiteOptions {
			build_top: site_top.join("build"),
			src_top: site_top.join("reps"),
			patch_top: site_top.join("patch"),
			install_top: site_top.clone(),
			site_top,
			host_tag,
			family,
			variables: BTreeMap::new(),
		}
	}

	pub fn site_top(&self) -> &Path {
		&self.site_top
	}

	pub fn build_top(&self) -> &Path {
		&self.build_top
	}

	pub fn src_top(&self) -> &Path {
		&self.src_top
	}

	pub fn install_top(&self) -> &Path {
		&self.install_top
	}

	/// The platform tag used to match `<package>` flavors ("Debian", ...).
	pub fn host(&self) -> &str {
		&self.host_tag
	}

	pub fn family(&self) -> PlatformFamily {
		self.family
	}

	/// Overrides host detection; used by tests and provisioning scripts.
	pub fn set_host(&mut self, tag: impl Into<String>, family: PlatformFamily) {
		self.host_tag = tag.into();
		self.family = family;
	}

	/// Where the source for *name* is checked out.
	pub fn src_dir(&self, name: &str) -> PathBuf {
		self.src_top.join(name)
	}

	/// Where patches for *name* are stored.
	pub fn patch_dir(&self, name: &str) -> PathBuf {
		self.patch_top.join(name)
	}

	/// Local filename a remote fetch lands at, keyed by the remote name.
	pub fn local_dir(&self, remote_name: &str) -> PathBuf {
		let base = remote_name.rsplit('/').next().unwrap_or(remote_name);
		self.site_top.join("resources").join(base)
	}

	pub fn bin_build_dir(&self) -> PathBuf {
		self.build_top.join("bin")
	}

	pub fn config_filename(&self) -> PathBuf {
		self.site_top.join(CONFIG_NAME)
	}

	pub fn index_filename(&self) -> PathBuf {
		self.site_top.join(INDEX_NAME)
	}

	pub fn vars_filename(&self) -> PathBuf {
		self.site_top.join(VARS_NAME)
	}

	/// Write the workspace layout and configure variables as `name=value`
	/// lines, the shape both `make -f` and `. ` accept.
	pub fn save_vars(&self) -> crate::Result<()> {
		std::fs::create_dir_all(&self.site_top)?;
		let mut out = String::new();
		out.push_str(&format!("siteTop={}\n", self.site_top.display()));
		out.push_str(&format!("buildTop={}\n", self.build_top.display()));
		out.push_str(&format!("srcTop={}\n", self.src_top.display()));
		out.push_str(&format!("installTop={}\n", self.install_top.display()));
		for (name, value) in &self.variables {
			out.push_str(&format!("{name}={value}\n"));
		}
		std::fs::write(self.vars_filename(), out)?;
		Ok(())
	}

	/// Filesystem roots to search for prerequisites installed under *dir*
	/// (`bin`, `include`, `lib`, ...). Derived from `$PATH` with the final
	/// `bin` component replaced by *dir*, prefixed by `install_top`.
	pub fn search_path(&self, dir: &str) -> Vec<PathBuf> {
		let mut roots = vec![self.install_top.join(dir)];
		if self.family == PlatformFamily::Port {
			roots.push(PathBuf::from("/opt/local").join(dir));
		}
		if let Ok(path) = std::env::var("PATH") {
			for entry in std::env::split_paths(&path) {
				let root = if entry.file_name().map(|n| n == "bin").unwrap_or(false) {
					entry.with_file_name(dir)
				} else {
					entry.join(dir)
				};
				if !roots.contains(&root) {
					roots.push(root);
				}
			}
		}
		roots
	}

	/* Configure variables */

	pub fn variable(&self, name: &str) -> Option<&str> {
		self.variables.get(name).map(String::as_str)
	}

	pub fn set_variable(&mut self, name: impl Into<String>, value: impl Into<String>) {
		self.variables.insert(name.into(), value.into());
	}

	pub fn load_from_disk(site_top: impl AsRef<Path>) -> crate::Result<Self> {
		let path = site_top.as_ref().join(CONFIG_NAME);
		let mut contents = String::new();
		std::fs::File::open(path)?.read_to_string(&mut contents)?;
		Ok(serde_json::from_str(&contents)?)
	}

	pub fn save_to_disk(&self) -> crate::Result<()> {
		std::fs::create_dir_all(&self.site_top)?;
		let mut f = std::fs::File::create(self.config_filename())?;
		f.write_all(serde_json::to_string_pretty(self)?.as_bytes())?;
		Ok(())
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test] fn debian_maps_to_apt() { assert_eq!(PlatformFamily::from_tag("Debian"), PlatformFamily::Apt) }
	#[test] fn unknown_tag_is_unmanaged() { assert_eq!(PlatformFamily::from_tag("Plan9"), PlatformFamily::Unmanaged) }

	#[test]
	fn layout_hangs_off_site_top() {
		let opts = WorksiteOptions::rooted_at("/tmp/ws");
		assert_eq!(opts.src_dir("zlib"), PathBuf::from("/tmp/ws/reps/zlib"));
		assert_eq!(opts.bin_build_dir(), PathBuf::from("/tmp/ws/build/bin"));
	}

	#[test]
	fn variables_round_trip() {
		let mut opts = WorksiteOptions::rooted_at("/tmp/ws");
		assert!(opts.variable("cc").is_none());
		opts.set_variable("cc", "gcc");
		assert_eq!(opts.variable("cc"), Some("gcc"));
	}
}
