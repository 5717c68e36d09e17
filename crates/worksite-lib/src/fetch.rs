//! Downloading remote files into the workspace resource cache.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::PathBuf;

use crate::config::WorksiteOptions;
use crate::error::{Error, Result};

/// Filter *fetches* down to the entries not already present in the local
/// cache. A cached file with a checksum mismatch counts as absent and will
/// be downloaded again.
pub fn find_cache(
	opts: &WorksiteOptions,
	fetches: &BTreeMap<String, Option<String>>,
) -> BTreeMap<String, Option<String>> {
	let mut missing = BTreeMap::new();
	for (remote_name, expected) in fetches {
		let local = opts.local_dir(remote_name);
		let cached = match (local.exists(), expected) {
			(false, _) => false,
			(true, None) => true,
			(true, Some(expected)) => match sha256::try_digest(local.as_path()) {
				Ok(digest) => {
					if digest != *expected {
						log::warn!("{}: checksum differs from the index", local.display());
					}
					digest == *expected
				},
				Err(_) => false,
			},
		};
		if !cached {
			missing.insert(remote_name.clone(), expected.clone());
		}
	}
	missing
}

/// Download *remote_name* into the resource cache, verifying the checksum
/// when one is declared. Returns the local filename.
pub fn fetch(
	opts: &WorksiteOptions,
	remote_name: &str,
	expected: Option<&str>,
) -> Result<PathBuf> {
	let local = opts.local_dir(remote_name);
	if let Some(parent) = local.parent() {
		std::fs::create_dir_all(parent)?;
	}
	log::info!("fetching {} ...", remote_name);
	let response = reqwest::blocking::get(remote_name)?.error_for_status()?;
	let body = response.bytes()?;
	let mut f = std::fs::File::create(&local)?;
	f.write_all(&body)?;
	drop(f);

	if let Some(expected) = expected {
		let digest = sha256::try_digest(local.as_path())?;
		if digest != expected {
			std::fs::remove_file(&local)?;
			return Err(Error::generic(format!(
				"checksum mismatch for {remote_name}: expected {expected}, downloaded {digest}"
			)));
		}
	}
	Ok(local)
}

/// Download every entry of *fetches* that is not already cached.
pub fn fetch_all(
	opts: &WorksiteOptions,
	fetches: &BTreeMap<String, Option<String>>,
) -> Result<Vec<PathBuf>> {
	let mut fetched = Vec::new();
	for (remote_name, expected) in find_cache(opts, fetches) {
		fetched.push(fetch(opts, &remote_name, expected.as_deref())?);
	}
	Ok(fetched)
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn cached_file_is_not_refetched() {
		let dir = tempfile::tempdir().unwrap();
		let opts = WorksiteOptions::rooted_at(dir.path());
		let local = opts.local_dir("https://host/files/pkg-1.0.tar.gz");
		std::fs::create_dir_all(local.parent().unwrap()).unwrap();
		std::fs::write(&local, b"payload").unwrap();

		let mut fetches = BTreeMap::new();
		fetches.insert("https://host/files/pkg-1.0.tar.gz".to_string(), None);
		fetches.insert("https://host/files/other-2.0.tar.gz".to_string(), None);
		let missing = find_cache(&opts, &fetches);
		assert_eq!(
			missing.keys().collect::<Vec<_>>(),
			vec!["https://host/files/other-2.0.tar.gz"],
		);
	}

	#[test]
	fn checksum_mismatch_counts_as_missing() {
		let dir = tempfile::tempdir().unwrap();
		let opts = WorksiteOptions::rooted_at(dir.path());
		let local = opts.local_dir("pkg.tar.gz");
		std::fs::create_dir_all(local.parent().unwrap()).unwrap();
		std::fs::write(&local, b"payload").unwrap();

		let mut fetches = BTreeMap::new();
		fetches.insert("pkg.tar.gz".to_string(), Some("0".repeat(64)));
		assert_eq!(find_cache(&opts, &fetches).len(), 1);

		let digest = sha256::try_digest(local.as_path()).unwrap();
		fetches.insert("pkg.tar.gz".to_string(), Some(digest));
		assert!(find_cache(&opts, &fetches).is_empty());
	}
}
