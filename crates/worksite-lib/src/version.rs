//! Version number extraction and comparison.
//!
//! Versions here are not semver: anything that looks like digits joined by
//! dots or underscores (`1.2`, `1_41_0`, `2.0.5`) is a candidate. Comparison
//! is componentwise on the *string* components, never numeric, so that the
//! same ordering falls out no matter what tool produced the number. The
//! consequence is that `"9"` compares greater than `"10"` - a quirk that is
//! kept on purpose since exclusion ranges in project indexes were written
//! against it.

use std::cmp::Ordering;

use regex::Regex;
use serde::{Serialize, Deserialize};

/// Extract patterns from *line* that could be interpreted as version
/// numbers, i.e. every run of digits separated by dots and/or underscores.
pub fn version_candidates(line: &str) -> Vec<String> {
	let re = Regex::new(r"[0-9]+(?:[._][0-9]+)+").expect("version pattern is valid");
	re.find_iter(line).map(|m| m.as_str().to_string()).collect()
}

/// Compare two version numbers componentwise after splitting on `.`/`_`.
///
/// Components are compared as strings. When one version is a prefix of the
/// other, the shorter one compares less.
pub fn version_compare(left: &str, right: &str) -> Ordering {
	let left = left.replace('_', ".");
	let right = right.replace('_', ".");
	let mut lhs = left.split('.');
	let mut rhs = right.split('.');
	loop {
		match (lhs.next(), rhs.next()) {
			(Some(l), Some(r)) => match l.cmp(r) {
				Ordering::Equal => {},
				ord => return ord,
			},
			(None, Some(_)) => return Ordering::Less,
			(Some(_), None) => return Ordering::Greater,
			(None, None) => return Ordering::Equal,
		}
	}
}

/// Returns the version number with the smallest increment greater than *v*.
pub fn version_incr(v: &str) -> String {
	format!("{v}.1")
}

/// A half-open interval of versions disqualified from selection, usually
/// because a previously chosen version constrains all related searches.
///
/// A candidate `v` is excluded when `low <= v` (or no low bound) and
/// `v < high` (or no high bound).
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExcludedRange {
	pub low: Option<String>,
	pub high: Option<String>,
}

impl ExcludedRange {
	pub fn new(low: Option<&str>, high: Option<&str>) -> Self {
		ExcludedRange { low: low.map(str::to_string), high: high.map(str::to_string) }
	}

	pub fn excludes(&self, v: &str) -> bool {
		let above_low = match &self.low {
			Some(low) => version_compare(low, v) != Ordering::Greater,
			None => true,
		};
		let below_high = match &self.high {
			Some(high) => version_compare(v, high) == Ordering::Less,
			None => true,
		};
		above_low && below_high
	}
}

/// True when *v* falls inside any of *ranges*.
pub fn excluded(v: &str, ranges: &[ExcludedRange]) -> bool {
	ranges.iter().any(|r| r.excludes(v))
}

/// The exclusion ranges that pin every subsequent search to exactly the
/// already-selected *version*.
pub fn lock_to_version(version: &str) -> Vec<ExcludedRange> {
	vec![
		ExcludedRange::new(None, Some(version)),
		ExcludedRange::new(Some(&version_incr(version)), None),
	]
}
