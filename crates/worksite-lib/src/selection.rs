//! Choosing how undecided projects are satisfied.
//!
//! When a traversal reaches a project that could either be checked out and
//! built or installed as a package, the decision is delegated through this
//! trait. Interactive front-ends prompt; batch runs use the unattended
//! implementation.

/// A project awaiting a decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
	pub name: String,
	pub description: Option<String>,
	pub installed_version: Option<String>,
}

impl Candidate {
	pub fn new(name: impl Into<String>) -> Self {
		Candidate { name: name.into(), description: None, installed_version: None }
	}
}

pub trait Selection {
	/// Split undecided projects into those to check out and build and
	/// those to install as packages. *reps* offers the projects with a
	/// repository, *packages* the rest; a declined checkout may still be
	/// returned on the install side. Projects returned in neither list are
	/// excluded from the traversal.
	fn select_checkout(
		&mut self,
		reps: &[Candidate],
		packages: &[Candidate],
	) -> (Vec<String>, Vec<String>);

	/// Pick any subset of *choices*.
	fn select_multiple(&mut self, descr: &str, choices: &[Candidate]) -> Vec<String>;
}

/// Takes every offer: all repository candidates are checked out, all
/// package candidates installed.
#[derive(Debug, Default)]
pub struct Unattended;

impl Selection for Unattended {
	fn select_checkout(
		&mut self,
		reps: &[Candidate],
		packages: &[Candidate],
	) -> (Vec<String>, Vec<String>) {
		(
			reps.iter().map(|c| c.name.clone()).collect(),
			packages.iter().map(|c| c.name.clone()).collect(),
		)
	}

	fn select_multiple(&mut self, _descr: &str, choices: &[Candidate]) -> Vec<String> {
		choices.iter().map(|c| c.name.clone()).collect()
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn unattended_takes_every_offer() {
		let (checkouts, installs) = Unattended
			.select_checkout(&[Candidate::new("zlib")], &[Candidate::new("libpng")]);
		assert_eq!(checkouts, vec!["zlib"]);
		assert_eq!(installs, vec!["libpng"]);
	}
}
