use worksite::closure::{ClosureEngine, Strategy};
use worksite::selection::Unattended;

fn ordered_ids(strategy: Strategy, roots: &[&str]) -> Vec<String> {
	let (_guard, options) = worksite_test_utils::test_options();
	let index = worksite_test_utils::fixture_index();
	let roots: Vec<String> = roots.iter().map(|s| s.to_string()).collect();
	let mut dgen = ClosureEngine::new(strategy, &roots, options, Box::new(Unattended));
	let order = index.closure(&mut dgen).expect("fixture index has no circles");
	order.iter().map(|&i| dgen.graph().step(i).id.clone()).collect()
}

#[test]
fn every_reachable_project_contributes_exactly_once() {
	let ids = ordered_ids(Strategy::Build, &["app"]);
	for id in ["install_zcompress", "zcompressSetup", "libcodec", "libcodecSetup", "app"] {
		assert_eq!(
			ids.iter().filter(|i| *i == id).count(), 1,
			"expected exactly one {id} in {ids:?}",
		);
	}
}

#[test]
fn prerequisites_always_precede_their_dependents() {
	let ids = ordered_ids(Strategy::Build, &["app"]);
	let pos = |id: &str| ids.iter().position(|i| i == id).unwrap_or_else(|| panic!("{id} missing from {ids:?}"));

	/* The packaged leaf installs before anything links against it. */
	assert!(pos("install_zcompress") < pos("zcompressSetup"));
	/* The library builds after its prerequisites are linked and before
	 * the application links against it. */
	assert!(pos("zcompressSetup") < pos("libcodec"));
	assert!(pos("libcodec") < pos("libcodecSetup"));
	assert!(pos("libcodecSetup") < pos("app"));
}

#[test]
fn two_roots_share_their_closure() {
	let ids = ordered_ids(Strategy::Build, &["app", "libcodec"]);
	assert_eq!(ids.iter().filter(|i| *i == "libcodec").count(), 1);
	assert_eq!(ids.iter().filter(|i| *i == "zcompressSetup").count(), 1);
}

#[test]
fn running_the_closure_twice_yields_the_same_order() {
	assert_eq!(
		ordered_ids(Strategy::Build, &["app"]),
		ordered_ids(Strategy::Build, &["app"]),
	);
}
