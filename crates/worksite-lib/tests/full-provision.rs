use worksite::graph::StepGraph;
use worksite::index::{Dependency, FilePattern, InstallDir};
use worksite::scheduler;
use worksite::step::Step;
use worksite::RunContext;

fn header_dep() -> Dependency {
	let mut dep = Dependency::named("fixint");
	dep.files.insert(InstallDir::Include, vec![FilePattern::new("fixint.h")]);
	dep
}

#[test]
fn setup_links_then_make_builds() {
	let (_guard, options) = worksite_test_utils::test_options();
	worksite_test_utils::provide_file(&options, "include/fixint.h");
	worksite_test_utils::checkout(&options, "app");
	std::fs::write(options.src_dir("app").join("Makefile"), "all:\n\ttouch made\n")
		.expect("Makefile written");
	options.save_vars().expect("vars file written");

	let mut graph = StepGraph::new();
	let make = graph.add_step(Step::make("app"));
	let setup = graph.add_step(Step::setup("fixint", None, vec![header_dep()]));
	graph.add_prerequisite(make, setup);
	let order = graph.topological_order().expect("no circles");

	/* The setup marks itself updated, which is what lets the build run
	 * without being forced. */
	let mut ctx = RunContext::new(options.clone());
	let updated = scheduler::execute(&mut graph, &order, &mut ctx, None, true)
		.expect("setup and build succeed");
	assert_eq!(updated, 2);

	let link = options.build_top().join("include").join("fixint.h");
	assert!(link.symlink_metadata().expect("link planted").file_type().is_symlink());
	assert!(options.src_dir("app").join("made").exists());
}

#[test]
fn missing_prerequisites_stop_the_run() {
	let (_guard, options) = worksite_test_utils::test_options();

	let mut graph = StepGraph::new();
	graph.add_step(Step::setup("fixint", None, vec![header_dep()]));
	let order = graph.topological_order().expect("no circles");

	let mut ctx = RunContext::new(options);
	let err = scheduler::execute(&mut graph, &order, &mut ctx, None, true).unwrap_err();
	assert!(matches!(err, worksite::Error::MissingPrerequisites { .. }));
	assert_eq!(err.code(), 2);
}
