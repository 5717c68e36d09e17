use std::io::Write;

use worksite::closure::Strategy;
use worksite::scheduler;
use worksite::selection::{Candidate, Selection, Unattended};
use worksite::step::Priority;
use worksite::{ClosureEngine, ProjectIndex, RunContext, WorksiteOptions};

fn main() {
	env_logger::init();

	let mut opts;

	/* Parse console input */
	let parsed_options = {
		let args: Vec<String> = std::env::args().collect();

		opts = getopts::Options::new();
		opts.optflag( "h", "help",       "Show help");
		opts.optflag( "v", "verbose",    "Increased verbosity");
		opts.optflag( "b", "batch",      "Never prompt, take default answers");
		opts.optopt(  "s", "site",       "Workspace root directory", "DIR");
		opts.parsing_style(getopts::ParsingStyle::FloatingFrees);

		let parsed_options = match opts.parse(&args[1..]) {
			Ok(m)  => { m }
			Err(e) => { println!("Unable to parse options: {}", e); return }
		};

		if parsed_options.opt_present("h") {
			eprintln!("{}", opts.usage("usage: worksite [options] build|make|deps|update|install NAMES..."));
			return;
		}

		parsed_options
	};

	let site_top = parsed_options
		.opt_str("s")
		.map(std::path::PathBuf::from)
		.unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| ".".into()));

	let options = WorksiteOptions::load_from_disk(&site_top).unwrap_or_else(|e| {
		log::warn!("Failed to read config file: {}", e);
		log::warn!("Using default config.");
		WorksiteOptions::rooted_at(&site_top)
	});

	let index = match ProjectIndex::load_from_disk(options.index_filename()) {
		Ok(index) => index,
		Err(e) => {
			log::error!("Failed to load the project index from {}: {}", options.index_filename().display(), e);
			std::process::exit(1);
		}
	};

	if parsed_options.free.is_empty() {
		log::error!("No command given, see --help.");
		std::process::exit(1);
	}

	let command = parsed_options.free[0].as_str();
	let names: Vec<String> = parsed_options.free[1..].to_vec();
	let batch = parsed_options.opt_present("b");

	let result = match command {
		"build"   => run_closure(Strategy::Build, &names, &index, options, batch, None),
		"make"    => run_closure(Strategy::Make, &names, &index, options, batch, None),
		"deps"    => run_closure(Strategy::MakeDep, &names, &index, options, batch, None),
		"update"  => run_closure(Strategy::Build, &names, &index, options, batch,
			Some(vec![Priority::Update])),
		"install" => install(&names, &index, options),
		_ => {
			log::error!("Unknown command: {}", command);
			std::process::exit(1);
		}
	};

	if let Err(e) = result {
		log::error!("{}", e);
		std::process::exit(e.code());
	}
}

fn run_closure(
	strategy: Strategy,
	roots: &[String],
	index: &ProjectIndex,
	options: WorksiteOptions,
	batch: bool,
	priorities: Option<Vec<Priority>>,
) -> worksite::Result<()> {
	if roots.is_empty() {
		return Err(worksite::Error::generic("no project names given"));
	}
	let selection: Box<dyn Selection> = if batch {
		Box::new(Unattended)
	} else {
		Box::new(TerminalSelection)
	};
	let log_file = options.site_top().join("log").join("worksite.log");
	let mut dgen = ClosureEngine::new(strategy, roots, options.clone(), selection);
	let order = index.closure(&mut dgen)?;

	let mut ctx = RunContext::new(options).with_log(log_file)?;
	ctx.unattended = batch;
	ctx.force_update = strategy.force_update();
	let updated = scheduler::execute(
		dgen.graph_mut(),
		&order,
		&mut ctx,
		priorities.as_deref(),
		strategy.stop_after_error(),
	)?;
	log::info!("{} step(s) changed the workspace, {} project(s) pulled new sources",
		updated, ctx.updated_projects);
	Ok(())
}

fn install(names: &[String], index: &ProjectIndex, options: WorksiteOptions) -> worksite::Result<()> {
	if names.is_empty() {
		return Err(worksite::Error::generic("no package names given"));
	}
	let mut ctx = RunContext::new(options);
	worksite::installer::install(names, index, &mut ctx)
}

/// Asks on the console, one candidate at a time. Empty answers take the
/// default.
struct TerminalSelection;

fn ask(question: &str) -> bool {
	print!("{} [Y/n] ", question);
	let _ = std::io::stdout().flush();
	let mut answer = String::new();
	if std::io::stdin().read_line(&mut answer).is_err() {
		return true;
	}
	!answer.trim().eq_ignore_ascii_case("n")
}

impl Selection for TerminalSelection {
	fn select_checkout(
		&mut self,
		reps: &[Candidate],
		packages: &[Candidate],
	) -> (Vec<String>, Vec<String>) {
		let mut checkouts = Vec::new();
		for candidate in reps {
			if ask(&format!("Checkout and build {}?", candidate.name)) {
				checkouts.push(candidate.name.clone());
			}
		}
		/* A declined checkout falls down to the install question. */
		let mut installs = Vec::new();
		for candidate in packages.iter().chain(reps) {
			if checkouts.contains(&candidate.name) || installs.contains(&candidate.name) {
				continue;
			}
			if ask(&format!("Install {}?", candidate.name)) {
				installs.push(candidate.name.clone());
			}
		}
		(checkouts, installs)
	}

	fn select_multiple(&mut self, descr: &str, choices: &[Candidate]) -> Vec<String> {
		choices
			.iter()
			.filter(|c| ask(&format!("{}: include {}?", descr, c.name)))
			.map(|c| c.name.clone())
			.collect()
	}
}
