use clap::Parser;
use sasplan::search::{
    heuristics::{EvaluatorOptions, HeuristicName},
    merge_and_shrink::{MergeStrategyName, ShrinkStrategyName},
    search_engines::{Scheduler, SearchEngineName},
    validate, Task, Verbosity,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::rc::Rc;
use std::time::Duration;
use tracing::{error, info};

/// Run the sasplan planner.
#[derive(Parser)]
#[command(version)]
struct Args {
    #[arg(help = "The translator output file (grounded task)")]
    task: PathBuf,
    #[arg(
        value_enum,
        help = "The search engine to use",
        short = 's',
        long = "search",
        id = "SEARCH",
        default_value_t = SearchEngineName::Bfs
    )]
    search_engine_name: SearchEngineName,
    #[arg(
        value_enum,
        help = "The heuristic evaluator to use",
        short = 'e',
        long = "evaluator",
        id = "EVALUATOR",
        default_value_t = HeuristicName::Cea
    )]
    heuristic_name: HeuristicName,
    #[arg(
        value_enum,
        help = "Optional second evaluator for the dual-queue best-first search",
        long = "secondary-evaluator",
        id = "SECONDARY"
    )]
    secondary_heuristic_name: Option<HeuristicName>,
    #[arg(
        help = "Run the full portfolio (best-first and iterative engines) \
                instead of a single engine",
        long = "portfolio"
    )]
    portfolio: bool,
    #[arg(
        help = "Portfolio time budgets, increasing (e.g. 1s,15s,60s,600s)",
        long = "budgets",
        value_delimiter = ','
    )]
    budgets: Vec<humantime::Duration>,
    #[arg(
        help = "Overall memory limit in MiB, checked during heuristic \
                construction and between search steps",
        long = "memory-limit-mb"
    )]
    memory_limit_mb: Option<usize>,
    #[arg(
        help = "Closed-list memory budget of the iterative engine in MiB",
        long = "iterative-memory-limit-mb",
        default_value_t = 2000
    )]
    iterative_memory_limit_mb: usize,
    #[arg(
        help = "Explicit PDB pattern as variable indices (sorted, unique)",
        long = "pattern",
        value_delimiter = ','
    )]
    pattern: Option<Vec<usize>>,
    #[arg(
        help = "Maximum number of abstract states per PDB",
        long = "pdb-max-size",
        default_value_t = 2_000_000
    )]
    pdb_max_size: usize,
    #[arg(
        help = "Maximum total number of abstract states in a PDB collection",
        long = "collection-max-size",
        default_value_t = 20_000_000
    )]
    collection_max_size: usize,
    #[arg(
        help = "Number of random-walk samples for PDB hill climbing",
        long = "num-samples",
        default_value_t = 1000
    )]
    num_samples: usize,
    #[arg(
        help = "Minimum number of improved samples to keep hill climbing",
        long = "min-improvement",
        default_value_t = 10
    )]
    min_improvement: usize,
    #[arg(
        help = "Maximum number of abstract states in merge-and-shrink",
        long = "max-abstract-states",
        default_value_t = 1000
    )]
    max_abstract_states: usize,
    #[arg(
        help = "Maximum abstraction size right before a merge",
        long = "max-abstract-states-before-merge",
        default_value_t = 1000
    )]
    max_abstract_states_before_merge: usize,
    #[arg(
        help = "Number of merge-and-shrink abstractions to maximize over",
        long = "abstraction-count",
        default_value_t = 1
    )]
    abstraction_count: usize,
    #[arg(
        value_enum,
        help = "Merge strategy for merge-and-shrink",
        long = "merge-strategy",
        default_value_t = MergeStrategyName::CgGoalLevel
    )]
    merge_strategy: MergeStrategyName,
    #[arg(
        value_enum,
        help = "Shrink strategy for merge-and-shrink",
        long = "shrink-strategy",
        default_value_t = ShrinkStrategyName::HighFLowH
    )]
    shrink_strategy: ShrinkStrategyName,
    #[arg(
        help = "Apply label reduction before merging (orthogonal merges only)",
        long = "label-reduction"
    )]
    label_reduction: bool,
    #[arg(
        help = "Use an exact Dijkstra frontier in the FF exploration",
        long = "ff-exact-queue"
    )]
    ff_exact_queue: bool,
    #[arg(help = "Seed for all randomized components", long = "seed", default_value_t = 2011)]
    seed: u64,
    #[arg(
        help = "Where to write the plan",
        long = "plan-file",
        default_value = "sas_plan"
    )]
    plan_file: PathBuf,
    #[arg(help = "Validate the plan before writing it", long = "validate")]
    validate: bool,
    #[arg(
        value_enum,
        help = "The verbosity level",
        short = 'v',
        long = "verbosity",
        id = "VERBOSITY",
        default_value_t = Verbosity::Normal
    )]
    verbosity: Verbosity,
    #[arg(help = "Whether to use coloured output", short = 'c', long = "colour")]
    colour: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let level: tracing::Level = args.verbosity.into();
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_ansi(args.colour)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let task = match Task::from_path(&args.task) {
        Ok(task) => Rc::new(task),
        Err(error) => {
            eprintln!("{error}");
            return ExitCode::FAILURE;
        }
    };
    info!(
        search = %args.search_engine_name,
        evaluator = %args.heuristic_name,
        portfolio = args.portfolio,
        "planner configured"
    );

    match plan(&args, task) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(error) => {
            eprintln!("{error}");
            ExitCode::FAILURE
        }
    }
}

fn plan(args: &Args, task: Rc<Task>) -> Result<bool, Box<dyn std::error::Error>> {
    let evaluator_options = EvaluatorOptions {
        ff_exact_queue: args.ff_exact_queue,
        pattern: args.pattern.clone(),
        pdb_max_size: args.pdb_max_size,
        collection_max_size: args.collection_max_size,
        num_samples: args.num_samples,
        min_improvement: args.min_improvement,
        max_abstract_states: args.max_abstract_states,
        max_abstract_states_before_merge: args.max_abstract_states_before_merge,
        abstraction_count: args.abstraction_count,
        merge_strategy: args.merge_strategy,
        shrink_strategy: args.shrink_strategy,
        label_reduction: args.label_reduction,
        seed: args.seed,
        memory_limit_mb: args.memory_limit_mb,
    };

    let mut scheduler = Scheduler::new(args.memory_limit_mb);
    if args.portfolio {
        scheduler.add_engine(SearchEngineName::Bfs.create(
            task.clone(),
            args.heuristic_name,
            args.secondary_heuristic_name,
            &evaluator_options,
            args.iterative_memory_limit_mb,
        )?);
        scheduler.add_engine(SearchEngineName::Iterative.create(
            task.clone(),
            args.heuristic_name,
            None,
            &evaluator_options,
            args.iterative_memory_limit_mb,
        )?);
    } else {
        scheduler.add_engine(args.search_engine_name.create(
            task.clone(),
            args.heuristic_name,
            args.secondary_heuristic_name,
            &evaluator_options,
            args.iterative_memory_limit_mb,
        )?);
    }

    if args.budgets.is_empty() {
        if args.portfolio {
            for seconds in [1, 15, 60, 600, 2000] {
                scheduler.add_time_limit(Duration::from_secs(seconds));
            }
        } else {
            scheduler.add_time_limit(Duration::from_secs(2000));
        }
    } else {
        for budget in &args.budgets {
            scheduler.add_time_limit((*budget).into());
        }
    }

    let solved = scheduler.search();
    if solved {
        let plan = scheduler.plan();
        if args.validate && !validate(&task, plan) {
            error!("the produced plan failed validation");
            return Ok(false);
        }
        plan.write(&args.plan_file, &task)?;
        println!("{}", plan.to_text(&task));
        println!("Plan length: {} step(s).", plan.len());
        println!("Plan cost: {}", plan.cost(&task));
        scheduler.statistics().log();
        info!("solution found");
    } else {
        info!("no solution found");
    }
    Ok(solved)
}
