use clap::Parser;
use sasplan::search::Task;
use std::path::PathBuf;
use std::process::ExitCode;

/// Parse a translator output file and dump a task summary.
#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Args {
    #[arg(value_name = "TASK", help = "The translator output file")]
    task: PathBuf,
}

fn main() -> ExitCode {
    let args = Args::parse();
    let task = match Task::from_path(&args.task) {
        Ok(task) => task,
        Err(error) => {
            eprintln!("{error}");
            return ExitCode::FAILURE;
        }
    };

    println!("use metric: {}", task.use_metric);
    println!(
        "action costs: {}..{}",
        task.min_action_cost, task.max_action_cost
    );
    println!("variables ({}):", task.variables.len());
    for var in &task.variables {
        println!(
            "  {} (range {}{})",
            var.name,
            var.domain_size,
            match var.axiom_layer {
                Some(layer) => format!(", axiom layer {layer}"),
                None => String::new(),
            }
        );
    }
    println!("operators: {}", task.operators.len());
    println!("axioms: {}", task.axioms.len());
    println!("goal facts: {}", task.goal.len());
    ExitCode::SUCCESS
}
