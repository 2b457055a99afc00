//! Magnetite demo driver: build a synthetic two-table catalog, run a
//! hash join through the engine, print a result summary.

use anyhow::Result;
use clap::Parser;
use core_exec::execute;
use core_pages::write::{i32_column, varchar_column};
use core_pages::{ColumnarTable, DataType};
use core_plan::{JoinNode, Node, OutputAttr, Plan};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;

/// CLI arguments.
#[derive(Parser, Debug)]
#[command(name = "magnetite", version, about = "Columnar hash-join engine demo")]
struct Args {
    /// Rows in the build-side table.
    #[arg(long, default_value_t = 100_000)]
    build_rows: usize,
    /// Rows in the probe-side table.
    #[arg(long, default_value_t = 500_000)]
    probe_rows: usize,
    /// Distinct join keys.
    #[arg(long, default_value_t = 20_000)]
    distinct: i32,
    /// Worker thread override (default: hardware concurrency).
    #[arg(long)]
    threads: Option<usize>,
    /// Optional configuration file path (overrides `magnetite.toml`).
    #[arg(long = "config")]
    config: Option<PathBuf>,
}

fn configure_logging() -> Result<Option<WorkerGuard>> {
    let log_dir = Path::new(".");
    let file_appender = tracing_appender::rolling::never(log_dir, "magnetite.log");
    let (nb_writer, guard) = tracing_appender::non_blocking(file_appender);
    match tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(nb_writer)
        .try_init()
    {
        Ok(_) => Ok(Some(guard)),
        Err(_) => {
            // Global subscriber already installed; drop the guard so the
            // writer shuts down.
            Ok(None)
        }
    }
}

fn demo_catalog(args: &Args) -> Vec<ColumnarTable> {
    let build_keys: Vec<Option<i32>> = (0..args.build_rows)
        .map(|i| Some(i as i32 % args.distinct))
        .collect();
    let build_labels: Vec<String> = (0..args.build_rows).map(|i| format!("row-{i}")).collect();
    let build_label_refs: Vec<Option<&str>> =
        build_labels.iter().map(|s| Some(s.as_str())).collect();
    let probe_keys: Vec<Option<i32>> = (0..args.probe_rows)
        .map(|i| Some((i as i32).wrapping_mul(7) % args.distinct))
        .collect();

    vec![
        ColumnarTable::new(
            args.build_rows,
            vec![i32_column(&build_keys), varchar_column(&build_label_refs)],
        ),
        ColumnarTable::new(args.probe_rows, vec![i32_column(&probe_keys)]),
    ]
}

fn demo_plan(inputs: Vec<ColumnarTable>) -> Plan {
    let join = Node::join(
        JoinNode {
            build_left: true,
            left: 0,
            right: 1,
            left_attr: 0,
            right_attr: 0,
        },
        vec![
            OutputAttr::new(0, DataType::Int32),
            OutputAttr::new(2, DataType::Int32),
            OutputAttr::new(1, DataType::Varchar),
        ],
    );
    Plan::new(
        vec![
            Node::scan(
                0,
                vec![
                    OutputAttr::new(0, DataType::Int32),
                    OutputAttr::new(1, DataType::Varchar),
                ],
            ),
            Node::scan(1, vec![OutputAttr::new(0, DataType::Int32)]),
            join,
        ],
        2,
        inputs,
    )
}

fn main() -> Result<()> {
    let _log_guard = configure_logging()?;
    let args = Args::parse();

    let mut config = core_plan::load_from(args.config.clone())?;
    if args.threads.is_some() {
        config.threads = args.threads;
    }
    info!(target: "runtime", ?config, "startup");

    let catalog = demo_catalog(&args);
    let plan = demo_plan(catalog);

    let started = Instant::now();
    let result = execute(&plan, &config)?;
    let elapsed = started.elapsed();

    info!(
        target: "runtime",
        rows = result.num_rows,
        columns = result.num_columns(),
        elapsed_ms = elapsed.as_millis() as u64,
        "query_complete"
    );
    println!(
        "joined {} build x {} probe rows -> {} output rows x {} columns in {:.1?}",
        args.build_rows,
        args.probe_rows,
        result.num_rows,
        result.num_columns(),
        elapsed
    );
    let pages: usize = result.columns.iter().map(|c| c.pages.len()).sum();
    println!("result occupies {pages} pages");
    Ok(())
}
