//! A command line interface for running island benchmarks.

use core::time::Duration;
use std::io;

use avian_islands::prelude::*;
use bevy::app::{App, PluginsState};
use clap::Parser;

use crate::Benchmark;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// The name or number of the benchmark to run. Leave empty to run all benchmarks.
    #[arg(short, long)]
    pub name: Option<String>,

    /// The number of steps to run for each benchmark.
    #[arg(short, long, default_value_t = 500)]
    pub steps: u32,

    /// The number of times to repeat each benchmark.
    /// The results will be averaged over these repetitions.
    #[arg(short, long, default_value_t = 5)]
    pub repeat: u32,

    /// List all available benchmarks in a numbered list.
    #[arg(short, long)]
    pub list: bool,

    /// The output directory where results are written in CSV format.
    /// Leave empty to disable output.
    #[arg(short, long)]
    pub output: Option<String>,
}

impl Args {
    /// Parses the command line arguments and returns an `Args` instance.
    pub fn parse() -> Self {
        Parser::parse()
    }
}

#[derive(Clone, Copy, Debug)]
pub struct BenchmarkOptions {
    /// The number of steps to run for each benchmark.
    pub steps: u32,
    /// The number of times to repeat the benchmark.
    ///
    /// This is used to average the results over multiple runs.
    pub repeat: u32,
}

pub struct BenchmarkResult {
    /// The average time taken for a single step in the benchmark.
    pub average_time: Duration,
    /// The minimum time taken for a single step in the benchmark.
    pub min_time: Duration,
    /// The average number of awake islands per step.
    pub average_awake_islands: f64,
}

/// Lists all available benchmarks in the console.
pub fn list(benchmarks: &[Benchmark]) {
    println!("Available benchmarks:");
    for (i, benchmark) in benchmarks.iter().enumerate() {
        println!("{:>2}. {} ({})", i + 1, benchmark.name, benchmark.module);
    }
}

/// Runs the given benchmark and prints the results to the console.
///
/// If `--output` is specified, the results will also be written to a CSV file
/// in the specified directory.
pub fn run(benchmark: &Benchmark, args: &Args) {
    println!("Running benchmark '{}':", benchmark.name);

    let result = run_benchmark(benchmark.constructor, &options(args));

    println!("Avg step time (s): {}", result.average_time.as_secs_f64());
    println!("Min step time (s): {}", result.min_time.as_secs_f64());
    println!("Avg awake islands: {:.1}", result.average_awake_islands);

    if let Some(output_dir) = &args.output {
        let path = format!(
            "{output_dir}/{}.csv",
            benchmark.name.to_lowercase().replace(' ', "_")
        );
        let csv = format!(
            "benchmark,avg_step_ms,min_step_ms,avg_awake_islands\n{}\n",
            csv_row(benchmark.name, &result)
        );
        match write_csv(output_dir, &path, &csv) {
            Ok(()) => println!("Results written to {path}"),
            Err(error) => eprintln!("Failed to write results to {path}: {error}"),
        }
    }
}

/// Runs all benchmarks and prints the results to the console.
///
/// If `--output` is specified, the results will also be written to a CSV file
/// in the specified directory.
pub fn run_all(benchmarks: &[Benchmark], args: &Args) {
    println!("Running all benchmarks:");
    let max_benchmark_name_len = benchmarks.iter().map(|b| b.name.len()).max().unwrap_or(0);
    let name_width = max_benchmark_name_len.max(9);
    println!(
        "| benchmark{} | avg time / step | min time / step | awake islands |",
        " ".repeat(name_width - 9)
    );
    println!(
        "| {} | --------------- | --------------- | ------------- |",
        "-".repeat(name_width)
    );

    let mut results = Vec::new();
    for benchmark in benchmarks {
        let result = run_benchmark(benchmark.constructor, &options(args));
        println!(
            "| {:<name_width$} | {:>12.5} ms | {:>12.5} ms | {:>13.1} |",
            benchmark.name,
            result.average_time.as_secs_f64() * 1000.0,
            result.min_time.as_secs_f64() * 1000.0,
            result.average_awake_islands,
        );
        results.push((benchmark.name, result));
    }

    if let Some(output_dir) = &args.output {
        let mut csv = String::from("benchmark,avg_step_ms,min_step_ms,avg_awake_islands\n");
        for (name, result) in &results {
            csv.push_str(&csv_row(name, result));
            csv.push('\n');
        }
        let path = format!("{output_dir}/benchmarks.csv");
        match write_csv(output_dir, &path, &csv) {
            Ok(()) => println!("Results written to {path}"),
            Err(error) => eprintln!("Failed to write results to {path}: {error}"),
        }
    }
}

fn options(args: &Args) -> BenchmarkOptions {
    BenchmarkOptions {
        steps: args.steps.max(1),
        repeat: args.repeat.max(1),
    }
}

fn csv_row(name: &str, result: &BenchmarkResult) -> String {
    format!(
        "{name},{:.10},{:.10},{:.1}",
        result.average_time.as_secs_f64() * 1000.0,
        result.min_time.as_secs_f64() * 1000.0,
        result.average_awake_islands,
    )
}

fn write_csv(output_dir: &str, path: &str, csv: &str) -> io::Result<()> {
    std::fs::create_dir_all(output_dir)?;
    std::fs::write(path, csv)
}

fn run_benchmark(builder: impl Fn() -> App, options: &BenchmarkOptions) -> BenchmarkResult {
    let mut average_time = Duration::ZERO;
    let mut average_min_time = Duration::ZERO;
    let mut awake_islands = 0u64;

    for _ in 0..options.repeat {
        let mut app = builder();

        while app.plugins_state() != PluginsState::Ready {
            bevy::tasks::tick_global_task_pools_on_main_thread();
        }

        app.finish();
        app.cleanup();

        // Run the initial setup step before starting measurements to avoid skewing the results.
        app.update();

        let mut average_step_time = Duration::ZERO;
        let mut min_step_time = Duration::MAX;

        for _ in 0..options.steps {
            let start = std::time::Instant::now();
            app.update();
            let step_time = start.elapsed();

            average_step_time += step_time;
            min_step_time = min_step_time.min(step_time);

            let manager = app.world().resource::<IslandManager>();
            awake_islands += manager.output().solver_island_count() as u64;
        }

        average_step_time /= options.steps;

        average_time += average_step_time;
        average_min_time += min_step_time;
    }

    average_time /= options.repeat;
    average_min_time /= options.repeat;

    BenchmarkResult {
        average_time,
        min_time: average_min_time,
        average_awake_islands: awake_islands as f64 / (options.steps * options.repeat) as f64,
    }
}
