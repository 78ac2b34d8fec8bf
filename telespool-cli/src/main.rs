//! CLI for inspecting telespool spill directories.
//!
//! Provides commands for listing, decoding, and auditing the JSON spill
//! files the buffering core writes, plus a disk-tier microbenchmark.

use std::path::PathBuf;
use std::time::Instant;

use clap::{Parser, Subcommand};
use telespool::{estimated_size, format_size, parse_size, DiskRetentionPolicy};

/// telespool — spill directory inspection CLI.
#[derive(Parser)]
#[command(name = "telespool", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// List spill files in a directory, oldest first.
    List {
        /// Path to the spill directory.
        dir: PathBuf,

        /// Restrict the listing to one route's files.
        #[arg(long)]
        route: Option<String>,
    },

    /// Decode one spill file and print its contents.
    Dump {
        /// Path to the spill file.
        file: PathBuf,

        /// Print the raw JSON instead of the decoded summary.
        #[arg(long)]
        raw: bool,
    },

    /// Audit a route's spill files against its configured budgets.
    Check {
        /// Path to the spill directory.
        dir: PathBuf,

        /// The route whose files to audit.
        route: String,

        /// Disk budget to check against (e.g., "10MB").
        #[arg(long, default_value = "10MB")]
        disk_size: String,

        /// File count limit to check against (0 = unlimited).
        #[arg(long, default_value = "0")]
        max_files: u64,
    },

    /// Run a spill write/recover microbenchmark.
    Bench {
        /// Number of records to spill and recover.
        #[arg(long, default_value = "1000")]
        records: u64,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::List { dir, route } => cmd_list(&dir, route.as_deref()),
        Commands::Dump { file, raw } => cmd_dump(&file, raw),
        Commands::Check {
            dir,
            route,
            disk_size,
            max_files,
        } => cmd_check(&dir, &route, &disk_size, max_files),
        Commands::Bench { records } => cmd_bench(records),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

/// Implements `telespool list <dir>`.
fn cmd_list(dir: &PathBuf, route: Option<&str>) -> Result<(), Box<dyn std::error::Error>> {
    if !dir.is_dir() {
        return Err(format!("No spill directory at '{}'", dir.display()).into());
    }

    let policy = match route {
        Some(route) => DiskRetentionPolicy::for_route(dir, route)?,
        None => DiskRetentionPolicy::with_prefix(dir, "")?,
    };

    let mut files = policy.files()?;
    files.sort_by_key(|f| f.modified);

    println!("Spill directory: {}", dir.display());
    println!("{:<40} {:>12} {:>16}", "file", "bytes", "created_ms");
    for file in &files {
        let name = file
            .path
            .file_name()
            .map_or_else(String::new, |n| n.to_string_lossy().into_owned());
        let created = file
            .created_ms
            .map_or_else(|| "-".to_string(), |ms| ms.to_string());
        println!("{name:<40} {:>12} {created:>16}", file.len);
    }

    let stats = policy.stats();
    println!();
    println!(
        "{} files, {} ({} bytes)",
        stats.file_count,
        format_size(stats.size_bytes),
        stats.size_bytes
    );
    Ok(())
}

/// Implements `telespool dump <file>`.
fn cmd_dump(file: &PathBuf, raw: bool) -> Result<(), Box<dyn std::error::Error>> {
    if raw {
        println!("{}", std::fs::read_to_string(file)?);
        return Ok(());
    }

    let record = DiskRetentionPolicy::decode_file(file)?;
    println!("File: {}", file.display());
    println!("Route: {}", record.route);
    println!(
        "Estimated size: {} bytes (serialized: {} bytes)",
        estimated_size(&record),
        std::fs::metadata(file)?.len()
    );
    println!("Samples: {}", record.samples.len());
    for sample in &record.samples {
        println!(
            "  [{}] {}",
            sample.format(),
            sample.rendered_timestamp()
        );
        for field in sample.fields() {
            println!("    {} = {:?}", field.name, field.value);
        }
    }
    Ok(())
}

/// Implements `telespool check <dir> <route>`.
fn cmd_check(
    dir: &PathBuf,
    route: &str,
    disk_size: &str,
    max_files: u64,
) -> Result<(), Box<dyn std::error::Error>> {
    let limit = parse_size(disk_size)?;
    let policy = DiskRetentionPolicy::for_route(dir, route)?;
    let stats = policy.rescan()?;

    println!("Route: {route}");
    println!(
        "Disk usage: {} / {} ({} / {} bytes)",
        format_size(stats.size_bytes),
        format_size(limit),
        stats.size_bytes,
        limit
    );
    if max_files > 0 {
        println!("File count: {} / {max_files}", stats.file_count);
    } else {
        println!("File count: {} (unlimited)", stats.file_count);
    }

    let over_size = limit > 0 && stats.size_bytes > limit;
    let over_count = max_files > 0 && stats.file_count > max_files;
    if over_size || over_count {
        return Err("spill directory exceeds its configured budget".into());
    }
    println!("OK");
    Ok(())
}

/// Implements `telespool bench`.
#[allow(clippy::cast_precision_loss)] // Benchmark stats are fine with f64 precision
fn cmd_bench(records: u64) -> Result<(), Box<dyn std::error::Error>> {
    println!("telespool spill-path benchmark");
    println!("  Records: {records}");
    println!();

    let temp_dir = std::env::temp_dir().join("telespool_bench");
    let _ = std::fs::remove_dir_all(&temp_dir);
    let policy = DiskRetentionPolicy::for_route(&temp_dir, "bench")?;

    let mut record = telespool::DataRecord::new("bench");
    record.append_row(
        &["value", "label"],
        &[42.5.into(), "bench-probe".into()],
        chrono::Utc::now(),
        telespool::TimeFormat::UnixMillis,
    )?;

    let start = Instant::now();
    for _ in 0..records {
        policy.write(&record)?;
    }
    let write_elapsed = start.elapsed();

    let start = Instant::now();
    let mut recovered = 0u64;
    loop {
        let batch = policy.recover_eligible(u64::MAX, 0)?;
        if batch.is_empty() {
            break;
        }
        recovered += batch.len() as u64;
    }
    let recover_elapsed = start.elapsed();

    println!("Results:");
    println!(
        "  Spill: {write_elapsed:.3?} ({:.0} records/sec)",
        records as f64 / write_elapsed.as_secs_f64()
    );
    println!(
        "  Recover: {recover_elapsed:.3?} ({:.0} records/sec, {recovered} recovered)",
        recovered as f64 / recover_elapsed.as_secs_f64()
    );

    let _ = std::fs::remove_dir_all(&temp_dir);
    Ok(())
}
