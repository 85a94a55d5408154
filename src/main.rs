//! CLI entry point for the album downloader.

use std::io::{self, IsTerminal, Read};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{debug, info, warn};
use url::Url;

use cascade_dl::pipeline;

mod cli;

use cli::Args;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt().with_env_filter(filter).init();

    debug!(?args, "CLI arguments parsed");

    // Gather raw input: positional URLs, an input file, or piped stdin
    let mut raw_lines: Vec<String> = args.urls.clone();
    if let Some(path) = &args.input_file {
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("could not read {}", path.display()))?;
        raw_lines.extend(text.lines().map(String::from));
    } else if raw_lines.is_empty() && !io::stdin().is_terminal() {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        raw_lines.extend(buffer.lines().map(String::from));
    }

    let mut seeds = Vec::new();
    for line in &raw_lines {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        match Url::parse(line) {
            Ok(url) => seeds.push(url),
            Err(e) => warn!(input = line, error = %e, "skipping invalid url"),
        }
    }

    if seeds.is_empty() {
        info!("No URLs to process. Pass them as arguments, via --input-file, or pipe them in.");
        info!("Example: cascade-dl https://cyberdrop.me/a/abc123");
        return Ok(ExitCode::SUCCESS);
    }

    info!(seeds = seeds.len(), "starting run");
    let settings = args.to_settings();
    let report = pipeline::run(&settings, seeds).await?;

    println!(
        "Downloaded {} file(s), skipped {}, failed {}",
        report.downloaded, report.skipped, report.failed
    );

    if report.downloaded == 0 && report.failed > 0 {
        return Ok(ExitCode::from(1));
    }
    Ok(ExitCode::SUCCESS)
}
