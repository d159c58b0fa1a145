//! Main entry point for the xslview CLI application.
//!
//! Loads every input (local path or HTTP URL), runs the batch through the
//! pipeline and prints or writes the transformed documents.

use anyhow::{Result, bail};
use clap::Parser;
use futures::future::try_join_all;
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use xslview::files::InputFile;
use xslview::io::{self, Source};
use xslview::zip::ZipExtractor;
use xslview::{Cli, FileOutcome, Pipeline};

/// Application entry point.
///
/// Parses command-line arguments, installs logging and dispatches to either
/// archive listing or the transform pipeline.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(cli.log_level().as_str())),
        )
        .init();

    let sources: Vec<Box<dyn Source>> = cli.inputs.iter().map(|location| io::open(location)).collect();
    let inputs = try_join_all(sources.iter().map(|source| source.load())).await?;

    // List mode: display archive contents and exit
    if cli.list {
        return list_entries(&inputs, &cli);
    }

    let pipeline = Pipeline::new(cli.pipeline_config());
    let outcomes = pipeline.process(inputs).await?;

    let mut failed = 0;
    let show_names = outcomes.len() > 1;
    for outcome in &outcomes {
        match &outcome.result {
            Ok(markup) => write_result(outcome, markup, &cli, show_names).await?,
            Err(e) => {
                failed += 1;
                eprintln!("error: {e}");
            }
        }
    }

    if failed > 0 {
        bail!("{} of {} documents failed", failed, outcomes.len());
    }
    Ok(())
}

/// List entries of every archive input.
///
/// # Arguments
///
/// * `inputs` - Loaded inputs; non-archives are skipped with a warning
/// * `cli` - Parsed command-line arguments
///
/// # Returns
///
/// Returns `Ok(())` on success, or an error if an archive cannot be walked.
fn list_entries(inputs: &[InputFile], cli: &Cli) -> Result<()> {
    let archives: Vec<_> = inputs.iter().filter(|input| input.is_archive()).collect();
    for input in inputs.iter().filter(|input| !input.is_archive()) {
        warn!(name = %input.name, "not an archive; skipped");
    }

    for input in &archives {
        let entries = ZipExtractor::new(&input.name, &input.bytes)
            .strict(cli.strict)
            .list_files()?;

        if archives.len() > 1 {
            println!("--- {} ---", input.name);
        }
        println!("{:>10}  {:>10}  Name", "Length", "Size");
        println!("{}", "-".repeat(40));

        // Track totals for summary line
        let mut total_uncompressed = 0u64;
        let mut total_compressed = 0u64;
        let mut file_count = 0usize;

        for entry in &entries {
            println!(
                "{:>10}  {:>10}  {}",
                entry.uncompressed_size,
                entry.compressed_size(),
                entry.path
            );
            if !entry.is_directory {
                total_uncompressed += entry.uncompressed_size;
                total_compressed += entry.compressed_size() as u64;
                file_count += 1;
            }
        }

        println!("{}", "-".repeat(40));
        println!(
            "{:>10}  {:>10}  {} files",
            total_uncompressed, total_compressed, file_count
        );
    }

    Ok(())
}

/// Print one transformed document or write it into the output directory.
///
/// # Arguments
///
/// * `outcome` - The document the markup belongs to
/// * `markup` - Serialized transform output
/// * `cli` - Parsed command-line arguments
/// * `show_name` - If true, print a name marker before the markup on stdout
async fn write_result(outcome: &FileOutcome, markup: &str, cli: &Cli, show_name: bool) -> Result<()> {
    if let Some(ref dir) = cli.output_dir {
        let output_path = PathBuf::from(dir).join(&outcome.name);
        if let Some(parent) = output_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&output_path, markup).await?;

        if !cli.quiet {
            println!("  transformed: {}", output_path.display());
        }
        return Ok(());
    }

    let mut stdout = tokio::io::stdout();
    if show_name {
        stdout
            .write_all(format!("--- {} ---\n", outcome.name).as_bytes())
            .await?;
    }
    stdout.write_all(markup.as_bytes()).await?;
    stdout.write_all(b"\n").await?;
    stdout.flush().await?;
    Ok(())
}
