mod config;
mod cost;
mod extract;
mod models;
mod render;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use serde::Serialize;
use tracing::{info, warn, Level};

use config::RunConfig;
use cost::CostProjection;
use extract::{ExtractionReply, ExtractionService, OpenAiExtractor};
use models::{ExecutionStep, RenderedDocument};
use render::PageMaterializer;

#[derive(Parser)]
#[command(
    name = "review-scout",
    about = "Render a dynamic review or listing page, extract structured records, project cost"
)]
struct Cli {
    /// Built-in scrape profile to run
    #[arg(long, value_enum, default_value = "reviews")]
    profile: Profile,

    /// Reuse a previously captured HTML artifact instead of launching a browser
    #[arg(long, value_name = "PATH")]
    from_file: Option<PathBuf>,

    /// Run the browser with a visible window
    #[arg(long)]
    headed: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum Profile {
    /// ConsumerAffairs customer reviews ("Load more" pagination)
    Reviews,
    /// AutoNation car listings (scroll-hydrated tiles)
    Listings,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .init();

    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let credential = config::credential_from_env()?;
    let mut config = match cli.profile {
        Profile::Reviews => RunConfig::consumer_reviews(credential),
        Profile::Listings => RunConfig::car_listings(credential),
    };
    if cli.headed {
        config.headless = false;
    }

    info!("🔎 Review Scout");
    info!("================");

    let document = match &cli.from_file {
        Some(path) => {
            info!("Reading rendered document from {}", path.display());
            let html = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read {}", path.display()))?;
            RenderedDocument::new(config.target_url.clone(), html)
        }
        None => {
            // Scoped so Chrome is torn down before extraction starts.
            let document = {
                let materializer = PageMaterializer::new(config.headless)?;
                materializer.materialize(&config.target_url, &config.policy)?
            };
            persist_text(&document.html, &config.output_paths.html).await?;
            info!(
                "Rendered HTML saved → {}",
                config.output_paths.html.display()
            );
            document
        }
    };

    let extractor = OpenAiExtractor::new(config.credential.clone())?;
    info!("Starting {} extraction...", extractor.service_name());
    let run = extractor.submit(&document, &config.field_schema).await?;
    info!("Extraction finished.");

    persist_text(&to_pretty_json(&run.reply)?, &config.output_paths.json).await?;
    info!(
        "Extracted records saved → {}",
        config.output_paths.json.display()
    );

    preview(&run.reply)?;
    print_execution_info(&run.steps);

    let record_count = run.reply.records().map_or(0, |records| records.len());
    let total = cost::total_cost(&run.steps);
    report_projection(cost::project(
        total,
        record_count,
        &config.hypothetical_volumes,
    ));

    Ok(())
}

/// Write a text artifact, creating missing parent directories first.
async fn persist_text(content: &str, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    tokio::fs::write(path, content)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))
}

/// Pretty-print with 4-space indentation (serde_json defaults to 2).
fn to_pretty_json<T: Serialize>(value: &T) -> Result<String> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
    value.serialize(&mut serializer)?;
    Ok(String::from_utf8(buf)?)
}

/// Print the first two records as a sanity check. An unrecognized reply shape
/// degrades to a diagnostic instead of failing the run.
fn preview(reply: &ExtractionReply) -> Result<()> {
    match reply.records() {
        Some(records) => {
            let head: Vec<_> = records.iter().take(2).collect();
            println!("\nPreview of first {} record(s):", head.len());
            println!("{}", to_pretty_json(&head)?);
        }
        None => {
            warn!("Unexpected result shape returned by the extraction service; skipping preview");
        }
    }
    Ok(())
}

fn print_execution_info(steps: &[ExecutionStep]) {
    println!("\nExecution info:");
    for step in steps {
        let fields: Vec<String> = step
            .metadata
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect();
        println!("  {:<16} {}", step.name, fields.join("  "));
    }
}

fn report_projection(projection: CostProjection) {
    match projection {
        CostProjection::Available {
            total,
            record_count,
            per_record,
            lines,
        } => {
            println!(
                "\nRun summary • Records: {} • Total cost: ${:.4} • Cost/record: ${:.6}\n",
                record_count, total, per_record
            );
            println!("Cost projections:");
            for (volume, projected) in lines {
                println!(
                    " ▸ Estimated cost for {:>9} records :  {}",
                    cost::group_digits(volume),
                    cost::format_usd(projected)
                );
            }
        }
        CostProjection::Unavailable => {
            println!("\nUnable to project cost (zero records extracted or zero cost reported).");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn artifacts_use_four_space_indentation() {
        let json = to_pretty_json(&json!([{"car_price": "$27,584"}])).unwrap();
        assert!(json.contains("\n    {"));
        assert!(json.contains("\n        \"car_price\""));
    }
}
