use anyhow::Result;
use clap::Parser;
use console::style;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use bulkscribe::cli::{Cli, Commands};
use bulkscribe::config::Config;
use bulkscribe::engine::ModelSize;
use bulkscribe::expand::PlaylistExpander;
use bulkscribe::repurpose::Repurposer;
use bulkscribe::{pipeline, utils};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "bulkscribe=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let config = Config::load().await?;

    match cli.command {
        Commands::Transcribe {
            links,
            model,
            workers,
            output,
            repurpose,
        } => {
            // Check for required external dependencies (non-fatal here; the
            // run aborts later if a required tool really cannot be resolved)
            let missing_deps = utils::check_dependencies().await;
            if !missing_deps.is_empty() {
                eprintln!("⚠️  Dependency check warnings:");
                for dep in missing_deps {
                    eprintln!("   • {}", dep);
                }
                eprintln!("   (Continuing anyway - tools may be available)");
            }

            let expander = PlaylistExpander::new(config.tools.yt_dlp.clone());
            let items = expander.expand(&links).await;

            tracing::info!(
                "Transcribing {} video(s) with {} worker(s)",
                items.len(),
                workers
            );

            let summary = pipeline::run_bulk(items, model, workers, &output, &config).await?;

            println!(
                "{} {}/{} transcribed into {}",
                style("Done:").green().bold(),
                summary.succeeded,
                summary.total,
                output.display()
            );

            if repurpose && summary.succeeded > 0 {
                let repurposer = Repurposer::new(config.repurpose.clone())?;
                repurposer.repurpose_all(&output).await?;
            }
        }
        Commands::Repurpose { dir } => {
            let repurposer = Repurposer::new(config.repurpose.clone())?;
            let processed = repurposer.repurpose_all(&dir).await?;
            println!(
                "{} repurposed {} transcript(s) in {}",
                style("Done:").green().bold(),
                processed,
                dir.display()
            );
        }
        Commands::Models => {
            println!("Available Whisper model sizes:");
            for &size in ModelSize::all() {
                println!(
                    "  • {:<7} ~{:>5} MB  {}",
                    size.to_string(),
                    size.size_mb(),
                    size.description()
                );
            }
        }
        Commands::Config { show } => {
            if show {
                config.display();
            } else {
                Config::display_path()?;
            }
        }
    }

    Ok(())
}
