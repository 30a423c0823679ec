//! pdfdesk console driver
//!
//! Reads one event per line from stdin and prints replies on stdout.
//! Logs go to stderr.

use anyhow::{Context, Result};
use clap::Parser;
use pdfdesk_session::{DiskStorage, Event, Orchestrator, Reply, Settings, UserId};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod delivery;
mod input;

use delivery::ConsoleDelivery;

#[derive(Parser, Debug)]
#[command(name = "pdfdesk")]
#[command(version, about = "Merge, split, rotate, compress and convert PDFs from the console")]
struct Args {
    /// TOML settings file
    #[arg(short, long, env = "PDFDESK_CONFIG")]
    config: Option<PathBuf>,

    /// Directory for uploaded and generated files (overrides the settings file)
    #[arg(long, env = "PDFDESK_TEMP_DIR")]
    temp_dir: Option<PathBuf>,

    /// Where delivered files are copied
    #[arg(short, long, env = "PDFDESK_OUTPUT_DIR", default_value = "pdfdesk-output")]
    output_dir: PathBuf,

    /// Session user id
    #[arg(short, long, env = "PDFDESK_USER", default_value_t = 1)]
    user: UserId,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,

    /// Directory containing the PDFium library
    #[cfg(feature = "pdfium")]
    #[arg(long, env = "PDFIUM_LIBRARY_DIR")]
    pdfium_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let mut settings = match &args.config {
        Some(path) => Settings::from_file(path)?,
        None => Settings::default(),
    };
    if let Some(dir) = &args.temp_dir {
        settings.temp_dir = dir.clone();
    }

    let storage = DiskStorage::new(&settings.temp_dir)
        .with_context(|| format!("Cannot use temp dir {}", settings.temp_dir.display()))?;
    let delivery = ConsoleDelivery::new(&args.output_dir)
        .with_context(|| format!("Cannot create output dir {}", args.output_dir.display()))?;
    info!(
        temp_dir = %settings.temp_dir.display(),
        output_dir = %args.output_dir.display(),
        "Starting pdfdesk v{}",
        env!("CARGO_PKG_VERSION")
    );

    let cleanup_interval = settings.cleanup_interval();
    let orchestrator = Orchestrator::new(settings, Arc::new(storage), Arc::new(delivery));
    let orchestrator = Arc::new(attach_renderer(orchestrator, &args));

    let sweeper = {
        let orchestrator = Arc::clone(&orchestrator);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(cleanup_interval);
            loop {
                interval.tick().await;
                let orchestrator = Arc::clone(&orchestrator);
                match tokio::task::spawn_blocking(move || orchestrator.sweep()).await {
                    Ok(removed) => debug!(removed, "Cleanup sweep finished"),
                    Err(e) => tracing::warn!(error = %e, "Cleanup sweep panicked"),
                }
            }
        })
    };

    let user = args.user;
    print_reply(&orchestrator.handle(user, Event::Start));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
        let event = match input::parse_line(&line) {
            Ok(Some(event)) => event,
            Ok(None) => continue,
            Err(message) => {
                println!("{}", message);
                continue;
            }
        };

        let handler = Arc::clone(&orchestrator);
        let reply = tokio::task::spawn_blocking(move || handler.handle(user, event))
            .await
            .context("Event handler panicked")?;
        print_reply(&reply);
    }

    info!("EOF reached, cleaning up");
    sweeper.abort();
    orchestrator.handle(user, Event::Cancel);
    Ok(())
}

fn print_reply(reply: &Reply) {
    println!("{}", reply.text);
    if let Some(outcome) = &reply.outcome {
        let metrics = &outcome.metrics;
        println!(
            "({} pages, {} -> {} bytes, {} ms)",
            metrics.page_count,
            metrics.input_size_bytes,
            metrics.output_size_bytes,
            metrics.processing_time_ms
        );
    }
    println!();
}

#[cfg(feature = "pdfium")]
fn attach_renderer(orchestrator: Orchestrator, args: &Args) -> Orchestrator {
    let renderer = match &args.pdfium_dir {
        Some(dir) => pdfdesk_core::PdfiumRenderer::with_library_dir(dir.clone()),
        None => pdfdesk_core::PdfiumRenderer::new(),
    };
    match renderer {
        Ok(renderer) => orchestrator.with_renderer(Arc::new(renderer)),
        Err(e) => {
            tracing::warn!(error = %e, "PDFium unavailable, PDF to image conversion disabled");
            orchestrator
        }
    }
}

#[cfg(not(feature = "pdfium"))]
fn attach_renderer(orchestrator: Orchestrator, _args: &Args) -> Orchestrator {
    orchestrator
}
