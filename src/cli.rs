//
// cli.rs
// Report-Tools-rs
//
// Clap command surface. Each verb loads the configuration, runs the blocking
// pipeline off the async runtime and prints its result as JSON.
//
// Report-Tools-rs maintainers - October 2026

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::config::ReportConfig;
use crate::models::{ImageItem, PushRequest};
use crate::products::Product;
use crate::repacs::RepacsClient;
use crate::scu::StoreScu;
use crate::{batch, image, push, report, web};

#[derive(Parser)]
#[command(name = "report-tools")]
#[command(about = "Report image conversion and PACS push tools", long_about = None)]
pub struct Cli {
    /// TOML configuration file; defaults plus environment overrides when absent
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Store a report image described by an ImageItem JSON file
    Report { item: PathBuf },
    /// Synthesize a film container from an ImageItem JSON file
    Film { item: PathBuf },
    /// Unregister and delete a film container
    RemoveFilm {
        #[arg(long)]
        product: Product,
        #[arg(long)]
        series: String,
        path: PathBuf,
    },
    /// Convert and push the rasters of a PushRequest JSON file
    Push { request: PathBuf },
    /// Convert every ImageItem JSON file under a directory
    Batch {
        #[arg(short, long)]
        directory: PathBuf,
    },
    /// Render a container frame to PNG
    Preview {
        input: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(long, default_value_t = 0)]
        frame: u32,
    },
    /// Start the HTTP API
    Serve {
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
        #[arg(short, long, default_value_t = 3000)]
        port: u16,
    },
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = fs::read(path).with_context(|| format!("Failed to read {:?}", path))?;
    serde_json::from_slice(&content).with_context(|| format!("Failed to parse {:?}", path))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Run blocking pipeline code on the blocking pool; the HTTP client must not
/// be created or dropped on a runtime worker.
async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .context("Blocking task failed")?
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = ReportConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Report { item } => {
            let path = blocking(move || {
                let item: ImageItem = read_json(&item)?;
                Ok(report::convert_report(&config, &item)?)
            })
            .await?;
            println!("Report image stored at {}", path.display());
        }
        Commands::Film { item } => {
            let path = blocking(move || {
                let item: ImageItem = read_json(&item)?;
                let store = RepacsClient::new(&config.repacs)?;
                Ok(report::convert_film(&config, &item, &store)?)
            })
            .await?;
            println!("Film container written to {}", path.display());
        }
        Commands::RemoveFilm {
            product,
            series,
            path,
        } => {
            let removed = blocking(move || {
                let store = RepacsClient::new(&config.repacs)?;
                Ok(report::remove_film(&config, product, &series, &path, &store)?)
            })
            .await?;
            println!("{}", if removed { "Film reference removed" } else { "Film reference not found" });
        }
        Commands::Push { request } => {
            let summary = blocking(move || {
                let request: PushRequest = read_json(&request)?;
                let lookup = RepacsClient::new(&config.repacs)?;
                Ok(push::report_push(&config, &request, &lookup, &StoreScu::new())?)
            })
            .await?;
            print_json(&summary)?;
        }
        Commands::Batch { directory } => {
            let summary = blocking(move || {
                let store = RepacsClient::new(&config.repacs)?;
                batch::process_directory(&config, &directory, &store)
            })
            .await?;
            print_json(&summary)?;
        }
        Commands::Preview {
            input,
            output,
            frame,
        } => {
            let output = output.unwrap_or_else(|| input.with_extension("png"));
            let bytes = blocking(move || image::container_preview_png(&input, frame)).await?;
            fs::write(&output, bytes).with_context(|| format!("Failed to write {:?}", output))?;
            println!("Preview saved to {}", output.display());
        }
        Commands::Serve { host, port } => web::start_server(config, &host, port).await?,
    }

    Ok(())
}
