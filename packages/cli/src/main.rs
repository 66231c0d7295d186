#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! CLI entry point for listcrawl.

use std::path::PathBuf;
use std::time::Instant;

use clap::{Parser, Subcommand};
use listcrawl_cli_utils::{IndicatifProgress, init_logger};
use listcrawl_crawl::config::CrawlConfig;
use listcrawl_crawl::split::split_rows;
use listcrawl_crawl_models::SiteProfile;
use listcrawl_scraper::canonical::Canonicalizer;
use listcrawl_scraper::pagination::StopSignal;

#[derive(Parser)]
#[command(name = "listcrawl", about = "Resumable paginated listing crawler")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Crawl every seed row, appending records to the output CSV.
    /// Re-running with the same output resumes after the last finished row.
    Crawl {
        /// TOML run configuration. Every key is optional.
        #[arg(long, short)]
        config: Option<PathBuf>,
        /// Seed CSV (overrides `input`)
        input: Option<PathBuf>,
        /// Output CSV (overrides `output`)
        #[arg(long, short)]
        output: Option<PathBuf>,
        /// Progress file (overrides `progress`)
        #[arg(long)]
        progress: Option<PathBuf>,
        /// Never crawl rows before this 0-based index
        #[arg(long)]
        skip: Option<u64>,
        /// Rows walked at once
        #[arg(long)]
        concurrency: Option<usize>,
        /// Column holding the seed URL
        #[arg(long)]
        seed_column: Option<String>,
        /// Page layout: `directory` or `place`
        #[arg(long)]
        site: Option<SiteProfile>,
        /// Tag written to the `source_site` column
        #[arg(long)]
        source_site: Option<String>,
    },
    /// Split a seed CSV into N part files with the header repeated
    Split {
        /// CSV to split
        input: PathBuf,
        /// Number of parts
        #[arg(long, short, default_value = "5")]
        parts: usize,
        /// Directory for the parts (default: next to the input)
        #[arg(long)]
        out_dir: Option<PathBuf>,
    },
    /// Print the canonical form of each URL (empty line if it has none)
    Canonicalize {
        /// Raw link values
        #[arg(required = true)]
        urls: Vec<String>,
        /// Redirect parameter names, highest priority first
        #[arg(long, value_delimiter = ',')]
        redirect_params: Option<Vec<String>>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = init_logger();
    let cli = Cli::parse();

    match cli.command {
        Commands::Crawl {
            config,
            input,
            output,
            progress,
            skip,
            concurrency,
            seed_column,
            site,
            source_site,
        } => {
            let mut config = match config {
                Some(path) => CrawlConfig::load(&path)?,
                None => CrawlConfig::default(),
            };
            config.input = input.or(config.input);
            config.output = output.or(config.output);
            config.progress = progress.or(config.progress);
            config.skip = skip.unwrap_or(config.skip);
            config.concurrency = concurrency.unwrap_or(config.concurrency);
            config.seed_column = seed_column.unwrap_or(config.seed_column);
            config.site = site.unwrap_or(config.site);
            config.source_site = source_site.or(config.source_site);

            let stop = StopSignal::new();
            let ctrl_c = stop.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    log::warn!("Interrupted: finishing in-flight requests, no new rows will start");
                    ctrl_c.stop();
                }
            });

            let start = Instant::now();
            let bar = IndicatifProgress::rows_bar(&multi, "Crawling");
            let summary = listcrawl_crawl::run(&config, &stop, &bar).await?;

            log::info!("Finished in {:.1}s", start.elapsed().as_secs_f64());
            println!("{summary}");
        }
        Commands::Split {
            input,
            parts,
            out_dir,
        } => {
            for path in split_rows(&input, parts, out_dir.as_deref())? {
                println!("{}", path.display());
            }
        }
        Commands::Canonicalize {
            urls,
            redirect_params,
        } => {
            let canonicalizer = redirect_params.map_or_else(Canonicalizer::default, |params| {
                Canonicalizer::new(params.as_slice())
            });
            for url in &urls {
                println!("{}", canonicalizer.canonicalize(url).unwrap_or_default());
            }
        }
    }

    Ok(())
}
