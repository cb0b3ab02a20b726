use clap::{Parser, Subcommand};
use log::{error, info, LevelFilter};
use std::path::PathBuf;
use std::process::ExitCode;

use chapter_harvester::browser::ChromeBrowser;
use chapter_harvester::report::log_reporter;
use chapter_harvester::{
    logging, ArchivePackager, CacheStore, ChapterWalker, Cleaner, Config, DedupPolicy,
    DuplicateReducer, HarvestError, ImageFetcher, PageHarvester, SeriesLayout, StopReason,
};

#[derive(Parser)]
#[command(name = "chapter-harvester", version, about = "Download, deduplicate and package comic chapters")]
struct Cli {
    /// Library root holding one folder per series (overrides the config file)
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// Configuration file (default: ./harvester.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// log4rs configuration file (default: ./log4rs.yml when present)
    #[arg(long, global = true)]
    log_config: Option<PathBuf>,

    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Walk chapters from URL until the stop chapter is downloaded
    Download {
        #[arg(long)]
        series: String,
        #[arg(long)]
        url: String,
        /// Last chapter number to download (decimals allowed)
        #[arg(long)]
        stop: String,
    },
    /// Delete images whose content repeats across the series
    Dedup {
        #[arg(long)]
        series: String,
        /// Keep one copy of each repeated image instead of removing all of them
        #[arg(long)]
        keep_first: bool,
    },
    /// Build one archive per chapter folder
    Package {
        #[arg(long)]
        series: String,
        /// Archive names are "<prefix> <chapter>.<ext>"
        #[arg(long)]
        prefix: String,
    },
    /// Remove chapter folders and archives
    Cleanup {
        #[arg(long)]
        series: String,
        /// Remove the image cache as well
        #[arg(long)]
        include_cache: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = cli.verbose.then_some(LevelFilter::Debug);
    if let Err(e) = logging::init(cli.log_config.as_deref(), level) {
        eprintln!("{}", e);
        return ExitCode::FAILURE;
    }

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), HarvestError> {
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(root) = cli.root {
        config.library_root = root;
    }
    let reporter = log_reporter();

    match cli.command {
        Command::Download { series, url, stop } => {
            let layout = SeriesLayout::new(&config.library_root, &series)?;
            let http = config.http.create_http_source()?;
            let cache = CacheStore::new(layout.cache_dir(), config.download.min_image_size);
            let fetcher = ImageFetcher::new(http, cache, reporter.clone());
            let harvester = PageHarvester::new(config.harvest.clone(), reporter.clone());
            let browser = ChromeBrowser::new(config.browser.clone())?;

            let walker = ChapterWalker::new(
                layout,
                browser,
                harvester,
                fetcher,
                config.download.clone(),
                reporter,
            )?;
            let outcome = walker.run(&url, &stop)?;

            info!(
                "Chapters: {} | Images saved: {}",
                outcome.chapter_labels().join(", "),
                outcome.images_saved()
            );
            if let StopReason::Aborted(e) = outcome.stop {
                return Err(e);
            }
        }

        Command::Dedup { series, keep_first } => {
            let layout = SeriesLayout::new(&config.library_root, &series)?;
            let policy = if keep_first { DedupPolicy::KeepFirst } else { config.dedup.policy };
            let report = DuplicateReducer::new(policy, reporter).run(&layout);
            if !report.failures.is_empty() {
                info!("{} files could not be processed", report.failures.len());
            }
        }

        Command::Package { series, prefix } => {
            let layout = SeriesLayout::new(&config.library_root, &series)?;
            let report = ArchivePackager::new(config.archive.extension.clone(), reporter)
                .run(&layout, &prefix)?;
            if !report.failures.is_empty() {
                info!("{} chapters could not be packaged", report.failures.len());
            }
        }

        Command::Cleanup { series, include_cache } => {
            let layout = SeriesLayout::new(&config.library_root, &series)?;
            let report = Cleaner::new(config.archive.extension.clone(), reporter)
                .with_cache(include_cache)
                .run(&layout);
            if !report.failures.is_empty() {
                info!("{} items could not be removed", report.failures.len());
            }
        }
    }

    Ok(())
}
