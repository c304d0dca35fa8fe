use std::path::PathBuf;
use std::process::ExitCode;
use std::str::FromStr;

use log::{error, info, warn};

use gmaps_scraper_lib::batch_manager::{BatchConfig, BatchRunner};
use gmaps_scraper_lib::browser::{BrowserConfig, MapsPlacePage, MapsSearchPage, MapsSession};
use gmaps_scraper_lib::link_extractor::LinkExtractor;
use gmaps_scraper_lib::master_store::MasterStore;
use gmaps_scraper_lib::resume_manager::{ResumeManager, PROGRESS_FILE};
use gmaps_scraper_lib::scroller::ScrollPolicy;
use gmaps_scraper_lib::{fsio, link_loader, logger};

const DEFAULT_LINKS_FILE: &str = "place_links.json";
const FAILURES_FILE: &str = "failed_links.json";
const PROFILE_PREFIX: &str = "gmaps_profile_part";

const USAGE: &str = "\
Usage:
  gmaps-review-scraper links --query <q> [--out <file>] [--headless]
  gmaps-review-scraper batch [--links <file>] [--out-dir <dir>] [--chunk-size N]
                             [--retries N] [--min-delay S] [--max-delay S]
                             [--max-reviews N] [--profile <dir>] [--headless]
";

fn main() -> ExitCode {
    logger::init();
    let args: Vec<String> = std::env::args().skip(1).collect();

    let result = match args.first().map(String::as_str) {
        Some("links") => run_links(&args[1..]),
        Some("batch") => run_batch(&args[1..]),
        _ => {
            eprint!("{USAGE}");
            return ExitCode::FAILURE;
        }
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            error!("Fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run_links(args: &[String]) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let Some(query) = value(args, "--query") else {
        eprint!("{USAGE}");
        return Ok(ExitCode::FAILURE);
    };
    let out = value(args, "--out").unwrap_or(DEFAULT_LINKS_FILE);

    let session = MapsSession::launch(BrowserConfig {
        headless: flag(args, "--headless"),
        ..BrowserConfig::default()
    })?;
    let mut page = MapsSearchPage::new(session);

    let extractor = LinkExtractor::new(ScrollPolicy::new(6, 80));
    let links = extractor.collect(&mut page, query)?;
    if links.is_empty() {
        warn!("No place links found for '{}'.", query);
    }
    link_loader::save_links(out, &links)?;
    Ok(ExitCode::SUCCESS)
}

fn run_batch(args: &[String]) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let links_file = value(args, "--links").unwrap_or(DEFAULT_LINKS_FILE);
    let out_dir = PathBuf::from(value(args, "--out-dir").unwrap_or("."));

    let config = BatchConfig {
        chunk_size: parsed(args, "--chunk-size", 10usize)?,
        max_retries: parsed(args, "--retries", 2u32)?,
        delay_secs: (
            parsed(args, "--min-delay", 12u64)?,
            parsed(args, "--max-delay", 25u64)?,
        ),
        max_reviews: parsed(args, "--max-reviews", 5000usize)?,
        ..BatchConfig::default()
    };

    let links = link_loader::load_links(links_file)?;
    let mut resume = ResumeManager::load_or_init(
        out_dir.join(PROGRESS_FILE),
        links.len(),
        config.chunk_size,
    )?;
    let mut store = MasterStore::load(&out_dir)?;

    if resume.next_chunk().is_empty() {
        info!("All links already processed.");
        return Ok(ExitCode::SUCCESS);
    }

    // One persistent profile per chunk position, as a stable function of the
    // cursor, so a re-run after an abort reuses the same profile (and its
    // login cookies).
    let profile = match value(args, "--profile") {
        Some(dir) => PathBuf::from(dir),
        None => {
            let run_no = resume.state().next_index / config.chunk_size + 1;
            PathBuf::from(format!("{PROFILE_PREFIX}{run_no}"))
        }
    };

    let session = MapsSession::launch(BrowserConfig {
        headless: flag(args, "--headless"),
        profile_dir: Some(profile),
        ..BrowserConfig::default()
    })?;
    let mut page = MapsPlacePage::new(session);

    let runner = BatchRunner::new(config);
    let report = runner.run(&links, &mut resume, &mut store, &mut page)?;

    if !report.failures.is_empty() {
        let json = serde_json::to_string_pretty(&report.failures)?;
        fsio::write_atomic(&out_dir.join(FAILURES_FILE), json.as_bytes())?;
        warn!("{} failed links recorded in {FAILURES_FILE}.", report.failures.len());
    }

    info!(
        "Run summary: {} succeeded, {} skipped (permanent), {} gave up (transient).",
        report.succeeded, report.skipped_permanent, report.transient_exhausted
    );

    if report.clean() {
        Ok(ExitCode::SUCCESS)
    } else {
        error!("Batch aborted: {}. Re-login in the profile, then rerun to resume.",
            report.aborted.as_deref().unwrap_or("unknown"));
        Ok(ExitCode::FAILURE)
    }
}

/* ---------------- Tiny argument helpers ---------------- */

fn flag(args: &[String], name: &str) -> bool {
    args.iter().any(|a| a == name)
}

fn value<'a>(args: &'a [String], name: &str) -> Option<&'a str> {
    args.iter()
        .position(|a| a == name)
        .and_then(|i| args.get(i + 1))
        .map(String::as_str)
}

fn parsed<T: FromStr>(args: &[String], name: &str, default: T) -> Result<T, String>
where
    T::Err: std::fmt::Display,
{
    match value(args, name) {
        Some(raw) => raw
            .parse()
            .map_err(|e| format!("invalid value for {name}: {e}")),
        None => Ok(default),
    }
}
