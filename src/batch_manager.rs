//! Drives one batch run: the next chunk of links, strictly sequential over a
//! single shared page, with retry, skip-forward and abort policies. The
//! crash-consistency contract lives here: the master store is merged and
//! flushed before the progress cursor moves, so the cursor never claims more
//! completed work than is durably on disk.

use log::{error, info, warn};
use serde::Serialize;

use crate::delay_manager;
use crate::error::{ExtractError, ExtractResult, StateError};
use crate::master_store::MasterStore;
use crate::page::PlacePage;
use crate::place_extractor::{PlaceExtraction, PlaceExtractor};
use crate::resume_manager::ResumeManager;
use crate::scroller::ScrollPolicy;

#[derive(Debug, Clone)]
pub struct BatchConfig {
    pub chunk_size: usize,
    /// Additional attempts after the first on a transient failure.
    pub max_retries: u32,
    pub backoff_base_secs: u64,
    /// Inclusive seconds range for the pause between items.
    pub delay_secs: (u64, u64),
    pub review_scroll: ScrollPolicy,
    pub max_reviews: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        BatchConfig {
            chunk_size: 10,
            max_retries: 2,
            backoff_base_secs: 15,
            delay_secs: (12, 25),
            review_scroll: ScrollPolicy::new(8, 250),
            max_reviews: 5000,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FailedLink {
    pub url: String,
    pub reason: String,
}

#[derive(Debug, Default)]
pub struct BatchReport {
    pub processed: usize,
    pub succeeded: usize,
    pub skipped_permanent: usize,
    pub transient_exhausted: usize,
    pub failures: Vec<FailedLink>,
    /// Set when the run stopped early because the session expired; the
    /// current link was not committed and will be retried next run.
    pub aborted: Option<String>,
}

impl BatchReport {
    pub fn clean(&self) -> bool {
        self.aborted.is_none()
    }
}

pub struct BatchRunner {
    config: BatchConfig,
    extractor: PlaceExtractor,
}

impl BatchRunner {
    pub fn new(config: BatchConfig) -> Self {
        let extractor = PlaceExtractor::new(config.review_scroll, config.max_reviews);
        BatchRunner { config, extractor }
    }

    /// Processes the next chunk. Individual link failures are absorbed into
    /// the report; only persisted-state I/O errors come back as `Err`.
    pub fn run(
        &self,
        links: &[String],
        resume: &mut ResumeManager,
        store: &mut MasterStore,
        page: &mut dyn PlacePage,
    ) -> Result<BatchReport, StateError> {
        let mut report = BatchReport::default();

        let chunk = resume.next_chunk();
        if chunk.is_empty() {
            info!("All links already processed.");
            return Ok(report);
        }

        let chunk_len = chunk.len();
        info!(
            "Scraping index {} to {} of {} links.",
            chunk.start,
            chunk.end - 1,
            links.len()
        );

        for (pos, idx) in chunk.clone().enumerate() {
            let url = &links[idx];
            info!(
                "===== [{}/{}] (global {}/{}) {}",
                pos + 1,
                chunk_len,
                idx,
                links.len() - 1,
                url
            );

            match self.extract_with_retry(page, url) {
                Ok(extraction) => {
                    self.commit_success(extraction, resume, store, &mut report)?;
                }
                Err(ExtractError::SessionExpired(reason)) => {
                    error!(
                        "Session expired at {}: {}. Aborting batch; this link is retried next run after re-login.",
                        url, reason
                    );
                    report.aborted = Some(reason);
                    return Ok(report);
                }
                Err(ExtractError::PermanentParse(reason)) => {
                    warn!("Skipping {}: {}", url, reason);
                    report.failures.push(FailedLink { url: url.clone(), reason });
                    report.skipped_permanent += 1;
                    report.processed += 1;
                    // Skip-forward: a permanently broken link must not block
                    // the rest of the queue.
                    resume.commit_one()?;
                }
                Err(ExtractError::TransientLoad(reason)) => {
                    warn!(
                        "Giving up on {} after {} retries: {}",
                        url, self.config.max_retries, reason
                    );
                    report.failures.push(FailedLink { url: url.clone(), reason });
                    report.transient_exhausted += 1;
                    report.processed += 1;
                    resume.commit_one()?;
                }
            }

            if pos + 1 < chunk_len {
                delay_manager::pause_between_places(self.config.delay_secs);
            }
        }

        info!(
            "Batch done: {} succeeded, {} skipped (permanent), {} gave up (transient). Progress: {}/{}.",
            report.succeeded,
            report.skipped_permanent,
            report.transient_exhausted,
            resume.state().next_index,
            resume.total()
        );
        Ok(report)
    }

    fn commit_success(
        &self,
        extraction: PlaceExtraction,
        resume: &mut ResumeManager,
        store: &mut MasterStore,
        report: &mut BatchReport,
    ) -> Result<(), StateError> {
        let url = extraction.place.place_url.clone();
        let name = extraction.place.place_name.clone();
        let count = extraction.place.reviews.len();

        if extraction.possibly_incomplete {
            warn!("Review list for {} may be incomplete (scroll cap reached).", url);
        }

        let added = store.merge(extraction.place);
        store.flush()?;
        resume.commit_one()?;

        report.succeeded += 1;
        report.processed += 1;
        info!("Done: {} ({} reviews extracted, {} new).", name, count, added);
        Ok(())
    }

    fn extract_with_retry(
        &self,
        page: &mut dyn PlacePage,
        url: &str,
    ) -> ExtractResult<PlaceExtraction> {
        let mut attempt = 0u32;
        loop {
            match self.extractor.extract(page, url) {
                Err(ExtractError::TransientLoad(reason)) if attempt < self.config.max_retries => {
                    attempt += 1;
                    warn!(
                        "Transient failure on {} (attempt {}/{}): {}",
                        url, attempt, self.config.max_retries, reason
                    );
                    delay_manager::retry_backoff(attempt, self.config.backoff_base_secs);
                }
                other => return other,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::fs;
    use std::path::Path;

    use crate::master_store::{MASTER_CSV, MASTER_JSON};
    use crate::models::Review;
    use crate::page::{PlaceIdentity, ScrollFeed};
    use crate::resume_manager::PROGRESS_FILE;

    fn review(user: &str, text: &str) -> Review {
        Review {
            user_name: user.to_string(),
            rating: Some(5),
            timestamp: "a week ago".to_string(),
            text_review: text.to_string(),
        }
    }

    /// Scripted stand-in for the browser layer: each URL maps to a queue of
    /// per-attempt outcomes, the last of which repeats.
    #[derive(Default)]
    struct ScriptedPage {
        plans: HashMap<String, Vec<Result<Vec<Review>, ExtractError>>>,
        attempts: HashMap<String, usize>,
        current: Option<Vec<Review>>,
    }

    impl ScriptedPage {
        fn plan(mut self, url: &str, outcomes: Vec<Result<Vec<Review>, ExtractError>>) -> Self {
            self.plans.insert(url.to_string(), outcomes);
            self
        }

        fn ok(self, url: &str, reviews: Vec<Review>) -> Self {
            self.plan(url, vec![Ok(reviews)])
        }

        fn attempts_on(&self, url: &str) -> usize {
            self.attempts.get(url).copied().unwrap_or(0)
        }
    }

    impl ScrollFeed for ScriptedPage {
        fn measure(&mut self) -> ExtractResult<usize> {
            Ok(self.current.as_ref().map(Vec::len).unwrap_or(0))
        }

        fn advance(&mut self) -> ExtractResult<()> {
            Ok(())
        }
    }

    impl PlacePage for ScriptedPage {
        fn open_place(&mut self, url: &str) -> ExtractResult<()> {
            let plan = self.plans.get(url).unwrap_or_else(|| panic!("no plan for {url}"));
            let attempt = self.attempts.entry(url.to_string()).or_insert(0);
            let outcome = plan.get(*attempt).unwrap_or_else(|| plan.last().unwrap());
            *attempt += 1;
            match outcome {
                Ok(reviews) => {
                    self.current = Some(reviews.clone());
                    Ok(())
                }
                Err(e) => {
                    self.current = None;
                    Err(e.clone())
                }
            }
        }

        fn place_identity(&mut self) -> ExtractResult<PlaceIdentity> {
            Ok(PlaceIdentity {
                name: "Place".into(),
                location: "Loc".into(),
            })
        }

        fn visible_reviews(&mut self) -> ExtractResult<Vec<Review>> {
            Ok(self.current.clone().unwrap_or_default())
        }
    }

    fn test_config() -> BatchConfig {
        BatchConfig {
            chunk_size: 5,
            max_retries: 2,
            backoff_base_secs: 0,
            delay_secs: (0, 0),
            review_scroll: ScrollPolicy::new(1, 5),
            max_reviews: 100,
        }
    }

    fn seven_links() -> Vec<String> {
        (1..=7).map(|i| format!("https://maps/place/L{i}")).collect()
    }

    fn setup(dir: &Path, links: &[String], chunk: usize) -> (ResumeManager, MasterStore) {
        let resume = ResumeManager::load_or_init(dir.join(PROGRESS_FILE), links.len(), chunk).unwrap();
        let store = MasterStore::load(dir).unwrap();
        (resume, store)
    }

    #[test]
    fn two_runs_cover_seven_links_in_chunks_of_five() {
        let dir = tempfile::tempdir().unwrap();
        let links = seven_links();
        let runner = BatchRunner::new(test_config());

        let mut page = ScriptedPage::default();
        for link in &links {
            page = page.ok(link, vec![review("Ana", link)]);
        }

        // Run 1: L1..L5.
        let (mut resume, mut store) = setup(dir.path(), &links, 5);
        let report = runner.run(&links, &mut resume, &mut store, &mut page).unwrap();
        assert_eq!(report.succeeded, 5);
        assert_eq!(resume.state().next_index, 5);
        assert!(!resume.state().completed);

        // Run 2 (fresh load, as a new process would): L6..L7.
        let (mut resume, mut store) = setup(dir.path(), &links, 5);
        let report = runner.run(&links, &mut resume, &mut store, &mut page).unwrap();
        assert_eq!(report.succeeded, 2);
        assert_eq!(resume.state().next_index, 7);
        assert!(resume.state().completed);

        let reloaded = MasterStore::load(dir.path()).unwrap();
        assert_eq!(reloaded.len(), 7);
        for link in &links {
            assert_eq!(page.attempts_on(link), 1, "{link} processed exactly once");
        }
    }

    #[test]
    fn completed_run_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let links = vec!["https://maps/place/L1".to_string()];
        let runner = BatchRunner::new(test_config());
        let mut page = ScriptedPage::default().ok(&links[0], vec![review("Ana", "hi")]);

        let (mut resume, mut store) = setup(dir.path(), &links, 5);
        runner.run(&links, &mut resume, &mut store, &mut page).unwrap();

        let json_before = fs::read(dir.path().join(MASTER_JSON)).unwrap();
        let csv_before = fs::read(dir.path().join(MASTER_CSV)).unwrap();

        let (mut resume, mut store) = setup(dir.path(), &links, 5);
        let report = runner.run(&links, &mut resume, &mut store, &mut page).unwrap();
        assert_eq!(report.processed, 0);
        assert_eq!(fs::read(dir.path().join(MASTER_JSON)).unwrap(), json_before);
        assert_eq!(fs::read(dir.path().join(MASTER_CSV)).unwrap(), csv_before);
        assert_eq!(page.attempts_on(&links[0]), 1);
    }

    #[test]
    fn transient_failure_is_retried_then_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let links = vec!["https://maps/place/L1".to_string()];
        let runner = BatchRunner::new(test_config());

        let mut page = ScriptedPage::default().plan(
            &links[0],
            vec![
                Err(ExtractError::TransientLoad("timeout".into())),
                Ok(vec![review("Ana", "hi")]),
            ],
        );

        let (mut resume, mut store) = setup(dir.path(), &links, 5);
        let report = runner.run(&links, &mut resume, &mut store, &mut page).unwrap();

        assert_eq!(report.succeeded, 1);
        assert!(report.failures.is_empty());
        assert_eq!(page.attempts_on(&links[0]), 2);
        assert!(resume.state().completed);
    }

    #[test]
    fn exhausted_retries_skip_forward() {
        let dir = tempfile::tempdir().unwrap();
        let links = vec![
            "https://maps/place/L1".to_string(),
            "https://maps/place/L2".to_string(),
        ];
        let runner = BatchRunner::new(test_config());

        let mut page = ScriptedPage::default()
            .plan(&links[0], vec![Err(ExtractError::TransientLoad("down".into()))])
            .ok(&links[1], vec![review("Ben", "ok")]);

        let (mut resume, mut store) = setup(dir.path(), &links, 5);
        let report = runner.run(&links, &mut resume, &mut store, &mut page).unwrap();

        // Initial attempt + 2 retries.
        assert_eq!(page.attempts_on(&links[0]), 3);
        assert_eq!(report.transient_exhausted, 1);
        assert_eq!(report.succeeded, 1);
        assert_eq!(report.failures.len(), 1);
        assert!(report.clean());
        assert_eq!(resume.state().next_index, 2);

        // The broken link produced no output.
        assert_eq!(MasterStore::load(dir.path()).unwrap().len(), 1);
    }

    #[test]
    fn permanent_failure_skips_without_retry() {
        let dir = tempfile::tempdir().unwrap();
        let links = vec![
            "https://maps/place/L1".to_string(),
            "https://maps/place/L2".to_string(),
        ];
        let runner = BatchRunner::new(test_config());

        let mut page = ScriptedPage::default()
            .plan(&links[0], vec![Err(ExtractError::PermanentParse("no heading".into()))])
            .ok(&links[1], vec![review("Ben", "ok")]);

        let (mut resume, mut store) = setup(dir.path(), &links, 5);
        let report = runner.run(&links, &mut resume, &mut store, &mut page).unwrap();

        assert_eq!(page.attempts_on(&links[0]), 1);
        assert_eq!(report.skipped_permanent, 1);
        assert_eq!(report.succeeded, 1);
        assert_eq!(resume.state().next_index, 2);
    }

    #[test]
    fn session_expiry_aborts_without_committing_the_current_link() {
        let dir = tempfile::tempdir().unwrap();
        let links = seven_links();
        let runner = BatchRunner::new(test_config());

        let mut page = ScriptedPage::default()
            .ok(&links[0], vec![review("Ana", "1")])
            .ok(&links[1], vec![review("Ben", "2")])
            .plan(&links[2], vec![Err(ExtractError::SessionExpired("login wall".into()))]);

        let (mut resume, mut store) = setup(dir.path(), &links, 5);
        let report = runner.run(&links, &mut resume, &mut store, &mut page).unwrap();

        assert!(!report.clean());
        assert_eq!(report.succeeded, 2);
        assert_eq!(resume.state().next_index, 2);

        // After "re-login", the next run resumes at the very link that
        // aborted, processes the rest of the chunk once each, and never
        // reprocesses the first two.
        let mut page2 = ScriptedPage::default();
        for link in &links {
            page2 = page2.ok(link, vec![review("Cia", link)]);
        }
        let (mut resume, mut store) = setup(dir.path(), &links, 5);
        assert_eq!(resume.next_chunk(), 2..7);
        let report = runner.run(&links, &mut resume, &mut store, &mut page2).unwrap();
        assert_eq!(report.succeeded, 5);
        assert!(resume.state().completed);
        assert_eq!(page2.attempts_on(&links[0]), 0);
        assert_eq!(page2.attempts_on(&links[1]), 0);

        let store = MasterStore::load(dir.path()).unwrap();
        assert_eq!(store.len(), 7);
    }
}
