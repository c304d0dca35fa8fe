//! Concrete Maps implementation of the `page` traits over a headless Chromium
//! tab. Everything in here is tied to the current Maps DOM (class names,
//! tab labels, feed containers) and is expected to rot; the orchestration
//! core only ever sees the trait surface.
//!
//! DOM access pattern: mutate via small JS snippets (`Tab::evaluate`), read
//! via full-page snapshots (`Tab::get_content`) parsed with `scraper`
//! selectors.

use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use headless_chrome::{Browser, LaunchOptions, Tab};
use log::{debug, info, warn};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};

use crate::error::{ExtractError, ExtractResult};
use crate::models::{clean_text, Review};
use crate::page::{PlaceIdentity, PlacePage, ScrollFeed, SearchPage};

const PLACE_ANCHOR_SEL: &str = "a[href*='/maps/place/']";
const REVIEW_CARD_SELS: [&str; 2] = ["div.jftiEf", "div[data-review-id]"];
const NAME_SELS: [&str; 3] = ["h1.DUwDvf", "h1[class*='DUwDvf']", "h1"];
const ADDRESS_SELS: [&str; 3] = [
    "button[data-item-id='address'] .Io6YTe",
    "[data-item-id='address'] .Io6YTe",
    "button[data-item-id='address']",
];

/// Scrolls the results/reviews feed container by its own height. Maps moves
/// the panel classes around, so several candidates are tried before falling
/// back to a window scroll.
const SCROLL_FEED_JS: &str = r#"
(function () {
    const sels = ["div[role='feed']", "div.m6QErb.DxyBCb.kA9KIf.dS8AEf", "div.m6QErb.DxyBCb.kA9KIf"];
    for (const s of sels) {
        const el = document.querySelector(s);
        if (el) { el.scrollBy(0, el.scrollHeight); return true; }
    }
    window.scrollBy(0, 2500);
    return false;
})()
"#;

/// Best-effort click on a consent button (wording varies by locale).
const CONSENT_JS: &str = r#"
(function () {
    const pat = /accept all|i agree|^accept$|setuju|terima/i;
    for (const b of document.querySelectorAll('button')) {
        if (pat.test((b.textContent || '').trim())) { b.click(); return true; }
    }
    return false;
})()
"#;

/// Dismisses the "sign in to write a review" popup via its cancel button.
const LOGIN_POPUP_JS: &str = r#"
(function () {
    for (const b of document.querySelectorAll('button')) {
        if (/^\s*(batal|cancel)\s*$/i.test(b.textContent || '')) { b.click(); return true; }
    }
    return false;
})()
"#;

const OPEN_REVIEWS_TAB_JS: &str = r#"
(function () {
    const pat = /^\s*(ulasan|reviews)\s*$/i;
    for (const t of document.querySelectorAll("button[role='tab'], div[role='tab']")) {
        if (pat.test(t.textContent || '')) { t.click(); return true; }
    }
    return false;
})()
"#;

/// Expands truncated reviews by clicking their "More"/"Lainnya" buttons.
const EXPAND_REVIEWS_JS: &str = r#"
(function () {
    const pat = /^\s*(more|lainnya|selengkapnya)\s*$/i;
    let clicked = 0;
    for (const b of document.querySelectorAll('button')) {
        if (pat.test(b.textContent || '')) { b.click(); clicked += 1; }
        if (clicked >= 80) break;
    }
    return clicked;
})()
"#;

#[derive(Debug, Clone)]
pub struct BrowserConfig {
    pub headless: bool,
    /// Persistent Chromium profile; a manual login done once in headed mode
    /// survives in it across runs.
    pub profile_dir: Option<PathBuf>,
    pub nav_timeout: Duration,
    /// Settle time after each scroll round.
    pub scroll_pause: Duration,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        BrowserConfig {
            headless: true,
            profile_dir: None,
            nav_timeout: Duration::from_secs(60),
            scroll_pause: Duration::from_millis(900),
        }
    }
}

/// One Chromium instance with one tab, the exclusive shared resource of a
/// run. At most one extraction uses it at a time.
pub struct MapsSession {
    // Held so the browser process outlives the tab.
    _browser: Browser,
    tab: Arc<Tab>,
    config: BrowserConfig,
}

impl MapsSession {
    pub fn launch(config: BrowserConfig) -> ExtractResult<Self> {
        let mut builder = LaunchOptions::default_builder();
        builder
            .headless(config.headless)
            .window_size(Some((1280, 900)))
            .idle_browser_timeout(Duration::from_secs(600));
        if let Some(dir) = &config.profile_dir {
            builder.user_data_dir(Some(dir.clone()));
        }
        let options = builder
            .build()
            .map_err(|e| ExtractError::TransientLoad(format!("browser launch options: {e}")))?;

        let browser = Browser::new(options)
            .map_err(|e| ExtractError::TransientLoad(format!("chromium launch: {e}")))?;
        let tab = browser
            .new_tab()
            .map_err(|e| ExtractError::TransientLoad(format!("open tab: {e}")))?;
        tab.set_default_timeout(config.nav_timeout);

        info!(
            "Chromium session started (headless: {}, profile: {:?}).",
            config.headless, config.profile_dir
        );
        Ok(MapsSession { _browser: browser, tab, config })
    }

    fn navigate(&self, url: &str) -> ExtractResult<()> {
        self.tab
            .navigate_to(url)
            .and_then(|t| t.wait_until_navigated())
            .map_err(|e| ExtractError::TransientLoad(format!("navigate {url}: {e}")))?;
        Ok(())
    }

    fn snapshot(&self) -> ExtractResult<Html> {
        let html = self
            .tab
            .get_content()
            .map_err(|e| ExtractError::TransientLoad(format!("page snapshot: {e}")))?;
        Ok(Html::parse_document(&html))
    }

    fn eval(&self, js: &str) -> ExtractResult<()> {
        self.tab
            .evaluate(js, false)
            .map_err(|e| ExtractError::TransientLoad(format!("page script: {e}")))?;
        Ok(())
    }

    /// Consent and login popups can reappear at any point; clicking them is
    /// best-effort and failures are ignored.
    fn dismiss_overlays(&self) {
        let _ = self.tab.evaluate(CONSENT_JS, false);
        let _ = self.tab.evaluate(LOGIN_POPUP_JS, false);
    }

    fn scroll_feed(&self) -> ExtractResult<()> {
        self.eval(SCROLL_FEED_JS)?;
        thread::sleep(self.config.scroll_pause);
        Ok(())
    }

    fn settle(&self, ms: u64) {
        thread::sleep(Duration::from_millis(ms));
    }

    /// A redirect onto accounts.google.com means the public view is gated
    /// behind login: abort-the-batch territory, not a per-link failure.
    fn on_login_redirect(&self) -> bool {
        self.tab.get_url().contains("accounts.google.com")
    }
}

fn sel(s: &str) -> Selector {
    Selector::parse(s).unwrap()
}

fn count_first_matching(doc: &Html, selectors: &[&str]) -> usize {
    for s in selectors {
        let n = doc.select(&sel(s)).count();
        if n > 0 {
            return n;
        }
    }
    0
}

fn first_text_in(el: ElementRef<'_>, selectors: &[&str]) -> String {
    for s in selectors {
        if let Some(node) = el.select(&sel(s)).next() {
            let text = clean_text(&node.text().collect::<String>());
            if !text.is_empty() {
                return text;
            }
        }
    }
    String::new()
}

/// Parses a star rating out of an aria-label like "5 stars", "4,0 bintang"
/// or "Rated 3.0 out of 5". Anything outside 1..=5 is treated as absent.
pub fn parse_rating_label(rating_re: &Regex, aria: &str) -> Option<u8> {
    let captured = rating_re.captures(aria)?.get(1)?.as_str().replace(',', ".");
    let value: f32 = captured.parse().ok()?;
    let rounded = value.round() as i32;
    u8::try_from(rounded).ok().filter(|r| (1..=5).contains(r))
}

fn rating_regex() -> Regex {
    Regex::new(r"([0-5](?:[.,]\d)?)").unwrap()
}

fn parse_review_cards(doc: &Html) -> Vec<Review> {
    let rating_re = rating_regex();
    let star_sel = sel("span.kvMYJc[role='img']");

    let mut cards: Vec<ElementRef<'_>> = doc.select(&sel(REVIEW_CARD_SELS[0])).collect();
    if cards.is_empty() {
        cards = doc.select(&sel(REVIEW_CARD_SELS[1])).collect();
    }

    let mut reviews = Vec::with_capacity(cards.len());
    for card in cards {
        let rating = card
            .select(&star_sel)
            .next()
            .and_then(|star| star.value().attr("aria-label"))
            .and_then(|aria| parse_rating_label(&rating_re, aria));

        reviews.push(Review {
            user_name: first_text_in(card, &["span.d4r55", "div.d4r55"]),
            rating,
            timestamp: first_text_in(card, &["span.rsqaWe"]),
            text_review: first_text_in(card, &["span.wiI7pd", "div.wiI7pd"]),
        });
    }
    reviews
}

/// Heuristic for "the reviews panel is actually open": the feed container,
/// several star icons, or the sort control.
fn reviews_panel_visible(doc: &Html) -> bool {
    if doc.select(&sel("div[role='feed']")).next().is_some() {
        return true;
    }
    let stars = doc
        .select(&sel("span[role='img']"))
        .filter(|el| {
            el.value()
                .attr("aria-label")
                .map(|a| {
                    let a = a.to_lowercase();
                    a.contains("star") || a.contains("bintang")
                })
                .unwrap_or(false)
        })
        .count();
    stars >= 3
}

/* ---------------- Search results panel ---------------- */

pub struct MapsSearchPage {
    session: MapsSession,
}

impl MapsSearchPage {
    pub fn new(session: MapsSession) -> Self {
        MapsSearchPage { session }
    }
}

impl ScrollFeed for MapsSearchPage {
    fn measure(&mut self) -> ExtractResult<usize> {
        let doc = self.session.snapshot()?;
        Ok(doc.select(&sel(PLACE_ANCHOR_SEL)).count())
    }

    fn advance(&mut self) -> ExtractResult<()> {
        self.session.dismiss_overlays();
        self.session.scroll_feed()
    }
}

impl SearchPage for MapsSearchPage {
    fn open_search(&mut self, query: &str) -> ExtractResult<()> {
        let url = format!(
            "https://www.google.com/maps/search/{}",
            urlencoding::encode(query)
        );
        self.session.navigate(&url)?;
        self.session.settle(1500);
        self.session.dismiss_overlays();
        self.session.settle(1500);
        Ok(())
    }

    fn visible_links(&mut self) -> ExtractResult<Vec<String>> {
        let doc = self.session.snapshot()?;
        Ok(doc
            .select(&sel(PLACE_ANCHOR_SEL))
            .filter_map(|a| a.value().attr("href"))
            .map(str::to_string)
            .collect())
    }
}

/* ---------------- Place page with review feed ---------------- */

pub struct MapsPlacePage {
    session: MapsSession,
    reviews_open: bool,
}

impl MapsPlacePage {
    pub fn new(session: MapsSession) -> Self {
        MapsPlacePage { session, reviews_open: false }
    }

    /// Clicks the Reviews/Ulasan tab once per place and verifies the feed
    /// actually opened.
    fn ensure_reviews_open(&mut self) -> ExtractResult<()> {
        if self.reviews_open {
            return Ok(());
        }
        self.session.dismiss_overlays();
        self.session.eval(OPEN_REVIEWS_TAB_JS)?;
        self.session.settle(1500);
        self.session.dismiss_overlays();

        let doc = self.session.snapshot()?;
        if !reviews_panel_visible(&doc) {
            if self.session.on_login_redirect() {
                return Err(ExtractError::SessionExpired(
                    "redirected to Google login while opening reviews".into(),
                ));
            }
            return Err(ExtractError::PermanentParse(
                "review panel did not open".into(),
            ));
        }
        self.reviews_open = true;
        Ok(())
    }

    fn wait_for_heading(&self) -> ExtractResult<()> {
        let deadline = Instant::now() + self.session.config.nav_timeout;
        loop {
            let doc = self.session.snapshot()?;
            if doc.select(&sel("h1")).next().is_some() {
                return Ok(());
            }
            if self.session.on_login_redirect() {
                return Err(ExtractError::SessionExpired(
                    "redirected to Google login on place page".into(),
                ));
            }
            if Instant::now() >= deadline {
                return Err(ExtractError::PermanentParse(
                    "place heading never appeared".into(),
                ));
            }
            self.session.dismiss_overlays();
            self.session.settle(500);
        }
    }
}

impl ScrollFeed for MapsPlacePage {
    fn measure(&mut self) -> ExtractResult<usize> {
        self.ensure_reviews_open()?;
        let doc = self.session.snapshot()?;
        Ok(count_first_matching(&doc, &REVIEW_CARD_SELS))
    }

    fn advance(&mut self) -> ExtractResult<()> {
        // The login nag resurfaces mid-scroll; swat it every round.
        self.session.dismiss_overlays();
        self.session.scroll_feed()
    }
}

impl PlacePage for MapsPlacePage {
    fn open_place(&mut self, url: &str) -> ExtractResult<()> {
        self.reviews_open = false;
        self.session.navigate(url)?;
        self.session.settle(1200);
        self.session.dismiss_overlays();
        self.wait_for_heading()
    }

    fn place_identity(&mut self) -> ExtractResult<PlaceIdentity> {
        let doc = self.session.snapshot()?;
        let name = first_text_in(doc.root_element(), &NAME_SELS);
        let location = first_text_in(doc.root_element(), &ADDRESS_SELS);
        if name.is_empty() {
            warn!("Place heading present but empty; recording without a name.");
        }
        Ok(PlaceIdentity { name, location })
    }

    fn visible_reviews(&mut self) -> ExtractResult<Vec<Review>> {
        self.ensure_reviews_open()?;
        self.session.eval(EXPAND_REVIEWS_JS)?;
        self.session.settle(400);

        let doc = self.session.snapshot()?;
        let reviews = parse_review_cards(&doc);
        debug!("Parsed {} review cards from snapshot.", reviews.len());
        Ok(reviews)
    }
}
