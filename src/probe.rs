//! Boundary resolver.
//!
//! When a code has no usable TOC, the highest valid unit number has to be
//! discovered by probing the portal: exponential doubling until a miss,
//! then binary search down to the exact boundary. Some codes partition
//! their numbering by structural section (Buch/Teil/...), so the search
//! can run once per discovered or guessed context and the maximum across
//! contexts wins.
//!
//! Every threshold in here is pragmatic tuning, not contract; they all
//! live in [`ProbeLimits`].

use std::collections::BTreeSet;
use std::sync::LazyLock;
use std::thread;
use std::time::Duration;

use reqwest::blocking::Client;
use scraper::{Html, Selector};

use crate::cache::PageCache;
use crate::config::{RisEndpoints, MIN_DOCUMENT_BODY_LEN, MIN_TOC_BODY_LEN};
use crate::error::{HarvestError, Result};
use crate::extract::first_nor;
use crate::http::{fetch_html, RetryPolicy};
use crate::types::UnitKind;

/// Structural query parameters under which numbering may restart,
/// in guess order.
pub const STRUCTURAL_KEYS: [&str; 4] = ["Buch", "Teil", "Hauptstueck", "Abschnitt"];

/// Roman numerals for guessed book numbers.
const ROMAN_NUMERALS: [&str; 8] = ["I", "II", "III", "IV", "V", "VI", "VII", "VIII"];

#[allow(clippy::expect_used)] // Static selector that is guaranteed to be valid
static ANCHOR_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href]").expect("valid selector"));

/// Tuning knobs for the boundary search.
#[derive(Debug, Clone)]
pub struct ProbeLimits {
    /// Hard ceiling for the exponential phase; bounds worst-case cost.
    pub max_bound: u32,

    /// Unit numbers spot-probed before committing to a full search in a
    /// non-root context.
    pub spot_checks: Vec<u32>,

    /// Stop trying further contexts once a boundary this large is found;
    /// codes past this size are assumed fully covered.
    pub early_exit_bound: u32,

    /// Maximum TOC-adjacent pages crawled during context discovery.
    pub context_page_cap: usize,

    /// Maximum guessed contexts tried when discovery finds none.
    pub context_guess_cap: usize,

    /// Pause between probe requests (politeness).
    pub delay_ms: u64,
}

impl Default for ProbeLimits {
    fn default() -> Self {
        Self {
            max_bound: 4096,
            spot_checks: vec![1, 2, 5],
            early_exit_bound: 1500,
            context_page_cap: 5,
            context_guess_cap: 12,
            delay_ms: 300,
        }
    }
}

/// One structural context: extra query parameters scoping the numbering.
///
/// The root context (no extra parameters) is the flat global numbering.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProbeContext {
    /// `(key, value)` query parameters, key-sorted.
    pub params: Vec<(String, String)>,
}

impl ProbeContext {
    /// The flat, unpartitioned numbering.
    #[must_use]
    pub fn root() -> Self {
        Self::default()
    }

    /// A context with a single structural parameter.
    #[must_use]
    pub fn single(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            params: vec![(key.into(), value.into())],
        }
    }

    /// Whether this is the root context.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.params.is_empty()
    }

    /// Short label for logging.
    #[must_use]
    pub fn label(&self) -> String {
        if self.is_root() {
            return "(root)".to_string();
        }
        self.params
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&")
    }
}

/// Find the highest `n` for which `exists(n)` holds.
///
/// Phase 1 doubles the candidate until the first miss (or the ceiling),
/// phase 2 bisects the confirmed interval. Returns `None` when unit 1
/// already does not exist.
///
/// # Arguments
/// * `exists` - Existence oracle; called O(log max_bound) times
/// * `max_bound` - Hard ceiling for the search
pub fn find_bound<F>(mut exists: F, max_bound: u32) -> Result<Option<u32>>
where
    F: FnMut(u32) -> Result<bool>,
{
    if max_bound < 1 || !exists(1)? {
        return Ok(None);
    }

    // Phase 1: exponential doubling.
    let mut low = 1u32;
    let mut candidate = 2u32;
    let mut high;
    loop {
        if candidate >= max_bound {
            if exists(max_bound)? {
                // Ceiling hit while everything still exists; the true
                // boundary may lie beyond it.
                tracing::warn!(max_bound, "Probe ceiling reached");
                return Ok(Some(max_bound));
            }
            high = max_bound;
            break;
        }
        if exists(candidate)? {
            low = candidate;
            candidate *= 2;
        } else {
            high = candidate;
            break;
        }
    }

    // Phase 2: binary search on (low, high).
    while high - low > 1 {
        let mid = low + (high - low) / 2;
        if exists(mid)? {
            low = mid;
        } else {
            high = mid;
        }
    }

    Ok(Some(low))
}

/// Harvest structural contexts from the same-law links of one page.
///
/// Every link carrying the law's Gesetzesnummer contributes the structural
/// subset of its query parameters; distinct non-empty combinations become
/// candidate contexts.
#[must_use]
pub fn contexts_from_html(html: &str, gesetzesnummer: &str) -> Vec<ProbeContext> {
    let document = Html::parse_document(html);
    let mut contexts: BTreeSet<ProbeContext> = BTreeSet::new();

    #[allow(clippy::expect_used)] // Static URL that is guaranteed to be valid
    let base = url::Url::parse("https://base.invalid/").expect("valid base url");

    for anchor in document.select(&ANCHOR_SELECTOR) {
        let href = anchor.value().attr("href").unwrap_or_default();
        let Ok(resolved) = base.join(href) else {
            continue;
        };

        let mut same_law = false;
        let mut params: Vec<(String, String)> = Vec::new();
        for (key, value) in resolved.query_pairs() {
            if key.eq_ignore_ascii_case("Gesetzesnummer") && value == gesetzesnummer {
                same_law = true;
            }
            if STRUCTURAL_KEYS
                .iter()
                .any(|k| key.eq_ignore_ascii_case(k))
                && !value.is_empty()
            {
                params.push((key.to_string(), value.to_string()));
            }
        }

        if same_law && !params.is_empty() {
            params.sort();
            params.dedup();
            contexts.insert(ProbeContext { params });
        }
    }

    contexts.into_iter().collect()
}

/// Fixed ordered list of plausible contexts when discovery finds none:
/// Roman-numeral book numbers, then sequential part/chapter/section
/// numbers, capped.
#[must_use]
pub fn guessed_contexts(cap: usize) -> Vec<ProbeContext> {
    let mut contexts = Vec::new();
    for key in STRUCTURAL_KEYS {
        if key == "Buch" {
            for numeral in ROMAN_NUMERALS {
                contexts.push(ProbeContext::single(key, numeral));
            }
        } else {
            for n in 1..=4u32 {
                contexts.push(ProbeContext::single(key, n.to_string()));
            }
        }
    }
    contexts.truncate(cap);
    contexts
}

/// Curated last-resort boundaries for specific registry numbers, used only
/// when both the TOC and probing come up empty.
#[must_use]
pub fn known_bound(gesetzesnummer: &str) -> Option<u32> {
    match gesetzesnummer {
        "10001622" => Some(1502), // ABGB
        "10002296" => Some(321),  // StGB
        "10000138" => Some(152),  // B-VG
        _ => None,
    }
}

/// Boundary resolver over the live portal.
pub struct BoundaryResolver<'a> {
    client: &'a Client,
    policy: RetryPolicy,
    endpoints: &'a RisEndpoints,
    limits: ProbeLimits,
    cache: &'a mut PageCache,
}

impl<'a> BoundaryResolver<'a> {
    /// Create a resolver.
    pub fn new(
        client: &'a Client,
        policy: RetryPolicy,
        endpoints: &'a RisEndpoints,
        limits: ProbeLimits,
        cache: &'a mut PageCache,
    ) -> Self {
        Self {
            client,
            policy,
            endpoints,
            limits,
            cache,
        }
    }

    /// Resolve the unit boundary for a law.
    ///
    /// Tries the root context first, then discovered structural contexts
    /// (or guessed ones when discovery finds none), keeping the maximum
    /// boundary observed. Exits early once a boundary reaches
    /// `early_exit_bound`. Returns `None` when no context yields a
    /// boundary; the caller falls back to the registry and the curated
    /// [`known_bound`] map.
    pub fn resolve_bound(&mut self, gesetzesnummer: &str, kind: UnitKind) -> Result<Option<u32>> {
        let mut contexts = vec![ProbeContext::root()];
        let discovered = self.discover_contexts(gesetzesnummer, kind)?;
        if discovered.is_empty() {
            tracing::debug!(gesetzesnummer, "No structural contexts discovered, guessing");
            contexts.extend(guessed_contexts(self.limits.context_guess_cap));
        } else {
            tracing::info!(
                gesetzesnummer,
                count = discovered.len(),
                "Discovered structural contexts"
            );
            contexts.extend(discovered);
        }

        let mut best: Option<u32> = None;
        for context in contexts {
            if !context.is_root() && !self.spot_check(gesetzesnummer, kind, &context)? {
                tracing::debug!(context = %context.label(), "Spot check failed, skipping context");
                continue;
            }

            let max_bound = self.limits.max_bound;
            let bound = find_bound(
                |n| self.unit_exists(gesetzesnummer, kind, n, &context),
                max_bound,
            )?;

            if let Some(bound) = bound {
                tracing::info!(
                    gesetzesnummer,
                    context = %context.label(),
                    bound,
                    "Probe found boundary"
                );
                if best.map_or(true, |b| bound > b) {
                    best = Some(bound);
                }
                if bound >= self.limits.early_exit_bound {
                    tracing::info!(bound, "Boundary large enough, stopping early");
                    break;
                }
            }
        }

        Ok(best)
    }

    /// Crawl the TOC and its same-law neighbors for structural contexts,
    /// bounded by the page-visit cap.
    fn discover_contexts(
        &mut self,
        gesetzesnummer: &str,
        kind: UnitKind,
    ) -> Result<Vec<ProbeContext>> {
        let mut contexts: BTreeSet<ProbeContext> = BTreeSet::new();
        let mut queue = vec![self.endpoints.toc_url(gesetzesnummer, kind, None)];
        let mut visited: BTreeSet<String> = BTreeSet::new();

        while let Some(url) = queue.pop() {
            if visited.len() >= self.limits.context_page_cap || !visited.insert(url.clone()) {
                continue;
            }

            let client = self.client;
            let policy = self.policy;
            let html = match self.cache.get_or_fetch(&url, || {
                fetch_html(client, policy, &url, MIN_TOC_BODY_LEN)
            }) {
                Ok(html) => html,
                Err(e) if e.is_not_found() => continue,
                Err(e) => {
                    tracing::warn!(url = %url, error = %e, "Context discovery page failed");
                    continue;
                }
            };

            for context in contexts_from_html(&html, gesetzesnummer) {
                // Each new context contributes its own TOC page to the
                // crawl frontier.
                let toc = self.endpoints.norm_url(gesetzesnummer, kind, "0", &context.params);
                if !visited.contains(&toc) {
                    queue.push(toc);
                }
                contexts.insert(context);
            }
        }

        Ok(contexts.into_iter().collect())
    }

    /// Cheap pre-validation of a context before a full search.
    fn spot_check(
        &mut self,
        gesetzesnummer: &str,
        kind: UnitKind,
        context: &ProbeContext,
    ) -> Result<bool> {
        let spot_checks = self.limits.spot_checks.clone();
        for n in spot_checks {
            if self.unit_exists(gesetzesnummer, kind, n, context)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Existence oracle for one unit number under one context.
    ///
    /// 404 and too-short bodies are definitive misses; transient failures
    /// after retries count as misses too (a probe blip must not abort the
    /// whole resolution), only logged louder.
    fn unit_exists(
        &mut self,
        gesetzesnummer: &str,
        kind: UnitKind,
        n: u32,
        context: &ProbeContext,
    ) -> Result<bool> {
        let url = self
            .endpoints
            .norm_url(gesetzesnummer, kind, &n.to_string(), &context.params);

        let outcome = match fetch_html(self.client, self.policy, &url, MIN_DOCUMENT_BODY_LEN) {
            Ok(html) => Ok(first_nor(&html).is_some()),
            Err(HarvestError::NotFound { .. }) | Err(HarvestError::ShortBody { .. }) => Ok(false),
            Err(e) => {
                tracing::warn!(url = %url, error = %e, "Probe fetch failed, counting as miss");
                Ok(false)
            }
        };

        thread::sleep(Duration::from_millis(self.limits.delay_ms));
        outcome
    }
}
