//! Registry enrichment: determine fallback bounds offline.
//!
//! For every registry entry without a `fallback_end`, read the live TOC
//! (articles first, then paragraphs), and when it is thin or implausible
//! let the boundary resolver probe the portal, retrying the other unit
//! kind when the first yields nothing. The enriched registry is what
//! export runs later rely on when live discovery is inconclusive.

use std::thread;
use std::time::Duration;

use reqwest::blocking::Client;

use crate::cache::PageCache;
use crate::config::{RisEndpoints, MIN_TOC_BODY_LEN};
use crate::error::Result;
use crate::http::{fetch_html, RetryPolicy};
use crate::probe::{BoundaryResolver, ProbeLimits};
use crate::registry::LawRegistry;
use crate::toc::{parse_toc, TocListing};
use crate::types::UnitKind;

/// Pause between laws; enrichment sweeps the whole registry.
const SLEEP_BETWEEN_LAWS: Duration = Duration::from_millis(800);

/// Below this many TOC units the probe engine double-checks the bound.
const TOC_ENRICH_MINIMUM: usize = 50;

/// Enrichment run parameters.
#[derive(Debug, Clone)]
pub struct EnrichOptions {
    /// Recompute bounds that are already present.
    pub overwrite_existing: bool,

    /// Boundary-resolver tuning.
    pub limits: ProbeLimits,

    /// Retry policy for every fetch.
    pub policy: RetryPolicy,

    /// Portal endpoints.
    pub endpoints: RisEndpoints,
}

impl Default for EnrichOptions {
    fn default() -> Self {
        Self {
            overwrite_existing: false,
            limits: ProbeLimits::default(),
            policy: RetryPolicy::default(),
            endpoints: RisEndpoints::default(),
        }
    }
}

/// Counts of an enrichment sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EnrichOutcome {
    /// Entries that received a new bound.
    pub changed: usize,

    /// Entries left as they were.
    pub unchanged: usize,
}

/// Enrich every registry entry in place.
///
/// Entries that already carry a `fallback_end` are skipped unless
/// `overwrite_existing` is set. Failures on one law never abort the sweep.
pub fn enrich_registry(
    client: &Client,
    registry: &mut LawRegistry,
    opts: &EnrichOptions,
) -> Result<EnrichOutcome> {
    let mut cache = PageCache::default();
    let mut outcome = EnrichOutcome::default();
    let total = registry.laws().len();

    for (index, law) in registry.laws_mut().iter_mut().enumerate() {
        if !opts.overwrite_existing && law.fallback_end.is_some() {
            outcome.unchanged += 1;
            continue;
        }

        tracing::info!(
            index = index + 1,
            total,
            kurz = %law.kurz,
            gesetzesnummer = %law.gesetzesnummer,
            "Enriching law"
        );

        // Article TOC first; a 404 there just means the code is
        // paragraph-numbered.
        let mut kind = UnitKind::Artikel;
        let mut listing = fetch_listing(client, opts, &mut cache, &law.gesetzesnummer, kind);
        if listing.units.is_empty() {
            kind = UnitKind::Paragraf;
            listing = fetch_listing(client, opts, &mut cache, &law.gesetzesnummer, kind);
        }

        let mut bound = if listing.is_plausible() {
            listing.max_number()
        } else {
            0
        };
        let mut source = "toc".to_string();

        if bound < 2 || listing.units.len() < TOC_ENRICH_MINIMUM {
            tracing::info!(
                units = listing.units.len(),
                toc_max = bound,
                "TOC thin, probing"
            );
            let mut resolver = BoundaryResolver::new(
                client,
                opts.policy,
                &opts.endpoints,
                opts.limits.clone(),
                &mut cache,
            );

            let probed = match resolver.resolve_bound(&law.gesetzesnummer, kind) {
                Ok(Some(b)) => Some((b, kind)),
                Ok(None) => {
                    let other = kind.other();
                    tracing::info!(kind = other.as_str(), "First probe empty, retrying other kind");
                    match resolver.resolve_bound(&law.gesetzesnummer, other) {
                        Ok(Some(b)) => Some((b, other)),
                        Ok(None) => None,
                        Err(e) => {
                            tracing::warn!(error = %e, "Probe failed");
                            None
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Probe failed");
                    None
                }
            };

            if let Some((probed_bound, probed_kind)) = probed {
                if probed_bound > bound {
                    bound = probed_bound;
                    kind = probed_kind;
                    source = format!("probe:{}", probed_kind.as_str());
                }
            }
        }

        if bound > 1 {
            tracing::info!(bound, unit_type = kind.as_str(), source = %source, "Bound determined");
            law.fallback_end = Some(bound);
            law.unit_type = Some(kind);
            law.fallback_source = Some(source);
            outcome.changed += 1;
        } else {
            tracing::warn!(kurz = %law.kurz, "No boundary determinable");
            outcome.unchanged += 1;
        }

        thread::sleep(SLEEP_BETWEEN_LAWS);
    }

    Ok(outcome)
}

/// Fetch and parse one TOC; failures degrade to an empty listing.
fn fetch_listing(
    client: &Client,
    opts: &EnrichOptions,
    cache: &mut PageCache,
    gesetzesnummer: &str,
    kind: UnitKind,
) -> TocListing {
    let url = opts.endpoints.toc_url(gesetzesnummer, kind, None);
    let policy = opts.policy;
    match cache.get_or_fetch(&url, || fetch_html(client, policy, &url, MIN_TOC_BODY_LEN)) {
        Ok(html) => parse_toc(&html, kind, true),
        Err(e) => {
            tracing::debug!(url = %url, error = %e, "TOC not available");
            TocListing::default()
        }
    }
}
