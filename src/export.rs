//! Full export orchestrator.
//!
//! Walks the resolved unit range `[start, end]` and emits one JSON-Lines
//! record per unit outcome, placeholders included, so the output stays a
//! dense, auditable image of the declared range. Strictly sequential:
//! one request at a time with a fixed politeness pause, per-unit failures
//! become status-tagged records and never abort the run.

use std::collections::{BTreeSet, HashSet};
use std::io::Write;
use std::thread;
use std::time::Duration;

use reqwest::blocking::Client;

use crate::cache::PageCache;
use crate::config::{validate_date, validate_gesetzesnummer, RisEndpoints, MIN_TOC_BODY_LEN};
use crate::document::{fetch_document, resolve_documents, DocRef};
use crate::error::{HarvestError, Result};
use crate::extract::unit_display_in;
use crate::http::{fetch_html, RetryPolicy};
use crate::jsonl::JsonlWriter;
use crate::probe::{known_bound, BoundaryResolver, ProbeLimits};
use crate::toc::{parse_toc, TocListing};
use crate::types::{RecordStatus, UnitId, UnitKind, UnitRecord};

/// Progress is logged every this many base units, not per record.
const PROGRESS_LOG_INTERVAL: u32 = 25;

/// Parameters of one export run (one law, one unit sequence).
#[derive(Debug, Clone)]
pub struct ExportOptions {
    /// Display name written into every record ("ABGB").
    pub law_name: String,

    /// Registry number of the law.
    pub gesetzesnummer: String,

    /// Which unit sequence to export.
    pub kind: UnitKind,

    /// First base number, inclusive.
    pub start: u32,

    /// Last base number, inclusive; `None` resolves it live.
    pub end: Option<u32>,

    /// Fixed pause after every unit-level request.
    pub delay: Duration,

    /// Keep repealed units in the exported sequence.
    pub include_repealed: bool,

    /// Optional version date (FassungVom) for the TOC.
    pub toc_date: Option<String>,

    /// Registry fallback bound, used when live discovery is inconclusive.
    pub fallback_end: Option<u32>,

    /// Boundary-resolver tuning.
    pub limits: ProbeLimits,

    /// Retry policy for every fetch.
    pub policy: RetryPolicy,

    /// Portal endpoints.
    pub endpoints: RisEndpoints,
}

impl ExportOptions {
    /// Options with the default delay, retry policy and probe limits.
    #[must_use]
    pub fn new(
        law_name: impl Into<String>,
        gesetzesnummer: impl Into<String>,
        kind: UnitKind,
    ) -> Self {
        Self {
            law_name: law_name.into(),
            gesetzesnummer: gesetzesnummer.into(),
            kind,
            start: 1,
            end: None,
            delay: Duration::from_millis(1200),
            include_repealed: false,
            toc_date: None,
            fallback_end: None,
            limits: ProbeLimits::default(),
            policy: RetryPolicy::default(),
            endpoints: RisEndpoints::default(),
        }
    }
}

/// Outcome of one export run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportSummary {
    /// First base number processed.
    pub start: u32,

    /// Last base number processed.
    pub end: u32,

    /// Base numbers in the range (`end - start + 1`).
    pub expected_base: u32,

    /// Records written for base numbers.
    pub base_records: u32,

    /// Records written for letter-suffix units.
    pub suffix_records: u32,

    /// Total records written by this run.
    pub records_written: usize,
}

/// Run one export: resolve the range, walk it, write records.
///
/// # Arguments
/// * `client` - Shared HTTP client
/// * `opts` - Run parameters
/// * `writer` - Output sink; records are flushed as they are written
///
/// # Errors
/// Only run-level failures: invalid inputs, an unresolvable boundary, or
/// a failing output sink. Per-unit failures become records.
pub fn run_export<W: Write>(
    client: &Client,
    opts: &ExportOptions,
    writer: &mut JsonlWriter<W>,
) -> Result<ExportSummary> {
    validate_gesetzesnummer(&opts.gesetzesnummer)?;
    if let Some(date) = opts.toc_date.as_deref() {
        validate_date(date)?;
    }

    let listing = fetch_toc_listing(client, opts);
    let (end, tracked) = resolve_range(client, opts, &listing)?;

    tracing::info!(
        law = %opts.law_name,
        gesetzesnummer = %opts.gesetzesnummer,
        unit_type = opts.kind.as_str(),
        start = opts.start,
        end,
        tracked,
        "Starting export"
    );

    let mut exporter = Exporter {
        client,
        opts,
        writer,
        seen_nor: HashSet::new(),
        base_records: 0,
        suffix_records: 0,
    };
    exporter.walk_range(end, tracked, &listing)?;

    let summary = ExportSummary {
        start: opts.start,
        end,
        expected_base: if end >= opts.start {
            end - opts.start + 1
        } else {
            0
        },
        base_records: exporter.base_records,
        suffix_records: exporter.suffix_records,
        records_written: exporter.writer.written(),
    };

    tracing::info!(
        written = summary.records_written,
        expected_base = summary.expected_base,
        suffix_records = summary.suffix_records,
        "Export finished"
    );

    Ok(summary)
}

/// Fetch and parse the TOC; a failing TOC degrades to an empty listing.
fn fetch_toc_listing(client: &Client, opts: &ExportOptions) -> TocListing {
    let url = opts
        .endpoints
        .toc_url(&opts.gesetzesnummer, opts.kind, opts.toc_date.as_deref());
    match fetch_html(client, opts.policy, &url, MIN_TOC_BODY_LEN) {
        Ok(html) => parse_toc(&html, opts.kind, opts.include_repealed),
        Err(e) => {
            tracing::warn!(url = %url, error = %e, "TOC fetch failed, continuing without TOC");
            TocListing::default()
        }
    }
}

/// Resolve the end of the range and whether TOC membership is tracked.
///
/// Chain: explicit override -> plausible TOC maximum -> probe engine ->
/// registry fallback -> curated known bounds -> fatal error.
fn resolve_range(
    client: &Client,
    opts: &ExportOptions,
    listing: &TocListing,
) -> Result<(u32, bool)> {
    let tracked = listing.is_plausible();

    if let Some(end) = opts.end {
        return Ok((end, tracked));
    }

    if tracked {
        return Ok((listing.max_number(), true));
    }

    tracing::warn!(
        gesetzesnummer = %opts.gesetzesnummer,
        units = listing.units.len(),
        "TOC empty or implausible, probing for boundary"
    );

    let mut cache = PageCache::default();
    let mut resolver = BoundaryResolver::new(
        client,
        opts.policy,
        &opts.endpoints,
        opts.limits.clone(),
        &mut cache,
    );
    match resolver.resolve_bound(&opts.gesetzesnummer, opts.kind) {
        Ok(Some(bound)) => return Ok((bound, false)),
        Ok(None) => {}
        Err(e) => {
            tracing::warn!(error = %e, "Boundary probing failed");
        }
    }

    if let Some(bound) = opts.fallback_end {
        tracing::warn!(bound, "Using registry fallback bound");
        return Ok((bound, false));
    }
    if let Some(bound) = known_bound(&opts.gesetzesnummer) {
        tracing::warn!(bound, "Using curated fallback bound");
        return Ok((bound, false));
    }

    Err(HarvestError::BoundaryUnresolved {
        gesetzesnummer: opts.gesetzesnummer.clone(),
    })
}

/// Per-run state of the unit walk.
struct Exporter<'a, W: Write> {
    client: &'a Client,
    opts: &'a ExportOptions,
    writer: &'a mut JsonlWriter<W>,
    /// Canonical documents already processed in this run.
    seen_nor: HashSet<String>,
    base_records: u32,
    suffix_records: u32,
}

impl<W: Write> Exporter<'_, W> {
    /// Walk every base number in the range, with letter-suffix walks.
    fn walk_range(&mut self, end: u32, tracked: bool, listing: &TocListing) -> Result<()> {
        let base_set: BTreeSet<u32> = listing.units.iter().map(|u| u.number).collect();
        let unit_set: BTreeSet<UnitId> = listing.units.iter().copied().collect();

        for n in self.opts.start..=end {
            if (n - self.opts.start) % PROGRESS_LOG_INTERVAL == 0 {
                tracing::info!(
                    unit = n,
                    end,
                    written = self.writer.written(),
                    "Export progress"
                );
            }

            if tracked {
                if base_set.contains(&n) {
                    self.process_unit(UnitId::new(n))?;
                } else {
                    // Known absent: placeholder, no request.
                    self.emit_placeholder(UnitId::new(n), RecordStatus::NotInToc, String::new())?;
                }

                // Suffixes come from the TOC set; the walk stays
                // contiguous even when the base itself is absent.
                for letter in 'a'..='z' {
                    let unit = UnitId::with_suffix(n, letter);
                    if unit_set.contains(&unit) {
                        self.process_unit(unit)?;
                    } else {
                        break;
                    }
                }
            } else {
                let resolved = self.process_unit(UnitId::new(n))?;
                if resolved {
                    for letter in 'a'..='z' {
                        if !self.probe_suffix(UnitId::with_suffix(n, letter))? {
                            break;
                        }
                    }
                }
            }
        }

        Ok(())
    }

    /// Process one unit: resolve its documents, fetch and classify each.
    ///
    /// Returns whether at least one canonical document was resolved, which
    /// is what the untracked suffix walk keys on.
    fn process_unit(&mut self, unit: UnitId) -> Result<bool> {
        let unit_display = unit.display(self.opts.kind);
        let unit_url =
            self.opts
                .endpoints
                .unit_url(&self.opts.gesetzesnummer, self.opts.kind, unit, &[]);

        let refs = match resolve_documents(self.client, self.opts.policy, &self.opts.endpoints, &unit_url)
        {
            Ok(refs) => refs,
            Err(e) => {
                let status = if e.is_not_found() {
                    RecordStatus::NotFound
                } else {
                    tracing::warn!(unit = %unit_display, error = %e, "Document resolution failed");
                    RecordStatus::ResolveFailed
                };
                self.emit_placeholder(unit, status, unit_url)?;
                self.pause();
                return Ok(false);
            }
        };

        let mut resolved_any = refs.iter().any(|d| d.nor.is_some());

        // A unit page without document references still renders the text
        // inline; process the page itself.
        let refs = if refs.is_empty() {
            vec![DocRef {
                nor: None,
                url: unit_url.clone(),
            }]
        } else {
            refs
        };

        let mut wrote = false;
        for doc in &refs {
            if let Some(nor) = &doc.nor {
                if self.seen_nor.contains(nor) {
                    continue;
                }
            }
            wrote |= self.process_document(unit, &unit_display, doc, &mut resolved_any)?;
        }

        if !wrote {
            // Everything deduplicated away: keep the sequence dense.
            self.emit_placeholder(unit, RecordStatus::NoDocument, unit_url)?;
        }

        Ok(resolved_any)
    }

    /// Fetch one document, classify the outcome, write one record.
    fn process_document(
        &mut self,
        unit: UnitId,
        display: &str,
        doc: &DocRef,
        resolved_any: &mut bool,
    ) -> Result<bool> {
        let extraction = match fetch_document(self.client, self.opts.policy, &doc.url) {
            Ok(extraction) => extraction,
            Err(e) => {
                let status = status_for_fetch_error(&e);
                tracing::warn!(url = %doc.url, error = %e, "Document fetch failed");
                let record = self
                    .record(display, status)
                    .with_url(&doc.url)
                    .with_document_number(doc.nor.clone().unwrap_or_default());
                self.emit(unit, record)?;
                self.pause();
                return Ok(true);
            }
        };

        let nor = if extraction.nor.is_empty() {
            doc.nor.clone().unwrap_or_default()
        } else {
            extraction.nor.clone()
        };
        if !nor.is_empty() {
            self.seen_nor.insert(nor.clone());
            *resolved_any = true;
        }

        if extraction.text.trim().is_empty() {
            let record = self
                .record(display, RecordStatus::EmptyText)
                .with_url(&doc.url)
                .with_content(extraction.heading, String::new())
                .with_document_number(nor);
            self.emit(unit, record)?;
            self.pause();
            return Ok(true);
        }

        // Prefer the identifier the document itself prints.
        let display_id = unit_display_in(&extraction.heading, self.opts.kind)
            .or_else(|| unit_display_in(&extraction.text, self.opts.kind))
            .unwrap_or_else(|| display.to_string());

        let record = self
            .record(&display_id, RecordStatus::Ok)
            .with_url(&doc.url)
            .with_content(extraction.heading, extraction.text)
            .with_document_number(nor);
        self.emit(unit, record)?;
        self.pause();
        Ok(true)
    }

    /// Probe one letter-suffix unit in an untracked run.
    ///
    /// Returns whether the suffix exists; a miss writes nothing and stops
    /// the walk (suffix sequences are contiguous, never sparse).
    fn probe_suffix(&mut self, unit: UnitId) -> Result<bool> {
        let unit_url =
            self.opts
                .endpoints
                .unit_url(&self.opts.gesetzesnummer, self.opts.kind, unit, &[]);

        let refs = match resolve_documents(self.client, self.opts.policy, &self.opts.endpoints, &unit_url)
        {
            Ok(refs) => refs,
            Err(e) => {
                if !e.is_not_found() {
                    tracing::warn!(unit = %unit, error = %e, "Suffix probe failed, stopping walk");
                }
                self.pause();
                return Ok(false);
            }
        };

        if !refs.iter().any(|d| d.nor.is_some()) {
            self.pause();
            return Ok(false);
        }

        let display = unit.display(self.opts.kind);
        let mut resolved_any = true;
        let mut wrote = false;
        for doc in &refs {
            if let Some(nor) = &doc.nor {
                if self.seen_nor.contains(nor) {
                    continue;
                }
            }
            wrote |= self.process_document(unit, &display, doc, &mut resolved_any)?;
        }
        if !wrote {
            self.emit_placeholder(unit, RecordStatus::NoDocument, unit_url)?;
        }

        Ok(true)
    }

    /// Write a placeholder record with empty content.
    fn emit_placeholder(&mut self, unit: UnitId, status: RecordStatus, url: String) -> Result<()> {
        let display = unit.display(self.opts.kind);
        let record = self.record(&display, status).with_url(url);
        self.emit(unit, record)
    }

    fn emit(&mut self, unit: UnitId, record: UnitRecord) -> Result<()> {
        if unit.suffix.is_some() {
            self.suffix_records += 1;
        } else {
            self.base_records += 1;
        }
        self.writer.write(&record)
    }

    fn record(&self, display: &str, status: RecordStatus) -> UnitRecord {
        UnitRecord::new(
            &self.opts.law_name,
            &self.opts.gesetzesnummer,
            self.opts.kind,
            display,
            status,
        )
    }

    /// Fixed politeness pause after a unit-level request.
    fn pause(&self) {
        if !self.opts.delay.is_zero() {
            thread::sleep(self.opts.delay);
        }
    }
}

/// Map a fetch error to the record status it should produce.
fn status_for_fetch_error(error: &HarvestError) -> RecordStatus {
    match error {
        HarvestError::NotFound { .. } => RecordStatus::NotFound,
        HarvestError::HttpStatus { code, .. } => RecordStatus::Http(*code),
        _ => RecordStatus::FetchFailed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_for_fetch_error() {
        assert_eq!(
            status_for_fetch_error(&HarvestError::NotFound {
                url: "u".to_string()
            }),
            RecordStatus::NotFound
        );
        assert_eq!(
            status_for_fetch_error(&HarvestError::HttpStatus {
                code: 503,
                url: "u".to_string()
            }),
            RecordStatus::Http(503)
        );
        assert_eq!(
            status_for_fetch_error(&HarvestError::RetriesExhausted {
                attempts: 3,
                message: "x".to_string()
            }),
            RecordStatus::FetchFailed
        );
    }

    #[test]
    fn test_export_options_defaults() {
        let opts = ExportOptions::new("ABGB", "10001622", UnitKind::Paragraf);
        assert_eq!(opts.start, 1);
        assert_eq!(opts.end, None);
        assert_eq!(opts.delay, Duration::from_millis(1200));
        assert!(!opts.include_repealed);
    }
}
