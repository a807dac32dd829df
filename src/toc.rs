//! Table-of-contents parser.
//!
//! The portal's unit-0 page lists a code's units, but presentation varies:
//! most codes link every unit with a `Paragraf=`/`Artikel=` query parameter
//! or a fragment anchor, some only mention units (or whole ranges,
//! "§ 3 bis 7") in plain text. The link pass is authoritative; the text
//! pass is a fallback consulted only when the links yield almost nothing.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};

use crate::config::MAX_RANGE_SPAN;
use crate::types::{UnitId, UnitKind};

/// Below this many link-derived units the plain-text fallback runs.
pub const LINK_PASS_MINIMUM: usize = 10;

/// Markers that flag a unit as repealed/superseded.
const REPEAL_MARKERS: [&str; 2] = ["aufgehoben", "weggefallen"];

#[allow(clippy::expect_used)] // Static selector that is guaranteed to be valid
static ANCHOR_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href]").expect("valid selector"));

/// Fragment anchors: #Paragraf12, #Paragraf12a.
#[allow(clippy::expect_used)] // Static regex that is guaranteed to be valid
static PARA_ANCHOR_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)#\s*Paragraf\s*(\d+[a-zA-Z]?)").expect("valid regex"));

#[allow(clippy::expect_used)] // Static regex that is guaranteed to be valid
static ART_ANCHOR_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)#\s*Artikel\s*(\d+[a-zA-Z]?)").expect("valid regex"));

/// Textual ranges: "§ 3 bis 7", "§ 10 - 15", "§ 21–23".
#[allow(clippy::expect_used)] // Static regex that is guaranteed to be valid
static PARA_RANGE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)§\s*(\d+)\s*(?:bis|-|–)\s*§?\s*(\d+)").expect("valid regex")
});

#[allow(clippy::expect_used)] // Static regex that is guaranteed to be valid
static ART_RANGE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:Art\.?|Artikel)\s*(\d+)\s*(?:bis|-|–)\s*(?:Art\.?|Artikel)?\s*(\d+)")
        .expect("valid regex")
});

/// Standalone textual unit mentions.
#[allow(clippy::expect_used)] // Static regex that is guaranteed to be valid
static PARA_SINGLE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)§\s*(\d+[a-zA-Z]?)").expect("valid regex"));

#[allow(clippy::expect_used)] // Static regex that is guaranteed to be valid
static ART_SINGLE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(?:Art\.|Artikel)\s*(\d+[a-zA-Z]?)").expect("valid regex"));

/// Parsed table of contents for one code and unit kind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TocListing {
    /// Declared units, deduplicated, `(number, suffix)`-sorted, unit 0
    /// excluded, repealed units filtered out unless requested.
    pub units: Vec<UnitId>,

    /// Units marked repealed/superseded, always reported in full.
    pub repealed: BTreeSet<UnitId>,
}

impl TocListing {
    /// Highest numeric base among the declared units, 0 when empty.
    #[must_use]
    pub fn max_number(&self) -> u32 {
        self.units.iter().map(|u| u.number).max().unwrap_or(0)
    }

    /// Whether the listing looks trustworthy enough to drive an export.
    ///
    /// A near-empty TOC, or one whose inferred maximum is far out of
    /// proportion to its unit count, is handed to the boundary resolver.
    #[must_use]
    pub fn is_plausible(&self) -> bool {
        if self.units.len() <= 2 {
            return false;
        }
        !(self.units.len() < 10 && self.max_number() >= 300)
    }
}

/// Parse a TOC page for the given unit kind.
///
/// # Arguments
/// * `html` - The unit-0 page
/// * `kind` - Which unit parameter/symbol to look for
/// * `include_repealed` - Keep repealed units in the returned sequence
#[must_use]
pub fn parse_toc(html: &str, kind: UnitKind, include_repealed: bool) -> TocListing {
    let document = Html::parse_document(html);

    let mut units: BTreeSet<UnitId> = BTreeSet::new();
    let mut repealed: BTreeSet<UnitId> = BTreeSet::new();

    // Pass 1: links carrying the unit-selection parameter or anchor.
    for anchor in document.select(&ANCHOR_SELECTOR) {
        let href = anchor.value().attr("href").unwrap_or_default();
        let Some(unit) = unit_from_href(href, kind) else {
            continue;
        };
        if unit.number == 0 {
            continue;
        }
        units.insert(unit);
        if anchor_context_has_repeal_marker(anchor) {
            repealed.insert(unit);
        }
    }

    // Pass 2: plain-text fallback, only for a (near-)empty link pass.
    if units.len() < LINK_PASS_MINIMUM {
        let text = page_text(&document);
        for unit in units_from_text(&text, kind) {
            if unit.number != 0 {
                units.insert(unit);
            }
        }
    }

    if !include_repealed {
        units.retain(|u| !repealed.contains(u));
    }

    TocListing {
        units: units.into_iter().collect(),
        repealed,
    }
}

/// Decide whether a TOC page lists paragraphs or articles.
///
/// Link counts vote first; plain-text mentions only break a total absence
/// of unit links. Returns `None` for a page without any unit references.
#[must_use]
pub fn detect_unit_kind(html: &str) -> Option<UnitKind> {
    let document = Html::parse_document(html);

    let mut para_links = 0usize;
    let mut art_links = 0usize;
    for anchor in document.select(&ANCHOR_SELECTOR) {
        let href = anchor.value().attr("href").unwrap_or_default();
        if unit_from_href(href, UnitKind::Paragraf).is_some() {
            para_links += 1;
        } else if unit_from_href(href, UnitKind::Artikel).is_some() {
            art_links += 1;
        }
    }

    if art_links > para_links {
        return Some(UnitKind::Artikel);
    }
    if para_links > 0 {
        return Some(UnitKind::Paragraf);
    }
    if art_links > 0 {
        return Some(UnitKind::Artikel);
    }

    let text = page_text(&document);
    let para_mentions = PARA_SINGLE_PATTERN.find_iter(&text).count();
    let art_mentions = ART_SINGLE_PATTERN.find_iter(&text).count();
    if para_mentions == 0 && art_mentions == 0 {
        return None;
    }
    if art_mentions > para_mentions {
        Some(UnitKind::Artikel)
    } else {
        Some(UnitKind::Paragraf)
    }
}

/// Extract a unit id from an anchor target, via query parameter or
/// fragment anchor.
fn unit_from_href(href: &str, kind: UnitKind) -> Option<UnitId> {
    // Query parameter (NormDokument.wxe?...&Paragraf=12a). Hrefs are
    // usually relative; resolve against a dummy base for parsing.
    let base = url::Url::parse("https://base.invalid/").ok()?;
    if let Ok(resolved) = base.join(href) {
        for (key, value) in resolved.query_pairs() {
            if key.eq_ignore_ascii_case(kind.query_param()) && !value.is_empty() {
                if let Some(unit) = UnitId::parse(&value) {
                    return Some(unit);
                }
            }
        }
    }

    // Fragment anchor (#Paragraf12a).
    let pattern = match kind {
        UnitKind::Paragraf => &*PARA_ANCHOR_PATTERN,
        UnitKind::Artikel => &*ART_ANCHOR_PATTERN,
    };
    pattern
        .captures(href)
        .and_then(|caps| UnitId::parse(&caps[1]))
}

/// Whether the anchor text or its parent element mentions a repeal marker.
fn anchor_context_has_repeal_marker(anchor: ElementRef<'_>) -> bool {
    let mut context: String = anchor.text().collect::<Vec<_>>().join(" ");
    if let Some(parent) = anchor.parent().and_then(ElementRef::wrap) {
        context.push(' ');
        context.push_str(&parent.text().collect::<Vec<_>>().join(" "));
    }
    let context = context.to_lowercase();
    REPEAL_MARKERS.iter().any(|marker| context.contains(marker))
}

/// Units mentioned in the page's visible text: expanded ranges first,
/// then standalone mentions.
fn units_from_text(text: &str, kind: UnitKind) -> Vec<UnitId> {
    let (range_pattern, single_pattern) = match kind {
        UnitKind::Paragraf => (&*PARA_RANGE_PATTERN, &*PARA_SINGLE_PATTERN),
        UnitKind::Artikel => (&*ART_RANGE_PATTERN, &*ART_SINGLE_PATTERN),
    };

    let mut units = Vec::new();

    for caps in range_pattern.captures_iter(text) {
        let (Ok(start), Ok(end)) = (caps[1].parse::<u32>(), caps[2].parse::<u32>()) else {
            continue;
        };
        // Guard against absurd matches expanding into millions of units.
        if start <= end && end - start < MAX_RANGE_SPAN {
            for n in start..=end {
                units.push(UnitId::new(n));
            }
        }
    }

    for caps in single_pattern.captures_iter(text) {
        if let Some(unit) = UnitId::parse(&caps[1]) {
            units.push(unit);
        }
    }

    units
}

/// Visible text of the whole page, newline-separated.
fn page_text(document: &Html) -> String {
    document
        .root_element()
        .text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn para(n: u32) -> UnitId {
        UnitId::new(n)
    }

    const LINKED_TOC: &str = r#"<html><body><div id="content">
<ul>
  <li><a href="NormDokument.wxe?Abfrage=Bundesnormen&amp;Gesetzesnummer=10001622&amp;Paragraf=0">Inhaltsverzeichnis</a></li>
  <li><a href="NormDokument.wxe?Abfrage=Bundesnormen&amp;Gesetzesnummer=10001622&amp;Paragraf=1">§ 1</a></li>
  <li><a href="NormDokument.wxe?Abfrage=Bundesnormen&amp;Gesetzesnummer=10001622&amp;Paragraf=2">§ 2</a></li>
  <li><a href="NormDokument.wxe?Abfrage=Bundesnormen&amp;Gesetzesnummer=10001622&amp;Paragraf=2a">§ 2a</a></li>
  <li><a href="NormDokument.wxe?Abfrage=Bundesnormen&amp;Gesetzesnummer=10001622&amp;Paragraf=5">§ 5</a> (aufgehoben)</li>
</ul>
</div></body></html>"#;

    #[test]
    fn test_link_pass_collects_units() {
        let listing = parse_toc(LINKED_TOC, UnitKind::Paragraf, true);
        assert_eq!(
            listing.units,
            vec![para(1), para(2), UnitId::with_suffix(2, 'a'), para(5)]
        );
    }

    #[test]
    fn test_unit_zero_excluded() {
        let listing = parse_toc(LINKED_TOC, UnitKind::Paragraf, true);
        assert!(!listing.units.iter().any(|u| u.number == 0));
    }

    #[test]
    fn test_repeal_marker_in_parent() {
        let listing = parse_toc(LINKED_TOC, UnitKind::Paragraf, false);
        assert!(!listing.units.contains(&para(5)));
        assert!(listing.repealed.contains(&para(5)));
    }

    #[test]
    fn test_repealed_kept_when_requested() {
        let listing = parse_toc(LINKED_TOC, UnitKind::Paragraf, true);
        assert!(listing.units.contains(&para(5)));
        assert!(listing.repealed.contains(&para(5)));
    }

    #[test]
    fn test_text_fallback_with_range() {
        // Thin link pass (three units) plus a textual range: both passes
        // contribute.
        let html = r#"<html><body>
<a href="?Paragraf=1">§ 1</a>
<a href="?Paragraf=2">§ 2</a>
<a href="?Paragraf=5">§ 5</a>
<p>Zweiter Abschnitt: § 7 bis § 9.</p>
</body></html>"#;
        let listing = parse_toc(html, UnitKind::Paragraf, true);
        assert_eq!(
            listing.units,
            vec![para(1), para(2), para(5), para(7), para(8), para(9)]
        );
    }

    #[test]
    fn test_text_fallback_not_consulted_with_links() {
        // The plain text mentions § 99, but the link pass found enough
        // units, so the fallback must not run.
        let links: String = (1..=12)
            .map(|n| format!("<a href=\"?Paragraf={n}\">§ {n}</a>\n"))
            .collect();
        let html = format!("<html><body>{links}<p>Siehe auch § 99.</p></body></html>");
        let listing = parse_toc(&html, UnitKind::Paragraf, true);
        assert_eq!(listing.units.len(), 12);
        assert!(!listing.units.contains(&para(99)));
    }

    #[test]
    fn test_range_span_guard() {
        let html = "<html><body><p>§ 1 bis 99999</p></body></html>";
        let listing = parse_toc(html, UnitKind::Paragraf, true);
        // The range must not be expanded; only the standalone mentions of
        // its endpoints survive.
        assert!(listing.units.len() < 10);
    }

    #[test]
    fn test_fragment_anchor_links() {
        let html = r##"<html><body>
<a href="#Paragraf12">§ 12</a>
<a href="#Paragraf12a">§ 12a</a>
</body></html>"##;
        let listing = parse_toc(html, UnitKind::Paragraf, true);
        assert!(listing.units.contains(&para(12)));
        assert!(listing.units.contains(&UnitId::with_suffix(12, 'a')));
    }

    #[test]
    fn test_article_toc() {
        let html = r#"<html><body>
<a href="?Abfrage=Bundesnormen&amp;Gesetzesnummer=10000138&amp;Artikel=1">Art. 1</a>
<a href="?Abfrage=Bundesnormen&amp;Gesetzesnummer=10000138&amp;Artikel=2">Art. 2</a>
<a href="?Abfrage=Bundesnormen&amp;Gesetzesnummer=10000138&amp;Artikel=3">Art. 3</a>
</body></html>"#;
        let listing = parse_toc(html, UnitKind::Artikel, true);
        assert_eq!(listing.units, vec![para(1), para(2), para(3)]);
        assert_eq!(detect_unit_kind(html), Some(UnitKind::Artikel));
    }

    #[test]
    fn test_detect_unit_kind_prefers_links() {
        assert_eq!(detect_unit_kind(LINKED_TOC), Some(UnitKind::Paragraf));
        assert_eq!(detect_unit_kind("<html><body>nichts</body></html>"), None);
    }

    #[test]
    fn test_max_number_and_plausibility() {
        let listing = parse_toc(LINKED_TOC, UnitKind::Paragraf, true);
        assert_eq!(listing.max_number(), 5);
        assert!(listing.is_plausible());

        let sparse = TocListing {
            units: vec![para(1), para(2), para(400)],
            repealed: BTreeSet::new(),
        };
        assert!(!sparse.is_plausible());

        assert!(!TocListing::default().is_plausible());
    }
}
