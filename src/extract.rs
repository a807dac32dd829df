//! HTML unit extractor.
//!
//! Portal pages vary in structure; extraction tries an ordered list of
//! content containers and accepts the first one with enough text. The
//! canonical document identifier (NOR code) is taken from the raw HTML
//! rather than the chosen container, because navigation chrome sometimes
//! carries the only visible reference to it.
//!
//! Extraction never fails: a page without usable text yields an empty
//! result and the caller records an `empty_text` status.

use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Node, Selector};
use unicode_normalization::UnicodeNormalization;

use crate::config::MIN_EXTRACT_TEXT_LEN;
use crate::types::{UnitId, UnitKind};

/// NOR code anywhere in a page.
#[allow(clippy::expect_used)] // Static regex that is guaranteed to be valid
static NOR_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(NOR\d{5,})\b").expect("valid regex"));

/// NOR code embedded in a canonical document link.
#[allow(clippy::expect_used)] // Static regex that is guaranteed to be valid
static NOR_LINK_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)/Dokumente/[^/]+/(NOR\d{5,})/NOR\d{5,}\.html").expect("valid regex")
});

/// Unit mention in a heading or body ("§ 12a").
#[allow(clippy::expect_used)] // Static regex that is guaranteed to be valid
static PARA_MENTION_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"§+\s*\d+[a-zA-Z]?\b").expect("valid regex"));

/// Unit mention in a heading or body ("Art. 5").
#[allow(clippy::expect_used)] // Static regex that is guaranteed to be valid
static ART_MENTION_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:Art\.?|Artikel)\s*\d+[a-zA-Z]?\b").expect("valid regex"));

/// Candidate content containers, most specific first.
#[allow(clippy::expect_used)] // Static selectors that are guaranteed to be valid
static CANDIDATE_SELECTORS: LazyLock<Vec<Selector>> = LazyLock::new(|| {
    [
        "div#content div.norm",
        "div#content div.dokument",
        "div#content",
        "div.content",
        "article",
        "main",
        "body",
    ]
    .iter()
    .map(|s| Selector::parse(s).expect("valid selector"))
    .collect()
});

/// Heading elements within the chosen container.
#[allow(clippy::expect_used)] // Static selector that is guaranteed to be valid
static HEADING_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("h1, h2, h3").expect("valid selector"));

/// Tags that are always navigation/chrome.
const CHROME_TAGS: [&str; 5] = ["nav", "header", "footer", "script", "style"];

/// Id/class fragments that mark navigation/chrome regions.
const CHROME_HINTS: [&str; 7] = [
    "menu",
    "breadcrumb",
    "nav",
    "footer",
    "header",
    "druck",
    "print",
];

/// Result of extracting one document page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extraction {
    /// First h1/h2/h3 inside the chosen container, whitespace-collapsed.
    pub heading: String,

    /// Extracted body text, newline-separated, NFC-normalized.
    pub text: String,

    /// First NOR code found in the raw HTML, uppercased.
    pub nor: String,
}

/// Extract heading, text and NOR code from one document page.
///
/// Tries each candidate container in order and returns the first whose
/// text reaches the minimum length; otherwise falls back to the whole
/// page with an empty heading.
#[must_use]
pub fn extract_document(html: &str) -> Extraction {
    let nor = first_nor(html).unwrap_or_default();
    let document = Html::parse_document(html);

    for selector in CANDIDATE_SELECTORS.iter() {
        if let Some(container) = document.select(selector).next() {
            let text = container_text(container);
            if text.chars().count() >= MIN_EXTRACT_TEXT_LEN {
                return Extraction {
                    heading: heading_in(container),
                    text,
                    nor,
                };
            }
        }
    }

    Extraction {
        heading: String::new(),
        text: container_text(document.root_element()),
        nor,
    }
}

/// First NOR code in the raw HTML, uppercased.
#[must_use]
pub fn first_nor(html: &str) -> Option<String> {
    NOR_PATTERN
        .captures(html)
        .map(|caps| caps[1].to_uppercase())
}

/// All NOR codes in a page, from plain mentions and document links,
/// uppercased, deduplicated and sorted.
#[must_use]
pub fn extract_nor_codes(html: &str) -> Vec<String> {
    let mut nors: Vec<String> = NOR_PATTERN
        .captures_iter(html)
        .map(|caps| caps[1].to_uppercase())
        .chain(
            NOR_LINK_PATTERN
                .captures_iter(html)
                .map(|caps| caps[1].to_uppercase()),
        )
        .collect();
    nors.sort();
    nors.dedup();
    nors
}

/// Extract the normalized unit identifier mentioned in a heading or text.
///
/// # Examples
/// ```
/// use ris_harvester::extract::unit_display_in;
/// use ris_harvester::types::UnitKind;
///
/// assert_eq!(
///     unit_display_in("§ 12a Sorgfaltspflicht", UnitKind::Paragraf),
///     Some("§ 12a".to_string())
/// );
/// ```
#[must_use]
pub fn unit_display_in(text: &str, kind: UnitKind) -> Option<String> {
    let pattern = match kind {
        UnitKind::Paragraf => &*PARA_MENTION_PATTERN,
        UnitKind::Artikel => &*ART_MENTION_PATTERN,
    };
    let mention = pattern.find(text)?;
    UnitId::parse(mention.as_str()).map(|id| id.display(kind))
}

/// Whether an element is navigation/chrome to be skipped.
fn is_chrome(element: &ElementRef<'_>) -> bool {
    let value = element.value();
    if CHROME_TAGS.contains(&value.name()) {
        return true;
    }
    if let Some(id) = value.id() {
        if has_chrome_hint(id) {
            return true;
        }
    }
    value.classes().any(has_chrome_hint)
}

fn has_chrome_hint(value: &str) -> bool {
    let value = value.to_lowercase();
    CHROME_HINTS.iter().any(|hint| value.contains(hint))
}

/// Collect the text of a container, newline-separated, skipping chrome
/// subtrees, NFC-normalized.
fn container_text(container: ElementRef<'_>) -> String {
    let mut parts: Vec<String> = Vec::new();
    collect_text(container, &mut parts);
    parts.join("\n").nfc().collect()
}

fn collect_text(element: ElementRef<'_>, parts: &mut Vec<String>) {
    if is_chrome(&element) {
        return;
    }
    for child in element.children() {
        match child.value() {
            Node::Text(text) => {
                let trimmed = text.trim();
                if !trimmed.is_empty() {
                    parts.push(trimmed.to_string());
                }
            }
            Node::Element(_) => {
                if let Some(child_element) = ElementRef::wrap(child) {
                    collect_text(child_element, parts);
                }
            }
            _ => {}
        }
    }
}

/// First heading inside a container, whitespace-collapsed.
fn heading_in(container: ElementRef<'_>) -> String {
    container
        .select(&HEADING_SELECTOR)
        .next()
        .map(|h| {
            h.text()
                .flat_map(str::split_whitespace)
                .collect::<Vec<_>>()
                .join(" ")
        })
        .unwrap_or_default()
}
