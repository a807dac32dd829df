//! Core data types: legal units, output records, registry descriptors.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize, Serializer};

/// Whether a code is numbered in paragraphs (§) or articles (Art.).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitKind {
    /// Paragraph numbering (§ 1, § 2, ...).
    Paragraf,

    /// Article numbering (Art. 1, Art. 2, ...).
    Artikel,
}

impl UnitKind {
    /// Query parameter name used by the portal for this kind.
    #[must_use]
    pub fn query_param(&self) -> &'static str {
        match self {
            Self::Paragraf => "Paragraf",
            Self::Artikel => "Artikel",
        }
    }

    /// Display symbol preceding the unit number.
    #[must_use]
    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Paragraf => "§",
            Self::Artikel => "Art.",
        }
    }

    /// String value for output records and the registry file.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Paragraf => "paragraf",
            Self::Artikel => "artikel",
        }
    }

    /// The opposite kind.
    #[must_use]
    pub fn other(&self) -> Self {
        match self {
            Self::Paragraf => Self::Artikel,
            Self::Artikel => Self::Paragraf,
        }
    }

    /// Parse from a registry string, tolerating common variants.
    #[must_use]
    pub fn from_registry_str(text: &str) -> Option<Self> {
        match text.trim().to_lowercase().as_str() {
            "paragraf" | "paragraph" | "§" => Some(Self::Paragraf),
            "artikel" | "article" | "art" | "art." => Some(Self::Artikel),
            _ => None,
        }
    }
}

/// Pattern for parsing a unit identifier with optional symbol and suffix.
#[allow(clippy::expect_used)] // Static regex that is guaranteed to be valid
static UNIT_ID_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:§+|Art\.?|Artikel)?\s*(\d+)\s*([a-zA-Z]?)$").expect("valid regex")
});

/// One legal unit identifier: numeric base plus optional letter suffix.
///
/// Ordering is `(number, suffix)` with the unsuffixed form first, which is
/// exactly the order units appear in a code: § 12, § 12a, § 12b, § 13.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UnitId {
    /// Numeric base (§ 12a -> 12).
    pub number: u32,

    /// Lowercase letter suffix (§ 12a -> Some('a')).
    pub suffix: Option<char>,
}

impl UnitId {
    /// Create an unsuffixed unit id.
    #[must_use]
    pub fn new(number: u32) -> Self {
        Self {
            number,
            suffix: None,
        }
    }

    /// Create a suffixed unit id; the suffix is lowercased.
    #[must_use]
    pub fn with_suffix(number: u32, suffix: char) -> Self {
        Self {
            number,
            suffix: Some(suffix.to_ascii_lowercase()),
        }
    }

    /// Parse a unit identifier such as "12", "12a", "§ 12a" or "Art. 5".
    ///
    /// Returns `None` when the input does not denote a single unit.
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        let caps = UNIT_ID_PATTERN.captures(text.trim())?;
        let number: u32 = caps.get(1)?.as_str().parse().ok()?;
        let suffix = caps
            .get(2)
            .map(|m| m.as_str())
            .filter(|s| !s.is_empty())
            .and_then(|s| s.chars().next())
            .map(|c| c.to_ascii_lowercase());
        Some(Self { number, suffix })
    }

    /// Value for the portal's unit query parameter ("12", "12a").
    #[must_use]
    pub fn query_value(&self) -> String {
        match self.suffix {
            Some(suffix) => format!("{}{}", self.number, suffix),
            None => self.number.to_string(),
        }
    }

    /// Normalized display form for a given kind ("§ 12a", "Art. 5").
    #[must_use]
    pub fn display(&self, kind: UnitKind) -> String {
        format!("{} {}", kind.symbol(), self.query_value())
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.query_value())
    }
}

/// Outcome classification for one output record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordStatus {
    /// Unit fetched with non-empty text.
    Ok,

    /// Document fetched but no text could be extracted.
    EmptyText,

    /// The portal answered 404 for the unit.
    NotFound,

    /// Unit number absent from the TOC; no fetch attempted.
    NotInToc,

    /// Unit page reachable but no canonical document resolved.
    NoDocument,

    /// Resolving canonical documents for the unit failed.
    ResolveFailed,

    /// Fetching a resolved document failed after retries.
    FetchFailed,

    /// Definitive non-404 HTTP error status.
    Http(u16),
}

impl RecordStatus {
    /// Status tag as written to output records.
    #[must_use]
    pub fn tag(&self) -> String {
        match self {
            Self::Ok => "ok".to_string(),
            Self::EmptyText => "empty_text".to_string(),
            Self::NotFound => "not_found".to_string(),
            Self::NotInToc => "not_in_toc".to_string(),
            Self::NoDocument => "no_nor_found".to_string(),
            Self::ResolveFailed => "resolve_failed".to_string(),
            Self::FetchFailed => "fetch_failed".to_string(),
            Self::Http(code) => format!("http_{code}"),
        }
    }

    /// Whether this status may carry non-empty text.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok)
    }
}

impl Serialize for RecordStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.tag())
    }
}

impl fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tag())
    }
}

/// One JSON-Lines output row: a legal unit or a placeholder for a gap.
///
/// `status`, `text`, `url` and `unit` are present on every row, including
/// placeholders; downstream consumers rely on one row per declared unit.
#[derive(Debug, Clone, Serialize)]
pub struct UnitRecord {
    /// Law display name (e.g., "ABGB").
    pub law: String,

    /// Registry number of the law.
    pub gesetzesnummer: String,

    /// Sequence kind this row belongs to.
    pub unit_type: UnitKind,

    /// Normalized display identifier ("§ 12a", "Art. 5").
    pub unit: String,

    /// Outcome classification.
    pub status: RecordStatus,

    /// Extracted heading, empty for placeholders.
    pub heading: String,

    /// Extracted text, empty implies a non-ok status.
    pub text: String,

    /// Canonical document identifier (NOR code), empty if unresolved.
    pub document_number: String,

    /// Resolved fetch URL, empty for not-in-TOC placeholders.
    pub url: String,

    /// Data source label.
    pub source: String,

    /// Attribution note.
    pub license: String,

    /// Capture timestamp (UTC, RFC 3339).
    pub retrieved_at: String,
}

impl UnitRecord {
    /// Create a record with empty content fields.
    #[must_use]
    pub fn new(
        law: impl Into<String>,
        gesetzesnummer: impl Into<String>,
        unit_type: UnitKind,
        unit: impl Into<String>,
        status: RecordStatus,
    ) -> Self {
        Self {
            law: law.into(),
            gesetzesnummer: gesetzesnummer.into(),
            unit_type,
            unit: unit.into(),
            status,
            heading: String::new(),
            text: String::new(),
            document_number: String::new(),
            url: String::new(),
            source: "RIS HTML".to_string(),
            license: crate::config::LICENSE_NOTE.to_string(),
            retrieved_at: now_utc(),
        }
    }

    /// Set the fetch URL.
    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    /// Set heading and text.
    #[must_use]
    pub fn with_content(mut self, heading: impl Into<String>, text: impl Into<String>) -> Self {
        self.heading = heading.into();
        self.text = text.into();
        self
    }

    /// Set the canonical document number.
    #[must_use]
    pub fn with_document_number(mut self, nor: impl Into<String>) -> Self {
        self.document_number = nor.into();
        self
    }
}

/// Current UTC time at second precision, RFC 3339 with Z suffix.
#[must_use]
pub fn now_utc() -> String {
    chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

/// Per-law metadata from the registry file.
///
/// Populated offline by the `enrich` command; read-only at export time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LawDescriptor {
    /// Short name ("ABGB", "StGB").
    pub kurz: String,

    /// Full title, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub titel: Option<String>,

    /// Registry number.
    pub gesetzesnummer: String,

    /// Declared unit kind of the authoritative sequence.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit_type: Option<UnitKind>,

    /// Upper unit bound used when live discovery is inconclusive.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_end: Option<u32>,

    /// How `fallback_end` was determined ("toc", "probe:paragraf", ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_source: Option<String>,

    /// The code contains a paragraph sequence.
    #[serde(default)]
    pub has_paragraphs: bool,

    /// The code contains an article sequence.
    #[serde(default)]
    pub has_articles: bool,
}

impl LawDescriptor {
    /// The sequences to export for this law, in order.
    ///
    /// Mixed codes export paragraphs first, then articles. When neither
    /// flag is set the declared `unit_type` (or paragraphs) decides.
    #[must_use]
    pub fn export_kinds(&self) -> Vec<UnitKind> {
        match (self.has_paragraphs, self.has_articles) {
            (true, true) => vec![UnitKind::Paragraf, UnitKind::Artikel],
            (true, false) => vec![UnitKind::Paragraf],
            (false, true) => vec![UnitKind::Artikel],
            (false, false) => vec![self.unit_type.unwrap_or(UnitKind::Paragraf)],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_kind_query_param() {
        assert_eq!(UnitKind::Paragraf.query_param(), "Paragraf");
        assert_eq!(UnitKind::Artikel.query_param(), "Artikel");
    }

    #[test]
    fn test_unit_kind_from_registry_str() {
        assert_eq!(
            UnitKind::from_registry_str("paragraf"),
            Some(UnitKind::Paragraf)
        );
        assert_eq!(
            UnitKind::from_registry_str("Artikel"),
            Some(UnitKind::Artikel)
        );
        assert_eq!(UnitKind::from_registry_str("Art."), Some(UnitKind::Artikel));
        assert_eq!(UnitKind::from_registry_str("unknown"), None);
    }

    #[test]
    fn test_unit_id_parse_plain() {
        assert_eq!(UnitId::parse("12"), Some(UnitId::new(12)));
        assert_eq!(UnitId::parse("12a"), Some(UnitId::with_suffix(12, 'a')));
        assert_eq!(UnitId::parse("12 B"), Some(UnitId::with_suffix(12, 'b')));
    }

    #[test]
    fn test_unit_id_parse_with_symbol() {
        assert_eq!(UnitId::parse("§ 12"), Some(UnitId::new(12)));
        assert_eq!(UnitId::parse("§12a"), Some(UnitId::with_suffix(12, 'a')));
        assert_eq!(UnitId::parse("Art. 5"), Some(UnitId::new(5)));
        assert_eq!(UnitId::parse("Artikel 7"), Some(UnitId::new(7)));
    }

    #[test]
    fn test_unit_id_parse_rejects_garbage() {
        assert_eq!(UnitId::parse(""), None);
        assert_eq!(UnitId::parse("Anlage 1"), None);
        assert_eq!(UnitId::parse("§ 12ab"), None); // Only single-letter suffixes
    }

    #[test]
    fn test_unit_id_ordering() {
        let mut ids = vec![
            UnitId::new(13),
            UnitId::with_suffix(12, 'b'),
            UnitId::new(12),
            UnitId::with_suffix(12, 'a'),
        ];
        ids.sort();
        assert_eq!(
            ids,
            vec![
                UnitId::new(12),
                UnitId::with_suffix(12, 'a'),
                UnitId::with_suffix(12, 'b'),
                UnitId::new(13),
            ]
        );
    }

    #[test]
    fn test_unit_id_display() {
        assert_eq!(UnitId::new(12).display(UnitKind::Paragraf), "§ 12");
        assert_eq!(
            UnitId::with_suffix(12, 'a').display(UnitKind::Paragraf),
            "§ 12a"
        );
        assert_eq!(UnitId::new(5).display(UnitKind::Artikel), "Art. 5");
    }

    #[test]
    fn test_record_status_tags() {
        assert_eq!(RecordStatus::Ok.tag(), "ok");
        assert_eq!(RecordStatus::EmptyText.tag(), "empty_text");
        assert_eq!(RecordStatus::NotInToc.tag(), "not_in_toc");
        assert_eq!(RecordStatus::NoDocument.tag(), "no_nor_found");
        assert_eq!(RecordStatus::Http(503).tag(), "http_503");
    }

    #[test]
    fn test_record_serialization_keeps_non_ascii() {
        let record = UnitRecord::new(
            "ABGB",
            "10001622",
            UnitKind::Paragraf,
            "§ 12",
            RecordStatus::Ok,
        )
        .with_content("Überschrift", "Der Text");

        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"unit\":\"§ 12\""));
        assert!(json.contains("Überschrift"));
        assert!(json.contains("\"status\":\"ok\""));
        assert!(!json.contains("\\u00a7")); // No ASCII escaping of §
    }

    #[test]
    fn test_export_kinds_mixed() {
        let descriptor = LawDescriptor {
            kurz: "EGVG".to_string(),
            titel: None,
            gesetzesnummer: "10005248".to_string(),
            unit_type: Some(UnitKind::Artikel),
            fallback_end: None,
            fallback_source: None,
            has_paragraphs: true,
            has_articles: true,
        };
        assert_eq!(
            descriptor.export_kinds(),
            vec![UnitKind::Paragraf, UnitKind::Artikel]
        );
    }

    #[test]
    fn test_export_kinds_default() {
        let descriptor = LawDescriptor {
            kurz: "ABGB".to_string(),
            titel: None,
            gesetzesnummer: "10001622".to_string(),
            unit_type: None,
            fallback_end: None,
            fallback_source: None,
            has_paragraphs: false,
            has_articles: false,
        };
        assert_eq!(descriptor.export_kinds(), vec![UnitKind::Paragraf]);
    }
}
