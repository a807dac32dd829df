//! Configuration constants, URL building and input validation.

use regex::Regex;
use std::sync::LazyLock;

use crate::error::{HarvestError, Result};
use crate::types::{UnitId, UnitKind};

/// Base URL of the RIS portal.
pub const RIS_BASE_URL: &str = "https://www.ris.bka.gv.at";

/// User agent string identifying this harvester.
pub const USER_AGENT: &str = concat!("ris-harvester/", env!("CARGO_PKG_VERSION"));

/// HTTP timeout in seconds.
pub const HTTP_TIMEOUT_SECS: u64 = 20;

/// Minimum acceptable body length for a document page.
///
/// The portal answers some dead links with HTTP 200 and a short placeholder
/// page; anything below this is treated as not-a-document.
pub const MIN_DOCUMENT_BODY_LEN: usize = 500;

/// Minimum acceptable body length for a TOC page.
pub const MIN_TOC_BODY_LEN: usize = 2000;

/// Minimum extracted text length for a content container to be accepted.
pub const MIN_EXTRACT_TEXT_LEN: usize = 50;

/// Maximum span a textual unit range ("§ 3 bis 7") may expand to.
pub const MAX_RANGE_SPAN: u32 = 5000;

/// Attribution note carried in every output record.
pub const LICENSE_NOTE: &str =
    "Datenquelle: RIS - https://www.ris.bka.gv.at/, Lizenz: CC BY 4.0";

/// Gesetzesnummer pattern: 4 to 8 digits.
#[allow(clippy::expect_used)] // Static regex that is guaranteed to be valid
static GESETZESNUMMER_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{4,8}$").expect("valid regex"));

/// Date pattern: YYYY-MM-DD.
#[allow(clippy::expect_used)] // Static regex that is guaranteed to be valid
static DATE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("valid regex"));

/// Validate Gesetzesnummer format.
///
/// # Arguments
/// * `gesetzesnummer` - The registry number to validate
///
/// # Returns
/// * `Ok(())` if valid
/// * `Err(HarvestError::InvalidGesetzesnummer)` if invalid
///
/// # Examples
/// ```
/// use ris_harvester::config::validate_gesetzesnummer;
///
/// assert!(validate_gesetzesnummer("10001622").is_ok());
/// assert!(validate_gesetzesnummer("ABGB").is_err());
/// ```
pub fn validate_gesetzesnummer(gesetzesnummer: &str) -> Result<()> {
    if GESETZESNUMMER_PATTERN.is_match(gesetzesnummer) {
        Ok(())
    } else {
        Err(HarvestError::InvalidGesetzesnummer(
            gesetzesnummer.to_string(),
        ))
    }
}

/// Validate date format (YYYY-MM-DD).
///
/// Rejects dates in the future since the portal has no consolidated
/// versions for them.
///
/// # Examples
/// ```
/// use ris_harvester::config::validate_date;
///
/// assert!(validate_date("2024-06-01").is_ok());
/// assert!(validate_date("invalid").is_err());
/// assert!(validate_date("2024-13-01").is_err()); // Invalid month
/// ```
pub fn validate_date(date_str: &str) -> Result<()> {
    if !DATE_PATTERN.is_match(date_str) {
        return Err(HarvestError::InvalidDate(date_str.to_string()));
    }

    let parsed_date = chrono::NaiveDate::parse_from_str(date_str, "%Y-%m-%d")
        .map_err(|_| HarvestError::InvalidDate(date_str.to_string()))?;

    let today = chrono::Local::now().date_naive();
    if parsed_date > today {
        return Err(HarvestError::InvalidDate(format!(
            "{date_str} is in the future (today is {today})"
        )));
    }

    Ok(())
}

/// Portal endpoints.
///
/// URL construction goes through this struct so tests can point the whole
/// pipeline at a mock server.
#[derive(Debug, Clone)]
pub struct RisEndpoints {
    /// Portal base URL, without trailing slash.
    pub base_url: String,
}

impl Default for RisEndpoints {
    fn default() -> Self {
        Self {
            base_url: RIS_BASE_URL.to_string(),
        }
    }
}

impl RisEndpoints {
    /// Create endpoints rooted at an arbitrary base URL.
    #[must_use]
    pub fn with_base(base_url: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self { base_url }
    }

    /// Build the NormDokument URL for one unit of a law.
    ///
    /// Unit `0` is the portal's table-of-contents page. `context` carries
    /// extra structural query parameters (Buch/Teil/...) for partitioned
    /// codes; an empty slice means the flat global numbering.
    ///
    /// # Arguments
    /// * `gesetzesnummer` - Registry number of the law
    /// * `kind` - Whether the unit parameter is `Paragraf` or `Artikel`
    /// * `unit` - Unit value as it appears in the query (e.g., "12", "12a", "0")
    /// * `context` - Additional structural `(key, value)` query parameters
    #[must_use]
    pub fn norm_url(
        &self,
        gesetzesnummer: &str,
        kind: UnitKind,
        unit: &str,
        context: &[(String, String)],
    ) -> String {
        let mut query = vec![
            ("Abfrage".to_string(), "Bundesnormen".to_string()),
            ("Gesetzesnummer".to_string(), gesetzesnummer.to_string()),
            (kind.query_param().to_string(), unit.to_string()),
        ];
        // The portal expects the unused selectors to be present but empty.
        query.push(("Uebergangsrecht".to_string(), String::new()));
        query.push(("Anlage".to_string(), String::new()));
        query.push((kind.other().query_param().to_string(), String::new()));
        query.extend(context.iter().cloned());

        let encoded = query
            .iter()
            .map(|(k, v)| format!("{}={}", urlencode(k), urlencode(v)))
            .collect::<Vec<_>>()
            .join("&");
        format!("{}/NormDokument.wxe?{encoded}", self.base_url)
    }

    /// Build the URL of a unit identified by a [`UnitId`].
    #[must_use]
    pub fn unit_url(
        &self,
        gesetzesnummer: &str,
        kind: UnitKind,
        unit: UnitId,
        context: &[(String, String)],
    ) -> String {
        self.norm_url(gesetzesnummer, kind, &unit.query_value(), context)
    }

    /// Build the TOC (unit 0) URL, optionally for a specific version date.
    #[must_use]
    pub fn toc_url(
        &self,
        gesetzesnummer: &str,
        kind: UnitKind,
        version_date: Option<&str>,
    ) -> String {
        let mut url = self.norm_url(gesetzesnummer, kind, "0", &[]);
        if let Some(date) = version_date {
            url.push_str("&FassungVom=");
            url.push_str(&urlencode(date));
        }
        url
    }

    /// Build the canonical HTML URL for a NOR document.
    ///
    /// # Examples
    /// ```
    /// use ris_harvester::config::RisEndpoints;
    ///
    /// let endpoints = RisEndpoints::default();
    /// assert_eq!(
    ///     endpoints.document_url("NOR12034567"),
    ///     "https://www.ris.bka.gv.at/Dokumente/Bundesnormen/NOR12034567/NOR12034567.html"
    /// );
    /// ```
    #[must_use]
    pub fn document_url(&self, nor: &str) -> String {
        format!("{}/Dokumente/Bundesnormen/{nor}/{nor}.html", self.base_url)
    }
}

/// Percent-encode one query component.
fn urlencode(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
}
