//! Canonical document (NOR) resolution and fetching.
//!
//! A unit page on the portal references the immutable NOR documents that
//! back the unit; one unit may map to zero, one or several documents, and
//! multi-unit documents are shared between neighboring units.

use reqwest::blocking::Client;

use crate::config::{RisEndpoints, MIN_DOCUMENT_BODY_LEN};
use crate::error::Result;
use crate::extract::{extract_document, extract_nor_codes, Extraction};
use crate::http::{fetch_html, RetryPolicy};

/// Reference to one canonical document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocRef {
    /// Canonical document identifier, if the reference carries one.
    pub nor: Option<String>,

    /// Fetchable HTML URL of the document.
    pub url: String,
}

impl DocRef {
    /// Build the canonical reference for a NOR code.
    #[must_use]
    pub fn for_nor(endpoints: &RisEndpoints, nor: &str) -> Self {
        Self {
            nor: Some(nor.to_string()),
            url: endpoints.document_url(nor),
        }
    }
}

/// Resolve the canonical documents referenced by a unit page.
///
/// Fetches the unit page and collects every NOR code it mentions or links.
/// Returns an empty vector when the page is reachable but references no
/// document; the caller decides whether to fall back to the unit page
/// itself (base numbers) or to treat that as a miss (suffix probing).
///
/// # Errors
/// `HarvestError::NotFound` when the unit page itself answers 404.
pub fn resolve_documents(
    client: &Client,
    policy: RetryPolicy,
    endpoints: &RisEndpoints,
    unit_url: &str,
) -> Result<Vec<DocRef>> {
    let html = fetch_html(client, policy, unit_url, MIN_DOCUMENT_BODY_LEN)?;
    let nors = extract_nor_codes(&html);
    Ok(nors
        .iter()
        .map(|nor| DocRef::for_nor(endpoints, nor))
        .collect())
}

/// Fetch one document page and extract heading, text and NOR.
pub fn fetch_document(
    client: &Client,
    policy: RetryPolicy,
    url: &str,
) -> Result<Extraction> {
    let html = fetch_html(client, policy, url, MIN_DOCUMENT_BODY_LEN)?;
    Ok(extract_document(&html))
}
