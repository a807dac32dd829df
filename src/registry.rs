//! Law registry: per-code metadata for export runs.
//!
//! The registry is a JSON file of [`LawDescriptor`] entries, bundled with
//! the crate and overridable from disk. It is read-only at export time;
//! the `enrich` command populates `fallback_end`/`unit_type` offline.

use std::path::Path;

use crate::error::{HarvestError, Result};
use crate::types::LawDescriptor;

/// Bundled registry data.
const BUNDLED_LAWS: &str = include_str!("../data/laws.json");

/// Loaded law registry.
#[derive(Debug, Clone)]
pub struct LawRegistry {
    laws: Vec<LawDescriptor>,
}

impl LawRegistry {
    /// Load the registry bundled with the crate.
    pub fn bundled() -> Result<Self> {
        let laws = serde_json::from_str(BUNDLED_LAWS)?;
        Ok(Self { laws })
    }

    /// Load a registry from a JSON file.
    pub fn from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| HarvestError::Registry {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        let laws = serde_json::from_str(&content).map_err(|e| HarvestError::Registry {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Ok(Self { laws })
    }

    /// Write the registry to a JSON file (pretty-printed, UTF-8).
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.laws)?;
        std::fs::write(path, json + "\n")?;
        Ok(())
    }

    /// Find a law by short name (case-insensitive) or Gesetzesnummer.
    #[must_use]
    pub fn find(&self, identifier: &str) -> Option<&LawDescriptor> {
        let ident = identifier.trim();
        self.laws.iter().find(|law| {
            law.gesetzesnummer == ident || law.kurz.eq_ignore_ascii_case(ident)
        })
    }

    /// Fallback upper bound for a law, if configured.
    #[must_use]
    pub fn fallback_end_for(&self, identifier: &str) -> Option<u32> {
        self.find(identifier).and_then(|law| law.fallback_end)
    }

    /// All registry entries.
    #[must_use]
    pub fn laws(&self) -> &[LawDescriptor] {
        &self.laws
    }

    /// Mutable access for enrichment.
    pub fn laws_mut(&mut self) -> &mut [LawDescriptor] {
        &mut self.laws
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::UnitKind;

    #[test]
    fn test_bundled_registry_loads() {
        let registry = LawRegistry::bundled().unwrap();
        assert!(!registry.laws().is_empty());
    }

    #[test]
    fn test_find_by_kurz_case_insensitive() {
        let registry = LawRegistry::bundled().unwrap();
        let law = registry.find("abgb").unwrap();
        assert_eq!(law.kurz, "ABGB");
        assert_eq!(law.gesetzesnummer, "10001622");
    }

    #[test]
    fn test_find_by_gesetzesnummer() {
        let registry = LawRegistry::bundled().unwrap();
        let law = registry.find("10002296").unwrap();
        assert_eq!(law.kurz, "StGB");
    }

    #[test]
    fn test_find_unknown() {
        let registry = LawRegistry::bundled().unwrap();
        assert!(registry.find("does-not-exist").is_none());
    }

    #[test]
    fn test_fallback_end_for() {
        let registry = LawRegistry::bundled().unwrap();
        assert_eq!(registry.fallback_end_for("ABGB"), Some(1502));
    }

    #[test]
    fn test_bvg_is_article_numbered() {
        let registry = LawRegistry::bundled().unwrap();
        let law = registry.find("B-VG").unwrap();
        assert_eq!(law.unit_type, Some(UnitKind::Artikel));
        assert!(law.has_articles);
    }

    #[test]
    fn test_save_round_trip() {
        let registry = LawRegistry::bundled().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("laws.json");
        registry.save(&path).unwrap();

        let reloaded = LawRegistry::from_path(&path).unwrap();
        assert_eq!(reloaded.laws(), registry.laws());
    }

    #[test]
    fn test_from_path_missing_file() {
        let err = LawRegistry::from_path(Path::new("/nonexistent/laws.json")).unwrap_err();
        assert!(matches!(err, HarvestError::Registry { .. }));
    }
}
