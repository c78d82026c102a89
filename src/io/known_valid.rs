//! Known-valid GTIN/serial reference data
//!
//! `KnownValidLookup` is the seam to whatever registry decides which serials
//! are genuine for a GTIN. `KnownValidTable` is the in-memory implementation,
//! loadable from a TOML file:
//!
//! ```toml
//! [codes]
//! "12345678901234" = ["SERIAL123", "SERIAL456"]
//! ```

use anyhow::Context;
use async_trait::async_trait;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

/// Reference-data collaborator consulted on each batch tick
#[async_trait]
pub trait KnownValidLookup: Send + Sync {
    /// Return the subset of `candidates` registered as valid serials of `gtin`
    ///
    /// # Errors
    /// Returns an error if the registry could not be consulted. The session
    /// applies its configured failure policy to such errors.
    async fn lookup(&self, gtin: &str, candidates: &[String]) -> anyhow::Result<Vec<String>>;
}

#[derive(Debug, Default, Deserialize)]
struct TableFile {
    #[serde(default)]
    codes: HashMap<String, Vec<String>>,
}

/// In-memory table of GTIN to valid serials
#[derive(Debug, Clone, Default)]
pub struct KnownValidTable {
    serials_by_gtin: FxHashMap<String, FxHashSet<String>>,
}

impl KnownValidTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a table from a TOML file with a `[codes]` section
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read known-valid table {}", path.display()))?;
        let table = Self::from_toml_str(&content)
            .with_context(|| format!("Failed to parse known-valid table {}", path.display()))?;

        info!(
            file = %path.display(),
            gtins = %table.gtin_count(),
            serials = %table.serial_count(),
            "known_valid_table_loaded"
        );
        Ok(table)
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let file: TableFile = toml::from_str(content)?;
        let mut table = Self::new();
        for (gtin, serials) in file.codes {
            table.insert(&gtin, serials);
        }
        Ok(table)
    }

    /// Register serials for a GTIN, merging with any already present
    pub fn insert<I, S>(&mut self, gtin: &str, serials: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.serials_by_gtin
            .entry(gtin.to_string())
            .or_default()
            .extend(serials.into_iter().map(Into::into));
    }

    /// Candidates registered for `gtin`, in candidate order
    pub fn matching(&self, gtin: &str, candidates: &[String]) -> Vec<String> {
        let Some(valid) = self.serials_by_gtin.get(gtin) else {
            return Vec::new();
        };
        candidates.iter().filter(|serial| valid.contains(serial.as_str())).cloned().collect()
    }

    pub fn gtin_count(&self) -> usize {
        self.serials_by_gtin.len()
    }

    pub fn serial_count(&self) -> usize {
        self.serials_by_gtin.values().map(FxHashSet::len).sum()
    }
}

#[async_trait]
impl KnownValidLookup for KnownValidTable {
    async fn lookup(&self, gtin: &str, candidates: &[String]) -> anyhow::Result<Vec<String>> {
        let matched = self.matching(gtin, candidates);
        debug!(gtin = %gtin, candidates = %candidates.len(), matched = %matched.len(), "known_valid_lookup");
        Ok(matched)
    }
}
