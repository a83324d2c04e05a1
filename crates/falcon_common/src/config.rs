use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{FalconError, FalconResult};

/// Top-level configuration document. Only the sections the merge layer reads
/// are modelled here; unknown sections are ignored.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FalconConfig {
    #[serde(default)]
    pub merge: MergeConfig,
}

/// `[merge]` section: reduce-side merge index tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeConfig {
    /// Undrained data pages a single source may have buffered in an unsorted
    /// merge (its page credit). Sorted merges always use exactly one.
    pub max_pages_in_flight: usize,
    /// Rows cached for rescans of a finished merge index. A stream longer
    /// than this cannot be rescanned.
    pub max_fetched_rows: usize,
    /// Log a warning each time the consumer has waited this long for pages
    /// (0 = never). The wait itself is not bounded.
    pub slow_wait_warn_ms: u64,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            max_pages_in_flight: 4,
            max_fetched_rows: 10_000,
            slow_wait_warn_ms: 5_000,
        }
    }
}

impl MergeConfig {
    /// Parse the `[merge]` section of a TOML document. A missing section or
    /// missing keys fall back to defaults.
    pub fn from_toml_str(text: &str) -> FalconResult<Self> {
        let doc: FalconConfig = toml::from_str(text)
            .map_err(|e| FalconError::Config(format!("invalid merge config: {e}")))?;
        doc.merge.validate()?;
        Ok(doc.merge)
    }

    pub fn validate(&self) -> FalconResult<()> {
        if self.max_pages_in_flight == 0 {
            return Err(FalconError::Config(
                "merge.max_pages_in_flight must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn slow_wait_threshold(&self) -> Option<Duration> {
        if self.slow_wait_warn_ms == 0 {
            None
        } else {
            Some(Duration::from_millis(self.slow_wait_warn_ms))
        }
    }
}
