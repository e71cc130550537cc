//! Task configuration

use std::fs::File;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::network::DistanceMetric;
use crate::{checked_product, checked_sum, ensure_positive, Result};

/// Shape of the sampled tasks and how many of them to run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FewShotConfig {
    /// Support samples per class (n-shot)
    pub n: usize,
    /// Classes per task (k-way)
    pub k: usize,
    /// Query samples per class
    pub q: usize,
    /// Batches per epoch
    pub episodes_per_epoch: usize,
    /// Tasks per batch
    pub num_tasks: usize,
    /// Distance between query and support embeddings
    pub distance: DistanceMetric,
    /// Seed for task sampling
    pub seed: Option<u64>,
}

impl Default for FewShotConfig {
    fn default() -> Self {
        Self {
            n: 1,
            k: 5,
            q: 15,
            episodes_per_epoch: 100,
            num_tasks: 1,
            distance: DistanceMetric::L2,
            seed: None,
        }
    }
}

impl FewShotConfig {
    /// Configuration for an n-shot, k-way task with q queries per class
    pub fn new(n: usize, k: usize, q: usize) -> Self {
        Self {
            n,
            k,
            q,
            ..Default::default()
        }
    }

    pub fn with_distance(mut self, distance: DistanceMetric) -> Self {
        self.distance = distance;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_episodes(mut self, episodes_per_epoch: usize) -> Self {
        self.episodes_per_epoch = episodes_per_epoch;
        self
    }

    /// Check that every task dimension is positive and a batch size fits in `usize`
    pub fn validate(&self) -> Result<()> {
        ensure_positive("n", self.n)?;
        ensure_positive("k", self.k)?;
        ensure_positive("q", self.q)?;
        ensure_positive("num_tasks", self.num_tasks)?;
        checked_product("num_tasks * task_size", self.num_tasks, self.task_size()?)?;
        Ok(())
    }

    /// Rows in one task: `(n + q) * k`
    pub fn task_size(&self) -> Result<usize> {
        checked_product("(n + q) * k", checked_sum("n + q", self.n, self.q)?, self.k)
    }

    /// Parse and validate a JSON configuration
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON configuration file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        let config: Self = serde_json::from_reader(file)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to pretty-printed JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FewShotError;

    #[test]
    fn test_default_is_valid() {
        let config = FewShotConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.task_size().unwrap(), 80);
    }

    #[test]
    fn test_partial_json() {
        let config = FewShotConfig::from_json_str(r#"{"n": 5, "k": 20, "distance": "cosine"}"#)
            .unwrap();

        assert_eq!(config.n, 5);
        assert_eq!(config.k, 20);
        assert_eq!(config.q, 15);
        assert_eq!(config.distance, DistanceMetric::Cosine);
    }

    #[test]
    fn test_json_round_trip() {
        let config = FewShotConfig::new(5, 5, 5).with_seed(42);
        let parsed = FewShotConfig::from_json_str(&config.to_json().unwrap()).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_invalid_json_values() {
        assert!(matches!(
            FewShotConfig::from_json_str(r#"{"k": 0}"#),
            Err(FewShotError::InvalidParameter(_))
        ));
        assert!(matches!(
            FewShotConfig::from_json_str(r#"{"distance": "manhattan"}"#),
            Err(FewShotError::Json(_))
        ));
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            FewShotConfig::from_file("/nonexistent/few_shot.json"),
            Err(FewShotError::Io(_))
        ));
    }

    #[test]
    fn test_overflowing_task_size_rejected() {
        let config = FewShotConfig::new(usize::MAX, 5, 1);
        assert!(matches!(config.task_size(), Err(FewShotError::InvalidParameter(_))));
        assert!(matches!(config.validate(), Err(FewShotError::InvalidParameter(_))));

        let result = FewShotConfig::from_json_str(&format!(
            r#"{{"n": 1, "k": {}, "q": 1}}"#,
            usize::MAX / 2 + 1
        ));
        assert!(matches!(result, Err(FewShotError::InvalidParameter(_))));
    }
}
