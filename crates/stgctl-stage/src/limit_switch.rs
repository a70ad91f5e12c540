//! Limit switch positions recorded during startup
//!
//! The origin (the +X/+Y limit corner) followed by the four corners in
//! traversal order. Persisted as a JSON list of `[x, y]` pairs.

use serde::{Deserialize, Serialize};
use std::path::Path;
use stgctl_core::{CalibrationError, Error, Result, Size};

/// Number of positions in a complete sample
pub const SAMPLE_LEN: usize = 5;

/// Corners visited after homing, as (X positive, Y positive) limit directions
pub const CORNERS: [(bool, bool); 4] = [(true, false), (false, false), (false, true), (true, true)];

/// Recorded limit switch positions
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LimitSwitchSample {
    positions: Vec<Size>,
}

impl LimitSwitchSample {
    /// Empty sample
    pub fn new() -> Self {
        Self::default()
    }

    /// Sample from already recorded positions
    pub fn from_positions(positions: Vec<Size>) -> Self {
        Self { positions }
    }

    /// Record the next position
    pub fn push(&mut self, position: Size) {
        self.positions.push(position);
    }

    /// Recorded positions in order
    pub fn positions(&self) -> &[Size] {
        &self.positions
    }

    /// Number of recorded positions
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    /// Whether nothing was recorded
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Whether the origin and all four corners were recorded
    pub fn is_complete(&self) -> bool {
        self.positions.len() == SAMPLE_LEN
    }

    /// Fail with `IncompleteSample` unless complete
    pub fn ensure_complete(&self) -> Result<()> {
        if self.is_complete() {
            Ok(())
        } else {
            Err(CalibrationError::IncompleteSample {
                found: self.positions.len(),
            }
            .into())
        }
    }

    /// Load a sample saved by [`LimitSwitchSample::save`]
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::other(format!(
                "Failed to read limit switch positions from {}: {}",
                path.display(),
                e
            ))
        })?;
        let sample: Self = serde_json::from_str(&content)
            .map_err(|e| Error::other(format!("Invalid limit switch positions: {}", e)))?;
        sample.ensure_complete()?;
        tracing::debug!("Loaded limit switch positions {:?}", sample.positions);
        Ok(sample)
    }

    /// Save as a JSON list of `[x, y]` pairs
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string(self)
            .map_err(|e| Error::other(format!("Failed to serialize positions: {}", e)))?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample() -> LimitSwitchSample {
        LimitSwitchSample::from_positions(vec![
            Size::new(0, 0),
            Size::new(11950, -5),
            Size::new(-2, -11980),
            Size::new(-11955, 3),
            Size::new(0, -1),
        ])
    }

    #[test]
    fn test_saved_format_is_pair_list() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("limit_switch_positions.json");
        sample().save(&path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            text,
            "[[0,0],[11950,-5],[-2,-11980],[-11955,3],[0,-1]]"
        );
        assert_eq!(LimitSwitchSample::load(&path).unwrap(), sample());
    }

    #[test]
    fn test_load_rejects_incomplete() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("partial.json");
        std::fs::write(&path, "[[0,0],[1,2]]").unwrap();
        let err = LimitSwitchSample::load(&path).unwrap_err();
        assert!(matches!(
            err,
            Error::Calibration(CalibrationError::IncompleteSample { found: 2 })
        ));
    }

    #[test]
    fn test_load_rejects_garbage() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{\"x\": 1}").unwrap();
        assert!(LimitSwitchSample::load(&path).is_err());
        assert!(LimitSwitchSample::load(&dir.path().join("missing.json")).is_err());
    }

    #[test]
    fn test_completeness() {
        let mut partial = LimitSwitchSample::new();
        partial.push(Size::new(0, 0));
        assert!(!partial.is_complete());
        assert!(partial.ensure_complete().is_err());
        assert!(sample().is_complete());
    }
}
