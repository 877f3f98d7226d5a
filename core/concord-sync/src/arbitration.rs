//! Per-field arbitration of a difference set.

use concord_types::SettingKey;
use serde::{Deserialize, Serialize};

use crate::diff::DifferenceSet;

/// How one differing key is resolved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    /// Keep the local value and retain it in the baseline.
    UseOld,
    /// Write the incoming value to local storage.
    #[default]
    UseNew,
    /// Leave this key alone for now; it resurfaces on the next pass.
    None,
}

/// The participant's answer to an arbitration prompt.
#[derive(Debug, Clone, PartialEq)]
pub enum ArbitrationDecision {
    /// Commit the resolutions carried by the set.
    Confirm(DifferenceSet),
    /// Close without applying; the divergence resurfaces next time.
    Dismiss,
    /// Close without applying and suppress prompts until the next save.
    Ignore,
}

/// Interactive resolution state for one prompt.
///
/// Every record starts as [`Resolution::UseNew`]. Choosing the active
/// resolution a second time reverts the record to [`Resolution::None`].
#[derive(Debug, Clone)]
pub struct ArbitrationFlow {
    differences: DifferenceSet,
}

impl ArbitrationFlow {
    pub fn new(mut differences: DifferenceSet) -> Self {
        for change in differences.records_mut() {
            change.resolution = Resolution::UseNew;
        }
        Self { differences }
    }

    pub fn differences(&self) -> &DifferenceSet {
        &self.differences
    }

    pub fn resolution(&self, key: &SettingKey) -> Option<Resolution> {
        self.differences.record(key).map(|c| c.resolution)
    }

    /// Toggles a record towards `resolution` and returns its new state, or
    /// `None` if the key is not part of the prompt.
    pub fn choose(&mut self, key: &SettingKey, resolution: Resolution) -> Option<Resolution> {
        let change = self.differences.record_mut(key)?;
        change.resolution = if change.resolution == resolution {
            Resolution::None
        } else {
            resolution
        };
        Some(change.resolution)
    }

    /// Sets every record to `resolution`.
    pub fn choose_all(&mut self, resolution: Resolution) {
        for change in self.differences.records_mut() {
            change.resolution = resolution;
        }
    }

    pub fn confirm(self) -> ArbitrationDecision {
        ArbitrationDecision::Confirm(self.differences)
    }

    pub fn dismiss(self) -> ArbitrationDecision {
        ArbitrationDecision::Dismiss
    }

    pub fn dismiss_and_ignore(self) -> ArbitrationDecision {
        ArbitrationDecision::Ignore
    }
}
