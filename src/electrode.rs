//! Electrode and time-series descriptor data model.
//!
//! Grounded on `ctk/api_data.h`'s `Electrode`/`TimeSeries` structs and the
//! size limits in `ctk::api::v1::sizes`.

use hifitime::Epoch;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::DataError;

/// Visible-character caps the ASCII header truncates each field to
/// (`ctk::api::v1::sizes`).
pub const ACTIVE_LABEL_MAX: usize = 10;
pub const REFERENCE_MAX: usize = 9;
pub const UNIT_MAX: usize = 10;
pub const STATUS_MAX: usize = 9;
pub const TYPE_MAX: usize = 9;

/// One recording channel.
///
/// `ActiveLabel` and `Unit` are required and non-empty; `IScale`/`RScale`
/// must be finite. The effective sample-to-physical-unit conversion is
/// `physical = sample * IScale * RScale`.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Electrode {
    pub active_label: String,
    pub reference: String,
    pub unit: String,
    pub status: String,
    pub r#type: String,
    pub iscale: f64,
    pub rscale: f64,
}

impl Default for Electrode {
    fn default() -> Self {
        Self {
            active_label: String::new(),
            reference: String::new(),
            unit: "uV".to_string(),
            status: String::new(),
            r#type: String::new(),
            iscale: 1.0,
            rscale: 1.0 / 256.0,
        }
    }
}

impl Electrode {
    pub fn new(active_label: impl Into<String>, reference: impl Into<String>) -> Self {
        Self { active_label: active_label.into(), reference: reference.into(), ..Self::default() }
    }

    /// `physical = sample * IScale * RScale`.
    pub fn scale(&self, sample: i32) -> f64 {
        sample as f64 * self.iscale * self.rscale
    }

    /// Validates the invariants: non-empty label/unit, label does not
    /// start with `[`/`;` (would be confused with an ASCII header section
    /// marker or a comment line), no embedded whitespace in the label,
    /// and finite scales.
    pub fn validate(&self) -> Result<(), DataError> {
        if self.active_label.is_empty() {
            return Err(DataError::Header("electrode label is empty".into()));
        }
        if self.active_label.starts_with('[') || self.active_label.starts_with(';') {
            return Err(DataError::Header(format!(
                "electrode label {:?} starts with a reserved character",
                self.active_label
            )));
        }
        if self.active_label.chars().any(char::is_whitespace) {
            return Err(DataError::Header(format!(
                "electrode label {:?} contains whitespace",
                self.active_label
            )));
        }
        if self.unit.is_empty() {
            return Err(DataError::Header("electrode unit is empty".into()));
        }
        if !self.iscale.is_finite() || !self.rscale.is_finite() {
            return Err(DataError::Header(format!(
                "electrode {:?} has a non-finite scale",
                self.active_label
            )));
        }
        Ok(())
    }
}

/// Describes the recording as a whole: acquisition start, sampling rate,
/// ordered electrode list and the epoch length used by the compression
/// engine.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TimeSeries {
    pub start_time: Epoch,
    pub sampling_frequency: f64,
    pub electrodes: Vec<Electrode>,
    pub epoch_length: i64,
}

impl TimeSeries {
    pub fn validate(&self) -> Result<(), DataError> {
        if !self.sampling_frequency.is_finite() || self.sampling_frequency <= 0.0 {
            return Err(DataError::Header(format!(
                "sampling frequency {} is not positive and finite",
                self.sampling_frequency
            )));
        }
        if self.electrodes.is_empty() {
            return Err(DataError::Header("time series has no electrodes".into()));
        }
        if self.epoch_length <= 0 {
            return Err(DataError::Header(format!("epoch length {} is not positive", self.epoch_length)));
        }
        for e in &self.electrodes {
            e.validate()?;
        }
        Ok(())
    }

    pub fn channel_count(&self) -> usize {
        self.electrodes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_electrode_matches_reflib_defaults() {
        let e = Electrode::default();
        assert_eq!(e.unit, "uV");
        assert_eq!(e.iscale, 1.0);
        assert_eq!(e.rscale, 1.0 / 256.0);
    }

    #[test]
    fn label_starting_with_bracket_or_semicolon_is_rejected() {
        let mut e = Electrode::new("[bad", "ref");
        assert!(e.validate().is_err());
        e.active_label = ";bad".into();
        assert!(e.validate().is_err());
    }

    #[test]
    fn whitespace_in_label_is_rejected() {
        let e = Electrode::new("A 1", "ref");
        assert!(e.validate().is_err());
    }

    #[test]
    fn non_finite_scale_is_rejected() {
        let mut e = Electrode::new("A1", "ref");
        e.iscale = f64::NAN;
        assert!(e.validate().is_err());
    }
}
