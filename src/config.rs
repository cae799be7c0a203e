use std::path::Path;

use anyhow::{Context, Result};
use log::{info, warn};
use serde::Deserialize;

use crate::cycling::segment::{suggest_threshold, SegmentMode, DEFAULT_REL_CUTOFF};
use crate::data::model::{ActiveMass, Threshold};
use crate::error::CyclingError;
use crate::export::ExportFormat;
use crate::pipeline::AnalysisOptions;

// ---------------------------------------------------------------------------
// Run configuration (JSON file and/or CLI flags)
// ---------------------------------------------------------------------------

/// How the applied current behaves over the test.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum CurrentMode {
    #[default]
    Constant,
    Variable,
}

/// Unvalidated settings for one run, as read from a config file.
///
/// ```json
/// { "active_mass_mg": 8.0, "current_mode": "variable", "threshold": 0.05 }
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AnalysisConfig {
    pub active_mass_mg: Option<f64>,
    pub current_mode: CurrentMode,
    pub rel_cutoff: f64,
    /// Operator-confirmed derivative threshold for variable current.
    pub threshold: Option<f64>,
    /// Take the suggested threshold as confirmed.
    pub accept_suggested_threshold: bool,
    pub charge_first: bool,
    pub format: ExportFormat,
    pub save_separate_cycles: bool,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            active_mass_mg: None,
            current_mode: CurrentMode::Constant,
            rel_cutoff: DEFAULT_REL_CUTOFF,
            threshold: None,
            accept_suggested_threshold: false,
            charge_first: true,
            format: ExportFormat::Csv,
            save_separate_cycles: false,
        }
    }
}

impl AnalysisConfig {
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: AnalysisConfig = serde_json::from_str(&text)
            .with_context(|| format!("parsing config {}", path.display()))?;
        Ok(config)
    }

    /// Validate into pipeline options. `current` is only consulted to
    /// suggest a threshold in variable-current mode.
    pub fn to_options(
        &self,
        current: &[f64],
    ) -> std::result::Result<AnalysisOptions, CyclingError> {
        let active_mass = match self.active_mass_mg {
            Some(mg) => ActiveMass::from_milligrams(mg)?,
            None => {
                return Err(CyclingError::InvalidActiveMass {
                    value: "<not set>".to_string(),
                })
            }
        };

        let mode = match self.current_mode {
            CurrentMode::Constant => SegmentMode::ConstantCurrent {
                rel_cutoff: self.rel_cutoff,
            },
            CurrentMode::Variable => SegmentMode::variable(self.confirmed_threshold(current)?),
        };

        Ok(AnalysisOptions {
            active_mass_g: active_mass.grams(),
            mode,
            charge_first: self.charge_first,
        })
    }

    fn confirmed_threshold(&self, current: &[f64]) -> std::result::Result<Threshold, CyclingError> {
        let suggested = suggest_threshold(current);
        if let Some(value) = self.threshold {
            if let Some(s) = suggested {
                info!("Using operator threshold {value} (suggested {s})");
            }
            return Threshold::new(value);
        }
        match suggested {
            Some(s) if self.accept_suggested_threshold => {
                info!("Operator accepted suggested threshold {s}");
                Threshold::new(s)
            }
            Some(s) => {
                warn!("Suggested threshold {s} needs confirmation");
                Err(CyclingError::InvalidThreshold {
                    value: format!("unconfirmed (suggested {s})"),
                })
            }
            None => Err(CyclingError::InvalidThreshold {
                value: "<none: current never changes>".to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_missing_fields() {
        let cfg: AnalysisConfig = serde_json::from_str(r#"{ "active_mass_mg": 8 }"#).unwrap();
        assert_eq!(cfg.current_mode, CurrentMode::Constant);
        assert_eq!(cfg.rel_cutoff, 0.98);
        assert!(cfg.charge_first);
        let opts = cfg.to_options(&[]).unwrap();
        assert_eq!(opts.active_mass_g, 0.008);
        assert_eq!(opts.mode, SegmentMode::constant());
    }

    #[test]
    fn unknown_fields_are_rejected() {
        assert!(serde_json::from_str::<AnalysisConfig>(r#"{ "mass": 8 }"#).is_err());
    }

    #[test]
    fn mass_is_required() {
        let cfg = AnalysisConfig::default();
        assert!(matches!(
            cfg.to_options(&[]),
            Err(CyclingError::InvalidActiveMass { .. })
        ));
    }

    #[test]
    fn variable_mode_needs_confirmation() {
        let current = [1.0, 1.0, 1.5, 1.5, -1.0];
        let mut cfg = AnalysisConfig {
            active_mass_mg: Some(1.0),
            current_mode: CurrentMode::Variable,
            ..Default::default()
        };
        assert!(matches!(
            cfg.to_options(&current),
            Err(CyclingError::InvalidThreshold { .. })
        ));

        cfg.accept_suggested_threshold = true;
        let opts = cfg.to_options(&current).unwrap();
        assert_eq!(opts.mode, SegmentMode::variable(Threshold::new(0.5).unwrap()));

        cfg.threshold = Some(0.2);
        let opts = cfg.to_options(&current).unwrap();
        assert_eq!(opts.mode, SegmentMode::variable(Threshold::new(0.2).unwrap()));

        cfg.threshold = Some(-1.0);
        assert!(cfg.to_options(&current).is_err());
    }
}
