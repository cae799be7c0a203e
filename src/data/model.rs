use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{CyclingError, Result};

// ---------------------------------------------------------------------------
// Channel - the three semantic columns the pipeline needs
// ---------------------------------------------------------------------------

/// A semantic measurement channel, independent of the instrument's header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Time,
    Potential,
    Current,
}

impl Channel {
    pub const ALL: [Channel; 3] = [Channel::Time, Channel::Potential, Channel::Current];
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::Time => write!(f, "time"),
            Channel::Potential => write!(f, "potential"),
            Channel::Current => write!(f, "current"),
        }
    }
}

// ---------------------------------------------------------------------------
// Polarity - direction of the applied current
// ---------------------------------------------------------------------------

/// Half-cycle direction. Charge sorts before discharge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Polarity {
    Charge,
    Discharge,
}

impl Polarity {
    pub const BOTH: [Polarity; 2] = [Polarity::Charge, Polarity::Discharge];

    /// Single letter used in cycle table column names.
    pub fn letter(self) -> char {
        match self {
            Polarity::Charge => 'C',
            Polarity::Discharge => 'D',
        }
    }

    pub fn from_letter(c: char) -> Option<Self> {
        match c {
            'C' => Some(Polarity::Charge),
            'D' => Some(Polarity::Discharge),
            _ => None,
        }
    }

    /// Factor that turns a signed capacity into a non-negative magnitude.
    pub fn sign(self) -> f64 {
        match self {
            Polarity::Charge => 1.0,
            Polarity::Discharge => -1.0,
        }
    }

    pub fn opposite(self) -> Self {
        match self {
            Polarity::Charge => Polarity::Discharge,
            Polarity::Discharge => Polarity::Charge,
        }
    }
}

impl fmt::Display for Polarity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Polarity::Charge => write!(f, "charge"),
            Polarity::Discharge => write!(f, "discharge"),
        }
    }
}

/// Per-sample classification produced by the segmenter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PolarityLabel {
    Charge,
    Discharge,
    Neither,
}

impl From<Polarity> for PolarityLabel {
    fn from(p: Polarity) -> Self {
        match p {
            Polarity::Charge => PolarityLabel::Charge,
            Polarity::Discharge => PolarityLabel::Discharge,
        }
    }
}

// ---------------------------------------------------------------------------
// RawTable - numeric columns as loaded from an instrument export
// ---------------------------------------------------------------------------

/// A rectangular table of named numeric columns in sampling order.
///
/// Cells that could not be parsed as numbers are stored as NaN.
#[derive(Debug, Clone, PartialEq)]
pub struct RawTable {
    headers: Vec<String>,
    columns: Vec<Vec<f64>>,
}

impl RawTable {
    /// Build a table, checking that it is non-empty and rectangular.
    pub fn from_columns(headers: Vec<String>, columns: Vec<Vec<f64>>) -> Result<Self> {
        if headers.len() != columns.len() {
            return Err(CyclingError::LengthMismatch {
                what: "column headers",
                expected: columns.len(),
                found: headers.len(),
            });
        }
        let n_rows = columns.first().map(Vec::len).unwrap_or(0);
        if n_rows == 0 {
            return Err(CyclingError::EmptyTable);
        }
        if let Some(col) = columns.iter().find(|c| c.len() != n_rows) {
            return Err(CyclingError::LengthMismatch {
                what: "table column",
                expected: n_rows,
                found: col.len(),
            });
        }
        Ok(RawTable { headers, columns })
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// Look up a column by exact header.
    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.headers
            .iter()
            .position(|h| h == name)
            .map(|i| self.columns[i].as_slice())
    }

    pub fn n_rows(&self) -> usize {
        self.columns.first().map(Vec::len).unwrap_or(0)
    }

    pub fn n_columns(&self) -> usize {
        self.columns.len()
    }
}

// ---------------------------------------------------------------------------
// ChannelSeries - resolved (time, potential, current) samples
// ---------------------------------------------------------------------------

/// Time in seconds, potential in volts, current in milliamps; one entry per
/// sampling index.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelSeries {
    pub time: Vec<f64>,
    pub potential: Vec<f64>,
    pub current: Vec<f64>,
}

impl ChannelSeries {
    /// Every sample of every channel must be a finite number; a gap in the
    /// current would otherwise split a plateau into two half-cycles.
    pub fn new(time: Vec<f64>, potential: Vec<f64>, current: Vec<f64>) -> Result<Self> {
        if time.is_empty() {
            return Err(CyclingError::EmptyTable);
        }
        for (what, len) in [
            ("potential series", potential.len()),
            ("current series", current.len()),
        ] {
            if len != time.len() {
                return Err(CyclingError::LengthMismatch {
                    what,
                    expected: time.len(),
                    found: len,
                });
            }
        }
        for (channel, values) in [
            (Channel::Time, &time),
            (Channel::Potential, &potential),
            (Channel::Current, &current),
        ] {
            if let Some(index) = values.iter().position(|v| !v.is_finite()) {
                return Err(CyclingError::NonNumericSample { channel, index });
            }
        }
        Ok(ChannelSeries {
            time,
            potential,
            current,
        })
    }

    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Validated scalars supplied by the operator
// ---------------------------------------------------------------------------

/// Active electrode mass in grams. Always strictly positive and finite.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct ActiveMass(f64);

impl ActiveMass {
    pub fn new(grams: f64) -> Result<Self> {
        if grams.is_finite() && grams > 0.0 {
            Ok(ActiveMass(grams))
        } else {
            Err(CyclingError::InvalidActiveMass {
                value: grams.to_string(),
            })
        }
    }

    pub fn from_milligrams(mg: f64) -> Result<Self> {
        Self::new(mg / 1000.0).map_err(|_| CyclingError::InvalidActiveMass {
            value: format!("{mg} mg"),
        })
    }

    /// Parse operator text input in milligrams.
    pub fn parse_milligrams(text: &str) -> Result<Self> {
        let mg = text
            .trim()
            .parse::<f64>()
            .map_err(|_| CyclingError::InvalidActiveMass {
                value: text.to_string(),
            })?;
        Self::from_milligrams(mg)
    }

    pub fn grams(self) -> f64 {
        self.0
    }

    pub fn milligrams(self) -> f64 {
        self.0 * 1000.0
    }
}

/// Operator-confirmed current-derivative threshold (mA per sample).
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Threshold(f64);

impl Threshold {
    pub fn new(value: f64) -> Result<Self> {
        if value.is_finite() && value > 0.0 {
            Ok(Threshold(value))
        } else {
            Err(CyclingError::InvalidThreshold {
                value: value.to_string(),
            })
        }
    }

    pub fn parse(text: &str) -> Result<Self> {
        let v = text
            .trim()
            .parse::<f64>()
            .map_err(|_| CyclingError::InvalidThreshold {
                value: text.to_string(),
            })?;
        Self::new(v)
    }

    pub fn value(self) -> f64 {
        self.0
    }
}
