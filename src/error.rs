use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::data::model::{Channel, Polarity};

// ---------------------------------------------------------------------------
// Error taxonomy of the numeric core
// ---------------------------------------------------------------------------

/// Every validation failure the cycling core can report.
///
/// Variants carry enough context (which channel, which value) for a caller
/// to re-prompt the operator. None of them are downgraded to defaults.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CyclingError {
    #[error("no recognised column for channel(s): {}", ChannelList(.channels))]
    MissingChannel { channels: Vec<Channel> },

    #[error("invalid active mass '{value}': must be a positive, finite number")]
    InvalidActiveMass { value: String },

    #[error("invalid current threshold '{value}': must be a positive, finite number")]
    InvalidThreshold { value: String },

    #[error("insufficient cycles: found {charge} charge and {discharge} discharge half-cycles")]
    InsufficientCycles { charge: u32, discharge: u32 },

    #[error("export path {} is {len} characters long (limit {limit})", .path.display())]
    PathTooLong {
        path: PathBuf,
        len: usize,
        limit: usize,
    },

    #[error("input table has no data rows")]
    EmptyTable,

    #[error("{what}: expected {expected} values, found {found}")]
    LengthMismatch {
        what: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("non-numeric {channel} value at sample {index}")]
    NonNumericSample { channel: Channel, index: usize },

    #[error("{polarity} curve has no valid samples")]
    EmptyCurve { polarity: Polarity },

    #[error("'{name}' is not a cycle table column")]
    UnknownColumn { name: String },
}

struct ChannelList<'a>(&'a [Channel]);

impl fmt::Display for ChannelList<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, ch) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{ch}")?;
        }
        Ok(())
    }
}

pub type Result<T> = std::result::Result<T, CyclingError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_channel_lists_every_channel() {
        let err = CyclingError::MissingChannel {
            channels: vec![Channel::Potential, Channel::Current],
        };
        assert_eq!(
            err.to_string(),
            "no recognised column for channel(s): potential, current"
        );
    }

    #[test]
    fn insufficient_cycles_reports_counts() {
        let err = CyclingError::InsufficientCycles {
            charge: 0,
            discharge: 4,
        };
        assert!(err.to_string().contains("0 charge"));
        assert!(err.to_string().contains("4 discharge"));
    }
}
