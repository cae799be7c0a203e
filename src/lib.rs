//! Galvanostatic cycling analysis.
//!
//! Raw (time, potential, current) samples from a battery cycler are split
//! into numbered charge/discharge half-cycles, converted to gravimetric
//! capacity and reduced to per-cycle maxima, coulombic efficiency and
//! hysteresis loops.
//!
//! ```text
//!  file ─► data::loader ─► RawTable ─► data::columns ─► ChannelSeries
//!                                                           │
//!                                         pipeline::analyze ▼
//!          export ◄─ CyclingReport ◄─ cycling::{segment, capacity, table,
//!                                               summary, hysteresis}
//! ```

pub mod config;
pub mod cycling;
pub mod data;
pub mod error;
pub mod export;
pub mod pipeline;

pub use error::{CyclingError, Result};
pub use pipeline::{analyze, analyze_series, AnalysisOptions, CyclingReport};
