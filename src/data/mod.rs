/// Data layer: raw table model, file loading and channel resolution.
///
/// Architecture:
/// ```text
///  .txt / .csv / .json / .parquet
///        │
///        ▼
///   ┌──────────┐
///   │  loader   │  parse file → RawTable
///   └──────────┘
///        │
///        ▼
///   ┌──────────┐
///   │ columns   │  header aliases → ChannelSeries (time, potential, current)
///   └──────────┘
/// ```

pub mod columns;
pub mod loader;
pub mod model;
