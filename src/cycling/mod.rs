/// Numeric core: segmentation, capacity, cycle table and derived metrics.
///
/// ```text
///   current ──► segment ──► Segmentation ──► capacity ──► Vec<Cycle>
///                                                            │
///                                                            ▼
///                        summary ◄── CycleTable ◄──────── table
///                     hysteresis ◄──┘
/// ```

pub mod capacity;
pub mod hysteresis;
pub mod segment;
pub mod summary;
pub mod table;
