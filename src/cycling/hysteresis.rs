use log::debug;

use super::table::{trim_padding, CycleTable, TableChannel};
use crate::data::model::Polarity;
use crate::error::{CyclingError, Result};

/// A (capacity, potential) curve of one half-cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct Curve {
    pub capacity: Vec<f64>,
    pub potential: Vec<f64>,
}

impl Curve {
    pub fn new(capacity: Vec<f64>, potential: Vec<f64>) -> Result<Self> {
        if capacity.len() != potential.len() {
            return Err(CyclingError::LengthMismatch {
                what: "curve potential",
                expected: capacity.len(),
                found: potential.len(),
            });
        }
        Ok(Curve {
            capacity,
            potential,
        })
    }

    /// Read one half-cycle out of a cycle table, without trailing padding.
    pub fn from_table(table: &CycleTable, polarity: Polarity, cycle: u32) -> Option<Self> {
        let capacity = table.get(TableChannel::Capacity, polarity, cycle)?;
        let potential = table.get(TableChannel::Potential, polarity, cycle)?;
        let n = trim_padding(capacity).len().max(trim_padding(potential).len());
        Some(Curve {
            capacity: capacity[..n].to_vec(),
            potential: potential[..n].to_vec(),
        })
    }

    /// Capacity at the last index that holds data.
    pub fn last_valid_capacity(&self) -> Option<f64> {
        self.capacity.iter().rev().copied().find(|c| !c.is_nan())
    }
}

/// The first half-cycle and the second one reflected onto its capacity axis.
#[derive(Debug, Clone, PartialEq)]
pub struct HysteresisLoop {
    pub first: Polarity,
    pub first_half: Curve,
    pub mirrored: Curve,
}

/// Mirror the second-occurring half so that it closes a loop with the first.
///
/// `mirrored = -capacity_second + capacity_first[last valid]`. Which half
/// came first cannot be read from the curves; the caller says so.
pub fn extract_hysteresis(
    charge: &Curve,
    discharge: &Curve,
    charge_first: bool,
) -> Result<HysteresisLoop> {
    let (first_polarity, first, second) = if charge_first {
        (Polarity::Charge, charge, discharge)
    } else {
        (Polarity::Discharge, discharge, charge)
    };

    let offset = first
        .last_valid_capacity()
        .ok_or(CyclingError::EmptyCurve {
            polarity: first_polarity,
        })?;
    debug!("Hysteresis: {first_polarity} first, end capacity {offset:.3} mAh/g");

    let mirrored = Curve {
        capacity: second.capacity.iter().map(|c| -c + offset).collect(),
        potential: second.potential.clone(),
    };

    Ok(HysteresisLoop {
        first: first_polarity,
        first_half: first.clone(),
        mirrored,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cycling::capacity::Cycle;
    use crate::cycling::table::build_cycle_table;

    #[test]
    fn equal_curves_mirror_to_reversed_axis() {
        let capacity: Vec<f64> = (0..6).map(|i| i as f64 * 1.5).collect();
        let charge = Curve::new(capacity.clone(), vec![3.0, 3.1, 3.2, 3.3, 3.4, 3.5]).unwrap();
        let discharge = Curve::new(capacity.clone(), vec![3.4, 3.3, 3.2, 3.1, 3.0, 2.9]).unwrap();

        let hyst = extract_hysteresis(&charge, &discharge, true).unwrap();
        let mut reversed = capacity.clone();
        reversed.reverse();
        assert_eq!(hyst.first, Polarity::Charge);
        assert_eq!(hyst.mirrored.capacity, reversed);
        assert_eq!(hyst.mirrored.potential, discharge.potential);
        assert_eq!(hyst.first_half, charge);
    }

    #[test]
    fn discharge_first_mirrors_the_charge() {
        let charge = Curve::new(vec![0.0, 1.0, 2.0], vec![3.0, 3.5, 4.0]).unwrap();
        let discharge = Curve::new(vec![0.0, 4.0, 8.0, f64::NAN], vec![4.0, 3.5, 3.0, f64::NAN])
            .unwrap();
        let hyst = extract_hysteresis(&charge, &discharge, false).unwrap();
        assert_eq!(hyst.first, Polarity::Discharge);
        // Offset is the discharge's last valid capacity (8), padding ignored.
        assert_eq!(hyst.mirrored.capacity, vec![8.0, 7.0, 6.0]);
    }

    #[test]
    fn empty_first_half_is_an_error() {
        let empty = Curve::new(vec![f64::NAN], vec![f64::NAN]).unwrap();
        let other = Curve::new(vec![1.0], vec![3.0]).unwrap();
        assert_eq!(
            extract_hysteresis(&empty, &other, true),
            Err(CyclingError::EmptyCurve {
                polarity: Polarity::Charge
            })
        );
    }

    #[test]
    fn curve_from_table_strips_padding() {
        let table = build_cycle_table(&[
            Cycle {
                number: 1,
                polarity: Polarity::Charge,
                time: vec![0.0, 1.0],
                potential: vec![3.0, 3.2],
                capacity: vec![0.0, 1.0],
            },
            Cycle {
                number: 1,
                polarity: Polarity::Discharge,
                time: vec![0.0, 1.0, 2.0, 3.0],
                potential: vec![3.2, 3.1, 3.0, 2.9],
                capacity: vec![0.0, 1.0, 2.0, 3.0],
            },
        ]);
        let c = Curve::from_table(&table, Polarity::Charge, 1).unwrap();
        assert_eq!(c.capacity, vec![0.0, 1.0]);
        assert!(Curve::from_table(&table, Polarity::Charge, 2).is_none());
    }
}
