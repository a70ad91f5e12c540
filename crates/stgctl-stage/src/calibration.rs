//! Limit switch calibration
//!
//! Turns a [`LimitSwitchSample`] into the step size and inward offset of a
//! raster. Each axis was traversed twice, giving two long deltas and two
//! short ones; the controller sometimes reports a few indices of drift at a
//! limit switch, so deltas at or below the axis mean are dropped before
//! averaging.

use crate::limit_switch::LimitSwitchSample;
use stgctl_core::{Axis, CalibrationError, Result, Size};

/// Fraction of travel given up to stay clear of the limit switches
pub const SAFETY_MARGIN: f64 = 2.0 / 30.0;

/// Fraction of travel the raster starts inward of the origin
pub const INWARD_OFFSET: f64 = 1.0 / 30.0;

/// Raster parameters derived from a limit switch sample
#[derive(Debug, Clone, PartialEq)]
pub struct Calibration {
    /// Measured travel between limit switches, per axis
    pub travel: [f64; 2],
    /// Travel left after the safety margin, per axis
    pub usable: [f64; 2],
    /// Distance between raster points
    pub step_size: Size,
    /// Inward shift applied before negating the trajectory
    pub offset: Size,
}

/// Mean of the deltas strictly above the mean of their absolute values
pub fn filtered_travel(deltas: &[f64]) -> Option<f64> {
    if deltas.is_empty() {
        return None;
    }
    let mean = deltas.iter().map(|d| d.abs()).sum::<f64>() / deltas.len() as f64;
    let kept: Vec<f64> = deltas.iter().copied().filter(|d| *d > mean).collect();
    if kept.is_empty() {
        None
    } else {
        Some(kept.iter().sum::<f64>() / kept.len() as f64)
    }
}

fn axis_deltas(sample: &LimitSwitchSample, axis: Axis) -> Vec<f64> {
    sample
        .positions()
        .windows(2)
        .filter_map(|pair| Some((pair[1].get(axis)? - pair[0].get(axis)?).abs() as f64))
        .collect()
}

/// Derive step size and offset for `grid_size` from a complete sample
pub fn calibrate(sample: &LimitSwitchSample, grid_size: Size) -> Result<Calibration> {
    sample.ensure_complete()?;
    if grid_size.x <= 0 || grid_size.y <= 0 {
        return Err(CalibrationError::InvalidGridSize {
            grid_size: grid_size.to_string(),
        }
        .into());
    }

    let mut travel = [0.0; 2];
    for (i, axis) in [Axis::X, Axis::Y].into_iter().enumerate() {
        travel[i] = filtered_travel(&axis_deltas(sample, axis)).ok_or_else(|| {
            CalibrationError::NoUsableTravel {
                axis: axis.to_string(),
            }
        })?;
    }
    tracing::debug!("Number of indexes in (x, y): ({}, {})", travel[0], travel[1]);

    let usable = travel.map(|t| t - t * SAFETY_MARGIN);
    let step_size = Size::from_f64(
        usable[0] / grid_size.x as f64,
        usable[1] / grid_size.y as f64,
    );
    let offset = Size::new(
        (travel[0] * INWARD_OFFSET).trunc() as i64,
        (travel[1] * INWARD_OFFSET).trunc() as i64,
    );

    Ok(Calibration {
        travel,
        usable,
        step_size,
        offset,
    })
}
