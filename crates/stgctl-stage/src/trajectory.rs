//! Raster trajectory generation
//!
//! A trajectory is the ordered list of absolute index coordinates a raster
//! visits. Rows run along X; every odd row is reversed so consecutive rows
//! join end to end.

use stgctl_core::Size;

/// Ordered raster coordinates
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Trajectory {
    points: Vec<Size>,
}

impl Trajectory {
    /// Back-and-forth raster of `grid_size` points spaced by `step_size`, starting at zero
    ///
    /// A grid with a non-positive component yields an empty trajectory.
    pub fn generate(grid_size: Size, step_size: Size) -> Self {
        if grid_size.x <= 0 || grid_size.y <= 0 {
            return Self::default();
        }
        let mut points = Vec::with_capacity(grid_size.area());
        for row in 0..grid_size.y {
            let y = row * step_size.y;
            let columns: Box<dyn Iterator<Item = i64>> = if row % 2 == 0 {
                Box::new(0..grid_size.x)
            } else {
                Box::new((0..grid_size.x).rev())
            };
            points.extend(columns.map(|col| Size::new(col * step_size.x, y)));
        }
        Self { points }
    }

    /// Shift every point inward by `offset` and negate it
    ///
    /// The stage origin sits at the positive limit switches, so every
    /// reachable point has negative indices.
    pub fn to_stage(&self, offset: Size) -> Self {
        Self {
            points: self.points.iter().map(|p| -(*p + offset)).collect(),
        }
    }

    /// Points in visiting order
    pub fn points(&self) -> &[Size] {
        &self.points
    }

    /// Iterate points in visiting order
    pub fn iter(&self) -> std::slice::Iter<'_, Size> {
        self.points.iter()
    }

    /// Number of points
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether there are no points
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

impl<'a> IntoIterator for &'a Trajectory {
    type Item = &'a Size;
    type IntoIter = std::slice::Iter<'a, Size>;

    fn into_iter(self) -> Self::IntoIter {
        self.points.iter()
    }
}

/// Back-and-forth raster of `grid_size` points spaced by `step_size`
pub fn generate(grid_size: Size, step_size: Size) -> Trajectory {
    Trajectory::generate(grid_size, step_size)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_two_by_two() {
        let trajectory = generate(Size::new(2, 2), Size::new(10, 10));
        assert_eq!(
            trajectory.points(),
            &[
                Size::new(0, 0),
                Size::new(10, 0),
                Size::new(10, 10),
                Size::new(0, 10)
            ]
        );
    }

    #[test]
    fn test_rows_alternate_direction() {
        let trajectory = generate(Size::new(3, 3), Size::new(5, 7));
        let xs: Vec<i64> = trajectory.iter().map(|p| p.x).collect();
        assert_eq!(xs, vec![0, 5, 10, 10, 5, 0, 0, 5, 10]);
        let ys: Vec<i64> = trajectory.iter().map(|p| p.y).collect();
        assert_eq!(ys, vec![0, 0, 0, 7, 7, 7, 14, 14, 14]);
    }

    #[test]
    fn test_consecutive_points_are_one_step_apart() {
        let step = Size::new(186, 186);
        let trajectory = generate(Size::new(6, 5), step);
        assert_eq!(trajectory.len(), 30);
        for pair in trajectory.points().windows(2) {
            let d = pair[1] - pair[0];
            assert_eq!(d.x.abs() + d.y.abs(), 186);
        }
    }

    #[test]
    fn test_regeneration_is_identical() {
        let a = generate(Size::new(4, 3), Size::new(2, 9));
        let b = generate(Size::new(4, 3), Size::new(2, 9));
        assert_eq!(a, b);
    }

    #[test]
    fn test_empty_grid() {
        assert!(generate(Size::new(0, 5), Size::new(1, 1)).is_empty());
        assert!(generate(Size::new(3, -1), Size::new(1, 1)).is_empty());
    }

    #[test]
    fn test_to_stage_offsets_and_negates() {
        let stage = generate(Size::new(2, 1), Size::new(100, 100)).to_stage(Size::new(398, 399));
        assert_eq!(stage.points(), &[Size::new(-398, -399), Size::new(-498, -399)]);
    }
}
