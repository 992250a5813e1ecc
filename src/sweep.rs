//! Raster grid of mount positions
//!
//! Burst sweeps walk tilt in the outer loop and swivel in the inner loop. The incremental
//! cursor advances tilt first and carries into swivel, wrapping back to the first cell once
//! both axes are exhausted.

use std::iter::FusedIterator;

use crate::{ScanPosition, config::AxisConfig};

/// inclusive angle range of one axis walked in fixed steps
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AxisRange {
    min: i32,
    max: i32,
    step: i32,
}

impl AxisRange {
    /// create a range, a non-positive step is treated as 1 and an inverted range as a single angle
    pub fn new(min: i32, max: i32, step: i32) -> Self {
        AxisRange {
            min,
            max: max.max(min),
            step: step.max(1),
        }
    }

    /// number of positions, `ceil((max - min) / step) + 1`
    pub fn count(&self) -> usize {
        // span >= 0 and step >= 1 after `new`
        let span = (i64::from(self.max) - i64::from(self.min)) as u64;
        span.div_ceil(self.step as u64) as usize + 1
    }

    /// angle at `index`, the last position is pinned to `max` when the step does not divide the span
    pub fn value_at(&self, index: usize) -> i32 {
        let offset = i64::from(self.step) * index as i64;
        (i64::from(self.min) + offset).min(i64::from(self.max)) as i32
    }

    /// lazy iterator over all angles of the range
    pub fn positions(&self) -> impl Iterator<Item = i32> + '_ {
        (0..self.count()).map(|index| self.value_at(index))
    }

    pub fn min(&self) -> i32 {
        self.min
    }

    pub fn max(&self) -> i32 {
        self.max
    }
}

impl From<&AxisConfig> for AxisRange {
    fn from(config: &AxisConfig) -> Self {
        AxisRange::new(config.min, config.max, config.step)
    }
}

/// two dimensional grid of positions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepGrid {
    tilt: AxisRange,
    swivel: AxisRange,
}

impl SweepGrid {
    pub fn new(tilt: AxisRange, swivel: AxisRange) -> Self {
        SweepGrid { tilt, swivel }
    }

    /// total number of positions in the grid
    pub fn len(&self) -> usize {
        self.tilt.count() * self.swivel.count()
    }

    /// a grid always holds at least one position
    pub fn is_empty(&self) -> bool {
        false
    }

    /// restartable raster iterator, every call starts again at the first position
    pub fn positions(&self) -> GridPositions {
        GridPositions {
            grid: *self,
            index: 0,
        }
    }

    pub fn tilt(&self) -> AxisRange {
        self.tilt
    }

    pub fn swivel(&self) -> AxisRange {
        self.swivel
    }

    /// position of the raster cell `(tilt_index, swivel_index)`
    fn at(&self, tilt_index: usize, swivel_index: usize) -> ScanPosition {
        ScanPosition::new(
            self.tilt.value_at(tilt_index),
            self.swivel.value_at(swivel_index),
        )
    }
}

/// iterator returned by [`SweepGrid::positions`]
#[derive(Debug, Clone)]
pub struct GridPositions {
    grid: SweepGrid,
    index: usize,
}

impl Iterator for GridPositions {
    type Item = ScanPosition;

    fn next(&mut self) -> Option<Self::Item> {
        if self.index >= self.grid.len() {
            return None;
        }
        let swivel_count = self.grid.swivel.count();
        let position = self
            .grid
            .at(self.index / swivel_count, self.index % swivel_count);
        self.index += 1;
        Some(position)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.grid.len().saturating_sub(self.index);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for GridPositions {}

impl FusedIterator for GridPositions {}

/// position tracker for incremental sweeps
#[derive(Debug, Clone)]
pub struct IncrementalCursor {
    grid: SweepGrid,
    tilt_index: usize,
    swivel_index: usize,
}

impl IncrementalCursor {
    /// start at `(tilt min, swivel min)`
    pub fn new(grid: SweepGrid) -> Self {
        IncrementalCursor {
            grid,
            tilt_index: 0,
            swivel_index: 0,
        }
    }

    pub fn current(&self) -> ScanPosition {
        self.grid.at(self.tilt_index, self.swivel_index)
    }

    /// move one cell and return the new position
    pub fn advance(&mut self) -> ScanPosition {
        self.tilt_index += 1;
        if self.tilt_index >= self.grid.tilt.count() {
            self.tilt_index = 0;
            self.swivel_index += 1;
            if self.swivel_index >= self.grid.swivel.count() {
                self.swivel_index = 0;
            }
        }
        self.current()
    }

    pub fn reset(&mut self) {
        self.tilt_index = 0;
        self.swivel_index = 0;
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use anyhow::Result;

    use super::*;
    use crate::config::ScannerConfig;

    fn grid(tilt: (i32, i32, i32), swivel: (i32, i32, i32)) -> SweepGrid {
        SweepGrid::new(
            AxisRange::new(tilt.0, tilt.1, tilt.2),
            AxisRange::new(swivel.0, swivel.1, swivel.2),
        )
    }

    #[test]
    fn test_axis_count() {
        assert_eq!(AxisRange::new(0, 180, 45).count(), 5);
        assert_eq!(AxisRange::new(30, 150, 30).count(), 5);
        // ceil(10 / 4) + 1
        assert_eq!(AxisRange::new(0, 10, 4).count(), 4);
        assert_eq!(AxisRange::new(90, 90, 10).count(), 1);
        assert_eq!(AxisRange::new(0, 5, 10).count(), 2);
    }

    #[test]
    fn test_axis_count_huge_step() {
        let range = AxisRange::new(0, 180, i32::MAX);
        assert_eq!(range.count(), 2);
        assert_eq!(range.positions().collect::<Vec<_>>(), vec![0, 180]);
        assert_eq!(AxisRange::new(90, 90, i32::MAX).count(), 1);
    }

    #[test]
    fn test_huge_configured_step_sweeps_endpoints() -> Result<()> {
        let mut config = ScannerConfig::default();
        config.tilt.step = i32::MAX;
        config.validate()?;
        let grid = SweepGrid::new(
            AxisRange::from(&config.tilt),
            AxisRange::from(&config.swivel),
        );
        assert_eq!(grid.tilt().positions().collect::<Vec<_>>(), vec![30, 150]);
        assert_eq!(grid.len(), 2 * grid.swivel().count());
        Ok(())
    }

    #[test]
    fn test_axis_last_position_pinned_to_max() {
        let range = AxisRange::new(0, 10, 4);
        assert_eq!(range.positions().collect::<Vec<_>>(), vec![0, 4, 8, 10]);
    }

    #[test]
    fn test_raster_order() {
        let positions: Vec<ScanPosition> = grid((0, 20, 10), (100, 120, 20)).positions().collect();
        let expected: Vec<ScanPosition> = [
            (0, 100),
            (0, 120),
            (10, 100),
            (10, 120),
            (20, 100),
            (20, 120),
        ]
        .iter()
        .map(|&(t, s)| ScanPosition::new(t, s))
        .collect();
        assert_eq!(positions, expected);
    }

    #[test]
    fn test_grid_count_bounds_and_uniqueness() {
        for (tilt, swivel) in [
            ((30, 150, 30), (0, 180, 45)),
            ((0, 10, 4), (5, 17, 5)),
            ((45, 45, 1), (0, 180, 7)),
        ] {
            let grid = grid(tilt, swivel);
            let expected = grid.tilt().count() * grid.swivel().count();
            let positions: Vec<ScanPosition> = grid.positions().collect();
            assert_eq!(positions.len(), expected);
            assert_eq!(grid.len(), expected);
            assert_eq!(grid.positions().len(), expected);
            let unique: HashSet<ScanPosition> = positions.iter().copied().collect();
            assert_eq!(unique.len(), expected);
            for pair in positions.windows(2) {
                let (a, b) = (pair[0], pair[1]);
                assert!(a.tilt < b.tilt || (a.tilt == b.tilt && a.swivel < b.swivel));
            }
            for position in positions {
                assert!(position.tilt >= tilt.0 && position.tilt <= tilt.1);
                assert!(position.swivel >= swivel.0 && position.swivel <= swivel.1);
            }
        }
    }

    #[test]
    fn test_positions_restart() {
        let grid = grid((0, 20, 10), (0, 20, 10));
        let first: Vec<ScanPosition> = grid.positions().take(4).collect();
        let second: Vec<ScanPosition> = grid.positions().take(4).collect();
        assert_eq!(first, second);
        let mut iter = grid.positions();
        assert_eq!(iter.by_ref().count(), 9);
        assert_eq!(iter.next(), None);
    }

    #[test]
    fn test_incremental_order() {
        let mut cursor = IncrementalCursor::new(grid((0, 20, 10), (0, 10, 10)));
        assert_eq!(cursor.current(), ScanPosition::new(0, 0));
        let visited: Vec<ScanPosition> = (0..6).map(|_| cursor.advance()).collect();
        assert_eq!(
            visited,
            vec![
                ScanPosition::new(10, 0),
                ScanPosition::new(20, 0),
                ScanPosition::new(0, 10),
                ScanPosition::new(10, 10),
                ScanPosition::new(20, 10),
                ScanPosition::new(0, 0),
            ]
        );
    }

    #[test]
    fn test_incremental_wraps_once() {
        let grid = grid((30, 150, 30), (0, 180, 45));
        let mut cursor = IncrementalCursor::new(grid);
        let mut seen = HashSet::new();
        seen.insert(cursor.current());
        for _ in 1..grid.len() {
            assert!(seen.insert(cursor.advance()), "position repeated before wrap");
        }
        assert_eq!(seen.len(), grid.len());
        assert_eq!(cursor.current(), ScanPosition::new(150, 180));
        assert_eq!(cursor.advance(), ScanPosition::new(30, 0));

        // the second lap visits every cell exactly once again
        let mut lap = HashSet::new();
        lap.insert(cursor.current());
        for _ in 1..grid.len() {
            assert!(lap.insert(cursor.advance()));
        }
        assert_eq!(lap, seen);
        assert_eq!(cursor.current(), ScanPosition::new(150, 180));

        cursor.reset();
        assert_eq!(cursor.current(), ScanPosition::new(30, 0));
    }
}
