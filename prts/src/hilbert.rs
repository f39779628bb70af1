// Copyright (C) 2024 Ethan Uppal and Utku Melemetci. All rights reserved.

//! Bijection between a Hilbert distance and the cell it names.
//!
//! Every component that touches program memory (assembler, disassembler, VM)
//! goes through [`HilbertCurve`], so a program always lays out the same way.

use thiserror::Error;

use crate::arch::{Distance, Side, MAX_SIDE};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum HilbertError {
    #[error("grid side {0} is not a power of two in 1..={max}", max = MAX_SIDE)]
    SideNotPowerOfTwo(Side),
    #[error("distance {distance} is outside a curve of {area} cells")]
    DistanceOutOfRange { distance: Distance, area: u64 },
    #[error("cell ({x}, {y}) is outside a {side}x{side} grid")]
    CoordinateOutOfRange { x: u32, y: u32, side: Side },
}

/// A Hilbert curve filling a square grid whose side is a power of two.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HilbertCurve {
    side: Side,
}

impl HilbertCurve {
    pub fn new(side: Side) -> Result<Self, HilbertError> {
        if side == 0 || side > MAX_SIDE || !side.is_power_of_two() {
            return Err(HilbertError::SideNotPowerOfTwo(side));
        }
        Ok(Self { side })
    }

    pub fn side(&self) -> Side {
        self.side
    }

    /// Number of cells on the curve, `side * side`.
    pub fn area(&self) -> u64 {
        (self.side as u64) * (self.side as u64)
    }

    /// Converts a distance along the curve into `(x, y)`.
    pub fn d2xy(&self, d: Distance) -> Result<(u32, u32), HilbertError> {
        if d as u64 >= self.area() {
            return Err(HilbertError::DistanceOutOfRange {
                distance: d,
                area: self.area(),
            });
        }

        let (mut x, mut y) = (0, 0);
        let mut t = d;
        let mut s = 1;
        while s < self.side {
            let rx = 1 & (t / 2);
            let ry = 1 & (t ^ rx);
            rotate(s, &mut x, &mut y, rx, ry);
            x += s * rx;
            y += s * ry;
            t /= 4;
            s *= 2;
        }
        Ok((x, y))
    }

    /// Converts `(x, y)` into its distance along the curve.
    pub fn xy2d(&self, x: u32, y: u32) -> Result<Distance, HilbertError> {
        if x >= self.side || y >= self.side {
            return Err(HilbertError::CoordinateOutOfRange {
                x,
                y,
                side: self.side,
            });
        }

        let (mut x, mut y) = (x, y);
        let mut d = 0;
        let mut s = self.side / 2;
        while s > 0 {
            let rx = u32::from((x & s) > 0);
            let ry = u32::from((y & s) > 0);
            d += s * s * ((3 * rx) ^ ry);
            rotate(self.side, &mut x, &mut y, rx, ry);
            s /= 2;
        }
        Ok(d)
    }

    /// Cells in curve order, starting from distance zero.
    pub fn iter(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        (0..self.area()).filter_map(move |d| self.d2xy(d as Distance).ok())
    }
}

/// Rotates and reflects a quadrant so the sub-curve lines up with its parent.
fn rotate(n: u32, x: &mut u32, y: &mut u32, rx: u32, ry: u32) {
    if ry == 0 {
        if rx == 1 {
            *x = n - 1 - *x;
            *y = n - 1 - *y;
        }
        std::mem::swap(x, y);
    }
}

/// Smallest power-of-two side whose grid holds `count` cells. An empty
/// program still gets a 1x1 grid.
pub fn grid_side_for(count: usize) -> Side {
    let mut side: Side = 1;
    while (side as u64) * (side as u64) < count as u64 {
        side *= 2;
    }
    side
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn first_order_four_cells() {
        let curve = HilbertCurve::new(4).unwrap();
        assert_eq!(Ok((0, 0)), curve.d2xy(0));
        assert_eq!(Ok((1, 0)), curve.d2xy(1));
        assert_eq!(Ok((1, 1)), curve.d2xy(2));
        assert_eq!(Ok((0, 1)), curve.d2xy(3));
    }

    #[test]
    fn two_by_two_is_a_u() {
        let curve = HilbertCurve::new(2).unwrap();
        let cells: Vec<_> = curve.iter().collect();
        assert_eq!(vec![(0, 0), (0, 1), (1, 1), (1, 0)], cells);
    }

    #[test]
    fn ends_in_the_opposite_bottom_corner() {
        let curve = HilbertCurve::new(8).unwrap();
        assert_eq!(Ok((7, 0)), curve.d2xy(63));
        assert_eq!(Ok(63), curve.xy2d(7, 0));
    }

    #[test]
    fn consecutive_cells_are_adjacent() {
        let curve = HilbertCurve::new(16).unwrap();
        let cells: Vec<_> = curve.iter().collect();
        for pair in cells.windows(2) {
            let (x0, y0) = pair[0];
            let (x1, y1) = pair[1];
            assert_eq!(1, x0.abs_diff(x1) + y0.abs_diff(y1));
        }
    }

    #[test]
    fn rejects_bad_sides() {
        assert_eq!(Err(HilbertError::SideNotPowerOfTwo(0)), HilbertCurve::new(0));
        assert_eq!(Err(HilbertError::SideNotPowerOfTwo(6)), HilbertCurve::new(6));
        assert!(HilbertCurve::new(MAX_SIDE * 2).is_err());
        assert!(HilbertCurve::new(1).is_ok());
    }

    #[test]
    fn fails_fast_outside_the_grid() {
        let curve = HilbertCurve::new(4).unwrap();
        assert_eq!(
            Err(HilbertError::DistanceOutOfRange {
                distance: 16,
                area: 16
            }),
            curve.d2xy(16)
        );
        assert_eq!(
            Err(HilbertError::CoordinateOutOfRange { x: 4, y: 0, side: 4 }),
            curve.xy2d(4, 0)
        );
    }

    #[test]
    fn sizes_grids_by_instruction_count() {
        assert_eq!(1, grid_side_for(0));
        assert_eq!(1, grid_side_for(1));
        assert_eq!(2, grid_side_for(2));
        assert_eq!(2, grid_side_for(4));
        assert_eq!(4, grid_side_for(5));
        assert_eq!(4, grid_side_for(8));
        assert_eq!(4, grid_side_for(16));
        assert_eq!(8, grid_side_for(17));
    }

    proptest! {
        #[test]
        fn prop_distance_round_trips(order in 0u32..8, seed in any::<u32>()) {
            let side = 1u32 << order;
            let curve = HilbertCurve::new(side).unwrap();
            let d = seed % (side * side);
            let (x, y) = curve.d2xy(d).unwrap();
            prop_assert!(x < side && y < side);
            prop_assert_eq!(d, curve.xy2d(x, y).unwrap());
        }

        #[test]
        fn prop_every_cell_is_visited_once(order in 0u32..6) {
            let curve = HilbertCurve::new(1 << order).unwrap();
            let mut cells: Vec<_> = curve.iter().collect();
            let area = cells.len() as u64;
            cells.sort_unstable();
            cells.dedup();
            prop_assert_eq!(area, curve.area());
            prop_assert_eq!(cells.len() as u64, curve.area());
        }
    }
}
