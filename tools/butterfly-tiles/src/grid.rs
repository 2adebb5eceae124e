//! Square tile grid over the world bounding box.
//!
//! Tiles are numbered row by row from the south-west corner:
//! `index = x + y * side` with `x` counted along longitude and `y` along
//! latitude.

use butterfly_common::{Error, Result};
use butterfly_geometry::{BBox, Vec2};
use butterfly_io::GridHeader;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Grid {
    world: BBox,
    side: u64,
    lat_step: f64,
    lon_step: f64,
}

/// A run of whole tile rows written in one go.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Band {
    pub first_row: u64,
    pub rows: u64,
}

impl Grid {
    pub fn new(world: BBox, side: u64) -> Result<Self> {
        if side == 0 {
            return Err(Error::InvalidInput("tile grid side must be positive".into()));
        }
        if side.checked_mul(side).is_none() {
            return Err(Error::InvalidInput(format!(
                "a {side} x {side} tile grid does not fit a 64-bit tile index"
            )));
        }
        if !(world.max_lat > world.min_lat && world.max_lon > world.min_lon) {
            return Err(Error::DataError(format!("world bounding box {world:?} is empty")));
        }
        Ok(Self {
            world,
            side,
            lat_step: (world.max_lat - world.min_lat) / side as f64,
            lon_step: (world.max_lon - world.min_lon) / side as f64,
        })
    }

    pub fn side(&self) -> u64 {
        self.side
    }

    pub fn tile_count(&self) -> u64 {
        self.side * self.side
    }

    pub fn header(&self) -> GridHeader {
        GridHeader {
            lat_step: self.lat_step,
            lon_step: self.lon_step,
        }
    }

    /// Grid coordinates `(x, y)` of the tile holding `p`, clamped to the grid.
    pub fn cell(&self, p: Vec2) -> (u64, u64) {
        let step = |v: f64, min: f64, step: f64| {
            let steps = ((v - min) / step).floor();
            // `as` saturates: NaN and negatives become 0
            (steps.max(0.0) as u64).min(self.side - 1)
        };
        (
            step(p.x, self.world.min_lon, self.lon_step),
            step(p.y, self.world.min_lat, self.lat_step),
        )
    }

    pub fn index_of(&self, p: Vec2) -> u64 {
        let (x, y) = self.cell(p);
        x + y * self.side
    }

    pub fn tile_bbox(&self, index: u64) -> BBox {
        let row = (index / self.side) as f64;
        let col = (index % self.side) as f64;
        BBox::new(
            self.world.min_lat + row * self.lat_step,
            self.world.min_lat + (row + 1.0) * self.lat_step,
            self.world.min_lon + col * self.lon_step,
            self.world.min_lon + (col + 1.0) * self.lon_step,
        )
    }

    /// Split the grid into row bands of at most `max_tiles` tiles each.
    ///
    /// A band is `side >> k` rows for the smallest `k` that fits, and never
    /// less than one row. The last band takes whatever rows remain.
    pub fn bands(&self, max_tiles: u64) -> Vec<Band> {
        let mut rows = self.side;
        while rows > 1 && rows.checked_mul(self.side).map_or(true, |n| n > max_tiles) {
            rows >>= 1;
        }
        let mut bands = Vec::new();
        let mut first_row = 0;
        while first_row < self.side {
            let take = rows.min(self.side - first_row);
            bands.push(Band { first_row, rows: take });
            first_row += take;
        }
        bands
    }
}

impl Band {
    /// Global index of the band's first tile.
    pub fn first_tile(&self, side: u64) -> u64 {
        self.first_row * side
    }

    pub fn tiles(&self, side: u64) -> std::ops::Range<u64> {
        self.first_tile(side)..(self.first_row + self.rows) * side
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(side: u64) -> Grid {
        Grid::new(BBox::new(0.0, 8.0, 0.0, 8.0), side).unwrap()
    }

    #[test]
    fn cells_are_clamped() {
        let grid = unit(4);
        assert_eq!(grid.cell(Vec2::new(0.5, 0.5)), (0, 0));
        assert_eq!(grid.cell(Vec2::new(2.5, 6.5)), (1, 3));
        assert_eq!(grid.cell(Vec2::new(8.0, 8.0)), (3, 3));
        assert_eq!(grid.cell(Vec2::new(-3.0, 100.0)), (0, 3));
        assert_eq!(grid.cell(Vec2::new(f64::NAN, 1.0)), (0, 0));
        assert_eq!(grid.index_of(Vec2::new(2.5, 6.5)), 13);
    }

    #[test]
    fn every_point_lies_in_its_tile() {
        let grid = Grid::new(BBox::new(-90.0, 90.0, -180.0, 180.0), 7).unwrap();
        for i in 0..40 {
            let p = Vec2::new(-179.0 + i as f64 * 8.9, -89.0 + i as f64 * 4.4);
            let index = grid.index_of(p);
            assert!(index < grid.tile_count());
            assert!(grid.tile_bbox(index).contains(p), "{p:?} not in tile {index}");
        }
    }

    #[test]
    fn bands_split_large_grids() {
        let grid = unit(8);
        assert_eq!(grid.bands(64), vec![Band { first_row: 0, rows: 8 }]);

        let bands = grid.bands(20);
        assert_eq!(bands.len(), 4);
        assert!(bands.iter().all(|b| b.rows == 2));
        assert_eq!(bands[3].tiles(8), 48..64);

        // one row always fits
        assert_eq!(grid.bands(3).len(), 8);

        let odd = unit(5);
        let bands = odd.bands(12);
        assert_eq!(bands.iter().map(|b| b.rows).collect::<Vec<_>>(), vec![2, 2, 1]);
        assert_eq!(bands[2].first_tile(5), 20);
    }

    #[test]
    fn degenerate_grids_are_rejected() {
        let world = BBox::new(0.0, 1.0, 0.0, 1.0);
        assert!(Grid::new(world, 0).is_err());
        assert!(Grid::new(world, u64::MAX).is_err());
        assert!(Grid::new(BBox::new(1.0, 1.0, 0.0, 1.0), 2).unwrap_err().is_data_error());
    }
}
