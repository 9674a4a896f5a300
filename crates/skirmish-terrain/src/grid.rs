//! MapGrid: the sector rasterised into cells with passability and reachability queries.

use std::collections::VecDeque;

use skirmish_core::types::{polygon_contains, Bounds, LatLng, Sector};

use crate::projection::GeoProjection;

/// Grid header metadata.
#[derive(Debug, Clone)]
pub struct GridHeader {
    /// Geographic extent covered by the grid.
    pub bounds: Bounds,
    /// Number of columns (west to east).
    pub width: u32,
    /// Number of rows (north to south).
    pub height: u32,
}

impl GridHeader {
    /// Degrees of latitude per row.
    pub fn cell_lat_deg(&self) -> f64 {
        (self.bounds.north_east.lat - self.bounds.south_west.lat) / self.height as f64
    }

    /// Degrees of longitude per column.
    pub fn cell_lng_deg(&self) -> f64 {
        (self.bounds.north_east.lng - self.bounds.south_west.lng) / self.width as f64
    }
}

/// Integer grid coordinates. Row 0 is the north edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Cell {
    pub row: u32,
    pub col: u32,
}

/// Sector grid with a packed obstacle mask.
#[derive(Debug, Clone)]
pub struct MapGrid {
    pub header: GridHeader,
    /// Packed obstacle mask: bit 1 = blocked, bit 0 = passable. One bit per cell.
    blocked: Vec<u8>,
    /// Projection for converting lat/lng to meters.
    projection: GeoProjection,
    /// Sector polygon; empty for a plain rectangular grid.
    outline: Vec<LatLng>,
}

impl MapGrid {
    /// Create a fully passable grid.
    pub fn new(header: GridHeader) -> Self {
        let cells = header.width as usize * header.height as usize;
        let projection = GeoProjection::new(header.bounds.center());
        Self {
            header,
            blocked: vec![0; cells.div_ceil(8)],
            projection,
            outline: Vec::new(),
        }
    }

    /// Rasterise a confirmed sector at the given resolution. Cells whose
    /// center falls outside the sector polygon are blocked.
    pub fn from_sector(sector: &Sector, width: u32, height: u32) -> Self {
        let mut grid = Self::new(GridHeader {
            bounds: sector.bounds,
            width: width.max(1),
            height: height.max(1),
        });
        grid.outline = sector.coordinates.clone();
        for row in 0..grid.header.height {
            for col in 0..grid.header.width {
                let cell = Cell { row, col };
                if !grid.covers(&grid.center_of(cell)) {
                    grid.set_blocked(cell, true);
                }
            }
        }
        grid
    }

    /// Reference to the projection used by this grid.
    pub fn projection(&self) -> &GeoProjection {
        &self.projection
    }

    /// Convert lat/lng to grid row/col (fractional).
    /// Returns None if outside grid bounds.
    fn geo_to_grid(&self, p: &LatLng) -> Option<(f64, f64)> {
        let h = &self.header;
        let col = (p.lng - h.bounds.south_west.lng) / h.cell_lng_deg();
        let row = (h.bounds.north_east.lat - p.lat) / h.cell_lat_deg();

        if !col.is_finite() || !row.is_finite() {
            return None;
        }
        if col < 0.0 || row < 0.0 || col > h.width as f64 || row > h.height as f64 {
            return None;
        }

        Some((row, col))
    }

    /// Cell containing a point. Points on the east/south edge belong to the last cell.
    pub fn cell_of(&self, p: &LatLng) -> Option<Cell> {
        let (row, col) = self.geo_to_grid(p)?;
        Some(Cell {
            row: (row.floor() as u32).min(self.header.height - 1),
            col: (col.floor() as u32).min(self.header.width - 1),
        })
    }

    /// Geographic center of a cell.
    pub fn center_of(&self, cell: Cell) -> LatLng {
        let h = &self.header;
        LatLng::new(
            h.bounds.north_east.lat - (cell.row as f64 + 0.5) * h.cell_lat_deg(),
            h.bounds.south_west.lng + (cell.col as f64 + 0.5) * h.cell_lng_deg(),
        )
    }

    fn index(&self, cell: Cell) -> Option<usize> {
        if cell.row >= self.header.height || cell.col >= self.header.width {
            return None;
        }
        Some(cell.row as usize * self.header.width as usize + cell.col as usize)
    }

    /// Mark a cell blocked or passable. Out-of-grid cells are ignored.
    pub fn set_blocked(&mut self, cell: Cell, blocked: bool) {
        let Some(idx) = self.index(cell) else {
            return;
        };
        let (byte_idx, bit_idx) = (idx / 8, idx % 8);
        if blocked {
            self.blocked[byte_idx] |= 1 << bit_idx;
        } else {
            self.blocked[byte_idx] &= !(1 << bit_idx);
        }
    }

    /// Block every cell whose center lies inside `area`.
    pub fn block_area(&mut self, area: &Bounds) {
        for row in 0..self.header.height {
            for col in 0..self.header.width {
                let cell = Cell { row, col };
                if area.contains(&self.center_of(cell)) {
                    self.set_blocked(cell, true);
                }
            }
        }
    }

    pub fn is_passable(&self, cell: Cell) -> bool {
        match self.index(cell) {
            Some(idx) => self.blocked[idx / 8] & (1 << (idx % 8)) == 0,
            None => false,
        }
    }

    /// Whether a point lies on the map: inside the grid and the sector outline.
    pub fn covers(&self, p: &LatLng) -> bool {
        self.cell_of(p).is_some() && (self.outline.is_empty() || polygon_contains(&self.outline, p))
    }

    /// Passability at a point; outside the grid is never passable.
    pub fn is_passable_at(&self, p: &LatLng) -> bool {
        self.cell_of(p).is_some_and(|c| self.is_passable(c))
    }

    /// Number of 8-connected steps between two points over passable cells.
    /// `None` when either end is outside/blocked or no route exists.
    pub fn route_steps(&self, from: &LatLng, to: &LatLng) -> Option<u32> {
        let start = self.cell_of(from)?;
        let goal = self.cell_of(to)?;
        if !self.is_passable(start) || !self.is_passable(goal) {
            return None;
        }

        let width = self.header.width as usize;
        let mut dist: Vec<Option<u32>> = vec![None; width * self.header.height as usize];
        let mut queue = VecDeque::new();
        dist[self.index(start)?] = Some(0);
        queue.push_back(start);

        while let Some(cell) = queue.pop_front() {
            let steps = dist[self.index(cell)?]?;
            if cell == goal {
                return Some(steps);
            }
            for next in self.neighbours(cell) {
                let Some(idx) = self.index(next) else {
                    continue;
                };
                if dist[idx].is_none() && self.is_passable(next) {
                    dist[idx] = Some(steps + 1);
                    queue.push_back(next);
                }
            }
        }
        None
    }

    /// Whether a unit can walk from `from` to `to`.
    pub fn reachable(&self, from: &LatLng, to: &LatLng) -> bool {
        self.route_steps(from, to).is_some()
    }

    /// Estimated route length in meters (steps × mean cell size, at least the straight line).
    pub fn route_length_m(&self, from: &LatLng, to: &LatLng) -> Option<f64> {
        let steps = self.route_steps(from, to)?;
        let straight = self.projection.distance_m(from, to);
        Some((steps as f64 * self.cell_size_m()).max(straight))
    }

    /// Mean edge length of a cell in meters.
    pub fn cell_size_m(&self) -> f64 {
        let origin = self.center_of(Cell { row: 0, col: 0 });
        let h = &self.header;
        let north = LatLng::new(origin.lat + h.cell_lat_deg(), origin.lng);
        let east = LatLng::new(origin.lat, origin.lng + h.cell_lng_deg());
        (self.projection.distance_m(&origin, &north) + self.projection.distance_m(&origin, &east))
            / 2.0
    }

    fn neighbours(&self, cell: Cell) -> impl Iterator<Item = Cell> + '_ {
        let (h, w) = (self.header.height as i64, self.header.width as i64);
        (-1i64..=1)
            .flat_map(|dr| (-1i64..=1).map(move |dc| (dr, dc)))
            .filter(|&(dr, dc)| dr != 0 || dc != 0)
            .filter_map(move |(dr, dc)| {
                let r = cell.row as i64 + dr;
                let c = cell.col as i64 + dc;
                (r >= 0 && c >= 0 && r < h && c < w).then_some(Cell {
                    row: r as u32,
                    col: c as u32,
                })
            })
    }
}
