//! Linked-cell spatial index.
//!
//! The box is cut into a uniform grid of cells no smaller than the interaction cutoff, so every
//! partner of an object lies in the 27 cells around it. Each cell owns an intrusive singly
//! linked chain of object indices stored in two flat arrays: `heads[cell]` is the first index of
//! the chain and `next[index]` the one after it. Chains are always kept in descending index
//! order, which makes incremental maintenance produce exactly the chains a full rebuild would.

use itertools::iproduct;
use nalgebra::Vector3;
use thiserror::Error;

/// End-of-chain marker.
const NIL: usize = usize::MAX;
/// Bias applied before flooring a scaled coordinate, so values that round up onto a cell face
/// fall back into the lower cell.
const CELL_BIAS: f64 = -1.0e-9;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum LinkCellError {
    #[error("Cell size {cell} along axis {axis} is not in (0, {length}]")]
    InvalidCellSize { axis: usize, cell: f64, length: f64 },

    #[error("Cell coordinate {coord} along axis {axis} is outside [0, {cells})")]
    CellOutOfRange { axis: usize, coord: i64, cells: usize },

    #[error("Neighbour query found {found} objects, exceeding the bound of {bound}")]
    NeighborOverflow { found: usize, bound: usize },

    #[error("Index {index} is out of range for {len} indexed objects")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("Index {index} is not linked into cell {cell}")]
    NotLinked { index: usize, cell: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpatialIndex {
    cells: [usize; 3],
    periodic: [bool; 3],
    max_neighbors: usize,
    heads: Vec<usize>,
    next: Vec<usize>,
}

impl SpatialIndex {
    /// Builds an empty grid with `floor(length / cell_size)` cells along each axis.
    pub fn new(
        lengths: &Vector3<f64>,
        cell_size: &Vector3<f64>,
        periodic: [bool; 3],
        max_neighbors: usize,
    ) -> Result<Self, LinkCellError> {
        let mut cells = [0usize; 3];
        for axis in 0..3 {
            let count = (lengths[axis] / cell_size[axis]).floor();
            if !(cell_size[axis] > 0.0) || !count.is_finite() || count < 1.0 {
                return Err(LinkCellError::InvalidCellSize {
                    axis,
                    cell: cell_size[axis],
                    length: lengths[axis],
                });
            }
            cells[axis] = count as usize;
        }

        Ok(Self {
            cells,
            periodic,
            max_neighbors,
            heads: vec![NIL; cells[0] * cells[1] * cells[2]],
            next: Vec::new(),
        })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.next.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.next.is_empty()
    }

    #[inline]
    pub fn cells_per_axis(&self) -> [usize; 3] {
        self.cells
    }

    #[inline]
    pub fn cell_count(&self) -> usize {
        self.heads.len()
    }

    /// Cell coordinates of a fractional position.
    pub fn cell_of(&self, fractional: &Vector3<f64>) -> Result<[usize; 3], LinkCellError> {
        let mut coords = [0usize; 3];
        for axis in 0..3 {
            let scaled = fractional[axis] * self.cells[axis] as f64;
            let mut coord = (scaled + CELL_BIAS).floor();
            if coord == -1.0 && scaled >= 0.0 {
                coord = 0.0;
            }
            if !(coord >= 0.0 && coord < self.cells[axis] as f64) {
                return Err(LinkCellError::CellOutOfRange {
                    axis,
                    coord: if coord.is_finite() { coord as i64 } else { i64::MIN },
                    cells: self.cells[axis],
                });
            }
            coords[axis] = coord as usize;
        }
        Ok(coords)
    }

    #[inline]
    fn cell_id(&self, [cx, cy, cz]: [usize; 3]) -> usize {
        cx + self.cells[0] * (cy + self.cells[1] * cz)
    }

    fn cell_id_of(&self, fractional: &Vector3<f64>) -> Result<usize, LinkCellError> {
        Ok(self.cell_id(self.cell_of(fractional)?))
    }

    /// Discards the current contents and links `fractionals` as indices `0..n`.
    pub fn rebuild<'a>(
        &mut self,
        fractionals: impl IntoIterator<Item = &'a Vector3<f64>>,
    ) -> Result<(), LinkCellError> {
        self.heads.fill(NIL);
        self.next.clear();
        for fractional in fractionals {
            self.insert(fractional)?;
        }
        Ok(())
    }

    /// Links a new object as index `len()` and returns that index.
    pub fn insert(&mut self, fractional: &Vector3<f64>) -> Result<usize, LinkCellError> {
        let cell = self.cell_id_of(fractional)?;
        let index = self.next.len();
        // The new index is the largest, so it becomes the head.
        self.next.push(self.heads[cell]);
        self.heads[cell] = index;
        Ok(index)
    }

    /// Moves `index` from the cell of `old` to the cell of `new`.
    pub fn relocate(
        &mut self,
        index: usize,
        old: &Vector3<f64>,
        new: &Vector3<f64>,
    ) -> Result<(), LinkCellError> {
        self.check_index(index)?;
        let from = self.cell_id_of(old)?;
        let to = self.cell_id_of(new)?;
        if from != to {
            self.unlink(index, from)?;
            self.link_sorted(index, to);
        }
        Ok(())
    }

    /// Unlinks `index` and renumbers every index above it down by one, mirroring the removal of
    /// the object from a dense ensemble.
    pub fn remove(&mut self, index: usize, fractional: &Vector3<f64>) -> Result<(), LinkCellError> {
        self.check_index(index)?;
        let cell = self.cell_id_of(fractional)?;
        self.unlink(index, cell)?;

        self.next.remove(index);
        for link in self.heads.iter_mut().chain(self.next.iter_mut()) {
            if *link != NIL && *link > index {
                *link -= 1;
            }
        }
        Ok(())
    }

    /// Indices of all objects in the 27-cell neighbourhood of `index`, excluding `index` itself.
    pub fn neighbors(
        &self,
        index: usize,
        fractional: &Vector3<f64>,
    ) -> Result<Vec<usize>, LinkCellError> {
        self.check_index(index)?;
        self.collect_around(fractional, Some(index))
    }

    /// Indices of all objects in the 27-cell neighbourhood of an arbitrary point.
    pub fn around(&self, fractional: &Vector3<f64>) -> Result<Vec<usize>, LinkCellError> {
        self.collect_around(fractional, None)
    }

    /// Members of one cell, head first.
    pub fn chain(&self, cell: usize) -> Chain<'_> {
        Chain {
            next: &self.next,
            current: self.heads.get(cell).copied().unwrap_or(NIL),
        }
    }

    /// Whether every index in `0..len()` appears in exactly one chain and nothing else does.
    pub fn is_partition(&self) -> bool {
        let mut seen = vec![false; self.next.len()];
        for cell in 0..self.heads.len() {
            for index in self.chain(cell) {
                if index >= seen.len() || seen[index] {
                    return false;
                }
                seen[index] = true;
            }
        }
        seen.into_iter().all(|s| s)
    }

    fn collect_around(
        &self,
        fractional: &Vector3<f64>,
        exclude: Option<usize>,
    ) -> Result<Vec<usize>, LinkCellError> {
        let [cx, cy, cz] = self.cell_of(fractional)?;
        let xs = self.axis_span(0, cx);
        let ys = self.axis_span(1, cy);
        let zs = self.axis_span(2, cz);

        let mut found = Vec::new();
        // Each span starts at the centre coordinate, so the centre cell is visited first.
        for (&z, &y, &x) in iproduct!(zs.iter(), ys.iter(), xs.iter()) {
            let cell = self.cell_id([x, y, z]);
            found.extend(self.chain(cell).filter(|&j| Some(j) != exclude));
        }

        if found.len() > self.max_neighbors {
            return Err(LinkCellError::NeighborOverflow {
                found: found.len(),
                bound: self.max_neighbors,
            });
        }
        Ok(found)
    }

    /// Distinct cell coordinates visited along one axis: the centre, then below, then above.
    /// Periodic axes wrap; non-periodic axes stop at the domain edge.
    fn axis_span(&self, axis: usize, center: usize) -> Vec<usize> {
        let n = self.cells[axis];
        let mut span = vec![center];
        let below = if center > 0 {
            Some(center - 1)
        } else if self.periodic[axis] {
            Some(n - 1)
        } else {
            None
        };
        let above = if center + 1 < n {
            Some(center + 1)
        } else if self.periodic[axis] {
            Some(0)
        } else {
            None
        };
        for coord in [below, above].into_iter().flatten() {
            if !span.contains(&coord) {
                span.push(coord);
            }
        }
        span
    }

    fn check_index(&self, index: usize) -> Result<(), LinkCellError> {
        if index >= self.next.len() {
            return Err(LinkCellError::IndexOutOfRange {
                index,
                len: self.next.len(),
            });
        }
        Ok(())
    }

    fn unlink(&mut self, index: usize, cell: usize) -> Result<(), LinkCellError> {
        let mut prev = NIL;
        let mut current = self.heads[cell];
        while current != NIL {
            if current == index {
                if prev == NIL {
                    self.heads[cell] = self.next[current];
                } else {
                    self.next[prev] = self.next[current];
                }
                self.next[current] = NIL;
                return Ok(());
            }
            prev = current;
            current = self.next[current];
        }
        Err(LinkCellError::NotLinked { index, cell })
    }

    fn link_sorted(&mut self, index: usize, cell: usize) {
        let mut prev = NIL;
        let mut current = self.heads[cell];
        while current != NIL && current > index {
            prev = current;
            current = self.next[current];
        }
        self.next[index] = current;
        if prev == NIL {
            self.heads[cell] = index;
        } else {
            self.next[prev] = index;
        }
    }
}

/// Iterator over one cell's chain.
pub struct Chain<'a> {
    next: &'a [usize],
    current: usize,
}

impl Iterator for Chain<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        if self.current == NIL {
            return None;
        }
        let index = self.current;
        self.current = self.next[index];
        Some(index)
    }
}
