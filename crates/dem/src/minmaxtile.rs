use crate::{Error, Result, SimpleTile, Tile, UpdatableTile};

/// Elevation tile with an implicit min/max k-d tree over hierarchical groups
/// of cells.
///
/// The tree merges two cells at a time, alternating column and row merges
/// from the raster up to a root made of a single row or a single column of
/// super-cells. Level `0` is the root; the deeper the level, the finer the
/// super-cells, with the raster itself addressable one level below the
/// deepest stored one.
///
/// Because bilinear interpolation inside cell `(i, j)` reaches the samples at
/// row `i + 1` and column `j + 1`, the per-cell extrema folded into the tree
/// are taken over all four corners, so every stored bound also covers the
/// interpolation overshoot one cell north and one cell east.
#[derive(Debug, Clone, Default)]
pub struct MinMaxTreeTile {
    base: SimpleTile,
    min_tree: Vec<f64>,
    max_tree: Vec<f64>,
    /// Offset of each stored level in the packed tree arrays, root first.
    start: Vec<usize>,
    /// Super-cell grid shape per level, with one extra entry for the raster.
    rows_at: Vec<usize>,
    cols_at: Vec<usize>,
    row_shift: Vec<usize>,
    col_shift: Vec<usize>,
    /// Orientation of the boundaries separating cells that first diverge at
    /// each level, one extra entry for the raster level.
    boundary_column: Vec<bool>,
}

impl MinMaxTreeTile {
    pub fn new() -> Self {
        MinMaxTreeTile::default()
    }

    /// Number of stored tree levels.
    pub fn levels(&self) -> usize {
        self.start.len()
    }

    fn check_indices(&self, row: usize, col: usize, level: usize) -> Result {
        let rows = self.base.latitude_rows();
        let cols = self.base.longitude_columns();
        if row >= rows || col >= cols {
            return Err(Error::OutOfTileIndices {
                row: row as i32,
                col: col as i32,
                rows,
                cols,
            });
        }
        if level > self.levels() {
            return Err(Error::OutOfTileIndices {
                row: level as i32,
                col: level as i32,
                rows: self.levels(),
                cols: self.levels(),
            });
        }
        Ok(())
    }

    // min and max of the four corners reached by interpolation inside one
    // raster cell, right and top edges taking what exists
    fn raw_extrema(&self, row: usize, col: usize) -> (f64, f64) {
        let r1 = (row + 1).min(self.base.latitude_rows() - 1);
        let c1 = (col + 1).min(self.base.longitude_columns() - 1);
        let mut lo = f64::INFINITY;
        let mut hi = f64::NEG_INFINITY;
        for &(i, j) in &[(row, col), (r1, col), (row, c1), (r1, c1)] {
            let z = self
                .base
                .elevation_at_indices(i, j)
                .expect("corner indices are clamped to the raster");
            lo = lo.min(z);
            hi = hi.max(z);
        }
        (lo, hi)
    }

    fn tree_index(&self, row: usize, col: usize, level: usize) -> usize {
        self.start[level]
            + (row >> self.row_shift[level]) * self.cols_at[level]
            + (col >> self.col_shift[level])
    }

    /// Lower bound of the interpolated elevation over the level-`level`
    /// super-cell containing raster cell `(row, col)`.
    pub fn get_min_elevation(&self, row: usize, col: usize, level: usize) -> Result<f64> {
        self.check_indices(row, col, level)?;
        if level == self.levels() {
            Ok(self.raw_extrema(row, col).0)
        } else {
            Ok(self.min_tree[self.tree_index(row, col, level)])
        }
    }

    /// Upper bound of the interpolated elevation over the level-`level`
    /// super-cell containing raster cell `(row, col)`.
    pub fn get_max_elevation(&self, row: usize, col: usize, level: usize) -> Result<f64> {
        self.check_indices(row, col, level)?;
        if level == self.levels() {
            Ok(self.raw_extrema(row, col).1)
        } else {
            Ok(self.max_tree[self.tree_index(row, col, level)])
        }
    }

    /// Deepest level at which two raster cells share a super-cell, `-1` when
    /// they only meet above the root.
    pub fn get_merge_level(&self, row1: usize, col1: usize, row2: usize, col2: usize) -> i32 {
        for level in (0..self.levels()).rev() {
            if row1 >> self.row_shift[level] == row2 >> self.row_shift[level]
                && col1 >> self.col_shift[level] == col2 >> self.col_shift[level]
            {
                return level as i32;
            }
        }
        -1
    }

    /// True when the super-cell boundaries separating cells that first
    /// diverge at `level` run along columns.
    pub fn is_column_merging(&self, level: usize) -> bool {
        self.boundary_column[level.min(self.levels())]
    }

    /// Row indices at which the straight cell path from `row1` to `row2`
    /// crosses level-`level` super-cell boundaries, walking from `row1`
    /// towards `row2`; endpoints are included when they sit on a boundary.
    pub fn get_crossed_boundary_rows(&self, row1: i32, row2: i32, level: usize) -> Vec<i32> {
        let step = 1i32 << self.row_shift.get(level).copied().unwrap_or(0);
        Self::crossings(row1, row2, step)
    }

    /// Column counterpart of
    /// [`get_crossed_boundary_rows`](Self::get_crossed_boundary_rows).
    pub fn get_crossed_boundary_columns(&self, col1: i32, col2: i32, level: usize) -> Vec<i32> {
        let step = 1i32 << self.col_shift.get(level).copied().unwrap_or(0);
        Self::crossings(col1, col2, step)
    }

    fn crossings(from: i32, to: i32, step: i32) -> Vec<i32> {
        let lo = from.min(to);
        let hi = from.max(to);
        let k0 = lo.div_euclid(step) + i32::from(lo.rem_euclid(step) != 0);
        let k1 = hi.div_euclid(step);
        let mut result: Vec<i32> = (k0..=k1).map(|k| k * step).collect();
        if from > to {
            result.reverse();
        }
        result
    }

    /// Raster cell attaining the minimum of the super-cell containing
    /// `(row, col)` at `level`.
    pub fn locate_min(&self, row: usize, col: usize, level: usize) -> Result<(usize, usize)> {
        self.locate(row, col, level, true)
    }

    /// Raster cell attaining the maximum of the super-cell containing
    /// `(row, col)` at `level`.
    pub fn locate_max(&self, row: usize, col: usize, level: usize) -> Result<(usize, usize)> {
        self.locate(row, col, level, false)
    }

    fn locate(&self, row: usize, col: usize, level: usize, minimum: bool) -> Result<(usize, usize)> {
        self.check_indices(row, col, level)?;
        let levels = self.levels();
        if level == levels {
            return Ok((row, col));
        }

        let value_at = |i: usize, j: usize, lev: usize| -> f64 {
            if lev == levels {
                let (lo, hi) = self.raw_extrema(i, j);
                if minimum { lo } else { hi }
            } else {
                let idx = self.start[lev] + i * self.cols_at[lev] + j;
                if minimum { self.min_tree[idx] } else { self.max_tree[idx] }
            }
        };

        let mut lev = level;
        let mut i = row >> self.row_shift[level];
        let mut j = col >> self.col_shift[level];
        let mut v = value_at(i, j, lev);

        // walk down, at each level following the child holding the extremum
        while lev < levels {
            let child = lev + 1;
            let (rows, cols) = if child == levels {
                (self.base.latitude_rows(), self.base.longitude_columns())
            } else {
                (self.rows_at[child], self.cols_at[child])
            };
            let candidates = if self.boundary_column[child] {
                [(i, 2 * j), (i, 2 * j + 1)]
            } else {
                [(2 * i, j), (2 * i + 1, j)]
            };
            let mut found = false;
            for (ci, cj) in candidates {
                if ci < rows && cj < cols && value_at(ci, cj, child) == v {
                    i = ci;
                    j = cj;
                    found = true;
                    break;
                }
            }
            if !found {
                // the tree and the raster disagree, which can only happen on
                // an inconsistent rebuild
                return Err(Error::NoDemData {
                    latitude: self.base.latitude_at(row as i32),
                    longitude: self.base.longitude_at(col as i32),
                });
            }
            lev = child;
        }
        Ok((i, j))
    }

    fn build_tree(&mut self) -> Result {
        let rows = self.base.latitude_rows();
        let cols = self.base.longitude_columns();
        if rows == 0 || cols == 0 {
            return Err(Error::EmptyTile { rows, cols });
        }

        // per-cell extrema covering the bilinear interpolation reach
        let mut pre_min = vec![0.0; rows * cols];
        let mut pre_max = vec![0.0; rows * cols];
        for i in 0..rows {
            for j in 0..cols {
                let (lo, hi) = self.raw_extrema(i, j);
                pre_min[i * cols + j] = lo;
                pre_max[i * cols + j] = hi;
            }
        }

        // merge sequence, finest level first
        let mut shapes: Vec<(usize, usize, usize, usize, bool)> = Vec::new();
        let (mut r, mut c, mut rs, mut cs) = (rows, cols, 0usize, 0usize);
        let mut stage = 0usize;
        while r > 1 && c > 1 {
            let column = stage % 2 == 0;
            if column {
                c = c.div_ceil(2);
                cs += 1;
            } else {
                r = r.div_ceil(2);
                rs += 1;
            }
            shapes.push((r, c, rs, cs, column));
            stage += 1;
        }
        let levels = shapes.len();

        self.rows_at = vec![0; levels + 1];
        self.cols_at = vec![0; levels + 1];
        self.row_shift = vec![0; levels + 1];
        self.col_shift = vec![0; levels + 1];
        self.boundary_column = vec![false; levels + 1];
        self.rows_at[levels] = rows;
        self.cols_at[levels] = cols;
        // a divergence at the root runs along whichever dimension the root
        // still has more than one super-cell in
        self.boundary_column[0] = shapes.last().map_or(cols > 1, |s| s.1 > 1);
        for (m, &(mr, mc, mrs, mcs, column)) in shapes.iter().enumerate() {
            let level = levels - 1 - m;
            self.rows_at[level] = mr;
            self.cols_at[level] = mc;
            self.row_shift[level] = mrs;
            self.col_shift[level] = mcs;
            self.boundary_column[level + 1] = column;
        }

        self.start = vec![0; levels];
        for level in 1..levels {
            self.start[level] = self.start[level - 1] + self.rows_at[level - 1] * self.cols_at[level - 1];
        }
        let total = if levels == 0 {
            0
        } else {
            self.start[levels - 1] + self.rows_at[levels - 1] * self.cols_at[levels - 1]
        };
        self.min_tree = vec![0.0; total];
        self.max_tree = vec![0.0; total];

        // deepest stored level comes straight from the per-cell extrema,
        // coarser levels reuse the tree as its own input
        for level in (0..levels).rev() {
            let (src_rows, src_cols) = (self.rows_at[level + 1], self.cols_at[level + 1]);
            let (dst_rows, dst_cols) = (self.rows_at[level], self.cols_at[level]);
            let column = self.boundary_column[level + 1];
            if level == levels - 1 {
                let offset = self.start[level];
                Self::merge(&pre_min, src_rows, src_cols, &mut self.min_tree[..], offset, dst_rows, dst_cols, column, true);
                Self::merge(&pre_max, src_rows, src_cols, &mut self.max_tree[..], offset, dst_rows, dst_cols, column, false);
            } else {
                let split = self.start[level + 1];
                let (min_head, min_tail) = self.min_tree.split_at_mut(split);
                Self::merge(min_tail, src_rows, src_cols, min_head, self.start[level], dst_rows, dst_cols, column, true);
                let (max_head, max_tail) = self.max_tree.split_at_mut(split);
                Self::merge(max_tail, src_rows, src_cols, max_head, self.start[level], dst_rows, dst_cols, column, false);
            }
        }

        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn merge(
        src: &[f64],
        src_rows: usize,
        src_cols: usize,
        dst: &mut [f64],
        dst_offset: usize,
        dst_rows: usize,
        dst_cols: usize,
        column: bool,
        minimum: bool,
    ) {
        let op = if minimum { f64::min } else { f64::max };
        for i in 0..dst_rows {
            for j in 0..dst_cols {
                let v = if column {
                    let j0 = 2 * j;
                    let a = src[i * src_cols + j0];
                    if j0 + 1 < src_cols { op(a, src[i * src_cols + j0 + 1]) } else { a }
                } else {
                    let i0 = 2 * i;
                    let a = src[i0 * src_cols + j];
                    if i0 + 1 < src_rows { op(a, src[(i0 + 1) * src_cols + j]) } else { a }
                };
                dst[dst_offset + i * dst_cols + j] = v;
            }
        }
    }
}

impl UpdatableTile for MinMaxTreeTile {
    fn set_geometry(
        &mut self,
        min_latitude: f64,
        min_longitude: f64,
        latitude_step: f64,
        longitude_step: f64,
        latitude_rows: usize,
        longitude_columns: usize,
    ) -> Result {
        self.base.set_geometry(
            min_latitude,
            min_longitude,
            latitude_step,
            longitude_step,
            latitude_rows,
            longitude_columns,
        )
    }

    fn set_elevation(&mut self, row: usize, col: usize, elevation: f64) -> Result {
        self.base.set_elevation(row, col, elevation)
    }
}

impl Tile for MinMaxTreeTile {
    fn min_latitude(&self) -> f64 {
        self.base.min_latitude()
    }

    fn min_longitude(&self) -> f64 {
        self.base.min_longitude()
    }

    fn latitude_step(&self) -> f64 {
        self.base.latitude_step()
    }

    fn longitude_step(&self) -> f64 {
        self.base.longitude_step()
    }

    fn latitude_rows(&self) -> usize {
        self.base.latitude_rows()
    }

    fn longitude_columns(&self) -> usize {
        self.base.longitude_columns()
    }

    fn elevation_at_indices(&self, row: usize, col: usize) -> Result<f64> {
        self.base.elevation_at_indices(row, col)
    }

    fn min_elevation(&self) -> f64 {
        self.base.min_elevation()
    }

    fn max_elevation(&self) -> f64 {
        self.base.max_elevation()
    }

    fn tile_update_completed(&mut self) -> Result {
        self.build_tree()
    }
}
