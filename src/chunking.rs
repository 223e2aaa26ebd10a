use log::debug;

/// Half-open cell ranges of one block of the target grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockBounds {
    pub row_min: usize,
    pub row_max: usize,
    pub col_min: usize,
    pub col_max: usize,
}

impl BlockBounds {
    pub fn height(&self) -> usize {
        self.row_max - self.row_min
    }

    pub fn width(&self) -> usize {
        self.col_max - self.col_min
    }

    pub fn len(&self) -> usize {
        self.height() * self.width()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every `(row, col)` in the block, row-major.
    pub fn cells(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        (self.row_min..self.row_max)
            .flat_map(move |row| (self.col_min..self.col_max).map(move |col| (row, col)))
    }
}

/// Square blocks tiling a `rows` x `cols` grid; edge blocks are clipped.
#[derive(Debug, Clone)]
pub struct BlockGrid {
    rows: usize,
    cols: usize,
    block_size: usize,
    pub blocks_x: usize,
    pub blocks_y: usize,
    pub total_blocks: usize,
}

impl BlockGrid {
    pub fn new(rows: usize, cols: usize, block_size: usize) -> Self {
        let block_size = block_size.max(1);
        let blocks_x = cols.div_ceil(block_size);
        let blocks_y = rows.div_ceil(block_size);
        let total_blocks = blocks_x * blocks_y;

        debug!(
            "BlockGrid: {}x{} cells, block_size={} -> {}x{} blocks ({} total)",
            rows, cols, block_size, blocks_y, blocks_x, total_blocks
        );

        Self {
            rows,
            cols,
            block_size,
            blocks_x,
            blocks_y,
            total_blocks,
        }
    }

    pub fn iter(&self) -> BlockIterator<'_> {
        BlockIterator {
            grid: self,
            current_idx: 0,
        }
    }

    pub fn block_bounds(&self, block_idx: usize) -> BlockBounds {
        let block_y = block_idx / self.blocks_x;
        let block_x = block_idx % self.blocks_x;

        BlockBounds {
            row_min: block_y * self.block_size,
            row_max: ((block_y + 1) * self.block_size).min(self.rows),
            col_min: block_x * self.block_size,
            col_max: ((block_x + 1) * self.block_size).min(self.cols),
        }
    }
}

pub struct BlockIterator<'a> {
    grid: &'a BlockGrid,
    current_idx: usize,
}

impl Iterator for BlockIterator<'_> {
    type Item = (usize, BlockBounds);

    fn next(&mut self) -> Option<Self::Item> {
        if self.current_idx < self.grid.total_blocks {
            let idx = self.current_idx;
            self.current_idx += 1;
            Some((idx, self.grid.block_bounds(idx)))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_grid_simple() {
        let grid = BlockGrid::new(100, 100, 50);
        assert_eq!(grid.blocks_x, 2);
        assert_eq!(grid.blocks_y, 2);
        assert_eq!(grid.total_blocks, 4);
    }

    #[test]
    fn test_block_bounds_clipped_at_edge() {
        let grid = BlockGrid::new(30, 70, 32);
        assert_eq!(grid.total_blocks, 3);
        let last = grid.block_bounds(2);
        assert_eq!((last.row_min, last.row_max), (0, 30));
        assert_eq!((last.col_min, last.col_max), (64, 70));
        assert_eq!(last.len(), 30 * 6);
    }

    #[test]
    fn test_blocks_cover_every_cell_once() {
        let grid = BlockGrid::new(17, 23, 5);
        let mut seen = vec![0u8; 17 * 23];
        for (_, block) in grid.iter() {
            for (row, col) in block.cells() {
                seen[row * 23 + col] += 1;
            }
        }
        assert!(seen.iter().all(|&n| n == 1));
    }

    #[test]
    fn test_empty_grid() {
        let grid = BlockGrid::new(0, 10, 4);
        assert_eq!(grid.total_blocks, 0);
        assert_eq!(grid.iter().count(), 0);
    }
}
