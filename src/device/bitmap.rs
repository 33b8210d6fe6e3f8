//! Tile clock-use bitmap.
//!
//! One bit per (col,row) of the partition, column-major:
//!
//! ```text
//!   pos = col * num_rows + row
//!
//!   col 0            col 1            col 2
//!   [r0 r1 .. rN-1]  [r0 r1 .. rN-1]  [r0 ...
//! ```
//!
//! Row 0 tracks the column's shim clock buffer; the other rows track whether
//! that tile's clock is ungated. Backed by inline storage for partitions of
//! up to 256 tiles.

use smallvec::{smallvec, SmallVec};

use super::TileLoc;

const WORD_BITS: usize = 64;

/// Fixed-size bit set covering every tile of a partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileBitmap {
    words: SmallVec<[u64; 4]>,
    num_cols: u8,
    num_rows: u8,
}

impl TileBitmap {
    /// All-clear bitmap for a `num_cols` x `num_rows` partition.
    pub fn new(num_cols: u8, num_rows: u8) -> Self {
        let bits = num_cols as usize * num_rows as usize;
        let words = bits.div_ceil(WORD_BITS);
        Self {
            words: smallvec![0; words],
            num_cols,
            num_rows,
        }
    }

    /// Number of tracked tiles.
    pub fn len(&self) -> usize {
        self.num_cols as usize * self.num_rows as usize
    }

    /// True for a zero-sized partition.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Rows per column.
    pub fn num_rows(&self) -> u8 {
        self.num_rows
    }

    /// Bit position of a location, if it is inside the partition.
    pub fn pos_of(&self, loc: TileLoc) -> Option<usize> {
        if loc.col >= self.num_cols || loc.row >= self.num_rows {
            return None;
        }
        Some(loc.col as usize * self.num_rows as usize + loc.row as usize)
    }

    /// Location of a bit position.
    pub fn loc_of(&self, pos: usize) -> Option<TileLoc> {
        if pos >= self.len() {
            return None;
        }
        let rows = self.num_rows as usize;
        Some(TileLoc::new((pos / rows) as u8, (pos % rows) as u8))
    }

    pub fn is_set(&self, pos: usize) -> bool {
        pos < self.len() && self.words[pos / WORD_BITS] & (1 << (pos % WORD_BITS)) != 0
    }

    pub fn is_loc_set(&self, loc: TileLoc) -> bool {
        self.pos_of(loc).is_some_and(|pos| self.is_set(pos))
    }

    /// Set one bit. Out-of-range positions are ignored.
    pub fn set(&mut self, pos: usize) {
        if pos < self.len() {
            self.words[pos / WORD_BITS] |= 1 << (pos % WORD_BITS);
        }
    }

    /// Clear one bit. Out-of-range positions are ignored.
    pub fn clear(&mut self, pos: usize) {
        if pos < self.len() {
            self.words[pos / WORD_BITS] &= !(1 << (pos % WORD_BITS));
        }
    }

    pub fn set_loc(&mut self, loc: TileLoc) {
        if let Some(pos) = self.pos_of(loc) {
            self.set(pos);
        }
    }

    pub fn clear_loc(&mut self, loc: TileLoc) {
        if let Some(pos) = self.pos_of(loc) {
            self.clear(pos);
        }
    }

    /// Set `count` consecutive bits starting at `start`, clipped to the map.
    pub fn set_range(&mut self, start: usize, count: usize) {
        let end = start.saturating_add(count).min(self.len());
        for pos in start..end {
            self.set(pos);
        }
    }

    /// Clear `count` consecutive bits starting at `start`, clipped to the map.
    pub fn clear_range(&mut self, start: usize, count: usize) {
        let end = start.saturating_add(count).min(self.len());
        for pos in start..end {
            self.clear(pos);
        }
    }

    pub fn set_all(&mut self) {
        self.set_range(0, self.len());
    }

    pub fn clear_all(&mut self) {
        self.words.iter_mut().for_each(|w| *w = 0);
    }

    /// Number of set bits.
    pub fn count_ones(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Iterate over set bit positions in ascending order.
    pub fn iter_set(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.len()).filter(move |&pos| self.is_set(pos))
    }

    /// Highest set row of `col` strictly below `below_row`, ignoring the
    /// shim row.
    pub fn highest_set_below(&self, col: u8, below_row: u8) -> Option<u8> {
        (1..below_row.min(self.num_rows))
            .rev()
            .find(|&row| self.is_loc_set(TileLoc::new(col, row)))
    }

    /// Highest set row of `col`, ignoring the shim row.
    pub fn highest_set_in_column(&self, col: u8) -> Option<u8> {
        self.highest_set_below(col, self.num_rows)
    }
}
