//! Tile locations and tile types.
//!
//! A [`TileLoc`] is partition relative: column 0 is the partition's first
//! column, whatever its absolute position in the array. Classification of a
//! location into a [`TileType`] needs the partition geometry and lives on
//! [`super::DeviceConfig::tile_type`].

use std::fmt;

/// Tile location inside a partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct TileLoc {
    /// Column, relative to the partition's start column
    pub col: u8,
    /// Row (0 is the shim row)
    pub row: u8,
}

impl TileLoc {
    /// Create a location.
    pub const fn new(col: u8, row: u8) -> Self {
        Self { col, row }
    }

    /// The tile directly below, if any.
    pub const fn below(&self) -> Option<TileLoc> {
        if self.row == 0 {
            None
        } else {
            Some(TileLoc::new(self.col, self.row - 1))
        }
    }
}

impl fmt::Display for TileLoc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{})", self.col, self.row)
    }
}

impl std::str::FromStr for TileLoc {
    type Err = String;

    /// Parse `col,row` (parentheses optional).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim().trim_start_matches('(').trim_end_matches(')');
        let (col, row) = trimmed
            .split_once(',')
            .ok_or_else(|| format!("expected 'col,row', got '{}'", s))?;
        let col = col.trim().parse::<u8>().map_err(|e| format!("bad column '{}': {}", col, e))?;
        let row = row.trim().parse::<u8>().map_err(|e| format!("bad row '{}': {}", row, e))?;
        Ok(TileLoc::new(col, row))
    }
}

/// Type of the tile at a location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TileType {
    /// Compute tile (core + data memory)
    AieTile,
    /// Memory tile (large shared memory, no core)
    MemTile,
    /// Shim tile with a NoC interface
    ShimNoc,
    /// Shim tile with only a PL interface
    ShimPl,
    /// Outside the partition or in no configured row range
    Unknown,
}

impl TileType {
    /// Whether this is a shim tile of either flavor.
    pub const fn is_shim(&self) -> bool {
        matches!(self, TileType::ShimNoc | TileType::ShimPl)
    }
}

impl fmt::Display for TileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TileType::AieTile => write!(f, "AieTile"),
            TileType::MemTile => write!(f, "MemTile"),
            TileType::ShimNoc => write!(f, "ShimNoc"),
            TileType::ShimPl => write!(f, "ShimPl"),
            TileType::Unknown => write!(f, "Unknown"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tile_loc_parse() {
        assert_eq!("1,2".parse::<TileLoc>().unwrap(), TileLoc::new(1, 2));
        assert_eq!("(3, 0)".parse::<TileLoc>().unwrap(), TileLoc::new(3, 0));
        assert!("3".parse::<TileLoc>().is_err());
        assert!("a,1".parse::<TileLoc>().is_err());
        assert!("1,300".parse::<TileLoc>().is_err());
    }

    #[test]
    fn test_tile_loc_below() {
        assert_eq!(TileLoc::new(2, 3).below(), Some(TileLoc::new(2, 2)));
        assert_eq!(TileLoc::new(2, 0).below(), None);
    }

    #[test]
    fn test_is_shim() {
        assert!(TileType::ShimNoc.is_shim());
        assert!(TileType::ShimPl.is_shim());
        assert!(!TileType::MemTile.is_shim());
        assert!(!TileType::Unknown.is_shim());
    }
}
