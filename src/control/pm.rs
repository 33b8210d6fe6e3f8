//! Clock gating and tile-in-use tracking.
//!
//! The clock enable of a tile lives in the tile directly below it, so a
//! column is ungated bottom-up and gated top-down. The shim row carries the
//! column clock buffer, which must be on before any tile above it can run.
//!
//! [`DeviceInstance::tiles_in_use`] mirrors the ungated tiles: a bit may
//! only be set when every tile between it and the shim is set too.

use crate::device::{DeviceInstance, TileLoc, TileType};
use crate::error::{Error, Result};

impl DeviceInstance {
    /// Gate or ungate the clock of `loc` through the clock control of the
    /// tile below it.
    pub(crate) fn set_tile_clock(&mut self, loc: TileLoc, enable: bool) -> Result<()> {
        let below = loc
            .below()
            .ok_or_else(|| Error::invalid_arg(format!("tile {} has no clock control below it", loc)))?;
        let (_, mods) = self.tile_modules(below, &[])?;
        let clk = mods.clock.next_tile_clk;
        self.mask_write32(self.reg_addr(below, mods.clock.off), clk.mask, clk.flag(enable))
    }

    pub(crate) fn set_column_clock_buffer(&mut self, col: u8, enable: bool) -> Result<()> {
        let shim = TileLoc::new(col, self.config().shim_row);
        let (_, mods) = self.tile_modules(shim, &[TileType::ShimNoc, TileType::ShimPl])?;
        let buffer = mods
            .column_clock
            .ok_or(Error::FeatureNotSupported("column clock buffer"))?;
        self.mask_write32(
            self.reg_addr(shim, buffer.off),
            buffer.clock_buffer.mask,
            buffer.clock_buffer.flag(enable),
        )
    }

    pub fn is_tile_in_use(&self, loc: TileLoc) -> bool {
        self.tiles_in_use.is_loc_set(loc)
    }

    /// Ungate the listed tiles and every tile below them.
    ///
    /// An empty list ungates the whole partition. Shim tiles in the list
    /// are skipped, as are tiles already in use.
    pub fn request_tiles(&mut self, locs: &[TileLoc]) -> Result<()> {
        if locs.is_empty() {
            return self.set_partition_clock(true);
        }
        for loc in locs {
            self.check_tile(*loc, &[])?;
        }

        let shim_row = self.config().shim_row;
        for &loc in locs {
            if loc.row == shim_row || self.tiles_in_use.is_loc_set(loc) {
                continue;
            }
            match self.tiles_in_use.highest_set_below(loc.col, loc.row) {
                Some(highest) => {
                    for row in highest + 1..=loc.row {
                        let tile = TileLoc::new(loc.col, row);
                        self.set_tile_clock(tile, true)?;
                        self.tiles_in_use.set_loc(tile);
                    }
                }
                None => {
                    self.set_column_clock_buffer(loc.col, true)?;
                    for row in (loc.row + 1..self.num_rows()).rev() {
                        self.set_tile_clock(TileLoc::new(loc.col, row), false)?;
                    }
                    for row in 1..=loc.row {
                        self.set_tile_clock(TileLoc::new(loc.col, row), true)?;
                    }
                    for row in 0..=loc.row {
                        self.tiles_in_use.set_loc(TileLoc::new(loc.col, row));
                    }
                }
            }
            log::debug!("requested tile {}", loc);
        }
        Ok(())
    }

    /// Gate the listed tiles and every tile above them.
    ///
    /// Releasing row 1 also turns the column clock buffer off. An empty list
    /// gates the whole partition.
    pub fn release_tiles(&mut self, locs: &[TileLoc]) -> Result<()> {
        if locs.is_empty() {
            return self.set_partition_clock(false);
        }
        for loc in locs {
            self.check_tile(*loc, &[])?;
        }

        let shim_row = self.config().shim_row;
        for &loc in locs {
            if loc.row == shim_row || !self.tiles_in_use.is_loc_set(loc) {
                continue;
            }
            for row in (loc.row..self.num_rows()).rev() {
                let tile = TileLoc::new(loc.col, row);
                self.set_tile_clock(tile, false)?;
                self.tiles_in_use.clear_loc(tile);
            }
            if loc.row == 1 {
                self.set_column_clock_buffer(loc.col, false)?;
                self.tiles_in_use.clear_loc(TileLoc::new(loc.col, shim_row));
            }
            log::debug!("released tile {}", loc);
        }
        Ok(())
    }

    /// Toggle the clock buffers of `num_cols` columns starting at `start_col`
    /// and mark every tile of those columns accordingly.
    pub fn set_column_clk(&mut self, start_col: u8, num_cols: u8, enable: bool) -> Result<()> {
        if start_col as u16 + num_cols as u16 > self.num_cols() as u16 {
            return Err(Error::invalid_arg(format!(
                "columns {}..{} outside the partition of {} columns",
                start_col,
                start_col as u16 + num_cols as u16,
                self.num_cols()
            )));
        }
        for col in start_col..start_col + num_cols {
            self.set_column_clock_buffer(col, enable)?;
        }

        let start = self
            .tiles_in_use
            .pos_of(TileLoc::new(start_col, 0))
            .unwrap_or(self.tiles_in_use.len());
        let count = num_cols as usize * self.num_rows() as usize;
        if enable {
            self.tiles_in_use.set_range(start, count);
        } else {
            self.tiles_in_use.clear_range(start, count);
        }
        Ok(())
    }

    /// Ungate (bottom-up, buffer first) or gate (top-down, buffer last)
    /// every column of the partition.
    pub fn set_partition_clock(&mut self, enable: bool) -> Result<()> {
        let rows = self.num_rows();
        for col in 0..self.num_cols() {
            if enable {
                self.set_column_clock_buffer(col, true)?;
                for row in 1..rows {
                    self.set_tile_clock(TileLoc::new(col, row), true)?;
                }
            } else {
                for row in (1..rows).rev() {
                    self.set_tile_clock(TileLoc::new(col, row), false)?;
                }
                self.set_column_clock_buffer(col, false)?;
            }
        }
        if enable {
            self.tiles_in_use.set_all();
        } else {
            self.tiles_in_use.clear_all();
        }
        log::debug!("partition clock {}", if enable { "ungated" } else { "gated" });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::sim::{RegOp, SimBackend};
    use crate::device::aieml_regs::{core_module, mem_tile_module, shim_module};
    use crate::device::{DeviceConfig, DeviceGeneration};

    /// 4 columns, shim + 1 memory tile row + 3 compute rows.
    fn device() -> DeviceInstance {
        let config = DeviceConfig::new(DeviceGeneration::Aie2Ipu, 0, 4).with_rows(1, 3);
        DeviceInstance::with_backend(config, Box::new(SimBackend::new())).unwrap()
    }

    fn sim(dev: &mut DeviceInstance) -> &mut SimBackend {
        dev.backend_as_mut::<SimBackend>().unwrap()
    }

    fn set_bits(dev: &DeviceInstance) -> Vec<usize> {
        dev.tiles_in_use().iter_set().collect()
    }

    #[test]
    fn test_request_first_tile_ungates_shim_and_tile() {
        let mut dev = device();
        dev.request_tiles(&[TileLoc::new(0, 1)]).unwrap();
        assert_eq!(set_bits(&dev), vec![0, 1]);

        let buffer = dev.reg_addr(TileLoc::new(0, 0), shim_module::COLUMN_CLOCK_CONTROL);
        let shim_clk = dev.reg_addr(TileLoc::new(0, 0), shim_module::TILE_CLOCK_CONTROL);
        let mem_clk = dev.reg_addr(TileLoc::new(0, 1), mem_tile_module::TILE_CLOCK_CONTROL);
        let sim = sim(&mut dev);
        assert_eq!(sim.value(buffer), 1);
        assert_eq!(sim.value(shim_clk), 0b10);
        assert_eq!(sim.value(mem_clk), 0);
        // Buffer first, upper rows gated top-down, then row 1 ungated.
        assert_eq!(sim.ops().first(), Some(&RegOp::MaskWrite { addr: buffer, mask: 1, value: 1 }));
        assert_eq!(sim.ops().last(), Some(&RegOp::MaskWrite { addr: shim_clk, mask: 0b10, value: 0b10 }));
        assert_eq!(sim.mutations().count(), 5);
    }

    #[test]
    fn test_repeated_request_changes_nothing() {
        let mut dev = device();
        dev.request_tiles(&[TileLoc::new(0, 1)]).unwrap();
        sim(&mut dev).clear_ops();
        dev.request_tiles(&[TileLoc::new(0, 1)]).unwrap();
        assert!(sim(&mut dev).ops().is_empty());
        assert_eq!(set_bits(&dev), vec![0, 1]);
    }

    #[test]
    fn test_request_above_in_use_tile_ungates_gap() {
        let mut dev = device();
        dev.request_tiles(&[TileLoc::new(2, 1)]).unwrap();
        sim(&mut dev).clear_ops();

        dev.request_tiles(&[TileLoc::new(2, 3)]).unwrap();
        let row1_clk = dev.reg_addr(TileLoc::new(2, 1), mem_tile_module::TILE_CLOCK_CONTROL);
        let row2_clk = dev.reg_addr(TileLoc::new(2, 2), core_module::TILE_CLOCK_CONTROL);
        assert_eq!(
            sim(&mut dev).ops(),
            &[
                RegOp::MaskWrite { addr: row1_clk, mask: 0b10, value: 0b10 },
                RegOp::MaskWrite { addr: row2_clk, mask: 0b10, value: 0b10 },
            ]
        );
        for row in 0..=3 {
            assert!(dev.is_tile_in_use(TileLoc::new(2, row)));
        }
        assert_eq!(dev.tiles_in_use().count_ones(), 4);
    }

    #[test]
    fn test_request_validates_before_writing() {
        let mut dev = device();
        let err = dev.request_tiles(&[TileLoc::new(0, 1), TileLoc::new(4, 1)]).unwrap_err();
        assert!(matches!(err, Error::InvalidTile { .. }));
        assert!(sim(&mut dev).ops().is_empty());
    }

    #[test]
    fn test_request_skips_shim_row() {
        let mut dev = device();
        dev.request_tiles(&[TileLoc::new(1, 0)]).unwrap();
        assert!(sim(&mut dev).ops().is_empty());
        assert_eq!(dev.tiles_in_use().count_ones(), 0);
    }

    #[test]
    fn test_empty_request_ungates_partition() {
        let mut dev = device();
        dev.request_tiles(&[]).unwrap();
        assert_eq!(dev.tiles_in_use().count_ones(), 20);
        for col in 0..4 {
            let buffer = dev.reg_addr(TileLoc::new(col, 0), shim_module::COLUMN_CLOCK_CONTROL);
            assert_eq!(sim(&mut dev).value(buffer), 1);
        }
    }

    #[test]
    fn test_set_column_clk_bit_range() {
        let mut dev = device();
        dev.set_column_clk(1, 2, true).unwrap();
        assert_eq!(set_bits(&dev), (5..15).collect::<Vec<_>>());
        for col in 1..3 {
            let buffer = dev.reg_addr(TileLoc::new(col, 0), shim_module::COLUMN_CLOCK_CONTROL);
            assert_eq!(sim(&mut dev).value(buffer), 1);
        }

        dev.set_column_clk(2, 1, false).unwrap();
        assert_eq!(set_bits(&dev), (5..10).collect::<Vec<_>>());
    }

    #[test]
    fn test_set_column_clk_rejects_out_of_range() {
        let mut dev = device();
        assert!(matches!(dev.set_column_clk(3, 2, true), Err(Error::InvalidArgument(_))));
        assert!(sim(&mut dev).ops().is_empty());
        dev.set_column_clk(0, 4, true).unwrap();
        assert_eq!(dev.tiles_in_use().count_ones(), 20);
    }

    #[test]
    fn test_partition_gate_order() {
        let mut dev = device();
        dev.set_partition_clock(true).unwrap();
        sim(&mut dev).clear_ops();
        dev.set_partition_clock(false).unwrap();
        assert_eq!(dev.tiles_in_use().count_ones(), 0);

        // Column 0: rows 4..1 gated top-down, then the buffer.
        let expected: Vec<u64> = vec![
            dev.reg_addr(TileLoc::new(0, 3), core_module::TILE_CLOCK_CONTROL),
            dev.reg_addr(TileLoc::new(0, 2), core_module::TILE_CLOCK_CONTROL),
            dev.reg_addr(TileLoc::new(0, 1), mem_tile_module::TILE_CLOCK_CONTROL),
            dev.reg_addr(TileLoc::new(0, 0), shim_module::TILE_CLOCK_CONTROL),
            dev.reg_addr(TileLoc::new(0, 0), shim_module::COLUMN_CLOCK_CONTROL),
        ];
        let addrs: Vec<u64> = sim(&mut dev).ops().iter().take(5).map(|op| op.addr()).collect();
        assert_eq!(addrs, expected);
    }

    #[test]
    fn test_release_dual_of_request() {
        let mut dev = device();
        dev.request_tiles(&[TileLoc::new(1, 3)]).unwrap();
        assert_eq!(dev.tiles_in_use().count_ones(), 4);

        dev.release_tiles(&[TileLoc::new(1, 2)]).unwrap();
        assert!(dev.is_tile_in_use(TileLoc::new(1, 1)));
        assert!(!dev.is_tile_in_use(TileLoc::new(1, 2)));
        assert!(!dev.is_tile_in_use(TileLoc::new(1, 3)));

        dev.release_tiles(&[TileLoc::new(1, 1)]).unwrap();
        assert_eq!(dev.tiles_in_use().count_ones(), 0);
        let buffer = dev.reg_addr(TileLoc::new(1, 0), shim_module::COLUMN_CLOCK_CONTROL);
        assert_eq!(sim(&mut dev).value(buffer), 0);
    }

    #[test]
    fn test_empty_release_gates_partition() {
        let mut dev = device();
        dev.request_tiles(&[]).unwrap();
        dev.release_tiles(&[]).unwrap();
        assert_eq!(dev.tiles_in_use().count_ones(), 0);
    }
}
