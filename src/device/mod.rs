//! Device model: partition geometry, tile addressing and the device instance.
//!
//! This module provides:
//! - Chip generations and their descriptor tables
//! - Partition geometry ([`DeviceConfig`]) and tile classification
//! - The [`DeviceInstance`] root handle that owns the bound backend and
//!   the clock-use bitmap
//!
//! # Array Layout
//!
//! An AIE-ML partition is a grid of tiles addressed by (column, row):
//!
//! ```text
//!     Col 0    Col 1    Col 2    Col 3
//!   +--------+--------+--------+--------+
//! 4 |AieTile |AieTile |AieTile |AieTile |
//!   +--------+--------+--------+--------+
//! 3 |AieTile |AieTile |AieTile |AieTile |
//!   +--------+--------+--------+--------+
//! 2 |AieTile |AieTile |AieTile |AieTile |
//!   +--------+--------+--------+--------+
//! 1 |MemTile |MemTile |MemTile |MemTile |
//!   +--------+--------+--------+--------+
//! 0 | ShimPl | ShimPl |ShimNoc |ShimNoc |  <- (start_col + col) % 4
//!   +--------+--------+--------+--------+
//! ```
//!
//! # Address Encoding
//!
//! ```text
//! tile_addr = base_addr + ((start_col + col) << col_shift) + (row << row_shift)
//! reg_addr  = tile_addr + offset
//! ```
//!
//! # Example
//!
//! ```ignore
//! use aie_ctl::backend::{BackendKind, BackendOptions, BackendRegistry};
//! use aie_ctl::device::{DeviceConfig, DeviceGeneration, DeviceInstance, TileLoc};
//!
//! let config = DeviceConfig::new(DeviceGeneration::Aie2Ipu, 0, 4);
//! let opts = BackendOptions::for_config(&config);
//! let mut dev = DeviceInstance::io_init(config, &BackendRegistry::builtin(), BackendKind::Sim, &opts)?;
//! dev.request_tiles(&[TileLoc::new(0, 2)])?;
//! dev.core_enable(TileLoc::new(0, 2))?;
//! ```

pub mod aieml_regs;
pub mod bitmap;
pub mod events;
pub mod location;
pub mod modules;
pub mod regfield;

use std::any::Any;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::backend::{Backend, BackendKind, BackendOptions, BackendRegistry, PollMode};
use crate::error::{Error, Result};

pub use bitmap::TileBitmap;
pub use events::{Event, EventModule};
pub use location::{TileLoc, TileType};
pub use modules::{ModuleTable, ModuleType, TileModules};
pub use regfield::RegField;

/// AI Engine chip generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceGeneration {
    /// AIE-ML (Versal AI Edge)
    #[serde(rename = "aie-ml")]
    AieMl,
    /// AIE2 client NPU (Phoenix/HawkPoint)
    #[serde(rename = "aie2-ipu", alias = "npu1")]
    Aie2Ipu,
    /// AIE2P (Strix/Krackan)
    #[serde(rename = "aie2p")]
    Aie2P,
}

/// How partition init enables the column clocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnClockRule {
    /// Ungate every tile of the partition and mark all of them in use
    UngatePartition,
    /// Only enable each column's shim clock buffer
    ColumnBuffers,
}

impl DeviceGeneration {
    /// Descriptor table of this generation.
    pub fn modules(&self) -> &'static ModuleTable {
        match self {
            DeviceGeneration::AieMl | DeviceGeneration::Aie2P => &aieml_regs::AIEML_MODULES,
            DeviceGeneration::Aie2Ipu => &aieml_regs::AIE2IPU_MODULES,
        }
    }

    pub fn column_clock_rule(&self) -> ColumnClockRule {
        match self {
            DeviceGeneration::AieMl | DeviceGeneration::Aie2Ipu => ColumnClockRule::UngatePartition,
            DeviceGeneration::Aie2P => ColumnClockRule::ColumnBuffers,
        }
    }

    /// Whether init gates every tile again once configuration is done, so
    /// only explicitly requested tiles end up clocked.
    pub fn regate_after_init(&self) -> bool {
        matches!(self, DeviceGeneration::AieMl | DeviceGeneration::Aie2Ipu)
    }

    /// Generation code carried in transaction stream headers.
    pub fn txn_code(&self) -> u8 {
        match self {
            DeviceGeneration::AieMl => 2,
            DeviceGeneration::Aie2Ipu => 3,
            DeviceGeneration::Aie2P => 4,
        }
    }

    pub fn from_txn_code(code: u8) -> Option<Self> {
        match code {
            2 => Some(DeviceGeneration::AieMl),
            3 => Some(DeviceGeneration::Aie2Ipu),
            4 => Some(DeviceGeneration::Aie2P),
            _ => None,
        }
    }
}

impl fmt::Display for DeviceGeneration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceGeneration::AieMl => write!(f, "aie-ml"),
            DeviceGeneration::Aie2Ipu => write!(f, "aie2-ipu"),
            DeviceGeneration::Aie2P => write!(f, "aie2p"),
        }
    }
}

impl std::str::FromStr for DeviceGeneration {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "aie-ml" | "aieml" => Ok(DeviceGeneration::AieMl),
            "aie2-ipu" | "aie2ipu" | "npu1" => Ok(DeviceGeneration::Aie2Ipu),
            "aie2p" | "npu4" => Ok(DeviceGeneration::Aie2P),
            other => Err(format!("unknown generation '{}'", other)),
        }
    }
}

// ============================================================================
// Partition geometry
// ============================================================================

/// Partition geometry and generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceConfig {
    pub generation: DeviceGeneration,
    /// Physical address of absolute column 0, row 0
    pub base_addr: u64,
    pub col_shift: u8,
    pub row_shift: u8,
    pub num_rows: u8,
    pub num_cols: u8,
    /// Absolute column of partition column 0
    pub start_col: u8,
    pub shim_row: u8,
    pub mem_tile_row_start: u8,
    pub mem_tile_num_rows: u8,
    pub aie_tile_row_start: u8,
    pub aie_tile_num_rows: u8,
    /// Absolute column that is always a NoC shim, regardless of the mod-4 rule
    pub shim_noc_exception: Option<u8>,
}

impl DeviceConfig {
    /// Default geometry of `generation` for `num_cols` columns at `start_col`.
    pub fn new(generation: DeviceGeneration, start_col: u8, num_cols: u8) -> Self {
        let (base_addr, mem_rows, aie_rows) = match generation {
            DeviceGeneration::AieMl => (0x200_0000_0000, 2, 8),
            DeviceGeneration::Aie2Ipu | DeviceGeneration::Aie2P => (0, 1, 4),
        };
        Self {
            generation,
            base_addr,
            col_shift: 25,
            row_shift: 20,
            num_rows: 0,
            num_cols,
            start_col,
            shim_row: 0,
            mem_tile_row_start: 0,
            mem_tile_num_rows: 0,
            aie_tile_row_start: 0,
            aie_tile_num_rows: 0,
            shim_noc_exception: None,
        }
        .with_rows(mem_rows, aie_rows)
    }

    /// Stack `mem_rows` memory-tile rows then `aie_rows` compute rows above
    /// the shim row.
    pub fn with_rows(mut self, mem_rows: u8, aie_rows: u8) -> Self {
        self.mem_tile_row_start = self.shim_row + 1;
        self.mem_tile_num_rows = mem_rows;
        self.aie_tile_row_start = self.mem_tile_row_start + mem_rows;
        self.aie_tile_num_rows = aie_rows;
        self.num_rows = 1 + mem_rows + aie_rows;
        self
    }

    pub fn with_base_addr(mut self, base_addr: u64) -> Self {
        self.base_addr = base_addr;
        self
    }

    pub fn with_shim_noc_exception(mut self, abs_col: u8) -> Self {
        self.shim_noc_exception = Some(abs_col);
        self
    }

    /// Reject malformed geometry.
    pub fn validate(&self) -> Result<()> {
        if self.num_cols == 0 || self.num_rows == 0 {
            return Err(Error::invalid_arg("partition must have at least one row and column"));
        }
        if self.shim_row != 0 {
            return Err(Error::invalid_arg("shim row must be row 0"));
        }
        if self.start_col as u16 + self.num_cols as u16 > 128 {
            return Err(Error::invalid_arg(format!(
                "columns {}..{} exceed the array",
                self.start_col,
                self.start_col as u16 + self.num_cols as u16
            )));
        }
        let mem = self.mem_tile_row_start as u16..self.mem_tile_row_start as u16 + self.mem_tile_num_rows as u16;
        let aie = self.aie_tile_row_start as u16..self.aie_tile_row_start as u16 + self.aie_tile_num_rows as u16;
        for (name, range) in [("memory tile", &mem), ("compute tile", &aie)] {
            if !range.is_empty() && (range.start == 0 || range.end > self.num_rows as u16) {
                return Err(Error::invalid_arg(format!(
                    "{} rows {:?} outside rows 1..{}",
                    name, range, self.num_rows
                )));
            }
        }
        if !mem.is_empty() && !aie.is_empty() && mem.start < aie.end && aie.start < mem.end {
            return Err(Error::invalid_arg("memory tile rows overlap compute tile rows"));
        }
        if self.row_shift >= self.col_shift || self.col_shift >= 57 {
            return Err(Error::invalid_arg("column shift must exceed row shift and leave room for the column"));
        }
        if (self.num_rows as u64) > 1u64 << (self.col_shift - self.row_shift) {
            return Err(Error::invalid_arg("row shift cannot hold every row below the column shift"));
        }
        Ok(())
    }

    /// Classify a location. Pure and total.
    pub fn tile_type(&self, loc: TileLoc) -> TileType {
        if loc.col >= self.num_cols || loc.row >= self.num_rows {
            return TileType::Unknown;
        }
        if loc.row == self.shim_row {
            return self.shim_type(loc.col);
        }
        let in_range = |start: u8, count: u8| loc.row >= start && (loc.row as u16) < start as u16 + count as u16;
        if in_range(self.mem_tile_row_start, self.mem_tile_num_rows) {
            TileType::MemTile
        } else if in_range(self.aie_tile_row_start, self.aie_tile_num_rows) {
            TileType::AieTile
        } else {
            TileType::Unknown
        }
    }

    fn shim_type(&self, col: u8) -> TileType {
        if self.generation == DeviceGeneration::Aie2Ipu {
            return TileType::ShimNoc;
        }
        let abs_col = self.start_col as u16 + col as u16;
        if self.shim_noc_exception.map(u16::from) == Some(abs_col) {
            return TileType::ShimNoc;
        }
        match abs_col % 4 {
            0 | 1 => TileType::ShimPl,
            _ => TileType::ShimNoc,
        }
    }

    /// Physical address of a tile's register space. Does not validate.
    pub fn tile_addr(&self, loc: TileLoc) -> u64 {
        self.base_addr
            + (((self.start_col as u64) + loc.col as u64) << self.col_shift)
            + ((loc.row as u64) << self.row_shift)
    }

    /// Inverse of [`Self::tile_addr`]: tile and offset of a register address.
    pub fn decode_addr(&self, addr: u64) -> Option<(TileLoc, u32)> {
        let rel = addr.checked_sub(self.base_addr)?;
        let abs_col = rel >> self.col_shift;
        let row = (rel >> self.row_shift) & ((1 << (self.col_shift - self.row_shift)) - 1);
        let offset = (rel & ((1 << self.row_shift) - 1)) as u32;
        let col = abs_col.checked_sub(self.start_col as u64)?;
        if col >= self.num_cols as u64 || row >= self.num_rows as u64 {
            return None;
        }
        Some((TileLoc::new(col as u8, row as u8), offset))
    }

    /// All locations of the partition, column-major.
    pub fn locations(&self) -> impl Iterator<Item = TileLoc> + '_ {
        (0..self.num_cols).flat_map(move |col| (0..self.num_rows).map(move |row| TileLoc::new(col, row)))
    }
}

// ============================================================================
// Device instance
// ============================================================================

/// Root handle of one partition.
///
/// Owns the geometry, the bound backend and the clock-use bitmap. Mutating
/// operations take `&mut self`; callers sharing an instance across threads
/// must serialize access themselves.
#[derive(Debug)]
pub struct DeviceInstance {
    config: DeviceConfig,
    modules: &'static ModuleTable,
    backend: Box<dyn Backend>,
    pub(crate) tiles_in_use: TileBitmap,
}

impl DeviceInstance {
    /// Validate `config` and bind the backend `kind` from `registry`.
    pub fn io_init(
        config: DeviceConfig,
        registry: &BackendRegistry,
        kind: BackendKind,
        opts: &BackendOptions,
    ) -> Result<Self> {
        config.validate()?;
        let backend = registry.bind(kind, opts)?;
        log::debug!(
            "bound {} backend for {} partition: cols {}..{}, {} rows",
            kind,
            config.generation,
            config.start_col,
            config.start_col as u16 + config.num_cols as u16,
            config.num_rows
        );
        Ok(Self::assemble(config, backend))
    }

    /// Validate `config` and use an already initialized backend.
    pub fn with_backend(config: DeviceConfig, backend: Box<dyn Backend>) -> Result<Self> {
        config.validate()?;
        Ok(Self::assemble(config, backend))
    }

    fn assemble(config: DeviceConfig, backend: Box<dyn Backend>) -> Self {
        let modules = config.generation.modules();
        let tiles_in_use = TileBitmap::new(config.num_cols, config.num_rows);
        Self { config, modules, backend, tiles_in_use }
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    pub fn generation(&self) -> DeviceGeneration {
        self.config.generation
    }

    pub fn num_cols(&self) -> u8 {
        self.config.num_cols
    }

    pub fn num_rows(&self) -> u8 {
        self.config.num_rows
    }

    pub fn modules(&self) -> &'static ModuleTable {
        self.modules
    }

    pub fn backend_kind(&self) -> BackendKind {
        self.backend.kind()
    }

    /// Bound backend as a concrete type, e.g. to export a capture.
    pub fn backend_as<T: Backend + 'static>(&self) -> Option<&T> {
        let any: &dyn Any = self.backend.as_any();
        any.downcast_ref::<T>()
    }

    pub fn backend_as_mut<T: Backend + 'static>(&mut self) -> Option<&mut T> {
        self.backend.as_any_mut().downcast_mut::<T>()
    }

    /// Release the instance and hand back its backend.
    pub fn into_backend(self) -> Box<dyn Backend> {
        self.backend
    }

    /// Clock-use bitmap.
    pub fn tiles_in_use(&self) -> &TileBitmap {
        &self.tiles_in_use
    }

    pub fn tile_type(&self, loc: TileLoc) -> TileType {
        self.config.tile_type(loc)
    }

    pub fn tile_addr(&self, loc: TileLoc) -> u64 {
        self.config.tile_addr(loc)
    }

    pub fn reg_addr(&self, loc: TileLoc, off: u32) -> u64 {
        self.config.tile_addr(loc) + off as u64
    }

    /// Classify `loc` and require one of `expected` (any known type when
    /// `expected` is empty).
    pub fn check_tile(&self, loc: TileLoc, expected: &[TileType]) -> Result<TileType> {
        let tile_type = self.tile_type(loc);
        if tile_type == TileType::Unknown {
            return Err(Error::InvalidTile { loc, tile_type, reason: "outside the partition" });
        }
        if !expected.is_empty() && !expected.contains(&tile_type) {
            return Err(Error::InvalidTile { loc, tile_type, reason: "wrong tile type for operation" });
        }
        Ok(tile_type)
    }

    /// Descriptors of the tile at `loc` after checking its type.
    pub(crate) fn tile_modules(&self, loc: TileLoc, expected: &[TileType]) -> Result<(TileType, &'static TileModules)> {
        let tile_type = self.check_tile(loc, expected)?;
        let mods = self
            .modules
            .tile(tile_type)
            .ok_or(Error::InvalidTile { loc, tile_type, reason: "no descriptors for tile type" })?;
        Ok((tile_type, mods))
    }

    // ------------------------------------------------------------------------
    // Register access. Every access of the control core goes through here.
    // ------------------------------------------------------------------------

    pub fn read32(&mut self, addr: u64) -> Result<u32> {
        let value = self.backend.read32(addr)?;
        log::trace!("read32  0x{:016X} -> 0x{:08X}", addr, value);
        Ok(value)
    }

    pub fn write32(&mut self, addr: u64, value: u32) -> Result<()> {
        log::trace!("write32 0x{:016X} <- 0x{:08X}", addr, value);
        self.backend.write32(addr, value)
    }

    pub fn mask_write32(&mut self, addr: u64, mask: u32, value: u32) -> Result<()> {
        log::trace!("mask_write32 0x{:016X} <- 0x{:08X} & 0x{:08X}", addr, value, mask);
        self.backend.mask_write32(addr, mask, value)
    }

    pub fn mask_poll(&mut self, addr: u64, mask: u32, expected: u32, timeout_us: u32, mode: PollMode) -> Result<()> {
        log::trace!(
            "mask_poll 0x{:016X} & 0x{:08X} == 0x{:08X} ({} us, {})",
            addr, mask, expected, timeout_us, mode
        );
        self.backend.mask_poll(addr, mask, expected, timeout_us, mode)
    }

    pub fn block_set32(&mut self, addr: u64, value: u32, count: u32) -> Result<()> {
        log::trace!("block_set32 0x{:016X} <- 0x{:08X} x {}", addr, value, count);
        self.backend.block_set32(addr, value, count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::sim::SimBackend;

    fn npu(num_cols: u8) -> DeviceConfig {
        DeviceConfig::new(DeviceGeneration::Aie2Ipu, 0, num_cols)
    }

    #[test]
    fn test_default_geometry() {
        let cfg = npu(4);
        assert_eq!(cfg.num_rows, 6);
        assert_eq!(cfg.tile_type(TileLoc::new(0, 1)), TileType::MemTile);
        assert_eq!(cfg.tile_type(TileLoc::new(3, 5)), TileType::AieTile);
        assert!(cfg.validate().is_ok());

        let ml = DeviceConfig::new(DeviceGeneration::AieMl, 0, 38);
        assert_eq!(ml.num_rows, 11);
        assert_eq!(ml.tile_type(TileLoc::new(0, 2)), TileType::MemTile);
        assert_eq!(ml.tile_type(TileLoc::new(0, 3)), TileType::AieTile);
        assert!(ml.validate().is_ok());
    }

    #[test]
    fn test_tile_type_unknown_outside() {
        let cfg = npu(4);
        assert_eq!(cfg.tile_type(TileLoc::new(4, 0)), TileType::Unknown);
        assert_eq!(cfg.tile_type(TileLoc::new(0, 6)), TileType::Unknown);
    }

    #[test]
    fn test_tile_type_is_pure() {
        let cfg = DeviceConfig::new(DeviceGeneration::AieMl, 1, 8);
        for loc in cfg.locations().collect::<Vec<_>>() {
            assert_eq!(cfg.tile_type(loc), cfg.tile_type(loc));
        }
    }

    #[test]
    fn test_shim_mod4_rule() {
        let cfg = DeviceConfig::new(DeviceGeneration::AieMl, 0, 8);
        let types: Vec<TileType> = (0..8).map(|c| cfg.tile_type(TileLoc::new(c, 0))).collect();
        assert_eq!(
            types,
            vec![
                TileType::ShimPl, TileType::ShimPl, TileType::ShimNoc, TileType::ShimNoc,
                TileType::ShimPl, TileType::ShimPl, TileType::ShimNoc, TileType::ShimNoc,
            ]
        );

        // Rule uses the absolute column.
        let offset = DeviceConfig::new(DeviceGeneration::AieMl, 2, 2);
        assert_eq!(offset.tile_type(TileLoc::new(0, 0)), TileType::ShimNoc);
        assert_eq!(offset.tile_type(TileLoc::new(1, 0)), TileType::ShimNoc);
    }

    #[test]
    fn test_shim_noc_exception_column() {
        let cfg = DeviceConfig::new(DeviceGeneration::AieMl, 0, 4).with_shim_noc_exception(1);
        assert_eq!(cfg.tile_type(TileLoc::new(0, 0)), TileType::ShimPl);
        assert_eq!(cfg.tile_type(TileLoc::new(1, 0)), TileType::ShimNoc);
    }

    #[test]
    fn test_npu_shims_all_noc() {
        let cfg = npu(4);
        for col in 0..4 {
            assert_eq!(cfg.tile_type(TileLoc::new(col, 0)), TileType::ShimNoc);
        }
    }

    #[test]
    fn test_tile_addr() {
        let cfg = DeviceConfig::new(DeviceGeneration::Aie2Ipu, 1, 4);
        assert_eq!(cfg.tile_addr(TileLoc::new(0, 2)), 0x0220_0000);
        assert_eq!(cfg.tile_addr(TileLoc::new(1, 2)) + 0x32000, 0x0423_2000);

        let ml = DeviceConfig::new(DeviceGeneration::AieMl, 0, 4);
        assert_eq!(ml.tile_addr(TileLoc::new(1, 0)), 0x200_0200_0000);
    }

    #[test]
    fn test_decode_addr_inverts_tile_addr() {
        let cfg = DeviceConfig::new(DeviceGeneration::Aie2Ipu, 1, 4);
        let addr = cfg.tile_addr(TileLoc::new(3, 5)) + 0x32004;
        assert_eq!(cfg.decode_addr(addr), Some((TileLoc::new(3, 5), 0x32004)));
        // Column 0 of the array is outside a partition that starts at 1.
        assert_eq!(cfg.decode_addr(0x0020_0000), None);
    }

    #[test]
    fn test_validate_rejects_bad_geometry() {
        let mut cfg = npu(4);
        cfg.num_cols = 0;
        assert!(matches!(cfg.validate(), Err(Error::InvalidArgument(_))));

        let mut cfg = npu(4);
        cfg.aie_tile_row_start = 1;
        assert!(cfg.validate().is_err());

        let mut cfg = npu(4);
        cfg.aie_tile_num_rows = 9;
        assert!(cfg.validate().is_err());

        let mut cfg = npu(4);
        cfg.row_shift = 25;
        assert!(cfg.validate().is_err());

        assert!(DeviceConfig::new(DeviceGeneration::Aie2Ipu, 120, 10).validate().is_err());
    }

    #[test]
    fn test_check_tile() {
        let dev = DeviceInstance::with_backend(npu(4), Box::new(SimBackend::new())).unwrap();
        assert_eq!(dev.check_tile(TileLoc::new(0, 2), &[TileType::AieTile]).unwrap(), TileType::AieTile);
        assert!(matches!(
            dev.check_tile(TileLoc::new(0, 1), &[TileType::AieTile]),
            Err(Error::InvalidTile { tile_type: TileType::MemTile, .. })
        ));
        assert!(matches!(
            dev.check_tile(TileLoc::new(9, 1), &[]),
            Err(Error::InvalidTile { tile_type: TileType::Unknown, .. })
        ));
    }

    #[test]
    fn test_backend_downcast() {
        let dev = DeviceInstance::with_backend(npu(1), Box::new(SimBackend::new())).unwrap();
        assert_eq!(dev.backend_kind(), BackendKind::Sim);
        assert!(dev.backend_as::<SimBackend>().is_some());
        assert!(dev.backend_as::<crate::backend::debug::DebugBackend>().is_none());
    }

    #[test]
    fn test_generation_parse() {
        assert_eq!("npu1".parse::<DeviceGeneration>().unwrap(), DeviceGeneration::Aie2Ipu);
        assert_eq!("AIE-ML".parse::<DeviceGeneration>().unwrap(), DeviceGeneration::AieMl);
        assert!("aie1".parse::<DeviceGeneration>().is_err());
        for gen in [DeviceGeneration::AieMl, DeviceGeneration::Aie2Ipu, DeviceGeneration::Aie2P] {
            assert_eq!(gen.to_string().parse::<DeviceGeneration>().unwrap(), gen);
            assert_eq!(DeviceGeneration::from_txn_code(gen.txn_code()), Some(gen));
        }
    }
}
