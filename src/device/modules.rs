//! Module descriptors: where each controllable function lives in a tile.
//!
//! A generation is described by one [`ModuleTable`]: per tile type, a
//! [`TileModules`] bundle of optional register descriptors, plus the
//! partition-level NPI module. A `None` descriptor means the generation's
//! tile type does not carry that function; callers map that to
//! [`crate::Error::FeatureNotSupported`].
//!
//! The tables are read-only `'static` data. Register offsets are tile
//! relative except [`NpiMod::base_addr`], which is absolute.

use super::events::{EventMap, EventModule};
use super::regfield::RegField;
use super::TileType;

/// Core control register (`Core_Control`).
#[derive(Debug, Clone, Copy)]
pub struct CoreCtrlReg {
    pub off: u32,
    pub enable: RegField,
    pub reset: RegField,
}

/// Core status register (`Core_Status`).
#[derive(Debug, Clone, Copy)]
pub struct CoreStatusReg {
    pub off: u32,
    pub enable: RegField,
    pub reset: RegField,
    pub debug_halt: RegField,
    pub error_halt: RegField,
}

/// Core enable/disable event register (`Enable_Events`).
///
/// The two "occurred" bits are write-1-to-clear status.
#[derive(Debug, Clone, Copy)]
pub struct CoreEventReg {
    pub off: u32,
    pub enable_event: RegField,
    pub disable_event: RegField,
    pub disable_event_occurred: RegField,
    pub enable_event_occurred: RegField,
}

/// Core debug registers (`Debug_Control0/1`, `Debug_Status`).
#[derive(Debug, Clone, Copy)]
pub struct CoreDebugRegs {
    pub ctrl0_off: u32,
    pub halt: RegField,
    pub ctrl1_off: u32,
    pub halt_event0: RegField,
    pub halt_event1: RegField,
    pub single_step_event: RegField,
    pub resume_event: RegField,
    pub status_off: u32,
}

/// Register holding a single event selector.
#[derive(Debug, Clone, Copy)]
pub struct EventSelectReg {
    pub off: u32,
    pub event: RegField,
}

/// Compute tile core module.
#[derive(Debug, Clone, Copy)]
pub struct CoreMod {
    pub ctrl: CoreCtrlReg,
    pub status: CoreStatusReg,
    pub events: CoreEventReg,
    pub debug: CoreDebugRegs,
    pub error_halt_event: EventSelectReg,
    pub reset_event: EventSelectReg,
    pub pc_off: u32,
    pub sp_off: u32,
    pub lr_off: u32,
    pub processor_bus_off: u32,
    pub processor_bus_enable: RegField,
}

/// Clock control of a tile: gates the clock of the tile directly above.
#[derive(Debug, Clone, Copy)]
pub struct ClockMod {
    pub off: u32,
    pub next_tile_clk: RegField,
}

/// Shim column clock buffer.
#[derive(Debug, Clone, Copy)]
pub struct ColumnClockMod {
    pub off: u32,
    pub clock_buffer: RegField,
}

/// Tile control register: stream isolation per direction.
#[derive(Debug, Clone, Copy)]
pub struct TileCtrlMod {
    pub off: u32,
    pub isolate_south: RegField,
    pub isolate_west: RegField,
    pub isolate_north: RegField,
    pub isolate_east: RegField,
}

/// Memory region inside a tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemRegion {
    pub base: u32,
    pub size: u32,
}

impl MemRegion {
    /// Number of 32-bit words.
    pub const fn words(&self) -> u32 {
        self.size / 4
    }
}

/// Memory tile interleaving control.
#[derive(Debug, Clone, Copy)]
pub struct InterleaveMod {
    pub off: u32,
    pub enable: RegField,
}

/// Shim column reset and per-column shim reset enable.
#[derive(Debug, Clone, Copy)]
pub struct ShimResetMod {
    pub column_reset_off: u32,
    pub column_reset: RegField,
    pub shim_reset_enable_off: u32,
    pub shim_reset_enable: RegField,
}

/// NoC interface AXI-MM error responses.
#[derive(Debug, Clone, Copy)]
pub struct NocAxiMmMod {
    pub off: u32,
    pub slverr_block: RegField,
    pub decerr_block: RegField,
}

/// First-level interrupt controller (one per shim, two switches).
///
/// Offsets are for switch A; switch B is at `switch_stride` above.
#[derive(Debug, Clone, Copy)]
pub struct L1IntrMod {
    pub switch_stride: u32,
    pub enable_off: u32,
    pub disable_off: u32,
    pub status_off: u32,
    pub irq_no_off: u32,
    pub irq_no: RegField,
    pub irq_event_off: u32,
    /// Field of IRQ event 0; event `n` is `n * irq_event_stride` bits above
    pub irq_event: RegField,
    pub irq_event_stride: u8,
    pub num_irq_events: u8,
    pub num_irq_ids: u8,
    pub block_set_off: u32,
    pub block_clear_off: u32,
    pub num_broadcast: u8,
}

/// Second-level interrupt controller (NoC shims only).
#[derive(Debug, Clone, Copy)]
pub struct L2IntrMod {
    pub mask_off: u32,
    pub enable_off: u32,
    pub disable_off: u32,
    pub status_off: u32,
    pub irq_off: u32,
    pub irq: RegField,
    pub num_channels: u8,
}

/// Performance counter block of one module.
///
/// Start/stop selectors pack two counters per control register, reset
/// selectors pack four.
#[derive(Debug, Clone, Copy)]
pub struct PerfMod {
    pub num_counters: u8,
    pub ctrl_off: u32,
    pub reset_ctrl_off: u32,
    pub counter_off: u32,
    pub event_value_off: u32,
    /// Mask of one event selector before shifting
    pub event_mask: u32,
}

/// Platform management interface: protected registers and global shim reset.
#[derive(Debug, Clone, Copy)]
pub struct NpiMod {
    pub base_addr: u64,
    pub prot_reg_off: u32,
    pub prot_enable: RegField,
    pub prot_first_col: RegField,
    pub prot_last_col: RegField,
    pub shim_reset_off: u32,
    pub shim_reset: RegField,
}

/// Every descriptor of one tile type.
#[derive(Debug, Clone, Copy)]
pub struct TileModules {
    pub core: Option<CoreMod>,
    pub clock: ClockMod,
    pub column_clock: Option<ColumnClockMod>,
    pub tile_ctrl: TileCtrlMod,
    pub data_mem: Option<MemRegion>,
    pub program_mem: Option<MemRegion>,
    pub interleave: Option<InterleaveMod>,
    pub shim_reset: Option<ShimResetMod>,
    pub noc_aximm: Option<NocAxiMmMod>,
    pub l1_intr: Option<L1IntrMod>,
    pub l2_intr: Option<L2IntrMod>,
    pub core_perf: Option<PerfMod>,
    pub mem_perf: Option<PerfMod>,
    pub pl_perf: Option<PerfMod>,
}

/// Module of a tile addressed by perf-counter and event operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModuleType {
    Core,
    Mem,
    Pl,
}

impl std::fmt::Display for ModuleType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModuleType::Core => write!(f, "core"),
            ModuleType::Mem => write!(f, "memory"),
            ModuleType::Pl => write!(f, "pl"),
        }
    }
}

impl TileModules {
    pub fn perf(&self, module: ModuleType) -> Option<&PerfMod> {
        match module {
            ModuleType::Core => self.core_perf.as_ref(),
            ModuleType::Mem => self.mem_perf.as_ref(),
            ModuleType::Pl => self.pl_perf.as_ref(),
        }
    }
}

/// Event module that serves `module` on a tile of type `tile_type`.
pub fn event_module(tile_type: TileType, module: ModuleType) -> Option<EventModule> {
    match (tile_type, module) {
        (TileType::AieTile, ModuleType::Core) => Some(EventModule::Core),
        (TileType::AieTile, ModuleType::Mem) => Some(EventModule::Mem),
        (TileType::MemTile, ModuleType::Mem) => Some(EventModule::MemTile),
        (TileType::ShimNoc | TileType::ShimPl, ModuleType::Pl) => Some(EventModule::Pl),
        _ => None,
    }
}

/// Complete descriptor set of one generation.
#[derive(Debug)]
pub struct ModuleTable {
    pub aie_tile: TileModules,
    pub mem_tile: TileModules,
    pub shim_noc: TileModules,
    pub shim_pl: TileModules,
    pub npi: Option<NpiMod>,
    pub events: EventMap,
    /// L2 IRQ line that array errors are routed to
    pub l2_error_irq: u8,
}

impl ModuleTable {
    /// Descriptors of a tile type; `None` for [`TileType::Unknown`].
    pub fn tile(&self, tile_type: TileType) -> Option<&TileModules> {
        match tile_type {
            TileType::AieTile => Some(&self.aie_tile),
            TileType::MemTile => Some(&self.mem_tile),
            TileType::ShimNoc => Some(&self.shim_noc),
            TileType::ShimPl => Some(&self.shim_pl),
            TileType::Unknown => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_module_pairs() {
        assert_eq!(event_module(TileType::AieTile, ModuleType::Core), Some(EventModule::Core));
        assert_eq!(event_module(TileType::MemTile, ModuleType::Mem), Some(EventModule::MemTile));
        assert_eq!(event_module(TileType::ShimPl, ModuleType::Pl), Some(EventModule::Pl));
        assert_eq!(event_module(TileType::MemTile, ModuleType::Core), None);
        assert_eq!(event_module(TileType::Unknown, ModuleType::Pl), None);
    }

    #[test]
    fn test_mem_region_words() {
        assert_eq!(MemRegion { base: 0, size: 0x10000 }.words(), 0x4000);
    }
}
