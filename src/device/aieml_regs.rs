//! AIE-ML register descriptors.
//!
//! Offsets and bit layouts follow AMD AM025 (AIE-ML Register Reference) and
//! `xaiemlgbl_params.h`. The client NPU (`Aie2Ipu`) and AIE2P reuse the tile
//! layouts; the NPU has no NPI module because the platform firmware owns
//! partition protection and shim reset there.

use super::events::AIEML_EVENTS;
use super::modules::*;
use super::regfield::RegField;

// ============================================================================
// Core Module (compute tiles)
// AM025: CORE_MODULE
// ============================================================================

pub mod core_module {
    pub const CORE_CONTROL: u32 = 0x32000;
    pub const CORE_STATUS: u32 = 0x32004;
    pub const ENABLE_EVENTS: u32 = 0x32008;
    pub const CORE_RESET_EVENT: u32 = 0x3200C;
    pub const DEBUG_CONTROL0: u32 = 0x32010;
    pub const DEBUG_CONTROL1: u32 = 0x32014;
    pub const DEBUG_STATUS: u32 = 0x3201C;
    pub const ERROR_HALT_EVENT: u32 = 0x32034;
    pub const CORE_PROCESSOR_BUS: u32 = 0x32038;

    pub const CORE_PC: u32 = 0x31100;
    pub const CORE_SP: u32 = 0x31120;
    pub const CORE_LR: u32 = 0x31130;

    pub const PERFORMANCE_CONTROL0: u32 = 0x31500;
    pub const PERFORMANCE_CONTROL2: u32 = 0x31508;
    pub const PERFORMANCE_COUNTER0: u32 = 0x31520;
    pub const PERFORMANCE_COUNTER0_EVENT_VALUE: u32 = 0x31580;

    pub const TILE_CONTROL: u32 = 0x36030;
    /// Tile clock control; gates the tile above
    pub const TILE_CLOCK_CONTROL: u32 = 0x60000;
}

// ============================================================================
// Memory Module (compute tiles)
// AM025: MEMORY_MODULE
// ============================================================================

pub mod memory_module {
    pub const DATA_MEMORY_BASE: u32 = 0x00000;
    /// 64KB data memory
    pub const DATA_MEMORY_SIZE: u32 = 0x10000;
    pub const PROGRAM_MEMORY_BASE: u32 = 0x20000;
    /// 16KB program memory
    pub const PROGRAM_MEMORY_SIZE: u32 = 0x4000;

    pub const PERFORMANCE_CONTROL0: u32 = 0x11000;
    pub const PERFORMANCE_CONTROL1: u32 = 0x11008;
    pub const PERFORMANCE_COUNTER0: u32 = 0x11020;
    pub const PERFORMANCE_COUNTER0_EVENT_VALUE: u32 = 0x11080;
}

// ============================================================================
// Memory Tile Module
// AM025: MEMORY_TILE_MODULE
// ============================================================================

pub mod mem_tile_module {
    pub const DATA_MEMORY_BASE: u32 = 0x00000;
    /// 512KB data memory
    pub const DATA_MEMORY_SIZE: u32 = 0x80000;

    pub const PERFORMANCE_CONTROL0: u32 = 0x91000;
    pub const PERFORMANCE_CONTROL2: u32 = 0x91008;
    pub const PERFORMANCE_COUNTER0: u32 = 0x91020;
    pub const PERFORMANCE_COUNTER0_EVENT_VALUE: u32 = 0x91080;

    pub const TILE_CONTROL: u32 = 0x96030;
    pub const MEMORY_CONTROL: u32 = 0x96048;
    pub const TILE_CLOCK_CONTROL: u32 = 0xFFF00;
}

// ============================================================================
// Shim Tile (PL + NoC modules)
// AM025: PL_MODULE, NOC_MODULE
// ============================================================================

pub mod shim_module {
    pub const NOC_ME_AXIMM_CONFIG: u32 = 0x1E020;

    pub const L2_INTR_MASK: u32 = 0x15000;
    pub const L2_INTR_ENABLE: u32 = 0x15004;
    pub const L2_INTR_DISABLE: u32 = 0x15008;
    pub const L2_INTR_STATUS: u32 = 0x1500C;
    pub const L2_INTR_INTERRUPT: u32 = 0x15010;

    pub const PERFORMANCE_CONTROL0: u32 = 0x31000;
    pub const PERFORMANCE_CONTROL1: u32 = 0x31008;
    pub const PERFORMANCE_COUNTER0: u32 = 0x31020;
    pub const PERFORMANCE_COUNTER0_EVENT_VALUE: u32 = 0x31080;

    pub const L1_INTR_ENABLE_A: u32 = 0x35004;
    pub const L1_INTR_DISABLE_A: u32 = 0x35008;
    pub const L1_INTR_STATUS_A: u32 = 0x3500C;
    pub const L1_INTR_IRQ_NO_A: u32 = 0x35010;
    pub const L1_INTR_IRQ_EVENT_A: u32 = 0x35014;
    pub const L1_INTR_BLOCK_NORTH_IN_A_SET: u32 = 0x35018;
    pub const L1_INTR_BLOCK_NORTH_IN_A_CLEAR: u32 = 0x3501C;
    /// Switch B registers sit at this distance from switch A
    pub const L1_INTR_SWITCH_STRIDE: u32 = 0x30;

    pub const TILE_CONTROL: u32 = 0x36030;
    pub const SHIM_RESET_ENABLE: u32 = 0x3604C;

    pub const TILE_CLOCK_CONTROL: u32 = 0xFFF00;
    pub const COLUMN_CLOCK_CONTROL: u32 = 0xFFF20;
    pub const COLUMN_RESET_CONTROL: u32 = 0xFFF28;
}

// ============================================================================
// NPI (platform management)
// ============================================================================

pub mod npi {
    pub const NPI_BASE: u64 = 0xF70A_0000;
    pub const PROT_REG_CNTR: u32 = 0x200;
    pub const SHIM_RESET: u32 = 0x14;
}

/// Second-level IRQ line for array errors.
pub const L2_ERROR_IRQ: u8 = 1;

// ============================================================================
// Descriptor tables
// ============================================================================

const fn tile_ctrl(off: u32) -> TileCtrlMod {
    TileCtrlMod {
        off,
        isolate_south: RegField::bit(0),
        isolate_west: RegField::bit(1),
        isolate_north: RegField::bit(2),
        isolate_east: RegField::bit(3),
    }
}

const fn clock(off: u32) -> ClockMod {
    ClockMod { off, next_tile_clk: RegField::bit(1) }
}

const CORE: CoreMod = {
    use core_module::*;
    CoreMod {
        ctrl: CoreCtrlReg {
            off: CORE_CONTROL,
            enable: RegField::bit(0),
            reset: RegField::bit(1),
        },
        status: CoreStatusReg {
            off: CORE_STATUS,
            enable: RegField::bit(0),
            reset: RegField::bit(1),
            debug_halt: RegField::bit(16),
            error_halt: RegField::bit(19),
        },
        events: CoreEventReg {
            off: ENABLE_EVENTS,
            enable_event: RegField::bits(0, 7),
            disable_event: RegField::bits(8, 7),
            disable_event_occurred: RegField::bit(15),
            enable_event_occurred: RegField::bit(16),
        },
        debug: CoreDebugRegs {
            ctrl0_off: DEBUG_CONTROL0,
            halt: RegField::bit(0),
            ctrl1_off: DEBUG_CONTROL1,
            halt_event0: RegField::bits(0, 7),
            halt_event1: RegField::bits(8, 7),
            single_step_event: RegField::bits(16, 7),
            resume_event: RegField::bits(24, 7),
            status_off: DEBUG_STATUS,
        },
        error_halt_event: EventSelectReg { off: ERROR_HALT_EVENT, event: RegField::bits(0, 7) },
        reset_event: EventSelectReg { off: CORE_RESET_EVENT, event: RegField::bits(0, 7) },
        pc_off: CORE_PC,
        sp_off: CORE_SP,
        lr_off: CORE_LR,
        processor_bus_off: CORE_PROCESSOR_BUS,
        processor_bus_enable: RegField::bit(0),
    }
};

const AIE_TILE: TileModules = TileModules {
    core: Some(CORE),
    clock: clock(core_module::TILE_CLOCK_CONTROL),
    column_clock: None,
    tile_ctrl: tile_ctrl(core_module::TILE_CONTROL),
    data_mem: Some(MemRegion {
        base: memory_module::DATA_MEMORY_BASE,
        size: memory_module::DATA_MEMORY_SIZE,
    }),
    program_mem: Some(MemRegion {
        base: memory_module::PROGRAM_MEMORY_BASE,
        size: memory_module::PROGRAM_MEMORY_SIZE,
    }),
    interleave: None,
    shim_reset: None,
    noc_aximm: None,
    l1_intr: None,
    l2_intr: None,
    core_perf: Some(PerfMod {
        num_counters: 4,
        ctrl_off: core_module::PERFORMANCE_CONTROL0,
        reset_ctrl_off: core_module::PERFORMANCE_CONTROL2,
        counter_off: core_module::PERFORMANCE_COUNTER0,
        event_value_off: core_module::PERFORMANCE_COUNTER0_EVENT_VALUE,
        event_mask: 0x7F,
    }),
    mem_perf: Some(PerfMod {
        num_counters: 2,
        ctrl_off: memory_module::PERFORMANCE_CONTROL0,
        reset_ctrl_off: memory_module::PERFORMANCE_CONTROL1,
        counter_off: memory_module::PERFORMANCE_COUNTER0,
        event_value_off: memory_module::PERFORMANCE_COUNTER0_EVENT_VALUE,
        event_mask: 0x7F,
    }),
    pl_perf: None,
};

const MEM_TILE: TileModules = TileModules {
    core: None,
    clock: clock(mem_tile_module::TILE_CLOCK_CONTROL),
    column_clock: None,
    tile_ctrl: tile_ctrl(mem_tile_module::TILE_CONTROL),
    data_mem: Some(MemRegion {
        base: mem_tile_module::DATA_MEMORY_BASE,
        size: mem_tile_module::DATA_MEMORY_SIZE,
    }),
    program_mem: None,
    interleave: Some(InterleaveMod {
        off: mem_tile_module::MEMORY_CONTROL,
        enable: RegField::bit(1),
    }),
    shim_reset: None,
    noc_aximm: None,
    l1_intr: None,
    l2_intr: None,
    core_perf: None,
    mem_perf: Some(PerfMod {
        num_counters: 4,
        ctrl_off: mem_tile_module::PERFORMANCE_CONTROL0,
        reset_ctrl_off: mem_tile_module::PERFORMANCE_CONTROL2,
        counter_off: mem_tile_module::PERFORMANCE_COUNTER0,
        event_value_off: mem_tile_module::PERFORMANCE_COUNTER0_EVENT_VALUE,
        event_mask: 0xFF,
    }),
    pl_perf: None,
};

const L1_INTR: L1IntrMod = {
    use shim_module::*;
    L1IntrMod {
        switch_stride: L1_INTR_SWITCH_STRIDE,
        enable_off: L1_INTR_ENABLE_A,
        disable_off: L1_INTR_DISABLE_A,
        status_off: L1_INTR_STATUS_A,
        irq_no_off: L1_INTR_IRQ_NO_A,
        irq_no: RegField::bits(0, 4),
        irq_event_off: L1_INTR_IRQ_EVENT_A,
        irq_event: RegField::bits(0, 7),
        irq_event_stride: 8,
        num_irq_events: 4,
        num_irq_ids: 20,
        block_set_off: L1_INTR_BLOCK_NORTH_IN_A_SET,
        block_clear_off: L1_INTR_BLOCK_NORTH_IN_A_CLEAR,
        num_broadcast: 16,
    }
};

const SHIM_PL: TileModules = TileModules {
    core: None,
    clock: clock(shim_module::TILE_CLOCK_CONTROL),
    column_clock: Some(ColumnClockMod {
        off: shim_module::COLUMN_CLOCK_CONTROL,
        clock_buffer: RegField::bit(0),
    }),
    tile_ctrl: tile_ctrl(shim_module::TILE_CONTROL),
    data_mem: None,
    program_mem: None,
    interleave: None,
    shim_reset: Some(ShimResetMod {
        column_reset_off: shim_module::COLUMN_RESET_CONTROL,
        column_reset: RegField::bit(0),
        shim_reset_enable_off: shim_module::SHIM_RESET_ENABLE,
        shim_reset_enable: RegField::bit(0),
    }),
    noc_aximm: None,
    l1_intr: Some(L1_INTR),
    l2_intr: None,
    core_perf: None,
    mem_perf: None,
    pl_perf: Some(PerfMod {
        num_counters: 2,
        ctrl_off: shim_module::PERFORMANCE_CONTROL0,
        reset_ctrl_off: shim_module::PERFORMANCE_CONTROL1,
        counter_off: shim_module::PERFORMANCE_COUNTER0,
        event_value_off: shim_module::PERFORMANCE_COUNTER0_EVENT_VALUE,
        event_mask: 0x7F,
    }),
};

const SHIM_NOC: TileModules = TileModules {
    noc_aximm: Some(NocAxiMmMod {
        off: shim_module::NOC_ME_AXIMM_CONFIG,
        slverr_block: RegField::bit(1),
        decerr_block: RegField::bit(2),
    }),
    l2_intr: Some(L2IntrMod {
        mask_off: shim_module::L2_INTR_MASK,
        enable_off: shim_module::L2_INTR_ENABLE,
        disable_off: shim_module::L2_INTR_DISABLE,
        status_off: shim_module::L2_INTR_STATUS,
        irq_off: shim_module::L2_INTR_INTERRUPT,
        irq: RegField::bits(0, 2),
        num_channels: 16,
    }),
    ..SHIM_PL
};

const NPI: NpiMod = NpiMod {
    base_addr: npi::NPI_BASE,
    prot_reg_off: npi::PROT_REG_CNTR,
    prot_enable: RegField::bit(0),
    prot_first_col: RegField::bits(1, 7),
    prot_last_col: RegField::bits(8, 7),
    shim_reset_off: npi::SHIM_RESET,
    shim_reset: RegField::bit(1),
};

/// AIE-ML (and AIE2P) table.
pub static AIEML_MODULES: ModuleTable = ModuleTable {
    aie_tile: AIE_TILE,
    mem_tile: MEM_TILE,
    shim_noc: SHIM_NOC,
    shim_pl: SHIM_PL,
    npi: Some(NPI),
    events: AIEML_EVENTS,
    l2_error_irq: L2_ERROR_IRQ,
};

/// Client NPU table: AIE-ML tiles, no NPI.
pub static AIE2IPU_MODULES: ModuleTable = ModuleTable {
    aie_tile: AIE_TILE,
    mem_tile: MEM_TILE,
    shim_noc: SHIM_NOC,
    shim_pl: SHIM_PL,
    npi: None,
    events: AIEML_EVENTS,
    l2_error_irq: L2_ERROR_IRQ,
};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::TileType;

    #[test]
    fn test_event_tables_match() {
        assert_eq!(AIEML_MODULES.events.codes.len(), AIEML_EVENTS.codes.len());
    }

    #[test]
    fn test_only_aie_tiles_have_cores() {
        for table in [&AIEML_MODULES, &AIE2IPU_MODULES] {
            assert!(table.tile(TileType::AieTile).unwrap().core.is_some());
            assert!(table.tile(TileType::MemTile).unwrap().core.is_none());
            assert!(table.tile(TileType::ShimNoc).unwrap().core.is_none());
            assert!(table.tile(TileType::Unknown).is_none());
        }
    }

    #[test]
    fn test_l2_only_on_noc_shims() {
        assert!(AIEML_MODULES.shim_noc.l2_intr.is_some());
        assert!(AIEML_MODULES.shim_noc.noc_aximm.is_some());
        assert!(AIEML_MODULES.shim_pl.l2_intr.is_none());
        assert!(AIEML_MODULES.shim_pl.l1_intr.is_some());
    }

    #[test]
    fn test_column_clock_only_on_shims() {
        assert!(AIEML_MODULES.shim_pl.column_clock.is_some());
        assert!(AIEML_MODULES.shim_noc.column_clock.is_some());
        assert!(AIEML_MODULES.aie_tile.column_clock.is_none());
        assert!(AIEML_MODULES.mem_tile.column_clock.is_none());
    }

    #[test]
    fn test_npi_presence() {
        assert!(AIEML_MODULES.npi.is_some());
        assert!(AIE2IPU_MODULES.npi.is_none());
    }

    #[test]
    fn test_core_fields_do_not_overlap() {
        let ev = CORE.events;
        let fields = [ev.enable_event, ev.disable_event, ev.disable_event_occurred, ev.enable_event_occurred];
        for (i, a) in fields.iter().enumerate() {
            for b in &fields[i + 1..] {
                assert_eq!(a.mask & b.mask, 0);
            }
        }
    }
}
