//! Partition initialization and teardown.
//!
//! Both lifecycles run an ordered list of [`PartitionStep`]s between
//! enabling and disabling protected-register access. The first failing step
//! stops the sequence; protection is disabled and the step's error returned.
//! Steps that already ran are not undone, so a failed init leaves the
//! partition in whatever state the last successful step produced.

use std::fmt;

use bitflags::bitflags;

use crate::device::{ColumnClockRule, DeviceInstance, TileLoc, TileType};
use crate::error::{Error, Result};

bitflags! {
    /// Optional steps of [`DeviceInstance::init_part`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct InitFlags: u32 {
        const COLUMN_RESET = 1 << 0;
        const SHIM_RESET = 1 << 1;
        /// Turn NoC AXI-MM slave/decode errors into events instead of faults
        const BLOCK_NOC_AXIMM_ERR = 1 << 2;
        const ISOLATE = 1 << 3;
        const ZEROIZE_MEM = 1 << 4;
        const DISABLE_MEM_INTERLEAVE = 1 << 5;
    }
}

impl Default for InitFlags {
    fn default() -> Self {
        InitFlags::all()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InitOptions {
    pub flags: InitFlags,
    /// Tiles to leave ungated after init; `None` requests nothing and an
    /// empty list requests the whole partition.
    pub use_tiles: Option<Vec<TileLoc>>,
}

impl InitOptions {
    pub fn new(flags: InitFlags) -> Self {
        Self { flags, use_tiles: None }
    }

    pub fn with_tiles(mut self, tiles: Vec<TileLoc>) -> Self {
        self.use_tiles = Some(tiles);
        self
    }
}

/// One step of a partition lifecycle sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionStep {
    GateClocks,
    AssertColumnReset,
    UngateClocks,
    DeassertColumnReset,
    ShimReset,
    BlockAxiMmErrors,
    ColumnClock,
    Isolation,
    ZeroizeMemory,
    DisableMemInterleave,
    EnableMemInterleave,
    L2ErrorIrq,
    RegateClocks,
    RequestTiles,
}

impl fmt::Display for PartitionStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PartitionStep::GateClocks => "gate clocks",
            PartitionStep::AssertColumnReset => "assert column reset",
            PartitionStep::UngateClocks => "ungate clocks",
            PartitionStep::DeassertColumnReset => "deassert column reset",
            PartitionStep::ShimReset => "shim reset",
            PartitionStep::BlockAxiMmErrors => "block NoC AXI-MM errors",
            PartitionStep::ColumnClock => "column clock",
            PartitionStep::Isolation => "isolation",
            PartitionStep::ZeroizeMemory => "zeroize memory",
            PartitionStep::DisableMemInterleave => "disable memory interleaving",
            PartitionStep::EnableMemInterleave => "enable memory interleaving",
            PartitionStep::L2ErrorIrq => "L2 error IRQ",
            PartitionStep::RegateClocks => "regate clocks",
            PartitionStep::RequestTiles => "request tiles",
        };
        write!(f, "{}", name)
    }
}

const TEARDOWN_STEPS: [PartitionStep; 9] = [
    PartitionStep::GateClocks,
    PartitionStep::AssertColumnReset,
    PartitionStep::UngateClocks,
    PartitionStep::DeassertColumnReset,
    PartitionStep::ShimReset,
    PartitionStep::ColumnClock,
    PartitionStep::ZeroizeMemory,
    PartitionStep::EnableMemInterleave,
    PartitionStep::GateClocks,
];

impl DeviceInstance {
    /// Steps `init_part` runs for `opts`, in order.
    pub fn init_plan(&self, opts: &InitOptions) -> Vec<PartitionStep> {
        use PartitionStep::*;

        let flags = opts.flags;
        let mut steps = Vec::new();
        if flags.contains(InitFlags::COLUMN_RESET) {
            steps.extend([GateClocks, AssertColumnReset, UngateClocks, DeassertColumnReset]);
        }
        if flags.contains(InitFlags::SHIM_RESET) {
            steps.push(ShimReset);
        }
        if flags.contains(InitFlags::BLOCK_NOC_AXIMM_ERR) {
            steps.push(BlockAxiMmErrors);
        }
        steps.push(ColumnClock);
        if flags.contains(InitFlags::ISOLATE) {
            steps.push(Isolation);
        }
        if flags.contains(InitFlags::ZEROIZE_MEM) {
            steps.push(ZeroizeMemory);
        }
        if flags.contains(InitFlags::DISABLE_MEM_INTERLEAVE) {
            steps.push(DisableMemInterleave);
        }
        steps.push(L2ErrorIrq);
        if self.generation().regate_after_init() {
            steps.push(RegateClocks);
        }
        if opts.use_tiles.is_some() {
            steps.push(RequestTiles);
        }
        steps
    }

    pub fn teardown_plan(&self) -> Vec<PartitionStep> {
        TEARDOWN_STEPS.to_vec()
    }

    /// Bring the partition from an unknown state into a configured one.
    ///
    /// `None` runs every optional step and requests no tiles.
    pub fn init_part(&mut self, opts: Option<&InitOptions>) -> Result<()> {
        let default = InitOptions::default();
        let opts = opts.unwrap_or(&default);
        let steps = self.init_plan(opts);
        log::info!("initializing partition: {} steps", steps.len());
        self.run_protected(&steps, opts.use_tiles.as_deref().unwrap_or(&[]))
    }

    /// Reset, clear and gate the whole partition.
    pub fn teardown_part(&mut self) -> Result<()> {
        log::info!("tearing down partition");
        self.run_protected(&TEARDOWN_STEPS, &[])
    }

    fn run_protected(&mut self, steps: &[PartitionStep], use_tiles: &[TileLoc]) -> Result<()> {
        self.set_protected_regs(true)?;
        for step in steps {
            log::debug!("partition step: {}", step);
            if let Err(e) = self.run_step(*step, use_tiles) {
                log::error!("partition step '{}' failed: {}", step, e);
                if let Err(disable_err) = self.set_protected_regs(false) {
                    log::warn!("could not disable protected registers: {}", disable_err);
                }
                return Err(e);
            }
        }
        self.set_protected_regs(false)
    }

    fn run_step(&mut self, step: PartitionStep, use_tiles: &[TileLoc]) -> Result<()> {
        match step {
            PartitionStep::GateClocks | PartitionStep::RegateClocks => self.set_partition_clock(false),
            PartitionStep::UngateClocks => self.set_partition_clock(true),
            PartitionStep::AssertColumnReset => self.set_column_reset(true),
            PartitionStep::DeassertColumnReset => self.set_column_reset(false),
            PartitionStep::ShimReset => self.reset_shims(),
            PartitionStep::BlockAxiMmErrors => self.block_noc_aximm_errors(),
            PartitionStep::ColumnClock => match self.generation().column_clock_rule() {
                ColumnClockRule::UngatePartition => self.set_partition_clock(true),
                ColumnClockRule::ColumnBuffers => self.set_column_clk(0, self.num_cols(), true),
            },
            PartitionStep::Isolation => self.isolate_partition(),
            PartitionStep::ZeroizeMemory => self.zeroize_memory(),
            PartitionStep::DisableMemInterleave => self.set_mem_interleave(false),
            PartitionStep::EnableMemInterleave => self.set_mem_interleave(true),
            PartitionStep::L2ErrorIrq => self.error_irq_init(),
            PartitionStep::RequestTiles => self.request_tiles(use_tiles),
        }
    }

    /// Open (`true`) or close the protected-register window for this
    /// partition's columns.
    ///
    /// Generations without an NPI module leave protection to the platform
    /// firmware; this is then a no-op.
    pub fn set_protected_regs(&mut self, enable: bool) -> Result<()> {
        let Some(npi) = self.modules().npi else {
            log::debug!("{}: no NPI module, protected registers left to firmware", self.generation());
            return Ok(());
        };
        let value = if enable {
            let first = self.config().start_col as u32;
            let last = first + self.num_cols() as u32 - 1;
            npi.prot_enable.flag(true) | npi.prot_first_col.encode(first)? | npi.prot_last_col.encode(last)?
        } else {
            0
        };
        self.write32(npi.base_addr + npi.prot_reg_off as u64, value)
    }

    fn shim_locs(&self) -> Vec<TileLoc> {
        let row = self.config().shim_row;
        (0..self.num_cols()).map(|col| TileLoc::new(col, row)).collect()
    }

    fn set_column_reset(&mut self, assert: bool) -> Result<()> {
        for shim in self.shim_locs() {
            let (_, mods) = self.tile_modules(shim, &[TileType::ShimNoc, TileType::ShimPl])?;
            let reset = mods.shim_reset.ok_or(Error::FeatureNotSupported("column reset"))?;
            self.mask_write32(
                self.reg_addr(shim, reset.column_reset_off),
                reset.column_reset.mask,
                reset.column_reset.flag(assert),
            )?;
        }
        Ok(())
    }

    /// Pulse the global shim reset with every column of the partition
    /// selected.
    fn reset_shims(&mut self) -> Result<()> {
        let Some(npi) = self.modules().npi else {
            log::debug!("{}: no NPI module, shim reset left to firmware", self.generation());
            return Ok(());
        };
        let npi_addr = npi.base_addr + npi.shim_reset_off as u64;

        self.select_shim_reset(true)?;
        self.mask_write32(npi_addr, npi.shim_reset.mask, npi.shim_reset.flag(true))?;
        self.mask_write32(npi_addr, npi.shim_reset.mask, 0)?;
        self.select_shim_reset(false)
    }

    fn select_shim_reset(&mut self, enable: bool) -> Result<()> {
        for shim in self.shim_locs() {
            let (_, mods) = self.tile_modules(shim, &[TileType::ShimNoc, TileType::ShimPl])?;
            let reset = mods.shim_reset.ok_or(Error::FeatureNotSupported("shim reset"))?;
            self.mask_write32(
                self.reg_addr(shim, reset.shim_reset_enable_off),
                reset.shim_reset_enable.mask,
                reset.shim_reset_enable.flag(enable),
            )?;
        }
        Ok(())
    }

    fn block_noc_aximm_errors(&mut self) -> Result<()> {
        for shim in self.shim_locs() {
            if self.tile_type(shim) != TileType::ShimNoc {
                continue;
            }
            let (_, mods) = self.tile_modules(shim, &[TileType::ShimNoc])?;
            let aximm = mods.noc_aximm.ok_or(Error::FeatureNotSupported("NoC AXI-MM config"))?;
            let mask = aximm.slverr_block.mask | aximm.decerr_block.mask;
            self.mask_write32(self.reg_addr(shim, aximm.off), mask, mask)?;
        }
        Ok(())
    }

    /// Isolate the west edge of the first column and the east edge of the
    /// last; interior columns are cleared.
    fn isolate_partition(&mut self) -> Result<()> {
        let last_col = self.num_cols() - 1;
        let locs: Vec<TileLoc> = self.config().locations().collect();
        for loc in locs {
            let (_, mods) = self.tile_modules(loc, &[])?;
            let ctrl = mods.tile_ctrl;
            let mut value = 0;
            if loc.col == 0 {
                value |= ctrl.isolate_west.flag(true);
            }
            if loc.col == last_col {
                value |= ctrl.isolate_east.flag(true);
            }
            self.write32(self.reg_addr(loc, ctrl.off), value)?;
        }
        Ok(())
    }

    fn zeroize_memory(&mut self) -> Result<()> {
        let locs: Vec<TileLoc> = self.config().locations().collect();
        for loc in locs {
            let (_, mods) = self.tile_modules(loc, &[])?;
            for region in [mods.program_mem, mods.data_mem].into_iter().flatten() {
                self.block_set32(self.reg_addr(loc, region.base), 0, region.words())?;
            }
        }
        Ok(())
    }

    fn set_mem_interleave(&mut self, enable: bool) -> Result<()> {
        let locs: Vec<TileLoc> = self
            .config()
            .locations()
            .filter(|loc| self.tile_type(*loc) == TileType::MemTile)
            .collect();
        for loc in locs {
            let (_, mods) = self.tile_modules(loc, &[TileType::MemTile])?;
            let interleave = mods.interleave.ok_or(Error::FeatureNotSupported("memory interleaving"))?;
            self.mask_write32(
                self.reg_addr(loc, interleave.off),
                interleave.enable.mask,
                interleave.enable.flag(enable),
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::any::Any;

    use super::*;
    use crate::backend::sim::{RegOp, SimBackend};
    use crate::backend::{Backend, BackendKind};
    use crate::device::aieml_regs::{mem_tile_module, npi, shim_module};
    use crate::device::{DeviceConfig, DeviceGeneration};

    const PROT_REG: u64 = npi::NPI_BASE + npi::PROT_REG_CNTR as u64;

    /// Simulator that fails every write to one address.
    #[derive(Debug)]
    struct FailingBackend {
        sim: SimBackend,
        fail_addr: u64,
    }

    impl Backend for FailingBackend {
        fn kind(&self) -> BackendKind {
            BackendKind::Sim
        }

        fn read32(&mut self, addr: u64) -> Result<u32> {
            self.sim.read32(addr)
        }

        fn write32(&mut self, addr: u64, value: u32) -> Result<()> {
            if addr == self.fail_addr {
                return Err(Error::Backend(format!("write to 0x{:X} rejected", addr)));
            }
            self.sim.write32(addr, value)
        }

        fn as_any(&self) -> &dyn Any {
            self
        }

        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }
    }

    fn device(generation: DeviceGeneration, num_cols: u8) -> DeviceInstance {
        let config = DeviceConfig::new(generation, 0, num_cols);
        DeviceInstance::with_backend(config, Box::new(SimBackend::new())).unwrap()
    }

    fn sim(dev: &mut DeviceInstance) -> &mut SimBackend {
        dev.backend_as_mut::<SimBackend>().unwrap()
    }

    #[test]
    fn test_full_plan_order() {
        use PartitionStep::*;
        let dev = device(DeviceGeneration::AieMl, 4);
        let opts = InitOptions::default().with_tiles(vec![TileLoc::new(0, 3)]);
        assert_eq!(
            dev.init_plan(&opts),
            vec![
                GateClocks,
                AssertColumnReset,
                UngateClocks,
                DeassertColumnReset,
                ShimReset,
                BlockAxiMmErrors,
                ColumnClock,
                Isolation,
                ZeroizeMemory,
                DisableMemInterleave,
                L2ErrorIrq,
                RegateClocks,
                RequestTiles,
            ]
        );
    }

    #[test]
    fn test_minimal_plan() {
        use PartitionStep::*;
        let ipu = device(DeviceGeneration::Aie2Ipu, 4);
        let opts = InitOptions::new(InitFlags::empty());
        assert_eq!(ipu.init_plan(&opts), vec![ColumnClock, L2ErrorIrq, RegateClocks]);
        let aie2p = device(DeviceGeneration::Aie2P, 4);
        assert_eq!(aie2p.init_plan(&opts), vec![ColumnClock, L2ErrorIrq]);
    }

    #[test]
    fn test_init_without_flags_still_routes_error_irq() {
        let mut dev = device(DeviceGeneration::Aie2Ipu, 4);
        dev.init_part(Some(&InitOptions::new(InitFlags::empty()))).unwrap();
        for col in 0..4 {
            let irq = dev.reg_addr(TileLoc::new(col, 0), shim_module::L2_INTR_INTERRUPT);
            assert_eq!(sim(&mut dev).value(irq), 1);
        }
        assert_eq!(dev.tiles_in_use().count_ones(), 0);
    }

    #[test]
    fn test_default_init_brackets_protection() {
        let mut dev = device(DeviceGeneration::AieMl, 4);
        dev.init_part(None).unwrap();

        let prot_writes: Vec<u32> = sim(&mut dev)
            .ops()
            .iter()
            .filter_map(|op| match op {
                RegOp::Write { addr, value } if *addr == PROT_REG => Some(*value),
                _ => None,
            })
            .collect();
        // Enable with columns 0..=3, then disable.
        assert_eq!(prot_writes, vec![1 | (3 << 8), 0]);
        assert_eq!(sim(&mut dev).ops().last(), Some(&RegOp::Write { addr: PROT_REG, value: 0 }));
        // Regated, nothing requested.
        assert_eq!(dev.tiles_in_use().count_ones(), 0);
    }

    #[test]
    fn test_init_requests_use_tiles() {
        let mut dev = device(DeviceGeneration::AieMl, 2);
        let opts = InitOptions::default().with_tiles(vec![TileLoc::new(1, 3)]);
        dev.init_part(Some(&opts)).unwrap();
        let in_use: Vec<TileLoc> = (0..dev.num_rows())
            .map(|row| TileLoc::new(1, row))
            .filter(|loc| dev.is_tile_in_use(*loc))
            .collect();
        assert_eq!(in_use.len(), 4);
        assert!(!dev.is_tile_in_use(TileLoc::new(0, 0)));
    }

    #[test]
    fn test_aie2p_keeps_column_buffers_on() {
        let mut dev = device(DeviceGeneration::Aie2P, 2);
        dev.init_part(Some(&InitOptions::new(InitFlags::empty()))).unwrap();
        assert_eq!(dev.tiles_in_use().count_ones(), dev.tiles_in_use().len());
        let buffer = dev.reg_addr(TileLoc::new(1, 0), shim_module::COLUMN_CLOCK_CONTROL);
        assert_eq!(sim(&mut dev).value(buffer), 1);
    }

    #[test]
    fn test_failure_disables_protection_without_rollback() {
        let config = DeviceConfig::new(DeviceGeneration::AieMl, 0, 4);
        let fail_addr = config.tile_addr(TileLoc::new(2, 0)) + shim_module::COLUMN_RESET_CONTROL as u64;
        let backend = FailingBackend { sim: SimBackend::new(), fail_addr };
        let mut dev = DeviceInstance::with_backend(config, Box::new(backend)).unwrap();

        let err = dev.init_part(None).unwrap_err();
        assert!(matches!(err, Error::Backend(_)));

        let sim = &dev.backend_as::<FailingBackend>().unwrap().sim;
        assert_eq!(sim.ops().last(), Some(&RegOp::Write { addr: PROT_REG, value: 0 }));
        // Columns reset before the failure stay in reset.
        let col0_reset = dev.reg_addr(TileLoc::new(0, 0), shim_module::COLUMN_RESET_CONTROL);
        assert_eq!(sim.value(col0_reset), 1);
        // Nothing after the failing step ran.
        let irq = dev.reg_addr(TileLoc::new(2, 0), shim_module::L2_INTR_INTERRUPT);
        assert_eq!(sim.value(irq), 0);
    }

    #[test]
    fn test_npu_skips_npi_registers() {
        let mut dev = device(DeviceGeneration::Aie2Ipu, 4);
        dev.init_part(None).unwrap();
        let npi_touched = sim(&mut dev).ops().iter().any(|op| op.addr() >= npi::NPI_BASE);
        assert!(!npi_touched);
    }

    #[test]
    fn test_isolation_edges() {
        let mut dev = device(DeviceGeneration::Aie2Ipu, 3);
        dev.init_part(Some(&InitOptions::new(InitFlags::ISOLATE))).unwrap();
        let ctrl = |dev: &DeviceInstance, col| dev.reg_addr(TileLoc::new(col, 0), shim_module::TILE_CONTROL);
        let (west, mid, east) = (ctrl(&dev, 0), ctrl(&dev, 1), ctrl(&dev, 2));
        let sim = sim(&mut dev);
        assert_eq!(sim.value(west), 0b0010);
        assert_eq!(sim.value(mid), 0);
        assert_eq!(sim.value(east), 0b1000);

        let mut single = device(DeviceGeneration::Aie2Ipu, 1);
        single.init_part(Some(&InitOptions::new(InitFlags::ISOLATE))).unwrap();
        let addr = ctrl(&single, 0);
        assert_eq!(sim_value(&mut single, addr), 0b1010);
    }

    fn sim_value(dev: &mut DeviceInstance, addr: u64) -> u32 {
        sim(dev).value(addr)
    }

    #[test]
    fn test_zeroize_fills_every_memory() {
        let mut dev = device(DeviceGeneration::Aie2Ipu, 1);
        dev.init_part(Some(&InitOptions::new(InitFlags::ZEROIZE_MEM))).unwrap();
        let fills: Vec<(u64, u32)> = sim(&mut dev)
            .ops()
            .iter()
            .filter_map(|op| match op {
                RegOp::BlockSet { addr, count, .. } => Some((*addr, *count)),
                _ => None,
            })
            .collect();
        // 1 memory tile + 4 compute tiles (program + data each)
        assert_eq!(fills.len(), 9);
        assert!(fills.contains(&(dev.reg_addr(TileLoc::new(0, 1), 0), 0x20000)));
        assert!(fills.contains(&(dev.reg_addr(TileLoc::new(0, 2), 0x20000), 0x1000)));
    }

    #[test]
    fn test_teardown_sequence() {
        let mut dev = device(DeviceGeneration::AieMl, 2);
        dev.init_part(None).unwrap();
        dev.request_tiles(&[]).unwrap();
        dev.teardown_part().unwrap();

        assert_eq!(dev.teardown_plan().first(), Some(&PartitionStep::GateClocks));
        assert_eq!(dev.tiles_in_use().count_ones(), 0);
        let interleave = dev.reg_addr(TileLoc::new(0, 1), mem_tile_module::MEMORY_CONTROL);
        let reset = dev.reg_addr(TileLoc::new(1, 0), shim_module::COLUMN_RESET_CONTROL);
        let sim = sim(&mut dev);
        assert_eq!(sim.value(interleave), 0b10);
        assert_eq!(sim.value(reset), 0);
        assert_eq!(sim.ops().last(), Some(&RegOp::Write { addr: PROT_REG, value: 0 }));
    }
}
