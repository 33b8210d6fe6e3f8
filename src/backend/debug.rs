//! Log-only backend.
//!
//! Every operation is reported at `info` level and otherwise discarded.
//! Useful for dry runs: `RUST_LOG=info aie-ctl init` prints the exact
//! register sequence without touching hardware.

use std::any::Any;

use super::{Backend, BackendKind, BackendOptions, PollMode};
use crate::error::Result;

#[derive(Debug, Default)]
pub struct DebugBackend {
    ops: u64,
}

impl DebugBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Operations seen so far.
    pub fn op_count(&self) -> u64 {
        self.ops
    }
}

impl Backend for DebugBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Debug
    }

    fn init(&mut self, opts: &BackendOptions) -> Result<()> {
        log::info!(
            "debug backend: {} with {} columns x {} rows at 0x{:X}",
            opts.generation,
            opts.num_cols,
            opts.num_rows,
            opts.base_addr
        );
        Ok(())
    }

    fn read32(&mut self, addr: u64) -> Result<u32> {
        self.ops += 1;
        log::info!("R  0x{:016X}", addr);
        Ok(0)
    }

    fn write32(&mut self, addr: u64, value: u32) -> Result<()> {
        self.ops += 1;
        log::info!("W  0x{:016X} = 0x{:08X}", addr, value);
        Ok(())
    }

    fn mask_write32(&mut self, addr: u64, mask: u32, value: u32) -> Result<()> {
        self.ops += 1;
        log::info!("MW 0x{:016X} = 0x{:08X} mask 0x{:08X}", addr, value, mask);
        Ok(())
    }

    fn mask_poll(&mut self, addr: u64, mask: u32, expected: u32, timeout_us: u32, mode: PollMode) -> Result<()> {
        self.ops += 1;
        log::info!(
            "MP 0x{:016X} & 0x{:08X} == 0x{:08X} ({} us, {})",
            addr,
            mask,
            expected,
            timeout_us,
            mode
        );
        Ok(())
    }

    fn block_set32(&mut self, addr: u64, value: u32, count: u32) -> Result<()> {
        self.ops += 1;
        log::info!("BS 0x{:016X} = 0x{:08X} x{}", addr, value, count);
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
