//! Compute tile core control.
//!
//! ```text
//!             unreset              enable
//!   Reset ------------> Disabled ----------> Enabled
//!     ^                    ^                  |   ^
//!     | reset (any state)  | disable          |   | debug unhalt
//!                          |                  v   |
//!                          +------ Done    DebugHalted
//!                     (disable event fired)
//! ```
//!
//! `Done` is observed through the write-1-to-clear "disable event occurred"
//! bit of the enable-events register; enabling a core clears both occurred
//! bits first so a stale `Done` is never reported for a fresh run.

use std::fmt;

use crate::backend::PollMode;
use crate::device::events::{Event, EventModule};
use crate::device::modules::CoreMod;
use crate::device::{DeviceInstance, TileLoc, TileType};
use crate::error::{Error, Result};

/// Timeout used when a wait is given `0`.
pub const DEFAULT_CORE_TIMEOUT_US: u32 = 500;

/// Decoded execution state of a core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoreState {
    Reset,
    Disabled,
    Enabled,
    Done,
    DebugHalted,
}

impl fmt::Display for CoreState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CoreState::Reset => "reset",
            CoreState::Disabled => "disabled",
            CoreState::Enabled => "enabled",
            CoreState::Done => "done",
            CoreState::DebugHalted => "debug-halted",
        };
        write!(f, "{}", name)
    }
}

fn effective_timeout(timeout_us: u32) -> u32 {
    if timeout_us == 0 {
        DEFAULT_CORE_TIMEOUT_US
    } else {
        timeout_us
    }
}

impl DeviceInstance {
    fn core_mod(&self, loc: TileLoc) -> Result<&'static CoreMod> {
        let (_, mods) = self.tile_modules(loc, &[TileType::AieTile])?;
        mods.core.as_ref().ok_or(Error::FeatureNotSupported("core module"))
    }

    fn core_event(&self, event: Event) -> Result<u32> {
        self.modules().events.physical(EventModule::Core, event).map(u32::from)
    }

    /// Clear both event-occurred bits, then set the enable bit.
    pub fn core_enable(&mut self, loc: TileLoc) -> Result<()> {
        let core = self.core_mod(loc)?;
        let events = core.events;
        let occurred = events.disable_event_occurred.mask | events.enable_event_occurred.mask;
        self.mask_write32(self.reg_addr(loc, events.off), occurred, occurred)?;
        self.mask_write32(
            self.reg_addr(loc, core.ctrl.off),
            core.ctrl.enable.mask,
            core.ctrl.enable.flag(true),
        )
    }

    pub fn core_disable(&mut self, loc: TileLoc) -> Result<()> {
        let core = self.core_mod(loc)?;
        self.mask_write32(self.reg_addr(loc, core.ctrl.off), core.ctrl.enable.mask, 0)
    }

    /// Assert the core reset. The core stays in reset until [`Self::core_unreset`].
    pub fn core_reset(&mut self, loc: TileLoc) -> Result<()> {
        let core = self.core_mod(loc)?;
        self.mask_write32(
            self.reg_addr(loc, core.ctrl.off),
            core.ctrl.reset.mask,
            core.ctrl.reset.flag(true),
        )
    }

    pub fn core_unreset(&mut self, loc: TileLoc) -> Result<()> {
        let core = self.core_mod(loc)?;
        self.mask_write32(self.reg_addr(loc, core.ctrl.off), core.ctrl.reset.mask, 0)
    }

    pub fn core_debug_halt(&mut self, loc: TileLoc) -> Result<()> {
        let core = self.core_mod(loc)?;
        let halt = core.debug.halt;
        self.mask_write32(self.reg_addr(loc, core.debug.ctrl0_off), halt.mask, halt.flag(true))
    }

    pub fn core_debug_unhalt(&mut self, loc: TileLoc) -> Result<()> {
        let core = self.core_mod(loc)?;
        self.mask_write32(self.reg_addr(loc, core.debug.ctrl0_off), core.debug.halt.mask, 0)
    }

    /// Raw `Core_Status` word.
    pub fn core_status(&mut self, loc: TileLoc) -> Result<u32> {
        let core = self.core_mod(loc)?;
        self.read32(self.reg_addr(loc, core.status.off))
    }

    pub fn core_read_pc(&mut self, loc: TileLoc) -> Result<u32> {
        let core = self.core_mod(loc)?;
        self.read32(self.reg_addr(loc, core.pc_off))
    }

    pub fn core_read_sp(&mut self, loc: TileLoc) -> Result<u32> {
        let core = self.core_mod(loc)?;
        self.read32(self.reg_addr(loc, core.sp_off))
    }

    pub fn core_read_lr(&mut self, loc: TileLoc) -> Result<u32> {
        let core = self.core_mod(loc)?;
        self.read32(self.reg_addr(loc, core.lr_off))
    }

    /// Raw `Debug_Status` word.
    pub fn core_debug_halt_status(&mut self, loc: TileLoc) -> Result<u32> {
        let core = self.core_mod(loc)?;
        self.read32(self.reg_addr(loc, core.debug.status_off))
    }

    /// Whether the core's disable event has fired since it was enabled.
    pub fn core_read_done_bit(&mut self, loc: TileLoc) -> Result<bool> {
        let core = self.core_mod(loc)?;
        let word = self.read32(self.reg_addr(loc, core.events.off))?;
        Ok(core.events.disable_event_occurred.is_set(word))
    }

    /// Decode the core state from status and enable-events registers.
    ///
    /// Reset wins over everything, then debug halt. A disabled core whose
    /// disable event fired is `Done`.
    pub fn core_state(&mut self, loc: TileLoc) -> Result<CoreState> {
        let core = self.core_mod(loc)?;
        let status = self.read32(self.reg_addr(loc, core.status.off))?;
        if core.status.reset.is_set(status) {
            return Ok(CoreState::Reset);
        }
        if core.status.debug_halt.is_set(status) {
            return Ok(CoreState::DebugHalted);
        }
        if core.status.enable.is_set(status) {
            return Ok(CoreState::Enabled);
        }
        let events = self.read32(self.reg_addr(loc, core.events.off))?;
        if core.events.disable_event_occurred.is_set(events) {
            Ok(CoreState::Done)
        } else {
            Ok(CoreState::Disabled)
        }
    }

    /// Wait for the disable-event-occurred bit. `timeout_us == 0` uses
    /// [`DEFAULT_CORE_TIMEOUT_US`].
    pub fn core_wait_for_done(&mut self, loc: TileLoc, timeout_us: u32, mode: PollMode) -> Result<()> {
        let core = self.core_mod(loc)?;
        let mask = core.events.disable_event_occurred.mask;
        self.mask_poll(self.reg_addr(loc, core.events.off), mask, mask, effective_timeout(timeout_us), mode)
    }

    /// Wait for the status enable bit to clear. `timeout_us == 0` uses
    /// [`DEFAULT_CORE_TIMEOUT_US`].
    pub fn core_wait_for_disable(&mut self, loc: TileLoc, timeout_us: u32, mode: PollMode) -> Result<()> {
        let core = self.core_mod(loc)?;
        let mask = core.status.enable.mask;
        self.mask_poll(self.reg_addr(loc, core.status.off), mask, 0, effective_timeout(timeout_us), mode)
    }

    pub fn core_wait_for_done_busy(&mut self, loc: TileLoc, timeout_us: u32) -> Result<()> {
        self.core_wait_for_done(loc, timeout_us, PollMode::Busy)
    }

    pub fn core_wait_for_disable_busy(&mut self, loc: TileLoc, timeout_us: u32) -> Result<()> {
        self.core_wait_for_disable(loc, timeout_us, PollMode::Busy)
    }

    /// Program the halt, single-step and resume events of `Debug_Control1`.
    pub fn core_configure_debug_control1(
        &mut self,
        loc: TileLoc,
        halt0: Event,
        halt1: Event,
        single_step: Event,
        resume: Event,
    ) -> Result<()> {
        let core = self.core_mod(loc)?;
        let dbg = core.debug;
        let value = dbg.halt_event0.encode(self.core_event(halt0)?)?
            | dbg.halt_event1.encode(self.core_event(halt1)?)?
            | dbg.single_step_event.encode(self.core_event(single_step)?)?
            | dbg.resume_event.encode(self.core_event(resume)?)?;
        self.write32(self.reg_addr(loc, dbg.ctrl1_off), value)
    }

    /// Select the events that enable and disable the core.
    pub fn core_configure_enable_event(&mut self, loc: TileLoc, enable: Event, disable: Event) -> Result<()> {
        let core = self.core_mod(loc)?;
        let events = core.events;
        let value = events.enable_event.encode(self.core_event(enable)?)?
            | events.disable_event.encode(self.core_event(disable)?)?;
        let mask = events.enable_event.mask | events.disable_event.mask;
        self.mask_write32(self.reg_addr(loc, events.off), mask, value)
    }

    pub fn core_configure_error_halt_event(&mut self, loc: TileLoc, event: Event) -> Result<()> {
        let core = self.core_mod(loc)?;
        let value = core.error_halt_event.event.encode(self.core_event(event)?)?;
        self.write32(self.reg_addr(loc, core.error_halt_event.off), value)
    }

    pub fn core_configure_reset_event(&mut self, loc: TileLoc, event: Event) -> Result<()> {
        let core = self.core_mod(loc)?;
        let value = core.reset_event.event.encode(self.core_event(event)?)?;
        self.write32(self.reg_addr(loc, core.reset_event.off), value)
    }

    /// Let the core drive the processor bus (access to neighbor memories).
    pub fn core_process_bus_enable(&mut self, loc: TileLoc) -> Result<()> {
        let core = self.core_mod(loc)?;
        let bus = core.processor_bus_enable;
        self.mask_write32(self.reg_addr(loc, core.processor_bus_off), bus.mask, bus.flag(true))
    }

    pub fn core_process_bus_disable(&mut self, loc: TileLoc) -> Result<()> {
        let core = self.core_mod(loc)?;
        let bus = core.processor_bus_enable;
        self.mask_write32(self.reg_addr(loc, core.processor_bus_off), bus.mask, 0)
    }
}
