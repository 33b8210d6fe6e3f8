//! Performance counters.
//!
//! Each module packs start/stop event selectors for two counters per
//! control register (start at bit 0/16, stop at bit 8/24) and reset
//! selectors for four counters per register (8 bits each).

use crate::device::events::{Event, EventModule};
use crate::device::modules::{event_module, PerfMod};
use crate::device::{DeviceInstance, ModuleType, RegField, TileLoc};
use crate::error::{Error, Result};

impl DeviceInstance {
    fn perf_mod(&self, loc: TileLoc, module: ModuleType, counter: u8) -> Result<(EventModule, &'static PerfMod)> {
        let (tile_type, mods) = self.tile_modules(loc, &[])?;
        let perf = mods
            .perf(module)
            .ok_or(Error::FeatureNotSupported("performance counters in this module"))?;
        let events = event_module(tile_type, module).ok_or(Error::FeatureNotSupported("events in this module"))?;
        if counter >= perf.num_counters {
            return Err(Error::invalid_arg(format!(
                "{} counter {} out of range on {} tile (has {})",
                module, counter, tile_type, perf.num_counters
            )));
        }
        Ok((events, perf))
    }

    fn perf_event_field(perf: &PerfMod, lsb: u8) -> RegField {
        RegField::new(lsb, perf.event_mask << lsb)
    }

    /// Count between `start` and `stop` events on `counter`.
    pub fn perf_counter_control_set(
        &mut self,
        loc: TileLoc,
        module: ModuleType,
        counter: u8,
        start: Event,
        stop: Event,
    ) -> Result<()> {
        let (events, perf) = self.perf_mod(loc, module, counter)?;
        let start_code = self.modules().events.physical(events, start)?;
        let stop_code = self.modules().events.physical(events, stop)?;

        let start_lsb = (counter % 2) * 16;
        let start_field = Self::perf_event_field(perf, start_lsb);
        let stop_field = Self::perf_event_field(perf, start_lsb + 8);
        let value = start_field.encode(start_code as u32)? | stop_field.encode(stop_code as u32)?;
        let off = perf.ctrl_off + (counter as u32 / 2) * 4;
        self.mask_write32(self.reg_addr(loc, off), start_field.mask | stop_field.mask, value)
    }

    /// Reset `counter` whenever `reset` fires.
    pub fn perf_counter_reset_control_set(
        &mut self,
        loc: TileLoc,
        module: ModuleType,
        counter: u8,
        reset: Event,
    ) -> Result<()> {
        let (events, perf) = self.perf_mod(loc, module, counter)?;
        let code = self.modules().events.physical(events, reset)?;
        let field = Self::perf_event_field(perf, (counter % 4) * 8);
        let value = field.encode(code as u32)?;
        let off = perf.reset_ctrl_off + (counter as u32 / 4) * 4;
        self.mask_write32(self.reg_addr(loc, off), field.mask, value)
    }

    pub fn perf_counter_set(&mut self, loc: TileLoc, module: ModuleType, counter: u8, value: u32) -> Result<()> {
        let (_, perf) = self.perf_mod(loc, module, counter)?;
        self.write32(self.reg_addr(loc, perf.counter_off + counter as u32 * 4), value)
    }

    pub fn perf_counter_get(&mut self, loc: TileLoc, module: ModuleType, counter: u8) -> Result<u32> {
        let (_, perf) = self.perf_mod(loc, module, counter)?;
        self.read32(self.reg_addr(loc, perf.counter_off + counter as u32 * 4))
    }

    /// Value at which `counter` raises its perf-count event.
    pub fn perf_counter_event_value_set(
        &mut self,
        loc: TileLoc,
        module: ModuleType,
        counter: u8,
        value: u32,
    ) -> Result<()> {
        let (_, perf) = self.perf_mod(loc, module, counter)?;
        self.write32(self.reg_addr(loc, perf.event_value_off + counter as u32 * 4), value)
    }
}
