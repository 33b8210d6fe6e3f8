//! First- and second-level interrupt controllers.
//!
//! Every shim tile has an L1 controller with two switches (A and B) that
//! route events and broadcast channels onto IRQ ids. NoC shims add an L2
//! controller that aggregates L1 outputs of the column onto a NoC IRQ line.

use std::fmt;

use crate::device::events::{Event, EventModule};
use crate::device::modules::{L1IntrMod, L2IntrMod};
use crate::device::regfield::bit_width;
use crate::device::{DeviceInstance, RegField, TileLoc, TileType};
use crate::error::{Error, Result};

/// L1 controller switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum L1Switch {
    A,
    B,
}

impl fmt::Display for L1Switch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            L1Switch::A => write!(f, "A"),
            L1Switch::B => write!(f, "B"),
        }
    }
}

impl DeviceInstance {
    /// L1 descriptor and the register offset delta of `switch`.
    fn l1_mod(&self, loc: TileLoc, switch: L1Switch) -> Result<(&'static L1IntrMod, u32)> {
        let (_, mods) = self.tile_modules(loc, &[TileType::ShimNoc, TileType::ShimPl])?;
        let l1 = mods.l1_intr.as_ref().ok_or(Error::FeatureNotSupported("L1 interrupt controller"))?;
        let delta = match switch {
            L1Switch::A => 0,
            L1Switch::B => l1.switch_stride,
        };
        Ok((l1, delta))
    }

    fn l2_mod(&self, loc: TileLoc) -> Result<&'static L2IntrMod> {
        let (_, mods) = self.tile_modules(loc, &[TileType::ShimNoc])?;
        mods.l2_intr.as_ref().ok_or(Error::FeatureNotSupported("L2 interrupt controller"))
    }

    fn l1_irq_bit(l1: &L1IntrMod, irq_id: u8) -> Result<u32> {
        if irq_id >= l1.num_irq_ids {
            return Err(Error::invalid_arg(format!(
                "L1 IRQ id {} out of range (max {})",
                irq_id,
                l1.num_irq_ids - 1
            )));
        }
        Ok(1 << irq_id)
    }

    pub fn intr_ctrl_l1_enable(&mut self, loc: TileLoc, switch: L1Switch, irq_id: u8) -> Result<()> {
        let (l1, delta) = self.l1_mod(loc, switch)?;
        let bit = Self::l1_irq_bit(l1, irq_id)?;
        self.write32(self.reg_addr(loc, l1.enable_off + delta), bit)
    }

    pub fn intr_ctrl_l1_disable(&mut self, loc: TileLoc, switch: L1Switch, irq_id: u8) -> Result<()> {
        let (l1, delta) = self.l1_mod(loc, switch)?;
        let bit = Self::l1_irq_bit(l1, irq_id)?;
        self.write32(self.reg_addr(loc, l1.disable_off + delta), bit)
    }

    /// Route the switch output onto broadcast channel `broadcast_id`.
    pub fn intr_ctrl_l1_irq_set(&mut self, loc: TileLoc, switch: L1Switch, broadcast_id: u8) -> Result<()> {
        let (l1, delta) = self.l1_mod(loc, switch)?;
        if broadcast_id >= l1.num_broadcast {
            return Err(Error::invalid_arg(format!("broadcast id {} out of range", broadcast_id)));
        }
        let value = l1.irq_no.encode(broadcast_id as u32)?;
        self.write32(self.reg_addr(loc, l1.irq_no_off + delta), value)
    }

    /// Select the event raised on IRQ event slot `irq_event`.
    pub fn intr_ctrl_l1_event(&mut self, loc: TileLoc, switch: L1Switch, irq_event: u8, event: Event) -> Result<()> {
        let (l1, delta) = self.l1_mod(loc, switch)?;
        if irq_event >= l1.num_irq_events {
            return Err(Error::invalid_arg(format!("L1 IRQ event slot {} out of range", irq_event)));
        }
        let code = self.modules().events.physical(EventModule::Pl, event)?;
        let lsb = l1.irq_event.lsb + irq_event * l1.irq_event_stride;
        let field = RegField::new(lsb, l1.irq_event.mask << (irq_event * l1.irq_event_stride));
        let value = field.encode(code as u32)?;
        self.mask_write32(self.reg_addr(loc, l1.irq_event_off + delta), field.mask, value)
    }

    fn l1_channels(l1: &L1IntrMod, channel_bitmap: u32) -> Result<u32> {
        if bit_width(channel_bitmap) > l1.num_broadcast as u32 {
            return Err(Error::invalid_arg(format!(
                "channel bitmap 0x{:X} exceeds {} broadcast channels",
                channel_bitmap, l1.num_broadcast
            )));
        }
        Ok(channel_bitmap)
    }

    /// Block the broadcast channels in `channel_bitmap` from entering the switch.
    pub fn intr_ctrl_l1_broadcast_block(&mut self, loc: TileLoc, switch: L1Switch, channel_bitmap: u32) -> Result<()> {
        let (l1, delta) = self.l1_mod(loc, switch)?;
        let value = Self::l1_channels(l1, channel_bitmap)?;
        self.write32(self.reg_addr(loc, l1.block_set_off + delta), value)
    }

    pub fn intr_ctrl_l1_broadcast_unblock(&mut self, loc: TileLoc, switch: L1Switch, channel_bitmap: u32) -> Result<()> {
        let (l1, delta) = self.l1_mod(loc, switch)?;
        let value = Self::l1_channels(l1, channel_bitmap)?;
        self.write32(self.reg_addr(loc, l1.block_clear_off + delta), value)
    }

    fn l2_channels(l2: &L2IntrMod, channel_bitmap: u32) -> Result<u32> {
        if bit_width(channel_bitmap) > l2.num_channels as u32 {
            return Err(Error::invalid_arg(format!(
                "channel bitmap 0x{:X} exceeds {} L2 channels",
                channel_bitmap, l2.num_channels
            )));
        }
        Ok(channel_bitmap)
    }

    pub fn intr_ctrl_l2_enable(&mut self, loc: TileLoc, channel_bitmap: u32) -> Result<()> {
        let l2 = self.l2_mod(loc)?;
        let value = Self::l2_channels(l2, channel_bitmap)?;
        self.write32(self.reg_addr(loc, l2.enable_off), value)
    }

    pub fn intr_ctrl_l2_disable(&mut self, loc: TileLoc, channel_bitmap: u32) -> Result<()> {
        let l2 = self.l2_mod(loc)?;
        let value = Self::l2_channels(l2, channel_bitmap)?;
        self.write32(self.reg_addr(loc, l2.disable_off), value)
    }

    /// Route the column's L2 output onto NoC IRQ line `noc_irq`.
    pub fn intr_ctrl_l2_irq_set(&mut self, loc: TileLoc, noc_irq: u8) -> Result<()> {
        let l2 = self.l2_mod(loc)?;
        let value = l2.irq.encode(noc_irq as u32)?;
        self.write32(self.reg_addr(loc, l2.irq_off), value)
    }

    /// Route every NoC shim of the partition to the error IRQ line.
    pub fn error_irq_init(&mut self) -> Result<()> {
        let irq = self.modules().l2_error_irq;
        let row = self.config().shim_row;
        for col in 0..self.num_cols() {
            let shim = TileLoc::new(col, row);
            if self.tile_type(shim) == TileType::ShimNoc {
                self.intr_ctrl_l2_irq_set(shim, irq)?;
            }
        }
        Ok(())
    }
}
