//! In-memory register simulator.
//!
//! A sparse register file keyed by absolute address. Unwritten registers
//! read as 0. Tests can model hardware behavior with:
//! - **pins**: a pinned address always reads the pinned value (status bits
//!   set by hardware)
//! - **write-1-to-clear masks**: bits in the mask are cleared by writing 1
//!   and unaffected by writing 0
//! - **pokes**: hardware-side updates that bypass the op log
//!
//! Every access is appended to an op log so tests can assert the exact
//! sequence a control operation issued.
//!
//! The simulator can also replay captured CDO and transaction streams,
//! which lets a capture be checked against direct execution.
//!
//! # Example
//!
//! ```ignore
//! let mut sim = SimBackend::new();
//! sim.replay_cdo(&Cdo::parse(&bytes)?)?;
//! assert_eq!(sim.value(0x0223_2000), 1);
//! ```

use std::any::Any;
use std::collections::HashMap;

use super::cdo::{Cdo, CdoCommand};
use super::txn::{TxnOp, TxnStream};
use super::{poll_until, Backend, BackendKind, PollMode};
use crate::error::Result;

/// One recorded register access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegOp {
    Read { addr: u64 },
    Write { addr: u64, value: u32 },
    MaskWrite { addr: u64, mask: u32, value: u32 },
    Poll { addr: u64, mask: u32, expected: u32, timeout_us: u32, mode: PollMode },
    BlockSet { addr: u64, value: u32, count: u32 },
}

impl RegOp {
    pub fn addr(&self) -> u64 {
        match *self {
            RegOp::Read { addr }
            | RegOp::Write { addr, .. }
            | RegOp::MaskWrite { addr, .. }
            | RegOp::Poll { addr, .. }
            | RegOp::BlockSet { addr, .. } => addr,
        }
    }

    /// Whether the op changes register state.
    pub fn is_mutation(&self) -> bool {
        matches!(self, RegOp::Write { .. } | RegOp::MaskWrite { .. } | RegOp::BlockSet { .. })
    }
}

/// Statistics about a stream replay.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReplayStats {
    /// Total commands processed
    pub commands: usize,
    pub writes: usize,
    pub mask_writes: usize,
    pub block_writes: usize,
    pub block_sets: usize,
    pub polls: usize,
    /// Polls whose condition did not hold against the simulated state
    pub unsatisfied_polls: usize,
    /// Commands with no register effect (markers, nops, delays)
    pub skipped: usize,
}

/// Sparse register-file backend.
#[derive(Debug, Default)]
pub struct SimBackend {
    regs: HashMap<u64, u32>,
    pinned: HashMap<u64, u32>,
    w1c: HashMap<u64, u32>,
    ops: Vec<RegOp>,
}

impl SimBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value of a register, without logging a read.
    pub fn value(&self, addr: u64) -> u32 {
        match self.pinned.get(&addr) {
            Some(v) => *v,
            None => self.regs.get(&addr).copied().unwrap_or(0),
        }
    }

    /// Force reads of `addr` to return `value` until unpinned.
    pub fn pin(&mut self, addr: u64, value: u32) {
        self.pinned.insert(addr, value);
    }

    pub fn unpin(&mut self, addr: u64) {
        self.pinned.remove(&addr);
    }

    /// Treat `mask` bits of `addr` as write-1-to-clear.
    pub fn set_write_one_to_clear(&mut self, addr: u64, mask: u32) {
        *self.w1c.entry(addr).or_insert(0) |= mask;
    }

    /// Hardware-side update: stores `value` without W1C semantics or logging.
    pub fn poke(&mut self, addr: u64, value: u32) {
        self.regs.insert(addr, value);
    }

    /// Every access since construction or the last [`Self::clear_ops`].
    pub fn ops(&self) -> &[RegOp] {
        &self.ops
    }

    pub fn clear_ops(&mut self) {
        self.ops.clear();
    }

    /// Ops that changed register state.
    pub fn mutations(&self) -> impl Iterator<Item = &RegOp> {
        self.ops.iter().filter(|op| op.is_mutation())
    }

    /// Registers holding a non-zero value, sorted by address.
    pub fn nonzero(&self) -> Vec<(u64, u32)> {
        let mut regs: Vec<(u64, u32)> = self.regs.iter().filter(|(_, v)| **v != 0).map(|(a, v)| (*a, *v)).collect();
        regs.sort_unstable();
        regs
    }

    fn store(&mut self, addr: u64, mask: u32, value: u32) {
        let old = self.regs.get(&addr).copied().unwrap_or(0);
        let w1c = self.w1c.get(&addr).copied().unwrap_or(0);
        let written = value & mask;
        let plain = (old & !mask & !w1c) | (written & !w1c);
        let cleared = old & w1c & !written;
        self.regs.insert(addr, plain | cleared);
    }

    // ========================================================================
    // Stream replay
    // ========================================================================

    /// Apply every command of a parsed CDO.
    pub fn replay_cdo(&mut self, cdo: &Cdo) -> Result<ReplayStats> {
        let mut stats = ReplayStats::default();
        for cmd in cdo.commands() {
            stats.commands += 1;
            match cmd {
                CdoCommand::Write { address, value } => {
                    self.store(address as u64, u32::MAX, value);
                    stats.writes += 1;
                }
                CdoCommand::Write64 { address, value } => {
                    self.store(address, u32::MAX, value);
                    stats.writes += 1;
                }
                CdoCommand::MaskWrite { address, mask, value } => {
                    self.store(address as u64, mask, value);
                    stats.mask_writes += 1;
                }
                CdoCommand::MaskWrite64 { address, mask, value } => {
                    self.store(address, mask, value);
                    stats.mask_writes += 1;
                }
                CdoCommand::DmaWrite { address, data } => {
                    for (i, chunk) in data.chunks(4).enumerate() {
                        let mut word = [0u8; 4];
                        word[..chunk.len()].copy_from_slice(chunk);
                        self.store(address as u64 + i as u64 * 4, u32::MAX, u32::from_le_bytes(word));
                    }
                    stats.block_writes += 1;
                }
                CdoCommand::Set { address, count, value } => {
                    self.fill(address, value, count);
                    stats.block_sets += 1;
                }
                CdoCommand::MaskPoll { address, mask, expected } => {
                    self.check_poll(address as u64, mask, expected, &mut stats);
                }
                CdoCommand::MaskPoll64 { address, mask, expected } => {
                    self.check_poll(address, mask, expected, &mut stats);
                }
                CdoCommand::Unknown { opcode, .. } => {
                    log::warn!("replay: skipping unknown CDO opcode 0x{:03X}", opcode);
                    stats.skipped += 1;
                }
                CdoCommand::Delay { .. } | CdoCommand::Nop { .. } | CdoCommand::EndMark | CdoCommand::Marker { .. } => {
                    stats.skipped += 1;
                }
            }
        }
        log::debug!("replayed CDO: {:?}", stats);
        Ok(stats)
    }

    /// Apply every op of a parsed transaction stream.
    pub fn replay_txn(&mut self, stream: &TxnStream) -> Result<ReplayStats> {
        let mut stats = ReplayStats::default();
        for op in stream.ops() {
            stats.commands += 1;
            match op {
                TxnOp::Write { addr, value } => {
                    self.store(*addr, u32::MAX, *value);
                    stats.writes += 1;
                }
                TxnOp::BlockWrite { addr, values } => {
                    for (i, value) in values.iter().enumerate() {
                        self.store(addr + i as u64 * 4, u32::MAX, *value);
                    }
                    stats.block_writes += 1;
                }
                TxnOp::BlockSet { addr, value, count } => {
                    self.fill(*addr, *value, *count);
                    stats.block_sets += 1;
                }
                TxnOp::MaskWrite { addr, mask, value } => {
                    self.store(*addr, *mask, *value);
                    stats.mask_writes += 1;
                }
                TxnOp::MaskPoll { addr, mask, expected, .. } => {
                    self.check_poll(*addr, *mask, *expected, &mut stats);
                }
            }
        }
        log::debug!("replayed transaction stream: {:?}", stats);
        Ok(stats)
    }

    fn fill(&mut self, addr: u64, value: u32, count: u32) {
        for i in 0..count as u64 {
            self.store(addr + i * 4, u32::MAX, value);
        }
    }

    // A replayed poll cannot wait for hardware; the condition is checked once
    // against the simulated state.
    fn check_poll(&mut self, addr: u64, mask: u32, expected: u32, stats: &mut ReplayStats) {
        stats.polls += 1;
        let value = self.value(addr);
        if value & mask != expected {
            log::warn!(
                "replay: poll 0x{:016X} & 0x{:08X} == 0x{:08X} not satisfied (value 0x{:08X})",
                addr, mask, expected, value
            );
            stats.unsatisfied_polls += 1;
        }
    }
}

impl Backend for SimBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Sim
    }

    fn read32(&mut self, addr: u64) -> Result<u32> {
        self.ops.push(RegOp::Read { addr });
        Ok(self.value(addr))
    }

    fn write32(&mut self, addr: u64, value: u32) -> Result<()> {
        self.ops.push(RegOp::Write { addr, value });
        self.store(addr, u32::MAX, value);
        Ok(())
    }

    fn mask_write32(&mut self, addr: u64, mask: u32, value: u32) -> Result<()> {
        self.ops.push(RegOp::MaskWrite { addr, mask, value });
        self.store(addr, mask, value);
        Ok(())
    }

    fn mask_poll(&mut self, addr: u64, mask: u32, expected: u32, timeout_us: u32, mode: PollMode) -> Result<()> {
        self.ops.push(RegOp::Poll { addr, mask, expected, timeout_us, mode });
        let sim = &*self;
        poll_until(|| Ok(sim.value(addr)), addr, mask, expected, timeout_us, mode)
    }

    fn block_set32(&mut self, addr: u64, value: u32, count: u32) -> Result<()> {
        self.ops.push(RegOp::BlockSet { addr, value, count });
        self.fill(addr, value, count);
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
