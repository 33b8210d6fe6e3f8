//! Transaction stream capture.
//!
//! A transaction stream is the binary instruction format consumed by NPU
//! firmware: a 16-byte header followed by fixed-layout register ops.
//!
//! Header layout (little-endian):
//! ```text
//! [0]     major version (0)
//! [1]     minor version (1)
//! [2]     device generation code
//! [3]     number of rows
//! [4]     number of columns
//! [5]     number of memory tile rows
//! [6..8]  reserved
//! [8..12] number of ops
//! [12..16] total size in bytes, header included
//! ```
//!
//! Standard ops start with an 8-byte op header (opcode byte, 3 pad bytes,
//! 4 zero bytes). Ops with opcode >= 128 are custom ops: a 4-byte op header
//! followed by their total size; they are skipped when parsing.

use std::any::Any;
use std::io::Cursor;
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use super::{Backend, BackendKind, BackendOptions, PollMode};
use crate::device::DeviceGeneration;
use crate::error::{Error, Result};

pub const TXN_HEADER_SIZE: usize = 16;
pub const TXN_MAJOR: u8 = 0;
pub const TXN_MINOR: u8 = 1;

/// Opcodes of standard transaction ops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TxnOpcode {
    Write = 0,
    BlockWrite = 1,
    BlockSet = 2,
    MaskWrite = 3,
    MaskPoll = 4,
    MaskPollBusy = 7,
}

impl TryFrom<u8> for TxnOpcode {
    type Error = u8;

    fn try_from(v: u8) -> std::result::Result<Self, u8> {
        match v {
            0 => Ok(Self::Write),
            1 => Ok(Self::BlockWrite),
            2 => Ok(Self::BlockSet),
            3 => Ok(Self::MaskWrite),
            4 => Ok(Self::MaskPoll),
            7 => Ok(Self::MaskPollBusy),
            other => Err(other),
        }
    }
}

/// One register op of a transaction stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxnOp {
    Write { addr: u64, value: u32 },
    /// Consecutive words starting at `addr`; the address must fit 32 bits.
    BlockWrite { addr: u64, values: Vec<u32> },
    BlockSet { addr: u64, value: u32, count: u32 },
    MaskWrite { addr: u64, mask: u32, value: u32 },
    /// `busy` selects the spinning variant of the poll.
    MaskPoll { addr: u64, mask: u32, expected: u32, busy: bool },
}

impl TxnOp {
    pub fn opcode(&self) -> TxnOpcode {
        match self {
            TxnOp::Write { .. } => TxnOpcode::Write,
            TxnOp::BlockWrite { .. } => TxnOpcode::BlockWrite,
            TxnOp::BlockSet { .. } => TxnOpcode::BlockSet,
            TxnOp::MaskWrite { .. } => TxnOpcode::MaskWrite,
            TxnOp::MaskPoll { busy: false, .. } => TxnOpcode::MaskPoll,
            TxnOp::MaskPoll { busy: true, .. } => TxnOpcode::MaskPollBusy,
        }
    }

    /// Encoded size in bytes, op header included.
    pub fn encoded_size(&self) -> usize {
        match self {
            TxnOp::Write { .. } => 24,
            TxnOp::BlockWrite { values, .. } => 16 + values.len() * 4,
            TxnOp::BlockSet { .. } | TxnOp::MaskWrite { .. } | TxnOp::MaskPoll { .. } => 28,
        }
    }

    fn encode(&self, out: &mut Vec<u8>) -> Result<()> {
        let size = self.encoded_size() as u32;
        out.write_u8(self.opcode() as u8)?;
        out.write_u24::<LittleEndian>(0)?;
        out.write_u32::<LittleEndian>(0)?;
        match self {
            TxnOp::Write { addr, value } => {
                out.write_u64::<LittleEndian>(*addr)?;
                out.write_u32::<LittleEndian>(*value)?;
                out.write_u32::<LittleEndian>(size)?;
            }
            TxnOp::BlockWrite { addr, values } => {
                let addr = u32::try_from(*addr)
                    .map_err(|_| Error::invalid_arg(format!("block write address 0x{:X} exceeds 32 bits", addr)))?;
                out.write_u32::<LittleEndian>(addr)?;
                out.write_u32::<LittleEndian>(size)?;
                for value in values {
                    out.write_u32::<LittleEndian>(*value)?;
                }
            }
            TxnOp::BlockSet { addr, value, count } => {
                out.write_u64::<LittleEndian>(*addr)?;
                out.write_u32::<LittleEndian>(*value)?;
                out.write_u32::<LittleEndian>(*count)?;
                out.write_u32::<LittleEndian>(size)?;
            }
            TxnOp::MaskWrite { addr, mask, value } => {
                out.write_u64::<LittleEndian>(*addr)?;
                out.write_u32::<LittleEndian>(*value)?;
                out.write_u32::<LittleEndian>(*mask)?;
                out.write_u32::<LittleEndian>(size)?;
            }
            TxnOp::MaskPoll { addr, mask, expected, .. } => {
                out.write_u64::<LittleEndian>(*addr)?;
                out.write_u32::<LittleEndian>(*expected)?;
                out.write_u32::<LittleEndian>(*mask)?;
                out.write_u32::<LittleEndian>(size)?;
            }
        }
        Ok(())
    }
}

fn truncated(e: std::io::Error) -> Error {
    Error::invalid_arg(format!("truncated transaction stream: {}", e))
}

/// A transaction stream: partition geometry plus ops.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxnStream {
    pub generation: DeviceGeneration,
    pub num_rows: u8,
    pub num_cols: u8,
    pub num_mem_tile_rows: u8,
    ops: Vec<TxnOp>,
}

impl TxnStream {
    pub fn new(generation: DeviceGeneration, num_rows: u8, num_cols: u8, num_mem_tile_rows: u8) -> Self {
        Self::from_ops(generation, num_rows, num_cols, num_mem_tile_rows, Vec::new())
    }

    pub fn from_ops(
        generation: DeviceGeneration,
        num_rows: u8,
        num_cols: u8,
        num_mem_tile_rows: u8,
        ops: Vec<TxnOp>,
    ) -> Self {
        Self { generation, num_rows, num_cols, num_mem_tile_rows, ops }
    }

    pub fn ops(&self) -> &[TxnOp] {
        &self.ops
    }

    pub fn push(&mut self, op: TxnOp) {
        self.ops.push(op);
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut body = Vec::new();
        for op in &self.ops {
            op.encode(&mut body)?;
        }
        let total = u32::try_from(TXN_HEADER_SIZE + body.len())
            .map_err(|_| Error::invalid_arg("transaction stream exceeds 4 GiB"))?;

        let mut out = Vec::with_capacity(total as usize);
        out.write_u8(TXN_MAJOR)?;
        out.write_u8(TXN_MINOR)?;
        out.write_u8(self.generation.txn_code())?;
        out.write_u8(self.num_rows)?;
        out.write_u8(self.num_cols)?;
        out.write_u8(self.num_mem_tile_rows)?;
        out.write_u16::<LittleEndian>(0)?;
        out.write_u32::<LittleEndian>(self.ops.len() as u32)?;
        out.write_u32::<LittleEndian>(total)?;
        out.extend_from_slice(&body);
        Ok(out)
    }

    /// Parse a serialized stream.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < TXN_HEADER_SIZE {
            return Err(Error::invalid_arg(format!(
                "transaction stream too short: {} bytes",
                data.len()
            )));
        }

        let mut cursor = Cursor::new(data);
        let major = cursor.read_u8().map_err(truncated)?;
        let minor = cursor.read_u8().map_err(truncated)?;
        let dev_gen = cursor.read_u8().map_err(truncated)?;
        let num_rows = cursor.read_u8().map_err(truncated)?;
        let num_cols = cursor.read_u8().map_err(truncated)?;
        let num_mem_tile_rows = cursor.read_u8().map_err(truncated)?;
        let _reserved = cursor.read_u16::<LittleEndian>().map_err(truncated)?;
        let num_ops = cursor.read_u32::<LittleEndian>().map_err(truncated)?;
        let total_size = cursor.read_u32::<LittleEndian>().map_err(truncated)?;

        if (major, minor) != (TXN_MAJOR, TXN_MINOR) {
            return Err(Error::invalid_arg(format!(
                "unsupported transaction stream version {}.{}",
                major, minor
            )));
        }
        let generation = DeviceGeneration::from_txn_code(dev_gen)
            .ok_or_else(|| Error::invalid_arg(format!("unknown device generation code {}", dev_gen)))?;
        if total_size as usize > data.len() {
            return Err(Error::invalid_arg(format!(
                "transaction stream size {} exceeds data length {}",
                total_size,
                data.len()
            )));
        }

        // Every op carries at least an 8-byte header
        let max_ops = (total_size as usize).saturating_sub(TXN_HEADER_SIZE) / 8;
        if num_ops as usize > max_ops {
            return Err(Error::invalid_arg(format!(
                "transaction stream claims {} ops but {} bytes hold at most {}",
                num_ops, total_size, max_ops
            )));
        }

        let mut ops = Vec::with_capacity(num_ops as usize);
        for i in 0..num_ops {
            let pos = cursor.position();
            log::trace!("parsing transaction op {} at offset 0x{:X}", i, pos);
            if let Some(op) = Self::parse_op(&mut cursor)? {
                ops.push(op);
            }
        }

        Ok(Self { generation, num_rows, num_cols, num_mem_tile_rows, ops })
    }

    fn parse_op(cursor: &mut Cursor<&[u8]>) -> Result<Option<TxnOp>> {
        let pos = cursor.position();
        let opcode_byte = cursor.read_u8().map_err(truncated)?;
        let _pad = cursor.read_u24::<LittleEndian>().map_err(truncated)?;

        if opcode_byte >= 128 {
            let size = cursor.read_u32::<LittleEndian>().map_err(truncated)?;
            let skip = Self::checked_len(cursor, size.saturating_sub(8) as u64, pos)?;
            cursor.set_position(cursor.position() + skip);
            log::warn!("skipping custom transaction op 0x{:02X} at offset 0x{:X}", opcode_byte, pos);
            return Ok(None);
        }

        let opcode = TxnOpcode::try_from(opcode_byte).map_err(|code| {
            Error::invalid_arg(format!("unknown transaction opcode {} at offset 0x{:X}", code, pos))
        })?;
        let _pad2 = cursor.read_u32::<LittleEndian>().map_err(truncated)?;

        let op = match opcode {
            TxnOpcode::Write => {
                let addr = cursor.read_u64::<LittleEndian>().map_err(truncated)?;
                let value = cursor.read_u32::<LittleEndian>().map_err(truncated)?;
                let _size = cursor.read_u32::<LittleEndian>().map_err(truncated)?;
                TxnOp::Write { addr, value }
            }
            TxnOpcode::BlockWrite => {
                let addr = cursor.read_u32::<LittleEndian>().map_err(truncated)?;
                let size = cursor.read_u32::<LittleEndian>().map_err(truncated)?;
                let num_words = size.saturating_sub(16) / 4;
                Self::checked_len(cursor, num_words as u64 * 4, pos)?;
                let mut values = Vec::with_capacity(num_words as usize);
                for _ in 0..num_words {
                    values.push(cursor.read_u32::<LittleEndian>().map_err(truncated)?);
                }
                TxnOp::BlockWrite { addr: addr as u64, values }
            }
            TxnOpcode::BlockSet => {
                let addr = cursor.read_u64::<LittleEndian>().map_err(truncated)?;
                let value = cursor.read_u32::<LittleEndian>().map_err(truncated)?;
                let count = cursor.read_u32::<LittleEndian>().map_err(truncated)?;
                let _size = cursor.read_u32::<LittleEndian>().map_err(truncated)?;
                TxnOp::BlockSet { addr, value, count }
            }
            TxnOpcode::MaskWrite => {
                let addr = cursor.read_u64::<LittleEndian>().map_err(truncated)?;
                let value = cursor.read_u32::<LittleEndian>().map_err(truncated)?;
                let mask = cursor.read_u32::<LittleEndian>().map_err(truncated)?;
                let _size = cursor.read_u32::<LittleEndian>().map_err(truncated)?;
                TxnOp::MaskWrite { addr, mask, value }
            }
            TxnOpcode::MaskPoll | TxnOpcode::MaskPollBusy => {
                let addr = cursor.read_u64::<LittleEndian>().map_err(truncated)?;
                let expected = cursor.read_u32::<LittleEndian>().map_err(truncated)?;
                let mask = cursor.read_u32::<LittleEndian>().map_err(truncated)?;
                let _size = cursor.read_u32::<LittleEndian>().map_err(truncated)?;
                TxnOp::MaskPoll { addr, mask, expected, busy: opcode == TxnOpcode::MaskPollBusy }
            }
        };
        Ok(Some(op))
    }

    /// Reject a payload length read from the stream that runs past the data.
    fn checked_len(cursor: &Cursor<&[u8]>, len: u64, pos: u64) -> Result<u64> {
        let remaining = (cursor.get_ref().len() as u64).saturating_sub(cursor.position());
        if len > remaining {
            return Err(Error::invalid_arg(format!(
                "transaction op at offset 0x{:X} needs {} bytes, {} remain",
                pos, len, remaining
            )));
        }
        Ok(len)
    }

    /// Print a one-line-per-op listing.
    pub fn print_summary(&self) {
        println!("Transaction Stream");
        println!("==================");
        println!("Generation: {}", self.generation);
        println!(
            "Geometry: {} columns, {} rows ({} memory tile rows)",
            self.num_cols, self.num_rows, self.num_mem_tile_rows
        );
        println!("Ops: {}", self.ops.len());
        println!();
        for (i, op) in self.ops.iter().enumerate() {
            match op {
                TxnOp::Write { addr, value } => println!("{:5}: WRITE      0x{:016X} = 0x{:08X}", i, addr, value),
                TxnOp::BlockWrite { addr, values } => {
                    println!("{:5}: BLOCKWRITE 0x{:016X} [{} words]", i, addr, values.len())
                }
                TxnOp::BlockSet { addr, value, count } => {
                    println!("{:5}: BLOCKSET   0x{:016X} = 0x{:08X} x{}", i, addr, value, count)
                }
                TxnOp::MaskWrite { addr, mask, value } => {
                    println!("{:5}: MASKWRITE  0x{:016X} = 0x{:08X} & 0x{:08X}", i, addr, value, mask)
                }
                TxnOp::MaskPoll { addr, mask, expected, busy } => println!(
                    "{:5}: MASKPOLL{}  0x{:016X} & 0x{:08X} == 0x{:08X}",
                    i,
                    if *busy { "B" } else { " " },
                    addr,
                    mask,
                    expected
                ),
            }
        }
    }
}

/// Backend that records every operation into a [`TxnStream`].
///
/// In forwarding mode every op is also passed to an inner backend and reads
/// are served by it; otherwise reads return 0 and polls succeed.
#[derive(Debug)]
pub struct TxnBackend {
    stream: TxnStream,
    inner: Option<Box<dyn Backend>>,
}

impl Default for TxnBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl TxnBackend {
    pub fn new() -> Self {
        Self {
            stream: TxnStream::new(DeviceGeneration::Aie2Ipu, 0, 0, 0),
            inner: None,
        }
    }

    /// Capture and forward to an already initialized `inner` backend.
    pub fn forwarding(inner: Box<dyn Backend>) -> Self {
        Self { inner: Some(inner), ..Self::new() }
    }

    pub fn stream(&self) -> &TxnStream {
        &self.stream
    }

    pub fn into_stream(self) -> TxnStream {
        self.stream
    }

    pub fn inner(&self) -> Option<&dyn Backend> {
        self.inner.as_deref()
    }

    pub fn write_to(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.stream.to_bytes()?)?;
        log::info!("wrote {} transaction ops to {}", self.stream.len(), path.display());
        Ok(())
    }
}

impl Backend for TxnBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Txn
    }

    fn init(&mut self, opts: &BackendOptions) -> Result<()> {
        self.stream.generation = opts.generation;
        self.stream.num_rows = opts.num_rows;
        self.stream.num_cols = opts.num_cols;
        self.stream.num_mem_tile_rows = opts.num_mem_tile_rows;
        Ok(())
    }

    fn read32(&mut self, addr: u64) -> Result<u32> {
        match self.inner.as_mut() {
            Some(inner) => inner.read32(addr),
            None => {
                log::trace!("txn: read of 0x{:016X} cannot be captured, returning 0", addr);
                Ok(0)
            }
        }
    }

    fn write32(&mut self, addr: u64, value: u32) -> Result<()> {
        if let Some(inner) = self.inner.as_mut() {
            inner.write32(addr, value)?;
        }
        self.stream.push(TxnOp::Write { addr, value });
        Ok(())
    }

    fn mask_write32(&mut self, addr: u64, mask: u32, value: u32) -> Result<()> {
        if let Some(inner) = self.inner.as_mut() {
            inner.mask_write32(addr, mask, value)?;
        }
        self.stream.push(TxnOp::MaskWrite { addr, mask, value });
        Ok(())
    }

    fn mask_poll(&mut self, addr: u64, mask: u32, expected: u32, timeout_us: u32, mode: PollMode) -> Result<()> {
        if let Some(inner) = self.inner.as_mut() {
            inner.mask_poll(addr, mask, expected, timeout_us, mode)?;
        }
        self.stream.push(TxnOp::MaskPoll { addr, mask, expected, busy: mode == PollMode::Busy });
        Ok(())
    }

    fn block_set32(&mut self, addr: u64, value: u32, count: u32) -> Result<()> {
        if let Some(inner) = self.inner.as_mut() {
            inner.block_set32(addr, value, count)?;
        }
        self.stream.push(TxnOp::BlockSet { addr, value, count });
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::sim::SimBackend;

    #[test]
    fn test_parse_empty() {
        assert!(TxnStream::parse(&[]).is_err());
    }

    #[test]
    fn test_header_layout() {
        let stream = TxnStream::new(DeviceGeneration::Aie2Ipu, 6, 4, 1);
        let bytes = stream.to_bytes().unwrap();
        assert_eq!(bytes.len(), TXN_HEADER_SIZE);
        // Same leading word as streams produced by the NPU toolchain
        assert_eq!(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]), 0x0603_0100);
        assert_eq!(bytes[4], 4);
        assert_eq!(bytes[5], 1);
    }

    #[test]
    fn test_op_layout() {
        let stream = TxnStream::from_ops(
            DeviceGeneration::Aie2Ipu,
            6,
            1,
            1,
            vec![TxnOp::Write { addr: 0x0003_2000, value: 0xDEAD_BEEF }],
        );
        let bytes = stream.to_bytes().unwrap();
        assert_eq!(bytes.len(), TXN_HEADER_SIZE + 24);
        let op = &bytes[TXN_HEADER_SIZE..];
        assert_eq!(&op[0..8], &[0, 0, 0, 0, 0, 0, 0, 0]);
        assert_eq!(&op[8..16], &0x0003_2000u64.to_le_bytes());
        assert_eq!(&op[16..20], &0xDEAD_BEEFu32.to_le_bytes());
        assert_eq!(&op[20..24], &24u32.to_le_bytes());
    }

    #[test]
    fn test_serialize_and_parse_all_ops() {
        let ops = vec![
            TxnOp::Write { addr: 0x200_0000_1000, value: 1 },
            TxnOp::BlockWrite { addr: 0x0022_0000, values: vec![1, 2, 3] },
            TxnOp::BlockSet { addr: 0x0040_0000, value: 0, count: 0x4000 },
            TxnOp::MaskWrite { addr: 0x0003_2008, mask: 0x18000, value: 0x18000 },
            TxnOp::MaskPoll { addr: 0x0003_2004, mask: 0x100000, expected: 0x100000, busy: false },
            TxnOp::MaskPoll { addr: 0x0003_2004, mask: 1, expected: 0, busy: true },
        ];
        let stream = TxnStream::from_ops(DeviceGeneration::Aie2P, 6, 4, 1, ops);
        let parsed = TxnStream::parse(&stream.to_bytes().unwrap()).unwrap();
        assert_eq!(parsed, stream);
    }

    #[test]
    fn test_custom_ops_are_skipped() {
        let mut bytes = TxnStream::new(DeviceGeneration::Aie2Ipu, 6, 1, 1).to_bytes().unwrap();
        // num_ops = 2, a 16-byte custom op then a write
        bytes[8..12].copy_from_slice(&2u32.to_le_bytes());
        bytes.extend_from_slice(&[0x80, 0, 0, 0]);
        bytes.extend_from_slice(&16u32.to_le_bytes());
        bytes.extend_from_slice(&[0u8; 8]);
        TxnOp::Write { addr: 0x10, value: 5 }.encode(&mut bytes).unwrap();
        let total = bytes.len() as u32;
        bytes[12..16].copy_from_slice(&total.to_le_bytes());

        let parsed = TxnStream::parse(&bytes).unwrap();
        assert_eq!(parsed.ops(), &[TxnOp::Write { addr: 0x10, value: 5 }]);
    }

    #[test]
    fn test_parse_rejects_unknown_generation_and_opcode() {
        let mut bytes = TxnStream::new(DeviceGeneration::Aie2Ipu, 6, 1, 1).to_bytes().unwrap();
        bytes[2] = 0x7F;
        assert!(matches!(TxnStream::parse(&bytes), Err(Error::InvalidArgument(_))));

        let mut bytes = TxnStream::new(DeviceGeneration::Aie2Ipu, 6, 1, 1).to_bytes().unwrap();
        bytes[8..12].copy_from_slice(&1u32.to_le_bytes());
        bytes.extend_from_slice(&[0x05, 0, 0, 0, 0, 0, 0, 0]);
        assert!(TxnStream::parse(&bytes).is_err());
    }

    #[test]
    fn test_parse_rejects_op_count_beyond_size() {
        let mut bytes = TxnStream::new(DeviceGeneration::Aie2Ipu, 6, 4, 1).to_bytes().unwrap();
        bytes[8..12].copy_from_slice(&u32::MAX.to_le_bytes());
        assert!(matches!(TxnStream::parse(&bytes), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn test_parse_rejects_oversized_payloads() {
        // Custom op claiming a 4 GiB payload
        let mut bytes = TxnStream::new(DeviceGeneration::Aie2Ipu, 6, 1, 1).to_bytes().unwrap();
        bytes[8..12].copy_from_slice(&1u32.to_le_bytes());
        bytes.extend_from_slice(&[0x80, 0, 0, 0]);
        bytes.extend_from_slice(&u32::MAX.to_le_bytes());
        let total = bytes.len() as u32;
        bytes[12..16].copy_from_slice(&total.to_le_bytes());
        assert!(matches!(TxnStream::parse(&bytes), Err(Error::InvalidArgument(_))));

        // Block write whose size runs past the data
        let mut bytes = TxnStream::new(DeviceGeneration::Aie2Ipu, 6, 1, 1).to_bytes().unwrap();
        bytes[8..12].copy_from_slice(&1u32.to_le_bytes());
        bytes.extend_from_slice(&[1, 0, 0, 0, 0, 0, 0, 0]);
        bytes.extend_from_slice(&0x0022_0000u32.to_le_bytes());
        bytes.extend_from_slice(&u32::MAX.to_le_bytes());
        let total = bytes.len() as u32;
        bytes[12..16].copy_from_slice(&total.to_le_bytes());
        assert!(matches!(TxnStream::parse(&bytes), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn test_block_write_needs_32bit_address() {
        let stream = TxnStream::from_ops(
            DeviceGeneration::AieMl,
            11,
            1,
            2,
            vec![TxnOp::BlockWrite { addr: 0x200_0000_0000, values: vec![1] }],
        );
        assert!(stream.to_bytes().is_err());
    }

    #[test]
    fn test_backend_init_records_geometry() {
        let mut backend = TxnBackend::new();
        let opts = BackendOptions::for_config(&crate::device::DeviceConfig::new(DeviceGeneration::Aie2P, 0, 4));
        backend.init(&opts).unwrap();
        assert_eq!(backend.stream().generation, DeviceGeneration::Aie2P);
        assert_eq!(backend.stream().num_cols, 4);
        assert_eq!(backend.stream().num_rows, opts.num_rows);
    }

    #[test]
    fn test_capture_only_reads_zero() {
        let mut backend = TxnBackend::new();
        backend.write32(0x100, 7).unwrap();
        assert_eq!(backend.read32(0x100).unwrap(), 0);
        assert!(backend.mask_poll(0x100, 1, 1, 0, PollMode::Yield).is_ok());
        assert_eq!(backend.stream().len(), 2);
    }

    #[test]
    fn test_forwarding_mode() {
        let mut backend = TxnBackend::forwarding(Box::new(SimBackend::new()));
        backend.write32(0x100, 7).unwrap();
        backend.mask_write32(0x100, 0xF0, 0x30).unwrap();
        assert_eq!(backend.read32(0x100).unwrap(), 0x37);
        let err = backend.mask_poll(0x104, 1, 1, 5, PollMode::Busy).unwrap_err();
        assert!(err.is_timeout());
        // Ops the inner backend rejects are not recorded
        assert_eq!(backend.stream().len(), 2);
        assert!(matches!(backend.stream().ops().last(), Some(TxnOp::MaskWrite { .. })));
        let sim = backend.inner().unwrap().as_any().downcast_ref::<SimBackend>().unwrap();
        assert_eq!(sim.value(0x100), 0x37);
    }
}
