//! Execution backends.
//!
//! Every register access of the control core funnels through one
//! [`Backend`] bound at instance construction. The same control sequence can
//! therefore drive live hardware, a simulator, a logging sink, or be captured
//! as a replayable stream:
//!
//! ```text
//!                    +--------------+
//!  DeviceInstance -> | dyn Backend  | -> live   (memory-mapped aperture)
//!                    +--------------+ -> sim    (in-memory register file)
//!                                     -> debug  (log only)
//!                                     -> cdo    (CDO command capture)
//!                                     -> txn    (transaction stream capture)
//! ```
//!
//! Capturing backends cannot observe hardware: their reads return 0 and their
//! polls succeed immediately. The control core never depends on reading back
//! what it just wrote.

pub mod cdo;
pub mod debug;
#[cfg(feature = "live")]
pub mod live;
pub mod sim;
pub mod txn;

use std::any::Any;
use std::fmt;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::device::{DeviceConfig, DeviceGeneration};
use crate::error::{Error, Result};

/// Sleep between polls in [`PollMode::Yield`].
pub const POLL_INTERVAL: Duration = Duration::from_micros(1);

/// Backend implementation selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Memory-mapped hardware
    Live,
    /// In-memory register simulator
    Sim,
    /// Log-only sink
    Debug,
    /// CDO command capture
    Cdo,
    /// Transaction stream capture
    Txn,
}

impl BackendKind {
    /// Number of kinds; size of the registry table.
    pub const COUNT: usize = 5;

    pub const ALL: [BackendKind; Self::COUNT] = [
        BackendKind::Live,
        BackendKind::Sim,
        BackendKind::Debug,
        BackendKind::Cdo,
        BackendKind::Txn,
    ];

    /// Registry slot of this kind.
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Whether this backend records operations instead of executing them.
    pub const fn is_capture(self) -> bool {
        matches!(self, BackendKind::Cdo | BackendKind::Txn)
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BackendKind::Live => "live",
            BackendKind::Sim => "sim",
            BackendKind::Debug => "debug",
            BackendKind::Cdo => "cdo",
            BackendKind::Txn => "txn",
        };
        write!(f, "{}", name)
    }
}

impl std::str::FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        BackendKind::ALL
            .into_iter()
            .find(|k| k.to_string().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown backend '{}'", s))
    }
}

/// Strategy while waiting in a poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PollMode {
    /// Sleep between reads
    #[default]
    Yield,
    /// Spin between reads
    Busy,
}

impl fmt::Display for PollMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PollMode::Yield => write!(f, "yield"),
            PollMode::Busy => write!(f, "busy"),
        }
    }
}

/// Parameters handed to [`Backend::init`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendOptions {
    pub generation: DeviceGeneration,
    pub base_addr: u64,
    pub num_cols: u8,
    pub num_rows: u8,
    pub num_mem_tile_rows: u8,
    /// Device node for the live backend (e.g. `/dev/mem` or a UIO node)
    pub device_path: Option<PathBuf>,
    /// Bytes of register space to map, starting at `base_addr`
    pub aperture_size: usize,
}

impl BackendOptions {
    /// Options derived from a partition's geometry.
    pub fn for_config(config: &DeviceConfig) -> Self {
        let cols_end = config.start_col as u64 + config.num_cols as u64;
        Self {
            generation: config.generation,
            base_addr: config.base_addr,
            num_cols: config.num_cols,
            num_rows: config.num_rows,
            num_mem_tile_rows: config.mem_tile_num_rows,
            device_path: None,
            aperture_size: (cols_end << config.col_shift) as usize,
        }
    }

    pub fn with_device_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.device_path = Some(path.into());
        self
    }
}

/// Register access sink.
///
/// Implementations only need `read32` and `write32`; the other operations
/// have read-modify-write defaults. Capturing backends override them so the
/// captured stream keeps the original operation.
pub trait Backend: Send + fmt::Debug {
    fn kind(&self) -> BackendKind;

    /// One-time setup after construction.
    fn init(&mut self, _opts: &BackendOptions) -> Result<()> {
        Ok(())
    }

    fn read32(&mut self, addr: u64) -> Result<u32>;

    fn write32(&mut self, addr: u64, value: u32) -> Result<()>;

    /// `*addr = (*addr & !mask) | (value & mask)`
    fn mask_write32(&mut self, addr: u64, mask: u32, value: u32) -> Result<()> {
        let current = self.read32(addr)?;
        self.write32(addr, (current & !mask) | (value & mask))
    }

    /// Wait until `(*addr & mask) == expected` or `timeout_us` elapses.
    fn mask_poll(&mut self, addr: u64, mask: u32, expected: u32, timeout_us: u32, mode: PollMode) -> Result<()> {
        poll_until(|| self.read32(addr), addr, mask, expected, timeout_us, mode)
    }

    /// Write `value` to `count` consecutive words starting at `addr`.
    fn block_set32(&mut self, addr: u64, value: u32, count: u32) -> Result<()> {
        for i in 0..count as u64 {
            self.write32(addr + i * 4, value)?;
        }
        Ok(())
    }

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Bounded poll loop shared by backends that can observe registers.
///
/// The register is read at least once; the loop ends with
/// [`Error::Timeout`] only after `timeout_us` has fully elapsed.
pub fn poll_until<F>(
    mut read: F,
    addr: u64,
    mask: u32,
    expected: u32,
    timeout_us: u32,
    mode: PollMode,
) -> Result<()>
where
    F: FnMut() -> Result<u32>,
{
    let timeout = Duration::from_micros(timeout_us as u64);
    let start = Instant::now();
    loop {
        if read()? & mask == expected {
            return Ok(());
        }
        if start.elapsed() >= timeout {
            return Err(Error::Timeout { addr, mask, expected, timeout_us });
        }
        match mode {
            PollMode::Yield => std::thread::sleep(POLL_INTERVAL),
            PollMode::Busy => std::hint::spin_loop(),
        }
    }
}

// ============================================================================
// Registry
// ============================================================================

/// Constructor of an uninitialized backend.
pub type BackendFactory = fn() -> Box<dyn Backend>;

/// Fixed table of backend factories, indexed by [`BackendKind`].
///
/// Built once and passed to [`crate::device::DeviceInstance::io_init`].
#[derive(Clone, Copy)]
pub struct BackendRegistry {
    slots: [Option<BackendFactory>; BackendKind::COUNT],
}

impl BackendRegistry {
    /// Registry with no backends.
    pub const fn empty() -> Self {
        Self { slots: [None; BackendKind::COUNT] }
    }

    /// Every backend compiled into this build.
    pub fn builtin() -> Self {
        let registry = Self::empty()
            .with(BackendKind::Sim, new_sim)
            .with(BackendKind::Debug, new_debug)
            .with(BackendKind::Cdo, new_cdo)
            .with(BackendKind::Txn, new_txn);
        #[cfg(feature = "live")]
        let registry = registry.with(BackendKind::Live, new_live);
        registry
    }

    /// Fill the slot of `kind`.
    pub fn with(mut self, kind: BackendKind, factory: BackendFactory) -> Self {
        self.slots[kind.index()] = Some(factory);
        self
    }

    pub fn contains(&self, kind: BackendKind) -> bool {
        self.slots[kind.index()].is_some()
    }

    /// Kinds with a factory.
    pub fn available(&self) -> impl Iterator<Item = BackendKind> + '_ {
        BackendKind::ALL.into_iter().filter(|k| self.contains(*k))
    }

    /// Construct and initialize the backend of `kind`.
    pub fn bind(&self, kind: BackendKind, opts: &BackendOptions) -> Result<Box<dyn Backend>> {
        let factory = self.slots[kind.index()].ok_or(Error::InvalidBackend(kind))?;
        let mut backend = factory();
        backend.init(opts)?;
        Ok(backend)
    }
}

fn new_sim() -> Box<dyn Backend> {
    Box::new(sim::SimBackend::new())
}

fn new_debug() -> Box<dyn Backend> {
    Box::new(debug::DebugBackend::new())
}

fn new_cdo() -> Box<dyn Backend> {
    Box::new(cdo::CdoBackend::new())
}

fn new_txn() -> Box<dyn Backend> {
    Box::new(txn::TxnBackend::new())
}

#[cfg(feature = "live")]
fn new_live() -> Box<dyn Backend> {
    Box::new(live::LiveBackend::new())
}

impl fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.available()).finish()
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceGeneration;

    fn opts() -> BackendOptions {
        BackendOptions::for_config(&DeviceConfig::new(DeviceGeneration::Aie2Ipu, 0, 4))
    }

    #[test]
    fn test_kind_parse_and_index() {
        for (i, kind) in BackendKind::ALL.iter().enumerate() {
            assert_eq!(kind.index(), i);
            assert_eq!(kind.to_string().parse::<BackendKind>().unwrap(), *kind);
        }
        assert!("hw".parse::<BackendKind>().is_err());
        assert!(BackendKind::Cdo.is_capture());
        assert!(!BackendKind::Sim.is_capture());
    }

    #[test]
    fn test_empty_registry_rejects_bind() {
        let registry = BackendRegistry::empty();
        let err = registry.bind(BackendKind::Sim, &opts()).unwrap_err();
        assert_eq!(err, Error::InvalidBackend(BackendKind::Sim));
    }

    #[test]
    fn test_builtin_binds_capture_backends() {
        let registry = BackendRegistry::builtin();
        for kind in [BackendKind::Sim, BackendKind::Debug, BackendKind::Cdo, BackendKind::Txn] {
            let backend = registry.bind(kind, &opts()).unwrap();
            assert_eq!(backend.kind(), kind);
        }
    }

    #[test]
    fn test_custom_slot() {
        let registry = BackendRegistry::empty().with(BackendKind::Live, new_sim);
        assert!(registry.contains(BackendKind::Live));
        assert!(!registry.contains(BackendKind::Sim));
        assert_eq!(registry.available().collect::<Vec<_>>(), vec![BackendKind::Live]);
    }

    #[test]
    fn test_aperture_covers_partition() {
        let o = opts();
        assert_eq!(o.aperture_size, 4 << 25);
        assert_eq!(o.num_mem_tile_rows, 1);
    }

    #[test]
    fn test_poll_until_zero_timeout_reads_once() {
        let mut reads = 0;
        let result = poll_until(
            || {
                reads += 1;
                Ok(0)
            },
            0x100,
            1,
            1,
            0,
            PollMode::Busy,
        );
        assert!(matches!(result, Err(Error::Timeout { addr: 0x100, timeout_us: 0, .. })));
        assert_eq!(reads, 1);
    }

    #[test]
    fn test_poll_until_does_not_return_early() {
        let start = Instant::now();
        let result = poll_until(|| Ok(0), 0, 1, 1, 2000, PollMode::Yield);
        assert!(result.unwrap_err().is_timeout());
        assert!(start.elapsed() >= Duration::from_micros(2000));
    }
}
