//! Control operations on a [`DeviceInstance`](crate::device::DeviceInstance).
//!
//! Each submodule adds an `impl DeviceInstance` block for one function of
//! the array:
//!
//! - [`core`]: compute tile core state machine and event configuration
//! - [`pm`]: clock gating and the tile-in-use bitmap
//! - [`partition`]: partition init/teardown sequences
//! - [`interrupt`]: L1/L2 interrupt controllers
//! - [`perf`]: performance counters
//!
//! All operations validate their inputs (tile type, ranges, event mapping,
//! field precision) before the first register access, and stop at the first
//! failing access.

pub mod core;
pub mod interrupt;
pub mod partition;
pub mod perf;
pub mod pm;

pub use self::core::{CoreState, DEFAULT_CORE_TIMEOUT_US};
pub use interrupt::L1Switch;
pub use partition::{InitFlags, InitOptions, PartitionStep};

#[cfg(test)]
mod tests {
    use crate::backend::cdo::{Cdo, CdoBackend};
    use crate::backend::sim::SimBackend;
    use crate::backend::txn::{TxnBackend, TxnStream};
    use crate::backend::{Backend, BackendOptions};
    use crate::device::{DeviceConfig, DeviceGeneration, DeviceInstance, TileLoc};

    use super::*;

    fn bring_up(dev: &mut DeviceInstance) {
        let opts = InitOptions::new(InitFlags::all() - InitFlags::ZEROIZE_MEM).with_tiles(vec![TileLoc::new(1, 3)]);
        dev.init_part(Some(&opts)).unwrap();
        dev.core_enable(TileLoc::new(1, 3)).unwrap();
        dev.core_wait_for_done(TileLoc::new(1, 3), 10, crate::backend::PollMode::Busy)
            .unwrap_or_else(|e| assert!(e.is_timeout()));
    }

    fn direct(config: DeviceConfig) -> Vec<(u64, u32)> {
        let mut dev = DeviceInstance::with_backend(config, Box::new(SimBackend::new())).unwrap();
        bring_up(&mut dev);
        dev.backend_as::<SimBackend>().unwrap().nonzero()
    }

    #[test]
    fn test_cdo_capture_replays_to_direct_state() {
        let config = DeviceConfig::new(DeviceGeneration::AieMl, 0, 2);
        let expected = direct(config.clone());

        let mut dev = DeviceInstance::with_backend(config, Box::new(CdoBackend::new())).unwrap();
        bring_up(&mut dev);
        let bytes = dev.backend_as::<CdoBackend>().unwrap().to_bytes().unwrap();

        let mut sim = SimBackend::new();
        let stats = sim.replay_cdo(&Cdo::parse(&bytes).unwrap()).unwrap();
        assert!(stats.writes > 0);
        assert_eq!(sim.nonzero(), expected);
    }

    #[test]
    fn test_txn_capture_replays_to_direct_state() {
        let config = DeviceConfig::new(DeviceGeneration::Aie2Ipu, 0, 4);
        let expected = direct(config.clone());

        let mut backend = TxnBackend::new();
        backend.init(&BackendOptions::for_config(&config)).unwrap();
        let mut dev = DeviceInstance::with_backend(config, Box::new(backend)).unwrap();
        bring_up(&mut dev);
        let bytes = dev.backend_as::<TxnBackend>().unwrap().stream().to_bytes().unwrap();

        let stream = TxnStream::parse(&bytes).unwrap();
        assert_eq!(stream.generation, DeviceGeneration::Aie2Ipu);
        let mut sim = SimBackend::new();
        sim.replay_txn(&stream).unwrap();
        assert_eq!(sim.nonzero(), expected);
    }
}
