//! Logical events and their physical encodings.
//!
//! Callers name events by [`Event`], which is stable across generations.
//! Each generation's module table carries a physical code table indexed by
//! the logical event; [`EVENT_INVALID`] marks events that do not exist on
//! that generation. Every event belongs to exactly one [`EventModule`], and
//! may only be programmed into registers of that module.
//!
//! The macro below keeps the enum, the module ranges and the AIE-ML code
//! table in one place so they cannot drift apart.

use std::fmt;

use crate::error::{Error, Result};

/// Physical code for an event the generation does not implement.
pub const EVENT_INVALID: u8 = 0xFF;

/// Event-producing module of a tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventModule {
    /// Compute tile core module
    Core,
    /// Compute tile memory module
    Mem,
    /// Memory tile
    MemTile,
    /// Shim tile (PL/NoC module)
    Pl,
}

impl fmt::Display for EventModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventModule::Core => write!(f, "core"),
            EventModule::Mem => write!(f, "memory"),
            EventModule::MemTile => write!(f, "memtile"),
            EventModule::Pl => write!(f, "pl"),
        }
    }
}

const NA: u8 = EVENT_INVALID;

macro_rules! logical_events {
    ( $( $module:ident { $( $variant:ident = $phys:expr ),+ $(,)? } )+ ) => {
        /// Generation-independent event identifier.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[repr(u16)]
        pub enum Event {
            $( $( $variant, )+ )+
        }

        impl Event {
            /// Every logical event, in discriminant order.
            pub const ALL: &'static [Event] = &[ $( $( Event::$variant, )+ )+ ];

            /// Module whose event range contains this event.
            pub const fn module(self) -> EventModule {
                match self {
                    $( $( Event::$variant )|+ => EventModule::$module, )+
                }
            }
        }

        /// AIE-ML physical codes, indexed by `Event as usize`.
        pub(crate) const AIEML_EVENT_CODES: &[u8] = &[ $( $( $phys, )+ )+ ];
    };
}

logical_events! {
    Core {
        NoneCore = 0,
        TrueCore = 1,
        Group0Core = 2,
        TimerSyncCore = 3,
        TimerValueReachedCore = 4,
        PerfCnt0Core = 5,
        PerfCnt1Core = 6,
        PerfCnt2Core = 7,
        PerfCnt3Core = 8,
        ComboEvent0Core = 9,
        ComboEvent1Core = 10,
        ComboEvent2Core = 11,
        ComboEvent3Core = 12,
        EdgeDetection0Core = 13,
        EdgeDetection1Core = 14,
        GroupPcEventCore = 15,
        Pc0Core = 16,
        Pc1Core = 17,
        Pc2Core = 18,
        Pc3Core = 19,
        PcRange01Core = 20,
        PcRange23Core = 21,
        GroupStallCore = 22,
        MemoryStallCore = 23,
        StreamStallCore = 24,
        CascadeStallCore = 25,
        LockStallCore = 26,
        DebugHaltedCore = 27,
        ActiveCore = 28,
        DisabledCore = 29,
        EccErrorStallCore = 30,
        EccScrubbingStallCore = 31,
        GroupProgramFlowCore = 32,
        InstrEvent0Core = 33,
        InstrEvent1Core = 34,
        InstrCallCore = 35,
        InstrReturnCore = 36,
        InstrVectorCore = 37,
        InstrLoadCore = 38,
        InstrStoreCore = 39,
        InstrStreamGetCore = 40,
        InstrStreamPutCore = 41,
        InstrCascadeGetCore = 42,
        InstrCascadePutCore = 43,
        InstrLockAcquireReqCore = 44,
        InstrLockReleaseReqCore = 45,
        GroupErrors0Core = 46,
        GroupErrors1Core = 47,
        SrsOverflowCore = 48,
        UpsOverflowCore = 49,
        FpHugeCore = 50,
        IntFpZeroCore = 51,
        FpInvalidCore = 52,
        FpInfCore = 53,
        FpDivByZeroCore = NA,
        PmRegAccessFailureCore = 55,
        StreamPktParityErrorCore = 56,
        ControlPktErrorCore = 57,
        AxiMmSlaveErrorCore = 58,
        InstrDecompressionErrorCore = 59,
        DmAddressOutOfRangeCore = 60,
        PmEccErrorScrubCorrectedCore = 61,
        PmEccErrorScrub2BitCore = 62,
        PmEccError1BitCore = 63,
        PmEccError2BitCore = 64,
        PmAddressOutOfRangeCore = 65,
        DmAccessToUnavailableCore = 66,
        LockAccessToUnavailableCore = 67,
        InstrWarningCore = 68,
        InstrErrorCore = 69,
        DecompressionUnderflowCore = 70,
        StreamSwitchPortParityErrorCore = 71,
        ProcessorBusErrorCore = 72,
        GroupBroadcastCore = 106,
        Broadcast0Core = 107,
        Broadcast1Core = 108,
        Broadcast2Core = 109,
        Broadcast3Core = 110,
        Broadcast4Core = 111,
        Broadcast5Core = 112,
        Broadcast6Core = 113,
        Broadcast7Core = 114,
        Broadcast8Core = 115,
        Broadcast9Core = 116,
        Broadcast10Core = 117,
        Broadcast11Core = 118,
        Broadcast12Core = 119,
        Broadcast13Core = 120,
        Broadcast14Core = 121,
        Broadcast15Core = 122,
        GroupUserEventCore = 123,
        UserEvent0Core = 124,
        UserEvent1Core = 125,
        UserEvent2Core = 126,
        UserEvent3Core = 127,
    }
    Mem {
        NoneMem = 0,
        TrueMem = 1,
        Group0Mem = 2,
        TimerSyncMem = 3,
        TimerValueReachedMem = 4,
        PerfCnt0Mem = 5,
        PerfCnt1Mem = 6,
        ComboEvent0Mem = 7,
        ComboEvent1Mem = 8,
        ComboEvent2Mem = 9,
        ComboEvent3Mem = 10,
        EdgeDetection0Mem = 11,
        EdgeDetection1Mem = 12,
        GroupWatchpointMem = 15,
        Watchpoint0Mem = 16,
        Watchpoint1Mem = 17,
        GroupDmaActivityMem = 18,
        DmaS2mm0StartTaskMem = 19,
        DmaS2mm1StartTaskMem = 20,
        DmaMm2s0StartTaskMem = 21,
        DmaMm2s1StartTaskMem = 22,
        DmaS2mm0FinishedBdMem = 23,
        DmaS2mm1FinishedBdMem = 24,
        DmaMm2s0FinishedBdMem = 25,
        DmaMm2s1FinishedBdMem = 26,
        DmaS2mm0FinishedTaskMem = 27,
        DmaS2mm1FinishedTaskMem = 28,
        DmaMm2s0FinishedTaskMem = 29,
        DmaMm2s1FinishedTaskMem = 30,
        GroupLockMem = 43,
        GroupMemoryConflictMem = 76,
        GroupErrorsMem = 86,
        DmEccErrorScrubCorrectedMem = 87,
        DmEccErrorScrub2BitMem = 88,
        DmEccError1BitMem = 89,
        DmEccError2BitMem = 90,
        DmaS2mmErrorMem = 91,
        DmaMm2sErrorMem = 92,
        GroupBroadcastMem = 106,
        Broadcast0Mem = 107,
        Broadcast1Mem = 108,
        Broadcast2Mem = 109,
        Broadcast3Mem = 110,
        Broadcast4Mem = 111,
        Broadcast5Mem = 112,
        Broadcast6Mem = 113,
        Broadcast7Mem = 114,
        Broadcast8Mem = 115,
        Broadcast9Mem = 116,
        Broadcast10Mem = 117,
        Broadcast11Mem = 118,
        Broadcast12Mem = 119,
        Broadcast13Mem = 120,
        Broadcast14Mem = 121,
        Broadcast15Mem = 122,
        GroupUserEventMem = 123,
        UserEvent0Mem = 124,
        UserEvent1Mem = 125,
        UserEvent2Mem = 126,
        UserEvent3Mem = 127,
    }
    MemTile {
        NoneMemTile = 0,
        TrueMemTile = 1,
        Group0MemTile = 2,
        TimerSyncMemTile = 3,
        TimerValueReachedMemTile = 4,
        PerfCnt0MemTile = 5,
        PerfCnt1MemTile = 6,
        PerfCnt2MemTile = 7,
        PerfCnt3MemTile = 8,
        ComboEvent0MemTile = 9,
        ComboEvent1MemTile = 10,
        ComboEvent2MemTile = 11,
        ComboEvent3MemTile = 12,
        EdgeDetection0MemTile = 13,
        EdgeDetection1MemTile = 14,
        GroupWatchpointMemTile = 15,
        Watchpoint0MemTile = 16,
        Watchpoint1MemTile = 17,
        Watchpoint2MemTile = 18,
        Watchpoint3MemTile = 19,
        GroupDmaActivityMemTile = 20,
        DmaS2mmSel0StartTaskMemTile = 21,
        DmaS2mmSel1StartTaskMemTile = 22,
        DmaMm2sSel0StartTaskMemTile = 23,
        DmaMm2sSel1StartTaskMemTile = 24,
        DmaS2mmSel0FinishedBdMemTile = 25,
        DmaS2mmSel1FinishedBdMemTile = 26,
        DmaMm2sSel0FinishedBdMemTile = 27,
        DmaMm2sSel1FinishedBdMemTile = 28,
        GroupErrorsMemTile = 128,
        DmEccErrorScrubCorrectedMemTile = 129,
        DmEccErrorScrub2BitMemTile = 130,
        DmEccError1BitMemTile = 131,
        DmEccError2BitMemTile = 132,
        DmaS2mmErrorMemTile = 133,
        DmaMm2sErrorMemTile = 134,
        StreamSwitchParityErrorMemTile = 135,
        StreamPktParityErrorMemTile = 136,
        ControlPktErrorMemTile = 137,
        AxiMmSlaveErrorMemTile = 138,
        LockErrorMemTile = 139,
        DmaTaskTokenStallMemTile = 140,
        GroupBroadcastMemTile = 141,
        Broadcast0MemTile = 142,
        Broadcast1MemTile = 143,
        Broadcast2MemTile = 144,
        Broadcast3MemTile = 145,
        Broadcast4MemTile = 146,
        Broadcast5MemTile = 147,
        Broadcast6MemTile = 148,
        Broadcast7MemTile = 149,
        Broadcast8MemTile = 150,
        Broadcast9MemTile = 151,
        Broadcast10MemTile = 152,
        Broadcast11MemTile = 153,
        Broadcast12MemTile = 154,
        Broadcast13MemTile = 155,
        Broadcast14MemTile = 156,
        Broadcast15MemTile = 157,
        GroupUserEventMemTile = 158,
        UserEvent0MemTile = 159,
        UserEvent1MemTile = 160,
    }
    Pl {
        NonePl = 0,
        TruePl = 1,
        Group0Pl = 2,
        TimerSyncPl = 3,
        TimerValueReachedPl = 4,
        PerfCnt0Pl = 5,
        PerfCnt1Pl = 6,
        ComboEvent0Pl = 7,
        ComboEvent1Pl = 8,
        ComboEvent2Pl = 9,
        ComboEvent3Pl = 10,
        EdgeDetection0Pl = 11,
        EdgeDetection1Pl = 12,
        GroupDmaActivityPl = 13,
        DmaS2mm0StartTaskPl = 14,
        DmaS2mm1StartTaskPl = 15,
        DmaMm2s0StartTaskPl = 16,
        DmaMm2s1StartTaskPl = 17,
        DmaS2mm0FinishedBdPl = 18,
        DmaS2mm1FinishedBdPl = 19,
        DmaMm2s0FinishedBdPl = 20,
        DmaMm2s1FinishedBdPl = 21,
        GroupErrorsPl = 62,
        AxiMmSlaveTileErrorPl = 63,
        ControlPktErrorPl = 64,
        AxiMmDecodeNsuErrorPl = 65,
        AxiMmSlaveNsuErrorPl = 66,
        AxiMmUnsupportedTrafficPl = 67,
        AxiMmUnsecureAccessInSecureModePl = 68,
        AxiMmByteStrobeErrorPl = 69,
        DmaS2mmErrorPl = 70,
        DmaMm2sErrorPl = 71,
        StreamSwitchPortParityErrorPl = 72,
        StreamPktParityErrorPl = 73,
        LockErrorPl = 74,
        DmaTaskTokenStallPl = 75,
        GroupBroadcastAPl = 109,
        Broadcast0APl = 110,
        Broadcast1APl = 111,
        Broadcast2APl = 112,
        Broadcast3APl = 113,
        Broadcast4APl = 114,
        Broadcast5APl = 115,
        Broadcast6APl = 116,
        Broadcast7APl = 117,
        Broadcast8APl = 118,
        Broadcast9APl = 119,
        Broadcast10APl = 120,
        Broadcast11APl = 121,
        Broadcast12APl = 122,
        Broadcast13APl = 123,
        Broadcast14APl = 124,
        Broadcast15APl = 125,
        UserEvent0Pl = 126,
        UserEvent1Pl = 127,
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Logical-to-physical event table of one generation.
#[derive(Debug, Clone, Copy)]
pub struct EventMap {
    /// Physical codes indexed by `Event as usize`
    pub codes: &'static [u8],
}

impl EventMap {
    /// Resolve `event` for a register of `module`.
    ///
    /// Fails when the event lies outside the module's range, or when the
    /// generation has no physical code for it.
    pub fn physical(&self, module: EventModule, event: Event) -> Result<u8> {
        if event.module() != module {
            return Err(Error::InvalidArgument(format!(
                "event {} is not in the {} module range",
                event, module
            )));
        }
        match self.codes.get(event as usize).copied() {
            Some(code) if code != EVENT_INVALID => Ok(code),
            _ => Err(Error::InvalidArgument(format!(
                "event {} has no physical mapping on this generation",
                event
            ))),
        }
    }
}

/// AIE-ML event table (shared by the client NPU and AIE2P variants).
pub const AIEML_EVENTS: EventMap = EventMap { codes: AIEML_EVENT_CODES };

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_table_covers_every_event() {
        assert_eq!(AIEML_EVENT_CODES.len(), Event::ALL.len());
        for (i, event) in Event::ALL.iter().enumerate() {
            assert_eq!(*event as usize, i);
        }
    }

    #[test]
    fn test_module_ranges_are_contiguous() {
        let mut seen: Vec<EventModule> = Vec::new();
        for event in Event::ALL {
            let module = event.module();
            if seen.last() != Some(&module) {
                assert!(!seen.contains(&module), "{} range is split", module);
                seen.push(module);
            }
        }
        assert_eq!(seen.len(), 4);
    }

    #[test]
    fn test_physical_codes_unique_per_module() {
        for module in [EventModule::Core, EventModule::Mem, EventModule::MemTile, EventModule::Pl] {
            let mut codes: Vec<u8> = Event::ALL
                .iter()
                .filter(|e| e.module() == module)
                .map(|e| AIEML_EVENT_CODES[*e as usize])
                .filter(|&c| c != EVENT_INVALID)
                .collect();
            let total = codes.len();
            codes.sort_unstable();
            codes.dedup();
            assert_eq!(codes.len(), total, "duplicate physical code in {}", module);
        }
    }

    #[test]
    fn test_physical_lookup() {
        assert_eq!(AIEML_EVENTS.physical(EventModule::Core, Event::ActiveCore).unwrap(), 28);
        assert_eq!(AIEML_EVENTS.physical(EventModule::Pl, Event::UserEvent1Pl).unwrap(), 127);
        assert_eq!(
            AIEML_EVENTS.physical(EventModule::MemTile, Event::Broadcast15MemTile).unwrap(),
            157
        );
    }

    #[test]
    fn test_out_of_range_event_rejected() {
        let err = AIEML_EVENTS.physical(EventModule::Core, Event::TrueMem).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(msg) if msg.contains("range")));
    }

    #[test]
    fn test_unmapped_event_rejected() {
        let err = AIEML_EVENTS
            .physical(EventModule::Core, Event::FpDivByZeroCore)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(msg) if msg.contains("no physical mapping")));
    }
}
