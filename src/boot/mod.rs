//! Bootloader control flow.
//!
//! One pass per power-on, before any scheduler runs:
//!
//! ```text
//!  START ──▶ PROCESS_COMMAND ──▶ ATTEMPT_BOOT_ACTIVE ──[ok]──▶ EXECUTE
//!                                        │
//!                                     [failed]
//!                                        ▼
//!                                 STAGE_RECOVERY ──▶ ATTEMPT_BOOT_RECOVERY ──[ok]──▶ EXECUTE
//!                                                              │
//!                                                           [failed]
//!                                                              ▼
//!                                                            HALT
//! ```
//!
//! Copying an image never implies trust: whatever ends up in Active is
//! verified before control is handed to it.  Recovery is tried exactly
//! once; there is no third fallback.

pub mod command;

pub use command::{
    BOOTLOADER_VERSION, BootCommand, BootCommandStore, bootloader_version, request_recovery_image,
    request_update_image,
};

use log::{info, warn};

use crate::app::events::AppEvent;
use crate::app::ports::{EntryPoint, EventSink, PartitionStore, PlatformControl, StorageError};
use crate::config::SystemConfig;
use crate::image::{self, AppImageHeader, HEADER_SLOT_SIZE, ImageError};
use crate::partition::{PartitionId, PartitionLayout};

/// Largest block the bootloader moves per read/write during a copy.
pub const MAX_COPY_BLOCK: usize = 1024;

/// Longest possible path through the state machine.
const MAX_TRACE: usize = 8;

// ---------------------------------------------------------------------------
// State identity
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum BootState {
    Start = 0,
    ProcessCommand = 1,
    AttemptBootActive = 2,
    StageRecovery = 3,
    AttemptBootRecovery = 4,
    Execute = 5,
    Halt = 6,
}

impl BootState {
    pub fn name(self) -> &'static str {
        match self {
            Self::Start => "Start",
            Self::ProcessCommand => "ProcessCommand",
            Self::AttemptBootActive => "AttemptBootActive",
            Self::StageRecovery => "StageRecovery",
            Self::AttemptBootRecovery => "AttemptBootRecovery",
            Self::Execute => "Execute",
            Self::Halt => "Halt",
        }
    }
}

/// How the boot pass ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootOutcome {
    /// Control was handed to the image at this entry point.
    Execute(EntryPoint),
    /// Neither Active nor Recovery holds a valid image.
    Halt,
}

// ---------------------------------------------------------------------------
// Bootloader
// ---------------------------------------------------------------------------

pub struct Bootloader {
    layout: PartitionLayout,
    copy_block: usize,
    state: BootState,
    trace: heapless::Vec<BootState, MAX_TRACE>,
}

impl Bootloader {
    pub fn new(config: &SystemConfig) -> Self {
        Self {
            layout: config.layout.clone(),
            copy_block: (config.copy_block_size as usize).clamp(1, MAX_COPY_BLOCK),
            state: BootState::Start,
            trace: heapless::Vec::new(),
        }
    }

    /// The state the last pass ended in.
    pub fn state(&self) -> BootState {
        self.state
    }

    /// Every state visited by the last pass, in order.
    pub fn trace(&self) -> &[BootState] {
        &self.trace
    }

    /// Run the boot pass.
    ///
    /// On hardware `platform.jump_to` never returns; the returned outcome
    /// is only observed on the host and on the `Halt` path.
    pub fn run<S, P, E>(&mut self, store: &mut S, platform: &mut P, sink: &mut E) -> BootOutcome
    where
        S: PartitionStore,
        P: PlatformControl,
        E: EventSink,
    {
        self.trace.clear();
        self.enter(BootState::Start);

        let mut command = BootCommand::Default;
        let mut entry = None;

        loop {
            let next = match self.state {
                BootState::Start => {
                    sink.emit(&AppEvent::BootStarted {
                        version: command::BOOTLOADER_VERSION,
                    });
                    command = BootCommandStore::new(store).read();
                    sink.emit(&AppEvent::BootCommandRead(command));
                    BootState::ProcessCommand
                }
                BootState::ProcessCommand => {
                    if let Some(src) = command.copy_source() {
                        self.stage(store, src, PartitionId::Active, sink);
                        // Consume the request whatever the copy did, or every
                        // boot would repeat it.
                        match BootCommandStore::new(store).write(BootCommand::Default) {
                            Ok(()) => sink.emit(&AppEvent::BootCommandConsumed(command)),
                            Err(e) => warn!("could not reset boot command: {}", e),
                        }
                    }
                    BootState::AttemptBootActive
                }
                BootState::AttemptBootActive => {
                    entry = self.attempt(store, sink);
                    if entry.is_some() {
                        BootState::Execute
                    } else {
                        sink.emit(&AppEvent::FallingBackToRecovery);
                        BootState::StageRecovery
                    }
                }
                BootState::StageRecovery => {
                    self.stage(store, PartitionId::Recovery, PartitionId::Active, sink);
                    BootState::AttemptBootRecovery
                }
                BootState::AttemptBootRecovery => {
                    entry = self.attempt(store, sink);
                    if entry.is_some() {
                        BootState::Execute
                    } else {
                        BootState::Halt
                    }
                }
                BootState::Execute => {
                    let Some(entry) = entry else {
                        // Only reachable through an attempt that found one.
                        self.enter(BootState::Halt);
                        continue;
                    };
                    sink.emit(&AppEvent::Executing(entry));
                    platform.jump_to(entry);
                    return BootOutcome::Execute(entry);
                }
                BootState::Halt => {
                    sink.emit(&AppEvent::Halted);
                    return BootOutcome::Halt;
                }
            };
            self.enter(next);
        }
    }

    // -----------------------------------------------------------------------
    // Internal
    // -----------------------------------------------------------------------

    fn enter(&mut self, next: BootState) {
        if !self.trace.is_empty() {
            info!("BOOT transition: {} -> {}", self.state.name(), next.name());
        }
        self.state = next;
        let _ = self.trace.push(next);
    }

    /// Verify Active and work out where to jump.
    fn attempt<S: PartitionStore, E: EventSink>(
        &self,
        store: &mut S,
        sink: &mut E,
    ) -> Option<EntryPoint> {
        let partition = PartitionId::Active;
        let result = image::read_header(store, partition).and_then(|header| {
            sink.emit(&AppEvent::ImageHeaderFound {
                partition,
                version: header.version(),
                img_size: header.img_size(),
                crc: header.crc(),
            });
            image::check_image(store, partition)?;
            self.entry_point(store, &header)
        });

        match result {
            Ok((version, entry)) => {
                sink.emit(&AppEvent::ImageVerified { partition, version });
                Some(entry)
            }
            Err(reason) => {
                sink.emit(&AppEvent::ImageRejected { partition, reason });
                None
            }
        }
    }

    fn entry_point<S: PartitionStore>(
        &self,
        store: &mut S,
        header: &AppImageHeader,
    ) -> Result<(image::Version, EntryPoint), ImageError> {
        if header.img_size() < 8 {
            return Err(ImageError::NoVectorTable {
                img_size: header.img_size(),
            });
        }
        let mut words = [0u8; 8];
        store.read(PartitionId::Active, HEADER_SLOT_SIZE, &mut words)?;
        let word = |i: usize| u32::from_le_bytes([words[i], words[i + 1], words[i + 2], words[i + 3]]);
        Ok((
            header.version(),
            EntryPoint {
                vector_table: self.layout.xip_address(PartitionId::Active, HEADER_SLOT_SIZE),
                stack_pointer: word(0),
                reset_vector: word(4),
            },
        ))
    }

    /// Copy the image in `from` over `to`, header slot included.
    ///
    /// Skipped when `from` holds no header or its image would not fit
    /// `to`; the target is then left untouched.
    fn stage<S: PartitionStore, E: EventSink>(
        &self,
        store: &mut S,
        from: PartitionId,
        to: PartitionId,
        sink: &mut E,
    ) {
        let header = match image::read_header(store, from) {
            Ok(h) => h,
            Err(reason) => {
                sink.emit(&AppEvent::StagingSkipped { from, reason });
                return;
            }
        };
        let capacity = store.capacity(to);
        if header.total_len() > capacity as u64 {
            sink.emit(&AppEvent::StagingSkipped {
                from,
                reason: ImageError::SizeOutOfBounds {
                    img_size: header.img_size(),
                    capacity,
                },
            });
            return;
        }

        sink.emit(&AppEvent::StagingImage { from, to });
        let len = header.total_len() as u32;
        match self.copy(store, from, to, len) {
            Ok(()) => sink.emit(&AppEvent::ImageStaged {
                from,
                to,
                bytes: len,
            }),
            Err(error) => sink.emit(&AppEvent::StagingFailed { from, error }),
        }
    }

    fn copy<S: PartitionStore>(
        &self,
        store: &mut S,
        from: PartitionId,
        to: PartitionId,
        len: u32,
    ) -> Result<(), StorageError> {
        store.clear(to)?;
        let mut writer = store.open_for_write(to)?;
        let mut buf = [0u8; MAX_COPY_BLOCK];
        let mut offset = 0u32;
        while offset < len {
            let n = (len - offset).min(self.copy_block as u32) as usize;
            store.read(from, offset, &mut buf[..n])?;
            store.write(&mut writer, &buf[..n])?;
            offset += n as u32;
        }
        store.flush(&mut writer)
    }
}
