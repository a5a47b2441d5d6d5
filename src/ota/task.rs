//! The OTA task: consumes [`OtaCommand`]s in posting order and drives one
//! [`OtaSession`] at a time.
//!
//! End of stream is reached when a chunk carries `last`, or the declared
//! image size has been written, or (no size declared) a chunk is shorter
//! than the configured maximum chunk size.
//!
//! On a verified image the task arms [`BootCommand::LoadUpdateImage`],
//! broadcasts shutdown, waits out the grace period and resets.  On any
//! failure it drops the session and goes back to idle; nothing is armed.

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::channel::Receiver;
use embedded_hal::delay::DelayNs;
use log::{info, warn};

use super::{OtaCommand, OtaError, OtaSession, OtaState, OtaStatus, UpdateChunk};
use crate::app::events::AppEvent;
use crate::app::ports::{EventSink, PartitionStore, PlatformControl, SystemBus, UpdateSource};
use crate::boot::{BootCommand, BootCommandStore};
use crate::config::SystemConfig;
use crate::image::{self, Version};
use crate::partition::PartitionId;

/// Everything the OTA task talks to.
pub struct OtaPorts<S, N, B, D, P, E> {
    pub store: S,
    pub network: N,
    pub bus: B,
    pub delay: D,
    pub platform: P,
    pub sink: E,
}

pub struct OtaTask<S, N, B, D, P, E> {
    ports: OtaPorts<S, N, B, D, P, E>,
    max_chunk_size: u32,
    shutdown_grace_ms: u32,
    firmware_version: Version,
    session: Option<OtaSession>,
}

impl<S, N, B, D, P, E> OtaTask<S, N, B, D, P, E>
where
    S: PartitionStore,
    N: UpdateSource,
    B: SystemBus,
    D: DelayNs,
    P: PlatformControl,
    E: EventSink,
{
    pub fn new(ports: OtaPorts<S, N, B, D, P, E>, config: &SystemConfig) -> Self {
        Self {
            ports,
            max_chunk_size: config.max_chunk_size,
            shutdown_grace_ms: config.shutdown_grace_ms,
            firmware_version: config.firmware_version,
            session: None,
        }
    }

    pub fn state(&self) -> OtaState {
        match &self.session {
            None => OtaState::Idle,
            Some(s) => OtaState::Downloading {
                bytes_written: s.bytes_written(),
                declared_size: s.declared_size(),
            },
        }
    }

    pub fn ports(&self) -> &OtaPorts<S, N, B, D, P, E> {
        &self.ports
    }

    pub fn ports_mut(&mut self) -> &mut OtaPorts<S, N, B, D, P, E> {
        &mut self.ports
    }

    pub fn into_ports(self) -> OtaPorts<S, N, B, D, P, E> {
        self.ports
    }

    /// Process one command to completion.
    pub fn handle(&mut self, cmd: OtaCommand) -> Result<OtaStatus, OtaError> {
        match cmd {
            OtaCommand::Start { image_size } => self.start(image_size),
            OtaCommand::Chunk(chunk) => self.chunk(&chunk),
        }
    }

    /// Serve commands from `rx` until an update has been installed and the
    /// reset issued.  On hardware the reset never returns.
    pub async fn run<M: RawMutex, const Q: usize>(
        mut self,
        rx: Receiver<'_, M, OtaCommand, Q>,
    ) -> Self {
        info!("OTA: task running (firmware v{})", self.firmware_version);
        loop {
            let cmd = rx.receive().await;
            if let Ok(OtaStatus::Rebooting) = self.handle(cmd) {
                return self;
            }
        }
    }

    // ── Commands ──────────────────────────────────────────────

    fn start(&mut self, image_size: Option<u32>) -> Result<OtaStatus, OtaError> {
        let discarded = self.session.take();
        if let Some(old) = &discarded {
            self.ports.sink.emit(&AppEvent::OtaSessionDiscarded {
                bytes_written: old.bytes_written(),
            });
        }

        let capacity = self.ports.store.capacity(PartitionId::UpdateStaging);
        if image_size.is_some_and(|size| size > capacity) {
            // A refused Start still drops what the old session wrote.
            let dropped = match discarded {
                Some(_) => self.ports.store.clear(PartitionId::UpdateStaging),
                None => Ok(()),
            };
            if let Err(e) = dropped {
                return self.fail(OtaError::Storage(e));
            }
            return self.fail(OtaError::ImageTooLarge);
        }

        let session = match OtaSession::open(&mut self.ports.store, image_size) {
            Ok(s) => s,
            Err(e) => return self.fail(OtaError::Storage(e)),
        };
        self.session = Some(session);
        self.ports.sink.emit(&AppEvent::OtaStarted {
            declared_size: image_size,
        });

        if let Err(e) = self.ports.network.request_image(self.firmware_version) {
            return self.fail(OtaError::Network(e));
        }
        info!("OTA: begin (staging capacity {} bytes)", capacity);
        Ok(OtaStatus::Started)
    }

    fn chunk(&mut self, chunk: &UpdateChunk) -> Result<OtaStatus, OtaError> {
        let Some(session) = self.session.as_mut() else {
            warn!("OTA: chunk of {} bytes with no open session", chunk.data.len());
            return Err(OtaError::NotReceiving);
        };

        let len = chunk.data.len() as u32;
        if len > self.max_chunk_size {
            return self.fail(OtaError::ChunkTooLarge);
        }
        let declared = session.declared_size();
        let after = u64::from(session.bytes_written()) + u64::from(len);
        if declared.is_some_and(|size| after > u64::from(size)) {
            return self.fail(OtaError::Overflow);
        }

        let written = match session.append(&mut self.ports.store, &chunk.data) {
            Ok(n) => n,
            Err(e) => return self.fail(OtaError::Storage(e)),
        };
        self.ports.sink.emit(&AppEvent::OtaChunkWritten {
            bytes_written: written,
        });

        let complete = match declared {
            Some(size) => written == size,
            None => len < self.max_chunk_size,
        };
        if chunk.last && !complete && declared.is_some() {
            return self.fail(OtaError::IncompleteTransfer);
        }
        if !(chunk.last || complete) {
            return Ok(OtaStatus::Receiving {
                bytes_written: written,
            });
        }

        self.finish()
    }

    // ── End of stream ─────────────────────────────────────────

    fn finish(&mut self) -> Result<OtaStatus, OtaError> {
        let Some(session) = self.session.take() else {
            return Err(OtaError::NotReceiving);
        };
        self.ports.sink.emit(&AppEvent::OtaVerifying {
            bytes_written: session.bytes_written(),
        });

        if let Err(e) = session.finish(&mut self.ports.store) {
            return self.fail(OtaError::Storage(e));
        }
        let header = match image::check_image(&mut self.ports.store, PartitionId::UpdateStaging) {
            Ok(h) => h,
            Err(e) => return self.fail(OtaError::VerifyFailed(e)),
        };

        let armed = BootCommandStore::new(&mut self.ports.store).write(BootCommand::LoadUpdateImage);
        if let Err(e) = armed {
            warn!("OTA: boot command write failed: {}", e);
            return self.fail(OtaError::BootSetFailed);
        }
        self.ports.sink.emit(&AppEvent::OtaVerified {
            version: header.version(),
            img_size: header.img_size(),
        });

        self.ports.bus.broadcast_shutdown();
        self.ports.sink.emit(&AppEvent::OtaRebooting);
        self.ports.delay.delay_ms(self.shutdown_grace_ms);
        self.ports.platform.reset();
        Ok(OtaStatus::Rebooting)
    }

    fn fail(&mut self, error: OtaError) -> Result<OtaStatus, OtaError> {
        self.session = None;
        self.ports.sink.emit(&AppEvent::OtaFailed(error));
        Err(error)
    }
}
