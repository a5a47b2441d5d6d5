//! Integration tests for the OTA update session.
//!
//! Drives an [`OtaTask`] command by command against fake adapters and
//! checks what ends up in staging, what gets armed and when the device
//! resets.

use crate::mock_hw::{MemStore, StoreOp, app_image, chunk, last_chunk, make_task};

use modelt::app::events::AppEvent;
use modelt::app::ports::{PartitionStore, StorageError};
use modelt::boot::{BootCommand, BootCommandStore};
use modelt::config::FIRMWARE_VERSION;
use modelt::image::{self, HEADER_SLOT_SIZE, Version};
use modelt::ota::{OtaCommand, OtaError, OtaState, OtaStatus};
use modelt::partition::PartitionId;

const V2: Version = Version::new(2, 0, 0);

fn start() -> OtaCommand {
    OtaCommand::Start { image_size: None }
}

// ── QA-O1: short chunk ends the stream ───────────────────────

#[test]
fn chunks_256_256_100_end_after_third_with_612_bytes() {
    // 256 header slot + 356 payload = 612 bytes.
    let img = app_image(V2, 356);
    assert_eq!(img.len(), 612);
    let mut task = make_task(MemStore::new(), 256);

    task.handle(start()).unwrap();
    assert_eq!(
        task.handle(chunk(&img[..256])),
        Ok(OtaStatus::Receiving { bytes_written: 256 })
    );
    assert_eq!(
        task.handle(chunk(&img[256..512])),
        Ok(OtaStatus::Receiving { bytes_written: 512 })
    );
    assert_eq!(task.handle(chunk(&img[512..])), Ok(OtaStatus::Rebooting));

    assert_eq!(task.state(), OtaState::Idle);
    let sink = &task.ports().sink;
    assert!(sink.events.contains(&AppEvent::OtaVerifying { bytes_written: 612 }));
    assert_eq!(&task.ports().store.bytes(PartitionId::UpdateStaging)[..612], &img[..]);
}

#[test]
fn empty_chunk_terminates_an_exact_multiple() {
    let img = app_image(V2, 256);
    assert_eq!(img.len(), 512);
    let mut task = make_task(MemStore::new(), 256);

    task.handle(start()).unwrap();
    task.handle(chunk(&img[..256])).unwrap();
    assert_eq!(
        task.handle(chunk(&img[256..])),
        Ok(OtaStatus::Receiving { bytes_written: 512 })
    );
    assert_eq!(task.handle(chunk(&[])), Ok(OtaStatus::Rebooting));
}

#[test]
fn explicit_last_flag_ends_a_full_sized_chunk() {
    let img = app_image(V2, 256);
    let mut task = make_task(MemStore::new(), 256);

    task.handle(start()).unwrap();
    task.handle(chunk(&img[..256])).unwrap();
    assert_eq!(task.handle(last_chunk(&img[256..])), Ok(OtaStatus::Rebooting));
}

// ── QA-O2: reset iff verification succeeded ──────────────────

#[test]
fn verified_image_arms_update_broadcasts_and_resets() {
    let img = app_image(V2, 1000);
    let mut task = make_task(MemStore::new(), 512);

    task.handle(start()).unwrap();
    for part in img.chunks(512) {
        task.handle(chunk(part)).unwrap();
    }

    let ports = task.ports();
    assert_eq!(ports.platform.resets(), 1);
    assert_eq!(ports.platform.jumps(), 0);
    assert_eq!(ports.bus.shutdowns, 1);
    assert_eq!(ports.delay.total_ns, 1_000_000_000, "~1 s grace period");
    assert!(ports.sink.events.contains(&AppEvent::OtaVerified {
        version: V2,
        img_size: 1000,
    }));

    let mut ports = task.into_ports();
    assert_eq!(
        BootCommandStore::new(&mut ports.store).read(),
        BootCommand::LoadUpdateImage
    );
}

#[test]
fn shutdown_is_broadcast_before_reset() {
    let img = app_image(V2, 100);
    let mut task = make_task(MemStore::new(), 512);

    task.handle(start()).unwrap();
    task.handle(chunk(&img)).unwrap();

    let events = &task.ports().sink.events;
    let rebooting = events.iter().position(|e| *e == AppEvent::OtaRebooting);
    let verified = events
        .iter()
        .position(|e| matches!(e, AppEvent::OtaVerified { .. }));
    assert!(verified.is_some() && verified < rebooting);
    assert_eq!(task.ports().platform.resets(), 1);
}

#[test]
fn corrupt_download_is_discarded_without_reset() {
    let mut img = app_image(V2, 700);
    img[HEADER_SLOT_SIZE as usize + 300] ^= 0x40;
    let mut task = make_task(MemStore::new(), 512);

    task.handle(start()).unwrap();
    task.handle(chunk(&img[..512])).unwrap();
    let result = task.handle(chunk(&img[512..]));

    assert!(matches!(result, Err(OtaError::VerifyFailed(_))));
    assert_eq!(task.state(), OtaState::Idle);
    let ports = task.ports();
    assert_eq!(ports.platform.resets(), 0);
    assert_eq!(ports.bus.shutdowns, 0);
    // Staging is left as received.
    assert_eq!(&ports.store.bytes(PartitionId::UpdateStaging)[..img.len()], &img[..]);

    let mut ports = task.into_ports();
    assert_eq!(BootCommandStore::new(&mut ports.store).read(), BootCommand::Default);
}

#[test]
fn download_without_header_is_rejected() {
    let mut task = make_task(MemStore::new(), 512);
    task.handle(start()).unwrap();
    assert!(matches!(
        task.handle(chunk(&[0xAA; 100])),
        Err(OtaError::VerifyFailed(image::ImageError::NoImage))
    ));
    assert_eq!(task.ports().platform.resets(), 0);
}

#[test]
fn boot_command_write_failure_prevents_reset() {
    let img = app_image(V2, 100);
    let mut task = make_task(MemStore::new(), 512);
    task.handle(start()).unwrap();
    // Staging accepts the image, then BootParams refuses the erase.
    task.ports_mut().store.fail_clears = true;

    assert_eq!(task.handle(chunk(&img)), Err(OtaError::BootSetFailed));
    assert_eq!(task.ports().platform.resets(), 0);
}

// ── QA-O3: Start discards the open session ───────────────────

#[test]
fn start_mid_download_clears_staging() {
    let old = app_image(Version::new(1, 5, 0), 2000);
    let mut task = make_task(MemStore::new(), 512);

    task.handle(start()).unwrap();
    task.handle(chunk(&old[..512])).unwrap();
    task.handle(chunk(&old[512..1024])).unwrap();

    task.handle(start()).unwrap();

    assert!(matches!(
        task.state(),
        OtaState::Downloading {
            bytes_written: 0,
            ..
        }
    ));
    let staging = task.ports().store.bytes(PartitionId::UpdateStaging);
    assert!(staging[..1024].iter().all(|b| *b == 0xFF), "prior partial content must be gone");
    assert!(
        task.ports()
            .sink
            .events
            .contains(&AppEvent::OtaSessionDiscarded {
                bytes_written: 1024
            })
    );

    let mut ports = task.into_ports();
    assert!(image::read_header(&mut ports.store, PartitionId::UpdateStaging).is_err());
}

#[test]
fn new_session_after_discard_completes() {
    let img = app_image(V2, 300);
    let mut task = make_task(MemStore::new(), 512);

    task.handle(start()).unwrap();
    task.handle(chunk(&[0x11; 512])).unwrap();
    task.handle(start()).unwrap();
    let (body, tail) = img.split_at(512);
    assert_eq!(task.handle(chunk(body)), Ok(OtaStatus::Receiving { bytes_written: 512 }));
    assert_eq!(task.handle(chunk(tail)), Ok(OtaStatus::Rebooting));
}

#[test]
fn refused_start_still_drops_the_discarded_bytes() {
    let old = app_image(Version::new(1, 5, 0), 2000);
    let mut task = make_task(MemStore::new(), 512);

    task.handle(start()).unwrap();
    task.handle(chunk(&old[..512])).unwrap();

    let cap = task.ports().store.capacity(PartitionId::UpdateStaging);
    assert_eq!(
        task.handle(OtaCommand::Start {
            image_size: Some(cap + 1)
        }),
        Err(OtaError::ImageTooLarge)
    );
    assert_eq!(task.state(), OtaState::Idle);
    assert!(
        task.ports()
            .sink
            .events
            .contains(&AppEvent::OtaSessionDiscarded { bytes_written: 512 })
    );
    let staging = task.ports().store.bytes(PartitionId::UpdateStaging);
    assert!(staging.iter().all(|b| *b == 0xFF), "discarded bytes left in staging");
}

// ── QA-O4: storage errors abort ──────────────────────────────

#[test]
fn write_failure_aborts_without_verifying() {
    let mut task = make_task(MemStore::new(), 256);
    task.handle(start()).unwrap();
    task.ports_mut().store.fail_writes = true;

    assert_eq!(
        task.handle(chunk(&[0u8; 256])),
        Err(OtaError::Storage(StorageError::WriteFailed))
    );
    assert_eq!(task.state(), OtaState::Idle);
    assert!(
        !task
            .ports()
            .sink
            .any(|e| matches!(e, AppEvent::OtaVerifying { .. }))
    );
    // Later chunks of the dead session are refused.
    task.ports_mut().store.fail_writes = false;
    assert_eq!(task.handle(chunk(&[0u8; 10])), Err(OtaError::NotReceiving));
}

#[test]
fn erase_failure_on_start_leaves_task_idle() {
    let mut store = MemStore::new();
    store.fail_clears = true;
    let mut task = make_task(store, 256);

    assert_eq!(
        task.handle(start()),
        Err(OtaError::Storage(StorageError::EraseFailed))
    );
    assert_eq!(task.state(), OtaState::Idle);
    assert!(task.ports().network.requests.is_empty());
}

#[test]
fn staging_overflow_aborts() {
    let mut task = make_task(MemStore::new(), 1024);
    task.handle(start()).unwrap();
    let full = MemStore::CAPACITY as usize / 1024;
    for _ in 0..full {
        task.handle(chunk(&[0u8; 1024])).unwrap();
    }
    assert_eq!(
        task.handle(chunk(&[0u8; 1024])),
        Err(OtaError::Storage(StorageError::Full))
    );
}

// ── QA-O5: declared size ─────────────────────────────────────

#[test]
fn declared_size_allows_short_intermediate_chunks() {
    let img = app_image(V2, 1000);
    let mut task = make_task(MemStore::new(), 512);

    task.handle(OtaCommand::Start {
        image_size: Some(img.len() as u32),
    })
    .unwrap();
    let mut status = Ok(OtaStatus::Started);
    for part in img.chunks(100) {
        status = task.handle(chunk(part));
    }
    assert_eq!(status, Ok(OtaStatus::Rebooting));
    assert_eq!(task.ports().platform.resets(), 1);
}

#[test]
fn early_last_with_declared_size_is_incomplete() {
    let img = app_image(V2, 1000);
    let mut task = make_task(MemStore::new(), 512);
    task.handle(OtaCommand::Start {
        image_size: Some(img.len() as u32),
    })
    .unwrap();

    assert_eq!(
        task.handle(last_chunk(&img[..512])),
        Err(OtaError::IncompleteTransfer)
    );
    assert_eq!(task.ports().platform.resets(), 0);
}

// ── QA-O6: ownership ─────────────────────────────────────────

#[test]
fn session_only_writes_staging_and_boot_params() {
    let img = app_image(V2, 900);
    let mut task = make_task(MemStore::new(), 512);

    task.handle(start()).unwrap();
    for part in img.chunks(512) {
        task.handle(chunk(part)).unwrap();
    }

    let store = &task.ports().store;
    for op in &store.ops {
        let (StoreOp::Clear(id) | StoreOp::Write(id)) = op;
        assert!(
            matches!(id, PartitionId::UpdateStaging | PartitionId::BootParams),
            "OTA touched {id:?}"
        );
    }
    assert!(!store.touched(PartitionId::Active));
    assert!(!store.touched(PartitionId::Recovery));
}

#[test]
fn start_reports_running_version() {
    let mut task = make_task(MemStore::new(), 256);
    task.handle(start()).unwrap();
    assert_eq!(task.ports().network.requests, [FIRMWARE_VERSION]);
    assert_eq!(
        task.ports().store.capacity(PartitionId::UpdateStaging),
        MemStore::CAPACITY
    );
}
