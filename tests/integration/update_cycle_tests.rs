//! End-to-end update cycle: boot, download over the command channel,
//! reboot into the new image.

use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use embassy_sync::channel::Channel;
use futures_lite::future;

use crate::mock_hw::{
    FakePlatform, MemStore, RecordingSink, app_image, chunk, make_task, reset_vector_of,
};

use modelt::app::events::AppEvent;
use modelt::boot::{self, BootCommand, BootCommandStore, BootOutcome, Bootloader};
use modelt::bus::OTA_QUEUE_DEPTH;
use modelt::config::SystemConfig;
use modelt::image::Version;
use modelt::ota::OtaCommand;
use modelt::partition::PartitionId;

const V1: Version = Version::new(1, 0, 0);
const V2: Version = Version::new(2, 0, 0);
const RECOVERY: Version = Version::new(9, 0, 0);

fn provisioned() -> MemStore {
    let mut store = MemStore::new();
    store.load(PartitionId::Active, &app_image(V1, 1500));
    store.load(PartitionId::Recovery, &app_image(RECOVERY, 600));
    store
}

fn power_on(store: &mut MemStore) -> BootOutcome {
    Bootloader::new(&SystemConfig::default()).run(
        store,
        &mut FakePlatform::new(),
        &mut RecordingSink::new(),
    )
}

fn executes(outcome: BootOutcome, version: Version) -> bool {
    matches!(outcome, BootOutcome::Execute(e) if e.reset_vector == reset_vector_of(version))
}

/// Queue `cmds` on a channel and run the task until it reboots.
fn download(store: MemStore, cmds: Vec<OtaCommand>) -> (MemStore, RecordingSink, usize) {
    let channel: Channel<NoopRawMutex, OtaCommand, OTA_QUEUE_DEPTH> = Channel::new();
    let task = make_task(store, 512);

    let transport = async {
        for cmd in cmds {
            channel.send(cmd).await;
        }
    };
    let (task, ()) = future::block_on(future::zip(task.run(channel.receiver()), transport));

    let ports = task.into_ports();
    let resets = ports.platform.resets();
    (ports.store, ports.sink, resets)
}

fn commands_for(img: &[u8]) -> Vec<OtaCommand> {
    let mut cmds = vec![OtaCommand::Start { image_size: None }];
    cmds.extend(img.chunks(512).map(chunk));
    cmds
}

// ── QA-C1: boot v1, update to v2, reboot ─────────────────────

#[test]
fn full_cycle_installs_the_downloaded_image() {
    let mut store = provisioned();
    assert!(executes(power_on(&mut store), V1));

    let img = app_image(V2, 3000);
    let (mut store, sink, resets) = download(store, commands_for(&img));

    assert_eq!(resets, 1);
    assert!(sink.events.contains(&AppEvent::OtaRebooting));
    assert_eq!(store.active_version(), Some(V1), "active untouched until reboot");
    assert_eq!(
        BootCommandStore::new(&mut store).read(),
        BootCommand::LoadUpdateImage
    );

    assert!(executes(power_on(&mut store), V2));
    assert_eq!(store.active_version(), Some(V2));
    assert_eq!(BootCommandStore::new(&mut store).read(), BootCommand::Default);

    // A third boot runs v2 again without copying.
    store.ops.clear();
    assert!(executes(power_on(&mut store), V2));
    assert!(!store.touched(PartitionId::Active));
}

#[test]
fn restart_mid_download_still_installs_the_second_image() {
    let store = provisioned();
    let stale = app_image(Version::new(1, 9, 0), 3000);
    let img = app_image(V2, 1200);

    let mut cmds = commands_for(&stale);
    cmds.truncate(3);
    cmds.extend(commands_for(&img));
    let (mut store, sink, resets) = download(store, cmds);

    assert_eq!(resets, 1);
    assert!(sink.any(|e| matches!(e, AppEvent::OtaSessionDiscarded { .. })));
    assert!(executes(power_on(&mut store), V2));
}

// ── QA-C2: the armed command survives power loss ─────────────

#[test]
fn armed_command_survives_a_lost_reset() {
    let mut store = provisioned();
    store.load(PartitionId::UpdateStaging, &app_image(V2, 800));

    let mut platform = FakePlatform::new();
    boot::request_update_image(&mut store, &mut platform).unwrap();
    assert_eq!(platform.resets(), 1);

    // Power is cut before the reset lands; the next cold boot still
    // sees the command.
    assert!(executes(power_on(&mut store), V2));
}

#[test]
fn recovery_request_restores_factory_image() {
    let mut store = provisioned();
    let mut platform = FakePlatform::new();
    boot::request_recovery_image(&mut store, &mut platform).unwrap();

    assert!(executes(power_on(&mut store), RECOVERY));
    assert_eq!(store.active_version(), Some(RECOVERY));
}

// ── QA-C3: failed updates keep the running image ─────────────

#[test]
fn corrupt_download_keeps_v1_running() {
    let mut store = provisioned();
    let mut img = app_image(V2, 1500);
    img[900] ^= 0x08;

    let mut task = make_task(store, 512);
    for cmd in commands_for(&img) {
        let _ = task.handle(cmd);
    }
    let ports = task.into_ports();
    assert_eq!(ports.platform.resets(), 0);
    store = ports.store;

    assert_eq!(BootCommandStore::new(&mut store).read(), BootCommand::Default);
    assert!(executes(power_on(&mut store), V1));
}

#[test]
fn truncated_download_never_arms_the_bootloader() {
    let mut store = provisioned();
    let img = app_image(V2, 3000);

    let mut task = make_task(store, 512);
    for cmd in commands_for(&img).into_iter().take(4) {
        task.handle(cmd).unwrap();
    }
    let ports = task.into_ports();
    assert_eq!(ports.platform.resets(), 0);
    store = ports.store;

    assert!(executes(power_on(&mut store), V1));
}
