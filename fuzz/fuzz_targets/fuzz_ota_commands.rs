//! Fuzz target: OTA frames into a live task
//!
//! Splits the input into length-prefixed frames, decodes each one and
//! drives the resulting commands through an `OtaTask` backed by simulated
//! flash.  A reset may only ever follow a verified staged image.
//!
//! cargo fuzz run fuzz_ota_commands

#![no_main]

use embedded_hal::delay::DelayNs;
use libfuzzer_sys::fuzz_target;
use modelt::adapters::flash_store::FlashPartitionStore;
use modelt::adapters::platform::SimPlatform;
use modelt::adapters::sim_flash::SimFlash;
use modelt::app::events::AppEvent;
use modelt::app::ports::{EventSink, NetworkError, SystemBus, UpdateSource};
use modelt::config::SystemConfig;
use modelt::image::{self, Version};
use modelt::ota::{OtaPorts, OtaTask, frame};
use modelt::partition::PartitionId;

struct Net;
impl UpdateSource for Net {
    fn request_image(&mut self, _: Version) -> Result<(), NetworkError> {
        Ok(())
    }
}

struct Bus;
impl SystemBus for Bus {
    fn broadcast_shutdown(&mut self) {}
}

struct NoDelay;
impl DelayNs for NoDelay {
    fn delay_ns(&mut self, _: u32) {}
}

struct Discard;
impl EventSink for Discard {
    fn emit(&mut self, _: &AppEvent) {}
}

fuzz_target!(|data: &[u8]| {
    let config = SystemConfig::default();
    let flash = SimFlash::new(config.layout.flash_size() as usize);
    let Ok(store) = FlashPartitionStore::new(flash, config.layout.clone()) else {
        return;
    };
    let mut task = OtaTask::new(
        OtaPorts {
            store,
            network: Net,
            bus: Bus,
            delay: NoDelay,
            platform: SimPlatform::new(),
            sink: Discard,
        },
        &config,
    );

    let mut rest = data;
    while let Some((&len, tail)) = rest.split_first() {
        let len = usize::from(len).min(tail.len());
        let (raw, tail) = tail.split_at(len);
        rest = tail;

        let Ok(cmd) = frame::decode(raw) else {
            continue;
        };
        let before = task.ports().platform.resets();
        let _ = task.handle(cmd);
        if task.ports().platform.resets() > before {
            assert!(image::verify_image(
                &mut task.ports_mut().store,
                PartitionId::UpdateStaging
            ));
        }
    }
});
