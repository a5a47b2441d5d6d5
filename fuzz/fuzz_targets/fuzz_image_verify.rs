//! Fuzz target: image verification
//!
//! Feeds arbitrary bytes to the in-memory checker and to the same bytes
//! programmed into a simulated flash partition.  Both paths must agree and
//! neither may panic on truncated or oversized headers.
//!
//! cargo fuzz run fuzz_image_verify

#![no_main]

use libfuzzer_sys::fuzz_target;
use modelt::adapters::flash_store::FlashPartitionStore;
use modelt::adapters::sim_flash::SimFlash;
use modelt::image;
use modelt::partition::{PartitionId, PartitionLayout};

fuzz_target!(|data: &[u8]| {
    let in_memory = image::check_bytes(data);

    let layout = PartitionLayout::default();
    let mut flash = SimFlash::new(layout.flash_size() as usize);
    let region = layout.region(PartitionId::UpdateStaging);
    if data.len() > region.size as usize {
        return;
    }
    flash.load(region.offset as usize, data);
    let Ok(mut store) = FlashPartitionStore::new(flash, layout) else {
        return;
    };

    // Erased flash past the input is 0xFF, so only a passing in-memory check
    // must be reproduced on flash.
    if let Ok(header) = in_memory {
        let on_flash = image::check_image(&mut store, PartitionId::UpdateStaging);
        assert_eq!(on_flash.map(|h| h.img_size()), Ok(header.img_size()));
    }
});
