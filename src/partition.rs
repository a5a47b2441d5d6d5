//! Partition identifiers and the flash layout they map onto.
//!
//! ```text
//!  offset 0 ┌──────────────┐
//!           │ BootParams   │  boot command record
//!           ├──────────────┤
//!           │ Active       │  image the bootloader executes
//!           ├──────────────┤
//!           │ Recovery     │  provisioning-time fallback image
//!           ├──────────────┤
//!           │ UpdateStaging│  OTA download scratch space
//!           └──────────────┘
//! ```
//!
//! Ownership: the bootloader writes `BootParams` and `Active`; the OTA
//! task writes `UpdateStaging`.  Nothing else writes flash.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Closed set of named storage regions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum PartitionId {
    BootParams = 0,
    Active = 1,
    Recovery = 2,
    UpdateStaging = 3,
}

impl PartitionId {
    pub const ALL: [PartitionId; 4] = [
        Self::BootParams,
        Self::Active,
        Self::Recovery,
        Self::UpdateStaging,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            Self::BootParams => "boot-params",
            Self::Active => "active",
            Self::Recovery => "recovery",
            Self::UpdateStaging => "update-staging",
        }
    }
}

impl fmt::Display for PartitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A contiguous byte range of the backing flash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    /// Byte offset from the start of the backing flash.
    pub offset: u32,
    /// Capacity in bytes.
    pub size: u32,
}

impl Region {
    pub const fn new(offset: u32, size: u32) -> Self {
        Self { offset, size }
    }

    /// First byte past the region.  Saturates instead of wrapping so a
    /// corrupt layout can never alias the start of flash.
    pub const fn end(&self) -> u32 {
        self.offset.saturating_add(self.size)
    }

    pub fn overlaps(&self, other: &Region) -> bool {
        self.offset < other.end() && other.offset < self.end()
    }
}

/// Where each partition lives in the backing flash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionLayout {
    pub boot_params: Region,
    pub active: Region,
    pub recovery: Region,
    pub update_staging: Region,
    /// Memory-mapped (execute-in-place) address of the first byte of the
    /// backing flash.  Used to turn a partition offset into a jump target.
    pub xip_base: u32,
}

impl PartitionLayout {
    pub fn region(&self, id: PartitionId) -> Region {
        match id {
            PartitionId::BootParams => self.boot_params,
            PartitionId::Active => self.active,
            PartitionId::Recovery => self.recovery,
            PartitionId::UpdateStaging => self.update_staging,
        }
    }

    /// Total flash span the layout needs.
    pub fn flash_size(&self) -> u32 {
        PartitionId::ALL
            .iter()
            .map(|id| self.region(*id).end())
            .max()
            .unwrap_or(0)
    }

    /// Memory-mapped address of `offset` within partition `id`.
    pub fn xip_address(&self, id: PartitionId, offset: u32) -> u32 {
        self.xip_base
            .wrapping_add(self.region(id).offset)
            .wrapping_add(offset)
    }

    /// Check that regions are non-empty, aligned to `erase_size` and
    /// pairwise disjoint.
    pub fn validate(&self, erase_size: u32) -> Result<(), &'static str> {
        for id in PartitionId::ALL {
            let r = self.region(id);
            if r.size == 0 {
                return Err("partition size must be non-zero");
            }
            if erase_size != 0 && (r.offset % erase_size != 0 || r.size % erase_size != 0) {
                return Err("partition must be aligned to the flash erase size");
            }
            if r.offset.checked_add(r.size).is_none() {
                return Err("partition extends past the 32-bit address space");
            }
        }
        for (i, a) in PartitionId::ALL.iter().enumerate() {
            for b in &PartitionId::ALL[i + 1..] {
                if self.region(*a).overlaps(&self.region(*b)) {
                    return Err("partitions overlap");
                }
            }
        }
        Ok(())
    }
}

impl Default for PartitionLayout {
    fn default() -> Self {
        Self {
            boot_params: Region::new(0x0000_0000, 0x0000_1000), // 4 KB
            active: Region::new(0x0000_1000, 0x0004_0000),      // 256 KB
            recovery: Region::new(0x0004_1000, 0x0004_0000),    // 256 KB
            update_staging: Region::new(0x0008_1000, 0x0004_0000), // 256 KB
            xip_base: 0x0800_4000,
        }
    }
}
