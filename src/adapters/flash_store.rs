//! NOR-flash partition store.
//!
//! Implements [`PartitionStore`] on top of any `embedded-storage`
//! [`NorFlash`] device, carving it into the regions of a
//! [`PartitionLayout`].
//!
//! - Writes are streamed: whole program granules go straight to flash,
//!   the unaligned tail waits in the [`PartitionWriter`] until the next
//!   write or `flush`.
//! - Every access is bounds-checked against its region, so a writer can
//!   never spill into a neighbouring partition.

use core::fmt;

use embedded_storage::nor_flash::NorFlash;
use log::{info, warn};

use crate::app::ports::{MAX_WRITE_GRANULE, PartitionStore, PartitionWriter, StorageError};
use crate::image;
use crate::partition::{PartitionId, PartitionLayout};

pub struct FlashPartitionStore<F> {
    flash: F,
    layout: PartitionLayout,
}

impl<F: NorFlash> FlashPartitionStore<F> {
    /// Wrap `flash`, checking that `layout` fits the device geometry.
    pub fn new(flash: F, layout: PartitionLayout) -> Result<Self, GeometryError> {
        if F::READ_SIZE != 1 {
            return Err(GeometryError::ByteReadsRequired);
        }
        if F::WRITE_SIZE == 0 || F::WRITE_SIZE > MAX_WRITE_GRANULE {
            return Err(GeometryError::UnsupportedGranule(F::WRITE_SIZE));
        }
        layout
            .validate(F::ERASE_SIZE as u32)
            .map_err(GeometryError::Layout)?;
        if layout.flash_size() as usize > flash.capacity() {
            return Err(GeometryError::ExceedsCapacity {
                needed: layout.flash_size(),
                capacity: flash.capacity(),
            });
        }
        info!(
            "FlashPartitionStore: {} bytes, program granule {}, erase sector {}",
            flash.capacity(),
            F::WRITE_SIZE,
            F::ERASE_SIZE
        );
        Ok(Self { flash, layout })
    }

    pub fn layout(&self) -> &PartitionLayout {
        &self.layout
    }

    pub fn flash(&self) -> &F {
        &self.flash
    }

    pub fn flash_mut(&mut self) -> &mut F {
        &mut self.flash
    }

    pub fn into_inner(self) -> F {
        self.flash
    }

    fn program(&mut self, id: PartitionId, offset: u32, data: &[u8]) -> Result<(), StorageError> {
        let addr = self.layout.region(id).offset + offset;
        self.flash.write(addr, data).map_err(|e| {
            warn!("flash program at 0x{:08x} ({} bytes) failed: {:?}", addr, data.len(), e);
            StorageError::WriteFailed
        })
    }
}

impl<F: NorFlash> PartitionStore for FlashPartitionStore<F> {
    fn capacity(&self, id: PartitionId) -> u32 {
        self.layout.region(id).size
    }

    fn clear(&mut self, id: PartitionId) -> Result<(), StorageError> {
        let region = self.layout.region(id);
        self.flash.erase(region.offset, region.end()).map_err(|e| {
            warn!("erase of {} failed: {:?}", id, e);
            StorageError::EraseFailed
        })
    }

    fn open_for_write(&mut self, id: PartitionId) -> Result<PartitionWriter, StorageError> {
        Ok(PartitionWriter::new(id))
    }

    fn write(&mut self, writer: &mut PartitionWriter, data: &[u8]) -> Result<(), StorageError> {
        let id = writer.id();
        let end = writer.position() as u64 + data.len() as u64;
        if end > self.capacity(id) as u64 {
            return Err(StorageError::Full);
        }

        let granule = F::WRITE_SIZE;
        let mut rest = data;

        // Complete a partially filled granule first.
        if !writer.pending().is_empty() {
            let take = (granule - writer.pending().len()).min(rest.len());
            writer
                .pending_mut()
                .extend_from_slice(&rest[..take])
                .map_err(|()| StorageError::WriteFailed)?;
            rest = &rest[take..];
            if writer.pending().len() < granule {
                return Ok(());
            }
            let mut block = [0xFFu8; MAX_WRITE_GRANULE];
            block[..granule].copy_from_slice(writer.pending());
            self.program(id, writer.committed(), &block[..granule])?;
            writer.advance(granule as u32);
            writer.pending_mut().clear();
        }

        let whole = rest.len() / granule * granule;
        if whole > 0 {
            self.program(id, writer.committed(), &rest[..whole])?;
            writer.advance(whole as u32);
        }

        writer
            .pending_mut()
            .extend_from_slice(&rest[whole..])
            .map_err(|()| StorageError::WriteFailed)
    }

    fn flush(&mut self, writer: &mut PartitionWriter) -> Result<(), StorageError> {
        if writer.pending().is_empty() {
            return Ok(());
        }
        let granule = F::WRITE_SIZE;
        if writer.committed() as u64 + granule as u64 > self.capacity(writer.id()) as u64 {
            return Err(StorageError::Full);
        }
        let mut block = [0xFFu8; MAX_WRITE_GRANULE];
        block[..writer.pending().len()].copy_from_slice(writer.pending());
        self.program(writer.id(), writer.committed(), &block[..granule])?;
        writer.advance(granule as u32);
        writer.pending_mut().clear();
        Ok(())
    }

    fn read(&mut self, id: PartitionId, offset: u32, buf: &mut [u8]) -> Result<(), StorageError> {
        let region = self.layout.region(id);
        if offset as u64 + buf.len() as u64 > region.size as u64 {
            return Err(StorageError::OutOfBounds);
        }
        self.flash
            .read(region.offset + offset, buf)
            .map_err(|_| StorageError::ReadFailed)
    }

    fn verify(&mut self, id: PartitionId) -> bool {
        image::read_header(self, id).is_ok()
    }
}

/// The flash device cannot host the partition layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeometryError {
    /// Reads must be byte-granular.
    ByteReadsRequired,
    /// Program granule is zero or wider than the writer can buffer.
    UnsupportedGranule(usize),
    /// Regions break the erase-sector rules.
    Layout(&'static str),
    ExceedsCapacity { needed: u32, capacity: usize },
}

impl fmt::Display for GeometryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ByteReadsRequired => write!(f, "flash must support byte reads"),
            Self::UnsupportedGranule(n) => write!(f, "flash program granule of {n} bytes not supported"),
            Self::Layout(msg) => write!(f, "{msg}"),
            Self::ExceedsCapacity { needed, capacity } => write!(
                f,
                "partition layout needs {needed} bytes, flash has {capacity}"
            ),
        }
    }
}

impl core::error::Error for GeometryError {}
