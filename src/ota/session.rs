//! One download into the staging partition.
//!
//! A session is created by `Start` and dropped when the download ends,
//! whichever way it ends.  Dropping it is all it takes to abandon it.

use crate::app::ports::{PartitionStore, PartitionWriter, StorageError};
use crate::partition::PartitionId;

#[derive(Debug)]
pub struct OtaSession {
    writer: PartitionWriter,
    declared_size: Option<u32>,
}

impl OtaSession {
    /// Erase UpdateStaging and position a writer at its start.
    pub fn open(
        store: &mut impl PartitionStore,
        declared_size: Option<u32>,
    ) -> Result<Self, StorageError> {
        store.clear(PartitionId::UpdateStaging)?;
        let writer = store.open_for_write(PartitionId::UpdateStaging)?;
        Ok(Self {
            writer,
            declared_size,
        })
    }

    pub fn bytes_written(&self) -> u32 {
        self.writer.position()
    }

    pub fn declared_size(&self) -> Option<u32> {
        self.declared_size
    }

    /// Append `data`; returns the running total.
    pub fn append(
        &mut self,
        store: &mut impl PartitionStore,
        data: &[u8],
    ) -> Result<u32, StorageError> {
        store.write(&mut self.writer, data)?;
        Ok(self.writer.position())
    }

    /// Commit everything written so far.
    pub fn finish(mut self, store: &mut impl PartitionStore) -> Result<u32, StorageError> {
        store.flush(&mut self.writer)?;
        Ok(self.bytes_written())
    }
}
