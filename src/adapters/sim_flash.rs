//! In-memory NOR flash for host simulation and tests.
//!
//! Behaves like a real part where it matters to the core:
//!
//! - erased bytes read as `0xFF`,
//! - programming can only clear bits (`old & new`),
//! - erase and program must respect `ERASE_SIZE` / `WRITE_SIZE`,
//! - faults can be injected to exercise the storage-error paths.

use embedded_storage::nor_flash::{
    ErrorType, NorFlash, NorFlashErrorKind, ReadNorFlash, check_erase, check_read, check_write,
};

pub struct SimFlash {
    data: Vec<u8>,
    /// Remaining successful program operations before every program fails.
    writes_until_failure: Option<usize>,
    fail_erase: bool,
    erase_count: usize,
}

impl SimFlash {
    pub const ERASE: usize = 0x1000;
    pub const GRANULE: usize = 4;

    /// Fully erased flash of `size` bytes, rounded up to whole sectors.
    pub fn new(size: usize) -> Self {
        let size = size.div_ceil(Self::ERASE) * Self::ERASE;
        Self {
            data: vec![0xFF; size],
            writes_until_failure: None,
            fail_erase: false,
            erase_count: 0,
        }
    }

    /// Raw view of the whole device.
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    /// Let `n` more program operations succeed, then fail all of them.
    pub fn fail_writes_after(&mut self, n: usize) {
        self.writes_until_failure = Some(n);
    }

    pub fn fail_erases(&mut self, fail: bool) {
        self.fail_erase = fail;
    }

    pub fn heal(&mut self) {
        self.writes_until_failure = None;
        self.fail_erase = false;
    }

    /// Number of erase operations performed so far.
    pub fn erase_count(&self) -> usize {
        self.erase_count
    }

    /// Flip bits at `offset` regardless of NOR rules (bit rot, glitches).
    pub fn corrupt(&mut self, offset: usize, xor: u8) {
        self.data[offset] ^= xor;
    }

    /// Overwrite bytes regardless of NOR rules (factory programming).
    pub fn load(&mut self, offset: usize, bytes: &[u8]) {
        self.data[offset..offset + bytes.len()].copy_from_slice(bytes);
    }
}

impl ErrorType for SimFlash {
    type Error = NorFlashErrorKind;
}

impl ReadNorFlash for SimFlash {
    const READ_SIZE: usize = 1;

    fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), Self::Error> {
        check_read(self, offset, bytes.len())?;
        let start = offset as usize;
        bytes.copy_from_slice(&self.data[start..start + bytes.len()]);
        Ok(())
    }

    fn capacity(&self) -> usize {
        self.data.len()
    }
}

impl NorFlash for SimFlash {
    const WRITE_SIZE: usize = Self::GRANULE;
    const ERASE_SIZE: usize = Self::ERASE;

    fn erase(&mut self, from: u32, to: u32) -> Result<(), Self::Error> {
        check_erase(self, from, to)?;
        if self.fail_erase {
            return Err(NorFlashErrorKind::Other);
        }
        self.data[from as usize..to as usize].fill(0xFF);
        self.erase_count += 1;
        Ok(())
    }

    fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), Self::Error> {
        check_write(self, offset, bytes.len())?;
        match self.writes_until_failure {
            Some(0) => return Err(NorFlashErrorKind::Other),
            Some(ref mut n) => *n -= 1,
            None => {}
        }
        let start = offset as usize;
        for (cell, b) in self.data[start..start + bytes.len()].iter_mut().zip(bytes) {
            *cell &= *b;
        }
        Ok(())
    }
}
