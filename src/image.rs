//! Executable image format and verifier.
//!
//! An image-bearing partition starts with a 256-byte header slot followed
//! immediately by the payload:
//!
//! ```text
//! offset 0x000 ┌───────────────────────────────────────────┐
//!              │ magic "BBMT-APP"                  8 bytes │
//!              │ major │ minor │ patch │ reserved  4 bytes │
//!              │ img_size  (u32 LE)                4 bytes │
//!              │ crc       (u32 LE)                4 bytes │
//!              │ reserved (0xFF)                 236 bytes │
//! offset 0x100 ├───────────────────────────────────────────┤
//!              │ payload, img_size bytes                   │
//!              │   word 0: initial stack pointer           │
//!              │   word 1: reset vector                    │
//!              └───────────────────────────────────────────┘
//! ```
//!
//! The checksum is CRC-32/ISO-HDLC over exactly `img_size` payload bytes.
//! It detects corruption; it says nothing about who built the image.

use core::fmt;
use core::str::FromStr;

use crc::{CRC_32_ISO_HDLC, Crc};
use serde::{Deserialize, Serialize};
use zerocopy::byteorder::{LittleEndian, U32};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::app::ports::{PartitionStore, StorageError};
use crate::partition::PartitionId;

/// Tag identifying a valid image slot header.
pub const IMAGE_MAGIC: [u8; 8] = *b"BBMT-APP";

/// Size of the reserved header slot; the payload starts right after it.
pub const HEADER_SLOT_SIZE: u32 = 0x100;

/// Encoded size of [`AppImageHeader`].
pub const HEADER_LEN: usize = core::mem::size_of::<AppImageHeader>();

/// Read granule used while streaming the payload through the CRC.
const VERIFY_BLOCK: usize = 256;

/// The CRC-32/ISO-HDLC engine (reflected 0xEDB88320, init and xorout
/// 0xFFFFFFFF).
pub const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// One-shot CRC-32/ISO-HDLC.
pub fn crc32(data: &[u8]) -> u32 {
    CRC32.checksum(data)
}

// ── Version ──────────────────────────────────────────────────

/// Semantic version carried in the image header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Version {
    pub major: u8,
    pub minor: u8,
    pub patch: u8,
}

impl Version {
    pub const fn new(major: u8, minor: u8, patch: u8) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for Version {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.trim().split('.');
        let mut next = || -> Result<u8, &'static str> {
            parts
                .next()
                .ok_or("version must be MAJOR.MINOR.PATCH")?
                .parse::<u8>()
                .map_err(|_| "version component must be 0-255")
        };
        let v = Version::new(next()?, next()?, next()?);
        if parts.next().is_some() {
            return Err("version must be MAJOR.MINOR.PATCH");
        }
        Ok(v)
    }
}

// ── Header ───────────────────────────────────────────────────

/// On-flash image header.  Little-endian, no padding, 20 bytes.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct AppImageHeader {
    pub magic: [u8; 8],
    pub major: u8,
    pub minor: u8,
    pub patch: u8,
    reserved: u8,
    img_size: U32<LittleEndian>,
    crc: U32<LittleEndian>,
}

impl AppImageHeader {
    pub fn new(version: Version, img_size: u32, crc: u32) -> Self {
        Self {
            magic: IMAGE_MAGIC,
            major: version.major,
            minor: version.minor,
            patch: version.patch,
            reserved: 0,
            img_size: U32::new(img_size),
            crc: U32::new(crc),
        }
    }

    /// Header describing `payload` exactly.
    pub fn for_payload(version: Version, payload: &[u8]) -> Self {
        Self::new(version, payload.len() as u32, crc32(payload))
    }

    /// Decode a header from the first [`HEADER_LEN`] bytes of `bytes`.
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        Self::read_from_prefix(bytes).ok().map(|(hdr, _)| hdr)
    }

    pub fn has_valid_magic(&self) -> bool {
        self.magic == IMAGE_MAGIC
    }

    pub fn version(&self) -> Version {
        Version::new(self.major, self.minor, self.patch)
    }

    pub fn img_size(&self) -> u32 {
        self.img_size.get()
    }

    pub fn crc(&self) -> u32 {
        self.crc.get()
    }

    /// Bytes occupied on flash by header slot plus payload.
    pub fn total_len(&self) -> u64 {
        HEADER_SLOT_SIZE as u64 + self.img_size() as u64
    }
}

// ── Errors ───────────────────────────────────────────────────

/// Why an image was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageError {
    /// Header magic does not match: no image present.
    NoImage,
    /// Declared payload does not fit in the partition.
    SizeOutOfBounds { img_size: u32, capacity: u32 },
    /// Image present but the payload checksum failed.
    CrcMismatch { expected: u32, computed: u32 },
    /// Payload too short to hold the stack pointer and reset vector.
    NoVectorTable { img_size: u32 },
    /// The partition could not be read.
    Storage(StorageError),
}

impl fmt::Display for ImageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoImage => write!(f, "no valid image found"),
            Self::SizeOutOfBounds { img_size, capacity } => write!(
                f,
                "image size {} bytes exceeds partition capacity {} bytes",
                img_size, capacity
            ),
            Self::CrcMismatch { expected, computed } => write!(
                f,
                "CRC mismatch (stored 0x{:08x}, calculated 0x{:08x})",
                expected, computed
            ),
            Self::NoVectorTable { img_size } => write!(
                f,
                "image of {} bytes has no vector table",
                img_size
            ),
            Self::Storage(e) => write!(f, "storage: {e}"),
        }
    }
}

impl core::error::Error for ImageError {}

impl From<StorageError> for ImageError {
    fn from(e: StorageError) -> Self {
        Self::Storage(e)
    }
}

// ── Verifier ─────────────────────────────────────────────────

/// Read the header of `id` and check that it declares a payload that
/// fits the partition.  Does not look at the payload.
pub fn read_header(
    store: &mut impl PartitionStore,
    id: PartitionId,
) -> Result<AppImageHeader, ImageError> {
    let capacity = store.capacity(id);
    if capacity < HEADER_SLOT_SIZE {
        return Err(ImageError::SizeOutOfBounds {
            img_size: 0,
            capacity,
        });
    }

    let mut raw = [0u8; HEADER_LEN];
    store.read(id, 0, &mut raw)?;
    let header = AppImageHeader::parse(&raw).ok_or(ImageError::NoImage)?;
    if !header.has_valid_magic() {
        return Err(ImageError::NoImage);
    }
    if header.total_len() > capacity as u64 {
        return Err(ImageError::SizeOutOfBounds {
            img_size: header.img_size(),
            capacity,
        });
    }
    Ok(header)
}

/// Full integrity check of the image in `id`.
///
/// Returns the header on success.  Never reads past the partition, even
/// when the stored `img_size` is garbage.
pub fn check_image(
    store: &mut impl PartitionStore,
    id: PartitionId,
) -> Result<AppImageHeader, ImageError> {
    let header = read_header(store, id)?;

    let mut digest = CRC32.digest();
    let mut buf = [0u8; VERIFY_BLOCK];
    let mut offset = 0u32;
    let size = header.img_size();
    while offset < size {
        let n = (size - offset).min(VERIFY_BLOCK as u32) as usize;
        store.read(id, HEADER_SLOT_SIZE + offset, &mut buf[..n])?;
        digest.update(&buf[..n]);
        offset += n as u32;
    }
    let computed = digest.finalize();

    if computed == header.crc() {
        Ok(header)
    } else {
        Err(ImageError::CrcMismatch {
            expected: header.crc(),
            computed,
        })
    }
}

/// `true` iff the partition holds an intact image.
pub fn verify_image(store: &mut impl PartitionStore, id: PartitionId) -> bool {
    check_image(store, id).is_ok()
}

/// [`check_image`] for an image held in memory (a file, a received
/// buffer).  `bytes` plays the role of the partition.
pub fn check_bytes(bytes: &[u8]) -> Result<AppImageHeader, ImageError> {
    let capacity = u32::try_from(bytes.len()).unwrap_or(u32::MAX);
    if capacity < HEADER_SLOT_SIZE {
        return Err(ImageError::SizeOutOfBounds {
            img_size: 0,
            capacity,
        });
    }
    let header = AppImageHeader::parse(bytes).ok_or(ImageError::NoImage)?;
    if !header.has_valid_magic() {
        return Err(ImageError::NoImage);
    }
    if header.total_len() > bytes.len() as u64 {
        return Err(ImageError::SizeOutOfBounds {
            img_size: header.img_size(),
            capacity,
        });
    }
    let start = HEADER_SLOT_SIZE as usize;
    let computed = crc32(&bytes[start..start + header.img_size() as usize]);
    if computed == header.crc() {
        Ok(header)
    } else {
        Err(ImageError::CrcMismatch {
            expected: header.crc(),
            computed,
        })
    }
}

/// Build the on-flash byte stream (header slot + payload) for `payload`.
#[cfg(not(target_os = "none"))]
pub fn pack_image(version: Version, payload: &[u8]) -> std::vec::Vec<u8> {
    let header = AppImageHeader::for_payload(version, payload);
    let mut out = std::vec![0xFFu8; HEADER_SLOT_SIZE as usize];
    out[..HEADER_LEN].copy_from_slice(header.as_bytes());
    out.extend_from_slice(payload);
    out
}
