//! Fake adapters for integration tests.
//!
//! Every port the boot and update core talks to has a recording fake here,
//! so tests can assert on the full call history without flash or a CPU.

#![allow(dead_code)]

use std::collections::HashMap;

use embedded_hal::delay::DelayNs;
use modelt::app::events::AppEvent;
use modelt::app::ports::{
    EntryPoint, EventSink, NetworkError, PartitionStore, PartitionWriter, PlatformControl,
    StorageError, SystemBus, UpdateSource,
};
use modelt::config::SystemConfig;
use modelt::image::{self, Version, pack_image};
use modelt::ota::{OtaCommand, OtaPorts, OtaTask, UpdateChunk};
use modelt::partition::PartitionId;

// ── MemStore ──────────────────────────────────────────────────

/// Which partition an operation touched, and how.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOp {
    Clear(PartitionId),
    Write(PartitionId),
}

/// Byte-exact in-memory partition store with no program granule.
pub struct MemStore {
    parts: HashMap<PartitionId, Vec<u8>>,
    pub fail_writes: bool,
    pub fail_clears: bool,
    pub ops: Vec<StoreOp>,
}

impl MemStore {
    pub const CAPACITY: u32 = 0x8000;

    pub fn new() -> Self {
        let mut parts = HashMap::new();
        parts.insert(PartitionId::BootParams, vec![0xFF; 0x100]);
        for id in [
            PartitionId::Active,
            PartitionId::Recovery,
            PartitionId::UpdateStaging,
        ] {
            parts.insert(id, vec![0xFF; Self::CAPACITY as usize]);
        }
        Self {
            parts,
            fail_writes: false,
            fail_clears: false,
            ops: Vec::new(),
        }
    }

    pub fn bytes(&self, id: PartitionId) -> &[u8] {
        &self.parts[&id]
    }

    /// Factory-program `bytes` at the start of `id`, bypassing the log.
    pub fn load(&mut self, id: PartitionId, bytes: &[u8]) {
        let part = self.parts.get_mut(&id).unwrap();
        part.fill(0xFF);
        part[..bytes.len()].copy_from_slice(bytes);
    }

    pub fn flip_bit(&mut self, id: PartitionId, offset: usize, bit: u8) {
        self.parts.get_mut(&id).unwrap()[offset] ^= 1 << bit;
    }

    pub fn touched(&self, id: PartitionId) -> bool {
        self.ops
            .iter()
            .any(|op| matches!(op, StoreOp::Clear(p) | StoreOp::Write(p) if *p == id))
    }

    pub fn active_version(&mut self) -> Option<Version> {
        image::read_header(self, PartitionId::Active)
            .ok()
            .map(|h| h.version())
    }
}

impl Default for MemStore {
    fn default() -> Self {
        Self::new()
    }
}

impl PartitionStore for MemStore {
    fn capacity(&self, id: PartitionId) -> u32 {
        self.parts[&id].len() as u32
    }

    fn clear(&mut self, id: PartitionId) -> Result<(), StorageError> {
        if self.fail_clears {
            return Err(StorageError::EraseFailed);
        }
        self.ops.push(StoreOp::Clear(id));
        self.parts.get_mut(&id).unwrap().fill(0xFF);
        Ok(())
    }

    fn open_for_write(&mut self, id: PartitionId) -> Result<PartitionWriter, StorageError> {
        Ok(PartitionWriter::new(id))
    }

    fn write(&mut self, writer: &mut PartitionWriter, data: &[u8]) -> Result<(), StorageError> {
        let id = writer.id();
        let start = writer.committed() as usize;
        if start + data.len() > self.parts[&id].len() {
            return Err(StorageError::Full);
        }
        if self.fail_writes {
            return Err(StorageError::WriteFailed);
        }
        self.ops.push(StoreOp::Write(id));
        self.parts.get_mut(&id).unwrap()[start..start + data.len()].copy_from_slice(data);
        writer.advance(data.len() as u32);
        Ok(())
    }

    fn flush(&mut self, _writer: &mut PartitionWriter) -> Result<(), StorageError> {
        Ok(())
    }

    fn read(&mut self, id: PartitionId, offset: u32, buf: &mut [u8]) -> Result<(), StorageError> {
        let part = &self.parts[&id];
        let start = offset as usize;
        if start + buf.len() > part.len() {
            return Err(StorageError::OutOfBounds);
        }
        buf.copy_from_slice(&part[start..start + buf.len()]);
        Ok(())
    }

    fn verify(&mut self, id: PartitionId) -> bool {
        image::read_header(self, id).is_ok()
    }
}

// ── FakePlatform ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlatformCall {
    JumpTo(EntryPoint),
    Reset,
}

#[derive(Default)]
pub struct FakePlatform {
    pub calls: Vec<PlatformCall>,
}

impl FakePlatform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn jumps(&self) -> usize {
        self.calls
            .iter()
            .filter(|c| matches!(c, PlatformCall::JumpTo(_)))
            .count()
    }

    pub fn resets(&self) -> usize {
        self.calls
            .iter()
            .filter(|c| matches!(c, PlatformCall::Reset))
            .count()
    }
}

impl PlatformControl for FakePlatform {
    fn jump_to(&mut self, entry: EntryPoint) {
        self.calls.push(PlatformCall::JumpTo(entry));
    }

    fn reset(&mut self) {
        self.calls.push(PlatformCall::Reset);
    }
}

// ── FakeNetwork / FakeBus / FakeDelay ─────────────────────────

pub struct FakeNetwork {
    pub connected: bool,
    pub requests: Vec<Version>,
}

impl FakeNetwork {
    pub fn new() -> Self {
        Self {
            connected: true,
            requests: Vec::new(),
        }
    }
}

impl Default for FakeNetwork {
    fn default() -> Self {
        Self::new()
    }
}

impl UpdateSource for FakeNetwork {
    fn request_image(&mut self, current: Version) -> Result<(), NetworkError> {
        if !self.connected {
            return Err(NetworkError::NotConnected);
        }
        self.requests.push(current);
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeBus {
    pub shutdowns: u32,
}

impl SystemBus for FakeBus {
    fn broadcast_shutdown(&mut self) {
        self.shutdowns += 1;
    }
}

#[derive(Default)]
pub struct FakeDelay {
    pub total_ns: u64,
}

impl DelayNs for FakeDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.total_ns += u64::from(ns);
    }
}

// ── RecordingSink ─────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingSink {
    pub events: Vec<AppEvent>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn any(&self, pred: impl Fn(&AppEvent) -> bool) -> bool {
        self.events.iter().any(pred)
    }
}

impl EventSink for RecordingSink {
    fn emit(&mut self, event: &AppEvent) {
        self.events.push(event.clone());
    }
}

// ── Images ────────────────────────────────────────────────────

pub const STACK_TOP: u32 = 0x2002_0000;

/// Payload of `len` bytes (at least 8) starting with a vector table whose
/// reset vector encodes `tag`.
pub fn app_payload(tag: u8, len: usize) -> Vec<u8> {
    assert!(len >= 8);
    let mut p = Vec::with_capacity(len);
    p.extend_from_slice(&STACK_TOP.to_le_bytes());
    p.extend_from_slice(&(0x0800_0101u32 + u32::from(tag) * 0x100).to_le_bytes());
    p.extend((8..len).map(|i| (i as u8).wrapping_mul(31) ^ tag));
    p
}

pub fn app_image(version: Version, len: usize) -> Vec<u8> {
    pack_image(version, &app_payload(version.major, len))
}

/// Reset vector [`app_payload`] puts in an image of `version`.
pub fn reset_vector_of(version: Version) -> u32 {
    0x0800_0101 + u32::from(version.major) * 0x100
}

// ── OTA task wiring ───────────────────────────────────────────

pub type TestTask = OtaTask<MemStore, FakeNetwork, FakeBus, FakeDelay, FakePlatform, RecordingSink>;

pub fn test_config(max_chunk_size: u32) -> SystemConfig {
    SystemConfig {
        max_chunk_size,
        ..Default::default()
    }
}

pub fn make_task(store: MemStore, max_chunk_size: u32) -> TestTask {
    OtaTask::new(
        OtaPorts {
            store,
            network: FakeNetwork::new(),
            bus: FakeBus::default(),
            delay: FakeDelay::default(),
            platform: FakePlatform::new(),
            sink: RecordingSink::new(),
        },
        &test_config(max_chunk_size),
    )
}

pub fn chunk(bytes: &[u8]) -> OtaCommand {
    OtaCommand::Chunk(UpdateChunk::from_slice(bytes, false).unwrap())
}

pub fn last_chunk(bytes: &[u8]) -> OtaCommand {
    OtaCommand::Chunk(UpdateChunk::from_slice(bytes, true).unwrap())
}
