//! Simulated process memory for tests.
//!
//! A `MockMemory` is a cheap handle: clones share the same image, so a test can
//! hand one clone to the code under test and keep another to mutate or inspect
//! memory from the "simulator side".

use std::cell::RefCell;
use std::rc::Rc;

use crate::error::{Error, Result};
use crate::memory::{MemoryRegion, ReadMemory, WriteMemory};

#[derive(Debug, Default)]
struct MockImage {
    base: u64,
    module_size: usize,
    regions: Vec<(u64, Vec<u8>)>,
    fail_reads: bool,
    fail_writes: bool,
    writes: usize,
}

impl MockImage {
    fn locate(&self, address: u64, len: usize) -> Option<(usize, usize)> {
        self.regions.iter().enumerate().find_map(|(idx, (base, bytes))| {
            let end = base + bytes.len() as u64;
            (address >= *base && address + len as u64 <= end)
                .then(|| (idx, (address - base) as usize))
        })
    }
}

#[derive(Debug, Clone)]
pub struct MockMemory {
    image: Rc<RefCell<MockImage>>,
}

pub struct MockMemoryBuilder {
    image: MockImage,
}

impl MockMemoryBuilder {
    /// Start with a zero-filled module image at `base`.
    pub fn new(base: u64, module_size: usize) -> Self {
        Self {
            image: MockImage {
                base,
                module_size,
                regions: vec![(base, vec![0; module_size])],
                ..Default::default()
            },
        }
    }

    /// Add a zero-filled heap region.
    pub fn region(mut self, base: u64, size: usize) -> Self {
        self.image.regions.push((base, vec![0; size]));
        self
    }

    pub fn build(mut self) -> MockMemory {
        self.image.regions.sort_by_key(|(base, _)| *base);
        MockMemory {
            image: Rc::new(RefCell::new(self.image)),
        }
    }
}

impl MockMemory {
    pub fn put_bytes(&self, address: u64, bytes: &[u8]) {
        let mut image = self.image.borrow_mut();
        let (idx, offset) = image
            .locate(address, bytes.len())
            .unwrap_or_else(|| panic!("mock address {:#x} is not mapped", address));
        image.regions[idx].1[offset..offset + bytes.len()].copy_from_slice(bytes);
    }

    pub fn put_f32(&self, address: u64, value: f32) {
        self.put_bytes(address, &value.to_le_bytes());
    }

    pub fn put_u64(&self, address: u64, value: u64) {
        self.put_bytes(address, &value.to_le_bytes());
    }

    /// Add `delta` to the f32 stored at `address`, the way the simulator does for clock events.
    pub fn add_f32(&self, address: u64, delta: f32) {
        let current = self.f32_at(address);
        self.put_f32(address, current + delta);
    }

    pub fn f32_at(&self, address: u64) -> f32 {
        let image = self.image.borrow();
        let (idx, offset) = image
            .locate(address, 4)
            .unwrap_or_else(|| panic!("mock address {:#x} is not mapped", address));
        let bytes = &image.regions[idx].1[offset..offset + 4];
        f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.image.borrow_mut().fail_reads = fail;
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.image.borrow_mut().fail_writes = fail;
    }

    pub fn write_count(&self) -> usize {
        self.image.borrow().writes
    }
}

impl ReadMemory for MockMemory {
    fn base_address(&self) -> u64 {
        self.image.borrow().base
    }

    fn module_size(&self) -> usize {
        self.image.borrow().module_size
    }

    fn read_bytes(&self, address: u64, size: usize) -> Result<Vec<u8>> {
        let image = self.image.borrow();
        if image.fail_reads {
            return Err(Error::read_failed(address, "process exited"));
        }
        let (idx, offset) = image
            .locate(address, size)
            .ok_or_else(|| Error::read_failed(address, "unmapped"))?;
        Ok(image.regions[idx].1[offset..offset + size].to_vec())
    }

    fn regions(&self) -> Result<Vec<MemoryRegion>> {
        let image = self.image.borrow();
        if image.fail_reads {
            return Err(Error::ScanFailed("process exited".to_string()));
        }
        Ok(image
            .regions
            .iter()
            .map(|(base, bytes)| MemoryRegion {
                base: *base,
                size: bytes.len(),
            })
            .collect())
    }
}

impl WriteMemory for MockMemory {
    fn write_bytes(&self, address: u64, bytes: &[u8]) -> Result<()> {
        {
            let mut image = self.image.borrow_mut();
            if image.fail_writes {
                return Err(Error::write_failed(address, "process exited"));
            }
            if image.locate(address, bytes.len()).is_none() {
                return Err(Error::write_failed(address, "unmapped"));
            }
            image.writes += 1;
        }
        self.put_bytes(address, bytes);
        Ok(())
    }
}
