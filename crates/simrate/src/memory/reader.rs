use crate::error::{Error, Result};

/// A committed, readable range of the target's address space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryRegion {
    pub base: u64,
    pub size: usize,
}

impl MemoryRegion {
    pub fn end(&self) -> u64 {
        self.base + self.size as u64
    }

    pub fn contains(&self, address: u64) -> bool {
        address >= self.base && address < self.end()
    }
}

/// Read access to another process's memory.
///
/// Implemented by [`ProcessHandle`](super::ProcessHandle) for a live process and by
/// the in-crate mock for tests.
pub trait ReadMemory {
    /// Base address of the main module image
    fn base_address(&self) -> u64;

    /// Size of the main module image in bytes (`SizeOfImage`)
    fn module_size(&self) -> usize;

    fn read_bytes(&self, address: u64, size: usize) -> Result<Vec<u8>>;

    /// Enumerate committed readable regions, sorted by address.
    fn regions(&self) -> Result<Vec<MemoryRegion>>;

    fn read_u64(&self, address: u64) -> Result<u64> {
        let bytes = self.read_bytes(address, 8)?;
        let array: [u8; 8] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| Error::read_failed(address, "short read"))?;
        Ok(u64::from_le_bytes(array))
    }

    fn read_f32(&self, address: u64) -> Result<f32> {
        let bytes = self.read_bytes(address, 4)?;
        let array: [u8; 4] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| Error::read_failed(address, "short read"))?;
        Ok(f32::from_le_bytes(array))
    }

    /// A process that still answers reads at its module base is considered alive.
    fn is_alive(&self) -> bool {
        self.read_bytes(self.base_address(), 2).is_ok()
    }
}

pub trait WriteMemory {
    fn write_bytes(&self, address: u64, bytes: &[u8]) -> Result<()>;

    fn write_f32(&self, address: u64, value: f32) -> Result<()> {
        self.write_bytes(address, &value.to_le_bytes())
    }
}
