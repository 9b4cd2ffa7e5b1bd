//! Byte-pattern scans over process memory.

use memchr::memmem::Finder;
use tracing::debug;

use crate::error::{Error, Result};
use crate::memory::ReadMemory;

/// Chunk size for region reads (16MB)
const SCAN_CHUNK_SIZE: usize = 16 * 1024 * 1024;

/// Find every occurrence of `pattern` in committed readable memory.
///
/// Returned addresses are sorted ascending. Chunks that fail to read are skipped,
/// since regions can be decommitted while a scan is running; failing to enumerate
/// regions at all is an error.
pub fn scan_all<R: ReadMemory + ?Sized>(reader: &R, pattern: &[u8]) -> Result<Vec<u64>> {
    if pattern.is_empty() {
        return Err(Error::ScanFailed("empty pattern".to_string()));
    }

    let finder = Finder::new(pattern);
    let mut results = Vec::new();

    for region in reader.regions()? {
        scan_range(reader, region.base, region.size, &finder, false, &mut results);
    }

    results.sort_unstable();
    results.dedup();
    Ok(results)
}

/// Find the first occurrence of `pattern` inside the main module image.
pub fn find_in_module<R: ReadMemory + ?Sized>(reader: &R, pattern: &[u8]) -> Result<Option<u64>> {
    if pattern.is_empty() {
        return Err(Error::ScanFailed("empty pattern".to_string()));
    }

    let finder = Finder::new(pattern);
    let mut results = Vec::new();
    scan_range(
        reader,
        reader.base_address(),
        reader.module_size(),
        &finder,
        true,
        &mut results,
    );
    Ok(results.first().copied())
}

fn scan_range<R: ReadMemory + ?Sized>(
    reader: &R,
    start: u64,
    len: usize,
    finder: &Finder<'_>,
    first_only: bool,
    results: &mut Vec<u64>,
) {
    let keep = finder.needle().len().saturating_sub(1);
    let mut tail: Vec<u8> = Vec::new();
    let mut offset = 0usize;

    while offset < len {
        let read_size = (len - offset).min(SCAN_CHUNK_SIZE);
        let addr = start + offset as u64;

        let chunk = match reader.read_bytes(addr, read_size) {
            Ok(bytes) => bytes,
            Err(e) => {
                debug!("Skipping unreadable chunk at {:#x}: {}", addr, e);
                tail.clear();
                offset += read_size;
                continue;
            }
        };

        let mut data = Vec::with_capacity(tail.len() + chunk.len());
        data.extend_from_slice(&tail);
        data.extend_from_slice(&chunk);
        let data_base = addr - tail.len() as u64;

        for pos in finder.find_iter(&data) {
            results.push(data_base + pos as u64);
            if first_only {
                return;
            }
        }

        tail = if data.len() > keep {
            data[data.len() - keep..].to_vec()
        } else {
            data
        };
        offset += read_size;
    }
}
