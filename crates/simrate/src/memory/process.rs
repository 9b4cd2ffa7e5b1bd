//! Attaching to the simulator process and reading/writing its memory.

use crate::error::Result;
#[cfg(not(target_os = "windows"))]
use crate::error::Error;
use crate::memory::{MemoryRegion, ReadMemory, WriteMemory};

#[cfg(target_os = "windows")]
use windows::Win32::Foundation::HANDLE;

/// Source of attached processes.
///
/// The supervisor polls this until the target exists; tests substitute a provider
/// that hands out mock memory images.
pub trait ProcessProvider {
    type Process: ReadMemory + WriteMemory;

    fn attach(&mut self, process_name: &str) -> Result<Self::Process>;
}

/// Attaches to live processes through the Win32 API.
#[derive(Debug, Default, Clone, Copy)]
pub struct Win32ProcessProvider;

impl ProcessProvider for Win32ProcessProvider {
    type Process = ProcessHandle;

    fn attach(&mut self, process_name: &str) -> Result<ProcessHandle> {
        ProcessHandle::find_and_open(process_name)
    }
}

/// An open handle to the target process plus its main module geometry.
#[derive(Debug)]
pub struct ProcessHandle {
    pub pid: u32,
    pub name: String,
    pub base_address: u64,
    pub module_size: usize,
    #[cfg(target_os = "windows")]
    handle: HANDLE,
}

// SAFETY: a process handle is a kernel object reference that may be used from any
// thread; we never share the handle without ownership of the `ProcessHandle`.
#[cfg(target_os = "windows")]
unsafe impl Send for ProcessHandle {}

#[cfg(target_os = "windows")]
mod win32 {
    use std::ffi::c_void;

    use tracing::debug;
    use windows::Win32::Foundation::{CloseHandle, E_ACCESSDENIED, HANDLE};
    use windows::Win32::System::Diagnostics::Debug::{ReadProcessMemory, WriteProcessMemory};
    use windows::Win32::System::Diagnostics::ToolHelp::{
        CreateToolhelp32Snapshot, MODULEENTRY32W, Module32FirstW, PROCESSENTRY32W,
        Process32FirstW, Process32NextW, TH32CS_SNAPMODULE, TH32CS_SNAPMODULE32,
        TH32CS_SNAPPROCESS,
    };
    use windows::Win32::System::Memory::{
        MEM_COMMIT, MEMORY_BASIC_INFORMATION, PAGE_EXECUTE_READ, PAGE_EXECUTE_READWRITE,
        PAGE_GUARD, PAGE_READONLY, PAGE_READWRITE, VirtualQueryEx,
    };
    use windows::Win32::System::Threading::{
        OpenProcess, PROCESS_QUERY_INFORMATION, PROCESS_VM_OPERATION, PROCESS_VM_READ,
        PROCESS_VM_WRITE,
    };

    use super::ProcessHandle;
    use crate::error::{Error, Result};
    use crate::memory::MemoryRegion;

    /// Highest user-mode address on x64 Windows
    const MAX_USER_ADDRESS: u64 = 0x7FFF_FFFF_FFFF;

    fn wide_to_string(wide: &[u16]) -> String {
        let len = wide.iter().position(|&c| c == 0).unwrap_or(wide.len());
        String::from_utf16_lossy(&wide[..len])
    }

    pub fn find_process_id(process_name: &str) -> Result<Option<u32>> {
        // SAFETY: the snapshot handle is closed before returning and the entry struct
        // is initialised with its size as ToolHelp requires.
        unsafe {
            let snapshot = CreateToolhelp32Snapshot(TH32CS_SNAPPROCESS, 0)
                .map_err(|e| Error::ProcessOpenFailed(format!("process snapshot: {e}")))?;

            let mut entry = PROCESSENTRY32W {
                dwSize: std::mem::size_of::<PROCESSENTRY32W>() as u32,
                ..Default::default()
            };

            let mut found = None;
            if Process32FirstW(snapshot, &mut entry).is_ok() {
                loop {
                    if wide_to_string(&entry.szExeFile).eq_ignore_ascii_case(process_name) {
                        found = Some(entry.th32ProcessID);
                        break;
                    }
                    if Process32NextW(snapshot, &mut entry).is_err() {
                        break;
                    }
                }
            }

            let _ = CloseHandle(snapshot);
            Ok(found)
        }
    }

    pub fn open(pid: u32, process_name: &str) -> Result<ProcessHandle> {
        let access =
            PROCESS_VM_READ | PROCESS_VM_WRITE | PROCESS_VM_OPERATION | PROCESS_QUERY_INFORMATION;

        // SAFETY: OpenProcess has no memory-safety preconditions; the returned handle
        // is owned by the ProcessHandle and closed on drop.
        let handle = unsafe { OpenProcess(access, false, pid) }.map_err(|e| {
            if e.code() == E_ACCESSDENIED {
                Error::AccessDenied(process_name.to_string())
            } else {
                Error::ProcessOpenFailed(format!("{process_name} (pid {pid}): {e}"))
            }
        })?;

        let (base_address, module_size) = match main_module(pid) {
            Ok(module) => module,
            Err(e) => {
                // SAFETY: handle was opened above and is not used afterwards.
                unsafe {
                    let _ = CloseHandle(handle);
                }
                return Err(e);
            }
        };

        debug!(
            "Opened {} (pid {}, base {:#x}, image size {:#x})",
            process_name, pid, base_address, module_size
        );

        Ok(ProcessHandle {
            pid,
            name: process_name.to_string(),
            base_address,
            module_size,
            handle,
        })
    }

    fn main_module(pid: u32) -> Result<(u64, usize)> {
        // SAFETY: same snapshot protocol as find_process_id.
        unsafe {
            let snapshot = CreateToolhelp32Snapshot(TH32CS_SNAPMODULE | TH32CS_SNAPMODULE32, pid)
                .map_err(|e| {
                    if e.code() == E_ACCESSDENIED {
                        Error::AccessDenied(format!("module snapshot of pid {pid}"))
                    } else {
                        Error::ProcessOpenFailed(format!("module snapshot of pid {pid}: {e}"))
                    }
                })?;

            let mut entry = MODULEENTRY32W {
                dwSize: std::mem::size_of::<MODULEENTRY32W>() as u32,
                ..Default::default()
            };
            let result = Module32FirstW(snapshot, &mut entry);
            let _ = CloseHandle(snapshot);

            result.map_err(|e| Error::ProcessOpenFailed(format!("main module of pid {pid}: {e}")))?;
            Ok((entry.modBaseAddr as u64, entry.modBaseSize as usize))
        }
    }

    pub fn read(handle: HANDLE, address: u64, size: usize) -> Result<Vec<u8>> {
        let mut buffer = vec![0u8; size];
        let mut bytes_read = 0usize;

        // SAFETY: the buffer is exactly `size` bytes and outlives the call.
        unsafe {
            ReadProcessMemory(
                handle,
                address as *const c_void,
                buffer.as_mut_ptr().cast(),
                size,
                Some(&mut bytes_read),
            )
        }
        .map_err(|e| Error::read_failed(address, e.to_string()))?;

        if bytes_read != size {
            return Err(Error::read_failed(
                address,
                format!("short read: {bytes_read} of {size} bytes"),
            ));
        }
        Ok(buffer)
    }

    pub fn write(handle: HANDLE, address: u64, bytes: &[u8]) -> Result<()> {
        let mut written = 0usize;

        // SAFETY: the source slice is valid for `bytes.len()` bytes.
        unsafe {
            WriteProcessMemory(
                handle,
                address as *const c_void,
                bytes.as_ptr().cast(),
                bytes.len(),
                Some(&mut written),
            )
        }
        .map_err(|e| Error::write_failed(address, e.to_string()))?;

        if written != bytes.len() {
            return Err(Error::write_failed(
                address,
                format!("short write: {written} of {} bytes", bytes.len()),
            ));
        }
        Ok(())
    }

    pub fn regions(handle: HANDLE) -> Vec<MemoryRegion> {
        let readable = PAGE_READONLY.0 | PAGE_READWRITE.0 | PAGE_EXECUTE_READ.0 | PAGE_EXECUTE_READWRITE.0;
        let mut regions = Vec::new();
        let mut address = 0u64;

        while address < MAX_USER_ADDRESS {
            let mut info = MEMORY_BASIC_INFORMATION::default();
            // SAFETY: `info` is a properly sized out-parameter.
            let written = unsafe {
                VirtualQueryEx(
                    handle,
                    Some(address as *const c_void),
                    &mut info,
                    std::mem::size_of::<MEMORY_BASIC_INFORMATION>(),
                )
            };
            if written == 0 || info.RegionSize == 0 {
                break;
            }

            let base = info.BaseAddress as u64;
            if info.State == MEM_COMMIT
                && info.Protect.0 & readable != 0
                && info.Protect.0 & PAGE_GUARD.0 == 0
            {
                regions.push(MemoryRegion {
                    base,
                    size: info.RegionSize,
                });
            }

            address = base + info.RegionSize as u64;
        }

        regions
    }
}

#[cfg(target_os = "windows")]
pub use win32::find_process_id;

#[cfg(not(target_os = "windows"))]
pub fn find_process_id(_process_name: &str) -> Result<Option<u32>> {
    Ok(None)
}

impl ProcessHandle {
    /// Locate a running process by executable name and open it for read/write.
    pub fn find_and_open(process_name: &str) -> Result<Self> {
        #[cfg(target_os = "windows")]
        {
            let pid = win32::find_process_id(process_name)?
                .ok_or_else(|| crate::error::Error::ProcessNotFound(process_name.to_string()))?;
            win32::open(pid, process_name)
        }

        #[cfg(not(target_os = "windows"))]
        {
            Err(Error::ProcessNotFound(format!(
                "{process_name} (process attach is only supported on Windows)"
            )))
        }
    }

    /// Open a specific process id.
    pub fn open(pid: u32, process_name: &str) -> Result<Self> {
        #[cfg(target_os = "windows")]
        {
            win32::open(pid, process_name)
        }

        #[cfg(not(target_os = "windows"))]
        {
            Err(Error::ProcessOpenFailed(format!(
                "{process_name} (pid {pid}): process attach is only supported on Windows"
            )))
        }
    }
}

impl ReadMemory for ProcessHandle {
    fn base_address(&self) -> u64 {
        self.base_address
    }

    fn module_size(&self) -> usize {
        self.module_size
    }

    fn read_bytes(&self, address: u64, size: usize) -> Result<Vec<u8>> {
        #[cfg(target_os = "windows")]
        {
            win32::read(self.handle, address, size)
        }

        #[cfg(not(target_os = "windows"))]
        {
            let _ = size;
            Err(Error::read_failed(address, "unsupported platform"))
        }
    }

    fn regions(&self) -> Result<Vec<MemoryRegion>> {
        #[cfg(target_os = "windows")]
        {
            Ok(win32::regions(self.handle))
        }

        #[cfg(not(target_os = "windows"))]
        {
            Err(Error::ScanFailed("unsupported platform".to_string()))
        }
    }
}

impl WriteMemory for ProcessHandle {
    fn write_bytes(&self, address: u64, bytes: &[u8]) -> Result<()> {
        #[cfg(target_os = "windows")]
        {
            win32::write(self.handle, address, bytes)
        }

        #[cfg(not(target_os = "windows"))]
        {
            let _ = bytes;
            Err(Error::write_failed(address, "unsupported platform"))
        }
    }
}

#[cfg(target_os = "windows")]
impl Drop for ProcessHandle {
    fn drop(&mut self) {
        // SAFETY: the handle is owned by this struct and closed exactly once.
        unsafe {
            let _ = windows::Win32::Foundation::CloseHandle(self.handle);
        }
    }
}
