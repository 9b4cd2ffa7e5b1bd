pub mod layout;
mod process;
mod reader;
mod scan;

#[cfg(test)]
pub mod mock;

pub use process::*;
pub use reader::{MemoryRegion, ReadMemory, WriteMemory};
pub use scan::{find_in_module, scan_all};

#[cfg(test)]
pub use mock::{MockMemory, MockMemoryBuilder};
