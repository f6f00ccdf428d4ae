pub mod disk;
pub mod memory;

pub use disk::DiskPointStore;
pub use memory::MemoryPointStore;
