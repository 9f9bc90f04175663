pub mod memory;
#[cfg(feature = "storage-rocksdb")]
pub mod rocksdb;
