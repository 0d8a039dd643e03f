// SPDX-License-Identifier: Apache-2.0

// Adapter implementations

pub mod duckdb;
pub mod file;
pub mod memory;

pub use self::duckdb::DuckDbAdapter;
pub use file::FileAdapter;
pub use memory::MemoryAdapter;
