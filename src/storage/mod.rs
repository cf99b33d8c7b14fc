// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Store client contracts and in-memory reference clients.

pub mod graph_memory;
pub mod memory;
pub mod traits;

pub use graph_memory::MemoryGraph;
pub use memory::{CallStats, MemoryObjectStore, MemoryWideColumn};
pub use traits::{MAX_BATCH_GET, MAX_BATCH_WRITE};
