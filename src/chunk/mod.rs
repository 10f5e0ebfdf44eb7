//! Chunk data path: page buffers and the client-side page cache.
//!
//! Responsibilities:
//! - Own the reference-counted `Page` buffers that carry chunk data between
//!   the remote store and the kernel-facing read path.
//! - Keep recently used pages in memory so repeated reads of a hot chunk
//!   skip the remote round trip.
//! - Define the `CacheStore` interface shared by cache backends; upload
//!   staging belongs to the disk-backed backend, not the in-memory one.
//!
//! Submodules:
//! - `page`: reference-counted byte buffers and read handles
//! - `cache`: store interface, sizing options and the in-memory backend
pub mod cache;
pub mod page;
