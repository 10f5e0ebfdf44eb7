// Library crate for SlateFS: re-export internal modules for reuse by external bins.
pub mod chunk;
