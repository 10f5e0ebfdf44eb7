//! Reference-counted page buffers shared between the read path and the cache.

use std::io::Read;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, RwLock};

struct PageInner {
    refs: AtomicI32,
    len: usize,
    capacity: usize,
    buf: RwLock<Option<Vec<u8>>>,
}

/// A chunk-sized byte buffer with an explicit reference count.
///
/// A `Page` value is a handle: cloning it copies the handle without touching
/// the reference count. Ownership of the underlying buffer is tracked only by
/// [`acquire`](Page::acquire)/[`release`](Page::release) pairs. A freshly
/// created page carries one reference owned by its creator; when the count
/// drops to zero the buffer itself is freed, while `len`/`byte_capacity`
/// remain readable so accounting that happens after the fact still works.
pub struct Page {
    inner: Arc<PageInner>,
}

impl Page {
    /// Allocate a zero-filled page of `len` bytes with one reference.
    pub fn alloc(len: usize) -> Self {
        Self::from_vec(vec![0u8; len])
    }

    /// Wrap an existing buffer into a page with one reference.
    pub fn from_vec(data: Vec<u8>) -> Self {
        let (len, capacity) = (data.len(), data.capacity());
        Page {
            inner: Arc::new(PageInner {
                refs: AtomicI32::new(1),
                len,
                capacity,
                buf: RwLock::new(Some(data)),
            }),
        }
    }

    /// Take one more reference to the buffer.
    pub fn acquire(&self) {
        let prev = self.inner.refs.fetch_add(1, Ordering::AcqRel);
        debug_assert!(prev > 0, "acquire on a freed page");
    }

    /// Drop one reference; the buffer is freed when the count reaches zero.
    pub fn release(&self) {
        let prev = self.inner.refs.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(prev > 0, "release without a matching acquire");
        if prev == 1 {
            self.inner.buf.write().unwrap().take();
        }
    }

    /// Allocated size of the buffer (>= logical length), stable after free.
    pub fn byte_capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Logical length of the page data.
    pub fn len(&self) -> usize {
        self.inner.len
    }

    pub fn is_empty(&self) -> bool {
        self.inner.len == 0
    }

    /// Current reference count, for observability and invariant checks.
    pub fn ref_count(&self) -> i32 {
        self.inner.refs.load(Ordering::Acquire)
    }

    fn read_at(&self, pos: usize, dst: &mut [u8]) -> usize {
        let guard = self.inner.buf.read().unwrap();
        let Some(data) = guard.as_deref() else {
            debug_assert!(false, "read on a freed page");
            return 0;
        };
        if pos >= data.len() {
            return 0;
        }
        let n = dst.len().min(data.len() - pos);
        dst[..n].copy_from_slice(&data[pos..pos + n]);
        n
    }

    #[cfg(test)]
    pub(crate) fn is_freed(&self) -> bool {
        self.inner.buf.read().unwrap().is_none()
    }
}

impl Clone for Page {
    /// Copies the handle only; the reference count is not incremented.
    fn clone(&self) -> Self {
        Page {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// Single-pass reader over a page's bytes.
///
/// Holds its own reference so the buffer stays alive for the reader's
/// lifetime even if every other owner releases; dropping the reader releases
/// that reference.
pub struct PageReader {
    page: Page,
    pos: usize,
}

impl PageReader {
    pub fn new(page: &Page) -> Self {
        page.acquire();
        PageReader {
            page: page.clone(),
            pos: 0,
        }
    }
}

impl Read for PageReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.page.read_at(self.pos, buf);
        self.pos += n;
        Ok(n)
    }
}

impl Drop for PageReader {
    fn drop(&mut self) {
        self.page.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_refcount_lifecycle() {
        let page = Page::from_vec(vec![3u8; 100]);
        assert_eq!(page.ref_count(), 1);
        page.acquire();
        assert_eq!(page.ref_count(), 2);
        page.release();
        assert_eq!(page.ref_count(), 1);
        assert!(!page.is_freed());
        page.release();
        assert_eq!(page.ref_count(), 0);
        assert!(page.is_freed());
        // size accounting stays readable after the buffer is gone
        assert_eq!(page.len(), 100);
        assert!(page.byte_capacity() >= 100);
    }

    #[test]
    fn test_clone_is_a_handle_copy() {
        let page = Page::alloc(8);
        let other = page.clone();
        assert_eq!(page.ref_count(), 1);
        other.release();
        assert!(page.is_freed());
    }

    #[test]
    fn test_reader_reads_full_page() {
        let data: Vec<u8> = (0..255).collect();
        let page = Page::from_vec(data.clone());
        let mut reader = PageReader::new(&page);
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        assert_eq!(out, data);
        drop(reader);
        assert_eq!(page.ref_count(), 1);
    }

    #[test]
    fn test_reader_keeps_buffer_alive() {
        let page = Page::from_vec(vec![9u8; 32]);
        let mut reader = PageReader::new(&page);
        page.release();
        assert!(!page.is_freed());
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        assert_eq!(out, vec![9u8; 32]);
        drop(reader);
        assert!(page.is_freed());
    }
}
