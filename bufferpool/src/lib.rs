#![cfg_attr(test, allow(clippy::unwrap_used))]

use std::{
    ops::{Deref, DerefMut},
    sync::{
        Arc,
        atomic::{AtomicI64, Ordering},
    },
};

#[derive(Clone)]
pub struct BufferPool<B> {
    inner: Arc<lockfree_object_pool::MutexObjectPool<BufferStorage<B>>>,
    live: Arc<AtomicI64>,
}

impl<B> BufferPool<B>
where
    B: Buf,
{
    pub fn new(capacity: usize, tag: &'static str) -> Self {
        let live = Arc::new(AtomicI64::new(0));
        let live_for_alloc = live.clone();

        Self {
            inner: Arc::new(lockfree_object_pool::MutexObjectPool::new(
                move || {
                    tracing::trace!(tag, capacity, "allocating pool buffer");
                    BufferStorage::new(B::with_capacity(capacity), live_for_alloc.clone())
                },
                |_| {},
            )),
            live,
        }
    }

    pub fn pull(&self) -> Buffer<B> {
        Buffer {
            inner: self.inner.pull_owned(),
            pool: self.inner.clone(),
        }
    }

    /// Number of buffers currently checked out plus idle in the pool.
    pub fn live_count(&self) -> i64 {
        self.live.load(Ordering::Relaxed)
    }
}

impl<B> BufferPool<B>
where
    B: Buf + DerefMut<Target = [u8]>,
{
    pub fn pull_initialised(&self, data: &[u8]) -> Buffer<B> {
        let mut buffer = self.pull();
        let len = data.len();

        buffer.resize_to(len);
        buffer.copy_from_slice(data);

        buffer
    }
}

pub struct Buffer<B> {
    inner: lockfree_object_pool::MutexOwnedReusable<BufferStorage<B>>,
    pool: Arc<lockfree_object_pool::MutexObjectPool<BufferStorage<B>>>,
}

impl Buffer<Vec<u8>> {
    /// Truncates `num` bytes from the front of the buffer.
    pub fn truncate_front(&mut self, num: usize) {
        let current_len = self.len();

        self.copy_within(num.., 0);
        self.truncate(current_len - num);
    }

    /// Moves the buffer back by `num` bytes, returning the new space at the front.
    pub fn move_back(&mut self, num: usize) -> &mut [u8] {
        let current_len = self.len();

        self.resize(current_len + num, 0);
        self.copy_within(..current_len, num);

        &mut self[..num]
    }
}

impl<B> Clone for Buffer<B>
where
    B: Buf,
{
    fn clone(&self) -> Self {
        let mut copy = self.pool.pull_owned();

        self.inner.inner.clone(&mut copy);

        Self {
            inner: copy,
            pool: self.pool.clone(),
        }
    }
}

impl<B> PartialEq for Buffer<B>
where
    B: Deref<Target = [u8]>,
{
    fn eq(&self, other: &Self) -> bool {
        self.as_ref() == other.as_ref()
    }
}

impl<B> Eq for Buffer<B> where B: Deref<Target = [u8]> {}

impl<B> std::fmt::Debug for Buffer<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Buffer").finish()
    }
}

impl<B> Deref for Buffer<B> {
    type Target = B;

    fn deref(&self) -> &Self::Target {
        self.inner.deref()
    }
}

impl<B> DerefMut for Buffer<B> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.inner.deref_mut()
    }
}

pub trait Buf: Sized {
    fn with_capacity(capacity: usize) -> Self;
    fn clone(&self, dst: &mut Self);
    fn resize_to(&mut self, len: usize);
}

impl Buf for Vec<u8> {
    fn with_capacity(capacity: usize) -> Self {
        vec![0; capacity]
    }

    fn clone(&self, dst: &mut Self) {
        dst.resize(self.len(), 0);
        dst.copy_from_slice(self);
    }

    fn resize_to(&mut self, len: usize) {
        self.resize(len, 0);
    }
}

/// Wraps a buffer `B` and keeps the pool's live-buffer counter in sync.
struct BufferStorage<B> {
    inner: B,
    live: Arc<AtomicI64>,
}

impl<B> Drop for BufferStorage<B> {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::Relaxed);
    }
}

impl<B> BufferStorage<B> {
    fn new(inner: B, live: Arc<AtomicI64>) -> Self {
        live.fetch_add(1, Ordering::Relaxed);

        Self { inner, live }
    }
}

impl<B> Deref for BufferStorage<B> {
    type Target = B;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl<B> DerefMut for BufferStorage<B> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_can_be_cloned() {
        let pool = BufferPool::<Vec<u8>>::new(1024, "test");

        let buffer = pool.pull_initialised(b"hello world");

        #[allow(clippy::redundant_clone)]
        let buffer2 = buffer.clone();

        assert_eq!(&buffer2[..], &buffer[..]);
    }

    #[test]
    fn cloned_buffer_owns_its_own_memory() {
        let pool = BufferPool::<Vec<u8>>::new(1024, "test");

        let buffer = pool.pull_initialised(b"hello world");

        let buffer2 = buffer.clone();
        drop(buffer);

        assert_eq!(&buffer2[..11], b"hello world");
    }

    #[test]
    fn initialised_buffer_is_only_as_long_as_content() {
        let pool = BufferPool::<Vec<u8>>::new(1024, "test");

        let buffer = pool.pull_initialised(b"hello world");

        assert_eq!(buffer.len(), 11);
    }

    #[test]
    fn live_count_tracks_allocation_and_drop() {
        let pool = BufferPool::<Vec<u8>>::new(1024, "test");

        let a = pool.pull_initialised(b"one");
        let b = pool.pull_initialised(b"two");
        assert_eq!(pool.live_count(), 2);

        drop(a);
        drop(b);
        assert_eq!(pool.live_count(), 0);
    }
}
