use std::sync::{Arc, Weak};

use parking_lot::Mutex;

/// Fixed-capacity byte region on loan from a [`BufferPool`].
///
/// Not `Clone`: a loan has exactly one owner at a time. Ownership moves
/// driver → pipeline queue → forwarding worker, and only the worker hands it
/// back. A buffer dropped anywhere else is written off, so the pool can lend a
/// fresh one in its place.
#[derive(Debug)]
pub struct SampleBuffer {
    data: Vec<u8>,
    len: usize,
    pool: Weak<Mutex<PoolState>>,
}

impl SampleBuffer {
    /// Capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Number of valid bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The valid bytes.
    pub fn as_slice(&self) -> &[u8] {
        &self.data[..self.len]
    }

    /// Copy from `src`, truncating to capacity. Returns the bytes copied.
    pub fn fill_from(&mut self, src: &[u8]) -> usize {
        let n = src.len().min(self.data.len());
        self.data[..n].copy_from_slice(&src[..n]);
        self.len = n;
        n
    }

    /// The whole backing region, for drivers that write in place.
    /// Follow with [`SampleBuffer::set_len`].
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Mark the first `len` bytes valid (clamped to capacity).
    pub fn set_len(&mut self, len: usize) {
        self.len = len.min(self.data.len());
    }
}

impl Drop for SampleBuffer {
    fn drop(&mut self) {
        // Returned buffers have had their storage moved out.
        if self.data.is_empty() {
            return;
        }
        if let Some(state) = self.pool.upgrade() {
            let mut s = state.lock();
            s.outstanding = s.outstanding.saturating_sub(1);
            s.written_off += 1;
        }
    }
}

/// Snapshot of pool accounting.
///
/// Invariant: `loaned == returned + written_off + outstanding`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolStats {
    pub loaned: u64,
    pub returned: u64,
    pub written_off: u64,
    pub outstanding: usize,
    pub idle: usize,
}

#[derive(Debug)]
struct PoolState {
    free: Vec<Vec<u8>>,
    outstanding: usize,
    loaned: u64,
    returned: u64,
    written_off: u64,
}

/// Owns a fixed set of reusable sample buffers and lends them out.
///
/// At most `capacity` buffers are on loan at once; `take()` returns `None`
/// beyond that, which is the producer's backpressure signal. Cloning yields
/// another handle to the same pool.
#[derive(Debug, Clone)]
pub struct BufferPool {
    state: Arc<Mutex<PoolState>>,
    capacity: usize,
    buffer_size: usize,
}

impl BufferPool {
    /// Create a pool of `capacity` buffers of `buffer_size` bytes each, all
    /// allocated up front.
    pub fn new(capacity: usize, buffer_size: usize) -> Self {
        let capacity = capacity.max(1);
        let buffer_size = buffer_size.max(1);
        let free = (0..capacity).map(|_| vec![0u8; buffer_size]).collect();

        Self {
            state: Arc::new(Mutex::new(PoolState {
                free,
                outstanding: 0,
                loaned: 0,
                returned: 0,
                written_off: 0,
            })),
            capacity,
            buffer_size,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// Lend a buffer, or `None` if `capacity` buffers are already out.
    pub fn take(&self) -> Option<SampleBuffer> {
        let mut s = self.state.lock();
        if s.outstanding >= self.capacity {
            return None;
        }
        // Written-off buffers are replaced lazily.
        let data = s.free.pop().unwrap_or_else(|| vec![0u8; self.buffer_size]);
        s.outstanding += 1;
        s.loaned += 1;
        drop(s);

        Some(SampleBuffer {
            data,
            len: 0,
            pool: Arc::downgrade(&self.state),
        })
    }

    /// Reclaim a buffer after the native sink is done with it.
    pub(crate) fn give_back(&self, mut buffer: SampleBuffer) {
        if Weak::as_ptr(&buffer.pool) != Arc::as_ptr(&self.state) {
            // Dropping it writes it off against the pool that lent it.
            log::warn!("Buffer returned to a pool that did not lend it");
            return;
        }

        let data = std::mem::take(&mut buffer.data);
        let mut s = self.state.lock();
        s.outstanding = s.outstanding.saturating_sub(1);
        s.returned += 1;
        s.free.push(data);
    }

    pub fn stats(&self) -> PoolStats {
        let s = self.state.lock();
        PoolStats {
            loaned: s.loaned,
            returned: s.returned,
            written_off: s.written_off,
            outstanding: s.outstanding,
            idle: s.free.len(),
        }
    }
}
