// src/proxy/buffer.rs
use crossbeam::queue::SegQueue;
use std::ops::Deref;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt};

/// A relay buffer borrowed from a [`BufferPool`].
///
/// Dropping it returns the allocation to the pool, so every exit path of a
/// copy loop (including cancellation) gives the buffer back.
pub struct PooledBuffer {
    buffer: Vec<u8>,
    filled: usize,
    pool: Arc<PoolInner>,
}

impl PooledBuffer {
    /// Read once from `reader`, replacing the previous contents.
    pub async fn read_from<R>(&mut self, reader: &mut R) -> std::io::Result<usize>
    where
        R: AsyncRead + Unpin,
    {
        self.filled = 0;
        let n = reader.read(&mut self.buffer[..]).await?;
        self.filled = n;
        Ok(n)
    }
}

impl Deref for PooledBuffer {
    type Target = [u8];

    /// Only the bytes produced by the last read.
    fn deref(&self) -> &Self::Target {
        &self.buffer[..self.filled]
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        let mut idle = self.pool.idle.load(Ordering::Relaxed);
        while idle < self.pool.max_pooled {
            match self.pool.idle.compare_exchange_weak(
                idle,
                idle + 1,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => {
                    self.pool.queue.push(std::mem::take(&mut self.buffer));
                    return;
                }
                Err(current) => idle = current,
            }
        }
        // Pool full: the allocation is released.
    }
}

#[derive(Debug)]
struct PoolInner {
    queue: SegQueue<Vec<u8>>,
    idle: AtomicUsize,
    buffer_size: usize,
    max_pooled: usize,
}

/// Lock-free pool of fixed-size relay buffers.
#[derive(Debug, Clone)]
pub struct BufferPool {
    inner: Arc<PoolInner>,
}

impl BufferPool {
    /// `max_pooled` bounds how many idle buffers are retained; buffers are
    /// allocated lazily on demand.
    pub fn new(buffer_size: usize, max_pooled: usize) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                queue: SegQueue::new(),
                idle: AtomicUsize::new(0),
                buffer_size: buffer_size.max(1),
                max_pooled,
            }),
        }
    }

    pub fn acquire(&self) -> PooledBuffer {
        let buffer = match self.inner.queue.pop() {
            Some(buffer) => {
                self.inner.idle.fetch_sub(1, Ordering::Relaxed);
                buffer
            }
            None => vec![0u8; self.inner.buffer_size],
        };

        PooledBuffer {
            buffer,
            filled: 0,
            pool: Arc::clone(&self.inner),
        }
    }

    pub fn buffer_size(&self) -> usize {
        self.inner.buffer_size
    }

    /// Number of idle buffers currently held by the pool.
    pub fn available(&self) -> usize {
        self.inner.idle.load(Ordering::Relaxed)
    }
}
