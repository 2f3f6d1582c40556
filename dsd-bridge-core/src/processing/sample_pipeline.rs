use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};

use crate::models::config::PipelineConfig;
use crate::models::error::BridgeError;
use crate::processing::buffer_pool::{BufferPool, SampleBuffer};
use crate::traits::native_bridge::NativeCommandSink;

/// Counters shared between the worker, producers and the owner.
#[derive(Debug, Default)]
struct ForwardingCounters {
    submitted: AtomicU64,
    forwarded: AtomicU64,
    sink_errors: AtomicU64,
    rejected: AtomicU64,
    dropped_at_stop: AtomicU64,
}

/// Snapshot of pipeline counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PipelineStats {
    /// Buffers accepted into the queue.
    pub submitted: u64,
    /// Buffers the native sink accepted.
    pub forwarded: u64,
    /// Buffers the native sink refused (still returned to the pool).
    pub sink_errors: u64,
    /// Submissions bounced back to the producer (queue full or stopped).
    pub rejected: u64,
    /// Buffers left in the queue when the pipeline stopped.
    pub dropped_at_stop: u64,
}

/// Producer-side handle given to the hardware driver.
///
/// Cheap to clone. Every method returns immediately.
#[derive(Clone)]
pub struct SampleProducer {
    pool: BufferPool,
    tx: Sender<SampleBuffer>,
    running: Arc<AtomicBool>,
    counters: Arc<ForwardingCounters>,
}

impl SampleProducer {
    /// Borrow an empty buffer. `None` when every buffer is on loan.
    pub fn loan(&self) -> Option<SampleBuffer> {
        self.pool.take()
    }

    /// Queue a filled buffer for forwarding.
    ///
    /// Never blocks. If the queue is full or the pipeline has stopped, the
    /// buffer comes back as `Err` and stays on loan to the caller.
    pub fn submit(&self, buffer: SampleBuffer) -> Result<(), SampleBuffer> {
        if !self.running.load(Ordering::SeqCst) {
            self.counters.rejected.fetch_add(1, Ordering::Relaxed);
            return Err(buffer);
        }

        match self.tx.try_send(buffer) {
            Ok(()) => {
                self.counters.submitted.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(TrySendError::Full(buffer)) | Err(TrySendError::Disconnected(buffer)) => {
                self.counters.rejected.fetch_add(1, Ordering::Relaxed);
                Err(buffer)
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

/// Outcome of [`SampleForwardingPipeline::stop`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StopReport {
    /// The worker exited within the join timeout.
    pub joined: bool,
    /// Queued buffers discarded without being forwarded.
    pub dropped: u64,
}

struct Worker {
    running: Arc<AtomicBool>,
    tx: Sender<SampleBuffer>,
    rx: Receiver<SampleBuffer>,
    exited: Receiver<()>,
    handle: thread::JoinHandle<()>,
}

/// Bounded queue plus one worker draining it into the native sink.
///
/// ```text
/// [driver] → loan() → fill → submit() → [bounded queue] → worker → feed_samples() → give_back()
/// ```
///
/// Each run gets its own running flag, so a worker left behind by a timed-out
/// stop cannot be revived by the next `start()`.
pub struct SampleForwardingPipeline {
    config: PipelineConfig,
    pool: BufferPool,
    sink: Arc<dyn NativeCommandSink>,
    counters: Arc<ForwardingCounters>,
    worker: Option<Worker>,
}

impl SampleForwardingPipeline {
    pub fn new(config: PipelineConfig, sink: Arc<dyn NativeCommandSink>) -> Self {
        let pool = BufferPool::new(config.buffer_count, config.buffer_size);
        Self {
            config,
            pool,
            sink,
            counters: Arc::new(ForwardingCounters::default()),
            worker: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.worker
            .as_ref()
            .map(|w| w.running.load(Ordering::SeqCst))
            .unwrap_or(false)
    }

    pub fn pool(&self) -> &BufferPool {
        &self.pool
    }

    /// Spawn the forwarding worker. Fails if already running.
    pub fn start(&mut self) -> Result<SampleProducer, BridgeError> {
        if self.is_running() {
            return Err(BridgeError::InvalidState(
                "sample pipeline already running".into(),
            ));
        }

        let (tx, rx) = bounded::<SampleBuffer>(self.config.queue_capacity);
        let (exit_tx, exit_rx) = bounded::<()>(1);
        let running = Arc::new(AtomicBool::new(true));

        let handle = {
            let running = Arc::clone(&running);
            let rx = rx.clone();
            let pool = self.pool.clone();
            let sink = Arc::clone(&self.sink);
            let counters = Arc::clone(&self.counters);
            let poll_interval = self.config.poll_interval;

            thread::Builder::new()
                .name("sample-forwarding".into())
                .spawn(move || {
                    forwarding_loop(&running, &rx, &pool, sink.as_ref(), &counters, poll_interval);
                    let _ = exit_tx.send(());
                })
                .map_err(|e| {
                    BridgeError::NativeOperationFailed(format!(
                        "failed to spawn forwarding thread: {}",
                        e
                    ))
                })?
        };

        log::info!(
            "Sample pipeline started (queue={}, buffers={}x{} bytes)",
            self.config.queue_capacity,
            self.config.buffer_count,
            self.config.buffer_size
        );

        let producer = SampleProducer {
            pool: self.pool.clone(),
            tx: tx.clone(),
            running: Arc::clone(&running),
            counters: Arc::clone(&self.counters),
        };

        self.worker = Some(Worker {
            running,
            tx,
            rx,
            exited: exit_rx,
            handle,
        });

        Ok(producer)
    }

    /// A new producer handle for the current run.
    pub fn producer(&self) -> Option<SampleProducer> {
        let worker = self.worker.as_ref()?;
        if !worker.running.load(Ordering::SeqCst) {
            return None;
        }
        Some(SampleProducer {
            pool: self.pool.clone(),
            tx: worker.tx.clone(),
            running: Arc::clone(&worker.running),
            counters: Arc::clone(&self.counters),
        })
    }

    /// Cooperative stop with a bounded join. No-op when not running.
    ///
    /// A worker stuck inside a native call cannot be preempted: after
    /// `join_timeout` it is detached and the call returns anyway. Buffers
    /// still queued are dropped without being forwarded.
    pub fn stop(&mut self) -> StopReport {
        let Some(worker) = self.worker.take() else {
            return StopReport::default();
        };

        worker.running.store(false, Ordering::SeqCst);

        let joined = match worker.exited.recv_timeout(self.config.join_timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => true,
            Err(RecvTimeoutError::Timeout) => false,
        };

        if joined {
            if worker.handle.join().is_err() {
                log::error!("Sample forwarding thread panicked");
            }
        } else {
            log::warn!(
                "Sample forwarding thread did not exit within {:?}; detaching",
                self.config.join_timeout
            );
        }

        // Each discarded buffer writes itself off in the pool.
        let dropped = worker.rx.try_iter().count() as u64;
        self.counters
            .dropped_at_stop
            .fetch_add(dropped, Ordering::Relaxed);

        let stats = self.stats();
        log::info!(
            "Sample pipeline stopped: forwarded={} sink_errors={} rejected={} dropped={}",
            stats.forwarded,
            stats.sink_errors,
            stats.rejected,
            dropped
        );

        StopReport { joined, dropped }
    }

    pub fn stats(&self) -> PipelineStats {
        PipelineStats {
            submitted: self.counters.submitted.load(Ordering::Relaxed),
            forwarded: self.counters.forwarded.load(Ordering::Relaxed),
            sink_errors: self.counters.sink_errors.load(Ordering::Relaxed),
            rejected: self.counters.rejected.load(Ordering::Relaxed),
            dropped_at_stop: self.counters.dropped_at_stop.load(Ordering::Relaxed),
        }
    }
}

impl Drop for SampleForwardingPipeline {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Worker body: poll, forward, return to pool, until the run flag clears.
fn forwarding_loop(
    running: &AtomicBool,
    rx: &Receiver<SampleBuffer>,
    pool: &BufferPool,
    sink: &dyn NativeCommandSink,
    counters: &ForwardingCounters,
    poll_interval: Duration,
) {
    while running.load(Ordering::SeqCst) {
        match rx.recv_timeout(poll_interval) {
            Ok(buffer) => {
                match sink.feed_samples(buffer.as_slice()) {
                    Ok(()) => {
                        counters.forwarded.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(e) => {
                        counters.sink_errors.fetch_add(1, Ordering::Relaxed);
                        log::warn!("Native sink refused {} bytes: {}", buffer.len(), e);
                    }
                }
                // The sink call has returned, so the engine no longer holds it.
                pool.give_back(buffer);
            }
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
}
