//! Start/stop control for the streaming loop.
//!
//! A `StreamController` owns at most one loop thread. The loop runs one
//! cycle, waits out the interval, and checks its run flag before the next
//! cycle. `stop` only clears the flag: a cycle in progress always runs to
//! completion.
//!
//! `FramePipeline` is the cycle body for directory streaming. It drains the
//! frames pending in its source and checks the stop signal before each one,
//! so a stop during a backlog takes effect after the current frame.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};

use crate::detect::FrameProcessor;
use crate::frame::DirectorySource;
use crate::matching::Engine;
use crate::registry::VehicleRegistry;

const WAIT_SLICE: Duration = Duration::from_millis(50);

/// Counters published by a running loop.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StreamStats {
    pub cycles: u64,
    pub failed_cycles: u64,
}

#[derive(Default)]
struct Counters {
    cycles: AtomicU64,
    failed_cycles: AtomicU64,
}

/// Cloneable handle that clears a loop's run flag.
#[derive(Clone, Debug)]
pub struct StopSignal {
    running: Arc<AtomicBool>,
}

impl StopSignal {
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        !self.running.load(Ordering::SeqCst)
    }
}

pub struct StreamController {
    interval: Duration,
    running: Arc<AtomicBool>,
    counters: Arc<Counters>,
    join: Option<JoinHandle<()>>,
}

impl StreamController {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            running: Arc::new(AtomicBool::new(false)),
            counters: Arc::new(Counters::default()),
            join: None,
        }
    }

    /// Spawns the loop thread running `cycle` until stopped.
    ///
    /// Cycle errors are logged and counted; the loop carries on with the next
    /// cycle.
    pub fn start<F>(&mut self, mut cycle: F) -> Result<()>
    where
        F: FnMut() -> Result<()> + Send + 'static,
    {
        if self.join.is_some() {
            return Err(anyhow!("stream loop already started"));
        }
        self.running.store(true, Ordering::SeqCst);

        let running = Arc::clone(&self.running);
        let counters = Arc::clone(&self.counters);
        let interval = self.interval;
        let handle = std::thread::Builder::new()
            .name("stream-loop".to_string())
            .spawn(move || {
                while running.load(Ordering::SeqCst) {
                    counters.cycles.fetch_add(1, Ordering::SeqCst);
                    if let Err(e) = cycle() {
                        counters.failed_cycles.fetch_add(1, Ordering::SeqCst);
                        log::error!("stream cycle failed: {:#}", e);
                    }
                    wait(&running, interval);
                }
                log::info!("stream loop stopped");
            });
        match handle {
            Ok(handle) => {
                self.join = Some(handle);
                Ok(())
            }
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                Err(e).context("spawn stream loop")
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Clears the run flag. Does not wait for the loop to exit.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn stop_signal(&self) -> StopSignal {
        StopSignal {
            running: Arc::clone(&self.running),
        }
    }

    pub fn stats(&self) -> StreamStats {
        StreamStats {
            cycles: self.counters.cycles.load(Ordering::SeqCst),
            failed_cycles: self.counters.failed_cycles.load(Ordering::SeqCst),
        }
    }

    /// Waits for the loop thread to observe a stop. The controller can be
    /// started again afterwards.
    pub fn join(&mut self) -> Result<StreamStats> {
        if let Some(join) = self.join.take() {
            join.join()
                .map_err(|_| anyhow!("stream loop thread panicked"))?;
        }
        Ok(self.stats())
    }
}

impl Drop for StreamController {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Source, detection and dedup engine wired for one camera.
pub struct FramePipeline<R: VehicleRegistry> {
    source: DirectorySource,
    processor: FrameProcessor,
    engine: Engine<R>,
}

impl<R: VehicleRegistry> FramePipeline<R> {
    pub fn new(source: DirectorySource, processor: FrameProcessor, engine: Engine<R>) -> Self {
        Self {
            source,
            processor,
            engine,
        }
    }

    /// Processes pending frames until the source is empty or `signal` is
    /// stopped. Returns the number of frames taken from the source.
    ///
    /// A failing frame does not hold back the rest of the backlog; the first
    /// failure is returned once the drain ends.
    pub fn drain(&mut self, signal: &StopSignal) -> Result<usize> {
        let mut taken = 0usize;
        let mut failed = 0usize;
        let mut first = None;
        while !signal.is_stopped() {
            let frame = match self.source.next_frame()? {
                Some(frame) => frame,
                None => break,
            };
            taken += 1;
            let outcome = self
                .processor
                .process(&frame)
                .and_then(|observations| self.engine.run_cycle(&frame, observations))
                .and_then(|report| report.into_result());
            if let Err(e) = outcome {
                failed += 1;
                log::warn!("frame {:?}: {}", frame.source, e);
                first.get_or_insert(e);
            }
        }
        if signal.is_stopped() {
            log::debug!("drain interrupted after {} frames", taken);
        }
        match first {
            Some(e) => Err(anyhow!("{} of {} frames failed (first: {})", failed, taken, e)),
            None => Ok(taken),
        }
    }
}

fn wait(running: &AtomicBool, interval: Duration) {
    let deadline = Instant::now() + interval;
    while running.load(Ordering::SeqCst) {
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        std::thread::sleep(WAIT_SLICE.min(deadline - now));
    }
}
