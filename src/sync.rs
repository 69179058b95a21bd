//! Background flush of the framebuffer to the panel
//!
//! A dedicated thread wakes every refresh period, or earlier when notified,
//! snapshots the visible buffer under the frame lock and sends the dirty pages
//! outside of it, so drawing never waits for the bus.
//!
//! Suspension is a counter: every suspend increments it, every resume
//! decrements it (never below zero), and no flush starts while it is non-zero.
//! The counter is checked while holding the frame lock, so edits made between
//! suspend and resume always reach the panel in the same flush.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use display_interface::DisplayError;
use embedded_hal::{delay::DelayNs, digital::OutputPin, i2c::I2c};

use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::framebuffer::{FrameBuffer, Snapshot};
use crate::ssd1306::interface::DisplayInterface;

/// Framebuffer shared between drawing calls and the flush thread, `None` once freed
pub(crate) type SharedFrame = Arc<Mutex<Option<FrameBuffer>>>;

/// Bus shared between the controller (reset, teardown) and the flush thread
pub(crate) type SharedBus<I2C, RST, DELAY> = Arc<Mutex<DisplayInterface<I2C, RST, DELAY>>>;

/// Lock ignoring poisoning; the guarded data stays consistent across a panic
/// in a drawing call because every mutation is a plain bit update.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Counters updated by the flush thread
#[derive(Debug, Default)]
pub struct FlushStats {
    frames: AtomicU32,
    pages_sent: AtomicU32,
    errors: AtomicU32,
    buffer_swaps: AtomicU32,
    last_flush_us: AtomicU32,
}

/// Point in time copy of [`FlushStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushStatsSnapshot {
    /// Flushes that sent anything
    pub frames: u32,
    pub pages_sent: u32,
    /// Flushes aborted by a bus error
    pub errors: u32,
    pub buffer_swaps: u32,
    /// Duration of the last successful flush in microseconds
    pub last_flush_us: u32,
}

impl FlushStats {
    pub fn snapshot(&self) -> FlushStatsSnapshot {
        FlushStatsSnapshot {
            frames: self.frames.load(Ordering::Relaxed),
            pages_sent: self.pages_sent.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            buffer_swaps: self.buffer_swaps.load(Ordering::Relaxed),
            last_flush_us: self.last_flush_us.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn count_swap(&self) {
        self.buffer_swaps.fetch_add(1, Ordering::Relaxed);
    }
}

/// State shared with the flush thread
struct Engine<I2C, RST, DELAY> {
    frame: SharedFrame,
    bus: SharedBus<I2C, RST, DELAY>,
    column_base: u8,
    refresh_period: Duration,
    suspend: AtomicU32,
    running: AtomicBool,
    /// Set by `notify`, cleared by the thread when it wakes
    wake: Mutex<bool>,
    wake_cv: Condvar,
    stats: FlushStats,
}

impl<I2C, RST, DELAY> Engine<I2C, RST, DELAY> {
    fn new(
        config: &EngineConfig,
        frame: SharedFrame,
        bus: SharedBus<I2C, RST, DELAY>,
        column_base: u8,
    ) -> Self {
        Engine {
            frame,
            bus,
            column_base,
            refresh_period: config.refresh_period,
            suspend: AtomicU32::new(0),
            running: AtomicBool::new(true),
            wake: Mutex::new(false),
            wake_cv: Condvar::new(),
            stats: FlushStats::default(),
        }
    }

    fn notify(&self) {
        *lock(&self.wake) = true;
        self.wake_cv.notify_one();
    }
}

impl<I2C, RST, DELAY> Engine<I2C, RST, DELAY>
where
    I2C: I2c,
    RST: OutputPin,
    DELAY: DelayNs,
{
    fn run(&self) {
        while self.running.load(Ordering::Acquire) {
            // errors are counted and logged, the pages stay queued
            let _ = self.flush_once();

            let woken = lock(&self.wake);
            let (mut woken, _) = self
                .wake_cv
                .wait_timeout_while(woken, self.refresh_period, |w| {
                    !*w && self.running.load(Ordering::Acquire)
                })
                .unwrap_or_else(PoisonError::into_inner);
            *woken = false;
        }
    }

    /// Send whatever is pending; `Ok(false)` when suspended or nothing is dirty
    ///
    /// Holds the bus for the whole flush, so a caller returning from here knows
    /// any transfer in progress has finished. Lock order is bus, then frame.
    fn flush_once(&self) -> Result<bool> {
        let mut bus = lock(&self.bus);
        let snapshot = {
            let mut frame = lock(&self.frame);
            if self.suspend.load(Ordering::Acquire) > 0 {
                return Ok(false);
            }
            match frame.as_mut().and_then(FrameBuffer::take_snapshot) {
                Some(snapshot) => snapshot,
                None => return Ok(false),
            }
        };

        let start = Instant::now();
        let result = transmit(&mut bus, &snapshot, self.column_base);
        match result {
            Ok(pages) => {
                let elapsed = start.elapsed().as_micros().min(u32::MAX as u128) as u32;
                self.stats.frames.fetch_add(1, Ordering::Relaxed);
                self.stats.pages_sent.fetch_add(pages, Ordering::Relaxed);
                self.stats.last_flush_us.store(elapsed, Ordering::Relaxed);
                Ok(true)
            }
            Err(failed) => {
                self.stats.errors.fetch_add(1, Ordering::Relaxed);
                log::warn!(
                    "Flush failed with {:?}, requeueing pages {:08b}",
                    failed.error,
                    failed.dirty
                );
                if let Some(fb) = lock(&self.frame).as_mut() {
                    fb.requeue(failed.dirty, failed.start_line);
                }
                Err(failed.error.into())
            }
        }
    }
}

/// What a failed transmission left undelivered
struct Undelivered {
    dirty: u8,
    start_line: Option<u8>,
    error: DisplayError,
}

/// Send the start line and dirty pages of `snapshot`, returning the page count
fn transmit<I2C, RST, DELAY>(
    bus: &mut DisplayInterface<I2C, RST, DELAY>,
    snapshot: &Snapshot,
    column_base: u8,
) -> core::result::Result<u32, Undelivered>
where
    I2C: I2c,
    RST: OutputPin,
    DELAY: DelayNs,
{
    if let Some(line) = snapshot.start_line {
        bus.set_start_line(line).map_err(|error| Undelivered {
            dirty: snapshot.dirty,
            start_line: Some(line),
            error,
        })?;
    }

    let width = snapshot.width();
    let mut bytes = Vec::with_capacity(width as usize);
    let mut sent = 0;
    for page in 0..8u8 {
        if snapshot.dirty & (1 << page) == 0 {
            continue;
        }
        snapshot.page(page, &mut bytes);
        bus.set_page_window(page, column_base, width)
            .and_then(|_| bus.data(&bytes))
            .map_err(|error| Undelivered {
                // this page and every later one
                dirty: snapshot.dirty & !((1u8 << page) - 1),
                start_line: None,
                error,
            })?;
        sent += 1;
    }
    Ok(sent)
}

/// Handle of the background flush thread
pub struct SyncTask<I2C, RST, DELAY> {
    engine: Arc<Engine<I2C, RST, DELAY>>,
    handle: Option<JoinHandle<()>>,
}

impl<I2C, RST, DELAY> SyncTask<I2C, RST, DELAY>
where
    I2C: I2c + Send + 'static,
    RST: OutputPin + Send + 'static,
    DELAY: DelayNs + Send + 'static,
{
    /// Start flushing `frame` through `bus`
    pub(crate) fn spawn(
        config: &EngineConfig,
        frame: SharedFrame,
        bus: SharedBus<I2C, RST, DELAY>,
        column_base: u8,
    ) -> Result<Self> {
        let engine = Arc::new(Engine::new(config, frame, bus, column_base));

        let worker = Arc::clone(&engine);
        let handle = thread::Builder::new()
            .name(config.task_name.clone())
            .stack_size(config.task_stack_size)
            .spawn(move || {
                log::debug!("Sync task started");
                worker.run();
                log::debug!("Sync task stopped");
            })
            .map_err(|e| Error::Configuration(format!("cannot start sync task: {}", e)))?;

        log::info!(
            "Sync task '{}' running every {:?}",
            config.task_name,
            config.refresh_period
        );
        Ok(SyncTask {
            engine,
            handle: Some(handle),
        })
    }
}

impl<I2C, RST, DELAY> SyncTask<I2C, RST, DELAY>
where
    I2C: I2c,
    RST: OutputPin,
    DELAY: DelayNs,
{
    /// Hold back flushes until the matching [`SyncTask::resume`]
    pub fn suspend(&self) {
        self.engine.suspend.fetch_add(1, Ordering::AcqRel);
    }

    /// Undo one [`SyncTask::suspend`]; extra calls are ignored
    pub fn resume(&self) {
        let previous = self
            .engine
            .suspend
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
        match previous {
            Ok(1) => self.engine.notify(),
            Ok(_) => {}
            Err(_) => log::warn!("Resume without matching suspend"),
        }
    }

    pub fn suspend_count(&self) -> u32 {
        self.engine.suspend.load(Ordering::Acquire)
    }

    /// Wake the thread ahead of the next period
    pub fn notify(&self) {
        self.engine.notify();
    }

    /// Flush on the calling thread, subject to the same suspension rules
    pub fn flush_now(&self) -> Result<bool> {
        self.engine.flush_once()
    }

    pub fn stats(&self) -> FlushStatsSnapshot {
        self.engine.stats.snapshot()
    }

    pub(crate) fn count_swap(&self) {
        self.engine.stats.count_swap();
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    /// Stop the thread and wait for it to exit; an in-flight transfer completes
    pub fn stop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        self.engine.running.store(false, Ordering::Release);
        self.engine.notify();
        if handle.join().is_err() {
            log::error!("Sync task panicked");
        }
    }
}

impl<I2C, RST, DELAY> Drop for SyncTask<I2C, RST, DELAY> {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.engine.running.store(false, Ordering::Release);
            self.engine.notify();
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Resolution;
    use crate::sim::{PanelSim, StdDelay};
    use crate::ssd1306::interface::NoResetPin;

    type Task = SyncTask<PanelSim, NoResetPin, StdDelay>;

    fn shared(width: u16, height: u16) -> (PanelSim, SharedFrame, SharedBus<PanelSim, NoResetPin, StdDelay>) {
        let resolution = Resolution::new(width, height).unwrap();
        let sim = PanelSim::new();
        let bus = DisplayInterface::new(sim.clone(), 0x3C, None, StdDelay);
        let frame = Arc::new(Mutex::new(Some(
            FrameBuffer::new(&resolution, None, false).unwrap(),
        )));
        (sim, frame, Arc::new(Mutex::new(bus)))
    }

    /// Task without a thread, flushed explicitly with `flush_now`
    fn manual(width: u16, height: u16) -> (PanelSim, SharedFrame, Task) {
        let (sim, frame, bus) = shared(width, height);
        let base = Resolution::new(width, height).unwrap().column_base();
        let engine = Engine::new(&EngineConfig::default(), Arc::clone(&frame), bus, base);
        let task = SyncTask {
            engine: Arc::new(engine),
            handle: None,
        };
        (sim, frame, task)
    }

    #[test]
    fn resume_saturates_at_zero() {
        let (_sim, _frame, task) = manual(16, 8);
        task.resume();
        assert_eq!(task.suspend_count(), 0);
        task.suspend();
        task.suspend();
        task.resume();
        assert_eq!(task.suspend_count(), 1);
        task.resume();
        task.resume();
        assert_eq!(task.suspend_count(), 0);
    }

    #[test]
    fn suspended_task_does_not_flush() {
        let (sim, frame, task) = manual(16, 8);
        assert!(task.flush_now().unwrap());
        task.suspend();
        lock(&frame).as_mut().unwrap().set_pixel(0, 0, true);
        assert!(!task.flush_now().unwrap());
        assert!(!sim.pixel(0, 0));
        task.resume();
        assert!(task.flush_now().unwrap());
        assert!(sim.pixel(0, 0));
        assert!(!task.flush_now().unwrap());
    }

    #[test]
    fn only_dirty_pages_are_sent() {
        let (sim, frame, task) = manual(128, 64);
        task.flush_now().unwrap();
        assert_eq!(task.stats().pages_sent, 8);
        lock(&frame).as_mut().unwrap().set_pixel(5, 20, true);
        task.flush_now().unwrap();
        let stats = task.stats();
        assert_eq!(stats.pages_sent, 9);
        assert_eq!(stats.frames, 2);
        assert!(sim.pixel(5, 20));
    }

    #[test]
    fn failed_flush_requeues_pages() {
        let (sim, frame, task) = manual(128, 32);
        task.flush_now().unwrap();
        lock(&frame).as_mut().unwrap().fill_row(9, 0, 127, true);
        sim.fail_next_writes(1);
        assert!(matches!(task.flush_now(), Err(Error::Bus(DisplayError::BusWriteError))));
        assert_eq!(lock(&frame).as_ref().unwrap().dirty_pages(), 0b0010);
        assert!(!sim.pixel(64, 9));

        assert!(task.flush_now().unwrap());
        assert!(sim.pixel(64, 9));
        assert_eq!(task.stats().errors, 1);
    }

    #[test]
    fn start_line_goes_before_pixel_data() {
        let (sim, frame, task) = manual(128, 64);
        task.flush_now().unwrap();
        lock(&frame).as_mut().unwrap().set_screen_row(12);
        task.flush_now().unwrap();
        assert_eq!(sim.start_line(), 12);
        assert_eq!(task.stats().pages_sent, 8);
    }

    #[test]
    fn thread_flushes_after_resume_and_stops() {
        let (sim, frame, bus) = shared(16, 8);
        let config = EngineConfig::default().with_refresh_period(Duration::from_millis(5));
        let mut task = SyncTask::spawn(&config, Arc::clone(&frame), bus, 0).unwrap();
        assert!(task.is_running());

        task.suspend();
        lock(&frame).as_mut().unwrap().set_pixel(3, 3, true);
        task.resume();

        let deadline = Instant::now() + Duration::from_secs(5);
        while !sim.pixel(3, 3) && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(2));
        }
        assert!(sim.pixel(3, 3));

        task.stop();
        task.stop();
        assert!(!task.is_running());
    }
}
