//! Aux capture thread: drains an external stereo capture source into
//! the [`crate::AuxRing`] and owns the device-loss/cooldown state
//! machine (§4.B, §7, §9 "exception-driven capture recovery").
//!
//! The actual Bluetooth handle is external (out of scope); this module
//! only needs an opaque factory that can hand back a fresh
//! [`CaptureSource`] when asked. Re-establishing after a device loss is
//! the external collaborator's job — the thread just asks again no
//! sooner than the configured cooldown.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::AuxRing;

/// Outcome of one non-blocking read from the external capture source.
///
/// Mirrors the source's exception-driven recovery (§9) as explicit
/// variants instead of propagating an error up the stack.
pub enum CaptureReadOutcome {
    /// One or more stereo int16 frames were read.
    Frames(Vec<(i16, i16)>),
    /// Nothing available right now; not an error.
    Empty,
    /// A recoverable read error occurred; counts toward the
    /// consecutive-error teardown threshold.
    Transient,
    /// The source reported outright device loss (e.g. a `(None, None)`
    /// read or a disconnect message); tears down immediately.
    DeviceLost,
}

/// Opaque handle to the external auxiliary capture source.
pub trait CaptureSource: Send {
    fn read_nonblocking(&mut self) -> CaptureReadOutcome;
}

#[derive(Debug, Clone, Copy)]
pub struct CaptureConfig {
    /// Non-blocking reads drained per thread iteration before sleeping.
    pub reads_per_iteration: usize,
    /// Sleep between drain cycles.
    pub poll_interval: Duration,
    /// Consecutive transient errors before tearing the handle down.
    pub max_consecutive_errors: u32,
    /// Minimum time between a teardown and the next re-establish attempt.
    pub cooldown: Duration,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            reads_per_iteration: 10,
            poll_interval: Duration::from_millis(5),
            max_consecutive_errors: 50,
            cooldown: Duration::from_secs(5),
        }
    }
}

/// Spawns the background capture thread. `factory` stands in for the
/// external Bluetooth collaborator: it is called whenever the capture
/// thread wants a handle (first run, and after a cooldown-respecting
/// teardown) and may return `None` if no handle is currently available.
///
/// The thread runs until `running` is cleared.
pub fn spawn_capture_thread(
    ring: Arc<AuxRing>,
    mut factory: impl FnMut() -> Option<Box<dyn CaptureSource>> + Send + 'static,
    config: CaptureConfig,
    running: Arc<AtomicBool>,
) -> JoinHandle<()> {
    thread::spawn(move || {
        let mut source: Option<Box<dyn CaptureSource>> = factory();
        let mut consecutive_errors: u32 = 0;
        let mut last_teardown: Option<Instant> = None;

        while running.load(Ordering::Acquire) {
            if source.is_none() {
                let cooldown_elapsed = last_teardown
                    .map(|t| t.elapsed() >= config.cooldown)
                    .unwrap_or(true);
                if cooldown_elapsed {
                    source = factory();
                    if source.is_some() {
                        log::info!("aux capture source re-established");
                    }
                }
            }

            if let Some(src) = source.as_mut() {
                'drain: for _ in 0..config.reads_per_iteration {
                    match src.read_nonblocking() {
                        CaptureReadOutcome::Frames(frames) => {
                            consecutive_errors = 0;
                            for (l, r) in frames {
                                ring.push_i16(l, r);
                            }
                        }
                        CaptureReadOutcome::Empty => break 'drain,
                        CaptureReadOutcome::Transient => {
                            consecutive_errors += 1;
                            if consecutive_errors >= config.max_consecutive_errors {
                                break 'drain;
                            }
                        }
                        CaptureReadOutcome::DeviceLost => {
                            consecutive_errors = config.max_consecutive_errors;
                            break 'drain;
                        }
                    }
                }

                if consecutive_errors >= config.max_consecutive_errors {
                    log::warn!(
                        "aux capture torn down after {consecutive_errors} consecutive errors; \
                         delivering silence for at least {:?}",
                        config.cooldown
                    );
                    source = None;
                    consecutive_errors = 0;
                    last_teardown = Some(Instant::now());
                }
            }

            thread::sleep(config.poll_interval);
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct ScriptedSource {
        outcomes: std::collections::VecDeque<CaptureReadOutcome>,
    }

    impl CaptureSource for ScriptedSource {
        fn read_nonblocking(&mut self) -> CaptureReadOutcome {
            self.outcomes.pop_front().unwrap_or(CaptureReadOutcome::Empty)
        }
    }

    #[test]
    fn frames_are_pushed_into_the_ring() {
        let ring = Arc::new(AuxRing::new(64));
        let running = Arc::new(AtomicBool::new(true));

        let made = Arc::new(Mutex::new(false));
        let made_clone = Arc::clone(&made);
        let factory = move || {
            let mut made = made_clone.lock().unwrap();
            if *made {
                return None;
            }
            *made = true;
            let mut outcomes = std::collections::VecDeque::new();
            outcomes.push_back(CaptureReadOutcome::Frames(vec![(1000, -1000); 4]));
            for _ in 0..20 {
                outcomes.push_back(CaptureReadOutcome::Empty);
            }
            Some(Box::new(ScriptedSource { outcomes }) as Box<dyn CaptureSource>)
        };

        let config = CaptureConfig {
            poll_interval: Duration::from_millis(1),
            ..Default::default()
        };
        let handle = spawn_capture_thread(Arc::clone(&ring), factory, config, Arc::clone(&running));

        thread::sleep(Duration::from_millis(30));
        running.store(false, Ordering::Release);
        handle.join().unwrap();

        assert!(ring.fill() >= 4);
    }

    #[test]
    fn device_lost_tears_down_and_respects_cooldown() {
        let ring = Arc::new(AuxRing::new(64));
        let running = Arc::new(AtomicBool::new(true));
        let reconnect_attempts = Arc::new(Mutex::new(0u32));
        let attempts_clone = Arc::clone(&reconnect_attempts);

        let factory = move || {
            let mut n = attempts_clone.lock().unwrap();
            *n += 1;
            let mut outcomes = std::collections::VecDeque::new();
            outcomes.push_back(CaptureReadOutcome::DeviceLost);
            Some(Box::new(ScriptedSource { outcomes }) as Box<dyn CaptureSource>)
        };

        let config = CaptureConfig {
            poll_interval: Duration::from_millis(1),
            cooldown: Duration::from_secs(60),
            max_consecutive_errors: 1,
            ..Default::default()
        };
        let handle = spawn_capture_thread(ring, factory, config, Arc::clone(&running));

        thread::sleep(Duration::from_millis(30));
        running.store(false, Ordering::Release);
        handle.join().unwrap();

        // First call builds the handle; the long cooldown should prevent
        // any further reconnect attempts after the device-loss teardown.
        assert_eq!(*reconnect_attempts.lock().unwrap(), 1);
    }
}
