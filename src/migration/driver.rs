use crate::migration::controller::RunController;
use crate::migration::error::MigrationError;
use crate::migration::progress::RunProgress;
use crate::migration::run::{Run, RunStatus, StepRecord};
use crate::shared::time::now_secs;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DriverOptions {
    /// Multiplies each step's estimated duration.
    pub time_scale: f64,
    /// Consecutive failed ticks tolerated before the driver stops.
    pub max_consecutive_failures: u32,
}

impl Default for DriverOptions {
    fn default() -> Self {
        Self {
            time_scale: 1.0,
            max_consecutive_failures: 5,
        }
    }
}

struct Shared {
    controller: Mutex<RunController>,
    signal: Condvar,
    shutdown: AtomicBool,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, RunController> {
        self.controller
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

pub struct RunDriver;

impl RunDriver {
    /// Moves `controller` onto its own ticker thread. The thread exits once the
    /// run is terminal, on `shutdown`, or after too many failed ticks.
    pub fn spawn(controller: RunController, options: DriverOptions) -> RunHandle {
        let shared = Arc::new(Shared {
            controller: Mutex::new(controller),
            signal: Condvar::new(),
            shutdown: AtomicBool::new(false),
        });
        let worker_shared = Arc::clone(&shared);
        let worker = thread::spawn(move || drive(&worker_shared, options));
        RunHandle {
            shared,
            worker: Some(worker),
        }
    }
}

fn drive(shared: &Shared, options: DriverOptions) -> Result<Run, MigrationError> {
    let max_failures = options.max_consecutive_failures.max(1);
    let mut failures = 0u32;
    let mut next_tick_at: Option<Instant> = None;
    let mut guard = shared.lock();
    loop {
        if shared.shutdown.load(Ordering::SeqCst) {
            return Ok(guard.run().clone());
        }
        match guard.run().status {
            RunStatus::Running => {
                let interval = guard
                    .tick_interval(options.time_scale)
                    .unwrap_or(Duration::ZERO);
                let deadline = *next_tick_at.get_or_insert_with(|| Instant::now() + interval);
                let now = Instant::now();
                if now < deadline {
                    // Releases the lock so pause/resume/cancel can land mid-wait.
                    guard = shared
                        .signal
                        .wait_timeout(guard, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0;
                    continue;
                }
                next_tick_at = None;
                match guard.tick(now_secs()) {
                    Ok(_) => failures = 0,
                    Err(err) if err.is_retryable() => {
                        failures += 1;
                        if failures >= max_failures {
                            return Err(err);
                        }
                    }
                    Err(err) => return Err(err),
                }
            }
            RunStatus::Paused => {
                next_tick_at = None;
                guard = shared
                    .signal
                    .wait(guard)
                    .unwrap_or_else(PoisonError::into_inner);
            }
            RunStatus::Created
            | RunStatus::Completed
            | RunStatus::Failed
            | RunStatus::Cancelled => return Ok(guard.run().clone()),
        }
    }
}

/// Control surface for a driven run. All calls go through the same lock as
/// the ticker, so they are serialized with step progress.
pub struct RunHandle {
    shared: Arc<Shared>,
    worker: Option<JoinHandle<Result<Run, MigrationError>>>,
}

impl RunHandle {
    pub fn pause(&self) -> Result<(), MigrationError> {
        self.control(|controller| controller.pause(now_secs()))
    }

    pub fn resume(&self) -> Result<(), MigrationError> {
        self.control(|controller| controller.resume(now_secs()))
    }

    pub fn cancel(&self) -> Result<(), MigrationError> {
        self.control(|controller| controller.cancel(now_secs()))
    }

    pub fn snapshot(&self) -> (Run, Vec<StepRecord>) {
        let controller = self.shared.lock();
        (controller.run().clone(), controller.steps().to_vec())
    }

    pub fn progress(&self) -> RunProgress {
        self.shared.lock().progress()
    }

    pub fn is_finished(&self) -> bool {
        self.worker
            .as_ref()
            .map(JoinHandle::is_finished)
            .unwrap_or(true)
    }

    /// Stops the ticker without changing the run's status.
    pub fn shutdown(&self) {
        {
            // Taken so the flag cannot slip between the driver's check and its wait.
            let _controller = self.shared.lock();
            self.shared.shutdown.store(true, Ordering::SeqCst);
        }
        self.shared.signal.notify_all();
    }

    /// Blocks until the driver thread exits and returns the final run state.
    pub fn wait(mut self) -> Result<Run, MigrationError> {
        let Some(worker) = self.worker.take() else {
            return Ok(self.shared.lock().run().clone());
        };
        worker
            .join()
            .map_err(|_| MigrationError::Driver("run driver thread panicked".to_string()))?
    }

    fn control<F>(&self, op: F) -> Result<(), MigrationError>
    where
        F: FnOnce(&mut RunController) -> Result<(), MigrationError>,
    {
        let result = {
            let mut controller = self.shared.lock();
            op(&mut controller)
        };
        self.shared.signal.notify_all();
        result
    }
}
