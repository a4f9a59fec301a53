use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{error, info};

use super::{DueTimer, DueTimerSource};

const STOP_CHECK_INTERVAL: Duration = Duration::from_millis(100);

/// Background thread that polls a [`DueTimerSource`] and dispatches firings.
pub struct TimerDriver {
    stop: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl TimerDriver {
    pub fn start<S, F>(source: S, poll_interval: Duration, dispatch: F) -> Self
    where
        S: DueTimerSource + 'static,
        F: Fn(DueTimer) + Send + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = stop.clone();
        let handle = thread::spawn(move || {
            info!(
                "timer driver started (poll interval {}s)",
                poll_interval.as_secs_f64()
            );
            while !thread_stop.load(Ordering::Relaxed) {
                match source.take_due(Utc::now()) {
                    Ok(due) => {
                        if !due.is_empty() {
                            info!("timer driver found {} due timer(s)", due.len());
                        }
                        for timer in due {
                            dispatch(timer);
                        }
                    }
                    Err(err) => error!("timer driver poll failed: {}", err),
                }
                let deadline = Instant::now() + poll_interval;
                while Instant::now() < deadline && !thread_stop.load(Ordering::Relaxed) {
                    thread::sleep(STOP_CHECK_INTERVAL.min(poll_interval));
                }
            }
            info!("timer driver stopped");
        });
        Self {
            stop,
            handle: Some(handle),
        }
    }

    pub fn stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }

    pub fn stop_and_join(&mut self) {
        self.stop();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for TimerDriver {
    fn drop(&mut self) {
        self.stop_and_join();
    }
}
