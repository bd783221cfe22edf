//! Deadline and memory watchdogs. They run on their own threads, never touch
//! puzzle state, and only ever raise the shared cancellation flag.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use log::debug;
use parking_lot::{Condvar, Mutex};

/// How often resident memory is sampled.
const RSS_PERIOD: Duration = Duration::from_millis(500);

/// Cancellation trips once resident memory exceeds the limit by this factor.
const RSS_TOLERANCE: f64 = 1.05;

/// Shared cancellation flag, polled by the search once per popped node.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

#[derive(Default)]
struct Shutdown {
    stop: Mutex<bool>,
    wake: Condvar,
}

impl Shutdown {
    /// Sleeps up to `timeout`; returns true once shutdown was requested.
    fn wait(&self, timeout: Duration) -> bool {
        let mut stop = self.stop.lock();
        if !*stop {
            self.wake.wait_for(&mut stop, timeout);
        }
        *stop
    }
}

/// Owns the watchdog threads; dropping it stops and joins them.
pub struct Watchdog {
    shutdown: Arc<Shutdown>,
    threads: Vec<JoinHandle<()>>,
}

impl Watchdog {
    pub fn start(token: &CancelToken, time_limit: Option<Duration>, memory_limit: Option<usize>) -> Self {
        let shutdown = Arc::new(Shutdown::default());
        let mut threads = Vec::new();

        if let Some(limit) = time_limit {
            let (token, shutdown) = (token.clone(), Arc::clone(&shutdown));
            threads.push(std::thread::spawn(move || {
                let deadline = Instant::now() + limit;
                loop {
                    let now = Instant::now();
                    if now >= deadline {
                        debug!("time limit of {:?} reached", limit);
                        token.cancel();
                        return;
                    }
                    if shutdown.wait(deadline - now) {
                        return;
                    }
                }
            }));
        }

        if let Some(limit) = memory_limit {
            let (token, shutdown) = (token.clone(), Arc::clone(&shutdown));
            threads.push(std::thread::spawn(move || {
                let ceiling = (limit as f64 * RSS_TOLERANCE) as usize;
                loop {
                    if let Some(rss) = resident_bytes() {
                        if rss > ceiling {
                            debug!("resident memory {} bytes over the limit of {}", rss, limit);
                            token.cancel();
                            return;
                        }
                    }
                    if shutdown.wait(RSS_PERIOD) {
                        return;
                    }
                }
            }));
        }

        Watchdog { shutdown, threads }
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        *self.shutdown.stop.lock() = true;
        self.shutdown.wake.notify_all();
        for handle in self.threads.drain(..) {
            let _ = handle.join();
        }
    }
}

/// Current resident set size, where the platform exposes it.
#[cfg(target_os = "linux")]
pub fn resident_bytes() -> Option<usize> {
    let statm = std::fs::read_to_string("/proc/self/statm").ok()?;
    let pages: usize = statm.split_whitespace().nth(1)?.parse().ok()?;
    Some(pages * 4096)
}

#[cfg(not(target_os = "linux"))]
pub fn resident_bytes() -> Option<usize> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deadline_trips_the_token() {
        let token = CancelToken::new();
        let _dog = Watchdog::start(&token, Some(Duration::from_millis(20)), None);
        let start = Instant::now();
        while !token.is_cancelled() && start.elapsed() < Duration::from_secs(5) {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_drop_stops_threads_without_cancelling() {
        let token = CancelToken::new();
        let start = Instant::now();
        drop(Watchdog::start(&token, Some(Duration::from_secs(3600)), Some(usize::MAX / 2)));
        assert!(start.elapsed() < Duration::from_secs(5));
        assert!(!token.is_cancelled());
    }

    #[test]
    fn test_clones_share_the_flag() {
        let token = CancelToken::new();
        let other = token.clone();
        other.cancel();
        assert!(token.is_cancelled());
    }
}
