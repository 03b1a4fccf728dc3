//! Software watchdog for hosts without a hardware timer.
//!
//! A monitor thread arms after a grace period, then checks the last kick every
//! quarter timeout. If the control loop has not kicked within the timeout the
//! expiry action runs once and the monitor exits. Kicks are a single
//! `parking_lot` lock + `Instant::now()`, cheap enough for every tick.

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::{Duration, Instant},
};
use parking_lot::Mutex;
use log::{debug, error, info};

use crate::hardware::Watchdog;
use crate::utils::config::WatchdogConfig;

/// Exit code used by the flight binary when the watchdog fires.
pub const WATCHDOG_EXIT_CODE: i32 = 86;

const MAX_POLL: Duration = Duration::from_millis(50);

pub struct SoftwareWatchdog {
    last_kick: Arc<Mutex<Instant>>,
    stop: Arc<AtomicBool>,
    fired: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

/// Handle given to the control loop; cloning shares the same timer.
#[derive(Clone)]
pub struct WatchdogKicker {
    last_kick: Arc<Mutex<Instant>>,
}

impl Watchdog for WatchdogKicker {
    fn kick(&mut self) {
        *self.last_kick.lock() = Instant::now();
    }
}

/// Sleeps `total` in short steps; returns false if asked to stop meanwhile.
fn sleep_unless_stopped(stop: &AtomicBool, total: Duration) -> bool {
    let deadline = Instant::now() + total;
    loop {
        if stop.load(Ordering::SeqCst) {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        thread::sleep((deadline - now).min(MAX_POLL));
    }
}

impl SoftwareWatchdog {
    pub fn spawn(cfg: &WatchdogConfig, on_expire: Box<dyn Fn() + Send>) -> Self {
        let timeout = cfg.timeout();
        let grace = cfg.grace();
        let check_every = (timeout / 4).max(Duration::from_millis(1));

        let last_kick = Arc::new(Mutex::new(Instant::now()));
        let stop = Arc::new(AtomicBool::new(false));
        let fired = Arc::new(AtomicBool::new(false));

        let (kick_t, stop_t, fired_t) = (last_kick.clone(), stop.clone(), fired.clone());
        let handle = thread::Builder::new()
            .name("watchdog".into())
            .spawn(move || {
                if !sleep_unless_stopped(&stop_t, grace) {
                    return;
                }
                *kick_t.lock() = Instant::now();
                info!("[Watchdog] armed, timeout {:?}", timeout);

                while sleep_unless_stopped(&stop_t, check_every) {
                    let since = kick_t.lock().elapsed();
                    if since > timeout {
                        error!("[Watchdog] no kick for {:?} (timeout {:?}), forcing restart", since, timeout);
                        fired_t.store(true, Ordering::SeqCst);
                        on_expire();
                        return;
                    }
                }
                debug!("[Watchdog] monitor stopped");
            })
            .ok();

        if handle.is_none() {
            error!("[Watchdog] failed to spawn monitor thread");
        }

        Self { last_kick, stop, fired, handle }
    }

    pub fn kicker(&self) -> WatchdogKicker {
        WatchdogKicker { last_kick: self.last_kick.clone() }
    }

    pub fn has_fired(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }

    /// Stops the monitor without firing.
    pub fn shutdown(mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            handle.join().ok();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    fn cfg(timeout_ms: u64) -> WatchdogConfig {
        WatchdogConfig { timeout_ms, grace_ms: 0 }
    }

    #[test]
    fn test_fires_once_without_kicks() {
        let count = Arc::new(AtomicU32::new(0));
        let c = count.clone();
        let wd = SoftwareWatchdog::spawn(&cfg(40), Box::new(move || {
            c.fetch_add(1, Ordering::SeqCst);
        }));
        thread::sleep(Duration::from_millis(300));
        assert!(wd.has_fired());
        assert_eq!(count.load(Ordering::SeqCst), 1);
        wd.shutdown();
    }

    #[test]
    fn test_kicked_watchdog_stays_quiet() {
        let wd = SoftwareWatchdog::spawn(&cfg(200), Box::new(|| {}));
        let mut kicker = wd.kicker();
        for _ in 0..30 {
            kicker.kick();
            thread::sleep(Duration::from_millis(10));
        }
        assert!(!wd.has_fired());
        wd.shutdown();
    }
}
