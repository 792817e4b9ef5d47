use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Progress callback: (phase, current, total, message).
pub type ProgressCallback = dyn Fn(&str, u64, u64, &str) + Send + Sync;

const MIN_INTERVAL: Duration = Duration::from_millis(200);

/// Rate-limited progress reporter; the final step always goes through.
pub struct ThrottledProgress<'a> {
    inner: Option<&'a (dyn Fn(&str, u64, u64, &str) + Send + Sync + 'a)>,
    last_emit: Mutex<Option<Instant>>,
}

impl<'a> ThrottledProgress<'a> {
    pub fn new(inner: &'a (dyn Fn(&str, u64, u64, &str) + Send + Sync + 'a)) -> Self {
        Self {
            inner: Some(inner),
            last_emit: Mutex::new(None),
        }
    }

    /// Reporter that drops everything.
    pub fn silent() -> Self {
        Self {
            inner: None,
            last_emit: Mutex::new(None),
        }
    }

    pub fn report(&self, phase: &str, current: u64, total: u64, message: &str) {
        let Some(inner) = self.inner else {
            return;
        };
        let is_done = current + 1 >= total;
        if !is_done {
            let mut last = self.last_emit.lock().unwrap_or_else(|e| e.into_inner());
            if last.map_or(false, |t| t.elapsed() < MIN_INTERVAL) {
                return;
            }
            *last = Some(Instant::now());
        }
        inner(phase, current, total, message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    #[test]
    fn throttles_but_keeps_last() {
        let calls = AtomicU64::new(0);
        let cb = |_: &str, _: u64, _: u64, _: &str| {
            calls.fetch_add(1, Ordering::Relaxed);
        };
        let progress = ThrottledProgress::new(&cb);
        for i in 0..100 {
            progress.report("evaluate", i, 100, "");
        }
        // first emission plus the final one
        assert_eq!(calls.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn silent_reporter_is_noop() {
        ThrottledProgress::silent().report("x", 0, 1, "");
    }
}
