use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{AcquireError, OwnedSemaphorePermit, Semaphore};

pub const MAX_SCAN_CONCURRENCY: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanConcurrencySnapshot {
    pub limit: usize,
    pub in_flight: usize,
    pub waiters: usize,
}

/// File processing is a mix of IO and parsing; keep the fan-out small
pub fn default_scan_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .clamp(2, 8)
}

/// Parse a positive count, falling back to `default_value` and clamping to `1..=max`
pub(crate) fn parse_count(raw: Option<&str>, default_value: usize, max: usize) -> usize {
    raw.map(str::trim)
        .filter(|v| !v.is_empty())
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(default_value)
        .clamp(1, max)
}

/// Bounds the number of files read and parsed at once during a scan
#[derive(Debug, Clone)]
pub(crate) struct ScanLimiter {
    semaphore: Arc<Semaphore>,
    limit: usize,
    waiters: Arc<AtomicUsize>,
    in_flight: Arc<AtomicUsize>,
}

pub(crate) struct ScanPermit {
    _permit: OwnedSemaphorePermit,
    in_flight: Arc<AtomicUsize>,
}

impl Drop for ScanPermit {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::Relaxed);
    }
}

struct WaiterGuard(Arc<AtomicUsize>);

impl WaiterGuard {
    fn new(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::Relaxed);
        Self(counter.clone())
    }
}

impl Drop for WaiterGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }
}

impl ScanLimiter {
    pub(crate) fn new(limit: usize) -> Self {
        let limit = limit.clamp(1, MAX_SCAN_CONCURRENCY);
        Self {
            semaphore: Arc::new(Semaphore::new(limit)),
            limit,
            waiters: Arc::new(AtomicUsize::new(0)),
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub(crate) async fn acquire(&self) -> Result<ScanPermit, AcquireError> {
        let waiter = WaiterGuard::new(&self.waiters);
        let permit = self.semaphore.clone().acquire_owned().await?;
        drop(waiter);
        self.in_flight.fetch_add(1, Ordering::Relaxed);
        Ok(ScanPermit {
            _permit: permit,
            in_flight: self.in_flight.clone(),
        })
    }

    pub(crate) fn snapshot(&self) -> ScanConcurrencySnapshot {
        ScanConcurrencySnapshot {
            limit: self.limit,
            in_flight: self.in_flight.load(Ordering::Relaxed),
            waiters: self.waiters.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_count_defaults_and_clamps() {
        let default_value = default_scan_concurrency();
        let max = MAX_SCAN_CONCURRENCY;
        assert_eq!(parse_count(None, default_value, max), default_value);
        assert_eq!(parse_count(Some(""), default_value, max), default_value);
        assert_eq!(parse_count(Some("   "), default_value, max), default_value);
        assert_eq!(parse_count(Some("2"), default_value, max), 2);
        assert_eq!(parse_count(Some("0"), default_value, max), 1);
        assert_eq!(parse_count(Some("999"), default_value, max), MAX_SCAN_CONCURRENCY);
        assert_eq!(parse_count(Some("abc"), default_value, max), default_value);
        assert_eq!(parse_count(Some(" 5 "), default_value, max), 5);
    }

    #[tokio::test]
    async fn permits_are_counted_while_held() {
        let limiter = ScanLimiter::new(2);
        let first = limiter.acquire().await.unwrap();
        let _second = limiter.acquire().await.unwrap();
        assert_eq!(limiter.snapshot().in_flight, 2);
        drop(first);
        assert_eq!(
            limiter.snapshot(),
            ScanConcurrencySnapshot {
                limit: 2,
                in_flight: 1,
                waiters: 0,
            }
        );
    }
}
