//! Bounded polling primitive shared by the build drivers, the browser layer
//! and the readiness probe.
//!
//! A `Poller` describes the cadence (`interval`) and the bound (`timeout`).
//! Callers either hand it a probe closure via [`Poller::until`], or drive a
//! [`PollClock`] themselves when the probe needs to borrow local state such
//! as an open browser session.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("gave up after {waited:?}")]
pub struct PollTimeout {
    pub waited: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Poller {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Poller {
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }

    pub fn start(&self) -> PollClock {
        let started = Instant::now();
        PollClock {
            started,
            deadline: started + self.timeout,
            interval: self.interval,
        }
    }

    /// Run `probe` until it yields `Some`, sleeping `interval` between
    /// attempts. The probe always runs at least once, even with a zero
    /// timeout.
    pub async fn until<T, F, Fut>(&self, mut probe: F) -> Result<T, PollTimeout>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Option<T>>,
    {
        let mut clock = self.start();
        loop {
            if let Some(value) = probe().await {
                return Ok(value);
            }
            clock.tick().await?;
        }
    }
}

/// One in-flight poll: remembers when it started and when it must stop.
#[derive(Debug, Clone, Copy)]
pub struct PollClock {
    started: Instant,
    deadline: Instant,
    interval: Duration,
}

impl PollClock {
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    /// Sleep until the next attempt. Errors once the deadline has passed;
    /// the last sleep is shortened so the final attempt lands on the
    /// deadline instead of past it.
    pub async fn tick(&mut self) -> Result<(), PollTimeout> {
        let remaining = self.remaining();
        if remaining.is_zero() {
            return Err(PollTimeout {
                waited: self.elapsed(),
            });
        }
        tokio::time::sleep(self.interval.min(remaining)).await;
        Ok(())
    }
}
