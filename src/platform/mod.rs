//! Platform abstraction layer
//!
//! Everything runs on one cooperative sequence. This module supplies the
//! suspension points that sequence needs:
//! - `Clock`: wall-clock reads and real-time sleeps
//! - `Spawner`: detached local tasks (background refreshes)
//! - `Deadline` / `with_deadline`: bounded waits whose elapsed time carries
//!   across awaits
//! - `best_effort`: bounded, swallow-and-continue platform bridge calls
//!
//! Plus the platform collaborators the browser driver talks to.

use std::future::Future;
use std::pin::{Pin, pin};
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use futures::future::{Either, LocalBoxFuture, select};
use thiserror::Error;
use web_time::Instant;

#[cfg(not(target_arch = "wasm32"))]
pub mod native;
#[cfg(target_arch = "wasm32")]
pub mod web;

#[cfg(not(target_arch = "wasm32"))]
pub use native::SystemClock;

/// Platform bridge failure. Always logged and swallowed by callers.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PlatformError {
    #[error("platform bridge unavailable: {0}")]
    Unavailable(String),
    #[error("platform call timed out")]
    TimedOut,
}

#[async_trait(?Send)]
pub trait Clock {
    fn now(&self) -> Instant;
    async fn sleep(&self, duration: Duration);
}

pub trait Spawner {
    fn spawn_local(&self, task: LocalBoxFuture<'static, ()>);
}

/// Wall-clock budget started at a fixed instant.
///
/// Elapsed time is measured from `start`, so time spent suspended between
/// checks still counts against the budget.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    started: Instant,
    budget: Duration,
}

impl Deadline {
    pub fn start(clock: &dyn Clock, budget: Duration) -> Self {
        Self {
            started: clock.now(),
            budget,
        }
    }

    pub fn elapsed(&self, clock: &dyn Clock) -> Duration {
        clock.now().saturating_duration_since(self.started)
    }

    pub fn remaining(&self, clock: &dyn Clock) -> Duration {
        self.budget.saturating_sub(self.elapsed(clock))
    }

    pub fn expired(&self, clock: &dyn Clock) -> bool {
        self.elapsed(clock) >= self.budget
    }
}

/// Race `fut` against the rest of `deadline`. `None` means the budget ran out.
///
/// The future is polled first, so an already-complete result wins even when
/// nothing remains of the budget.
pub async fn with_deadline<F: Future>(
    clock: &dyn Clock,
    deadline: &Deadline,
    fut: F,
) -> Option<F::Output> {
    let remaining = deadline.remaining(clock);
    let fut = pin!(fut);
    let timer = clock.sleep(remaining);
    match select(fut, timer).await {
        Either::Left((value, _)) => Some(value),
        Either::Right(_) => None,
    }
}

/// Yield one scheduling step to the executor
pub fn yield_now() -> YieldNow {
    YieldNow { yielded: false }
}

pub struct YieldNow {
    yielded: bool,
}

impl Future for YieldNow {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if self.yielded {
            return Poll::Ready(());
        }
        self.yielded = true;
        cx.waker().wake_by_ref();
        Poll::Pending
    }
}

/// Repeat a platform bridge call every `poll` until `timeout` of wall-clock
/// time has passed. Failures are logged and swallowed; a call that outlives
/// the remaining budget is abandoned.
///
/// Returns the number of calls that reported success.
pub async fn best_effort<F, Fut>(
    clock: &dyn Clock,
    label: &str,
    timeout: Duration,
    poll: Duration,
    mut op: F,
) -> usize
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<(), PlatformError>>,
{
    let deadline = Deadline::start(clock, timeout);
    let mut successes = 0;
    while !deadline.expired(clock) {
        match with_deadline(clock, &deadline, op()).await {
            Some(Ok(())) => successes += 1,
            Some(Err(err)) => log::warn!("{label}: {err}"),
            None => {
                log::warn!("{label}: {}", PlatformError::TimedOut);
                break;
            }
        }
        let remaining = deadline.remaining(clock);
        if remaining.is_zero() {
            break;
        }
        clock.sleep(poll.min(remaining)).await;
    }
    successes
}

/// Single bounded call; the outcome is only logged
pub async fn fire_and_forget<Fut>(clock: &dyn Clock, label: &str, timeout: Duration, fut: Fut)
where
    Fut: Future<Output = Result<(), PlatformError>>,
{
    let deadline = Deadline::start(clock, timeout);
    match with_deadline(clock, &deadline, fut).await {
        Some(Ok(())) => log::debug!("{label}: done"),
        Some(Err(err)) => log::warn!("{label}: {err}"),
        None => log::warn!("{label}: {}", PlatformError::TimedOut),
    }
}

/// Browser-engine settings reachable only through the platform UI thread.
///
/// These are optimizations; every method may fail and nobody cares beyond a
/// log line.
#[async_trait(?Send)]
pub trait WebViewPlatform {
    async fn set_user_agent(&self, user_agent: &str) -> Result<(), PlatformError>;
    /// Accept first- and third-party cookies, enable DOM storage and cache
    async fn enable_cookies_and_storage(&self) -> Result<(), PlatformError>;
    async fn flush_cookies(&self) -> Result<(), PlatformError>;
}

/// Platform without an engine bridge
#[derive(Debug, Default, Clone, Copy)]
pub struct NoBridge;

#[async_trait(?Send)]
impl WebViewPlatform for NoBridge {
    async fn set_user_agent(&self, _user_agent: &str) -> Result<(), PlatformError> {
        Err(PlatformError::Unavailable("no engine bridge".into()))
    }

    async fn enable_cookies_and_storage(&self) -> Result<(), PlatformError> {
        Err(PlatformError::Unavailable("no engine bridge".into()))
    }

    async fn flush_cookies(&self) -> Result<(), PlatformError> {
        Err(PlatformError::Unavailable("no engine bridge".into()))
    }
}

/// Application-level control
pub trait AppControl {
    /// Terminate the application (back pressed at the root)
    fn quit(&self);
}

/// Browser margins in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Margins {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

/// Screen size plus the safe rectangle inside it
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SafeArea {
    pub screen_width: f32,
    pub screen_height: f32,
    pub x_min: f32,
    pub y_min: f32,
    pub x_max: f32,
    pub y_max: f32,
}

impl SafeArea {
    pub fn full_screen(width: f32, height: f32) -> Self {
        Self {
            screen_width: width,
            screen_height: height,
            x_min: 0.0,
            y_min: 0.0,
            x_max: width,
            y_max: height,
        }
    }

    pub fn margins(&self) -> Margins {
        Margins {
            left: self.x_min.round() as i32,
            top: self.y_min.round() as i32,
            right: (self.screen_width - self.x_max).round() as i32,
            bottom: (self.screen_height - self.y_max).round() as i32,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ManualClock, drive};
    use futures::executor::LocalPool;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn test_deadline_counts_time_across_awaits() {
        let clock = Rc::new(ManualClock::new());
        let deadline = Deadline::start(&*clock, Duration::from_secs(3));
        clock.advance(Duration::from_secs(2));
        assert_eq!(deadline.remaining(&*clock), Duration::from_secs(1));
        assert!(!deadline.expired(&*clock));
        clock.advance(Duration::from_secs(2));
        assert!(deadline.expired(&*clock));
        assert_eq!(deadline.remaining(&*clock), Duration::ZERO);
    }

    #[test]
    fn test_with_deadline_ready_future_wins() {
        let clock = Rc::new(ManualClock::new());
        let mut pool = LocalPool::new();
        let c = clock.clone();
        let out = drive(&mut pool, &clock, async move {
            let deadline = Deadline::start(&*c, Duration::ZERO);
            with_deadline(&*c, &deadline, async { 7 }).await
        });
        assert_eq!(out, Some(7));
    }

    #[test]
    fn test_with_deadline_times_out_at_budget() {
        let clock = Rc::new(ManualClock::new());
        let mut pool = LocalPool::new();
        let c = clock.clone();
        let out = drive(&mut pool, &clock, async move {
            let deadline = Deadline::start(&*c, Duration::from_secs(3));
            with_deadline(&*c, &deadline, futures::future::pending::<()>()).await
        });
        assert_eq!(out, None);
        assert_eq!(clock.elapsed(), Duration::from_secs(3));
    }

    #[test]
    fn test_with_deadline_slow_future_loses() {
        let clock = Rc::new(ManualClock::new());
        let mut pool = LocalPool::new();
        let c = clock.clone();
        let out = drive(&mut pool, &clock, async move {
            let deadline = Deadline::start(&*c, Duration::from_secs(1));
            let slow = {
                let c = c.clone();
                async move {
                    c.sleep(Duration::from_secs(5)).await;
                    "late"
                }
            };
            with_deadline(&*c, &deadline, slow).await
        });
        assert_eq!(out, None);
        assert_eq!(clock.elapsed(), Duration::from_secs(1));
    }

    #[test]
    fn test_best_effort_polls_until_cap() {
        let clock = Rc::new(ManualClock::new());
        let mut pool = LocalPool::new();
        let c = clock.clone();
        let calls = Rc::new(Cell::new(0));
        let counter = calls.clone();
        let ok = drive(&mut pool, &clock, async move {
            best_effort(
                &*c,
                "cookies",
                Duration::from_millis(600),
                Duration::from_millis(100),
                || {
                    counter.set(counter.get() + 1);
                    async { Ok(()) }
                },
            )
            .await
        });
        assert_eq!(ok, 6);
        assert_eq!(calls.get(), 6);
        assert_eq!(clock.elapsed(), Duration::from_millis(600));
    }

    #[test]
    fn test_best_effort_swallows_failures() {
        let clock = Rc::new(ManualClock::new());
        let mut pool = LocalPool::new();
        let c = clock.clone();
        let ok = drive(&mut pool, &clock, async move {
            best_effort(
                &*c,
                "cookies",
                Duration::from_millis(300),
                Duration::from_millis(100),
                || async { Err(PlatformError::Unavailable("no activity".into())) },
            )
            .await
        });
        assert_eq!(ok, 0);
        assert_eq!(clock.elapsed(), Duration::from_millis(300));
    }

    #[test]
    fn test_best_effort_abandons_hung_call() {
        let clock = Rc::new(ManualClock::new());
        let mut pool = LocalPool::new();
        let c = clock.clone();
        let ok = drive(&mut pool, &clock, async move {
            best_effort(
                &*c,
                "cookies",
                Duration::from_millis(600),
                Duration::from_millis(100),
                || futures::future::pending::<Result<(), PlatformError>>(),
            )
            .await
        });
        assert_eq!(ok, 0);
        assert_eq!(clock.elapsed(), Duration::from_millis(600));
    }

    #[test]
    fn test_safe_area_margins() {
        let area = SafeArea {
            screen_width: 1080.0,
            screen_height: 2400.0,
            x_min: 0.0,
            y_min: 96.4,
            x_max: 1080.0,
            y_max: 2310.0,
        };
        assert_eq!(
            area.margins(),
            Margins {
                left: 0,
                top: 96,
                right: 0,
                bottom: 90,
            }
        );
        assert_eq!(SafeArea::full_screen(800.0, 600.0).margins(), Margins::default());
    }
}
