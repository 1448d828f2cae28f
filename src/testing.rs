//! Test doubles and a virtual-time driver

use std::cell::{Cell, RefCell};
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};
use std::time::Duration;

use async_trait::async_trait;
use futures::executor::LocalPool;
use futures::task::LocalSpawnExt;
use web_time::Instant;

use crate::navigation::WebView;
use crate::platform::{AppControl, Clock, Margins, PlatformError, WebViewPlatform};
use crate::remote::{Consistency, FetchError, LinkResolver};

// ── Virtual clock ──────────────────────────────────────────────

struct Timer {
    id: u64,
    target: Instant,
    waker: Waker,
}

#[derive(Default)]
struct ClockInner {
    offset: Duration,
    timers: Vec<Timer>,
    next_id: u64,
}

/// Clock whose time only moves when the driver advances it
pub struct ManualClock {
    base: Instant,
    inner: RefCell<ClockInner>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            inner: RefCell::new(ClockInner::default()),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.inner.borrow().offset
    }

    pub fn advance(&self, by: Duration) {
        self.inner.borrow_mut().offset += by;
        self.wake_due();
    }

    /// Jump to the earliest pending timer. False when none is pending.
    pub fn advance_to_next_timer(&self) -> bool {
        let next = {
            let inner = self.inner.borrow();
            inner.timers.iter().map(|t| t.target).min()
        };
        let Some(next) = next else {
            return false;
        };
        {
            let mut inner = self.inner.borrow_mut();
            let target_offset = next.saturating_duration_since(self.base);
            if target_offset > inner.offset {
                inner.offset = target_offset;
            }
        }
        self.wake_due();
        true
    }

    fn wake_due(&self) {
        let now = self.now();
        let due: Vec<Waker> = {
            let mut inner = self.inner.borrow_mut();
            let (due, pending): (Vec<Timer>, Vec<Timer>) =
                inner.timers.drain(..).partition(|t| t.target <= now);
            inner.timers = pending;
            due.into_iter().map(|t| t.waker).collect()
        };
        for waker in due {
            waker.wake();
        }
    }

    fn register(&self, id: Option<u64>, target: Instant, waker: &Waker) -> u64 {
        let mut inner = self.inner.borrow_mut();
        if let Some(id) = id
            && let Some(timer) = inner.timers.iter_mut().find(|t| t.id == id)
        {
            timer.waker = waker.clone();
            return id;
        }
        let id = inner.next_id;
        inner.next_id += 1;
        inner.timers.push(Timer {
            id,
            target,
            waker: waker.clone(),
        });
        id
    }

    fn cancel(&self, id: u64) {
        self.inner.borrow_mut().timers.retain(|t| t.id != id);
    }
}

struct ManualSleep<'a> {
    clock: &'a ManualClock,
    target: Instant,
    id: Option<u64>,
}

impl Future for ManualSleep<'_> {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if self.clock.now() >= self.target {
            if let Some(id) = self.id.take() {
                self.clock.cancel(id);
            }
            return Poll::Ready(());
        }
        let id = self.clock.register(self.id, self.target, cx.waker());
        self.id = Some(id);
        Poll::Pending
    }
}

impl Drop for ManualSleep<'_> {
    fn drop(&mut self) {
        if let Some(id) = self.id.take() {
            self.clock.cancel(id);
        }
    }
}

#[async_trait(?Send)]
impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.base + self.inner.borrow().offset
    }

    async fn sleep(&self, duration: Duration) {
        let target = self.now() + duration;
        ManualSleep {
            clock: self,
            target,
            id: None,
        }
        .await
    }
}

/// Run `fut` to completion, advancing virtual time whenever the pool stalls
pub fn drive<T: 'static>(
    pool: &mut LocalPool,
    clock: &ManualClock,
    fut: impl Future<Output = T> + 'static,
) -> T {
    let out = Rc::new(RefCell::new(None));
    let slot = out.clone();
    pool.spawner()
        .spawn_local(async move {
            *slot.borrow_mut() = Some(fut.await);
        })
        .expect("spawn");
    loop {
        pool.run_until_stalled();
        if let Some(value) = out.borrow_mut().take() {
            return value;
        }
        assert!(
            clock.advance_to_next_timer(),
            "future stalled with no pending timers"
        );
    }
}

/// Run every spawned task until nothing can make progress
pub fn settle(pool: &mut LocalPool, clock: &ManualClock) {
    loop {
        pool.run_until_stalled();
        if !clock.advance_to_next_timer() {
            break;
        }
    }
}

// ── Scripted remote resolver ───────────────────────────────────

#[derive(Debug, Clone)]
pub enum Reply {
    Url(String),
    NotFound,
    Transport,
    /// Never completes
    Pending,
    After(Duration, Box<Reply>),
}

impl Reply {
    pub fn url(url: &str) -> Self {
        Reply::Url(url.to_owned())
    }

    pub fn after(delay: Duration, reply: Reply) -> Self {
        Reply::After(delay, Box::new(reply))
    }
}

pub struct ScriptedResolver {
    clock: Rc<ManualClock>,
    cache: Reply,
    server: Reply,
    calls: RefCell<Vec<Consistency>>,
}

impl ScriptedResolver {
    pub fn new(clock: Rc<ManualClock>) -> Self {
        Self {
            clock,
            cache: Reply::NotFound,
            server: Reply::NotFound,
            calls: RefCell::new(Vec::new()),
        }
    }

    pub fn cache(mut self, reply: Reply) -> Self {
        self.cache = reply;
        self
    }

    pub fn server(mut self, reply: Reply) -> Self {
        self.server = reply;
        self
    }

    pub fn calls(&self) -> Vec<Consistency> {
        self.calls.borrow().clone()
    }
}

#[async_trait(?Send)]
impl LinkResolver for ScriptedResolver {
    async fn fetch(&self, consistency: Consistency) -> Result<String, FetchError> {
        self.calls.borrow_mut().push(consistency);
        let mut reply = match consistency {
            Consistency::Cache => self.cache.clone(),
            Consistency::Server => self.server.clone(),
        };
        loop {
            match reply {
                Reply::After(delay, next) => {
                    self.clock.sleep(delay).await;
                    reply = *next;
                }
                Reply::Url(url) => return Ok(url),
                Reply::NotFound => return Err(FetchError::NotFound),
                Reply::Transport => return Err(FetchError::Transport("offline".into())),
                Reply::Pending => futures::future::pending::<()>().await,
            }
        }
    }
}

// ── Browser and platform doubles ───────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebViewCall {
    LoadUrl(String),
    LoadHtml { origin: String },
    SetVisible(bool),
    SetMargins(Margins),
    GoBack,
    Evaluate(String),
}

#[derive(Default)]
pub struct FakeWebView {
    calls: RefCell<Vec<WebViewCall>>,
    can_go_back: Cell<bool>,
}

impl FakeWebView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<WebViewCall> {
        self.calls.borrow().clone()
    }

    pub fn loaded_urls(&self) -> Vec<String> {
        self.calls
            .borrow()
            .iter()
            .filter_map(|c| match c {
                WebViewCall::LoadUrl(url) => Some(url.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn evaluated(&self) -> Vec<String> {
        self.calls
            .borrow()
            .iter()
            .filter_map(|c| match c {
                WebViewCall::Evaluate(js) => Some(js.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn back_count(&self) -> usize {
        self.calls
            .borrow()
            .iter()
            .filter(|c| **c == WebViewCall::GoBack)
            .count()
    }

    pub fn set_can_go_back(&self, value: bool) {
        self.can_go_back.set(value);
    }

    pub fn clear(&self) {
        self.calls.borrow_mut().clear();
    }
}

impl WebView for FakeWebView {
    fn load_url(&self, url: &str) {
        self.calls
            .borrow_mut()
            .push(WebViewCall::LoadUrl(url.to_owned()));
    }

    fn load_html(&self, _html: &str, base_origin: &str) {
        self.calls.borrow_mut().push(WebViewCall::LoadHtml {
            origin: base_origin.to_owned(),
        });
    }

    fn set_visible(&self, visible: bool) {
        self.calls
            .borrow_mut()
            .push(WebViewCall::SetVisible(visible));
    }

    fn set_margins(&self, margins: Margins) {
        self.calls
            .borrow_mut()
            .push(WebViewCall::SetMargins(margins));
    }

    fn can_go_back(&self) -> bool {
        self.can_go_back.get()
    }

    fn go_back(&self) {
        self.calls.borrow_mut().push(WebViewCall::GoBack);
    }

    fn evaluate_script(&self, js: &str) {
        self.calls
            .borrow_mut()
            .push(WebViewCall::Evaluate(js.to_owned()));
    }
}

#[derive(Default)]
pub struct RecordingPlatform {
    pub fail: bool,
    pub user_agents: RefCell<Vec<String>>,
    pub cookie_setups: Cell<usize>,
    pub flushes: Cell<usize>,
}

impl RecordingPlatform {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    fn outcome(&self) -> Result<(), PlatformError> {
        if self.fail {
            Err(PlatformError::Unavailable("test bridge down".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait(?Send)]
impl WebViewPlatform for RecordingPlatform {
    async fn set_user_agent(&self, user_agent: &str) -> Result<(), PlatformError> {
        self.user_agents.borrow_mut().push(user_agent.to_owned());
        self.outcome()
    }

    async fn enable_cookies_and_storage(&self) -> Result<(), PlatformError> {
        self.cookie_setups.set(self.cookie_setups.get() + 1);
        self.outcome()
    }

    async fn flush_cookies(&self) -> Result<(), PlatformError> {
        self.flushes.set(self.flushes.get() + 1);
        self.outcome()
    }
}

#[derive(Default)]
pub struct RecordingApp {
    pub quits: Cell<usize>,
}

impl AppControl for RecordingApp {
    fn quit(&self) {
        self.quits.set(self.quits.get() + 1);
    }
}
