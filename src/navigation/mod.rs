//! Embedded browser driver
//!
//! `NavigationController` owns the browser for its whole lifetime:
//! - initial URL selection (`last` -> `start` -> emergency)
//! - load/error/message event handling and `last`/`unlocked` persistence
//! - hybrid back navigation through [`HistoryReconciler`]
//! - silent `start` refresh that only navigates if nothing loaded yet

use std::cell::RefCell;
use std::rc::Rc;

use crate::consts::CACHE_TIER_BUDGET;
use crate::persistence::PersistentUrlStore;
use crate::platform::{
    AppControl, Clock, Margins, SafeArea, Spawner, WebViewPlatform, best_effort, fire_and_forget,
    yield_now,
};
use crate::policy::{UrlPolicy, extract_host, is_same_site, looks_like_auth_page};
use crate::remote::{Consistency, RemoteLinks};
use crate::settings::ShellSettings;

pub mod history;
pub mod script;
pub mod webview;

pub use history::{BackAction, BridgeMessage, HistoryReconciler, NavigationSession};
pub use script::{PAGE_BACK_SCRIPT, PreconnectShim, history_hook_script};
pub use webview::{WebView, WebViewEvent};

/// Collaborators handed to the controller at construction
#[derive(Clone)]
pub struct NavigationDeps {
    pub webview: Rc<dyn WebView>,
    pub store: PersistentUrlStore,
    pub links: RemoteLinks,
    pub clock: Rc<dyn Clock>,
    pub spawner: Rc<dyn Spawner>,
    pub platform: Rc<dyn WebViewPlatform>,
    pub app: Rc<dyn AppControl>,
}

#[derive(Debug, Default)]
struct ControllerState {
    reconciler: HistoryReconciler,
    /// Domain of the previous load; gates which URLs may become `last`
    tracked_domain: Option<String>,
    initial_candidate: Option<String>,
    loaded_once: bool,
    visible: bool,
    started: bool,
    /// One recovery per failure streak; reset by the next successful load
    recovery_attempted: bool,
    /// Preconnect document still waiting to redirect
    pending_shim: Option<PendingShim>,
}

#[derive(Debug)]
struct PendingShim {
    origin: String,
    target: String,
}

impl PendingShim {
    /// Load-finished reports from the inline document itself: `about:srcdoc`
    /// and friends, `data:` URLs, the bare base origin, or anything the policy
    /// would never navigate to. The redirect target always counts as real.
    fn reports(&self, url: &str, policy: UrlPolicy) -> bool {
        if url == self.target {
            return false;
        }
        url.starts_with("about:")
            || url.starts_with("data:")
            || url.trim_end_matches('/') == self.origin
            || !policy.is_valid(url)
    }
}

pub struct NavigationController {
    webview: Rc<dyn WebView>,
    store: PersistentUrlStore,
    links: RemoteLinks,
    clock: Rc<dyn Clock>,
    spawner: Rc<dyn Spawner>,
    platform: Rc<dyn WebViewPlatform>,
    app: Rc<dyn AppControl>,
    settings: ShellSettings,
    policy: UrlPolicy,
    state: RefCell<ControllerState>,
}

impl NavigationController {
    /// Take ownership of a freshly created browser: apply margins and keep it
    /// hidden until the first load completes (when configured).
    pub fn new(
        deps: NavigationDeps,
        settings: ShellSettings,
        safe_area: Option<SafeArea>,
    ) -> Rc<Self> {
        let margins = if settings.respect_safe_area {
            safe_area.map(|area| area.margins()).unwrap_or_default()
        } else {
            Margins::default()
        };
        let visible = !settings.show_after_first_load;
        deps.webview.set_margins(margins);
        deps.webview.set_visible(visible);

        Rc::new(Self {
            webview: deps.webview,
            store: deps.store,
            links: deps.links,
            clock: deps.clock,
            spawner: deps.spawner,
            platform: deps.platform,
            app: deps.app,
            policy: settings.url_policy(),
            settings,
            state: RefCell::new(ControllerState {
                visible,
                ..ControllerState::default()
            }),
        })
    }

    /// Platform setup, then the first load. Runs once per browser.
    pub async fn start(self: Rc<Self>) {
        if std::mem::replace(&mut self.state.borrow_mut().started, true) {
            log::warn!("Navigation already started");
            return;
        }

        // let the embedded view attach before touching the engine
        yield_now().await;

        if self.settings.set_mobile_user_agent {
            self.spawn_user_agent();
        }

        if self.settings.enable_cookies_before_load {
            let platform = &*self.platform;
            best_effort(
                &*self.clock,
                "cookie setup",
                self.settings.cookie_setup_timeout(),
                self.settings.cookie_setup_poll(),
                || platform.enable_cookies_and_storage(),
            )
            .await;
        }

        let delay = self.settings.initial_delay();
        if !delay.is_zero() {
            self.clock.sleep(delay).await;
        }

        let candidate = self.select_initial_url();
        {
            let mut state = self.state.borrow_mut();
            state.tracked_domain = self
                .store
                .start()
                .or_else(|| candidate.clone())
                .as_deref()
                .and_then(extract_host);
            state.initial_candidate = candidate.clone();
        }

        match candidate {
            Some(url) => {
                log::info!("Initial load: {url}");
                self.load(&url);
            }
            None => log::warn!("No last, start or emergency URL to load"),
        }

        self.spawner
            .spawn_local(Box::pin(self.clone().refresh_start_silently()));
    }

    /// `last` -> `start` -> emergency, first one the policy accepts
    pub fn select_initial_url(&self) -> Option<String> {
        let policy = self.policy;
        self.store
            .last()
            .filter(|url| policy.is_valid(url))
            .or_else(|| self.store.start().filter(|url| policy.is_valid(url)))
            .or_else(|| self.settings.emergency().map(str::to_owned))
    }

    fn load(&self, url: &str) {
        if self.settings.use_preconnect
            && let Some(shim) = PreconnectShim::for_url(url, self.settings.preconnect_delay_ms)
        {
            self.state.borrow_mut().pending_shim = Some(PendingShim {
                origin: shim.origin.clone(),
                target: url.to_owned(),
            });
            self.webview.load_html(&shim.html, &shim.origin);
            return;
        }
        self.webview.load_url(url);
    }

    /// Refresh `start` (cache tier, then server tier). Only navigates when no
    /// page has loaded and the initial candidate was unusable.
    async fn refresh_start_silently(self: Rc<Self>) {
        let tiers = [
            (Consistency::Cache, CACHE_TIER_BUDGET),
            (Consistency::Server, self.settings.background_timeout()),
        ];
        for (tier, budget) in tiers {
            let Some(url) = self.links.fetch_valid(tier, budget, self.policy).await else {
                continue;
            };
            self.store.set_start(&url);
            log::info!("Refreshed start URL from {tier:?} tier");

            let should_load = {
                let mut state = self.state.borrow_mut();
                let usable = state
                    .initial_candidate
                    .as_deref()
                    .is_some_and(|c| self.policy.is_valid(c));
                if state.loaded_once || usable {
                    false
                } else {
                    state.initial_candidate = Some(url.clone());
                    state.tracked_domain = extract_host(&url);
                    true
                }
            };
            if should_load {
                log::info!("Nothing loaded yet, navigating to refreshed {url}");
                self.load(&url);
            }
        }
    }

    pub fn handle_event(&self, event: WebViewEvent) {
        match event {
            WebViewEvent::Message(msg) => self.on_message(&msg),
            WebViewEvent::Error(err) => self.on_load_error(&err),
            WebViewEvent::LoadStarted(url) => self.on_load_started(&url),
            WebViewEvent::LoadFinished(url) => self.on_load_finished(&url),
        }
    }

    pub fn on_load_started(&self, url: &str) {
        log::info!("Started: {url}");
    }

    pub fn on_load_finished(&self, url: &str) {
        let reveal = {
            let mut state = self.state.borrow_mut();
            if let Some(shim) = &state.pending_shim {
                if shim.reports(url, self.policy) {
                    log::debug!("Preconnect document loaded ({url}), waiting for redirect");
                    return;
                }
                state.pending_shim = None;
            }

            log::info!("Loaded: {url}");
            state.loaded_once = true;
            state.recovery_attempted = false;
            state.reconciler.observe_location(url);

            if self.policy.is_valid(url)
                && is_same_site(url, state.tracked_domain.as_deref())
                && !looks_like_auth_page(url)
            {
                self.store.set_last(url);
            }
            if let Some(host) = extract_host(url) {
                state.tracked_domain = Some(host);
            }

            let reveal = !state.visible;
            state.visible = true;
            reveal
        };

        self.store.mark_unlocked();
        if reveal {
            self.webview.set_visible(true);
        }
        self.webview.evaluate_script(&history_hook_script());
    }

    /// One best-effort recovery: `start`, else the emergency URL
    pub fn on_load_error(&self, error: &str) {
        log::error!("Browser error: {error}");
        let already_tried = {
            let mut state = self.state.borrow_mut();
            state.pending_shim = None;
            std::mem::replace(&mut state.recovery_attempted, true)
        };
        if already_tried {
            log::warn!("Recovery already attempted, leaving browser as is");
            return;
        }

        if let Some(start) = self.store.start().filter(|url| self.policy.is_valid(url)) {
            log::info!("Recovering with start URL");
            self.load(&start);
        } else if let Some(emergency) = self.settings.emergency() {
            log::info!("Recovering with emergency URL");
            self.load(emergency);
        } else {
            log::warn!("No recovery URL available");
        }
    }

    pub fn on_message(&self, raw: &str) {
        self.state.borrow_mut().reconciler.handle_message(raw);
    }

    /// Platform back key/gesture and programmatic back both land here
    pub fn handle_back_navigation(&self) -> BackAction {
        let native = self.webview.can_go_back();
        let action = self.state.borrow().reconciler.decide(native);
        log::debug!("Back navigation: {action:?}");
        match action {
            BackAction::NativeBack => self.webview.go_back(),
            BackAction::PageBack => self.webview.evaluate_script(PAGE_BACK_SCRIPT),
            BackAction::Exit => self.app.quit(),
        }
        action
    }

    pub fn back(&self) -> BackAction {
        self.handle_back_navigation()
    }

    pub fn on_pause(&self, paused: bool) {
        if paused {
            self.spawn_cookie_flush();
        }
    }

    pub fn on_quit(&self) {
        self.spawn_cookie_flush();
    }

    pub fn session(&self) -> NavigationSession {
        self.state.borrow().reconciler.session().clone()
    }

    pub fn is_visible(&self) -> bool {
        self.state.borrow().visible
    }

    pub fn has_loaded(&self) -> bool {
        self.state.borrow().loaded_once
    }

    fn spawn_user_agent(&self) {
        let platform = self.platform.clone();
        let clock = self.clock.clone();
        let user_agent = self.settings.mobile_user_agent.clone();
        let timeout = self.settings.cookie_setup_timeout();
        self.spawner.spawn_local(Box::pin(async move {
            fire_and_forget(
                &*clock,
                "user agent",
                timeout,
                platform.set_user_agent(&user_agent),
            )
            .await;
        }));
    }

    fn spawn_cookie_flush(&self) {
        let platform = self.platform.clone();
        let clock = self.clock.clone();
        let timeout = self.settings.cookie_setup_timeout();
        self.spawner.spawn_local(Box::pin(async move {
            fire_and_forget(&*clock, "cookie flush", timeout, platform.flush_cookies()).await;
        }));
    }
}
