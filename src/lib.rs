//! Hoop Shell - launch-time mode decider and embedded browser navigation
//!
//! Core modules:
//! - `policy`: Candidate URL validation, auth-page and same-site checks
//! - `persistence`: Durable `start` / `last` / `unlocked` slots
//! - `remote`: Remote link document fetch (cache and server tiers)
//! - `platform`: Clock, task spawning, deadlines and best-effort platform calls
//! - `bootstrap`: Launch decision between web mode and game mode
//! - `navigation`: Embedded browser driver and hybrid back-navigation
//! - `settings`: Tunables, persisted alongside the slots
//! - `shell`: Wires the decision to the browser or the mini-game

pub mod bootstrap;
pub mod navigation;
pub mod persistence;
pub mod platform;
pub mod policy;
pub mod remote;
pub mod settings;
pub mod shell;

#[cfg(test)]
pub(crate) mod testing;

pub use bootstrap::{BootDecision, BootStage, BootstrapDecider, LaunchMode, ModeSwitch};
pub use navigation::{BackAction, HistoryReconciler, NavigationController, WebView, WebViewEvent};
pub use persistence::{KeyValueStore, MemoryStore, PersistentUrlStore, Slot, SlotValue};
pub use policy::UrlPolicy;
pub use remote::{Consistency, FetchError, LinkResolver, LinkSource, RemoteLinks};
pub use settings::ShellSettings;
pub use shell::{GameMode, Shell, ShellHost};

/// Shell configuration constants
pub mod consts {
    use std::time::Duration;

    /// Persistence keys (shared with earlier builds, do not rename)
    pub const START_URL_KEY: &str = "webview_start_url";
    pub const LAST_URL_KEY: &str = "webview_last_url";
    pub const UNLOCKED_KEY: &str = "webview_unlocked";

    /// Primary remote document: `links/{app-id}`, field holds the target URL
    pub const LINKS_COLLECTION: &str = "links";
    /// Legacy naming: the field carries the URL regardless of platform
    pub const DEFAULT_LINK_FIELD: &str = "samsung";
    /// Legacy alternate document `config/webview.url`
    pub const LEGACY_COLLECTION: &str = "config";
    pub const LEGACY_DOCUMENT: &str = "webview";
    pub const LEGACY_FIELD: &str = "url";

    /// Server-tier wait budget at launch (seconds)
    pub const DEFAULT_FETCH_TIMEOUT_SECS: f32 = 3.0;
    /// Cache tier is local; anything slower than this counts as a miss
    pub const CACHE_TIER_BUDGET: Duration = Duration::from_millis(250);
    /// Budget for non-gating background refreshes (seconds)
    pub const DEFAULT_BACKGROUND_TIMEOUT_SECS: f32 = 10.0;

    /// Delay before the preconnect shim redirects to the real URL
    pub const PRECONNECT_REDIRECT_DELAY_MS: u32 = 50;

    /// Substrings that mark a login/OTP flow page (matched lowercase)
    pub const AUTH_MARKERS: [&str; 5] = ["login", "auth", "signin", "otp", "callback"];

    /// Page-global sentinel set by the history instrumentation script
    pub const HISTORY_HOOK_FLAG: &str = "__hoopHistoryHook";

    pub const MOBILE_USER_AGENT: &str = "Mozilla/5.0 (Linux; Android 13; Mobile) AppleWebKit/537.36 \
        (KHTML, like Gecko) Chrome/124.0.0.0 Mobile Safari/537.36";
}
