//! Shell settings
//!
//! Persisted in LocalStorage on the web build, separately from the URL slots.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::consts::{
    DEFAULT_BACKGROUND_TIMEOUT_SECS, DEFAULT_FETCH_TIMEOUT_SECS, DEFAULT_LINK_FIELD,
    MOBILE_USER_AGENT, PRECONNECT_REDIRECT_DELAY_MS,
};
use crate::policy::UrlPolicy;
use crate::remote::LinkSource;

/// Shell settings/preferences
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShellSettings {
    // === Remote link ===
    /// Document id under the `links` collection
    pub app_id: String,
    /// Field holding the URL
    pub link_field: String,
    /// Also consult `config/webview.url`
    pub legacy_source: bool,
    /// Firestore project for the REST endpoint
    pub firestore_project: String,
    pub firestore_api_key: Option<String>,

    // === Launch ===
    /// Enter web mode straight from a cached `start` URL
    pub try_cached_first: bool,
    /// Server-tier wait at launch (seconds)
    pub fetch_timeout_secs: f32,
    /// Budget for silent refreshes (seconds)
    pub background_timeout_secs: f32,
    /// Accept `http://` (debug only; SameSite=None cookies will not work)
    pub allow_http_for_debug: bool,
    /// Last resort when neither `last` nor `start` is usable
    pub emergency_url: String,

    // === Browser ===
    /// Inline preconnect document before the real load
    pub use_preconnect: bool,
    pub preconnect_delay_ms: u32,
    pub set_mobile_user_agent: bool,
    pub mobile_user_agent: String,
    /// Enable cookies/3rd-party cookies/DOM storage before the first load
    pub enable_cookies_before_load: bool,
    pub cookie_setup_timeout_secs: f32,
    pub cookie_setup_poll_secs: f32,
    pub respect_safe_area: bool,
    /// Keep the browser hidden until a page finishes loading
    pub show_after_first_load: bool,
    /// Pause after browser init before the first load (seconds)
    pub initial_delay_secs: f32,
}

impl Default for ShellSettings {
    fn default() -> Self {
        Self {
            app_id: String::new(),
            link_field: DEFAULT_LINK_FIELD.to_owned(),
            legacy_source: true,
            firestore_project: String::new(),
            firestore_api_key: None,

            try_cached_first: true,
            fetch_timeout_secs: DEFAULT_FETCH_TIMEOUT_SECS,
            background_timeout_secs: DEFAULT_BACKGROUND_TIMEOUT_SECS,
            allow_http_for_debug: false,
            emergency_url: String::new(),

            use_preconnect: false,
            preconnect_delay_ms: PRECONNECT_REDIRECT_DELAY_MS,
            set_mobile_user_agent: true,
            mobile_user_agent: MOBILE_USER_AGENT.to_owned(),
            enable_cookies_before_load: true,
            cookie_setup_timeout_secs: 0.6,
            cookie_setup_poll_secs: 0.1,
            respect_safe_area: true,
            show_after_first_load: true,
            initial_delay_secs: 0.1,
        }
    }
}

/// Whole milliseconds; `0.6` must not become `600.000024ms`
fn secs(value: f32) -> Duration {
    if !value.is_finite() || value <= 0.0 {
        return Duration::ZERO;
    }
    Duration::from_millis((f64::from(value) * 1000.0).round() as u64)
}

impl ShellSettings {
    pub fn url_policy(&self) -> UrlPolicy {
        UrlPolicy::new(self.allow_http_for_debug)
    }

    pub fn fetch_timeout(&self) -> Duration {
        secs(self.fetch_timeout_secs)
    }

    pub fn background_timeout(&self) -> Duration {
        secs(self.background_timeout_secs)
    }

    pub fn cookie_setup_timeout(&self) -> Duration {
        secs(self.cookie_setup_timeout_secs)
    }

    pub fn cookie_setup_poll(&self) -> Duration {
        secs(self.cookie_setup_poll_secs)
    }

    pub fn initial_delay(&self) -> Duration {
        secs(self.initial_delay_secs)
    }

    /// Remote documents to consult, in order
    pub fn link_sources(&self) -> Vec<LinkSource> {
        let mut sources = vec![LinkSource::links(&self.app_id, &self.link_field)];
        if self.legacy_source {
            sources.push(LinkSource::legacy());
        }
        sources
    }

    /// Emergency URL, if configured and valid
    pub fn emergency(&self) -> Option<&str> {
        self.url_policy().accept(Some(self.emergency_url.as_str()))
    }

    /// Parse settings JSON; missing fields take their defaults
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// LocalStorage key (used only in wasm32)
    #[allow(dead_code)]
    const STORAGE_KEY: &'static str = "hoop_shell_settings";

    /// Load settings from LocalStorage (WASM only)
    #[cfg(target_arch = "wasm32")]
    pub fn load() -> Self {
        let storage = web_sys::window()
            .and_then(|w| w.local_storage().ok())
            .flatten();

        if let Some(storage) = storage {
            if let Ok(Some(json)) = storage.get_item(Self::STORAGE_KEY) {
                match Self::from_json(&json) {
                    Ok(settings) => {
                        log::info!("Loaded settings from LocalStorage");
                        return settings;
                    }
                    Err(err) => log::warn!("Stored settings unreadable: {err}"),
                }
            }
        }

        log::info!("Using default settings");
        Self::default()
    }

    /// Load settings from the JSON file named by `HOOP_SHELL_SETTINGS`
    #[cfg(not(target_arch = "wasm32"))]
    pub fn load() -> Self {
        let Ok(path) = std::env::var(Self::ENV_PATH) else {
            log::info!("Using default settings");
            return Self::default();
        };
        match std::fs::read_to_string(&path).map(|json| Self::from_json(&json)) {
            Ok(Ok(settings)) => {
                log::info!("Loaded settings from {path}");
                settings
            }
            Ok(Err(err)) => {
                log::warn!("Settings file {path} unreadable: {err}");
                Self::default()
            }
            Err(err) => {
                log::warn!("Settings file {path} missing: {err}");
                Self::default()
            }
        }
    }

    #[cfg(not(target_arch = "wasm32"))]
    const ENV_PATH: &'static str = "HOOP_SHELL_SETTINGS";
}
