//! Embedded browser capability

use crate::platform::Margins;

/// Handle to the embedded browser, obtained directly from the host at
/// construction time.
///
/// All calls are fire-and-forget: results come back as [`WebViewEvent`]s.
pub trait WebView {
    fn load_url(&self, url: &str);
    /// Load an inline document with `base_origin` as its origin
    fn load_html(&self, html: &str, base_origin: &str);
    fn set_visible(&self, visible: bool);
    fn set_margins(&self, margins: Margins);
    /// Native (full-navigation) history only
    fn can_go_back(&self) -> bool;
    fn go_back(&self);
    fn evaluate_script(&self, js: &str);
}

/// Callbacks from the browser, routed by the host into the controller
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebViewEvent {
    /// String posted over the page bridge
    Message(String),
    Error(String),
    LoadStarted(String),
    LoadFinished(String),
}
