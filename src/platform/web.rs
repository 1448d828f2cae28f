//! Browser (wasm32) platform pieces
//!
//! The embedded browser is an `<iframe>` laid over the page. Native history
//! of a cross-origin frame is not observable, so `can_go_back` is always
//! false and back navigation relies on the page-reported history.
//!
//! Degraded mode for cross-origin content:
//! - frames never fire `error` for a failed navigation, so load-error
//!   recovery does not run on this target
//! - the frame's location is unreadable and the load handler falls back to
//!   `src`; `last` stays at the first URL loaded and moves inside the page
//!   are only seen if the page posts `loc:` messages itself

use std::rc::Rc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::LocalBoxFuture;
use js_sys::{Function, Promise, Reflect};
use wasm_bindgen::JsCast;
use wasm_bindgen::closure::Closure;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::JsFuture;
use web_sys::{Document, HtmlIFrameElement, MessageEvent, Response, Window};
use web_time::Instant;

use super::{AppControl, Clock, Margins, Spawner};
use crate::navigation::{WebView, WebViewEvent};
use crate::remote::{DocumentTransport, FetchError};

fn window() -> Result<Window, JsValue> {
    web_sys::window().ok_or_else(|| JsValue::from_str("no window"))
}

/// Readable text for a thrown JS value
pub fn js_error_message(value: &JsValue) -> String {
    value
        .as_string()
        .or_else(|| {
            value
                .dyn_ref::<js_sys::Error>()
                .map(|err| err.message().into())
        })
        .unwrap_or_else(|| format!("{value:?}"))
}

async fn sleep_ms(duration_ms: i32) -> Result<(), JsValue> {
    let mut resolve_slot: Option<Function> = None;
    let promise = Promise::new(&mut |resolve, _reject| {
        resolve_slot = Some(resolve);
    });
    let resolve =
        resolve_slot.ok_or_else(|| JsValue::from_str("resolve function should be set"))?;
    let closure = Closure::once(move || {
        let _ = resolve.call0(&JsValue::UNDEFINED);
    });
    window()?.set_timeout_with_callback_and_timeout_and_arguments_0(
        closure.as_ref().unchecked_ref(),
        duration_ms,
    )?;
    closure.forget();
    JsFuture::from(promise).await?;
    Ok(())
}

/// `setTimeout`-backed clock
#[derive(Debug, Default, Clone, Copy)]
pub struct BrowserClock;

#[async_trait(?Send)]
impl Clock for BrowserClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    async fn sleep(&self, duration: Duration) {
        let ms = i32::try_from(duration.as_millis()).unwrap_or(i32::MAX);
        if let Err(err) = sleep_ms(ms).await {
            log::warn!("Timer failed: {}", js_error_message(&err));
        }
    }
}

/// Spawns onto the page's microtask queue
#[derive(Debug, Default, Clone, Copy)]
pub struct BrowserSpawner;

impl Spawner for BrowserSpawner {
    fn spawn_local(&self, task: LocalBoxFuture<'static, ()>) {
        wasm_bindgen_futures::spawn_local(task);
    }
}

/// `window.fetch` document transport
#[derive(Debug, Default, Clone, Copy)]
pub struct BrowserFetch;

impl BrowserFetch {
    async fn get(url: &str) -> Result<Option<String>, JsValue> {
        let resp: Response = JsFuture::from(window()?.fetch_with_str(url))
            .await?
            .dyn_into()?;
        if resp.status() == 404 {
            return Ok(None);
        }
        if !resp.ok() {
            return Err(JsValue::from_str(&format!("HTTP {}", resp.status())));
        }
        let text = JsFuture::from(resp.text()?).await?;
        Ok(text.as_string())
    }
}

#[async_trait(?Send)]
impl DocumentTransport for BrowserFetch {
    async fn get_document(&self, url: &str) -> Result<Option<String>, FetchError> {
        Self::get(url)
            .await
            .map_err(|err| FetchError::Transport(js_error_message(&err)))
    }
}

/// Full-screen iframe standing in for the embedded browser
pub struct IframeWebView {
    window: Window,
    frame: HtmlIFrameElement,
}

impl IframeWebView {
    pub fn create(document: &Document) -> Result<Self, JsValue> {
        let frame: HtmlIFrameElement = document.create_element("iframe")?.dyn_into()?;
        frame.set_id("hoop-shell-browser");
        frame.set_attribute("allow", "fullscreen; autoplay; clipboard-write")?;
        let style = frame.style();
        style.set_property("position", "fixed")?;
        style.set_property("border", "0")?;
        style.set_property("width", "auto")?;
        style.set_property("height", "auto")?;
        style.set_property("display", "none")?;
        document
            .body()
            .ok_or_else(|| JsValue::from_str("no body"))?
            .append_child(&frame)?;
        Ok(Self {
            window: window()?,
            frame,
        })
    }

    /// Route iframe load/error and posted messages to `handler`.
    /// The listeners live as long as the page.
    pub fn attach(&self, handler: Rc<dyn Fn(WebViewEvent)>) -> Result<(), JsValue> {
        let on_load = {
            let handler = handler.clone();
            let frame = self.frame.clone();
            Closure::<dyn FnMut()>::new(move || {
                let url = frame
                    .content_window()
                    .and_then(|w| w.location().href().ok())
                    .unwrap_or_else(|| frame.src());
                handler(WebViewEvent::LoadFinished(url));
            })
        };
        self.frame
            .add_event_listener_with_callback("load", on_load.as_ref().unchecked_ref())?;
        on_load.forget();

        let on_error = {
            let handler = handler.clone();
            let frame = self.frame.clone();
            Closure::<dyn FnMut()>::new(move || {
                handler(WebViewEvent::Error(format!("failed to load {}", frame.src())));
            })
        };
        self.frame
            .add_event_listener_with_callback("error", on_error.as_ref().unchecked_ref())?;
        on_error.forget();

        let on_message = Closure::<dyn FnMut(MessageEvent)>::new(move |event: MessageEvent| {
            if let Some(msg) = event.data().as_string() {
                handler(WebViewEvent::Message(msg));
            }
        });
        self.window
            .add_event_listener_with_callback("message", on_message.as_ref().unchecked_ref())?;
        on_message.forget();
        Ok(())
    }

    fn set_style(&self, name: &str, value: &str) {
        if let Err(err) = self.frame.style().set_property(name, value) {
            log::warn!("Browser style {name}: {}", js_error_message(&err));
        }
    }
}

impl WebView for IframeWebView {
    fn load_url(&self, url: &str) {
        let _ = self.frame.remove_attribute("srcdoc");
        self.frame.set_src(url);
    }

    fn load_html(&self, html: &str, _base_origin: &str) {
        self.frame.set_srcdoc(html);
    }

    fn set_visible(&self, visible: bool) {
        self.set_style("display", if visible { "block" } else { "none" });
    }

    fn set_margins(&self, margins: Margins) {
        self.set_style("left", &format!("{}px", margins.left));
        self.set_style("top", &format!("{}px", margins.top));
        self.set_style("right", &format!("{}px", margins.right));
        self.set_style("bottom", &format!("{}px", margins.bottom));
    }

    fn can_go_back(&self) -> bool {
        false
    }

    fn go_back(&self) {
        if let Err(err) = self.window.history().and_then(|h| h.back()) {
            log::warn!("history.back failed: {}", js_error_message(&err));
        }
    }

    // Cross-origin frames refuse `eval`; the page then reports nothing and
    // back navigation degrades to interaction tracking.
    fn evaluate_script(&self, js: &str) {
        let Some(target) = self.frame.content_window() else {
            return;
        };
        let result = Reflect::get(&target, &JsValue::from_str("eval"))
            .and_then(|eval| eval.dyn_into::<Function>())
            .and_then(|eval| eval.call1(&target, &JsValue::from_str(js)));
        if let Err(err) = result {
            log::debug!("Script injection refused: {}", js_error_message(&err));
        }
    }
}

/// Closes the tab/window when back is pressed at the root
#[derive(Debug, Default, Clone, Copy)]
pub struct BrowserApp;

impl AppControl for BrowserApp {
    fn quit(&self) {
        log::info!("Quit requested");
        if let Some(Err(err)) = web_sys::window().map(|w| w.close()) {
            log::warn!("window.close failed: {}", js_error_message(&err));
        }
    }
}
