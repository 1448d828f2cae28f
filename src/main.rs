//! Hoop Shell entry point
//!
//! Handles platform-specific initialization and runs the launch sequence.

#[cfg(target_arch = "wasm32")]
use wasm_bindgen::prelude::*;

#[cfg(target_arch = "wasm32")]
mod wasm_shell {
    use std::cell::RefCell;
    use std::rc::{Rc, Weak};

    use wasm_bindgen::prelude::*;
    use web_sys::{Document, KeyboardEvent};

    use hoop_shell::navigation::{WebView, WebViewEvent};
    use hoop_shell::persistence::{KeyValueStore, LocalStorageStore, MemoryStore};
    use hoop_shell::platform::web::{
        BrowserApp, BrowserClock, BrowserFetch, BrowserSpawner, IframeWebView,
    };
    use hoop_shell::platform::{AppControl, NoBridge, SafeArea, WebViewPlatform};
    use hoop_shell::remote::{FirestoreResolver, SnapshotCache};
    use hoop_shell::{GameMode, PersistentUrlStore, RemoteLinks, Shell, ShellHost, ShellSettings};

    /// Reveals the static mini-game markup
    struct PageGame {
        document: Document,
    }

    impl GameMode for PageGame {
        fn enter(&self) {
            match self.document.get_element_by_id("game") {
                Some(game) => {
                    let _ = game.remove_attribute("hidden");
                }
                None => log::warn!("No #game element on the page"),
            }
        }
    }

    struct BrowserHost {
        document: Document,
        webview: Rc<IframeWebView>,
        /// Filled once the shell exists; browser events route through it
        shell: Rc<RefCell<Weak<Shell>>>,
    }

    impl ShellHost for BrowserHost {
        fn create_webview(&self) -> Rc<dyn WebView> {
            let slot = self.shell.clone();
            let handler = Rc::new(move |event: WebViewEvent| {
                if let Some(shell) = slot.borrow().upgrade() {
                    shell.handle_event(event);
                }
            });
            if let Err(err) = self.webview.attach(handler) {
                log::error!("Failed to attach browser listeners: {err:?}");
            }
            self.webview.clone()
        }

        fn platform(&self) -> Rc<dyn WebViewPlatform> {
            Rc::new(NoBridge)
        }

        fn app(&self) -> Rc<dyn AppControl> {
            Rc::new(BrowserApp)
        }

        fn safe_area(&self) -> Option<SafeArea> {
            let window = web_sys::window()?;
            let width = window.inner_width().ok()?.as_f64()?;
            let height = window.inner_height().ok()?.as_f64()?;
            Some(SafeArea::full_screen(width as f32, height as f32))
        }

        fn game(&self) -> Rc<dyn GameMode> {
            Rc::new(PageGame {
                document: self.document.clone(),
            })
        }
    }

    fn open_store() -> Rc<dyn KeyValueStore> {
        match LocalStorageStore::open() {
            Ok(store) => Rc::new(store),
            Err(err) => {
                log::warn!("{err}; URL slots will not survive a reload");
                Rc::new(MemoryStore::new())
            }
        }
    }

    pub async fn run() {
        console_error_panic_hook::set_once();
        console_log::init_with_level(log::Level::Info).expect("Failed to init logger");

        log::info!("Hoop Shell starting...");

        let Some(document) = web_sys::window().and_then(|w| w.document()) else {
            log::error!("No document, nothing to launch into");
            return;
        };

        // Hide loading indicator
        if let Some(loading) = document.get_element_by_id("loading") {
            let _ = loading.set_attribute("class", "hidden");
        }

        let settings = ShellSettings::load();
        let backend = open_store();
        let store = PersistentUrlStore::new(backend.clone());
        let clock = Rc::new(BrowserClock);
        let resolver = FirestoreResolver::new(
            settings.firestore_project.clone(),
            settings.firestore_api_key.clone(),
            settings.link_sources(),
            BrowserFetch,
            SnapshotCache::new(backend),
        );
        let links = RemoteLinks::new(Rc::new(resolver), clock.clone());

        let webview = match IframeWebView::create(&document) {
            Ok(webview) => Rc::new(webview),
            Err(err) => {
                log::error!("Failed to create browser frame: {err:?}");
                return;
            }
        };
        let slot = Rc::new(RefCell::new(Weak::new()));
        let host = Rc::new(BrowserHost {
            document: document.clone(),
            webview,
            shell: slot.clone(),
        });

        let shell = Shell::new(
            settings,
            store,
            links,
            clock,
            Rc::new(BrowserSpawner),
            host,
        );
        *slot.borrow_mut() = Rc::downgrade(&shell);

        setup_back_key(&shell, &document);
        setup_lifecycle(&shell, &document);

        let decision = shell.launch().await;
        log::info!("Launched in {:?} mode", decision.mode);

        // keep the shell alive for the page lifetime
        std::mem::forget(shell);
    }

    /// Escape / browser back key acts as the platform back button
    fn setup_back_key(shell: &Rc<Shell>, document: &Document) {
        let shell = Rc::downgrade(shell);
        let closure = Closure::<dyn FnMut(_)>::new(move |event: KeyboardEvent| {
            if !matches!(event.key().as_str(), "Escape" | "BrowserBack") {
                return;
            }
            if let Some(shell) = shell.upgrade() {
                event.prevent_default();
                shell.handle_back();
            }
        });
        let _ =
            document.add_event_listener_with_callback("keydown", closure.as_ref().unchecked_ref());
        closure.forget();
    }

    /// Tab hidden counts as pause, page hide as quit
    fn setup_lifecycle(shell: &Rc<Shell>, document: &Document) {
        {
            let shell = Rc::downgrade(shell);
            let document_clone = document.clone();
            let closure = Closure::<dyn FnMut(_)>::new(move |_event: web_sys::Event| {
                let hidden = document_clone.visibility_state() == web_sys::VisibilityState::Hidden;
                if let Some(shell) = shell.upgrade() {
                    shell.on_pause(hidden);
                }
            });
            let _ = document.add_event_listener_with_callback(
                "visibilitychange",
                closure.as_ref().unchecked_ref(),
            );
            closure.forget();
        }

        if let Some(window) = web_sys::window() {
            let shell = Rc::downgrade(shell);
            let closure = Closure::<dyn FnMut(_)>::new(move |_event: web_sys::Event| {
                if let Some(shell) = shell.upgrade() {
                    shell.on_quit();
                }
            });
            let _ =
                window.add_event_listener_with_callback("pagehide", closure.as_ref().unchecked_ref());
            closure.forget();
        }
    }
}

#[cfg(target_arch = "wasm32")]
#[wasm_bindgen(start)]
pub async fn wasm_main() {
    wasm_shell::run().await;
}

#[cfg(not(target_arch = "wasm32"))]
fn main() {
    use std::rc::Rc;

    use futures::executor::LocalPool;
    use hoop_shell::persistence::FileStore;
    use hoop_shell::platform::SystemClock;
    use hoop_shell::remote::StaticResolver;
    use hoop_shell::{
        BootstrapDecider, LaunchMode, ModeSwitch, PersistentUrlStore, RemoteLinks, ShellSettings,
    };

    struct LogSwitch;

    impl ModeSwitch for LogSwitch {
        fn switch_to(&self, mode: LaunchMode) {
            log::info!("Switching to {mode:?} mode");
        }
    }

    env_logger::init();
    log::info!("Hoop Shell (native) starting...");
    log::info!("Native mode runs the launch decision only - run with `trunk serve` for the browser");

    let settings = ShellSettings::load();
    let store_path =
        std::env::var("HOOP_SHELL_STORE").unwrap_or_else(|_| "hoop_shell_store.json".into());
    let store = PersistentUrlStore::new(Rc::new(FileStore::open_or_reset(store_path)));
    let remote = std::env::var("HOOP_SHELL_REMOTE_URL").ok();
    let links = RemoteLinks::new(
        Rc::new(StaticResolver::new(remote)),
        Rc::new(SystemClock),
    );

    let mut pool = LocalPool::new();
    let decider = BootstrapDecider::new(
        store.clone(),
        links,
        Rc::new(pool.spawner()),
        &settings,
    );
    let decision = pool.run_until(decider.run(&LogSwitch));
    // let background refreshes finish before exiting
    pool.run();

    println!("mode:     {:?}", decision.mode);
    println!("stage:    {:?}", decision.stage);
    println!("url:      {}", decision.url.as_deref().unwrap_or("-"));
    println!("start:    {}", store.start().as_deref().unwrap_or("-"));
    println!("last:     {}", store.last().as_deref().unwrap_or("-"));
    println!("unlocked: {}", store.is_unlocked());
}

#[cfg(target_arch = "wasm32")]
fn main() {
    // WASM entry point is wasm_main, this is just to satisfy the compiler
}
