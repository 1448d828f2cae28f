//! Launch sequence
//!
//! Runs the boot decision once, then either builds the browser and its
//! `NavigationController` or hands the screen to the mini-game.

use std::cell::RefCell;
use std::rc::Rc;

use crate::bootstrap::{BootDecision, BootstrapDecider, LaunchMode, ModeSwitch};
use crate::navigation::{BackAction, NavigationController, NavigationDeps, WebView, WebViewEvent};
use crate::persistence::PersistentUrlStore;
use crate::platform::{AppControl, Clock, SafeArea, Spawner, WebViewPlatform};
use crate::remote::RemoteLinks;
use crate::settings::ShellSettings;

/// Fallback content shown when no web destination is known
pub trait GameMode {
    fn enter(&self);
}

/// Everything the shell needs from the hosting platform
pub trait ShellHost {
    /// Create the embedded browser. Called at most once.
    fn create_webview(&self) -> Rc<dyn WebView>;
    fn platform(&self) -> Rc<dyn WebViewPlatform>;
    fn app(&self) -> Rc<dyn AppControl>;
    fn safe_area(&self) -> Option<SafeArea>;
    fn game(&self) -> Rc<dyn GameMode>;
}

enum ShellState {
    Booting,
    Web(Rc<NavigationController>),
    Game,
}

pub struct Shell {
    settings: ShellSettings,
    store: PersistentUrlStore,
    links: RemoteLinks,
    clock: Rc<dyn Clock>,
    spawner: Rc<dyn Spawner>,
    host: Rc<dyn ShellHost>,
    state: RefCell<ShellState>,
}

impl Shell {
    pub fn new(
        settings: ShellSettings,
        store: PersistentUrlStore,
        links: RemoteLinks,
        clock: Rc<dyn Clock>,
        spawner: Rc<dyn Spawner>,
        host: Rc<dyn ShellHost>,
    ) -> Rc<Self> {
        Rc::new(Self {
            settings,
            store,
            links,
            clock,
            spawner,
            host,
            state: RefCell::new(ShellState::Booting),
        })
    }

    /// Decide the launch mode and switch into it
    pub async fn launch(self: &Rc<Self>) -> BootDecision {
        let decider = BootstrapDecider::new(
            self.store.clone(),
            self.links.clone(),
            self.spawner.clone(),
            &self.settings,
        );
        decider.run(&**self).await
    }

    pub fn mode(&self) -> Option<LaunchMode> {
        match &*self.state.borrow() {
            ShellState::Booting => None,
            ShellState::Web(_) => Some(LaunchMode::Web),
            ShellState::Game => Some(LaunchMode::Game),
        }
    }

    pub fn controller(&self) -> Option<Rc<NavigationController>> {
        match &*self.state.borrow() {
            ShellState::Web(controller) => Some(controller.clone()),
            _ => None,
        }
    }

    /// Browser callback entry point; dropped outside web mode
    pub fn handle_event(&self, event: WebViewEvent) {
        match self.controller() {
            Some(controller) => controller.handle_event(event),
            None => log::debug!("Browser event outside web mode: {event:?}"),
        }
    }

    /// Platform back key/gesture
    pub fn handle_back(&self) -> BackAction {
        match self.controller() {
            Some(controller) => controller.handle_back_navigation(),
            None => {
                self.host.app().quit();
                BackAction::Exit
            }
        }
    }

    pub fn on_pause(&self, paused: bool) {
        if let Some(controller) = self.controller() {
            controller.on_pause(paused);
        }
    }

    pub fn on_quit(&self) {
        if let Some(controller) = self.controller() {
            controller.on_quit();
        }
    }

    fn enter_web(&self) {
        let deps = NavigationDeps {
            webview: self.host.create_webview(),
            store: self.store.clone(),
            links: self.links.clone(),
            clock: self.clock.clone(),
            spawner: self.spawner.clone(),
            platform: self.host.platform(),
            app: self.host.app(),
        };
        let controller =
            NavigationController::new(deps, self.settings.clone(), self.host.safe_area());
        *self.state.borrow_mut() = ShellState::Web(controller.clone());
        self.spawner.spawn_local(Box::pin(controller.start()));
    }
}

impl ModeSwitch for Shell {
    fn switch_to(&self, mode: LaunchMode) {
        if !matches!(*self.state.borrow(), ShellState::Booting) {
            log::warn!("Shell already launched, ignoring switch to {mode:?}");
            return;
        }
        log::info!("Entering {mode:?} mode");
        match mode {
            LaunchMode::Web => self.enter_web(),
            LaunchMode::Game => {
                *self.state.borrow_mut() = ShellState::Game;
                self.host.game().enter();
            }
        }
    }
}
