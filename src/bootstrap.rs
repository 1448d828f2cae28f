//! Launch decision: web mode or game mode
//!
//! Stages run in strict order and stop at the first success:
//!
//! ```text
//! CheckUnlocked -> CheckCachedLocal -> CheckRemoteCache -> CheckRemoteServer -> Decide
//! ```
//!
//! Only `CheckRemoteServer` waits on the network, bounded by the fetch
//! timeout. Every web outcome reached before it schedules a silent refresh of
//! `start` that never gates the switch.

use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

use crate::consts::CACHE_TIER_BUDGET;
use crate::persistence::PersistentUrlStore;
use crate::platform::Spawner;
use crate::policy::UrlPolicy;
use crate::remote::{Consistency, RemoteLinks};
use crate::settings::ShellSettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchMode {
    /// Full-screen embedded browser
    Web,
    /// Fallback mini-game
    Game,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootStage {
    CheckUnlocked,
    CheckCachedLocal,
    CheckRemoteCache,
    CheckRemoteServer,
    Decide,
}

/// Outcome of one decider run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootDecision {
    pub mode: LaunchMode,
    /// Stage that produced the outcome
    pub stage: BootStage,
    /// URL that justified web mode, if any
    pub url: Option<String>,
}

impl BootDecision {
    fn web(stage: BootStage, url: Option<String>) -> Self {
        Self {
            mode: LaunchMode::Web,
            stage,
            url,
        }
    }

    fn game() -> Self {
        Self {
            mode: LaunchMode::Game,
            stage: BootStage::Decide,
            url: None,
        }
    }
}

/// Receiver of the final mode switch
pub trait ModeSwitch {
    fn switch_to(&self, mode: LaunchMode);
}

/// Lets exactly one mode switch through
#[derive(Debug, Default)]
pub struct ModeLatch {
    applied: Cell<Option<LaunchMode>>,
}

impl ModeLatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forward `mode` unless a switch already happened. True if forwarded.
    pub fn apply(&self, mode: LaunchMode, target: &dyn ModeSwitch) -> bool {
        if let Some(previous) = self.applied.get() {
            log::warn!("Mode already switched to {previous:?}, ignoring {mode:?}");
            return false;
        }
        self.applied.set(Some(mode));
        target.switch_to(mode);
        true
    }

    pub fn applied(&self) -> Option<LaunchMode> {
        self.applied.get()
    }
}

/// Which tiers a silent refresh consults
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Refresh {
    CacheThenServer,
    ServerOnly,
}

enum Transition {
    Next(BootStage),
    Done(BootDecision, Option<Refresh>),
}

pub struct BootstrapDecider {
    store: PersistentUrlStore,
    links: RemoteLinks,
    spawner: Rc<dyn Spawner>,
    policy: UrlPolicy,
    try_cached_first: bool,
    fetch_timeout: Duration,
    background_timeout: Duration,
    latch: ModeLatch,
}

impl BootstrapDecider {
    pub fn new(
        store: PersistentUrlStore,
        links: RemoteLinks,
        spawner: Rc<dyn Spawner>,
        settings: &ShellSettings,
    ) -> Self {
        Self {
            store,
            links,
            spawner,
            policy: settings.url_policy(),
            try_cached_first: settings.try_cached_first,
            fetch_timeout: settings.fetch_timeout(),
            background_timeout: settings.background_timeout(),
            latch: ModeLatch::new(),
        }
    }

    pub fn latch(&self) -> &ModeLatch {
        &self.latch
    }

    /// Decide, then switch `target` into the chosen mode (at most once per decider)
    pub async fn run(&self, target: &dyn ModeSwitch) -> BootDecision {
        let decision = self.decide().await;
        self.latch.apply(decision.mode, target);
        decision
    }

    /// Walk the stages without switching modes
    pub async fn decide(&self) -> BootDecision {
        let mut stage = BootStage::CheckUnlocked;
        loop {
            match self.step(stage).await {
                Transition::Next(next) => {
                    log::debug!("Boot {stage:?} -> {next:?}");
                    stage = next;
                }
                Transition::Done(decision, refresh) => {
                    log::info!(
                        "Boot decided {:?} at {:?} ({})",
                        decision.mode,
                        decision.stage,
                        decision.url.as_deref().unwrap_or("no url")
                    );
                    if let Some(refresh) = refresh {
                        self.spawn_refresh(refresh);
                    }
                    return decision;
                }
            }
        }
    }

    async fn step(&self, stage: BootStage) -> Transition {
        match stage {
            BootStage::CheckUnlocked => {
                if self.store.is_unlocked() {
                    let url = self.valid_start();
                    Transition::Done(
                        BootDecision::web(stage, url),
                        Some(Refresh::CacheThenServer),
                    )
                } else {
                    Transition::Next(BootStage::CheckCachedLocal)
                }
            }
            BootStage::CheckCachedLocal => match self.valid_start() {
                Some(url) if self.try_cached_first => Transition::Done(
                    BootDecision::web(stage, Some(url)),
                    Some(Refresh::CacheThenServer),
                ),
                _ => Transition::Next(BootStage::CheckRemoteCache),
            },
            BootStage::CheckRemoteCache => {
                match self
                    .links
                    .fetch_valid(Consistency::Cache, CACHE_TIER_BUDGET, self.policy)
                    .await
                {
                    Some(url) => {
                        self.store.set_start(&url);
                        Transition::Done(
                            BootDecision::web(stage, Some(url)),
                            Some(Refresh::ServerOnly),
                        )
                    }
                    None => Transition::Next(BootStage::CheckRemoteServer),
                }
            }
            BootStage::CheckRemoteServer => {
                match self
                    .links
                    .fetch_valid(Consistency::Server, self.fetch_timeout, self.policy)
                    .await
                {
                    Some(url) => {
                        self.store.set_start(&url);
                        Transition::Done(BootDecision::web(stage, Some(url)), None)
                    }
                    None => Transition::Next(BootStage::Decide),
                }
            }
            BootStage::Decide => match self.valid_start() {
                Some(url) => {
                    log::info!("Remote link unavailable, using stale start URL");
                    Transition::Done(BootDecision::web(stage, Some(url)), None)
                }
                None => Transition::Done(BootDecision::game(), None),
            },
        }
    }

    fn valid_start(&self) -> Option<String> {
        self.store.start().filter(|url| self.policy.is_valid(url))
    }

    fn spawn_refresh(&self, refresh: Refresh) {
        let tiers: &[Consistency] = match refresh {
            Refresh::CacheThenServer => &[Consistency::Cache, Consistency::Server],
            Refresh::ServerOnly => &[Consistency::Server],
        };
        self.spawner.spawn_local(Box::pin(refresh_start(
            self.store.clone(),
            self.links.clone(),
            self.policy,
            tiers.to_vec(),
            self.background_timeout,
        )));
    }
}

/// Silent `start` refresh. Writes only `start`; never switches modes.
async fn refresh_start(
    store: PersistentUrlStore,
    links: RemoteLinks,
    policy: UrlPolicy,
    tiers: Vec<Consistency>,
    background_timeout: Duration,
) {
    for tier in tiers {
        let budget = match tier {
            Consistency::Cache => CACHE_TIER_BUDGET,
            Consistency::Server => background_timeout,
        };
        if let Some(url) = links.fetch_valid(tier, budget, policy).await {
            log::info!("Background refresh ({tier:?}) updated start URL");
            store.set_start(&url);
        }
    }
}
