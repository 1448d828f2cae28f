//! Hybrid back-navigation
//!
//! The browser's native "can go back" only sees full navigations. Single-page
//! apps move with `pushState`/`replaceState`, so native history under-reports
//! how far back the user has travelled. The reconciler fuses native history
//! with the page-reported `history.length` and a "user has moved" flag.

use std::str::FromStr;

use thiserror::Error;

/// Message posted by the instrumentation script
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeMessage {
    /// `hist:<currentLength>:<initLen>`
    History { current: u32, initial: u32 },
    /// `loc:<href>`
    Location(String),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MessageParseError {
    #[error("unknown bridge message")]
    Unknown,
    #[error("malformed history lengths in {0:?}")]
    BadLengths(String),
}

impl FromStr for BridgeMessage {
    type Err = MessageParseError;

    fn from_str(msg: &str) -> Result<Self, Self::Err> {
        if let Some(rest) = msg.strip_prefix("hist:") {
            let (current, initial) = rest
                .split_once(':')
                .ok_or_else(|| MessageParseError::BadLengths(msg.to_owned()))?;
            let current = current
                .trim()
                .parse()
                .map_err(|_| MessageParseError::BadLengths(msg.to_owned()))?;
            let initial = initial
                .trim()
                .parse()
                .map_err(|_| MessageParseError::BadLengths(msg.to_owned()))?;
            return Ok(BridgeMessage::History { current, initial });
        }
        if let Some(href) = msg.strip_prefix("loc:") {
            return Ok(BridgeMessage::Location(href.to_owned()));
        }
        Err(MessageParseError::Unknown)
    }
}

/// What a back trigger should do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackAction {
    /// Browser-level back over full navigations
    NativeBack,
    /// `history.back()` inside the page
    PageBack,
    /// Nothing left to go back to
    Exit,
}

/// Per-browser navigation state; created with the browser, dropped with it
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NavigationSession {
    pub initial_loaded_url: Option<String>,
    pub user_has_interacted: bool,
    /// `None` until the instrumentation reports
    pub spa_history_initial_length: Option<u32>,
    pub spa_history_current_length: Option<u32>,
}

#[derive(Debug, Clone, Default)]
pub struct HistoryReconciler {
    session: NavigationSession,
}

impl HistoryReconciler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn session(&self) -> &NavigationSession {
        &self.session
    }

    /// A completed load or a reported location change
    pub fn observe_location(&mut self, url: &str) {
        match &self.session.initial_loaded_url {
            None => self.session.initial_loaded_url = Some(url.to_owned()),
            Some(initial) if initial != url => {
                if !self.session.user_has_interacted {
                    log::debug!("User moved away from {initial}");
                }
                self.session.user_has_interacted = true;
            }
            Some(_) => {}
        }
    }

    pub fn observe_history(&mut self, current: u32, initial: u32) {
        self.session.spa_history_current_length = Some(current);
        self.session.spa_history_initial_length = Some(initial);
    }

    pub fn apply(&mut self, message: &BridgeMessage) {
        match message {
            BridgeMessage::History { current, initial } => self.observe_history(*current, *initial),
            BridgeMessage::Location(href) => self.observe_location(href),
        }
    }

    /// Parse and apply a raw bridge string. Unknown or malformed input is ignored.
    pub fn handle_message(&mut self, raw: &str) -> Option<BridgeMessage> {
        match raw.parse::<BridgeMessage>() {
            Ok(message) => {
                log::debug!("Bridge message: {message:?}");
                self.apply(&message);
                Some(message)
            }
            Err(err) => {
                log::debug!("Ignoring bridge message {raw:?}: {err}");
                None
            }
        }
    }

    /// History grew since this page loaded (false until reported)
    pub fn spa_history_grew(&self) -> bool {
        match (
            self.session.spa_history_current_length,
            self.session.spa_history_initial_length,
        ) {
            (Some(current), Some(initial)) => current > initial,
            _ => false,
        }
    }

    /// Decide against the state as of the latest load/message; never mutates.
    ///
    /// 1. native history available -> native back
    /// 2. SPA history grew, or the user has moved -> in-page back
    /// 3. otherwise -> exit
    pub fn decide(&self, native_can_go_back: bool) -> BackAction {
        if native_can_go_back {
            BackAction::NativeBack
        } else if self.spa_history_grew() || self.session.user_has_interacted {
            BackAction::PageBack
        } else {
            BackAction::Exit
        }
    }
}
