//! Remote link document fetch
//!
//! The remote store holds one URL string per app. Reads come in two
//! consistency tiers: `Cache` answers from local state without waiting on the
//! network, `Server` round-trips and is bounded by the caller's budget.
//! Every failure collapses to "no candidate" for the caller.

use std::rc::Rc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::consts::{
    DEFAULT_LINK_FIELD, LEGACY_COLLECTION, LEGACY_DOCUMENT, LEGACY_FIELD, LINKS_COLLECTION,
};
use crate::platform::{Clock, Deadline, with_deadline};
use crate::policy::UrlPolicy;

pub mod firestore;

pub use firestore::{DocumentTransport, FirestoreResolver, SnapshotCache};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Consistency {
    /// Local snapshot only; fails fast with `NotFound` when nothing is cached
    Cache,
    /// Network round trip
    Server,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("link document or field not found")]
    NotFound,
    #[error("link fetch timed out")]
    Timeout,
    #[error("link fetch failed: {0}")]
    Transport(String),
}

/// A document location and the string field holding the URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkSource {
    pub collection: String,
    pub document: String,
    pub field: String,
}

impl LinkSource {
    pub fn new(
        collection: impl Into<String>,
        document: impl Into<String>,
        field: impl Into<String>,
    ) -> Self {
        Self {
            collection: collection.into(),
            document: document.into(),
            field: field.into(),
        }
    }

    /// `links/{app_id}` with the given field
    pub fn links(app_id: &str, field: &str) -> Self {
        Self::new(LINKS_COLLECTION, app_id, field)
    }

    pub fn links_default(app_id: &str) -> Self {
        Self::links(app_id, DEFAULT_LINK_FIELD)
    }

    /// `config/webview.url`
    pub fn legacy() -> Self {
        Self::new(LEGACY_COLLECTION, LEGACY_DOCUMENT, LEGACY_FIELD)
    }

    pub fn path(&self) -> String {
        format!("{}/{}", self.collection, self.document)
    }
}

impl std::fmt::Display for LinkSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}.{}", self.collection, self.document, self.field)
    }
}

#[async_trait(?Send)]
pub trait LinkResolver {
    /// Fetch the raw URL string. Implementations need not enforce a timeout;
    /// [`RemoteLinks`] bounds every call.
    async fn fetch(&self, consistency: Consistency) -> Result<String, FetchError>;
}

/// Fixed answer for both tiers (native demo, hosts without a remote store)
#[derive(Debug, Clone, Default)]
pub struct StaticResolver {
    url: Option<String>,
}

impl StaticResolver {
    pub fn new(url: Option<String>) -> Self {
        Self { url }
    }
}

#[async_trait(?Send)]
impl LinkResolver for StaticResolver {
    async fn fetch(&self, _consistency: Consistency) -> Result<String, FetchError> {
        self.url.clone().ok_or(FetchError::NotFound)
    }
}

/// Resolver plus the clock that bounds it
#[derive(Clone)]
pub struct RemoteLinks {
    resolver: Rc<dyn LinkResolver>,
    clock: Rc<dyn Clock>,
}

impl RemoteLinks {
    pub fn new(resolver: Rc<dyn LinkResolver>, clock: Rc<dyn Clock>) -> Self {
        Self { resolver, clock }
    }

    /// Fetch bounded by `timeout`; an overrun resolves to `Timeout`
    pub async fn fetch(
        &self,
        consistency: Consistency,
        timeout: Duration,
    ) -> Result<String, FetchError> {
        let deadline = Deadline::start(&*self.clock, timeout);
        with_deadline(&*self.clock, &deadline, self.resolver.fetch(consistency))
            .await
            .unwrap_or(Err(FetchError::Timeout))
    }

    /// Fetch and validate; every failure reads as `None`
    pub async fn fetch_valid(
        &self,
        consistency: Consistency,
        timeout: Duration,
        policy: UrlPolicy,
    ) -> Option<String> {
        match self.fetch(consistency, timeout).await {
            Ok(url) if policy.is_valid(&url) => Some(url),
            Ok(url) => {
                log::warn!("Remote {consistency:?} link rejected by policy: {url:?}");
                None
            }
            Err(err) => {
                log::info!("Remote {consistency:?} link unavailable: {err}");
                None
            }
        }
    }
}
