//! Firestore REST link resolver
//!
//! Documents are read over the REST API (`fields.<name>.stringValue`).
//! Every successful server read is kept as a local snapshot; the `Cache` tier
//! answers from that snapshot without touching the network.
//!
//! Sources are consulted in order (primary `links/{app-id}` first, then the
//! legacy `config/webview`); the first one that yields a value wins.

use std::rc::Rc;

use async_trait::async_trait;
use serde_json::Value;

use super::{Consistency, FetchError, LinkResolver, LinkSource};
use crate::persistence::KeyValueStore;

const REST_ROOT: &str = "https://firestore.googleapis.com/v1";
const SNAPSHOT_KEY_PREFIX: &str = "hoop_shell_doc:";

/// HTTP GET of a document body. `Ok(None)` means the document does not exist.
#[async_trait(?Send)]
pub trait DocumentTransport {
    async fn get_document(&self, url: &str) -> Result<Option<String>, FetchError>;
}

/// REST URL of a document
pub fn document_url(project: &str, source: &LinkSource, api_key: Option<&str>) -> String {
    let mut url = format!(
        "{REST_ROOT}/projects/{project}/databases/(default)/documents/{}",
        source.path()
    );
    if let Some(key) = api_key.filter(|k| !k.is_empty()) {
        url.push_str("?key=");
        url.push_str(key);
    }
    url
}

/// Pull a string field out of a REST document body
pub fn decode_string_field(body: &str, field: &str) -> Result<String, FetchError> {
    let doc: Value = serde_json::from_str(body)
        .map_err(|err| FetchError::Transport(format!("malformed document: {err}")))?;
    doc.get("fields")
        .and_then(|fields| fields.get(field))
        .and_then(|value| value.get("stringValue"))
        .and_then(Value::as_str)
        .map(str::to_owned)
        .ok_or(FetchError::NotFound)
}

/// Local snapshots of fetched documents
#[derive(Clone)]
pub struct SnapshotCache {
    store: Rc<dyn KeyValueStore>,
}

impl SnapshotCache {
    pub fn new(store: Rc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    fn key(source: &LinkSource) -> String {
        format!("{SNAPSHOT_KEY_PREFIX}{}", source.path())
    }

    pub fn load(&self, source: &LinkSource) -> Option<String> {
        self.store.get(&Self::key(source))
    }

    pub fn save(&self, source: &LinkSource, body: &str) {
        self.store.set(&Self::key(source), body);
    }
}

pub struct FirestoreResolver<T: DocumentTransport> {
    project: String,
    api_key: Option<String>,
    sources: Vec<LinkSource>,
    transport: T,
    cache: SnapshotCache,
}

impl<T: DocumentTransport> FirestoreResolver<T> {
    pub fn new(
        project: impl Into<String>,
        api_key: Option<String>,
        sources: Vec<LinkSource>,
        transport: T,
        cache: SnapshotCache,
    ) -> Self {
        Self {
            project: project.into(),
            api_key,
            sources,
            transport,
            cache,
        }
    }

    fn from_cache(&self) -> Result<String, FetchError> {
        for source in &self.sources {
            let Some(body) = self.cache.load(source) else {
                continue;
            };
            match decode_string_field(&body, &source.field) {
                Ok(url) => return Ok(url),
                Err(err) => log::debug!("Cached {source} unusable: {err}"),
            }
        }
        Err(FetchError::NotFound)
    }

    async fn from_server(&self) -> Result<String, FetchError> {
        let mut failure = FetchError::NotFound;
        for source in &self.sources {
            let url = document_url(&self.project, source, self.api_key.as_deref());
            match self.transport.get_document(&url).await {
                Ok(Some(body)) => {
                    self.cache.save(source, &body);
                    match decode_string_field(&body, &source.field) {
                        Ok(value) => return Ok(value),
                        Err(err) => {
                            log::debug!("{source}: {err}");
                            if err != FetchError::NotFound {
                                failure = err;
                            }
                        }
                    }
                }
                Ok(None) => log::debug!("{source}: document missing"),
                Err(err) => {
                    log::warn!("{source}: {err}");
                    failure = err;
                }
            }
        }
        Err(failure)
    }
}

#[async_trait(?Send)]
impl<T: DocumentTransport> LinkResolver for FirestoreResolver<T> {
    async fn fetch(&self, consistency: Consistency) -> Result<String, FetchError> {
        match consistency {
            Consistency::Cache => self.from_cache(),
            Consistency::Server => self.from_server().await,
        }
    }
}
