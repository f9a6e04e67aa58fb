//! etcd-backed config store.
//!
//! Key schema under a configurable root:
//!
//! ```text
//! <root>/hosts/<host>                      host marker (value unused)
//! <root>/hosts/<host>/locations/<loc>      JSON {"path": ..., "upstream": ...}
//! <root>/upstreams/<up>/endpoints/<ep>     endpoint URL string
//! ```
//!
//! PUT and DELETE events on those prefixes translate into typed
//! changes. Keys and values that do not fit the schema are logged and
//! skipped; only a lost connection or a closed stream is fatal.

use std::collections::BTreeMap;

use async_trait::async_trait;
use etcd_client::{Client, Event, EventType, GetOptions, WatchOptions};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::model::{EndpointSpec, HostSpec, LocationSpec, UpstreamSpec};
use crate::reconcile::{Action, Change};

use super::{ConfigStore, StoreError};

/// Payload stored under a location key.
#[derive(Debug, Serialize, Deserialize)]
struct LocationValue {
    path: String,
    upstream: String,
}

/// A store key classified against the schema.
#[derive(Debug, PartialEq, Eq)]
enum StoreKey<'a> {
    Host(&'a str),
    Location { host: &'a str, location: &'a str },
    Endpoint { upstream: &'a str, endpoint: &'a str },
}

/// Classifies `key` relative to `root`. Keys outside the schema yield
/// `None`.
fn parse_key<'a>(root: &str, key: &'a str) -> Option<StoreKey<'a>> {
    let rest = key.strip_prefix(root)?.strip_prefix('/')?;
    if let Some(rest) = rest.strip_prefix("hosts/") {
        return match rest.split_once("/locations/") {
            Some((host, location)) if !host.is_empty() && !location.is_empty() => {
                Some(StoreKey::Location { host, location })
            }
            Some(_) => None,
            None if !rest.is_empty() && !rest.contains('/') => Some(StoreKey::Host(rest)),
            None => None,
        };
    }
    if let Some(rest) = rest.strip_prefix("upstreams/") {
        return match rest.split_once("/endpoints/") {
            Some((upstream, endpoint)) if !upstream.is_empty() && !endpoint.is_empty() => {
                Some(StoreKey::Endpoint { upstream, endpoint })
            }
            _ => None,
        };
    }
    None
}

/// Assembles a snapshot from raw `(key, value)` pairs.
fn snapshot_from_pairs(root: &str, pairs: &[(String, String)]) -> Vec<HostSpec> {
    let mut hosts: BTreeMap<&str, Vec<(&str, LocationValue)>> = BTreeMap::new();
    let mut endpoints: BTreeMap<&str, Vec<EndpointSpec>> = BTreeMap::new();

    for (key, value) in pairs {
        match parse_key(root, key) {
            Some(StoreKey::Host(host)) => {
                hosts.entry(host).or_default();
            }
            Some(StoreKey::Location { host, location }) => match serde_json::from_str(value) {
                Ok(parsed) => hosts.entry(host).or_default().push((location, parsed)),
                Err(error) => {
                    tracing::warn!(%key, %error, "skipping malformed location value");
                }
            },
            Some(StoreKey::Endpoint { upstream, endpoint }) => {
                endpoints.entry(upstream).or_default().push(EndpointSpec {
                    name: endpoint.to_string(),
                    url: value.clone(),
                });
            }
            None => {
                tracing::warn!(%key, "skipping key outside the store schema");
            }
        }
    }

    hosts
        .into_iter()
        .map(|(host, locations)| HostSpec {
            name: host.to_string(),
            locations: locations
                .into_iter()
                .map(|(name, value)| LocationSpec {
                    name: name.to_string(),
                    path: value.path,
                    upstream: UpstreamSpec {
                        name: value.upstream.clone(),
                        endpoints: endpoints.get(value.upstream.as_str()).cloned().unwrap_or_default(),
                    },
                })
                .collect(),
        })
        .collect()
}

/// Config store backed by an etcd cluster.
pub struct EtcdStore {
    client: Client,
    root: String,
}

impl EtcdStore {
    pub async fn connect(endpoints: &[String], root: &str) -> Result<Self, StoreError> {
        let client = Client::connect(endpoints, None).await?;
        Ok(Self {
            client,
            root: root.trim_end_matches('/').to_string(),
        })
    }

    fn endpoints_prefix(&self, upstream: &str) -> String {
        format!("{}/upstreams/{}/endpoints/", self.root, upstream)
    }

    /// Point read of an upstream's current endpoints, used when a
    /// location PUT arrives (parents precede children, so the upstream
    /// is already in the store).
    async fn upstream_endpoints(
        &self,
        client: &mut Client,
        upstream: &str,
    ) -> Result<Vec<EndpointSpec>, StoreError> {
        let prefix = self.endpoints_prefix(upstream);
        let resp = client
            .get(prefix.as_str(), Some(GetOptions::new().with_prefix()))
            .await?;

        let mut out = Vec::new();
        for kv in resp.kvs() {
            let key = kv.key_str()?;
            match parse_key(&self.root, key) {
                Some(StoreKey::Endpoint { endpoint, .. }) => out.push(EndpointSpec {
                    name: endpoint.to_string(),
                    url: kv.value_str()?.to_string(),
                }),
                _ => tracing::warn!(%key, "unexpected key under endpoints prefix"),
            }
        }
        Ok(out)
    }

    async fn change_for_event(
        &self,
        client: &mut Client,
        event: &Event,
    ) -> Result<Option<Change>, StoreError> {
        let Some(kv) = event.kv() else {
            return Ok(None);
        };
        let key = kv.key_str()?.to_string();
        let action = match event.event_type() {
            EventType::Put => Action::Create,
            EventType::Delete => Action::Delete,
        };

        let change = match parse_key(&self.root, &key) {
            Some(StoreKey::Host(host)) => Some(Change::host(action, HostSpec::named(host))),
            Some(StoreKey::Location { host, location }) => {
                let host = HostSpec::named(host);
                let location = match action {
                    Action::Create => {
                        let value: LocationValue =
                            serde_json::from_str(kv.value_str()?).map_err(|e| StoreError::Malformed {
                                key: key.clone(),
                                reason: e.to_string(),
                            })?;
                        let endpoints = self.upstream_endpoints(client, &value.upstream).await?;
                        LocationSpec {
                            name: location.to_string(),
                            path: value.path,
                            upstream: UpstreamSpec {
                                name: value.upstream,
                                endpoints,
                            },
                        }
                    }
                    // Deletion is by name; recover path and upstream
                    // from the prior value when the store sends it.
                    Action::Delete => {
                        let prior: Option<LocationValue> = event
                            .prev_kv()
                            .and_then(|prev| prev.value_str().ok())
                            .and_then(|raw| serde_json::from_str(raw).ok());
                        let (path, upstream) = prior
                            .map(|v| (v.path, v.upstream))
                            .unwrap_or_default();
                        LocationSpec {
                            name: location.to_string(),
                            path,
                            upstream: UpstreamSpec::named(upstream),
                        }
                    }
                };
                Some(Change::location(action, host, location))
            }
            Some(StoreKey::Endpoint { upstream, endpoint }) => {
                let url = match action {
                    Action::Create => kv.value_str()?.to_string(),
                    // Identity-only removal: no URL needed.
                    Action::Delete => String::new(),
                };
                Some(Change::endpoint(
                    action,
                    UpstreamSpec::named(upstream),
                    EndpointSpec {
                        name: endpoint.to_string(),
                        url,
                    },
                ))
            }
            None => {
                tracing::warn!(%key, "ignoring event outside the store schema");
                None
            }
        };
        Ok(change)
    }
}

#[async_trait]
impl ConfigStore for EtcdStore {
    async fn snapshot(&self) -> Result<Vec<HostSpec>, StoreError> {
        let mut client = self.client.clone();
        let prefix = format!("{}/", self.root);
        let resp = client
            .get(prefix.as_str(), Some(GetOptions::new().with_prefix()))
            .await?;

        let mut pairs = Vec::with_capacity(resp.kvs().len());
        for kv in resp.kvs() {
            pairs.push((kv.key_str()?.to_string(), kv.value_str()?.to_string()));
        }
        Ok(snapshot_from_pairs(&self.root, &pairs))
    }

    async fn watch(&self, tx: mpsc::Sender<Change>) -> Result<(), StoreError> {
        let mut client = self.client.clone();
        let prefix = format!("{}/", self.root);
        let (_watcher, mut stream) = client
            .watch(
                prefix.as_str(),
                Some(WatchOptions::new().with_prefix().with_prev_key()),
            )
            .await?;
        tracing::info!(root = %self.root, "watching store for changes");

        while let Some(resp) = stream.message().await? {
            for event in resp.events() {
                match self.change_for_event(&mut client, event).await {
                    Ok(Some(change)) => {
                        if tx.send(change).await.is_err() {
                            return Err(StoreError::StreamClosed);
                        }
                    }
                    Ok(None) => {}
                    Err(StoreError::Malformed { key, reason }) => {
                        tracing::warn!(%key, %reason, "dropping malformed change");
                    }
                    Err(fatal) => return Err(fatal),
                }
            }
        }
        Err(StoreError::StreamClosed)
    }
}
