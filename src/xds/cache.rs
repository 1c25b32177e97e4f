//! Resource cache for a single session.
//!
//! Each category holds an immutable name -> resource map that is swapped in
//! whole on update, so readers always see a complete category.

use super::types::{type_url, DiscoveryRequest, DiscoveryResponse};

use dashmap::DashMap;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

const HTTP_CONNECTION_MANAGERS: [&str; 2] = [
    "envoy.http_connection_manager",
    "envoy.filters.network.http_connection_manager",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    HttpListeners,
    TcpListeners,
    Clusters,
    EdsClusters,
    Routes,
    Endpoints,
}

type Resources = Arc<BTreeMap<String, Value>>;

#[derive(Debug, Default)]
pub struct ResourceCache {
    categories: DashMap<Category, Resources>,
}

impl ResourceCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the category as a JSON object keyed by resource name. Categories
    /// that never received data are returned as an empty object.
    pub fn get(&self, category: Category) -> Value {
        let resources = self
            .categories
            .get(&category)
            .map(|entry| entry.value().clone());

        let mut object = Map::new();
        if let Some(resources) = resources {
            for (name, resource) in resources.iter() {
                object.insert(name.clone(), resource.clone());
            }
        }
        Value::Object(object)
    }

    pub fn len(&self, category: Category) -> usize {
        self.categories
            .get(&category)
            .map(|entry| entry.value().len())
            .unwrap_or(0)
    }

    /// Stores the resources carried by `response` and returns the follow-up
    /// subscriptions they imply (EDS after CDS, RDS after LDS).
    pub fn apply(&self, response: &DiscoveryResponse) -> Vec<DiscoveryRequest> {
        match response.type_url.as_str() {
            type_url::LISTENER => self.apply_listeners(&response.resources),
            type_url::CLUSTER => self.apply_clusters(&response.resources),
            type_url::ROUTE => {
                self.merge(Category::Routes, &response.resources, "name");
                Vec::new()
            }
            type_url::ENDPOINT => {
                self.merge(Category::Endpoints, &response.resources, "cluster_name");
                Vec::new()
            }
            other => {
                tracing::debug!("Ignoring resources of unknown type {}", other);
                Vec::new()
            }
        }
    }

    fn apply_listeners(&self, resources: &[Value]) -> Vec<DiscoveryRequest> {
        let mut http = BTreeMap::new();
        let mut tcp = BTreeMap::new();
        let mut route_names = Vec::new();

        for listener in resources {
            let Some(name) = resource_name(listener, "name") else {
                continue;
            };

            let managers = http_connection_managers(listener);
            if managers.is_empty() {
                tcp.insert(name, listener.clone());
                continue;
            }

            for manager in managers {
                if let Some(route) = rds_route_name(manager) {
                    if !route_names.contains(&route) {
                        route_names.push(route);
                    }
                }
            }
            http.insert(name, listener.clone());
        }

        self.categories.insert(Category::HttpListeners, Arc::new(http));
        self.categories.insert(Category::TcpListeners, Arc::new(tcp));

        if route_names.is_empty() {
            Vec::new()
        } else {
            vec![DiscoveryRequest::subscribe_to(type_url::ROUTE, route_names)]
        }
    }

    fn apply_clusters(&self, resources: &[Value]) -> Vec<DiscoveryRequest> {
        let mut clusters = BTreeMap::new();
        let mut eds = BTreeMap::new();

        for cluster in resources {
            let Some(name) = resource_name(cluster, "name") else {
                continue;
            };

            if is_eds_cluster(cluster) {
                eds.insert(name.clone(), cluster.clone());
            }
            clusters.insert(name, cluster.clone());
        }

        let eds_names: Vec<String> = eds.keys().cloned().collect();

        self.categories.insert(Category::Clusters, Arc::new(clusters));
        self.categories.insert(Category::EdsClusters, Arc::new(eds));

        if eds_names.is_empty() {
            Vec::new()
        } else {
            vec![DiscoveryRequest::subscribe_to(type_url::ENDPOINT, eds_names)]
        }
    }

    /// RDS and EDS responses only carry the requested names, so they are
    /// merged into what is already cached.
    fn merge(&self, category: Category, resources: &[Value], key: &str) {
        let mut merged: BTreeMap<String, Value> = self
            .categories
            .get(&category)
            .map(|entry| entry.value().as_ref().clone())
            .unwrap_or_default();

        for resource in resources {
            if let Some(name) = resource_name(resource, key) {
                merged.insert(name, resource.clone());
            }
        }

        self.categories.insert(category, Arc::new(merged));
    }
}

fn resource_name(resource: &Value, key: &str) -> Option<String> {
    match resource.get(key).and_then(Value::as_str) {
        Some(name) if !name.is_empty() => Some(name.to_string()),
        _ => {
            tracing::warn!("Skipping resource without a '{}' field", key);
            None
        }
    }
}

fn http_connection_managers(listener: &Value) -> Vec<&Value> {
    let Some(chains) = listener.get("filter_chains").and_then(Value::as_array) else {
        return Vec::new();
    };

    chains
        .iter()
        .filter_map(|chain| chain.get("filters").and_then(Value::as_array))
        .flatten()
        .filter(|filter| {
            filter
                .get("name")
                .and_then(Value::as_str)
                .map(|name| HTTP_CONNECTION_MANAGERS.contains(&name))
                .unwrap_or(false)
        })
        .collect()
}

fn rds_route_name(manager: &Value) -> Option<String> {
    ["typed_config", "config"]
        .iter()
        .filter_map(|field| manager.get(*field))
        .find_map(|config| {
            config
                .pointer("/rds/route_config_name")
                .and_then(Value::as_str)
                .map(str::to_string)
        })
}

fn is_eds_cluster(cluster: &Value) -> bool {
    cluster.get("type").and_then(Value::as_str) == Some("EDS")
}
