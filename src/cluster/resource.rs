use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::tree::TreeNode;

// ============================================================================
// Wire Types
// ============================================================================

/// Object metadata as returned by the cluster API.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ObjectMeta {
    pub name: String,
    pub namespace: Option<String>,
    pub uid: Option<String>,
    pub resource_version: Option<String>,
    pub creation_timestamp: Option<DateTime<Utc>>,
    pub labels: BTreeMap<String, String>,
}

/// A single cluster object. Everything outside `metadata` stays untyped.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Resource {
    pub api_version: Option<String>,
    pub kind: Option<String>,
    pub metadata: ObjectMeta,
    #[serde(flatten)]
    pub rest: serde_json::Map<String, serde_json::Value>,
}

/// List envelope (`{"kind": "PodList", "items": [...]}`).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ResourceList {
    pub items: Vec<Resource>,
    pub metadata: ListMeta,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ListMeta {
    pub resource_version: Option<String>,
}

// ============================================================================
// Resource Kinds
// ============================================================================

/// A browsable resource type and where to list/watch it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourceKind {
    /// Short plural name used in config (`"pods"`).
    pub name: &'static str,
    /// Display name for the category node.
    pub display: &'static str,
    /// Singular kind as reported by the API.
    pub kind: &'static str,
    /// Collection path across all namespaces.
    pub path: &'static str,
    pub namespaced: bool,
}

pub const KNOWN_KINDS: &[ResourceKind] = &[
    ResourceKind {
        name: "namespaces",
        display: "Namespaces",
        kind: "Namespace",
        path: "/api/v1/namespaces",
        namespaced: false,
    },
    ResourceKind {
        name: "nodes",
        display: "Nodes",
        kind: "Node",
        path: "/api/v1/nodes",
        namespaced: false,
    },
    ResourceKind {
        name: "pods",
        display: "Pods",
        kind: "Pod",
        path: "/api/v1/pods",
        namespaced: true,
    },
    ResourceKind {
        name: "services",
        display: "Services",
        kind: "Service",
        path: "/api/v1/services",
        namespaced: true,
    },
    ResourceKind {
        name: "configmaps",
        display: "Config Maps",
        kind: "ConfigMap",
        path: "/api/v1/configmaps",
        namespaced: true,
    },
    ResourceKind {
        name: "deployments",
        display: "Deployments",
        kind: "Deployment",
        path: "/apis/apps/v1/deployments",
        namespaced: true,
    },
    ResourceKind {
        name: "statefulsets",
        display: "Stateful Sets",
        kind: "StatefulSet",
        path: "/apis/apps/v1/statefulsets",
        namespaced: true,
    },
    ResourceKind {
        name: "jobs",
        display: "Jobs",
        kind: "Job",
        path: "/apis/batch/v1/jobs",
        namespaced: true,
    },
];

impl ResourceKind {
    pub fn lookup(name: &str) -> Option<&'static ResourceKind> {
        let name = name.trim().to_lowercase();
        KNOWN_KINDS.iter().find(|k| k.name == name)
    }

    /// Collection path, optionally scoped to one namespace.
    pub fn path_in(&self, namespace: Option<&str>) -> String {
        match namespace {
            Some(ns) if self.namespaced => {
                // "/api/v1/pods" -> "/api/v1/namespaces/{ns}/pods"
                let (prefix, plural) = self.path.rsplit_once('/').unwrap_or(("", self.path));
                format!("{}/namespaces/{}/{}", prefix, ns, plural)
            }
            _ => self.path.to_string(),
        }
    }
}

// ============================================================================
// Tree Nodes
// ============================================================================

/// What a [`ResourceNode`] stands for.
#[derive(Debug, Clone, PartialEq)]
pub enum NodePayload {
    Category(&'static ResourceKind),
    Object {
        kind: &'static ResourceKind,
        resource: Box<Resource>,
    },
}

/// Tree node for the cluster browser.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceNode {
    pub id: String,
    pub label: String,
    pub description: Option<String>,
    pub tooltip: Option<String>,
    pub payload: NodePayload,
}

impl ResourceNode {
    pub fn category(kind: &'static ResourceKind) -> Self {
        Self {
            id: format!("category/{}", kind.name),
            label: kind.display.to_string(),
            description: None,
            tooltip: Some(format!("All {} in the cluster", kind.display.to_lowercase())),
            payload: NodePayload::Category(kind),
        }
    }

    /// Build an object node. The id depends only on kind, namespace and name,
    /// so repeated fetches of the same object agree on identity.
    pub fn object(kind: &'static ResourceKind, resource: Resource, now: DateTime<Utc>) -> Self {
        let meta = &resource.metadata;
        let id = object_id(kind, meta.namespace.as_deref(), &meta.name);

        let age = meta.creation_timestamp.map(|ts| format_age(now, ts));
        let description = match (meta.namespace.as_deref(), age) {
            (Some(ns), Some(age)) => Some(format!("{} · {}", ns, age)),
            (Some(ns), None) => Some(ns.to_string()),
            (None, Some(age)) => Some(age),
            (None, None) => None,
        };
        let tooltip = match meta.namespace.as_deref() {
            Some(ns) => format!("{} {}/{}", kind.kind, ns, meta.name),
            None => format!("{} {}", kind.kind, meta.name),
        };

        Self {
            id,
            label: meta.name.clone(),
            description,
            tooltip: Some(tooltip),
            payload: NodePayload::Object {
                kind,
                resource: Box::new(resource),
            },
        }
    }

    pub fn kind(&self) -> &'static ResourceKind {
        match &self.payload {
            NodePayload::Category(kind) => kind,
            NodePayload::Object { kind, .. } => kind,
        }
    }

    pub fn is_category(&self) -> bool {
        matches!(self.payload, NodePayload::Category(_))
    }
}

impl TreeNode for ResourceNode {
    fn id(&self) -> &str {
        &self.id
    }

    fn label(&self) -> Option<&str> {
        Some(&self.label)
    }

    fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    fn tooltip(&self) -> Option<&str> {
        self.tooltip.as_deref()
    }

    fn tag(&self) -> &str {
        match &self.payload {
            NodePayload::Category(_) => "category",
            NodePayload::Object { kind, .. } => kind.name,
        }
    }
}

pub fn object_id(kind: &ResourceKind, namespace: Option<&str>, name: &str) -> String {
    match namespace {
        Some(ns) => format!("{}/{}/{}", kind.name, ns, name),
        None => format!("{}/{}", kind.name, name),
    }
}

/// Compact age in the largest sensible unit (`45s`, `12m`, `3h`, `7d`).
pub fn format_age(now: DateTime<Utc>, created: DateTime<Utc>) -> String {
    let secs = now.signed_duration_since(created).num_seconds().max(0);
    match secs {
        s if s < 60 => format!("{}s", s),
        s if s < 3_600 => format!("{}m", s / 60),
        s if s < 86_400 => format!("{}h", s / 3_600),
        s => format!("{}d", s / 86_400),
    }
}
