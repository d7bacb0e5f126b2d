use chrono::Utc;
use futures::future::BoxFuture;

use super::client::ClusterClient;
use super::error::ClientError;
use super::resource::{NodePayload, ResourceKind, ResourceNode};
use crate::tree::TreeDataSource;

/// Cluster browser tree: one category per configured kind at the top level,
/// the live objects of that kind underneath.
#[derive(Debug, Clone)]
pub struct ClusterTree {
    client: ClusterClient,
    kinds: Vec<&'static ResourceKind>,
}

impl ClusterTree {
    pub fn new(client: ClusterClient, kinds: Vec<&'static ResourceKind>) -> Self {
        Self { client, kinds }
    }

    pub fn client(&self) -> &ClusterClient {
        &self.client
    }

    pub fn kinds(&self) -> &[&'static ResourceKind] {
        &self.kinds
    }

    async fn objects(&self, kind: &'static ResourceKind) -> Result<Vec<ResourceNode>, ClientError> {
        let list = self.client.list(kind, None).await?;
        let now = Utc::now();
        let mut nodes: Vec<ResourceNode> = list
            .items
            .into_iter()
            .map(|resource| ResourceNode::object(kind, resource, now))
            .collect();
        sort_objects(&mut nodes);
        Ok(nodes)
    }
}

/// Namespace first (cluster-scoped objects lead), then name.
fn sort_objects(nodes: &mut [ResourceNode]) {
    nodes.sort_by_cached_key(|node| {
        let namespace = match &node.payload {
            NodePayload::Object { resource, .. } => resource.metadata.namespace.clone(),
            NodePayload::Category(_) => None,
        };
        (namespace.unwrap_or_default(), node.label.clone())
    });
}

impl TreeDataSource<ResourceNode> for ClusterTree {
    type Error = ClientError;

    fn children<'a>(
        &'a self,
        parent: Option<&'a ResourceNode>,
    ) -> BoxFuture<'a, Result<Vec<ResourceNode>, ClientError>> {
        Box::pin(async move {
            match parent {
                None => Ok(self.kinds.iter().map(|&k| ResourceNode::category(k)).collect()),
                Some(node) if node.is_category() => self.objects(node.kind()).await,
                // Objects are leaves
                Some(_) => Ok(Vec::new()),
            }
        })
    }

    /// Categories always stay visible so a filter never hides the way back in.
    fn filterable(&self, parent: Option<&ResourceNode>) -> bool {
        parent.is_some()
    }

    fn error_message(&self, error: &ClientError) -> String {
        error.user_message()
    }
}
