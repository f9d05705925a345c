//! Host seam for batch entities.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

use gtdflow_core::{EntityContext, EntityKey, MergeAnchor, RegionMarkers, Result};
use gtdflow_inference::Schema;

/// Host collaborator that knows how to describe and render one kind of entity.
///
/// The scheduler owns retries, caching and merging; a handler only turns keys
/// into contexts and validated outputs into region text.
#[async_trait]
pub trait EntityHandler: Send + Sync + 'static {
    /// Validated model output for one entity.
    type Output: Serialize + DeserializeOwned + Clone + Send + Sync + 'static;

    /// Schema the model response must satisfy.
    fn schema(&self) -> &Schema<Self::Output>;

    /// Build the context (document, digest fields, prompts) for an entity.
    async fn load(&self, key: &EntityKey) -> Result<EntityContext>;

    /// Render a validated output as the managed region's content.
    fn render(&self, key: &EntityKey, output: &Self::Output) -> String;

    /// Region the rendered output is merged into.
    fn markers(&self) -> RegionMarkers {
        RegionMarkers::managed()
    }

    /// Where the region goes when a document does not have it yet.
    fn anchor(&self) -> MergeAnchor {
        MergeAnchor::End
    }
}
