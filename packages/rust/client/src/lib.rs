//! Backend API boundary.
//!
//! [`Backend`] is the seam the pipeline talks through: [`HttpBackend`] speaks
//! the REST API, tests substitute an in-memory implementation.

mod http;
pub mod types;

use async_trait::async_trait;

use annodemo_shared::{AnnotationId, ResourceId, Result};

pub use http::HttpBackend;
pub use types::{BodyItem, BodyOperation, Event, Motivation, NewAnnotation, NewResource, Selector};

/// Operations the pipeline needs from the annotation backend.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Upload a document and return its id.
    async fn create_resource(&self, resource: NewResource) -> Result<ResourceId>;

    /// Create an annotation on a resource.
    async fn create_annotation(&self, annotation: NewAnnotation) -> Result<AnnotationId>;

    /// Apply body operations to an existing annotation.
    async fn update_annotation_body(
        &self,
        resource: &ResourceId,
        annotation: &AnnotationId,
        operations: Vec<BodyOperation>,
    ) -> Result<()>;

    /// Event history of a resource, in the order the backend returns it.
    async fn get_events(&self, resource: &ResourceId) -> Result<Vec<Event>>;
}
