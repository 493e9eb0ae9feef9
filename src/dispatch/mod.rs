/*!
 * Dispatch Module
 * Delivery of finished artifacts to the downstream consumer
 */

pub mod client;
pub mod dispatcher;
pub mod traits;
pub mod types;

// Re-export public API
pub use client::DeliveryClient;
pub use dispatcher::{decode_artifact, DispatcherTask, ResultDispatcher};
pub use traits::ArtifactSink;
pub use types::{DeliveryError, DeliveryResult, DispatchReport};
