//! Delivery trait for mapped upload results.
//!
//! The pipeline never renders anything itself; every successfully mapped
//! collection is handed to a [`LayerSink`] before persistence starts, so a
//! cloud failure can never take back a layer the user already sees.

use std::sync::Arc;

use field_sync_models::UploadEvent;

/// Receives each upload's mapped result, in file order.
pub trait LayerSink: Send + Sync {
    /// Called once per successfully mapped file, before persistence.
    fn layer_ready(&self, event: &UploadEvent);
}

/// A sink that drops every event. For headless callers and tests.
pub struct NullSink;

impl LayerSink for NullSink {
    fn layer_ready(&self, _event: &UploadEvent) {}
}

/// Returns a shared [`NullSink`] instance for convenient use.
#[must_use]
pub fn null_sink() -> Arc<dyn LayerSink> {
    Arc::new(NullSink)
}
