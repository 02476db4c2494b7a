#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Session state and cache reconciliation.
//!
//! [`Session`] owns the state that is scoped to one signed-in (or
//! anonymous) stretch of use: the auth state, the dataset-fingerprint
//! cache, the session-scoped attribute-mapping memory, and the list of
//! layers handed to the display layer. [`Reconciler`] drives the
//! transitions between the local cache scopes and the remote hierarchy at
//! login, logout, and refresh.

pub mod reconcile;

use field_sync_models::{DatasetFingerprint, FieldMapping};
use field_sync_remote::RemoteError;
use field_sync_store::StoreError;

pub use reconcile::{Reconciler, reconstruct_datasets};

/// Errors from session reconciliation.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The operation requires a signed-in session.
    #[error("not signed in")]
    NotAuthenticated,

    /// A remote call failed.
    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// A local cache operation failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Authentication state of the running session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthState {
    /// No signed-in user; uploads persist to the anonymous cache scope.
    Anonymous,
    /// Signed in; uploads persist to the remote hierarchy.
    Authenticated {
        /// The signed-in owner.
        owner_id: String,
    },
}

/// Outcome of the anonymous-to-cloud migration run at login.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoginReport {
    /// Entries ingested remotely and removed locally.
    pub migrated: usize,
    /// Entries that failed to migrate and remain local.
    pub failed: usize,
}

/// Explicit per-session state.
///
/// Holds what would otherwise be ambient globals, so every cache has a
/// visible owner and the lifecycle boundaries (login, logout, successful
/// ingest) are explicit calls rather than side effects.
#[derive(Debug)]
pub struct Session {
    auth: AuthState,
    fingerprints: Option<Vec<DatasetFingerprint>>,
    remembered_mapping: Option<FieldMapping>,
    open_layers: Vec<String>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    /// A fresh anonymous session with empty caches.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            auth: AuthState::Anonymous,
            fingerprints: None,
            remembered_mapping: None,
            open_layers: Vec::new(),
        }
    }

    /// The current auth state.
    #[must_use]
    pub const fn auth(&self) -> &AuthState {
        &self.auth
    }

    /// The signed-in owner id, if any.
    #[must_use]
    pub fn owner_id(&self) -> Option<&str> {
        match &self.auth {
            AuthState::Authenticated { owner_id } => Some(owner_id),
            AuthState::Anonymous => None,
        }
    }

    /// Whether a user is signed in.
    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        matches!(self.auth, AuthState::Authenticated { .. })
    }

    /// Flips to authenticated as `owner_id` and clears every session
    /// cache.
    pub fn set_authenticated(&mut self, owner_id: &str) {
        self.auth = AuthState::Authenticated {
            owner_id: owner_id.to_string(),
        };
        self.reset();
    }

    /// Returns to anonymous and clears every session cache.
    pub fn set_anonymous(&mut self) {
        self.auth = AuthState::Anonymous;
        self.reset();
    }

    /// Clears the fingerprint cache, the mapping memory, and the
    /// open-layer list. Called at every auth boundary.
    pub fn reset(&mut self) {
        self.fingerprints = None;
        self.remembered_mapping = None;
        self.open_layers.clear();
    }

    /// The cached dataset fingerprints, when still valid.
    #[must_use]
    pub fn fingerprints(&self) -> Option<&[DatasetFingerprint]> {
        self.fingerprints.as_deref()
    }

    /// Caches freshly derived fingerprints.
    pub fn set_fingerprints(&mut self, fingerprints: Vec<DatasetFingerprint>) {
        self.fingerprints = Some(fingerprints);
    }

    /// Drops the cached fingerprints. Called after any ingest that creates
    /// or updates a dataset, so the next match never scores against stale
    /// signatures.
    pub fn invalidate_fingerprints(&mut self) {
        self.fingerprints = None;
    }

    /// The session-scoped attribute mapping, when one was confirmed this
    /// session.
    #[must_use]
    pub const fn remembered_mapping(&self) -> Option<&FieldMapping> {
        self.remembered_mapping.as_ref()
    }

    /// Keeps a confirmed mapping for the rest of the session.
    pub fn remember_mapping(&mut self, mapping: FieldMapping) {
        self.remembered_mapping = Some(mapping);
    }

    /// Records a layer name handed to the display layer, once.
    pub fn record_open_layer(&mut self, name: &str) {
        if !self.open_layers.iter().any(|layer| layer == name) {
            self.open_layers.push(name.to_string());
        }
    }

    /// Names of the layers handed to the display layer this session.
    #[must_use]
    pub fn open_layers(&self) -> &[String] {
        &self.open_layers
    }
}
