//! Server summary validation, resolution and transport.

mod http;
mod reconciler;

pub use http::HttpSummarySource;
pub use reconciler::{
    ReconcileOutcome, Resolution, ResolveAction, ResolveReason, ServerSyncReconciler,
    reconcile_indicator_count, resolve,
};
