//! `/v1/watch`: the core computes and exposes the per-fetch content
//! fingerprint (`FetchResult::content_fingerprint`) that change-tracking
//! depends on, but the watcher itself — persistent snapshots, diffing,
//! scheduling — is an external collaborator (section 1, section 6
//! "Persisted state"), so both routes here are stubs.

use axum::response::Response;

use super::not_implemented;

pub async fn check() -> Response {
    not_implemented("watch")
}

pub async fn create() -> Response {
    not_implemented("watch")
}
