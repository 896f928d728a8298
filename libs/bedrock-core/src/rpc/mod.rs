//! Remote Control surface (spec §6): an axum [`router`] exposing every named
//! RPC plus the engine-to-engine provider-existence check, and a [`client`]
//! module the query/shutdown CLIs use to talk to it.

pub mod client;
mod handlers;
pub mod types;

pub use types::RpcEnvelope;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;

use crate::server::Server;

/// Build the Remote Control router for a bootstrapped [`Server`].
///
/// Route names follow spec §6's RPC names directly; the only GET route is
/// `/bedrock/v1/providers/exists`, which backs [`crate::engine::LocalEngine`]'s
/// remote existence check.
#[must_use]
pub fn router(server: Arc<Server>) -> Router {
    Router::new()
        .route("/bedrock/v1/config", get(handlers::get_config))
        .route("/bedrock/v1/config/query", post(handlers::query_config))
        .route("/bedrock/v1/modules", post(handlers::load_module))
        .route("/bedrock/v1/providers", post(handlers::start_provider))
        .route("/bedrock/v1/providers/pool", post(handlers::change_provider_pool))
        .route("/bedrock/v1/providers/migrate", post(handlers::migrate_provider))
        .route("/bedrock/v1/providers/snapshot", post(handlers::snapshot_provider))
        .route("/bedrock/v1/providers/restore", post(handlers::restore_provider))
        .route("/bedrock/v1/providers/lookup", post(handlers::lookup_provider))
        .route("/bedrock/v1/providers/list", get(handlers::list_providers))
        .route("/bedrock/v1/providers/exists", get(handlers::providers_exists))
        .route("/bedrock/v1/clients", post(handlers::add_client))
        .route("/bedrock/v1/clients/lookup", post(handlers::lookup_client))
        .route("/bedrock/v1/clients/list", get(handlers::list_clients))
        .route("/bedrock/v1/pools", post(handlers::add_pool))
        .route("/bedrock/v1/pools/remove", post(handlers::remove_pool))
        .route("/bedrock/v1/xstreams", post(handlers::add_xstream))
        .route("/bedrock/v1/xstreams/remove", post(handlers::remove_xstream))
        .route("/bedrock/v1/ssg", post(handlers::add_ssg_group))
        .route("/bedrock/v1/shutdown", post(handlers::shutdown))
        .with_state(server)
}
