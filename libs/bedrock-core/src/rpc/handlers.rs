//! Axum handlers for the Remote Control RPCs (spec §6) plus the
//! `providers/exists` endpoint `LocalEngine` calls during remote dependency
//! resolution (spec §4.3, §4.6 step 4).

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::Json;

use crate::client_manager::ClientDescription;
use crate::provider_manager::ProviderDescription;
use crate::server::Server;

use super::types::{
    AddClientRequest, ChangeProviderPoolRequest, LoadModuleRequest, LookupClientRequest, LookupRequest,
    MigrateProviderRequest, NameRequest, ProviderExistsQuery, ProviderExistsResponse, QueryConfigRequest,
    ResourceConfigRequest, RestoreProviderRequest, RpcEnvelope, SnapshotProviderRequest, StartProviderRequest,
};

fn config_string(config: Option<serde_json::Value>) -> String {
    config.map_or_else(|| "{}".to_owned(), |v| v.to_string())
}

pub async fn get_config(State(server): State<Arc<Server>>) -> Json<RpcEnvelope> {
    Json(RpcEnvelope::from_result(Ok::<_, crate::error::BedrockError>(server.current_config())))
}

pub async fn query_config(State(server): State<Arc<Server>>, Json(req): Json<QueryConfigRequest>) -> Json<RpcEnvelope> {
    Json(RpcEnvelope::from_result(server.query_config(&req.script)))
}

pub async fn load_module(State(server): State<Arc<Server>>, Json(req): Json<LoadModuleRequest>) -> Json<RpcEnvelope> {
    Json(RpcEnvelope::from_result(server.load_module(&req.name, &req.path)))
}

pub async fn start_provider(State(server): State<Arc<Server>>, Json(req): Json<StartProviderRequest>) -> Json<RpcEnvelope> {
    let description = ProviderDescription {
        name: req.name,
        type_tag: req.type_tag,
        provider_id: req.provider_id,
        pool: req.pool,
        tags: req.tags,
        dependencies: req.dependencies,
        config: config_string(req.config),
    };
    Json(RpcEnvelope::from_result(server.start_provider(&description).await))
}

pub async fn change_provider_pool(
    State(server): State<Arc<Server>>,
    Json(req): Json<ChangeProviderPoolRequest>,
) -> Json<RpcEnvelope> {
    Json(RpcEnvelope::from_result(server.change_provider_pool(&req.provider, &req.pool).await))
}

pub async fn add_client(State(server): State<Arc<Server>>, Json(req): Json<AddClientRequest>) -> Json<RpcEnvelope> {
    let description = ClientDescription {
        name: req.name,
        type_tag: req.type_tag,
        tags: req.tags,
        dependencies: req.dependencies,
        config: config_string(req.config),
    };
    Json(RpcEnvelope::from_result(server.add_client(&description).await))
}

pub async fn add_pool(State(server): State<Arc<Server>>, Json(req): Json<ResourceConfigRequest>) -> Json<RpcEnvelope> {
    Json(RpcEnvelope::from_result(server.add_pool(&req.config).map(|d| d.name().to_owned())))
}

pub async fn remove_pool(State(server): State<Arc<Server>>, Json(req): Json<NameRequest>) -> Json<RpcEnvelope> {
    Json(RpcEnvelope::from_result(server.remove_pool(&req.name)))
}

pub async fn add_xstream(State(server): State<Arc<Server>>, Json(req): Json<ResourceConfigRequest>) -> Json<RpcEnvelope> {
    Json(RpcEnvelope::from_result(server.add_xstream(&req.config).map(|d| d.name().to_owned())))
}

pub async fn remove_xstream(State(server): State<Arc<Server>>, Json(req): Json<NameRequest>) -> Json<RpcEnvelope> {
    Json(RpcEnvelope::from_result(server.remove_xstream(&req.name)))
}

pub async fn add_ssg_group(
    State(server): State<Arc<Server>>,
    Json(req): Json<crate::config::SsgGroupConfig>,
) -> Json<RpcEnvelope> {
    Json(RpcEnvelope::from_result(server.add_ssg_group(&req)))
}

pub async fn migrate_provider(
    State(server): State<Arc<Server>>,
    Json(req): Json<MigrateProviderRequest>,
) -> Json<RpcEnvelope> {
    let result = server
        .migrate_provider(
            &req.provider,
            &req.dest_addr,
            req.dest_provider_id,
            &req.migration_config.to_string(),
            req.remove_source,
        )
        .await;
    Json(RpcEnvelope::from_result(result))
}

pub async fn snapshot_provider(
    State(server): State<Arc<Server>>,
    Json(req): Json<SnapshotProviderRequest>,
) -> Json<RpcEnvelope> {
    let result = server
        .snapshot_provider(&req.provider, &req.dest_path, &req.snapshot_config.to_string(), req.remove_source)
        .await;
    Json(RpcEnvelope::from_result(result))
}

pub async fn restore_provider(
    State(server): State<Arc<Server>>,
    Json(req): Json<RestoreProviderRequest>,
) -> Json<RpcEnvelope> {
    let result = server.restore_provider(&req.provider, &req.src_path, &req.restore_config.to_string()).await;
    Json(RpcEnvelope::from_result(result))
}

pub async fn lookup_provider(State(server): State<Arc<Server>>, Json(req): Json<LookupRequest>) -> Json<RpcEnvelope> {
    let result = server.lookup_provider(&req.spec, Duration::from_millis(req.timeout_ms)).await;
    Json(RpcEnvelope::from_result(result))
}

pub async fn list_providers(State(server): State<Arc<Server>>) -> Json<RpcEnvelope> {
    Json(RpcEnvelope::from_result(Ok::<_, crate::error::BedrockError>(server.list_providers())))
}

pub async fn lookup_client(State(server): State<Arc<Server>>, Json(req): Json<LookupClientRequest>) -> Json<RpcEnvelope> {
    let result = server.lookup_client(&req.name, Duration::from_millis(req.timeout_ms)).await;
    Json(RpcEnvelope::from_result(result))
}

pub async fn list_clients(State(server): State<Arc<Server>>) -> Json<RpcEnvelope> {
    Json(RpcEnvelope::from_result(Ok::<_, crate::error::BedrockError>(server.list_clients())))
}

/// Backs the *shutdown* CLI (spec §6): wakes the hosting process's
/// `Server::wait_for_shutdown`, which is what actually runs `finalize` and
/// lets the daemon's main loop exit. Not one of the 16 named RPCs, but
/// required for `waitForFinalize`'s documented "remote-shutdown RPC" trigger
/// (spec §4.9).
pub async fn shutdown(State(server): State<Arc<Server>>) -> Json<RpcEnvelope> {
    server.request_shutdown();
    Json(RpcEnvelope::from_result(Ok::<_, crate::error::BedrockError>(())))
}

pub async fn providers_exists(
    State(server): State<Arc<Server>>,
    Query(query): Query<ProviderExistsQuery>,
) -> Json<ProviderExistsResponse> {
    let found = server
        .provider_exists(&query.type_tag, query.provider_id, Duration::from_millis(query.timeout_ms))
        .await;
    Json(ProviderExistsResponse { found })
}
