#[derive(Debug, Deserialize)]
struct AddBlacklistRequest {
    entity_id: EntityId,
    resource_hash: ResourceHash,
    #[serde(default)]
    reason: Option<String>,
}

#[derive(Debug, Serialize)]
struct AddBlacklistResponse {
    schema_version: String,
    entity_id: EntityId,
    resource_hash: ResourceHash,
    expires_at: Tick,
}

#[derive(Debug, Serialize)]
struct RemoveBlacklistResponse {
    schema_version: String,
    removed: bool,
}

#[derive(Debug, Serialize)]
struct DebugInfoResponse {
    schema_version: String,
    current_tick: Tick,
    text: String,
}

async fn get_blacklist(State(state): State<AppState>) -> Json<BlacklistSnapshot> {
    let inner = state.inner.lock().await;
    Json(inner.session.snapshot())
}

async fn get_blacklist_debug(State(state): State<AppState>) -> Json<DebugInfoResponse> {
    let inner = state.inner.lock().await;
    Json(DebugInfoResponse {
        schema_version: SCHEMA_VERSION_V1.to_string(),
        current_tick: inner.session.current_tick(),
        text: inner.session.debug_info(),
    })
}

async fn add_blacklist(
    State(state): State<AppState>,
    Json(request): Json<AddBlacklistRequest>,
) -> Result<Json<AddBlacklistResponse>, HttpApiError> {
    let reason = request
        .reason
        .filter(|reason| !reason.trim().is_empty())
        .unwrap_or_else(|| "unspecified".to_string());

    let mut inner = state.inner.lock().await;
    let expires_at = inner
        .session
        .blacklist(request.entity_id, request.resource_hash, &reason)?;

    Ok(Json(AddBlacklistResponse {
        schema_version: SCHEMA_VERSION_V1.to_string(),
        entity_id: request.entity_id,
        resource_hash: request.resource_hash,
        expires_at,
    }))
}

async fn remove_blacklist(
    Path((entity_id, resource_hash)): Path<(u64, u64)>,
    State(state): State<AppState>,
) -> Result<Json<RemoveBlacklistResponse>, HttpApiError> {
    let mut inner = state.inner.lock().await;
    let removed = inner
        .session
        .unblacklist(EntityId(entity_id), ResourceHash(resource_hash))?;

    Ok(Json(RemoveBlacklistResponse {
        schema_version: SCHEMA_VERSION_V1.to_string(),
        removed,
    }))
}
