#[derive(Debug, Deserialize)]
struct LabelRequest {
    label: String,
}

async fn spawn_entity(
    State(state): State<AppState>,
    Json(request): Json<LabelRequest>,
) -> Result<Json<EntityRef>, HttpApiError> {
    let label = require_label(&request.label, "label")?;
    let mut inner = state.inner.lock().await;
    Ok(Json(inner.session.spawn_entity(label)))
}

async fn kill_entity(
    Path(entity_id): Path<u64>,
    State(state): State<AppState>,
) -> Result<Json<RosterEntry>, HttpApiError> {
    let mut inner = state.inner.lock().await;
    let entry = inner.session.kill_entity(EntityId(entity_id))?;
    Ok(Json(entry))
}

async fn define_resource(
    State(state): State<AppState>,
    Json(request): Json<LabelRequest>,
) -> Result<Json<ResourceDef>, HttpApiError> {
    let label = require_label(&request.label, "label")?;
    let mut inner = state.inner.lock().await;
    Ok(Json(inner.session.define_resource(label)))
}
