#[derive(Debug, Deserialize, Default)]
struct StepRequest {
    steps: Option<u64>,
}

async fn get_status(State(state): State<AppState>) -> Json<SessionStatus> {
    let inner = state.inner.lock().await;
    Json(inner.session.status())
}

async fn step_session(
    State(state): State<AppState>,
    request: Option<Json<StepRequest>>,
) -> Result<Json<StepReport>, HttpApiError> {
    let request = request.map(|Json(body)| body).unwrap_or_default();
    let steps = validate_steps(request.steps)?;

    let mut inner = state.inner.lock().await;
    let report = inner.session.step(steps);
    if let Some(last_error) = inner.session.last_persistence_error() {
        tracing::warn!(error = last_error, "step completed without persisting");
    }
    Ok(Json(report))
}

async fn save_session(
    State(state): State<AppState>,
) -> Result<Json<SessionStatus>, HttpApiError> {
    let mut inner = state.inner.lock().await;
    inner
        .session
        .save()
        .map_err(HttpApiError::from_persistence)?;
    Ok(Json(inner.session.status()))
}
