#[derive(Clone)]
struct AppState {
    inner: std::sync::Arc<Mutex<ServerInner>>,
}

impl AppState {
    fn new(session: SessionApi) -> Self {
        Self {
            inner: std::sync::Arc::new(Mutex::new(ServerInner { session })),
        }
    }
}

#[derive(Debug)]
struct ServerInner {
    session: SessionApi,
}

fn open_session(
    config: BlacklistConfig,
    sqlite_path: Option<PathBuf>,
) -> Result<SessionApi, ServerError> {
    crate::validate_config(&config).map_err(ServerError::InvalidConfig)?;

    let Some(path) = sqlite_path else {
        return Ok(SessionApi::from_config(config));
    };

    match SessionApi::load_from_sqlite(&path, &config.session_id) {
        Ok((session, _summary)) => Ok(session),
        Err(PersistenceError::SessionNotFound(_)) => {
            let mut session = SessionApi::from_config(config);
            session.attach_sqlite_store(&path)?;
            Ok(session)
        }
        Err(err) => Err(err.into()),
    }
}
