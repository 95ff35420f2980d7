//! HTTP front for the simulated GPU configuration backend.

pub mod catalog;
pub mod handlers;
pub mod state;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use vigil_repo::http::paths;

use crate::handlers::{
    apply_config, config_status, detect_gpus, get_config, healthz, list_gpus, list_services,
    preview, put_config, require_token,
};
use crate::state::AppState;

/// Routes mirror the paths `HttpConfigRepository` calls.
pub fn app(st: AppState) -> Router {
    let api = Router::new()
        .route(paths::GPUS, get(list_gpus))
        .route(paths::GPUS_DETECT, post(detect_gpus))
        .route(paths::SERVICES, get(list_services))
        .route(paths::CONFIG, get(get_config).put(put_config))
        .route(paths::CONFIG_STATUS, get(config_status))
        .route(paths::CONFIG_APPLY, post(apply_config))
        .route(paths::CONFIG_PREVIEW, get(preview))
        .layer(middleware::from_fn_with_state(st.clone(), require_token))
        .with_state(st);

    Router::new().route("/healthz", get(healthz)).merge(api)
}
