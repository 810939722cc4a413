use axum::{extract::State, Json};
use chrono::Utc;
use serde::Deserialize;
use tracing::info;

use bridal_core::domain::preferences::{sanitize_widgets, WidgetPreferences};

use crate::auth::SessionUser;
use crate::error::{db_error, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct WidgetsRequest {
    pub widgets: Vec<String>,
}

pub async fn get_widgets(
    State(state): State<AppState>,
    caller: SessionUser,
) -> ApiResult<Json<WidgetPreferences>> {
    let saved = state
        .preferences
        .widgets(&caller.user.id)
        .await
        .map_err(|error| db_error(error, &caller.correlation_id))?;

    Ok(Json(saved.unwrap_or_else(|| WidgetPreferences::defaults_for(caller.user.id.clone()))))
}

pub async fn put_widgets(
    State(state): State<AppState>,
    caller: SessionUser,
    Json(request): Json<WidgetsRequest>,
) -> ApiResult<Json<WidgetPreferences>> {
    let preferences = WidgetPreferences {
        user_id: caller.user.id.clone(),
        widgets: sanitize_widgets(request.widgets),
        updated_at: Some(Utc::now()),
    };

    state
        .preferences
        .save_widgets(preferences.clone())
        .await
        .map_err(|error| db_error(error, &caller.correlation_id))?;
    info!(
        event_name = "preferences.widgets.saved",
        correlation_id = %caller.correlation_id,
        user_id = %caller.user.id,
        widget_count = preferences.widgets.len(),
        "widget preferences saved"
    );

    Ok(Json(preferences))
}
