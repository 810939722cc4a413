use sqlx::Row;

use bridal_core::domain::preferences::WidgetPreferences;
use bridal_core::domain::user::UserId;

use super::{format_timestamp, parse_timestamp, PreferenceRepository, RepositoryError};
use crate::DbPool;

pub struct SqlPreferenceRepository {
    pool: DbPool,
}

impl SqlPreferenceRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl PreferenceRepository for SqlPreferenceRepository {
    async fn widgets(
        &self,
        user_id: &UserId,
    ) -> Result<Option<WidgetPreferences>, RepositoryError> {
        let row = sqlx::query("SELECT widgets, updated_at FROM user_preference WHERE user_id = ?")
            .bind(&user_id.0)
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let widgets: String =
            row.try_get("widgets").map_err(|e| RepositoryError::Decode(e.to_string()))?;
        let updated_at: String =
            row.try_get("updated_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

        Ok(Some(WidgetPreferences {
            user_id: user_id.clone(),
            widgets: serde_json::from_str(&widgets)
                .map_err(|e| RepositoryError::Decode(e.to_string()))?,
            updated_at: Some(parse_timestamp(&updated_at)?),
        }))
    }

    async fn save_widgets(&self, preferences: WidgetPreferences) -> Result<(), RepositoryError> {
        let widgets = serde_json::to_string(&preferences.widgets)
            .map_err(|e| RepositoryError::Decode(e.to_string()))?;
        let updated_at = format_timestamp(preferences.updated_at.unwrap_or_else(chrono::Utc::now));

        sqlx::query(
            "INSERT INTO user_preference (user_id, widgets, updated_at)
             VALUES (?, ?, ?)
             ON CONFLICT(user_id) DO UPDATE SET
                 widgets = excluded.widgets,
                 updated_at = excluded.updated_at",
        )
        .bind(&preferences.user_id.0)
        .bind(widgets)
        .bind(updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
