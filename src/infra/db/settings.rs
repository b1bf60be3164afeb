use async_trait::async_trait;
use serde_json::Value;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::application::repos::{RepoError, SettingUpdate, SettingsRepo};
use crate::domain::entities::SettingRecord;
use crate::domain::types::{SettingGroup, SettingType};

use super::{PostgresRepositories, map_sqlx_error};

const SETTING_COLUMNS: &str =
    r#"id, "group", key, value, type AS value_type, created_at, updated_at"#;

#[derive(sqlx::FromRow)]
struct SettingRow {
    id: Uuid,
    group: SettingGroup,
    key: String,
    value: Option<Value>,
    value_type: SettingType,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl From<SettingRow> for SettingRecord {
    fn from(row: SettingRow) -> Self {
        Self {
            id: row.id,
            group: row.group,
            key: row.key,
            value: row.value.unwrap_or(Value::Null),
            value_type: row.value_type,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// JSON `null` is stored as SQL `NULL`.
fn stored_value(value: &Value) -> Option<Value> {
    (!value.is_null()).then(|| value.clone())
}

#[async_trait]
impl SettingsRepo for PostgresRepositories {
    async fn list(&self) -> Result<Vec<SettingRecord>, RepoError> {
        let rows = sqlx::query_as::<_, SettingRow>(&format!(
            "SELECT {SETTING_COLUMNS} FROM settings ORDER BY key"
        ))
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(SettingRecord::from).collect())
    }

    async fn find(&self, key: &str) -> Result<Option<SettingRecord>, RepoError> {
        let row = sqlx::query_as::<_, SettingRow>(&format!(
            "SELECT {SETTING_COLUMNS} FROM settings WHERE key = $1"
        ))
        .bind(key)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(SettingRecord::from))
    }

    async fn edit_batch(&self, updates: &[SettingUpdate]) -> Result<Vec<SettingRecord>, RepoError> {
        let mut tx = self.begin().await.map_err(map_sqlx_error)?;
        let mut changed: Vec<SettingRecord> = Vec::new();
        let now = OffsetDateTime::now_utc();

        for update in updates {
            let current = sqlx::query_as::<_, SettingRow>(&format!(
                "SELECT {SETTING_COLUMNS} FROM settings WHERE key = $1 FOR UPDATE"
            ))
            .bind(&update.key)
            .fetch_optional(&mut *tx)
            .await
            .map_err(map_sqlx_error)?
            .ok_or(RepoError::NotFound)?;

            if current.value.unwrap_or(Value::Null) == update.value {
                continue;
            }

            let row = sqlx::query_as::<_, SettingRow>(&format!(
                "UPDATE settings SET value = $2, updated_at = $3 WHERE key = $1 \
                 RETURNING {SETTING_COLUMNS}"
            ))
            .bind(&update.key)
            .bind(stored_value(&update.value))
            .bind(now)
            .fetch_one(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

            let record = SettingRecord::from(row);
            changed.retain(|existing| existing.key != record.key);
            changed.push(record);
        }

        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(changed)
    }
}
