use time::OffsetDateTime;
use uuid::Uuid;

use crate::application::repos::{ApiKeysRepo, CreateApiKeyParams, RepoError};
use crate::domain::api_keys::{ApiKeyRecord, ApiKeyStatus};

use super::{PostgresRepositories, map_sqlx_error};

const API_KEY_COLUMNS: &str =
    "id, integration_id, name, prefix, hashed_secret, status, expires_at, last_used_at, created_at";

#[derive(Debug, sqlx::FromRow)]
struct ApiKeyRow {
    id: Uuid,
    integration_id: Uuid,
    name: String,
    prefix: String,
    hashed_secret: Vec<u8>,
    status: ApiKeyStatus,
    expires_at: Option<OffsetDateTime>,
    last_used_at: Option<OffsetDateTime>,
    created_at: OffsetDateTime,
}

impl From<ApiKeyRow> for ApiKeyRecord {
    fn from(row: ApiKeyRow) -> Self {
        ApiKeyRecord {
            id: row.id,
            integration_id: row.integration_id,
            name: row.name,
            prefix: row.prefix,
            hashed_secret: row.hashed_secret,
            status: row.status,
            expires_at: row.expires_at,
            last_used_at: row.last_used_at,
            created_at: row.created_at,
        }
    }
}

#[async_trait::async_trait]
impl ApiKeysRepo for PostgresRepositories {
    async fn create_key(&self, params: CreateApiKeyParams) -> Result<ApiKeyRecord, RepoError> {
        let mut tx = self.begin().await.map_err(map_sqlx_error)?;

        sqlx::query(
            "INSERT INTO integrations (id, name) VALUES ($1, $2) ON CONFLICT (id) DO NOTHING",
        )
        .bind(params.integration_id)
        .bind(&params.name)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        let row = sqlx::query_as::<_, ApiKeyRow>(&format!(
            "INSERT INTO api_keys (id, integration_id, name, prefix, hashed_secret, status, expires_at, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             RETURNING {API_KEY_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(params.integration_id)
        .bind(&params.name)
        .bind(&params.prefix)
        .bind(&params.hashed_secret)
        .bind(ApiKeyStatus::Active)
        .bind(params.expires_at)
        .bind(OffsetDateTime::now_utc())
        .fetch_one(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(row.into())
    }

    async fn find_by_prefix(&self, prefix: &str) -> Result<Option<ApiKeyRecord>, RepoError> {
        let row = sqlx::query_as::<_, ApiKeyRow>(&format!(
            "SELECT {API_KEY_COLUMNS} FROM api_keys WHERE prefix = $1"
        ))
        .bind(prefix)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(ApiKeyRecord::from))
    }

    async fn update_last_used(&self, id: Uuid, when: OffsetDateTime) -> Result<(), RepoError> {
        sqlx::query("UPDATE api_keys SET last_used_at = $2 WHERE id = $1")
            .bind(id)
            .bind(when)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }
}
