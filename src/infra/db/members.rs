use async_trait::async_trait;

use crate::application::repos::{MembersRepo, RepoError};

use super::{PostgresRepositories, map_sqlx_error};

#[async_trait]
impl MembersRepo for PostgresRepositories {
    async fn count_paid(&self) -> Result<u64, RepoError> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM members WHERE status = 'paid'",
        )
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Self::convert_count(count)
    }
}
