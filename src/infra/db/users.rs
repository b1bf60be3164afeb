use async_trait::async_trait;
use sqlx::{Postgres, QueryBuilder};
use uuid::Uuid;

use crate::application::repos::{RepoError, UserLookup, UsersRepo};
use crate::domain::entities::UserRecord;
use crate::domain::types::RoleName;

use super::{PostgresRepositories, map_sqlx_error};

#[derive(sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    name: String,
    slug: String,
    email: String,
    roles: Vec<String>,
}

impl From<UserRow> for UserRecord {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            slug: row.slug,
            email: row.email,
            roles: row
                .roles
                .iter()
                .filter_map(|role| role.parse::<RoleName>().ok())
                .collect(),
        }
    }
}

#[async_trait]
impl UsersRepo for PostgresRepositories {
    async fn find_user(&self, lookup: &UserLookup) -> Result<Option<UserRecord>, RepoError> {
        let mut qb = QueryBuilder::<Postgres>::new(
            "SELECT u.id, u.name, u.slug, u.email, \
             COALESCE(array_agg(r.name) FILTER (WHERE r.name IS NOT NULL), '{}') AS roles \
             FROM users u \
             LEFT JOIN roles_users ru ON ru.user_id = u.id \
             LEFT JOIN roles r ON r.id = ru.role_id \
             WHERE ",
        );
        match lookup {
            UserLookup::Id(id) => {
                qb.push("u.id = ");
                qb.push_bind(*id);
            }
            UserLookup::Email(email) => {
                qb.push("LOWER(u.email) = LOWER(");
                qb.push_bind(email.clone());
                qb.push(")");
            }
            UserLookup::Slug(slug) => {
                qb.push("u.slug = ");
                qb.push_bind(slug.clone());
            }
        }
        qb.push(" GROUP BY u.id");

        let row: Option<UserRow> = qb
            .build_query_as()
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(row.map(UserRecord::from))
    }
}
