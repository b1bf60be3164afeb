use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::{Postgres, QueryBuilder, Transaction};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::application::repos::{
    PostLookup, PostPage, PostPageQuery, PostWrite, PostsRepo, RepoError, TagInput,
};
use crate::domain::entities::{AuthorRef, PostRecord, TagRef};
use crate::domain::posts::{FilterClause, FilterField, PostFilter, PostOrder};
use crate::domain::slug::derive_slug;
use crate::domain::types::{PostStatus, PostVisibility, RoleName};

use super::{PostgresRepositories, map_sqlx_error};

const POST_COLUMNS: &str = "p.id, p.uuid, p.slug, p.title, p.html, p.plaintext, p.lexical, \
    p.mobiledoc, p.status, p.visibility, p.featured, p.custom_excerpt, p.feature_image, \
    p.newsletter, p.email_segment, p.published_at, p.created_at, p.updated_at";

#[derive(sqlx::FromRow)]
struct PostRow {
    id: Uuid,
    uuid: Uuid,
    slug: String,
    title: String,
    html: Option<String>,
    plaintext: Option<String>,
    lexical: Option<String>,
    mobiledoc: Option<String>,
    status: PostStatus,
    visibility: PostVisibility,
    featured: bool,
    custom_excerpt: Option<String>,
    feature_image: Option<String>,
    newsletter: Option<String>,
    email_segment: Option<String>,
    published_at: Option<OffsetDateTime>,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl PostRow {
    fn into_record(self, tags: Vec<TagRef>, authors: Vec<AuthorRef>) -> PostRecord {
        PostRecord {
            id: self.id,
            uuid: self.uuid,
            slug: self.slug,
            title: self.title,
            html: self.html,
            plaintext: self.plaintext,
            lexical: self.lexical,
            mobiledoc: self.mobiledoc,
            status: self.status,
            visibility: self.visibility,
            featured: self.featured,
            custom_excerpt: self.custom_excerpt,
            feature_image: self.feature_image,
            newsletter: self.newsletter,
            email_segment: self.email_segment,
            published_at: self.published_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
            tags,
            authors,
        }
    }
}

#[derive(sqlx::FromRow)]
struct PostTagRow {
    post_id: Uuid,
    id: Uuid,
    slug: String,
    name: String,
}

#[derive(sqlx::FromRow)]
struct PostAuthorRow {
    post_id: Uuid,
    id: Uuid,
    slug: String,
    name: String,
    email: String,
    roles: Vec<String>,
}

#[derive(sqlx::FromRow)]
struct TagRow {
    id: Uuid,
    slug: String,
    name: String,
}

impl From<TagRow> for TagRef {
    fn from(row: TagRow) -> Self {
        Self {
            id: row.id,
            slug: row.slug,
            name: row.name,
        }
    }
}

impl PostgresRepositories {
    fn push_filter(qb: &mut QueryBuilder<'_, Postgres>, filter: &PostFilter) {
        for clause in &filter.clauses {
            qb.push(" AND ");
            if clause.negated {
                qb.push("NOT ");
            }
            qb.push("(");
            Self::push_clause(qb, clause);
            qb.push(")");
        }
    }

    fn push_clause(qb: &mut QueryBuilder<'_, Postgres>, clause: &FilterClause) {
        let values = clause.values.clone();
        match clause.field {
            FilterField::Status => {
                qb.push("p.status::text = ANY(");
                qb.push_bind(values);
                qb.push(")");
            }
            FilterField::Visibility => {
                qb.push("p.visibility::text = ANY(");
                qb.push_bind(values);
                qb.push(")");
            }
            FilterField::Featured => {
                let flags: Vec<bool> = values.iter().filter_map(|v| v.parse().ok()).collect();
                qb.push("p.featured = ANY(");
                qb.push_bind(flags);
                qb.push(")");
            }
            FilterField::Tag => {
                qb.push(
                    "EXISTS (SELECT 1 FROM posts_tags pt INNER JOIN tags t ON t.id = pt.tag_id \
                     WHERE pt.post_id = p.id AND t.slug = ANY(",
                );
                qb.push_bind(values);
                qb.push("))");
            }
            FilterField::Author => {
                qb.push(
                    "EXISTS (SELECT 1 FROM posts_authors pa INNER JOIN users u ON u.id = pa.author_id \
                     WHERE pa.post_id = p.id AND u.slug = ANY(",
                );
                qb.push_bind(values);
                qb.push("))");
            }
            FilterField::Slug => {
                qb.push("p.slug = ANY(");
                qb.push_bind(values);
                qb.push(")");
            }
            FilterField::Id => {
                let ids: Vec<Uuid> = values
                    .iter()
                    .filter_map(|v| Uuid::parse_str(v).ok())
                    .collect();
                qb.push("p.id = ANY(");
                qb.push_bind(ids);
                qb.push(")");
            }
        }
    }

    fn push_order(qb: &mut QueryBuilder<'_, Postgres>, order: &PostOrder) {
        qb.push(" ORDER BY ");
        for clause in &order.clauses {
            qb.push("p.");
            qb.push(clause.field.column());
            qb.push(if clause.descending { " DESC, " } else { " ASC, " });
        }
        qb.push("p.id ASC");
    }

    async fn attach_relations(&self, rows: Vec<PostRow>) -> Result<Vec<PostRecord>, RepoError> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<Uuid> = rows.iter().map(|row| row.id).collect();

        let tag_rows = sqlx::query_as::<_, PostTagRow>(
            r#"
            SELECT pt.post_id, t.id, t.slug, t.name
            FROM posts_tags pt
            INNER JOIN tags t ON t.id = pt.tag_id
            WHERE pt.post_id = ANY($1)
            ORDER BY pt.post_id, pt.sort_order
            "#,
        )
        .bind(&ids)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        let author_rows = sqlx::query_as::<_, PostAuthorRow>(
            r#"
            SELECT pa.post_id, u.id, u.slug, u.name, u.email,
                   COALESCE(array_agg(r.name) FILTER (WHERE r.name IS NOT NULL), '{}') AS roles
            FROM posts_authors pa
            INNER JOIN users u ON u.id = pa.author_id
            LEFT JOIN roles_users ru ON ru.user_id = u.id
            LEFT JOIN roles r ON r.id = ru.role_id
            WHERE pa.post_id = ANY($1)
            GROUP BY pa.post_id, pa.sort_order, u.id
            ORDER BY pa.post_id, pa.sort_order
            "#,
        )
        .bind(&ids)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        let mut tags: HashMap<Uuid, Vec<TagRef>> = HashMap::new();
        for row in tag_rows {
            tags.entry(row.post_id).or_default().push(TagRef {
                id: row.id,
                slug: row.slug,
                name: row.name,
            });
        }

        let mut authors: HashMap<Uuid, Vec<AuthorRef>> = HashMap::new();
        for row in author_rows {
            authors.entry(row.post_id).or_default().push(AuthorRef {
                id: row.id,
                slug: row.slug,
                name: row.name,
                email: row.email,
                roles: row
                    .roles
                    .iter()
                    .filter_map(|role| role.parse::<RoleName>().ok())
                    .collect(),
            });
        }

        Ok(rows
            .into_iter()
            .map(|row| {
                let id = row.id;
                row.into_record(
                    tags.remove(&id).unwrap_or_default(),
                    authors.remove(&id).unwrap_or_default(),
                )
            })
            .collect())
    }

    async fn write_relations(
        tx: &mut Transaction<'_, Postgres>,
        post_id: Uuid,
        post: &PostWrite,
    ) -> Result<(), RepoError> {
        sqlx::query("DELETE FROM posts_tags WHERE post_id = $1")
            .bind(post_id)
            .execute(&mut **tx)
            .await
            .map_err(map_sqlx_error)?;
        sqlx::query("DELETE FROM posts_authors WHERE post_id = $1")
            .bind(post_id)
            .execute(&mut **tx)
            .await
            .map_err(map_sqlx_error)?;

        for (position, tag_id) in post.tag_ids.iter().enumerate() {
            sqlx::query(
                "INSERT INTO posts_tags (post_id, tag_id, sort_order) VALUES ($1, $2, $3) \
                 ON CONFLICT (post_id, tag_id) DO NOTHING",
            )
            .bind(post_id)
            .bind(tag_id)
            .bind(sort_order(position)?)
            .execute(&mut **tx)
            .await
            .map_err(map_sqlx_error)?;
        }

        for (position, author_id) in post.author_ids.iter().enumerate() {
            sqlx::query(
                "INSERT INTO posts_authors (post_id, author_id, sort_order) VALUES ($1, $2, $3) \
                 ON CONFLICT (post_id, author_id) DO NOTHING",
            )
            .bind(post_id)
            .bind(author_id)
            .bind(sort_order(position)?)
            .execute(&mut **tx)
            .await
            .map_err(map_sqlx_error)?;
        }

        Ok(())
    }

    async fn load_post(&self, id: Uuid) -> Result<PostRecord, RepoError> {
        self.find_one(&PostLookup::Id(id))
            .await?
            .ok_or(RepoError::NotFound)
    }

    async fn upsert_tag(&self, slug: &str, name: &str) -> Result<TagRef, RepoError> {
        let row = sqlx::query_as::<_, TagRow>(
            r#"
            INSERT INTO tags (id, slug, name)
            VALUES ($1, $2, $3)
            ON CONFLICT (slug) DO UPDATE SET slug = EXCLUDED.slug
            RETURNING id, slug, name
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(slug)
        .bind(name)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;
        Ok(row.into())
    }
}

fn sort_order(position: usize) -> Result<i32, RepoError> {
    i32::try_from(position).map_err(|_| RepoError::InvalidInput {
        message: "too many related records".to_string(),
    })
}

fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

#[async_trait]
impl PostsRepo for PostgresRepositories {
    async fn find_page(&self, query: &PostPageQuery) -> Result<PostPage, RepoError> {
        let mut count_qb = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM posts p WHERE TRUE");
        Self::push_filter(&mut count_qb, &query.filter);
        let total = count_qb
            .build_query_scalar::<i64>()
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        let mut qb = QueryBuilder::<Postgres>::new("SELECT ");
        qb.push(POST_COLUMNS);
        qb.push(" FROM posts p WHERE TRUE");
        Self::push_filter(&mut qb, &query.filter);
        Self::push_order(&mut qb, &query.order);

        let (offset, limit) = query.page.window();
        if let Some(limit) = limit {
            qb.push(" LIMIT ");
            qb.push_bind(to_i64(limit));
        }
        qb.push(" OFFSET ");
        qb.push_bind(to_i64(offset));

        let rows: Vec<PostRow> = qb
            .build_query_as()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(PostPage {
            posts: self.attach_relations(rows).await?,
            total: Self::convert_count(total)?,
        })
    }

    async fn find_one(&self, lookup: &PostLookup) -> Result<Option<PostRecord>, RepoError> {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT ");
        qb.push(POST_COLUMNS);
        qb.push(" FROM posts p WHERE ");
        match lookup {
            PostLookup::Id(id) => {
                qb.push("p.id = ");
                qb.push_bind(*id);
            }
            PostLookup::Uuid(uuid) => {
                qb.push("p.uuid = ");
                qb.push_bind(*uuid);
            }
            PostLookup::Slug(slug) => {
                qb.push("p.slug = ");
                qb.push_bind(slug.clone());
            }
        }

        let row: Option<PostRow> = qb
            .build_query_as()
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        match row {
            Some(row) => Ok(self.attach_relations(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn slug_exists(&self, slug: &str, exclude: Option<Uuid>) -> Result<bool, RepoError> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM posts WHERE slug = $1 AND ($2::uuid IS NULL OR id <> $2))",
        )
        .bind(slug)
        .bind(exclude)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)
    }

    async fn insert(&self, post: PostWrite) -> Result<PostRecord, RepoError> {
        let id = Uuid::new_v4();
        let now = OffsetDateTime::now_utc();
        let mut tx = self.begin().await.map_err(map_sqlx_error)?;

        sqlx::query(
            r#"
            INSERT INTO posts (
                id, uuid, slug, title, html, plaintext, lexical, mobiledoc, status, visibility,
                featured, custom_excerpt, feature_image, newsletter, email_segment, published_at,
                created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $17)
            "#,
        )
        .bind(id)
        .bind(Uuid::new_v4())
        .bind(&post.slug)
        .bind(&post.title)
        .bind(&post.html)
        .bind(&post.plaintext)
        .bind(&post.lexical)
        .bind(&post.mobiledoc)
        .bind(post.status)
        .bind(post.visibility)
        .bind(post.featured)
        .bind(&post.custom_excerpt)
        .bind(&post.feature_image)
        .bind(&post.newsletter)
        .bind(&post.email_segment)
        .bind(post.published_at)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        Self::write_relations(&mut tx, id, &post).await?;
        tx.commit().await.map_err(map_sqlx_error)?;

        self.load_post(id).await
    }

    async fn update(&self, id: Uuid, post: PostWrite) -> Result<PostRecord, RepoError> {
        let mut tx = self.begin().await.map_err(map_sqlx_error)?;

        let result = sqlx::query(
            r#"
            UPDATE posts SET
                slug = $2, title = $3, html = $4, plaintext = $5, lexical = $6, mobiledoc = $7,
                status = $8, visibility = $9, featured = $10, custom_excerpt = $11,
                feature_image = $12, newsletter = $13, email_segment = $14, published_at = $15,
                updated_at = $16
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(&post.slug)
        .bind(&post.title)
        .bind(&post.html)
        .bind(&post.plaintext)
        .bind(&post.lexical)
        .bind(&post.mobiledoc)
        .bind(post.status)
        .bind(post.visibility)
        .bind(post.featured)
        .bind(&post.custom_excerpt)
        .bind(&post.feature_image)
        .bind(&post.newsletter)
        .bind(&post.email_segment)
        .bind(post.published_at)
        .bind(OffsetDateTime::now_utc())
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }

        Self::write_relations(&mut tx, id, &post).await?;
        tx.commit().await.map_err(map_sqlx_error)?;

        self.load_post(id).await
    }

    async fn delete(&self, id: Uuid) -> Result<bool, RepoError> {
        let result = sqlx::query("DELETE FROM posts WHERE id = $1")
            .bind(id)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(result.rows_affected() > 0)
    }

    async fn resolve_tags(&self, tags: &[TagInput]) -> Result<Vec<TagRef>, RepoError> {
        let mut resolved = Vec::with_capacity(tags.len());
        for tag in tags {
            let tag = match tag {
                TagInput::Id(id) => sqlx::query_as::<_, TagRow>(
                    "SELECT id, slug, name FROM tags WHERE id = $1",
                )
                .bind(id)
                .fetch_optional(self.pool())
                .await
                .map_err(map_sqlx_error)?
                .map(TagRef::from)
                .ok_or_else(|| RepoError::InvalidInput {
                    message: format!("unknown tag `{id}`"),
                })?,
                TagInput::Slug(slug) => self.upsert_tag(slug, slug).await?,
                TagInput::Name(name) => self.upsert_tag(&derive_slug(name), name).await?,
            };
            if !resolved.iter().any(|existing: &TagRef| existing.id == tag.id) {
                resolved.push(tag);
            }
        }
        Ok(resolved)
    }
}
