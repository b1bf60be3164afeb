//! Slug generation for post URLs.
//!
//! Slugs are derived with the `slug` crate. Uniqueness is decided by a
//! caller-supplied async predicate so the logic stays independent of storage.

use std::future::Future;

use slug::slugify;
use thiserror::Error;

const MAX_SUFFIX_ATTEMPTS: usize = 32;

/// Slug used when the source text has nothing slugifiable in it.
pub const FALLBACK_SLUG: &str = "untitled";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SlugError {
    #[error("exhausted attempts to find a unique slug for `{base}`")]
    Exhausted { base: String },
}

#[derive(Debug, Error)]
pub enum SlugAsyncError<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    #[error(transparent)]
    Slug(#[from] SlugError),
    #[error(transparent)]
    Predicate(E),
}

/// Derive a base slug from human-readable text, falling back to
/// [`FALLBACK_SLUG`] for empty or unrepresentable input.
pub fn derive_slug(input: &str) -> String {
    let candidate = slugify(input.trim());
    if candidate.is_empty() {
        FALLBACK_SLUG.to_string()
    } else {
        candidate
    }
}

/// Produce a slug the `is_unique` predicate accepts, suffixing `-2`, `-3`, …
/// on collisions.
pub async fn generate_unique_slug_async<F, Fut, E>(
    input: &str,
    mut is_unique: F,
) -> Result<String, SlugAsyncError<E>>
where
    F: FnMut(&str) -> Fut,
    Fut: Future<Output = Result<bool, E>>,
    E: std::error::Error + Send + Sync + 'static,
{
    let base = derive_slug(input);

    if is_unique(&base).await.map_err(SlugAsyncError::Predicate)? {
        return Ok(base);
    }

    for attempt in 2..=MAX_SUFFIX_ATTEMPTS + 1 {
        let candidate = format!("{base}-{attempt}");
        if is_unique(&candidate)
            .await
            .map_err(SlugAsyncError::Predicate)?
        {
            return Ok(candidate);
        }
    }

    Err(SlugAsyncError::Slug(SlugError::Exhausted { base }))
}
