//! Post vocabulary: allowed option values, the `filter`/`order` grammars and
//! html-derived plaintext.

use std::cmp::Ordering;

use uuid::Uuid;

use crate::domain::entities::PostRecord;
use crate::domain::error::DomainError;
use crate::domain::types::{PostStatus, PostVisibility};

pub const ALLOWED_INCLUDES: &[&str] = &[
    "tags",
    "authors",
    "authors.roles",
    "email",
    "tiers",
    "newsletter",
    "count.conversions",
    "count.signups",
    "count.paid_conversions",
    "count.clicks",
    "sentiment",
    "count.positive_feedback",
    "count.negative_feedback",
];

pub const ALLOWED_FORMATS: &[&str] = &["mobiledoc", "lexical", "html", "plaintext"];

/// Attributes whose modification needs an extra permission check.
pub const UNSAFE_ATTRS: &[&str] = &["status", "authors", "visibility"];

pub const DEFAULT_TITLE: &str = "(Untitled)";

pub const DEFAULT_EMAIL_SEGMENT: &str = "all";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterField {
    Status,
    Visibility,
    Featured,
    Tag,
    Author,
    Slug,
    Id,
}

impl FilterField {
    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "status" => Some(Self::Status),
            "visibility" => Some(Self::Visibility),
            "featured" => Some(Self::Featured),
            "tag" | "tags" | "tags.slug" => Some(Self::Tag),
            "author" | "authors" | "authors.slug" => Some(Self::Author),
            "slug" => Some(Self::Slug),
            "id" => Some(Self::Id),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterClause {
    pub field: FilterField,
    pub negated: bool,
    pub values: Vec<String>,
}

impl FilterClause {
    fn matches(&self, post: &PostRecord) -> bool {
        let hit = self.values.iter().any(|value| match self.field {
            FilterField::Status => post.status.as_str() == value,
            FilterField::Visibility => post.visibility.as_str() == value,
            FilterField::Featured => value.parse::<bool>().ok() == Some(post.featured),
            FilterField::Tag => post.tags.iter().any(|tag| &tag.slug == value),
            FilterField::Author => post.authors.iter().any(|author| &author.slug == value),
            FilterField::Slug => &post.slug == value,
            FilterField::Id => post.id.to_string() == *value,
        });
        hit != self.negated
    }
}

/// Conjunction of clauses parsed from `status:published+tag:[news,rust]`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostFilter {
    pub clauses: Vec<FilterClause>,
}

impl PostFilter {
    pub fn parse(input: &str) -> Result<Self, DomainError> {
        let mut clauses = Vec::new();
        for raw in split_top_level(input, '+') {
            let raw = raw.trim();
            if raw.is_empty() {
                continue;
            }
            clauses.push(parse_clause(raw)?);
        }
        Ok(Self { clauses })
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    pub fn matches(&self, post: &PostRecord) -> bool {
        self.clauses.iter().all(|clause| clause.matches(post))
    }
}

fn parse_clause(raw: &str) -> Result<FilterClause, DomainError> {
    let (field, rest) = raw
        .split_once(':')
        .ok_or_else(|| DomainError::validation(format!("Malformed filter clause `{raw}`")))?;
    let field = FilterField::parse(field.trim())
        .ok_or_else(|| DomainError::validation(format!("Unknown filter field `{field}`")))?;

    let mut rest = rest.trim();
    let negated = rest.starts_with('-');
    if negated {
        rest = &rest[1..];
    }

    let values: Vec<String> = if let Some(inner) = rest.strip_prefix('[') {
        let inner = inner
            .strip_suffix(']')
            .ok_or_else(|| DomainError::validation(format!("Unclosed list in `{raw}`")))?;
        inner
            .split(',')
            .map(unquote)
            .filter(|value| !value.is_empty())
            .collect()
    } else {
        vec![unquote(rest)]
    };

    if values.iter().all(String::is_empty) {
        return Err(DomainError::validation(format!(
            "Filter clause `{raw}` has no value"
        )));
    }

    validate_values(field, &values)?;

    Ok(FilterClause {
        field,
        negated,
        values,
    })
}

fn validate_values(field: FilterField, values: &[String]) -> Result<(), DomainError> {
    for value in values {
        let ok = match field {
            FilterField::Status => value.parse::<PostStatus>().is_ok(),
            FilterField::Visibility => value.parse::<PostVisibility>().is_ok(),
            FilterField::Featured => value.parse::<bool>().is_ok(),
            FilterField::Id => Uuid::parse_str(value).is_ok(),
            FilterField::Tag | FilterField::Author | FilterField::Slug => true,
        };
        if !ok {
            return Err(DomainError::validation(format!(
                "Invalid filter value `{value}`"
            )));
        }
    }
    Ok(())
}

fn unquote(raw: &str) -> String {
    let raw = raw.trim();
    raw.strip_prefix('\'')
        .and_then(|inner| inner.strip_suffix('\''))
        .unwrap_or(raw)
        .to_string()
}

fn split_top_level(input: &str, separator: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    for (idx, ch) in input.char_indices() {
        match ch {
            '[' => depth += 1,
            ']' => depth = depth.saturating_sub(1),
            c if c == separator && depth == 0 => {
                parts.push(&input[start..idx]);
                start = idx + ch.len_utf8();
            }
            _ => {}
        }
    }
    parts.push(&input[start..]);
    parts
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderField {
    PublishedAt,
    CreatedAt,
    UpdatedAt,
    Title,
    Slug,
}

impl OrderField {
    pub fn column(self) -> &'static str {
        match self {
            Self::PublishedAt => "published_at",
            Self::CreatedAt => "created_at",
            Self::UpdatedAt => "updated_at",
            Self::Title => "title",
            Self::Slug => "slug",
        }
    }

    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "published_at" => Some(Self::PublishedAt),
            "created_at" => Some(Self::CreatedAt),
            "updated_at" => Some(Self::UpdatedAt),
            "title" => Some(Self::Title),
            "slug" => Some(Self::Slug),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderClause {
    pub field: OrderField,
    pub descending: bool,
}

/// Sort order parsed from `published_at desc, title asc`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostOrder {
    pub clauses: Vec<OrderClause>,
}

impl Default for PostOrder {
    fn default() -> Self {
        Self {
            clauses: vec![
                OrderClause {
                    field: OrderField::PublishedAt,
                    descending: true,
                },
                OrderClause {
                    field: OrderField::UpdatedAt,
                    descending: true,
                },
            ],
        }
    }
}

impl PostOrder {
    pub fn parse(input: &str) -> Result<Self, DomainError> {
        let mut clauses = Vec::new();
        for part in input.split(',') {
            let mut tokens = part.split_whitespace();
            let Some(field) = tokens.next() else {
                continue;
            };
            let field = OrderField::parse(field)
                .ok_or_else(|| DomainError::validation(format!("Unknown order field `{field}`")))?;
            let descending = match tokens.next().map(str::to_ascii_lowercase).as_deref() {
                None | Some("asc") => false,
                Some("desc") => true,
                Some(other) => {
                    return Err(DomainError::validation(format!(
                        "Unknown order direction `{other}`"
                    )));
                }
            };
            if tokens.next().is_some() {
                return Err(DomainError::validation(format!(
                    "Malformed order clause `{}`",
                    part.trim()
                )));
            }
            clauses.push(OrderClause { field, descending });
        }

        if clauses.is_empty() {
            return Ok(Self::default());
        }
        Ok(Self { clauses })
    }

    /// Ordering used when posts are sorted outside the database.
    /// Missing `published_at` sorts first in descending order, matching
    /// `NULLS FIRST` on the SQL side.
    pub fn compare(&self, a: &PostRecord, b: &PostRecord) -> Ordering {
        for clause in &self.clauses {
            let ordering = match clause.field {
                OrderField::PublishedAt => match (a.published_at, b.published_at) {
                    (None, None) => Ordering::Equal,
                    (None, Some(_)) => Ordering::Greater,
                    (Some(_), None) => Ordering::Less,
                    (Some(x), Some(y)) => x.cmp(&y),
                },
                OrderField::CreatedAt => a.created_at.cmp(&b.created_at),
                OrderField::UpdatedAt => a.updated_at.cmp(&b.updated_at),
                OrderField::Title => a.title.cmp(&b.title),
                OrderField::Slug => a.slug.cmp(&b.slug),
            };
            let ordering = if clause.descending {
                ordering.reverse()
            } else {
                ordering
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        a.id.cmp(&b.id)
    }
}

const BLOCK_TAGS: &[&str] = &[
    "p", "div", "br", "li", "h1", "h2", "h3", "h4", "h5", "h6", "blockquote", "pre", "tr", "hr",
    "figure", "figcaption",
];

/// Derive the plaintext rendition of a post body from its html.
pub fn html_to_plaintext(html: &str) -> String {
    let mut text = String::with_capacity(html.len());
    let mut chars = html.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch != '<' {
            text.push(ch);
            continue;
        }

        let mut tag = String::new();
        for inner in chars.by_ref() {
            if inner == '>' {
                break;
            }
            tag.push(inner);
        }
        let name: String = tag
            .trim_start_matches('/')
            .chars()
            .take_while(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();
        if BLOCK_TAGS.contains(&name.as_str()) && !text.ends_with('\n') && !text.is_empty() {
            text.push('\n');
        }
    }

    let decoded = decode_entities(&text);
    decoded
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn decode_entities(input: &str) -> String {
    input
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .replace("&amp;", "&")
}
