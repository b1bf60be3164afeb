//! Page/limit pagination shared by browse endpoints.

use serde::Serialize;
use thiserror::Error;

pub const DEFAULT_LIMIT: u32 = 15;
pub const MAX_LIMIT: u32 = 100;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PaginationError {
    #[error("`page` must be a positive integer, got `{0}`")]
    InvalidPage(String),
    #[error("`limit` must be `all` or an integer between 1 and {MAX_LIMIT}, got `{0}`")]
    InvalidLimit(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Limit {
    All,
    Count(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub limit: Limit,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 1,
            limit: Limit::Count(DEFAULT_LIMIT),
        }
    }
}

impl PageRequest {
    pub fn parse(page: Option<&str>, limit: Option<&str>) -> Result<Self, PaginationError> {
        let page = match page.map(str::trim).filter(|raw| !raw.is_empty()) {
            None => 1,
            Some(raw) => match raw.parse::<u32>() {
                Ok(value) if value >= 1 => value,
                _ => return Err(PaginationError::InvalidPage(raw.to_string())),
            },
        };

        let limit = match limit.map(str::trim).filter(|raw| !raw.is_empty()) {
            None => Limit::Count(DEFAULT_LIMIT),
            Some("all") => Limit::All,
            Some(raw) => match raw.parse::<u32>() {
                Ok(value) if (1..=MAX_LIMIT).contains(&value) => Limit::Count(value),
                _ => return Err(PaginationError::InvalidLimit(raw.to_string())),
            },
        };

        Ok(Self { page, limit })
    }

    /// `(offset, limit)` for a SQL query; `None` limit means unbounded.
    pub fn window(&self) -> (u64, Option<u64>) {
        match self.limit {
            Limit::All => (0, None),
            Limit::Count(limit) => (
                u64::from(self.page.saturating_sub(1)) * u64::from(limit),
                Some(u64::from(limit)),
            ),
        }
    }

    pub fn slice<T: Clone>(&self, items: &[T]) -> Vec<T> {
        let (offset, limit) = self.window();
        let offset = usize::try_from(offset).unwrap_or(usize::MAX);
        let iter = items.iter().skip(offset);
        match limit {
            Some(limit) => iter
                .take(usize::try_from(limit).unwrap_or(usize::MAX))
                .cloned()
                .collect(),
            None => iter.cloned().collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum LimitValue {
    All(&'static str),
    Count(u32),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaginationMeta {
    pub page: u32,
    pub limit: LimitValue,
    pub pages: u64,
    pub total: u64,
    pub next: Option<u32>,
    pub prev: Option<u32>,
}

impl PaginationMeta {
    pub fn new(request: &PageRequest, total: u64) -> Self {
        let (limit, pages) = match request.limit {
            Limit::All => (LimitValue::All("all"), 1),
            Limit::Count(limit) => (
                LimitValue::Count(limit),
                total.div_ceil(u64::from(limit)).max(1),
            ),
        };
        let page = request.page;
        let next = (u64::from(page) < pages).then(|| page + 1);
        let prev = (page > 1).then(|| page - 1);
        Self {
            page,
            limit,
            pages,
            total,
            next,
            prev,
        }
    }
}
