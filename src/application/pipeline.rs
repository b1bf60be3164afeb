//! Declarative endpoint descriptors and the option validation shared by
//! every controller.

use serde::Serialize;
use serde_json::Value;

use crate::application::error::EndpointError;
use crate::application::frame::Frame;

/// Options only internal callers may pass.
pub const INTERNAL_OPTIONS: &[&str] = &["forUpdate", "transacting"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionRule {
    /// Check `<doc>.<method>`.
    Default,
    /// Check `<doc>.<alias>` instead of the endpoint's own method.
    Alias(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OptionRule {
    pub option: &'static str,
    pub values: &'static [&'static str],
    pub required: bool,
}

impl OptionRule {
    pub const fn values(option: &'static str, values: &'static [&'static str]) -> Self {
        Self {
            option,
            values,
            required: false,
        }
    }

    pub const fn required(option: &'static str) -> Self {
        Self {
            option,
            values: &[],
            required: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseFormat {
    Json,
    Plain,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Disposition {
    pub kind: &'static str,
    pub filename: &'static str,
}

#[derive(Debug, Clone, Copy)]
pub struct EndpointSpec {
    pub doc: &'static str,
    pub method: &'static str,
    pub options: &'static [&'static str],
    pub data: &'static [&'static str],
    pub validation: &'static [OptionRule],
    pub permissions: PermissionRule,
    pub unsafe_attrs: &'static [&'static str],
    pub status: u16,
    pub cache_invalidate: bool,
    pub response: ResponseFormat,
    pub disposition: Option<Disposition>,
}

impl EndpointSpec {
    pub const fn new(doc: &'static str, method: &'static str) -> Self {
        Self {
            doc,
            method,
            options: &[],
            data: &[],
            validation: &[],
            permissions: PermissionRule::Default,
            unsafe_attrs: &[],
            status: 200,
            cache_invalidate: false,
            response: ResponseFormat::Json,
            disposition: None,
        }
    }

    pub fn name(&self) -> String {
        format!("{}.{}", self.doc, self.method)
    }

    /// Method checked by the permission layer.
    pub fn permission_method(&self) -> &'static str {
        match self.permissions {
            PermissionRule::Default => self.method,
            PermissionRule::Alias(alias) => alias,
        }
    }
}

/// Cache purge decision made by an endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum CacheInvalidation {
    /// Fall back to the endpoint's declared default.
    #[default]
    Unset,
    None,
    All,
    Paths(Vec<String>),
}

impl CacheInvalidation {
    pub fn resolve(self, default: bool) -> Self {
        match self {
            Self::Unset if default => Self::All,
            Self::Unset => Self::None,
            other => other,
        }
    }

    /// Value of the `X-Cache-Invalidate` header, if any.
    pub fn header_value(&self) -> Option<String> {
        match self {
            Self::All => Some("/*".to_string()),
            Self::Paths(paths) if !paths.is_empty() => Some(paths.join(", ")),
            _ => None,
        }
    }
}

/// Result body of an endpoint.
#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    Json(Value),
    Text(String),
    Empty,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    pub body: Body,
    pub cache: CacheInvalidation,
}

impl Outcome {
    pub fn json(body: impl Serialize) -> Result<Self, EndpointError> {
        let value = serde_json::to_value(body)
            .map_err(|err| EndpointError::internal(format!("serialize response: {err}")))?;
        Ok(Self {
            body: Body::Json(value),
            cache: CacheInvalidation::Unset,
        })
    }

    pub fn text(body: impl Into<String>) -> Self {
        Self {
            body: Body::Text(body.into()),
            cache: CacheInvalidation::Unset,
        }
    }

    pub fn empty() -> Self {
        Self {
            body: Body::Empty,
            cache: CacheInvalidation::Unset,
        }
    }

    pub fn with_cache(mut self, cache: CacheInvalidation) -> Self {
        self.cache = cache;
        self
    }
}

/// What the transport layer needs to shape a response.
#[derive(Debug, Clone, PartialEq)]
pub struct EndpointResponse {
    pub status: u16,
    pub body: Body,
    pub cache: CacheInvalidation,
    pub format: ResponseFormat,
    pub disposition: Option<Disposition>,
}

impl EndpointResponse {
    pub fn from_outcome(spec: &EndpointSpec, outcome: Outcome) -> Self {
        Self {
            status: spec.status,
            body: outcome.body,
            cache: outcome.cache.resolve(spec.cache_invalidate),
            format: spec.response,
            disposition: spec.disposition,
        }
    }

    pub fn json(&self) -> Option<&Value> {
        match &self.body {
            Body::Json(value) => Some(value),
            _ => None,
        }
    }
}

/// Validate the frame's options and data against the descriptor.
pub fn validate(spec: &EndpointSpec, frame: &Frame) -> Result<(), EndpointError> {
    for key in frame.options.keys() {
        if !spec.options.contains(&key.as_str()) {
            return Err(EndpointError::validation_with(
                format!("Unknown option `{key}` for {}", spec.name()),
                key.clone(),
            ));
        }
        if INTERNAL_OPTIONS.contains(&key.as_str()) && frame.context.is_external() {
            return Err(EndpointError::validation_with(
                format!("Option `{key}` is reserved for internal use"),
                key.clone(),
            ));
        }
    }

    for rule in spec.validation {
        let values = frame.option_list(rule.option);
        if rule.required && values.is_empty() {
            return Err(EndpointError::validation_with(
                format!("Validation (isRequired) failed for {}", rule.option),
                rule.option,
            ));
        }
        if !rule.values.is_empty()
            && let Some(bad) = values.iter().find(|value| !rule.values.contains(*value))
        {
            return Err(EndpointError::validation_with(
                format!(
                    "Validation (isIn) failed for {}: `{bad}` is not one of {}",
                    rule.option,
                    rule.values.join(", ")
                ),
                rule.option,
            ));
        }
    }

    if !spec.data.is_empty() {
        let present = spec
            .data
            .iter()
            .any(|key| frame.data.get(*key).is_some_and(|value| !value.is_null()));
        if !present {
            return Err(EndpointError::validation(format!(
                "{} requires one of: {}",
                spec.name(),
                spec.data.join(", ")
            )));
        }
    }

    Ok(())
}
