//! Dynamic routing document (`routes.yaml`) and its validation rules.

use serde_yaml::{Mapping, Value};

use crate::domain::error::DomainError;

pub const DEFAULT_ROUTES_YAML: &str = "\
routes:

collections:
  /:
    permalink: /{slug}/
    template: index

taxonomies:
  tag: /tag/{slug}/
  author: /author/{slug}/
";

const TOP_LEVEL_KEYS: &[&str] = &["routes", "collections", "taxonomies"];
const TAXONOMY_KEYS: &[&str] = &["tag", "author"];

/// Parse and validate a routes document.
pub fn validate_routes(source: &str) -> Result<Mapping, DomainError> {
    let document: Value = serde_yaml::from_str(source)
        .map_err(|err| DomainError::validation(format!("Could not parse routes file: {err}")))?;

    let root = match document {
        Value::Mapping(map) => map,
        Value::Null => Mapping::new(),
        _ => {
            return Err(DomainError::validation(
                "Routes file must be a mapping of routes, collections and taxonomies",
            ));
        }
    };

    for (key, value) in &root {
        let key = key
            .as_str()
            .ok_or_else(|| DomainError::validation("Top-level keys must be strings"))?;
        match key {
            "routes" => validate_routes_section(value)?,
            "collections" => validate_collections(value)?,
            "taxonomies" => validate_taxonomies(value)?,
            other => {
                return Err(DomainError::validation(format!(
                    "Unknown top-level key `{other}`, expected one of {}",
                    TOP_LEVEL_KEYS.join(", ")
                )));
            }
        }
    }

    Ok(root)
}

fn section(value: &Value, name: &str) -> Result<Option<Mapping>, DomainError> {
    match value {
        Value::Null => Ok(None),
        Value::Mapping(map) => Ok(Some(map.clone())),
        _ => Err(DomainError::validation(format!(
            "`{name}` must be a mapping"
        ))),
    }
}

fn path_key<'a>(key: &'a Value, name: &str) -> Result<&'a str, DomainError> {
    let path = key
        .as_str()
        .ok_or_else(|| DomainError::validation(format!("`{name}` keys must be strings")))?;
    if !path.starts_with('/') || !path.ends_with('/') {
        return Err(DomainError::validation(format!(
            "`{path}` in `{name}` must start and end with `/`"
        )));
    }
    Ok(path)
}

fn validate_routes_section(value: &Value) -> Result<(), DomainError> {
    let Some(map) = section(value, "routes")? else {
        return Ok(());
    };
    for (key, route) in &map {
        let path = path_key(key, "routes")?;
        match route {
            Value::String(_) | Value::Mapping(_) => {}
            _ => {
                return Err(DomainError::validation(format!(
                    "Route `{path}` must name a template or describe a route"
                )));
            }
        }
    }
    Ok(())
}

fn validate_collections(value: &Value) -> Result<(), DomainError> {
    let Some(map) = section(value, "collections")? else {
        return Ok(());
    };
    for (key, collection) in &map {
        let path = path_key(key, "collections")?;
        let permalink = collection
            .as_mapping()
            .and_then(|body| body.get("permalink"))
            .and_then(Value::as_str)
            .ok_or_else(|| {
                DomainError::validation(format!("Collection `{path}` needs a `permalink`"))
            })?;
        if !permalink.starts_with('/') || !permalink.ends_with('/') {
            return Err(DomainError::validation(format!(
                "Permalink `{permalink}` of collection `{path}` must start and end with `/`"
            )));
        }
    }
    Ok(())
}

fn validate_taxonomies(value: &Value) -> Result<(), DomainError> {
    let Some(map) = section(value, "taxonomies")? else {
        return Ok(());
    };
    for (key, permalink) in &map {
        let name = key
            .as_str()
            .ok_or_else(|| DomainError::validation("`taxonomies` keys must be strings"))?;
        if !TAXONOMY_KEYS.contains(&name) {
            return Err(DomainError::validation(format!(
                "Unknown taxonomy `{name}`, expected tag or author"
            )));
        }
        let permalink = permalink.as_str().ok_or_else(|| {
            DomainError::validation(format!("Taxonomy `{name}` must map to a permalink"))
        })?;
        if !permalink.contains("{slug}") {
            return Err(DomainError::validation(format!(
                "Taxonomy `{name}` permalink must contain `{{slug}}`"
            )));
        }
    }
    Ok(())
}
