//! Package-name grammar and recipe-document shape validation.
//!
//! A recipe that passes `validate_recipe` is publishable: it names itself in
//! canonical lowercase form, carries the mandatory `description` and
//! `license` fields, and every dependency key is a well-formed package path.

use serde_json::Value;

use crate::error::ValidationError;

/// Check the package-name grammar: non-empty, `[a-zA-Z0-9_-]` only.
pub fn check_package_name(name: &str) -> Result<(), ValidationError> {
    if name.is_empty() {
        return Err(ValidationError::PackageName {
            name: name.to_string(),
            reason: "name must not be empty".to_string(),
        });
    }
    if let Some(bad) = name
        .chars()
        .find(|c| !c.is_ascii_alphanumeric() && *c != '_' && *c != '-')
    {
        return Err(ValidationError::PackageName {
            name: name.to_string(),
            reason: format!("illegal character '{bad}'"),
        });
    }
    Ok(())
}

/// Check one `dependencies` key: a colon-separated path of package names.
///
/// A leading empty segment (":sub") means "subpackage of self" and is
/// allowed; every other segment must pass the name grammar.
pub fn check_dependency_path(path: &str) -> Result<(), ValidationError> {
    let mut saw_name = false;
    for (i, segment) in path.split(':').enumerate() {
        if segment.is_empty() {
            if i == 0 {
                continue;
            }
            return Err(ValidationError::PackageName {
                name: path.to_string(),
                reason: "empty path segment".to_string(),
            });
        }
        check_package_name(segment)?;
        saw_name = true;
    }
    if !saw_name {
        return Err(ValidationError::PackageName {
            name: path.to_string(),
            reason: "dependency path names no package".to_string(),
        });
    }
    Ok(())
}

/// Validate a normalized recipe document.
///
/// Requirements:
/// - the document is an object,
/// - `name` is a string of length 1..=`max_name_length`, already lowercase,
///   and passes the name grammar,
/// - `description` and `license` are non-empty strings,
/// - every key of `dependencies` passes [`check_dependency_path`].
pub fn validate_recipe(
    doc: &Value,
    filename: &str,
    max_name_length: usize,
) -> Result<(), ValidationError> {
    let recipe_error = |message: String| ValidationError::Recipe {
        filename: filename.to_string(),
        message,
    };

    let obj = doc
        .as_object()
        .ok_or_else(|| recipe_error("recipe must be a JSON object".to_string()))?;

    let name = obj
        .get("name")
        .and_then(|n| n.as_str())
        .ok_or_else(|| recipe_error("missing \"name\" field".to_string()))?;
    if name.is_empty() || name.len() > max_name_length {
        return Err(recipe_error(format!(
            "package name must be between 1 and {max_name_length} characters long"
        )));
    }
    if name != name.to_lowercase() {
        return Err(recipe_error(format!(
            "package name \"{name}\" must be lower case"
        )));
    }
    check_package_name(name).map_err(|e| recipe_error(e.to_string()))?;

    for field in ["description", "license"] {
        let present = obj
            .get(field)
            .and_then(|v| v.as_str())
            .map(|s| !s.is_empty())
            .unwrap_or(false);
        if !present {
            return Err(recipe_error(format!(
                "published packages must contain a non-empty \"{field}\" field"
            )));
        }
    }

    if let Some(deps) = obj.get("dependencies") {
        let deps = deps
            .as_object()
            .ok_or_else(|| recipe_error("\"dependencies\" must be an object".to_string()))?;
        for key in deps.keys() {
            check_dependency_path(key).map_err(|e| recipe_error(e.to_string()))?;
        }
    }

    Ok(())
}
