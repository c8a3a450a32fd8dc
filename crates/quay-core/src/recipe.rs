//! Recipe parsing: package-description files to normalized JSON documents.
//!
//! Both recognized recipe filenames carry JSON today; the filename decides
//! the dialect so another format can slot in behind `parse_recipe` without
//! touching the resolver.

use serde_json::Value;

use crate::error::ValidationError;

/// Key under which the resolver records which recipe file a version used.
pub const DESCRIPTION_FILE_KEY: &str = "packageDescriptionFile";

/// Parse a recipe file's text into a normalized JSON document.
pub fn parse_recipe(text: &str, filename: &str) -> Result<Value, ValidationError> {
    if !filename.ends_with(".json") {
        return Err(ValidationError::Recipe {
            filename: filename.to_string(),
            message: "unrecognized recipe format".to_string(),
        });
    }
    let doc: Value = serde_json::from_str(text).map_err(|e| ValidationError::Recipe {
        filename: filename.to_string(),
        message: format!("parse error: {e}"),
    })?;
    if !doc.is_object() {
        return Err(ValidationError::Recipe {
            filename: filename.to_string(),
            message: "recipe must be a JSON object".to_string(),
        });
    }
    Ok(doc)
}

/// The recipe's declared package name, if present.
pub fn recipe_name(doc: &Value) -> Option<&str> {
    doc.get("name").and_then(|n| n.as_str())
}
