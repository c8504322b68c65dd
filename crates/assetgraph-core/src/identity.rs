//! Deterministic mapping between natural keys and graph vertex ids.
//!
//! Top-level entities are stored as `{prefix}___{key}` where the prefix is the
//! category label (`device`, `group`). Components nest under their parent
//! device: `device___{deviceId}___{componentId}`. The separator is never
//! escaped, so natural keys must not contain it, and a parent key must not
//! end in `_` where it would run into the following separator.

use crate::error::{AssetGraphError, Result};
use crate::types::Category;

/// Separator between the prefix and each key part of a vertex id.
pub const SEPARATOR: &str = "___";

const DEVICE_PREFIX: &str = "device";
const GROUP_PREFIX: &str = "group";

fn prefix(category: Category) -> &'static str {
    match category {
        Category::Device | Category::Component => DEVICE_PREFIX,
        Category::Group => GROUP_PREFIX,
    }
}

fn expected_parts(category: Category) -> usize {
    match category {
        Category::Device | Category::Group => 1,
        Category::Component => 2,
    }
}

/// Check that a natural key can be embedded in a vertex id.
pub fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(AssetGraphError::MalformedIdentity(
            "natural key must not be empty".to_string(),
        ));
    }
    if key.contains(SEPARATOR) {
        return Err(AssetGraphError::MalformedIdentity(format!(
            "natural key {key:?} contains the reserved separator {SEPARATOR:?}"
        )));
    }
    Ok(())
}

/// Check that a key can be followed by another key part in a vertex id.
pub fn validate_parent_key(key: &str) -> Result<()> {
    validate_key(key)?;
    if key.ends_with('_') {
        return Err(AssetGraphError::MalformedIdentity(format!(
            "parent key {key:?} must not end in '_'"
        )));
    }
    Ok(())
}

/// Encode a category and its key parts into a vertex id.
///
/// Devices and groups take one key part; components take the parent device
/// id followed by the component id.
pub fn encode<S: AsRef<str>>(category: Category, key_parts: &[S]) -> Result<String> {
    if key_parts.len() != expected_parts(category) {
        return Err(AssetGraphError::MalformedIdentity(format!(
            "{category} ids take {} key part(s), got {}",
            expected_parts(category),
            key_parts.len()
        )));
    }

    let mut id = prefix(category).to_string();
    let last = key_parts.len() - 1;
    for (i, part) in key_parts.iter().enumerate() {
        let part = part.as_ref();
        if i < last {
            validate_parent_key(part)?;
        } else {
            validate_key(part)?;
        }
        id.push_str(SEPARATOR);
        id.push_str(part);
    }
    Ok(id)
}

/// Decode a vertex id back into its category and key parts.
pub fn decode(id: &str) -> Result<(Category, Vec<String>)> {
    let mut parts = id.split(SEPARATOR);
    let head = parts.next().unwrap_or_default();
    let keys: Vec<String> = parts.map(str::to_string).collect();

    if keys.is_empty() || keys.iter().any(String::is_empty) {
        return Err(AssetGraphError::MalformedIdentity(format!(
            "vertex id {id:?} has missing key parts"
        )));
    }

    let category = match (head, keys.len()) {
        (DEVICE_PREFIX, 1) => Category::Device,
        (DEVICE_PREFIX, 2) => Category::Component,
        (GROUP_PREFIX, 1) => Category::Group,
        _ => {
            return Err(AssetGraphError::MalformedIdentity(format!(
                "vertex id {id:?} does not match a known category layout"
            )))
        }
    };
    Ok((category, keys))
}

/// Whether `id` decodes to the given category.
pub fn is_category(id: &str, category: Category) -> bool {
    matches!(decode(id), Ok((c, _)) if c == category)
}

/// The logical key of a vertex id: the last key part.
pub fn natural_key(id: &str) -> Result<String> {
    let (_, mut keys) = decode(id)?;
    keys.pop()
        .ok_or_else(|| AssetGraphError::MalformedIdentity(id.to_string()))
}

pub fn device_id(device_id: &str) -> Result<String> {
    encode(Category::Device, &[device_id])
}

pub fn group_id(group_path: &str) -> Result<String> {
    encode(Category::Group, &[group_path])
}

pub fn component_id(device_id: &str, component_id: &str) -> Result<String> {
    encode(Category::Component, &[device_id, component_id])
}
