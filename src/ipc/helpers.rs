use crate::ipc::error::ApiError;
use crate::roles::{allows, Capability, Role};

pub fn get_required_str(params: &serde_json::Value, key: &str) -> Result<String, ApiError> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| ApiError::bad_params(format!("missing {}", key)))
}

pub fn get_optional_str(params: &serde_json::Value, key: &str) -> Option<String> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
}

pub fn get_required_i64(params: &serde_json::Value, key: &str) -> Result<i64, ApiError> {
    params
        .get(key)
        .and_then(|v| v.as_i64())
        .ok_or_else(|| ApiError::bad_params(format!("missing {}", key)))
}

pub fn get_optional_bool(params: &serde_json::Value, key: &str) -> Option<bool> {
    params.get(key).and_then(|v| v.as_bool())
}

pub fn get_str_array(params: &serde_json::Value, key: &str) -> Result<Vec<String>, ApiError> {
    let Some(items) = params.get(key).and_then(|v| v.as_array()) else {
        return Err(ApiError::bad_params(format!("missing {}", key)));
    };
    let mut out: Vec<String> = Vec::with_capacity(items.len());
    for item in items {
        let Some(s) = item.as_str() else {
            return Err(ApiError::bad_params(format!(
                "{} must be an array of strings",
                key
            )));
        };
        out.push(s.to_string());
    }
    Ok(out)
}

/// Resolve the caller's role from params and gate it on one capability.
/// Unknown role is a malformed request; a known role lacking the
/// capability is a policy refusal.
pub fn require_capability(
    params: &serde_json::Value,
    cap: Capability,
    action: &str,
) -> Result<Role, ApiError> {
    let raw = get_required_str(params, "role")?;
    let Some(role) = Role::parse(&raw) else {
        return Err(ApiError::bad_params(format!("unknown role: {}", raw)));
    };
    if !allows(role, cap) {
        return Err(ApiError::forbidden(role.as_str(), action));
    }
    Ok(role)
}
