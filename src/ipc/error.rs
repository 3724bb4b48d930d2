use serde_json::json;

use crate::ledger::DomainError;

pub fn ok(id: &str, result: serde_json::Value) -> serde_json::Value {
    json!({
        "id": id,
        "ok": true,
        "result": result
    })
}

pub fn err(
    id: &str,
    code: &str,
    message: impl Into<String>,
    details: Option<serde_json::Value>,
) -> serde_json::Value {
    let mut error = json!({
        "code": code,
        "message": message.into(),
    });
    if let Some(d) = details {
        error["details"] = d;
    }
    json!({
        "id": id,
        "ok": false,
        "error": error,
    })
}

/// One failure shape shared by every handler family; `code` is the stable
/// wire contract, `details` optional structured context.
pub struct ApiError {
    pub code: &'static str,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn response(self, id: &str) -> serde_json::Value {
        err(id, self.code, self.message, self.details)
    }

    pub fn bad_params(message: impl Into<String>) -> ApiError {
        ApiError {
            code: "bad_params",
            message: message.into(),
            details: None,
        }
    }

    pub fn forbidden(role: &str, action: &str) -> ApiError {
        ApiError {
            code: "forbidden",
            message: format!("role {} may not {}", role, action),
            details: None,
        }
    }

    pub fn validation(message: impl Into<String>) -> ApiError {
        ApiError {
            code: "validation_failed",
            message: message.into(),
            details: None,
        }
    }

    pub fn external(message: impl Into<String>) -> ApiError {
        ApiError {
            code: "external_service_failed",
            message: message.into(),
            details: None,
        }
    }

    pub fn not_found(message: impl Into<String>) -> ApiError {
        ApiError {
            code: "not_found",
            message: message.into(),
            details: None,
        }
    }

    pub fn conflict(message: impl Into<String>, details: Option<serde_json::Value>) -> ApiError {
        ApiError {
            code: "conflict",
            message: message.into(),
            details,
        }
    }

    pub fn db_query(e: rusqlite::Error) -> ApiError {
        ApiError {
            code: "db_query_failed",
            message: e.to_string(),
            details: None,
        }
    }

    pub fn db_update(e: rusqlite::Error, table: &str) -> ApiError {
        ApiError {
            code: "db_update_failed",
            message: e.to_string(),
            details: Some(json!({ "table": table })),
        }
    }

    pub fn db_tx(e: rusqlite::Error) -> ApiError {
        ApiError {
            code: "db_tx_failed",
            message: e.to_string(),
            details: None,
        }
    }
}

impl From<DomainError> for ApiError {
    fn from(e: DomainError) -> ApiError {
        ApiError {
            code: e.code(),
            message: e.to_string(),
            details: None,
        }
    }
}
