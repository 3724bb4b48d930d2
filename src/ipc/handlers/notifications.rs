use crate::ipc::error::{err, ok, ApiError};
use crate::ipc::helpers::{get_optional_str, get_required_str};
use crate::ipc::types::{AppState, Request};
use rusqlite::{params_from_iter, Connection};
use serde_json::json;

fn notifications_list(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, ApiError> {
    let school_id = get_required_str(params, "schoolId")?;
    let kind = get_optional_str(params, "kind");

    let mut sql = String::from(
        "SELECT id, phone, message, kind, status, detail, created_at
         FROM notification_log
         WHERE school_id = ?",
    );
    let mut binds: Vec<String> = vec![school_id];
    if let Some(kind) = kind {
        sql.push_str(" AND kind = ?");
        binds.push(kind);
    }
    sql.push_str(" ORDER BY created_at DESC");

    let mut stmt = conn.prepare(&sql).map_err(ApiError::db_query)?;
    let notifications = stmt
        .query_map(params_from_iter(binds.iter()), |r| {
            Ok(json!({
                "id": r.get::<_, String>(0)?,
                "phone": r.get::<_, String>(1)?,
                "message": r.get::<_, String>(2)?,
                "kind": r.get::<_, String>(3)?,
                "status": r.get::<_, String>(4)?,
                "detail": r.get::<_, Option<String>>(5)?,
                "createdAt": r.get::<_, String>(6)?
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(ApiError::db_query)?;

    Ok(json!({ "notifications": notifications }))
}

fn dispatch(
    state: &mut AppState,
    req: &Request,
    op: fn(&Connection, &serde_json::Value) -> Result<serde_json::Value, ApiError>,
) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match op(conn, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "notifications.list" => Some(dispatch(state, req, notifications_list)),
        _ => None,
    }
}
