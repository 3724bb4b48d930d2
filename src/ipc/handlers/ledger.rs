use crate::ipc::error::{err, ok, ApiError};
use crate::ipc::helpers::{get_optional_str, get_required_str, require_capability};
use crate::ipc::types::{AppState, Request};
use crate::roles::Capability;
use rusqlite::{params_from_iter, Connection};
use serde_json::json;

fn ledger_list(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, ApiError> {
    require_capability(params, Capability::ViewLedger, "view the ledger")?;

    let school_id = get_required_str(params, "schoolId")?;
    let account = get_optional_str(params, "account");
    let from = get_optional_str(params, "from");
    let to = get_optional_str(params, "to");

    let mut sql = String::from(
        "SELECT id, account, amount, entry_type, description, student_id, fee_id, staff_id, recorded_at
         FROM ledger_transactions
         WHERE school_id = ?",
    );
    let mut binds: Vec<String> = vec![school_id];
    if let Some(account) = account {
        sql.push_str(" AND account = ?");
        binds.push(account);
    }
    if let Some(from) = from {
        sql.push_str(" AND date(recorded_at) >= date(?)");
        binds.push(from);
    }
    if let Some(to) = to {
        sql.push_str(" AND date(recorded_at) <= date(?)");
        binds.push(to);
    }
    sql.push_str(" ORDER BY recorded_at DESC");

    let mut stmt = conn.prepare(&sql).map_err(ApiError::db_query)?;
    let entries = stmt
        .query_map(params_from_iter(binds.iter()), |r| {
            Ok(json!({
                "id": r.get::<_, String>(0)?,
                "account": r.get::<_, String>(1)?,
                "amount": r.get::<_, i64>(2)?,
                "entryType": r.get::<_, String>(3)?,
                "description": r.get::<_, String>(4)?,
                "studentId": r.get::<_, Option<String>>(5)?,
                "feeId": r.get::<_, Option<String>>(6)?,
                "staffId": r.get::<_, Option<String>>(7)?,
                "recordedAt": r.get::<_, String>(8)?
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(ApiError::db_query)?;

    Ok(json!({ "entries": entries }))
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
        "ledger.list" => Some(dispatch(state, req, ledger_list)),
        _ => None,
    }
}
