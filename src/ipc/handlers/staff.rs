use crate::ipc::error::{err, ok, ApiError};
use crate::ipc::helpers::{get_required_i64, get_required_str, require_capability};
use crate::ipc::types::{AppState, Request};
use crate::roles::Capability;
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

fn staff_create(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, ApiError> {
    require_capability(params, Capability::ManagePayroll, "create staff")?;

    let school_id = get_required_str(params, "schoolId")?;
    let last_name = get_required_str(params, "lastName")?;
    let first_name = get_required_str(params, "firstName")?;
    let role_title = get_required_str(params, "roleTitle")?;
    let base_salary = get_required_i64(params, "baseSalary")?;
    if base_salary <= 0 {
        return Err(ApiError::bad_params("baseSalary must be positive minor units"));
    }

    let school_exists: Option<i64> = conn
        .query_row("SELECT 1 FROM schools WHERE id = ?", [&school_id], |r| {
            r.get(0)
        })
        .optional()
        .map_err(ApiError::db_query)?;
    if school_exists.is_none() {
        return Err(ApiError::not_found("school not found"));
    }

    let staff_id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO staff(id, school_id, last_name, first_name, role_title, base_salary)
         VALUES(?, ?, ?, ?, ?, ?)",
        (
            &staff_id,
            &school_id,
            &last_name,
            &first_name,
            &role_title,
            base_salary,
        ),
    )
    .map_err(|e| ApiError::db_update(e, "staff"))?;

    Ok(json!({ "staffId": staff_id }))
}

fn staff_list(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, ApiError> {
    let school_id = get_required_str(params, "schoolId")?;

    let mut stmt = conn
        .prepare(
            "SELECT id, last_name, first_name, role_title, base_salary
             FROM staff
             WHERE school_id = ?
             ORDER BY last_name, first_name",
        )
        .map_err(ApiError::db_query)?;
    let staff = stmt
        .query_map([&school_id], |r| {
            let last: String = r.get(1)?;
            let first: String = r.get(2)?;
            Ok(json!({
                "id": r.get::<_, String>(0)?,
                "displayName": format!("{}, {}", last, first),
                "roleTitle": r.get::<_, String>(3)?,
                "baseSalary": r.get::<_, i64>(4)?
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(ApiError::db_query)?;

    Ok(json!({ "staff": staff }))
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
        "staff.create" => Some(dispatch(state, req, staff_create)),
        "staff.list" => Some(dispatch(state, req, staff_list)),
        _ => None,
    }
}
