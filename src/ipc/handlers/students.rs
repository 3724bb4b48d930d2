use crate::ipc::error::{err, ok, ApiError};
use crate::ipc::helpers::{get_optional_str, get_required_str, require_capability};
use crate::ipc::types::{AppState, Request};
use crate::roles::Capability;
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

fn class_school(conn: &Connection, class_id: &str) -> Result<Option<String>, ApiError> {
    conn.query_row(
        "SELECT school_id FROM classes WHERE id = ?",
        [class_id],
        |r| r.get::<_, String>(0),
    )
    .optional()
    .map_err(ApiError::db_query)
}

fn students_create(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, ApiError> {
    require_capability(params, Capability::ManageRoster, "create students")?;

    let school_id = get_required_str(params, "schoolId")?;
    let class_id = get_required_str(params, "classId")?;
    let last_name = get_required_str(params, "lastName")?;
    let first_name = get_required_str(params, "firstName")?;
    let phone = get_optional_str(params, "phone");

    let Some(owning_school) = class_school(conn, &class_id)? else {
        return Err(ApiError::not_found("class not found"));
    };
    if owning_school != school_id {
        return Err(ApiError::bad_params("class does not belong to school"));
    }

    let sort_order: i64 = conn
        .query_row(
            "SELECT COALESCE(MAX(sort_order) + 1, 0) FROM students WHERE class_id = ?",
            [&class_id],
            |r| r.get(0),
        )
        .map_err(ApiError::db_query)?;

    let guardians: Vec<(String, String)> = match params.get("guardians").and_then(|v| v.as_array()) {
        Some(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                let name = item.get("name").and_then(|v| v.as_str());
                let g_phone = item.get("phone").and_then(|v| v.as_str());
                let (Some(name), Some(g_phone)) = (name, g_phone) else {
                    return Err(ApiError::bad_params("guardians entries need name and phone"));
                };
                out.push((name.to_string(), g_phone.to_string()));
            }
            out
        }
        None => Vec::new(),
    };

    let student_id = Uuid::new_v4().to_string();
    let now = chrono::Utc::now().to_rfc3339();

    let tx = conn.unchecked_transaction().map_err(ApiError::db_tx)?;
    tx.execute(
        "INSERT INTO students(id, school_id, class_id, last_name, first_name, phone, active, sort_order, updated_at)
         VALUES(?, ?, ?, ?, ?, ?, 1, ?, ?)",
        (
            &student_id,
            &school_id,
            &class_id,
            &last_name,
            &first_name,
            &phone,
            sort_order,
            &now,
        ),
    )
    .map_err(|e| ApiError::db_update(e, "students"))?;
    for (name, g_phone) in &guardians {
        tx.execute(
            "INSERT INTO guardians(id, student_id, name, phone) VALUES(?, ?, ?, ?)",
            (Uuid::new_v4().to_string(), &student_id, name, g_phone),
        )
        .map_err(|e| ApiError::db_update(e, "guardians"))?;
    }
    tx.commit().map_err(ApiError::db_tx)?;

    Ok(json!({ "studentId": student_id, "guardianCount": guardians.len() }))
}

fn students_list(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, ApiError> {
    let class_id = get_required_str(params, "classId")?;

    let mut stmt = conn
        .prepare(
            "SELECT id, last_name, first_name, phone, active, sort_order
             FROM students
             WHERE class_id = ?
             ORDER BY sort_order",
        )
        .map_err(ApiError::db_query)?;
    let students = stmt
        .query_map([&class_id], |r| {
            let last: String = r.get(1)?;
            let first: String = r.get(2)?;
            Ok(json!({
                "id": r.get::<_, String>(0)?,
                "displayName": format!("{}, {}", last, first),
                "phone": r.get::<_, Option<String>>(3)?,
                "active": r.get::<_, i64>(4)? != 0,
                "sortOrder": r.get::<_, i64>(5)?
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(ApiError::db_query)?;

    Ok(json!({ "students": students }))
}

fn students_update(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, ApiError> {
    require_capability(params, Capability::ManageRoster, "update students")?;

    let student_id = get_required_str(params, "studentId")?;
    let Some(patch) = params.get("patch") else {
        return Err(ApiError::bad_params("missing patch"));
    };

    let exists: Option<i64> = conn
        .query_row("SELECT 1 FROM students WHERE id = ?", [&student_id], |r| {
            r.get(0)
        })
        .optional()
        .map_err(ApiError::db_query)?;
    if exists.is_none() {
        return Err(ApiError::not_found("student not found"));
    }

    let now = chrono::Utc::now().to_rfc3339();
    if let Some(v) = patch.get("lastName").and_then(|v| v.as_str()) {
        conn.execute(
            "UPDATE students SET last_name = ?, updated_at = ? WHERE id = ?",
            (v, &now, &student_id),
        )
        .map_err(|e| ApiError::db_update(e, "students"))?;
    }
    if let Some(v) = patch.get("firstName").and_then(|v| v.as_str()) {
        conn.execute(
            "UPDATE students SET first_name = ?, updated_at = ? WHERE id = ?",
            (v, &now, &student_id),
        )
        .map_err(|e| ApiError::db_update(e, "students"))?;
    }
    if let Some(v) = patch.get("phone").and_then(|v| v.as_str()) {
        conn.execute(
            "UPDATE students SET phone = ?, updated_at = ? WHERE id = ?",
            (v, &now, &student_id),
        )
        .map_err(|e| ApiError::db_update(e, "students"))?;
    }
    if let Some(v) = patch.get("active").and_then(|v| v.as_bool()) {
        conn.execute(
            "UPDATE students SET active = ?, updated_at = ? WHERE id = ?",
            (v as i64, &now, &student_id),
        )
        .map_err(|e| ApiError::db_update(e, "students"))?;
    }

    Ok(json!({ "ok": true }))
}

fn students_set_class(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, ApiError> {
    require_capability(params, Capability::ManageRoster, "move students")?;

    let student_id = get_required_str(params, "studentId")?;
    let class_id = get_required_str(params, "classId")?;

    let student_school: Option<String> = conn
        .query_row(
            "SELECT school_id FROM students WHERE id = ?",
            [&student_id],
            |r| r.get(0),
        )
        .optional()
        .map_err(ApiError::db_query)?;
    let Some(student_school) = student_school else {
        return Err(ApiError::not_found("student not found"));
    };
    let Some(target_school) = class_school(conn, &class_id)? else {
        return Err(ApiError::not_found("class not found"));
    };
    if target_school != student_school {
        return Err(ApiError::bad_params("class belongs to a different school"));
    }

    let sort_order: i64 = conn
        .query_row(
            "SELECT COALESCE(MAX(sort_order) + 1, 0) FROM students WHERE class_id = ?",
            [&class_id],
            |r| r.get(0),
        )
        .map_err(ApiError::db_query)?;

    // Fee eligibility is a snapshot: moving a student changes the roster
    // going forward, never the fees already assigned.
    let now = chrono::Utc::now().to_rfc3339();
    conn.execute(
        "UPDATE students SET class_id = ?, sort_order = ?, updated_at = ? WHERE id = ?",
        (&class_id, sort_order, &now, &student_id),
    )
    .map_err(|e| ApiError::db_update(e, "students"))?;

    Ok(json!({ "ok": true }))
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
        "students.create" => Some(dispatch(state, req, students_create)),
        "students.list" => Some(dispatch(state, req, students_list)),
        "students.update" => Some(dispatch(state, req, students_update)),
        "students.setClass" => Some(dispatch(state, req, students_set_class)),
        _ => None,
    }
}
