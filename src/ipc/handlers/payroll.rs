use crate::ipc::error::{err, ok, ApiError};
use crate::ipc::helpers::{get_required_str, require_capability};
use crate::ipc::types::{AppState, Request};
use crate::ledger::DomainError;
use crate::roles::Capability;
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

fn parse_month(raw: &str) -> Result<String, ApiError> {
    let Some((y, m)) = raw.split_once('-') else {
        return Err(ApiError::validation("month must be YYYY-MM"));
    };
    if y.len() != 4 || y.parse::<i32>().is_err() {
        return Err(ApiError::validation("month year must be numeric"));
    }
    let month_num: u32 = m
        .parse()
        .map_err(|_| ApiError::validation("month must be YYYY-MM"))?;
    if !(1..=12).contains(&month_num) {
        return Err(ApiError::validation("month must be between 01 and 12"));
    }
    Ok(format!("{}-{:02}", y, month_num))
}

fn payroll_record_salary(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, ApiError> {
    require_capability(params, Capability::ManagePayroll, "record salaries")?;

    let staff_id = get_required_str(params, "staffId")?;
    let month = parse_month(&get_required_str(params, "month")?)?;

    let row: Option<(String, String, String, i64)> = conn
        .query_row(
            "SELECT school_id, first_name, last_name, base_salary FROM staff WHERE id = ?",
            [&staff_id],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)),
        )
        .optional()
        .map_err(ApiError::db_query)?;
    let Some((school_id, first_name, last_name, base_salary)) = row else {
        return Err(ApiError::not_found("staff member not found"));
    };

    let amount = match params.get("amount").and_then(|v| v.as_i64()) {
        Some(v) => v,
        None => base_salary,
    };
    if amount <= 0 {
        return Err(ApiError::validation("amount must be positive minor units"));
    }

    let already: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM salary_events WHERE staff_id = ? AND month = ?",
            (&staff_id, &month),
            |r| r.get(0),
        )
        .map_err(ApiError::db_query)?;
    if already > 0 {
        return Err(DomainError::Conflict(format!("salary already disbursed for {}", month)).into());
    }

    let event_id = Uuid::new_v4().to_string();
    let now = chrono::Utc::now().to_rfc3339();

    // Disbursement and its ledger mirror land together or not at all.
    let tx = conn.unchecked_transaction().map_err(ApiError::db_tx)?;
    tx.execute(
        "INSERT INTO salary_events(id, school_id, staff_id, amount, month, paid_at)
         VALUES(?, ?, ?, ?, ?, ?)",
        (&event_id, &school_id, &staff_id, amount, &month, &now),
    )
    .map_err(|e| ApiError::db_update(e, "salary_events"))?;
    tx.execute(
        "INSERT INTO ledger_transactions(id, school_id, account, amount, entry_type, description, staff_id, recorded_at)
         VALUES(?, ?, 'salary_expense', ?, 'debit', ?, ?, ?)",
        (
            Uuid::new_v4().to_string(),
            &school_id,
            amount,
            format!("Salary {}: {} {}", month, first_name, last_name),
            &staff_id,
            &now,
        ),
    )
    .map_err(|e| ApiError::db_update(e, "ledger_transactions"))?;
    tx.commit().map_err(ApiError::db_tx)?;

    Ok(json!({ "salaryEventId": event_id, "amount": amount, "month": month }))
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
        "payroll.recordSalary" => Some(dispatch(state, req, payroll_record_salary)),
        _ => None,
    }
}
