use crate::db;
use crate::ipc::error::{err, ok, ApiError};
use crate::ipc::helpers::{
    get_optional_bool, get_optional_str, get_required_i64, get_required_str, get_str_array,
    require_capability,
};
use crate::ipc::types::{AppState, Request};
use crate::ledger;
use crate::notify;
use crate::roles::Capability;
use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

struct FeeRow {
    school_id: String,
    title: String,
    amount: i64,
    due_date: String,
}

fn fetch_fee(conn: &Connection, fee_id: &str) -> Result<FeeRow, ApiError> {
    conn.query_row(
        "SELECT school_id, title, amount, due_date FROM fees WHERE id = ?",
        [fee_id],
        |r| {
            Ok(FeeRow {
                school_id: r.get(0)?,
                title: r.get(1)?,
                amount: r.get(2)?,
                due_date: r.get(3)?,
            })
        },
    )
    .optional()
    .map_err(ApiError::db_query)?
    .ok_or_else(|| ApiError::not_found("fee not found"))
}

fn total_paid(conn: &Connection, fee_id: &str, student_id: &str) -> Result<i64, ApiError> {
    conn.query_row(
        "SELECT COALESCE(SUM(amount), 0) FROM payments WHERE fee_id = ? AND student_id = ?",
        (fee_id, student_id),
        |r| r.get(0),
    )
    .map_err(ApiError::db_query)
}

fn parse_due_date(raw: &str) -> Result<String, ApiError> {
    match NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        Ok(d) => Ok(d.format("%Y-%m-%d").to_string()),
        Err(_) => Err(ApiError::validation("dueDate must be YYYY-MM-DD")),
    }
}

fn fees_create(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, ApiError> {
    require_capability(params, Capability::ManageFees, "create fees")?;

    let school_id = get_required_str(params, "schoolId")?;
    let title = get_required_str(params, "title")?;
    let amount = get_required_i64(params, "amount")?;
    let due_date = parse_due_date(&get_required_str(params, "dueDate")?)?;
    let scope = get_required_str(params, "scope")?;
    let optional = get_optional_bool(params, "optional").unwrap_or(false);

    if amount <= 0 {
        return Err(ApiError::validation("amount must be positive minor units"));
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

    // Resolve the eligibility set up front so a failed validation creates
    // nothing at all.
    let mut class_id: Option<String> = None;
    let eligible: Vec<String> = match scope.as_str() {
        "class_wide" => {
            let cid = get_required_str(params, "classId")?;
            let owning: Option<String> = conn
                .query_row("SELECT school_id FROM classes WHERE id = ?", [&cid], |r| {
                    r.get(0)
                })
                .optional()
                .map_err(ApiError::db_query)?;
            match owning {
                None => return Err(ApiError::not_found("class not found")),
                Some(s) if s != school_id => {
                    return Err(ApiError::validation("class belongs to a different school"))
                }
                Some(_) => {}
            }
            // Roster snapshot at this instant. Students enrolled later are
            // not retroactively billed.
            let mut stmt = conn
                .prepare(
                    "SELECT id FROM students WHERE class_id = ? AND active = 1 ORDER BY sort_order",
                )
                .map_err(ApiError::db_query)?;
            let ids = stmt
                .query_map([&cid], |r| r.get::<_, String>(0))
                .and_then(|it| it.collect::<Result<Vec<_>, _>>())
                .map_err(ApiError::db_query)?;
            class_id = Some(cid);
            ids
        }
        "individual" => {
            let ids = get_str_array(params, "studentIds")?;
            if ids.is_empty() {
                return Err(ApiError::validation("studentIds must not be empty"));
            }
            for sid in &ids {
                let owning: Option<String> = conn
                    .query_row(
                        "SELECT school_id FROM students WHERE id = ?",
                        [sid],
                        |r| r.get(0),
                    )
                    .optional()
                    .map_err(ApiError::db_query)?;
                match owning {
                    Some(s) if s == school_id => {}
                    _ => {
                        return Err(ApiError::validation(format!(
                            "student {} does not belong to this school",
                            sid
                        )))
                    }
                }
            }
            ids
        }
        other => {
            return Err(ApiError::validation(format!(
                "scope must be class_wide or individual, got {}",
                other
            )))
        }
    };

    let fee_id = Uuid::new_v4().to_string();
    let now = chrono::Utc::now().to_rfc3339();

    let tx = conn.unchecked_transaction().map_err(ApiError::db_tx)?;
    tx.execute(
        "INSERT INTO fees(id, school_id, class_id, title, amount, due_date, scope, optional_flag, created_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?)",
        (
            &fee_id,
            &school_id,
            &class_id,
            &title,
            amount,
            &due_date,
            &scope,
            optional as i64,
            &now,
        ),
    )
    .map_err(|e| ApiError::db_update(e, "fees"))?;
    for sid in &eligible {
        tx.execute(
            "INSERT INTO fee_eligibility(fee_id, student_id, added_at) VALUES(?, ?, ?)",
            (&fee_id, sid, &now),
        )
        .map_err(|e| ApiError::db_update(e, "fee_eligibility"))?;
    }
    tx.commit().map_err(ApiError::db_tx)?;

    Ok(json!({ "feeId": fee_id, "eligibleCount": eligible.len() }))
}

fn fees_update(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, ApiError> {
    require_capability(params, Capability::ManageFees, "edit fees")?;

    let fee_id = get_required_str(params, "feeId")?;
    fetch_fee(conn, &fee_id)?;
    let Some(patch) = params.get("patch") else {
        return Err(ApiError::bad_params("missing patch"));
    };

    if let Some(amount) = patch.get("amount").and_then(|v| v.as_i64()) {
        if amount <= 0 {
            return Err(ApiError::validation("amount must be positive minor units"));
        }
        // Shrinking the fee below what any student has already paid would
        // drive that pair's balance negative.
        let max_collected: i64 = conn
            .query_row(
                "SELECT COALESCE(MAX(total), 0) FROM (
                   SELECT SUM(amount) AS total FROM payments WHERE fee_id = ? GROUP BY student_id
                 )",
                [&fee_id],
                |r| r.get(0),
            )
            .map_err(ApiError::db_query)?;
        if amount < max_collected {
            return Err(ApiError::validation(format!(
                "amount {} is below the {} already collected from a student",
                ledger::display_amount(amount),
                ledger::display_amount(max_collected),
            )));
        }
        conn.execute("UPDATE fees SET amount = ? WHERE id = ?", (amount, &fee_id))
            .map_err(|e| ApiError::db_update(e, "fees"))?;
    }
    if let Some(raw) = patch.get("dueDate").and_then(|v| v.as_str()) {
        let due_date = parse_due_date(raw)?;
        conn.execute(
            "UPDATE fees SET due_date = ? WHERE id = ?",
            (&due_date, &fee_id),
        )
        .map_err(|e| ApiError::db_update(e, "fees"))?;
    }

    Ok(json!({ "ok": true }))
}

fn fees_list(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, ApiError> {
    let school_id = get_required_str(params, "schoolId")?;

    let mut stmt = conn
        .prepare(
            "SELECT
               f.id,
               f.title,
               f.amount,
               f.due_date,
               f.scope,
               f.optional_flag,
               (SELECT COUNT(*) FROM fee_eligibility e WHERE e.fee_id = f.id) AS eligible_count,
               (SELECT COALESCE(SUM(p.amount), 0) FROM payments p WHERE p.fee_id = f.id) AS collected
             FROM fees f
             WHERE f.school_id = ?
             ORDER BY f.due_date, f.title",
        )
        .map_err(ApiError::db_query)?;
    let fees = stmt
        .query_map([&school_id], |r| {
            let amount: i64 = r.get(2)?;
            let eligible_count: i64 = r.get(6)?;
            let collected: i64 = r.get(7)?;
            Ok(json!({
                "id": r.get::<_, String>(0)?,
                "title": r.get::<_, String>(1)?,
                "amount": amount,
                "dueDate": r.get::<_, String>(3)?,
                "scope": r.get::<_, String>(4)?,
                "optional": r.get::<_, i64>(5)? != 0,
                "eligibleCount": eligible_count,
                "collected": collected,
                "outstanding": amount * eligible_count - collected
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(ApiError::db_query)?;

    Ok(json!({ "fees": fees }))
}

fn fees_add_eligibility(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, ApiError> {
    require_capability(params, Capability::ManageFees, "edit eligibility")?;

    let fee_id = get_required_str(params, "feeId")?;
    let student_ids = get_str_array(params, "studentIds")?;
    if student_ids.is_empty() {
        return Err(ApiError::validation("studentIds must not be empty"));
    }
    let fee = fetch_fee(conn, &fee_id)?;

    for sid in &student_ids {
        let owning: Option<String> = conn
            .query_row("SELECT school_id FROM students WHERE id = ?", [sid], |r| {
                r.get(0)
            })
            .optional()
            .map_err(ApiError::db_query)?;
        match owning {
            Some(s) if s == fee.school_id => {}
            _ => {
                return Err(ApiError::validation(format!(
                    "student {} does not belong to this school",
                    sid
                )))
            }
        }
    }

    let now = chrono::Utc::now().to_rfc3339();
    let tx = conn.unchecked_transaction().map_err(ApiError::db_tx)?;
    let mut added = 0usize;
    for sid in &student_ids {
        let n = tx
            .execute(
                "INSERT OR IGNORE INTO fee_eligibility(fee_id, student_id, added_at) VALUES(?, ?, ?)",
                (&fee_id, sid, &now),
            )
            .map_err(|e| ApiError::db_update(e, "fee_eligibility"))?;
        added += n;
    }
    tx.commit().map_err(ApiError::db_tx)?;

    Ok(json!({ "addedCount": added }))
}

fn fees_remove_eligibility(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, ApiError> {
    require_capability(params, Capability::ManageFees, "edit eligibility")?;

    let fee_id = get_required_str(params, "feeId")?;
    let student_id = get_required_str(params, "studentId")?;

    let exists: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM fee_eligibility WHERE fee_id = ? AND student_id = ?",
            (&fee_id, &student_id),
            |r| r.get(0),
        )
        .optional()
        .map_err(ApiError::db_query)?;
    if exists.is_none() {
        return Err(ApiError::not_found("eligibility record not found"));
    }

    // A paid pair keeps its eligibility row forever; dropping it would
    // orphan the payment history.
    let payment_count: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM payments WHERE fee_id = ? AND student_id = ?",
            (&fee_id, &student_id),
            |r| r.get(0),
        )
        .map_err(ApiError::db_query)?;
    if payment_count > 0 {
        return Err(ApiError::conflict(
            "student has recorded payments for this fee",
            Some(json!({ "paymentCount": payment_count })),
        ));
    }

    conn.execute(
        "DELETE FROM fee_eligibility WHERE fee_id = ? AND student_id = ?",
        (&fee_id, &student_id),
    )
    .map_err(|e| ApiError::db_update(e, "fee_eligibility"))?;

    Ok(json!({ "ok": true }))
}

fn fees_eligibility(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, ApiError> {
    let fee_id = get_required_str(params, "feeId")?;
    let fee = fetch_fee(conn, &fee_id)?;

    let mut stmt = conn
        .prepare(
            "SELECT e.student_id, s.last_name, s.first_name,
                    (SELECT COALESCE(SUM(p.amount), 0)
                     FROM payments p
                     WHERE p.fee_id = e.fee_id AND p.student_id = e.student_id) AS paid
             FROM fee_eligibility e
             JOIN students s ON s.id = e.student_id
             WHERE e.fee_id = ?
             ORDER BY s.last_name, s.first_name",
        )
        .map_err(ApiError::db_query)?;
    let rows = stmt
        .query_map([&fee_id], |r| {
            let last: String = r.get(1)?;
            let first: String = r.get(2)?;
            let paid: i64 = r.get(3)?;
            Ok((r.get::<_, String>(0)?, format!("{}, {}", last, first), paid))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(ApiError::db_query)?;

    let students: Vec<serde_json::Value> = rows
        .into_iter()
        .map(|(student_id, display_name, paid)| {
            let b = ledger::balance(fee.amount, paid);
            json!({
                "studentId": student_id,
                "displayName": display_name,
                "totalPaid": b.total_paid,
                "remaining": b.remaining,
                "isPaid": b.is_paid,
                "status": b.status().as_str()
            })
        })
        .collect();

    Ok(json!({
        "feeId": fee_id,
        "title": fee.title,
        "amount": fee.amount,
        "dueDate": fee.due_date,
        "students": students
    }))
}

fn fees_balance(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, ApiError> {
    require_capability(params, Capability::ViewBalances, "view balances")?;

    let fee_id = get_required_str(params, "feeId")?;
    let student_id = get_required_str(params, "studentId")?;
    let fee = fetch_fee(conn, &fee_id)?;

    let eligible: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM fee_eligibility WHERE fee_id = ? AND student_id = ?",
            (&fee_id, &student_id),
            |r| r.get(0),
        )
        .optional()
        .map_err(ApiError::db_query)?;
    if eligible.is_none() {
        return Err(ApiError::not_found("student is not eligible for this fee"));
    }

    let paid = total_paid(conn, &fee_id, &student_id)?;
    let b = ledger::balance(fee.amount, paid);
    Ok(json!({
        "totalPaid": b.total_paid,
        "remaining": b.remaining,
        "isPaid": b.is_paid,
        "status": b.status().as_str()
    }))
}

struct OverduePair {
    student_id: String,
    student_name: String,
    fee_title: String,
    remaining: i64,
}

fn fees_overdue_sweep(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, ApiError> {
    let Some(conn) = state.db.as_ref() else {
        return Err(ApiError::bad_params("select a workspace first"));
    };
    require_capability(params, Capability::RunSweep, "run the overdue sweep")?;

    let school_id = get_required_str(params, "schoolId")?;
    let as_of = match get_optional_str(params, "asOf") {
        Some(raw) => parse_due_date(&raw)?,
        None => chrono::Utc::now().format("%Y-%m-%d").to_string(),
    };

    let template = db::settings_get_json(conn, "sweep.reminder_template")
        .ok()
        .flatten()
        .and_then(|v| v.as_str().map(|s| s.to_string()))
        .unwrap_or_else(|| notify::DEFAULT_REMINDER_TEMPLATE.to_string());

    let mut stmt = conn
        .prepare(
            "SELECT e.student_id, s.last_name, s.first_name, f.title, f.amount,
                    (SELECT COALESCE(SUM(p.amount), 0)
                     FROM payments p
                     WHERE p.fee_id = e.fee_id AND p.student_id = e.student_id) AS paid
             FROM fee_eligibility e
             JOIN fees f ON f.id = e.fee_id
             JOIN students s ON s.id = e.student_id
             WHERE f.school_id = ? AND f.optional_flag = 0 AND f.due_date < ?",
        )
        .map_err(ApiError::db_query)?;
    let scanned_rows = stmt
        .query_map((&school_id, &as_of), |r| {
            let last: String = r.get(1)?;
            let first: String = r.get(2)?;
            let amount: i64 = r.get(4)?;
            let paid: i64 = r.get(5)?;
            Ok((
                r.get::<_, String>(0)?,
                format!("{} {}", first, last),
                r.get::<_, String>(3)?,
                amount,
                paid,
            ))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(ApiError::db_query)?;

    let scanned = scanned_rows.len();
    let overdue: Vec<OverduePair> = scanned_rows
        .into_iter()
        .filter_map(|(student_id, student_name, fee_title, amount, paid)| {
            let b = ledger::balance(amount, paid);
            if b.remaining > 0 {
                Some(OverduePair {
                    student_id,
                    student_name,
                    fee_title,
                    remaining: b.remaining,
                })
            } else {
                None
            }
        })
        .collect();

    let mut notified = 0usize;
    let mut failed = 0usize;
    for pair in &overdue {
        let message = notify::render_template(
            &template,
            &pair.student_name,
            &pair.fee_title,
            &ledger::display_amount(pair.remaining),
        );
        for phone in contact_numbers(conn, &pair.student_id)? {
            if notify::send_best_effort(
                conn,
                state.notifier.as_ref(),
                &school_id,
                &phone,
                &message,
                "reminder",
            ) {
                notified += 1;
            } else {
                failed += 1;
            }
        }
    }

    Ok(json!({
        "asOf": as_of,
        "scanned": scanned,
        "overdue": overdue.len(),
        "notified": notified,
        "failed": failed
    }))
}

pub fn contact_numbers(conn: &Connection, student_id: &str) -> Result<Vec<String>, ApiError> {
    let mut numbers: Vec<String> = Vec::new();
    let own: Option<Option<String>> = conn
        .query_row("SELECT phone FROM students WHERE id = ?", [student_id], |r| {
            r.get(0)
        })
        .optional()
        .map_err(ApiError::db_query)?;
    if let Some(Some(phone)) = own {
        if !phone.trim().is_empty() {
            numbers.push(phone);
        }
    }
    let mut stmt = conn
        .prepare("SELECT phone FROM guardians WHERE student_id = ? ORDER BY name")
        .map_err(ApiError::db_query)?;
    let guardian_phones = stmt
        .query_map([student_id], |r| r.get::<_, String>(0))
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(ApiError::db_query)?;
    numbers.extend(guardian_phones);
    Ok(numbers)
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

fn handle_overdue_sweep(state: &mut AppState, req: &Request) -> serde_json::Value {
    if state.db.is_none() {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    }
    match fees_overdue_sweep(state, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "fees.create" => Some(dispatch(state, req, fees_create)),
        "fees.update" => Some(dispatch(state, req, fees_update)),
        "fees.list" => Some(dispatch(state, req, fees_list)),
        "fees.addEligibility" => Some(dispatch(state, req, fees_add_eligibility)),
        "fees.removeEligibility" => Some(dispatch(state, req, fees_remove_eligibility)),
        "fees.eligibility" => Some(dispatch(state, req, fees_eligibility)),
        "fees.balance" => Some(dispatch(state, req, fees_balance)),
        "fees.overdueSweep" => Some(handle_overdue_sweep(state, req)),
        _ => None,
    }
}
