use crate::db;
use crate::ipc::error::{err, ok, ApiError};
use crate::ipc::helpers::{
    get_optional_str, get_required_i64, get_required_str, require_capability,
};
use crate::ipc::types::{AppState, Request};
use crate::ledger;
use crate::ledger::DomainError;
use crate::notify;
use crate::roles::Capability;
use chrono::{Duration, Utc};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

struct FeeRow {
    school_id: String,
    title: String,
    amount: i64,
}

fn fetch_fee(conn: &Connection, fee_id: &str) -> Result<FeeRow, ApiError> {
    conn.query_row(
        "SELECT school_id, title, amount FROM fees WHERE id = ?",
        [fee_id],
        |r| {
            Ok(FeeRow {
                school_id: r.get(0)?,
                title: r.get(1)?,
                amount: r.get(2)?,
            })
        },
    )
    .optional()
    .map_err(ApiError::db_query)?
    .ok_or_else(|| DomainError::NotFound("fee not found".to_string()).into())
}

fn student_full_name(conn: &Connection, student_id: &str) -> Result<String, ApiError> {
    conn.query_row(
        "SELECT first_name, last_name FROM students WHERE id = ?",
        [student_id],
        |r| {
            let first: String = r.get(0)?;
            let last: String = r.get(1)?;
            Ok(format!("{} {}", first, last))
        },
    )
    .optional()
    .map_err(ApiError::db_query)?
    .ok_or_else(|| ApiError::not_found("student not found"))
}

/// Validate and persist one payment plus its ledger mirror. The whole
/// read-total, check-cap, write-payment, write-mirror sequence runs in one
/// transaction so the mirror can never drift from the payment set.
fn insert_payment(
    conn: &Connection,
    fee: &FeeRow,
    fee_id: &str,
    student_id: &str,
    amount: i64,
    method: &str,
    reference: Option<&str>,
) -> Result<(String, ledger::Balance), ApiError> {
    let eligible: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM fee_eligibility WHERE fee_id = ? AND student_id = ?",
            (fee_id, student_id),
            |r| r.get(0),
        )
        .optional()
        .map_err(ApiError::db_query)?;
    if eligible.is_none() {
        return Err(ApiError::not_found("student is not eligible for this fee"));
    }

    // Same amount for the same pair inside the window is treated as a
    // replayed submission. This is a heuristic, not an idempotency key: a
    // replay with a different amount walks straight through.
    let cutoff = (Utc::now() - Duration::minutes(ledger::DUPLICATE_WINDOW_MINUTES)).to_rfc3339();
    let duplicates: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM payments
             WHERE fee_id = ? AND student_id = ? AND amount = ? AND paid_at >= ?",
            (fee_id, student_id, amount, &cutoff),
            |r| r.get(0),
        )
        .map_err(ApiError::db_query)?;
    if duplicates > 0 {
        return Err(ApiError::conflict(
            "an identical payment was recorded moments ago",
            Some(json!({ "reason": "duplicate_window" })),
        ));
    }

    let tx = conn.unchecked_transaction().map_err(ApiError::db_tx)?;

    let total_paid: i64 = tx
        .query_row(
            "SELECT COALESCE(SUM(amount), 0) FROM payments WHERE fee_id = ? AND student_id = ?",
            (fee_id, student_id),
            |r| r.get(0),
        )
        .map_err(ApiError::db_query)?;
    ledger::check_new_payment(fee.amount, total_paid, amount)?;

    let payment_id = Uuid::new_v4().to_string();
    let now = Utc::now().to_rfc3339();
    tx.execute(
        "INSERT INTO payments(id, fee_id, student_id, amount, method, reference, paid_at)
         VALUES(?, ?, ?, ?, ?, ?, ?)",
        (
            &payment_id,
            fee_id,
            student_id,
            amount,
            method,
            &reference,
            &now,
        ),
    )
    .map_err(|e| ApiError::db_update(e, "payments"))?;
    tx.execute(
        "INSERT INTO ledger_transactions(id, school_id, account, amount, entry_type, description, student_id, fee_id, payment_id, recorded_at)
         VALUES(?, ?, 'fees_receivable', ?, 'credit', ?, ?, ?, ?, ?)",
        (
            Uuid::new_v4().to_string(),
            &fee.school_id,
            amount,
            format!("Fee payment: {}", fee.title),
            student_id,
            fee_id,
            &payment_id,
            &now,
        ),
    )
    .map_err(|e| ApiError::db_update(e, "ledger_transactions"))?;

    tx.commit().map_err(ApiError::db_tx)?;

    Ok((payment_id, ledger::balance(fee.amount, total_paid + amount)))
}

fn send_receipts(
    state: &AppState,
    conn: &Connection,
    fee: &FeeRow,
    student_id: &str,
    student_name: &str,
    amount: i64,
    balance: ledger::Balance,
) -> usize {
    let message = notify::receipt_message(
        student_name,
        &fee.title,
        &ledger::display_amount(amount),
        &ledger::display_amount(balance.remaining),
    );
    let numbers = match super::fees::contact_numbers(conn, student_id) {
        Ok(v) => v,
        Err(_) => return 0,
    };
    let mut sent = 0usize;
    for phone in numbers {
        if notify::send_best_effort(
            conn,
            state.notifier.as_ref(),
            &fee.school_id,
            &phone,
            &message,
            "receipt",
        ) {
            sent += 1;
        }
    }
    sent
}

fn payments_record(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, ApiError> {
    let Some(conn) = state.db.as_ref() else {
        return Err(ApiError::bad_params("select a workspace first"));
    };
    require_capability(params, Capability::RecordPayment, "record payments")?;

    let fee_id = get_required_str(params, "feeId")?;
    let student_id = get_required_str(params, "studentId")?;
    let amount = get_required_i64(params, "amount")?;
    let reference = get_optional_str(params, "reference");

    let fee = fetch_fee(conn, &fee_id)?;
    let student_name = student_full_name(conn, &student_id)?;
    let (payment_id, balance) = insert_payment(
        conn,
        &fee,
        &fee_id,
        &student_id,
        amount,
        "manual",
        reference.as_deref(),
    )?;
    let receipts = send_receipts(state, conn, &fee, &student_id, &student_name, amount, balance);

    Ok(json!({
        "paymentId": payment_id,
        "totalPaid": balance.total_paid,
        "remaining": balance.remaining,
        "isPaid": balance.is_paid,
        "status": balance.status().as_str(),
        "receiptsSent": receipts
    }))
}

fn payments_record_gateway(
    state: &AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, ApiError> {
    let Some(conn) = state.db.as_ref() else {
        return Err(ApiError::bad_params("select a workspace first"));
    };
    require_capability(params, Capability::RecordGatewayPayment, "record gateway payments")?;

    let fee_id = get_required_str(params, "feeId")?;
    let student_id = get_required_str(params, "studentId")?;
    let amount = get_required_i64(params, "amount")?;
    let reference = get_required_str(params, "reference")?;

    let Some(gateway) = state.gateway.as_ref() else {
        return Err(ApiError::external("payment gateway not configured"));
    };
    // Verification gates everything: no payment row exists until the
    // gateway confirms the reference settled.
    let verification = gateway
        .verify(&reference)
        .map_err(|e| DomainError::External(e.to_string()))?;
    if !verification.is_successful() {
        return Err(DomainError::External(format!(
            "transaction {} not settled (status: {})",
            reference, verification.status
        ))
        .into());
    }

    let tolerance = db::settings_get_json(conn, "gateway.amount_tolerance")
        .ok()
        .flatten()
        .and_then(|v| v.as_i64())
        .unwrap_or(ledger::DEFAULT_GATEWAY_TOLERANCE);
    if !ledger::amount_within_tolerance(amount, verification.amount_minor, tolerance) {
        return Err(ApiError::validation(format!(
            "gateway settled {} but {} was submitted",
            ledger::display_amount(verification.amount_minor),
            ledger::display_amount(amount),
        )));
    }

    let fee = fetch_fee(conn, &fee_id)?;
    let student_name = student_full_name(conn, &student_id)?;
    let (payment_id, balance) = insert_payment(
        conn,
        &fee,
        &fee_id,
        &student_id,
        amount,
        "gateway",
        Some(&reference),
    )?;
    let receipts = send_receipts(state, conn, &fee, &student_id, &student_name, amount, balance);

    Ok(json!({
        "paymentId": payment_id,
        "totalPaid": balance.total_paid,
        "remaining": balance.remaining,
        "isPaid": balance.is_paid,
        "status": balance.status().as_str(),
        "receiptsSent": receipts
    }))
}

fn payments_list(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, ApiError> {
    let fee_id = get_optional_str(params, "feeId");
    let student_id = get_optional_str(params, "studentId");

    let (sql, key) = match (fee_id, student_id) {
        (Some(f), None) => (
            "SELECT id, fee_id, student_id, amount, method, reference, paid_at
             FROM payments WHERE fee_id = ? ORDER BY paid_at DESC",
            f,
        ),
        (None, Some(s)) => (
            "SELECT id, fee_id, student_id, amount, method, reference, paid_at
             FROM payments WHERE student_id = ? ORDER BY paid_at DESC",
            s,
        ),
        _ => {
            return Err(ApiError::bad_params(
                "provide exactly one of feeId or studentId",
            ))
        }
    };

    let mut stmt = conn.prepare(sql).map_err(ApiError::db_query)?;
    let payments = stmt
        .query_map([&key], |r| {
            Ok(json!({
                "id": r.get::<_, String>(0)?,
                "feeId": r.get::<_, String>(1)?,
                "studentId": r.get::<_, String>(2)?,
                "amount": r.get::<_, i64>(3)?,
                "method": r.get::<_, String>(4)?,
                "reference": r.get::<_, Option<String>>(5)?,
                "paidAt": r.get::<_, String>(6)?
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(ApiError::db_query)?;

    Ok(json!({ "payments": payments }))
}

fn payments_reverse(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, ApiError> {
    require_capability(params, Capability::ReversePayment, "reverse payments")?;

    let payment_id = get_required_str(params, "paymentId")?;

    let row: Option<(String, String, i64)> = conn
        .query_row(
            "SELECT fee_id, student_id, amount FROM payments WHERE id = ?",
            [&payment_id],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
        )
        .optional()
        .map_err(ApiError::db_query)?;
    let Some((fee_id, student_id, amount)) = row else {
        return Err(ApiError::not_found("payment not found"));
    };

    // Hard delete of the payment and its mirror. The pair's history is
    // gone afterwards; there is no contra-entry.
    let tx = conn.unchecked_transaction().map_err(ApiError::db_tx)?;
    tx.execute(
        "DELETE FROM ledger_transactions WHERE payment_id = ?",
        [&payment_id],
    )
    .map_err(|e| ApiError::db_update(e, "ledger_transactions"))?;
    tx.execute("DELETE FROM payments WHERE id = ?", [&payment_id])
        .map_err(|e| ApiError::db_update(e, "payments"))?;
    tx.commit().map_err(ApiError::db_tx)?;

    Ok(json!({
        "ok": true,
        "feeId": fee_id,
        "studentId": student_id,
        "amount": amount
    }))
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

fn dispatch_with_state(
    state: &mut AppState,
    req: &Request,
    op: fn(&AppState, &serde_json::Value) -> Result<serde_json::Value, ApiError>,
) -> serde_json::Value {
    if state.db.is_none() {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    }
    match op(state, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "payments.record" => Some(dispatch_with_state(state, req, payments_record)),
        "payments.recordGateway" => Some(dispatch_with_state(state, req, payments_record_gateway)),
        "payments.list" => Some(dispatch(state, req, payments_list)),
        "payments.reverse" => Some(dispatch(state, req, payments_reverse)),
        _ => None,
    }
}
