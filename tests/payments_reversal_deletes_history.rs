
use serde_json::json;
use test_support::{error_code, request, request_ok, seed_roster, spawn_sidecar, temp_dir};

// Reversal is a hard delete of the payment and its mirror, not a
// contra-entry. The pair's state walks backwards and the trail is gone.
#[test]
fn reversal_removes_payment_and_ledger_mirror() {
    let workspace = temp_dir("bursard-reversal");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let seed = seed_roster(&mut stdin, &mut reader, &workspace, 1);
    let s1 = &seed.student_ids[0];

    let fee = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "fees.create",
        json!({
            "role": "admin",
            "schoolId": seed.school_id,
            "classId": seed.class_id,
            "title": "Uniform Fee",
            "amount": 50_000,
            "dueDate": "2026-09-30",
            "scope": "class_wide"
        }),
    );
    let fee_id = fee.get("feeId").and_then(|v| v.as_str()).expect("feeId");

    let paid = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "payments.record",
        json!({ "role": "bursar", "feeId": fee_id, "studentId": s1, "amount": 50_000 }),
    );
    assert_eq!(paid.get("isPaid").and_then(|v| v.as_bool()), Some(true));
    let payment_id = paid
        .get("paymentId")
        .and_then(|v| v.as_str())
        .expect("paymentId");

    let ledger_before = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "ledger.list",
        json!({ "role": "bursar", "schoolId": seed.school_id, "account": "fees_receivable" }),
    );
    assert_eq!(
        ledger_before
            .get("entries")
            .and_then(|v| v.as_array())
            .map(|a| a.len()),
        Some(1)
    );

    let reversed = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "payments.reverse",
        json!({ "role": "admin", "paymentId": payment_id }),
    );
    assert_eq!(reversed.get("amount").and_then(|v| v.as_i64()), Some(50_000));

    // paid -> unpaid, straight backwards.
    let balance = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "fees.balance",
        json!({ "role": "admin", "feeId": fee_id, "studentId": s1 }),
    );
    assert_eq!(balance.get("totalPaid").and_then(|v| v.as_i64()), Some(0));
    assert_eq!(balance.get("status").and_then(|v| v.as_str()), Some("unpaid"));

    let payments = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "payments.list",
        json!({ "feeId": fee_id }),
    );
    assert_eq!(
        payments
            .get("payments")
            .and_then(|v| v.as_array())
            .map(|a| a.len()),
        Some(0)
    );

    let ledger_after = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "ledger.list",
        json!({ "role": "bursar", "schoolId": seed.school_id, "account": "fees_receivable" }),
    );
    assert_eq!(
        ledger_after
            .get("entries")
            .and_then(|v| v.as_array())
            .map(|a| a.len()),
        Some(0)
    );

    // Reversing twice is not found: the record no longer exists.
    let gone = request(
        &mut stdin,
        &mut reader,
        "8",
        "payments.reverse",
        json!({ "role": "admin", "paymentId": payment_id }),
    );
    assert_eq!(error_code(&gone), "not_found");

    let _ = std::fs::remove_dir_all(workspace);
}
