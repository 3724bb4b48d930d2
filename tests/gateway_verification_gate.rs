
use serde_json::json;
use test_support::{error_code, request, request_ok, seed_roster, spawn_sidecar, temp_dir};

fn write_verifications(workspace: &std::path::Path, body: &str) {
    std::fs::write(workspace.join("gateway-verifications.json"), body)
        .expect("write gateway fixtures");
}

#[test]
fn unverifiable_reference_records_nothing() {
    let workspace = temp_dir("bursard-gateway-unverified");
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
            "title": "Boarding Fee",
            "amount": 50_000,
            "dueDate": "2026-09-30",
            "scope": "class_wide"
        }),
    );
    let fee_id = fee.get("feeId").and_then(|v| v.as_str()).expect("feeId");

    // No verification source at all.
    let no_source = request(
        &mut stdin,
        &mut reader,
        "2",
        "payments.recordGateway",
        json!({
            "role": "parent",
            "feeId": fee_id,
            "studentId": s1,
            "amount": 30_000,
            "reference": "TXN-1"
        }),
    );
    assert_eq!(error_code(&no_source), "external_service_failed");

    // Source present but the reference is unknown.
    write_verifications(
        &workspace,
        r#"{"TXN-OTHER": {"status": "success", "amountMinorUnits": 30000}}"#,
    );
    let unknown_ref = request(
        &mut stdin,
        &mut reader,
        "3",
        "payments.recordGateway",
        json!({
            "role": "parent",
            "feeId": fee_id,
            "studentId": s1,
            "amount": 30_000,
            "reference": "TXN-1"
        }),
    );
    assert_eq!(error_code(&unknown_ref), "external_service_failed");

    // A declined settlement is equally fatal.
    write_verifications(
        &workspace,
        r#"{"TXN-1": {"status": "declined", "amountMinorUnits": 30000}}"#,
    );
    let declined = request(
        &mut stdin,
        &mut reader,
        "4",
        "payments.recordGateway",
        json!({
            "role": "parent",
            "feeId": fee_id,
            "studentId": s1,
            "amount": 30_000,
            "reference": "TXN-1"
        }),
    );
    assert_eq!(error_code(&declined), "external_service_failed");

    let payments = request_ok(
        &mut stdin,
        &mut reader,
        "5",
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

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn amount_mismatch_beyond_tolerance_is_rejected() {
    let workspace = temp_dir("bursard-gateway-mismatch");
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
            "title": "Boarding Fee",
            "amount": 50_000,
            "dueDate": "2026-09-30",
            "scope": "class_wide"
        }),
    );
    let fee_id = fee.get("feeId").and_then(|v| v.as_str()).expect("feeId");

    // Settled 298.50 against a submitted 300.00: past the default
    // 100-minor-unit tolerance.
    write_verifications(
        &workspace,
        r#"{"TXN-SHORT": {"status": "success", "amountMinorUnits": 29850}}"#,
    );
    let mismatch = request(
        &mut stdin,
        &mut reader,
        "2",
        "payments.recordGateway",
        json!({
            "role": "parent",
            "feeId": fee_id,
            "studentId": s1,
            "amount": 30_000,
            "reference": "TXN-SHORT"
        }),
    );
    assert_eq!(error_code(&mismatch), "validation_failed");

    // Within the rounding tolerance the submitted amount is accepted.
    write_verifications(
        &workspace,
        r#"{"TXN-NEAR": {"status": "success", "amountMinorUnits": 29950}}"#,
    );
    let near = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "payments.recordGateway",
        json!({
            "role": "parent",
            "feeId": fee_id,
            "studentId": s1,
            "amount": 30_000,
            "reference": "TXN-NEAR"
        }),
    );
    assert_eq!(near.get("totalPaid").and_then(|v| v.as_i64()), Some(30_000));

    let payments = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "payments.list",
        json!({ "feeId": fee_id }),
    );
    let rows = payments
        .get("payments")
        .and_then(|v| v.as_array())
        .expect("payments");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("method").and_then(|v| v.as_str()), Some("gateway"));
    assert_eq!(
        rows[0].get("reference").and_then(|v| v.as_str()),
        Some("TXN-NEAR")
    );

    let _ = std::fs::remove_dir_all(workspace);
}
