
use serde_json::json;
use test_support::{request, request_ok, seed_roster, spawn_sidecar, temp_dir};

#[test]
fn router_dispatch_smoke_covers_handler_families() {
    let workspace = temp_dir("bursard-router-smoke");
    let bundle_out = workspace.join("smoke-backup.bursarbackup.zip");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request(&mut stdin, &mut reader, "1", "health", json!({}));
    let seed = seed_roster(&mut stdin, &mut reader, &workspace, 1);

    let _ = request_ok(&mut stdin, &mut reader, "2", "schools.list", json!({}));
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "classes.list",
        json!({ "schoolId": seed.school_id }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "students.list",
        json!({ "classId": seed.class_id }),
    );

    let fee = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "fees.create",
        json!({
            "role": "admin",
            "schoolId": seed.school_id,
            "classId": seed.class_id,
            "title": "Smoke Fee",
            "amount": 10_000,
            "dueDate": "2026-09-01",
            "scope": "class_wide"
        }),
    );
    let fee_id = fee
        .get("feeId")
        .and_then(|v| v.as_str())
        .expect("feeId")
        .to_string();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "fees.list",
        json!({ "schoolId": seed.school_id }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "fees.eligibility",
        json!({ "feeId": fee_id }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "fees.balance",
        json!({ "role": "parent", "feeId": fee_id, "studentId": seed.student_ids[0] }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "9",
        "payments.record",
        json!({
            "role": "bursar",
            "feeId": fee_id,
            "studentId": seed.student_ids[0],
            "amount": 2_500
        }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "10",
        "payments.list",
        json!({ "feeId": fee_id }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "11",
        "ledger.list",
        json!({ "role": "bursar", "schoolId": seed.school_id }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "12",
        "notifications.list",
        json!({ "schoolId": seed.school_id }),
    );

    let staff = request_ok(
        &mut stdin,
        &mut reader,
        "13",
        "staff.create",
        json!({
            "role": "admin",
            "schoolId": seed.school_id,
            "lastName": "Okafor",
            "firstName": "Ngozi",
            "roleTitle": "Teacher",
            "baseSalary": 120_000
        }),
    );
    let staff_id = staff
        .get("staffId")
        .and_then(|v| v.as_str())
        .expect("staffId")
        .to_string();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "14",
        "staff.list",
        json!({ "schoolId": seed.school_id }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "15",
        "payroll.recordSalary",
        json!({ "role": "bursar", "staffId": staff_id, "month": "2026-08" }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "16",
        "fees.overdueSweep",
        json!({ "role": "bursar", "schoolId": seed.school_id }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "17",
        "backup.exportWorkspaceBundle",
        json!({
            "role": "admin",
            "workspacePath": workspace.to_string_lossy(),
            "outPath": bundle_out.to_string_lossy()
        }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "18",
        "backup.importWorkspaceBundle",
        json!({
            "role": "admin",
            "workspacePath": workspace.to_string_lossy(),
            "inPath": bundle_out.to_string_lossy()
        }),
    );

    let unknown = request(&mut stdin, &mut reader, "19", "fees.destroyAll", json!({}));
    assert_eq!(
        test_support::error_code(&unknown),
        "not_implemented"
    );

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
