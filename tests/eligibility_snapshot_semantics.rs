
use serde_json::json;
use test_support::{error_code, request, request_ok, seed_roster, spawn_sidecar, temp_dir};

// Eligibility is captured once at fee creation: later enrollment changes
// never rewrite the set.
#[test]
fn class_wide_snapshot_ignores_later_enrollment() {
    let workspace = temp_dir("bursard-snapshot");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let seed = seed_roster(&mut stdin, &mut reader, &workspace, 2);

    let fee = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "fees.create",
        json!({
            "role": "admin",
            "schoolId": seed.school_id,
            "classId": seed.class_id,
            "title": "Sports Levy",
            "amount": 20_000,
            "dueDate": "2026-10-15",
            "scope": "class_wide"
        }),
    );
    let fee_id = fee.get("feeId").and_then(|v| v.as_str()).expect("feeId");
    assert_eq!(fee.get("eligibleCount").and_then(|v| v.as_i64()), Some(2));

    // A student who joins after the snapshot owes nothing.
    let late = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "students.create",
        json!({
            "role": "teacher",
            "schoolId": seed.school_id,
            "classId": seed.class_id,
            "lastName": "Latecomer",
            "firstName": "Lola"
        }),
    );
    let late_id = late
        .get("studentId")
        .and_then(|v| v.as_str())
        .expect("studentId");

    let eligibility = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "fees.eligibility",
        json!({ "feeId": fee_id }),
    );
    let students = eligibility
        .get("students")
        .and_then(|v| v.as_array())
        .expect("students");
    assert_eq!(students.len(), 2);
    assert!(students
        .iter()
        .all(|s| s.get("studentId").and_then(|v| v.as_str()) != Some(late_id)));

    let balance = request(
        &mut stdin,
        &mut reader,
        "4",
        "fees.balance",
        json!({ "role": "admin", "feeId": fee_id, "studentId": late_id }),
    );
    assert_eq!(error_code(&balance), "not_found");

    // Moving an eligible student to another class keeps the snapshot.
    let other_class = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "classes.create",
        json!({ "role": "admin", "schoolId": seed.school_id, "name": "JSS1B" }),
    );
    let other_class_id = other_class
        .get("classId")
        .and_then(|v| v.as_str())
        .expect("classId");
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "students.setClass",
        json!({
            "role": "admin",
            "studentId": seed.student_ids[0],
            "classId": other_class_id
        }),
    );
    let after_move = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "fees.eligibility",
        json!({ "feeId": fee_id }),
    );
    assert_eq!(
        after_move
            .get("students")
            .and_then(|v| v.as_array())
            .map(|a| a.len()),
        Some(2)
    );

    // Explicit admin additions are still allowed.
    let added = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "fees.addEligibility",
        json!({ "role": "admin", "feeId": fee_id, "studentIds": [late_id] }),
    );
    assert_eq!(added.get("addedCount").and_then(|v| v.as_i64()), Some(1));

    // Re-adding is an idempotent no-op, not an error.
    let re_added = request_ok(
        &mut stdin,
        &mut reader,
        "9",
        "fees.addEligibility",
        json!({ "role": "admin", "feeId": fee_id, "studentIds": [late_id] }),
    );
    assert_eq!(re_added.get("addedCount").and_then(|v| v.as_i64()), Some(0));

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn individual_scope_is_all_or_nothing_across_tenants() {
    let workspace = temp_dir("bursard-individual-tenant");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let seed = seed_roster(&mut stdin, &mut reader, &workspace, 2);

    // A second school with its own roster.
    let other_school = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "schools.create",
        json!({ "role": "admin", "name": "Riverside College" }),
    );
    let other_school_id = other_school
        .get("schoolId")
        .and_then(|v| v.as_str())
        .expect("schoolId");
    let other_class = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "classes.create",
        json!({ "role": "admin", "schoolId": other_school_id, "name": "SS1" }),
    );
    let other_class_id = other_class
        .get("classId")
        .and_then(|v| v.as_str())
        .expect("classId");
    let foreign = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "students.create",
        json!({
            "role": "admin",
            "schoolId": other_school_id,
            "classId": other_class_id,
            "lastName": "Foreign",
            "firstName": "Sam"
        }),
    );
    let foreign_id = foreign
        .get("studentId")
        .and_then(|v| v.as_str())
        .expect("studentId");

    let resp = request(
        &mut stdin,
        &mut reader,
        "4",
        "fees.create",
        json!({
            "role": "admin",
            "schoolId": seed.school_id,
            "title": "Excursion",
            "amount": 15_000,
            "dueDate": "2026-11-01",
            "scope": "individual",
            "studentIds": [seed.student_ids[0], foreign_id]
        }),
    );
    assert_eq!(error_code(&resp), "validation_failed");

    // Nothing was created for either student.
    let fees = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "fees.list",
        json!({ "schoolId": seed.school_id }),
    );
    assert_eq!(
        fees.get("fees").and_then(|v| v.as_array()).map(|a| a.len()),
        Some(0)
    );

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn unknown_scope_and_bad_due_date_are_rejected() {
    let workspace = temp_dir("bursard-fee-validation");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let seed = seed_roster(&mut stdin, &mut reader, &workspace, 1);

    let bad_scope = request(
        &mut stdin,
        &mut reader,
        "1",
        "fees.create",
        json!({
            "role": "admin",
            "schoolId": seed.school_id,
            "classId": seed.class_id,
            "title": "X",
            "amount": 1_000,
            "dueDate": "2026-09-30",
            "scope": "school_wide"
        }),
    );
    assert_eq!(error_code(&bad_scope), "validation_failed");

    let bad_date = request(
        &mut stdin,
        &mut reader,
        "2",
        "fees.create",
        json!({
            "role": "admin",
            "schoolId": seed.school_id,
            "classId": seed.class_id,
            "title": "X",
            "amount": 1_000,
            "dueDate": "30/09/2026",
            "scope": "class_wide"
        }),
    );
    assert_eq!(error_code(&bad_date), "validation_failed");

    let bad_amount = request(
        &mut stdin,
        &mut reader,
        "3",
        "fees.create",
        json!({
            "role": "admin",
            "schoolId": seed.school_id,
            "classId": seed.class_id,
            "title": "X",
            "amount": 0,
            "dueDate": "2026-09-30",
            "scope": "class_wide"
        }),
    );
    assert_eq!(error_code(&bad_amount), "validation_failed");

    let _ = std::fs::remove_dir_all(workspace);
}
