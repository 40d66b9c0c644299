mod test_support;

use serde_json::json;
use test_support::{boot, request_err_code, request_ok, seed_college, seed_student};

#[test]
fn mutating_calls_against_a_superseded_date_fail_with_stale_sheet() {
    let (_child, mut stdin, mut reader, _ws) = boot("attendd-stale-sheet");
    let college_id = seed_college(&mut stdin, &mut reader, "North College", "NC");
    let s1 = seed_student(
        &mut stdin, &mut reader, &college_id, "NC-001", "Ada Lovelace", "CS", 1, "active",
    );

    let first = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "attendance.sheetOpen",
        json!({ "date": "2024-09-02" }),
    );
    let second = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "attendance.sheetOpen",
        json!({ "date": "2024-09-03" }),
    );

    // Each load advances the sheet sequence; the newest load owns the view.
    let seq1 = first.get("sheetSeq").and_then(|v| v.as_u64()).expect("seq");
    let seq2 = second.get("sheetSeq").and_then(|v| v.as_u64()).expect("seq");
    assert!(seq2 > seq1);

    // Edits addressed to the superseded date are refused, so a stale screen
    // can never write into the newer view.
    let code = request_err_code(
        &mut stdin,
        &mut reader,
        "3",
        "attendance.setStatus",
        json!({ "date": "2024-09-02", "studentId": s1.clone(), "status": "present" }),
    );
    assert_eq!(code, "stale_sheet");

    let code = request_err_code(
        &mut stdin,
        &mut reader,
        "4",
        "attendance.save",
        json!({ "date": "2024-09-02" }),
    );
    assert_eq!(code, "stale_sheet");

    // The current date still works end to end.
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "attendance.setStatus",
        json!({ "date": "2024-09-03", "studentId": s1, "status": "present" }),
    );
    let saved = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "attendance.save",
        json!({ "date": "2024-09-03" }),
    );
    assert_eq!(saved.get("saved").and_then(|v| v.as_u64()), Some(1));
}

#[test]
fn sign_out_drops_the_open_sheet() {
    let (_child, mut stdin, mut reader, _ws) = boot("attendd-signout-sheet");
    let college_id = seed_college(&mut stdin, &mut reader, "North College", "NC");
    let _ = seed_student(
        &mut stdin, &mut reader, &college_id, "NC-001", "Ada Lovelace", "CS", 1, "active",
    );

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "attendance.sheetOpen",
        json!({ "date": "2024-09-02" }),
    );
    let _ = request_ok(&mut stdin, &mut reader, "2", "auth.signOut", json!({}));

    let code = request_err_code(
        &mut stdin,
        &mut reader,
        "3",
        "attendance.sheetView",
        json!({}),
    );
    assert_eq!(code, "no_sheet");
}
