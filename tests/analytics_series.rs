mod test_support;

use serde_json::json;
use test_support::{boot, request_ok, seed_college, seed_student};

#[test]
fn year_buckets_are_fixed_and_status_slices_are_grouped_with_colors() {
    let (_child, mut stdin, mut reader, _ws) = boot("attendd-analytics-groups");
    let college_id = seed_college(&mut stdin, &mut reader, "North College", "NC");

    let _ = seed_student(
        &mut stdin, &mut reader, &college_id, "A1", "A One", "CS", 1, "active",
    );
    let _ = seed_student(
        &mut stdin, &mut reader, &college_id, "A2", "A Two", "CS", 1, "active",
    );
    let _ = seed_student(
        &mut stdin, &mut reader, &college_id, "G1", "G One", "CS", 4, "graduated",
    );

    let years = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "analytics.studentsByYear",
        json!({}),
    );
    let buckets = years
        .get("years")
        .and_then(|v| v.as_array())
        .cloned()
        .expect("years");
    // All four buckets, zeroes included, graduated student not counted.
    assert_eq!(buckets.len(), 4);
    let counts: Vec<u64> = buckets
        .iter()
        .map(|b| b.get("count").and_then(|v| v.as_u64()).expect("count"))
        .collect();
    assert_eq!(counts, vec![2, 0, 0, 0]);

    let statuses = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "analytics.studentsByStatus",
        json!({}),
    );
    let slices = statuses
        .get("statuses")
        .and_then(|v| v.as_array())
        .cloned()
        .expect("statuses");
    // Two active + one graduated means exactly two slices.
    assert_eq!(slices.len(), 2);
    let find = |label: &str| {
        slices
            .iter()
            .find(|s| s.get("status").and_then(|v| v.as_str()) == Some(label))
            .cloned()
            .unwrap_or_else(|| panic!("missing slice {label}"))
    };
    let active = find("Active");
    assert_eq!(active.get("count").and_then(|v| v.as_u64()), Some(2));
    assert_eq!(
        active.get("fill").and_then(|v| v.as_str()),
        Some("hsl(var(--chart-1))")
    );
    let graduated = find("Graduated");
    assert_eq!(graduated.get("count").and_then(|v| v.as_u64()), Some(1));
    assert_eq!(
        graduated.get("fill").and_then(|v| v.as_str()),
        Some("hsl(var(--chart-3))")
    );
}

#[test]
fn attendance_trend_buckets_only_marked_days_within_the_window() {
    let (_child, mut stdin, mut reader, _ws) = boot("attendd-analytics-trend");
    let college_id = seed_college(&mut stdin, &mut reader, "North College", "NC");
    let s1 = seed_student(
        &mut stdin, &mut reader, &college_id, "A1", "A One", "CS", 1, "active",
    );
    let s2 = seed_student(
        &mut stdin, &mut reader, &college_id, "A2", "A Two", "CS", 1, "active",
    );

    // Mark two separate days inside the window and one outside it.
    for (i, (date, marks)) in [
        ("2024-09-01", vec![(&s1, "present")]),
        ("2024-09-08", vec![(&s1, "present"), (&s2, "absent")]),
        ("2024-09-10", vec![(&s1, "late")]),
    ]
    .iter()
    .enumerate()
    {
        let _ = request_ok(
            &mut stdin,
            &mut reader,
            &format!("open-{i}"),
            "attendance.sheetOpen",
            json!({ "date": date }),
        );
        for (j, (sid, status)) in marks.iter().enumerate() {
            let _ = request_ok(
                &mut stdin,
                &mut reader,
                &format!("mark-{i}-{j}"),
                "attendance.setStatus",
                json!({ "date": date, "studentId": sid, "status": status }),
            );
        }
        let _ = request_ok(
            &mut stdin,
            &mut reader,
            &format!("save-{i}"),
            "attendance.save",
            json!({ "date": date }),
        );
    }

    let trend = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "analytics.attendanceByDate",
        json!({ "date": "2024-09-10", "days": 7 }),
    );
    let series = trend
        .get("series")
        .and_then(|v| v.as_array())
        .cloned()
        .expect("series");

    // 2024-09-01 is outside the 7-day window; 09-09 had no marks and is not
    // synthesized as a zero bucket. Ascending order.
    let dates: Vec<&str> = series
        .iter()
        .map(|b| b.get("date").and_then(|v| v.as_str()).expect("date"))
        .collect();
    assert_eq!(dates, vec!["2024-09-08", "2024-09-10"]);
    assert_eq!(
        series[0].get("present").and_then(|v| v.as_u64()),
        Some(1)
    );
    assert_eq!(series[0].get("absent").and_then(|v| v.as_u64()), Some(1));
    assert_eq!(series[1].get("late").and_then(|v| v.as_u64()), Some(1));
}

#[test]
fn overview_rate_is_over_marked_records_and_dashboard_rate_over_the_roster() {
    let (_child, mut stdin, mut reader, _ws) = boot("attendd-analytics-rates");
    let college_id = seed_college(&mut stdin, &mut reader, "North College", "NC");
    let s1 = seed_student(
        &mut stdin, &mut reader, &college_id, "A1", "A One", "CS", 1, "active",
    );
    let s2 = seed_student(
        &mut stdin, &mut reader, &college_id, "A2", "A Two", "CS", 1, "active",
    );
    let _s3 = seed_student(
        &mut stdin, &mut reader, &college_id, "A3", "A Three", "CS", 1, "active",
    );
    let _s4 = seed_student(
        &mut stdin, &mut reader, &college_id, "A4", "A Four", "CS", 1, "active",
    );

    let date = "2024-09-02";
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "attendance.sheetOpen",
        json!({ "date": date }),
    );
    for (i, (sid, status)) in [(&s1, "present"), (&s2, "absent")].iter().enumerate() {
        let _ = request_ok(
            &mut stdin,
            &mut reader,
            &format!("mark-{i}"),
            "attendance.setStatus",
            json!({ "date": date, "studentId": sid, "status": status }),
        );
    }
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "attendance.save",
        json!({ "date": date }),
    );

    // Two marked, one present: 50% of marked records.
    let overview = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "analytics.overview",
        json!({ "date": date }),
    );
    assert_eq!(
        overview.get("attendanceToday").and_then(|v| v.as_u64()),
        Some(2)
    );
    assert_eq!(
        overview.get("attendanceRate").and_then(|v| v.as_f64()),
        Some(50.0)
    );
    assert_eq!(
        overview.get("totalStudents").and_then(|v| v.as_u64()),
        Some(4)
    );

    // One present over a roster of four: 25%.
    let dashboard = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "dashboard.open",
        json!({ "date": date }),
    );
    assert_eq!(
        dashboard.get("attendanceRate").and_then(|v| v.as_f64()),
        Some(25.0)
    );
    assert_eq!(
        dashboard.get("totalPresent").and_then(|v| v.as_u64()),
        Some(1)
    );
    assert_eq!(
        dashboard.get("totalAbsent").and_then(|v| v.as_u64()),
        Some(1)
    );
    let recent = dashboard
        .get("recentStudents")
        .and_then(|v| v.as_array())
        .cloned()
        .expect("recentStudents");
    assert_eq!(recent.len(), 4);
}

#[test]
fn overview_rate_is_zero_not_nan_when_nothing_is_marked() {
    let (_child, mut stdin, mut reader, _ws) = boot("attendd-analytics-zero");

    let overview = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "analytics.overview",
        json!({ "date": "2024-09-02" }),
    );
    assert_eq!(
        overview.get("attendanceRate").and_then(|v| v.as_f64()),
        Some(0.0)
    );
}

#[test]
fn top_courses_sorts_descending_and_truncates_to_limit() {
    let (_child, mut stdin, mut reader, _ws) = boot("attendd-analytics-courses");
    let college_id = seed_college(&mut stdin, &mut reader, "North College", "NC");

    // Ten distinct courses with enrollments 3, 3, then 1 each; only active
    // students count.
    let courses = [
        "C01", "C02", "C03", "C04", "C05", "C06", "C07", "C08", "C09", "C10",
    ];
    let mut n = 0;
    for (i, course) in courses.iter().enumerate() {
        let copies = if i < 2 { 3 } else { 1 };
        for _ in 0..copies {
            n += 1;
            let _ = seed_student(
                &mut stdin,
                &mut reader,
                &college_id,
                &format!("S{n:03}"),
                &format!("Student {n}"),
                course,
                1,
                "active",
            );
        }
    }
    n += 1;
    let _ = seed_student(
        &mut stdin,
        &mut reader,
        &college_id,
        &format!("S{n:03}"),
        "Gone Grad",
        "C10",
        4,
        "graduated",
    );

    let top = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "analytics.topCourses",
        json!({}),
    );
    let list = top
        .get("courses")
        .and_then(|v| v.as_array())
        .cloned()
        .expect("courses");
    assert_eq!(list.len(), 8);
    let counts: Vec<u64> = list
        .iter()
        .map(|c| c.get("count").and_then(|v| v.as_u64()).expect("count"))
        .collect();
    for window in counts.windows(2) {
        assert!(window[0] >= window[1]);
    }
    assert_eq!(counts[0], 3);
    assert_eq!(counts[1], 3);
}
