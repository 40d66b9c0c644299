use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AttendanceStatus {
    Present,
    Absent,
    Late,
    Excused,
}

impl AttendanceStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AttendanceStatus::Present => "present",
            AttendanceStatus::Absent => "absent",
            AttendanceStatus::Late => "late",
            AttendanceStatus::Excused => "excused",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "present" => Some(AttendanceStatus::Present),
            "absent" => Some(AttendanceStatus::Absent),
            "late" => Some(AttendanceStatus::Late),
            "excused" => Some(AttendanceStatus::Excused),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StudentStatus {
    Active,
    Inactive,
    Graduated,
    Transferred,
}

impl StudentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            StudentStatus::Active => "active",
            StudentStatus::Inactive => "inactive",
            StudentStatus::Graduated => "graduated",
            StudentStatus::Transferred => "transferred",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(StudentStatus::Active),
            "inactive" => Some(StudentStatus::Inactive),
            "graduated" => Some(StudentStatus::Graduated),
            "transferred" => Some(StudentStatus::Transferred),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: String,
    pub student_code: String,
    pub full_name: String,
    pub course: String,
    pub year: i64,
    pub section: Option<String>,
    pub college_id: String,
    pub college_name: Option<String>,
}

/// An attendance record for one (student, date), as fetched for a sheet load.
#[derive(Debug, Clone)]
pub struct DateRecord {
    pub student_id: String,
    pub status: AttendanceStatus,
    pub marked_by: Option<String>,
    pub updated_at: String,
}

/// A staged (possibly edited, not yet persisted) mark on a sheet entry.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SheetMark {
    pub status: AttendanceStatus,
    pub marked_by: Option<String>,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SheetEntry {
    #[serde(flatten)]
    pub student: Student,
    pub mark: Option<SheetMark>,
}

/// The merged roster-with-status view for one date. Held in memory between
/// sheetOpen and save; discarded on the next load or on sign-out.
#[derive(Debug, Clone)]
pub struct MarkingSheet {
    pub date: String,
    pub seq: u64,
    pub entries: Vec<SheetEntry>,
}

/// Merges a roster with the date's attendance records. Every roster student
/// appears exactly once; at most one record attaches per student (first match
/// wins); records for students not on the roster are dropped. The roster must
/// already be restricted to active students by the caller.
pub fn build_sheet(
    date: &str,
    seq: u64,
    roster: Vec<Student>,
    records: &[DateRecord],
) -> MarkingSheet {
    let entries = roster
        .into_iter()
        .map(|student| {
            let mark = records
                .iter()
                .find(|r| r.student_id == student.id)
                .map(|r| SheetMark {
                    status: r.status,
                    marked_by: r.marked_by.clone(),
                    updated_at: r.updated_at.clone(),
                });
            SheetEntry { student, mark }
        })
        .collect();
    MarkingSheet {
        date: date.to_string(),
        seq,
        entries,
    }
}

/// Installs a freshly loaded sheet, unless a newer load already landed.
/// Returns false when the incoming sheet is stale and was discarded.
pub fn install_sheet(slot: &mut Option<MarkingSheet>, incoming: MarkingSheet) -> bool {
    if let Some(current) = slot.as_ref() {
        if incoming.seq < current.seq {
            return false;
        }
    }
    *slot = Some(incoming);
    true
}

#[derive(Debug, Clone, Default)]
pub struct SheetFilter {
    pub search: Option<String>,
    pub course: Option<String>,
    pub section: Option<String>,
    pub year: Option<i64>,
}

impl SheetFilter {
    fn matches(&self, entry: &SheetEntry) -> bool {
        let s = &entry.student;
        if let Some(q) = self.search.as_deref() {
            let q = q.to_lowercase();
            let hit = s.full_name.to_lowercase().contains(&q)
                || s.student_code.to_lowercase().contains(&q)
                || s.course.to_lowercase().contains(&q);
            if !hit {
                return false;
            }
        }
        if let Some(course) = self.course.as_deref() {
            if s.course != course {
                return false;
            }
        }
        if let Some(section) = self.section.as_deref() {
            if s.section.as_deref() != Some(section) {
                return false;
            }
        }
        if let Some(year) = self.year {
            if s.year != year {
                return false;
            }
        }
        true
    }
}

/// Applies AND-combined filters; the free-text predicate is a case-insensitive
/// substring match over name, code, and course. Pure: the sheet is untouched.
pub fn filter_entries<'a>(sheet: &'a MarkingSheet, filter: &SheetFilter) -> Vec<&'a SheetEntry> {
    sheet.entries.iter().filter(|e| filter.matches(e)).collect()
}

/// Stages a status for the student, stamping the marking identity and `now`.
/// Returns false when the student is not on the sheet.
pub fn set_status(
    sheet: &mut MarkingSheet,
    student_id: &str,
    status: AttendanceStatus,
    marked_by: Option<&str>,
    now: &str,
) -> bool {
    let Some(entry) = sheet.entries.iter_mut().find(|e| e.student.id == student_id) else {
        return false;
    };
    entry.mark = Some(SheetMark {
        status,
        marked_by: marked_by.map(|s| s.to_string()),
        updated_at: now.to_string(),
    });
    true
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SheetSummary {
    pub total: usize,
    pub present: usize,
    pub absent: usize,
    pub late: usize,
    pub excused: usize,
    pub unmarked: usize,
}

pub fn summarize<'a, I>(entries: I) -> SheetSummary
where
    I: IntoIterator<Item = &'a SheetEntry>,
{
    let mut total = 0;
    let mut present = 0;
    let mut absent = 0;
    let mut late = 0;
    let mut excused = 0;
    for entry in entries {
        total += 1;
        match entry.mark.as_ref().map(|m| m.status) {
            Some(AttendanceStatus::Present) => present += 1,
            Some(AttendanceStatus::Absent) => absent += 1,
            Some(AttendanceStatus::Late) => late += 1,
            Some(AttendanceStatus::Excused) => excused += 1,
            None => {}
        }
    }
    let marked = present + absent + late + excused;
    // Each entry carries at most one mark, so marked can never exceed total.
    debug_assert!(marked <= total);
    SheetSummary {
        total,
        present,
        absent,
        late,
        excused,
        unmarked: total - marked,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedRecord {
    pub student_id: String,
    pub status: AttendanceStatus,
    pub marked_by: Option<String>,
}

/// The staged set for persistence: entries carrying a mark, in sheet order.
pub fn staged_records(sheet: &MarkingSheet) -> Vec<StagedRecord> {
    sheet
        .entries
        .iter()
        .filter_map(|e| {
            e.mark.as_ref().map(|m| StagedRecord {
                student_id: e.student.id.clone(),
                status: m.status,
                marked_by: m.marked_by.clone(),
            })
        })
        .collect()
}
