//! Bulk timetable import from comma-separated text.
//!
//! The first non-blank line is a header naming the columns; rows are matched
//! to columns by name, so column order in the file does not matter. Any bad
//! row rejects the whole batch and the timetable is left as it was.

use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{ResolvedSession, Session, SessionKind, Timetable};
use crate::calendar::{parse_weekday, TimeRange};
use crate::error::PortalError;
use crate::models::{Hall, Lecturer};

pub const COLUMNS: [&str; 8] = [
    "Lecturer",
    "Module",
    "Day",
    "StartTime",
    "EndTime",
    "Type",
    "Building",
    "Classroom",
];

const LECTURER: usize = 0;
const MODULE: usize = 1;
const DAY: usize = 2;
const START: usize = 3;
const END: usize = 4;
const TYPE: usize = 5;
const BUILDING: usize = 6;
const CLASSROOM: usize = 7;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ImportError {
    #[error("the import is empty")]
    Empty,

    #[error("the import has a header but no rows")]
    NoRows,

    #[error("header is missing column '{0}'")]
    MissingColumn(&'static str),

    #[error("line {line}: expected {expected} fields, found {found}")]
    FieldCount {
        line: usize,
        expected: usize,
        found: usize,
    },

    #[error("line {line}, column {column}: {reason}")]
    InvalidField {
        line: usize,
        column: &'static str,
        reason: String,
    },

    #[error("line {line}: unknown lecturer '{name}'")]
    UnknownLecturer { line: usize, name: String },

    #[error("line {line}: unknown hall '{classroom}' in building '{building}'")]
    UnknownHall {
        line: usize,
        building: String,
        classroom: String,
    },
}

/// Reference data rows are resolved against, loaded from the session service.
#[derive(Debug, Clone, Copy)]
pub struct Lookups<'a> {
    pub lecturers: &'a [Lecturer],
    pub halls: &'a [Hall],
}

impl<'a> Lookups<'a> {
    pub fn lecturer(&self, name: &str) -> Option<&'a Lecturer> {
        let name = name.trim();
        self.lecturers.iter().find(|l| {
            l.name.eq_ignore_ascii_case(name)
                || l.name_short
                    .as_deref()
                    .is_some_and(|short| short.eq_ignore_ascii_case(name))
        })
    }

    pub fn hall(&self, building: &str, classroom: &str) -> Option<&'a Hall> {
        let (building, classroom) = (building.trim(), classroom.trim());
        self.halls.iter().find(|h| {
            h.building.eq_ignore_ascii_case(building) && h.room.eq_ignore_ascii_case(classroom)
        })
    }
}

struct Header {
    positions: [usize; 8],
    width: usize,
}

impl Header {
    fn parse(line: &str) -> Result<Self, ImportError> {
        let names: Vec<&str> = line.split(',').map(str::trim).collect();
        let mut positions = [0; 8];
        for (slot, column) in positions.iter_mut().zip(COLUMNS) {
            *slot = names
                .iter()
                .position(|n| n.eq_ignore_ascii_case(column))
                .ok_or(ImportError::MissingColumn(column))?;
        }
        Ok(Self {
            positions,
            width: names.len(),
        })
    }
}

struct Row<'a> {
    line: usize,
    fields: Vec<&'a str>,
}

impl<'a> Row<'a> {
    fn get(&self, header: &Header, column: usize) -> &'a str {
        self.fields[header.positions[column]]
    }

    fn required(&self, header: &Header, column: usize) -> Result<&'a str, ImportError> {
        let value = self.get(header, column);
        if value.is_empty() {
            return Err(self.invalid(column, "value is required".into()));
        }
        Ok(value)
    }

    fn invalid(&self, column: usize, reason: String) -> ImportError {
        ImportError::InvalidField {
            line: self.line,
            column: COLUMNS[column],
            reason,
        }
    }
}

/// Parse and resolve every row without touching any timetable.
pub fn parse(text: &str, group: &str, lookups: Lookups<'_>) -> Result<Vec<ResolvedSession>, ImportError> {
    // Spreadsheet exports often lead with a byte order mark.
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let mut lines = text
        .lines()
        .enumerate()
        .map(|(i, l)| (i + 1, l.trim()))
        .filter(|(_, l)| !l.is_empty());

    let (_, header_line) = lines.next().ok_or(ImportError::Empty)?;
    let header = Header::parse(header_line)?;
    debug!("Import header maps columns to {:?}", header.positions);

    let mut resolved = Vec::new();
    for (line, raw) in lines {
        let fields: Vec<&str> = raw.split(',').map(str::trim).collect();
        if fields.len() != header.width {
            return Err(ImportError::FieldCount {
                line,
                expected: header.width,
                found: fields.len(),
            });
        }
        let row = Row { line, fields };
        resolved.push(parse_row(&row, &header, group, lookups)?);
    }

    if resolved.is_empty() {
        return Err(ImportError::NoRows);
    }
    Ok(resolved)
}

fn parse_row(
    row: &Row<'_>,
    header: &Header,
    group: &str,
    lookups: Lookups<'_>,
) -> Result<ResolvedSession, ImportError> {
    let lecturer_name = row.required(header, LECTURER)?;
    let module = row.get(header, MODULE);
    let day_raw = row.required(header, DAY)?;
    let day = parse_weekday(day_raw)
        .ok_or_else(|| row.invalid(DAY, format!("unknown weekday '{day_raw}'")))?;

    let start = row.required(header, START)?;
    let end = row.required(header, END)?;
    let time = TimeRange::from_strs(start, end).map_err(|e| {
        let column = match e {
            PortalError::InvalidTime(ref t) if t == start => START,
            _ => END,
        };
        row.invalid(column, e.to_string())
    })?;

    let kind_raw = row.required(header, TYPE)?;
    let kind = SessionKind::parse(kind_raw).ok_or_else(|| {
        row.invalid(TYPE, format!("expected Lecture or Tutorial, found '{kind_raw}'"))
    })?;

    let building = row.required(header, BUILDING)?;
    let classroom = row.required(header, CLASSROOM)?;

    let lecturer = lookups
        .lecturer(lecturer_name)
        .ok_or_else(|| ImportError::UnknownLecturer {
            line: row.line,
            name: lecturer_name.to_string(),
        })?;
    let hall = lookups
        .hall(building, classroom)
        .ok_or_else(|| ImportError::UnknownHall {
            line: row.line,
            building: building.to_string(),
            classroom: classroom.to_string(),
        })?;

    Ok(ResolvedSession {
        session: Session {
            id: Uuid::new_v4().to_string(),
            group: group.to_string(),
            lecturer: lecturer.name.clone(),
            module: module.to_string(),
            day,
            time,
            kind,
            building: hall.building.clone(),
            classroom: hall.room.clone(),
        },
        lecturer_id: lecturer.id.clone(),
        hall_id: hall.id.clone(),
    })
}

impl Timetable {
    /// Replace `group`'s sessions with the rows in `text`, all or nothing.
    pub fn import_csv(
        &mut self,
        group: &str,
        text: &str,
        lookups: Lookups<'_>,
    ) -> Result<Vec<ResolvedSession>, ImportError> {
        let resolved = match parse(text, group, lookups) {
            Ok(rows) => rows,
            Err(e) => {
                warn!("Import into {} rejected: {}", group, e);
                return Err(e);
            }
        };
        self.replace_group(group, resolved.iter().map(|r| r.session.clone()).collect());
        info!("Imported {} sessions into {}", resolved.len(), group);
        Ok(resolved)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Weekday;

    use super::*;
    use crate::timetable::tests::draft;

    fn lecturers() -> Vec<Lecturer> {
        vec![
            Lecturer {
                id: "1".into(),
                name: "Dr Smith".into(),
                name_short: Some("JS".into()),
                email: None,
            },
            Lecturer {
                id: "2".into(),
                name: "Dr Jones".into(),
                name_short: None,
                email: None,
            },
        ]
    }

    fn halls() -> Vec<Hall> {
        vec![
            Hall {
                id: "10".into(),
                building: "SP".into(),
                room: "4LA".into(),
            },
            Hall {
                id: "11".into(),
                building: "GP".into(),
                room: "LT1".into(),
            },
        ]
    }

    const VALID: &str = "Lecturer,Module,Day,StartTime,EndTime,Type,Building,Classroom\n\
        Dr Smith,Algorithms,Monday,09:00,11:00,Lecture,SP,4LA\n\
        \n\
        js,Databases,Tue,13:00,14:00,tutorial,gp,lt1\n";

    fn seeded() -> Timetable {
        let mut timetable = Timetable::default();
        timetable
            .add("CS-G1", draft("Dr Old", Weekday::Fri, "09:00", "10:00"))
            .unwrap();
        timetable
            .add("SE-G2", draft("Dr Other", Weekday::Mon, "12:00", "13:00"))
            .unwrap();
        timetable
    }

    #[test]
    fn test_import_replaces_only_target_group() {
        let (lecturers, halls) = (lecturers(), halls());
        let lookups = Lookups {
            lecturers: &lecturers,
            halls: &halls,
        };
        let mut timetable = seeded();
        let other_before: Vec<Session> = timetable.for_group("SE-G2").cloned().collect();

        let rows = timetable.import_csv("CS-G1", VALID, lookups).unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(timetable.for_group("CS-G1").count(), 2);
        assert!(timetable.for_group("CS-G1").all(|s| s.lecturer != "Dr Old"));
        let other_after: Vec<Session> = timetable.for_group("SE-G2").cloned().collect();
        assert_eq!(other_before, other_after);

        assert_eq!(rows[1].lecturer_id, "1");
        assert_eq!(rows[1].hall_id, "11");
        assert_eq!(rows[1].session.kind, SessionKind::Tutorial);
        assert_eq!(rows[1].session.classroom, "LT1");
    }

    #[test]
    fn test_unknown_lecturer_rejects_whole_import() {
        let (lecturers, halls) = (lecturers(), halls());
        let lookups = Lookups {
            lecturers: &lecturers,
            halls: &halls,
        };
        let mut timetable = seeded();
        let before = timetable.clone();
        let text = format!("{VALID}Dr Nobody,AI,Wed,10:00,11:00,Lecture,SP,4LA\n");

        let err = timetable.import_csv("CS-G1", &text, lookups).unwrap_err();

        assert_eq!(
            err,
            ImportError::UnknownLecturer {
                line: 5,
                name: "Dr Nobody".into()
            }
        );
        assert_eq!(timetable, before);
    }

    #[test]
    fn test_unknown_hall() {
        let (lecturers, halls) = (lecturers(), halls());
        let lookups = Lookups {
            lecturers: &lecturers,
            halls: &halls,
        };
        let text = "Lecturer,Module,Day,StartTime,EndTime,Type,Building,Classroom\n\
            Dr Jones,AI,Wed,10:00,11:00,Lecture,SP,9ZZ";
        assert!(matches!(
            parse(text, "CS-G1", lookups),
            Err(ImportError::UnknownHall { line: 2, .. })
        ));
    }

    #[test]
    fn test_columns_matched_by_name() {
        let (lecturers, halls) = (lecturers(), halls());
        let lookups = Lookups {
            lecturers: &lecturers,
            halls: &halls,
        };
        let text = "Day, Lecturer, Module, Type, StartTime, EndTime, Classroom, Building\n\
            Thursday, Dr Jones, Networks, Lecture, 15:00, 16:00, 4LA, SP";
        let rows = parse(text, "CS-G4", lookups).unwrap();
        let session = &rows[0].session;
        assert_eq!(session.day, Weekday::Thu);
        assert_eq!(session.module, "Networks");
        assert_eq!(session.time.to_string(), "15:00-16:00");
    }

    #[test]
    fn test_byte_order_mark_and_crlf() {
        let (lecturers, halls) = (lecturers(), halls());
        let lookups = Lookups {
            lecturers: &lecturers,
            halls: &halls,
        };
        let text = "\u{feff}Lecturer,Module,Day,StartTime,EndTime,Type,Building,Classroom\r\n\
            Dr Smith,Algorithms,Mon,09:00,10:00,Lecture,SP,4LA\r\n";
        let rows = parse(text, "CS-G1", lookups).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].session.lecturer, "Dr Smith");
        assert_eq!(rows[0].session.day, Weekday::Mon);
    }

    #[test]
    fn test_errors_name_line_and_column() {
        let (lecturers, halls) = (lecturers(), halls());
        let lookups = Lookups {
            lecturers: &lecturers,
            halls: &halls,
        };
        let header = "Lecturer,Module,Day,StartTime,EndTime,Type,Building,Classroom";

        let err = parse(&format!("{header}\nDr Jones,AI,Funday,10:00,11:00,Lecture,SP,4LA"), "G", lookups)
            .unwrap_err();
        assert!(matches!(err, ImportError::InvalidField { line: 2, column: "Day", .. }));

        let err = parse(&format!("{header}\nDr Jones,AI,Mon,11:00,10:00,Lecture,SP,4LA"), "G", lookups)
            .unwrap_err();
        assert!(matches!(err, ImportError::InvalidField { column: "EndTime", .. }));

        let err = parse(&format!("{header}\nDr Jones,AI,Mon,noon,13:00,Lecture,SP,4LA"), "G", lookups)
            .unwrap_err();
        assert!(matches!(err, ImportError::InvalidField { column: "StartTime", .. }));

        let err = parse(&format!("{header}\nDr Jones,AI,Mon,10:00,11:00,Seminar,SP,4LA"), "G", lookups)
            .unwrap_err();
        assert!(matches!(err, ImportError::InvalidField { column: "Type", .. }));

        let err = parse(&format!("{header}\nDr Jones,AI,Mon,10:00"), "G", lookups).unwrap_err();
        assert_eq!(
            err,
            ImportError::FieldCount {
                line: 2,
                expected: 8,
                found: 4
            }
        );
    }

    #[test]
    fn test_header_problems() {
        let lookups = Lookups {
            lecturers: &[],
            halls: &[],
        };
        assert_eq!(parse("\n\n", "G", lookups).unwrap_err(), ImportError::Empty);
        assert_eq!(
            parse("Lecturer,Module,Day,StartTime,EndTime,Type,Building", "G", lookups).unwrap_err(),
            ImportError::MissingColumn("Classroom")
        );
        assert_eq!(
            parse("Lecturer,Module,Day,StartTime,EndTime,Type,Building,Classroom\n", "G", lookups)
                .unwrap_err(),
            ImportError::NoRows
        );
    }
}
