//! Append-only persistence for registrations and mark records.
//!
//! Every write commits before it returns, so a later read on the same
//! connection sees it.

use crate::calc::MarkRecord;
use crate::ids::{subject_id_str, subject_key};
use crate::intake::{CriterionScore, ValidatedMark};
use crate::registration::{DesignRegistration, GroupMember, ResearchRegistration};
use crate::rubric::Track;
use anyhow::Context;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;
use uuid::Uuid;

pub const SIGNATURE_STATUS_VERIFIED: &str = "Verified-Digital";

pub fn marks_table(track: Track) -> &'static str {
    match track {
        Track::Research => "marks",
        Track::Design => "design_marks",
    }
}

/// A mark row as persisted, wrapping the engine's view of it.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredMark {
    pub id: String,
    pub track: Track,
    pub record: MarkRecord,
    pub remarks: Option<String>,
    pub criteria: Vec<CriterionScore>,
    pub signature_status: String,
    pub signature_digest: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    pub id: String,
    pub name: String,
    pub supervisor: Option<String>,
    pub title: Option<String>,
    #[serde(rename = "abstract")]
    pub abstract_text: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub members: Vec<GroupMember>,
}

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_timestamp(raw: &str) -> anyhow::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .with_context(|| format!("bad timestamp `{raw}`"))
}

pub fn append_record(
    conn: &Connection,
    track: Track,
    mark: &ValidatedMark,
) -> anyhow::Result<StoredMark> {
    let id = Uuid::new_v4().to_string();
    let timestamp = now_rfc3339();
    let criteria_json = if mark.criteria.is_empty() {
        None
    } else {
        Some(serde_json::to_string(&mark.criteria).context("failed to encode criteria")?)
    };

    conn.execute(
        &format!(
            "INSERT INTO {}(id, subject_id, stage, raw_mark, examiner, remarks,
                            signature_status, signature_digest, criteria_json, timestamp)
             VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            marks_table(track)
        ),
        (
            &id,
            &mark.subject_id,
            &mark.stage,
            mark.raw_score,
            &mark.examiner_id,
            &mark.remarks,
            SIGNATURE_STATUS_VERIFIED,
            &mark.signature_digest,
            &criteria_json,
            &timestamp,
        ),
    )?;

    Ok(StoredMark {
        id,
        track,
        record: MarkRecord {
            subject_id: mark.subject_id.clone(),
            stage: mark.stage.clone(),
            raw_score: mark.raw_score,
            examiner_id: mark.examiner_id.clone(),
            timestamp: parse_timestamp(&timestamp)?,
        },
        remarks: mark.remarks.clone(),
        criteria: mark.criteria.clone(),
        signature_status: SIGNATURE_STATUS_VERIFIED.to_string(),
        signature_digest: Some(mark.signature_digest.clone()),
    })
}

/// All mark rows of a track in insertion order.
pub fn read_all_records(conn: &Connection, track: Track) -> anyhow::Result<Vec<StoredMark>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT id, subject_id, stage, raw_mark, examiner, remarks,
                signature_status, signature_digest, criteria_json, timestamp
         FROM {}
         ORDER BY rowid",
        marks_table(track)
    ))?;
    let rows = stmt
        .query_map([], |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, String>(2)?,
                r.get::<_, f64>(3)?,
                r.get::<_, String>(4)?,
                r.get::<_, Option<String>>(5)?,
                r.get::<_, String>(6)?,
                r.get::<_, Option<String>>(7)?,
                r.get::<_, Option<String>>(8)?,
                r.get::<_, String>(9)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(
            |(id, subject_id, stage, raw, examiner, remarks, status, digest, criteria, ts)|
             -> anyhow::Result<StoredMark> {
                let criteria: Vec<CriterionScore> = match criteria {
                    Some(text) => serde_json::from_str(&text)
                        .with_context(|| format!("bad criteria_json on mark {id}"))?,
                    None => Vec::new(),
                };
                Ok(StoredMark {
                    track,
                    record: MarkRecord {
                        subject_id: subject_id_str(track, &subject_id),
                        stage,
                        raw_score: raw,
                        examiner_id: examiner,
                        timestamp: parse_timestamp(&ts)?,
                    },
                    id,
                    remarks,
                    criteria,
                    signature_status: status,
                    signature_digest: digest,
                })
            },
        )
        .collect()
}

pub fn student_exists(conn: &Connection, student_id: &str) -> anyhow::Result<bool> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM students WHERE student_id = ?",
            [student_id],
            |r| r.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

pub fn group_exists(conn: &Connection, group_name: &str) -> anyhow::Result<bool> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM design_groups WHERE lower(group_name) = lower(?) LIMIT 1",
            [group_name],
            |r| r.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

pub fn insert_research_student(
    conn: &Connection,
    reg: &ResearchRegistration,
) -> anyhow::Result<String> {
    conn.execute(
        "INSERT INTO students(id, student_id, student_name, email, supervisor,
                              research_title, abstract, created_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?)",
        (
            Uuid::new_v4().to_string(),
            &reg.student_id,
            &reg.student_name,
            &reg.email,
            &reg.supervisor,
            &reg.research_title,
            &reg.abstract_text,
            now_rfc3339(),
        ),
    )?;
    Ok(reg.student_id.clone())
}

/// Inserts every member row of the group in one transaction.
pub fn insert_design_group(conn: &Connection, reg: &DesignRegistration) -> anyhow::Result<usize> {
    let tx = conn.unchecked_transaction()?;
    let created_at = now_rfc3339();
    for m in &reg.members {
        tx.execute(
            "INSERT INTO design_groups(id, group_name, student_name, student_id,
                                       supervisor, abstract, created_at)
             VALUES(?, ?, ?, ?, ?, ?, ?)",
            (
                Uuid::new_v4().to_string(),
                &reg.group_name,
                &m.name,
                &m.student_id,
                &reg.supervisor,
                &reg.abstract_text,
                &created_at,
            ),
        )?;
    }
    tx.commit()?;
    Ok(reg.members.len())
}

pub fn list_subjects(conn: &Connection, track: Track) -> anyhow::Result<Vec<Subject>> {
    match track {
        Track::Research => list_research_subjects(conn),
        Track::Design => list_design_subjects(conn),
    }
}

pub fn find_subject(
    conn: &Connection,
    track: Track,
    subject_id: &str,
) -> anyhow::Result<Option<Subject>> {
    let wanted = subject_key(track, subject_id);
    if wanted.is_empty() {
        return Ok(None);
    }
    Ok(list_subjects(conn, track)?
        .into_iter()
        .find(|s| subject_key(track, &s.id) == wanted))
}

fn list_research_subjects(conn: &Connection) -> anyhow::Result<Vec<Subject>> {
    let mut stmt = conn.prepare(
        "SELECT student_id, student_name, supervisor, research_title, abstract
         FROM students
         ORDER BY student_name, student_id",
    )?;
    let subjects = stmt
        .query_map([], |r| {
            Ok(Subject {
                id: r.get(0)?,
                name: r.get(1)?,
                supervisor: r.get(2)?,
                title: r.get(3)?,
                abstract_text: r.get(4)?,
                members: Vec::new(),
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(subjects)
}

fn list_design_subjects(conn: &Connection) -> anyhow::Result<Vec<Subject>> {
    let mut stmt = conn.prepare(
        "SELECT group_name, student_name, student_id, supervisor, abstract
         FROM design_groups
         ORDER BY group_name, rowid",
    )?;
    let rows = stmt
        .query_map([], |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, String>(2)?,
                r.get::<_, String>(3)?,
                r.get::<_, String>(4)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut subjects: Vec<Subject> = Vec::new();
    for (group_name, student_name, student_id, supervisor, abstract_text) in rows {
        let member = GroupMember {
            name: student_name,
            student_id,
        };
        match subjects.last_mut() {
            Some(s) if s.id == group_name => s.members.push(member),
            _ => subjects.push(Subject {
                id: group_name.clone(),
                name: group_name,
                supervisor: Some(supervisor),
                title: None,
                abstract_text: Some(abstract_text).filter(|a| !a.is_empty()),
                members: vec![member],
            }),
        }
    }
    Ok(subjects)
}

/// Engine view of the track's marks.
pub fn mark_records(conn: &Connection, track: Track) -> anyhow::Result<Vec<MarkRecord>> {
    Ok(read_all_records(conn, track)?
        .into_iter()
        .map(|m| m.record)
        .collect())
}
