use crate::error::GradeError;
use crate::ids::{subject_id, subject_key};
use crate::intake::{validate_submission, CriterionScore, MarkSubmission};
use crate::ipc::helpers::{
    opt_str_param, require_db, respond, str_param, track_param, HandlerErr, HandlerResult,
};
use crate::ipc::types::{AppState, Request};
use crate::store::{self, StoredMark};
use chrono::SecondsFormat;
use log::info;
use serde_json::{json, Value};

fn mark_json(m: &StoredMark) -> Value {
    json!({
        "recordId": m.id,
        "track": m.track,
        "subjectId": m.record.subject_id,
        "stage": m.record.stage,
        "rawScore": m.record.raw_score,
        "examiner": m.record.examiner_id,
        "remarks": m.remarks,
        "criteria": m.criteria,
        "signatureStatus": m.signature_status,
        "signatureDigest": m.signature_digest,
        "timestamp": m.record.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
    })
}

/// A present but non-numeric score is a validation failure, not a missing
/// parameter.
fn raw_score_param(req: &Request) -> Result<Option<f64>, GradeError> {
    match req.params.get("rawScore") {
        None | Some(Value::Null) => Ok(None),
        Some(v) => v
            .as_f64()
            .map(Some)
            .ok_or_else(|| GradeError::validation_with("rawScore", "score must be a number", v.clone())),
    }
}

/// Accepts `[{"name", "score"}]` or `{"<name>": score}`.
fn criteria_param(req: &Request) -> Result<Option<Vec<CriterionScore>>, GradeError> {
    let bad = |v: &Value| {
        GradeError::validation_with("criteria", "criterion scores must be numbers", v.clone())
    };
    match req.params.get("criteria") {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Object(map)) => map
            .iter()
            .map(|(name, v)| {
                v.as_f64()
                    .map(|score| CriterionScore {
                        name: name.clone(),
                        score,
                    })
                    .ok_or_else(|| bad(v))
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Some),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| {
                let name = item.get("name").and_then(|v| v.as_str());
                let score = item.get("score").and_then(|v| v.as_f64());
                match (name, score) {
                    (Some(name), Some(score)) => Ok(CriterionScore {
                        name: name.to_string(),
                        score,
                    }),
                    _ => Err(bad(item)),
                }
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Some),
        Some(other) => Err(bad(other)),
    }
}

fn handle_marks_submit(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = require_db(state)?;
    let track = track_param(req)?;
    let catalog = state.config.rubrics.get(track);

    let subject_raw = req
        .params
        .get("subjectId")
        .map(|v| subject_id(track, v))
        .unwrap_or_default();
    let subject = store::find_subject(conn, track, &subject_raw)
        .map_err(|e| HandlerErr::db("db_query_failed", e))?
        .ok_or_else(|| {
            HandlerErr::new("not_found", "subject is not registered for this track")
                .with_details(json!({ "subjectId": subject_raw, "track": track }))
        })?;

    let submission = MarkSubmission {
        subject_id: subject.id,
        stage: str_param(req, "stage")?,
        raw_score: raw_score_param(req)?,
        criteria: criteria_param(req)?,
        examiner_id: opt_str_param(req, "examiner")?,
        remarks: Some(opt_str_param(req, "remarks")?),
        signature: Some(opt_str_param(req, "signature")?),
    };
    let mark = validate_submission(&submission, catalog)?;

    let stored = store::append_record(conn, track, &mark)
        .map_err(|e| HandlerErr::db("db_insert_failed", e))?;
    info!(
        "event=mark_submitted track={} subject={} stage={} examiner={} record={}",
        track, stored.record.subject_id, stored.record.stage, stored.record.examiner_id, stored.id
    );
    Ok(mark_json(&stored))
}

fn handle_marks_list(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = require_db(state)?;
    let track = track_param(req)?;
    let subject_filter = req
        .params
        .get("subjectId")
        .map(|v| subject_key(track, &subject_id(track, v)))
        .filter(|s| !s.is_empty());

    let records = store::read_all_records(conn, track)
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;
    let marks: Vec<Value> = records
        .iter()
        .filter(|m| match &subject_filter {
            Some(s) => subject_key(track, &m.record.subject_id) == *s,
            None => true,
        })
        .map(mark_json)
        .collect();
    Ok(json!({ "track": track, "marks": marks }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "marks.submit" => handle_marks_submit(state, req),
        "marks.list" => handle_marks_list(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}
