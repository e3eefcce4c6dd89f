use crate::calc::{self, AggregateResult, MarkRecord};
use crate::config::ResubmissionPolicy;
use crate::ids::subject_id;
use crate::ipc::helpers::{require_db, respond, str_param, track_param, HandlerErr, HandlerResult};
use crate::ipc::types::{AppState, Request};
use crate::rubric::{RubricCatalog, Track};
use crate::store::{self, Subject};
use log::info;
use rusqlite::Connection;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::PathBuf;

fn csv_quote(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') || s.contains('\r') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

/// Records as the engine should see them under the workspace policy.
fn effective_records(
    conn: &Connection,
    track: Track,
    policy: ResubmissionPolicy,
) -> Result<Vec<MarkRecord>, HandlerErr> {
    let records =
        store::mark_records(conn, track).map_err(|e| HandlerErr::db("db_query_failed", e))?;
    Ok(match policy {
        ResubmissionPolicy::LatestPerExaminer => calc::latest_per_examiner(&records, track),
        ResubmissionPolicy::AppendAll => records,
    })
}

fn result_json(r: &AggregateResult, name: Option<&str>) -> Result<Value, HandlerErr> {
    let mut v = serde_json::to_value(r).map_err(|e| HandlerErr::new("internal", e.to_string()))?;
    if let Some(name) = name {
        v["name"] = json!(name);
    }
    Ok(v)
}

fn ranked(
    state: &AppState,
    track: Track,
) -> Result<(Vec<AggregateResult>, HashMap<String, Subject>), HandlerErr> {
    let conn = require_db(state)?;
    let catalog: &RubricCatalog = state.config.rubrics.get(track);
    let records = effective_records(conn, track, state.config.resubmission_policy)?;
    let subjects =
        store::list_subjects(conn, track).map_err(|e| HandlerErr::db("db_query_failed", e))?;
    let ids: Vec<String> = subjects.iter().map(|s| s.id.clone()).collect();
    let results = calc::summarize(&records, &ids, catalog)?;
    let by_id = subjects.into_iter().map(|s| (s.id.clone(), s)).collect();
    Ok((results, by_id))
}

fn handle_grades_aggregate(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = require_db(state)?;
    let track = track_param(req)?;
    let wanted = req
        .params
        .get("subjectId")
        .map(|v| subject_id(track, v))
        .unwrap_or_default();
    if wanted.is_empty() {
        return Err(HandlerErr::new("bad_params", "missing params.subjectId"));
    }

    // Design groups are matched case-insensitively at registration; use the
    // registered spelling when there is one.
    let subject = store::find_subject(conn, track, &wanted)
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;
    let canonical = subject
        .as_ref()
        .map(|s| s.id.clone())
        .unwrap_or(wanted);

    let records = effective_records(conn, track, state.config.resubmission_policy)?;
    let result = calc::aggregate(&records, &canonical, state.config.rubrics.get(track))?;

    let mut v = result_json(&result, subject.as_ref().map(|s| s.name.as_str()))?;
    v["registered"] = json!(subject.is_some());
    v["resubmissionPolicy"] = json!(state.config.resubmission_policy.as_str());
    Ok(v)
}

fn handle_grades_summary(state: &mut AppState, req: &Request) -> HandlerResult {
    let track = track_param(req)?;
    let (results, subjects) = ranked(state, track)?;
    let rows = results
        .iter()
        .map(|r| result_json(r, subjects.get(&r.subject_id).map(|s| s.name.as_str())))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(json!({
        "track": track,
        "catalogVersion": state.config.rubrics.get(track).version,
        "resubmissionPolicy": state.config.resubmission_policy.as_str(),
        "results": rows,
    }))
}

fn handle_grades_export_csv(state: &mut AppState, req: &Request) -> HandlerResult {
    let track = track_param(req)?;
    let out_path = str_param(req, "outPath")?.trim().to_string();
    if out_path.is_empty() {
        return Err(HandlerErr::new("bad_params", "missing params.outPath"));
    }
    let (results, subjects) = ranked(state, track)?;
    let catalog = state.config.rubrics.get(track);

    let mut csv = String::from("rank,subject_id,name");
    for s in &catalog.stages {
        csv.push(',');
        csv.push_str(&csv_quote(&s.stage_id));
    }
    csv.push_str(",final_percent\n");

    for (i, r) in results.iter().enumerate() {
        let name = subjects
            .get(&r.subject_id)
            .map(|s| s.name.as_str())
            .unwrap_or("");
        csv.push_str(&format!(
            "{},{},{}",
            i + 1,
            csv_quote(&r.subject_id),
            csv_quote(name)
        ));
        for s in &catalog.stages {
            csv.push(',');
            if let Some(v) = r.per_stage_display.get(&s.stage_id) {
                csv.push_str(&format!("{v:.1}"));
            }
        }
        csv.push_str(&format!(",{:.1}\n", r.final_percent));
    }

    let out = PathBuf::from(&out_path);
    let io_err = |e: std::io::Error| {
        HandlerErr::new("io_failed", e.to_string()).with_details(json!({ "path": out_path }))
    };
    if let Some(parent) = out.parent() {
        std::fs::create_dir_all(parent).map_err(io_err)?;
    }
    std::fs::write(&out, csv).map_err(io_err)?;

    info!(
        "event=grades_exported track={} rows={} path={}",
        track,
        results.len(),
        out.display()
    );
    Ok(json!({ "rowsExported": results.len(), "path": out_path }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "grades.aggregate" => handle_grades_aggregate(state, req),
        "grades.summary" => handle_grades_summary(state, req),
        "grades.exportCsv" => handle_grades_export_csv(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}
