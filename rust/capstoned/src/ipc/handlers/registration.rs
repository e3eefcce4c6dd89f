use crate::ids::{normalize_id, subject_id};
use crate::ipc::helpers::{
    opt_str_param, require_db, respond, track_param, HandlerErr, HandlerResult,
};
use crate::ipc::types::{AppState, Request};
use crate::registration::{DesignRegistration, GroupMember, ResearchRegistration};
use crate::store;
use log::info;
use serde_json::json;

fn handle_research_create(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = require_db(state)?;
    let reg = ResearchRegistration {
        student_id: req
            .params
            .get("studentId")
            .map(normalize_id)
            .unwrap_or_default(),
        student_name: opt_str_param(req, "name")?,
        email: opt_str_param(req, "email")?,
        supervisor: opt_str_param(req, "supervisor")?,
        research_title: opt_str_param(req, "title")?,
        abstract_text: opt_str_param(req, "abstract")?,
    }
    .validated(state.config.abstract_word_limit)?;

    let exists = store::student_exists(conn, &reg.student_id)
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;
    if exists {
        return Err(
            HandlerErr::new("duplicate", "student is already registered")
                .with_details(json!({ "studentId": reg.student_id })),
        );
    }

    let student_id = store::insert_research_student(conn, &reg)
        .map_err(|e| HandlerErr::db("db_insert_failed", e))?;
    info!("event=student_registered track=research subject={student_id}");
    Ok(json!({ "subjectId": student_id }))
}

fn parse_members(req: &Request) -> Result<Vec<GroupMember>, HandlerErr> {
    let Some(raw) = req.params.get("members").and_then(|v| v.as_array()) else {
        return Err(HandlerErr::new("bad_params", "missing params.members"));
    };
    raw.iter()
        .map(|m| {
            if !m.is_object() {
                return Err(HandlerErr::new(
                    "bad_params",
                    "members must be objects with name and studentId",
                ));
            }
            Ok(GroupMember {
                name: m
                    .get("name")
                    .and_then(|v| v.as_str())
                    .unwrap_or("")
                    .to_string(),
                student_id: m.get("studentId").map(normalize_id).unwrap_or_default(),
            })
        })
        .collect()
}

fn handle_design_create(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = require_db(state)?;
    let reg = DesignRegistration {
        group_name: opt_str_param(req, "groupName")?,
        supervisor: opt_str_param(req, "supervisor")?,
        abstract_text: opt_str_param(req, "abstract")?,
        members: parse_members(req)?,
    }
    .validated(
        state.config.abstract_word_limit,
        state.config.max_group_members,
    )?;

    let exists = store::group_exists(conn, &reg.group_name)
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;
    if exists {
        return Err(
            HandlerErr::new("duplicate", "group is already registered")
                .with_details(json!({ "groupName": reg.group_name })),
        );
    }

    let member_count = store::insert_design_group(conn, &reg)
        .map_err(|e| HandlerErr::db("db_insert_failed", e))?;
    info!(
        "event=group_registered track=design subject={} members={member_count}",
        reg.group_name
    );
    Ok(json!({ "subjectId": reg.group_name, "memberCount": member_count }))
}

fn handle_subjects_list(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = require_db(state)?;
    let track = track_param(req)?;
    let subjects =
        store::list_subjects(conn, track).map_err(|e| HandlerErr::db("db_query_failed", e))?;
    Ok(json!({ "track": track, "subjects": subjects }))
}

fn handle_subjects_get(state: &mut AppState, req: &Request) -> HandlerResult {
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
    let subject = store::find_subject(conn, track, &wanted)
        .map_err(|e| HandlerErr::db("db_query_failed", e))?
        .ok_or_else(|| {
            HandlerErr::new("not_found", "subject not found")
                .with_details(json!({ "subjectId": wanted }))
        })?;
    Ok(json!({ "track": track, "subject": subject }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "registrations.research.create" => handle_research_create(state, req),
        "registrations.design.create" => handle_design_create(state, req),
        "subjects.list" => handle_subjects_list(state, req),
        "subjects.get" => handle_subjects_get(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}
