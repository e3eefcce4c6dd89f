use crate::config;
use crate::db;
use crate::ids::normalize_id;
use crate::ipc::helpers::{respond, str_param, HandlerErr, HandlerResult};
use crate::ipc::types::{AppState, Request};
use crate::rubric::Track;
use log::{info, warn};
use serde_json::json;
use std::path::PathBuf;

fn handle_health(state: &mut AppState, _req: &Request) -> HandlerResult {
    Ok(json!({
        "version": env!("CARGO_PKG_VERSION"),
        "workspacePath": state.workspace.as_ref().map(|p| p.to_string_lossy().to_string())
    }))
}

fn handle_workspace_select(state: &mut AppState, req: &Request) -> HandlerResult {
    let path = PathBuf::from(str_param(req, "path")?);

    // Config first: a workspace with a broken catalog must not open half-way.
    let cfg = config::load_config(&path).map_err(|e| {
        warn!("event=config_load status=error path={} error={e:#}", path.display());
        HandlerErr::new("config_invalid", format!("{e:#}"))
            .with_details(json!({ "path": path.to_string_lossy() }))
    })?;
    let conn = db::open_db(&path).map_err(|e| HandlerErr::db("db_open_failed", e))?;

    info!(
        "event=workspace_open status=ok path={} policy={} research_catalog={} design_catalog={}",
        path.display(),
        cfg.resubmission_policy.as_str(),
        cfg.rubrics.get(Track::Research).version,
        cfg.rubrics.get(Track::Design).version,
    );

    let result = json!({
        "workspacePath": path.to_string_lossy(),
        "resubmissionPolicy": cfg.resubmission_policy.as_str(),
        "abstractWordLimit": cfg.abstract_word_limit,
        "maxGroupMembers": cfg.max_group_members,
    });
    state.workspace = Some(path);
    state.db = Some(conn);
    state.config = cfg;
    Ok(result)
}

fn handle_ids_normalize(_state: &mut AppState, req: &Request) -> HandlerResult {
    let Some(value) = req.params.get("value") else {
        return Err(HandlerErr::new("bad_params", "missing params.value"));
    };
    Ok(json!({ "id": normalize_id(value) }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "health" => handle_health(state, req),
        "workspace.select" => handle_workspace_select(state, req),
        "ids.normalize" => handle_ids_normalize(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}
