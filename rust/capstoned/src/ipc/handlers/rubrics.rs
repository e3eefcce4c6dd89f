use crate::ipc::helpers::{respond, str_param, track_param, HandlerErr, HandlerResult};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn handle_rubrics_list(state: &mut AppState, _req: &Request) -> HandlerResult {
    let catalogs = state
        .config
        .rubrics
        .iter()
        .map(serde_json::to_value)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| HandlerErr::new("internal", e.to_string()))?;
    Ok(json!({ "catalogs": catalogs }))
}

fn handle_rubrics_stage(state: &mut AppState, req: &Request) -> HandlerResult {
    let track = track_param(req)?;
    let stage_id = str_param(req, "stageId")?;
    let stage = state.config.rubrics.get(track).stage_weight(&stage_id)?;
    serde_json::to_value(stage).map_err(|e| HandlerErr::new("internal", e.to_string()))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "rubrics.list" => handle_rubrics_list(state, req),
        "rubrics.stage" => handle_rubrics_stage(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}
