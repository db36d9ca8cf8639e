use crate::ipc::helpers::{
    current_user, get_opt_enum, get_opt_f64, get_opt_str, get_patch_str, get_required_enum,
    get_required_str, respond, store, store_mut, HandlerErr, HandlerResult,
};
use crate::ipc::types::{AppState, Request};
use crate::model::{timestamp_now, Lead, LeadKind, PipelineStage, User};
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

fn lead_value(params: &Value) -> Result<Option<f64>, HandlerErr> {
    let value = get_opt_f64(params, "value")?;
    if value.is_some_and(|v| v < 0.0 || !v.is_finite()) {
        return Err(HandlerErr::bad_params("value must be a non-negative number"));
    }
    Ok(value)
}

/// Leads are private to their owner; anyone else's lead reads as missing.
fn own_lead(state: &AppState, me: &User, params: &Value) -> Result<Lead, HandlerErr> {
    let id = get_required_str(params, "leadId")?;
    store(state)?
        .get_lead(&id)?
        .filter(|l| l.educator_id == me.id)
        .ok_or_else(|| HandlerErr::not_found("lead not found"))
}

fn leads_create(state: &mut AppState, params: &Value) -> HandlerResult {
    let me = current_user(state)?;
    let now = timestamp_now();
    let lead = Lead {
        id: Uuid::new_v4().to_string(),
        educator_id: me.id.clone(),
        name: get_required_str(params, "name")?,
        email: get_required_str(params, "email")?,
        phone: get_opt_str(params, "phone"),
        stage: get_opt_enum::<PipelineStage>(params, "stage")?.unwrap_or(PipelineStage::Lead),
        source: get_opt_str(params, "source").unwrap_or_default(),
        value: lead_value(params)?.unwrap_or(0.0),
        notes: get_opt_str(params, "notes"),
        kind: get_opt_enum::<LeadKind>(params, "kind")?.unwrap_or(LeadKind::Customer),
        last_contact: now,
        created_at: now,
    };
    store_mut(state)?.insert_lead(&lead)?;
    info!(lead_id = %lead.id, stage = %lead.stage, "lead created");
    Ok(json!({ "lead": lead }))
}

fn leads_update(state: &mut AppState, params: &Value) -> HandlerResult {
    let me = current_user(state)?;
    let mut lead = own_lead(state, &me, params)?;
    let patch = params.get("patch").unwrap_or(&Value::Null);
    if !patch.is_object() {
        return Err(HandlerErr::bad_params("patch must be an object"));
    }

    if patch.get("name").is_some() {
        lead.name = get_opt_str(patch, "name")
            .ok_or_else(|| HandlerErr::bad_params("name must not be empty"))?;
    }
    if patch.get("email").is_some() {
        lead.email = get_opt_str(patch, "email")
            .ok_or_else(|| HandlerErr::bad_params("email must not be empty"))?;
    }
    if let Some(phone) = get_patch_str(patch, "phone")? {
        lead.phone = phone.filter(|p| !p.trim().is_empty());
    }
    if let Some(notes) = get_patch_str(patch, "notes")? {
        lead.notes = notes.filter(|n| !n.trim().is_empty());
    }
    if let Some(source) = get_patch_str(patch, "source")? {
        lead.source = source.unwrap_or_default().trim().to_string();
    }
    if let Some(value) = lead_value(patch)? {
        lead.value = value;
    }
    if let Some(kind) = get_opt_enum::<LeadKind>(patch, "kind")? {
        lead.kind = kind;
    }
    if let Some(stage) = get_opt_enum::<PipelineStage>(patch, "stage")? {
        if stage != lead.stage {
            lead.stage = stage;
            lead.last_contact = timestamp_now();
        }
    }

    store_mut(state)?.update_lead(&lead)?;
    Ok(json!({ "lead": lead }))
}

fn leads_move(state: &mut AppState, params: &Value) -> HandlerResult {
    let me = current_user(state)?;
    let mut lead = own_lead(state, &me, params)?;
    let stage = get_required_enum::<PipelineStage>(params, "stage")?;
    let from = lead.stage;
    lead.stage = stage;
    lead.last_contact = timestamp_now();
    store_mut(state)?.update_lead(&lead)?;
    info!(lead_id = %lead.id, from = %from, to = %stage, "lead moved");
    Ok(json!({ "lead": lead }))
}

fn leads_delete(state: &mut AppState, params: &Value) -> HandlerResult {
    let me = current_user(state)?;
    let lead = own_lead(state, &me, params)?;
    store_mut(state)?.delete_lead(&lead.id)?;
    Ok(json!({ "deleted": true, "leadId": lead.id }))
}

fn leads_list(state: &mut AppState, params: &Value) -> HandlerResult {
    let me = current_user(state)?;
    let stage = get_opt_enum::<PipelineStage>(params, "stage")?;
    let leads = store(state)?.list_leads(&me.id, stage)?;
    Ok(json!({ "leads": leads }))
}

fn leads_board(state: &mut AppState) -> HandlerResult {
    let me = current_user(state)?;
    let leads = store(state)?.list_leads(&me.id, None)?;

    let columns: Vec<Value> = PipelineStage::ALL
        .iter()
        .map(|&stage| {
            let in_stage: Vec<&Lead> = leads.iter().filter(|l| l.stage == stage).collect();
            let total_value: f64 = in_stage.iter().map(|l| l.value).sum();
            json!({
                "stage": stage,
                "label": stage.label(),
                "count": in_stage.len(),
                "totalValue": total_value,
                "leads": in_stage,
            })
        })
        .collect();
    let pipeline_value: f64 = leads
        .iter()
        .filter(|l| !matches!(l.stage, PipelineStage::Converted | PipelineStage::Lost))
        .map(|l| l.value)
        .sum();
    Ok(json!({
        "columns": columns,
        "totalLeads": leads.len(),
        "openPipelineValue": pipeline_value,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "leads.create" => leads_create(state, &req.params),
        "leads.update" => leads_update(state, &req.params),
        "leads.move" => leads_move(state, &req.params),
        "leads.delete" => leads_delete(state, &req.params),
        "leads.list" => leads_list(state, &req.params),
        "leads.board" => leads_board(state),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
