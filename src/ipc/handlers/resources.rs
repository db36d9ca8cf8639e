use crate::ipc::helpers::{
    current_user, get_opt_enum, get_opt_str, get_required_enum, get_required_str,
    require_supervisor, respond, store, store_mut, HandlerErr, HandlerResult,
};
use crate::ipc::types::{AppState, Request};
use crate::model::{timestamp_now, ResourceFilter, ResourceType, Role, TrainingResource};
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

fn parse_access_roles(params: &Value) -> Result<Vec<Role>, HandlerErr> {
    let Some(raw) = params.get("accessRoles").filter(|v| !v.is_null()) else {
        return Ok(Role::ALL.to_vec());
    };
    let Some(items) = raw.as_array() else {
        return Err(HandlerErr::bad_params("accessRoles must be an array"));
    };
    let mut roles = Vec::with_capacity(items.len());
    for item in items {
        let role = item
            .as_str()
            .ok_or_else(|| HandlerErr::bad_params("accessRoles must contain strings"))?
            .parse::<Role>()
            .map_err(|e| HandlerErr::bad_params(e.to_string()))?;
        if !roles.contains(&role) {
            roles.push(role);
        }
    }
    if roles.is_empty() {
        return Err(HandlerErr::bad_params("accessRoles must not be empty"));
    }
    Ok(roles)
}

fn resources_list(state: &mut AppState, params: &Value) -> HandlerResult {
    let me = current_user(state)?;
    let filter = ResourceFilter {
        category: get_opt_str(params, "category"),
        resource_type: get_opt_enum::<ResourceType>(params, "type")?,
    };
    let resources: Vec<TrainingResource> = store(state)?
        .list_resources(&filter)?
        .into_iter()
        .filter(|r| r.visible_to(me.role))
        .collect();
    Ok(json!({ "resources": resources }))
}

fn resources_create(state: &mut AppState, params: &Value) -> HandlerResult {
    let me = current_user(state)?;
    require_supervisor(&me)?;

    let resource = TrainingResource {
        id: Uuid::new_v4().to_string(),
        title: get_required_str(params, "title")?,
        description: get_opt_str(params, "description"),
        resource_type: get_required_enum::<ResourceType>(params, "type")?,
        file_url: get_required_str(params, "fileUrl")?,
        category: get_required_str(params, "category")?,
        uploaded_by: me.id.clone(),
        access_roles: parse_access_roles(params)?,
        created_at: timestamp_now(),
    };
    store_mut(state)?.insert_resource(&resource)?;
    info!(resource_id = %resource.id, category = %resource.category, "resource added");
    Ok(json!({ "resource": resource }))
}

fn resources_delete(state: &mut AppState, params: &Value) -> HandlerResult {
    let me = current_user(state)?;
    require_supervisor(&me)?;
    let id = get_required_str(params, "resourceId")?;
    store_mut(state)?.delete_resource(&id)?;
    Ok(json!({ "deleted": true, "resourceId": id }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "resources.list" => resources_list(state, &req.params),
        "resources.create" => resources_create(state, &req.params),
        "resources.delete" => resources_delete(state, &req.params),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
