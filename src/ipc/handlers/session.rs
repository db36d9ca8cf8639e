use crate::ipc::helpers::{
    current_user, get_opt_enum, get_opt_str, get_patch_str, get_required_enum, get_required_str,
    require_supervisor, respond, store, store_mut, HandlerErr, HandlerResult,
};
use crate::ipc::types::{AppState, Request, Session};
use crate::model::{timestamp_now, Role, User};
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

fn normalize_email(raw: &str) -> Result<String, HandlerErr> {
    let email = raw.trim().to_ascii_lowercase();
    if !email.contains('@') || email.starts_with('@') || email.ends_with('@') {
        return Err(HandlerErr::bad_params(format!("invalid email: {}", raw)));
    }
    Ok(email)
}

fn session_sign_up(state: &mut AppState, params: &Value) -> HandlerResult {
    let email = normalize_email(&get_required_str(params, "email")?)?;
    let full_name = get_required_str(params, "fullName")?;
    let avatar_url = get_opt_str(params, "avatarUrl");

    let store = store_mut(state)?;
    // The first account of an empty store administers it.
    let role = if store.count_users()? == 0 {
        Role::Admin
    } else {
        Role::Educator
    };
    let user = User {
        id: Uuid::new_v4().to_string(),
        email,
        full_name,
        avatar_url,
        role,
        created_at: timestamp_now(),
    };
    store.insert_user(&user)?;
    info!(user_id = %user.id, role = %user.role, "user signed up");
    Ok(json!({ "user": user }))
}

fn session_sign_in(state: &mut AppState, params: &Value) -> HandlerResult {
    let email = normalize_email(&get_required_str(params, "email")?)?;
    let user = store(state)?
        .find_user_by_email(&email)?
        .ok_or_else(|| HandlerErr::not_found("no user with that email"))?;
    info!(user_id = %user.id, "signed in");
    state.session = Some(Session { user: user.clone() });
    Ok(json!({ "user": user }))
}

fn session_sign_out(state: &mut AppState) -> HandlerResult {
    if let Some(session) = state.session.take() {
        info!(user_id = %session.user.id, "signed out");
    }
    state.subscriptions.clear();
    Ok(json!({ "signedOut": true }))
}

fn session_get(state: &mut AppState) -> HandlerResult {
    Ok(json!({ "user": state.session.as_ref().map(|s| &s.user) }))
}

fn users_list(state: &mut AppState, params: &Value) -> HandlerResult {
    let me = current_user(state)?;
    require_supervisor(&me)?;
    let role = get_opt_enum::<Role>(params, "role")?;
    let users = store(state)?.list_users(role)?;
    Ok(json!({ "users": users }))
}

fn users_update_profile(state: &mut AppState, params: &Value) -> HandlerResult {
    let mut me = current_user(state)?;
    if params.get("fullName").is_some() {
        me.full_name = get_opt_str(params, "fullName")
            .ok_or_else(|| HandlerErr::bad_params("fullName must not be empty"))?;
    }
    if let Some(avatar) = get_patch_str(params, "avatarUrl")? {
        me.avatar_url = avatar.map(|a| a.trim().to_string()).filter(|a| !a.is_empty());
    }
    store_mut(state)?.update_user(&me)?;
    state.session = Some(Session { user: me.clone() });
    Ok(json!({ "user": me }))
}

fn users_set_role(state: &mut AppState, params: &Value) -> HandlerResult {
    let me = current_user(state)?;
    if me.role != Role::Admin {
        return Err(HandlerErr::forbidden("admin role required"));
    }
    let user_id = get_required_str(params, "userId")?;
    let role = get_required_enum::<Role>(params, "role")?;
    if user_id == me.id && role != Role::Admin {
        return Err(HandlerErr::forbidden("admins cannot demote themselves"));
    }

    let store = store_mut(state)?;
    let mut user = store
        .get_user(&user_id)?
        .ok_or_else(|| HandlerErr::not_found("user not found"))?;
    user.role = role;
    store.update_user(&user)?;
    info!(user_id = %user.id, role = %role, "role changed");
    Ok(json!({ "user": user }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "session.signUp" => session_sign_up(state, &req.params),
        "session.signIn" => session_sign_in(state, &req.params),
        "session.signOut" => session_sign_out(state),
        "session.get" => session_get(state),
        "users.list" => users_list(state, &req.params),
        "users.updateProfile" => users_update_profile(state, &req.params),
        "users.setRole" => users_set_role(state, &req.params),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
