use crate::ipc::helpers::{
    current_user, get_opt_enum, get_opt_str, get_opt_ts, get_required_str, respond, store,
    store_mut, HandlerErr, HandlerResult,
};
use crate::ipc::types::{AppState, Request, Subscription};
use crate::model::{timestamp_now, Conversation, ConversationType, Message, User};
use crate::store::Store;
use serde_json::{json, Value};
use tracing::{debug, info};
use uuid::Uuid;

pub const MESSAGE_INSERTED_EVENT: &str = "messages.inserted";

fn participant_conversation(
    store: &dyn Store,
    me: &User,
    params: &Value,
) -> Result<Conversation, HandlerErr> {
    let id = get_required_str(params, "conversationId")?;
    let conversation = store
        .get_conversation(&id)?
        .ok_or_else(|| HandlerErr::not_found("conversation not found"))?;
    if !conversation.has_participant(&me.id) {
        return Err(HandlerErr::forbidden("not a participant of this conversation"));
    }
    Ok(conversation)
}

fn participant_ids(params: &Value, me: &User) -> Result<Vec<String>, HandlerErr> {
    let items = params
        .get("participantIds")
        .and_then(|v| v.as_array())
        .ok_or_else(|| HandlerErr::bad_params("missing participantIds"))?;
    let mut ids = vec![me.id.clone()];
    for item in items {
        let id = item
            .as_str()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| HandlerErr::bad_params("participantIds must contain ids"))?;
        if !ids.iter().any(|existing| existing == id) {
            ids.push(id.to_string());
        }
    }
    Ok(ids)
}

fn conversations_create(state: &mut AppState, params: &Value) -> HandlerResult {
    let me = current_user(state)?;
    let participants = participant_ids(params, &me)?;
    if participants.len() < 2 {
        return Err(HandlerErr::bad_params("a conversation needs another participant"));
    }
    let conversation_type = get_opt_enum::<ConversationType>(params, "type")?.unwrap_or(
        if participants.len() == 2 {
            ConversationType::Direct
        } else {
            ConversationType::Group
        },
    );
    if conversation_type == ConversationType::Direct && participants.len() != 2 {
        return Err(HandlerErr::bad_params(
            "direct conversations have exactly two participants",
        ));
    }

    let store = store_mut(state)?;
    for id in &participants {
        if store.get_user(id)?.is_none() {
            return Err(HandlerErr::not_found(format!("user {} not found", id)));
        }
    }
    let conversation = Conversation {
        id: Uuid::new_v4().to_string(),
        participant_ids: participants,
        conversation_type,
        name: get_opt_str(params, "name"),
        created_at: timestamp_now(),
    };
    store.insert_conversation(&conversation)?;
    info!(conversation_id = %conversation.id, "conversation created");
    Ok(json!({ "conversation": conversation }))
}

fn conversations_list(state: &mut AppState) -> HandlerResult {
    let me = current_user(state)?;
    let store = store(state)?;

    let mut rows = Vec::new();
    for conversation in store.list_conversations_for(&me.id)? {
        let messages = store.list_messages(&conversation.id, None)?;
        let unread = messages
            .iter()
            .filter(|m| m.sender_id != me.id && m.read_at.is_none())
            .count();
        let last = messages.last().cloned();
        let activity = last
            .as_ref()
            .map(|m| m.created_at)
            .unwrap_or(conversation.created_at);
        rows.push((activity, conversation, last, unread));
    }
    // Most recent activity first.
    rows.sort_by(|a, b| b.0.cmp(&a.0));

    let conversations: Vec<Value> = rows
        .into_iter()
        .map(|(_, conversation, last, unread)| {
            json!({
                "conversation": conversation,
                "lastMessage": last,
                "unreadCount": unread,
            })
        })
        .collect();
    Ok(json!({ "conversations": conversations }))
}

fn messages_list(state: &mut AppState, params: &Value) -> HandlerResult {
    let me = current_user(state)?;
    let store = store(state)?;
    let conversation = participant_conversation(store, &me, params)?;
    let messages = store.list_messages(&conversation.id, None)?;
    Ok(json!({ "messages": messages }))
}

fn messages_since(state: &mut AppState, params: &Value) -> HandlerResult {
    let me = current_user(state)?;
    let since = get_opt_ts(params, "since")?.ok_or_else(|| HandlerErr::bad_params("missing since"))?;
    let store = store(state)?;
    let conversation = participant_conversation(store, &me, params)?;
    let messages = store.list_messages(&conversation.id, Some(since))?;
    Ok(json!({ "messages": messages }))
}

fn messages_send(state: &mut AppState, params: &Value) -> HandlerResult {
    let me = current_user(state)?;
    let content = get_required_str(params, "content")?;
    let conversation = participant_conversation(store(state)?, &me, params)?;

    let receiver_id = match get_opt_str(params, "receiverId") {
        Some(id) if id == me.id || !conversation.has_participant(&id) => {
            return Err(HandlerErr::bad_params(
                "receiverId must be another participant",
            ));
        }
        Some(id) => Some(id),
        None if conversation.conversation_type == ConversationType::Direct => conversation
            .participant_ids
            .iter()
            .find(|p| **p != me.id)
            .cloned(),
        None => None,
    };

    let message = Message {
        id: Uuid::new_v4().to_string(),
        conversation_id: conversation.id.clone(),
        sender_id: me.id.clone(),
        receiver_id,
        content,
        read_at: None,
        created_at: timestamp_now(),
    };
    store_mut(state)?.insert_message(&message)?;
    publish_inserted(state, &message);
    Ok(json!({ "message": message }))
}

/// Queues one event per live subscription on the message's conversation.
/// Delivery is best effort: nothing is retained for late subscribers.
fn publish_inserted(state: &mut AppState, message: &Message) {
    let mut targets: Vec<&String> = state
        .subscriptions
        .iter()
        .filter(|(_, sub)| sub.conversation_id == message.conversation_id)
        .map(|(id, _)| id)
        .collect();
    targets.sort();
    for subscription_id in targets {
        state.events.push(json!({
            "event": MESSAGE_INSERTED_EVENT,
            "subscriptionId": subscription_id,
            "conversationId": message.conversation_id,
            "message": message,
        }));
    }
}

fn messages_mark_read(state: &mut AppState, params: &Value) -> HandlerResult {
    let me = current_user(state)?;
    let conversation = participant_conversation(store(state)?, &me, params)?;
    let updated = store_mut(state)?.mark_read(&conversation.id, &me.id, timestamp_now())?;
    debug!(conversation_id = %conversation.id, updated, "messages marked read");
    Ok(json!({ "updated": updated }))
}

fn messages_subscribe(state: &mut AppState, params: &Value) -> HandlerResult {
    let me = current_user(state)?;
    let conversation = participant_conversation(store(state)?, &me, params)?;
    let subscription_id = Uuid::new_v4().to_string();
    state.subscriptions.insert(
        subscription_id.clone(),
        Subscription {
            conversation_id: conversation.id.clone(),
            user_id: me.id,
        },
    );
    Ok(json!({
        "subscriptionId": subscription_id,
        "conversationId": conversation.id,
    }))
}

fn messages_unsubscribe(state: &mut AppState, params: &Value) -> HandlerResult {
    let me = current_user(state)?;
    let subscription_id = get_required_str(params, "subscriptionId")?;
    match state.subscriptions.get(&subscription_id) {
        Some(sub) if sub.user_id == me.id => {
            state.subscriptions.remove(&subscription_id);
            Ok(json!({ "unsubscribed": true, "subscriptionId": subscription_id }))
        }
        _ => Err(HandlerErr::not_found("subscription not found")),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "conversations.create" => conversations_create(state, &req.params),
        "conversations.list" => conversations_list(state),
        "messages.list" => messages_list(state, &req.params),
        "messages.since" => messages_since(state, &req.params),
        "messages.send" => messages_send(state, &req.params),
        "messages.markRead" => messages_mark_read(state, &req.params),
        "messages.subscribe" => messages_subscribe(state, &req.params),
        "messages.unsubscribe" => messages_unsubscribe(state, &req.params),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
