//! Pure transitions: `(state, action) -> state`.
//!
//! No transition mutates its input. A transition that changes nothing returns
//! the input `Arc` itself, and threads it does not touch keep their `Arc`.

use std::collections::HashSet;
use std::sync::Arc;

use livesync_merge::fold;
use tracing::{debug, trace};

use crate::actions::{MarkThreadsSeen, ThreadsAction};
use crate::filter::thread_matches;
use crate::state::{extract_internal_id, ThreadsState};
use crate::types::{MessageFragment, MessageType, ThreadData};

pub fn reduce(state: &Arc<ThreadsState>, action: ThreadsAction) -> Arc<ThreadsState> {
    let name = action.name();
    let next = match action {
        ThreadsAction::MergeThread { thread } => merge_thread(state, thread),
        ThreadsAction::RemoveMessage {
            thread_id,
            message_id,
        } => remove_message(state, &thread_id, &message_id),
        ThreadsAction::MarkThreadsSeen(payload) => mark_threads_seen(state, &payload),
        ThreadsAction::AddThread {
            new_thread_id,
            external_id,
            name,
            location,
            message,
        } => {
            if state.threads_data.contains_key(&new_thread_id)
                || state.external_id_map.contains_key(&external_id)
            {
                debug!(thread_id = %new_thread_id, external_id = %external_id, "Thread already known, not adding");
                return Arc::clone(state);
            }
            let mut thread = ThreadData::from_messages(new_thread_id, external_id, vec![message]);
            thread.name = name;
            thread.location = location;
            thread.subscribed = true;
            thread.viewer_is_thread_participant = true;

            let mut next = (**state).clone();
            next.local_only_thread_ids.insert(thread.id.clone());
            insert_thread(&mut next, thread);
            Arc::new(next)
        }
        ThreadsAction::RemoveThread { thread_id } => {
            if !state.threads_data.contains_key(&thread_id) {
                return Arc::clone(state);
            }
            let mut next = (**state).clone();
            drop_thread(&mut next, &thread_id);
            Arc::new(next)
        }
        ThreadsAction::MergeMessage {
            thread_id,
            message,
            viewer_is_author,
            is_new_message,
        } => merge_message(state, &thread_id, message, viewer_is_author, is_new_message),
        ThreadsAction::UpdateMessage { thread_id, message } => {
            update_message(state, &thread_id, message)
        }
        ThreadsAction::SetThreadIds { thread_ids } => set_thread_ids(state, thread_ids),
        ThreadsAction::SetProperties {
            thread_id,
            name,
            resolved,
            metadata,
        } => update_thread(state, &thread_id, |thread| {
            let mut updated = thread.clone();
            if let Some(name) = name {
                updated.name = name;
            }
            if let Some(resolved) = resolved {
                updated.resolved = resolved;
            }
            if let Some(delta) = &metadata {
                updated.metadata = fold(&updated.metadata, delta);
            }
            Some(updated)
        }),
        ThreadsAction::SetSubscribed {
            thread_id,
            subscribed,
        } => update_thread(state, &thread_id, |thread| {
            let mut updated = thread.clone();
            updated.subscribed = subscribed;
            Some(updated)
        }),
        ThreadsAction::SetDraftMessageInComposer { draft } => {
            if state.draft_message_in_composer == draft {
                return Arc::clone(state);
            }
            let mut next = (**state).clone();
            next.draft_message_in_composer = draft;
            Arc::new(next)
        }
    };

    if Arc::ptr_eq(state, &next) {
        trace!(action = name, "Action left state unchanged");
    }
    next
}

// ---------------------------------------------------------------------------
// MergeThread
// ---------------------------------------------------------------------------

fn merge_thread(state: &Arc<ThreadsState>, thread: ThreadData) -> Arc<ThreadsState> {
    let already_current = state.threads_data.get(&thread.id).is_some_and(|existing| {
        **existing == thread
            && !state.is_local_only(&thread.id)
            && state.external_id_map.get(&thread.external_id) == Some(&thread.id)
    });
    if already_current {
        return Arc::clone(state);
    }

    let mut next = (**state).clone();

    let superseded = next
        .external_id_map
        .get(&thread.external_id)
        .filter(|old| **old != thread.id)
        .cloned();
    if let Some(old_id) = superseded {
        debug!(old = %old_id, new = %thread.id, external_id = %thread.external_id, "Replacing superseded thread");
        drop_thread(&mut next, &old_id);
    }

    // Forget message mappings of the version being replaced; the new version
    // re-adds the messages it still has.
    if let Some(previous) = next.threads_data.get(&thread.id).cloned() {
        for message in &previous.messages {
            if next.message_external_id_map.get(&message.external_id) == Some(&thread.id) {
                next.message_external_id_map.remove(&message.external_id);
            }
        }
    }

    next.local_only_thread_ids.remove(&thread.id);
    insert_thread(&mut next, thread);
    Arc::new(next)
}

/// Insert or replace a thread together with all of its index entries.
fn insert_thread(next: &mut ThreadsState, thread: ThreadData) {
    let id = thread.id.clone();

    for message in &thread.messages {
        next.message_external_id_map
            .insert(message.external_id.clone(), id.clone());
    }

    // One external ID per thread: drop a stale binding if the external ID changed.
    next.external_id_map
        .retain(|external, internal| *internal != id || *external == thread.external_id);
    next.external_id_map
        .insert(thread.external_id.clone(), id.clone());

    if !next.thread_ids.contains(&id) {
        next.thread_ids.push(id.clone());
    }
    next.threads_data.insert(id, Arc::new(thread));
}

/// Remove a thread and every index entry that points at it.
fn drop_thread(next: &mut ThreadsState, thread_id: &str) {
    next.threads_data.remove(thread_id);
    next.thread_ids.retain(|id| id != thread_id);
    next.local_only_thread_ids.remove(thread_id);
    next.external_id_map.retain(|_, id| id != thread_id);
    next.message_external_id_map.retain(|_, id| id != thread_id);
}

// ---------------------------------------------------------------------------
// RemoveMessage
// ---------------------------------------------------------------------------

fn remove_message(state: &Arc<ThreadsState>, thread_id: &str, message_id: &str) -> Arc<ThreadsState> {
    let Some(thread) = state.threads_data.get(thread_id) else {
        debug!(thread_id, message_id, "Remove for unknown thread ignored");
        return Arc::clone(state);
    };
    let Some(index) = thread.messages.iter().position(|m| m.id == message_id) else {
        debug!(thread_id, message_id, "Remove for unknown message ignored");
        return Arc::clone(state);
    };

    let mut next = (**state).clone();
    if thread.messages.len() == 1 {
        drop_thread(&mut next, thread_id);
        return Arc::new(next);
    }

    let mut updated = (**thread).clone();
    let removed = updated.messages.remove(index);

    updated.all_messages_count = updated.all_messages_count.saturating_sub(1);
    updated.reply_count = updated.reply_count.saturating_sub(1);
    match removed.message_type {
        MessageType::UserMessage => {
            updated.user_messages_count = updated.user_messages_count.saturating_sub(1)
        }
        MessageType::ActionMessage => {
            updated.action_messages_count = updated.action_messages_count.saturating_sub(1)
        }
    }
    if !removed.is_deleted() {
        updated.messages_count_excluding_deleted =
            updated.messages_count_excluding_deleted.saturating_sub(1);
    }
    if !removed.seen {
        updated.new_messages_count = updated.new_messages_count.saturating_sub(1);
        updated.has_new_messages = updated.new_messages_count > 0;
    }
    if updated.first_unseen_message_id.as_deref() == Some(removed.id.as_str()) {
        updated.first_unseen_message_id = next_unseen_from(&updated.messages, index);
    }

    if next.message_external_id_map.get(&removed.external_id).map(String::as_str) == Some(thread_id) {
        next.message_external_id_map.remove(&removed.external_id);
    }
    next.threads_data
        .insert(thread_id.to_string(), Arc::new(updated));
    Arc::new(next)
}

fn next_unseen_from(messages: &[MessageFragment], index: usize) -> Option<String> {
    messages
        .iter()
        .skip(index)
        .find(|m| !m.seen)
        .map(|m| m.id.clone())
}

// ---------------------------------------------------------------------------
// MarkThreadsSeen
// ---------------------------------------------------------------------------

fn mark_threads_seen(state: &Arc<ThreadsState>, payload: &MarkThreadsSeen) -> Arc<ThreadsState> {
    let targets_thread = |thread: &ThreadData| match payload.external_thread_id.as_deref() {
        None => true,
        Some(external) => {
            thread.external_id == external || extract_internal_id(external) == Some(thread.id.as_str())
        }
    };

    let changed: Vec<Arc<ThreadData>> = state
        .threads_data
        .values()
        .filter(|thread| targets_thread(thread))
        .filter(|thread| thread_matches(thread, &payload.viewer, &payload.filter))
        .filter_map(|thread| {
            let updated = with_seen(thread, payload.seen);
            (updated != **thread).then(|| Arc::new(updated))
        })
        .collect();

    if changed.is_empty() {
        return Arc::clone(state);
    }

    let mut next = (**state).clone();
    for thread in changed {
        next.threads_data.insert(thread.id.clone(), thread);
    }
    Arc::new(next)
}

fn with_seen(thread: &ThreadData, seen: bool) -> ThreadData {
    let mut updated = thread.clone();
    for message in &mut updated.messages {
        message.seen = seen;
    }
    if seen {
        updated.new_messages_count = 0;
        updated.new_reactions_count = 0;
        updated.first_unseen_message_id = None;
    } else {
        updated.new_messages_count = thread.all_messages_count;
        updated.new_reactions_count = thread.total_reactions();
        updated.first_unseen_message_id = thread.first_message().map(|m| m.id.clone());
    }
    updated.has_new_messages = !seen;
    updated.viewer_is_thread_participant = true;
    updated
}

// ---------------------------------------------------------------------------
// Message upserts
// ---------------------------------------------------------------------------

fn merge_message(
    state: &Arc<ThreadsState>,
    thread_id: &str,
    mut message: MessageFragment,
    viewer_is_author: bool,
    is_new_message: bool,
) -> Arc<ThreadsState> {
    let Some(thread) = state.threads_data.get(thread_id) else {
        debug!(thread_id, message_id = %message.id, "Message for unknown thread ignored");
        return Arc::clone(state);
    };
    if viewer_is_author {
        message.seen = true;
    }
    let external_id = message.external_id.clone();

    let mut updated = (**thread).clone();
    let mut replaced_external_id = None;
    match updated.messages.iter().position(|m| m.id == message.id) {
        Some(index) => {
            let previous = std::mem::replace(&mut updated.messages[index], message);
            adjust_for_replacement(&mut updated, &previous, index);
            replaced_external_id = Some(previous.external_id);
        }
        None => {
            let at = updated
                .messages
                .partition_point(|m| m.timestamp <= message.timestamp);
            if is_new_message {
                updated.all_messages_count += 1;
                updated.reply_count += 1;
                match message.message_type {
                    MessageType::UserMessage => updated.user_messages_count += 1,
                    MessageType::ActionMessage => updated.action_messages_count += 1,
                }
                if !message.is_deleted() {
                    updated.messages_count_excluding_deleted += 1;
                }
                if !message.seen {
                    updated.new_messages_count += 1;
                    updated.has_new_messages = true;
                    if updated.first_unseen_message_id.is_none() {
                        updated.first_unseen_message_id = Some(message.id.clone());
                    }
                }
            } else {
                // Backfilled history: already counted, just no longer "older".
                updated.older_messages_count = updated.older_messages_count.saturating_sub(1);
            }
            updated.messages.insert(at, message);
        }
    }
    if viewer_is_author {
        updated.viewer_is_thread_participant = true;
    }

    let mapped = state.message_external_id_map.get(&external_id).map(String::as_str) == Some(thread_id);
    if updated == **thread && mapped {
        return Arc::clone(state);
    }

    let mut next = (**state).clone();
    reindex_message(
        &mut next,
        thread_id,
        replaced_external_id.as_deref(),
        &external_id,
    );
    next.threads_data
        .insert(thread_id.to_string(), Arc::new(updated));
    Arc::new(next)
}

/// Replace a loaded message. Unknown threads and messages are ignored.
fn update_message(
    state: &Arc<ThreadsState>,
    thread_id: &str,
    message: MessageFragment,
) -> Arc<ThreadsState> {
    let Some(thread) = state.threads_data.get(thread_id) else {
        debug!(thread_id, message_id = %message.id, "Update for unknown thread ignored");
        return Arc::clone(state);
    };
    let Some(index) = thread.messages.iter().position(|m| m.id == message.id) else {
        debug!(thread_id, message_id = %message.id, "Update for unknown message ignored");
        return Arc::clone(state);
    };
    let external_id = message.external_id.clone();

    let mut updated = (**thread).clone();
    let previous = std::mem::replace(&mut updated.messages[index], message);
    adjust_for_replacement(&mut updated, &previous, index);
    if updated == **thread {
        return Arc::clone(state);
    }

    let mut next = (**state).clone();
    reindex_message(&mut next, thread_id, Some(&previous.external_id), &external_id);
    next.threads_data
        .insert(thread_id.to_string(), Arc::new(updated));
    Arc::new(next)
}

/// Point `external_id` at the thread, dropping the entry of the external ID
/// it replaced when that one still points here.
fn reindex_message(
    next: &mut ThreadsState,
    thread_id: &str,
    replaced: Option<&str>,
    external_id: &str,
) {
    if let Some(old) = replaced.filter(|old| *old != external_id) {
        if next.message_external_id_map.get(old).map(String::as_str) == Some(thread_id) {
            next.message_external_id_map.remove(old);
        }
    }
    next.message_external_id_map
        .insert(external_id.to_string(), thread_id.to_string());
}

/// Fix counters after `updated.messages[index]` replaced `previous`.
fn adjust_for_replacement(updated: &mut ThreadData, previous: &MessageFragment, index: usize) {
    let current = &updated.messages[index];
    let (was_deleted, is_deleted) = (previous.is_deleted(), current.is_deleted());
    let (was_seen, is_seen) = (previous.seen, current.seen);
    let current_type = current.message_type;
    let current_id = current.id.clone();

    if previous.message_type != current_type {
        match previous.message_type {
            MessageType::UserMessage => {
                updated.user_messages_count = updated.user_messages_count.saturating_sub(1)
            }
            MessageType::ActionMessage => {
                updated.action_messages_count = updated.action_messages_count.saturating_sub(1)
            }
        }
        match current_type {
            MessageType::UserMessage => updated.user_messages_count += 1,
            MessageType::ActionMessage => updated.action_messages_count += 1,
        }
    }

    match (was_deleted, is_deleted) {
        (false, true) => {
            updated.messages_count_excluding_deleted =
                updated.messages_count_excluding_deleted.saturating_sub(1)
        }
        (true, false) => updated.messages_count_excluding_deleted += 1,
        _ => {}
    }

    match (was_seen, is_seen) {
        (false, true) => {
            updated.new_messages_count = updated.new_messages_count.saturating_sub(1);
            updated.has_new_messages = updated.new_messages_count > 0;
            if updated.first_unseen_message_id.as_deref() == Some(current_id.as_str()) {
                updated.first_unseen_message_id = next_unseen_from(&updated.messages, index);
            }
        }
        (true, false) => {
            updated.new_messages_count += 1;
            updated.has_new_messages = true;
            let earlier_unseen = updated.messages[..index].iter().any(|m| !m.seen);
            if !earlier_unseen {
                updated.first_unseen_message_id = Some(current_id);
            }
        }
        _ => {}
    }
}

// ---------------------------------------------------------------------------
// Ordering and per-thread property updates
// ---------------------------------------------------------------------------

fn set_thread_ids(state: &Arc<ThreadsState>, requested: Vec<String>) -> Arc<ThreadsState> {
    let mut placed: HashSet<String> = HashSet::new();
    let mut ordered: Vec<String> = requested
        .into_iter()
        .filter(|id| state.threads_data.contains_key(id) && placed.insert(id.clone()))
        .collect();
    ordered.extend(
        state
            .thread_ids
            .iter()
            .filter(|id| !placed.contains(*id))
            .cloned(),
    );

    if ordered == state.thread_ids {
        return Arc::clone(state);
    }
    let mut next = (**state).clone();
    next.thread_ids = ordered;
    Arc::new(next)
}

/// Rewrite one thread. `f` returning `None`, or an equal thread, is a no-op.
fn update_thread<F>(state: &Arc<ThreadsState>, thread_id: &str, f: F) -> Arc<ThreadsState>
where
    F: FnOnce(&ThreadData) -> Option<ThreadData>,
{
    let Some(thread) = state.threads_data.get(thread_id) else {
        debug!(thread_id, "Update for unknown thread ignored");
        return Arc::clone(state);
    };
    match f(thread) {
        Some(updated) if updated != **thread => {
            let mut next = (**state).clone();
            next.threads_data
                .insert(thread_id.to_string(), Arc::new(updated));
            Arc::new(next)
        }
        _ => Arc::clone(state),
    }
}
