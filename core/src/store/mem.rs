/*
 * mem.rs
 * Copyright (C) 2026 Chris Burdess
 *
 * This file is part of Raven, a multi-tenant IMAP4rev1 mail-access server.
 *
 * Raven is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * Raven is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with Raven.  If not, see <http://www.gnu.org/licenses/>.
 */

//! In-memory `UserStore`, used by tests and by the demo binary when no real
//! backend is configured. Not a production backend: everything lives in a
//! single mutex-guarded map and is lost on restart.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};

use super::{
    FlagMode, IdRange, IdSet, MailboxAttr, MailboxInfo, MailboxListing, MessageView,
    RoleAssignment, StoreError, StoreResult, UserStore,
};

const DEFAULT_MAILBOXES: &[&str] = &["INBOX", "Sent", "Drafts", "Trash", "Spam"];

#[derive(Clone)]
struct MemMessage {
    uid: u32,
    flags: Vec<String>,
    internal_date: DateTime<Utc>,
    raw: Vec<u8>,
}

struct MailboxRecord {
    owner_user_id: i64,
    path: String,
    uid_validity: u32,
    uid_next: u32,
    subscribed: bool,
    /// Set on an implied ancestor created transparently by CREATE/RENAME to
    /// satisfy a deeper path (§3: "a child implies parent existence OR an
    /// implied parent with `\Noselect`"), never on a mailbox the caller
    /// named directly.
    noselect: bool,
    messages: Vec<MemMessage>,
}

#[derive(Default)]
struct State {
    next_user_id: i64,
    next_mailbox_id: i64,
    next_uid_validity: u32,
    users: HashMap<String, (i64, i64)>,
    mailboxes: HashMap<i64, MailboxRecord>,
    mailbox_ids_by_path: HashMap<(i64, String), i64>,
    role_assignments: HashMap<i64, Vec<i64>>,
    role_mailbox_by_email: HashMap<String, (i64, i64)>,
}

pub struct MemStore {
    state: Mutex<State>,
}

impl Default for MemStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemStore {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                next_user_id: 1,
                next_mailbox_id: 1,
                next_uid_validity: 1,
                ..Default::default()
            }),
        }
    }

    fn canon(path: &str) -> String {
        if path.eq_ignore_ascii_case("INBOX") {
            "INBOX".to_string()
        } else {
            path.to_string()
        }
    }

    /// Proper ancestors of `path` in root-to-leaf order, e.g.
    /// `Projects/Raven/Deep` -> `["Projects", "Projects/Raven"]`.
    fn ancestors(path: &str) -> Vec<String> {
        let mut out = Vec::new();
        let mut acc = String::new();
        for seg in path.split('/') {
            if !acc.is_empty() {
                acc.push('/');
            }
            acc.push_str(seg);
            out.push(acc.clone());
        }
        out.pop();
        out
    }

    /// Allocates a fresh mailbox id and inserts an empty mailbox at `path`.
    fn insert_mailbox(state: &mut State, user_id: i64, path: String, noselect: bool, subscribed: bool) {
        let mailbox_id = state.next_mailbox_id;
        state.next_mailbox_id += 1;
        let uid_validity = state.next_uid_validity;
        state.next_uid_validity += 1;
        state.mailbox_ids_by_path.insert((user_id, path.clone()), mailbox_id);
        state.mailboxes.insert(
            mailbox_id,
            MailboxRecord {
                owner_user_id: user_id,
                path,
                uid_validity,
                uid_next: 1,
                subscribed,
                noselect,
                messages: Vec::new(),
            },
        );
    }

    /// Creates any of `path`'s ancestors that don't already exist, as
    /// `\Noselect` placeholders (§4.5).
    fn create_missing_ancestors(state: &mut State, user_id: i64, path: &str) {
        for ancestor in Self::ancestors(path) {
            if !state.mailbox_ids_by_path.contains_key(&(user_id, ancestor.clone())) {
                Self::insert_mailbox(state, user_id, ancestor, true, false);
            }
        }
    }

    /// Directly register a role mailbox for tests: owner's mailbox becomes
    /// addressable as `Roles/<email>/...` for assigned users.
    pub fn register_role_mailbox(&self, email: &str, role_mailbox_id: i64, owner_domain_id: i64) {
        let mut state = self.state.lock().unwrap();
        state
            .role_mailbox_by_email
            .insert(email.to_string(), (role_mailbox_id, owner_domain_id));
    }

    pub fn assign_role(&self, user_id: i64, role_mailbox_id: i64) {
        let mut state = self.state.lock().unwrap();
        state.role_assignments.entry(user_id).or_default().push(role_mailbox_id);
    }
}

impl UserStore for MemStore {
    async fn open_user(&self, username: &str, domain: &str) -> StoreResult<(i64, i64)> {
        let email = format!("{username}@{domain}");
        let mut state = self.state.lock().unwrap();
        if let Some(ids) = state.users.get(&email) {
            return Ok(*ids);
        }
        let user_id = state.next_user_id;
        state.next_user_id += 1;
        let domain_id = user_id;
        state.users.insert(email, (user_id, domain_id));
        for path in DEFAULT_MAILBOXES {
            Self::insert_mailbox(&mut state, user_id, path.to_string(), false, true);
        }
        Ok((user_id, domain_id))
    }

    async fn list_mailboxes(&self, user_id: i64) -> StoreResult<Vec<MailboxListing>> {
        let state = self.state.lock().unwrap();
        let mut out: Vec<MailboxListing> = state
            .mailboxes
            .values()
            .filter(|m| m.owner_user_id == user_id)
            .map(|m| {
                let prefix = format!("{}/", m.path);
                let has_children = state
                    .mailboxes
                    .values()
                    .any(|other| other.owner_user_id == user_id && other.path.starts_with(&prefix));
                let mut attributes = Vec::new();
                if m.noselect {
                    attributes.push(MailboxAttr::Noselect);
                }
                attributes.push(if has_children { MailboxAttr::HasChildren } else { MailboxAttr::HasNoChildren });
                MailboxListing {
                    path: m.path.clone(),
                    attributes,
                    subscribed: m.subscribed,
                }
            })
            .collect();
        out.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(out)
    }

    async fn get_mailbox(&self, user_id: i64, path: &str) -> StoreResult<i64> {
        let path = Self::canon(path);
        let state = self.state.lock().unwrap();
        state
            .mailbox_ids_by_path
            .get(&(user_id, path))
            .copied()
            .ok_or(StoreError::NotFound)
    }

    async fn create_mailbox(&self, user_id: i64, path: &str) -> StoreResult<()> {
        let path = Self::canon(path);
        let mut state = self.state.lock().unwrap();
        if state.mailbox_ids_by_path.contains_key(&(user_id, path.clone())) {
            return Err(StoreError::AlreadyExists);
        }
        Self::create_missing_ancestors(&mut state, user_id, &path);
        Self::insert_mailbox(&mut state, user_id, path, false, false);
        Ok(())
    }

    async fn delete_mailbox(&self, user_id: i64, path: &str) -> StoreResult<()> {
        let path = Self::canon(path);
        let mut state = self.state.lock().unwrap();
        let prefix = format!("{path}/");
        let has_children = state
            .mailbox_ids_by_path
            .keys()
            .any(|(uid, p)| *uid == user_id && p.starts_with(&prefix));
        if has_children {
            return Err(StoreError::HasChildren);
        }
        let mailbox_id = state
            .mailbox_ids_by_path
            .remove(&(user_id, path))
            .ok_or(StoreError::NotFound)?;
        state.mailboxes.remove(&mailbox_id);
        Ok(())
    }

    async fn rename_mailbox(&self, user_id: i64, from: &str, to: &str) -> StoreResult<()> {
        let from = Self::canon(from);
        let to = Self::canon(to);
        let mut state = self.state.lock().unwrap();
        let mailbox_id = *state
            .mailbox_ids_by_path
            .get(&(user_id, from.clone()))
            .ok_or(StoreError::NotFound)?;
        if state.mailbox_ids_by_path.contains_key(&(user_id, to.clone())) {
            return Err(StoreError::AlreadyExists);
        }
        Self::create_missing_ancestors(&mut state, user_id, &to);

        if from == "INBOX" {
            let new_mailbox_id = state.next_mailbox_id;
            state.next_mailbox_id += 1;
            let uid_validity = state.next_uid_validity;
            state.next_uid_validity += 1;
            let messages = std::mem::take(&mut state.mailboxes.get_mut(&mailbox_id).unwrap().messages);
            let uid_next = messages.last().map(|m| m.uid + 1).unwrap_or(1);
            state.mailbox_ids_by_path.insert((user_id, to.clone()), new_mailbox_id);
            state.mailboxes.insert(
                new_mailbox_id,
                MailboxRecord {
                    owner_user_id: user_id,
                    path: to,
                    uid_validity,
                    uid_next,
                    subscribed: false,
                    noselect: false,
                    messages,
                },
            );
        } else {
            state.mailbox_ids_by_path.remove(&(user_id, from));
            state.mailbox_ids_by_path.insert((user_id, to.clone()), mailbox_id);
            state.mailboxes.get_mut(&mailbox_id).unwrap().path = to;
        }
        Ok(())
    }

    async fn subscribe(&self, user_id: i64, path: &str) -> StoreResult<()> {
        let path = Self::canon(path);
        let mut state = self.state.lock().unwrap();
        let mailbox_id = *state
            .mailbox_ids_by_path
            .get(&(user_id, path))
            .ok_or(StoreError::NotFound)?;
        state.mailboxes.get_mut(&mailbox_id).unwrap().subscribed = true;
        Ok(())
    }

    async fn unsubscribe(&self, user_id: i64, path: &str) -> StoreResult<()> {
        let path = Self::canon(path);
        let mut state = self.state.lock().unwrap();
        let mailbox_id = *state
            .mailbox_ids_by_path
            .get(&(user_id, path))
            .ok_or(StoreError::NotFound)?;
        state.mailboxes.get_mut(&mailbox_id).unwrap().subscribed = false;
        Ok(())
    }

    async fn list_subscriptions(&self, user_id: i64) -> StoreResult<Vec<String>> {
        let state = self.state.lock().unwrap();
        let mut out: Vec<String> = state
            .mailboxes
            .values()
            .filter(|m| m.owner_user_id == user_id && m.subscribed)
            .map(|m| m.path.clone())
            .collect();
        out.sort();
        Ok(out)
    }

    async fn mailbox_info(&self, mailbox_id: i64) -> StoreResult<MailboxInfo> {
        let state = self.state.lock().unwrap();
        let m = state.mailboxes.get(&mailbox_id).ok_or(StoreError::NotFound)?;
        Ok(MailboxInfo {
            uid_validity: m.uid_validity,
            uid_next: m.uid_next,
        })
    }

    async fn message_count(&self, mailbox_id: i64) -> StoreResult<u32> {
        let state = self.state.lock().unwrap();
        let m = state.mailboxes.get(&mailbox_id).ok_or(StoreError::NotFound)?;
        Ok(m.messages.len() as u32)
    }

    async fn unseen_count(&self, mailbox_id: i64) -> StoreResult<u32> {
        let state = self.state.lock().unwrap();
        let m = state.mailboxes.get(&mailbox_id).ok_or(StoreError::NotFound)?;
        Ok(m.messages
            .iter()
            .filter(|msg| !msg.flags.iter().any(|f| f.eq_ignore_ascii_case("\\Seen")))
            .count() as u32)
    }

    async fn max_uid(&self, mailbox_id: i64) -> StoreResult<u32> {
        let state = self.state.lock().unwrap();
        let m = state.mailboxes.get(&mailbox_id).ok_or(StoreError::NotFound)?;
        Ok(m.messages.last().map(|msg| msg.uid).unwrap_or(0))
    }

    async fn iterate_messages(&self, mailbox_id: i64, set: &IdSet) -> StoreResult<Vec<MessageView>> {
        let state = self.state.lock().unwrap();
        let m = state.mailboxes.get(&mailbox_id).ok_or(StoreError::NotFound)?;
        let matches = |seq: u32, uid: u32| -> bool {
            match set {
                IdSet::Seq(ranges) => ranges.iter().any(|r| r.contains(seq)),
                IdSet::Uid(ranges) => ranges.iter().any(|r| r.contains(uid)),
            }
        };
        let out = m
            .messages
            .iter()
            .enumerate()
            .filter(|(i, msg)| matches((*i + 1) as u32, msg.uid))
            .map(|(i, msg)| MessageView {
                seq: (i + 1) as u32,
                uid: msg.uid,
                flags: msg.flags.clone(),
                internal_date: msg.internal_date,
                size: msg.raw.len() as u32,
            })
            .collect();
        Ok(out)
    }

    async fn reconstruct_raw(&self, mailbox_id: i64, uid: u32) -> StoreResult<Vec<u8>> {
        let state = self.state.lock().unwrap();
        let m = state.mailboxes.get(&mailbox_id).ok_or(StoreError::NotFound)?;
        m.messages
            .iter()
            .find(|msg| msg.uid == uid)
            .map(|msg| msg.raw.clone())
            .ok_or(StoreError::NotFound)
    }

    async fn set_flags(
        &self,
        mailbox_id: i64,
        uid: u32,
        mode: FlagMode,
        flags: &[String],
    ) -> StoreResult<Vec<String>> {
        let mut state = self.state.lock().unwrap();
        let m = state.mailboxes.get_mut(&mailbox_id).ok_or(StoreError::NotFound)?;
        let msg = m
            .messages
            .iter_mut()
            .find(|msg| msg.uid == uid)
            .ok_or(StoreError::NotFound)?;
        match mode {
            FlagMode::Replace => {
                msg.flags = flags.iter().filter(|f| !f.eq_ignore_ascii_case("\\Recent")).cloned().collect();
            }
            FlagMode::Add => {
                for f in flags {
                    if f.eq_ignore_ascii_case("\\Recent") {
                        continue;
                    }
                    if !msg.flags.iter().any(|existing| existing.eq_ignore_ascii_case(f)) {
                        msg.flags.push(f.clone());
                    }
                }
            }
            FlagMode::Remove => {
                msg.flags.retain(|existing| !flags.iter().any(|f| f.eq_ignore_ascii_case(existing)));
            }
        }
        Ok(msg.flags.clone())
    }

    async fn append_message(
        &self,
        mailbox_id: i64,
        raw: &[u8],
        flags: &[String],
        internal_date: DateTime<Utc>,
    ) -> StoreResult<u32> {
        let mut state = self.state.lock().unwrap();
        let m = state.mailboxes.get_mut(&mailbox_id).ok_or(StoreError::NotFound)?;
        let uid = m.uid_next;
        m.uid_next += 1;
        m.messages.push(MemMessage {
            uid,
            flags: flags.to_vec(),
            internal_date,
            raw: raw.to_vec(),
        });
        Ok(uid)
    }

    async fn copy_messages(&self, src_mailbox: i64, uids: &[u32], dst_mailbox: i64) -> StoreResult<()> {
        let mut state = self.state.lock().unwrap();
        if !state.mailboxes.contains_key(&dst_mailbox) {
            return Err(StoreError::NotFound);
        }
        let src = state.mailboxes.get(&src_mailbox).ok_or(StoreError::NotFound)?;
        let mut to_copy = Vec::with_capacity(uids.len());
        for &uid in uids {
            let msg = src.messages.iter().find(|m| m.uid == uid).ok_or(StoreError::NotFound)?;
            to_copy.push(msg.clone());
        }
        let dst = state.mailboxes.get_mut(&dst_mailbox).unwrap();
        for msg in to_copy {
            let new_uid = dst.uid_next;
            dst.uid_next += 1;
            let mut flags = msg.flags.clone();
            if !flags.iter().any(|f| f.eq_ignore_ascii_case("\\Recent")) {
                flags.push("\\Recent".to_string());
            }
            dst.messages.push(MemMessage {
                uid: new_uid,
                flags,
                internal_date: msg.internal_date,
                raw: msg.raw,
            });
        }
        Ok(())
    }

    async fn expunge_deleted(&self, mailbox_id: i64) -> StoreResult<Vec<u32>> {
        let mut state = self.state.lock().unwrap();
        let m = state.mailboxes.get_mut(&mailbox_id).ok_or(StoreError::NotFound)?;
        let mut removed_seqs = Vec::new();
        let mut kept = Vec::with_capacity(m.messages.len());
        for (i, msg) in m.messages.drain(..).enumerate() {
            if msg.flags.iter().any(|f| f.eq_ignore_ascii_case("\\Deleted")) {
                removed_seqs.push((i + 1) as u32);
            } else {
                kept.push(msg);
            }
        }
        m.messages = kept;
        removed_seqs.reverse();
        Ok(removed_seqs)
    }

    async fn get_user_role_assignments(&self, user_id: i64) -> StoreResult<Vec<RoleAssignment>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .role_assignments
            .get(&user_id)
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .map(|role_mailbox_id| RoleAssignment { role_mailbox_id })
            .collect())
    }

    async fn get_role_mailbox_by_email(&self, email: &str) -> StoreResult<(i64, i64)> {
        let state = self.state.lock().unwrap();
        state
            .role_mailbox_by_email
            .get(email)
            .copied()
            .ok_or(StoreError::NotFound)
    }

    async fn is_user_assigned_to_role(&self, user_id: i64, role_mailbox_id: i64) -> StoreResult<bool> {
        let state = self.state.lock().unwrap();
        Ok(state
            .role_assignments
            .get(&user_id)
            .map(|roles| roles.contains(&role_mailbox_id))
            .unwrap_or(false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[tokio::test]
    async fn open_user_creates_default_mailboxes() {
        let store = MemStore::new();
        let (user_id, _domain_id) = store.open_user("alice", "example.com").await.unwrap();
        let mailboxes = store.list_mailboxes(user_id).await.unwrap();
        let mut paths: Vec<_> = mailboxes.into_iter().map(|m| m.path).collect();
        paths.sort();
        assert_eq!(paths, vec!["Drafts", "INBOX", "Sent", "Spam", "Trash"]);
    }

    #[tokio::test]
    async fn open_user_is_idempotent() {
        let store = MemStore::new();
        let first = store.open_user("alice", "example.com").await.unwrap();
        let second = store.open_user("alice", "example.com").await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn append_and_fetch_round_trip() {
        let store = MemStore::new();
        let (user_id, _) = store.open_user("alice", "example.com").await.unwrap();
        let mailbox_id = store.get_mailbox(user_id, "INBOX").await.unwrap();
        let uid = store
            .append_message(mailbox_id, b"Subject: hi\r\n\r\nbody", &[], Utc::now())
            .await
            .unwrap();
        assert_eq!(uid, 1);
        let views = store
            .iterate_messages(mailbox_id, &IdSet::Uid(vec![IdRange::single(1)]))
            .await
            .unwrap();
        assert_eq!(views.len(), 1);
        assert_eq!(views[0].seq, 1);
    }

    #[tokio::test]
    async fn create_transparently_creates_missing_ancestors() {
        let store = MemStore::new();
        let (user_id, _) = store.open_user("alice", "example.com").await.unwrap();
        store.create_mailbox(user_id, "Projects/Raven/Deep").await.unwrap();
        let mailboxes = store.list_mailboxes(user_id).await.unwrap();
        let by_path: HashMap<_, _> = mailboxes.into_iter().map(|m| (m.path.clone(), m)).collect();
        let projects = by_path.get("Projects").unwrap();
        assert!(projects.attributes.contains(&MailboxAttr::Noselect));
        let raven = by_path.get("Projects/Raven").unwrap();
        assert!(raven.attributes.contains(&MailboxAttr::Noselect));
        let deep = by_path.get("Projects/Raven/Deep").unwrap();
        assert!(!deep.attributes.contains(&MailboxAttr::Noselect));
    }

    #[tokio::test]
    async fn rename_creates_missing_destination_ancestors() {
        let store = MemStore::new();
        let (user_id, _) = store.open_user("alice", "example.com").await.unwrap();
        store.create_mailbox(user_id, "Old").await.unwrap();
        store.rename_mailbox(user_id, "Old", "Archive/2026/Jan").await.unwrap();
        let mailboxes = store.list_mailboxes(user_id).await.unwrap();
        let paths: HashSet<_> = mailboxes.into_iter().map(|m| m.path).collect();
        assert!(paths.contains("Archive"));
        assert!(paths.contains("Archive/2026"));
        assert!(paths.contains("Archive/2026/Jan"));
    }

    #[tokio::test]
    async fn delete_fails_with_children() {
        let store = MemStore::new();
        let (user_id, _) = store.open_user("alice", "example.com").await.unwrap();
        store.create_mailbox(user_id, "Projects").await.unwrap();
        store.create_mailbox(user_id, "Projects/Raven").await.unwrap();
        let result = store.delete_mailbox(user_id, "Projects").await;
        assert!(matches!(result, Err(StoreError::HasChildren)));
    }

    #[tokio::test]
    async fn expunge_returns_descending_sequence_numbers() {
        let store = MemStore::new();
        let (user_id, _) = store.open_user("alice", "example.com").await.unwrap();
        let mailbox_id = store.get_mailbox(user_id, "INBOX").await.unwrap();
        for _ in 0..3 {
            store
                .append_message(mailbox_id, b"x", &[], Utc::now())
                .await
                .unwrap();
        }
        store
            .set_flags(mailbox_id, 1, FlagMode::Add, &["\\Deleted".to_string()])
            .await
            .unwrap();
        store
            .set_flags(mailbox_id, 3, FlagMode::Add, &["\\Deleted".to_string()])
            .await
            .unwrap();
        let removed = store.expunge_deleted(mailbox_id).await.unwrap();
        assert_eq!(removed, vec![3, 1]);
    }
}
