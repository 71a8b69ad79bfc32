/*
 * mod.rs
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

//! The User Store: the narrow contract the engine consumes for mailboxes,
//! messages, flags, subscriptions, and role assignments. Message delivery
//! and on-disk/blob storage live behind this trait, out of scope for the
//! engine itself (per-backend implementations are free to be relational).

mod error;
pub mod mem;

pub use error::StoreError;

use chrono::{DateTime, Utc};

pub type StoreResult<T> = Result<T, StoreError>;

/// RFC 3501 mailbox attributes the engine cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MailboxAttr {
    Noselect,
    HasChildren,
    HasNoChildren,
    Marked,
    Unmarked,
}

impl MailboxAttr {
    pub fn as_str(&self) -> &'static str {
        match self {
            MailboxAttr::Noselect => "\\Noselect",
            MailboxAttr::HasChildren => "\\HasChildren",
            MailboxAttr::HasNoChildren => "\\HasNoChildren",
            MailboxAttr::Marked => "\\Marked",
            MailboxAttr::Unmarked => "\\Unmarked",
        }
    }
}

/// One entry in a mailbox listing: path plus the attributes LIST/LSUB need.
#[derive(Debug, Clone)]
pub struct MailboxListing {
    pub path: String,
    pub attributes: Vec<MailboxAttr>,
    pub subscribed: bool,
}

/// Counters the engine needs at SELECT/EXAMINE/STATUS time.
#[derive(Debug, Clone, Copy)]
pub struct MailboxInfo {
    pub uid_validity: u32,
    pub uid_next: u32,
}

/// A message as the engine sees it: a positional/identity view, not the
/// message object itself. `raw` is fetched separately via `reconstruct_raw`.
#[derive(Debug, Clone)]
pub struct MessageView {
    pub seq: u32,
    pub uid: u32,
    pub flags: Vec<String>,
    pub internal_date: DateTime<Utc>,
    pub size: u32,
}

/// A contiguous, already-resolved (no `*`) inclusive range.
#[derive(Debug, Clone, Copy)]
pub struct IdRange {
    pub start: u32,
    pub end: u32,
}

impl IdRange {
    pub fn single(n: u32) -> Self {
        Self { start: n, end: n }
    }

    pub fn contains(&self, n: u32) -> bool {
        n >= self.start && n <= self.end
    }
}

/// A sequence set as resolved by the message engine: either sequence numbers
/// or UIDs, already concrete (callers resolve `*` before building this).
#[derive(Debug, Clone)]
pub enum IdSet {
    Seq(Vec<IdRange>),
    Uid(Vec<IdRange>),
}

/// How STORE should apply a flag list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlagMode {
    Replace,
    Add,
    Remove,
}

/// A role-mailbox assignment: `(user_id, role_mailbox_id)`, per §3.
#[derive(Debug, Clone, Copy)]
pub struct RoleAssignment {
    pub role_mailbox_id: i64,
}

/// The narrow contract between the IMAP engine and the backing store.
///
/// Implementations must uphold: UID monotonicity per mailbox, UIDVALIDITY
/// stability across opens (until the store explicitly bumps it), and
/// row-level consistency for mailbox counters under concurrent sessions.
#[allow(async_fn_in_trait)]
pub trait UserStore: Send + Sync {
    /// Idempotent: creates the user (with default mailboxes `INBOX Sent
    /// Drafts Trash Spam`) on first call, returns existing ids otherwise.
    async fn open_user(&self, username: &str, domain: &str) -> StoreResult<(i64, i64)>;

    async fn list_mailboxes(&self, user_id: i64) -> StoreResult<Vec<MailboxListing>>;

    async fn get_mailbox(&self, user_id: i64, path: &str) -> StoreResult<i64>;

    async fn create_mailbox(&self, user_id: i64, path: &str) -> StoreResult<()>;

    async fn delete_mailbox(&self, user_id: i64, path: &str) -> StoreResult<()>;

    async fn rename_mailbox(&self, user_id: i64, from: &str, to: &str) -> StoreResult<()>;

    async fn subscribe(&self, user_id: i64, path: &str) -> StoreResult<()>;

    async fn unsubscribe(&self, user_id: i64, path: &str) -> StoreResult<()>;

    async fn list_subscriptions(&self, user_id: i64) -> StoreResult<Vec<String>>;

    async fn mailbox_info(&self, mailbox_id: i64) -> StoreResult<MailboxInfo>;

    async fn message_count(&self, mailbox_id: i64) -> StoreResult<u32>;

    async fn unseen_count(&self, mailbox_id: i64) -> StoreResult<u32>;

    /// Highest UID currently present, used to resolve `*` in UID sets. 0 if empty.
    async fn max_uid(&self, mailbox_id: i64) -> StoreResult<u32>;

    async fn iterate_messages(
        &self,
        mailbox_id: i64,
        set: &IdSet,
    ) -> StoreResult<Vec<MessageView>>;

    /// Full RFC-822 octets for one message, addressed by (mailbox, uid).
    async fn reconstruct_raw(&self, mailbox_id: i64, uid: u32) -> StoreResult<Vec<u8>>;

    async fn set_flags(
        &self,
        mailbox_id: i64,
        uid: u32,
        mode: FlagMode,
        flags: &[String],
    ) -> StoreResult<Vec<String>>;

    /// Appends a message (used by both COPY and APPEND). Returns the new UID.
    async fn append_message(
        &self,
        mailbox_id: i64,
        raw: &[u8],
        flags: &[String],
        internal_date: DateTime<Utc>,
    ) -> StoreResult<u32>;

    /// Atomically copies all given messages (by UID) from `src` to `dst`,
    /// preserving flags and internal date and adding `\Recent`.
    async fn copy_messages(
        &self,
        src_mailbox: i64,
        uids: &[u32],
        dst_mailbox: i64,
    ) -> StoreResult<()>;

    /// Removes all `\Deleted` messages, returns removed sequence numbers in
    /// descending order.
    async fn expunge_deleted(&self, mailbox_id: i64) -> StoreResult<Vec<u32>>;

    async fn get_user_role_assignments(&self, user_id: i64) -> StoreResult<Vec<RoleAssignment>>;

    /// Resolves a role mailbox's address (e.g. `ceo@example.com`) to its
    /// mailbox id and owning domain.
    async fn get_role_mailbox_by_email(&self, email: &str) -> StoreResult<(i64, i64)>;

    async fn is_user_assigned_to_role(&self, user_id: i64, role_mailbox_id: i64) -> StoreResult<bool>;
}
