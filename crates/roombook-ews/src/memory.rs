//! In-process calendar server used by tests and local runs.
//!
//! Mirrors the EWS behaviour the booking adapter relies on: the saving
//! mailbox becomes the organizer, every invited mailbox known to the server
//! receives its own copy under a different id, and deleting the organizer's
//! item cancels those copies.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use uuid::Uuid;

use crate::account::{AccountFactory, CalendarAccount};
use crate::error::EwsError;
use crate::types::{CalendarItem, Mailbox, SendMeetingInvitations};

#[derive(Default)]
struct ServerState {
    calendars: HashMap<String, Vec<CalendarItem>>,
    /// Organizer item id -> (mailbox, copy id) for every invitation sent.
    copies: HashMap<String, Vec<(String, String)>>,
    withhold_ids: bool,
}

impl ServerState {
    fn calendar(&self, mailbox: &str) -> Result<&Vec<CalendarItem>, EwsError> {
        self.calendars
            .get(mailbox)
            .ok_or_else(|| non_existent_mailbox(mailbox))
    }

    fn calendar_mut(&mut self, mailbox: &str) -> Result<&mut Vec<CalendarItem>, EwsError> {
        self.calendars
            .get_mut(mailbox)
            .ok_or_else(|| non_existent_mailbox(mailbox))
    }
}

fn non_existent_mailbox(mailbox: &str) -> EwsError {
    EwsError::ResponseError {
        code: "ErrorNonExistentMailbox".to_string(),
        message: format!("No mailbox with SMTP address {}", mailbox),
    }
}

fn key(email: &str) -> String {
    email.trim().to_lowercase()
}

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// Shared handle to an in-memory set of mailboxes. Clones see the same data.
#[derive(Clone, Default)]
pub struct MemoryCalendarServer {
    state: Arc<Mutex<ServerState>>,
}

impl MemoryCalendarServer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty calendar for `email` if it does not exist yet.
    pub fn add_mailbox(&self, email: &str) {
        self.state.lock().calendars.entry(key(email)).or_default();
    }

    pub fn has_mailbox(&self, email: &str) -> bool {
        self.state.lock().calendars.contains_key(&key(email))
    }

    /// Store `item` as-is in `mailbox`, bypassing invitation logic.
    /// Returns the id, generating one when the item has none.
    pub fn insert_raw(&self, mailbox: &str, mut item: CalendarItem) -> String {
        let id = item.id.clone().unwrap_or_else(new_id);
        item.id = Some(id.clone());
        self.state
            .lock()
            .calendars
            .entry(key(mailbox))
            .or_default()
            .push(item);
        id
    }

    /// Snapshot of everything stored in `mailbox`.
    pub fn items(&self, mailbox: &str) -> Vec<CalendarItem> {
        self.state
            .lock()
            .calendars
            .get(&key(mailbox))
            .cloned()
            .unwrap_or_default()
    }

    /// When set, saves succeed but the returned item carries no id.
    pub fn set_withhold_ids(&self, withhold: bool) {
        self.state.lock().withhold_ids = withhold;
    }

    pub fn account(&self, email: &str) -> MemoryAccount {
        MemoryAccount {
            server: self.clone(),
            primary_smtp_address: email.to_string(),
        }
    }
}

impl AccountFactory for MemoryCalendarServer {
    fn impersonate(&self, email: &str) -> Result<Arc<dyn CalendarAccount>, EwsError> {
        Ok(Arc::new(self.account(email)))
    }
}

pub struct MemoryAccount {
    server: MemoryCalendarServer,
    primary_smtp_address: String,
}

impl MemoryAccount {
    fn mailbox(&self) -> String {
        key(&self.primary_smtp_address)
    }
}

impl CalendarAccount for MemoryAccount {
    fn primary_smtp_address(&self) -> &str {
        &self.primary_smtp_address
    }

    fn view(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<CalendarItem>, EwsError> {
        let state = self.server.state.lock();
        Ok(state
            .calendar(&self.mailbox())?
            .iter()
            .filter(|item| item.overlaps(start, end))
            .cloned()
            .collect())
    }

    fn get(&self, id: &str) -> Result<CalendarItem, EwsError> {
        let state = self.server.state.lock();
        state
            .calendar(&self.mailbox())?
            .iter()
            .find(|item| item.id.as_deref() == Some(id))
            .cloned()
            .ok_or_else(|| EwsError::ItemNotFound(id.to_string()))
    }

    fn save(
        &self,
        item: &CalendarItem,
        send: SendMeetingInvitations,
    ) -> Result<CalendarItem, EwsError> {
        let mailbox = self.mailbox();
        let mut state = self.server.state.lock();
        state.calendar(&mailbox)?;

        let mut stored = item.clone();
        let id = new_id();
        stored.id = Some(id.clone());
        stored.change_key = Some(new_id());
        stored.organizer = Some(Mailbox::new(self.primary_smtp_address.clone()));

        let mut sent = Vec::new();
        if send != SendMeetingInvitations::SendToNone {
            let invitees: Vec<String> = stored.invitees().map(|a| key(a.email())).collect();
            for invitee in invitees {
                if invitee == mailbox || sent.iter().any(|(m, _)| *m == invitee) {
                    continue;
                }
                if let Some(calendar) = state.calendars.get_mut(&invitee) {
                    let mut copy = stored.clone();
                    let copy_id = new_id();
                    copy.id = Some(copy_id.clone());
                    copy.change_key = Some(new_id());
                    calendar.push(copy);
                    sent.push((invitee, copy_id));
                }
            }
        }
        tracing::debug!("Stored item {} with {} invitation copies", id, sent.len());

        state.copies.insert(id, sent);
        state.calendar_mut(&mailbox)?.push(stored.clone());

        if state.withhold_ids {
            stored.id = None;
            stored.change_key = None;
        }
        Ok(stored)
    }

    fn delete(&self, item: &CalendarItem) -> Result<(), EwsError> {
        let id = item.id.as_deref().ok_or(EwsError::MissingItemId)?;
        let mut state = self.server.state.lock();

        let calendar = state.calendar_mut(&self.mailbox())?;
        let position = calendar
            .iter()
            .position(|i| i.id.as_deref() == Some(id))
            .ok_or_else(|| EwsError::ItemNotFound(id.to_string()))?;
        calendar.remove(position);

        for (mailbox, copy_id) in state.copies.remove(id).unwrap_or_default() {
            if let Some(calendar) = state.calendars.get_mut(&mailbox) {
                calendar.retain(|i| i.id.as_deref() != Some(copy_id.as_str()));
            }
        }
        Ok(())
    }
}
