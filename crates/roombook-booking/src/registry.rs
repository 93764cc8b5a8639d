//! Lookup index over the fixed room catalog.

use std::collections::HashMap;

use roombook_core::{Language, Room};

/// Rooms indexed by mailbox address and by every localized name.
///
/// Built once at startup and read-only afterwards. When two rooms share a
/// localized name, the one listed later owns that name.
#[derive(Debug, Clone, Default)]
pub struct RoomsRegistry {
    rooms: Vec<Room>,
    by_email: HashMap<String, usize>,
    by_name: HashMap<String, usize>,
}

impl RoomsRegistry {
    pub fn new(rooms: Vec<Room>) -> Self {
        let mut by_email = HashMap::with_capacity(rooms.len());
        let mut by_name = HashMap::with_capacity(rooms.len() * Language::ALL.len());
        for (index, room) in rooms.iter().enumerate() {
            by_email.insert(room.email.clone(), index);
            for language in Language::ALL {
                by_name.insert(room.get_name(language).to_string(), index);
            }
        }
        tracing::debug!("Room registry built with {} rooms", rooms.len());
        Self {
            rooms,
            by_email,
            by_name,
        }
    }

    pub fn get_by_email(&self, email: &str) -> Option<&Room> {
        self.by_email.get(email).map(|&i| &self.rooms[i])
    }

    pub fn get_by_name(&self, name: &str) -> Option<&Room> {
        self.by_name.get(name).map(|&i| &self.rooms[i])
    }

    /// Every room, in catalog order.
    pub fn get_all(&self) -> &[Room] {
        &self.rooms
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }
}
