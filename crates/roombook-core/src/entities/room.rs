use serde::{Deserialize, Serialize};

/// Presentation languages for room names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Language {
    #[default]
    En,
    Ru,
}

impl Language {
    pub const ALL: [Language; 2] = [Language::En, Language::Ru];

    /// Map an `Accept-Language` header value onto a supported language.
    ///
    /// Anything unrecognized, including a missing header, falls back to English.
    pub fn from_accept_language(header: Option<&str>) -> Self {
        match header.map(str::trim) {
            Some("ru-RU") => Language::Ru,
            Some("en-EN") => Language::En,
            _ => Language::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoomType {
    MeetingRoom,
    Auditorium,
}

/// A bookable room. Rooms are looked up by their mailbox address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Room {
    pub id: String,
    pub capacity: u32,
    pub email: String,
    pub name_en: String,
    pub name_ru: String,
    pub room_type: RoomType,
}

impl Room {
    pub fn new(
        id: impl Into<String>,
        capacity: u32,
        email: impl Into<String>,
        name_en: impl Into<String>,
        name_ru: impl Into<String>,
        room_type: RoomType,
    ) -> Self {
        Self {
            id: id.into(),
            capacity,
            email: email.into(),
            name_en: name_en.into(),
            name_ru: name_ru.into(),
            room_type,
        }
    }

    pub fn get_name(&self, language: Language) -> &str {
        match language {
            Language::En => &self.name_en,
            Language::Ru => &self.name_ru,
        }
    }
}
