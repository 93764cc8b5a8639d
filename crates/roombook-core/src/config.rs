use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use url::Url;

use crate::entities::{Language, Room, RoomType};

/// Environment variable consulted when `ews.password` is not set.
pub const PASSWORD_ENV: &str = "ROOMBOOK_EWS_PASSWORD";
/// Environment variable consulted when `ews.access_token` is not set.
pub const ACCESS_TOKEN_ENV: &str = "ROOMBOOK_EWS_TOKEN";

/// Configuration validation errors
#[derive(Debug, Clone)]
pub struct ConfigValidationError {
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Result of config validation
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub errors: Vec<ConfigValidationError>,
    pub warnings: Vec<ConfigValidationError>,
}

impl ValidationResult {
    /// Returns true if there are no errors (warnings are OK)
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    pub fn add_warning(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    pub fn error_summary(&self) -> String {
        self.errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Exchange Web Services connection
    pub ews: EwsConfig,

    /// Adapter behaviour
    #[serde(default)]
    pub booking: BookingConfig,

    /// Fixed catalog of bookable rooms
    #[serde(default)]
    pub rooms: Vec<RoomConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EwsConfig {
    /// EWS endpoint, e.g. https://outlook.office365.com/EWS/Exchange.asmx
    pub server_url: String,

    /// Mailbox of the booking service itself
    pub primary_smtp_address: String,

    pub username: String,

    /// Basic auth password (falls back to ROOMBOOK_EWS_PASSWORD)
    #[serde(default)]
    pub password: Option<String>,

    /// OAuth bearer token (falls back to ROOMBOOK_EWS_TOKEN)
    #[serde(default)]
    pub access_token: Option<String>,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    3
}

impl EwsConfig {
    pub fn password(&self) -> Option<String> {
        self.password
            .clone()
            .or_else(|| std::env::var(PASSWORD_ENV).ok())
    }

    pub fn access_token(&self) -> Option<String> {
        self.access_token
            .clone()
            .or_else(|| std::env::var(ACCESS_TOKEN_ENV).ok())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingConfig {
    /// Threads executing blocking backend calls
    #[serde(default = "default_worker_pool_size")]
    pub worker_pool_size: usize,

    /// Organizer mailbox used by the decommissioned booking system
    #[serde(default)]
    pub legacy_booking_system_email: Option<String>,

    /// Title given to calendar items without a subject
    #[serde(default = "default_title")]
    pub default_title: String,

    #[serde(default)]
    pub mailbox_convention: MailboxConvention,
}

fn default_worker_pool_size() -> usize {
    5
}

fn default_title() -> String {
    "Untitled".to_string()
}

impl Default for BookingConfig {
    fn default() -> Self {
        Self {
            worker_pool_size: default_worker_pool_size(),
            legacy_booking_system_email: None,
            default_title: default_title(),
            mailbox_convention: MailboxConvention::default(),
        }
    }
}

/// How room mailboxes are named, e.g. `iu.resource.lectureroom313@domain`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailboxConvention {
    pub prefix: String,
    pub domain: String,
}

impl Default for MailboxConvention {
    fn default() -> Self {
        Self {
            prefix: "iu.resource.".to_string(),
            domain: "0f4tw.onmicrosoft.com".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomConfig {
    pub id: String,
    pub capacity: u32,
    pub email: String,
    pub name_en: String,
    pub name_ru: String,
    pub room_type: RoomType,
}

impl From<&RoomConfig> for Room {
    fn from(value: &RoomConfig) -> Self {
        Room::new(
            value.id.clone(),
            value.capacity,
            value.email.clone(),
            value.name_en.clone(),
            value.name_ru.clone(),
            value.room_type,
        )
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ews: EwsConfig {
                server_url: "https://outlook.office365.com/EWS/Exchange.asmx".to_string(),
                primary_smtp_address: "booking@example.com".to_string(),
                username: "booking@example.com".to_string(),
                password: None,
                access_token: None,
                timeout_secs: default_timeout_secs(),
                max_retries: default_max_retries(),
            },
            booking: BookingConfig::default(),
            rooms: Vec::new(),
        }
    }
}

impl Config {
    /// Load configuration from file, creating default if it doesn't exist
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if !config_path.exists() {
            let config = Self::default();
            config.save_to(&config_path)?;
            return Ok(config);
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from an explicit path
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        toml::from_str(&contents).context("Failed to parse config file")
    }

    /// Load configuration and validate it
    ///
    /// Returns the config along with any validation warnings.
    /// Returns an error if validation fails with critical errors.
    pub fn load_validated() -> Result<(Self, ValidationResult)> {
        let config = Self::load()?;
        let validation = config.validate();

        if !validation.is_valid() {
            anyhow::bail!(
                "Configuration validation failed: {}",
                validation.error_summary()
            );
        }

        for warning in &validation.warnings {
            tracing::warn!("Config warning: {}", warning);
        }

        Ok((config, validation))
    }

    /// Rooms of the catalog, in configuration order.
    pub fn rooms(&self) -> Vec<Room> {
        self.rooms.iter().map(Room::from).collect()
    }

    /// Validate the configuration
    pub fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();

        self.validate_url(&self.ews.server_url, "ews.server_url", &mut result);

        if self.ews.primary_smtp_address.is_empty() {
            result.add_error("ews.primary_smtp_address", "Service mailbox is required");
        } else if !looks_like_email(&self.ews.primary_smtp_address) {
            result.add_error(
                "ews.primary_smtp_address",
                format!("Not an email address: {}", self.ews.primary_smtp_address),
            );
        }

        if self.ews.password().is_none() && self.ews.access_token().is_none() {
            result.add_warning(
                "ews",
                format!(
                    "No credentials configured (set ews.password, {} or {})",
                    PASSWORD_ENV, ACCESS_TOKEN_ENV
                ),
            );
        }

        if self.ews.timeout_secs == 0 {
            result.add_error("ews.timeout_secs", "Timeout must be greater than 0");
        }

        if self.booking.worker_pool_size == 0 {
            result.add_error(
                "booking.worker_pool_size",
                "Worker pool needs at least one thread",
            );
        } else if self.booking.worker_pool_size > 64 {
            result.add_warning(
                "booking.worker_pool_size",
                "Worker pool is unusually large (>64); mind backend throttling",
            );
        }

        if let Some(legacy) = &self.booking.legacy_booking_system_email {
            if !looks_like_email(legacy) {
                result.add_error(
                    "booking.legacy_booking_system_email",
                    format!("Not an email address: {}", legacy),
                );
            }
        }

        self.validate_rooms(&mut result);

        result
    }

    fn validate_rooms(&self, result: &mut ValidationResult) {
        if self.rooms.is_empty() {
            result.add_warning("rooms", "Room catalog is empty - nothing can be booked");
            return;
        }

        let mut emails = HashSet::new();
        let mut names = HashSet::new();

        for (index, room) in self.rooms.iter().enumerate() {
            let field = format!("rooms[{}]", index);

            if !looks_like_email(&room.email) {
                result.add_error(&field, format!("Not an email address: {}", room.email));
            }

            if !emails.insert(room.email.as_str()) {
                result.add_error(&field, format!("Duplicate room email: {}", room.email));
            }

            if room.capacity == 0 {
                result.add_warning(&field, "Room capacity is 0");
            }

            let room = Room::from(room);
            let own_names: HashSet<&str> =
                Language::ALL.iter().map(|language| room.get_name(*language)).collect();
            for name in own_names {
                if !names.insert(name.to_string()) {
                    result.add_warning(
                        &field,
                        format!("Room name '{}' is used by another room; the later one wins", name),
                    );
                }
            }
        }
    }

    fn validate_url(&self, url_str: &str, field_name: &str, result: &mut ValidationResult) {
        match Url::parse(url_str) {
            Ok(url) => {
                if url.scheme() != "http" && url.scheme() != "https" {
                    result.add_error(
                        field_name,
                        format!("URL must use http or https scheme, got: {}", url.scheme()),
                    );
                }

                if url.host().is_none() {
                    result.add_error(field_name, "URL must have a host");
                }
            }
            Err(e) => {
                result.add_error(field_name, format!("Invalid URL: {}", e));
            }
        }
    }

    /// Save configuration to the default location
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    /// Save configuration to an explicit path, creating parent directories
    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(config_path, contents).context("Failed to write config file")?;

        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get config directory")?
            .join("roombook");

        Ok(config_dir.join("config.toml"))
    }
}

fn looks_like_email(value: &str) -> bool {
    match value.split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.'),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;

    fn room(email: &str, name_en: &str, name_ru: &str) -> RoomConfig {
        RoomConfig {
            id: "313".to_string(),
            capacity: 5,
            email: email.to_string(),
            name_en: name_en.to_string(),
            name_ru: name_ru.to_string(),
            room_type: RoomType::MeetingRoom,
        }
    }

    #[test]
    fn test_valid_default_config() {
        let config = Config::default();
        let result = config.validate();
        assert!(result.is_valid(), "Default config should be valid: {:?}", result.errors);
        assert!(result.warnings.iter().any(|w| w.field == "rooms"));
    }

    #[test]
    fn test_invalid_url_scheme() {
        let mut config = Config::default();
        config.ews.server_url = "ftp://exchange.example.com".to_string();
        let result = config.validate();
        assert!(!result.is_valid());
        assert!(result.errors.iter().any(|e| e.message.contains("http or https")));
    }

    #[test]
    fn test_zero_pool_size_is_error() {
        let mut config = Config::default();
        config.booking.worker_pool_size = 0;
        let result = config.validate();
        assert!(result.errors.iter().any(|e| e.field == "booking.worker_pool_size"));
    }

    #[test]
    fn test_duplicate_room_email_is_error() {
        let mut config = Config::default();
        config.rooms = vec![
            room("a@rooms.example.com", "A", "А"),
            room("a@rooms.example.com", "B", "Б"),
        ];
        let result = config.validate();
        assert!(!result.is_valid());
        assert!(result.errors.iter().any(|e| e.message.contains("Duplicate room email")));
    }

    #[test]
    fn test_shared_room_name_is_warning() {
        let mut config = Config::default();
        config.rooms = vec![
            room("a@rooms.example.com", "Meeting room", "Переговорка"),
            room("b@rooms.example.com", "Meeting room", "Переговорка 2"),
        ];
        let result = config.validate();
        assert!(result.is_valid());
        assert!(result.warnings.iter().any(|w| w.message.contains("Meeting room")));
    }

    #[test]
    fn test_parse_toml_with_rooms() {
        let toml = r#"
            [ews]
            server_url = "https://exchange.example.com/EWS/Exchange.asmx"
            primary_smtp_address = "booking@example.com"
            username = "booking@example.com"
            password = "secret"

            [booking]
            worker_pool_size = 2
            legacy_booking_system_email = "old-booking@example.com"

            [[rooms]]
            id = "313"
            capacity = 5
            email = "iu.resource.lectureroom313@example.com"
            name_en = "University Room #313"
            name_ru = "Комната #313"
            room_type = "MEETING_ROOM"
        "#;

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.booking.worker_pool_size, 2);
        assert_eq!(config.booking.default_title, "Untitled");
        assert_eq!(config.ews.timeout_secs, 30);
        assert_eq!(config.rooms().len(), 1);
        assert_eq!(config.rooms()[0].get_name(Language::Ru), "Комната #313");
        assert!(config.validate().is_valid());
    }

    #[test]
    fn test_validation_result_error_summary() {
        let mut result = ValidationResult::default();
        result.add_error("field1", "error1");
        result.add_error("field2", "error2");
        let summary = result.error_summary();
        assert!(summary.contains("field1"));
        assert!(summary.contains("field2"));
    }

    #[test]
    fn test_save_and_reload_round_trip() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.booking.legacy_booking_system_email = Some("legacy@example.com".to_string());
        config.rooms.push(room("r1@example.com", "Oslo", "Осло"));
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(
            loaded.booking.legacy_booking_system_email.as_deref(),
            Some("legacy@example.com")
        );
        assert_eq!(loaded.rooms().len(), 1);
        assert_eq!(loaded.rooms()[0].name_ru, "Осло");
    }
}
