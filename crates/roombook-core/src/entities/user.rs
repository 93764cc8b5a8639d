use std::hash::{Hash, Hasher};

use serde::Serialize;

/// A user of the booking service. Email is the natural key.
#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: u64,
    pub email: String,
}

impl User {
    pub fn new(id: u64, email: impl Into<String>) -> Self {
        Self {
            id,
            email: email.into(),
        }
    }

    /// A user known only by email, as recovered from a calendar item.
    pub fn from_email(email: impl Into<String>) -> Self {
        Self::new(0, email)
    }
}

impl PartialEq for User {
    fn eq(&self, other: &Self) -> bool {
        self.email == other.email
    }
}

impl Eq for User {}

impl Hash for User {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.email.hash(state);
    }
}

impl std::fmt::Display for User {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.id, self.email)
    }
}
