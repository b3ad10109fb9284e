use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// User record in the database.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String, // always lowercase
    #[serde(skip_serializing)]
    pub password_hash: Option<String>, // argon2 PHC string, or the provider sentinel
    pub federated_id: Option<String>, // provider subject id
    pub created_at: OffsetDateTime,
}

/// How a record proves its identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode<'a> {
    Local { password_hash: &'a str },
    Federated { subject_id: &'a str },
    /// No usable credential at all; never authenticates through a password.
    Unusable,
}

impl User {
    /// A provider subject id wins over any stored hash.
    pub fn auth_mode(&self) -> AuthMode<'_> {
        match (&self.federated_id, &self.password_hash) {
            (Some(subject_id), _) => AuthMode::Federated { subject_id },
            (None, Some(password_hash)) => AuthMode::Local { password_hash },
            (None, None) => AuthMode::Unusable,
        }
    }
}

/// Values for a record about to be inserted.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: Option<String>,
    pub federated_id: Option<String>,
}
