use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// JWT payload carried by bearer tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,   // user ID
    pub iat: usize,  // issued at (unix timestamp)
    pub exp: usize,  // expires at (unix timestamp)
    pub iss: String, // issuer
    pub aud: String, // audience
}

/// Payload of the `state` parameter sent through the OAuth redirect.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateClaims {
    pub nonce: String,
    pub iat: usize,
    pub exp: usize,
    pub iss: String,
    pub aud: String,
}
