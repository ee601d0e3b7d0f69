use serde::Deserialize;

/// Payload of the panel's session token. Issuer, audience and expiry are
/// checked by the verifier and not kept here.
#[derive(Debug, Deserialize, PartialEq, Clone)]
pub struct Claims {
    pub id: i64, // panel user id
    #[serde(default)]
    pub email: String,
}
