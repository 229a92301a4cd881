use serde::Serialize;

/// The caller as seen by authorization checks. Never includes the credential hash.
#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub id: i64,
    pub username: String,
    pub authorities: Vec<String>,
}
