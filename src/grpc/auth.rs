use tonic::{metadata::MetadataMap, Status};
use uuid::Uuid;

use crate::auth::{extractors::authenticate, jwt::JwtKeys};

/// Verifies `authorization: Bearer <token>` metadata with the HTTP rules.
pub fn authorize(keys: &JwtKeys, metadata: &MetadataMap) -> Result<Uuid, Status> {
    let header = metadata
        .get("authorization")
        .and_then(|v| v.to_str().ok());
    Ok(authenticate(keys, header)?)
}
