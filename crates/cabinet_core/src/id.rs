//! Record id generation.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use rand::rngs::OsRng;
use rand::RngCore;

/// Generates a URL-safe, locally-unique random record id.
///
/// 20 bytes of cryptographic randomness, base64url-encoded without
/// padding (27 characters). No uniqueness check is performed against
/// existing records; the collision probability is accepted as negligible,
/// not eliminated.
#[must_use]
pub fn generate_id() -> String {
    let mut bytes = [0u8; 20];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}
