use argon2::Argon2;
use password_hash::rand_core::OsRng;
use password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use rand::Rng;
use sha2::{Digest, Sha256};

pub const ACCESS_TOKEN_PREFIX: &str = "edu_at_";
pub const REFRESH_TOKEN_PREFIX: &str = "edu_rt_";
pub const RESET_TOKEN_PREFIX: &str = "edu_rst_";

/// Minimum accepted password length for registration and resets.
pub const MIN_PASSWORD_LEN: usize = 8;

/// Generate an access token. Returns `(full_token, sha256_hash)`.
/// Format: `edu_at_` + 32 random bytes hex-encoded.
pub fn generate_access_token() -> (String, String) {
    generate_prefixed(ACCESS_TOKEN_PREFIX)
}

/// Generate a refresh token. Returns `(full_token, sha256_hash)`.
pub fn generate_refresh_token() -> (String, String) {
    generate_prefixed(REFRESH_TOKEN_PREFIX)
}

/// Generate a password reset token. Returns `(full_token, sha256_hash)`.
pub fn generate_password_reset_token() -> (String, String) {
    generate_prefixed(RESET_TOKEN_PREFIX)
}

/// SHA-256 hex digest of a token string.
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

/// Hash a password with Argon2id and a random salt.
pub fn hash_password(password: &str) -> Result<String, String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| format!("Failed to hash password: {e}"))
}

/// Verify a password against an Argon2id hash.
pub fn verify_password(password: &str, hash: &str) -> Result<bool, String> {
    let parsed = PasswordHash::new(hash).map_err(|e| format!("Invalid password hash: {e}"))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

/// Normalize an email for storage and lookup.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Loose shape check; the mailbox itself is verified by the reset flow.
pub fn is_plausible_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty() && domain.contains('.') && !domain.starts_with('.') && !domain.ends_with('.')
}

fn generate_prefixed(prefix: &str) -> (String, String) {
    let full = format!("{prefix}{}", random_hex(32));
    let hash = hash_token(&full);
    (full, hash)
}

/// Generate `n` random bytes and return as hex string.
fn random_hex(n: usize) -> String {
    let bytes: Vec<u8> = (0..n).map(|_| rand::thread_rng().r#gen::<u8>()).collect();
    hex::encode(&bytes)
}
