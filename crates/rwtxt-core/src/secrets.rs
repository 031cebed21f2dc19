//! Random identifiers and password hashing

use rand::distributions::Alphanumeric;
use rand::Rng;

/// Characters file ids are drawn from
const FILE_ID_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
const FILE_ID_LEN: usize = 10;
const ACCESS_KEY_LEN: usize = 64;

/// Generate a random file id
pub fn new_file_id() -> String {
    let mut rng = rand::thread_rng();
    (0..FILE_ID_LEN)
        .map(|_| FILE_ID_ALPHABET[rng.gen_range(0..FILE_ID_ALPHABET.len())] as char)
        .collect()
}

/// Whether `s` has the shape of a file id
pub fn is_file_id(s: &str) -> bool {
    s.len() == FILE_ID_LEN && s.bytes().all(|b| FILE_ID_ALPHABET.contains(&b))
}

/// Generate a random access key token
pub fn new_access_key() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(ACCESS_KEY_LEN)
        .map(char::from)
        .collect()
}

/// Hash a password with bcrypt at `cost`
pub fn hash_password(password: &str, cost: u32) -> Result<String, bcrypt::BcryptError> {
    bcrypt::hash(password, cost)
}

/// Check `password` against a stored hash
///
/// An empty stored hash only accepts the empty password. Malformed hashes
/// never match.
pub fn verify_password(password: &str, hashed: &str) -> bool {
    if hashed.is_empty() {
        return password.is_empty();
    }
    match bcrypt::verify(password, hashed) {
        Ok(matched) => matched,
        Err(e) => {
            tracing::warn!("stored password hash is unusable: {}", e);
            false
        }
    }
}
