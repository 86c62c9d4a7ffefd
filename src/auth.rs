use crate::backend::ClubBackend;
use crate::error::ClubError;
use crate::types::Member;
use sha2::{Digest, Sha256};
use tracing::warn;
use uuid::Uuid;

const STRETCH_ROUNDS: u32 = 10_000;

/// Hashes a password as `salt$hex(digest)` with a fresh random salt.
pub fn hash_password(password: &str) -> String {
    let salt = Uuid::new_v4().simple().to_string();
    let digest = stretch(&salt, password);
    format!("{salt}${}", hex::encode(digest))
}

pub fn verify_password(password: &str, stored: &str) -> bool {
    let Some((salt, expected_hex)) = stored.split_once('$') else {
        return false;
    };
    let Ok(expected) = hex::decode(expected_hex) else {
        return false;
    };
    let actual = stretch(salt, password);
    constant_time_eq(&actual, &expected)
}

fn stretch(salt: &str, password: &str) -> Vec<u8> {
    let mut digest = Sha256::new()
        .chain_update(salt.as_bytes())
        .chain_update(password.as_bytes())
        .finalize();
    for _ in 1..STRETCH_ROUNDS {
        digest = Sha256::new()
            .chain_update(digest)
            .chain_update(salt.as_bytes())
            .finalize();
    }
    digest.to_vec()
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Looks up the member by email and checks the password. Unknown emails and
/// wrong passwords produce the same error.
pub fn authenticate<T: ClubBackend>(
    backend: &T,
    email: &str,
    password: &str,
) -> Result<Member, ClubError> {
    match backend.member_by_email(email)? {
        Some(member) if verify_password(password, &member.password_hash) => Ok(member),
        _ => {
            warn!(email, "Failed login attempt");
            Err(ClubError::InvalidCredentials)
        }
    }
}
