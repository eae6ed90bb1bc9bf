use std::fmt::Write;

use anyhow::Result;
use rand::Rng;
use sha2::{Digest, Sha256};
use tracing::info;

use crate::error::RecipeError;
use crate::models::{NewUser, Role, SeedAccount, User};

const HASH_SCHEME: &str = "sha256";

pub trait UserStore {
    fn find_by_username(&self, username: &str) -> Result<Option<User>>;
    fn insert(&self, user: &NewUser) -> Result<User>;
}

/// Salted one-way hash, stored as `sha256$<salt-hex>$<digest-hex>`.
pub fn hash_password(password: &str) -> String {
    let salt: [u8; 16] = rand::rng().random();
    let digest = salted_digest(&salt, password);
    format!("{HASH_SCHEME}${}${}", to_hex(&salt), to_hex(&digest))
}

pub fn verify_password(password: &str, stored: &str) -> bool {
    let mut parts = stored.split('$');
    let (Some(scheme), Some(salt_hex), Some(digest_hex), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return false;
    };
    if scheme != HASH_SCHEME {
        return false;
    }
    let Some(salt) = from_hex(salt_hex) else {
        return false;
    };
    let expected = to_hex(&salted_digest(&salt, password));
    // Compare every byte regardless of where the first mismatch is
    expected.len() == digest_hex.len()
        && expected
            .bytes()
            .zip(digest_hex.bytes())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
}

fn salted_digest(salt: &[u8], password: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(salt);
    hasher.update(password.as_bytes());
    hasher.finalize().to_vec()
}

fn to_hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .fold(String::with_capacity(bytes.len() * 2), |mut acc, b| {
            let _ = write!(acc, "{b:02x}");
            acc
        })
}

fn from_hex(hex: &str) -> Option<Vec<u8>> {
    if hex.len() % 2 != 0 {
        return None;
    }
    (0..hex.len())
        .step_by(2)
        .map(|i| hex.get(i..i + 2).and_then(|b| u8::from_str_radix(b, 16).ok()))
        .collect()
}

/// Create each account whose username does not exist yet.
///
/// Returns the usernames that were created; running it again creates nothing.
pub fn seed_accounts<S: UserStore + ?Sized>(
    store: &S,
    accounts: &[SeedAccount],
) -> Result<Vec<String>> {
    let mut created = Vec::new();
    for account in accounts {
        if store.find_by_username(&account.username)?.is_some() {
            continue;
        }
        store.insert(&NewUser {
            username: account.username.clone(),
            password_hash: hash_password(&account.password),
            role: account.role,
        })?;
        info!(username = %account.username, role = account.role.as_str(), "seeded account");
        created.push(account.username.clone());
    }
    Ok(created)
}

/// Self-registration. The role is always `ROLE_USER`.
pub fn register<S: UserStore + ?Sized>(
    store: &S,
    username: &str,
    password: &str,
) -> Result<User, RecipeError> {
    let username = username.trim();
    if username.is_empty() {
        return Err(RecipeError::Validation("Username is required".to_string()));
    }
    if password.is_empty() {
        return Err(RecipeError::Validation("Password is required".to_string()));
    }
    if store.find_by_username(username)?.is_some() {
        return Err(RecipeError::Validation(format!(
            "Username '{username}' is already taken"
        )));
    }

    let user = store.insert(&NewUser {
        username: username.to_string(),
        password_hash: hash_password(password),
        role: Role::User,
    })?;
    info!(username = %user.username, "registered user");
    Ok(user)
}

/// Check credentials. Does not start a session.
pub fn verify_login<S: UserStore + ?Sized>(
    store: &S,
    username: &str,
    password: &str,
) -> Result<Option<User>> {
    let user = store.find_by_username(username.trim())?;
    Ok(user.filter(|u| verify_password(password, &u.password_hash)))
}
