//! Credential Store (spec §4.2): password hashing/verification and
//! User/Client CRUD.
//!
//! Plaintext passwords are carried end to end in a [`SecretString`] so an
//! accidental `Debug`/log of a request struct can never leak one (spec
//! §7/§9). Hashing uses SHA-256-crypt (`sha-crypt`): the cost parameter is
//! embedded in the verifier string itself, so `verify` never needs to know
//! which cost a legacy verifier used, and the scheme is upgradable without
//! re-issuing existing users (spec §4.2/§9a).

use rand::Rng;
use secrecy::{ExposeSecret, SecretString};
use sha_crypt::{Sha256Params, sha256_check, sha256_simple};
use uuid::Uuid;

use crate::config::SecurityConfig;
use crate::db::Storage;
use crate::error::{CredentialError, DatabaseError};

/// Cost category a password is hashed under (spec §4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashCategory {
    Standard,
    Admin,
}

/// A user account: unique email, opaque id. The password verifier never
/// leaves the Credential Store.
#[derive(Debug, Clone)]
pub struct User {
    pub id: i32,
    pub email: String,
}

/// A client device identity, scoped to one user.
#[derive(Debug, Clone)]
pub struct Client {
    pub id: i32,
    pub uuid: Uuid,
}

/// Hashes a plaintext password at the given cost category, jittering the
/// round count by up to 10% so verifier strings don't all share an
/// identical, fingerprintable cost (spec §4.2).
pub fn hash_password(
    plaintext: &SecretString,
    category: HashCategory,
    config: &SecurityConfig,
) -> Result<String, CredentialError> {
    let base_rounds = match category {
        HashCategory::Standard => config.standard_hash_rounds,
        HashCategory::Admin => config.admin_hash_rounds,
    };
    let jitter = base_rounds / 10;
    let rounds = if jitter == 0 {
        base_rounds
    } else {
        rand::thread_rng().gen_range((base_rounds - jitter)..=(base_rounds + jitter))
    };

    let params = Sha256Params::new(rounds as usize).map_err(|_| {
        CredentialError::Database(DatabaseError::Other(
            "invalid hash rounds parameter".to_string(),
        ))
    })?;

    sha256_simple(plaintext.expose_secret(), &params).map_err(|_| {
        CredentialError::Database(DatabaseError::Other("password hashing failed".to_string()))
    })
}

/// Verifies a plaintext password against a stored verifier. Accepts
/// verifiers produced by any previously configured cost, since the cost is
/// self-describing in the `$5$rounds=N$...` string.
pub fn verify_password(plaintext: &SecretString, verifier: &str) -> bool {
    sha256_check(plaintext.expose_secret(), verifier).is_ok()
}

/// Syntax validation: requires a non-empty local part and a domain with at
/// least one dot, matching the original reference implementation's
/// permissive "looks like an email" check rather than RFC 5322 in full.
pub fn validate_email(email: &str) -> Result<(), CredentialError> {
    let Some((local, domain)) = email.split_once('@') else {
        return Err(CredentialError::InvalidEmail);
    };
    if local.is_empty() || domain.is_empty() || !domain.contains('.') || email.contains(' ') {
        return Err(CredentialError::InvalidEmail);
    }
    Ok(())
}

/// Minimum-length validation (spec §4.2/§6a, default 14).
pub fn validate_password_len(
    plaintext: &SecretString,
    config: &SecurityConfig,
) -> Result<(), CredentialError> {
    if plaintext.expose_secret().len() < config.user_password_min_len {
        return Err(CredentialError::PasswordTooShort);
    }
    Ok(())
}

/// Inserts a User and its initial Client atomically (spec §4.2/§4.5
/// accountOpen). Fails with `EmailNotUnique` or `ClientUuidNotUnique` from
/// the storage layer's `DuplicateKey` classification.
pub async fn create_user(
    storage: &Storage,
    email: &str,
    plaintext: &SecretString,
    client_uuid: Uuid,
    config: &SecurityConfig,
) -> Result<(User, Client), CredentialError> {
    validate_email(email)?;
    validate_password_len(plaintext, config)?;
    let verifier = hash_password(plaintext, HashCategory::Standard, config)?;

    let mut conn = storage.client().await.map_err(CredentialError::Database)?;
    let txn = conn.transaction().await.map_err(DatabaseError::classify)?;

    let user_row = txn
        .query_one(
            "INSERT INTO users (email, password) VALUES ($1, $2) RETURNING id",
            &[&email, &verifier],
        )
        .await
        .map_err(classify_insert_error)?;
    let user_id: i32 = user_row.get(0);

    let client_row = txn
        .query_one(
            "INSERT INTO clients (user_id, uuid) VALUES ($1, $2) RETURNING id",
            &[&user_id, &client_uuid],
        )
        .await
        .map_err(classify_insert_error)?;
    let client_id: i32 = client_row.get(0);

    txn.commit().await.map_err(DatabaseError::classify)?;

    Ok((
        User {
            id: user_id,
            email: email.to_string(),
        },
        Client {
            id: client_id,
            uuid: client_uuid,
        },
    ))
}

/// Loads the user and all its clients in one join, verifies the password,
/// and returns the full bundle. Indistinguishable failure for "email
/// unknown" and "password wrong" (spec §4.2/§7).
pub async fn authenticate(
    storage: &Storage,
    email: &str,
    plaintext: &SecretString,
    config: &SecurityConfig,
) -> Result<(User, Vec<Client>), CredentialError> {
    let conn = storage.client().await.map_err(CredentialError::Database)?;

    let rows = conn
        .query(
            "SELECT users.id, users.email, users.password, clients.id, clients.uuid \
             FROM users LEFT JOIN clients ON clients.user_id = users.id \
             WHERE users.email = $1",
            &[&email],
        )
        .await
        .map_err(|e| CredentialError::Database(DatabaseError::classify(e)))?;

    let Some(first) = rows.first() else {
        // Burn comparable hashing work to a real verification so response
        // timing doesn't reveal whether the email exists.
        let _ = hash_password(plaintext, HashCategory::Standard, config);
        return Err(CredentialError::AuthFail);
    };

    let verifier: String = first.get(2);
    if !verify_password(plaintext, &verifier) {
        return Err(CredentialError::AuthFail);
    }

    let user = User {
        id: first.get(0),
        email: first.get(1),
    };
    let clients = rows
        .iter()
        .filter_map(|row| {
            let id: Option<i32> = row.get(3);
            let uuid: Option<Uuid> = row.get(4);
            match (id, uuid) {
                (Some(id), Some(uuid)) => Some(Client { id, uuid }),
                _ => None,
            }
        })
        .collect();

    Ok((user, clients))
}

/// Conditional update keyed on the current email (spec §4.2/§4.5
/// accountModify). Caller authenticates under current credentials first.
pub async fn modify_user(
    storage: &Storage,
    current_email: &str,
    new_email: &str,
    new_plaintext: &SecretString,
    config: &SecurityConfig,
) -> Result<(), CredentialError> {
    validate_email(new_email)?;
    validate_password_len(new_plaintext, config)?;
    let verifier = hash_password(new_plaintext, HashCategory::Standard, config)?;

    let conn = storage.client().await.map_err(CredentialError::Database)?;
    let affected = conn
        .execute(
            "UPDATE users SET email = $1, password = $2 WHERE email = $3",
            &[&new_email, &verifier, &current_email],
        )
        .await
        .map_err(classify_insert_error)?;

    if affected == 0 {
        return Err(CredentialError::AuthFail);
    }
    Ok(())
}

/// Deletes a User. Cascading client deletion is a schema concern (foreign
/// key `ON DELETE CASCADE`), not application logic (spec §4.5).
pub async fn delete_user(storage: &Storage, email: &str) -> Result<(), CredentialError> {
    let conn = storage.client().await.map_err(CredentialError::Database)?;
    let affected = conn
        .execute("DELETE FROM users WHERE email = $1", &[&email])
        .await
        .map_err(|e| CredentialError::Database(DatabaseError::classify(e)))?;

    if affected == 0 {
        return Err(CredentialError::AuthFail);
    }
    Ok(())
}

/// Resolves a client by UUID under an authenticated user, inserting a new
/// `Client` row if this is the first time the server has seen it (spec
/// §4.5 syncDown/syncUp: "resolve the client, inserting a new Client row
/// for this user if not present"). A UUID already owned by a *different*
/// user is rejected as `AuthFail` rather than silently reassigned, since
/// `clientUUID` is globally unique and a Client's User reference is
/// immutable (spec §3).
pub async fn resolve_client(
    storage: &Storage,
    user_id: i32,
    client_uuid: Uuid,
) -> Result<Client, CredentialError> {
    let conn = storage.client().await.map_err(CredentialError::Database)?;

    let existing = conn
        .query_opt(
            "SELECT id, user_id FROM clients WHERE uuid = $1",
            &[&client_uuid],
        )
        .await
        .map_err(|e| CredentialError::Database(DatabaseError::classify(e)))?;

    if let Some(row) = existing {
        let owner_id: i32 = row.get(1);
        if owner_id != user_id {
            return Err(CredentialError::AuthFail);
        }
        return Ok(Client {
            id: row.get(0),
            uuid: client_uuid,
        });
    }

    let row = conn
        .query_one(
            "INSERT INTO clients (user_id, uuid) VALUES ($1, $2) RETURNING id",
            &[&user_id, &client_uuid],
        )
        .await
        .map_err(classify_insert_error)?;

    Ok(Client {
        id: row.get(0),
        uuid: client_uuid,
    })
}

fn classify_insert_error(err: tokio_postgres::Error) -> CredentialError {
    match DatabaseError::classify(err) {
        DatabaseError::DuplicateKey { column } if column == "email" => {
            CredentialError::EmailNotUnique
        }
        DatabaseError::DuplicateKey { column } if column == "uuid" => {
            CredentialError::ClientUuidNotUnique
        }
        other => CredentialError::Database(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> SecurityConfig {
        SecurityConfig {
            user_password_min_len: 14,
            standard_hash_rounds: 1_000,
            admin_hash_rounds: 2_000,
            production: true,
        }
    }

    #[test]
    fn hash_and_verify_round_trip() {
        let plaintext = SecretString::from("correct-horse-battery-staple".to_string());
        let verifier = hash_password(&plaintext, HashCategory::Standard, &config()).unwrap();
        assert!(verify_password(&plaintext, &verifier));

        let wrong = SecretString::from("wrong-password-entirely".to_string());
        assert!(!verify_password(&wrong, &verifier));
    }

    #[test]
    fn validate_email_rejects_missing_at_or_dot() {
        assert!(validate_email("user@example.com").is_ok());
        assert!(validate_email("userexample.com").is_err());
        assert!(validate_email("user@examplecom").is_err());
        assert!(validate_email("user @example.com").is_err());
    }

    #[test]
    fn validate_password_len_boundary() {
        let cfg = config();
        let exact = SecretString::from("a".repeat(14));
        let short = SecretString::from("a".repeat(13));
        assert!(validate_password_len(&exact, &cfg).is_ok());
        assert!(validate_password_len(&short, &cfg).is_err());
    }
}
