//! Bearer-token identity and queue-callback signing
//!
//! # Architecture
//!
//! - Identity tokens: `<subject_id>:<email>:<hash>`
//!   where `hash = sha256("<subject_id>:<email>" + shared_secret)`
//! - Queue callbacks carry `sha256(analysis_id + shared_secret)`
//! - Shared secret stored in the database settings table, overridable from
//!   ENV or TOML
//! - Shared secret 0 disables verification entirely (development mode)

use sha2::{Digest, Sha256};
use sqlx::SqlitePool;

use super::identity::Identity;
use crate::config::{TomlConfig, ENV_SHARED_SECRET};

/// Settings table key holding the generated secret
pub const SHARED_SECRET_KEY: &str = "auth_shared_secret";

// ========================================
// Error Types
// ========================================

/// Authentication error types
#[derive(Debug, Clone)]
pub enum ApiAuthError {
    /// Token does not have the `subject:email:hash` shape
    MalformedToken(String),

    /// Hash does not match calculated value
    InvalidHash { provided: String, calculated: String },

    /// Database error loading shared secret
    DatabaseError(String),

    /// Secret configured in ENV/TOML is not an i64
    InvalidSecret(String),
}

impl std::fmt::Display for ApiAuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiAuthError::MalformedToken(reason) => write!(f, "Malformed token: {}", reason),
            ApiAuthError::InvalidHash { .. } => write!(f, "Invalid hash"),
            ApiAuthError::DatabaseError(err) => write!(f, "Database error: {}", err),
            ApiAuthError::InvalidSecret(err) => write!(f, "Invalid shared secret: {}", err),
        }
    }
}

impl std::error::Error for ApiAuthError {}

// ========================================
// Shared Secret Management
// ========================================

/// Resolve the shared secret: ENV → TOML → database settings
pub async fn resolve_shared_secret(
    db: &SqlitePool,
    config: &TomlConfig,
) -> Result<i64, ApiAuthError> {
    if let Ok(raw) = std::env::var(ENV_SHARED_SECRET) {
        if !raw.trim().is_empty() {
            tracing::info!("Shared secret loaded from environment variable");
            return raw
                .trim()
                .parse::<i64>()
                .map_err(|e| ApiAuthError::InvalidSecret(e.to_string()));
        }
    }

    if let Some(secret) = config.auth.shared_secret {
        tracing::info!("Shared secret loaded from TOML config");
        return Ok(secret);
    }

    load_shared_secret(db).await
}

/// Load shared secret from database settings, generating one if absent
pub async fn load_shared_secret(db: &SqlitePool) -> Result<i64, ApiAuthError> {
    let result: Option<(String,)> = sqlx::query_as("SELECT value FROM settings WHERE key = ?")
        .bind(SHARED_SECRET_KEY)
        .fetch_optional(db)
        .await
        .map_err(|e| ApiAuthError::DatabaseError(e.to_string()))?;

    match result {
        Some((value,)) => value
            .parse::<i64>()
            .map_err(|e| ApiAuthError::DatabaseError(format!("Invalid i64: {}", e))),
        None => initialize_shared_secret(db).await,
    }
}

/// Generate a random non-zero secret and persist it
pub async fn initialize_shared_secret(db: &SqlitePool) -> Result<i64, ApiAuthError> {
    use rand::Rng;

    let secret: i64 = {
        let mut rng = rand::thread_rng();
        loop {
            let val = rng.gen::<i64>();
            if val != 0 {
                break val;
            }
        }
    };

    sqlx::query("INSERT OR REPLACE INTO settings (key, value) VALUES (?, ?)")
        .bind(SHARED_SECRET_KEY)
        .bind(secret.to_string())
        .execute(db)
        .await
        .map_err(|e| ApiAuthError::DatabaseError(e.to_string()))?;

    tracing::info!("Generated new shared secret");

    Ok(secret)
}

// ========================================
// Hash Calculation
// ========================================

/// SHA-256 of `input` followed by the decimal secret, as 64 hex characters
pub fn calculate_hash(input: &str, shared_secret: i64) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hasher.update(shared_secret.to_string().as_bytes());
    format!("{:x}", hasher.finalize())
}

// ========================================
// Identity Tokens
// ========================================

/// Issue a bearer token for an identity
///
/// # Examples
///
/// ```
/// use kibitz_common::api::auth::{parse_bearer_token, sign_identity};
/// use kibitz_common::Identity;
///
/// let identity = Identity { subject_id: "u1".into(), email: "ann@example.com".into() };
/// let token = sign_identity(&identity, 42);
/// assert_eq!(parse_bearer_token(&token, 42).unwrap(), identity);
/// assert!(parse_bearer_token(&token, 43).is_err());
/// ```
pub fn sign_identity(identity: &Identity, shared_secret: i64) -> String {
    let payload = format!("{}:{}", identity.subject_id, identity.email);
    let hash = calculate_hash(&payload, shared_secret);
    format!("{}:{}", payload, hash)
}

/// Verify a bearer token and return its identity
///
/// With secret 0 the hash is not checked and may be omitted.
pub fn parse_bearer_token(token: &str, shared_secret: i64) -> Result<Identity, ApiAuthError> {
    let mut parts: Vec<&str> = token.trim().rsplitn(3, ':').collect();
    parts.reverse();

    let (subject_id, email, provided) = match parts.as_slice() {
        [subject_id, email, hash] => (*subject_id, *email, Some(*hash)),
        [subject_id, email] if shared_secret == 0 => (*subject_id, *email, None),
        _ => {
            return Err(ApiAuthError::MalformedToken(
                "expected <subject_id>:<email>:<hash>".to_string(),
            ))
        }
    };

    if subject_id.trim().is_empty() {
        return Err(ApiAuthError::MalformedToken("empty subject id".to_string()));
    }

    if shared_secret != 0 {
        let calculated = calculate_hash(&format!("{}:{}", subject_id, email), shared_secret);
        let provided = provided.unwrap_or_default();
        if provided != calculated {
            return Err(ApiAuthError::InvalidHash {
                provided: provided.to_string(),
                calculated,
            });
        }
    }

    Ok(Identity {
        subject_id: subject_id.to_string(),
        email: email.to_string(),
    })
}

// ========================================
// Task Callback Signatures
// ========================================

/// Signature attached to a queued callback for one analysis job
pub fn sign_task(analysis_id: &str, shared_secret: i64) -> String {
    calculate_hash(analysis_id, shared_secret)
}

/// Validate a queued callback signature (always passes with secret 0)
pub fn validate_task_signature(
    analysis_id: &str,
    provided: &str,
    shared_secret: i64,
) -> Result<(), ApiAuthError> {
    if shared_secret == 0 {
        return Ok(());
    }

    let calculated = sign_task(analysis_id, shared_secret);
    if provided != calculated {
        return Err(ApiAuthError::InvalidHash {
            provided: provided.to_string(),
            calculated,
        });
    }

    Ok(())
}

// ========================================
// Tests
// ========================================
