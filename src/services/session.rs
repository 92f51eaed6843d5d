// SPDX-License-Identifier: MIT

//! Account creation and login against the credential directory.

use crate::error::{AppError, Result};
use crate::middleware::auth::create_jwt;
use crate::models::{Credential, Role, User};
use crate::store::DirectoryStore;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use ring::pbkdf2;
use serde::{Deserialize, Serialize};
use std::num::NonZeroU32;
use std::sync::Arc;
use validator::Validate;

const PBKDF2_ITERATIONS: u32 = 100_000;
const SALT_LEN: usize = 16;
const HASH_LEN: usize = 32;

#[derive(Debug, Deserialize, Validate)]
pub struct SignupRequest {
    #[validate(email(message = "Invalid email address"))]
    pub email: String,
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: String,
    #[validate(length(min = 1, message = "Name is required"))]
    pub name: String,
    #[validate(length(min = 1, message = "College ID is required"))]
    pub college_id: String,
    pub role: Role,
    /// Required for students; ignored for drivers
    pub route_number: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email(message = "Invalid email address"))]
    pub email: String,
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

/// A successful signup or login: the profile plus a signed token.
#[derive(Debug, Serialize)]
pub struct AuthenticatedSession {
    pub user: User,
    pub token: String,
}

/// Signup, login, and profile lookup over the credential directory.
#[derive(Clone)]
pub struct SessionManager {
    store: Arc<dyn DirectoryStore>,
    jwt_signing_key: Vec<u8>,
}

impl SessionManager {
    pub fn new(store: Arc<dyn DirectoryStore>, jwt_signing_key: Vec<u8>) -> Self {
        Self {
            store,
            jwt_signing_key,
        }
    }

    /// Create an account. Admin accounts are provisioned out of band and
    /// cannot be self-registered.
    pub async fn signup(&self, request: SignupRequest) -> Result<AuthenticatedSession> {
        request
            .validate()
            .map_err(|e| AppError::BadRequest(e.to_string()))?;

        if request.role == Role::Admin {
            return Err(AppError::SignupDisabled);
        }
        if request.role == Role::Student && request.route_number.is_none() {
            return Err(AppError::BadRequest(
                "Students must choose a route".to_string(),
            ));
        }

        let email = request.email.trim().to_lowercase();
        if self.store.get_credential(&email).await?.is_some() {
            return Err(AppError::EmailInUse);
        }

        let uid = crate::store::new_document_id();
        let credential = Credential {
            email: email.clone(),
            uid: uid.clone(),
            password_hash: hash_password(&request.password),
            created_at: chrono::Utc::now().to_rfc3339(),
        };
        self.store.create_credential(&credential).await?;

        let route_number = match request.role {
            Role::Student => request.route_number,
            _ => None,
        };
        let user = User {
            uid: uid.clone(),
            email,
            role: request.role,
            name: request.name,
            college_id: request.college_id,
            route_number,
        };
        self.store.create_user(&user).await?;

        let token = create_jwt(&uid, user.role, &self.jwt_signing_key)?;
        tracing::info!(uid, role = %user.role, "Account created");
        Ok(AuthenticatedSession { user, token })
    }

    /// Verify credentials and issue a token. A credential with no matching
    /// profile is treated as an incomplete account and rejected so the
    /// client clears its session.
    pub async fn login(&self, request: LoginRequest) -> Result<AuthenticatedSession> {
        request
            .validate()
            .map_err(|e| AppError::BadRequest(e.to_string()))?;

        let email = request.email.trim().to_lowercase();
        let credential = self
            .store
            .get_credential(&email)
            .await?
            .ok_or(AppError::InvalidCredentials)?;

        if !verify_password(&request.password, &credential.password_hash) {
            return Err(AppError::InvalidCredentials);
        }

        let user = self
            .store
            .get_user(&credential.uid)
            .await?
            .ok_or(AppError::ProfileMissing)?;

        let token = create_jwt(&user.uid, user.role, &self.jwt_signing_key)?;
        tracing::info!(uid = %user.uid, role = %user.role, "Login");
        Ok(AuthenticatedSession { user, token })
    }

    /// Profile for an authenticated uid. Missing profiles force a logout.
    pub async fn current_user(&self, uid: &str) -> Result<User> {
        self.store
            .get_user(uid)
            .await?
            .ok_or(AppError::ProfileMissing)
    }
}

/// PBKDF2-HMAC-SHA256, encoded `pbkdf2$<iterations>$<salt>$<hash>`.
fn hash_password(password: &str) -> String {
    let salt: [u8; SALT_LEN] = rand::random();
    let mut hash = [0u8; HASH_LEN];
    pbkdf2::derive(
        pbkdf2::PBKDF2_HMAC_SHA256,
        NonZeroU32::new(PBKDF2_ITERATIONS).expect("iterations is non-zero"),
        &salt,
        password.as_bytes(),
        &mut hash,
    );
    format!(
        "pbkdf2${}${}${}",
        PBKDF2_ITERATIONS,
        URL_SAFE_NO_PAD.encode(salt),
        URL_SAFE_NO_PAD.encode(hash)
    )
}

fn verify_password(password: &str, encoded: &str) -> bool {
    let mut parts = encoded.split('$');
    let (Some("pbkdf2"), Some(iterations), Some(salt), Some(hash)) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return false;
    };
    let Ok(iterations) = iterations.parse::<u32>() else {
        return false;
    };
    let Some(iterations) = NonZeroU32::new(iterations) else {
        return false;
    };
    let (Ok(salt), Ok(hash)) = (URL_SAFE_NO_PAD.decode(salt), URL_SAFE_NO_PAD.decode(hash)) else {
        return false;
    };
    pbkdf2::verify(
        pbkdf2::PBKDF2_HMAC_SHA256,
        iterations,
        &salt,
        password.as_bytes(),
        &hash,
    )
    .is_ok()
}
