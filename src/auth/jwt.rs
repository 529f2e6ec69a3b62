use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

const SECRET_FILE: &str = "secret.key";

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Username of the token holder
    pub sub: String,
    pub iat: usize,
    pub exp: usize,
}

#[derive(Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: &'static str,
}

/// HS256 signing material plus the token lifetime.
pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    lifetime: Duration,
}

impl JwtKeys {
    pub fn new(secret: &[u8], lifetime_days: i64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            lifetime: Duration::days(lifetime_days),
        }
    }

    pub fn issue(&self, username: &str) -> jsonwebtoken::errors::Result<TokenResponse> {
        let now = Utc::now();
        let claims = Claims {
            sub: username.to_string(),
            iat: now.timestamp() as usize,
            exp: (now + self.lifetime).timestamp() as usize,
        };
        let access_token = encode(&Header::default(), &claims, &self.encoding)?;
        Ok(TokenResponse {
            access_token,
            token_type: "bearer",
        })
    }

    pub fn verify(&self, token: &str) -> jsonwebtoken::errors::Result<Claims> {
        let data = decode::<Claims>(token, &self.decoding, &Validation::default())?;
        Ok(data.claims)
    }
}

/// Resolves the signing secret: an explicit one wins, otherwise a random
/// secret is generated once and kept in the data directory.
pub fn load_or_create_secret(explicit: Option<&str>, data_dir: &Path) -> anyhow::Result<String> {
    if let Some(secret) = explicit.filter(|s| !s.is_empty()) {
        return Ok(secret.to_string());
    }

    let path = data_dir.join(SECRET_FILE);
    if path.exists() {
        let secret = fs::read_to_string(&path)?.trim().to_string();
        if !secret.is_empty() {
            return Ok(secret);
        }
    }

    let bytes: [u8; 32] = rand::thread_rng().gen();
    let secret = hex::encode(bytes);
    fs::create_dir_all(data_dir)?;
    fs::write(&path, &secret)?;
    tracing::info!("Generated new token signing secret at {}", path.display());
    Ok(secret)
}
