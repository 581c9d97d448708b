#![forbid(unsafe_code)]

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{Context as _, anyhow};
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use campus_domain::{Error, UserId};

use crate::util::secret::SecretString;

pub const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthClaims {
	pub sub: String,
	pub exp: u64,
}

/// Stateless HMAC access tokens: `v1.<payload-b64>.<sig-b64>`.
#[derive(Clone)]
pub struct TokenService {
	secret: SecretString,
	ttl: Duration,
}

impl TokenService {
	pub fn new(secret: SecretString, ttl: Duration) -> Self {
		Self { secret, ttl }
	}

	pub fn issue(&self, user: &UserId) -> anyhow::Result<String> {
		let exp = SystemTime::now()
			.duration_since(UNIX_EPOCH)
			.unwrap_or_default()
			.as_secs()
			.saturating_add(self.ttl.as_secs());
		let claims = AuthClaims {
			sub: user.as_str().to_string(),
			exp,
		};

		let payload = serde_json::to_vec(&claims).context("encode token claims")?;
		let payload_b64 = URL_SAFE_NO_PAD.encode(payload);
		let sig_b64 = URL_SAFE_NO_PAD.encode(sign(payload_b64.as_bytes(), self.secret.expose().as_bytes()));
		Ok(format!("v1.{payload_b64}.{sig_b64}"))
	}

	pub fn verify(&self, token: &str) -> anyhow::Result<AuthClaims> {
		let parts = token.split('.').collect::<Vec<_>>();
		if parts.len() != 3 || parts[0] != "v1" {
			return Err(anyhow!("invalid token format"));
		}

		let payload_b64 = parts[1];
		let sig_b64 = parts[2];

		let payload = URL_SAFE_NO_PAD.decode(payload_b64).context("decode token payload")?;
		let expected_sig = sign(payload_b64.as_bytes(), self.secret.expose().as_bytes());
		let provided_sig = URL_SAFE_NO_PAD.decode(sig_b64).context("decode token signature")?;

		if !constant_time_eq(&expected_sig, &provided_sig) {
			return Err(anyhow!("invalid token signature"));
		}

		let claims: AuthClaims = serde_json::from_slice(&payload).context("parse token claims")?;
		let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs();
		if claims.exp <= now {
			return Err(anyhow!("token expired"));
		}

		Ok(claims)
	}

	/// Verify and resolve the authenticated user id, as an authorization
	/// failure rather than an internal one.
	pub fn authenticate(&self, token: &str) -> Result<UserId, Error> {
		let claims = self
			.verify(token)
			.map_err(|e| Error::authorization(format!("invalid access token: {e}")))?;
		UserId::new(claims.sub).map_err(|_| Error::authorization("invalid access token subject"))
	}
}

fn sign(payload_b64: &[u8], secret: &[u8]) -> Vec<u8> {
	let mut mac = Hmac::<Sha256>::new_from_slice(secret).expect("hmac key");
	mac.update(payload_b64);
	mac.finalize().into_bytes().to_vec()
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
	if a.len() != b.len() {
		return false;
	}

	let mut diff = 0u8;
	for (x, y) in a.iter().zip(b.iter()) {
		diff |= x ^ y;
	}

	diff == 0
}

pub fn hash_password(password: &str) -> Result<String, Error> {
	bcrypt::hash(password, bcrypt::DEFAULT_COST)
		.map_err(|e| Error::System(anyhow!(e).context("hash password")))
}

pub fn verify_password(password: &str, hash: &str) -> bool {
	bcrypt::verify(password, hash).unwrap_or(false)
}

#[cfg(test)]
mod tests {
	use super::*;

	fn service(ttl: Duration) -> TokenService {
		TokenService::new(SecretString::new("test-secret"), ttl)
	}

	#[test]
	fn issue_verify_roundtrip() {
		let tokens = service(Duration::from_secs(60));
		let user = UserId::new("u1").unwrap();
		let token = tokens.issue(&user).unwrap();

		let claims = tokens.verify(&token).unwrap();
		assert_eq!(claims.sub, "u1");
		assert_eq!(tokens.authenticate(&token).unwrap(), user);
	}

	#[test]
	fn expired_tokens_are_rejected() {
		let tokens = service(Duration::from_secs(0));
		let token = tokens.issue(&UserId::new("u1").unwrap()).unwrap();
		assert!(tokens.verify(&token).is_err());
	}

	#[test]
	fn tampered_tokens_are_rejected() {
		let tokens = service(Duration::from_secs(60));
		let token = tokens.issue(&UserId::new("u1").unwrap()).unwrap();

		let mut parts: Vec<String> = token.split('.').map(str::to_string).collect();
		parts[2] = URL_SAFE_NO_PAD.encode(b"forged signature bytes..........");
		assert!(tokens.verify(&parts.join(".")).is_err());

		let other = TokenService::new(SecretString::new("other-secret"), Duration::from_secs(60));
		assert!(other.verify(&token).is_err());
	}

	#[test]
	fn malformed_tokens_are_rejected() {
		let tokens = service(Duration::from_secs(60));
		assert!(tokens.verify("").is_err());
		assert!(tokens.verify("v2.a.b").is_err());
		assert!(tokens.verify("v1.only-two-parts").is_err());
	}

	#[test]
	fn password_hash_verifies() {
		let hash = hash_password("pass1234").unwrap();
		assert!(verify_password("pass1234", &hash));
		assert!(!verify_password("wrong", &hash));
	}
}
