#![forbid(unsafe_code)]

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::info;

use campus_domain::{Error, Result, User, UserId, UserSummary};
use campus_store::{Store, UserPatch};

use crate::auth::{TokenService, hash_password, verify_password};
use crate::oauth::IdentityProvider;

/// Public projection of a user (no credential material).
#[derive(Debug, Clone, Serialize)]
pub struct AuthenticatedUser {
	pub user: User,
	pub token: String,
}

/// Account lifecycle: local registration, login, federated sign-in, and
/// profile maintenance.
#[derive(Clone)]
pub struct AccountService {
	store: Store,
	tokens: TokenService,
	identity: Option<Arc<dyn IdentityProvider>>,
}

impl AccountService {
	pub fn new(store: Store, tokens: TokenService, identity: Option<Arc<dyn IdentityProvider>>) -> Self {
		Self {
			store,
			tokens,
			identity,
		}
	}

	pub async fn register(&self, username: String, email: String, password: String) -> Result<AuthenticatedUser> {
		let username = username.trim().to_string();
		let email = email.trim().to_lowercase();
		if username.is_empty() || email.is_empty() {
			return Err(Error::validation("username and email are required"));
		}
		if password.chars().count() < 6 {
			return Err(Error::validation("password must be at least 6 characters"));
		}

		if self.store.find_user_by_username(&username).await?.is_some() {
			return Err(Error::conflict("username already taken"));
		}
		if self.store.find_user_by_email(&email).await?.is_some() {
			return Err(Error::conflict("email already registered"));
		}

		let user = User {
			id: UserId::generate(),
			username,
			email,
			password_hash: Some(hash_password(&password)?),
			google_id: None,
			access_token: None,
			refresh_token: None,
			profile_picture: None,
			cover_picture: None,
			bio: None,
			background_color: None,
			font: None,
			followers: Vec::new(),
			following: Vec::new(),
			device_token: None,
			created_at: Utc::now(),
		};
		self.store.insert_user(&user).await?;
		metrics::counter!("campus_users_registered_total").increment(1);
		info!(user_id = %user.id, "registered user");

		let token = self.tokens.issue(&user.id)?;
		Ok(AuthenticatedUser { user, token })
	}

	pub async fn login(&self, email: String, password: String) -> Result<AuthenticatedUser> {
		let email = email.trim().to_lowercase();
		let Some(user) = self.store.find_user_by_email(&email).await? else {
			return Err(Error::authorization("invalid credentials"));
		};

		let valid = user
			.password_hash
			.as_deref()
			.is_some_and(|hash| verify_password(&password, hash));
		if !valid {
			return Err(Error::authorization("invalid credentials"));
		}

		let token = self.tokens.issue(&user.id)?;
		Ok(AuthenticatedUser { user, token })
	}

	/// Exchange an authorization code at the identity provider, then find
	/// or create the local account and persist the provider tokens on it.
	pub async fn google_sign_in(&self, code: &str) -> Result<AuthenticatedUser> {
		let Some(identity) = self.identity.as_ref() else {
			return Err(Error::validation("federated sign-in is not configured"));
		};

		let exchange = identity
			.exchange(code)
			.await
			.map_err(|e| Error::Upstream(format!("identity provider exchange failed: {e}")))?;
		let claims = &exchange.claims;

		let existing = match self.store.find_user_by_google_id(&claims.external_id).await? {
			Some(user) => Some(user),
			None => self.store.find_user_by_email(&claims.email.to_lowercase()).await?,
		};

		let user = match existing {
			Some(user) => {
				self.store
					.update_user_tokens(&user.id, &exchange.access_token, exchange.refresh_token.as_deref())
					.await?;
				self.store.find_user(&user.id).await?.ok_or(Error::NotFound("user"))?
			}
			None => {
				let user = User {
					id: UserId::generate(),
					username: unique_username(&self.store, &claims.display_name).await?,
					email: claims.email.to_lowercase(),
					password_hash: None,
					google_id: Some(claims.external_id.clone()),
					access_token: Some(exchange.access_token.clone()),
					refresh_token: exchange.refresh_token.clone(),
					profile_picture: claims.avatar_url.clone(),
					cover_picture: None,
					bio: None,
					background_color: None,
					font: None,
					followers: Vec::new(),
					following: Vec::new(),
					device_token: None,
					created_at: Utc::now(),
				};
				self.store.insert_user(&user).await?;
				info!(user_id = %user.id, "registered federated user");
				user
			}
		};

		let token = self.tokens.issue(&user.id)?;
		Ok(AuthenticatedUser { user, token })
	}

	/// Refresh the stored provider access token for a user and persist the
	/// rotated credentials.
	pub async fn refresh_provider_tokens(&self, user_id: &UserId) -> Result<()> {
		let Some(identity) = self.identity.as_ref() else {
			return Err(Error::validation("federated sign-in is not configured"));
		};
		let Some(user) = self.store.find_user(user_id).await? else {
			return Err(Error::NotFound("user"));
		};
		let Some(refresh_token) = user.refresh_token.as_deref() else {
			return Err(Error::validation("user has no refresh token"));
		};

		let refreshed = identity
			.refresh(refresh_token)
			.await
			.map_err(|e| Error::Upstream(format!("identity provider refresh failed: {e}")))?;
		self.store
			.update_user_tokens(user_id, &refreshed.access_token, refreshed.refresh_token.as_deref())
			.await?;
		Ok(())
	}

	pub async fn get_user(&self, id: &UserId) -> Result<User> {
		self.store.find_user(id).await?.ok_or(Error::NotFound("user"))
	}

	pub async fn get_user_by_username(&self, username: &str) -> Result<User> {
		self.store
			.find_user_by_username(username)
			.await?
			.ok_or(Error::NotFound("user"))
	}

	pub async fn update_profile(&self, id: &UserId, acting: &UserId, patch: UserPatch) -> Result<User> {
		if id != acting {
			return Err(Error::authorization("you can update only your own account"));
		}
		if self.store.find_user(id).await?.is_none() {
			return Err(Error::NotFound("user"));
		}
		self.store.update_user_profile(id, &patch).await?;
		self.get_user(id).await
	}

	pub async fn set_device_token(&self, id: &UserId, acting: &UserId, token: Option<String>) -> Result<()> {
		if id != acting {
			return Err(Error::authorization("you can update only your own account"));
		}
		self.store.set_device_token(id, token.as_deref()).await?;
		Ok(())
	}

	pub async fn search(&self, query: &str) -> Result<Vec<UserSummary>> {
		let query = query.trim();
		if query.is_empty() {
			return Ok(Vec::new());
		}
		Ok(self.store.search_users(query, 20).await?)
	}
}

/// Derive a username from the display name, suffixing until unique.
async fn unique_username(store: &Store, display_name: &str) -> Result<String> {
	let base: String = display_name
		.chars()
		.filter(|c| c.is_alphanumeric())
		.take(24)
		.collect::<String>()
		.to_lowercase();
	let base = if base.is_empty() { "user".to_string() } else { base };

	if store.find_user_by_username(&base).await?.is_none() {
		return Ok(base);
	}
	for n in 1..1000u32 {
		let candidate = format!("{base}{n}");
		if store.find_user_by_username(&candidate).await?.is_none() {
			return Ok(candidate);
		}
	}
	Err(Error::conflict("could not derive a unique username"))
}
