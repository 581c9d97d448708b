#![forbid(unsafe_code)]

use anyhow::Context as _;
use async_trait::async_trait;
use serde::Deserialize;

use crate::util::secret::SecretString;

/// Profile claims returned by the identity provider.
#[derive(Debug, Clone)]
pub struct ProfileClaims {
	pub external_id: String,
	pub display_name: String,
	pub email: String,
	pub avatar_url: Option<String>,
}

/// Result of exchanging an authorization code.
#[derive(Debug, Clone)]
pub struct TokenExchange {
	pub access_token: String,
	pub refresh_token: Option<String>,
	pub claims: ProfileClaims,
}

/// Result of refreshing an expired access token.
#[derive(Debug, Clone)]
pub struct RefreshedTokens {
	pub access_token: String,
	pub refresh_token: Option<String>,
}

/// Federated identity boundary: exchange an authorization artifact for
/// tokens + profile claims, refresh on expiry.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
	async fn exchange(&self, code: &str) -> anyhow::Result<TokenExchange>;
	async fn refresh(&self, refresh_token: &str) -> anyhow::Result<RefreshedTokens>;
}

const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const GOOGLE_USERINFO_URL: &str = "https://openidconnect.googleapis.com/v1/userinfo";

pub struct GoogleIdentityProvider {
	http: reqwest::Client,
	client_id: String,
	client_secret: SecretString,
	redirect_uri: String,
	token_url: String,
	userinfo_url: String,
}

impl GoogleIdentityProvider {
	pub fn new(client_id: String, client_secret: SecretString, redirect_uri: String) -> Self {
		Self {
			http: reqwest::Client::new(),
			client_id,
			client_secret,
			redirect_uri,
			token_url: GOOGLE_TOKEN_URL.to_string(),
			userinfo_url: GOOGLE_USERINFO_URL.to_string(),
		}
	}
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
	access_token: String,
	#[serde(default)]
	refresh_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UserInfoResponse {
	sub: String,
	#[serde(default)]
	name: Option<String>,
	email: String,
	#[serde(default)]
	picture: Option<String>,
}

#[async_trait]
impl IdentityProvider for GoogleIdentityProvider {
	async fn exchange(&self, code: &str) -> anyhow::Result<TokenExchange> {
		let params = [
			("grant_type", "authorization_code"),
			("code", code),
			("client_id", self.client_id.as_str()),
			("client_secret", self.client_secret.expose()),
			("redirect_uri", self.redirect_uri.as_str()),
		];

		let tokens: TokenResponse = self
			.http
			.post(&self.token_url)
			.form(&params)
			.send()
			.await
			.context("token exchange request")?
			.error_for_status()
			.context("token exchange status")?
			.json()
			.await
			.context("parse token response")?;

		let info: UserInfoResponse = self
			.http
			.get(&self.userinfo_url)
			.bearer_auth(&tokens.access_token)
			.send()
			.await
			.context("userinfo request")?
			.error_for_status()
			.context("userinfo status")?
			.json()
			.await
			.context("parse userinfo response")?;

		Ok(TokenExchange {
			access_token: tokens.access_token,
			refresh_token: tokens.refresh_token,
			claims: ProfileClaims {
				external_id: info.sub,
				display_name: info.name.unwrap_or_else(|| info.email.clone()),
				email: info.email,
				avatar_url: info.picture,
			},
		})
	}

	async fn refresh(&self, refresh_token: &str) -> anyhow::Result<RefreshedTokens> {
		let params = [
			("grant_type", "refresh_token"),
			("refresh_token", refresh_token),
			("client_id", self.client_id.as_str()),
			("client_secret", self.client_secret.expose()),
		];

		let tokens: TokenResponse = self
			.http
			.post(&self.token_url)
			.form(&params)
			.send()
			.await
			.context("token refresh request")?
			.error_for_status()
			.context("token refresh status")?
			.json()
			.await
			.context("parse refresh response")?;

		Ok(RefreshedTokens {
			access_token: tokens.access_token,
			refresh_token: tokens.refresh_token,
		})
	}
}
