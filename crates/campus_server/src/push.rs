#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Context as _;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use campus_domain::UserId;
use campus_store::Store;

use crate::util::secret::SecretString;

/// Push delivery outcomes the caller must distinguish.
#[derive(Debug)]
pub enum PushError {
	/// The device token is no longer registered and must be cleared.
	TokenNotRegistered,
	Other(anyhow::Error),
}

/// Mobile push gateway boundary.
#[async_trait]
pub trait PushGateway: Send + Sync {
	async fn send(
		&self,
		device_token: &str,
		title: &str,
		body: &str,
		data: &BTreeMap<String, String>,
	) -> Result<(), PushError>;
}

/// FCM-style HTTP gateway adapter.
pub struct FcmGateway {
	http: reqwest::Client,
	endpoint: String,
	server_key: SecretString,
}

impl FcmGateway {
	pub fn new(endpoint: String, server_key: SecretString) -> Self {
		Self {
			http: reqwest::Client::new(),
			endpoint,
			server_key,
		}
	}
}

#[derive(Debug, Deserialize)]
struct FcmResponse {
	#[serde(default)]
	results: Vec<FcmResult>,
}

#[derive(Debug, Deserialize)]
struct FcmResult {
	#[serde(default)]
	error: Option<String>,
}

#[async_trait]
impl PushGateway for FcmGateway {
	async fn send(
		&self,
		device_token: &str,
		title: &str,
		body: &str,
		data: &BTreeMap<String, String>,
	) -> Result<(), PushError> {
		let payload = json!({
			"to": device_token,
			"notification": { "title": title, "body": body },
			"data": data,
		});

		let response = self
			.http
			.post(&self.endpoint)
			.header("Authorization", format!("key={}", self.server_key.expose()))
			.json(&payload)
			.send()
			.await
			.context("send push request")
			.map_err(PushError::Other)?;

		let status = response.status();
		let parsed: FcmResponse = response
			.json()
			.await
			.context("parse push response")
			.map_err(PushError::Other)?;

		if let Some(error) = parsed.results.iter().find_map(|r| r.error.as_deref()) {
			if error == "NotRegistered" || error == "InvalidRegistration" {
				return Err(PushError::TokenNotRegistered);
			}
			return Err(PushError::Other(anyhow::anyhow!("push gateway error: {error}")));
		}

		if !status.is_success() {
			return Err(PushError::Other(anyhow::anyhow!("push gateway status {status}")));
		}

		Ok(())
	}
}

/// Best-effort push fan-out.
///
/// Loads the receiver's device token, attempts delivery, and clears tokens
/// the gateway reports dead. Failures are logged and swallowed; nothing
/// here can fail a request.
#[derive(Clone)]
pub struct PushService {
	gateway: Option<Arc<dyn PushGateway>>,
	store: Store,
}

impl PushService {
	pub fn new(gateway: Arc<dyn PushGateway>, store: Store) -> Self {
		Self {
			gateway: Some(gateway),
			store,
		}
	}

	pub fn disabled(store: Store) -> Self {
		Self { gateway: None, store }
	}

	pub fn is_enabled(&self) -> bool {
		self.gateway.is_some()
	}

	pub async fn send_to_user(&self, receiver: &UserId, title: &str, body: &str, data: BTreeMap<String, String>) {
		let Some(gateway) = self.gateway.as_ref() else {
			return;
		};

		let device_token = match self.store.find_user(receiver).await {
			Ok(Some(user)) => user.device_token,
			Ok(None) => None,
			Err(e) => {
				warn!(receiver = %receiver, error = %e, "push: failed to load receiver");
				None
			}
		};
		let Some(device_token) = device_token else {
			return;
		};

		match gateway.send(&device_token, title, body, &data).await {
			Ok(()) => {
				metrics::counter!("campus_push_sent_total").increment(1);
			}
			Err(PushError::TokenNotRegistered) => {
				debug!(receiver = %receiver, "push: token no longer registered; clearing");
				if let Err(e) = self.store.set_device_token(receiver, None).await {
					warn!(receiver = %receiver, error = %e, "push: failed to clear dead token");
				}
			}
			Err(PushError::Other(e)) => {
				metrics::counter!("campus_push_errors_total").increment(1);
				warn!(receiver = %receiver, error = %e, "push delivery failed");
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::Mutex;

	use campus_domain::User;
	use chrono::Utc;

	struct FakeGateway {
		outcome: Mutex<Vec<Result<(), PushError>>>,
		sent: Mutex<Vec<String>>,
	}

	#[async_trait]
	impl PushGateway for FakeGateway {
		async fn send(
			&self,
			device_token: &str,
			_title: &str,
			_body: &str,
			_data: &BTreeMap<String, String>,
		) -> Result<(), PushError> {
			self.sent.lock().unwrap().push(device_token.to_string());
			self.outcome.lock().unwrap().pop().unwrap_or(Ok(()))
		}
	}

	async fn store_with_user(token: Option<&str>) -> (Store, UserId) {
		let store = Store::connect("sqlite::memory:").await.unwrap();
		let id = UserId::new("u1").unwrap();
		store
			.insert_user(&User {
				id: id.clone(),
				username: "ann".to_string(),
				email: "ann@example.com".to_string(),
				password_hash: None,
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
				device_token: token.map(str::to_string),
				created_at: Utc::now(),
			})
			.await
			.unwrap();
		(store, id)
	}

	#[tokio::test]
	async fn dead_tokens_are_cleared() {
		let (store, user) = store_with_user(Some("dead-token")).await;
		let gateway = Arc::new(FakeGateway {
			outcome: Mutex::new(vec![Err(PushError::TokenNotRegistered)]),
			sent: Mutex::new(Vec::new()),
		});
		let push = PushService::new(gateway.clone(), store.clone());

		push.send_to_user(&user, "t", "b", BTreeMap::new()).await;

		assert_eq!(gateway.sent.lock().unwrap().as_slice(), ["dead-token"]);
		let reloaded = store.find_user(&user).await.unwrap().unwrap();
		assert!(reloaded.device_token.is_none());
	}

	#[tokio::test]
	async fn missing_token_skips_gateway() {
		let (store, user) = store_with_user(None).await;
		let gateway = Arc::new(FakeGateway {
			outcome: Mutex::new(Vec::new()),
			sent: Mutex::new(Vec::new()),
		});
		let push = PushService::new(gateway.clone(), store);

		push.send_to_user(&user, "t", "b", BTreeMap::new()).await;
		assert!(gateway.sent.lock().unwrap().is_empty());
	}

	#[tokio::test]
	async fn disabled_service_is_a_no_op() {
		let (store, user) = store_with_user(Some("token")).await;
		let push = PushService::disabled(store);
		assert!(!push.is_enabled());
		// Must not error or panic.
		push.send_to_user(&user, "t", "b", BTreeMap::new()).await;
	}
}
