//! LiveKit RoomService client (Twirp over JSON)

use std::time::Duration;

use async_trait::async_trait;
use livekit_api::{DeleteRoomRequest, ListRoomsRequest, ListRoomsResponse, Room, TwirpError};
use reqwest::{header, Client, StatusCode};
use secrecy::SecretString;
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, error};
use url::Url;

use crate::errors::DeployerError;
use crate::livekit::token::{room_admin_grant, AccessToken};

const TWIRP_PREFIX: &str = "/twirp/livekit.RoomService";

/// Room operations used by deployment and status checks
#[async_trait]
pub trait RoomService: Send + Sync {
    /// Rooms matching `names`
    async fn list_rooms(&self, names: &[String]) -> Result<Vec<Room>, DeployerError>;

    /// Delete a room. Deleting a room that does not exist succeeds.
    async fn delete_room(&self, name: &str) -> Result<(), DeployerError>;
}

/// RoomService over HTTP
pub struct HttpRoomService {
    client: Client,
    base_url: String,
    api_key: String,
    api_secret: SecretString,
}

impl HttpRoomService {
    pub fn new(
        server_url: &str,
        api_key: &str,
        api_secret: SecretString,
        timeout: Duration,
    ) -> Result<Self, DeployerError> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: http_base_url(server_url)?,
            api_key: api_key.to_string(),
            api_secret,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn call<B: Serialize, T: DeserializeOwned>(
        &self,
        method: &str,
        room: Option<&str>,
        body: &B,
    ) -> Result<T, DeployerError> {
        let url = format!("{}{}/{}", self.base_url, TWIRP_PREFIX, method);
        debug!("POST {}", url);

        let token = AccessToken::new(&self.api_key, &self.api_secret)
            .with_grant(room_admin_grant(room))
            .to_jwt()?;

        let response = self
            .client
            .post(&url)
            .header(header::AUTHORIZATION, format!("Bearer {}", token))
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(twirp_error(status, &body));
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl RoomService for HttpRoomService {
    async fn list_rooms(&self, names: &[String]) -> Result<Vec<Room>, DeployerError> {
        let request = ListRoomsRequest {
            names: names.to_vec(),
        };
        let response: ListRoomsResponse = self.call("ListRooms", None, &request).await?;
        Ok(response.rooms)
    }

    async fn delete_room(&self, name: &str) -> Result<(), DeployerError> {
        let request = DeleteRoomRequest {
            room: name.to_string(),
        };
        match self
            .call::<_, serde_json::Value>("DeleteRoom", Some(name), &request)
            .await
        {
            Ok(_) => Ok(()),
            Err(DeployerError::NotFound(_)) => {
                debug!("Room {} already gone", name);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

fn twirp_error(status: StatusCode, body: &str) -> DeployerError {
    match serde_json::from_str::<TwirpError>(body) {
        Ok(err) if err.is_not_found() => DeployerError::NotFound(err.msg),
        Ok(err) => {
            error!("RoomService call failed: {} {} - {}", status, err.code, err.msg);
            DeployerError::RoomServiceError(format!("{}: {}", err.code, err.msg))
        }
        Err(_) if status == StatusCode::NOT_FOUND => DeployerError::NotFound(body.to_string()),
        Err(_) => {
            error!("RoomService call failed: {} - {}", status, body);
            DeployerError::RoomServiceError(format!("{}: {}", status, body))
        }
    }
}

/// Server URL as an HTTP(S) base. `wss://` and `ws://` become `https://` and
/// `http://`.
pub fn http_base_url(server_url: &str) -> Result<String, DeployerError> {
    let mut url = Url::parse(server_url)
        .map_err(|e| DeployerError::ConfigError(format!("invalid LiveKit URL {server_url}: {e}")))?;

    let scheme = match url.scheme() {
        "wss" | "https" => "https",
        "ws" | "http" => "http",
        other => {
            return Err(DeployerError::ConfigError(format!(
                "unsupported LiveKit URL scheme {other}"
            )))
        }
    };
    url.set_scheme(scheme).map_err(|_| {
        DeployerError::ConfigError(format!("cannot use scheme {scheme} for {server_url}"))
    })?;

    Ok(url.as_str().trim_end_matches('/').to_string())
}
