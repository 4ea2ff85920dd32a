//! Access tokens for the LiveKit server API

use std::time::Duration;

use chrono::Utc;
use jsonwebtoken::{encode, EncodingKey, Header};
use livekit_api::{Claims, VideoGrant};
use secrecy::{ExposeSecret, SecretString};

use crate::errors::DeployerError;

/// Default token lifetime
pub const DEFAULT_TTL: Duration = Duration::from_secs(600);

/// HS256 token signed with the API secret
pub struct AccessToken<'a> {
    api_key: &'a str,
    api_secret: &'a SecretString,
    identity: String,
    ttl: Duration,
    grant: VideoGrant,
}

impl<'a> AccessToken<'a> {
    pub fn new(api_key: &'a str, api_secret: &'a SecretString) -> Self {
        Self {
            api_key,
            api_secret,
            identity: "gobid".to_string(),
            ttl: DEFAULT_TTL,
            grant: VideoGrant::default(),
        }
    }

    pub fn with_identity(mut self, identity: impl Into<String>) -> Self {
        self.identity = identity.into();
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_grant(mut self, grant: VideoGrant) -> Self {
        self.grant = grant;
        self
    }

    pub fn claims(&self) -> Claims {
        let now = Utc::now().timestamp();
        Claims {
            iss: self.api_key.to_string(),
            sub: self.identity.clone(),
            nbf: now,
            exp: now + self.ttl.as_secs() as i64,
            video: self.grant.clone(),
        }
    }

    pub fn to_jwt(&self) -> Result<String, DeployerError> {
        let key = EncodingKey::from_secret(self.api_secret.expose_secret().as_bytes());
        Ok(encode(&Header::default(), &self.claims(), &key)?)
    }
}

/// Grant for listing and administering rooms
pub fn room_admin_grant(room: Option<&str>) -> VideoGrant {
    VideoGrant {
        room_list: true,
        room_admin: true,
        room_create: false,
        room: room.map(str::to_string),
    }
}
