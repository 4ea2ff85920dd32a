//! Provider credentials read from the environment

use secrecy::{ExposeSecret, SecretString};

/// Provider keys and secrets. Values are only exposed when injected into a
/// child process environment.
#[derive(Debug, Default)]
pub struct Credentials {
    pub openai_api_key: Option<SecretString>,
    pub twilio_account_sid: Option<SecretString>,
    pub twilio_auth_token: Option<SecretString>,
    pub livekit_url: Option<String>,
    pub livekit_api_key: Option<SecretString>,
    pub livekit_api_secret: Option<SecretString>,
}

fn secret_var(name: &str) -> Option<SecretString> {
    std::env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .map(SecretString::from)
}

impl Credentials {
    /// Read every credential from the process environment
    pub fn from_env() -> Self {
        Self {
            openai_api_key: secret_var("OPENAI_API_KEY"),
            twilio_account_sid: secret_var("TWILIO_ACCOUNT_SID"),
            twilio_auth_token: secret_var("TWILIO_AUTH_TOKEN"),
            livekit_url: std::env::var("LIVEKIT_URL")
                .ok()
                .filter(|v| !v.trim().is_empty()),
            livekit_api_key: secret_var("LIVEKIT_API_KEY"),
            livekit_api_secret: secret_var("LIVEKIT_API_SECRET"),
        }
    }

    /// Environment overlay for the deploy subprocess
    pub fn env_overlay(&self) -> Vec<(String, String)> {
        let mut env = Vec::new();
        let secrets = [
            ("OPENAI_API_KEY", &self.openai_api_key),
            ("TWILIO_ACCOUNT_SID", &self.twilio_account_sid),
            ("TWILIO_AUTH_TOKEN", &self.twilio_auth_token),
            ("LIVEKIT_API_KEY", &self.livekit_api_key),
            ("LIVEKIT_API_SECRET", &self.livekit_api_secret),
        ];
        for (name, value) in secrets {
            if let Some(value) = value {
                env.push((name.to_string(), value.expose_secret().to_string()));
            }
        }
        if let Some(url) = &self.livekit_url {
            env.push(("LIVEKIT_URL".to_string(), url.clone()));
        }
        env
    }

    /// Raw secret values, used to scrub process output before it is logged
    pub fn secret_values(&self) -> Vec<String> {
        [
            &self.openai_api_key,
            &self.twilio_account_sid,
            &self.twilio_auth_token,
            &self.livekit_api_key,
            &self.livekit_api_secret,
        ]
        .into_iter()
        .flatten()
        .map(|s| s.expose_secret().to_string())
        .collect()
    }

    /// Whether the room service can be reached
    pub fn has_room_service(&self) -> bool {
        self.livekit_url.is_some()
            && self.livekit_api_key.is_some()
            && self.livekit_api_secret.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Credentials {
        Credentials {
            openai_api_key: Some(SecretString::from("sk-test".to_string())),
            livekit_url: Some("wss://example.livekit.cloud".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_env_overlay_skips_missing() {
        let env = sample().env_overlay();
        assert!(env.contains(&("OPENAI_API_KEY".to_string(), "sk-test".to_string())));
        assert!(env.iter().all(|(k, _)| k != "TWILIO_AUTH_TOKEN"));
        assert!(!sample().has_room_service());
    }

    #[test]
    fn test_debug_does_not_leak() {
        let rendered = format!("{:?}", sample());
        assert!(!rendered.contains("sk-test"));
    }
}
