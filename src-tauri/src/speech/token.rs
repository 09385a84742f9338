use log::{debug, error, warn};
use murmur_session::{CaptureError, ConfigKey, ConfigStore, CredentialProvider, SpeechCredential};
use secrecy::{ExposeSecret, SecretString};

use crate::config::Config;
use crate::keychain;

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("Token service returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Token service returned an empty token")]
    EmptyToken,
}

pub fn token_url(region: &str) -> String {
    format!(
        "https://{}.api.cognitive.microsoft.com/sts/v1.0/issueToken",
        region
    )
}

/// Exchange a subscription key for a short-lived bearer token
pub fn issue_token(region: &str, key: &SecretString) -> Result<SecretString, TokenError> {
    let client = reqwest::blocking::Client::new();
    let response = client
        .post(token_url(region))
        .header("Ocp-Apim-Subscription-Key", key.expose_secret())
        .header(reqwest::header::CONTENT_LENGTH, "0")
        .send()?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().unwrap_or_default();
        error!("Token service error response ({}): {}", status, body);
        return Err(TokenError::Status {
            status: status.as_u16(),
            body,
        });
    }

    let token = response.text()?;
    if token.trim().is_empty() {
        return Err(TokenError::EmptyToken);
    }
    Ok(SecretString::from(token.trim().to_string()))
}

/// Fetches a fresh Azure speech token on every capture start
pub struct AzureTokenProvider {
    config: Config,
}

impl AzureTokenProvider {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    fn region(&self) -> Option<String> {
        let configured = self
            .config
            .get(&ConfigKey::SPEECH)
            .and_then(|speech| speech.region);
        configured
            .or_else(|| std::env::var(keychain::SPEECH_REGION_ENV).ok())
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty())
    }
}

impl CredentialProvider for AzureTokenProvider {
    fn fetch(&self) -> Result<SpeechCredential, CaptureError> {
        let key = keychain::resolve_speech_key().ok_or_else(|| {
            warn!("Speech key not configured");
            CaptureError::Unavailable("speech key not configured".to_string())
        })?;
        let region = self.region().ok_or_else(|| {
            warn!("Speech region not configured");
            CaptureError::Unavailable("speech region not configured".to_string())
        })?;

        debug!("Requesting speech token for region '{}'", region);
        let token = issue_token(&region, &key).map_err(|e| CaptureError::Credential(e.to_string()))?;

        Ok(SpeechCredential { token, region })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_url() {
        assert_eq!(
            token_url("westeurope"),
            "https://westeurope.api.cognitive.microsoft.com/sts/v1.0/issueToken"
        );
    }
}
