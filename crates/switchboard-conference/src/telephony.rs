use crate::error::ConferenceError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

fn default_api_base_url() -> String {
    "https://api.twilio.com".to_string()
}

/// Outbound operations the registry needs from the telephony provider.
#[async_trait]
pub trait TelephonyBackend: Send + Sync {
    /// Places a call from `from` to `to` that runs `twiml` when answered.
    /// Returns the new call leg id.
    async fn place_call(&self, from: &str, to: &str, twiml: &str)
        -> Result<String, ConferenceError>;

    /// Terminates a conference for every participant.
    async fn complete_conference(&self, conference_sid: &str) -> Result<(), ConferenceError>;

    /// Hangs up a single call leg.
    async fn hangup_call(&self, call_sid: &str) -> Result<(), ConferenceError>;
}

#[derive(Clone, Serialize, Deserialize)]
pub struct TwilioConfig {
    #[serde(default)]
    pub account_sid: String,
    #[serde(default, skip_serializing)]
    pub auth_token: String,
    /// Default caller id for outbound legs.
    #[serde(default)]
    pub phone_number: String,
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
}

impl Default for TwilioConfig {
    fn default() -> Self {
        Self {
            account_sid: String::new(),
            auth_token: String::new(),
            phone_number: String::new(),
            api_base_url: default_api_base_url(),
        }
    }
}

impl fmt::Debug for TwilioConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TwilioConfig")
            .field("account_sid", &self.account_sid)
            .field("auth_token", &"[REDACTED]")
            .field("phone_number", &self.phone_number)
            .field("api_base_url", &self.api_base_url)
            .finish()
    }
}

impl TwilioConfig {
    pub fn new(account_sid: impl Into<String>, auth_token: impl Into<String>) -> Self {
        Self {
            account_sid: account_sid.into(),
            auth_token: auth_token.into(),
            ..Self::default()
        }
    }
}

#[derive(Deserialize)]
struct CallResource {
    sid: String,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: Option<u64>,
    #[serde(default)]
    message: Option<String>,
}

/// Twilio REST implementation of [`TelephonyBackend`].
#[derive(Debug, Clone)]
pub struct TwilioClient {
    client: reqwest::Client,
    config: TwilioConfig,
}

impl TwilioClient {
    pub fn new(config: TwilioConfig) -> Result<Self, ConferenceError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self { client, config })
    }

    fn account_url(&self, resource: &str) -> String {
        format!(
            "{}/2010-04-01/Accounts/{}/{}",
            self.config.api_base_url.trim_end_matches('/'),
            self.config.account_sid,
            resource
        )
    }

    async fn post_form(
        &self,
        url: &str,
        form: &[(&str, &str)],
    ) -> Result<reqwest::Response, ConferenceError> {
        let response = self
            .client
            .post(url)
            .basic_auth(&self.config.account_sid, Some(&self.config.auth_token))
            .form(form)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let detail = match response.json::<ErrorBody>().await {
            Ok(ErrorBody {
                code: Some(code),
                message: Some(message),
            }) => format!("{} (code {})", message, code),
            Ok(ErrorBody {
                message: Some(message),
                ..
            }) => message,
            _ => status
                .canonical_reason()
                .unwrap_or("unknown error")
                .to_string(),
        };
        Err(ConferenceError::Telephony(format!(
            "HTTP {}: {}",
            status.as_u16(),
            detail
        )))
    }
}

#[async_trait]
impl TelephonyBackend for TwilioClient {
    async fn place_call(
        &self,
        from: &str,
        to: &str,
        twiml: &str,
    ) -> Result<String, ConferenceError> {
        let url = self.account_url("Calls.json");
        let response = self
            .post_form(&url, &[("From", from), ("To", to), ("Twiml", twiml)])
            .await?;
        let call: CallResource = response
            .json()
            .await
            .map_err(|e| ConferenceError::Telephony(format!("invalid call resource: {}", e)))?;
        Ok(call.sid)
    }

    async fn complete_conference(&self, conference_sid: &str) -> Result<(), ConferenceError> {
        let url = self.account_url(&format!("Conferences/{}.json", conference_sid));
        self.post_form(&url, &[("Status", "completed")]).await?;
        Ok(())
    }

    async fn hangup_call(&self, call_sid: &str) -> Result<(), ConferenceError> {
        let url = self.account_url(&format!("Calls/{}.json", call_sid));
        self.post_form(&url, &[("Status", "completed")]).await?;
        Ok(())
    }
}
