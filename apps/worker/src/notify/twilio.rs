use async_trait::async_trait;
use tracing::debug;

use super::{MAX_MESSAGE_LENGTH, Notifier, NotifyError};
use crate::monitoring::validation::PHONE_LENGTH;

pub const DEFAULT_API_BASE: &str = "https://api.twilio.com";

/// SMS delivery through the Twilio messages API
pub struct TwilioNotifier {
    client: reqwest::Client,
    api_base: String,
    account_sid: String,
    auth_token: String,
    from_phone: String,
    country_code: String,
}

impl TwilioNotifier {
    pub fn new(
        api_base: impl Into<String>,
        account_sid: impl Into<String>,
        auth_token: impl Into<String>,
        from_phone: impl Into<String>,
        country_code: impl Into<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
            account_sid: account_sid.into(),
            auth_token: auth_token.into(),
            from_phone: from_phone.into(),
            country_code: country_code.into(),
        }
    }

    fn messages_url(&self) -> String {
        format!("{}/2010-04-01/Accounts/{}/Messages.json", self.api_base, self.account_sid)
    }

    fn address(&self, number: &str) -> String {
        format!("{}{}", self.country_code, number)
    }
}

#[async_trait]
impl Notifier for TwilioNotifier {
    async fn send(&self, phone: &str, message: &str) -> Result<(), NotifyError> {
        let phone = phone.trim();
        if phone.chars().count() != PHONE_LENGTH {
            return Err(NotifyError::InvalidPhone(phone.to_string()));
        }
        let message = message.trim();
        if message.is_empty() {
            return Err(NotifyError::InvalidMessage("message is empty"));
        }
        if message.chars().count() > MAX_MESSAGE_LENGTH {
            return Err(NotifyError::InvalidMessage("message exceeds 1600 characters"));
        }

        let to = self.address(phone);
        let from = self.address(&self.from_phone);
        let form = [("From", from.as_str()), ("To", to.as_str()), ("Body", message)];

        let response = self
            .client
            .post(self.messages_url())
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NotifyError::Rejected { status: status.as_u16(), body });
        }

        debug!(%to, "SMS accepted by Twilio");
        Ok(())
    }
}
