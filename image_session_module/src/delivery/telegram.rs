use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

use super::{Delivery, DeliveryError};

pub const DEFAULT_TELEGRAM_API_BASE: &str = "https://api.telegram.org";

/// Delivers to one Telegram chat through the Bot API.
#[derive(Debug, Clone)]
pub struct TelegramDelivery {
    pub bot_token: String,
    pub chat_id: String,
    pub api_base: String,
}

#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    chat_id: &'a str,
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct TelegramApiResponse {
    ok: bool,
    description: Option<String>,
}

impl TelegramDelivery {
    pub fn new(bot_token: impl Into<String>, chat_id: impl Into<String>) -> Self {
        Self {
            bot_token: bot_token.into(),
            chat_id: chat_id.into(),
            api_base: DEFAULT_TELEGRAM_API_BASE.to_string(),
        }
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    fn api_url(&self, method: &str) -> String {
        format!(
            "{}/bot{}/{}",
            self.api_base.trim_end_matches('/'),
            self.bot_token,
            method
        )
    }

    fn check(response: reqwest::blocking::Response) -> Result<(), DeliveryError> {
        let api_response: TelegramApiResponse = response.json()?;
        if api_response.ok {
            Ok(())
        } else {
            Err(DeliveryError::Rejected(
                api_response
                    .description
                    .unwrap_or_else(|| "Unknown error".to_string()),
            ))
        }
    }
}

impl Delivery for TelegramDelivery {
    fn send(&self, message: &str, image: Option<&Path>) -> Result<(), DeliveryError> {
        let client = reqwest::blocking::Client::new();
        let response = match image {
            Some(image) => {
                let form = reqwest::blocking::multipart::Form::new()
                    .text("chat_id", self.chat_id.clone())
                    .text("caption", message.to_string())
                    .file("photo", image)?;
                client
                    .post(self.api_url("sendPhoto"))
                    .multipart(form)
                    .send()?
            }
            None => client
                .post(self.api_url("sendMessage"))
                .json(&SendMessageRequest {
                    chat_id: &self.chat_id,
                    text: message,
                })
                .send()?,
        };
        Self::check(response)?;
        info!(
            "telegram delivery to chat {} succeeded (image: {})",
            self.chat_id,
            image.is_some()
        );
        Ok(())
    }
}
