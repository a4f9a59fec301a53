mod stdout;
mod telegram;

use std::path::Path;
use std::sync::Arc;

pub use stdout::StdoutDelivery;
pub use telegram::{TelegramDelivery, DEFAULT_TELEGRAM_API_BASE};

#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("delivery rejected: {0}")]
    Rejected(String),
}

/// Sends user-visible messages, optionally with an image attached.
pub trait Delivery: Send + Sync {
    fn send(&self, message: &str, image: Option<&Path>) -> Result<(), DeliveryError>;
}

impl<D: Delivery + ?Sized> Delivery for Box<D> {
    fn send(&self, message: &str, image: Option<&Path>) -> Result<(), DeliveryError> {
        (**self).send(message, image)
    }
}

impl<D: Delivery + ?Sized> Delivery for Arc<D> {
    fn send(&self, message: &str, image: Option<&Path>) -> Result<(), DeliveryError> {
        (**self).send(message, image)
    }
}
