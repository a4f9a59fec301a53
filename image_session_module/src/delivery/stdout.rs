use std::io::Write;
use std::path::Path;

use super::{Delivery, DeliveryError};

/// Writes messages to stdout for the agent runtime, with a `MEDIA:` line per
/// attached image.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdoutDelivery;

impl Delivery for StdoutDelivery {
    fn send(&self, message: &str, image: Option<&Path>) -> Result<(), DeliveryError> {
        let stdout = std::io::stdout();
        let mut out = stdout.lock();
        writeln!(out, "{}", message)?;
        if let Some(image) = image {
            let absolute = std::path::absolute(image)?;
            writeln!(out, "MEDIA:{}", absolute.display())?;
        }
        out.flush()?;
        Ok(())
    }
}
