use std::sync::LazyLock;

use regex::Regex;
use soyokaze_common::{Error, Result};

/// Upper bound on images attached to one journal entry.
pub const MAX_IMAGES_PER_ENTRY: usize = 4;

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email pattern is valid")
});

/// Field checks applied before rows are written.
pub struct InputValidator;

impl InputValidator {
    pub fn require_non_empty(field: &str, value: &str) -> Result<()> {
        if value.trim().is_empty() {
            return Err(Error::Validation(format!("{field} is required")));
        }
        Ok(())
    }

    pub fn validate_email(email: &str) -> Result<()> {
        if !EMAIL_RE.is_match(email) {
            return Err(Error::Validation(format!("invalid email format: {email}")));
        }
        Ok(())
    }

    pub fn validate_url(url: &str) -> Result<()> {
        url::Url::parse(url)
            .map(|_| ())
            .map_err(|e| Error::Validation(format!("invalid URL {url}: {e}")))
    }

    pub fn validate_images(images: &[String]) -> Result<()> {
        if images.len() > MAX_IMAGES_PER_ENTRY {
            return Err(Error::Validation(format!(
                "maximum {MAX_IMAGES_PER_ENTRY} images allowed, got {}",
                images.len()
            )));
        }
        Ok(())
    }
}
