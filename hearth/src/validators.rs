use email_address::EmailAddress;
use url::Url;

use crate::errors::{ValidationError, ValidationIssue, ValidationResult};

/// Hangul filler the post editor uses as a visible blank; never part of real content.
const FILLER: char = '\u{3164}';

/// Returns `true` if the provided string is a syntactically valid email address.
pub fn is_valid_email(value: &str) -> bool {
    EmailAddress::is_valid(value)
}

/// Returns `true` if the provided string parses as a URL with a scheme.
pub fn is_valid_url(value: &str) -> bool {
    Url::parse(value).is_ok()
}

/// Strips filler characters and surrounding whitespace from user-entered text.
pub fn normalize_content(content: &str) -> String {
    content.replace(FILLER, "").trim().to_string()
}

/// Normalizes post text; an empty post is only accepted when it carries images.
pub fn validate_post_content(content: &str, images: &[String]) -> ValidationResult<String> {
    let normalized = normalize_content(content);
    let mut issues = Vec::new();
    if normalized.is_empty() && images.is_empty() {
        issues.push(ValidationIssue::new(
            "content",
            "validation.empty",
            "a post needs text or at least one image",
        ));
    }
    for (index, image) in images.iter().enumerate() {
        if !is_valid_url(image) {
            issues.push(ValidationIssue::new(
                format!("images[{index}]"),
                "validation.url",
                "image must be a valid URL",
            ));
        }
    }
    if issues.is_empty() {
        Ok(normalized)
    } else {
        Err(ValidationError::new(issues))
    }
}

pub fn validate_comment_content(content: &str) -> ValidationResult<String> {
    let normalized = normalize_content(content);
    if normalized.is_empty() {
        return Err(ValidationError::single(
            "content",
            "validation.empty",
            "a comment must not be empty",
        ));
    }
    Ok(normalized)
}
