// ============================
// crates/backend-lib/src/validation/mod.rs
// ============================
//! Boundary validation for inbound event fields.
//!
//! Every helper returns the cleaned value so callers never touch the raw
//! input again.

use regex::Regex;
use std::sync::LazyLock;
use uuid::Uuid;

use crate::error::AppError;
use parley_common::ROOM_PREFIX;

const MAX_USER_ID_LENGTH: usize = 64;
/// Longest accepted message body, in characters, after trimming
pub const MAX_BODY_LENGTH: usize = 4000;

// `_` separates the pair inside a room id, so user ids never contain it
static USER_ID_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9-]{1,64}$").expect("valid user id regex"));
static ROOM_ID_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^room_[A-Za-z0-9-]{1,64}_[A-Za-z0-9-]{1,64}$").expect("valid room id regex")
});

/// Whether `user_id` can take part in a room id
pub fn is_valid_user_id(user_id: &str) -> bool {
    user_id.len() <= MAX_USER_ID_LENGTH && USER_ID_REGEX.is_match(user_id)
}

/// Validate the counterpart id of a `startChat`
pub fn validate_user_id(user_id: &str) -> Result<&str, AppError> {
    let user_id = user_id.trim();
    if user_id.is_empty() {
        return Err(AppError::Validation("Valid user ID is required to start a chat.".into()));
    }
    if !is_valid_user_id(user_id) {
        return Err(AppError::Validation(format!("Invalid user ID: {user_id}")));
    }
    Ok(user_id)
}

/// Validate a room id named by an inbound event
pub fn validate_room_id(room_id: &str) -> Result<&str, AppError> {
    let room_id = room_id.trim();
    if room_id.is_empty() {
        return Err(AppError::Validation(
            "Chat ID is required and must be a non-empty string".into(),
        ));
    }
    if !room_id.starts_with(ROOM_PREFIX) || !ROOM_ID_REGEX.is_match(room_id) {
        return Err(AppError::Validation(format!("Invalid room ID: {room_id}")));
    }
    Ok(room_id)
}

/// Trim a message body and reject empty or oversized ones.
///
/// `field` names the body in the rejection ("Message", "New message").
pub fn validate_body<'a>(body: &'a str, field: &str) -> Result<&'a str, AppError> {
    let body = body.trim();
    if body.is_empty() {
        return Err(AppError::Validation(format!(
            "{field} is required and must be a non-empty string"
        )));
    }
    if body.chars().count() > MAX_BODY_LENGTH {
        return Err(AppError::Validation(format!(
            "{field} cannot exceed {MAX_BODY_LENGTH} characters"
        )));
    }
    Ok(body)
}

/// Parse a message id; anything but a UUID is `InvalidId`
pub fn parse_message_id(message_id: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(message_id.trim())
        .map_err(|_| AppError::InvalidId("Invalid message ID".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_user_id() {
        assert_eq!(validate_user_id(" u2 ").unwrap(), "u2");
        assert!(validate_user_id("user-42x").is_ok());

        assert!(matches!(validate_user_id("   "), Err(AppError::Validation(_))));
        assert!(matches!(validate_user_id("b_c"), Err(AppError::Validation(_))));
        assert!(matches!(validate_user_id("../u1"), Err(AppError::Validation(_))));
        assert!(matches!(
            validate_user_id(&"a".repeat(65)),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn test_validate_room_id() {
        assert_eq!(validate_room_id("room_u1_u2").unwrap(), "room_u1_u2");

        assert!(matches!(validate_room_id(""), Err(AppError::Validation(_))));
        assert!(matches!(validate_room_id("lobby"), Err(AppError::Validation(_))));
        // one pair, one spelling
        assert!(matches!(validate_room_id("room_a_b_c"), Err(AppError::Validation(_))));
        assert!(matches!(
            validate_room_id("room_../u1_u2"),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn test_validate_body() {
        assert_eq!(validate_body("  hi  ", "Message").unwrap(), "hi");
        match validate_body(" \n\t ", "New message") {
            Err(AppError::Validation(reason)) => {
                assert_eq!(reason, "New message is required and must be a non-empty string");
            },
            other => panic!("unexpected result {other:?}"),
        }

        let longest = "é".repeat(MAX_BODY_LENGTH);
        assert!(validate_body(&longest, "Message").is_ok());
        assert!(validate_body(&format!("{longest}x"), "Message").is_err());
    }

    #[test]
    fn test_parse_message_id() {
        let id = Uuid::new_v4();
        assert_eq!(parse_message_id(&id.to_string()).unwrap(), id);
        assert!(matches!(parse_message_id("42"), Err(AppError::InvalidId(_))));
    }
}
