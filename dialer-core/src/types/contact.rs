//! Contact records and phone-number normalization.

use serde::{Deserialize, Serialize};

use super::ids::{ContactId, OwnerId};

/// A contact that can be enrolled in campaigns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contact {
    /// Contact unique identifier.
    pub id: ContactId,

    /// Owning tenant.
    pub owner_id: OwnerId,

    /// Display name.
    pub name: String,

    /// Email address, if known.
    pub email: Option<String>,

    /// Raw phone number as entered. Normalized at dispatch time.
    pub phone: Option<String>,
}

impl Contact {
    /// Create a new contact.
    pub fn new(owner_id: OwnerId, name: impl Into<String>) -> Self {
        Self {
            id: ContactId::generate(),
            owner_id,
            name: name.into(),
            email: None,
            phone: None,
        }
    }

    /// The contact's phone number normalized to E.164, if usable.
    pub fn usable_phone(&self) -> Option<String> {
        self.phone.as_deref().and_then(normalize_phone)
    }

    /// First word of the display name, for script personalization.
    pub fn first_name(&self) -> &str {
        self.name.split_whitespace().next().unwrap_or(&self.name)
    }
}

/// Normalize a raw phone number to E.164.
///
/// Accepts `+` followed by 8-15 digits, bare 10-digit national numbers
/// (promoted with a `+1` prefix), and 11-digit numbers starting with `1`.
/// Common separators are stripped first. Everything else is rejected.
pub fn normalize_phone(raw: &str) -> Option<String> {
    let cleaned: String = raw
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '(' | ')' | '.'))
        .collect();

    let (has_plus, digits) = match cleaned.strip_prefix('+') {
        Some(rest) => (true, rest),
        None => (false, cleaned.as_str()),
    };

    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }

    if has_plus {
        if (8..=15).contains(&digits.len()) {
            Some(format!("+{digits}"))
        } else {
            None
        }
    } else if digits.len() == 10 {
        Some(format!("+1{digits}"))
    } else if digits.len() == 11 && digits.starts_with('1') {
        Some(format!("+{digits}"))
    } else {
        None
    }
}
