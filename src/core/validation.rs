use serde::{Deserialize, Serialize};

pub const PHONE_MIN_DIGITS: usize = 10;
pub const PHONE_MAX_DIGITS: usize = 15;
pub const NAME_MIN_CHARS: usize = 2;
pub const USERNAME_MIN_CHARS: usize = 3;

/// Field checks fed into the risk scorer. `true` means the field looks fine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldValidity {
    pub phone_valid: bool,
    pub name_valid: bool,
    pub username_valid: bool,
}

impl Default for FieldValidity {
    fn default() -> Self {
        Self {
            phone_valid: true,
            name_valid: true,
            username_valid: true,
        }
    }
}

impl FieldValidity {
    pub fn check(name: &str, phone_number: &str, username: Option<&str>) -> Self {
        Self {
            phone_valid: is_valid_phone(phone_number),
            name_valid: is_valid_name(name),
            username_valid: username.is_none_or(is_valid_username),
        }
    }
}

/// Digits only, so "+375 (33) 901-59-15" and "375339015915" compare equal.
pub fn normalize_phone(phone_number: &str) -> String {
    phone_number.chars().filter(char::is_ascii_digit).collect()
}

pub fn is_valid_phone(phone_number: &str) -> bool {
    let digits = phone_number.chars().filter(char::is_ascii_digit).count();
    (PHONE_MIN_DIGITS..=PHONE_MAX_DIGITS).contains(&digits)
}

pub fn is_valid_name(name: &str) -> bool {
    name.trim().chars().count() >= NAME_MIN_CHARS
}

/// An empty username counts as "not given".
pub fn is_valid_username(username: &str) -> bool {
    let trimmed = username.trim().trim_start_matches('@');
    trimmed.is_empty() || trimmed.chars().count() >= USERNAME_MIN_CHARS
}
