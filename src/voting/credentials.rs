// Validation of what the user types, before anything reaches the session.

use snafu::prelude::*;

#[derive(Debug, Snafu, PartialEq, Eq)]
pub enum ValidationError {
    #[snafu(display("Name must be at least 2 characters"))]
    NameTooShort {},
    #[snafu(display("PIN must be exactly 4 digits"))]
    PinLength {},
    #[snafu(display("PIN must contain only digits"))]
    PinDigits {},
}

/// A display name, trimmed.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct ProfileName(String);

impl ProfileName {
    pub fn parse(s: &str) -> Result<ProfileName, ValidationError> {
        let name = s.trim();
        ensure!(name.chars().count() >= 2, NameTooShortSnafu);
        Ok(ProfileName(name.to_string()))
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

/// A 4-digit PIN.
#[derive(Eq, PartialEq, Clone)]
pub struct Pin(String);

impl Pin {
    pub fn parse(s: &str) -> Result<Pin, ValidationError> {
        ensure!(s.chars().count() == 4, PinLengthSnafu);
        ensure!(s.chars().all(|c| c.is_ascii_digit()), PinDigitsSnafu);
        Ok(Pin(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

// Keeps PINs out of the logs.
impl std::fmt::Debug for Pin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Pin(****)")
    }
}

/// Whether the user asks for a new profile or for an existing one.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum Mode {
    Register,
    Login,
}

/// The reasons a profile can be refused. These are expected outcomes, the
/// user retries with other input.
#[derive(Eq, PartialEq, Debug, Clone)]
pub enum CredentialError {
    NameNotFound { name: String },
    InvalidPin { name: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_trimmed() {
        assert_eq!(ProfileName::parse("  Brave-Otter ").unwrap().as_str(), "Brave-Otter");
        assert_eq!(ProfileName::parse(" x "), Err(ValidationError::NameTooShort {}));
        assert_eq!(ProfileName::parse(""), Err(ValidationError::NameTooShort {}));
    }

    #[test]
    fn pins() {
        assert_eq!(Pin::parse("0421").unwrap().as_str(), "0421");
        assert_eq!(Pin::parse("123"), Err(ValidationError::PinLength {}));
        assert_eq!(Pin::parse("12345"), Err(ValidationError::PinLength {}));
        assert_eq!(Pin::parse("12a4"), Err(ValidationError::PinDigits {}));
        assert_eq!(format!("{:?}", Pin::parse("1234").unwrap()), "Pin(****)");
    }
}
