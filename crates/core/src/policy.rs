//! Password policy (C10): complexity validation and strength classification.

use crate::error::{Result, WardError};

#[derive(Clone, Debug)]
pub struct PasswordPolicy {
    pub min_length: usize,
    pub require_upper: bool,
    pub require_lower: bool,
    pub require_digit: bool,
    pub require_symbol: bool,
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self {
            min_length: 12,
            require_upper: true,
            require_lower: true,
            require_digit: true,
            require_symbol: true,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Strength {
    Weak,
    Medium,
    Strong,
}

impl PasswordPolicy {
    /// Validates `password`, returning the first unmet requirement as a
    /// structured [`WardError::PolicyViolation`] so callers can tell the user
    /// specifically what's missing rather than a generic rejection.
    pub fn validate(&self, password: &str) -> Result<()> {
        if password.chars().count() < self.min_length {
            return Err(WardError::PolicyViolation(format!(
                "password must be at least {} characters",
                self.min_length
            )));
        }
        if self.require_upper && !password.chars().any(|c| c.is_ascii_uppercase()) {
            return Err(WardError::PolicyViolation("password must contain an uppercase letter".into()));
        }
        if self.require_lower && !password.chars().any(|c| c.is_ascii_lowercase()) {
            return Err(WardError::PolicyViolation("password must contain a lowercase letter".into()));
        }
        if self.require_digit && !password.chars().any(|c| c.is_ascii_digit()) {
            return Err(WardError::PolicyViolation("password must contain a digit".into()));
        }
        if self.require_symbol && !password.chars().any(|c| !c.is_ascii_alphanumeric()) {
            return Err(WardError::PolicyViolation("password must contain a symbol".into()));
        }
        Ok(())
    }

    /// Classifies password strength independent of policy pass/fail, so the
    /// front end can show a meter even for a password that fails policy.
    #[must_use]
    pub fn strength(&self, password: &str) -> Strength {
        let len = password.chars().count();
        let classes = [
            password.chars().any(|c| c.is_ascii_uppercase()),
            password.chars().any(|c| c.is_ascii_lowercase()),
            password.chars().any(|c| c.is_ascii_digit()),
            password.chars().any(|c| !c.is_ascii_alphanumeric()),
        ]
        .into_iter()
        .filter(|&present| present)
        .count();

        if len >= 16 && classes >= 3 {
            Strength::Strong
        } else if len >= 12 && classes >= 2 {
            Strength::Medium
        } else {
            Strength::Weak
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_short_password() {
        let policy = PasswordPolicy::default();
        assert!(policy.validate("Sh0rt!").is_err());
    }

    #[test]
    fn rejects_missing_classes() {
        let policy = PasswordPolicy::default();
        assert!(policy.validate("alllowercase123").is_err());
        assert!(policy.validate("ALLUPPERCASE123").is_err());
        assert!(policy.validate("NoDigitsHereAtAll!").is_err());
        assert!(policy.validate("NoSymbolsHere1234").is_err());
    }

    #[test]
    fn accepts_compliant_password() {
        let policy = PasswordPolicy::default();
        assert!(policy.validate("CorrectHorse42!").is_ok());
    }

    #[test]
    fn strength_classifies_weak_medium_strong() {
        let policy = PasswordPolicy::default();
        assert_eq!(policy.strength("short"), Strength::Weak);
        assert_eq!(policy.strength("mediumpassword1"), Strength::Medium);
        assert_eq!(policy.strength("VeryStrongPassword42!"), Strength::Strong);
    }
}
