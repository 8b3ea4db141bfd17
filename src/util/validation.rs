use chrono::{NaiveDate, Utc};

use crate::error::FieldErrors;

pub fn require_text(errors: &mut FieldErrors, field: &str, value: &str) {
    if value.trim().is_empty() {
        errors.add(field, "is required");
    }
}

pub fn check_length(errors: &mut FieldErrors, field: &str, value: &str, max: usize) {
    if value.chars().count() > max {
        errors.add(field, format!("must be at most {max} characters"));
    }
}

/// Loose shape check; real verification happens when mail bounces.
pub fn is_email(value: &str) -> bool {
    let Some((local, domain)) = value.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.is_empty()
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !value.chars().any(char::is_whitespace)
}

pub fn check_email(errors: &mut FieldErrors, field: &str, value: Option<&str>) {
    if let Some(value) = value {
        if !is_email(value) {
            errors.add(field, "is not a valid email address");
        }
    }
}

pub fn check_not_future(errors: &mut FieldErrors, field: &str, value: Option<NaiveDate>) {
    if let Some(date) = value {
        if date > Utc::now().date_naive() {
            errors.add(field, "cannot be in the future");
        }
    }
}

pub fn normalize_email(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_lowercase())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_shapes() {
        assert!(is_email("ruth@example.org"));
        assert!(!is_email("ruth@example"));
        assert!(!is_email("@example.org"));
        assert!(!is_email("ruth example@example.org"));
        assert!(!is_email("ruth@.org"));
    }

    #[test]
    fn future_birth_dates_are_rejected() {
        let mut errors = FieldErrors::new();
        let tomorrow = Utc::now().date_naive().succ_opt();
        check_not_future(&mut errors, "birth_date", tomorrow);
        assert!(errors.get("birth_date").is_some());
    }
}
