use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

pub type ValidationResult<T> = Result<T, ValidationError>;

pub const MIN_PASSWORD_LEN: usize = 8;

/// Trims the value and checks its length in characters.
pub fn bounded_text(
    field: &'static str,
    value: &str,
    min: usize,
    max: usize,
) -> ValidationResult<String> {
    let trimmed = value.trim();
    let len = trimmed.chars().count();
    if len < min {
        return Err(if min <= 1 {
            ValidationError::new(field, "is required")
        } else {
            ValidationError::new(field, format!("must be at least {min} characters"))
        });
    }
    if len > max {
        return Err(ValidationError::new(
            field,
            format!("must be at most {max} characters"),
        ));
    }
    Ok(trimmed.to_string())
}

/// Optional free text: blank collapses to `None`.
pub fn optional_text(
    field: &'static str,
    value: Option<&str>,
    max: usize,
) -> ValidationResult<Option<String>> {
    match value.map(str::trim).filter(|value| !value.is_empty()) {
        Some(value) => bounded_text(field, value, 1, max).map(Some),
        None => Ok(None),
    }
}

pub fn normalize_email(value: &str) -> ValidationResult<String> {
    let email = value.trim().to_lowercase();
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.chars().any(char::is_whitespace)
        }
        None => false,
    };
    if !valid || email.len() > 254 {
        return Err(ValidationError::new("email", "must be a valid email address"));
    }
    Ok(email)
}

pub fn validate_password(value: &str) -> ValidationResult<()> {
    if value.chars().count() < MIN_PASSWORD_LEN {
        return Err(ValidationError::new(
            "password",
            format!("must be at least {MIN_PASSWORD_LEN} characters"),
        ));
    }
    if value.len() > 1024 {
        return Err(ValidationError::new("password", "is too long"));
    }
    Ok(())
}

pub fn normalize_currency(value: Option<&str>) -> ValidationResult<String> {
    let currency = value
        .map(|value| value.trim().to_ascii_uppercase())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| "USD".to_string());
    if currency.len() != 3 || !currency.chars().all(|ch| ch.is_ascii_uppercase()) {
        return Err(ValidationError::new(
            "currency",
            "must be a three-letter currency code",
        ));
    }
    Ok(currency)
}

/// Budget amounts are minor currency units.
pub fn validate_budget(min: Option<i64>, max: Option<i64>) -> ValidationResult<()> {
    if min.is_some_and(|value| value < 0) {
        return Err(ValidationError::new("budget_min", "must not be negative"));
    }
    if max.is_some_and(|value| value < 0) {
        return Err(ValidationError::new("budget_max", "must not be negative"));
    }
    if let (Some(min), Some(max)) = (min, max) {
        if min > max {
            return Err(ValidationError::new(
                "budget_max",
                "must be greater than or equal to budget_min",
            ));
        }
    }
    Ok(())
}

/// Lowercase ASCII slug: alphanumeric runs joined by `-`.
pub fn slugify(value: &str) -> String {
    let mut slug = String::with_capacity(value.len());
    let mut pending_dash = false;
    for ch in value.chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(ch.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }
    slug
}

/// Escapes `%`, `_` and `\\` for use inside a LIKE/ILIKE pattern.
pub fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        if matches!(ch, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounded_text_trims_and_checks_length() {
        assert_eq!(bounded_text("title", "  Fix sink  ", 3, 120).unwrap(), "Fix sink");
        assert_eq!(
            bounded_text("title", "ab", 3, 120).unwrap_err().message,
            "must be at least 3 characters"
        );
        assert_eq!(
            bounded_text("body", "   ", 1, 10).unwrap_err().message,
            "is required"
        );
        assert!(bounded_text("title", &"x".repeat(121), 3, 120).is_err());
    }

    #[test]
    fn optional_text_maps_blank_to_none() {
        assert_eq!(optional_text("bio", Some("   "), 10).unwrap(), None);
        assert_eq!(optional_text("bio", None, 10).unwrap(), None);
        assert_eq!(
            optional_text("bio", Some(" hi "), 10).unwrap().as_deref(),
            Some("hi")
        );
    }

    #[test]
    fn emails_are_lowercased_and_checked() {
        assert_eq!(normalize_email(" Ana@Example.COM ").unwrap(), "ana@example.com");
        assert!(normalize_email("no-at-sign").is_err());
        assert!(normalize_email("a@nodot").is_err());
        assert!(normalize_email("@example.com").is_err());
        assert!(normalize_email("a b@example.com").is_err());
    }

    #[test]
    fn password_minimum_length() {
        assert!(validate_password("short").is_err());
        assert!(validate_password("long enough").is_ok());
    }

    #[test]
    fn currency_defaults_and_normalises() {
        assert_eq!(normalize_currency(None).unwrap(), "USD");
        assert_eq!(normalize_currency(Some("eur")).unwrap(), "EUR");
        assert!(normalize_currency(Some("EURO")).is_err());
        assert!(normalize_currency(Some("E1R")).is_err());
    }

    #[test]
    fn budget_bounds() {
        assert!(validate_budget(None, None).is_ok());
        assert!(validate_budget(Some(100), Some(100)).is_ok());
        assert_eq!(
            validate_budget(Some(200), Some(100)).unwrap_err().field,
            "budget_max"
        );
        assert_eq!(validate_budget(Some(-1), None).unwrap_err().field, "budget_min");
    }

    #[test]
    fn slugify_collapses_separators() {
        assert_eq!(slugify("Home & Garden"), "home-garden");
        assert_eq!(slugify("  Web  Design!! "), "web-design");
        assert_eq!(slugify("C++ / Rust"), "c-rust");
    }

    #[test]
    fn like_patterns_escape_wildcards() {
        assert_eq!(escape_like("50%_off\\"), "50\\%\\_off\\\\");
        assert_eq!(escape_like("plain"), "plain");
    }
}
