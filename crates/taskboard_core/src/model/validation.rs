//! Field rules shared by boards, columns and tasks.

use std::error::Error;
use std::fmt::{Display, Formatter};

/// Maximum task title length, counted in characters.
pub const TASK_TITLE_MAX_CHARS: usize = 18;

/// Validation failures for user-supplied fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Title is blank after trim.
    BlankTitle,
    /// Title exceeds the allowed character count.
    TitleTooLong { max: usize, actual: usize },
    /// Task description is blank after trim.
    BlankDescription,
    /// Field cannot be set on this kind of item.
    FieldNotApplicable(&'static str),
}

impl Display for ValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BlankTitle => write!(f, "title must not be blank"),
            Self::TitleTooLong { max, actual } => {
                write!(f, "title has {actual} characters; at most {max} allowed")
            }
            Self::BlankDescription => write!(f, "description must not be blank"),
            Self::FieldNotApplicable(field) => {
                write!(f, "field `{field}` does not apply to this item")
            }
        }
    }
}

impl Error for ValidationError {}

/// Trims a title and rejects blank values.
pub fn normalize_title(value: &str) -> Result<String, ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::BlankTitle);
    }
    Ok(trimmed.to_string())
}

/// Trims a task title, rejecting blank and over-long values.
pub fn normalize_task_title(value: &str) -> Result<String, ValidationError> {
    let title = normalize_title(value)?;
    let actual = title.chars().count();
    if actual > TASK_TITLE_MAX_CHARS {
        return Err(ValidationError::TitleTooLong {
            max: TASK_TITLE_MAX_CHARS,
            actual,
        });
    }
    Ok(title)
}

/// Trims a task description and rejects blank values.
pub fn normalize_description(value: &str) -> Result<String, ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::BlankDescription);
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::{normalize_task_title, normalize_title, ValidationError, TASK_TITLE_MAX_CHARS};

    #[test]
    fn normalize_title_trims_and_rejects_blank() {
        assert_eq!(normalize_title("  Todo ").unwrap(), "Todo");
        assert_eq!(normalize_title(" \t").unwrap_err(), ValidationError::BlankTitle);
    }

    #[test]
    fn task_title_limit_counts_characters_not_bytes() {
        let exact = "é".repeat(TASK_TITLE_MAX_CHARS);
        assert_eq!(normalize_task_title(&exact).unwrap(), exact);

        let err = normalize_task_title(&"x".repeat(TASK_TITLE_MAX_CHARS + 1)).unwrap_err();
        assert_eq!(
            err,
            ValidationError::TitleTooLong {
                max: TASK_TITLE_MAX_CHARS,
                actual: TASK_TITLE_MAX_CHARS + 1
            }
        );
    }
}
