use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DatePatternError {
    #[error("malformed date pattern '{pattern}'")]
    Malformed { pattern: String },
    #[error("date pattern '{pattern}' cannot render a calendar date")]
    NotADate { pattern: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EligibilityError {
    #[error("volunteer '{volunteer}' lacks roles required by shift '{shift}': {}", .missing.join(", "))]
    MissingRoles {
        volunteer: String,
        shift: String,
        missing: Vec<String>,
    },
    #[error("volunteer '{volunteer}' is inactive")]
    Inactive { volunteer: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AssignError {
    #[error("shift index {index} out of range for {len} shifts")]
    ShiftOutOfRange { index: usize, len: usize },
    #[error("unknown event property '{name}'")]
    UnknownProperty { name: String },
    #[error(transparent)]
    Ineligible(#[from] EligibilityError),
}
