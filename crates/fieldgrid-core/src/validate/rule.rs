use serde::{Deserialize, Serialize};

///
/// RuleKind
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RuleKind {
    /// The value must not be null or blank text.
    Required,
    /// The value's text rendering must match the regex.
    Pattern { pattern: String },
    /// Inclusive bounds, written as literals of the field's type.
    Range {
        min: Option<String>,
        max: Option<String>,
    },
    /// The value must equal one of the listed literals.
    OneOf { options: Vec<String> },
}

impl RuleKind {
    // An empty constraint carries no check.
    fn is_empty(&self) -> bool {
        let blank = |text: &str| text.trim().is_empty();

        match self {
            Self::Required => false,
            Self::Pattern { pattern } => blank(pattern),
            Self::Range { min, max } => {
                min.as_deref().is_none_or(blank) && max.as_deref().is_none_or(blank)
            }
            Self::OneOf { options } => options.iter().all(|option| blank(option)),
        }
    }
}

///
/// ValidationRule
///
/// One user-authored rule on a field id. `message` replaces the generated
/// text when set.
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ValidationRule {
    pub field: String,
    #[serde(flatten)]
    pub kind: RuleKind,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default = "enabled")]
    pub enabled: bool,
}

const fn enabled() -> bool {
    true
}

impl ValidationRule {
    #[must_use]
    pub fn new(field: impl Into<String>, kind: RuleKind) -> Self {
        Self {
            field: field.into(),
            kind,
            message: None,
            enabled: true,
        }
    }

    #[must_use]
    pub fn required(field: impl Into<String>) -> Self {
        Self::new(field, RuleKind::Required)
    }

    #[must_use]
    pub fn pattern(field: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self::new(
            field,
            RuleKind::Pattern {
                pattern: pattern.into(),
            },
        )
    }

    #[must_use]
    pub fn range(field: impl Into<String>, min: Option<&str>, max: Option<&str>) -> Self {
        Self::new(
            field,
            RuleKind::Range {
                min: min.map(str::to_string),
                max: max.map(str::to_string),
            },
        )
    }

    #[must_use]
    pub fn one_of<S: AsRef<str>>(field: impl Into<String>, options: &[S]) -> Self {
        Self::new(
            field,
            RuleKind::OneOf {
                options: options.iter().map(|o| o.as_ref().to_string()).collect(),
            },
        )
    }

    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    #[must_use]
    pub const fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Enabled and carrying a non-empty constraint.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.enabled && !self.kind.is_empty()
    }
}
