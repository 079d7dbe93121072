//! Module: query::operator
//! Responsibility: the operator table: codes, applicability and SQL shape.
//! Does not own: binding literals or wrapping native/custom access (see
//! `query::compile`).

use crate::value::TypeFamily;
use std::collections::BTreeMap;
use thiserror::Error as ThisError;

const ALL_FAMILIES: &[TypeFamily] = &[
    TypeFamily::Textual,
    TypeFamily::Numeric,
    TypeFamily::Temporal,
    TypeFamily::Boolean,
];
const TEXT_LIKE: &[TypeFamily] = &[TypeFamily::Textual, TypeFamily::Numeric];
const ORDERED: &[TypeFamily] = &[TypeFamily::Numeric, TypeFamily::Temporal];
const TEXTUAL: &[TypeFamily] = &[TypeFamily::Textual];

///
/// Comparison
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Comparison {
    Greater,
    Less,
    GreaterOrEqual,
    LessOrEqual,
}

impl Comparison {
    #[must_use]
    pub const fn sql(self) -> &'static str {
        match self {
            Self::Greater => ">",
            Self::Less => "<",
            Self::GreaterOrEqual => ">=",
            Self::LessOrEqual => "<=",
        }
    }
}

///
/// OperatorKind
///
/// Positive SQL form of an operator. Negation is applied separately so the
/// same form serves `eq`/`nq`, `co`/`nc` and so on.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum OperatorKind {
    Equals,
    StartsWith,
    EndsWith,
    Contains,
    Compare(Comparison),
    Regex,
    /// Non-null, and non-empty for textual types. `null` is its negation.
    Present,
    InList,
    /// Caller-supplied SQL with a `{column}` placeholder and one `?`.
    Template(String),
}

impl OperatorKind {
    /// Whether the operator reads the criterion's literal.
    #[must_use]
    pub const fn takes_value(&self) -> bool {
        !matches!(self, Self::Present)
    }
}

///
/// OperatorSpec
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct OperatorSpec {
    pub code: String,
    pub label: String,
    pub kind: OperatorKind,
    pub negated: bool,
    pub families: Vec<TypeFamily>,
}

impl OperatorSpec {
    #[must_use]
    pub fn new(code: &str, label: &str, kind: OperatorKind, families: &[TypeFamily]) -> Self {
        Self {
            code: code.to_string(),
            label: label.to_string(),
            kind,
            negated: false,
            families: families.to_vec(),
        }
    }

    #[must_use]
    pub const fn negate(mut self) -> Self {
        self.negated = !self.negated;
        self
    }

    /// A registered operator backed by an SQL template.
    #[must_use]
    pub fn template(code: &str, label: &str, sql: &str, families: &[TypeFamily]) -> Self {
        Self::new(code, label, OperatorKind::Template(sql.to_string()), families)
    }

    #[must_use]
    pub fn applies_to(&self, family: TypeFamily) -> bool {
        self.families.contains(&family)
    }
}

///
/// OperatorError
///

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
pub enum OperatorError {
    #[error("operator code '{0}' is already registered")]
    Duplicate(String),

    #[error("template for operator '{code}' must contain '{{column}}' and exactly one '?'")]
    BadTemplate { code: String },
}

///
/// OperatorTable
///

#[derive(Clone, Debug)]
pub struct OperatorTable {
    operators: BTreeMap<String, OperatorSpec>,
}

impl OperatorTable {
    /// Table with the built-in operators.
    #[must_use]
    pub fn builtin() -> Self {
        use Comparison::{Greater, GreaterOrEqual, Less, LessOrEqual};
        use OperatorKind::{Compare, Contains, EndsWith, Equals, InList, Present, Regex, StartsWith};

        let specs = [
            OperatorSpec::new("eq", "Equals", Equals, ALL_FAMILIES),
            OperatorSpec::new("nq", "Not Equal To", Equals, ALL_FAMILIES).negate(),
            OperatorSpec::new("sw", "Starts With", StartsWith, TEXT_LIKE),
            OperatorSpec::new("ew", "Ends With", EndsWith, TEXT_LIKE),
            OperatorSpec::new("co", "Contains", Contains, TEXT_LIKE),
            OperatorSpec::new("nc", "Doesn't Contain", Contains, TEXT_LIKE).negate(),
            OperatorSpec::new("gt", "Greater Than", Compare(Greater), ORDERED),
            OperatorSpec::new("lt", "Less Than", Compare(Less), ORDERED),
            OperatorSpec::new("gteq", "Greater Than or Equal To", Compare(GreaterOrEqual), ORDERED),
            OperatorSpec::new("lteq", "Less Than or Equal To", Compare(LessOrEqual), ORDERED),
            OperatorSpec::new("regexp", "Regex", Regex, TEXTUAL),
            OperatorSpec::new("notregexp", "Not Regex", Regex, TEXTUAL).negate(),
            OperatorSpec::new("null", "Is Empty", Present, ALL_FAMILIES).negate(),
            OperatorSpec::new("notnull", "Is Not Empty", Present, ALL_FAMILIES),
            OperatorSpec::new("in", "One Of", InList, ALL_FAMILIES),
            OperatorSpec::new("notin", "Not One Of", InList, ALL_FAMILIES).negate(),
        ];

        Self {
            operators: specs
                .into_iter()
                .map(|spec| (spec.code.clone(), spec))
                .collect(),
        }
    }

    /// Add an operator. Codes are unique; template operators must reference
    /// the column and bind exactly one value.
    pub fn register(&mut self, spec: OperatorSpec) -> Result<(), OperatorError> {
        if self.operators.contains_key(&spec.code) {
            return Err(OperatorError::Duplicate(spec.code));
        }
        if let OperatorKind::Template(sql) = &spec.kind
            && (!sql.contains("{column}") || sql.matches('?').count() != 1)
        {
            return Err(OperatorError::BadTemplate { code: spec.code });
        }
        self.operators.insert(spec.code.clone(), spec);

        Ok(())
    }

    #[must_use]
    pub fn get(&self, code: &str) -> Option<&OperatorSpec> {
        self.operators.get(code)
    }

    /// Operators usable on a type family, ordered by code.
    pub fn for_family(&self, family: TypeFamily) -> impl Iterator<Item = &OperatorSpec> {
        self.operators.values().filter(move |op| op.applies_to(family))
    }
}

impl Default for OperatorTable {
    fn default() -> Self {
        Self::builtin()
    }
}
