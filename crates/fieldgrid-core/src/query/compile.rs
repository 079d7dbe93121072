//! Module: query::compile
//! Responsibility: turning criteria and sort keys into one parameterized
//! root-id query.
//! Does not own: running the query (see `query::execute`).
//!
//! Native fields compare against `m<pos>.<column>`; custom fields go through
//! a correlated `EXISTS` on the custom value table, so an entity with no value
//! never satisfies a positive operator and always satisfies a negated one.

use crate::{
    catalog::FieldCatalog,
    model::{
        FieldError,
        chain::ModuleChain,
        field::{FieldAccess, FieldDescriptor},
    },
    obs::sink::{self, MetricsEvent},
    query::{
        criterion::{SearchCriterion, SearchSetup, SortCriterion},
        operator::{OperatorError, OperatorKind, OperatorSpec, OperatorTable},
        plan::{CompiledQuery, Fragment, JoinSet, SqlParam},
    },
    store::quote_ident,
    value::{DataType, TypeFamily, Value},
};
use regex::Regex;
use thiserror::Error as ThisError;

///
/// CompileError
///

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
pub enum CompileError {
    #[error(transparent)]
    Field(#[from] FieldError),

    #[error(transparent)]
    Operator(#[from] OperatorError),

    #[error("unknown operator '{operator}'")]
    UnknownOperator { operator: String },

    #[error("operator '{operator}' does not apply to {data_type} field '{field}'")]
    UnsupportedOperator {
        field: String,
        operator: String,
        data_type: DataType,
    },

    #[error("operator '{operator}' on field '{field}' needs a value")]
    MissingValue { field: String, operator: String },

    #[error("invalid pattern for field '{field}': {message}")]
    InvalidPattern { field: String, message: String },
}

///
/// QueryCompiler
///

pub struct QueryCompiler<'a> {
    catalog: &'a FieldCatalog,
    operators: &'a OperatorTable,
    list_separator: &'a str,
}

impl<'a> QueryCompiler<'a> {
    #[must_use]
    pub const fn new(
        catalog: &'a FieldCatalog,
        operators: &'a OperatorTable,
        list_separator: &'a str,
    ) -> Self {
        Self {
            catalog,
            operators,
            list_separator,
        }
    }

    /// Compile a search into its root-id query.
    ///
    /// Every criterion must compile; a criterion is never dropped, since that
    /// would silently widen the result.
    pub fn compile(&self, setup: &SearchSetup) -> Result<CompiledQuery, CompileError> {
        let modules = self.catalog.modules();
        let root = modules.require(&setup.module)?;
        let chain = modules.default_chain(root.name)?;
        let mut joins = JoinSet::new(&chain);

        let mut predicates = Vec::with_capacity(setup.criteria.len());
        for criterion in &setup.criteria {
            predicates.push(self.compile_predicate(&chain, &mut joins, criterion)?);
        }
        let order = self.compile_order(&chain, &mut joins, &setup.ordered_sorts())?;

        let join = joins.render();
        let mut sql = format!("SELECT m0.id FROM {} m0{}", quote_ident(root.table), join.sql);
        let mut params = join.params;

        if !predicates.is_empty() {
            let clauses: Vec<&str> = predicates.iter().map(|p| p.sql.as_str()).collect();
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
            for predicate in predicates {
                params.extend(predicate.params);
            }
        }

        sql.push_str(" GROUP BY m0.id ORDER BY ");
        for key in &order {
            sql.push_str(key);
            sql.push_str(", ");
        }
        sql.push_str("m0.id ASC");

        sink::record(MetricsEvent::SearchCompiled { module: root.name });
        tracing::debug!(module = root.name, %sql, params = params.len(), "search compiled");

        Ok(CompiledQuery::new(root.name, sql, params))
    }

    /// One criterion as a parenthesized boolean expression.
    pub fn compile_predicate(
        &self,
        chain: &ModuleChain,
        joins: &mut JoinSet<'_>,
        criterion: &SearchCriterion,
    ) -> Result<Fragment, CompileError> {
        let field = self.catalog.resolve_in_chain(chain, &criterion.field)?;
        let operator =
            self.operators
                .get(&criterion.operator)
                .ok_or_else(|| CompileError::UnknownOperator {
                    operator: criterion.operator.clone(),
                })?;
        let alias = owner_alias(chain, joins, &field)?;

        field.build_predicate(&alias, operator, &criterion.value, self.list_separator)
    }

    /// ORDER BY keys, in the order given.
    pub fn compile_order(
        &self,
        chain: &ModuleChain,
        joins: &mut JoinSet<'_>,
        sorts: &[&SortCriterion],
    ) -> Result<Vec<String>, CompileError> {
        let mut keys = Vec::with_capacity(sorts.len());
        for sort in sorts {
            let field = self.catalog.resolve_in_chain(chain, &sort.field)?;
            let alias = owner_alias(chain, joins, &field)?;
            keys.push(field.build_order(&alias, joins, sort.descending));
        }

        Ok(keys)
    }
}

fn owner_alias(
    chain: &ModuleChain,
    joins: &mut JoinSet<'_>,
    field: &FieldDescriptor,
) -> Result<String, CompileError> {
    joins.require_module(field.module).ok_or_else(|| {
        CompileError::Field(FieldError::FieldNotInChain {
            field: field.uid.clone(),
            module: chain.root().map_or("", |m| m.name).to_string(),
        })
    })
}

impl FieldDescriptor {
    /// Predicate for `operator` against this field, owned by the row aliased
    /// `owner_alias`.
    pub fn build_predicate(
        &self,
        owner_alias: &str,
        operator: &OperatorSpec,
        literal: &str,
        list_separator: &str,
    ) -> Result<Fragment, CompileError> {
        if !operator.applies_to(self.data_type.family()) {
            return Err(CompileError::UnsupportedOperator {
                field: self.uid.clone(),
                operator: operator.code.clone(),
                data_type: self.data_type,
            });
        }

        match &self.access {
            FieldAccess::Native(native) => {
                let column = format!("{owner_alias}.{}", quote_ident(native.column));
                let positive = self.positive(&column, operator, literal, list_separator)?;
                let sql = if operator.negated {
                    format!("({column} IS NULL OR NOT ({}))", positive.sql)
                } else {
                    format!("({})", positive.sql)
                };

                Ok(Fragment::new(sql, positive.params))
            }
            FieldAccess::Custom(custom) => {
                let column = format!("cv.{}", custom.value_column);
                let positive = self.positive(&column, operator, literal, list_separator)?;
                let sql = format!(
                    "({}EXISTS (SELECT 1 FROM custom_values cv \
                     WHERE cv.customizable_id = {owner_alias}.id \
                     AND cv.customizable_type = ? AND cv.custom_definition_id = ? AND ({})))",
                    if operator.negated { "NOT " } else { "" },
                    positive.sql,
                );
                let mut params = vec![
                    SqlParam::text(self.module.name),
                    SqlParam::Integer(custom.definition_id),
                ];
                params.extend(positive.params);

                Ok(Fragment::new(sql, params))
            }
        }
    }

    /// ORDER BY key for this field. Keys are aggregated because the query
    /// groups by root id: ascending takes the smallest joined value,
    /// descending the largest.
    pub fn build_order(
        &self,
        owner_alias: &str,
        joins: &mut JoinSet<'_>,
        descending: bool,
    ) -> String {
        let key = match &self.access {
            FieldAccess::Native(native) => format!("{owner_alias}.{}", quote_ident(native.column)),
            FieldAccess::Custom(custom) => {
                let alias =
                    joins.require_custom(owner_alias, self.module.name, custom.definition_id);
                format!("{alias}.{}", custom.value_column)
            }
        };
        let key = self.comparable(&key);

        if descending {
            format!("MAX({key}) DESC")
        } else {
            format!("MIN({key}) ASC")
        }
    }

    fn positive(
        &self,
        column: &str,
        operator: &OperatorSpec,
        literal: &str,
        list_separator: &str,
    ) -> Result<Fragment, CompileError> {
        let textual = self.data_type.family() == TypeFamily::Textual;
        let as_text = if textual {
            column.to_string()
        } else {
            format!("CAST({column} AS TEXT)")
        };
        let key = self.comparable(column);

        Ok(match &operator.kind {
            OperatorKind::Equals => {
                let value = self.required_value(operator, literal)?;
                Fragment::new(format!("{key} = ?"), vec![SqlParam::from_value(&value)])
            }
            OperatorKind::StartsWith => like(&as_text, format!("{}%", escape_like(literal))),
            OperatorKind::EndsWith => like(&as_text, format!("%{}", escape_like(literal))),
            OperatorKind::Contains => like(&as_text, format!("%{}%", escape_like(literal))),
            OperatorKind::Compare(cmp) => {
                let value = self.required_value(operator, literal)?;
                Fragment::new(
                    format!("{key} {} ?", cmp.sql()),
                    vec![SqlParam::from_value(&value)],
                )
            }
            OperatorKind::Regex => {
                Regex::new(literal).map_err(|err| CompileError::InvalidPattern {
                    field: self.uid.clone(),
                    message: err.to_string(),
                })?;
                Fragment::new(format!("{column} REGEXP ?"), vec![SqlParam::text(literal)])
            }
            OperatorKind::Present => {
                if textual {
                    Fragment::bare(format!("{column} IS NOT NULL AND {column} <> ''"))
                } else {
                    Fragment::bare(format!("{column} IS NOT NULL"))
                }
            }
            OperatorKind::InList => {
                let mut params = Vec::new();
                for item in literal.split(list_separator).map(str::trim) {
                    if item.is_empty() {
                        continue;
                    }
                    params.push(SqlParam::from_value(&self.parse(item)?));
                }

                if params.is_empty() {
                    Fragment::bare("0")
                } else {
                    let placeholders = vec!["?"; params.len()].join(", ");
                    Fragment::new(format!("{key} IN ({placeholders})"), params)
                }
            }
            OperatorKind::Template(template) => {
                let value = self.required_value(operator, literal)?;
                Fragment::new(
                    template.replace("{column}", &key),
                    vec![SqlParam::from_value(&value)],
                )
            }
        })
    }

    // Decimals are stored as exact text; equality and ordering go through
    // their numeric value.
    fn comparable(&self, column: &str) -> String {
        if self.data_type == DataType::Decimal {
            format!("CAST({column} AS NUMERIC)")
        } else {
            column.to_string()
        }
    }

    fn required_value(
        &self,
        operator: &OperatorSpec,
        literal: &str,
    ) -> Result<Value, CompileError> {
        let value = self.parse(literal)?;
        if value.is_null() {
            return Err(CompileError::MissingValue {
                field: self.uid.clone(),
                operator: operator.code.clone(),
            });
        }

        Ok(value)
    }
}

fn like(column: &str, pattern: String) -> Fragment {
    Fragment::new(
        format!("{column} LIKE ? ESCAPE '\\'"),
        vec![SqlParam::Text(pattern)],
    )
}

/// Escape LIKE wildcards so the literal matches itself.
#[must_use]
pub fn escape_like(literal: &str) -> String {
    let mut out = String::with_capacity(literal.len());
    for c in literal.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }

    out
}
