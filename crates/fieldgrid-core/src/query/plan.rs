//! Module: query::plan
//! Responsibility: the pieces a compiled search is assembled from: bound
//! parameters, predicate fragments, the join set and the final query.

use crate::{
    model::{chain::ModuleChain, module::ModuleDescriptor},
    store::quote_ident,
    value::Value,
};
use rusqlite::types::{ToSqlOutput, Value as SqlValue};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::{collections::BTreeMap, fmt::Write as _};

///
/// SqlParam
///
/// A bound parameter in its storage form. Serializable so a paged cursor can
/// replay its query later.
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum SqlParam {
    Null,
    Integer(i64),
    Text(String),
}

impl SqlParam {
    #[must_use]
    pub fn from_value(value: &Value) -> Self {
        match value.to_sql_value() {
            SqlValue::Integer(n) => Self::Integer(n),
            SqlValue::Text(text) => Self::Text(text),
            SqlValue::Real(r) => Self::Text(r.to_string()),
            SqlValue::Null | SqlValue::Blob(_) => Self::Null,
        }
    }

    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }
}

impl rusqlite::ToSql for SqlParam {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Self::Null => ToSqlOutput::Owned(SqlValue::Null),
            Self::Integer(n) => ToSqlOutput::from(*n),
            Self::Text(text) => ToSqlOutput::from(text.as_str()),
        })
    }
}

///
/// Fragment
///
/// SQL text plus the parameters its placeholders bind, in order.
///

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Fragment {
    pub sql: String,
    pub params: Vec<SqlParam>,
}

impl Fragment {
    #[must_use]
    pub fn new(sql: impl Into<String>, params: Vec<SqlParam>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }

    #[must_use]
    pub fn bare(sql: impl Into<String>) -> Self {
        Self::new(sql, Vec::new())
    }
}

///
/// CustomJoin
///

#[derive(Clone, Debug, Eq, PartialEq)]
struct CustomJoin {
    alias: String,
    owner_alias: String,
    module: &'static str,
    definition_id: i64,
}

///
/// JoinSet
///
/// Joins a query needs, each emitted once. Module joins come out in chain
/// order so a parent is always joined before its child.
///

#[derive(Debug)]
pub struct JoinSet<'c> {
    chain: &'c ModuleChain,
    modules: BTreeMap<usize, &'static ModuleDescriptor>,
    custom: Vec<CustomJoin>,
}

impl<'c> JoinSet<'c> {
    #[must_use]
    pub const fn new(chain: &'c ModuleChain) -> Self {
        Self {
            chain,
            modules: BTreeMap::new(),
            custom: Vec::new(),
        }
    }

    /// Require `module` and its ancestors; returns the module's alias.
    pub fn require_module(&mut self, module: &'static ModuleDescriptor) -> Option<String> {
        let pos = self.chain.position(module.name)?;
        if pos > 0 {
            self.modules.insert(pos, module);
            for ancestor in self.chain.ancestors(module.name) {
                if let Some(p) = self.chain.position(ancestor.name)
                    && p > 0
                {
                    self.modules.insert(p, ancestor);
                }
            }
        }

        Some(format!("m{pos}"))
    }

    /// Join the custom value row of one definition for the owner aliased
    /// `owner_alias`; returns the join alias. Repeated requests share a join.
    pub fn require_custom(
        &mut self,
        owner_alias: &str,
        module: &'static str,
        definition_id: i64,
    ) -> String {
        if let Some(existing) = self
            .custom
            .iter()
            .find(|j| j.owner_alias == owner_alias && j.definition_id == definition_id)
        {
            return existing.alias.clone();
        }

        let alias = format!("s{}", self.custom.len());
        self.custom.push(CustomJoin {
            alias: alias.clone(),
            owner_alias: owner_alias.to_string(),
            module,
            definition_id,
        });

        alias
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.modules.len() + self.custom.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Render every join, module joins first.
    #[must_use]
    pub fn render(&self) -> Fragment {
        let mut sql = String::new();
        let mut params = Vec::new();

        for (pos, module) in &self.modules {
            let Some(link) = &module.parent else {
                continue;
            };
            let parent_pos = self.chain.position(link.module).unwrap_or_default();
            let _ = write!(
                sql,
                " LEFT JOIN {} m{pos} ON m{pos}.{} = m{parent_pos}.id",
                quote_ident(module.table),
                quote_ident(link.foreign_key),
            );
        }

        for join in &self.custom {
            let _ = write!(
                sql,
                " LEFT JOIN custom_values {a} ON {a}.customizable_id = {o}.id \
                 AND {a}.customizable_type = ? AND {a}.custom_definition_id = ?",
                a = join.alias,
                o = join.owner_alias,
            );
            params.push(SqlParam::text(join.module));
            params.push(SqlParam::Integer(join.definition_id));
        }

        Fragment::new(sql, params)
    }
}

///
/// CompiledQuery
///
/// Root-id query for one search. The fingerprint identifies the exact SQL and
/// bindings, so a stored cursor can tell whether its search changed.
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct CompiledQuery {
    pub module: String,
    pub sql: String,
    pub params: Vec<SqlParam>,
    pub fingerprint: String,
}

impl CompiledQuery {
    #[must_use]
    pub fn new(module: &str, sql: String, params: Vec<SqlParam>) -> Self {
        let fingerprint = fingerprint(&sql, &params);

        Self {
            module: module.to_string(),
            sql,
            params,
            fingerprint,
        }
    }

    /// Query over an explicit id batch, keeping the batch order.
    #[must_use]
    pub fn for_batch(module: &'static ModuleDescriptor, ids: &[i64]) -> Self {
        let mut sql = format!(
            "SELECT m0.id FROM {} m0 WHERE m0.id IN (",
            quote_ident(module.table)
        );
        let mut order = String::from("CASE m0.id");
        for (i, id) in ids.iter().enumerate() {
            if i > 0 {
                sql.push_str(", ");
            }
            sql.push('?');
            let _ = write!(order, " WHEN {id} THEN {i}");
        }
        sql.push(')');
        if ids.is_empty() {
            sql = format!("SELECT m0.id FROM {} m0 WHERE 0", quote_ident(module.table));
        } else {
            let _ = write!(sql, " ORDER BY {order} END");
        }

        Self::new(
            module.name,
            sql,
            ids.iter().map(|id| SqlParam::Integer(*id)).collect(),
        )
    }

    #[must_use]
    pub fn count_sql(&self) -> String {
        format!("SELECT COUNT(*) FROM ({})", self.sql)
    }

    #[must_use]
    pub fn page_sql(&self) -> String {
        format!("{} LIMIT ? OFFSET ?", self.sql)
    }
}

fn fingerprint(sql: &str, params: &[SqlParam]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(sql.as_bytes());
    for param in params {
        hasher.update([0u8]);
        match param {
            SqlParam::Null => hasher.update(b"n"),
            SqlParam::Integer(n) => {
                hasher.update(b"i");
                hasher.update(n.to_be_bytes());
            }
            SqlParam::Text(text) => {
                hasher.update(b"t");
                hasher.update(text.as_bytes());
            }
        }
    }

    hasher
        .finalize()
        .iter()
        .fold(String::with_capacity(64), |mut out, byte| {
            let _ = write!(out, "{byte:02x}");
            out
        })
}
