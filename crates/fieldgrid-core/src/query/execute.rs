//! Running a compiled query against the store.

use crate::{
    query::plan::{CompiledQuery, SqlParam},
    store::{Database, StoreError},
};
use rusqlite::{Connection, params_from_iter};

impl CompiledQuery {
    /// Every matching root id, in query order.
    pub fn ids(&self, db: &Database) -> Result<Vec<i64>, StoreError> {
        db.with_conn(|conn| collect_ids(conn, &self.sql, self.params.iter()))
    }

    pub fn count(&self, db: &Database) -> Result<u64, StoreError> {
        let count: i64 = db.with_conn(|conn| {
            Ok(conn.query_row(
                &self.count_sql(),
                params_from_iter(self.params.iter()),
                |row| row.get(0),
            )?)
        })?;

        Ok(u64::try_from(count).unwrap_or_default())
    }

    /// One window of ids, `limit` long starting at `offset`.
    pub fn page(&self, db: &Database, offset: u64, limit: u64) -> Result<Vec<i64>, StoreError> {
        let bounds = [
            SqlParam::Integer(i64::try_from(limit).unwrap_or(i64::MAX)),
            SqlParam::Integer(i64::try_from(offset).unwrap_or(i64::MAX)),
        ];

        db.with_conn(|conn| {
            collect_ids(
                conn,
                &self.page_sql(),
                self.params.iter().chain(bounds.iter()),
            )
        })
    }
}

fn collect_ids<'p>(
    conn: &Connection,
    sql: &str,
    params: impl Iterator<Item = &'p SqlParam>,
) -> Result<Vec<i64>, StoreError> {
    let mut stmt = conn.prepare_cached(sql)?;
    let rows = stmt.query_map(params_from_iter(params), |row| row.get(0))?;

    let mut ids = Vec::new();
    for id in rows {
        ids.push(id?);
    }

    Ok(ids)
}
