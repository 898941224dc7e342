//! Compiles native filter documents and query descriptors into
//! parameterised SQL over the `documents` table.

use serde_json::Value;
use sqlx::{postgres::PgArguments, Postgres};
use uuid::Uuid;

use super::{Collection, Patch, StoreError};
use crate::query::{QueryDescriptor, SortDirection};

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum SqlParam {
    Text(String),
    Json(Value),
    Int(i64),
    Uuid(Uuid),
    TextArray(Vec<String>),
}

#[derive(Debug)]
pub(crate) struct SqlQuery {
    pub sql: String,
    pub params: Vec<SqlParam>,
}

impl SqlQuery {
    pub fn bind(&self) -> sqlx::query::Query<'_, Postgres, PgArguments> {
        let mut q = sqlx::query(&self.sql);
        for p in &self.params {
            q = match p {
                SqlParam::Text(s) => q.bind(s.as_str()),
                SqlParam::Json(v) => q.bind(v),
                SqlParam::Int(i) => q.bind(*i),
                SqlParam::Uuid(id) => q.bind(*id),
                SqlParam::TextArray(items) => q.bind(items.as_slice()),
            };
        }
        q
    }
}

#[derive(Default)]
struct Builder {
    params: Vec<SqlParam>,
}

impl Builder {
    fn push(&mut self, param: SqlParam) -> String {
        self.params.push(param);
        format!("${}", self.params.len())
    }

    fn field(&mut self, name: &str) -> String {
        let p = self.push(SqlParam::Text(name.to_string()));
        format!("(body -> {p}::text)")
    }

    /// `collection = $n AND (<filter>)`
    fn scope(&mut self, collection: Collection, filter: &Value) -> Result<String, StoreError> {
        let c = self.push(SqlParam::Text(collection.as_str().to_string()));
        let cond = self.condition(filter)?;
        Ok(format!("collection = {c} AND {cond}"))
    }

    fn condition(&mut self, filter: &Value) -> Result<String, StoreError> {
        let conditions = match filter {
            Value::Null => return Ok("TRUE".into()),
            Value::Object(obj) => obj,
            _ => return Err(StoreError::Malformed("filter must be an object".into())),
        };

        let mut parts = Vec::new();
        for (key, condition) in conditions {
            if key == "$and" {
                let items = condition
                    .as_array()
                    .ok_or_else(|| StoreError::Malformed("$and requires an array".into()))?;
                for item in items {
                    parts.push(self.condition(item)?);
                }
            } else if key.starts_with('$') {
                return Err(StoreError::UnsupportedOperator(key.clone()));
            } else {
                match condition {
                    Value::Object(ops) if !ops.is_empty() && ops.keys().all(|k| k.starts_with('$')) => {
                        for (op, operand) in ops {
                            parts.push(self.operator(key, op, operand)?);
                        }
                    }
                    expected => parts.push(self.equals(key, expected)),
                }
            }
        }

        if parts.is_empty() {
            return Ok("TRUE".into());
        }
        Ok(format!("({})", parts.join(" AND ")))
    }

    fn equals(&mut self, field: &str, expected: &Value) -> String {
        let f = self.field(field);
        if expected.is_null() {
            return format!("({f} IS NULL OR {f} = 'null'::jsonb)");
        }
        let v = self.push(SqlParam::Json(expected.clone()));
        format!("{f} = {v}::jsonb")
    }

    fn operator(&mut self, field: &str, op: &str, operand: &Value) -> Result<String, StoreError> {
        let cmp = match op {
            "$eq" => return Ok(self.equals(field, operand)),
            "$ne" => {
                if operand.is_null() {
                    let f = self.field(field);
                    return Ok(format!("({f} IS NOT NULL AND {f} <> 'null'::jsonb)"));
                }
                let f = self.field(field);
                let v = self.push(SqlParam::Json(operand.clone()));
                return Ok(format!("{f} IS DISTINCT FROM {v}::jsonb"));
            }
            "$gt" => ">",
            "$gte" => ">=",
            "$lt" => "<",
            "$lte" => "<=",
            other => return Err(StoreError::UnsupportedOperator(other.to_string())),
        };
        let f = self.field(field);
        let v = self.push(SqlParam::Json(operand.clone()));
        Ok(format!("(jsonb_typeof({f}) = jsonb_typeof({v}::jsonb) AND {f} {cmp} {v}::jsonb)"))
    }
}

pub(crate) fn select(collection: Collection, query: &QueryDescriptor) -> Result<SqlQuery, StoreError> {
    let mut b = Builder::default();
    let scope = b.scope(collection, &query.filter)?;

    let mut order = Vec::new();
    for key in &query.sort {
        let f = b.field(&key.field);
        order.push(match key.direction {
            SortDirection::Asc => format!("{f} ASC NULLS FIRST"),
            SortDirection::Desc => format!("{f} DESC NULLS LAST"),
        });
    }
    order.push("created_at ASC".into());
    order.push("id ASC".into());

    let mut sql = format!("SELECT body FROM documents WHERE {scope} ORDER BY {}", order.join(", "));
    if let Some(page) = &query.page {
        let limit = b.push(SqlParam::Int(page.limit.min(i64::MAX as u64) as i64));
        let offset = b.push(SqlParam::Int(page.skip().min(i64::MAX as u64) as i64));
        sql.push_str(&format!(" LIMIT {limit} OFFSET {offset}"));
    }
    Ok(SqlQuery { sql, params: b.params })
}

pub(crate) fn count(collection: Collection, filter: &Value) -> Result<SqlQuery, StoreError> {
    let mut b = Builder::default();
    let scope = b.scope(collection, filter)?;
    Ok(SqlQuery {
        sql: format!("SELECT COUNT(*) AS count FROM documents WHERE {scope}"),
        params: b.params,
    })
}

pub(crate) fn find_one(collection: Collection, filter: &Value) -> Result<SqlQuery, StoreError> {
    let mut b = Builder::default();
    let scope = b.scope(collection, filter)?;
    Ok(SqlQuery {
        sql: format!("SELECT body FROM documents WHERE {scope} ORDER BY created_at ASC, id ASC LIMIT 1"),
        params: b.params,
    })
}

/// Single statement: the row is locked and the filter re-checked, so two
/// racing callers cannot both win.
pub(crate) fn update_one(collection: Collection, filter: &Value, patch: &Patch) -> Result<SqlQuery, StoreError> {
    let mut b = Builder::default();
    let set = b.push(SqlParam::Json(Value::Object(patch.set.clone())));
    let unset = b.push(SqlParam::TextArray(patch.unset.clone()));
    let scope = b.scope(collection, filter)?;
    Ok(SqlQuery {
        sql: format!(
            "UPDATE documents SET body = (body || {set}::jsonb) - {unset}::text[] \
             WHERE id = (SELECT id FROM documents WHERE {scope} ORDER BY created_at ASC, id ASC LIMIT 1 FOR UPDATE) \
             RETURNING body"
        ),
        params: b.params,
    })
}

pub(crate) fn insert(collection: Collection, id: Uuid, body: &Value) -> SqlQuery {
    SqlQuery {
        sql: "INSERT INTO documents (id, collection, body) VALUES ($1, $2, $3) RETURNING body".into(),
        params: vec![
            SqlParam::Uuid(id),
            SqlParam::Text(collection.as_str().to_string()),
            SqlParam::Json(body.clone()),
        ],
    }
}

pub(crate) fn delete_by_id(collection: Collection, id: Uuid) -> SqlQuery {
    SqlQuery {
        sql: "DELETE FROM documents WHERE collection = $1 AND id = $2 RETURNING body".into(),
        params: vec![SqlParam::Text(collection.as_str().to_string()), SqlParam::Uuid(id)],
    }
}

pub(crate) fn delete_many(collection: Collection, filter: &Value) -> Result<SqlQuery, StoreError> {
    let mut b = Builder::default();
    let scope = b.scope(collection, filter)?;
    Ok(SqlQuery {
        sql: format!("WITH gone AS (DELETE FROM documents WHERE {scope} RETURNING 1) SELECT COUNT(*) AS count FROM gone"),
        params: b.params,
    })
}
