use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{Map, Number, Value};
use time::{format_description::well_known::Rfc3339, macros::format_description, Date, OffsetDateTime};
use tracing::debug;
use uuid::Uuid;

use super::{
    descriptor::{Pagination, Projection, QueryDescriptor, SortDirection, SortKey},
    error::QueryError,
    schema::{FieldKind, FieldSpec, ResourceSchema},
};
use crate::store::timestamp;

pub const DEFAULT_LIMIT: u64 = 100;
pub const MAX_LIMIT: u64 = 1000;

const CONTROL_KEYS: [&str; 4] = ["page", "sort", "limit", "fields"];

lazy_static! {
    static ref FILTER_KEY: Regex = Regex::new(r"^([A-Za-z_][A-Za-z0-9_]*)(?:\[([A-Za-z]+)\])?$").unwrap();
}

/// Builds a [`QueryDescriptor`] from raw query-string pairs, one stage at a
/// time:
///
/// ```ignore
/// let mut features = ApiFeatures::new(base, &params, &TOUR_SCHEMA);
/// features.filter()?.sort()?.limit_fields()?.paginate()?;
/// let descriptor = features.into_descriptor();
/// ```
///
/// The parameter slice is only ever borrowed.
pub struct ApiFeatures<'a> {
    params: &'a [(String, String)],
    schema: &'a ResourceSchema,
    base: Value,
    descriptor: QueryDescriptor,
}

impl<'a> ApiFeatures<'a> {
    pub fn new(base: Value, params: &'a [(String, String)], schema: &'a ResourceSchema) -> Self {
        Self {
            params,
            schema,
            descriptor: QueryDescriptor::for_filter(base.clone()),
            base,
        }
    }

    /// Runs every stage with its defaults.
    pub fn build(
        base: Value,
        params: &'a [(String, String)],
        schema: &'a ResourceSchema,
    ) -> Result<QueryDescriptor, QueryError> {
        let mut features = Self::new(base, params, schema);
        features.filter()?.sort()?.limit_fields()?.paginate()?;
        Ok(features.into_descriptor())
    }

    pub fn into_descriptor(self) -> QueryDescriptor {
        self.descriptor
    }

    pub fn filter(&mut self) -> Result<&mut Self, QueryError> {
        let mut constraints = Map::new();

        for (key, raw) in self.params {
            if CONTROL_KEYS.contains(&key.as_str()) {
                continue;
            }
            let caps = FILTER_KEY
                .captures(key)
                .ok_or_else(|| QueryError::InvalidParameter(key.clone()))?;
            let name = caps.get(1).map_or("", |m| m.as_str());
            let spec = self
                .schema
                .field(name)
                .filter(|f| f.kind.is_scalar())
                .ok_or_else(|| QueryError::UnknownField(name.to_string()))?;
            let value = coerce(spec, raw)?;

            match caps.get(2).map(|m| m.as_str()) {
                None => {
                    if constraints.contains_key(name) {
                        return Err(QueryError::DuplicateConstraint(name.to_string()));
                    }
                    constraints.insert(name.to_string(), value);
                }
                Some(op) => {
                    let native = native_operator(spec, op)?;
                    let entry = constraints
                        .entry(name.to_string())
                        .or_insert_with(|| Value::Object(Map::new()));
                    let ops = entry
                        .as_object_mut()
                        .ok_or_else(|| QueryError::DuplicateConstraint(name.to_string()))?;
                    if ops.insert(native.to_string(), value).is_some() {
                        return Err(QueryError::DuplicateConstraint(format!("{name}[{op}]")));
                    }
                }
            }
        }

        self.descriptor.filter = combine(self.base.clone(), constraints);
        debug!(filter = %self.descriptor.filter, "query filter built");
        Ok(self)
    }

    pub fn sort(&mut self) -> Result<&mut Self, QueryError> {
        let mut keys = Vec::new();
        if let Some(raw) = self.control("sort")? {
            for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
                let (name, direction) = match part.strip_prefix('-') {
                    Some(rest) => (rest, SortDirection::Desc),
                    None => (part, SortDirection::Asc),
                };
                let spec = self
                    .schema
                    .field(name)
                    .filter(|f| f.kind.is_scalar())
                    .ok_or_else(|| QueryError::UnknownField(name.to_string()))?;
                keys.push(SortKey {
                    field: spec.name.to_string(),
                    direction,
                });
            }
        }
        if keys.is_empty() {
            keys.push(SortKey::desc("createdAt"));
        }
        self.descriptor.sort = keys;
        Ok(self)
    }

    pub fn limit_fields(&mut self) -> Result<&mut Self, QueryError> {
        let mut include = Vec::new();
        let mut exclude = Vec::new();
        if let Some(raw) = self.control("fields")? {
            for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
                let (name, excluded) = match part.strip_prefix('-') {
                    Some(rest) => (rest, true),
                    None => (part, false),
                };
                let spec = self
                    .schema
                    .field(name)
                    .ok_or_else(|| QueryError::UnknownField(name.to_string()))?;
                let target = if excluded { &mut exclude } else { &mut include };
                if !target.iter().any(|f| f == spec.name) {
                    target.push(spec.name.to_string());
                }
            }
        }

        self.descriptor.projection = match (include.is_empty(), exclude.is_empty()) {
            (false, false) => return Err(QueryError::MixedProjection),
            (false, true) => Projection::Include(include),
            (true, _) => {
                exclude.extend(self.schema.hidden_fields());
                Projection::Exclude(exclude)
            }
        };
        Ok(self)
    }

    pub fn paginate(&mut self) -> Result<&mut Self, QueryError> {
        let page_raw = self.control("page")?;
        let page = page_raw.and_then(positive).unwrap_or(1);
        let limit = self
            .control("limit")?
            .and_then(positive)
            .unwrap_or(DEFAULT_LIMIT)
            .min(MAX_LIMIT);

        self.descriptor.page = Some(Pagination {
            page,
            limit,
            requested: page_raw.is_some(),
        });
        Ok(self)
    }

    /// Single value of a control key. Repeating a control key is rejected.
    fn control(&self, key: &str) -> Result<Option<&'a str>, QueryError> {
        let mut found = None;
        for (k, v) in self.params {
            if k == key {
                if found.is_some() {
                    return Err(QueryError::InvalidParameter(format!("{key} given more than once")));
                }
                found = Some(v.as_str());
            }
        }
        Ok(found)
    }
}

fn positive(raw: &str) -> Option<u64> {
    raw.trim().parse::<u64>().ok().filter(|n| *n > 0)
}

fn native_operator(spec: &FieldSpec, op: &str) -> Result<&'static str, QueryError> {
    let native = match op {
        "gte" => "$gte",
        "gt" => "$gt",
        "lte" => "$lte",
        "lt" => "$lt",
        _ => {
            return Err(QueryError::UnsupportedOperator {
                field: spec.name.to_string(),
                op: op.to_string(),
            })
        }
    };
    if !spec.kind.is_ordered() {
        return Err(QueryError::UnsupportedOperator {
            field: spec.name.to_string(),
            op: op.to_string(),
        });
    }
    Ok(native)
}

fn combine(base: Value, constraints: Map<String, Value>) -> Value {
    let base_empty = match &base {
        Value::Null => true,
        Value::Object(obj) => obj.is_empty(),
        _ => false,
    };
    match (base_empty, constraints.is_empty()) {
        (true, true) => Value::Object(Map::new()),
        (true, false) => Value::Object(constraints),
        (false, true) => base,
        (false, false) => serde_json::json!({ "$and": [base, Value::Object(constraints)] }),
    }
}

fn coerce(spec: &FieldSpec, raw: &str) -> Result<Value, QueryError> {
    let invalid = || QueryError::InvalidValue {
        field: spec.name.to_string(),
        value: raw.to_string(),
    };
    match spec.kind {
        FieldKind::Text => Ok(Value::String(raw.to_string())),
        FieldKind::Id => Uuid::parse_str(raw.trim())
            .map(|id| Value::String(id.to_string()))
            .map_err(|_| invalid()),
        FieldKind::Number => {
            let raw = raw.trim();
            if let Ok(n) = raw.parse::<i64>() {
                return Ok(Value::from(n));
            }
            raw.parse::<f64>()
                .ok()
                .filter(|f| f.is_finite())
                .and_then(Number::from_f64)
                .map(Value::Number)
                .ok_or_else(invalid)
        }
        #[cfg(test)]
        FieldKind::Bool => match raw.trim() {
            "true" => Ok(Value::Bool(true)),
            "false" => Ok(Value::Bool(false)),
            _ => Err(invalid()),
        },
        FieldKind::Date => {
            let raw = raw.trim();
            let at = match OffsetDateTime::parse(raw, &Rfc3339) {
                Ok(at) => at,
                Err(_) => Date::parse(raw, format_description!("[year]-[month]-[day]"))
                    .map(|d| d.midnight().assume_utc())
                    .map_err(|_| invalid())?,
            };
            timestamp(at).map_err(|_| invalid())
        }
        FieldKind::List | FieldKind::Object => Err(invalid()),
    }
}
