use std::cmp::Ordering;

use serde_json::Value;

use crate::document::Document;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

/// Equality filters, an optional sort field and an optional limit over one
/// collection. Ties on the sort field are broken by document id.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub collection: String,
    pub filters: Vec<(String, Value)>,
    pub order_by: Option<(String, Direction)>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn collection(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            filters: Vec::new(),
            order_by: None,
            limit: None,
        }
    }

    pub fn where_eq(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.filters.push((field.to_string(), value.into()));
        self
    }

    pub fn order_by(mut self, field: &str, direction: Direction) -> Self {
        self.order_by = Some((field.to_string(), direction));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Whether `doc` passes the collection and filter constraints. The limit
    /// is not considered.
    pub fn matches(&self, doc: &Document) -> bool {
        doc.key.collection == self.collection
            && self
                .filters
                .iter()
                .all(|(field, value)| doc.data.get(field) == Some(value))
    }

    /// Sort `docs` by the order clause, then truncate to the limit.
    pub fn sort_and_limit(&self, docs: &mut Vec<Document>) {
        docs.sort_by(|a, b| {
            let primary = match &self.order_by {
                Some((field, dir)) => {
                    let ord = compare_values(a.data.get(field), b.data.get(field));
                    match dir {
                        Direction::Ascending => ord,
                        Direction::Descending => ord.reverse(),
                    }
                }
                None => Ordering::Equal,
            };
            primary.then_with(|| a.key.id.cmp(&b.key.id))
        });
        if let Some(limit) = self.limit {
            docs.truncate(limit);
        }
    }
}

fn type_rank(v: Option<&Value>) -> u8 {
    match v {
        None => 0,
        Some(Value::Null) => 1,
        Some(Value::Bool(_)) => 2,
        Some(Value::Number(_)) => 3,
        Some(Value::String(_)) => 4,
        Some(Value::Array(_)) => 5,
        Some(Value::Object(_)) => 6,
    }
}

/// Total order over optional JSON values: missing < null < bool < number <
/// string < array < object. Arrays and objects compare equal to their kind.
pub fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            match (x.as_i64(), y.as_i64()) {
                (Some(x), Some(y)) => x.cmp(&y),
                _ => {
                    let x = x.as_f64().unwrap_or(f64::NAN);
                    let y = y.as_f64().unwrap_or(f64::NAN);
                    x.partial_cmp(&y).unwrap_or(Ordering::Equal)
                }
            }
        }
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}
