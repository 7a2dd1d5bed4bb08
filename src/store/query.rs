//! Live queries
//!
//! A query is a collection name plus AND-ed predicates, bound to exactly one
//! session. It moves between sessions only through a `Handover<Query>`;
//! there is no way to clone a live query.
//!
//! Predicates follow strict matching: no type coercion, a missing field or
//! null value never matches.

use serde_json::Value;

use super::errors::{StorageError, StorageResult};
use super::handover::Exportable;
use super::session::{Session, SessionId};
use super::store::Row;
use super::table_view::TableView;
use crate::mvcc::VersionId;

/// Filter operation types
#[derive(Debug, Clone, PartialEq)]
pub enum FilterOp {
    /// Equality: field = value
    Eq(Value),
    /// Greater than or equal: field >= value
    Gte(Value),
    /// Greater than: field > value
    Gt(Value),
    /// Less than or equal: field <= value
    Lte(Value),
    /// Less than: field < value
    Lt(Value),
}

/// A single predicate (field + operation)
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    pub field: String,
    pub op: FilterOp,
}

impl Predicate {
    pub fn eq(field: impl Into<String>, value: Value) -> Self {
        Self {
            field: field.into(),
            op: FilterOp::Eq(value),
        }
    }

    pub fn gte(field: impl Into<String>, value: Value) -> Self {
        Self {
            field: field.into(),
            op: FilterOp::Gte(value),
        }
    }

    pub fn gt(field: impl Into<String>, value: Value) -> Self {
        Self {
            field: field.into(),
            op: FilterOp::Gt(value),
        }
    }

    pub fn lte(field: impl Into<String>, value: Value) -> Self {
        Self {
            field: field.into(),
            op: FilterOp::Lte(value),
        }
    }

    pub fn lt(field: impl Into<String>, value: Value) -> Self {
        Self {
            field: field.into(),
            op: FilterOp::Lt(value),
        }
    }
}

/// Evaluates predicates against documents
pub struct PredicateFilter;

impl PredicateFilter {
    /// Checks if a document matches all predicates (AND semantics)
    pub fn matches(document: &Value, predicates: &[Predicate]) -> bool {
        predicates
            .iter()
            .all(|pred| Self::matches_predicate(document, pred))
    }

    fn matches_predicate(document: &Value, predicate: &Predicate) -> bool {
        let field_value = match document.get(&predicate.field) {
            Some(v) if !v.is_null() => v,
            _ => return false,
        };

        match &predicate.op {
            FilterOp::Eq(expected) => field_value == expected,
            FilterOp::Gte(bound) => Self::compare(field_value, bound, |o| o.is_ge()),
            FilterOp::Gt(bound) => Self::compare(field_value, bound, |o| o.is_gt()),
            FilterOp::Lte(bound) => Self::compare(field_value, bound, |o| o.is_le()),
            FilterOp::Lt(bound) => Self::compare(field_value, bound, |o| o.is_lt()),
        }
    }

    /// Range comparison on numbers or strings only
    fn compare(actual: &Value, bound: &Value, accept: fn(std::cmp::Ordering) -> bool) -> bool {
        let ordering = match (actual, bound) {
            (Value::Number(a), Value::Number(b)) => match (a.as_f64(), b.as_f64()) {
                (Some(a), Some(b)) => a.partial_cmp(&b),
                _ => None,
            },
            (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
            _ => None,
        };
        ordering.map_or(false, accept)
    }
}

/// Session-independent description of a query
#[derive(Debug, Clone, PartialEq)]
pub struct QueryPayload {
    pub collection: String,
    pub predicates: Vec<Predicate>,
}

impl QueryPayload {
    /// Rows of the collection matching every predicate at the session's snapshot
    pub(crate) fn evaluate(&self, session: &Session) -> StorageResult<Vec<Row>> {
        let rows = session
            .store()
            .visible_rows(&self.collection, session.read_view())?;
        Ok(rows
            .into_iter()
            .filter(|row| PredicateFilter::matches(&row.document, &self.predicates))
            .collect())
    }
}

/// A query bound to one session.
#[derive(Debug)]
pub struct Query {
    session: SessionId,
    payload: QueryPayload,
}

impl Query {
    pub(crate) fn new(session: SessionId, collection: impl Into<String>) -> Self {
        Self {
            session,
            payload: QueryPayload {
                collection: collection.into(),
                predicates: Vec::new(),
            },
        }
    }

    /// Add a predicate, builder style
    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.payload.predicates.push(predicate);
        self
    }

    pub fn session_id(&self) -> SessionId {
        self.session
    }

    pub fn collection(&self) -> &str {
        &self.payload.collection
    }

    pub fn predicates(&self) -> &[Predicate] {
        &self.payload.predicates
    }

    /// Evaluate at the session's snapshot, producing an attached view
    pub fn find_all(&self, session: &Session) -> StorageResult<TableView> {
        if session.id() != self.session {
            return Err(StorageError::SessionMismatch {
                bound: self.session,
                used: session.id(),
            });
        }
        TableView::evaluate(self.payload.clone(), session)
    }
}

impl Exportable for Query {
    type Payload = QueryPayload;

    fn to_payload(&self) -> QueryPayload {
        self.payload.clone()
    }

    fn into_payload(self) -> QueryPayload {
        self.payload
    }

    /// Predicates do not depend on a snapshot, so any version can be imported.
    fn from_handover(payload: QueryPayload, _version: VersionId, session: &Session) -> Self {
        Self {
            session: session.id(),
            payload,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Store, WriteBatch};
    use serde_json::json;

    #[test]
    fn test_predicate_eq_no_coercion() {
        let doc = json!({"n": 1, "s": "1"});
        assert!(PredicateFilter::matches(&doc, &[Predicate::eq("n", json!(1))]));
        assert!(!PredicateFilter::matches(&doc, &[Predicate::eq("s", json!(1))]));
    }

    #[test]
    fn test_predicate_ranges() {
        let doc = json!({"n": 5, "name": "m"});
        assert!(PredicateFilter::matches(&doc, &[Predicate::gte("n", json!(5))]));
        assert!(!PredicateFilter::matches(&doc, &[Predicate::gt("n", json!(5))]));
        assert!(PredicateFilter::matches(&doc, &[Predicate::lt("name", json!("z"))]));
        assert!(!PredicateFilter::matches(&doc, &[Predicate::lte("n", json!("9"))]));
    }

    #[test]
    fn test_missing_and_null_never_match() {
        let doc = json!({"n": null});
        assert!(!PredicateFilter::matches(&doc, &[Predicate::eq("n", json!(null))]));
        assert!(!PredicateFilter::matches(&doc, &[Predicate::gte("m", json!(0))]));
    }

    #[test]
    fn test_find_all_filters_rows() {
        let store = Store::new();
        store.create_collection("posts").unwrap();
        store
            .commit(
                WriteBatch::new()
                    .put("posts", "1", json!({"published": true}))
                    .put("posts", "2", json!({"published": false})),
            )
            .unwrap();

        let session = Session::open(&store);
        let query = session
            .query("posts")
            .filter(Predicate::eq("published", json!(true)));
        let view = query.find_all(&session).unwrap();

        assert_eq!(view.len(), 1);
        assert_eq!(view.rows()[0].key, "1");
    }

    #[test]
    fn test_find_all_rejects_other_session() {
        let store = Store::new();
        store.create_collection("posts").unwrap();
        let owner = Session::open(&store);
        let other = Session::open(&store);

        let query = owner.query("posts");
        assert!(matches!(
            query.find_all(&other),
            Err(StorageError::SessionMismatch { .. })
        ));
    }

    #[test]
    fn test_move_handover_rebinds_query() {
        let store = Store::new();
        store.create_collection("posts").unwrap();
        let source = Session::open(&store);
        let target = Session::open(&store);

        let handover = source.export_move(source.query("posts").filter(Predicate::eq("a", json!(1))));
        let query: Query = target.import(handover).unwrap();

        assert_eq!(query.session_id(), target.id());
        assert_eq!(query.predicates().len(), 1);
    }
}
