//! In-memory [`DataAccessor`] backed by [`DashMap`].
//!
//! Records are stored as JSON documents keyed by the string form of their
//! primary key. Suitable for development and tests; it shares the same
//! filter semantics as the scoped layer so isolation properties can be
//! checked against it.

use std::cmp::Ordering;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{anyhow, bail};
use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use tenantscope_core::filter::compare_values;
use tenantscope_core::{
    Criteria, Document, Entity, EntitySchema, FindOptions, Predicate, SortDirection, WhereClause,
};

use crate::scoped::guard::ScopeMarker;
use crate::traits::{DataAccessor, QueryBuilder, SelectStatement};

type Rows = Arc<DashMap<String, Document>>;

/// Wall-clock millis since epoch, used as the soft-delete mark.
fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

/// Map key for a primary key value.
fn key_of(id: &Value) -> String {
    match id {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn encode<E: Entity>(entity: &E) -> anyhow::Result<Document> {
    match serde_json::to_value(entity)? {
        Value::Object(doc) => Ok(doc),
        other => Err(anyhow!("entity serialized to non-object JSON: {other}")),
    }
}

fn decode<E: Entity>(doc: Document) -> anyhow::Result<E> {
    Ok(serde_json::from_value(Value::Object(doc))?)
}

/// Collection-level settings every read and write needs.
#[derive(Debug, Clone, Copy)]
struct Layout {
    primary_key: &'static str,
    soft_delete_column: Option<&'static str>,
}

impl Layout {
    fn is_deleted(&self, doc: &Document) -> bool {
        self.soft_delete_column
            .and_then(|column| doc.get(column))
            .is_some_and(|mark| !mark.is_null())
    }
}

/// Filters, sorts and pages a snapshot of `rows`.
///
/// Returns the selected page and the number of matches before paging.
/// Without an explicit order, rows come back in primary key order.
fn select(
    rows: &Rows,
    layout: Layout,
    matches: impl Fn(&Document) -> bool,
    order: &[(String, SortDirection)],
    skip: Option<usize>,
    take: Option<usize>,
    with_deleted: bool,
) -> (Vec<Document>, usize) {
    let mut hits: Vec<Document> = rows
        .iter()
        .filter(|entry| with_deleted || !layout.is_deleted(entry.value()))
        .filter(|entry| matches(entry.value()))
        .map(|entry| entry.value().clone())
        .collect();

    let tiebreak = (layout.primary_key.to_string(), SortDirection::Asc);
    hits.sort_by(|a, b| {
        for (column, direction) in order.iter().chain(std::iter::once(&tiebreak)) {
            let ordering = match (a.get(column), b.get(column)) {
                (Some(x), Some(y)) => compare_values(x, y).unwrap_or(Ordering::Equal),
                (Some(_), None) => Ordering::Greater,
                (None, Some(_)) => Ordering::Less,
                (None, None) => Ordering::Equal,
            };
            let ordering = match direction {
                SortDirection::Asc => ordering,
                SortDirection::Desc => ordering.reverse(),
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    });

    let total = hits.len();
    let page = hits
        .into_iter()
        .skip(skip.unwrap_or(0))
        .take(take.unwrap_or(usize::MAX))
        .collect();
    (page, total)
}

// ---------------------------------------------------------------------------
// MemoryCollection
// ---------------------------------------------------------------------------

/// In-memory collection of one entity type.
pub struct MemoryCollection<E> {
    rows: Rows,
    layout: Layout,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity> MemoryCollection<E> {
    /// Creates an empty collection laid out per `E::schema()`.
    #[must_use]
    pub fn new() -> Self {
        Self::with_schema(&E::schema())
    }

    #[must_use]
    pub fn with_schema(schema: &EntitySchema) -> Self {
        Self {
            rows: Arc::new(DashMap::new()),
            layout: Layout {
                primary_key: schema.primary_key,
                soft_delete_column: schema.soft_delete_column,
            },
            _entity: PhantomData,
        }
    }

    /// Number of stored records, soft-deleted ones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn select_docs(&self, options: &FindOptions) -> (Vec<Document>, usize) {
        let filter = options.filter.as_ref();
        select(
            &self.rows,
            self.layout,
            |doc| filter.map_or(true, |f| f.matches(doc)),
            &options.order,
            options.skip,
            options.take,
            options.with_deleted,
        )
    }

    /// Keys of every record matching `criteria`, soft-deleted ones included.
    fn matching_keys(&self, criteria: Criteria) -> Vec<String> {
        let clause = WhereClause::All(criteria.into_conditions(self.layout.primary_key));
        self.rows
            .iter()
            .filter(|entry| clause.matches(entry.value()))
            .map(|entry| entry.key().clone())
            .collect()
    }

    fn set_deleted_mark(&self, criteria: Criteria, deleted: bool) -> anyhow::Result<usize> {
        let Some(column) = self.layout.soft_delete_column else {
            bail!("collection has no soft-delete column");
        };
        let mark = if deleted {
            Value::from(now_millis())
        } else {
            Value::Null
        };
        let mut affected = 0;
        for key in self.matching_keys(criteria) {
            if let Some(mut doc) = self.rows.get_mut(&key) {
                if self.layout.is_deleted(doc.value()) != deleted {
                    doc.insert(column.to_string(), mark.clone());
                    affected += 1;
                }
            }
        }
        Ok(affected)
    }
}

impl<E: Entity> Default for MemoryCollection<E> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<E: Entity> DataAccessor<E> for MemoryCollection<E> {
    async fn find(&self, options: FindOptions) -> anyhow::Result<Vec<E>> {
        let (docs, _) = self.select_docs(&options);
        docs.into_iter().map(decode).collect()
    }

    async fn find_one(&self, options: FindOptions) -> anyhow::Result<Option<E>> {
        let (docs, _) = self.select_docs(&options.take(1));
        docs.into_iter().next().map(decode).transpose()
    }

    async fn find_and_count(&self, options: FindOptions) -> anyhow::Result<(Vec<E>, usize)> {
        let (docs, total) = self.select_docs(&options);
        let entities = docs.into_iter().map(decode).collect::<anyhow::Result<_>>()?;
        Ok((entities, total))
    }

    async fn count(&self, filter: Option<WhereClause>) -> anyhow::Result<usize> {
        let options = FindOptions {
            filter,
            ..FindOptions::default()
        };
        Ok(self.select_docs(&options).1)
    }

    async fn exists(&self, filter: Option<WhereClause>) -> anyhow::Result<bool> {
        Ok(self.count(filter).await? > 0)
    }

    fn create(&self, partial: Value) -> anyhow::Result<E> {
        Ok(serde_json::from_value(partial)?)
    }

    async fn save(&self, entity: E) -> anyhow::Result<E> {
        let mut doc = encode(&entity)?;
        let id = match doc.get(self.layout.primary_key) {
            Some(id) if !id.is_null() => id.clone(),
            _ => {
                let id = Value::String(uuid::Uuid::new_v4().to_string());
                doc.insert(self.layout.primary_key.to_string(), id.clone());
                id
            }
        };
        self.rows.insert(key_of(&id), doc.clone());
        decode(doc)
    }

    async fn save_many(&self, entities: Vec<E>) -> anyhow::Result<Vec<E>> {
        let mut saved = Vec::with_capacity(entities.len());
        for entity in entities {
            saved.push(self.save(entity).await?);
        }
        Ok(saved)
    }

    async fn update(&self, criteria: Criteria, patch: Document) -> anyhow::Result<usize> {
        // Rows are keyed by primary key; changing it would orphan the map key.
        if patch.contains_key(self.layout.primary_key) {
            bail!("primary key column `{}` cannot be updated", self.layout.primary_key);
        }
        let mut affected = 0;
        for key in self.matching_keys(criteria) {
            if let Some(mut doc) = self.rows.get_mut(&key) {
                for (column, value) in &patch {
                    doc.insert(column.clone(), value.clone());
                }
                affected += 1;
            }
        }
        Ok(affected)
    }

    async fn delete(&self, criteria: Criteria) -> anyhow::Result<usize> {
        Ok(self
            .matching_keys(criteria)
            .iter()
            .filter(|key| self.rows.remove(*key).is_some())
            .count())
    }

    async fn soft_delete(&self, criteria: Criteria) -> anyhow::Result<usize> {
        self.set_deleted_mark(criteria, true)
    }

    async fn restore(&self, criteria: Criteria) -> anyhow::Result<usize> {
        self.set_deleted_mark(criteria, false)
    }

    async fn query(&self, _raw: &str, _params: &[Value]) -> anyhow::Result<Vec<Document>> {
        bail!("raw queries are not supported by the in-memory accessor")
    }

    fn create_query_builder(&self, alias: &str) -> Box<dyn QueryBuilder<E>> {
        Box::new(MemoryQueryBuilder::<E> {
            rows: self.rows.clone(),
            layout: self.layout,
            statement: SelectStatement::new(alias),
            marker: None,
            _entity: PhantomData,
        })
    }
}

// ---------------------------------------------------------------------------
// MemoryQueryBuilder
// ---------------------------------------------------------------------------

/// Query builder over a [`MemoryCollection`]. Shares the collection's rows.
pub struct MemoryQueryBuilder<E> {
    rows: Rows,
    layout: Layout,
    statement: SelectStatement,
    marker: Option<ScopeMarker>,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity> MemoryQueryBuilder<E> {
    fn run(&self) -> (Vec<Document>, usize) {
        let predicate: Predicate = self.statement.predicate();
        select(
            &self.rows,
            self.layout,
            |doc| predicate.matches(doc),
            &self.statement.order,
            self.statement.skip,
            self.statement.take,
            self.statement.with_deleted,
        )
    }
}

#[async_trait]
impl<E: Entity> QueryBuilder<E> for MemoryQueryBuilder<E> {
    fn statement(&self) -> &SelectStatement {
        &self.statement
    }

    fn statement_mut(&mut self) -> &mut SelectStatement {
        &mut self.statement
    }

    fn mark(&mut self, marker: ScopeMarker) {
        self.marker = Some(marker);
    }

    fn marker(&self) -> Option<&ScopeMarker> {
        self.marker.as_ref()
    }

    async fn get_many(&self) -> anyhow::Result<Vec<E>> {
        self.run().0.into_iter().map(decode).collect()
    }

    async fn get_one(&self) -> anyhow::Result<Option<E>> {
        self.run().0.into_iter().next().map(decode).transpose()
    }

    async fn get_many_and_count(&self) -> anyhow::Result<(Vec<E>, usize)> {
        let (docs, total) = self.run();
        let entities = docs.into_iter().map(decode).collect::<anyhow::Result<_>>()?;
        Ok((entities, total))
    }

    async fn get_count(&self) -> anyhow::Result<usize> {
        Ok(self.run().1)
    }

    async fn get_exists(&self) -> anyhow::Result<bool> {
        Ok(self.run().1 > 0)
    }

    async fn execute_delete(&self) -> anyhow::Result<usize> {
        let predicate = self.statement.predicate();
        let keys: Vec<String> = self
            .rows
            .iter()
            .filter(|entry| predicate.matches(entry.value()))
            .map(|entry| entry.key().clone())
            .collect();
        Ok(keys.iter().filter(|key| self.rows.remove(*key).is_some()).count())
    }
}
