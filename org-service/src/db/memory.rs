//! In-process document store.
//!
//! Evaluates the subset of the MongoDB query and update language the service
//! issues: equality (with array membership), `$eq`, `$ne`, `$in`, `$nin`,
//! `$gt`/`$gte`/`$lt`/`$lte`, `$exists`, `$regex`/`$options`, `$and`, `$or`,
//! `$nor` and dotted paths; `$set`, `$unset`, `$push` (with `$each`), `$pull`
//! and `$currentDate` for updates. Unknown operators are reported as
//! [`StoreError::Unsupported`] rather than silently ignored.

use super::error::StoreError;
use super::handle::{CollectionHandle, DocumentStore, FindSpec};
use async_trait::async_trait;
use bson::{oid::ObjectId, Bson, DateTime, Document};
use dashmap::DashMap;
use regex::RegexBuilder;
use std::{cmp::Ordering, sync::Arc};
use tokio::sync::RwLock;

#[derive(Default)]
pub struct MemoryStore {
    collections: DashMap<String, Arc<MemoryCollection>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    fn collection(&self, name: &str) -> Arc<dyn CollectionHandle> {
        self.collections
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(MemoryCollection::new(name)))
            .clone()
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

pub struct MemoryCollection {
    name: String,
    documents: RwLock<Vec<Document>>,
}

impl MemoryCollection {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            documents: RwLock::new(Vec::new()),
        }
    }
}

#[async_trait]
impl CollectionHandle for MemoryCollection {
    fn name(&self) -> &str {
        &self.name
    }

    async fn find_one(
        &self,
        filter: Document,
        projection: Option<Document>,
    ) -> Result<Option<Document>, StoreError> {
        let documents = self.documents.read().await;
        for document in documents.iter() {
            if matches(document, &filter)? {
                return Ok(Some(project(document, projection.as_ref())));
            }
        }
        Ok(None)
    }

    async fn find(&self, filter: Document, spec: FindSpec) -> Result<Vec<Document>, StoreError> {
        let documents = self.documents.read().await;
        let mut found = Vec::new();
        for document in documents.iter() {
            if matches(document, &filter)? {
                found.push(document.clone());
            }
        }
        drop(documents);

        if let Some(sort) = &spec.sort {
            let collated = spec.collation.is_some();
            found.sort_by(|a, b| compare_documents(a, b, sort, collated));
        }

        let skip = usize::try_from(spec.skip).unwrap_or(usize::MAX);
        let limit = match spec.limit.unsigned_abs() {
            0 => usize::MAX,
            n => usize::try_from(n).unwrap_or(usize::MAX),
        };

        Ok(found
            .into_iter()
            .skip(skip)
            .take(limit)
            .map(|document| project(&document, spec.projection.as_ref()))
            .collect())
    }

    async fn count(&self, filter: Document) -> Result<u64, StoreError> {
        let documents = self.documents.read().await;
        let mut total = 0;
        for document in documents.iter() {
            if matches(document, &filter)? {
                total += 1;
            }
        }
        Ok(total)
    }

    async fn insert_one(&self, document: Document) -> Result<ObjectId, StoreError> {
        let mut ids = self.insert_many(vec![document]).await?;
        ids.pop()
            .ok_or_else(|| StoreError::Unsupported("insert produced no id".to_string()))
    }

    async fn insert_many(&self, documents: Vec<Document>) -> Result<Vec<ObjectId>, StoreError> {
        let mut prepared = Vec::with_capacity(documents.len());
        let mut ids = Vec::with_capacity(documents.len());
        for mut document in documents {
            let id = match document.get("_id") {
                Some(Bson::ObjectId(id)) => *id,
                Some(other) => {
                    return Err(StoreError::Unsupported(format!(
                        "only ObjectId _id values are supported, got {}",
                        other
                    )))
                }
                None => {
                    let id = ObjectId::new();
                    document.insert("_id", id);
                    id
                }
            };
            prepared.push(document);
            ids.push(id);
        }

        self.documents.write().await.extend(prepared);
        Ok(ids)
    }

    async fn update_one(&self, filter: Document, update: Document) -> Result<u64, StoreError> {
        let mut documents = self.documents.write().await;
        for document in documents.iter_mut() {
            if matches(document, &filter)? {
                let mut updated = document.clone();
                apply_update(&mut updated, &update)?;
                *document = updated;
                return Ok(1);
            }
        }
        Ok(0)
    }

    /// All matching documents are updated or none are.
    async fn update_many(&self, filter: Document, update: Document) -> Result<u64, StoreError> {
        let mut documents = self.documents.write().await;
        let mut staged = Vec::new();
        for (index, document) in documents.iter().enumerate() {
            if matches(document, &filter)? {
                let mut updated = document.clone();
                apply_update(&mut updated, &update)?;
                staged.push((index, updated));
            }
        }

        let matched = staged.len() as u64;
        for (index, updated) in staged {
            documents[index] = updated;
        }
        Ok(matched)
    }

    async fn delete_one(&self, filter: Document) -> Result<u64, StoreError> {
        let mut documents = self.documents.write().await;
        for index in 0..documents.len() {
            if matches(&documents[index], &filter)? {
                documents.remove(index);
                return Ok(1);
            }
        }
        Ok(0)
    }

    async fn delete_many(&self, filter: Document) -> Result<u64, StoreError> {
        let mut documents = self.documents.write().await;
        let mut doomed = Vec::with_capacity(documents.len());
        for document in documents.iter() {
            doomed.push(matches(document, &filter)?);
        }

        let deleted = doomed.iter().filter(|hit| **hit).count() as u64;
        let mut flags = doomed.into_iter();
        documents.retain(|_| !flags.next().unwrap_or(false));
        Ok(deleted)
    }
}

// ============================================================================
// Filter evaluation
// ============================================================================

pub(crate) fn matches(document: &Document, filter: &Document) -> Result<bool, StoreError> {
    for (key, condition) in filter {
        let matched = match key.as_str() {
            "$and" => {
                let mut all = true;
                for sub in sub_filters(condition)? {
                    if !matches(document, sub)? {
                        all = false;
                        break;
                    }
                }
                all
            }
            "$or" => {
                let mut any = false;
                for sub in sub_filters(condition)? {
                    if matches(document, sub)? {
                        any = true;
                        break;
                    }
                }
                any
            }
            "$nor" => {
                let mut none = true;
                for sub in sub_filters(condition)? {
                    if matches(document, sub)? {
                        none = false;
                        break;
                    }
                }
                none
            }
            op if op.starts_with('$') => {
                return Err(StoreError::Unsupported(format!("top-level operator {}", op)))
            }
            path => field_matches(lookup(document, path), condition)?,
        };
        if !matched {
            return Ok(false);
        }
    }
    Ok(true)
}

fn sub_filters(condition: &Bson) -> Result<Vec<&Document>, StoreError> {
    let Bson::Array(items) = condition else {
        return Err(StoreError::Unsupported(
            "logical operators expect an array".to_string(),
        ));
    };
    items
        .iter()
        .map(|item| {
            item.as_document().ok_or_else(|| {
                StoreError::Unsupported("logical operator entries must be documents".to_string())
            })
        })
        .collect()
}

fn lookup<'a>(document: &'a Document, path: &str) -> Option<&'a Bson> {
    match path.split_once('.') {
        None => document.get(path),
        Some((head, rest)) => match document.get(head)? {
            Bson::Document(inner) => lookup(inner, rest),
            _ => None,
        },
    }
}

fn is_operator_document(condition: &Bson) -> bool {
    match condition {
        Bson::Document(ops) => ops.keys().next().is_some_and(|k| k.starts_with('$')),
        _ => false,
    }
}

fn field_matches(value: Option<&Bson>, condition: &Bson) -> Result<bool, StoreError> {
    match condition {
        Bson::Document(ops) if is_operator_document(condition) => {
            for (op, argument) in ops {
                let matched = match op.as_str() {
                    "$eq" => equals(value, argument),
                    "$ne" => !equals(value, argument),
                    "$in" => in_list(value, argument)?,
                    "$nin" => !in_list(value, argument)?,
                    "$gt" => compares(value, argument, |o| o == Ordering::Greater),
                    "$gte" => compares(value, argument, |o| o != Ordering::Less),
                    "$lt" => compares(value, argument, |o| o == Ordering::Less),
                    "$lte" => compares(value, argument, |o| o != Ordering::Greater),
                    "$exists" => value.is_some() == truthy(argument),
                    "$regex" => {
                        let options = ops.get_str("$options").unwrap_or("");
                        regex_matches(value, argument, options)?
                    }
                    "$options" => true,
                    other => {
                        return Err(StoreError::Unsupported(format!("operator {}", other)))
                    }
                };
                if !matched {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        Bson::RegularExpression(re) => {
            regex_matches(value, &Bson::String(re.pattern.clone()), &re.options)
        }
        _ => Ok(equals(value, condition)),
    }
}

fn equals(value: Option<&Bson>, target: &Bson) -> bool {
    match value {
        None => matches!(target, Bson::Null),
        Some(Bson::Array(items)) if !matches!(target, Bson::Array(_)) => {
            items.iter().any(|item| bson_eq(item, target))
        }
        Some(value) => bson_eq(value, target),
    }
}

fn in_list(value: Option<&Bson>, list: &Bson) -> Result<bool, StoreError> {
    let Bson::Array(candidates) = list else {
        return Err(StoreError::Unsupported("$in/$nin expect an array".to_string()));
    };
    Ok(candidates.iter().any(|candidate| equals(value, candidate)))
}

fn compares(value: Option<&Bson>, target: &Bson, accept: impl Fn(Ordering) -> bool) -> bool {
    match value {
        Some(Bson::Array(items)) => items
            .iter()
            .any(|item| compare_values(item, target, false).is_some_and(&accept)),
        Some(value) => compare_values(value, target, false).is_some_and(accept),
        None => false,
    }
}

fn regex_matches(value: Option<&Bson>, pattern: &Bson, options: &str) -> Result<bool, StoreError> {
    let pattern = match pattern {
        Bson::String(p) => p.as_str(),
        Bson::RegularExpression(re) => re.pattern.as_str(),
        _ => return Err(StoreError::Unsupported("$regex expects a string".to_string())),
    };
    let regex = RegexBuilder::new(pattern)
        .case_insensitive(options.contains('i'))
        .multi_line(options.contains('m'))
        .dot_matches_new_line(options.contains('s'))
        .build()
        .map_err(|e| StoreError::Unsupported(format!("invalid regex: {}", e)))?;

    Ok(match value {
        Some(Bson::String(s)) => regex.is_match(s),
        Some(Bson::Array(items)) => items
            .iter()
            .any(|item| matches!(item, Bson::String(s) if regex.is_match(s))),
        _ => false,
    })
}

fn truthy(value: &Bson) -> bool {
    match value {
        Bson::Boolean(b) => *b,
        Bson::Int32(n) => *n != 0,
        Bson::Int64(n) => *n != 0,
        Bson::Double(n) => *n != 0.0,
        Bson::Null => false,
        _ => true,
    }
}

fn as_f64(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(n) => Some(f64::from(*n)),
        Bson::Int64(n) => Some(*n as f64),
        Bson::Double(n) => Some(*n),
        _ => None,
    }
}

fn bson_eq(a: &Bson, b: &Bson) -> bool {
    match (as_f64(a), as_f64(b)) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

fn type_rank(value: &Bson) -> u8 {
    match value {
        Bson::Null => 0,
        Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) => 1,
        Bson::String(_) => 2,
        Bson::Document(_) => 3,
        Bson::Array(_) => 4,
        Bson::ObjectId(_) => 5,
        Bson::Boolean(_) => 6,
        Bson::DateTime(_) => 7,
        _ => 8,
    }
}

/// Orders two values of the same bson type. `collated` compares strings the
/// way an `en_US` collation with default strength would: case-insensitively
/// first, then by code point to keep the order total.
fn compare_values(a: &Bson, b: &Bson, collated: bool) -> Option<Ordering> {
    if let (Some(x), Some(y)) = (as_f64(a), as_f64(b)) {
        return x.partial_cmp(&y);
    }
    match (a, b) {
        (Bson::String(x), Bson::String(y)) if collated => Some(
            x.to_lowercase()
                .cmp(&y.to_lowercase())
                .then_with(|| x.cmp(y)),
        ),
        (Bson::String(x), Bson::String(y)) => Some(x.cmp(y)),
        (Bson::DateTime(x), Bson::DateTime(y)) => Some(x.cmp(y)),
        (Bson::ObjectId(x), Bson::ObjectId(y)) => Some(x.cmp(y)),
        (Bson::Boolean(x), Bson::Boolean(y)) => Some(x.cmp(y)),
        (Bson::Null, Bson::Null) => Some(Ordering::Equal),
        _ => None,
    }
}

fn compare_documents(a: &Document, b: &Document, sort: &Document, collated: bool) -> Ordering {
    for (field, direction) in sort {
        let descending = as_f64(direction).is_some_and(|d| d < 0.0);
        let left = lookup(a, field).unwrap_or(&Bson::Null);
        let right = lookup(b, field).unwrap_or(&Bson::Null);
        let ordering = compare_values(left, right, collated)
            .unwrap_or_else(|| type_rank(left).cmp(&type_rank(right)));
        let ordering = if descending {
            ordering.reverse()
        } else {
            ordering
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

fn project(document: &Document, projection: Option<&Document>) -> Document {
    let Some(projection) = projection else {
        return document.clone();
    };

    let mut fields = projection.iter().filter(|(field, _)| *field != "_id").peekable();
    let inclusive = match fields.peek() {
        None => projection.get("_id").map(truthy).unwrap_or(true),
        Some(_) => fields.any(|(_, flag)| truthy(flag)),
    };

    if inclusive {
        let mut projected = Document::new();
        let keep_id = projection.get("_id").map(truthy).unwrap_or(true);
        if keep_id {
            if let Some(id) = document.get("_id") {
                projected.insert("_id", id.clone());
            }
        }
        for (field, flag) in projection {
            if field == "_id" || !truthy(flag) {
                continue;
            }
            let top = field.split('.').next().unwrap_or(field);
            if let Some(value) = document.get(top) {
                projected.insert(top, value.clone());
            }
        }
        projected
    } else {
        let mut projected = document.clone();
        for (field, flag) in projection {
            if !truthy(flag) {
                projected.remove(field);
            }
        }
        projected
    }
}

// ============================================================================
// Update application
// ============================================================================

pub(crate) fn apply_update(document: &mut Document, update: &Document) -> Result<(), StoreError> {
    for (operator, fields) in update {
        let fields = fields.as_document().ok_or_else(|| {
            StoreError::Unsupported(format!("{} expects a document", operator))
        })?;

        match operator.as_str() {
            "$set" => {
                for (path, value) in fields {
                    set_path(document, path, value.clone());
                }
            }
            "$unset" => {
                for path in fields.keys() {
                    unset_path(document, path);
                }
            }
            "$currentDate" => {
                for path in fields.keys() {
                    set_path(document, path, Bson::DateTime(DateTime::now()));
                }
            }
            "$push" => {
                for (path, value) in fields {
                    let items = match value {
                        Bson::Document(each) if each.contains_key("$each") => each
                            .get_array("$each")
                            .map_err(|_| {
                                StoreError::Unsupported("$each expects an array".to_string())
                            })?
                            .clone(),
                        other => vec![other.clone()],
                    };
                    match get_mut_path(document, path) {
                        Some(Bson::Array(existing)) => existing.extend(items),
                        Some(_) => {
                            return Err(StoreError::Unsupported(format!(
                                "$push target '{}' is not an array",
                                path
                            )))
                        }
                        None => set_path(document, path, Bson::Array(items)),
                    }
                }
            }
            "$pull" => {
                for (path, condition) in fields {
                    if let Some(Bson::Array(existing)) = get_mut_path(document, path) {
                        let mut kept = Vec::with_capacity(existing.len());
                        for item in existing.drain(..) {
                            let remove = if is_operator_document(condition) {
                                field_matches(Some(&item), condition)?
                            } else {
                                bson_eq(&item, condition)
                            };
                            if !remove {
                                kept.push(item);
                            }
                        }
                        *existing = kept;
                    }
                }
            }
            other => {
                return Err(StoreError::Unsupported(format!(
                    "update operator {}",
                    other
                )))
            }
        }
    }
    Ok(())
}

fn set_path(document: &mut Document, path: &str, value: Bson) {
    match path.split_once('.') {
        None => {
            document.insert(path, value);
        }
        Some((head, rest)) => {
            if !matches!(document.get(head), Some(Bson::Document(_))) {
                document.insert(head, Document::new());
            }
            if let Some(Bson::Document(inner)) = document.get_mut(head) {
                set_path(inner, rest, value);
            }
        }
    }
}

fn unset_path(document: &mut Document, path: &str) {
    match path.split_once('.') {
        None => {
            document.remove(path);
        }
        Some((head, rest)) => {
            if let Some(Bson::Document(inner)) = document.get_mut(head) {
                unset_path(inner, rest);
            }
        }
    }
}

fn get_mut_path<'a>(document: &'a mut Document, path: &str) -> Option<&'a mut Bson> {
    match path.split_once('.') {
        None => document.get_mut(path),
        Some((head, rest)) => match document.get_mut(head)? {
            Bson::Document(inner) => get_mut_path(inner, rest),
            _ => None,
        },
    }
}
