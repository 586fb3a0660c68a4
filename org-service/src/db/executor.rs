use super::error::StoreError;
use super::handle::{CollectionHandle, FindSpec, SORT_LOCALE};
use super::update::UpdateDoc;
use bson::{doc, oid::ObjectId, Document};
use serde::{de::DeserializeOwned, Serialize};
use std::{future::Future, marker::PhantomData, sync::Arc, time::Duration};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);
pub const UPDATE_MANY_TIMEOUT: Duration = Duration::from_secs(60);

pub const DEFAULT_LIMIT: u64 = 10;
pub const MAX_LIMIT: u64 = 1000;

/// Normalized pagination window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub limit: u64,
    pub offset: u64,
}

impl Default for Page {
    fn default() -> Self {
        Self {
            limit: DEFAULT_LIMIT,
            offset: 0,
        }
    }
}

impl Page {
    /// Non-positive limits fall back to the default; large ones are clamped.
    pub fn new(limit: i64, offset: i64) -> Self {
        let limit = match u64::try_from(limit) {
            Ok(0) | Err(_) => DEFAULT_LIMIT,
            Ok(n) => n.min(MAX_LIMIT),
        };
        let offset = u64::try_from(offset).unwrap_or(0);
        Self { limit, offset }
    }

    /// Builds a page from raw query-string values; unparsable input is
    /// treated as absent.
    pub fn from_params(limit: Option<&str>, offset: Option<&str>) -> Self {
        let limit = limit
            .and_then(|l| l.trim().parse::<i64>().ok())
            .unwrap_or(0);
        let offset = offset
            .and_then(|o| o.trim().parse::<i64>().ok())
            .unwrap_or(0);
        Self::new(limit, offset)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn from_param(sort: Option<&str>) -> Self {
        match sort {
            Some("asc") => SortDirection::Asc,
            _ => SortDirection::Desc,
        }
    }

    pub fn value(self) -> i32 {
        match self {
            SortDirection::Asc => 1,
            SortDirection::Desc => -1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortSpec {
    pub field: String,
    pub direction: SortDirection,
}

impl SortSpec {
    pub fn from_params(order_by: Option<&str>, sort: Option<&str>) -> Option<Self> {
        let field = order_by.map(str::trim).filter(|f| !f.is_empty())?;
        Some(Self {
            field: field.to_string(),
            direction: SortDirection::from_param(sort),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PageResult<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub has_next: bool,
    pub page: Page,
}

impl<T> PageResult<T> {
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> PageResult<U> {
        PageResult {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            has_next: self.has_next,
            page: self.page,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub default: Duration,
    pub update_many: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            default: DEFAULT_TIMEOUT,
            update_many: UPDATE_MANY_TIMEOUT,
        }
    }
}

pub fn parse_object_id(id: &str) -> Result<ObjectId, StoreError> {
    ObjectId::parse_str(id).map_err(|_| StoreError::InvalidId(id.to_string()))
}

/// Converts a list of hex ids, failing on the first malformed one.
pub fn object_ids<S: AsRef<str>>(ids: &[S]) -> Result<Vec<ObjectId>, StoreError> {
    ids.iter().map(|id| parse_object_id(id.as_ref())).collect()
}

/// Typed, time-bounded access to one collection.
///
/// Every operation runs under a timeout; nothing is retried here. "Not found"
/// is `Ok(None)` and zero-row deletes are `Ok(0)`.
pub struct QueryExecutor<T> {
    handle: Arc<dyn CollectionHandle>,
    timeouts: Timeouts,
    _entity: PhantomData<fn() -> T>,
}

impl<T> Clone for QueryExecutor<T> {
    fn clone(&self) -> Self {
        Self {
            handle: self.handle.clone(),
            timeouts: self.timeouts,
            _entity: PhantomData,
        }
    }
}

impl<T> QueryExecutor<T>
where
    T: Serialize + DeserializeOwned + Send + Sync,
{
    pub fn new(handle: Arc<dyn CollectionHandle>) -> Self {
        Self {
            handle,
            timeouts: Timeouts::default(),
            _entity: PhantomData,
        }
    }

    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn collection_name(&self) -> &str {
        self.handle.name()
    }

    async fn bounded<R>(
        &self,
        operation: &'static str,
        after: Duration,
        op: impl Future<Output = Result<R, StoreError>>,
    ) -> Result<R, StoreError> {
        match tokio::time::timeout(after, op).await {
            Ok(result) => result,
            Err(_) => {
                tracing::error!(
                    collection = %self.handle.name(),
                    operation,
                    timeout_ms = after.as_millis() as u64,
                    "Store operation timed out"
                );
                Err(StoreError::Timeout {
                    collection: self.handle.name().to_string(),
                    operation,
                    after,
                })
            }
        }
    }

    fn decode(document: Document) -> Result<T, StoreError> {
        Ok(bson::from_document(document)?)
    }

    pub async fn find_one(
        &self,
        filter: Document,
        projection: Option<Document>,
    ) -> Result<Option<T>, StoreError> {
        let found = self
            .bounded(
                "find_one",
                self.timeouts.default,
                self.handle.find_one(filter, projection),
            )
            .await?;
        found.map(Self::decode).transpose()
    }

    pub async fn find_by_id(
        &self,
        id: &str,
        projection: Option<Document>,
    ) -> Result<Option<T>, StoreError> {
        let oid = parse_object_id(id)?;
        self.find_one(doc! { "_id": oid }, projection).await
    }

    /// Counts and fetches concurrently against the same filter.
    ///
    /// Without an explicit sort the newest documents come first; an explicit
    /// sort uses the `en_US` collation.
    #[tracing::instrument(skip_all, fields(collection = %self.handle.name(), limit = page.limit, offset = page.offset))]
    pub async fn find_many(
        &self,
        filter: Document,
        page: Page,
        projection: Option<Document>,
        sort: Option<SortSpec>,
    ) -> Result<PageResult<T>, StoreError> {
        let (sort, collation) = match sort {
            Some(spec) => {
                let mut sort = Document::new();
                sort.insert(spec.field, spec.direction.value());
                (sort, Some(SORT_LOCALE.to_string()))
            }
            None => (doc! { "createdAt": -1 }, None),
        };

        let spec = FindSpec {
            projection,
            sort: Some(sort),
            collation,
            skip: page.offset,
            limit: i64::try_from(page.limit).unwrap_or(i64::MAX),
        };

        let count = self.bounded("count", self.timeouts.default, self.handle.count(filter.clone()));
        let fetch = self.bounded("find", self.timeouts.default, self.handle.find(filter, spec));
        let (total, documents) = tokio::try_join!(count, fetch)?;

        let items = documents
            .into_iter()
            .map(Self::decode)
            .collect::<Result<Vec<T>, _>>()?;

        Ok(PageResult {
            items,
            total,
            has_next: total > page.offset + page.limit,
            page,
        })
    }

    pub async fn insert_one(&self, entity: &T) -> Result<ObjectId, StoreError> {
        let document = bson::to_document(entity)?;
        self.bounded(
            "insert_one",
            self.timeouts.default,
            self.handle.insert_one(document),
        )
        .await
    }

    pub async fn insert_many(&self, entities: &[T]) -> Result<Vec<ObjectId>, StoreError> {
        let documents = entities
            .iter()
            .map(bson::to_document)
            .collect::<Result<Vec<_>, _>>()?;
        self.bounded(
            "insert_many",
            self.timeouts.default,
            self.handle.insert_many(documents),
        )
        .await
    }

    pub async fn update_one(&self, id: &str, update: UpdateDoc) -> Result<u64, StoreError> {
        let oid = parse_object_id(id)?;
        self.update_one_where(doc! { "_id": oid }, update).await
    }

    pub async fn update_one_where(
        &self,
        filter: Document,
        update: UpdateDoc,
    ) -> Result<u64, StoreError> {
        if !update.has_changes() {
            return Err(StoreError::EmptyUpdate);
        }
        self.bounded(
            "update_one",
            self.timeouts.default,
            self.handle.update_one(filter, update.into_document()),
        )
        .await
    }

    pub async fn update_many(&self, filter: Document, update: UpdateDoc) -> Result<u64, StoreError> {
        if !update.has_changes() {
            return Err(StoreError::EmptyUpdate);
        }
        self.bounded(
            "update_many",
            self.timeouts.update_many,
            self.handle.update_many(filter, update.into_document()),
        )
        .await
    }

    pub async fn delete_by_id(&self, id: &str) -> Result<u64, StoreError> {
        let oid = parse_object_id(id)?;
        self.delete_one(doc! { "_id": oid }).await
    }

    pub async fn delete_one(&self, filter: Document) -> Result<u64, StoreError> {
        self.bounded(
            "delete_one",
            self.timeouts.default,
            self.handle.delete_one(filter),
        )
        .await
    }

    pub async fn delete_many(&self, filter: Document) -> Result<u64, StoreError> {
        self.bounded(
            "delete_many",
            self.timeouts.default,
            self.handle.delete_many(filter),
        )
        .await
    }

    pub async fn count(&self, filter: Document) -> Result<u64, StoreError> {
        self.bounded("count", self.timeouts.default, self.handle.count(filter))
            .await
    }

    /// Tenant-scoped existence check with an `_id`-only projection.
    pub async fn exists_by_id(&self, id: &str, organization_id: &str) -> Result<bool, StoreError> {
        let oid = parse_object_id(id)?;
        let found = self
            .bounded(
                "find_one",
                self.timeouts.default,
                self.handle.find_one(
                    doc! { "_id": oid, "organizationId": organization_id },
                    Some(doc! { "_id": 1 }),
                ),
            )
            .await?;
        Ok(found.is_some())
    }
}
