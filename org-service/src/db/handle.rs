use super::error::StoreError;
use async_trait::async_trait;
use bson::{doc, oid::ObjectId, Bson, Document};
use futures::TryStreamExt;
use mongodb::{
    options::{ClientOptions, Collation, FindOneOptions, FindOptions, IndexOptions},
    Client, Collection, Database, IndexModel,
};
use std::sync::Arc;

pub const USERS: &str = "users";
pub const ORGANIZATIONS: &str = "organizations";
pub const POSTS: &str = "posts";

/// Locale used when an explicit sort is requested.
pub const SORT_LOCALE: &str = "en_US";

/// Options for a multi-document find.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindSpec {
    pub projection: Option<Document>,
    pub sort: Option<Document>,
    pub collation: Option<String>,
    pub skip: u64,
    pub limit: i64,
}

/// A name-bound handle to one logical collection.
///
/// Everything above this trait speaks plain bson documents, so the executor
/// works the same against MongoDB and the in-process store.
#[async_trait]
pub trait CollectionHandle: Send + Sync {
    fn name(&self) -> &str;

    async fn find_one(
        &self,
        filter: Document,
        projection: Option<Document>,
    ) -> Result<Option<Document>, StoreError>;

    async fn find(&self, filter: Document, spec: FindSpec) -> Result<Vec<Document>, StoreError>;

    async fn count(&self, filter: Document) -> Result<u64, StoreError>;

    async fn insert_one(&self, document: Document) -> Result<ObjectId, StoreError>;

    async fn insert_many(&self, documents: Vec<Document>) -> Result<Vec<ObjectId>, StoreError>;

    async fn update_one(&self, filter: Document, update: Document) -> Result<u64, StoreError>;

    async fn update_many(&self, filter: Document, update: Document) -> Result<u64, StoreError>;

    async fn delete_one(&self, filter: Document) -> Result<u64, StoreError>;

    async fn delete_many(&self, filter: Document) -> Result<u64, StoreError>;
}

/// A logical database that hands out collection handles.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    fn collection(&self, name: &str) -> Arc<dyn CollectionHandle>;

    async fn ping(&self) -> Result<(), StoreError>;
}

fn inserted_object_id(id: Bson) -> Result<ObjectId, StoreError> {
    match id {
        Bson::ObjectId(oid) => Ok(oid),
        other => Err(StoreError::Unsupported(format!(
            "expected ObjectId for inserted _id, got {}",
            other
        ))),
    }
}

#[derive(Clone)]
pub struct MongoCollection {
    inner: Collection<Document>,
}

impl MongoCollection {
    pub fn new(inner: Collection<Document>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl CollectionHandle for MongoCollection {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn find_one(
        &self,
        filter: Document,
        projection: Option<Document>,
    ) -> Result<Option<Document>, StoreError> {
        let options = FindOneOptions::builder().projection(projection).build();
        Ok(self.inner.find_one(filter, options).await?)
    }

    async fn find(&self, filter: Document, spec: FindSpec) -> Result<Vec<Document>, StoreError> {
        let collation = spec
            .collation
            .map(|locale| Collation::builder().locale(locale).build());

        let options = FindOptions::builder()
            .projection(spec.projection)
            .sort(spec.sort)
            .collation(collation)
            .skip(spec.skip)
            .limit(spec.limit)
            .build();

        let cursor = self.inner.find(filter, options).await?;
        Ok(cursor.try_collect().await?)
    }

    async fn count(&self, filter: Document) -> Result<u64, StoreError> {
        Ok(self.inner.count_documents(filter, None).await?)
    }

    async fn insert_one(&self, document: Document) -> Result<ObjectId, StoreError> {
        let result = self.inner.insert_one(document, None).await?;
        inserted_object_id(result.inserted_id)
    }

    async fn insert_many(&self, documents: Vec<Document>) -> Result<Vec<ObjectId>, StoreError> {
        if documents.is_empty() {
            return Ok(Vec::new());
        }
        let result = self.inner.insert_many(documents, None).await?;
        let mut ids: Vec<(usize, Bson)> = result.inserted_ids.into_iter().collect();
        ids.sort_by_key(|(index, _)| *index);
        ids.into_iter().map(|(_, id)| inserted_object_id(id)).collect()
    }

    async fn update_one(&self, filter: Document, update: Document) -> Result<u64, StoreError> {
        Ok(self.inner.update_one(filter, update, None).await?.matched_count)
    }

    async fn update_many(&self, filter: Document, update: Document) -> Result<u64, StoreError> {
        Ok(self.inner.update_many(filter, update, None).await?.matched_count)
    }

    async fn delete_one(&self, filter: Document) -> Result<u64, StoreError> {
        Ok(self.inner.delete_one(filter, None).await?.deleted_count)
    }

    async fn delete_many(&self, filter: Document) -> Result<u64, StoreError> {
        Ok(self.inner.delete_many(filter, None).await?.deleted_count)
    }
}

#[derive(Clone)]
pub struct MongoStore {
    client: Client,
    db: Database,
}

impl MongoStore {
    pub async fn connect(uri: &str, database: &str) -> Result<Self, StoreError> {
        tracing::info!("Connecting to MongoDB");

        let mut options = ClientOptions::parse(uri).await?;
        options.app_name = Some("org-service".to_string());

        let client = Client::with_options(options)?;
        let db = client.database(database);

        tracing::info!(database = %database, "Connected to MongoDB");

        Ok(Self { client, db })
    }

    pub async fn initialize_indexes(&self) -> Result<(), StoreError> {
        tracing::info!("Initializing database indexes");

        let users = self.db.collection::<Document>(USERS);
        users
            .create_indexes(
                vec![
                    IndexModel::builder()
                        .keys(doc! { "email": 1 })
                        .options(IndexOptions::builder().name("email_idx".to_string()).build())
                        .build(),
                    IndexModel::builder()
                        .keys(doc! { "organizationId": 1, "createdAt": -1 })
                        .options(
                            IndexOptions::builder()
                                .name("organization_created_idx".to_string())
                                .build(),
                        )
                        .build(),
                ],
                None,
            )
            .await?;

        let posts = self.db.collection::<Document>(POSTS);
        posts
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "organizationId": 1, "createdAt": -1 })
                    .options(
                        IndexOptions::builder()
                            .name("organization_created_idx".to_string())
                            .build(),
                    )
                    .build(),
                None,
            )
            .await?;

        tracing::info!("Database indexes initialized");
        Ok(())
    }

    pub async fn shutdown(self) {
        self.client.shutdown().await;
    }
}

#[async_trait]
impl DocumentStore for MongoStore {
    fn collection(&self, name: &str) -> Arc<dyn CollectionHandle> {
        Arc::new(MongoCollection::new(self.db.collection::<Document>(name)))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.db.run_command(doc! { "ping": 1 }, None).await?;
        Ok(())
    }
}
