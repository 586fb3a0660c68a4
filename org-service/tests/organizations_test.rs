mod common;

use async_trait::async_trait;
use axum::http::{Method, StatusCode};
use bson::{doc, oid::ObjectId, Document};
use common::{body_json, session_from, TestApp, PASSWORD};
use org_service::db::{
    CollectionHandle, DocumentStore, FindSpec, MemoryStore, StoreError, ORGANIZATIONS, POSTS,
    USERS,
};
use org_service::models::BASE_USER;
use serde_json::json;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

/// Memory store whose `users` collection can be told to fail bulk deletes.
struct FlakyUsersStore {
    inner: MemoryStore,
    fail_deletes: Arc<AtomicBool>,
}

struct FlakyUsers {
    inner: Arc<dyn CollectionHandle>,
    fail_deletes: Arc<AtomicBool>,
}

#[async_trait]
impl DocumentStore for FlakyUsersStore {
    fn collection(&self, name: &str) -> Arc<dyn CollectionHandle> {
        let inner = self.inner.collection(name);
        if name == USERS {
            Arc::new(FlakyUsers {
                inner,
                fail_deletes: self.fail_deletes.clone(),
            })
        } else {
            inner
        }
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[async_trait]
impl CollectionHandle for FlakyUsers {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn find_one(
        &self,
        filter: Document,
        projection: Option<Document>,
    ) -> Result<Option<Document>, StoreError> {
        self.inner.find_one(filter, projection).await
    }

    async fn find(&self, filter: Document, spec: FindSpec) -> Result<Vec<Document>, StoreError> {
        self.inner.find(filter, spec).await
    }

    async fn count(&self, filter: Document) -> Result<u64, StoreError> {
        self.inner.count(filter).await
    }

    async fn insert_one(&self, document: Document) -> Result<ObjectId, StoreError> {
        self.inner.insert_one(document).await
    }

    async fn insert_many(&self, documents: Vec<Document>) -> Result<Vec<ObjectId>, StoreError> {
        self.inner.insert_many(documents).await
    }

    async fn update_one(&self, filter: Document, update: Document) -> Result<u64, StoreError> {
        self.inner.update_one(filter, update).await
    }

    async fn update_many(&self, filter: Document, update: Document) -> Result<u64, StoreError> {
        self.inner.update_many(filter, update).await
    }

    async fn delete_one(&self, filter: Document) -> Result<u64, StoreError> {
        self.inner.delete_one(filter).await
    }

    async fn delete_many(&self, filter: Document) -> Result<u64, StoreError> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(StoreError::Unsupported("users delete failed".to_string()));
        }
        self.inner.delete_many(filter).await
    }
}

#[tokio::test]
async fn read_and_update_my_organization() {
    let app = TestApp::spawn().await;
    let admin = app.register("owner@acme.test", "Acme").await;

    let org = body_json(
        app.request(Method::GET, "/api/v1/organizations/me", Some(&admin), None)
            .await,
    )
    .await;
    assert_eq!(org["name"], "Acme");
    assert_eq!(org["email"], "owner@acme.test");

    let response = app
        .request(
            Method::PATCH,
            "/api/v1/organizations/me",
            Some(&admin),
            Some(json!({ "name": "Acme Corp" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let org = body_json(
        app.request(Method::GET, "/api/v1/organizations/me", Some(&admin), None)
            .await,
    )
    .await;
    assert_eq!(org["name"], "Acme Corp");
    assert_eq!(org["email"], "owner@acme.test");

    let response = app
        .request(
            Method::PATCH,
            "/api/v1/organizations/me",
            Some(&admin),
            Some(json!({})),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "Nothing to update");
}

#[tokio::test]
async fn deleting_an_organization_removes_its_users_and_posts() {
    let app = TestApp::spawn().await;
    let acme = app.register("owner@acme.test", "Acme").await;
    let globex = app.register("owner@globex.test", "Globex").await;
    app.invite_and_login(&acme, "member@acme.test", BASE_USER)
        .await;
    for name in ["one", "two"] {
        app.request(
            Method::POST,
            "/api/v1/posts",
            Some(&acme),
            Some(json!({ "name": name })),
        )
        .await;
    }
    app.request(
        Method::POST,
        "/api/v1/posts",
        Some(&globex),
        Some(json!({ "name": "survivor" })),
    )
    .await;

    let response = app
        .request(Method::DELETE, "/api/v1/organizations/me", Some(&acme), None)
        .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    let cleared = session_from(&response);
    assert!(cleared.access_token.is_empty());

    assert_eq!(
        app.login("owner@acme.test", PASSWORD).await.status(),
        StatusCode::UNAUTHORIZED
    );
    assert!(app
        .state
        .users
        .get_by_email_any_org("member@acme.test")
        .await
        .unwrap()
        .is_none());

    // the old token still verifies, but its tenant is gone
    let response = app
        .request(Method::GET, "/api/v1/posts", Some(&acme), None)
        .await;
    assert_eq!(body_json(response).await["total"], 0);

    let response = app
        .request(Method::DELETE, "/api/v1/organizations/me", Some(&acme), None)
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let page = body_json(
        app.request(Method::GET, "/api/v1/posts", Some(&globex), None)
            .await,
    )
    .await;
    assert_eq!(page["total"], 1);
    assert_eq!(
        app.login("owner@globex.test", PASSWORD).await.status(),
        StatusCode::OK
    );
}

#[tokio::test]
async fn failed_user_cascade_fails_the_call_without_rollback() {
    let fail_deletes = Arc::new(AtomicBool::new(false));
    let store = Arc::new(FlakyUsersStore {
        inner: MemoryStore::new(),
        fail_deletes: fail_deletes.clone(),
    });
    let app = TestApp::spawn_with_store(store.clone()).await;
    let acme = app.register("owner@acme.test", "Acme").await;
    app.request(
        Method::POST,
        "/api/v1/posts",
        Some(&acme),
        Some(json!({ "name": "doomed" })),
    )
    .await;

    fail_deletes.store(true, Ordering::SeqCst);
    let response = app
        .request(Method::DELETE, "/api/v1/organizations/me", Some(&acme), None)
        .await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(session_from(&response).access_token.is_empty());

    // the sibling deletes ran to completion and stay done
    for _ in 0..100 {
        if store.inner.collection(ORGANIZATIONS).count(doc! {}).await.unwrap() == 0 {
            break;
        }
        tokio::task::yield_now().await;
    }
    assert_eq!(store.inner.collection(ORGANIZATIONS).count(doc! {}).await.unwrap(), 0);
    assert_eq!(store.inner.collection(POSTS).count(doc! {}).await.unwrap(), 0);
    assert_eq!(store.inner.collection(USERS).count(doc! {}).await.unwrap(), 1);

    // a retry finds the organization gone
    fail_deletes.store(false, Ordering::SeqCst);
    let response = app
        .request(Method::DELETE, "/api/v1/organizations/me", Some(&acme), None)
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(store.inner.collection(USERS).count(doc! {}).await.unwrap(), 0);
}
