use bson::{doc, Document};
use service_core::error::AppError;

use super::with_search;
use crate::db::{
    parse_object_id, DocumentStore, Page, PageResult, QueryExecutor, SortSpec, UpdateDocBuilder,
    POSTS,
};
use crate::models::Post;

#[derive(Clone)]
pub struct PostsService {
    posts: QueryExecutor<Post>,
}

fn by_id_in_org(id: &str, organization_id: &str) -> Result<Document, AppError> {
    Ok(doc! { "_id": parse_object_id(id)?, "organizationId": organization_id })
}

impl PostsService {
    pub fn new(store: &dyn DocumentStore) -> Self {
        Self {
            posts: QueryExecutor::new(store.collection(POSTS)),
        }
    }

    #[tracing::instrument(skip_all, fields(organization_id = %post.organization_id))]
    pub async fn create(&self, mut post: Post) -> Result<Post, AppError> {
        let id = self.posts.insert_one(&post).await?;
        post.id = Some(id);
        Ok(post)
    }

    pub async fn get_by_id(&self, id: &str, organization_id: &str) -> Result<Option<Post>, AppError> {
        Ok(self
            .posts
            .find_one(by_id_in_org(id, organization_id)?, None)
            .await?)
    }

    pub async fn get_many(
        &self,
        organization_id: &str,
        page: Page,
        sort: Option<SortSpec>,
        search: Option<&str>,
    ) -> Result<PageResult<Post>, AppError> {
        let filter = with_search(doc! { "organizationId": organization_id }, search);
        Ok(self.posts.find_many(filter, page, None, sort).await?)
    }

    #[tracing::instrument(skip(self, name))]
    pub async fn update(
        &self,
        id: &str,
        organization_id: &str,
        name: &str,
        updated_by_id: &str,
    ) -> Result<u64, AppError> {
        let update = UpdateDocBuilder::new()
            .with_set(doc! { "name": name, "updatedById": updated_by_id })
            .build();
        Ok(self
            .posts
            .update_one_where(by_id_in_org(id, organization_id)?, update)
            .await?)
    }

    pub async fn delete(&self, id: &str, organization_id: &str) -> Result<u64, AppError> {
        Ok(self
            .posts
            .delete_one(by_id_in_org(id, organization_id)?)
            .await?)
    }

    pub async fn delete_all_for_organization(&self, organization_id: &str) -> Result<u64, AppError> {
        let deleted = self
            .posts
            .delete_many(doc! { "organizationId": organization_id })
            .await?;
        tracing::info!(organization_id = %organization_id, deleted, "Organization posts deleted");
        Ok(deleted)
    }
}
