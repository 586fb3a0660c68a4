use bson::doc;
use service_core::error::AppError;

use super::with_search;
use crate::db::{
    set_fields, DocumentStore, Page, PageResult, QueryExecutor, SortSpec, UpdateDocBuilder,
    ORGANIZATIONS,
};
use crate::dtos::organizations::UpdateOrganizationRequest;
use crate::models::Organization;

#[derive(Clone)]
pub struct OrganizationsService {
    organizations: QueryExecutor<Organization>,
}

impl OrganizationsService {
    pub fn new(store: &dyn DocumentStore) -> Self {
        Self {
            organizations: QueryExecutor::new(store.collection(ORGANIZATIONS)),
        }
    }

    #[tracing::instrument(skip_all, fields(name = %organization.name))]
    pub async fn create(&self, mut organization: Organization) -> Result<Organization, AppError> {
        let id = self.organizations.insert_one(&organization).await?;
        organization.id = Some(id);
        tracing::info!(organization_id = %id, "Organization created");
        Ok(organization)
    }

    pub async fn get_by_id(&self, id: &str) -> Result<Option<Organization>, AppError> {
        Ok(self.organizations.find_by_id(id, None).await?)
    }

    /// Tenant-agnostic listing, reserved for super users.
    pub async fn get_many(
        &self,
        page: Page,
        sort: Option<SortSpec>,
        search: Option<&str>,
    ) -> Result<PageResult<Organization>, AppError> {
        let filter = with_search(doc! {}, search);
        Ok(self.organizations.find_many(filter, page, None, sort).await?)
    }

    #[tracing::instrument(skip(self, changes))]
    pub async fn update(
        &self,
        id: &str,
        changes: &UpdateOrganizationRequest,
        updated_by_id: &str,
    ) -> Result<u64, AppError> {
        let fields = set_fields(changes)?;
        if fields.is_empty() {
            return Err(AppError::BadRequest(anyhow::anyhow!("Nothing to update")));
        }
        let update = UpdateDocBuilder::new()
            .with_set(fields)
            .with_set(doc! { "updatedById": updated_by_id })
            .build();
        Ok(self.organizations.update_one(id, update).await?)
    }

    pub async fn delete(&self, id: &str) -> Result<u64, AppError> {
        Ok(self.organizations.delete_by_id(id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;

    #[tokio::test]
    async fn update_requires_a_change() {
        let store = MemoryStore::new();
        let organizations = OrganizationsService::new(&store);
        let created = organizations
            .create(Organization::new("Acme".to_string(), "a@acme.io".to_string(), None))
            .await
            .unwrap();
        let id = created.id_hex();

        let err = organizations
            .update(&id, &UpdateOrganizationRequest::default(), "u")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));

        let changes = UpdateOrganizationRequest {
            name: Some("Acme Ltd".to_string()),
            email: None,
        };
        assert_eq!(organizations.update(&id, &changes, "u").await.unwrap(), 1);
        let stored = organizations.get_by_id(&id).await.unwrap().unwrap();
        assert_eq!(stored.name, "Acme Ltd");
        assert_eq!(stored.email, "a@acme.io");
        assert_eq!(stored.updated_by_id.as_deref(), Some("u"));
    }

    #[tokio::test]
    async fn listing_spans_all_tenants() {
        let store = MemoryStore::new();
        let organizations = OrganizationsService::new(&store);
        for name in ["Beta", "alpha", "Gamma"] {
            organizations
                .create(Organization::new(name.to_string(), format!("{}@x.io", name), None))
                .await
                .unwrap();
        }

        let page = organizations
            .get_many(Page::default(), SortSpec::from_params(Some("name"), Some("asc")), None)
            .await
            .unwrap();
        let names: Vec<_> = page.items.iter().map(|o| o.name.as_str()).collect();
        assert_eq!(names, vec!["alpha", "Beta", "Gamma"]);
    }
}
