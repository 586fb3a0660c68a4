use bson::{doc, DateTime, Document};
use service_core::error::AppError;

use super::with_search;
use crate::db::{
    parse_object_id, set_fields, DocumentStore, Page, PageResult, QueryExecutor, SortSpec,
    UpdateDocBuilder, USERS,
};
use crate::models::{User, ORGANIZATION_ADMIN};

/// Stored in `confirmOtp` once a code has been used.
pub const CONSUMED_OTP: &str = "-";

/// Profile changes an admin or the user may apply.
#[derive(Debug, Default, Clone, serde::Serialize)]
pub struct UserChanges {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roles: Option<Vec<String>>,
    /// New confirmation code, set alongside an email change.
    #[serde(rename = "confirmOtp", skip_serializing_if = "Option::is_none")]
    pub confirm_otp: Option<String>,
    #[serde(rename = "updatedById", skip_serializing_if = "Option::is_none")]
    pub updated_by_id: Option<String>,
}

#[derive(Clone)]
pub struct UsersService {
    users: QueryExecutor<User>,
}

fn by_id_in_org(id: &str, organization_id: &str) -> Result<Document, AppError> {
    Ok(doc! { "_id": parse_object_id(id)?, "organizationId": organization_id })
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

impl UsersService {
    pub fn new(store: &dyn DocumentStore) -> Self {
        Self {
            users: QueryExecutor::new(store.collection(USERS)),
        }
    }

    /// Inserts and returns the user with its assigned id.
    #[tracing::instrument(skip_all, fields(organization_id = %user.organization_id))]
    pub async fn create(&self, mut user: User) -> Result<User, AppError> {
        user.email = normalize_email(&user.email);
        let id = self.users.insert_one(&user).await?;
        user.id = Some(id);
        tracing::info!(user_id = %id, "User created");
        Ok(user)
    }

    #[tracing::instrument(skip_all, fields(count = users.len()))]
    pub async fn create_many(&self, mut users: Vec<User>) -> Result<Vec<User>, AppError> {
        for user in users.iter_mut() {
            user.email = normalize_email(&user.email);
        }
        let ids = self.users.insert_many(&users).await?;
        for (user, id) in users.iter_mut().zip(ids) {
            user.id = Some(id);
        }
        Ok(users)
    }

    pub async fn exists_by_email(&self, email: &str) -> Result<bool, AppError> {
        Ok(self.get_by_email_any_org(email).await?.is_some())
    }

    /// Email lookup across every organization.
    pub async fn get_by_email_any_org(&self, email: &str) -> Result<Option<User>, AppError> {
        Ok(self
            .users
            .find_one(doc! { "email": normalize_email(email) }, None)
            .await?)
    }

    pub async fn get_by_emails_any_org(&self, emails: &[String]) -> Result<Vec<User>, AppError> {
        if emails.is_empty() {
            return Ok(Vec::new());
        }
        let emails: Vec<String> = emails.iter().map(|e| normalize_email(e)).collect();
        let page = Page::new(emails.len() as i64, 0);
        let found = self
            .users
            .find_many(doc! { "email": { "$in": emails } }, page, None, None)
            .await?;
        Ok(found.items)
    }

    pub async fn get_by_id(&self, id: &str, organization_id: &str) -> Result<Option<User>, AppError> {
        Ok(self
            .users
            .find_one(by_id_in_org(id, organization_id)?, None)
            .await?)
    }

    /// Id lookup without tenant scope, for token refresh and `/users/me`.
    pub async fn get_by_id_any_org(&self, id: &str) -> Result<Option<User>, AppError> {
        Ok(self.users.find_by_id(id, None).await?)
    }

    pub async fn exists(&self, id: &str, organization_id: &str) -> Result<bool, AppError> {
        Ok(self.users.exists_by_id(id, organization_id).await?)
    }

    #[tracing::instrument(skip(self, sort), fields(limit = page.limit, offset = page.offset))]
    pub async fn get_many(
        &self,
        organization_id: &str,
        page: Page,
        sort: Option<SortSpec>,
        search: Option<&str>,
    ) -> Result<PageResult<User>, AppError> {
        let filter = with_search(doc! { "organizationId": organization_id }, search);
        Ok(self.users.find_many(filter, page, None, sort).await?)
    }

    /// Stores a fresh confirmation code and stamps `confirmOtpAt`.
    #[tracing::instrument(skip(self, code))]
    pub async fn update_confirm_otp(&self, id: &str, code: &str) -> Result<u64, AppError> {
        let update = UpdateDocBuilder::new()
            .with_set(doc! { "confirmOtp": code, "confirmOtpAt": DateTime::now() })
            .build();
        Ok(self.users.update_one(id, update).await?)
    }

    /// Consumes a matching confirmation code and marks the user confirmed.
    /// Returns false when the code does not match.
    #[tracing::instrument(skip(self, otp))]
    pub async fn validate_confirm_otp(&self, id: &str, otp: &str) -> Result<bool, AppError> {
        if otp == CONSUMED_OTP {
            return Ok(false);
        }
        let update = UpdateDocBuilder::new()
            .with_set(doc! { "confirmed": true, "confirmOtp": CONSUMED_OTP })
            .build();
        let matched = self
            .users
            .update_one_where(doc! { "_id": parse_object_id(id)?, "confirmOtp": otp }, update)
            .await?;
        Ok(matched > 0)
    }

    /// Sets a new password hash, revokes any invite login code and burns the
    /// confirmation code.
    #[tracing::instrument(skip(self, password_hash))]
    pub async fn update_password(&self, id: &str, password_hash: &str) -> Result<u64, AppError> {
        let update = UpdateDocBuilder::new()
            .with_set(doc! {
                "password": password_hash,
                "loginOtp": bson::Bson::Null,
                "confirmOtp": CONSUMED_OTP,
            })
            .build();
        Ok(self.users.update_one(id, update).await?)
    }

    pub async fn set_login_otp(&self, id: &str, login_otp_hash: &str) -> Result<u64, AppError> {
        let update = UpdateDocBuilder::new()
            .with_set(doc! { "loginOtp": login_otp_hash })
            .build();
        Ok(self.users.update_one(id, update).await?)
    }

    pub async fn assign_organization(
        &self,
        id: &str,
        organization_id: &str,
        roles: &[String],
    ) -> Result<u64, AppError> {
        let update = UpdateDocBuilder::new()
            .with_set(doc! { "organizationId": organization_id, "roles": roles.to_vec() })
            .build();
        Ok(self.users.update_one(id, update).await?)
    }

    /// Tenant-scoped profile update; returns the matched count.
    #[tracing::instrument(skip(self, changes))]
    pub async fn update(
        &self,
        id: &str,
        organization_id: &str,
        changes: &UserChanges,
    ) -> Result<u64, AppError> {
        let mut fields = set_fields(changes)?;
        if let Ok(email) = fields.get_str("email") {
            let email = normalize_email(email);
            fields.insert("email", email);
        }
        let mut builder = UpdateDocBuilder::new().with_set(fields);
        if changes.email.is_some() {
            builder = builder.with_set(doc! { "confirmed": false, "confirmOtpAt": DateTime::now() });
        }
        Ok(self
            .users
            .update_one_where(by_id_in_org(id, organization_id)?, builder.build())
            .await?)
    }

    pub async fn delete(&self, id: &str, organization_id: &str) -> Result<u64, AppError> {
        Ok(self
            .users
            .delete_one(by_id_in_org(id, organization_id)?)
            .await?)
    }

    pub async fn count_org_admins(&self, organization_id: &str) -> Result<u64, AppError> {
        Ok(self
            .users
            .count(doc! { "organizationId": organization_id, "roles": ORGANIZATION_ADMIN })
            .await?)
    }

    pub async fn delete_all_for_organization(&self, organization_id: &str) -> Result<u64, AppError> {
        let deleted = self
            .users
            .delete_many(doc! { "organizationId": organization_id })
            .await?;
        tracing::info!(organization_id = %organization_id, deleted, "Organization users deleted");
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;
    use crate::models::BASE_USER;
    use bson::oid::ObjectId;

    fn user(email: &str, org: &str, roles: &[&str]) -> User {
        User::new(
            "Test".to_string(),
            email.to_string(),
            org.to_string(),
            roles.iter().map(|r| r.to_string()).collect(),
        )
    }

    #[tokio::test]
    async fn emails_are_matched_case_insensitively() {
        let store = MemoryStore::new();
        let users = UsersService::new(&store);
        users.create(user("Ada@Example.com", "org", &[])).await.unwrap();

        assert!(users.exists_by_email("ada@example.com ").await.unwrap());
        let found = users
            .get_by_emails_any_org(&["ADA@example.com".to_string(), "x@y.z".to_string()])
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
    }

    #[tokio::test]
    async fn confirm_code_is_single_use() {
        let store = MemoryStore::new();
        let users = UsersService::new(&store);
        let created = users.create(user("a@example.com", "org", &[])).await.unwrap();
        let id = created.id_hex();

        users.update_confirm_otp(&id, "4321").await.unwrap();
        let stored = users.get_by_id_any_org(&id).await.unwrap().unwrap();
        assert!(stored.confirm_otp_at.is_some());

        assert!(!users.validate_confirm_otp(&id, "0000").await.unwrap());
        assert!(users.validate_confirm_otp(&id, "4321").await.unwrap());
        assert!(!users.validate_confirm_otp(&id, "4321").await.unwrap());
        assert!(!users.validate_confirm_otp(&id, CONSUMED_OTP).await.unwrap());

        let stored = users.get_by_id_any_org(&id).await.unwrap().unwrap();
        assert!(stored.confirmed);
    }

    #[tokio::test]
    async fn password_update_revokes_login_code() {
        let store = MemoryStore::new();
        let users = UsersService::new(&store);
        let created = users.create(user("a@example.com", "org", &[])).await.unwrap();
        let id = created.id_hex();

        users.set_login_otp(&id, "otp-hash").await.unwrap();
        users.update_password(&id, "pw-hash").await.unwrap();

        let stored = users.get_by_id_any_org(&id).await.unwrap().unwrap();
        assert_eq!(stored.password.as_deref(), Some("pw-hash"));
        assert_eq!(stored.login_otp, None);
    }

    #[tokio::test]
    async fn scoped_operations_ignore_other_tenants() {
        let store = MemoryStore::new();
        let users = UsersService::new(&store);
        let org_a = ObjectId::new().to_hex();
        let org_b = ObjectId::new().to_hex();
        let foreign = users.create(user("b@example.com", &org_b, &[BASE_USER])).await.unwrap();
        let id = foreign.id_hex();

        assert!(users.get_by_id(&id, &org_a).await.unwrap().is_none());
        assert!(!users.exists(&id, &org_a).await.unwrap());
        assert_eq!(users.delete(&id, &org_a).await.unwrap(), 0);
        let changes = UserChanges {
            name: Some("Mallory".to_string()),
            ..Default::default()
        };
        assert_eq!(users.update(&id, &org_a, &changes).await.unwrap(), 0);
        assert_eq!(users.get_by_id(&id, &org_b).await.unwrap().unwrap().name, "Test");
    }

    #[tokio::test]
    async fn email_change_unconfirms() {
        let store = MemoryStore::new();
        let users = UsersService::new(&store);
        let mut seed = user("a@example.com", "org", &[]);
        seed.confirmed = true;
        let id = users.create(seed).await.unwrap().id_hex();

        let changes = UserChanges {
            email: Some("New@Example.com".to_string()),
            confirm_otp: Some("9999".to_string()),
            ..Default::default()
        };
        assert_eq!(users.update(&id, "org", &changes).await.unwrap(), 1);

        let stored = users.get_by_id(&id, "org").await.unwrap().unwrap();
        assert_eq!(stored.email, "new@example.com");
        assert!(!stored.confirmed);
        assert_eq!(stored.confirm_otp.as_deref(), Some("9999"));
    }

    #[tokio::test]
    async fn search_and_admin_count() {
        let store = MemoryStore::new();
        let users = UsersService::new(&store);
        for (email, roles) in [
            ("a@example.com", vec![ORGANIZATION_ADMIN]),
            ("b@example.com", vec![BASE_USER]),
            ("c@example.com", vec![ORGANIZATION_ADMIN, BASE_USER]),
        ] {
            let mut u = user(email, "org", &roles);
            u.name = format!("Name {}", email);
            users.create(u).await.unwrap();
        }

        assert_eq!(users.count_org_admins("org").await.unwrap(), 2);
        let found = users
            .get_many("org", Page::default(), None, Some("B@EXAMPLE"))
            .await
            .unwrap();
        assert_eq!(found.total, 1);
        let none = users
            .get_many("org", Page::default(), None, Some(".*"))
            .await
            .unwrap();
        assert_eq!(none.total, 0);
        assert_eq!(users.delete_all_for_organization("org").await.unwrap(), 3);
    }
}
