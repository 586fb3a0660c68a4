use bson::DateTime;
use service_core::error::AppError;
use std::collections::HashSet;
use std::sync::Arc;

use super::{
    captcha::CaptchaVerifier,
    email::{EmailProvider, Invite},
    organizations::OrganizationsService,
    otp,
    tokens::TokenService,
    users::{normalize_email, UsersService},
};
use crate::dtos::auth::{LoginRequest, RegisterRequest, ResetPasswordRequest};
use crate::dtos::users::{CreateUserRequest, MAX_BULK_USERS};
use crate::models::{Organization, User, ORGANIZATION_ADMIN};
use crate::utils::{hash_password_blocking, verify_password_blocking, Password, PasswordHashString};

/// Minimum gap between two confirmation codes for the same user.
pub const OTP_RESEND_INTERVAL_MS: i64 = 60_000;

/// Token pair plus the access token's expiry.
#[derive(Debug, Clone)]
pub struct IssuedTokens {
    pub access_token: String,
    pub refresh_token: String,
    pub exp: i64,
}

fn invalid_credentials() -> AppError {
    AppError::Unauthorized(anyhow::anyhow!("Invalid credentials"))
}

fn invalid_otp() -> AppError {
    AppError::BadRequest(anyhow::anyhow!("Invalid OTP"))
}

fn user_not_found() -> AppError {
    AppError::NotFound(anyhow::anyhow!("User not found"))
}

/// Credential, registration and invite flows.
#[derive(Clone)]
pub struct AuthService {
    users: UsersService,
    organizations: OrganizationsService,
    tokens: TokenService,
    email: Arc<dyn EmailProvider>,
    captcha: Arc<dyn CaptchaVerifier>,
}

impl AuthService {
    pub fn new(
        users: UsersService,
        organizations: OrganizationsService,
        tokens: TokenService,
        email: Arc<dyn EmailProvider>,
        captcha: Arc<dyn CaptchaVerifier>,
    ) -> Self {
        Self {
            users,
            organizations,
            tokens,
            email,
            captcha,
        }
    }

    pub fn issue(&self, user: &User) -> Result<IssuedTokens, AppError> {
        let (access_token, exp) = self.tokens.create_access_token(user)?;
        let refresh_token = self.tokens.create_refresh_token(user)?;
        Ok(IssuedTokens {
            access_token,
            refresh_token,
            exp,
        })
    }

    /// An outstanding invite code takes precedence over the password.
    async fn check_credentials(&self, user: &User, secret: &str) -> Result<(), AppError> {
        let hash = user
            .login_otp
            .as_ref()
            .or(user.password.as_ref())
            .ok_or_else(invalid_credentials)?;
        let matches = verify_password_blocking(
            Password::new(secret),
            PasswordHashString::new(hash.clone()),
        )
        .await;
        if matches {
            Ok(())
        } else {
            Err(invalid_credentials())
        }
    }

    #[tracing::instrument(skip_all)]
    pub async fn login(&self, req: LoginRequest) -> Result<IssuedTokens, AppError> {
        self.captcha.verify(&req.captcha_token).await?;

        let user = self
            .users
            .get_by_email_any_org(&req.email)
            .await?
            .ok_or_else(invalid_credentials)?;
        self.check_credentials(&user, &req.password).await?;

        tracing::info!(user_id = %user.id_hex(), "User logged in");
        self.issue(&user)
    }

    #[tracing::instrument(skip_all)]
    pub async fn register(&self, req: RegisterRequest) -> Result<IssuedTokens, AppError> {
        self.captcha.verify(&req.captcha_token).await?;

        if let Some(existing) = self.users.get_by_email_any_org(&req.email).await? {
            let message = if existing.confirmed {
                "User already exists"
            } else {
                "Account already exists, please login"
            };
            return Err(AppError::BadRequest(anyhow::anyhow!(message)));
        }

        let password_hash = hash_password_blocking(Password::new(req.password)).await?;
        let code = otp::generate_confirm_code();

        let mut user = User::new(req.user_name, req.email, String::new(), Vec::new());
        user.password = Some(password_hash.into_string());
        user.confirm_otp = Some(code.clone());
        user.confirm_otp_at = Some(DateTime::now());
        let mut user = self.users.create(user).await?;
        let user_id = user.id_hex();

        self.email
            .send_verification_code(&user.email, &user.name, &code)
            .await?;

        let organization = self
            .organizations
            .create(Organization::new(
                req.organization_name,
                user.email.clone(),
                Some(user_id.clone()),
            ))
            .await?;

        let roles = vec![ORGANIZATION_ADMIN.to_string()];
        self.users
            .assign_organization(&user_id, &organization.id_hex(), &roles)
            .await?;
        user.organization_id = organization.id_hex();
        user.roles = roles;

        tracing::info!(user_id = %user_id, organization_id = %user.organization_id, "Registered");
        self.issue(&user)
    }

    #[tracing::instrument(skip(self, refresh_token))]
    pub async fn refresh(&self, refresh_token: &str) -> Result<(User, IssuedTokens), AppError> {
        let claims = self.tokens.validate_refresh_token(refresh_token)?;
        let user = self
            .users
            .get_by_id_any_org(&claims.user_id)
            .await?
            .ok_or_else(user_not_found)?;
        let tokens = self.issue(&user)?;
        Ok((user, tokens))
    }

    #[tracing::instrument(skip(self, current_password, new_password))]
    pub async fn change_password(
        &self,
        user_id: &str,
        current_password: &str,
        new_password: String,
    ) -> Result<(), AppError> {
        let user = self
            .users
            .get_by_id_any_org(user_id)
            .await?
            .ok_or_else(user_not_found)?;
        self.check_credentials(&user, current_password).await?;

        let hash = hash_password_blocking(Password::new(new_password)).await?;
        self.users.update_password(user_id, hash.as_str()).await?;
        tracing::info!(user_id = %user_id, "Password changed");
        Ok(())
    }

    /// Mails a reset code when the account exists; silent otherwise.
    #[tracing::instrument(skip_all)]
    pub async fn recover_password(&self, email: &str, captcha_token: &str) -> Result<(), AppError> {
        self.captcha.verify(captcha_token).await?;

        let Some(user) = self.users.get_by_email_any_org(email).await? else {
            tracing::info!("Password recovery requested for unknown email");
            return Ok(());
        };

        let code = otp::generate_confirm_code();
        self.users.update_confirm_otp(&user.id_hex(), &code).await?;
        self.email.send_password_reset_code(&user.email, &code).await
    }

    #[tracing::instrument(skip_all)]
    pub async fn reset_password(&self, req: ResetPasswordRequest) -> Result<(), AppError> {
        let user = self
            .users
            .get_by_email_any_org(&req.email)
            .await?
            .ok_or_else(invalid_otp)?;

        let hash = hash_password_blocking(Password::new(req.new_password)).await?;

        // Consuming the code also confirms the account, since only the
        // mailbox owner could have read it.
        if !self.users.validate_confirm_otp(&user.id_hex(), &req.otp).await? {
            return Err(invalid_otp());
        }
        self.users.update_password(&user.id_hex(), hash.as_str()).await?;
        tracing::info!(user_id = %user.id_hex(), "Password reset");
        Ok(())
    }

    /// Issues a new confirmation code, at most once per minute.
    #[tracing::instrument(skip(self))]
    pub async fn send_confirm_otp(&self, user_id: &str) -> Result<(), AppError> {
        let user = self
            .users
            .get_by_id_any_org(user_id)
            .await?
            .ok_or_else(user_not_found)?;

        if let Some(last) = user.confirm_otp_at {
            let elapsed = DateTime::now().timestamp_millis() - last.timestamp_millis();
            if elapsed < OTP_RESEND_INTERVAL_MS {
                return Err(AppError::BadRequest(anyhow::anyhow!(
                    "Please wait 1 minute before requesting another OTP"
                )));
            }
        }

        let code = otp::generate_confirm_code();
        self.users.update_confirm_otp(user_id, &code).await?;
        self.email
            .send_verification_code(&user.email, &user.name, &code)
            .await
    }

    #[tracing::instrument(skip(self, otp))]
    pub async fn validate_confirm_otp(&self, user_id: &str, otp: &str) -> Result<(), AppError> {
        if self.users.validate_confirm_otp(user_id, otp).await? {
            Ok(())
        } else {
            Err(invalid_otp())
        }
    }

    fn invited_user(
        req: CreateUserRequest,
        organization_id: &str,
        invited_by: &str,
        login_otp_hash: String,
    ) -> User {
        let mut user = User::new(req.name, req.email, organization_id.to_string(), vec![req.role]);
        user.confirmed = true;
        user.login_otp = Some(login_otp_hash);
        user.created_by_id = Some(invited_by.to_string());
        user.updated_by_id = Some(invited_by.to_string());
        user
    }

    /// Creates a confirmed user with a one-time login code and mails it.
    #[tracing::instrument(skip(self, req))]
    pub async fn invite(
        &self,
        req: CreateUserRequest,
        organization_id: &str,
        invited_by: &str,
    ) -> Result<User, AppError> {
        if self.users.exists_by_email(&req.email).await? {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "A user with this email address already exists"
            )));
        }

        let code = otp::generate_login_code();
        let hash = hash_password_blocking(Password::new(code.clone())).await?;
        let user = self
            .users
            .create(Self::invited_user(req, organization_id, invited_by, hash.into_string()))
            .await?;

        self.email.send_invite(&user.email, &user.name, &code).await?;
        Ok(user)
    }

    #[tracing::instrument(skip(self, requests), fields(count = requests.len()))]
    pub async fn bulk_invite(
        &self,
        requests: Vec<CreateUserRequest>,
        organization_id: &str,
        invited_by: &str,
    ) -> Result<Vec<User>, AppError> {
        if requests.len() > MAX_BULK_USERS {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Cannot create more than {} users at once",
                MAX_BULK_USERS
            )));
        }

        let mut seen = HashSet::new();
        let duplicates: Vec<String> = requests
            .iter()
            .map(|req| normalize_email(&req.email))
            .filter(|email| !seen.insert(email.clone()))
            .collect();
        if !duplicates.is_empty() {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Duplicate emails in request: {}",
                duplicates.join(", ")
            )));
        }

        let emails: Vec<String> = requests.iter().map(|req| req.email.clone()).collect();
        let existing = self.users.get_by_emails_any_org(&emails).await?;
        if !existing.is_empty() {
            let taken: Vec<String> = existing.into_iter().map(|user| user.email).collect();
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Users with these emails already exist: {}",
                taken.join(", ")
            )));
        }

        let mut pending = Vec::with_capacity(requests.len());
        let mut codes = Vec::with_capacity(requests.len());
        for req in requests {
            let code = otp::generate_login_code();
            let hash = hash_password_blocking(Password::new(code.clone())).await?;
            pending.push(Self::invited_user(req, organization_id, invited_by, hash.into_string()));
            codes.push(code);
        }

        let users = self.users.create_many(pending).await?;
        let invites: Vec<Invite> = users
            .iter()
            .zip(codes)
            .map(|(user, code)| Invite {
                email: user.email.clone(),
                name: user.name.clone(),
                code,
            })
            .collect();
        self.email.bulk_send_invite(&invites).await?;

        tracing::info!(count = users.len(), "Users invited");
        Ok(users)
    }
}
