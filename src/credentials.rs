/*!
 * Temporary credentials for the source account
 *
 * The source bucket lives in another account. Before anything can be read from it
 * the caller exchanges a role ARN for a short-lived [`CredentialBundle`]; the
 * bundle is then used to build exactly one source-scoped storage client.
 */

use crate::error::AuthorizationError;
use async_trait::async_trait;
use secrecy::SecretString;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tracing::{debug, info};

/// Session label used when none is configured
pub const DEFAULT_SESSION_LABEL: &str = "CrossAccountSession";

/// Short-lived credentials scoped to the source account
///
/// The secret key and session token stay wrapped in [`SecretString`]; they are
/// only exposed when a storage client is built from the bundle.
#[derive(Clone, Debug)]
pub struct CredentialBundle {
    access_key_id: String,
    secret_access_key: SecretString,
    session_token: SecretString,
    expiry: Option<SystemTime>,
}

impl CredentialBundle {
    pub fn new(
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
        session_token: impl Into<String>,
        expiry: Option<SystemTime>,
    ) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: SecretString::from(secret_access_key.into()),
            session_token: SecretString::from(session_token.into()),
            expiry,
        }
    }

    pub fn access_key_id(&self) -> &str {
        &self.access_key_id
    }

    pub fn secret_access_key(&self) -> &SecretString {
        &self.secret_access_key
    }

    pub fn session_token(&self) -> &SecretString {
        &self.session_token
    }

    /// When the issuer said the credentials stop working
    pub fn expiry(&self) -> Option<SystemTime> {
        self.expiry
    }

    /// Whether the bundle has expired as of `now`
    ///
    /// A bundle without an expiry never reports as expired.
    pub fn is_expired_at(&self, now: SystemTime) -> bool {
        self.expiry.is_some_and(|expiry| expiry <= now)
    }

    /// Time left before expiry as of `now`
    pub fn remaining_at(&self, now: SystemTime) -> Option<Duration> {
        self.expiry
            .map(|expiry| expiry.duration_since(now).unwrap_or(Duration::ZERO))
    }
}

/// Issues temporary credentials for a role
#[async_trait]
pub trait IdentityIssuer: Send + Sync {
    async fn assume_identity(
        &self,
        role_arn: &str,
        session_label: &str,
    ) -> Result<CredentialBundle, AuthorizationError>;
}

/// [`IdentityIssuer`] backed by AWS STS `AssumeRole`
#[derive(Clone, Debug)]
pub struct StsIssuer {
    client: aws_sdk_sts::Client,
}

impl StsIssuer {
    /// Build an STS client from the caller's ambient identity
    pub async fn from_env(region: Option<String>) -> Self {
        use aws_config::meta::region::RegionProviderChain;
        use aws_config::BehaviorVersion;

        let region_provider = match region {
            Some(region) => RegionProviderChain::first_try(aws_sdk_sts::config::Region::new(region)),
            None => RegionProviderChain::default_provider(),
        };
        let sdk_config = aws_config::defaults(BehaviorVersion::latest())
            .region(region_provider)
            .load()
            .await;

        Self {
            client: aws_sdk_sts::Client::new(&sdk_config),
        }
    }

    pub fn from_client(client: aws_sdk_sts::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl IdentityIssuer for StsIssuer {
    async fn assume_identity(
        &self,
        role_arn: &str,
        session_label: &str,
    ) -> Result<CredentialBundle, AuthorizationError> {
        let response = self
            .client
            .assume_role()
            .role_arn(role_arn)
            .role_session_name(session_label)
            .send()
            .await
            .map_err(|e| {
                AuthorizationError::new(
                    role_arn,
                    aws_sdk_sts::error::DisplayErrorContext(&e).to_string(),
                )
            })?;

        let credentials = response.credentials().ok_or_else(|| {
            AuthorizationError::new(role_arn, "AssumeRole returned no credentials")
        })?;

        Ok(CredentialBundle::new(
            credentials.access_key_id(),
            credentials.secret_access_key(),
            credentials.session_token(),
            SystemTime::try_from(*credentials.expiration()).ok(),
        ))
    }
}

/// Exchanges a role identifier for a [`CredentialBundle`]
///
/// Exactly one issuance call per invocation; failures are returned as-is and never retried.
#[derive(Clone)]
pub struct CredentialBroker {
    issuer: Arc<dyn IdentityIssuer>,
}

impl CredentialBroker {
    pub fn new(issuer: Arc<dyn IdentityIssuer>) -> Self {
        Self { issuer }
    }

    pub async fn assume_identity(
        &self,
        role_arn: &str,
        session_label: &str,
    ) -> Result<CredentialBundle, AuthorizationError> {
        if role_arn.trim().is_empty() {
            return Err(AuthorizationError::new(role_arn, "role ARN is empty"));
        }
        if session_label.trim().is_empty() {
            return Err(AuthorizationError::new(role_arn, "session label is empty"));
        }

        info!(role_arn, session_label, "Assuming source account role");
        let bundle = self.issuer.assume_identity(role_arn, session_label).await?;

        match bundle.remaining_at(SystemTime::now()) {
            Some(remaining) => info!(
                role_arn,
                valid_for_secs = remaining.as_secs(),
                "Obtained temporary credentials"
            ),
            None => debug!(role_arn, "Obtained temporary credentials without expiry"),
        }

        Ok(bundle)
    }
}

impl fmt::Debug for CredentialBroker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialBroker").finish_non_exhaustive()
    }
}
