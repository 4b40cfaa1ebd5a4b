//! BMC credential resolution
//!
//! Looks up the Secret a host's spec points at and validates it holds a
//! usable username/password pair. Credentials are resolved fresh on every
//! reconciliation attempt and never cached or logged.

use crate::error::ControllerError;
use k8s_openapi::api::core::v1::Secret;
use kube::Api;
use provisioner::BmcCredentials;
use thiserror::Error;

/// Why a credential reference could not be turned into usable credentials
///
/// These are operator-fixable conditions; the engine maps them to a
/// registration error on the host rather than failing the reconcile.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CredentialsError {
    /// The referenced Secret does not exist
    #[error("credentials secret {0} not found")]
    SecretNotFound(String),

    /// The Secret exists but a required key is absent or empty
    #[error("credentials secret {0} is missing a usable {1}")]
    MissingField(String, &'static str),
}

/// Resolves credential references against the cluster's secret store.
#[derive(Clone)]
pub struct CredentialResolver {
    secret_api: Api<Secret>,
}

impl CredentialResolver {
    /// Create a resolver backed by the given Secret API
    #[must_use]
    pub fn new(secret_api: Api<Secret>) -> Self {
        Self { secret_api }
    }

    /// Fetch and validate the credentials behind `secret_name`
    ///
    /// The outer `Result` is infrastructure (apiserver unreachable); the
    /// inner one is the distinguishable missing/invalid condition.
    pub async fn resolve(
        &self,
        secret_name: &str,
    ) -> Result<Result<BmcCredentials, CredentialsError>, ControllerError> {
        let secret = match self.secret_api.get(secret_name).await {
            Ok(secret) => secret,
            Err(kube::Error::Api(ae)) if ae.code == 404 => {
                return Ok(Err(CredentialsError::SecretNotFound(
                    secret_name.to_string(),
                )));
            }
            Err(e) => return Err(ControllerError::Kube(e)),
        };

        Ok(parse_secret(secret_name, &secret))
    }
}

/// Validate the Secret's contents without touching the network
pub(crate) fn parse_secret(
    secret_name: &str,
    secret: &Secret,
) -> Result<BmcCredentials, CredentialsError> {
    let field = |key: &'static str| -> Result<String, CredentialsError> {
        let bytes = secret
            .data
            .as_ref()
            .and_then(|data| data.get(key))
            .map(|v| v.0.clone())
            .ok_or(CredentialsError::MissingField(secret_name.to_string(), key))?;
        let value = String::from_utf8(bytes)
            .map_err(|_| CredentialsError::MissingField(secret_name.to_string(), key))?;
        if value.trim().is_empty() {
            return Err(CredentialsError::MissingField(secret_name.to_string(), key));
        }
        Ok(value)
    };

    Ok(BmcCredentials {
        username: field("username")?,
        password: field("password")?,
    })
}
