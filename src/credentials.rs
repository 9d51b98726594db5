use thiserror::Error;

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("Object store credentials not found: {0}")]
    Missing(String),
}

/// Access key pair used to sign object store requests.
#[derive(Clone)]
pub struct Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("session_token", &self.session_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Source of credentials for the object store. Resolved before every request;
/// caching and refresh policy belong to the implementation.
pub trait CredentialProvider: Send + Sync {
    fn resolve(&self) -> Result<Credentials, CredentialError>;
}

/// Fixed credentials, mainly for tests and custom endpoints.
pub struct StaticCredentials(Credentials);

impl StaticCredentials {
    pub fn new(access_key_id: impl Into<String>, secret_access_key: impl Into<String>) -> Self {
        Self(Credentials {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            session_token: None,
        })
    }
}

impl CredentialProvider for StaticCredentials {
    fn resolve(&self) -> Result<Credentials, CredentialError> {
        Ok(self.0.clone())
    }
}

/// Reads `AWS_ACCESS_KEY_ID`, `AWS_SECRET_ACCESS_KEY` and the optional
/// `AWS_SESSION_TOKEN` from the environment on each call.
#[derive(Debug, Default)]
pub struct EnvCredentials;

impl CredentialProvider for EnvCredentials {
    fn resolve(&self) -> Result<Credentials, CredentialError> {
        let access_key_id = non_empty_var("AWS_ACCESS_KEY_ID")?;
        let secret_access_key = non_empty_var("AWS_SECRET_ACCESS_KEY")?;
        let session_token = std::env::var("AWS_SESSION_TOKEN")
            .ok()
            .filter(|s| !s.is_empty());

        Ok(Credentials {
            access_key_id,
            secret_access_key,
            session_token,
        })
    }
}

fn non_empty_var(name: &str) -> Result<String, CredentialError> {
    std::env::var(name)
        .ok()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| CredentialError::Missing(format!("{name} is not set")))
}
