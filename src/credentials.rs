//! Credential resolution for the provisioning API
//!
//! A [`CredentialProvider`] turns a profile name into [`Credentials`]. The
//! controller resolves once at construction; any failure is fatal there.

use std::path::PathBuf;

use async_trait::async_trait;
use aws_config::environment::EnvironmentVariableCredentialsProvider;
use aws_config::profile::profile_file::{ProfileFileKind, ProfileFiles};
use aws_config::profile::ProfileFileCredentialsProvider;
use aws_credential_types::provider::ProvideCredentials;
use aws_sdk_emr::error::DisplayErrorContext;
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use crate::{Error, Result};

/// Resolved identity usable to call the provisioning API
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Access key ID
    pub access_key_id: String,
    /// Secret access key
    pub secret_access_key: String,
    /// Optional session token for temporary credentials
    pub session_token: Option<String>,
}

impl Credentials {
    /// Long-lived credentials without a session token
    pub fn new(access_key_id: impl Into<String>, secret_access_key: impl Into<String>) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            session_token: None,
        }
    }

    /// Attach a session token
    pub fn with_session_token(mut self, token: impl Into<String>) -> Self {
        self.session_token = Some(token.into());
        self
    }
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

/// Resolves an identity for a profile
#[cfg_attr(test, automock)]
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Resolve credentials for `profile`
    async fn resolve(&self, profile: &str) -> Result<Credentials>;
}

/// Reads credentials from `AWS_ACCESS_KEY_ID` / `AWS_SECRET_ACCESS_KEY` / `AWS_SESSION_TOKEN`
///
/// The profile name is only used for error context.
#[derive(Clone, Debug, Default)]
pub struct EnvCredentialProvider;

#[async_trait]
impl CredentialProvider for EnvCredentialProvider {
    async fn resolve(&self, profile: &str) -> Result<Credentials> {
        provide(profile, &EnvironmentVariableCredentialsProvider::new()).await
    }
}

/// Resolves a named profile from the shared credentials and config files
///
/// Uses the SDK's profile chain, so `role_arn`/`source_profile`,
/// `credential_process` and SSO profiles resolve the same way the CLI does.
/// Defaults to `~/.aws/credentials` and `~/.aws/config`, honoring
/// `AWS_SHARED_CREDENTIALS_FILE` and `AWS_CONFIG_FILE`.
#[derive(Clone, Debug, Default)]
pub struct ProfileCredentialProvider {
    path: Option<PathBuf>,
}

impl ProfileCredentialProvider {
    /// Use the default credentials file locations
    pub fn new() -> Self {
        Self { path: None }
    }

    /// Read profiles from an explicit credentials file only
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
        }
    }
}

#[async_trait]
impl CredentialProvider for ProfileCredentialProvider {
    async fn resolve(&self, profile: &str) -> Result<Credentials> {
        let mut builder = ProfileFileCredentialsProvider::builder().profile_name(profile);
        if let Some(ref path) = self.path {
            builder = builder.profile_files(
                ProfileFiles::builder()
                    .with_file(ProfileFileKind::Credentials, path)
                    .build(),
            );
        }
        provide(profile, &builder.build()).await
    }
}

async fn provide(profile: &str, provider: &impl ProvideCredentials) -> Result<Credentials> {
    let resolved = provider.provide_credentials().await.map_err(|e| {
        Error::credential(
            profile,
            format!("cannot load user credentials: {}", DisplayErrorContext(&e)),
        )
    })?;
    debug!(profile = %profile, access_key_id = %resolved.access_key_id(), "Resolved credentials");

    Ok(Credentials {
        access_key_id: resolved.access_key_id().to_string(),
        secret_access_key: resolved.secret_access_key().to_string(),
        session_token: resolved.session_token().map(str::to_string),
    })
}

/// Returns the same credentials for every profile
#[derive(Clone, Debug)]
pub struct StaticCredentialProvider {
    credentials: Credentials,
}

impl StaticCredentialProvider {
    /// Wrap fixed credentials
    pub fn new(credentials: Credentials) -> Self {
        Self { credentials }
    }
}

#[async_trait]
impl CredentialProvider for StaticCredentialProvider {
    async fn resolve(&self, _profile: &str) -> Result<Credentials> {
        Ok(self.credentials.clone())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    const CREDENTIALS_FILE: &str = r#"
# managed by ops
[default]
aws_access_key_id = AKIDDEFAULT
aws_secret_access_key = SECRETDEFAULT

[ingest]
aws_access_key_id=AKIDINGEST
aws_secret_access_key=SECRETINGEST
aws_session_token = TOKEN

[profile literal]
aws_access_key_id = AKIDLITERAL
aws_secret_access_key = SECRETLITERAL

[assumed]
role_arn = arn:aws:iam::123456789012:role/ingest
source_profile = absent

[broken]
aws_access_key_id = AKIDBROKEN
"#;

    fn credentials_file() -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(CREDENTIALS_FILE.as_bytes()).unwrap();
        file
    }

    #[tokio::test]
    async fn profile_provider_reads_named_profile() {
        let file = credentials_file();
        let provider = ProfileCredentialProvider::with_path(file.path());

        let creds = provider.resolve("default").await.unwrap();
        assert_eq!(creds.access_key_id, "AKIDDEFAULT");
        assert_eq!(creds.secret_access_key, "SECRETDEFAULT");
        assert!(creds.session_token.is_none());

        let creds = provider.resolve("ingest").await.unwrap();
        assert_eq!(creds.access_key_id, "AKIDINGEST");
        assert_eq!(creds.session_token.as_deref(), Some("TOKEN"));
    }

    #[tokio::test]
    async fn missing_profile_is_a_credential_error() {
        let file = credentials_file();
        let provider = ProfileCredentialProvider::with_path(file.path());

        let err = provider.resolve("nope").await.unwrap_err();
        assert!(matches!(err, Error::Credential { ref profile, .. } if profile == "nope"));
    }

    #[tokio::test]
    async fn credentials_file_section_names_are_not_rewritten() {
        let file = credentials_file();
        let provider = ProfileCredentialProvider::with_path(file.path());

        let err = provider.resolve("literal").await.unwrap_err();
        assert!(matches!(err, Error::Credential { .. }));
    }

    #[tokio::test]
    async fn role_profile_follows_its_source_profile() {
        let file = credentials_file();
        let provider = ProfileCredentialProvider::with_path(file.path());

        // The chain is followed to `source_profile`, which is not defined.
        let err = provider.resolve("assumed").await.unwrap_err();
        assert!(matches!(err, Error::Credential { ref profile, .. } if profile == "assumed"));
        assert!(!err.to_string().contains("AWS_ACCESS_KEY_ID"));
    }

    #[tokio::test]
    async fn incomplete_profile_is_a_credential_error() {
        let file = credentials_file();
        let provider = ProfileCredentialProvider::with_path(file.path());

        let err = provider.resolve("broken").await.unwrap_err();
        assert!(err.to_string().contains("cannot load user credentials"));
    }

    #[tokio::test]
    async fn unreadable_file_is_a_credential_error() {
        let provider = ProfileCredentialProvider::with_path("/nonexistent/credentials");
        let err = provider.resolve("default").await.unwrap_err();
        assert!(matches!(err, Error::Credential { .. }));
    }

    #[test]
    fn debug_output_redacts_secrets() {
        let creds = Credentials::new("AKID", "SECRET").with_session_token("TOKEN");
        let debug = format!("{:?}", creds);
        assert!(debug.contains("AKID"));
        assert!(!debug.contains("SECRET"));
        assert!(!debug.contains("TOKEN"));
    }

    #[tokio::test]
    async fn static_provider_ignores_profile() {
        let provider = StaticCredentialProvider::new(Credentials::new("A", "B"));
        assert_eq!(provider.resolve("x").await.unwrap().access_key_id, "A");
        assert_eq!(provider.resolve("y").await.unwrap().secret_access_key, "B");
    }
}
