//! Credentials and the scoped HTTP client
//!
//! - Credentials come from an explicit settings value, never from globals
//! - Environment references are resolved through an injectable [`EnvSource`]
//! - Credentials are scoped to the repository's origin and withheld from
//!   other hosts, redirect targets included, unless the source opts into
//!   `pass_credentials_all`

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use url::Url;

use crate::error::{RepoError, Result};

/// Maximum redirects followed for one request
const MAX_REDIRECTS: u32 = 10;

/// Credential declarations as they appear in settings
///
/// ```yaml
/// type: env
/// usernameVar: USER
/// passwordVar: PASS
/// ```
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Credentials {
    /// Inline username/password
    Basic { username: String, password: String },

    /// Inline bearer token
    Bearer { token: String },

    /// Username and password read from environment variables
    Env {
        username_var: String,
        password_var: String,
    },

    /// Fixed username with a token read from an environment variable
    EnvToken { username: String, token_var: String },
}

impl Credentials {
    pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Self {
        Credentials::Basic {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn from_env(username_var: impl Into<String>, password_var: impl Into<String>) -> Self {
        Credentials::Env {
            username_var: username_var.into(),
            password_var: password_var.into(),
        }
    }

    pub fn env_token(username: impl Into<String>, token_var: impl Into<String>) -> Self {
        Credentials::EnvToken {
            username: username.into(),
            token_var: token_var.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .field("password", &"[REDACTED]")
                .finish(),
            Credentials::Bearer { .. } => f
                .debug_struct("Bearer")
                .field("token", &"[REDACTED]")
                .finish(),
            Credentials::Env {
                username_var,
                password_var,
            } => f
                .debug_struct("Env")
                .field("username_var", username_var)
                .field("password_var", password_var)
                .finish(),
            Credentials::EnvToken {
                username,
                token_var,
            } => f
                .debug_struct("EnvToken")
                .field("username", username)
                .field("token_var", token_var)
                .finish(),
        }
    }
}

/// Where environment references are looked up
#[derive(Debug, Clone, Default)]
pub enum EnvSource {
    /// The process environment
    #[default]
    Process,
    /// A fixed map, for tests and embedding
    Map(HashMap<String, String>),
}

impl EnvSource {
    pub fn get(&self, key: &str) -> Option<String> {
        match self {
            EnvSource::Process => std::env::var(key).ok(),
            EnvSource::Map(map) => map.get(key).cloned(),
        }
    }
}

/// Resolves credential declarations into usable secrets
///
/// This is the only place that reads environment variables.
#[derive(Debug, Clone, Default)]
pub struct CredentialProvider {
    env: EnvSource,
}

impl CredentialProvider {
    pub fn new(env: EnvSource) -> Self {
        Self { env }
    }

    /// Provider backed by the process environment
    pub fn from_process() -> Self {
        Self::new(EnvSource::Process)
    }

    /// Resolve a declaration
    ///
    /// A referenced variable that is unset resolves to an empty value, the
    /// way shells expand it. The registry then decides whether that is
    /// acceptable.
    pub fn resolve(&self, credentials: &Credentials) -> ResolvedCredentials {
        match credentials {
            Credentials::Basic { username, password } => ResolvedCredentials::Basic {
                username: username.clone(),
                password: password.clone(),
            },
            Credentials::Bearer { token } => ResolvedCredentials::Bearer {
                token: token.clone(),
            },
            Credentials::Env {
                username_var,
                password_var,
            } => ResolvedCredentials::Basic {
                username: self.lookup(username_var),
                password: self.lookup(password_var),
            },
            Credentials::EnvToken {
                username,
                token_var,
            } => ResolvedCredentials::Basic {
                username: username.clone(),
                password: self.lookup(token_var),
            },
        }
    }

    /// Resolve, failing when a referenced variable is unset
    pub fn resolve_strict(&self, credentials: &Credentials) -> Result<ResolvedCredentials> {
        let required: Vec<&String> = match credentials {
            Credentials::Env {
                username_var,
                password_var,
            } => vec![username_var, password_var],
            Credentials::EnvToken { token_var, .. } => vec![token_var],
            _ => Vec::new(),
        };

        for var in required {
            if self.env.get(var).is_none() {
                return Err(RepoError::CredentialNotFound {
                    message: format!("environment variable {} is not set", var),
                });
            }
        }
        Ok(self.resolve(credentials))
    }

    fn lookup(&self, var: &str) -> String {
        self.env.get(var).unwrap_or_else(|| {
            tracing::warn!(variable = var, "credential variable is not set");
            String::new()
        })
    }
}

/// Credentials ready to be sent
#[derive(Clone, PartialEq, Eq)]
pub enum ResolvedCredentials {
    Basic { username: String, password: String },
    Bearer { token: String },
}

impl ResolvedCredentials {
    pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Self {
        ResolvedCredentials::Basic {
            username: username.into(),
            password: password.into(),
        }
    }

    /// `Authorization` header value
    pub fn auth_header(&self) -> String {
        match self {
            ResolvedCredentials::Basic { username, password } => {
                let encoded = base64::Engine::encode(
                    &base64::engine::general_purpose::STANDARD,
                    format!("{}:{}", username, password),
                );
                format!("Basic {}", encoded)
            }
            ResolvedCredentials::Bearer { token } => format!("Bearer {}", token),
        }
    }

    pub fn username(&self) -> Option<&str> {
        match self {
            ResolvedCredentials::Basic { username, .. } => Some(username),
            ResolvedCredentials::Bearer { .. } => None,
        }
    }
}

impl fmt::Debug for ResolvedCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolvedCredentials::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .field("password", &"[REDACTED]")
                .finish(),
            ResolvedCredentials::Bearer { .. } => f
                .debug_struct("Bearer")
                .field("token", &"[REDACTED]")
                .finish(),
        }
    }
}

/// Maps URL prefixes to credentials
#[derive(Debug, Clone, Default)]
pub struct ScopedCredentials {
    scopes: HashMap<String, ResolvedCredentials>,
}

impl ScopedCredentials {
    /// Scope with a single entry
    pub fn single(url_prefix: &str, credentials: ResolvedCredentials) -> Self {
        let mut scoped = Self::default();
        scoped.add(url_prefix, credentials);
        scoped
    }

    pub fn add(&mut self, url_prefix: &str, credentials: ResolvedCredentials) {
        let prefix = url_prefix.trim_end_matches('/').to_string();
        self.scopes.insert(prefix, credentials);
    }

    /// Credentials for a URL
    ///
    /// The longest matching prefix wins. A URL outside every prefix still
    /// gets the credentials of a scope on the same scheme, host and port.
    pub fn for_url(&self, url: &str) -> Option<&ResolvedCredentials> {
        self.scopes
            .iter()
            .filter(|(prefix, _)| url.starts_with(prefix.as_str()))
            .max_by_key(|(prefix, _)| prefix.len())
            .or_else(|| {
                self.scopes
                    .iter()
                    .filter(|(prefix, _)| Self::same_origin(prefix, url))
                    .max_by_key(|(prefix, _)| prefix.len())
            })
            .map(|(_, creds)| creds)
    }

    /// Any credentials at all, used when forwarding to other origins
    fn any(&self) -> Option<&ResolvedCredentials> {
        self.scopes
            .iter()
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(_, creds)| creds)
    }

    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }

    /// Same scheme, host and port
    pub fn same_origin(url1: &str, url2: &str) -> bool {
        match (Url::parse(url1), Url::parse(url2)) {
            (Ok(u1), Ok(u2)) => {
                u1.scheme() == u2.scheme()
                    && u1.host() == u2.host()
                    && u1.port_or_known_default() == u2.port_or_known_default()
            }
            _ => false,
        }
    }
}

/// Network settings shared by every client
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HttpSettings {
    /// Per-request timeout, `None` waits indefinitely
    pub timeout: Option<Duration>,
}

impl HttpSettings {
    pub fn with_timeout(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }

    pub(crate) fn client_builder(&self) -> reqwest::ClientBuilder {
        let builder = reqwest::Client::builder().redirect(reqwest::redirect::Policy::none());
        match self.timeout {
            Some(timeout) => builder.timeout(timeout),
            None => builder,
        }
    }
}

/// HTTP client that follows redirects itself so it controls where
/// credentials go
pub struct SecureHttpClient {
    client: reqwest::Client,
    credentials: ScopedCredentials,
    pass_credentials_all: bool,
}

impl SecureHttpClient {
    pub fn new(credentials: ScopedCredentials, settings: HttpSettings) -> Result<Self> {
        let client = settings
            .client_builder()
            .build()
            .map_err(|e| RepoError::NetworkError {
                message: e.to_string(),
            })?;

        Ok(Self {
            client,
            credentials,
            pass_credentials_all: false,
        })
    }

    /// Client without credentials
    pub fn public(settings: HttpSettings) -> Result<Self> {
        Self::new(ScopedCredentials::default(), settings)
    }

    /// Forward credentials to every host, including redirect targets
    pub fn pass_credentials_all(mut self, pass: bool) -> Self {
        self.pass_credentials_all = pass;
        self
    }

    /// Credentials go to the origins they are scoped to, and to every
    /// other origin only with `pass_credentials_all`. Redirect targets are
    /// judged the same way as the first request.
    fn credentials_for(&self, original_url: &str, current_url: &str) -> Option<&ResolvedCredentials> {
        if let Some(creds) = self.credentials.for_url(current_url) {
            return Some(creds);
        }

        if self.pass_credentials_all {
            return self.credentials.any();
        }

        if !self.credentials.is_empty() && original_url != current_url {
            tracing::warn!(
                from = original_url,
                to = current_url,
                "cross-origin redirect, credentials not forwarded"
            );
        }
        None
    }

    /// GET with manual redirect handling
    pub async fn get(&self, url: &str) -> Result<reqwest::Response> {
        let original_url = url.to_string();
        let mut current_url = url.to_string();
        let mut redirects = 0;

        loop {
            let mut request = self.client.get(&current_url);
            if let Some(creds) = self.credentials_for(&original_url, &current_url) {
                request = request.header(reqwest::header::AUTHORIZATION, creds.auth_header());
            }

            let response = request.send().await?;
            let status = response.status();

            if status.is_redirection() {
                redirects += 1;
                if redirects > MAX_REDIRECTS {
                    return Err(RepoError::NetworkError {
                        message: format!("Too many redirects (max {})", MAX_REDIRECTS),
                    });
                }

                let location = response
                    .headers()
                    .get(reqwest::header::LOCATION)
                    .and_then(|v| v.to_str().ok())
                    .ok_or_else(|| RepoError::NetworkError {
                        message: "Redirect without Location header".to_string(),
                    })?;

                let base = Url::parse(&current_url)?;
                current_url = base.join(location)?.to_string();
                tracing::debug!(url = %current_url, "following redirect");
                continue;
            }

            if status == reqwest::StatusCode::UNAUTHORIZED {
                return Err(RepoError::AuthRequired { url: current_url });
            }
            if status == reqwest::StatusCode::FORBIDDEN {
                return Err(RepoError::AuthFailed {
                    message: format!("Access denied to {}", current_url),
                });
            }
            if status == reqwest::StatusCode::NOT_FOUND {
                return Err(RepoError::HttpError {
                    status: status.as_u16(),
                    message: format!("{} not found", current_url),
                });
            }
            if !status.is_success() {
                return Err(RepoError::HttpError {
                    status: status.as_u16(),
                    message: format!("Request to {} failed", current_url),
                });
            }

            return Ok(response);
        }
    }

    pub async fn get_bytes(&self, url: &str) -> Result<Vec<u8>> {
        let response = self.get(url).await?;
        let bytes = response.bytes().await?;
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, header_exists, method, path};
    use wiremock::{Mock, MockServer, Request, ResponseTemplate};

    fn env(pairs: &[(&str, &str)]) -> CredentialProvider {
        CredentialProvider::new(EnvSource::Map(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        ))
    }

    #[test]
    fn test_same_origin() {
        assert!(ScopedCredentials::same_origin(
            "https://example.com/foo",
            "https://example.com/bar"
        ));
        assert!(ScopedCredentials::same_origin(
            "https://example.com:443/foo",
            "https://example.com/bar"
        ));
        assert!(!ScopedCredentials::same_origin(
            "https://example.com/foo",
            "https://other.com/bar"
        ));
        assert!(!ScopedCredentials::same_origin(
            "https://example.com/foo",
            "http://example.com/bar"
        ));
    }

    #[test]
    fn test_scoped_credentials_longest_prefix() {
        let mut scoped = ScopedCredentials::default();
        scoped.add("https://charts.example.com", ResolvedCredentials::basic("a", "1"));
        scoped.add(
            "https://charts.example.com/private/",
            ResolvedCredentials::basic("b", "2"),
        );

        let creds = scoped
            .for_url("https://charts.example.com/private/index.yaml")
            .unwrap();
        assert_eq!(creds.username(), Some("b"));
        assert_eq!(
            scoped
                .for_url("https://charts.example.com/index.yaml")
                .and_then(|c| c.username()),
            Some("a")
        );
        assert_eq!(
            scoped
                .for_url("https://charts.example.com:443/blobs/app-1.0.0.tgz")
                .and_then(|c| c.username()),
            Some("a")
        );
        assert!(scoped.for_url("https://other.example.com/index.yaml").is_none());
        assert!(scoped.for_url("http://charts.example.com/index.yaml").is_none());
    }

    #[test]
    fn test_provider_resolves_env_references() {
        let provider = env(&[("USER", "ci"), ("PASS", "s3cret"), ("GH_TOKEN", "ghp_x")]);

        let oci = provider.resolve(&Credentials::from_env("USER", "PASS"));
        assert_eq!(oci, ResolvedCredentials::basic("ci", "s3cret"));

        let gh = provider.resolve(&Credentials::env_token("natasha41575", "GH_TOKEN"));
        assert_eq!(gh, ResolvedCredentials::basic("natasha41575", "ghp_x"));
    }

    #[test]
    fn test_provider_unset_variables() {
        let provider = env(&[]);
        let creds = Credentials::from_env("USER", "PASS");

        assert_eq!(provider.resolve(&creds), ResolvedCredentials::basic("", ""));
        assert!(matches!(
            provider.resolve_strict(&creds),
            Err(RepoError::CredentialNotFound { .. })
        ));
    }

    #[test]
    fn test_credentials_yaml_and_debug() {
        let creds: Credentials =
            serde_yaml::from_str("type: envToken\nusername: natasha41575\ntokenVar: GH_TOKEN\n")
                .unwrap();
        assert_eq!(creds, Credentials::env_token("natasha41575", "GH_TOKEN"));

        let inline = Credentials::basic("user", "hunter2");
        assert!(!format!("{:?}", inline).contains("hunter2"));
        let resolved = ResolvedCredentials::basic("user", "hunter2");
        assert!(!format!("{:?}", resolved).contains("hunter2"));
    }

    #[test]
    fn test_auth_header() {
        assert_eq!(
            ResolvedCredentials::basic("user", "pass").auth_header(),
            "Basic dXNlcjpwYXNz"
        );
        assert_eq!(
            ResolvedCredentials::Bearer {
                token: "t".to_string()
            }
            .auth_header(),
            "Bearer t"
        );
    }

    #[tokio::test]
    async fn test_credentials_sent_to_same_origin() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/index.yaml"))
            .and(header("Authorization", "Basic dXNlcjpwYXNz"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .expect(1)
            .mount(&server)
            .await;

        let client = SecureHttpClient::new(
            ScopedCredentials::single(&server.uri(), ResolvedCredentials::basic("user", "pass")),
            HttpSettings::default(),
        )
        .unwrap();

        let body = client
            .get_bytes(&format!("{}/index.yaml", server.uri()))
            .await
            .unwrap();
        assert_eq!(body, b"ok");
    }

    #[tokio::test]
    async fn test_cross_origin_redirect_drops_credentials() {
        let origin = MockServer::start().await;
        let other = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/charts/app-1.0.0.tgz"))
            .respond_with(
                ResponseTemplate::new(302)
                    .insert_header("Location", format!("{}/blob", other.uri()).as_str()),
            )
            .mount(&origin)
            .await;
        Mock::given(method("GET"))
            .and(path("/blob"))
            .respond_with(|req: &Request| {
                if req.headers.contains_key("authorization") {
                    ResponseTemplate::new(400)
                } else {
                    ResponseTemplate::new(200).set_body_bytes(b"blob".to_vec())
                }
            })
            .mount(&other)
            .await;

        let client = SecureHttpClient::new(
            ScopedCredentials::single(&origin.uri(), ResolvedCredentials::basic("user", "pass")),
            HttpSettings::default(),
        )
        .unwrap();

        let data = client
            .get_bytes(&format!("{}/charts/app-1.0.0.tgz", origin.uri()))
            .await
            .unwrap();
        assert_eq!(data, b"blob");
    }

    #[tokio::test]
    async fn test_pass_credentials_all_forwards_to_other_origin() {
        let origin = MockServer::start().await;
        let other = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/index.yaml"))
            .respond_with(
                ResponseTemplate::new(301)
                    .insert_header("Location", format!("{}/index.yaml", other.uri()).as_str()),
            )
            .mount(&origin)
            .await;
        Mock::given(method("GET"))
            .and(path("/index.yaml"))
            .and(header_exists("authorization"))
            .respond_with(ResponseTemplate::new(200).set_body_string("forwarded"))
            .expect(1)
            .mount(&other)
            .await;

        let client = SecureHttpClient::new(
            ScopedCredentials::single(&origin.uri(), ResolvedCredentials::basic("user", "pass")),
            HttpSettings::default(),
        )
        .unwrap()
        .pass_credentials_all(true);

        let body = client
            .get_bytes(&format!("{}/index.yaml", origin.uri()))
            .await
            .unwrap();
        assert_eq!(body, b"forwarded");
    }

    #[tokio::test]
    async fn test_status_mapping() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/private"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let client = SecureHttpClient::public(HttpSettings::default()).unwrap();
        let err = client
            .get(&format!("{}/private", server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(err, RepoError::AuthRequired { .. }));

        let err = client
            .get(&format!("{}/missing", server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(err, RepoError::HttpError { status: 404, .. }));
    }
}
