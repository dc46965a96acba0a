//! OCI registry login and chart pulls
//!
//! Login performs the distribution API handshake against `/v2/` and yields a
//! [`RegistrySession`]. Pulls go through `oci-distribution` with the
//! session's credentials.

use oci_distribution::Reference;
use oci_distribution::client::{Client, ClientConfig, ClientProtocol};
use oci_distribution::secrets::RegistryAuth;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use url::Url;

use crate::credentials::{HttpSettings, ResolvedCredentials};
use crate::error::{AuthError, RepoError, Result};

/// Media types for Helm charts in OCI
pub mod media_types {
    pub const HELM_CONFIG: &str = "application/vnd.cncf.helm.config.v1+json";
    pub const HELM_CONTENT: &str = "application/vnd.cncf.helm.chart.content.v1.tar+gzip";
}

/// Performs registry logins
#[derive(Debug, Clone)]
pub struct RegistryAuthenticator {
    client: reqwest::Client,
    settings: HttpSettings,
}

impl RegistryAuthenticator {
    pub fn new(settings: HttpSettings) -> Result<Self> {
        let client = settings
            .client_builder()
            .build()
            .map_err(|e| RepoError::NetworkError {
                message: e.to_string(),
            })?;
        Ok(Self { client, settings })
    }

    /// Log in to `host`
    ///
    /// `host` is `registry.example.com`, `https://registry.example.com`, or
    /// `http://localhost:5000` for a plain-HTTP registry.
    pub async fn login(
        &self,
        host: &str,
        username: &str,
        password: &str,
    ) -> std::result::Result<RegistrySession, AuthError> {
        let endpoint = RegistryEndpoint::parse(host)?;
        let credentials = ResolvedCredentials::basic(username, password);
        let ping = endpoint.api_url();

        tracing::debug!(host = %endpoint.host, "pinging registry");
        let response = self
            .client
            .get(&ping)
            .send()
            .await
            .map_err(|e| endpoint.unreachable(e))?;

        match response.status() {
            s if s.is_success() => {}
            reqwest::StatusCode::UNAUTHORIZED => {
                let header = response
                    .headers()
                    .get(reqwest::header::WWW_AUTHENTICATE)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default()
                    .to_string();
                let challenge = Challenge::parse(&header);

                match challenge.scheme.to_ascii_lowercase().as_str() {
                    "basic" => self.basic_login(&endpoint, &ping, &credentials).await?,
                    "bearer" => self.token_login(&endpoint, &challenge, &credentials).await?,
                    _ => {
                        return Err(AuthError::UnsupportedScheme {
                            host: endpoint.host.clone(),
                            scheme: challenge.scheme,
                        });
                    }
                }
            }
            other => {
                return Err(AuthError::Unreachable {
                    host: endpoint.host.clone(),
                    message: format!("unexpected status {} from {}", other, ping),
                });
            }
        }

        tracing::info!(host = %endpoint.host, username, "registry login succeeded");
        Ok(RegistrySession::new(endpoint, username, password, self.settings))
    }

    async fn basic_login(
        &self,
        endpoint: &RegistryEndpoint,
        ping: &str,
        credentials: &ResolvedCredentials,
    ) -> std::result::Result<(), AuthError> {
        let response = self
            .client
            .get(ping)
            .header(reqwest::header::AUTHORIZATION, credentials.auth_header())
            .send()
            .await
            .map_err(|e| endpoint.unreachable(e))?;
        endpoint.check_credential_response(response.status(), ping)
    }

    async fn token_login(
        &self,
        endpoint: &RegistryEndpoint,
        challenge: &Challenge,
        credentials: &ResolvedCredentials,
    ) -> std::result::Result<(), AuthError> {
        let realm = challenge
            .params
            .get("realm")
            .ok_or_else(|| AuthError::UnsupportedScheme {
                host: endpoint.host.clone(),
                scheme: "bearer without realm".to_string(),
            })?;
        let mut token_url = Url::parse(realm).map_err(|e| AuthError::InvalidHost {
            host: endpoint.host.clone(),
            reason: format!("invalid token realm '{}': {}", realm, e),
        })?;
        if let Some(service) = challenge.params.get("service") {
            token_url.query_pairs_mut().append_pair("service", service);
        }

        let response = self
            .client
            .get(token_url.as_str())
            .header(reqwest::header::AUTHORIZATION, credentials.auth_header())
            .send()
            .await
            .map_err(|e| endpoint.unreachable(e))?;
        endpoint.check_credential_response(response.status(), token_url.as_str())?;

        let body: TokenResponse = response.json().await.map_err(|e| AuthError::Unreachable {
            host: endpoint.host.clone(),
            message: format!("invalid token response: {}", e),
        })?;
        match body.token.or(body.access_token) {
            Some(token) if !token.is_empty() => Ok(()),
            _ => Err(AuthError::InvalidCredentials {
                host: endpoint.host.clone(),
            }),
        }
    }
}

#[derive(Debug, serde::Deserialize)]
struct TokenResponse {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    access_token: Option<String>,
}

/// Where a registry lives
#[derive(Debug, Clone, PartialEq, Eq)]
struct RegistryEndpoint {
    /// `host[:port]`, as it appears in OCI references
    host: String,
    plain_http: bool,
}

impl RegistryEndpoint {
    fn parse(raw: &str) -> std::result::Result<Self, AuthError> {
        let invalid = |reason: String| AuthError::InvalidHost {
            host: raw.to_string(),
            reason,
        };

        let trimmed = raw.trim().trim_end_matches('/');
        let (plain_http, with_scheme) = if trimmed.starts_with("http://") {
            (true, trimmed.to_string())
        } else if trimmed.starts_with("https://") {
            (false, trimmed.to_string())
        } else if trimmed.contains("://") {
            return Err(invalid("only http:// and https:// are supported".to_string()));
        } else {
            (false, format!("https://{}", trimmed))
        };

        let url = Url::parse(&with_scheme).map_err(|e| invalid(e.to_string()))?;
        let name = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| invalid("missing host".to_string()))?;
        let host = match url.port() {
            Some(port) => format!("{}:{}", name, port),
            None => name.to_string(),
        };

        Ok(Self {
            host: host.to_ascii_lowercase(),
            plain_http,
        })
    }

    fn api_url(&self) -> String {
        let scheme = if self.plain_http { "http" } else { "https" };
        format!("{}://{}/v2/", scheme, self.host)
    }

    fn unreachable(&self, e: reqwest::Error) -> AuthError {
        AuthError::Unreachable {
            host: self.host.clone(),
            message: RepoError::from(e).to_string(),
        }
    }

    fn check_credential_response(
        &self,
        status: reqwest::StatusCode,
        url: &str,
    ) -> std::result::Result<(), AuthError> {
        match status {
            s if s.is_success() => Ok(()),
            reqwest::StatusCode::UNAUTHORIZED | reqwest::StatusCode::FORBIDDEN => {
                Err(AuthError::InvalidCredentials {
                    host: self.host.clone(),
                })
            }
            other => Err(AuthError::Unreachable {
                host: self.host.clone(),
                message: format!("unexpected status {} from {}", other, url),
            }),
        }
    }
}

/// Parsed `WWW-Authenticate` header
#[derive(Debug, Default, PartialEq, Eq)]
struct Challenge {
    scheme: String,
    params: HashMap<String, String>,
}

impl Challenge {
    /// `Bearer realm="https://auth.example.com/token",service="registry"`
    fn parse(header: &str) -> Self {
        let header = header.trim();
        let (scheme, rest) = header.split_once(' ').unwrap_or((header, ""));

        let mut params = HashMap::new();
        let mut key = String::new();
        let mut value = String::new();
        let mut in_value = false;
        let mut quoted = false;

        let mut flush = |key: &mut String, value: &mut String| {
            let k = key.trim().to_ascii_lowercase();
            if !k.is_empty() {
                params.insert(k, std::mem::take(value));
            }
            key.clear();
            value.clear();
        };

        for c in rest.chars() {
            match c {
                '"' if in_value => quoted = !quoted,
                '=' if !in_value => in_value = true,
                ',' if !quoted => {
                    flush(&mut key, &mut value);
                    in_value = false;
                }
                _ if in_value => value.push(c),
                _ => key.push(c),
            }
        }
        flush(&mut key, &mut value);

        Self {
            scheme: scheme.to_string(),
            params,
        }
    }
}

/// An authenticated connection to one registry
///
/// Created by one login and scoped to one pipeline run, so it is not
/// `Clone`. `Debug` shows only the host and username.
pub struct RegistrySession {
    host: String,
    username: String,
    auth: RegistryAuth,
    client: Client,
    settings: HttpSettings,
}

impl RegistrySession {
    fn new(
        endpoint: RegistryEndpoint,
        username: &str,
        password: &str,
        settings: HttpSettings,
    ) -> Self {
        let protocol = if endpoint.plain_http {
            ClientProtocol::Http
        } else {
            ClientProtocol::Https
        };
        let client = Client::new(ClientConfig {
            protocol,
            ..Default::default()
        });

        let auth = if username.is_empty() && password.is_empty() {
            RegistryAuth::Anonymous
        } else {
            RegistryAuth::Basic(username.to_string(), password.to_string())
        };

        Self {
            host: endpoint.host,
            username: username.to_string(),
            auth,
            client,
            settings,
        }
    }

    /// `host[:port]` this session is valid for
    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    /// Whether this session may be used for `reference`
    pub fn covers(&self, reference: &OciReference) -> bool {
        self.host.eq_ignore_ascii_case(&reference.registry)
    }

    async fn bounded<T, F>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match self.settings.timeout {
            Some(timeout) => tokio::time::timeout(timeout, fut).await?,
            None => fut.await,
        }
    }

    /// Pull the chart content layer
    pub async fn pull_chart(&self, reference: &OciReference) -> Result<Vec<u8>> {
        let image = reference.to_reference()?;
        tracing::debug!(reference = %reference, "pulling chart");

        let data = self
            .bounded(async {
                self.client
                    .pull(
                        &image,
                        &self.auth,
                        vec![media_types::HELM_CONFIG, media_types::HELM_CONTENT],
                    )
                    .await
                    .map_err(|e| RepoError::OciError {
                        message: format!("Failed to pull {}: {}", reference, e),
                    })
            })
            .await?;

        let layer = data
            .layers
            .into_iter()
            .find(|l| l.media_type == media_types::HELM_CONTENT)
            .ok_or_else(|| RepoError::OciError {
                message: format!("No chart content layer in {}", reference),
            })?;
        Ok(layer.data)
    }

    /// Tags published for the reference's repository
    pub async fn list_tags(&self, reference: &OciReference) -> Result<Vec<String>> {
        let image = reference.with_tag("latest").to_reference()?;

        let response = self
            .bounded(async {
                self.client
                    .list_tags(&image, &self.auth, None, None)
                    .await
                    .map_err(|e| RepoError::OciError {
                        message: format!("Failed to list tags for {}: {}", reference, e),
                    })
            })
            .await?;
        Ok(response.tags)
    }
}

impl fmt::Debug for RegistrySession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistrySession")
            .field("host", &self.host)
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

/// `oci://registry/repository[:tag][@digest]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OciReference {
    pub registry: String,
    pub repository: String,
    pub tag: Option<String>,
    pub digest: Option<String>,
}

impl OciReference {
    pub fn parse(s: &str) -> Result<Self> {
        let clean = s
            .trim_start_matches("oci://")
            .trim_start_matches("https://")
            .trim_start_matches("http://");

        let invalid = || RepoError::InvalidOciReference {
            reference: s.to_string(),
        };

        let (registry, rest) = clean.split_once('/').ok_or_else(invalid)?;
        if registry.is_empty() || rest.is_empty() {
            return Err(invalid());
        }

        let (repo_tag, digest) = match rest.rsplit_once('@') {
            Some((repo_tag, digest)) => (repo_tag, Some(digest.to_string())),
            None => (rest, None),
        };
        let (repository, tag) = match repo_tag.rsplit_once(':') {
            Some((repository, tag)) => (repository, Some(tag.to_string())),
            None => (repo_tag, None),
        };

        if repository.split('/').any(str::is_empty) {
            return Err(invalid());
        }

        Ok(Self {
            registry: registry.to_ascii_lowercase(),
            repository: repository.to_string(),
            tag,
            digest,
        })
    }

    /// Last path segment, the chart name
    pub fn chart_name(&self) -> &str {
        self.repository
            .rsplit('/')
            .next()
            .unwrap_or(&self.repository)
    }

    pub fn with_tag(&self, tag: &str) -> Self {
        Self {
            tag: Some(tag.to_string()),
            digest: None,
            ..self.clone()
        }
    }

    fn to_reference(&self) -> Result<Reference> {
        let text = self.to_string();
        Reference::try_from(text.as_str()).map_err(|e| RepoError::InvalidOciReference {
            reference: format!("{}: {}", text, e),
        })
    }
}

impl fmt::Display for OciReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.registry, self.repository)?;
        if let Some(tag) = &self.tag {
            write!(f, ":{}", tag)?;
        }
        if let Some(digest) = &self.digest {
            write!(f, "@{}", digest)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn authenticator() -> RegistryAuthenticator {
        RegistryAuthenticator::new(HttpSettings::default()).unwrap()
    }

    #[test]
    fn test_oci_reference_parse() {
        let r = OciReference::parse(
            "oci://us-central1-docker.pkg.dev/disco-haiku-324600/config-sync-test/simple",
        )
        .unwrap();
        assert_eq!(r.registry, "us-central1-docker.pkg.dev");
        assert_eq!(r.repository, "disco-haiku-324600/config-sync-test/simple");
        assert_eq!(r.chart_name(), "simple");
        assert!(r.tag.is_none());

        let r = OciReference::parse("oci://localhost:5000/charts/nginx:1.0.0").unwrap();
        assert_eq!(r.registry, "localhost:5000");
        assert_eq!(r.tag.as_deref(), Some("1.0.0"));
        assert_eq!(r.to_string(), "localhost:5000/charts/nginx:1.0.0");

        let r = OciReference::parse("ghcr.io/org/nginx:1.0@sha256:abc123").unwrap();
        assert_eq!(r.digest.as_deref(), Some("sha256:abc123"));
        assert_eq!(r.with_tag("2.0").to_string(), "ghcr.io/org/nginx:2.0");

        assert!(OciReference::parse("oci://registry-only").is_err());
        assert!(OciReference::parse("oci://host//chart").is_err());
    }

    #[test]
    fn test_endpoint_parse() {
        let e = RegistryEndpoint::parse("https://us-central1-docker.pkg.dev").unwrap();
        assert_eq!(e.host, "us-central1-docker.pkg.dev");
        assert!(!e.plain_http);

        let e = RegistryEndpoint::parse("registry.example.com").unwrap();
        assert_eq!(e.api_url(), "https://registry.example.com/v2/");

        let e = RegistryEndpoint::parse("http://127.0.0.1:5000/").unwrap();
        assert_eq!(e.api_url(), "http://127.0.0.1:5000/v2/");

        assert!(matches!(
            RegistryEndpoint::parse("ftp://registry.example.com"),
            Err(AuthError::InvalidHost { .. })
        ));
        assert!(RegistryEndpoint::parse("").is_err());
    }

    #[test]
    fn test_challenge_parse() {
        let c = Challenge::parse(
            r#"Bearer realm="https://auth.example.com/token",service="registry.example.com",scope="repository:a/b:pull""#,
        );
        assert_eq!(c.scheme, "Bearer");
        assert_eq!(c.params["realm"], "https://auth.example.com/token");
        assert_eq!(c.params["service"], "registry.example.com");
        assert_eq!(c.params["scope"], "repository:a/b:pull");

        let c = Challenge::parse(r#"Basic realm="Registry Realm""#);
        assert_eq!(c.scheme, "Basic");
        assert_eq!(c.params["realm"], "Registry Realm");
    }

    #[tokio::test]
    async fn test_login_open_registry() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let session = authenticator()
            .login(&server.uri(), "ci", "secret")
            .await
            .unwrap();
        assert_eq!(session.username(), "ci");
        assert!(server.uri().ends_with(session.host()));
    }

    #[tokio::test]
    async fn test_login_bearer_token_exchange() {
        let server = MockServer::start().await;
        let realm = format!("{}/token", server.uri());

        Mock::given(method("GET"))
            .and(path("/v2/"))
            .respond_with(ResponseTemplate::new(401).insert_header(
                "WWW-Authenticate",
                format!(r#"Bearer realm="{}",service="test-registry""#, realm).as_str(),
            ))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/token"))
            .and(query_param("service", "test-registry"))
            .and(header("Authorization", "Basic Y2k6c2VjcmV0"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"token": "abc"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let session = authenticator()
            .login(&server.uri(), "ci", "secret")
            .await
            .unwrap();
        assert_eq!(session.username(), "ci");
    }

    #[tokio::test]
    async fn test_login_bearer_access_token_field() {
        let server = MockServer::start().await;
        let realm = format!("{}/oauth2/token", server.uri());

        Mock::given(method("GET"))
            .and(path("/v2/"))
            .respond_with(ResponseTemplate::new(401).insert_header(
                "WWW-Authenticate",
                format!(r#"Bearer realm="{}""#, realm).as_str(),
            ))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/oauth2/token"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"access_token": "xyz"})),
            )
            .mount(&server)
            .await;

        assert!(authenticator().login(&server.uri(), "ci", "secret").await.is_ok());
    }

    #[tokio::test]
    async fn test_login_rejected_credentials() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/"))
            .respond_with(
                ResponseTemplate::new(401).insert_header("WWW-Authenticate", r#"Basic realm="r""#),
            )
            .mount(&server)
            .await;

        let err = authenticator()
            .login(&server.uri(), "ci", "wrong")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials { .. }));
    }

    #[tokio::test]
    async fn test_login_unsupported_scheme() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/"))
            .respond_with(
                ResponseTemplate::new(401).insert_header("WWW-Authenticate", "Negotiate abc"),
            )
            .mount(&server)
            .await;

        let err = authenticator()
            .login(&server.uri(), "ci", "secret")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::UnsupportedScheme { scheme, .. } if scheme == "Negotiate"));
    }

    #[tokio::test]
    async fn test_login_unreachable() {
        let err = authenticator()
            .login("http://127.0.0.1:1", "ci", "secret")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Unreachable { .. }));
    }

    #[tokio::test]
    async fn test_session_debug_hides_password() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let session = authenticator()
            .login(&server.uri(), "ci", "hunter2")
            .await
            .unwrap();
        let debug = format!("{:?}", session);
        assert!(debug.contains("ci"));
        assert!(!debug.contains("hunter2"));

        let same = OciReference::parse(&format!("oci://{}/charts/simple", session.host())).unwrap();
        let other = OciReference::parse("oci://ghcr.io/charts/simple").unwrap();
        assert!(session.covers(&same));
        assert!(!session.covers(&other));
    }
}
