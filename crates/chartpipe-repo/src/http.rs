//! Classic HTTP chart repositories
//!
//! A repository serves `index.yaml` plus chart archives. Archive URLs in the
//! index may be relative to the repository URL.

use url::Url;

use crate::credentials::{HttpSettings, ResolvedCredentials, ScopedCredentials, SecureHttpClient};
use crate::error::{RepoError, Result};
use crate::index::{ChartIndex, ChartVersion};

/// Client for one classic repository
pub struct HttpRepository {
    url: String,
    client: SecureHttpClient,
}

impl HttpRepository {
    /// Client for `url`, with credentials scoped to it
    pub fn new(
        url: &str,
        credentials: Option<ResolvedCredentials>,
        pass_credentials_all: bool,
        settings: HttpSettings,
    ) -> Result<Self> {
        validate_url(url)?;

        let scoped = credentials
            .map(|creds| ScopedCredentials::single(url, creds))
            .unwrap_or_default();
        let client =
            SecureHttpClient::new(scoped, settings)?.pass_credentials_all(pass_credentials_all);

        Ok(Self {
            url: url.trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn index_url(&self) -> String {
        format!("{}/index.yaml", self.url)
    }

    /// Raw index bytes, parsed once to reject garbage before it is cached
    pub async fn fetch_index_bytes(&self) -> Result<Vec<u8>> {
        let index_url = self.index_url();
        let data = self.client.get_bytes(&index_url).await.map_err(|e| match e {
            RepoError::HttpError { status: 404, .. } => RepoError::IndexNotFound { url: index_url },
            other => other,
        })?;
        ChartIndex::from_bytes(&data)?;
        Ok(data)
    }

    pub async fn fetch_index(&self) -> Result<ChartIndex> {
        let data = self.fetch_index_bytes().await?;
        ChartIndex::from_bytes(&data)
    }

    /// Absolute archive URL for an index entry
    pub fn archive_url(&self, entry: &ChartVersion) -> Result<String> {
        let raw = entry
            .download_url()
            .ok_or_else(|| RepoError::InvalidIndex {
                message: format!("{} {} has no download URL", entry.name, entry.version),
            })?;
        resolve_url(&self.url, raw)
    }

    /// Download an archive and verify its digest when the index has one
    pub async fn download(&self, entry: &ChartVersion) -> Result<Vec<u8>> {
        let url = self.archive_url(entry)?;
        tracing::debug!(chart = %entry.name, version = %entry.version, %url, "downloading chart archive");

        let data = self.client.get_bytes(&url).await?;
        verify_digest(entry, &data)?;
        Ok(data)
    }
}

/// Check that `url` is an absolute http(s) URL
pub fn validate_url(url: &str) -> Result<Url> {
    let parsed = Url::parse(url).map_err(|e| RepoError::InvalidRepositoryUrl {
        url: url.to_string(),
        reason: e.to_string(),
    })?;
    match parsed.scheme() {
        "http" | "https" if parsed.host_str().is_some() => Ok(parsed),
        "http" | "https" => Err(RepoError::InvalidRepositoryUrl {
            url: url.to_string(),
            reason: "missing host".to_string(),
        }),
        scheme => Err(RepoError::InvalidRepositoryUrl {
            url: url.to_string(),
            reason: format!("unsupported scheme '{}'", scheme),
        }),
    }
}

/// Resolve an archive URL against the repository base
fn resolve_url(base: &str, raw: &str) -> Result<String> {
    if raw.starts_with("http://") || raw.starts_with("https://") {
        return Ok(raw.to_string());
    }
    let base = Url::parse(&format!("{}/", base.trim_end_matches('/')))?;
    Ok(base.join(raw)?.to_string())
}

/// `sha256:<hex>` digest of `data`
pub fn compute_digest(data: &[u8]) -> String {
    use sha2::{Digest, Sha256};
    format!("sha256:{}", hex::encode(Sha256::digest(data)))
}

/// Compare digests, ignoring case and `sha256:`/`sha256-` prefixes
pub fn digest_matches(expected: &str, actual: &str) -> bool {
    fn normalize(digest: &str) -> String {
        digest
            .trim()
            .to_lowercase()
            .replace("sha256:", "")
            .replace("sha256-", "")
    }
    normalize(expected) == normalize(actual)
}

pub(crate) fn verify_digest(entry: &ChartVersion, data: &[u8]) -> Result<()> {
    if let Some(expected) = &entry.digest {
        let actual = compute_digest(data);
        if !digest_matches(expected, &actual) {
            return Err(RepoError::IntegrityCheckFailed {
                name: format!("{}-{}", entry.name, entry.version),
                expected: expected.clone(),
                actual,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const AUTH: &str = "Basic dXNlcjpwYXNz";

    /// Archive that is only served with credentials
    async fn serve_protected_archive(server: &MockServer, at: &str) -> Vec<u8> {
        let archive = b"protected archive".to_vec();
        Mock::given(method("GET"))
            .and(path(at))
            .and(header("Authorization", AUTH))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(archive.clone()))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path(at))
            .respond_with(ResponseTemplate::new(401))
            .mount(server)
            .await;
        archive
    }

    fn entry(urls: &[&str], digest: Option<String>) -> ChartVersion {
        ChartVersion {
            name: "simple".to_string(),
            version: "0.1.0".to_string(),
            urls: urls.iter().map(|u| u.to_string()).collect(),
            digest,
            ..Default::default()
        }
    }

    #[test]
    fn test_compute_digest() {
        let digest = compute_digest(b"hello world");
        assert_eq!(
            digest,
            "sha256:b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn test_digest_matches() {
        assert!(digest_matches("sha256:abc123", "sha256:ABC123"));
        assert!(digest_matches("sha256:abc123", "abc123"));
        assert!(digest_matches("sha256:abc123", "sha256-abc123"));
        assert!(!digest_matches("sha256:abc123", "sha256:xyz789"));
    }

    #[test]
    fn test_validate_url() {
        assert!(validate_url("https://charts.bitnami.com/bitnami").is_ok());
        assert!(validate_url("http://localhost:8080").is_ok());
        assert!(validate_url("ftp://charts.example.com").is_err());
        assert!(validate_url("not a url").is_err());
    }

    #[test]
    fn test_resolve_relative_archive_url() {
        let repo = HttpRepository::new(
            "https://charts.example.com/stable/",
            None,
            false,
            HttpSettings::default(),
        )
        .unwrap();

        assert_eq!(
            repo.archive_url(&entry(&["simple-0.1.0.tgz"], None)).unwrap(),
            "https://charts.example.com/stable/simple-0.1.0.tgz"
        );
        assert_eq!(
            repo.archive_url(&entry(&["https://cdn.example.com/simple-0.1.0.tgz"], None))
                .unwrap(),
            "https://cdn.example.com/simple-0.1.0.tgz"
        );
        assert!(repo.archive_url(&entry(&[], None)).is_err());
    }

    #[tokio::test]
    async fn test_fetch_index_and_download() {
        let server = MockServer::start().await;
        let archive = b"not really a tarball".to_vec();
        let index = format!(
            "apiVersion: v1\nentries:\n  simple:\n    - name: simple\n      version: 0.1.0\n      urls: [simple-0.1.0.tgz]\n      digest: {}\n",
            compute_digest(&archive)
        );

        Mock::given(method("GET"))
            .and(path("/index.yaml"))
            .respond_with(ResponseTemplate::new(200).set_body_string(index))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/simple-0.1.0.tgz"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(archive.clone()))
            .mount(&server)
            .await;

        let repo = HttpRepository::new(&server.uri(), None, false, HttpSettings::default()).unwrap();
        let fetched = repo.fetch_index().await.unwrap();
        let chosen = fetched.select("simple", None, "test").unwrap();
        assert_eq!(repo.download(chosen).await.unwrap(), archive);

        let tampered = entry(&["simple-0.1.0.tgz"], Some(compute_digest(b"other")));
        assert!(matches!(
            repo.download(&tampered).await,
            Err(RepoError::IntegrityCheckFailed { .. })
        ));
    }

    #[tokio::test]
    async fn test_missing_index() {
        let server = MockServer::start().await;
        let repo = HttpRepository::new(&server.uri(), None, false, HttpSettings::default()).unwrap();
        assert!(matches!(
            repo.fetch_index().await,
            Err(RepoError::IndexNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_credentials_sent_to_same_host_outside_repository_path() {
        let server = MockServer::start().await;
        let archive = serve_protected_archive(&server, "/blobs/simple-0.1.0.tgz").await;

        let repo = HttpRepository::new(
            &format!("{}/charts", server.uri()),
            Some(ResolvedCredentials::basic("user", "pass")),
            false,
            HttpSettings::default(),
        )
        .unwrap();

        let blob = format!("{}/blobs/simple-0.1.0.tgz", server.uri());
        assert_eq!(repo.download(&entry(&[&blob], None)).await.unwrap(), archive);
    }

    #[tokio::test]
    async fn test_pass_credentials_all_covers_archives_on_other_hosts() {
        let repo_server = MockServer::start().await;
        let blob_server = MockServer::start().await;
        let archive = serve_protected_archive(&blob_server, "/blobs/simple-0.1.0.tgz").await;
        let blob = format!("{}/blobs/simple-0.1.0.tgz", blob_server.uri());

        let forwarding = HttpRepository::new(
            &repo_server.uri(),
            Some(ResolvedCredentials::basic("user", "pass")),
            true,
            HttpSettings::default(),
        )
        .unwrap();
        assert_eq!(
            forwarding.download(&entry(&[&blob], None)).await.unwrap(),
            archive
        );

        let scoped = HttpRepository::new(
            &repo_server.uri(),
            Some(ResolvedCredentials::basic("user", "pass")),
            false,
            HttpSettings::default(),
        )
        .unwrap();
        assert!(matches!(
            scoped.download(&entry(&[&blob], None)).await,
            Err(RepoError::AuthRequired { .. })
        ));
    }
}
