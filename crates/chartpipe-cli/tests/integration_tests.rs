//! Integration tests for the chartpipe binary

use std::path::Path;
use std::process::{Command, Output};

fn chartpipe(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_chartpipe"))
        .args(args)
        .env_remove("CHARTPIPE_CONFIG")
        .env_remove("RUST_LOG")
        .output()
        .expect("Failed to execute chartpipe")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

/// One OCI pipeline against a registry that refuses connections
const UNREACHABLE_OCI: &str = r#"
pipelines:
  - name: template-private-oci-repo
    output: simple
    source:
      oci:
        uri: oci://127.0.0.1:1/config-sync-test/simple
        registry: http://127.0.0.1:1
    action:
      render:
        releaseName: test
"#;

fn write_config(dir: &Path, yaml: &str) -> String {
    let path = dir.join("chartpipe.yaml");
    std::fs::write(&path, yaml).unwrap();
    path.display().to_string()
}

mod arguments {
    use super::*;

    #[test]
    fn test_help() {
        let output = chartpipe(&["--help"]);

        assert!(output.status.success());
        let out = stdout(&output);
        assert!(out.contains("--config"));
        assert!(out.contains("--fail-on-error"));
        assert!(out.contains("--log-format"));
    }

    #[test]
    fn test_unknown_flag_is_usage_error() {
        let output = chartpipe(&["--no-such-flag"]);
        assert_eq!(output.status.code(), Some(64));
    }

    #[test]
    fn test_invalid_timeout_is_usage_error() {
        let output = chartpipe(&["--timeout", "soon"]);
        assert_eq!(output.status.code(), Some(64));
    }
}

mod configuration {
    use super::*;

    #[test]
    fn test_missing_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.yaml");

        let output = chartpipe(&["--config", missing.to_str().unwrap()]);

        assert_eq!(output.status.code(), Some(5));
        assert!(stderr(&output).contains("absent.yaml"));
    }

    #[test]
    fn test_invalid_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = write_config(
            dir.path(),
            "pipelines:\n  - name: a\n    output: ../escape\n    source:\n      oci:\n        uri: oci://r.example.com/c/simple\n    action:\n      show: {}\n",
        );

        let output = chartpipe(&["--config", &config]);

        assert_eq!(output.status.code(), Some(2));
        assert!(stderr(&output).contains("separator"));
    }

    #[test]
    fn test_config_from_environment() {
        let dir = tempfile::tempdir().unwrap();
        let config = write_config(dir.path(), "pipelines: []\n");

        let output = Command::new(env!("CARGO_BIN_EXE_chartpipe"))
            .env("CHARTPIPE_CONFIG", &config)
            .args(["--cache-dir", dir.path().join("cache").to_str().unwrap()])
            .output()
            .unwrap();

        assert!(output.status.success(), "{}", stderr(&output));
        assert!(stdout(&output).contains("0 of 0 pipeline(s) succeeded"));
    }
}

mod failure_policy {
    use super::*;

    fn run(extra: &[&str]) -> (Output, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let config = write_config(dir.path(), UNREACHABLE_OCI);
        let out = dir.path().join("out");
        let cache = dir.path().join("cache");

        let mut args = vec![
            "--config",
            &config,
            "--output-dir",
            out.to_str().unwrap(),
            "--cache-dir",
            cache.to_str().unwrap(),
        ];
        args.extend_from_slice(extra);
        (chartpipe(&args), dir)
    }

    #[test]
    fn test_report_policy_exits_zero() {
        let (output, dir) = run(&[]);

        assert!(output.status.success(), "{}", stderr(&output));
        let out = stdout(&output);
        assert!(out.contains("==> template-private-oci-repo"));
        assert!(out.contains("(login failed)"));
        assert!(out.contains("0 of 1 pipeline(s) succeeded"));
        assert!(!dir.path().join("out/simple").exists());
    }

    #[test]
    fn test_fail_on_error_exits_non_zero() {
        let (output, _dir) = run(&["--fail-on-error"]);

        assert_eq!(output.status.code(), Some(3));
        assert!(stderr(&output).contains("1 of 1 pipeline(s) failed"));
    }

    #[test]
    fn test_json_logs() {
        let (output, _dir) = run(&["--log-format", "json"]);

        let err = stderr(&output);
        assert!(err.contains("\"level\":\"ERROR\""));
        assert!(err.contains("\"stage\":\"login\""));
        assert!(err.contains("\"pipeline\":\"template-private-oci-repo\""));
    }
}

mod end_to_end {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn wordpress_archive() -> Vec<u8> {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("wordpress");
        std::fs::create_dir_all(root.join("templates")).unwrap();
        std::fs::write(
            root.join("Chart.yaml"),
            "apiVersion: v2\nname: wordpress\nversion: 1.0.0\n",
        )
        .unwrap();
        std::fs::write(
            root.join("templates/service.yaml"),
            "apiVersion: v1\nkind: Service\nmetadata:\n  name: {{ release.name }}-wordpress\n  namespace: {{ release.namespace }}\n",
        )
        .unwrap();
        chartpipe_core::package_chart(&root).unwrap()
    }

    #[tokio::test]
    async fn test_wordpress_written() {
        let server = MockServer::start().await;
        let archive = wordpress_archive();
        let index = format!(
            "apiVersion: v1\nentries:\n  wordpress:\n    - name: wordpress\n      version: 1.0.0\n      urls: [{}/bitnami/wordpress-1.0.0.tgz]\n",
            server.uri()
        );
        Mock::given(method("GET"))
            .and(path("/bitnami/index.yaml"))
            .respond_with(ResponseTemplate::new(200).set_body_string(index))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/bitnami/wordpress-1.0.0.tgz"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(archive))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let config = write_config(
            dir.path(),
            &format!(
                r#"
pipelines:
  - name: template-public-non-oci-repo
    output: wordpress
    source:
      repository:
        name: bitnami
        url: {}/bitnami
        chart: wordpress
        passCredentialsAll: true
    action:
      render:
        releaseName: test
        namespace: default
"#,
                server.uri()
            ),
        );
        let out = dir.path().join("out");
        let cache = dir.path().join("cache");
        let args = vec![
            "--config".to_string(),
            config,
            "--output-dir".to_string(),
            out.display().to_string(),
            "--cache-dir".to_string(),
            cache.display().to_string(),
        ];

        let output = tokio::task::spawn_blocking(move || {
            let args: Vec<&str> = args.iter().map(String::as_str).collect();
            chartpipe(&args)
        })
        .await
        .unwrap();

        assert!(output.status.success(), "{}", stderr(&output));
        assert!(stdout(&output).contains("1 of 1 pipeline(s) succeeded"));

        let rendered = std::fs::read_to_string(out.join("wordpress")).unwrap();
        assert!(rendered.contains("name: test-wordpress"));
        assert!(rendered.contains("namespace: default"));
        assert!(cache.join("repositories.yaml").exists());
    }
}
