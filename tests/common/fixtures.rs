//! Channel fixtures, config builders and mock-server helpers

use std::path::Path;
use std::time::Duration;

use attachment_dl::types::Channel;
use attachment_dl::{Config, RetryConfig};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Channel export with a threaded reply, a repeat across messages and a
/// file shared between a message and its reply.
///
/// `{base}` is replaced with the mock server URI.
pub const CHANNEL_JSON: &str = r#"{
  "id": "C0123",
  "messages": [
    {
      "ts": "1700000000.000100",
      "files": [
        { "id": "F1", "name": "report.pdf", "size": 10, "url_private_download": "{base}/files/F1/report.pdf" }
      ],
      "thread_replies": [
        {
          "ts": "1700000000.000200",
          "files": [
            { "id": "F2", "name": "diagram.png", "size": 7, "url_private_download": "{base}/files/F2/diagram.png" },
            { "id": "F1", "name": "report.pdf", "size": 10, "url_private_download": "{base}/files/F1/report.pdf" }
          ]
        }
      ]
    },
    {
      "ts": "1700000000.000300"
    },
    {
      "ts": "1700000000.000400",
      "files": [
        { "id": "F3", "name": "notes.txt", "url_private_download": "{base}/files/F3/notes.txt" }
      ]
    }
  ]
}"#;

/// Bodies served for [`CHANNEL_JSON`], keyed by request path
pub const CHANNEL_FILES: &[(&str, &str, &[u8])] = &[
    ("F1-report.pdf", "/files/F1/report.pdf", b"%PDF-1.7.."),
    ("F2-diagram.png", "/files/F2/diagram.png", b"\x89PNG..."),
    ("F3-notes.txt", "/files/F3/notes.txt", b"remember the milk\n"),
];

/// Parse [`CHANNEL_JSON`] pointing at `base`
pub fn channel(base: &str) -> Channel {
    serde_json::from_str(&CHANNEL_JSON.replace("{base}", base)).expect("valid channel fixture")
}

/// Config with fast retries and no rate limit
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.files.workers = 2;
    config.http.timeout = Duration::from_secs(10);
    config.retry = RetryConfig {
        max_attempts: 2,
        initial_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(50),
        backoff_multiplier: 2.0,
        jitter: false,
    };
    config
}

/// Serve `body` at `route`, expecting exactly `times` requests
pub async fn serve(server: &MockServer, route: &str, body: &[u8], times: u64) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body.to_vec()))
        .expect(times)
        .mount(server)
        .await;
}

/// Serve every file of [`CHANNEL_JSON`] once
pub async fn serve_channel_files(server: &MockServer) {
    for (_, route, body) in CHANNEL_FILES {
        serve(server, route, body, 1).await;
    }
}

/// Sorted names of the entries in `dir`
pub fn dir_entries(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .expect("readable directory")
        .map(|e| e.expect("directory entry").file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}
