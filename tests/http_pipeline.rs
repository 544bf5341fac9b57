//! End-to-end tests: channel export → extraction → dedup → HTTP workers → disk
//!
//! Files are served by a local wiremock server, so these tests need no
//! network access.

mod common;

use std::sync::Arc;
use std::time::{Duration, Instant};

use attachment_dl::types::Channel;
use attachment_dl::{
    BroadcastReporter, ChannelFileSet, Error, Event, FileDownloader, HttpFetcher, TokenBucket,
};
use common::{CHANNEL_FILES, channel, dir_entries, serve, serve_channel_files, test_config};
use tokio::sync::broadcast::error::TryRecvError;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TIMEOUT: Duration = Duration::from_secs(10);

fn drain(rx: &mut tokio::sync::broadcast::Receiver<Event>) -> Vec<Event> {
    let mut events = Vec::new();
    loop {
        match rx.try_recv() {
            Ok(event) => events.push(event),
            Err(TryRecvError::Lagged(_)) => continue,
            Err(TryRecvError::Empty | TryRecvError::Closed) => return events,
        }
    }
}

#[tokio::test]
async fn downloads_a_channel_export() {
    let server = MockServer::start().await;
    serve_channel_files(&server).await;
    let temp = tempfile::tempdir().unwrap();
    let dir = temp.path().join("C0123");

    let downloader = FileDownloader::from_config(&test_config()).unwrap();
    let files = ChannelFileSet::from_channel(&channel(&server.uri()));
    assert_eq!(files.files.len(), 4);

    tokio::time::timeout(
        TIMEOUT,
        downloader.download_channel(&dir, files, CancellationToken::new()),
    )
    .await
    .unwrap()
    .unwrap();

    let expected: Vec<String> = CHANNEL_FILES.iter().map(|(name, _, _)| name.to_string()).collect();
    assert_eq!(dir_entries(&dir), expected);
    for (name, _, body) in CHANNEL_FILES {
        assert_eq!(std::fs::read(dir.join(name)).unwrap(), *body);
    }
    // expect(1) on every mock: F1 was requested once despite the repeat
    server.verify().await;
}

#[tokio::test]
async fn sends_bearer_token_and_file_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/files/F9/secret.txt"))
        .and(header("authorization", "Bearer xoxb-api"))
        .and(query_param("t", "xoxe-file"))
        .respond_with(ResponseTemplate::new(200).set_body_string("classified"))
        .expect(1)
        .mount(&server)
        .await;
    let temp = tempfile::tempdir().unwrap();

    let mut config = test_config();
    config.http.token = Some("xoxb-api".to_string());
    config.http.file_token = Some("xoxe-file".to_string());
    let downloader = FileDownloader::from_config(&config).unwrap();

    let channel: Channel = serde_json::from_value(serde_json::json!({
        "id": "C9",
        "messages": [{
            "files": [{
                "id": "F9",
                "name": "secret.txt",
                "url_private_download": format!("{}/files/F9/secret.txt", server.uri()),
            }]
        }]
    }))
    .unwrap();

    downloader
        .download_channel(
            temp.path(),
            ChannelFileSet::from_channel(&channel),
            CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(
        std::fs::read_to_string(temp.path().join("F9-secret.txt")).unwrap(),
        "classified"
    );
}

#[tokio::test]
async fn transient_server_errors_are_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/files/F1/report.pdf"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    serve_channel_files(&server).await;
    let temp = tempfile::tempdir().unwrap();

    let downloader = FileDownloader::from_config(&test_config()).unwrap();
    downloader
        .download_channel(
            temp.path(),
            ChannelFileSet::from_channel(&channel(&server.uri())),
            CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(dir_entries(temp.path()).len(), CHANNEL_FILES.len());
    server.verify().await;
}

#[tokio::test]
async fn reports_every_outcome_through_the_reporter() {
    let server = MockServer::start().await;
    // F2 is missing on the server
    serve(&server, "/files/F1/report.pdf", b"%PDF", 1).await;
    serve(&server, "/files/F3/notes.txt", b"notes", 1).await;
    let temp = tempfile::tempdir().unwrap();

    let broadcast = BroadcastReporter::new(64);
    let mut rx = broadcast.subscribe();
    let downloader =
        FileDownloader::from_config(&test_config()).unwrap().with_reporter(Arc::new(broadcast));

    downloader
        .download_channel(
            temp.path(),
            ChannelFileSet::from_channel(&channel(&server.uri())),
            CancellationToken::new(),
        )
        .await
        .unwrap();

    let events = drain(&mut rx);
    let skipped: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            Event::DuplicateSkipped { id, .. } => Some(id.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(skipped, vec!["F1"]);

    let mut finished: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            Event::Finished(outcome) => Some(outcome.clone()),
            _ => None,
        })
        .collect();
    finished.sort_by(|a, b| a.attachment_id.cmp(&b.attachment_id));
    assert_eq!(finished.len(), 3);
    assert!(finished[0].is_success());
    assert!(!finished[1].is_success());
    assert!(finished[1].error.as_deref().unwrap().contains("404"));
    assert!(finished[2].is_success());

    assert_eq!(dir_entries(temp.path()), vec!["F1-report.pdf", "F3-notes.txt"]);
}

#[tokio::test]
async fn shared_rate_limit_paces_transfers() {
    let server = MockServer::start().await;
    let bodies: Vec<(String, String)> = (0..5)
        .map(|i| (format!("/files/R{i}/r.bin"), format!("body {i}")))
        .collect();
    for (route, body) in &bodies {
        serve(&server, route, body.as_bytes(), 1).await;
    }
    let temp = tempfile::tempdir().unwrap();

    let mut config = test_config();
    config.files.workers = 4;
    let fetcher = HttpFetcher::new(&config.http, &config.retry).unwrap();
    let downloader = FileDownloader::new(
        config.files.clone(),
        Arc::new(fetcher),
        Arc::new(TokenBucket::new(Some(20.0), 1)),
    );

    let attachments: Vec<_> = (0..5)
        .map(|i| attachment_dl::Attachment {
            id: format!("R{i}").into(),
            name: "r.bin".to_string(),
            size: 0,
            url_private_download: format!("{}/files/R{i}/r.bin", server.uri()),
        })
        .collect();

    let started = Instant::now();
    downloader
        .start(temp.path(), futures::stream::iter(attachments), CancellationToken::new())
        .await
        .unwrap()
        .wait()
        .await;
    let elapsed = started.elapsed();

    // burst of 1 at 20/s: four of the five permits wait ~50ms each
    assert!(elapsed >= Duration::from_millis(150), "took {elapsed:?}");
    assert_eq!(dir_entries(temp.path()).len(), 5);
}

#[tokio::test]
async fn dump_channels_writes_per_channel_directories() {
    let server = MockServer::start().await;
    serve(&server, "/files/F1/report.pdf", b"%PDF", 2).await;
    serve(&server, "/files/F2/diagram.png", b"png", 1).await;
    serve(&server, "/files/F3/notes.txt", b"notes", 1).await;
    let temp = tempfile::tempdir().unwrap();

    let first = channel(&server.uri());
    let second: Channel = serde_json::from_value(serde_json::json!({
        "id": "C0456",
        "messages": [{
            "files": [{
                "id": "F1",
                "name": "report.pdf",
                "url_private_download": format!("{}/files/F1/report.pdf", server.uri()),
            }]
        }]
    }))
    .unwrap();

    let downloader = FileDownloader::from_config(&test_config()).unwrap();
    let summary = downloader
        .dump_channels(temp.path(), &[first, second], &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(dir_entries(temp.path()), vec!["C0123", "C0456"]);
    assert_eq!(dir_entries(&temp.path().join("C0456")), vec!["F1-report.pdf"]);
    assert_eq!(summary.total().downloaded, 4);
    assert_eq!(summary.channels[0].dir, temp.path().join("C0123"));
    server.verify().await;
}

#[tokio::test]
async fn fail_on_error_surfaces_the_failing_channel() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;
    let temp = tempfile::tempdir().unwrap();

    let mut config = test_config();
    config.files.fail_on_error = true;
    let downloader = FileDownloader::from_config(&config).unwrap();

    let err = downloader
        .dump_channels(
            temp.path(),
            &[channel(&server.uri())],
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

    assert!(
        matches!(err, Error::ChannelFailed { ref channel_id, failed: 3 } if channel_id == "C0123"),
        "unexpected error: {err:?}"
    );
}

#[tokio::test]
async fn config_file_drives_the_downloader() {
    let temp = tempfile::tempdir().unwrap();
    let config_path = temp.path().join("config.json");
    std::fs::write(
        &config_path,
        r#"{ "files": { "enabled": false }, "rate_limit": { "requests_per_second": 5 } }"#,
    )
    .unwrap();

    let config = attachment_dl::Config::from_file(&config_path).unwrap();
    let downloader = FileDownloader::from_config(&config).unwrap();
    let dir = temp.path().join("never");

    let completion = downloader
        .start(
            &dir,
            ChannelFileSet::from_channel(&channel("http://127.0.0.1:9")).into_stream(),
            CancellationToken::new(),
        )
        .await
        .unwrap();

    assert!(completion.is_complete());
    assert!(!dir.exists());
}
