use httpmock::prelude::*;
use serde_json::json;

use marketplace::defaults::{self, Defaults};
use marketplace::fetch::{CsvSource, HttpCsvSource};
use marketplace::release::{AssetPublisher, GitHubPublisher, ReleaseTarget, RepoSlug};

const TOKEN: &str = "test-token";
const TAG_PATH: &str = "/repos/octo-org/marketplace/releases/tags/v1.0.0";

fn defaults_for(server: &MockServer) -> Defaults {
    let mut defaults = defaults::builtin_defaults();
    defaults.release.api_base = server.base_url();
    defaults.http.timeout_secs = 5;
    defaults.release.upload_timeout_secs = 5;
    defaults
}

fn publisher(server: &MockServer) -> GitHubPublisher {
    let defaults = defaults_for(server);
    GitHubPublisher::with_token(&defaults.http, &defaults.release, TOKEN).unwrap()
}

fn target() -> ReleaseTarget {
    ReleaseTarget {
        repo: RepoSlug::parse("octo-org/marketplace").unwrap(),
        tag: "v1.0.0".to_string(),
        asset_name: "marketplace.db".to_string(),
    }
}

#[test]
fn publish_replaces_existing_asset_and_uploads_database() {
    let server = MockServer::start();

    let release = server.mock(|when, then| {
        when.method(GET)
            .path(TAG_PATH)
            .header("authorization", "Bearer test-token")
            .header("accept", "application/vnd.github+json");
        then.status(200).json_body(json!({
            "upload_url": server.url("/uploads/releases/9/assets{?name,label}"),
            "assets": [
                { "id": 41, "name": "notes.txt" },
                { "id": 42, "name": "marketplace.db" }
            ]
        }));
    });
    let delete = server.mock(|when, then| {
        when.method(DELETE)
            .path("/repos/octo-org/marketplace/releases/assets/42")
            .header("authorization", "Bearer test-token");
        then.status(204);
    });
    let upload = server.mock(|when, then| {
        when.method(POST)
            .path("/uploads/releases/9/assets")
            .query_param("name", "marketplace.db")
            .header("content-type", "application/vnd.sqlite3")
            .header("authorization", "Bearer test-token")
            .body("sqlite bytes");
        then.status(201).json_body(json!({
            "id": 77,
            "name": "marketplace.db",
            "browser_download_url": "https://example.com/download/marketplace.db"
        }));
    });

    let result = publisher(&server)
        .publish(&target(), b"sqlite bytes".to_vec())
        .unwrap();

    release.assert();
    delete.assert();
    upload.assert();
    assert!(result.replaced_existing);
    assert_eq!(result.asset_id, Some(77));
    assert_eq!(result.size_bytes, 12);
    assert_eq!(result.content_type, "application/vnd.sqlite3");
    assert!(result.download_url.unwrap().ends_with("/marketplace.db"));
}

#[test]
fn publish_without_existing_asset_skips_delete() {
    let server = MockServer::start();

    server.mock(|when, then| {
        when.method(GET).path(TAG_PATH);
        then.status(200).json_body(json!({
            "upload_url": server.url("/uploads/releases/9/assets{?name,label}"),
            "assets": []
        }));
    });
    let delete = server.mock(|when, then| {
        when.method(DELETE);
        then.status(204);
    });
    server.mock(|when, then| {
        when.method(POST).path("/uploads/releases/9/assets");
        then.status(201).json_body(json!({ "id": 5, "name": "marketplace.db" }));
    });

    let result = publisher(&server).publish(&target(), vec![1, 2, 3]).unwrap();

    delete.assert_hits(0);
    assert!(!result.replaced_existing);
    assert_eq!(result.download_url, None);
}

#[test]
fn missing_release_is_reported_as_not_found() {
    let server = MockServer::start();
    let release = server.mock(|when, then| {
        when.method(GET).path(TAG_PATH);
        then.status(404).json_body(json!({ "message": "Not Found" }));
    });

    let err = publisher(&server).publish(&target(), vec![1]).unwrap_err();

    release.assert();
    assert_eq!(err.code.as_str(), "release.not_found");
    assert_eq!(err.details["tag"], "v1.0.0");
}

#[test]
fn rejected_upload_carries_status_and_body() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path(TAG_PATH);
        then.status(200).json_body(json!({
            "upload_url": server.url("/uploads/releases/9/assets{?name,label}"),
        }));
    });
    let upload = server.mock(|when, then| {
        when.method(POST).path("/uploads/releases/9/assets");
        then.status(422).json_body(json!({ "message": "Validation Failed" }));
    });

    let err = publisher(&server).publish(&target(), vec![1]).unwrap_err();

    upload.assert();
    assert_eq!(err.code.as_str(), "release.upload_failed");
    assert_eq!(err.details["status"], 422);
    assert!(err.details["body"]
        .as_str()
        .unwrap()
        .contains("Validation Failed"));
}

#[test]
fn csv_server_error_is_a_retryable_download_failure() {
    let server = MockServer::start();
    let csv = server.mock(|when, then| {
        when.method(GET).path("/catalogs/classics.csv");
        then.status(500).body("upstream exploded");
    });

    let source = HttpCsvSource::new(&defaults_for(&server).http).unwrap();
    let url = server.url("/catalogs/classics.csv");
    let err = source.fetch(&url).unwrap_err();

    csv.assert();
    assert_eq!(err.code.as_str(), "download.failed");
    assert_eq!(err.details["status"], 500);
    assert_eq!(err.details["url"], url.as_str());
    assert_eq!(err.retryable, Some(true));
}

#[test]
fn csv_body_is_decoded_by_declared_charset() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/catalogs/legacy.csv");
        then.status(200)
            .header("content-type", "text/csv; charset=iso-8859-1")
            .body(b"Cab,https://x/cab.zip,Pok\xe9mon\n");
    });

    let source = HttpCsvSource::new(&defaults_for(&server).http).unwrap();
    let body = source.fetch(&server.url("/catalogs/legacy.csv")).unwrap();

    assert_eq!(
        String::from_utf8(body).unwrap(),
        "Cab,https://x/cab.zip,Pok\u{e9}mon\n"
    );
}
