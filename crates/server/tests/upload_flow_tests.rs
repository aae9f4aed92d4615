//! End-to-end upload flows over a real socket.
//!
//! Each test starts the router on an ephemeral port and speaks plain
//! HTTP/1.1 over a TCP stream, the same way a resumable-upload client
//! would.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use sha2::{Digest, Sha256};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use dockhand_commit::UploadRegistry;
use dockhand_server::headers::encode_upload_metadata;
use dockhand_server::{AppState, StaticContext, router};
use dockhand_settings::UploadSettings;

struct TestServer {
    addr: String,
    root: tempfile::TempDir,
}

async fn start_server(enabled: bool) -> TestServer {
    let root = tempfile::tempdir().unwrap();
    let state = AppState {
        context: Arc::new(StaticContext {
            user_id: 1,
            root: root.path().to_path_buf(),
        }),
        registry: Arc::new(UploadRegistry::new()),
        settings: UploadSettings {
            enabled,
            ..Default::default()
        },
    };

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = format!("127.0.0.1:{}", listener.local_addr().unwrap().port());
    tokio::spawn(async move {
        axum::serve(listener, router(state)).await.unwrap();
    });

    TestServer { addr, root }
}

struct RawResponse {
    status: u16,
    headers: HashMap<String, String>,
}

impl RawResponse {
    fn header(&self, name: &str) -> &str {
        self.headers
            .get(name)
            .map(String::as_str)
            .unwrap_or_default()
    }
}

async fn request(
    addr: &str,
    method: &str,
    path: &str,
    headers: &[(&str, String)],
    body: &[u8],
) -> RawResponse {
    let mut stream = TcpStream::connect(addr).await.unwrap();

    let mut req = format!(
        "{method} {path} HTTP/1.1\r\nhost: localhost\r\nconnection: close\r\ncontent-length: {}\r\n",
        body.len()
    );
    for (name, value) in headers {
        req.push_str(&format!("{name}: {value}\r\n"));
    }
    req.push_str("\r\n");

    stream.write_all(req.as_bytes()).await.unwrap();
    stream.write_all(body).await.unwrap();

    let mut raw = Vec::new();
    stream.read_to_end(&mut raw).await.unwrap();
    parse_response(&raw)
}

fn parse_response(raw: &[u8]) -> RawResponse {
    let text = String::from_utf8_lossy(raw);
    let head = text.split("\r\n\r\n").next().unwrap_or_default();
    let mut lines = head.lines();

    let status = lines
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|code| code.parse().ok())
        .expect("malformed status line");

    let mut headers = HashMap::new();
    for line in lines {
        if let Some((name, value)) = line.split_once(':') {
            headers.insert(name.trim().to_ascii_lowercase(), value.trim().to_string());
        }
    }
    RawResponse { status, headers }
}

fn upload_metadata(filename: &str, destination: &str, overwrite: &str) -> String {
    let mut metadata = HashMap::new();
    metadata.insert("filename".to_string(), filename.to_string());
    metadata.insert("destination".to_string(), destination.to_string());
    metadata.insert("overwrite".to_string(), overwrite.to_string());
    encode_upload_metadata(&metadata)
}

/// Extracts the upload id from a Location header.
fn upload_id(response: &RawResponse) -> String {
    response
        .header("location")
        .rsplit('/')
        .next()
        .unwrap()
        .to_string()
}

async fn wait_for_file(path: &Path) -> bool {
    for _ in 0..100 {
        if path.exists() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

#[tokio::test]
async fn full_upload_flow_lands_in_user_root() {
    let server = start_server(true).await;

    let created = request(
        &server.addr,
        "POST",
        "/api/uploads",
        &[
            ("upload-length", "11".to_string()),
            (
                "upload-metadata",
                upload_metadata("greeting.txt", "docs/greeting.txt", "false"),
            ),
        ],
        b"",
    )
    .await;
    assert_eq!(created.status, 201);
    assert_eq!(created.header("upload-offset"), "0");
    let id = upload_id(&created);

    let patched = request(
        &server.addr,
        "PATCH",
        &format!("/api/uploads/{id}"),
        &[("upload-offset", "0".to_string())],
        b"hello world",
    )
    .await;
    assert_eq!(patched.status, 204);
    assert_eq!(patched.header("upload-offset"), "11");

    // The completion consumer commits the upload in the background.
    let dest = server.root.path().join("docs/greeting.txt");
    assert!(wait_for_file(&dest).await, "upload should be committed");
    assert_eq!(std::fs::read(&dest).unwrap(), b"hello world");
}

#[tokio::test]
async fn concatenated_upload_flow() {
    let server = start_server(true).await;

    // Two parallel partial uploads.
    let mut part_ids = Vec::new();
    for chunk in [&b"hello "[..], &b"world"[..]] {
        let created = request(
            &server.addr,
            "POST",
            "/api/uploads",
            &[
                ("upload-length", chunk.len().to_string()),
                ("upload-concat", "partial".to_string()),
            ],
            b"",
        )
        .await;
        assert_eq!(created.status, 201);
        let id = upload_id(&created);

        let patched = request(
            &server.addr,
            "PATCH",
            &format!("/api/uploads/{id}"),
            &[("upload-offset", "0".to_string())],
            chunk,
        )
        .await;
        assert_eq!(patched.status, 204);
        part_ids.push(id);
    }

    // The final request stitches the partials together; its metadata
    // carries the destination.
    let refs = part_ids
        .iter()
        .map(|id| format!("/api/uploads/{id}"))
        .collect::<Vec<_>>()
        .join(" ");
    let finished = request(
        &server.addr,
        "POST",
        "/api/uploads",
        &[
            ("upload-concat", format!("final;{refs}")),
            (
                "upload-metadata",
                upload_metadata("hello.txt", "hello.txt", "false"),
            ),
        ],
        b"",
    )
    .await;
    assert_eq!(finished.status, 201);
    assert_eq!(finished.header("upload-offset"), "11");

    let dest = server.root.path().join("hello.txt");
    assert!(wait_for_file(&dest).await, "concat upload should be committed");
    assert_eq!(std::fs::read(&dest).unwrap(), b"hello world");
}

#[tokio::test]
async fn head_reports_offset_and_length() {
    let server = start_server(true).await;

    let created = request(
        &server.addr,
        "POST",
        "/api/uploads",
        &[
            ("upload-length", "4".to_string()),
            (
                "upload-metadata",
                upload_metadata("a.bin", "a.bin", "false"),
            ),
        ],
        b"",
    )
    .await;
    let id = upload_id(&created);

    request(
        &server.addr,
        "PATCH",
        &format!("/api/uploads/{id}"),
        &[("upload-offset", "0".to_string())],
        b"ab",
    )
    .await;

    let head = request(
        &server.addr,
        "HEAD",
        &format!("/api/uploads/{id}"),
        &[],
        b"",
    )
    .await;
    assert_eq!(head.status, 200);
    assert_eq!(head.header("upload-offset"), "2");
    assert_eq!(head.header("upload-length"), "4");
}

#[tokio::test]
async fn offset_conflict_is_409() {
    let server = start_server(true).await;

    let created = request(
        &server.addr,
        "POST",
        "/api/uploads",
        &[
            ("upload-length", "8".to_string()),
            (
                "upload-metadata",
                upload_metadata("b.bin", "b.bin", "false"),
            ),
        ],
        b"",
    )
    .await;
    let id = upload_id(&created);

    let conflict = request(
        &server.addr,
        "PATCH",
        &format!("/api/uploads/{id}"),
        &[("upload-offset", "5".to_string())],
        b"late",
    )
    .await;
    assert_eq!(conflict.status, 409);
}

#[tokio::test]
async fn chunk_checksum_is_verified() {
    let server = start_server(true).await;

    let created = request(
        &server.addr,
        "POST",
        "/api/uploads",
        &[
            ("upload-length", "9".to_string()),
            (
                "upload-metadata",
                upload_metadata("c.bin", "c.bin", "false"),
            ),
        ],
        b"",
    )
    .await;
    let id = upload_id(&created);

    let bogus = BASE64.encode([0u8; 32]);
    let rejected = request(
        &server.addr,
        "PATCH",
        &format!("/api/uploads/{id}"),
        &[
            ("upload-offset", "0".to_string()),
            ("upload-checksum", format!("sha256 {bogus}")),
        ],
        b"test data",
    )
    .await;
    assert_eq!(rejected.status, 460);

    let good = BASE64.encode(Sha256::digest(b"test data"));
    let accepted = request(
        &server.addr,
        "PATCH",
        &format!("/api/uploads/{id}"),
        &[
            ("upload-offset", "0".to_string()),
            ("upload-checksum", format!("sha256 {good}")),
        ],
        b"test data",
    )
    .await;
    assert_eq!(accepted.status, 204);
}

#[tokio::test]
async fn other_methods_are_refused() {
    let server = start_server(true).await;

    let get = request(&server.addr, "GET", "/api/uploads", &[], b"").await;
    assert_eq!(get.status, 405);

    let put = request(&server.addr, "PUT", "/api/uploads/some-id", &[], b"").await;
    assert_eq!(put.status, 405);

    let delete = request(&server.addr, "DELETE", "/api/uploads", &[], b"").await;
    assert_eq!(delete.status, 405);
}

#[tokio::test]
async fn unknown_upload_is_404() {
    let server = start_server(true).await;

    let head = request(&server.addr, "HEAD", "/api/uploads/ghost", &[], b"").await;
    assert_eq!(head.status, 404);
}

#[tokio::test]
async fn disabled_uploads_are_hidden() {
    let server = start_server(false).await;

    let created = request(
        &server.addr,
        "POST",
        "/api/uploads",
        &[("upload-length", "1".to_string())],
        b"",
    )
    .await;
    assert_eq!(created.status, 404);
}
