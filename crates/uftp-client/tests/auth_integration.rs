// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Auth handshake against a minimal blocking HTTP responder

use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpListener;
use std::sync::mpsc;
use std::thread;

use uftp_client::auth::SESSION_TAG;
use uftp_client::{AuthClient, AuthConfig, UftpError};

struct CapturedRequest {
    request_line: String,
    headers: Vec<String>,
    body: String,
}

/// Serve exactly one request with `status` and `body`, reporting what was
/// received.
fn one_shot_server(status: &'static str, body: &'static str) -> (String, mpsc::Receiver<CapturedRequest>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let url = format!("http://{}/rest/auth/TEST", listener.local_addr().unwrap());
    let (tx, rx) = mpsc::channel();

    thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        let mut reader = BufReader::new(stream.try_clone().unwrap());

        let mut request_line = String::new();
        reader.read_line(&mut request_line).unwrap();
        let mut headers = Vec::new();
        let mut content_length = 0usize;
        loop {
            let mut line = String::new();
            reader.read_line(&mut line).unwrap();
            let line = line.trim_end().to_string();
            if line.is_empty() {
                break;
            }
            if let Some((name, value)) = line.split_once(':') {
                if name.eq_ignore_ascii_case("content-length") {
                    content_length = value.trim().parse().unwrap();
                }
            }
            headers.push(line);
        }
        let mut body_bytes = vec![0; content_length];
        reader.read_exact(&mut body_bytes).unwrap();

        let mut stream = stream;
        let response = format!(
            "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status,
            body.len(),
            body
        );
        stream.write_all(response.as_bytes()).unwrap();

        tx.send(CapturedRequest {
            request_line: request_line.trim_end().to_string(),
            headers,
            body: String::from_utf8(body_bytes).unwrap(),
        })
        .unwrap();
    });

    (url, rx)
}

#[test]
fn handshake_posts_session_request_and_parses_descriptor() {
    let (url, rx) = one_shot_server(
        "200 OK",
        r#"{"serverHost":"uftp.example.org","serverPort":64434,"secret":"abc"}"#,
    );
    let client = AuthClient::from_url(
        &url,
        AuthConfig::Basic {
            username: "demouser".into(),
            password: "test123".into(),
        },
    )
    .unwrap();

    let descriptor = client.authenticate("/data-dir").unwrap();
    assert_eq!(descriptor.host, "uftp.example.org");
    assert_eq!(descriptor.port, 64434);
    assert_eq!(descriptor.secret, "abc");

    let request = rx.recv().unwrap();
    assert!(request.request_line.starts_with("POST /rest/auth/TEST "));
    assert!(request
        .headers
        .iter()
        .any(|h| h.to_ascii_lowercase().starts_with("authorization: basic ")));

    let body: serde_json::Value = serde_json::from_str(&request.body).unwrap();
    assert_eq!(body["persistent"], "true");
    assert_eq!(body["serverPath"], format!("/data-dir/{}", SESSION_TAG));
}

#[test]
fn bearer_token_is_sent() {
    let (url, rx) = one_shot_server("200 OK", r#"{"serverHost":"h","serverPort":1,"secret":"s"}"#);
    uftp_client::authenticate(&url, "", AuthConfig::Bearer("tok-123".into())).unwrap();

    let request = rx.recv().unwrap();
    assert!(request
        .headers
        .iter()
        .any(|h| h.to_ascii_lowercase() == "authorization: bearer tok-123"));
    let body: serde_json::Value = serde_json::from_str(&request.body).unwrap();
    assert_eq!(body["serverPath"], SESSION_TAG);
}

#[test]
fn non_success_status_is_an_auth_error() {
    let (url, _rx) = one_shot_server("401 Unauthorized", r#"{"errorMessage":"bad credentials"}"#);
    let err = uftp_client::authenticate(&url, "/data", AuthConfig::Anonymous).unwrap_err();
    match err {
        UftpError::Auth(message) => {
            assert!(message.contains("401"), "{message}");
            assert!(message.contains("bad credentials"), "{message}");
        }
        other => panic!("expected auth error, got {other:?}"),
    }
}

#[test]
fn malformed_descriptor_is_an_auth_error() {
    let (url, _rx) = one_shot_server("200 OK", r#"{"serverHost":"h"}"#);
    let err = uftp_client::authenticate(&url, "/data", AuthConfig::Anonymous).unwrap_err();
    assert!(matches!(err, UftpError::Auth(_)));
}
