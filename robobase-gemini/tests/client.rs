//! Requests against a local server replaying canned responses.
use anyhow::Result;
use robobase_core::record::{Record, RecordValue};
use robobase_gemini::{
    FileState, GeminiClient, GeminiConfig, JudgeError, Judgement, RetryConfig, VideoFile,
};
use std::{
    io::{BufRead, BufReader, Read, Write},
    net::{TcpListener, TcpStream},
    thread::{self, JoinHandle},
};
use tempdir::TempDir;

struct MockResponse {
    status: u16,
    headers: Vec<(String, String)>,
    body: String,
}

impl MockResponse {
    fn json(status: u16, body: serde_json::Value) -> Self {
        Self {
            status,
            headers: vec![],
            body: body.to_string(),
        }
    }

    fn header(mut self, k: &str, v: &str) -> Self {
        self.headers.push((k.to_string(), v.to_string()));
        self
    }

    fn render(&self) -> String {
        let mut s = format!("HTTP/1.1 {} Mock\r\n", self.status);
        s += "Content-Type: application/json\r\n";
        s += "Connection: close\r\n";
        s += &format!("Content-Length: {}\r\n", self.body.len());
        for (k, v) in self.headers.iter() {
            s += &format!("{}: {}\r\n", k, v);
        }
        s + "\r\n" + &self.body
    }
}

/// Reads a request and returns its request line and body.
fn read_request(stream: &mut TcpStream) -> (String, String) {
    let mut reader = BufReader::new(stream);
    let mut request_line = String::new();
    reader.read_line(&mut request_line).unwrap();
    let mut content_length = 0;
    loop {
        let mut line = String::new();
        reader.read_line(&mut line).unwrap();
        if line == "\r\n" || line.is_empty() {
            break;
        }
        if let Some((k, v)) = line.split_once(':') {
            if k.eq_ignore_ascii_case("content-length") {
                content_length = v.trim().parse().unwrap();
            }
        }
    }
    let mut body = vec![0u8; content_length];
    reader.read_exact(&mut body).unwrap();
    (
        request_line.trim().to_string(),
        String::from_utf8_lossy(&body).to_string(),
    )
}

/// Serves one response per connection, in order. Returns the base URL and a
/// handle yielding the received requests.
fn serve(
    responses: impl FnOnce(&str) -> Vec<MockResponse>,
) -> (String, JoinHandle<Vec<(String, String)>>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let base_url = format!("http://{}", listener.local_addr().unwrap());
    let responses = responses(&base_url);
    let handle = thread::spawn(move || {
        let mut requests = vec![];
        for resp in responses {
            let (mut stream, _) = listener.accept().unwrap();
            requests.push(read_request(&mut stream));
            stream.write_all(resp.render().as_bytes()).unwrap();
        }
        requests
    });
    (base_url, handle)
}

fn client(base_url: &str) -> Result<GeminiClient> {
    let config = GeminiConfig::default()
        .base_url(base_url)
        .poll_interval_ms(0)
        .retry(RetryConfig::default().max_attempts(3).initial_delay_ms(0));
    Ok(GeminiClient::with_api_key(config, "test-key")?)
}

fn file(state: &str) -> serde_json::Value {
    serde_json::json!({
        "name": "files/seg0",
        "displayName": "seg0.mp4",
        "mimeType": "video/mp4",
        "uri": "https://example.invalid/files/seg0",
        "state": state
    })
}

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[test]
fn test_upload_video_waits_for_processing() -> Result<()> {
    init();
    let dir = TempDir::new("gemini_upload")?;
    let path = dir.path().join("seg0.mp4");
    std::fs::write(&path, b"not really a video")?;

    let (base_url, handle) = serve(|base| {
        vec![
            MockResponse::json(200, serde_json::json!({}))
                .header("X-Goog-Upload-URL", &format!("{}/upload-session", base)),
            MockResponse::json(200, serde_json::json!({ "file": file("PROCESSING") })),
            // A transient failure while polling is retried.
            MockResponse::json(503, serde_json::json!({})),
            MockResponse::json(200, file("PROCESSING")),
            MockResponse::json(200, file("ACTIVE")),
        ]
    });
    let video = client(&base_url)?.upload_video(&path)?;
    assert_eq!(video.state, FileState::Active);
    assert_eq!(video.uri, "https://example.invalid/files/seg0");

    let requests = handle.join().unwrap();
    assert!(requests[0].0.starts_with("POST /upload/v1beta/files?key=test-key"));
    assert!(requests[0].1.contains("seg0.mp4"));
    assert!(requests[1].0.starts_with("POST /upload-session"));
    assert_eq!(requests[1].1, "not really a video");
    assert!(requests[4].0.starts_with("GET /v1beta/files/seg0?key=test-key"));
    Ok(())
}

#[test]
fn test_failed_processing_is_fatal() -> Result<()> {
    init();
    let (base_url, handle) = serve(|_| vec![MockResponse::json(200, file("FAILED"))]);
    let processing: VideoFile = serde_json::from_value(file("PROCESSING"))?;
    let r = client(&base_url)?.wait_for_processing(processing);
    assert!(matches!(r, Err(JudgeError::ProcessingFailed(name)) if name == "files/seg0"));
    assert_eq!(handle.join().unwrap().len(), 1);
    Ok(())
}

#[test]
fn test_judge() -> Result<()> {
    init();
    let answer = |text: &str| {
        MockResponse::json(
            200,
            serde_json::json!({
                "candidates": [{"content": {"role": "model", "parts": [{"text": text}]}}]
            }),
        )
    };
    let (base_url, handle) = serve(|_| {
        vec![
            MockResponse::json(429, serde_json::json!({"error": "rate limited"})),
            answer("<Answer>: Video 2"),
            answer("I cannot tell."),
        ]
    });
    let client = client(&base_url)?;
    let videos: Vec<VideoFile> = vec![serde_json::from_value(file("ACTIVE"))?];

    let judgement = client.judge("Which is better?", &videos)?;
    assert_eq!(judgement, Judgement::Second);
    assert_eq!(judgement.to_label(), 1);

    let r = client.judge("Which is better?", &videos);
    assert!(matches!(r, Err(JudgeError::MalformedResponse(_))));

    let requests = handle.join().unwrap();
    assert!(requests[1]
        .0
        .starts_with("POST /v1beta/models/gemini-1.5-pro:generateContent"));
    assert!(requests[1].1.contains("\"threshold\":\"BLOCK_NONE\""));
    assert!(requests[1].1.contains("https://example.invalid/files/seg0"));
    Ok(())
}

#[test]
fn test_retry_exhausted() -> Result<()> {
    init();
    let (base_url, handle) = serve(|_| {
        (0..3)
            .map(|_| MockResponse::json(500, serde_json::json!({})))
            .collect()
    });
    let r = client(&base_url)?.judge("Which is better?", &[]);
    assert!(matches!(
        r,
        Err(JudgeError::RetryExhausted { attempts: 3, .. })
    ));
    assert_eq!(handle.join().unwrap().len(), 3);
    Ok(())
}

#[test]
fn test_get_video_files() -> Result<()> {
    init();
    let (base_url, handle) = serve(|_| vec![MockResponse::json(200, file("ACTIVE"))]);
    let client = client(&base_url)?;
    let segment = Record::from_slice(&[(
        "gemini_video_path_pixels",
        RecordValue::String("files/seg0".to_string()),
    )]);

    let files = client.get_video_files(&segment, &["pixels".to_string()])?;
    assert_eq!(files[0].name, "files/seg0");
    handle.join().unwrap();

    let r = client.get_video_files(&segment, &["wrist".to_string()]);
    assert!(matches!(r, Err(JudgeError::MissingVideo(v)) if v == "wrist"));
    Ok(())
}

#[test]
fn test_missing_api_key() {
    let config = GeminiConfig::default().api_key_env("ROBOBASE_GEMINI_TEST_UNSET_KEY");
    assert!(matches!(
        GeminiClient::new(config),
        Err(JudgeError::MissingApiKey(_))
    ));
}
