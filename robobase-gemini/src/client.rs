use crate::{parse_judgement, retry_with_backoff, GeminiConfig, JudgeError, Judgement};
use log::{debug, info};
use reqwest::blocking::{Client, Response};
use robobase_core::record::Record;
use serde::{Deserialize, Serialize};
use std::{path::Path, thread::sleep, time::Duration};

const HARM_CATEGORIES: [&str; 4] = [
    "HARM_CATEGORY_HARASSMENT",
    "HARM_CATEGORY_HATE_SPEECH",
    "HARM_CATEGORY_SEXUALLY_EXPLICIT",
    "HARM_CATEGORY_DANGEROUS_CONTENT",
];

/// Key prefix of video file names in a segment record, followed by the view.
const VIDEO_PATH_KEY_PREFIX: &str = "gemini_video_path_";

/// Processing state of an uploaded file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FileState {
    /// Not reported.
    #[default]
    StateUnspecified,

    /// Being processed.
    Processing,

    /// Ready to be used in prompts.
    Active,

    /// Processing failed.
    Failed,
}

/// A file uploaded to the server.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoFile {
    /// Resource name, like `files/abc-123`.
    pub name: String,

    /// Name given at upload.
    #[serde(default)]
    pub display_name: String,

    /// MIME type.
    #[serde(default)]
    pub mime_type: String,

    /// URI referenced in prompts.
    #[serde(default)]
    pub uri: String,

    /// Processing state.
    #[serde(default)]
    pub state: FileState,
}

#[derive(Debug, Deserialize)]
/// Internally used.
struct FileResponse {
    file: VideoFile,
}

#[derive(Debug, Serialize)]
struct UploadMetadata<'a> {
    file: UploadFileMetadata<'a>,
}

#[derive(Debug, Serialize)]
struct UploadFileMetadata<'a> {
    display_name: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
    safety_settings: Vec<SafetySetting>,
}

#[derive(Debug, Serialize)]
struct Content {
    role: String,
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Part {
    Text {
        text: String,
    },
    #[serde(rename_all = "camelCase")]
    FileData {
        file_data: FileData,
    },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FileData {
    mime_type: String,
    file_uri: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    top_p: f32,
    top_k: u32,
    max_output_tokens: u32,
}

#[derive(Debug, Serialize)]
struct SafetySetting {
    category: String,
    threshold: String,
}

#[derive(Debug, Deserialize)]
/// Internally used.
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<TextPart>,
}

#[derive(Debug, Deserialize)]
struct TextPart {
    text: Option<String>,
}

impl GenerateContentResponse {
    /// Text of the first candidate.
    fn text(&self) -> Option<String> {
        let parts = &self.candidates.first()?.content.as_ref()?.parts;
        let text: String = parts.iter().filter_map(|p| p.text.as_deref()).collect();
        match text.is_empty() {
            true => None,
            false => Some(text),
        }
    }
}

fn mime_type(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some("mp4") => "video/mp4",
        Some("webm") => "video/webm",
        Some("mov") => "video/quicktime",
        Some("avi") => "video/x-msvideo",
        Some("gif") => "image/gif",
        _ => "application/octet-stream",
    }
}

fn check_status(resp: Response) -> Result<Response, JudgeError> {
    let status = resp.status();
    match status.is_success() {
        true => Ok(resp),
        false => Err(JudgeError::Status {
            status: status.as_u16(),
            body: resp.text().unwrap_or_default(),
        }),
    }
}

/// Asks Gemini which of two robot videos is preferred, via the REST API.
///
/// Videos are uploaded with [`upload_video`](Self::upload_video), which waits until
/// the server has processed them, and compared with [`judge`](Self::judge).
/// Requests failing with transient errors are retried with the backoff of
/// [`GeminiConfig::retry`].
pub struct GeminiClient {
    client: Client,
    config: GeminiConfig,
    api_key: String,
}

impl GeminiClient {
    /// Constructs a client with the API key in the environment variable
    /// `config.api_key_env`.
    pub fn new(config: GeminiConfig) -> Result<Self, JudgeError> {
        let api_key = std::env::var(&config.api_key_env)
            .map_err(|_| JudgeError::MissingApiKey(config.api_key_env.clone()))?;
        Self::with_api_key(config, api_key)
    }

    /// Constructs a client with the given API key.
    pub fn with_api_key(config: GeminiConfig, api_key: impl Into<String>) -> Result<Self, JudgeError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            config,
            api_key: api_key.into(),
        })
    }

    /// Configuration of the client.
    pub fn config(&self) -> &GeminiConfig {
        &self.config
    }

    fn url(&self, api: impl AsRef<str>) -> String {
        format!(
            "{}/{}/{}",
            self.config.base_url,
            self.config.api_version,
            api.as_ref()
        )
    }

    fn generation_config(&self) -> GenerationConfig {
        GenerationConfig {
            temperature: self.config.temperature,
            top_p: self.config.top_p,
            top_k: self.config.top_k,
            max_output_tokens: self.config.max_output_tokens,
        }
    }

    fn safety_settings() -> Vec<SafetySetting> {
        HARM_CATEGORIES
            .iter()
            .map(|c| SafetySetting {
                category: c.to_string(),
                threshold: "BLOCK_NONE".to_string(),
            })
            .collect()
    }

    /// Uploads a video in a resumable upload session, without waiting for processing.
    fn upload_once(&self, path: &Path, bytes: &[u8]) -> Result<VideoFile, JudgeError> {
        let display_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();
        let mime_type = mime_type(path);

        let start = self
            .client
            .post(format!(
                "{}/upload/{}/files",
                self.config.base_url, self.config.api_version
            ))
            .query(&[("key", &self.api_key)])
            .header("X-Goog-Upload-Protocol", "resumable")
            .header("X-Goog-Upload-Command", "start")
            .header("X-Goog-Upload-Header-Content-Length", bytes.len().to_string())
            .header("X-Goog-Upload-Header-Content-Type", mime_type)
            .json(&UploadMetadata {
                file: UploadFileMetadata { display_name },
            })
            .send()?;
        let start = check_status(start)?;
        let upload_url = start
            .headers()
            .get("x-goog-upload-url")
            .and_then(|v| v.to_str().ok())
            .ok_or(JudgeError::MissingUploadUrl)?
            .to_string();

        let resp = self
            .client
            .post(upload_url)
            .header("X-Goog-Upload-Offset", "0")
            .header("X-Goog-Upload-Command", "upload, finalize")
            .body(bytes.to_vec())
            .send()?;
        let file: FileResponse = check_status(resp)?.json()?;
        debug!("Uploaded {:?} as {}", path, file.file.name);
        Ok(file.file)
    }

    /// Uploads a video and waits until the server has processed it.
    ///
    /// Fails with [`JudgeError::ProcessingFailed`] if the server reports `FAILED`.
    pub fn upload_video(&self, path: impl AsRef<Path>) -> Result<VideoFile, JudgeError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)?;
        let file = retry_with_backoff(&self.config.retry, "Video upload", || {
            self.upload_once(path, &bytes)
        })?;
        self.wait_for_processing(file)
    }

    /// Gets the metadata of an uploaded file by its resource name.
    pub fn get_file(&self, name: &str) -> Result<VideoFile, JudgeError> {
        let resp = self
            .client
            .get(self.url(name))
            .query(&[("key", &self.api_key)])
            .send()?;
        Ok(check_status(resp)?.json()?)
    }

    /// Polls the state of `file` until it leaves `PROCESSING`.
    pub fn wait_for_processing(&self, mut file: VideoFile) -> Result<VideoFile, JudgeError> {
        let interval = Duration::from_millis(self.config.poll_interval_ms);
        while file.state == FileState::Processing {
            info!("Waiting for video to be processed.");
            sleep(interval);
            file = retry_with_backoff(&self.config.retry, "Getting file state", || {
                self.get_file(&file.name)
            })?;
        }
        if file.state == FileState::Failed {
            return Err(JudgeError::ProcessingFailed(file.name));
        }
        info!("Video processing complete: {}", file.uri);
        Ok(file)
    }

    /// Asks the model with the prompt followed by the videos and returns its answer.
    pub fn generate_judgement(
        &self,
        prompt: &str,
        videos: &[VideoFile],
    ) -> Result<String, JudgeError> {
        let mut parts = vec![Part::Text {
            text: prompt.to_string(),
        }];
        parts.extend(videos.iter().map(|v| Part::FileData {
            file_data: FileData {
                mime_type: v.mime_type.clone(),
                file_uri: v.uri.clone(),
            },
        }));
        let request = GenerateContentRequest {
            contents: vec![Content {
                role: "user".to_string(),
                parts,
            }],
            generation_config: self.generation_config(),
            safety_settings: Self::safety_settings(),
        };

        let resp = self
            .client
            .post(self.url(format!("models/{}:generateContent", self.config.model_type)))
            .query(&[("key", &self.api_key)])
            .json(&request)
            .send()?;
        let resp: GenerateContentResponse = check_status(resp)?.json()?;
        resp.text()
            .ok_or_else(|| JudgeError::MalformedResponse(format!("{:?}", resp)))
    }

    /// Asks which of the videos is preferred, retrying transient failures.
    pub fn judge(&self, prompt: &str, videos: &[VideoFile]) -> Result<Judgement, JudgeError> {
        let text = retry_with_backoff(&self.config.retry, "Judgement", || {
            self.generate_judgement(prompt, videos)
        })?;
        let judgement = parse_judgement(&text)?;
        debug!("Judgement: {}", judgement);
        Ok(judgement)
    }

    /// Gets the uploaded videos of a segment, one per view.
    ///
    /// The resource name of the video of view `v` is stored in `segment` under
    /// `gemini_video_path_<v>`.
    pub fn get_video_files(
        &self,
        segment: &Record,
        target_viewpoints: &[String],
    ) -> Result<Vec<VideoFile>, JudgeError> {
        target_viewpoints
            .iter()
            .map(|view| {
                let key = format!("{}{}", VIDEO_PATH_KEY_PREFIX, view);
                let name = segment
                    .get_string(&key)
                    .map_err(|_| JudgeError::MissingVideo(view.clone()))?;
                retry_with_backoff(&self.config.retry, "Getting file", || self.get_file(&name))
            })
            .collect()
    }
}
