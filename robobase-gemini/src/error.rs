//! Errors in the library.
use thiserror::Error;

/// Errors of requests to the judge.
#[derive(Error, Debug)]
pub enum JudgeError {
    /// The request could not be sent or its response could not be read.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with an error status.
    #[error("Server returned status {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Body of the response.
        body: String,
    },

    /// The uploaded video could not be processed by the server.
    #[error("Processing of {0} failed")]
    ProcessingFailed(String),

    /// A transient error persisted over all attempts.
    #[error("{what} failed after {attempts} attempts: {last}")]
    RetryExhausted {
        /// Description of the operation.
        what: String,
        /// The number of attempts.
        attempts: usize,
        /// The last error.
        last: Box<JudgeError>,
    },

    /// The answer of the judge does not follow the expected format.
    #[error("Malformed response: {0:?}")]
    MalformedResponse(String),

    /// The environment variable holding the API key is not set.
    #[error("API key is not set in environment variable {0}")]
    MissingApiKey(String),

    /// The upload session was not opened.
    #[error("Upload URL is missing in the response")]
    MissingUploadUrl,

    /// A segment has no video for a view.
    #[error("No video for view {0}")]
    MissingVideo(String),

    /// Reading a video file failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl JudgeError {
    /// Returns `true` if retrying the request may succeed.
    ///
    /// Network errors, rate limiting (`429`) and server errors (`5xx`) are transient.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(e) => !e.is_builder() && !e.is_decode(),
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            Self::MissingUploadUrl => true,
            _ => false,
        }
    }
}
