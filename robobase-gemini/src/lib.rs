//! Preference judgements of robot videos by [Gemini](https://ai.google.dev).
//!
//! [`GeminiClient`] uploads videos of trajectory segments, waits until the server
//! has processed them and asks the model which segment is preferred. Answers of
//! the form `<Answer>: Video <N>` are parsed into a [`Judgement`], whose
//! [`to_label`](Judgement::to_label) is the preference label used in reward
//! learning.
//!
//! The API key is read from the environment variable `GEMINI_API_KEY`.
//!
//! ```no_run
//! use anyhow::Result;
//! use robobase_gemini::{GeminiClient, GeminiConfig};
//!
//! fn main() -> Result<()> {
//!     env_logger::init();
//!
//!     let client = GeminiClient::new(GeminiConfig::default())?;
//!     let videos = vec![
//!         client.upload_video("segment0.mp4")?,
//!         client.upload_video("segment1.mp4")?,
//!     ];
//!     let prompt = "Which video shows the robot running forward? \
//!                   Answer with '<Answer>: Video 1' or '<Answer>: Video 2'.";
//!     let label = client.judge(prompt, &videos)?.to_label();
//!     println!("label = {}", label);
//!     Ok(())
//! }
//! ```
mod client;
mod config;
mod error;
mod judgement;
mod retry;
pub use client::{FileState, GeminiClient, VideoFile};
pub use config::{GeminiConfig, RetryConfig};
pub use error::JudgeError;
pub use judgement::{parse_judgement, Judgement, EQUALLY_PREFERRED};
pub use retry::retry_with_backoff;
