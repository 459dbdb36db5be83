use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub image: ImageConfig,
    #[serde(default)]
    pub vision: VisionConfig,
    #[serde(default)]
    pub captioner: CaptionerConfig,
    #[serde(default)]
    pub image_gen: ImageGenConfig,
    #[serde(default)]
    pub judge: JudgeConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub history: HistoryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub logs: LogsConfig,
    /// Upper bound on request bodies, uploads included.
    #[serde(default = "default_body_limit")]
    pub body_limit_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogsConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

/// Preprocessing applied to every uploaded image before it leaves the process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageConfig {
    #[serde(default = "default_max_dimension")]
    pub max_dimension: u32,
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
}

/// Primary describe backend: an OpenAI-compatible vision-language endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisionConfig {
    #[serde(default = "default_vision_base_url")]
    pub base_url: String,
    #[serde(default = "default_vision_api_key")]
    pub api_key: String,
    #[serde(default = "default_vision_model")]
    pub model: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_vision_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_vision_temperature")]
    pub temperature: f32,
}

/// Fallback captioner hosted by the local model runner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptionerConfig {
    #[serde(default = "default_runner_url")]
    pub runner_url: String,
    #[serde(default = "default_caption_model")]
    pub model: String,
    #[serde(default = "default_local_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_new_tokens")]
    pub max_new_tokens: u32,
}

/// Text-to-image model hosted by the local model runner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageGenConfig {
    #[serde(default = "default_runner_url")]
    pub runner_url: String,
    #[serde(default = "default_image_gen_model")]
    pub model: String,
    #[serde(default = "default_local_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_image_size")]
    pub width: u32,
    #[serde(default = "default_image_size")]
    pub height: u32,
    #[serde(default = "default_steps")]
    pub steps: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JudgeConfig {
    /// Judging is enabled only when this is set.
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_judge_model")]
    pub model: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_judge_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_judge_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

/// Remote conversational backend (generateContent-style API).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    #[serde(default = "default_chat_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_chat_model")]
    pub model: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    #[serde(default = "default_database_path")]
    pub database_path: String,
    /// Unset keeps every turn.
    #[serde(default)]
    pub max_turns: Option<usize>,
}

impl VisionConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl CaptionerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl ImageGenConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl JudgeConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

impl ChatConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            image: ImageConfig::default(),
            vision: VisionConfig::default(),
            captioner: CaptionerConfig::default(),
            image_gen: ImageGenConfig::default(),
            judge: JudgeConfig::default(),
            chat: ChatConfig::default(),
            history: HistoryConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            logs: LogsConfig::default(),
            body_limit_bytes: default_body_limit(),
        }
    }
}

impl Default for LogsConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            max_dimension: default_max_dimension(),
            jpeg_quality: default_jpeg_quality(),
        }
    }
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            base_url: default_vision_base_url(),
            api_key: default_vision_api_key(),
            model: default_vision_model(),
            timeout_secs: default_timeout_secs(),
            max_tokens: default_vision_max_tokens(),
            temperature: default_vision_temperature(),
        }
    }
}

impl Default for CaptionerConfig {
    fn default() -> Self {
        Self {
            runner_url: default_runner_url(),
            model: default_caption_model(),
            timeout_secs: default_local_timeout_secs(),
            max_new_tokens: default_max_new_tokens(),
        }
    }
}

impl Default for ImageGenConfig {
    fn default() -> Self {
        Self {
            runner_url: default_runner_url(),
            model: default_image_gen_model(),
            timeout_secs: default_local_timeout_secs(),
            width: default_image_size(),
            height: default_image_size(),
            steps: default_steps(),
        }
    }
}

impl Default for JudgeConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            api_key: None,
            model: default_judge_model(),
            timeout_secs: default_timeout_secs(),
            max_attempts: default_judge_attempts(),
            retry_delay_ms: default_judge_retry_delay_ms(),
        }
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            base_url: default_chat_base_url(),
            api_key: None,
            model: default_chat_model(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            max_turns: None,
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_body_limit() -> usize {
    20 * 1024 * 1024
}

fn default_max_dimension() -> u32 {
    1024
}

fn default_jpeg_quality() -> u8 {
    85
}

fn default_vision_base_url() -> String {
    "http://127.0.0.1:8000/v1".to_string()
}

fn default_vision_api_key() -> String {
    "EMPTY".to_string()
}

fn default_vision_model() -> String {
    "Qwen/Qwen2-VL-2B-Instruct".to_string()
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_vision_max_tokens() -> u32 {
    128
}

fn default_vision_temperature() -> f32 {
    0.2
}

fn default_runner_url() -> String {
    "http://127.0.0.1:7860".to_string()
}

fn default_caption_model() -> String {
    "Salesforce/blip-image-captioning-base".to_string()
}

fn default_local_timeout_secs() -> u64 {
    300
}

fn default_max_new_tokens() -> u32 {
    30
}

fn default_image_size() -> u32 {
    512
}

fn default_steps() -> u32 {
    25
}

fn default_image_gen_model() -> String {
    "stabilityai/stable-diffusion-2-1-base".to_string()
}

fn default_judge_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_judge_attempts() -> u32 {
    3
}

fn default_judge_retry_delay_ms() -> u64 {
    1000
}

fn default_chat_base_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}

fn default_chat_model() -> String {
    "gemini-1.5-flash".to_string()
}

fn default_database_path() -> String {
    "history.db".to_string()
}
