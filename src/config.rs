use anyhow::{Context, Result};
use std::path::PathBuf;

/// Process configuration, read once at startup from the environment and
/// injected explicitly into every component that needs it. There is no
/// lazily-initialized global service client anywhere in the core.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub api_host: String,
    pub api_port: u16,
    /// Externally reachable base URL, used to build webhook callback URLs
    /// handed to upstream engines.
    pub public_base_url: String,
    pub data_dir: PathBuf,
    /// Shared secret for the admin surface (user/plan/key management).
    pub admin_token: String,

    /// Bearer-authenticated engine family (music, image, video, tts,
    /// extraction in the current vendor lineup).
    pub studio_api_key: String,
    /// Header-key-authenticated engine family (stems, face-synthesis).
    pub lab_api_key: String,
    /// Upload service used to re-host finished assets into the library.
    pub upload_api_url: String,
    pub upload_api_key: String,

    pub music_engine_url: String,
    pub image_engine_url: String,
    pub video_engine_url: String,
    pub tts_engine_url: String,
    pub stem_engine_url: String,
    pub face_engine_url: String,
    pub extract_engine_url: String,
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let api_port: u16 = env_or("PRISMGEN_API_PORT", "8750")
            .parse()
            .context("PRISMGEN_API_PORT must be a port number")?;
        let api_host = env_or("PRISMGEN_API_HOST", "127.0.0.1");

        Ok(Self {
            public_base_url: env_or(
                "PRISMGEN_PUBLIC_BASE_URL",
                &format!("http://{}:{}", api_host, api_port),
            ),
            api_host,
            api_port,
            data_dir: PathBuf::from(env_or("PRISMGEN_DATA_DIR", "./data")),
            admin_token: std::env::var("PRISMGEN_ADMIN_TOKEN")
                .context("PRISMGEN_ADMIN_TOKEN is missing")?,
            studio_api_key: std::env::var("STUDIO_ENGINE_API_KEY")
                .context("STUDIO_ENGINE_API_KEY is missing")?,
            lab_api_key: env_or("LAB_ENGINE_API_KEY", ""),
            upload_api_url: env_or("UPLOAD_API_URL", ""),
            upload_api_key: env_or("UPLOAD_API_KEY", ""),
            music_engine_url: env_or("MUSIC_ENGINE_URL", ""),
            image_engine_url: env_or("IMAGE_ENGINE_URL", ""),
            video_engine_url: env_or("VIDEO_ENGINE_URL", ""),
            tts_engine_url: env_or("TTS_ENGINE_URL", ""),
            stem_engine_url: env_or("STEM_ENGINE_URL", ""),
            face_engine_url: env_or("FACE_ENGINE_URL", ""),
            extract_engine_url: env_or("EXTRACT_ENGINE_URL", ""),
        })
    }
}
