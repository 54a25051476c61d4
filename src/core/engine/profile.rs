use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tracing::warn;

use super::{EngineAdapter, SubmitOutcome, normalize};
use crate::config::AppConfig;
use crate::core::error::RelayError;
use crate::core::jobs::{JobKind, SubmissionRequest};

/// How the vendor expects credentials.
#[derive(Debug, Clone)]
pub enum AuthStyle {
    Bearer(String),
    HeaderKey(String),
}

/// How the vendor expects the request body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireShape {
    JsonPost,
    QueryGet,
}

/// Text-field ceilings enforced before the request leaves this process.
/// High-end model tiers accept longer prompts than standard ones; simple
/// (non-custom) mode is capped hardest.
#[derive(Debug, Clone, Copy)]
pub struct PromptLimits {
    pub simple: usize,
    pub standard: usize,
    pub high_end: usize,
}

/// Everything kind-specific about one engine, so a single HTTP adapter
/// covers the whole vendor lineup.
#[derive(Debug, Clone)]
pub struct EngineProfile {
    pub kind: JobKind,
    pub base_url: String,
    pub auth: AuthStyle,
    pub wire: WireShape,
    pub timeout: Duration,
    pub limits: PromptLimits,
    /// Whether this vendor accepts a push-callback URL at submission.
    pub supports_callback: bool,
    pub public_base_url: String,
}

const HIGH_END_MODELS: [&str; 3] = ["V5", "V4.5", "V4.5PLUS"];

impl EngineProfile {
    pub fn lineup(config: &AppConfig) -> Vec<EngineProfile> {
        let mut profiles = Vec::new();
        let specs: [(JobKind, &str, AuthStyle, WireShape, u64, PromptLimits, bool); 7] = [
            (
                JobKind::Music,
                config.music_engine_url.as_str(),
                AuthStyle::Bearer(config.studio_api_key.clone()),
                WireShape::JsonPost,
                30,
                PromptLimits { simple: 400, standard: 3000, high_end: 5000 },
                true,
            ),
            (
                JobKind::Image,
                config.image_engine_url.as_str(),
                AuthStyle::Bearer(config.studio_api_key.clone()),
                WireShape::QueryGet,
                30,
                PromptLimits { simple: 2000, standard: 2000, high_end: 2000 },
                false,
            ),
            (
                JobKind::Video,
                config.video_engine_url.as_str(),
                AuthStyle::Bearer(config.studio_api_key.clone()),
                WireShape::QueryGet,
                60,
                PromptLimits { simple: 2000, standard: 2000, high_end: 2000 },
                false,
            ),
            (
                JobKind::Tts,
                config.tts_engine_url.as_str(),
                AuthStyle::Bearer(config.studio_api_key.clone()),
                WireShape::QueryGet,
                20,
                PromptLimits { simple: 4000, standard: 4000, high_end: 4000 },
                false,
            ),
            (
                JobKind::StemSplit,
                config.stem_engine_url.as_str(),
                AuthStyle::HeaderKey(config.lab_api_key.clone()),
                WireShape::JsonPost,
                60,
                PromptLimits { simple: 0, standard: 0, high_end: 0 },
                false,
            ),
            (
                JobKind::FaceSynthesis,
                config.face_engine_url.as_str(),
                AuthStyle::HeaderKey(config.lab_api_key.clone()),
                WireShape::JsonPost,
                30,
                PromptLimits { simple: 1000, standard: 1000, high_end: 1000 },
                false,
            ),
            (
                JobKind::Extraction,
                config.extract_engine_url.as_str(),
                AuthStyle::Bearer(config.studio_api_key.clone()),
                WireShape::QueryGet,
                30,
                PromptLimits { simple: 0, standard: 0, high_end: 0 },
                false,
            ),
        ];

        for (kind, url, auth, wire, secs, limits, callback) in specs {
            if url.is_empty() {
                continue;
            }
            profiles.push(EngineProfile {
                kind,
                base_url: url.to_string(),
                auth,
                wire,
                timeout: Duration::from_secs(secs),
                limits,
                supports_callback: callback,
                public_base_url: config.public_base_url.clone(),
            });
        }
        profiles
    }

    fn callback_url(&self, owner_id: &str) -> String {
        format!(
            "{}/api/webhook/{}?uid={}",
            self.public_base_url,
            self.kind.as_str(),
            urlencoding::encode(owner_id)
        )
    }
}

fn truncate(text: &str, limit: usize) -> String {
    text.trim().chars().take(limit).collect()
}

/// Shape the music submission the way the vendor wants it, enforcing the
/// tier-dependent text ceilings before the bytes leave the building.
fn music_payload(profile: &EngineProfile, owner_id: &str, req: &SubmissionRequest) -> Value {
    let model = req.model.as_deref().unwrap_or("V5").to_uppercase();
    let high_end = HIGH_END_MODELS.contains(&model.as_str());

    let mut payload = serde_json::json!({
        "model": model,
        "customMode": req.custom_mode,
        "instrumental": req.instrumental,
    });

    if req.custom_mode {
        let prompt_limit = if high_end {
            profile.limits.high_end
        } else {
            profile.limits.standard
        };
        let style_limit = if high_end { 1000 } else { 200 };
        payload["prompt"] = truncate(req.prompt.as_deref().unwrap_or(""), prompt_limit).into();
        payload["style"] =
            truncate(req.style.as_deref().unwrap_or("Studio Quality"), style_limit).into();
        payload["title"] = truncate(req.title.as_deref().unwrap_or("New Creation"), 80).into();
    } else {
        payload["prompt"] =
            truncate(req.prompt.as_deref().unwrap_or(""), profile.limits.simple).into();
    }

    if profile.supports_callback {
        payload["callBackUrl"] = profile.callback_url(owner_id).into();
    }
    payload
}

fn json_payload(profile: &EngineProfile, owner_id: &str, req: &SubmissionRequest) -> Value {
    match profile.kind {
        JobKind::Music => music_payload(profile, owner_id, req),
        JobKind::StemSplit => serde_json::json!({
            "audioUrl": req.source_url.as_deref().unwrap_or(""),
        }),
        JobKind::FaceSynthesis => serde_json::json!({
            "imageUrl": req.source_url.as_deref().unwrap_or(""),
            "prompt": truncate(req.prompt.as_deref().unwrap_or(""), profile.limits.standard),
        }),
        _ => serde_json::json!({
            "prompt": truncate(req.prompt.as_deref().unwrap_or(""), profile.limits.standard),
        }),
    }
}

fn query_pairs(profile: &EngineProfile, req: &SubmissionRequest) -> Vec<(&'static str, String)> {
    match profile.kind {
        JobKind::Image => vec![
            (
                "prompt",
                truncate(req.prompt.as_deref().unwrap_or(""), profile.limits.standard),
            ),
            ("model", req.model.clone().unwrap_or_else(|| "nano-banana-pro".into())),
            ("ratio", req.ratio.clone().unwrap_or_else(|| "1:1".into())),
        ],
        JobKind::Video => {
            let mut pairs = vec![
                (
                    "prompt",
                    truncate(req.prompt.as_deref().unwrap_or(""), profile.limits.standard),
                ),
                ("ratio", req.ratio.clone().unwrap_or_else(|| "9:16".into())),
                ("model", req.model.clone().unwrap_or_else(|| "veo-3.1-fast".into())),
            ];
            match req.source_url.as_deref() {
                Some(image_url) if !image_url.is_empty() => {
                    pairs.push(("type", "image-to-video".into()));
                    pairs.push(("imageUrl", image_url.to_string()));
                }
                _ => pairs.push(("type", "text-to-video".into())),
            }
            pairs
        }
        JobKind::Tts => {
            let mut pairs = vec![(
                "text",
                truncate(req.text.as_deref().unwrap_or(""), profile.limits.standard),
            )];
            if let Some(voice) = &req.voice {
                pairs.push(("voice", voice.clone()));
            }
            pairs
        }
        JobKind::Extraction => vec![("url", req.source_url.clone().unwrap_or_default())],
        _ => Vec::new(),
    }
}

fn validate(kind: JobKind, req: &SubmissionRequest) -> Result<(), RelayError> {
    let missing = |field: &str| RelayError::InvalidInput(format!("{} is required", field));
    match kind {
        JobKind::Music | JobKind::Image | JobKind::Video => {
            if req.prompt.as_deref().unwrap_or("").trim().is_empty() {
                return Err(missing("prompt"));
            }
        }
        JobKind::Tts => {
            if req.text.as_deref().unwrap_or("").trim().is_empty() {
                return Err(missing("text"));
            }
        }
        JobKind::StemSplit | JobKind::FaceSynthesis | JobKind::Extraction => {
            if req.source_url.as_deref().unwrap_or("").trim().is_empty() {
                return Err(missing("sourceUrl"));
            }
        }
    }
    Ok(())
}

fn vendor_task_id(body: &Value) -> Option<String> {
    for key in ["task_id", "taskId"] {
        if let Some(id) = body.get(key).and_then(Value::as_str) {
            return Some(id.to_string());
        }
        if let Some(id) = body.get("data").and_then(|d| d.get(key)).and_then(Value::as_str) {
            return Some(id.to_string());
        }
    }
    None
}

/// Decide what the submission response means: a finished result, a handle
/// to poll, or a rejection.
fn interpret_submit_body(kind: JobKind, body: &Value) -> Result<SubmitOutcome, RelayError> {
    let explicit_reject = body.get("ok").and_then(Value::as_bool) == Some(false)
        || body.get("success").and_then(Value::as_bool) == Some(false);
    if explicit_reject {
        let msg = body
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("engine rejected request");
        return Err(RelayError::UpstreamRejected(msg.to_string()));
    }

    // Music engines may return the finished tracks inline.
    if kind == JobKind::Music {
        let immediate = body
            .get("data")
            .and_then(Value::as_array)
            .map(|a| !a.is_empty())
            .unwrap_or(false);
        if immediate {
            if let Some(result) = normalize::normalize_result(kind, body) {
                return Ok(SubmitOutcome::Immediate(result));
            }
        }
        let handle = body
            .get("task_url")
            .or_else(|| body.get("url"))
            .and_then(Value::as_str);
        if let Some(handle) = handle {
            return Ok(SubmitOutcome::Pending {
                upstream_handle: handle.to_string(),
                vendor_task_id: vendor_task_id(body),
            });
        }
        return Err(RelayError::UpstreamRejected(
            "no task handle in engine response".into(),
        ));
    }

    // Other kinds: an explicit task handle beats inline results.
    if let Some(handle) = body.get("task_url").and_then(Value::as_str) {
        return Ok(SubmitOutcome::Pending {
            upstream_handle: handle.to_string(),
            vendor_task_id: vendor_task_id(body),
        });
    }
    if let Some(result) = normalize::normalize_result(kind, body) {
        return Ok(SubmitOutcome::Immediate(result));
    }
    if let Some(handle) = body.get("url").and_then(Value::as_str) {
        return Ok(SubmitOutcome::Pending {
            upstream_handle: handle.to_string(),
            vendor_task_id: vendor_task_id(body),
        });
    }
    Err(RelayError::UpstreamRejected(
        "no task handle or result in engine response".into(),
    ))
}

pub struct HttpEngineAdapter {
    profile: EngineProfile,
    client: reqwest::Client,
}

impl HttpEngineAdapter {
    pub fn new(profile: EngineProfile, client: reqwest::Client) -> Self {
        Self { profile, client }
    }

    fn apply_auth(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.profile.auth {
            AuthStyle::Bearer(key) => req.header("Authorization", format!("Bearer {}", key)),
            AuthStyle::HeaderKey(key) => req.header("x-api-key", key),
        }
    }
}

#[async_trait]
impl EngineAdapter for HttpEngineAdapter {
    fn kind(&self) -> JobKind {
        self.profile.kind
    }

    async fn submit(
        &self,
        owner_id: &str,
        request: &SubmissionRequest,
    ) -> Result<SubmitOutcome, RelayError> {
        validate(self.profile.kind, request)?;

        let builder = match self.profile.wire {
            WireShape::JsonPost => self
                .client
                .post(&self.profile.base_url)
                .json(&json_payload(&self.profile, owner_id, request)),
            WireShape::QueryGet => self
                .client
                .get(&self.profile.base_url)
                .query(&query_pairs(&self.profile, request)),
        };

        let response = self
            .apply_auth(builder)
            .timeout(self.profile.timeout)
            .send()
            .await
            .map_err(|e| {
                warn!("engine call failed for {}: {}", self.profile.kind.as_str(), e);
                RelayError::UpstreamUnavailable
            })?;

        if response.status().is_client_error() || response.status().is_server_error() {
            warn!(
                "engine returned {} for {}",
                response.status(),
                self.profile.kind.as_str()
            );
            return Err(RelayError::UpstreamUnavailable);
        }

        let body: Value = response
            .json()
            .await
            .map_err(|_| RelayError::UpstreamUnavailable)?;
        interpret_submit_body(self.profile.kind, &body)
    }
}
