use std::time::{SystemTime, UNIX_EPOCH};

/// The generation capability a job was submitted against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobKind {
    Music,
    Image,
    Video,
    Tts,
    StemSplit,
    FaceSynthesis,
    Extraction,
}

impl JobKind {
    pub const ALL: [JobKind; 7] = [
        JobKind::Music,
        JobKind::Image,
        JobKind::Video,
        JobKind::Tts,
        JobKind::StemSplit,
        JobKind::FaceSynthesis,
        JobKind::Extraction,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            JobKind::Music => "music",
            JobKind::Image => "image",
            JobKind::Video => "video",
            JobKind::Tts => "tts",
            JobKind::StemSplit => "stem-split",
            JobKind::FaceSynthesis => "face-synthesis",
            JobKind::Extraction => "extraction",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "music" => Some(JobKind::Music),
            "image" => Some(JobKind::Image),
            "video" => Some(JobKind::Video),
            "tts" => Some(JobKind::Tts),
            "stem-split" => Some(JobKind::StemSplit),
            "face-synthesis" => Some(JobKind::FaceSynthesis),
            "extraction" => Some(JobKind::Extraction),
            _ => None,
        }
    }

    /// Prefix used when minting internal task ids, so operators can tell
    /// job families apart in logs without a lookup.
    fn id_prefix(self) -> &'static str {
        match self {
            JobKind::Music => "tr",
            JobKind::Image => "img",
            JobKind::Video => "v",
            JobKind::Tts => "say",
            JobKind::StemSplit => "st",
            JobKind::FaceSynthesis => "fs",
            JobKind::Extraction => "ex",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Pending,
    Processing,
    Done,
    Error,
}

impl JobState {
    pub fn as_str(self) -> &'static str {
        match self {
            JobState::Pending => "pending",
            JobState::Processing => "processing",
            JobState::Done => "done",
            JobState::Error => "error",
        }
    }

    pub fn from_status(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(JobState::Pending),
            "processing" => Some(JobState::Processing),
            "done" => Some(JobState::Done),
            "error" => Some(JobState::Error),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Done | JobState::Error)
    }
}

/// Forward-only job lifecycle. Terminal states admit no exit, not even to
/// themselves: a replayed terminal write is a conflict, so a delivered
/// result can never be overwritten. A job that must run again gets a
/// brand-new internal id.
pub fn can_transition(from: JobState, to: JobState) -> bool {
    match from {
        JobState::Pending => matches!(
            to,
            JobState::Processing | JobState::Done | JobState::Error
        ),
        JobState::Processing => matches!(to, JobState::Done | JobState::Error),
        JobState::Done | JobState::Error => false,
    }
}

/// One audio track in a normalized music result.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TrackDescriptor {
    pub id: String,
    pub title: String,
    pub style: String,
    #[serde(rename = "audioUrl")]
    pub audio_url: String,
    #[serde(rename = "imageUrl")]
    pub image_url: String,
    pub duration: f64,
    pub model: String,
}

/// Result payload of a finished job, normalized away from whatever shape
/// the upstream engine used.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(untagged)]
pub enum NormalizedResult {
    Tracks(Vec<TrackDescriptor>),
    Urls(Vec<String>),
    Url(String),
}

/// Normalized submission parameters shared across all kinds. Kind-specific
/// adapters pick the fields they understand.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct SubmissionRequest {
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default, rename = "customMode")]
    pub custom_mode: bool,
    #[serde(default)]
    pub instrumental: bool,
    #[serde(default)]
    pub style: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub ratio: Option<String>,
    #[serde(default, rename = "sourceUrl")]
    pub source_url: Option<String>,
    #[serde(default)]
    pub voice: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone)]
pub struct JobRecord {
    pub internal_id: String,
    pub owner_id: String,
    pub kind: JobKind,
    pub state: JobState,
    /// Vendor polling reference. Never serialized into client responses.
    pub upstream_handle: Option<String>,
    /// Vendor's own task id for webhook correlation. Never serialized.
    pub vendor_task_id: Option<String>,
    pub params: serde_json::Value,
    pub result: Option<NormalizedResult>,
    pub progress: Option<String>,
    pub created_at: String,
    pub resolved_at: Option<String>,
}

/// Mint an opaque internal task id. The upstream's identifier is never
/// reused as the client-facing handle.
pub fn mint_task_id(kind: JobKind) -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    format!("{}_{}_{}", kind.id_prefix(), millis, random_suffix(5))
}

pub fn random_suffix(len: usize) -> String {
    const ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    (0..len)
        .map(|_| {
            let idx = rand::random::<usize>() % ALPHABET.len();
            ALPHABET[idx] as char
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_STATES: [JobState; 4] = [
        JobState::Pending,
        JobState::Processing,
        JobState::Done,
        JobState::Error,
    ];

    #[test]
    fn transitions_only_move_forward() {
        for from in ALL_STATES {
            for to in ALL_STATES {
                let allowed = can_transition(from, to);
                let expected = match (from, to) {
                    (JobState::Pending, JobState::Pending) => false,
                    (JobState::Pending, _) => true,
                    (JobState::Processing, JobState::Done | JobState::Error) => true,
                    _ => false,
                };
                assert_eq!(
                    allowed, expected,
                    "transition {:?} -> {:?} mismatched",
                    from, to
                );
            }
        }
    }

    #[test]
    fn terminal_states_admit_no_exit() {
        for terminal in [JobState::Done, JobState::Error] {
            for to in ALL_STATES {
                assert!(!can_transition(terminal, to));
            }
        }
    }

    #[test]
    fn pending_may_skip_processing() {
        assert!(can_transition(JobState::Pending, JobState::Done));
        assert!(can_transition(JobState::Pending, JobState::Error));
    }

    #[test]
    fn minted_ids_carry_kind_prefix_and_are_unique() {
        let a = mint_task_id(JobKind::Music);
        let b = mint_task_id(JobKind::Music);
        assert!(a.starts_with("tr_"));
        assert!(mint_task_id(JobKind::Video).starts_with("v_"));
        assert!(mint_task_id(JobKind::Image).starts_with("img_"));
        assert_ne!(a, b);
    }

    #[test]
    fn kind_round_trips_through_strings() {
        for kind in JobKind::ALL {
            assert_eq!(JobKind::from_str(kind.as_str()), Some(kind));
        }
        assert_eq!(JobKind::from_str("hologram"), None);
    }

    #[test]
    fn normalized_result_serializes_untagged() {
        let url = NormalizedResult::Url("https://cdn.example/out.mp4".into());
        assert_eq!(
            serde_json::to_value(&url).unwrap(),
            serde_json::json!("https://cdn.example/out.mp4")
        );

        let urls = NormalizedResult::Urls(vec!["a".into(), "b".into()]);
        assert_eq!(
            serde_json::to_value(&urls).unwrap(),
            serde_json::json!(["a", "b"])
        );
    }
}
