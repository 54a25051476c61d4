/// Billing plan attached to a user. Ceilings are resolved per kind in the
/// quota ledger; the store only persists the label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Plan {
    #[serde(rename = "FREE")]
    Free,
    #[serde(rename = "PRO")]
    Pro,
}

impl Plan {
    pub fn as_str(self) -> &'static str {
        match self {
            Plan::Free => "FREE",
            Plan::Pro => "PRO",
        }
    }

    pub fn from_label(value: &str) -> Self {
        match value {
            "PRO" => Plan::Pro,
            _ => Plan::Free,
        }
    }
}

/// Outcome of a job-state transition attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOutcome {
    Applied,
    /// No record under that id. Callers racing on terminal delivery treat
    /// this as already-resolved, not as an error.
    NotFound,
    /// The requested transition would move the state machine backwards.
    Conflict,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct ApiKeyRecord {
    pub id: String,
    pub owner_id: String,
    pub name: String,
    pub active: bool,
    pub usage_count: i64,
    pub created_at: String,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct LibraryTrackRecord {
    pub id: String,
    pub title: String,
    pub style: String,
    #[serde(rename = "audioUrl")]
    pub audio_url: Option<String>,
    #[serde(rename = "imageUrl")]
    pub image_url: Option<String>,
    pub duration: f64,
    pub model: String,
    pub created_at: String,
}

/// A persisted image or video asset.
#[derive(Debug, Clone, serde::Serialize)]
pub struct LibraryMediaRecord {
    pub id: String,
    pub url: String,
    pub prompt: String,
    pub created_at: String,
}
