use serde_json::Value;

use crate::core::jobs::{JobKind, NormalizedResult, TrackDescriptor, random_suffix};

/// Status strings that mean the upstream finished successfully.
const DONE_STATUSES: [&str; 4] = ["done", "completed", "success", "finished"];

/// Status strings that mean the job is still running. An unrecognized
/// status outside this list combined with an explicit failure flag is what
/// counts as failed; an unknown-but-benign status alone does not.
const ACTIVE_STATUSES: [&str; 6] = [
    "processing",
    "pending",
    "started",
    "queued",
    "generating",
    "uploading",
];

/// Classification of a raw upstream payload.
#[derive(Debug, Clone, PartialEq)]
pub enum UpstreamStatus {
    Done,
    Failed(String),
    Active,
}

fn first_str<'a>(payload: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter().find_map(|k| payload.get(*k).and_then(Value::as_str))
}

fn status_str(payload: &Value) -> String {
    payload
        .get("status")
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_lowercase()
}

fn has_result_field(payload: &Value) -> bool {
    ["url", "image_url", "image_urls", "video_url", "data", "records"]
        .iter()
        .any(|k| payload.get(*k).map(|v| !v.is_null()).unwrap_or(false))
}

/// Decide whether an upstream payload is terminal. Success detection runs
/// before failure detection: some vendors set an ambiguous flag pair and
/// the presence of a concrete result wins.
pub fn classify_payload(payload: &Value) -> UpstreamStatus {
    let status = status_str(payload);
    let ok_flag = payload.get("ok").and_then(Value::as_bool);

    let done_status = DONE_STATUSES.contains(&status.as_str());
    let finished = (ok_flag == Some(true) && (done_status || has_result_field(payload)))
        || done_status;
    if finished {
        return UpstreamStatus::Done;
    }

    let failed = status == "error"
        || status == "failed"
        || (ok_flag == Some(false) && !ACTIVE_STATUSES.contains(&status.as_str()));
    if failed {
        let message = first_str(payload, &["message", "msg", "error"])
            .unwrap_or("Engine execution failed")
            .to_string();
        return UpstreamStatus::Failed(message);
    }

    UpstreamStatus::Active
}

/// Map vendor track records into the internal descriptor, accepting the
/// field-name aliases the vendor uses on different call paths.
pub fn normalize_tracks(records: &Value, fallback_model: &str) -> Vec<TrackDescriptor> {
    let list: Vec<&Value> = match records {
        Value::Array(items) => items.iter().collect(),
        Value::Object(_) => vec![records],
        _ => Vec::new(),
    };

    list.into_iter()
        .map(|r| {
            let id = first_str(r, &["id"])
                .map(str::to_string)
                .unwrap_or_else(|| format!("tr_{}", random_suffix(4)));
            TrackDescriptor {
                title: first_str(r, &["title"]).unwrap_or("Untitled Masterpiece").to_string(),
                style: first_str(r, &["tags", "style"]).unwrap_or("AI Music").to_string(),
                audio_url: first_str(r, &["audio_url", "url"]).unwrap_or("").to_string(),
                image_url: first_str(r, &["image_url", "cover"])
                    .map(str::to_string)
                    .unwrap_or_else(|| {
                        format!("https://api.dicebear.com/7.x/shapes/svg?seed={}", id)
                    }),
                duration: r.get("duration").and_then(Value::as_f64).unwrap_or(0.0),
                model: first_str(r, &["model_name", "model"])
                    .unwrap_or(fallback_model)
                    .to_string(),
                id,
            }
        })
        .collect()
}

/// Extract the normalized result from a terminal-success payload.
pub fn normalize_result(kind: JobKind, payload: &Value) -> Option<NormalizedResult> {
    match kind {
        JobKind::Music => {
            let records = payload
                .get("records")
                .filter(|v| !v.is_null())
                .or_else(|| payload.get("data"))?;
            let tracks = normalize_tracks(records, "V5");
            if tracks.is_empty() {
                None
            } else {
                Some(NormalizedResult::Tracks(tracks))
            }
        }
        JobKind::Image => {
            if let Some(urls) = payload.get("image_urls").and_then(Value::as_array) {
                let urls: Vec<String> = urls
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect();
                if !urls.is_empty() {
                    return Some(NormalizedResult::Urls(urls));
                }
            }
            first_str(payload, &["url", "image_url"])
                .map(|u| NormalizedResult::Urls(vec![u.to_string()]))
        }
        JobKind::StemSplit => {
            if let Some(urls) = payload.get("urls").and_then(Value::as_array) {
                let urls: Vec<String> = urls
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect();
                if !urls.is_empty() {
                    return Some(NormalizedResult::Urls(urls));
                }
            }
            first_str(payload, &["url", "result"]).map(|u| NormalizedResult::Url(u.to_string()))
        }
        JobKind::Video | JobKind::Tts | JobKind::FaceSynthesis | JobKind::Extraction => {
            first_str(payload, &["video_url", "url", "audio_url", "result"])
                .map(|u| NormalizedResult::Url(u.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn queued_status_without_result_is_active() {
        let payload = json!({ "status": "queued" });
        assert_eq!(classify_payload(&payload), UpstreamStatus::Active);
    }

    #[test]
    fn unknown_benign_status_is_not_a_failure() {
        // The active-status whitelist guards the ok:false branch only;
        // a bare unfamiliar status must stay non-terminal.
        let payload = json!({ "status": "warming_up" });
        assert_eq!(classify_payload(&payload), UpstreamStatus::Active);
    }

    #[test]
    fn explicit_failure_flag_with_unrecognized_status_fails() {
        let payload = json!({ "ok": false, "status": "mysterious", "message": "boom" });
        assert_eq!(
            classify_payload(&payload),
            UpstreamStatus::Failed("boom".to_string())
        );
    }

    #[test]
    fn failure_flag_with_active_status_stays_active() {
        let payload = json!({ "ok": false, "status": "uploading" });
        assert_eq!(classify_payload(&payload), UpstreamStatus::Active);
    }

    #[test]
    fn done_status_wins() {
        let payload = json!({ "status": "completed" });
        assert_eq!(classify_payload(&payload), UpstreamStatus::Done);
    }

    #[test]
    fn success_flag_with_result_field_is_done_even_without_status() {
        let payload = json!({ "ok": true, "url": "https://cdn.example/out.png" });
        assert_eq!(classify_payload(&payload), UpstreamStatus::Done);
    }

    #[test]
    fn ambiguous_flags_favor_concrete_result() {
        // Success detection must run before failure detection.
        let payload = json!({ "ok": true, "status": "done", "message": "deprecated endpoint" });
        assert_eq!(classify_payload(&payload), UpstreamStatus::Done);
    }

    #[test]
    fn track_normalization_accepts_field_aliases() {
        let records = json!([
            {
                "id": "a1",
                "title": "Neon Rain",
                "tags": "synthwave",
                "audio_url": "https://cdn.example/a1.mp3",
                "image_url": "https://cdn.example/a1.jpg",
                "duration": 184.2,
                "model_name": "V4.5"
            },
            {
                "url": "https://cdn.example/a2.mp3",
                "style": "lofi"
            }
        ]);

        let tracks = normalize_tracks(&records, "V5");
        assert_eq!(tracks.len(), 2);
        assert_eq!(tracks[0].audio_url, "https://cdn.example/a1.mp3");
        assert_eq!(tracks[0].style, "synthwave");
        assert_eq!(tracks[0].model, "V4.5");
        assert_eq!(tracks[1].audio_url, "https://cdn.example/a2.mp3");
        assert_eq!(tracks[1].style, "lofi");
        assert_eq!(tracks[1].model, "V5");
        assert!(tracks[1].image_url.contains("dicebear"));
    }

    #[test]
    fn single_track_object_is_wrapped() {
        let record = json!({ "id": "solo", "audio_url": "https://cdn.example/solo.mp3" });
        assert_eq!(normalize_tracks(&record, "V5").len(), 1);
    }

    #[test]
    fn music_result_reads_records_then_data() {
        let payload = json!({ "data": [{ "id": "x", "url": "https://cdn.example/x.mp3" }] });
        match normalize_result(JobKind::Music, &payload) {
            Some(NormalizedResult::Tracks(tracks)) => assert_eq!(tracks.len(), 1),
            other => panic!("expected tracks, got {:?}", other),
        }
    }

    #[test]
    fn image_result_prefers_url_list() {
        let payload = json!({ "image_urls": ["https://a.jpg", "https://b.jpg"] });
        assert_eq!(
            normalize_result(JobKind::Image, &payload),
            Some(NormalizedResult::Urls(vec![
                "https://a.jpg".into(),
                "https://b.jpg".into()
            ]))
        );

        let payload = json!({ "image_url": "https://c.jpg" });
        assert_eq!(
            normalize_result(JobKind::Image, &payload),
            Some(NormalizedResult::Urls(vec!["https://c.jpg".into()]))
        );
    }

    #[test]
    fn video_result_is_a_single_url() {
        let payload = json!({ "video_url": "https://cdn.example/final.mp4" });
        assert_eq!(
            normalize_result(JobKind::Video, &payload),
            Some(NormalizedResult::Url("https://cdn.example/final.mp4".into()))
        );
    }
}
