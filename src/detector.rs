// src/detector.rs
//
// Pass 1 client: ask the vision model for candidate pool boxes on a tile.
//
// The model answers in free text. Parsing is strict: only well-formed
// `box_2d` entries become BoundingBoxes, everything else is counted and
// dropped so the orchestrator never sees malformed data.

use crate::error::ClientError;
use crate::llm_client::VisionModelClient;
use crate::types::{BoundingBox, BoxError};
use crate::usage::ModelReply;

use image::RgbImage;
use regex::Regex;
use serde_json::Value;
use std::future::Future;
use std::sync::OnceLock;
use tracing::{debug, warn};

pub const DETECTION_PROMPT: &str = r#"
Analyze this satellite image. Identify all outdoor swimming pools.

CRITICAL IDENTIFICATION RULES:
1. CONTEXT MATTERS: Pools are almost always in private backyards, hotel courtyards, or rooftops. They are ALMOST NEVER directly adjacent to a public road.
2. WATER SIGNATURE: Look for clear water (deep blue/turquoise).

STRICT EXCLUSIONS:
- BLUE TARPS ON ROOFS: If a blue rectangle is on a roof with no visible border, steps, or access, it is likely a tarp or utility cover. EXCLUDE IT.
- SPORTS COURTS: Basketball, tennis, or padel courts.
- PLAYGROUNDS: Blue rubber safety surfaces.

For each potential pool found, provide its bounding box coordinates in a JSON list:
[
  {"box_2d": [ymin, xmin, ymax, xmax], "label": "potential_pool"}
]
The coordinates should be normalized from 0 to 1000.
If no pools are found, return []. ONLY return the JSON.
"#;

#[derive(Debug, Clone, PartialEq)]
pub struct DetectedBox {
    pub bbox: BoundingBox,
    pub label: Option<String>,
}

/// What one detection call produced after strict parsing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetectionOutcome {
    pub boxes: Vec<DetectedBox>,
    /// Array entries that were not valid boxes.
    pub rejected_entries: usize,
    /// No JSON array could be read from the answer at all.
    pub parse_failed: bool,
}

/// Finds candidate boxes on a tile image.
///
/// Transport failures come back as `Err`; parse problems are reported inside
/// the outcome and never as errors.
pub trait Detector: Sync {
    fn detect(
        &self,
        image: &RgbImage,
    ) -> impl Future<Output = Result<ModelReply<DetectionOutcome>, ClientError>> + Send;
}

pub struct ModelDetector<'a> {
    client: &'a VisionModelClient,
}

impl<'a> ModelDetector<'a> {
    pub fn new(client: &'a VisionModelClient) -> Self {
        Self { client }
    }
}

impl Detector for ModelDetector<'_> {
    async fn detect(
        &self,
        image: &RgbImage,
    ) -> Result<ModelReply<DetectionOutcome>, ClientError> {
        let reply = self.client.generate(DETECTION_PROMPT, image).await?;
        let outcome = parse_detections(&reply.value);
        if outcome.parse_failed {
            warn!("🔍 Could not read a box list from model answer: {:.120}", reply.value);
        }
        Ok(ModelReply::new(outcome, reply.usage))
    }
}

// ============================================================================
// PARSING
// ============================================================================

fn json_array_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)\[.*\]").expect("static regex"))
}

/// Pull the outermost JSON array out of `text` and keep the valid boxes.
pub fn parse_detections(text: &str) -> DetectionOutcome {
    let Some(m) = json_array_re().find(text) else {
        return DetectionOutcome {
            parse_failed: true,
            ..Default::default()
        };
    };

    let entries: Vec<Value> = match serde_json::from_str(m.as_str()) {
        Ok(entries) => entries,
        Err(e) => {
            debug!("🔍 Detection JSON rejected: {}", e);
            return DetectionOutcome {
                parse_failed: true,
                ..Default::default()
            };
        }
    };

    let mut outcome = DetectionOutcome::default();
    for entry in &entries {
        match parse_entry(entry) {
            Ok(detected) => outcome.boxes.push(detected),
            Err(e) => {
                debug!("🔍 Skipping malformed detection {}: {}", entry, e);
                outcome.rejected_entries += 1;
            }
        }
    }
    outcome
}

#[derive(Debug, thiserror::Error)]
enum EntryError {
    #[error("entry has no box_2d array")]
    MissingBox,
    #[error("box_2d holds a non-numeric value")]
    NotNumeric,
    #[error(transparent)]
    Invalid(#[from] BoxError),
}

fn parse_entry(entry: &Value) -> Result<DetectedBox, EntryError> {
    let raw = entry
        .get("box_2d")
        .and_then(Value::as_array)
        .ok_or(EntryError::MissingBox)?;

    let values = raw
        .iter()
        .map(Value::as_f64)
        .collect::<Option<Vec<f64>>>()
        .ok_or(EntryError::NotNumeric)?;

    let bbox = BoundingBox::from_model_array(&values)?;
    let label = entry
        .get("label")
        .and_then(Value::as_str)
        .map(str::to_string);

    Ok(DetectedBox { bbox, label })
}
