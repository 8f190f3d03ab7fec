use crate::client::ServiceClient;
use crate::config::ServiceConfig;
use crate::error::{AppError, Result};
use crate::generation::{ImageAttachment, Prompt};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

pub const DEFAULT_SIMILARITY_THRESHOLD: f32 = 90.0;

const DESCRIBE_SYSTEM_PROMPT: &str = "Identify and describe any faces present in this image. Provide detailed descriptions including apparent age, gender, emotional expressions, and any other notable features.";

/// Box position as ratios of the image width and height
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct BoundingBox {
    pub width: f32,
    pub height: f32,
    pub left: f32,
    pub top: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AgeRange {
    pub low: u32,
    pub high: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Gender {
    pub value: String,
    pub confidence: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Emotion {
    #[serde(rename = "Type")]
    pub kind: String,
    pub confidence: f32,
}

/// Attributes of one detected face
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FaceDetail {
    pub bounding_box: BoundingBox,
    pub confidence: f32,
    #[serde(default)]
    pub age_range: Option<AgeRange>,
    #[serde(default)]
    pub gender: Option<Gender>,
    #[serde(default)]
    pub emotions: Vec<Emotion>,
}

/// A target-image face matching the source face
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FaceMatch {
    pub similarity: f32,
    pub bounding_box: BoundingBox,
    pub confidence: Option<f32>,
}

/// Face detection and comparison
#[allow(async_fn_in_trait)]
pub trait FaceService {
    async fn detect_faces(&self, image: &[u8]) -> Result<Vec<FaceDetail>>;

    /// Matches of the largest source face in the target image, filtered by the
    /// service at `similarity_threshold` percent
    async fn compare_faces(
        &self,
        source: &[u8],
        target: &[u8],
        similarity_threshold: f32,
    ) -> Result<Vec<FaceMatch>>;
}

/// Client for the hosted face analysis service
#[derive(Clone)]
pub struct RekognitionClient {
    client: ServiceClient,
}

impl RekognitionClient {
    pub fn new(config: ServiceConfig) -> Result<Self> {
        Ok(RekognitionClient {
            client: ServiceClient::new(config)?,
        })
    }
}

impl FaceService for RekognitionClient {
    async fn detect_faces(&self, image: &[u8]) -> Result<Vec<FaceDetail>> {
        const OPERATION: &str = "detect faces";
        ensure_image("image", image)?;

        let body = json!({
            "Image": { "Bytes": STANDARD.encode(image) },
            "Attributes": ["ALL"],
        });
        let response = self
            .client
            .call_target("RekognitionService.DetectFaces", &body, OPERATION)
            .await?;

        let details = parse_face_details(&response)?;
        debug!("Detected {} faces", details.len());
        Ok(details)
    }

    async fn compare_faces(
        &self,
        source: &[u8],
        target: &[u8],
        similarity_threshold: f32,
    ) -> Result<Vec<FaceMatch>> {
        const OPERATION: &str = "compare faces";
        validate_threshold(similarity_threshold)?;
        ensure_image("source image", source)?;
        ensure_image("target image", target)?;

        let body = json!({
            "SourceImage": { "Bytes": STANDARD.encode(source) },
            "TargetImage": { "Bytes": STANDARD.encode(target) },
            "SimilarityThreshold": similarity_threshold,
        });
        let response = self
            .client
            .call_target("RekognitionService.CompareFaces", &body, OPERATION)
            .await?;

        let matches = parse_face_matches(&response)?;
        debug!(
            "Found {} matches at threshold {}",
            matches.len(),
            similarity_threshold
        );
        Ok(matches)
    }
}

pub fn validate_threshold(threshold: f32) -> Result<()> {
    if !(0.0..=100.0).contains(&threshold) {
        return Err(AppError::invalid_config(
            "similarity_threshold",
            format!("must be between 0 and 100, got {}", threshold),
        ));
    }
    Ok(())
}

fn ensure_image(name: &str, bytes: &[u8]) -> Result<()> {
    if bytes.is_empty() {
        return Err(AppError::input(format!("{} is empty", name)));
    }
    Ok(())
}

fn parse_face_details(response: &Value) -> Result<Vec<FaceDetail>> {
    let details = response
        .get("FaceDetails")
        .ok_or_else(|| AppError::malformed("detect faces", "missing `FaceDetails`"))?;
    serde_json::from_value(details.clone())
        .map_err(|e| AppError::malformed("detect faces", format!("bad `FaceDetails`: {e}")))
}

fn parse_face_matches(response: &Value) -> Result<Vec<FaceMatch>> {
    #[derive(Deserialize)]
    #[serde(rename_all = "PascalCase")]
    struct RawMatch {
        similarity: f32,
        face: RawFace,
    }
    #[derive(Deserialize)]
    #[serde(rename_all = "PascalCase")]
    struct RawFace {
        bounding_box: BoundingBox,
        #[serde(default)]
        confidence: Option<f32>,
    }

    let matches = response
        .get("FaceMatches")
        .ok_or_else(|| AppError::malformed("compare faces", "missing `FaceMatches`"))?;
    let raw: Vec<RawMatch> = serde_json::from_value(matches.clone())
        .map_err(|e| AppError::malformed("compare faces", format!("bad `FaceMatches`: {e}")))?;

    Ok(raw
        .into_iter()
        .map(|m| FaceMatch {
            similarity: m.similarity,
            bounding_box: m.face.bounding_box,
            confidence: m.face.confidence,
        })
        .collect())
}

/// Prompt asking a text model to summarise detection and comparison output
pub fn face_summary_prompt(details: &[FaceDetail], matches: &[FaceMatch]) -> String {
    let source_faces = serde_json::to_string_pretty(details).unwrap_or_else(|_| "[]".to_string());
    let target_faces = serde_json::to_string_pretty(matches).unwrap_or_else(|_| "[]".to_string());
    format!(
        "Here are the details of the faces detected and compared between two images:\n\
         Source Image Faces:\n{}\n\
         Target Image Faces:\n{}\n\
         Please provide a human-readable and understandable summary based on these details.",
        source_faces, target_faces
    )
}

/// Multimodal prompt describing the faces in one image.
///
/// `instructions` replaces the default user text when given, e.g. a JSON
/// layout the answer should follow.
pub fn describe_faces_prompt(image: ImageAttachment, instructions: Option<&str>) -> Prompt {
    let text = instructions
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or("Describe the faces in this image.");
    Prompt::new(text)
        .with_system(DESCRIBE_SYSTEM_PROMPT)
        .with_image(image)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detect_response() -> Value {
        json!({
            "FaceDetails": [{
                "BoundingBox": {"Width": 0.2, "Height": 0.3, "Left": 0.4, "Top": 0.1},
                "AgeRange": {"Low": 25, "High": 35},
                "Gender": {"Value": "Female", "Confidence": 99.1},
                "Emotions": [{"Type": "HAPPY", "Confidence": 95.0}, {"Type": "CALM", "Confidence": 3.0}],
                "Smile": {"Value": true, "Confidence": 97.0},
                "Confidence": 99.9
            }]
        })
    }

    #[test]
    fn test_parse_face_details() {
        let details = parse_face_details(&detect_response()).unwrap();
        assert_eq!(details.len(), 1);
        let face = &details[0];
        assert_eq!(face.age_range, Some(AgeRange { low: 25, high: 35 }));
        assert_eq!(face.gender.as_ref().map(|g| g.value.as_str()), Some("Female"));
        assert_eq!(face.emotions[0].kind, "HAPPY");
        assert!((face.bounding_box.left - 0.4).abs() < f32::EPSILON);
    }

    #[test]
    fn test_parse_face_details_missing_field() {
        let err = parse_face_details(&json!({"Faces": []})).unwrap_err();
        assert!(matches!(err, AppError::MalformedResponse { .. }));
    }

    #[test]
    fn test_parse_face_matches() {
        let response = json!({
            "SourceImageFace": {"BoundingBox": {"Width": 0.5, "Height": 0.5, "Left": 0.1, "Top": 0.1}, "Confidence": 99.0},
            "FaceMatches": [{
                "Similarity": 98.7,
                "Face": {"BoundingBox": {"Width": 0.3, "Height": 0.4, "Left": 0.2, "Top": 0.2}, "Confidence": 99.8}
            }],
            "UnmatchedFaces": []
        });
        let matches = parse_face_matches(&response).unwrap();
        assert_eq!(matches.len(), 1);
        assert!(matches[0].similarity >= 90.0);
        assert!((matches[0].confidence.unwrap() - 99.8).abs() < 1e-3);
    }

    #[test]
    fn test_threshold_range() {
        assert!(validate_threshold(DEFAULT_SIMILARITY_THRESHOLD).is_ok());
        assert!(validate_threshold(99.99).is_ok());
        assert!(validate_threshold(-1.0).is_err());
        assert!(validate_threshold(100.5).is_err());
        assert!(validate_threshold(f32::NAN).is_err());
    }

    #[test]
    fn test_summary_prompt_embeds_details() {
        let details = parse_face_details(&detect_response()).unwrap();
        let prompt = face_summary_prompt(&details, &[]);
        assert!(prompt.contains("\"Female\""));
        assert!(prompt.contains("Target Image Faces:\n[]"));
    }

    #[test]
    fn test_describe_prompt_defaults() {
        let image = ImageAttachment {
            media_type: "image/jpeg".to_string(),
            data: vec![9],
        };
        let prompt = describe_faces_prompt(image.clone(), Some("   "));
        assert_eq!(prompt.text, "Describe the faces in this image.");
        assert_eq!(prompt.system.as_deref(), Some(DESCRIBE_SYSTEM_PROMPT));

        let prompt = describe_faces_prompt(image, Some(r#"{"age": "number"}"#));
        assert_eq!(prompt.text, r#"{"age": "number"}"#);
        assert_eq!(prompt.images.len(), 1);
    }
}
