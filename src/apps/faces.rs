use crate::corpus::read_image;
use crate::error::Result;
use crate::faces::{
    describe_faces_prompt, face_summary_prompt, validate_threshold, FaceDetail, FaceMatch,
    FaceService,
};
use crate::generation::{GenerationConfig, Generator, ImageAttachment, Prompt};
use log::info;
use std::path::Path;

/// Result of comparing a source image against a target image
#[derive(Debug, Clone, PartialEq)]
pub struct FaceComparison {
    pub source_faces: Vec<FaceDetail>,
    pub matches: Vec<FaceMatch>,
    pub summary: Option<String>,
}

/// Face comparison, optionally summarized in prose by a text model
pub struct FaceComparisonApp<F, S> {
    faces: F,
    summarizer: Option<S>,
}

impl<F: FaceService, S: Generator> FaceComparisonApp<F, S> {
    pub fn new(faces: F) -> Self {
        FaceComparisonApp {
            faces,
            summarizer: None,
        }
    }

    pub fn with_summarizer(mut self, summarizer: S) -> Self {
        self.summarizer = Some(summarizer);
        self
    }

    pub async fn compare(
        &self,
        source: &Path,
        target: &Path,
        similarity_threshold: f32,
    ) -> Result<FaceComparison> {
        validate_threshold(similarity_threshold)?;
        let (source_bytes, _) = read_image(source)?;
        let (target_bytes, _) = read_image(target)?;

        let source_faces = self.faces.detect_faces(&source_bytes).await?;
        let matches = self
            .faces
            .compare_faces(&source_bytes, &target_bytes, similarity_threshold)
            .await?;
        info!(
            "{} faces in source, {} matches in target",
            source_faces.len(),
            matches.len()
        );

        let summary = match &self.summarizer {
            Some(summarizer) => {
                let prompt = Prompt::new(face_summary_prompt(&source_faces, &matches));
                Some(
                    summarizer
                        .generate(&prompt, &GenerationConfig::summary())
                        .await?,
                )
            }
            None => None,
        };

        Ok(FaceComparison {
            source_faces,
            matches,
            summary,
        })
    }
}

/// Free-form face description by a model that accepts image attachments
pub struct FaceDescriptionApp<D> {
    describer: D,
}

impl<D: Generator> FaceDescriptionApp<D> {
    pub fn new(describer: D) -> Self {
        FaceDescriptionApp { describer }
    }

    /// Describe the faces in an image, optionally following caller-supplied
    /// instructions such as a JSON layout
    pub async fn describe(&self, image: &Path, instructions: Option<&str>) -> Result<String> {
        let attachment = ImageAttachment::from_file(image)?;
        let prompt = describe_faces_prompt(attachment, instructions);
        self.describer
            .generate(&prompt, &GenerationConfig::description())
            .await
    }
}
