//! HTTP detector backend

use super::InferenceAdapter;
use crate::error::VisionError;
use crate::frame::DecodedFrame;
use async_trait::async_trait;
use greensort_core::{BoundingBox, ConfidenceScale, Detection, InferenceConfig, WasteClass};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// One prediction as returned by the detector service
#[derive(Debug, Clone, Deserialize)]
pub struct RemotePrediction {
    #[serde(alias = "class", alias = "name")]
    pub label: String,
    pub confidence: f32,
    #[serde(rename = "box", alias = "bbox")]
    pub bbox: [f32; 4],
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RemoteResponse {
    List(Vec<RemotePrediction>),
    Wrapped { detections: Vec<RemotePrediction> },
}

/// Posts each frame to an HTTP endpoint and parses the ranked predictions
pub struct RemoteAdapter {
    endpoint: String,
    client: reqwest::Client,
    max_detections: usize,
    confidence_scale: ConfidenceScale,
}

impl RemoteAdapter {
    pub fn new(endpoint: impl Into<String>, config: &InferenceConfig) -> Result<Self, VisionError> {
        let endpoint = endpoint.into();
        let lower = endpoint.to_lowercase();
        if !lower.starts_with("http://") && !lower.starts_with("https://") {
            return Err(VisionError::Config(format!(
                "inference endpoint must use http:// or https:// ({})",
                endpoint
            )));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .connect_timeout(Duration::from_millis(config.timeout_ms))
            .build()?;

        Ok(Self {
            endpoint,
            client,
            max_detections: config.max_detections,
            confidence_scale: config.confidence_scale,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl InferenceAdapter for RemoteAdapter {
    fn name(&self) -> &str {
        &self.endpoint
    }

    async fn infer(&self, frame: &DecodedFrame) -> Result<Vec<Detection>, VisionError> {
        let response = self
            .client
            .post(&self.endpoint)
            .header(reqwest::header::CONTENT_TYPE, frame.mime_type())
            .body(frame.bytes.clone())
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(VisionError::Inference(format!(
                "detector returned HTTP {}",
                response.status()
            )));
        }

        let body = response.text().await?;
        let mut detections = parse_predictions(&body, self.confidence_scale)?;
        detections.truncate(self.max_detections);
        Ok(detections)
    }
}

/// Parse a detector response body into detections
///
/// Unknown labels are skipped. Confidences are rescaled to [0, 1]; with
/// [`ConfidenceScale::Auto`] the unit is picked once for the whole response.
pub fn parse_predictions(
    body: &str,
    scale: ConfidenceScale,
) -> Result<Vec<Detection>, VisionError> {
    let response: RemoteResponse = serde_json::from_str(body)
        .map_err(|e| VisionError::Inference(format!("invalid detector response: {}", e)))?;
    let predictions = match response {
        RemoteResponse::List(p) => p,
        RemoteResponse::Wrapped { detections } => detections,
    };

    let raw: Vec<f32> = predictions.iter().map(|p| p.confidence).collect();
    let scale = scale.resolve(&raw);

    let detections = predictions
        .into_iter()
        .filter_map(|p| {
            let Some(class) = WasteClass::from_label(&p.label) else {
                debug!("Skipping unknown detector label '{}'", p.label);
                return None;
            };
            let confidence = scale.normalize(p.confidence);
            Some(Detection::new(class, confidence, BoundingBox::from(p.bbox)))
        })
        .collect();
    Ok(detections)
}
