//! Per-request orchestration.
//!
//! One request walks the pipeline in a fixed order: resolve the image
//! source, pass the dedup gate, snapshot the runtime configuration, resolve
//! the prompt, call the vision API, fan out to the persistence sinks. The
//! first three failure points are terminal; persistence failures are not
//! failures of the request.

use base64::Engine as _;
use serde::Deserialize;

use crate::error::ApiError;
use crate::server::AppState;

/// Inbound analysis request body. Both the flat `{imageUrl}` shape and the
/// tagged `{type, ...}` shape are accepted.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AnalyzeRequest {
    pub image_url: Option<String>,
    pub url: Option<String>,
    #[serde(rename = "type")]
    pub source_type: Option<String>,
    pub image_path: Option<String>,
    pub base64_image: Option<String>,
    pub category: Option<String>,
}

/// The image reference in the two forms the pipeline needs: the caller's
/// reference string (dedup key, history `imageRef`) and the URL actually
/// sent upstream.
#[derive(Debug, Clone)]
pub struct ImageSource {
    pub key: String,
    pub upstream_url: String,
}

/// Decide which image the request refers to. Local paths are read and
/// inlined as a data URI so the upstream never needs filesystem access.
pub async fn resolve_image_source(request: &AnalyzeRequest) -> Result<ImageSource, ApiError> {
    match request.source_type.as_deref() {
        Some("url") => {
            let url = request
                .image_url
                .clone()
                .or_else(|| request.url.clone())
                .ok_or_else(|| {
                    ApiError::InvalidInput("imageUrl is required when type is \"url\"".to_string())
                })?;
            Ok(ImageSource {
                key: url.clone(),
                upstream_url: url,
            })
        }
        Some("local") => {
            let path = request.image_path.clone().ok_or_else(|| {
                ApiError::InvalidInput("imagePath is required when type is \"local\"".to_string())
            })?;
            let bytes = tokio::fs::read(&path).await.map_err(|e| {
                ApiError::InvalidInput(format!("error reading image file {}: {}", path, e))
            })?;
            let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
            Ok(ImageSource {
                key: path,
                upstream_url: format!("data:image/jpeg;base64,{}", encoded),
            })
        }
        Some("base64") => {
            let data = request.base64_image.clone().ok_or_else(|| {
                ApiError::InvalidInput("base64Image is required when type is \"base64\"".to_string())
            })?;
            Ok(ImageSource {
                key: data.clone(),
                upstream_url: data,
            })
        }
        Some(other) => Err(ApiError::InvalidInput(format!(
            "invalid image source type: {}",
            other
        ))),
        None => {
            let url = request
                .image_url
                .clone()
                .or_else(|| request.url.clone())
                .ok_or_else(|| {
                    ApiError::InvalidInput("no image URL or type provided".to_string())
                })?;
            Ok(ImageSource {
                key: url.clone(),
                upstream_url: url,
            })
        }
    }
}

/// Run one request through the full pipeline.
pub async fn run_analysis(state: &AppState, request: AnalyzeRequest) -> Result<String, ApiError> {
    let image = resolve_image_source(&request).await?;

    // The gate runs before the model call, so a request that later fails
    // upstream still arms the window for its key.
    if state.dedup.should_reject(&image.key) {
        return Err(ApiError::Duplicate {
            window_secs: state.dedup_window_secs,
        });
    }

    // Configuration is re-read per request; an update takes effect on the
    // next request.
    let config = state.config_store.load().await;

    let category = request
        .category
        .clone()
        .filter(|c| !c.is_empty())
        .unwrap_or_else(|| config.default_category.clone());
    let prompt = state.resolver.resolve(&config, &category).await;

    let output = state.vision.analyze(&prompt, &image.upstream_url).await?;

    state
        .recorder
        .record(&image.key, &output, &prompt, config.document_store_enabled)
        .await;

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(json: serde_json::Value) -> AnalyzeRequest {
        serde_json::from_value(json).unwrap()
    }

    #[tokio::test]
    async fn flat_shape_uses_either_url_field() {
        let source = resolve_image_source(&request(
            serde_json::json!({ "imageUrl": "https://example.com/a.jpg" }),
        ))
        .await
        .unwrap();
        assert_eq!(source.key, "https://example.com/a.jpg");
        assert_eq!(source.upstream_url, source.key);

        let source = resolve_image_source(&request(
            serde_json::json!({ "url": "https://example.com/b.jpg" }),
        ))
        .await
        .unwrap();
        assert_eq!(source.key, "https://example.com/b.jpg");
    }

    #[tokio::test]
    async fn tagged_base64_shape_passes_through() {
        let source = resolve_image_source(&request(serde_json::json!({
            "type": "base64",
            "base64Image": "data:image/jpeg;base64,aGVsbG8="
        })))
        .await
        .unwrap();
        assert_eq!(source.key, "data:image/jpeg;base64,aGVsbG8=");
        assert_eq!(source.upstream_url, source.key);
    }

    #[tokio::test]
    async fn local_shape_inlines_the_file_as_a_data_uri() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("image.jpg");
        tokio::fs::write(&path, b"hello").await.unwrap();

        let source = resolve_image_source(&request(serde_json::json!({
            "type": "local",
            "imagePath": path.to_str().unwrap()
        })))
        .await
        .unwrap();
        assert_eq!(source.key, path.to_str().unwrap());
        assert_eq!(source.upstream_url, "data:image/jpeg;base64,aGVsbG8=");
    }

    #[tokio::test]
    async fn missing_reference_and_unknown_type_are_invalid() {
        let err = resolve_image_source(&request(serde_json::json!({})))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::InvalidInput(_)));

        let err = resolve_image_source(&request(serde_json::json!({ "type": "carrier-pigeon" })))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::InvalidInput(_)));

        let err = resolve_image_source(&request(serde_json::json!({ "type": "local" })))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::InvalidInput(_)));
    }
}
