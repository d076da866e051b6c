use serde::{Deserialize, Serialize};

use crate::cache::KEY_SEPARATOR;
use crate::error::AppError;

/// Bounds of `funnelCoherenceScore`
pub const MIN_SCORE: f64 = 0.0;
pub const MAX_SCORE: f64 = 10.0;

/// Number of sync suggestions the model is asked for
pub const EXPECTED_SUGGESTIONS: usize = 4;

/// Body of `POST /funnel-analysis`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunnelAnalysisRequest {
    pub ad_text: String,
    pub landing_page_text: String,
}

impl FunnelAnalysisRequest {
    /// Parse and validate a raw request body.
    ///
    /// Every failure is a [`AppError::Validation`] so the caller always sees a 400.
    pub fn from_body(body: &[u8], max_input_chars: usize) -> Result<Self, AppError> {
        if body.is_empty() {
            return Err(AppError::Validation(
                "Request body is required: adText and landingPageText".to_string(),
            ));
        }

        let value: serde_json::Value = serde_json::from_slice(body)
            .map_err(|e| AppError::Validation(format!("Request body is not valid JSON: {}", e)))?;
        let object = value
            .as_object()
            .ok_or_else(|| AppError::Validation("Request body must be a JSON object".to_string()))?;

        let ad_text = required_text(object, "adText")?;
        let landing_page_text = required_text(object, "landingPageText")?;

        let request = Self {
            ad_text,
            landing_page_text,
        };
        request.validate(max_input_chars)?;
        Ok(request)
    }

    pub fn validate(&self, max_input_chars: usize) -> Result<(), AppError> {
        for (field, value) in [
            ("adText", &self.ad_text),
            ("landingPageText", &self.landing_page_text),
        ] {
            if value.trim().is_empty() {
                return Err(AppError::Validation(format!("{} is required", field)));
            }
            if value.contains(KEY_SEPARATOR) {
                return Err(AppError::Validation(format!(
                    "{} contains an unsupported control character",
                    field
                )));
            }
            if value.chars().count() > max_input_chars {
                return Err(AppError::Validation(format!(
                    "{} exceeds the maximum length of {} characters",
                    field, max_input_chars
                )));
            }
        }
        Ok(())
    }
}

fn required_text(
    object: &serde_json::Map<String, serde_json::Value>,
    field: &str,
) -> Result<String, AppError> {
    match object.get(field) {
        None | Some(serde_json::Value::Null) => {
            Err(AppError::Validation(format!("{} is required", field)))
        }
        Some(serde_json::Value::String(s)) => Ok(s.clone()),
        Some(_) => Err(AppError::Validation(format!("{} must be a string", field))),
    }
}

/// Structured analysis returned to the caller and stored in the cache
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunnelAnalysis {
    pub funnel_coherence_score: f64,
    pub ad_diagnosis: String,
    pub landing_page_diagnosis: String,
    pub sync_suggestions: Vec<String>,
    pub optimized_ad: String,
}

impl FunnelAnalysis {
    /// Check a provider's parsed JSON against the response shape.
    ///
    /// Numeric strings are accepted for the score and out-of-range scores are
    /// clamped; anything else that does not fit is a malformed response.
    pub fn from_provider_value(mut value: serde_json::Value) -> Result<Self, AppError> {
        let object = value.as_object_mut().ok_or_else(|| {
            AppError::MalformedProviderResponse("expected a JSON object".to_string())
        })?;

        if let Some(serde_json::Value::String(raw)) = object.get("funnelCoherenceScore") {
            let parsed = raw.trim().parse::<f64>().map_err(|_| {
                AppError::MalformedProviderResponse(format!(
                    "funnelCoherenceScore is not a number: {}",
                    raw
                ))
            })?;
            let number = serde_json::Number::from_f64(parsed).ok_or_else(|| {
                AppError::MalformedProviderResponse("funnelCoherenceScore is not finite".to_string())
            })?;
            object.insert(
                "funnelCoherenceScore".to_string(),
                serde_json::Value::Number(number),
            );
        }

        let mut analysis: FunnelAnalysis = serde_json::from_value(value)
            .map_err(|e| AppError::MalformedProviderResponse(format!("unexpected shape: {}", e)))?;

        if !analysis.funnel_coherence_score.is_finite() {
            return Err(AppError::MalformedProviderResponse(
                "funnelCoherenceScore is not finite".to_string(),
            ));
        }
        if !(MIN_SCORE..=MAX_SCORE).contains(&analysis.funnel_coherence_score) {
            tracing::warn!(
                score = analysis.funnel_coherence_score,
                "Provider score out of range, clamping"
            );
            analysis.funnel_coherence_score =
                analysis.funnel_coherence_score.clamp(MIN_SCORE, MAX_SCORE);
        }
        // Two decimals keep the cached and the fresh payload byte-identical
        analysis.funnel_coherence_score = (analysis.funnel_coherence_score * 100.0).round() / 100.0;

        if analysis.sync_suggestions.len() != EXPECTED_SUGGESTIONS {
            tracing::warn!(
                count = analysis.sync_suggestions.len(),
                expected = EXPECTED_SUGGESTIONS,
                "Unexpected number of sync suggestions"
            );
        }

        Ok(analysis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_value() -> serde_json::Value {
        json!({
            "funnelCoherenceScore": 7.5,
            "adDiagnosis": "Strong hook, vague offer.",
            "landingPageDiagnosis": "Headline does not echo the ad.",
            "syncSuggestions": ["a", "b", "c", "d"],
            "optimizedAd": "Try it free for 14 days."
        })
    }

    #[test]
    fn test_from_body_accepts_valid_request() {
        let body = json!({"adText": "Anúncio A", "landingPageText": "Página B"}).to_string();
        let request = FunnelAnalysisRequest::from_body(body.as_bytes(), 100).unwrap();
        assert_eq!(request.ad_text, "Anúncio A");
        assert_eq!(request.landing_page_text, "Página B");
    }

    #[test]
    fn test_from_body_rejects_missing_or_empty_fields() {
        let cases: &[&[u8]] = &[
            b"",
            b"not json",
            b"[]",
            br#"{"adText": "x"}"#,
            br#"{"landingPageText": "y"}"#,
            br#"{"adText": "   ", "landingPageText": "y"}"#,
            br#"{"adText": null, "landingPageText": "y"}"#,
            br#"{"adText": 5, "landingPageText": "y"}"#,
        ];

        for body in cases {
            let result = FunnelAnalysisRequest::from_body(body, 100);
            assert!(
                matches!(result, Err(AppError::Validation(_))),
                "expected validation error for {:?}",
                String::from_utf8_lossy(body)
            );
        }
    }

    #[test]
    fn test_from_body_enforces_max_length() {
        let body = json!({"adText": "a".repeat(11), "landingPageText": "b"}).to_string();
        let result = FunnelAnalysisRequest::from_body(body.as_bytes(), 10);
        assert!(matches!(result, Err(AppError::Validation(ref m)) if m.contains("adText")));
    }

    #[test]
    fn test_from_body_rejects_unit_separator() {
        for body in [
            json!({"adText": "ad\u{1f}shared", "landingPageText": "page"}),
            json!({"adText": "ad", "landingPageText": "shared\u{1f}page"}),
        ] {
            let result = FunnelAnalysisRequest::from_body(body.to_string().as_bytes(), 100);
            assert!(
                matches!(result, Err(AppError::Validation(ref m)) if m.contains("control character")),
                "expected rejection for {}",
                body
            );
        }
    }

    #[test]
    fn test_from_provider_value_accepts_shape() {
        let analysis = FunnelAnalysis::from_provider_value(sample_value()).unwrap();
        assert_eq!(analysis.funnel_coherence_score, 7.5);
        assert_eq!(analysis.sync_suggestions.len(), 4);

        // Serializes back with the camelCase wire names
        let round = serde_json::to_value(&analysis).unwrap();
        assert_eq!(round, sample_value());
    }

    #[test]
    fn test_score_is_clamped_and_coerced() {
        let mut value = sample_value();
        value["funnelCoherenceScore"] = json!(14);
        assert_eq!(
            FunnelAnalysis::from_provider_value(value)
                .unwrap()
                .funnel_coherence_score,
            10.0
        );

        let mut value = sample_value();
        value["funnelCoherenceScore"] = json!(-3);
        assert_eq!(
            FunnelAnalysis::from_provider_value(value)
                .unwrap()
                .funnel_coherence_score,
            0.0
        );

        let mut value = sample_value();
        value["funnelCoherenceScore"] = json!(6.666666);
        assert_eq!(
            FunnelAnalysis::from_provider_value(value)
                .unwrap()
                .funnel_coherence_score,
            6.67
        );

        let mut value = sample_value();
        value["funnelCoherenceScore"] = json!(" 8 ");
        assert_eq!(
            FunnelAnalysis::from_provider_value(value)
                .unwrap()
                .funnel_coherence_score,
            8.0
        );
    }

    #[test]
    fn test_wrong_shape_is_malformed() {
        let mut missing = sample_value();
        missing.as_object_mut().unwrap().remove("optimizedAd");

        let mut bad_score = sample_value();
        bad_score["funnelCoherenceScore"] = json!("high");

        let mut bad_suggestions = sample_value();
        bad_suggestions["syncSuggestions"] = json!("do better");

        for value in [missing, bad_score, bad_suggestions, json!([1, 2, 3])] {
            assert!(matches!(
                FunnelAnalysis::from_provider_value(value),
                Err(AppError::MalformedProviderResponse(_))
            ));
        }
    }

    #[test]
    fn test_suggestion_count_mismatch_is_tolerated() {
        let mut value = sample_value();
        value["syncSuggestions"] = json!(["only one"]);
        assert!(FunnelAnalysis::from_provider_value(value).is_ok());
    }
}
