//! User message template for funnel analysis.
//!
//! The system message comes from the resolved AI configuration; this module
//! only builds the per-request user message.

use crate::models::FunnelAnalysisRequest;

const RESPONSE_SHAPE: &str = r#"{
  "funnelCoherenceScore": <number from 0 to 10>,
  "adDiagnosis": "<what the ad promises and how well it sets expectations>",
  "landingPageDiagnosis": "<how well the landing page delivers on the ad>",
  "syncSuggestions": ["<suggestion 1>", "<suggestion 2>", "<suggestion 3>", "<suggestion 4>"],
  "optimizedAd": "<a rewritten ad that matches the landing page>"
}"#;

pub fn build_user_prompt(request: &FunnelAnalysisRequest) -> String {
    format!(
        "Analyze the coherence between the ad and the landing page below.\n\
         \n\
         AD:\n\
         \"\"\"\n\
         {ad}\n\
         \"\"\"\n\
         \n\
         LANDING PAGE:\n\
         \"\"\"\n\
         {page}\n\
         \"\"\"\n\
         \n\
         Respond with a single JSON object and nothing else, using exactly this shape:\n\
         {shape}\n\
         \n\
         Give exactly 4 sync suggestions. Write in the same language as the ad.",
        ad = request.ad_text.trim(),
        page = request.landing_page_text.trim(),
        shape = RESPONSE_SHAPE,
    )
}
