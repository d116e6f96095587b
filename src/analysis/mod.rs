//! Analysis pipeline: summarize, then classify sentiment, then score confidence.
//!
//! [`AnalysisPipeline::analyze`] checks the gateway first. An unavailable model
//! produces [`Analysis::placeholder`] and counts as success; a generation error
//! after the model is ready propagates as [`InferenceError`].

use std::sync::Arc;
use std::time::Instant;

use crate::config::InferenceConfig;
use crate::error::InferenceError;
use crate::inference::{GenerateParams, InferenceGateway, Readiness};
use crate::thoughts::types::{Sentiment, SentimentScore};

const SUMMARIZE_PROMPT: &str = "Please provide a concise summary (1-2 sentences) of the following thought:

Thought: {text}

Summary:";

const SENTIMENT_PROMPT: &str = "Analyze the sentiment of the following text.
Respond with ONLY one word: positive, neutral, or negative.

Text: {text}

Sentiment:";

/// Texts shorter than this (in characters) are their own summary.
const MIN_SUMMARY_CHARS: usize = 10;
/// Fallback summary length when the model returns nothing usable.
const FALLBACK_SUMMARY_CHARS: usize = 100;
const SUMMARY_MAX_TOKENS: usize = 100;
const LABEL_MAX_TOKENS: usize = 10;
/// Low temperatures keep repeated analyses of the same text stable.
const SUMMARY_TEMPERATURE: f32 = 0.3;
const LABEL_TEMPERATURE: f32 = 0.1;

/// Confidence for a recognised label when the backend reports no likelihood.
pub const UNSCORED_LABEL_CONFIDENCE: f64 = 0.7;
/// Confidence when no label could be recognised and `neutral` was assumed.
pub const UNRECOGNISED_LABEL_CONFIDENCE: f64 = 0.5;

/// Output of the pipeline for one text.
#[derive(Debug, Clone, PartialEq)]
pub struct Analysis {
    pub summary: Option<String>,
    pub sentiment: Option<SentimentScore>,
}

impl Analysis {
    /// Result recorded when no model is available.
    pub fn placeholder() -> Self {
        Self {
            summary: None,
            sentiment: None,
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.summary.is_none() && self.sentiment.is_none()
    }
}

/// Prompt sizing knobs.
#[derive(Debug, Clone, Copy)]
pub struct PipelineSettings {
    /// Input text is cut to this many characters before prompting.
    pub max_prompt_chars: usize,
    /// Upper bound applied to every generation call.
    pub max_new_tokens: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            max_prompt_chars: 512,
            max_new_tokens: 256,
        }
    }
}

impl From<&InferenceConfig> for PipelineSettings {
    fn from(config: &InferenceConfig) -> Self {
        Self {
            max_prompt_chars: config.max_prompt_chars,
            max_new_tokens: config.max_new_tokens,
        }
    }
}

pub struct AnalysisPipeline {
    gateway: Arc<InferenceGateway>,
    settings: PipelineSettings,
}

impl AnalysisPipeline {
    pub fn new(gateway: Arc<InferenceGateway>, settings: PipelineSettings) -> Self {
        Self { gateway, settings }
    }

    pub fn gateway(&self) -> &Arc<InferenceGateway> {
        &self.gateway
    }

    pub async fn analyze(&self, raw_text: &str) -> Result<Analysis, InferenceError> {
        let started = Instant::now();

        if let Readiness::Unavailable { reason } = self.gateway.ensure_ready().await {
            tracing::info!(text_len = raw_text.len(), %reason, "model unavailable, recording placeholder");
            return Ok(Analysis::placeholder());
        }

        let summary = self.summarize(raw_text).await.inspect_err(|e| {
            tracing::error!(text_len = raw_text.len(), stage = "summarize", error = %e, "inference failed")
        })?;
        let sentiment = self.classify(raw_text).await.inspect_err(|e| {
            tracing::error!(text_len = raw_text.len(), stage = "classify", error = %e, "inference failed")
        })?;

        tracing::info!(
            text_len = raw_text.len(),
            sentiment = %sentiment.label,
            confidence = sentiment.confidence,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "analysis complete"
        );

        Ok(Analysis {
            summary: Some(summary),
            sentiment: Some(sentiment),
        })
    }

    async fn summarize(&self, raw_text: &str) -> Result<String, InferenceError> {
        if raw_text.trim().chars().count() < MIN_SUMMARY_CHARS {
            return Ok(raw_text.trim().to_string());
        }

        let prompt = SUMMARIZE_PROMPT.replace(
            "{text}",
            truncate_chars(raw_text, self.settings.max_prompt_chars),
        );
        let generation = self
            .gateway
            .generate(
                &prompt,
                GenerateParams::new(SUMMARY_MAX_TOKENS.min(self.settings.max_new_tokens))
                    .with_temperature(SUMMARY_TEMPERATURE),
            )
            .await?;

        Ok(clean_summary(&generation.text, raw_text))
    }

    async fn classify(&self, raw_text: &str) -> Result<SentimentScore, InferenceError> {
        let prompt = SENTIMENT_PROMPT.replace(
            "{text}",
            truncate_chars(raw_text, self.settings.max_prompt_chars),
        );
        let generation = self
            .gateway
            .generate(
                &prompt,
                GenerateParams::new(LABEL_MAX_TOKENS.min(self.settings.max_new_tokens))
                    .with_temperature(LABEL_TEMPERATURE),
            )
            .await?;

        let label = parse_sentiment(&generation.text);
        if label.is_none() {
            tracing::warn!(output_len = generation.text.len(), "unrecognised sentiment label, using neutral");
        }
        Ok(SentimentScore {
            label: label.unwrap_or(Sentiment::Neutral),
            confidence: confidence_for(label, generation.likelihood),
        })
    }
}

/// Find a sentiment label in model output, case-insensitively.
///
/// When several labels appear, the one occurring first wins.
pub fn parse_sentiment(output: &str) -> Option<Sentiment> {
    let lowered = output.to_lowercase();
    Sentiment::ALL
        .iter()
        .filter_map(|s| lowered.find(s.as_str()).map(|pos| (pos, *s)))
        .min_by_key(|(pos, _)| *pos)
        .map(|(_, s)| s)
}

/// Confidence score for a classification.
///
/// Recognised label with a model likelihood: the likelihood clamped to
/// `[0, 1]` and rounded to two decimals. Recognised label without one:
/// [`UNSCORED_LABEL_CONFIDENCE`]. No recognised label:
/// [`UNRECOGNISED_LABEL_CONFIDENCE`].
pub fn confidence_for(label: Option<Sentiment>, likelihood: Option<f32>) -> f64 {
    match (label, likelihood) {
        (None, _) => UNRECOGNISED_LABEL_CONFIDENCE,
        (Some(_), Some(p)) if p.is_finite() => {
            let clamped = f64::from(p).clamp(0.0, 1.0);
            (clamped * 100.0).round() / 100.0
        }
        (Some(_), _) => UNSCORED_LABEL_CONFIDENCE,
    }
}

/// First non-empty line of the model output; falls back to the start of the input.
fn clean_summary(output: &str, raw_text: &str) -> String {
    match output.lines().map(str::trim).find(|l| !l.is_empty()) {
        Some(line) => line.to_string(),
        None => truncate_chars(raw_text.trim(), FALLBACK_SUMMARY_CHARS).to_string(),
    }
}

/// Cut `text` to at most `max` characters without splitting a code point.
pub fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::{GatewayLimits, Generation, TextGenerator};
    use anyhow::Result;
    use std::sync::Mutex;

    /// Returns canned outputs in order; records prompts and params it saw.
    struct Scripted {
        outputs: Mutex<Vec<Result<Generation, String>>>,
        prompts: Arc<Mutex<Vec<String>>>,
        params: Arc<Mutex<Vec<GenerateParams>>>,
    }

    impl TextGenerator for Scripted {
        fn generate(&self, prompt: &str, params: &GenerateParams) -> Result<Generation> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            self.params.lock().unwrap().push(*params);
            let mut outputs = self.outputs.lock().unwrap();
            match outputs.remove(0) {
                Ok(g) => Ok(g),
                Err(e) => Err(anyhow::anyhow!(e)),
            }
        }
        fn name(&self) -> &str {
            "scripted"
        }
    }

    type Recorded<T> = Arc<Mutex<Vec<T>>>;

    fn pipeline(outputs: Vec<Result<Generation, String>>) -> (AnalysisPipeline, Recorded<String>) {
        let (p, prompts, _) = recording_pipeline(outputs);
        (p, prompts)
    }

    fn recording_pipeline(
        outputs: Vec<Result<Generation, String>>,
    ) -> (AnalysisPipeline, Recorded<String>, Recorded<GenerateParams>) {
        let prompts = Arc::new(Mutex::new(Vec::new()));
        let params = Arc::new(Mutex::new(Vec::new()));
        let shared = Mutex::new(Some(Scripted {
            outputs: Mutex::new(outputs),
            prompts: Arc::clone(&prompts),
            params: Arc::clone(&params),
        }));
        let loader = move || -> Result<Box<dyn TextGenerator>> {
            let scripted = shared.lock().unwrap().take().expect("loaded once");
            Ok(Box::new(scripted))
        };
        let gateway = Arc::new(InferenceGateway::new(Arc::new(loader), GatewayLimits::default()));
        (AnalysisPipeline::new(gateway, PipelineSettings::default()), prompts, params)
    }

    fn unavailable_pipeline() -> AnalysisPipeline {
        let loader = || -> Result<Box<dyn TextGenerator>> { anyhow::bail!("no weights") };
        let gateway = Arc::new(InferenceGateway::new(Arc::new(loader), GatewayLimits::default()));
        AnalysisPipeline::new(gateway, PipelineSettings::default())
    }

    #[test]
    fn parse_sentiment_is_case_insensitive_substring() {
        assert_eq!(parse_sentiment("Positive"), Some(Sentiment::Positive));
        assert_eq!(parse_sentiment("  NEGATIVE.\n"), Some(Sentiment::Negative));
        assert_eq!(parse_sentiment("The sentiment is neutral"), Some(Sentiment::Neutral));
        assert_eq!(parse_sentiment("mixed feelings"), None);
        assert_eq!(parse_sentiment(""), None);
    }

    #[test]
    fn parse_sentiment_prefers_earliest_label() {
        assert_eq!(
            parse_sentiment("negative, not positive"),
            Some(Sentiment::Negative)
        );
    }

    #[test]
    fn confidence_formula() {
        assert_eq!(confidence_for(Some(Sentiment::Positive), Some(0.876)), 0.88);
        assert_eq!(confidence_for(Some(Sentiment::Positive), Some(1.7)), 1.0);
        assert_eq!(confidence_for(Some(Sentiment::Negative), None), UNSCORED_LABEL_CONFIDENCE);
        assert_eq!(confidence_for(Some(Sentiment::Negative), Some(f32::NAN)), UNSCORED_LABEL_CONFIDENCE);
        assert_eq!(confidence_for(None, Some(0.99)), UNRECOGNISED_LABEL_CONFIDENCE);
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("abc", 10), "abc");
        assert_eq!(truncate_chars("", 3), "");
    }

    #[test]
    fn clean_summary_takes_first_line() {
        assert_eq!(clean_summary("\n  A short day.\nMore text", "raw"), "A short day.");
        assert_eq!(clean_summary("   \n", "  the raw input  "), "the raw input");
    }

    #[tokio::test]
    async fn full_analysis() {
        let (p, prompts) = pipeline(vec![
            Ok(Generation::text("Had a great time hiking.\nextra")),
            Ok(Generation {
                text: "Positive".into(),
                likelihood: Some(0.934),
            }),
        ]);

        let analysis = p.analyze("Went hiking with friends, it was wonderful").await.unwrap();
        assert_eq!(analysis.summary.as_deref(), Some("Had a great time hiking."));
        assert_eq!(
            analysis.sentiment,
            Some(SentimentScore {
                label: Sentiment::Positive,
                confidence: 0.93
            })
        );

        let prompts = prompts.lock().unwrap();
        assert_eq!(prompts.len(), 2);
        assert!(prompts[0].starts_with("Please provide a concise summary"));
        assert!(prompts[1].contains("Respond with ONLY one word"));
        assert!(prompts[1].contains("Went hiking with friends"));
    }

    #[tokio::test]
    async fn each_stage_uses_its_own_sampling() {
        let (p, _, params) = recording_pipeline(vec![
            Ok(Generation::text("Summary.")),
            Ok(Generation::text("neutral")),
        ]);
        p.analyze("A long enough thought to summarize").await.unwrap();

        let params = params.lock().unwrap();
        assert_eq!(
            *params,
            vec![
                GenerateParams::new(SUMMARY_MAX_TOKENS).with_temperature(SUMMARY_TEMPERATURE),
                GenerateParams::new(LABEL_MAX_TOKENS).with_temperature(LABEL_TEMPERATURE),
            ]
        );
    }

    #[tokio::test]
    async fn short_text_skips_summary_call() {
        let (p, prompts) = pipeline(vec![Ok(Generation::text("neutral"))]);
        let analysis = p.analyze("ok then").await.unwrap();
        assert_eq!(analysis.summary.as_deref(), Some("ok then"));
        assert_eq!(analysis.sentiment.unwrap().label, Sentiment::Neutral);
        assert_eq!(prompts.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unrecognised_label_defaults_to_neutral() {
        let (p, _) = pipeline(vec![
            Ok(Generation::text("Summary.")),
            Ok(Generation::text("I cannot say")),
        ]);
        let score = p.analyze("A long enough thought to summarize").await.unwrap().sentiment.unwrap();
        assert_eq!(score.label, Sentiment::Neutral);
        assert_eq!(score.confidence, UNRECOGNISED_LABEL_CONFIDENCE);
    }

    #[tokio::test]
    async fn unavailable_model_yields_placeholder() {
        let p = unavailable_pipeline();
        let analysis = p.analyze("hello").await.unwrap();
        assert!(analysis.is_placeholder());
        assert_eq!(analysis, Analysis::placeholder());
    }

    #[tokio::test]
    async fn mid_call_failure_propagates() {
        let (p, _) = pipeline(vec![
            Ok(Generation::text("Summary.")),
            Err("CUDA error".into()),
        ]);
        let err = p.analyze("A long enough thought to summarize").await.unwrap_err();
        assert!(matches!(err, InferenceError::Generation(_)));
    }

    #[tokio::test]
    async fn prompt_text_is_truncated() {
        let (p, prompts) = pipeline(vec![
            Ok(Generation::text("Summary.")),
            Ok(Generation::text("neutral")),
        ]);
        let long = "x".repeat(2000);
        p.analyze(&long).await.unwrap();
        let prompts = prompts.lock().unwrap();
        assert!(prompts[0].contains(&"x".repeat(512)));
        assert!(!prompts[0].contains(&"x".repeat(513)));
    }
}
