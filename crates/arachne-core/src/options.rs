use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Default scrape timeout when the request does not supply one.
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// Default timeout for LLM-extraction scrapes. Completions are slow; the
/// default is raised unless the user set an explicit timeout.
pub const LLM_EXTRACTION_TIMEOUT_MS: u64 = 90_000;

/// Extraction mode requested by the client.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExtractorMode {
    #[default]
    #[serde(rename = "markdown")]
    Markdown,
    #[serde(rename = "llm-extraction")]
    LlmExtraction,
    #[serde(rename = "llm-extraction-from-raw-html")]
    LlmExtractionFromRawHtml,
}

impl ExtractorMode {
    /// True for any of the LLM-extraction variants.
    pub fn is_llm_extraction(&self) -> bool {
        matches!(
            self,
            ExtractorMode::LlmExtraction | ExtractorMode::LlmExtractionFromRawHtml
        )
    }
}

/// Extractor configuration carried on the job descriptor.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractorOptions {
    #[serde(default)]
    pub mode: ExtractorMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extraction_schema: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extraction_prompt: Option<String>,
}

/// Page-level options as supplied on the wire (v0 `pageOptions`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageOptions {
    #[serde(default)]
    pub only_main_content: bool,
    #[serde(default)]
    pub include_html: bool,
    #[serde(default)]
    pub include_raw_html: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wait_for: Option<u64>,
}

/// Fully-resolved scrape options: request options merged over defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrapeOptions {
    pub only_main_content: bool,
    pub include_html: bool,
    pub include_raw_html: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wait_for: Option<u64>,
    #[serde(default)]
    pub skip_tls_verification: bool,
    pub timeout_ms: u64,
    #[serde(default)]
    pub extractor: ExtractorOptions,
}

impl Default for ScrapeOptions {
    fn default() -> Self {
        Self {
            only_main_content: false,
            include_html: false,
            include_raw_html: false,
            wait_for: None,
            skip_tls_verification: false,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            extractor: ExtractorOptions::default(),
        }
    }
}

impl ScrapeOptions {
    /// Merge request options over the built-in defaults.
    ///
    /// LLM-extraction mode requires an object-typed extraction schema,
    /// forces `only_main_content`, and raises the default timeout to 90 s
    /// (an explicit user timeout always wins).
    pub fn merged(
        page: Option<PageOptions>,
        extractor: Option<ExtractorOptions>,
        timeout_ms: Option<u64>,
    ) -> Result<Self, AppError> {
        let page = page.unwrap_or_default();
        let mut options = Self {
            only_main_content: page.only_main_content,
            include_html: page.include_html,
            include_raw_html: page.include_raw_html,
            wait_for: page.wait_for,
            skip_tls_verification: false,
            timeout_ms: timeout_ms.unwrap_or(DEFAULT_TIMEOUT_MS),
            extractor: extractor.unwrap_or_default(),
        };

        if options.extractor.mode.is_llm_extraction() {
            match &options.extractor.extraction_schema {
                Some(serde_json::Value::Object(_)) => {}
                _ => {
                    return Err(AppError::InvalidInput(
                        "extractorOptions.extractionSchema must be an object \
                         when using LLM extraction"
                            .to_string(),
                    ));
                }
            }
            options.only_main_content = true;
            if timeout_ms.is_none() {
                options.timeout_ms = LLM_EXTRACTION_TIMEOUT_MS;
            }
        }

        Ok(options)
    }
}

/// Options that never come from the client.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InternalOptions {
    #[serde(default)]
    pub disable_smart_wait_cache: bool,
    /// Mirror scrape results to the configured GCS bucket.
    #[serde(default)]
    pub store_in_gcs: bool,
}

/// Crawler configuration in its legacy stored shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrawlerOptions {
    #[serde(default)]
    pub include_paths: Vec<String>,
    #[serde(default)]
    pub exclude_paths: Vec<String>,
    pub limit: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_depth: Option<u32>,
    /// Seconds between requests to the crawled site.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crawl_delay: Option<f64>,
    #[serde(default)]
    pub ignore_sitemap: bool,
}

impl Default for CrawlerOptions {
    fn default() -> Self {
        Self {
            include_paths: Vec::new(),
            exclude_paths: Vec::new(),
            limit: 10_000,
            max_depth: None,
            crawl_delay: None,
            ignore_sitemap: false,
        }
    }
}

impl CrawlerOptions {
    /// Compile every include/exclude pattern, failing on the first invalid
    /// one. Validating at admission time means workers never have to reject
    /// batches later.
    pub fn validate_patterns(&self) -> Result<(), AppError> {
        for pattern in self.include_paths.iter().chain(self.exclude_paths.iter()) {
            if let Err(e) = Regex::new(pattern) {
                return Err(AppError::InvalidInput(format!(
                    "Invalid regex pattern \"{pattern}\": {e}"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merged_applies_defaults() {
        let options = ScrapeOptions::merged(None, None, None).unwrap();
        assert_eq!(options.timeout_ms, DEFAULT_TIMEOUT_MS);
        assert!(!options.only_main_content);
        assert!(!options.include_raw_html);
    }

    #[test]
    fn merged_keeps_user_timeout() {
        let options = ScrapeOptions::merged(None, None, Some(5_000)).unwrap();
        assert_eq!(options.timeout_ms, 5_000);
    }

    #[test]
    fn llm_mode_requires_object_schema() {
        let extractor = ExtractorOptions {
            mode: ExtractorMode::LlmExtraction,
            extraction_schema: Some(serde_json::json!("not an object")),
            extraction_prompt: None,
        };
        let err = ScrapeOptions::merged(None, Some(extractor), None).unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));

        let extractor = ExtractorOptions {
            mode: ExtractorMode::LlmExtraction,
            extraction_schema: None,
            extraction_prompt: None,
        };
        let err = ScrapeOptions::merged(None, Some(extractor), None).unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
    }

    #[test]
    fn llm_mode_forces_main_content_and_raises_timeout() {
        let extractor = ExtractorOptions {
            mode: ExtractorMode::LlmExtractionFromRawHtml,
            extraction_schema: Some(serde_json::json!({})),
            extraction_prompt: None,
        };
        let options = ScrapeOptions::merged(None, Some(extractor), None).unwrap();
        assert!(options.only_main_content);
        assert_eq!(options.timeout_ms, LLM_EXTRACTION_TIMEOUT_MS);

        // Explicit timeout wins over the LLM default.
        let extractor = ExtractorOptions {
            mode: ExtractorMode::LlmExtraction,
            extraction_schema: Some(serde_json::json!({})),
            extraction_prompt: None,
        };
        let options = ScrapeOptions::merged(None, Some(extractor), Some(10_000)).unwrap();
        assert_eq!(options.timeout_ms, 10_000);
    }

    #[test]
    fn extractor_mode_wire_names() {
        let mode: ExtractorMode = serde_json::from_str("\"llm-extraction-from-raw-html\"").unwrap();
        assert_eq!(mode, ExtractorMode::LlmExtractionFromRawHtml);
        assert!(mode.is_llm_extraction());

        let mode: ExtractorMode = serde_json::from_str("\"markdown\"").unwrap();
        assert!(!mode.is_llm_extraction());
    }

    #[test]
    fn valid_patterns_pass() {
        let options = CrawlerOptions {
            include_paths: vec!["^/blog/.*".to_string()],
            exclude_paths: vec!["\\.pdf$".to_string()],
            ..Default::default()
        };
        assert!(options.validate_patterns().is_ok());
    }

    #[test]
    fn first_invalid_pattern_fails_with_its_message() {
        let options = CrawlerOptions {
            include_paths: vec!["^/ok".to_string(), "[unclosed".to_string()],
            exclude_paths: vec!["(also[bad".to_string()],
            ..Default::default()
        };
        let err = options.validate_patterns().unwrap_err();
        match err {
            AppError::InvalidInput(msg) => assert!(msg.contains("[unclosed")),
            other => panic!("expected InvalidInput, got {other:?}"),
        }
    }
}
