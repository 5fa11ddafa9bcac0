use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::options::ScrapeOptions;

/// Metadata attached to a worker-produced document. Unknown fields are
/// preserved verbatim; the core does not interpret them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    #[serde(rename = "sourceURL", default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    #[serde(
        rename = "pageStatusCode",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub page_status_code: Option<u16>,
    #[serde(rename = "pageError", default, skip_serializing_if = "Option::is_none")]
    pub page_error: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// Worker-produced scrape result, stored as the job's return value.
///
/// The core treats the payload as opaque except for field elision before
/// it is returned to the client.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub markdown: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html: Option<String>,
    #[serde(rename = "rawHtml", default, skip_serializing_if = "Option::is_none")]
    pub raw_html: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extract: Option<Value>,
    /// Internal search-index payload; never returned to clients.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<Value>,
    /// Internal engine attribution; never returned to clients.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(default)]
    pub metadata: DocumentMetadata,
}

impl Document {
    /// Strip fields the client did not ask for (and internal fields the
    /// client never gets), per the resolved scrape options.
    pub fn elide(mut self, options: &ScrapeOptions) -> Self {
        self.index = None;
        self.provider = None;
        if !options.include_raw_html {
            self.raw_html = None;
        }
        if !options.include_html {
            self.html = None;
        }
        // Extract-only responses do not carry markdown.
        if options.extractor.mode.is_llm_extraction() && self.extract.is_some() {
            self.markdown = None;
        }
        self
    }

    /// Transform into the legacy (v0) document shape.
    pub fn into_legacy(self) -> LegacyDocument {
        LegacyDocument {
            content: self.markdown.clone(),
            markdown: self.markdown,
            html: self.html,
            raw_html: self.raw_html,
            llm_extraction: self.extract,
            metadata: self.metadata,
        }
    }
}

/// The v0 wire shape: `content` mirrors `markdown`, the LLM result is
/// surfaced as `llm_extraction`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegacyDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub markdown: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html: Option<String>,
    #[serde(rename = "rawHtml", default, skip_serializing_if = "Option::is_none")]
    pub raw_html: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub llm_extraction: Option<Value>,
    #[serde(default)]
    pub metadata: DocumentMetadata,
}
