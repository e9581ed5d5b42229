//! "Awesome prompts" catalog and `%(key)s` substitution.
//!
//! The catalog is fetched once at startup from a JSON object of
//! `title -> prompt`. Every entry is reachable both by its title and by its
//! zero-based position in the document, so `%(Linux Terminal)s` and `%(0)s`
//! can expand to the same text.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use regex::Regex;
use tracing::{debug, info};

/// Startup blocks on the catalog fetch for at most this long.
const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"%%|%\(([^)]*)\)s").expect("placeholder pattern is valid"));

#[derive(Debug)]
pub enum CatalogError {
    Http(String),
    Parse(String),
    /// Document parsed but isn't an object of strings.
    Shape(String),
}

impl fmt::Display for CatalogError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CatalogError::Http(e) => write!(f, "HTTP error: {e}"),
            CatalogError::Parse(e) => write!(f, "Parse error: {e}"),
            CatalogError::Shape(e) => write!(f, "Unexpected catalog shape: {e}"),
        }
    }
}

impl std::error::Error for CatalogError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateError {
    /// Text referenced `%(key)s` for a key the catalog doesn't have.
    MissingKey(String),
}

impl fmt::Display for TemplateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TemplateError::MissingKey(key) => write!(f, "missing placeholder key '{key}'"),
        }
    }
}

impl std::error::Error for TemplateError {}

#[derive(Debug, Default)]
pub struct PromptCatalog {
    prompts: HashMap<String, Arc<str>>,
    titles: Vec<String>,
}

impl PromptCatalog {
    pub async fn fetch(url: &str) -> Result<Self, CatalogError> {
        Self::fetch_within(url, FETCH_TIMEOUT).await
    }

    async fn fetch_within(url: &str, timeout: Duration) -> Result<Self, CatalogError> {
        info!("Fetching awesome prompts from {url}");
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CatalogError::Http(format!("failed to build HTTP client: {e}")))?;
        let response = client
            .get(url)
            .send()
            .await
            .map_err(|e| CatalogError::Http(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(CatalogError::Http(format!("{status} from {url}")));
        }

        let body = response
            .text()
            .await
            .map_err(|e| CatalogError::Http(e.to_string()))?;
        let catalog = Self::from_json(&body)?;
        info!("Loaded {} awesome prompts", catalog.len());
        Ok(catalog)
    }

    pub fn from_json(json: &str) -> Result<Self, CatalogError> {
        let value: serde_json::Value =
            serde_json::from_str(json).map_err(|e| CatalogError::Parse(e.to_string()))?;
        let serde_json::Value::Object(map) = value else {
            return Err(CatalogError::Shape("expected a JSON object".into()));
        };

        let mut entries = Vec::with_capacity(map.len());
        for (title, prompt) in map {
            match prompt {
                serde_json::Value::String(text) => entries.push((title, text)),
                other => {
                    return Err(CatalogError::Shape(format!(
                        "value for '{title}' is not a string: {other}"
                    )));
                }
            }
        }
        Ok(Self::from_entries(entries))
    }

    /// Build from `(title, prompt)` pairs in document order.
    ///
    /// Titles go in first and ordinal keys second, so an ordinal overwrites a
    /// title that happens to look like a number.
    pub fn from_entries<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut prompts = HashMap::new();
        let mut titles = Vec::new();
        let mut values: Vec<Arc<str>> = Vec::new();

        for (title, text) in entries {
            let title: String = title.into();
            let text: String = text.into();
            let text: Arc<str> = Arc::from(text);
            if prompts.insert(title.clone(), text.clone()).is_none() {
                titles.push(title);
                values.push(text);
            } else if let Some(pos) = titles.iter().position(|t| *t == title) {
                values[pos] = text;
            }
        }

        for (index, text) in values.into_iter().enumerate() {
            if let Some(previous) = prompts.insert(index.to_string(), text) {
                debug!(
                    "Ordinal key {index} shadows a title with prompt of {} chars",
                    previous.len()
                );
            }
        }

        Self { prompts, titles }
    }

    pub fn resolve(&self, key: &str) -> Option<&str> {
        self.prompts.get(key).map(|p| p.as_ref())
    }

    /// Titles in document order.
    pub fn titles(&self) -> &[String] {
        &self.titles
    }

    /// Number of distinct prompts (not counting ordinal aliases).
    pub fn len(&self) -> usize {
        self.titles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.titles.is_empty()
    }

    /// Expand every `%(key)s` in `text` with the matching prompt.
    ///
    /// `%%` collapses to a single `%`; any other `%` passes through unchanged.
    pub fn substitute(&self, text: &str) -> Result<String, TemplateError> {
        let mut out = String::with_capacity(text.len());
        let mut last = 0;

        for caps in PLACEHOLDER.captures_iter(text) {
            let Some(whole) = caps.get(0) else { continue };
            out.push_str(&text[last..whole.start()]);
            match caps.get(1) {
                Some(key) => {
                    let prompt = self
                        .resolve(key.as_str())
                        .ok_or_else(|| TemplateError::MissingKey(key.as_str().to_string()))?;
                    out.push_str(prompt);
                }
                None => out.push('%'),
            }
            last = whole.end();
        }

        out.push_str(&text[last..]);
        Ok(out)
    }
}
