//! Render requests and the parameterised render-page URL.
//!
//! All card parameters travel in the URL fragment, so the page renders the
//! card client-side without any request body:
//!
//! ```text
//! https://ray.so/#code=…&title=…&theme=candy&padding=32&language=rust&background=true&darkMode=true
//! ```

use crate::config::{ExportFormat, ExportScale, RenderOptions};
use serde::Serialize;
use urlencoding::encode;

/// Everything needed to render one card. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderRequest {
    pub source_text: String,
    pub title: String,
    pub language: String,
    pub theme: String,
    pub padding: u32,
    pub background: bool,
    pub dark_mode: bool,
    pub format: ExportFormat,
    pub scale: ExportScale,
}

impl RenderRequest {
    /// Fill the template with one file's content, title and language.
    ///
    /// Template overrides win over the path-derived title and the classified
    /// language.
    pub fn for_file(
        template: &RenderOptions,
        path: &str,
        source_text: String,
        classified_language: &str,
    ) -> Self {
        Self {
            source_text,
            title: template.title.clone().unwrap_or_else(|| path.to_string()),
            language: template
                .language
                .clone()
                .unwrap_or_else(|| classified_language.to_string()),
            theme: template.theme.clone(),
            padding: template.padding.pixels(),
            background: template.background,
            dark_mode: template.dark_mode,
            format: template.format,
            scale: template.scale,
        }
    }

    /// The render-page URL for this request.
    pub fn url(&self, base_url: &str) -> String {
        format!(
            "{base}#code={code}&title={title}&theme={theme}&padding={padding}\
             &language={language}&background={background}&darkMode={dark}",
            base = base_url.trim_end_matches('#'),
            code = encode(&self.source_text),
            title = encode(&self.title),
            theme = encode(&self.theme),
            padding = self.padding,
            language = encode(&self.language),
            background = self.background,
            dark = self.dark_mode,
        )
    }
}
