//! Document rendering seam and the default HTML shell.

use async_trait::async_trait;
use turbo_assets::AssetRefs;

use crate::object::escape_attribute;
use crate::{PageError, PageObject};

/// Turns a page object into a full document.
#[async_trait]
pub trait DocumentRenderer: Send + Sync {
    /// Render a document for `page`.
    ///
    /// `page_json` is the serialized page object, ready to embed.
    async fn render(&self, page: &PageObject, page_json: &str, assets: &AssetRefs) -> Result<String, PageError>;
}

/// Minimal HTML shell that boots the client-side app.
#[derive(Debug, Clone)]
pub struct ShellRenderer {
    /// Document title.
    pub title: Option<String>,
    /// Extra meta tags (name, content).
    pub meta: Vec<(String, String)>,
    /// Id of the mount element.
    pub root_id: String,
    /// Language attribute of the html element.
    pub lang: String,
}

impl Default for ShellRenderer {
    fn default() -> Self {
        Self {
            title: None,
            meta: vec![("viewport".into(), "width=device-width, initial-scale=1".into())],
            root_id: "app".into(),
            lang: "en".into(),
        }
    }
}

impl ShellRenderer {
    /// Create a shell with a title.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Default::default()
        }
    }

    /// Add a meta tag.
    pub fn with_meta(mut self, name: &str, content: &str) -> Self {
        self.meta.push((name.to_string(), content.to_string()));
        self
    }

    /// Change the mount element id.
    pub fn with_root_id(mut self, id: impl Into<String>) -> Self {
        self.root_id = id.into();
        self
    }

    fn render_head(&self, assets: &AssetRefs) -> String {
        let mut html = String::from("<meta charset=\"utf-8\">\n");

        if let Some(title) = &self.title {
            html.push_str(&format!("<title>{}</title>\n", escape_attribute(title)));
        }
        for (name, content) in &self.meta {
            html.push_str(&format!(
                "<meta name=\"{}\" content=\"{}\">\n",
                escape_attribute(name),
                escape_attribute(content)
            ));
        }
        for href in &assets.css {
            html.push_str(&format!(
                "<link rel=\"stylesheet\" href=\"{}\">\n",
                escape_attribute(href)
            ));
        }
        for href in &assets.imports {
            html.push_str(&format!(
                "<link rel=\"modulepreload\" href=\"{}\">\n",
                escape_attribute(href)
            ));
        }
        if !assets.file.is_empty() {
            html.push_str(&format!(
                "<script type=\"module\" src=\"{}\"></script>\n",
                escape_attribute(&assets.file)
            ));
        }
        html
    }

    /// Render the shell synchronously.
    pub fn render_document(&self, page_json: &str, assets: &AssetRefs) -> String {
        let mut html = String::from("<!DOCTYPE html>\n");
        html.push_str(&format!("<html lang=\"{}\">\n<head>\n", escape_attribute(&self.lang)));
        html.push_str(&self.render_head(assets));
        html.push_str("</head>\n<body>\n");
        html.push_str(&format!(
            "<div id=\"{}\" data-page=\"{}\"></div>\n",
            escape_attribute(&self.root_id),
            escape_attribute(page_json)
        ));
        html.push_str("</body>\n</html>\n");
        html
    }
}

#[async_trait]
impl DocumentRenderer for ShellRenderer {
    async fn render(&self, _page: &PageObject, page_json: &str, assets: &AssetRefs) -> Result<String, PageError> {
        Ok(self.render_document(page_json, assets))
    }
}
