//! Handler output: page definitions and outcomes.

use crate::{PropSpec, Props};

/// A component plus its declared props, created fresh per request.
#[derive(Debug)]
pub struct PageDefinition {
    /// Client-side component identifier.
    pub component: String,
    /// Declared props.
    pub props: Props,
    /// Per-response history encryption override.
    pub encrypt_history: Option<bool>,
    /// Per-response history clear override.
    pub clear_history: Option<bool>,
    /// Whether a plain request may receive a rendered document.
    pub document: bool,
}

impl PageDefinition {
    /// Create a page for a component with no props.
    pub fn new(component: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            props: Props::new(),
            encrypt_history: None,
            clear_history: None,
            document: true,
        }
    }

    /// Declare a prop.
    pub fn prop(mut self, key: impl Into<String>, spec: impl Into<PropSpec>) -> Self {
        self.props.insert(key.into(), spec.into());
        self
    }

    /// Override history encryption for this response.
    pub fn encrypt_history(mut self, encrypt: bool) -> Self {
        self.encrypt_history = Some(encrypt);
        self
    }

    /// Override history clearing for this response.
    pub fn clear_history(mut self, clear: bool) -> Self {
        self.clear_history = Some(clear);
        self
    }

    /// Never render a document for this page; plain requests get raw props.
    pub fn without_document(mut self) -> Self {
        self.document = false;
        self
    }
}

/// What a handler decided for the current request.
#[derive(Debug)]
pub enum Outcome {
    /// Render a page.
    Render(PageDefinition),
    /// Navigate elsewhere. `external` forces a full browser navigation.
    Redirect { target: String, external: bool },
    /// Navigate back to the referring page.
    Back,
    /// The handler could not produce a response.
    Failure(String),
}

impl Outcome {
    /// Render a page.
    pub fn render(page: PageDefinition) -> Self {
        Self::Render(page)
    }

    /// Redirect within the app.
    pub fn redirect(target: impl Into<String>) -> Self {
        Self::Redirect {
            target: target.into(),
            external: false,
        }
    }

    /// Redirect that must leave the client-side app.
    pub fn external(target: impl Into<String>) -> Self {
        Self::Redirect {
            target: target.into(),
            external: true,
        }
    }

    /// Handler failure.
    pub fn failure(reason: impl Into<String>) -> Self {
        Self::Failure(reason.into())
    }
}

impl From<PageDefinition> for Outcome {
    fn from(page: PageDefinition) -> Self {
        Self::Render(page)
    }
}
