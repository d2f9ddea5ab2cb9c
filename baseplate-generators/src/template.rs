//! Tera rendering for [`Action::Template`](crate::Action::Template).

use baseplate_core::{FileId, WriteOptions};
use serde::Serialize;
use tera::{Context, Tera};

use crate::error::GeneratorError;

/// A template source plus the context to render it with.
#[derive(Debug, Clone)]
pub struct TemplateFile {
    pub id: FileId,
    /// Output path relative to the app root.
    pub destination: String,
    /// Template name used in error messages and metadata.
    pub name: String,
    pub source: String,
    pub context: serde_json::Value,
    pub options: WriteOptions,
}

impl TemplateFile {
    pub fn new(id: impl Into<FileId>, destination: impl Into<String>, source: impl Into<String>) -> Self {
        let destination = destination.into();
        Self {
            id: id.into(),
            name: destination.clone(),
            destination,
            source: source.into(),
            context: serde_json::Value::Object(Default::default()),
            options: WriteOptions::default(),
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_context<C: Serialize>(mut self, context: &C) -> Result<Self, GeneratorError> {
        self.context = serde_json::to_value(context)?;
        Ok(self)
    }

    pub fn with_options(mut self, options: WriteOptions) -> Self {
        self.options = options;
        self
    }
}

/// Render a single template. Autoescaping is off: generated files are source
/// code, not HTML.
pub fn render_template(template: &TemplateFile) -> Result<String, GeneratorError> {
    let wrap = |source| GeneratorError::Template {
        name: template.name.clone(),
        source,
    };

    let mut tera = Tera::default();
    tera.autoescape_on(Vec::new());
    tera.add_raw_template(&template.name, &template.source)
        .map_err(wrap)?;
    let context = match &template.context {
        serde_json::Value::Null => Context::new(),
        value => Context::from_value(value.clone()).map_err(wrap)?,
    };
    tera.render(&template.name, &context).map_err(wrap)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn renders_loops_and_values() {
        let template = TemplateFile::new("deps", "deps.txt", "{% for d in deps %}{{ d }}\n{% endfor %}")
            .with_context(&json!({ "deps": ["tokio", "serde"] }))
            .unwrap();
        assert_eq!(render_template(&template).unwrap(), "tokio\nserde\n");
    }

    #[test]
    fn html_is_not_escaped() {
        let template = TemplateFile::new("page", "index.html", "{{ body }}")
            .with_context(&json!({ "body": "<main></main>" }))
            .unwrap();
        assert_eq!(render_template(&template).unwrap(), "<main></main>");
    }

    #[test]
    fn syntax_error_names_the_template() {
        let template = TemplateFile::new("bad", "bad.txt", "{% if %}").named("broken");
        let err = render_template(&template).unwrap_err();
        assert!(err.to_string().contains("broken"), "got: {err}");
    }
}
