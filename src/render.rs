//! Page rendering.
//!
//! Page endpoints name their template with the dotted convention used across
//! the feature modules: `user.edit_profile` resolves to
//! `user/edit_profile.html` under the configured template directory.

use {
    crate::Result,
    minijinja::{Environment, path_loader},
    std::{fmt, path::Path},
};

/// Renders a named template with a JSON context.
pub trait TemplateRenderer: Send + Sync {
    fn render(&self, template: &str, context: &serde_json::Value) -> Result<String>;
}

/// Maps a dotted template name to its relative file path. Names already
/// ending in `.html` are used as they are.
///
/// ```
/// use campus_gate::template_path;
///
/// assert_eq!(template_path("user.edit_profile"), "user/edit_profile.html");
/// assert_eq!(template_path("index"), "index.html");
/// assert_eq!(template_path("errors/404.html"), "errors/404.html");
/// ```
pub fn template_path(name: &str) -> String {
    if name.ends_with(".html") {
        name.to_string()
    } else {
        format!("{}.html", name.replace('.', "/"))
    }
}

/// [`TemplateRenderer`] backed by minijinja.
pub struct MiniJinjaRenderer {
    env: Environment<'static>,
}

impl MiniJinjaRenderer {
    /// Loads templates lazily from `directory`.
    pub fn from_dir(directory: impl AsRef<Path>) -> Self {
        let mut env = Environment::new();
        env.set_loader(path_loader(directory.as_ref()));
        Self { env }
    }

    /// Builds a renderer from in-memory `(dotted name, source)` pairs.
    pub fn from_templates<I, N, S>(templates: I) -> Result<Self>
    where
        I: IntoIterator<Item = (N, S)>,
        N: AsRef<str>,
        S: Into<String>,
    {
        let mut env = Environment::new();
        for (name, source) in templates {
            env.add_template_owned(template_path(name.as_ref()), source.into())?;
        }
        Ok(Self { env })
    }
}

impl TemplateRenderer for MiniJinjaRenderer {
    fn render(&self, template: &str, context: &serde_json::Value) -> Result<String> {
        let path = template_path(template);
        let template = self.env.get_template(&path)?;
        Ok(template.render(context)?)
    }
}

impl fmt::Debug for MiniJinjaRenderer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MiniJinjaRenderer").finish_non_exhaustive()
    }
}
