//! View rendering for routes that present command output as HTML.
//!
//! The handler only decides *which* view to render and with what data;
//! rendering itself sits behind [`ViewRenderer`].
//!
//! A route's configured view wins. Otherwise the command path picks one:
//! `<path>.<ext>` renders inside the layout, `<path>.p.<ext>` is a partial
//! rendered alone, and `/` looks for `index`.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use minijinja::Environment;
use serde_json::{json, Value};
use thiserror::Error;

use crate::config::{ViewConfig, ViewsConfig};

/// Errors from view rendering.
#[derive(Debug, Error)]
pub enum ViewError {
    #[error("template error: {0}")]
    Template(#[from] minijinja::Error),
}

/// A view and the layout wrapping it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewSelection {
    pub name: String,
    pub layout: Option<String>,
}

/// Renders a named view with JSON data.
pub trait ViewRenderer: Send + Sync {
    /// Pick the view for a response, from the route's settings or `path`.
    ///
    /// `None` means the response is not rendered as a view.
    fn select(&self, view: Option<&ViewConfig>, path: &str) -> Option<ViewSelection>;

    fn render(&self, view: &ViewSelection, data: &Value) -> Result<String, ViewError>;
}

/// Data handed to a view: the command's stdout as JSON, or `{"data": raw}`.
pub fn view_data(stdout: &str) -> Value {
    serde_json::from_str(stdout.trim()).unwrap_or_else(|_| json!({ "data": stdout }))
}

/// `minijinja` templates loaded from a directory.
///
/// Layouts live in `<dir>/layouts/` and receive the rendered view as `body`.
#[derive(Debug, Clone)]
pub struct TemplateViews {
    dir: PathBuf,
    extension: String,
    default_layout: String,
    has_layouts: bool,
}

impl TemplateViews {
    /// `None` when the views directory does not exist.
    pub fn from_config(config: &ViewsConfig) -> Option<Self> {
        if !config.dir.is_dir() {
            return None;
        }
        Some(Self {
            has_layouts: config.dir.join("layouts").is_dir(),
            dir: config.dir.clone(),
            extension: config.extension.trim_start_matches('.').to_string(),
            default_layout: config.default_layout.clone(),
        })
    }

    fn file_name(&self, name: &str) -> String {
        if Path::new(name).extension().is_some() {
            name.to_string()
        } else {
            format!("{}.{}", name, self.extension)
        }
    }

    fn layout(&self, requested: Option<&str>) -> Option<String> {
        if !self.has_layouts {
            return None;
        }
        Some(requested.unwrap_or(&self.default_layout).to_string())
    }

    fn exists(&self, name: &str) -> bool {
        self.dir.join(name).is_file()
    }

    fn environment(&self) -> Environment<'static> {
        let dir = self.dir.clone();
        let mut env = Environment::new();
        env.set_loader(move |name| load_template(&dir, name));
        env
    }
}

fn load_template(dir: &Path, name: &str) -> Result<Option<String>, minijinja::Error> {
    let mut path = dir.to_path_buf();
    for component in Path::new(name).components() {
        match component {
            Component::Normal(part) => path.push(part),
            Component::CurDir => {}
            _ => return Ok(None),
        }
    }
    match fs::read_to_string(&path) {
        Ok(source) => Ok(Some(source)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(minijinja::Error::new(
            minijinja::ErrorKind::InvalidOperation,
            format!("failed to read template {}: {}", path.display(), e),
        )),
    }
}

impl ViewRenderer for TemplateViews {
    fn select(&self, view: Option<&ViewConfig>, path: &str) -> Option<ViewSelection> {
        if let Some(view) = view {
            return Some(ViewSelection {
                name: view.name.clone(),
                layout: self.layout(view.layout.as_deref()),
            });
        }

        let stem = match path.trim_matches('/') {
            "" => "index",
            stem => stem,
        };
        if Path::new(stem)
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return None;
        }

        let full = format!("{}.{}", stem, self.extension);
        if self.exists(&full) {
            return Some(ViewSelection {
                name: full,
                layout: self.layout(None),
            });
        }
        let partial = format!("{}.p.{}", stem, self.extension);
        if self.exists(&partial) {
            return Some(ViewSelection {
                name: partial,
                layout: None,
            });
        }
        None
    }

    fn render(&self, view: &ViewSelection, data: &Value) -> Result<String, ViewError> {
        let env = self.environment();
        let body = env.get_template(&self.file_name(&view.name))?.render(data)?;

        let Some(layout) = &view.layout else {
            return Ok(body);
        };

        let mut ctx: BTreeMap<String, minijinja::Value> = match data {
            Value::Object(map) => map
                .iter()
                .map(|(k, v)| (k.clone(), minijinja::Value::from_serialize(v)))
                .collect(),
            _ => BTreeMap::new(),
        };
        ctx.insert("body".to_string(), minijinja::Value::from_safe_string(body));

        let layout_name = format!("layouts/{}", self.file_name(layout));
        Ok(env.get_template(&layout_name)?.render(&ctx)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn views(with_layouts: bool) -> (tempfile::TempDir, TemplateViews) {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("user.html"),
            "<h1>{{ name }}</h1>{% if data %}<p>{{ data }}</p>{% endif %}",
        )
        .unwrap();
        if with_layouts {
            fs::create_dir(dir.path().join("layouts")).unwrap();
            fs::write(
                dir.path().join("layouts/main.html"),
                "<main>{{ body }}</main>",
            )
            .unwrap();
            fs::write(
                dir.path().join("layouts/admin.html"),
                "<section title=\"{{ name }}\">{{ body }}</section>",
            )
            .unwrap();
        }
        let config = ViewsConfig {
            dir: dir.path().to_path_buf(),
            ..ViewsConfig::default()
        };
        let views = TemplateViews::from_config(&config).unwrap();
        (dir, views)
    }

    fn view(name: &str, layout: Option<&str>) -> ViewConfig {
        ViewConfig {
            name: name.to_string(),
            layout: layout.map(String::from),
        }
    }

    fn select(views: &TemplateViews, view: &ViewConfig) -> ViewSelection {
        views.select(Some(view), "/ignored").unwrap()
    }

    #[test]
    fn missing_directory_disables_views() {
        let config = ViewsConfig {
            dir: PathBuf::from("/definitely/not/here"),
            ..ViewsConfig::default()
        };
        assert!(TemplateViews::from_config(&config).is_none());
    }

    #[test]
    fn view_data_parses_json_or_wraps_raw() {
        assert_eq!(view_data("{\"a\":1}\n"), json!({"a": 1}));
        assert_eq!(view_data("plain"), json!({"data": "plain"}));
    }

    #[test]
    fn renders_without_layout() {
        let (_dir, views) = views(false);
        let selection = select(&views, &view("user", Some("admin")));
        assert_eq!(selection.layout, None);

        let html = views.render(&selection, &json!({"name": "Ada"})).unwrap();
        assert_eq!(html, "<h1>Ada</h1>");
    }

    #[test]
    fn wraps_in_default_layout() {
        let (_dir, views) = views(true);
        let selection = select(&views, &view("user", None));
        assert_eq!(selection.layout.as_deref(), Some("main"));

        let html = views.render(&selection, &json!({"name": "<Ada>"})).unwrap();
        assert_eq!(html, "<main><h1>&lt;Ada&gt;</h1></main>");
    }

    #[test]
    fn named_layout_sees_view_data() {
        let (_dir, views) = views(true);
        let selection = select(&views, &view("user.html", Some("admin")));
        let html = views.render(&selection, &view_data("raw output")).unwrap();
        assert_eq!(
            html,
            "<section title=\"\"><h1></h1><p>raw output</p></section>"
        );
    }

    #[test]
    fn unknown_view_is_an_error() {
        let (_dir, views) = views(false);
        let selection = select(&views, &view("missing", None));
        assert!(views.render(&selection, &json!({})).is_err());
    }

    #[test]
    fn path_selects_full_view_with_layout() {
        let (dir, views) = views(true);
        fs::create_dir(dir.path().join("users")).unwrap();
        fs::write(dir.path().join("users/list.html"), "<ul>{{ data }}</ul>").unwrap();

        let selection = views.select(None, "/users/list").unwrap();
        assert_eq!(selection.name, "users/list.html");
        assert_eq!(selection.layout.as_deref(), Some("main"));

        let html = views.render(&selection, &view_data("ada")).unwrap();
        assert_eq!(html, "<main><ul>ada</ul></main>");
    }

    #[test]
    fn path_selects_partial_without_layout() {
        let (dir, views) = views(true);
        fs::write(dir.path().join("status.p.html"), "<b>{{ data }}</b>").unwrap();

        let selection = views.select(None, "/status").unwrap();
        assert_eq!(
            selection,
            ViewSelection {
                name: "status.p.html".into(),
                layout: None,
            }
        );
        let html = views.render(&selection, &view_data("up")).unwrap();
        assert_eq!(html, "<b>up</b>");
    }

    #[test]
    fn full_view_wins_over_partial() {
        let (dir, views) = views(false);
        fs::write(dir.path().join("status.html"), "full").unwrap();
        fs::write(dir.path().join("status.p.html"), "partial").unwrap();

        let selection = views.select(None, "/status").unwrap();
        assert_eq!(selection.name, "status.html");
    }

    #[test]
    fn root_path_looks_for_index() {
        let (dir, views) = views(true);
        assert_eq!(views.select(None, "/"), None);

        fs::write(dir.path().join("index.p.html"), "home").unwrap();
        let selection = views.select(None, "/").unwrap();
        assert_eq!(selection.name, "index.p.html");
        assert_eq!(selection.layout, None);

        fs::write(dir.path().join("index.html"), "home").unwrap();
        let selection = views.select(None, "/").unwrap();
        assert_eq!(selection.name, "index.html");
        assert_eq!(selection.layout.as_deref(), Some("main"));
    }

    #[test]
    fn path_without_template_selects_nothing() {
        let (_dir, views) = views(true);
        assert_eq!(views.select(None, "/nothing/here"), None);
        assert_eq!(views.select(None, "/../user"), None);
    }
}
