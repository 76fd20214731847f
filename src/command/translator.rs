//! Request path and query to command-line translation.
//!
//! `/users/list?name=Ada` with scratch dir `/srv/.tmp/<id>` becomes
//! `users list --name "Ada" --tmpDir "/srv/.tmp/<id>"`.

use std::fmt;
use std::path::Path;

use thiserror::Error;

/// Name of the synthetic argument carrying the request's scratch directory.
pub const TMP_DIR_ARG: &str = "tmpDir";

/// Parameter name under which command templates see the request id.
pub const REQUEST_ID_PARAM: &str = "requestId";

/// Errors from [`translate`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TranslateError {
    #[error("invalid command segment `{0}`")]
    Segment(String),

    #[error("invalid argument name `{0}`")]
    ArgumentName(String),
}

/// A translated command line, split into the command words and its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    /// Space-joined path segments, e.g. `users list`.
    pub command: String,
    /// `--key "value"` tokens, ending with `--tmpDir`.
    pub args: String,
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.command.is_empty(), self.args.is_empty()) {
            (true, _) => write!(f, "{}", self.args),
            (false, true) => write!(f, "{}", self.command),
            (false, false) => write!(f, "{} {}", self.command, self.args),
        }
    }
}

/// Translate a URL path and ordered query pairs into a command line.
pub fn translate(
    path: &str,
    query: &[(String, String)],
    tmp_dir: &Path,
) -> Result<CommandLine, TranslateError> {
    let command = command_words(path)?;

    let mut args = Vec::with_capacity(query.len() + 1);
    for (key, value) in query {
        if !is_safe_word(key) {
            return Err(TranslateError::ArgumentName(key.clone()));
        }
        args.push(format_arg(key, value));
    }
    args.push(format_arg(TMP_DIR_ARG, &tmp_dir.to_string_lossy()));

    Ok(CommandLine {
        command,
        args: args.join(" "),
    })
}

/// Join the non-empty path segments with single spaces.
pub fn command_words(path: &str) -> Result<String, TranslateError> {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    if let Some(bad) = segments.iter().find(|s| !is_safe_word(s)) {
        return Err(TranslateError::Segment(bad.to_string()));
    }
    Ok(segments.join(" "))
}

/// Parse a raw query string into ordered, decoded pairs.
pub fn parse_query(query: Option<&str>) -> Vec<(String, String)> {
    query
        .map(|q| {
            url::form_urlencoded::parse(q.as_bytes())
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect()
        })
        .unwrap_or_default()
}

fn format_arg(key: &str, value: &str) -> String {
    format!("--{} \"{}\"", key, escape_double_quoted(value))
}

/// Escape a value for use inside a double-quoted shell word.
pub fn escape_double_quoted(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '\\' | '"' | '$' | '`') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn is_safe_word(word: &str) -> bool {
    !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | ':' | '@' | '+'))
}
