//! One-line display rendering of a book record.
//!
//! Patterns use the classifiers `%t` title, `%a` first author, `%p`
//! progress percent (rounded), `%s` series and `%l` language. A square-
//! bracket group is optional: when its classifier has no value the whole
//! group disappears, otherwise only the brackets do. A classifier outside
//! any group with no value falls back to a `(no ...)` placeholder.
//!
//! Presentation only; kept out of the core store deliberately.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::book::BookRecord;

/// Default pattern: author prefix and progress suffix only when known.
pub const FORMAT_DEFAULT: &str = "[%a: ]%t[ (%p%)]";

/// A bracket group still holding an unreplaced classifier; dropped whole.
static UNFILLED_GROUP: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[[^\[\]]*%[tapsl][^\[\]]*\]").unwrap());

/// Any innermost bracket group; unwrapped once nothing in it is unfilled.
static GROUP: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[([^\[\]]*)\]").unwrap());

#[derive(Debug, Clone)]
pub struct BookFormat {
    pattern: String,
}

impl Default for BookFormat {
    fn default() -> Self {
        Self::new(FORMAT_DEFAULT)
    }
}

impl BookFormat {
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
        }
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Renders `book` according to the pattern, reading its current
    /// metadata through the lazily refreshed accessors.
    pub fn format(&self, book: &BookRecord) -> String {
        let mut out = self.pattern.clone();
        if out.contains("%t") {
            if let Some(title) = book.title().filter(|t| !t.is_empty()) {
                out = out.replace("%t", &title);
            }
        }
        if out.contains("%a") {
            let first_author = book
                .authors()
                .and_then(|authors| authors.into_iter().next())
                .filter(|a| !a.is_empty());
            if let Some(author) = first_author {
                out = out.replace("%a", &author);
            }
        }
        if out.contains("%p") {
            if let Some(percent) = book.percent_finished() {
                let rounded = (percent * 100.0).round() as i64;
                out = out.replace("%p", &rounded.to_string());
            }
        }
        if out.contains("%s") {
            if let Some(series) = book.series().filter(|s| !s.is_empty()) {
                out = out.replace("%s", &series);
            }
        }
        if out.contains("%l") {
            if let Some(language) = book.language().filter(|l| !l.is_empty()) {
                out = out.replace("%l", &language);
            }
        }

        while GROUP.is_match(&out) {
            while UNFILLED_GROUP.is_match(&out) {
                out = UNFILLED_GROUP.replace_all(&out, "").into_owned();
            }
            out = GROUP.replace_all(&out, "$1").into_owned();
        }

        out = out.replace("%t", "(no title)");
        out = out.replace("%a", "(no author)");
        out = out.replace("%p", "(no progress)");
        out = out.replace("%s", "(no series)");
        out.replace("%l", "(no language)")
    }
}
