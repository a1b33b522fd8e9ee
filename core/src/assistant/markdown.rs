use std::sync::LazyLock;

use regex::Regex;

static BOLD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*\*(.*?)\*\*").expect("valid bold pattern"));
static ITALIC_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*(.*?)\*").expect("valid italic pattern"));

/// Remove `**bold**` and then `*italic*` delimiters, one non-greedy pass each,
/// and trim the result. Pairs never span a line break; anything else is kept
/// as is.
pub fn strip_emphasis(text: &str) -> String {
    let without_bold = BOLD_RE.replace_all(text, "$1");
    let without_italic = ITALIC_RE.replace_all(&without_bold, "$1");
    without_italic.trim().to_string()
}
