//! Secret placeholders: `{env:NAME}` substitution.
//!
//! Client IDs and secrets are normally kept out of the config file and
//! referenced through environment variables:
//!
//! ```jsonc
//! "clientSecret": "{env:KONG_CLIENT_SECRET}"
//! ```
//!
//! Substitution runs on the comment-free text before JSON parsing. Values are
//! JSON-escaped on insertion, so a secret containing `"` or `\` cannot break
//! out of its string literal.

/// Opening marker of a placeholder.
const PLACEHOLDER_OPEN: &str = "{env:";

/// Result of placeholder substitution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Substituted {
    /// Text with every placeholder replaced.
    pub text: String,
    /// Variables that were referenced but not set (replaced with "").
    pub missing: Vec<String>,
}

/// Substitute `{env:NAME}` placeholders from the process environment.
pub fn substitute_env(input: &str) -> Substituted {
    substitute_with(input, |name| std::env::var(name).ok())
}

/// Substitute `{env:NAME}` placeholders using `lookup`.
///
/// A placeholder without a closing `}` or with an empty name is left as-is.
pub fn substitute_with<F>(input: &str, lookup: F) -> Substituted
where
    F: Fn(&str) -> Option<String>,
{
    let mut text = String::with_capacity(input.len());
    let mut missing = Vec::new();
    let mut rest = input;

    while let Some(start) = rest.find(PLACEHOLDER_OPEN) {
        text.push_str(&rest[..start]);
        let after_open = &rest[start + PLACEHOLDER_OPEN.len()..];

        let Some(end) = after_open.find('}') else {
            text.push_str(&rest[start..]);
            rest = "";
            break;
        };

        let name = after_open[..end].trim();
        if name.is_empty() {
            text.push_str(&rest[start..start + PLACEHOLDER_OPEN.len() + end + 1]);
        } else {
            match lookup(name) {
                Some(value) => text.push_str(&escape_json_fragment(&value)),
                None => {
                    if !missing.iter().any(|m| m == name) {
                        missing.push(name.to_string());
                    }
                }
            }
        }
        rest = &after_open[end + 1..];
    }
    text.push_str(rest);

    Substituted { text, missing }
}

/// Escape a value for insertion inside an existing JSON string literal.
fn escape_json_fragment(value: &str) -> String {
    let quoted = serde_json::Value::String(value.to_string()).to_string();
    quoted[1..quoted.len() - 1].to_string()
}
