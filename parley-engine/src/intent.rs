//! NLU action decoding and response rendering

use std::collections::HashMap;
use std::fmt;

/// NLU action, decoded once at the dispatch boundary
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// No action: speak the intent text, if any
    None,
    /// Render the intent text with its parameters
    Format,
    /// Hand the turn to a named skill
    Skill(String),
    /// Change the speaker's language preference
    SetLanguage,
    /// Hand the query to the fallback conversational skill
    Fallback,
    /// Replay the last question
    Repeat,
    /// Affirmative answer
    Yes,
    /// Anything else
    Other(String),
}

impl Action {
    pub fn decode(action: &str) -> Self {
        match action.trim() {
            "" => Self::None,
            "format" => Self::Format,
            "set-language" => Self::SetLanguage,
            "fallback" => Self::Fallback,
            "repeat" => Self::Repeat,
            "yes" => Self::Yes,
            other => match other.strip_prefix("skill.") {
                Some(skill) if !skill.is_empty() => Self::Skill(skill.to_string()),
                _ => Self::Other(other.to_string()),
            },
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("none"),
            Self::Format => f.write_str("format"),
            Self::Skill(skill) => write!(f, "skill.{}", skill),
            Self::SetLanguage => f.write_str("set-language"),
            Self::Fallback => f.write_str("fallback"),
            Self::Repeat => f.write_str("repeat"),
            Self::Yes => f.write_str("yes"),
            Self::Other(action) => f.write_str(action),
        }
    }
}

/// Substitute `{name}` placeholders from `params`
///
/// `{query}` falls back to `query` when the parameters do not set it.
/// Unknown placeholders are left as written.
pub fn render(template: &str, params: &HashMap<String, String>, query: &str) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];

        let Some(close) = after.find('}') else {
            out.push_str(&rest[open..]);
            return out;
        };

        let name = &after[..close];
        match params.get(name) {
            Some(value) => out.push_str(value),
            None if name == "query" => out.push_str(query),
            None => {
                out.push('{');
                out.push_str(name);
                out.push('}');
            }
        }
        rest = &after[close + 1..];
    }

    out.push_str(rest);
    out
}
