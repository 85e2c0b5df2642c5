use once_cell::sync::Lazy;
use regex::{Captures, Regex};

/// API key supplied for the current session only. Never persisted.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionCredential(String);

impl SessionCredential {
    /// Returns `None` for blank input, which keeps the session in its gating state.
    pub fn from_input(input: &str) -> Option<Self> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for SessionCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "***redacted***")
    }
}

static REDACTION_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r"(?i)(api[_-]?key\s*[:=]\s*)([A-Za-z0-9\-_.+/]+)")
            .expect("invalid api_key regex"),
        Regex::new(r"(?i)(bearer\s+)([A-Za-z0-9\-_.+=/]+)").expect("invalid bearer regex"),
        Regex::new(r"\b(sk-[A-Za-z0-9\-_*]{4,})").expect("invalid sk_token regex"),
    ]
});

/// Mask anything that looks like a credential before it reaches logs or the page.
pub fn redact_secrets(input: &str) -> String {
    let mut output = input.to_string();
    for regex in REDACTION_PATTERNS.iter() {
        output = regex
            .replace_all(&output, |caps: &Captures| {
                if caps.len() > 2 {
                    format!("{}[REDACTED]", &caps[1])
                } else {
                    "[REDACTED]".to_string()
                }
            })
            .to_string();
    }
    output
}
