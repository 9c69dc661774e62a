use serde::{Deserialize, Serialize};

/// A single completion request: an optional system instruction plus the user turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prompt {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    pub user: String,
}

impl Prompt {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            system: None,
            user: text.into(),
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    /// The system instruction, or an empty string when none was set.
    pub fn system_text(&self) -> &str {
        self.system.as_deref().unwrap_or("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_sets_system() {
        let prompt = Prompt::user("hello").with_system("be brief");
        assert_eq!(prompt.user, "hello");
        assert_eq!(prompt.system_text(), "be brief");
    }

    #[test]
    fn system_text_defaults_to_empty() {
        assert_eq!(Prompt::user("x").system_text(), "");
    }
}
