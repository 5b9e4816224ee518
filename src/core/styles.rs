//! Persona presets a user can switch between.

use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StyleMode {
    Psychologist,
    Copywriter,
    Humorist,
    Business,
    Philosopher,
    Professor,
    Street,
    Storyteller,
}

impl StyleMode {
    pub const ALL: [StyleMode; 8] = [
        StyleMode::Psychologist,
        StyleMode::Copywriter,
        StyleMode::Humorist,
        StyleMode::Business,
        StyleMode::Philosopher,
        StyleMode::Professor,
        StyleMode::Street,
        StyleMode::Storyteller,
    ];

    /// Persisted key and user-facing name.
    pub fn label(self) -> &'static str {
        match self {
            StyleMode::Psychologist => "psychologist",
            StyleMode::Copywriter => "copywriter",
            StyleMode::Humorist => "humorist",
            StyleMode::Business => "business",
            StyleMode::Philosopher => "philosopher",
            StyleMode::Professor => "professor",
            StyleMode::Street => "street",
            StyleMode::Storyteller => "storyteller",
        }
    }

    pub fn system_prompt(self) -> &'static str {
        match self {
            StyleMode::Psychologist => {
                "You are an attentive and empathetic psychologist. Speak with care, gently and supportively."
            }
            StyleMode::Copywriter => {
                "You are a professional copywriter. Write vividly, engagingly and persuasively."
            }
            StyleMode::Humorist => {
                "You are a witty companion with a great sense of humour. Answer with sarcasm and jokes."
            }
            StyleMode::Business => {
                "You are a business assistant. Answer strictly to the point, formally and without emotion."
            }
            StyleMode::Philosopher => {
                "You are a wise philosopher. Speak deeply, reason and inspire."
            }
            StyleMode::Professor => {
                "You are a professor. Explain in detail, academically and with examples."
            }
            StyleMode::Street => {
                "You are a street kid from the nineties. Talk boldly, with street slang and attitude."
            }
            StyleMode::Storyteller => {
                "You are a storyteller. Turn every answer into an engaging story."
            }
        }
    }

    /// Lower-case fragments that mark a prompt as off-style for this mode.
    pub fn blocklist(self) -> &'static [&'static str] {
        match self {
            StyleMode::Copywriter => &["psycholog", "depress", "emotional support", "anxiety"],
            StyleMode::Business => &["humor", "humour", "joke", "prank"],
            StyleMode::Street => &["academic", "scientific", "professor"],
            StyleMode::Professor => &["joke", "street", "slang"],
            _ => &[],
        }
    }

    /// Case-insensitive lookup by label.
    pub fn parse(requested: &str) -> Option<StyleMode> {
        let requested = requested.trim().to_lowercase();
        StyleMode::ALL
            .into_iter()
            .find(|mode| mode.label() == requested)
    }

    /// Label with a capital first letter, as shown on buttons.
    pub fn caption(self) -> String {
        let label = self.label();
        let mut chars = label.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect(),
            None => String::new(),
        }
    }
}

impl Default for StyleMode {
    fn default() -> Self {
        StyleMode::Copywriter
    }
}

impl Display for StyleMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// `false` when the prompt contains any of the mode's blocked fragments.
pub fn filter_by_style(mode: StyleMode, prompt_text: &str) -> bool {
    let prompt = prompt_text.to_lowercase();
    !mode
        .blocklist()
        .iter()
        .any(|fragment| prompt.contains(fragment))
}
