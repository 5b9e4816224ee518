//! Keyboard layouts and the captions/callback data they carry.

use crate::core::styles::StyleMode;
use crate::infrastructure::traits::Keyboard;

pub const LAUNCH: &str = "🚀 Launch";
pub const CHANGE_STYLE: &str = "💡 Change style";
pub const PLANS: &str = "💳 Plans";
pub const RULES: &str = "📜 Rules";
pub const SUPPORT: &str = "🛠 Support";
pub const NEW_CONVERSATION: &str = "🧹 New conversation";
pub const MAIN_MENU: &str = "⬅️ Main menu";

/// Callback data of the inline "show plans" button.
pub const PLANS_CALLBACK: &str = "plans";
/// Callback data prefix of the style picker, followed by the style label.
pub const STYLE_CALLBACK_PREFIX: &str = "style:";

pub fn launch() -> Keyboard {
    Keyboard::Menu(vec![vec![LAUNCH.to_owned()]])
}

pub fn main_menu() -> Keyboard {
    Keyboard::Menu(vec![
        vec![CHANGE_STYLE.to_owned(), PLANS.to_owned()],
        vec![NEW_CONVERSATION.to_owned()],
        vec![RULES.to_owned(), SUPPORT.to_owned()],
    ])
}

pub fn style_picker() -> Keyboard {
    Keyboard::Actions(
        StyleMode::ALL
            .into_iter()
            .map(|mode| {
                (
                    mode.caption(),
                    format!("{STYLE_CALLBACK_PREFIX}{}", mode.label()),
                )
            })
            .collect(),
    )
}

pub fn renew() -> Keyboard {
    Keyboard::Actions(vec![(PLANS.to_owned(), PLANS_CALLBACK.to_owned())])
}
