//! Maps incoming text and button callbacks to what the user wants.

use crate::core::menus;
use crate::infrastructure::entities::UserId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    Start,
    Launch,
    /// Show the style picker.
    ChangeStyle,
    SelectStyle(String),
    Tariffs,
    Rules,
    Support,
    MainMenu,
    ResetHistory,
    /// Admin only. `None` when the target id is missing or malformed.
    ResetTrial(Option<UserId>),
    WhoAreYou,
    Prompt(String),
}

/// Reply keyboard captions. Matched exactly, after trimming.
const CAPTIONS: [(&str, Intent); 7] = [
    (menus::LAUNCH, Intent::Launch),
    (menus::CHANGE_STYLE, Intent::ChangeStyle),
    (menus::PLANS, Intent::Tariffs),
    (menus::RULES, Intent::Rules),
    (menus::SUPPORT, Intent::Support),
    (menus::NEW_CONVERSATION, Intent::ResetHistory),
    (menus::MAIN_MENU, Intent::MainMenu),
];

const NAME_QUESTIONS: [&str; 4] = [
    "who are you",
    "what is your name",
    "what's your name",
    "what are you",
];

pub fn route_text(text: &str) -> Intent {
    let text = text.trim();

    if let Some(command) = text.strip_prefix('/') {
        if let Some(intent) = route_command(command) {
            return intent;
        }
    }

    if let Some((_, intent)) = CAPTIONS.iter().find(|(caption, _)| *caption == text) {
        return intent.clone();
    }

    let question = text
        .trim_end_matches(['?', '!', '.'])
        .trim()
        .to_lowercase();
    if NAME_QUESTIONS.contains(&question.as_str()) {
        return Intent::WhoAreYou;
    }

    Intent::Prompt(text.to_owned())
}

/// `None` for commands this bot doesn't know; those are treated as prompts.
fn route_command(command: &str) -> Option<Intent> {
    let (name, argument) = match command.split_once(char::is_whitespace) {
        Some((name, argument)) => (name, argument.trim()),
        None => (command, ""),
    };
    // Group chats address commands as `/name@bot`.
    let name = name.split('@').next().unwrap_or(name);

    let intent = match name {
        "start" => Intent::Start,
        "tariffs" | "plans" => Intent::Tariffs,
        "style" if argument.is_empty() => Intent::ChangeStyle,
        "style" => Intent::SelectStyle(argument.to_owned()),
        "reset" => Intent::ResetHistory,
        "rules" => Intent::Rules,
        "support" => Intent::Support,
        "menu" => Intent::MainMenu,
        "reset_trial" => Intent::ResetTrial(argument.parse().ok()),
        _ => return None,
    };

    Some(intent)
}

pub fn route_callback(data: &str) -> Option<Intent> {
    if data == menus::PLANS_CALLBACK {
        return Some(Intent::Tariffs);
    }

    data.strip_prefix(menus::STYLE_CALLBACK_PREFIX)
        .map(|mode| Intent::SelectStyle(mode.to_owned()))
}
