//! User-facing message templates.

use di::{inject, injectable};
use log::error;
use minijinja::{Environment, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Notice {
    Greeting,
    Launch,
    MainMenu,
    ChooseStyle,
    StyleChanged,
    UnknownStyle,
    StyleViolation,
    TrialExpired,
    TokenLimitExceeded,
    SubscriptionExpired,
    ExpiringSoon,
    Activated,
    Plans,
    PlansUnavailable,
    CompletionError,
    Rules,
    Support,
    BotName,
    HistoryCleared,
    TrialReset,
    TrialResetMissing,
    AdminOnly,
    ResetTrialUsage,
}

impl Notice {
    const ALL: [Notice; 23] = [
        Notice::Greeting,
        Notice::Launch,
        Notice::MainMenu,
        Notice::ChooseStyle,
        Notice::StyleChanged,
        Notice::UnknownStyle,
        Notice::StyleViolation,
        Notice::TrialExpired,
        Notice::TokenLimitExceeded,
        Notice::SubscriptionExpired,
        Notice::ExpiringSoon,
        Notice::Activated,
        Notice::Plans,
        Notice::PlansUnavailable,
        Notice::CompletionError,
        Notice::Rules,
        Notice::Support,
        Notice::BotName,
        Notice::HistoryCleared,
        Notice::TrialReset,
        Notice::TrialResetMissing,
        Notice::AdminOnly,
        Notice::ResetTrialUsage,
    ];

    fn name(self) -> &'static str {
        match self {
            Notice::Greeting => "greeting",
            Notice::Launch => "launch",
            Notice::MainMenu => "main_menu",
            Notice::ChooseStyle => "choose_style",
            Notice::StyleChanged => "style_changed",
            Notice::UnknownStyle => "unknown_style",
            Notice::StyleViolation => "style_violation",
            Notice::TrialExpired => "trial_expired",
            Notice::TokenLimitExceeded => "token_limit_exceeded",
            Notice::SubscriptionExpired => "subscription_expired",
            Notice::ExpiringSoon => "expiring_soon",
            Notice::Activated => "activated",
            Notice::Plans => "plans",
            Notice::PlansUnavailable => "plans_unavailable",
            Notice::CompletionError => "completion_error",
            Notice::Rules => "rules",
            Notice::Support => "support",
            Notice::BotName => "bot_name",
            Notice::HistoryCleared => "history_cleared",
            Notice::TrialReset => "trial_reset",
            Notice::TrialResetMissing => "trial_reset_missing",
            Notice::AdminOnly => "admin_only",
            Notice::ResetTrialUsage => "reset_trial_usage",
        }
    }

    fn source(self) -> &'static str {
        match self {
            Notice::Greeting => {
                "Hi! I'm {{ bot_name }}, your AI assistant 🤖\n\nPress «🚀 Launch» below to get started."
            }
            Notice::Launch => "Ready to work! How can I help? 😉",
            Notice::MainMenu => "Main menu:",
            Notice::ChooseStyle => "Choose a conversation style:",
            Notice::StyleChanged => "✅ Conversation style changed to: {{ style }}",
            Notice::UnknownStyle => {
                "❌ Unknown style «{{ requested }}». Available styles: {{ available | join(', ') }}."
            }
            Notice::StyleViolation => {
                "⚠️ Current style: {{ style }}.\nThis request does not match the selected style.\nPick another style first."
            }
            Notice::TrialExpired => {
                "⛔ Your free trial has ended{% if limit == 'tokens' %}: the {{ token_limit }}-character allowance is used up{% endif %}.\n\nChoose a plan to continue:"
            }
            Notice::TokenLimitExceeded => {
                "⛔ You have used up the allowance of your plan. Please renew your subscription."
            }
            Notice::SubscriptionExpired => {
                "⛔ Your plan has expired. Please choose a new plan to continue."
            }
            Notice::ExpiringSoon => {
                "⚠️ Your plan ends within {{ hours }} hours ({{ expires_at }} UTC). Don't forget to renew."
            }
            Notice::Activated => {
                "✅ Payment received! Plan {{ plan }} is active until {{ expires_at }} UTC."
            }
            Notice::Plans => "📦 Choose a plan:",
            Notice::PlansUnavailable => {
                "Payments are temporarily unavailable. Please try again later."
            }
            Notice::CompletionError => {
                "⚠️ Something went wrong while generating the answer. Please try again later."
            }
            Notice::Rules => {
                "Rules of {{ bot_name }}:\n\n✅ Free trial: {{ trial_hours }} hours or {{ token_limit }} characters, whichever comes first.\n\n❌ Forbidden: requests that break the law; violence, terrorism, extremism, pornography, discrimination, fraud.\n\n⚠️ The model can make mistakes. Answers are not the final word.\n\nThank you for choosing {{ bot_name }}!"
            }
            Notice::Support => {
                "🛠 Support\n\nIf you have questions or problems, contact the developer:\n\nTelegram: @neiro_max\nEmail: support@neiro-max.ai"
            }
            Notice::BotName => "I'm {{ bot_name }}, your personal AI assistant 😉",
            Notice::HistoryCleared => "🧹 Conversation history cleared.",
            Notice::TrialReset => "✅ Trial access reset for chat {{ target }}.",
            Notice::TrialResetMissing => "Chat {{ target }} has no trial to reset.",
            Notice::AdminOnly => "This command is available to the administrator only.",
            Notice::ResetTrialUsage => "❌ Send the numeric chat id: /reset_trial <chat id>",
        }
    }
}

pub struct Notices {
    env: Environment<'static>,
}

#[injectable]
impl Notices {
    #[inject]
    pub fn new() -> Notices {
        let mut env = Environment::new();
        for notice in Notice::ALL {
            if let Err(e) = env.add_template(notice.name(), notice.source()) {
                error!("notice template {} is invalid: {e}", notice.name());
            }
        }
        Notices { env }
    }
}

impl Default for Notices {
    fn default() -> Self {
        Notices::new()
    }
}

impl Notices {
    pub fn render(&self, notice: Notice, ctx: Value) -> Result<String, minijinja::Error> {
        self.env.get_template(notice.name())?.render(ctx)
    }

    /// Renders, falling back to the raw template name when rendering fails.
    pub fn text(&self, notice: Notice, ctx: Value) -> String {
        self.render(notice, ctx).unwrap_or_else(|e| {
            error!("failed to render notice {}: {e}", notice.name());
            notice.name().to_owned()
        })
    }
}
