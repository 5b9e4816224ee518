//! Telegram front end: long polling, intent routing and hand-off to the core.

use crate::core::errors::CoreError;
use crate::core::services::InfoTopic;
use crate::core::traits::ConversationService;
use crate::infrastructure::entities::UserId;
use di::Ref;
use log::{debug, info, warn};
use teloxide::dispatching::{Dispatcher, UpdateFilterExt};
use teloxide::error_handlers::LoggingErrorHandler;
use teloxide::prelude::*;
use teloxide::types::Update;

pub mod intents;

use intents::{Intent, route_callback, route_text};

/// Polls Telegram until ctrl-c.
pub async fn run(bot: Bot, conversations: Ref<dyn ConversationService>) {
    let handler = dptree::entry()
        .branch(Update::filter_message().endpoint(message_handler))
        .branch(Update::filter_callback_query().endpoint(callback_handler));

    info!("starting telegram dispatcher");

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![conversations])
        .default_handler(|update| async move {
            debug!("unhandled update: {:?}", update.kind);
        })
        .error_handler(LoggingErrorHandler::with_custom_text(
            "error in telegram handler",
        ))
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    info!("telegram dispatcher stopped");
}

async fn message_handler(
    msg: Message,
    conversations: Ref<dyn ConversationService>,
) -> ResponseResult<()> {
    let user_id = UserId(msg.chat.id.0);

    let Some(text) = msg.text() else {
        debug!("ignoring non-text message from {user_id}");
        return Ok(());
    };

    dispatch(conversations.as_ref(), user_id, route_text(text)).await;
    Ok(())
}

async fn callback_handler(
    bot: Bot,
    query: CallbackQuery,
    conversations: Ref<dyn ConversationService>,
) -> ResponseResult<()> {
    bot.answer_callback_query(query.id.clone()).await?;

    let user_id = UserId(
        query
            .message
            .as_ref()
            .map(|message| message.chat().id.0)
            .unwrap_or(query.from.id.0 as i64),
    );

    match query.data.as_deref().and_then(route_callback) {
        Some(intent) => dispatch(conversations.as_ref(), user_id, intent).await,
        None => debug!("ignoring callback {:?} from {user_id}", query.data),
    }

    Ok(())
}

pub async fn dispatch(conversations: &dyn ConversationService, user_id: UserId, intent: Intent) {
    debug!("{user_id}: {intent:?}");

    let result = match intent {
        Intent::SelectStyle(mode) => conversations.change_style(user_id, &mode).await.map(|_| ()),
        Intent::ResetHistory => conversations.reset_history(user_id).await,
        Intent::ResetTrial(Some(target)) => {
            conversations.reset_trial(user_id, target).await.map(|_| ())
        }
        Intent::Prompt(text) => {
            let outcome = conversations.handle_prompt(user_id, &text).await;
            debug!("{user_id}: {outcome:?}");
            Ok(())
        }
        Intent::Start => {
            conversations.start(user_id).await;
            Ok(())
        }
        Intent::Launch => {
            conversations.launch(user_id).await;
            Ok(())
        }
        Intent::ChangeStyle => {
            conversations.choose_style(user_id).await;
            Ok(())
        }
        Intent::Tariffs => {
            conversations.offer_plans(user_id).await;
            Ok(())
        }
        Intent::Rules => inform(conversations, user_id, InfoTopic::Rules).await,
        Intent::Support => inform(conversations, user_id, InfoTopic::Support).await,
        Intent::MainMenu => inform(conversations, user_id, InfoTopic::MainMenu).await,
        Intent::WhoAreYou => inform(conversations, user_id, InfoTopic::BotName).await,
        Intent::ResetTrial(None) => {
            inform(conversations, user_id, InfoTopic::ResetTrialUsage).await
        }
    };

    match result {
        // Already answered with a notice.
        Ok(()) | Err(CoreError::UnknownStyle(_)) | Err(CoreError::NotAdmin(_)) => {}
        Err(e) => warn!("handling request of {user_id} failed: {e}"),
    }
}

async fn inform(
    conversations: &dyn ConversationService,
    user_id: UserId,
    topic: InfoTopic,
) -> Result<(), CoreError> {
    conversations.info(user_id, topic).await;
    Ok(())
}
