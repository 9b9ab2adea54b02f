//! The turn handler: one inbound activity in, zero or more replies out.
//!
//! A handler is cheap to build and holds no per-conversation state; the host
//! builds one per turn from the shared [`BotServices`].

use std::future::Future;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::channel::MessageSink;
use crate::config::{HandlerSettings, LUIS_KEY};
use crate::error::{SetupError, TurnError};
use crate::recognizer::Recognizer;
use crate::services::BotServices;
use crate::slots::{describe_first_entity, Slots};
use crate::types::{Activity, ActivityType, RecognitionResult};

/// Intent name LUIS uses when nothing matched.
pub const NONE_INTENT: &str = "None";

pub const WELCOME_TEXT: &str = "This bot will introduce you to natural language processing with LUIS. Type an utterance to get started";

pub const HELP_TEXT: &str = "No LUIS intents were found.\n\
This sample is about identifying two user intents:\n\
'Calendar.Add'\n\
'Calendar.Find'\n\
Try typing 'Add Event' or 'Show me tomorrow'.";

pub struct TurnHandler {
    recognizer: Arc<dyn Recognizer>,
    settings: HandlerSettings,
}

impl TurnHandler {
    /// Fails when no services were given or none is registered under
    /// [`LUIS_KEY`].
    pub fn new(
        services: Option<Arc<BotServices>>,
        settings: HandlerSettings,
    ) -> Result<Self, SetupError> {
        let services = services.ok_or(SetupError::MissingServices)?;
        let recognizer = services
            .recognizer(LUIS_KEY)
            .ok_or_else(|| SetupError::MissingRecognizer {
                key: LUIS_KEY.to_string(),
            })?;
        Ok(Self {
            recognizer,
            settings,
        })
    }

    pub async fn handle_turn(
        &self,
        activity: &Activity,
        sink: &dyn MessageSink,
        cancel: &CancellationToken,
    ) -> Result<(), TurnError> {
        match &activity.activity_type {
            ActivityType::Message => self.on_message(activity, sink, cancel).await,
            ActivityType::ConversationUpdate => send_welcome(activity, sink, cancel).await,
            other => send(sink, cancel, &format!("{} event detected", other)).await,
        }
    }

    async fn on_message(
        &self,
        activity: &Activity,
        sink: &dyn MessageSink,
        cancel: &CancellationToken,
    ) -> Result<(), TurnError> {
        let result = until_cancelled(cancel, self.recognizer.recognize(activity)).await?;

        let top = match result.top_intent() {
            Some(intent) if intent.name != NONE_INTENT => intent,
            _ => {
                debug!("No intent recognized for {:?}", activity.text());
                return send(sink, cancel, HELP_TEXT).await;
            }
        };

        info!("Top intent: {} ({})", top.name, top.score);
        send(
            sink,
            cancel,
            &format!("==>LUIS Top Scoring Intent: {}, Score: {}\n", top.name, top.score),
        )
        .await?;

        let slots = if top.name == self.settings.reservation_intent {
            Slots::from_entities(&result.entities)
        } else {
            Slots::default()
        };
        debug!(
            "Entities: {:?} -> slots {:?}",
            result.entities.names().collect::<Vec<_>>(),
            slots
        );
        send(
            sink,
            cancel,
            &format!(
                "==>LUIS Info for {} tickets\tfrom {} to {}\n",
                slots.num_tickets, slots.origin, slots.destination
            ),
        )
        .await?;

        if self.settings.report_entities {
            send(sink, cancel, &entity_report(&result)).await?;
        }
        Ok(())
    }
}

fn entity_report(result: &RecognitionResult) -> String {
    let found = describe_first_entity(&result.entities);
    if found.is_empty() {
        "==>No LUIS Entities Found.\n".to_string()
    } else {
        format!("==>LUIS Entity Found: {}\n", found)
    }
}

/// Greet every added member except the bot itself.
async fn send_welcome(
    activity: &Activity,
    sink: &dyn MessageSink,
    cancel: &CancellationToken,
) -> Result<(), TurnError> {
    let bot_id = activity.recipient_id();
    for member in &activity.members_added {
        if Some(member.id.as_str()) == bot_id {
            continue;
        }
        info!("Welcoming member {}", member.id);
        let name = member.name.as_deref().unwrap_or("");
        send(
            sink,
            cancel,
            &format!("Welcome to LuisBot {}. {}", name, WELCOME_TEXT),
        )
        .await?;
    }
    Ok(())
}

async fn send(sink: &dyn MessageSink, cancel: &CancellationToken, text: &str) -> Result<(), TurnError> {
    until_cancelled(cancel, sink.send_message(text)).await
}

async fn until_cancelled<T, E>(
    cancel: &CancellationToken,
    fut: impl Future<Output = Result<T, E>>,
) -> Result<T, TurnError>
where
    TurnError: From<E>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(TurnError::Cancelled),
        result = fut => Ok(result?),
    }
}
