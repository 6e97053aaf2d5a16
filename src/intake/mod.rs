//! Dialog intake.
//!
//! The conversational front end calls intake after every turn with the
//! current slot values. Once all five slots are filled the request is
//! normalized into a [`DiningJob`] and enqueued. Either way the dialog is
//! handed back to the bot with a `Delegate` action so it keeps prompting or
//! closes the conversation on its own.

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::error::IntakeError;
use crate::scheduler::{DiningJob, JobQueue};

/// Slot names, in the order the bot asks for them.
pub const REQUIRED_SLOTS: [&str; 5] = [
    "Location",
    "Cuisine",
    "DiningTime",
    "NumberOfPeople",
    "Email",
];

/// Action the bot should take next.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DialogAction {
    #[serde(rename = "type")]
    pub action_type: String,
}

/// Session state returned to the bot.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    pub dialog_action: DialogAction,
    pub intent: Value,
}

/// Response returned to the bot after every turn.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DialogResponse {
    pub session_state: SessionState,
}

impl DialogResponse {
    /// Lets the bot decide the next step, echoing the intent back unchanged.
    pub fn delegate(intent: Value) -> Self {
        Self {
            session_state: SessionState {
                dialog_action: DialogAction {
                    action_type: "Delegate".to_string(),
                },
                intent,
            },
        }
    }
}

/// Result of one intake turn.
#[derive(Debug, Clone, PartialEq)]
pub struct IntakeResult {
    /// What to send back to the bot.
    pub response: DialogResponse,
    /// Queue message id, when the turn completed the request.
    pub message_id: Option<String>,
}

/// Applies one dialog event, enqueueing a job once every slot is filled.
pub async fn handle_dialog_event(
    event: &Value,
    queue: &dyn JobQueue,
) -> Result<IntakeResult, IntakeError> {
    let intent = event
        .pointer("/sessionState/intent")
        .cloned()
        .ok_or_else(|| IntakeError::MalformedEvent("missing sessionState.intent".to_string()))?;
    let slots = intent
        .get("slots")
        .and_then(Value::as_object)
        .ok_or_else(|| IntakeError::MalformedEvent("missing intent slots".to_string()))?;

    let values = REQUIRED_SLOTS.map(|name| slots.get(name).and_then(slot_value));

    let [Some(location), Some(cuisine), Some(dining_time), Some(party_size), Some(email)] = values
    else {
        debug!("Dialog incomplete, delegating");
        return Ok(IntakeResult {
            response: DialogResponse::delegate(intent),
            message_id: None,
        });
    };

    let job = DiningJob::new(cuisine, email)
        .with_location(location)
        .with_dining_time(dining_time)
        .with_party_size(party_size);
    let message_id = queue.send(&job.to_message_body()?).await?;

    info!(
        message_id = %message_id,
        cuisine = %job.cuisine,
        "Dining request enqueued"
    );

    Ok(IntakeResult {
        response: DialogResponse::delegate(intent),
        message_id: Some(message_id),
    })
}

/// Extracts a slot's interpreted value; unfilled slots are `null`.
fn slot_value(slot: &Value) -> Option<String> {
    slot.pointer("/value/interpretedValue")
        .and_then(|v| match v {
            Value::String(s) => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
        .filter(|s| !s.is_empty())
}
