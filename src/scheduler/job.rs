//! Job definitions for the dining request queue.
//!
//! This module defines the types that travel through the queue:
//!
//! - `DiningJob`: A normalized dining request
//! - `QueueMessage`: One delivery of a message, with its receipt handle

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::JobError;

/// Accepted spellings for each canonical field, compared case-insensitively.
const LOCATION_KEYS: &[&str] = &["location"];
const CUISINE_KEYS: &[&str] = &["cuisine"];
const DINING_TIME_KEYS: &[&str] = &["diningTime", "time"];
const PARTY_SIZE_KEYS: &[&str] = &["partySize", "numberOfPeople", "people"];
const EMAIL_KEYS: &[&str] = &["email", "destinationAddress"];

/// A normalized dining request.
///
/// Serializes to the canonical queue schema
/// `{ location, cuisine, diningTime, partySize, email }`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiningJob {
    /// Neighbourhood or city the diner asked about.
    pub location: String,
    /// Requested cuisine category.
    pub cuisine: String,
    /// Free-text dining time.
    pub dining_time: String,
    /// Number of people in the party.
    pub party_size: String,
    /// Address the recommendations are sent to.
    pub email: String,
}

impl DiningJob {
    /// Creates a job with the two fields the worker requires.
    pub fn new(cuisine: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            cuisine: cuisine.into(),
            email: email.into(),
            ..Self::default()
        }
    }

    /// Sets the location.
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = location.into();
        self
    }

    /// Sets the dining time.
    pub fn with_dining_time(mut self, dining_time: impl Into<String>) -> Self {
        self.dining_time = dining_time.into();
        self
    }

    /// Sets the party size.
    pub fn with_party_size(mut self, party_size: impl Into<String>) -> Self {
        self.party_size = party_size.into();
        self
    }

    /// Parses a queue message body, normalizing field aliases and casing.
    ///
    /// Unknown keys are ignored and absent keys become empty strings; use
    /// [`DiningJob::validate`] to check the fields the worker requires.
    pub fn from_message_body(body: &str) -> Result<Self, JobError> {
        let value: Value = serde_json::from_str(body)?;
        let object = value.as_object().ok_or(JobError::NotAnObject)?;

        Ok(Self {
            location: lookup_field(object, LOCATION_KEYS),
            cuisine: lookup_field(object, CUISINE_KEYS),
            dining_time: lookup_field(object, DINING_TIME_KEYS),
            party_size: lookup_field(object, PARTY_SIZE_KEYS),
            email: lookup_field(object, EMAIL_KEYS),
        })
    }

    /// Serializes the job into the canonical message body.
    pub fn to_message_body(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Checks the fields the worker cannot do without.
    pub fn validate(&self) -> Result<(), JobError> {
        if self.cuisine.is_empty() {
            return Err(JobError::MissingField("cuisine"));
        }
        if self.email.is_empty() {
            return Err(JobError::MissingField("email"));
        }
        Ok(())
    }

    /// Returns whether every field carries a value.
    pub fn is_complete(&self) -> bool {
        [
            &self.location,
            &self.cuisine,
            &self.dining_time,
            &self.party_size,
            &self.email,
        ]
        .iter()
        .all(|field| !field.is_empty())
    }
}

/// Finds the first key matching one of `aliases` and renders it as a trimmed string.
fn lookup_field(object: &Map<String, Value>, aliases: &[&str]) -> String {
    aliases
        .iter()
        .find_map(|alias| {
            object
                .iter()
                .find(|(key, _)| key.eq_ignore_ascii_case(alias))
                .map(|(_, value)| value)
        })
        .map(|value| match value {
            Value::String(s) => s.trim().to_string(),
            Value::Number(n) => n.to_string(),
            _ => String::new(),
        })
        .unwrap_or_default()
}

/// One delivery of a queued message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueMessage {
    /// Stable identifier of the message across redeliveries.
    pub message_id: String,
    /// Handle that acknowledges this particular delivery.
    pub receipt_handle: String,
    /// Raw message body.
    pub body: String,
    /// How many times the message has been received, including this one.
    pub receive_count: u32,
}

impl QueueMessage {
    /// Creates a first delivery of a message.
    pub fn new(
        message_id: impl Into<String>,
        receipt_handle: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            message_id: message_id.into(),
            receipt_handle: receipt_handle.into(),
            body: body.into(),
            receive_count: 1,
        }
    }

    /// Sets the receive count.
    pub fn with_receive_count(mut self, count: u32) -> Self {
        self.receive_count = count;
        self
    }

    /// Returns whether this delivery is a redelivery.
    pub fn is_redelivery(&self) -> bool {
        self.receive_count > 1
    }
}
