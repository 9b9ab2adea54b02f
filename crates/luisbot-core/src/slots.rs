//! Ticket slots pulled out of a recognition result.

use crate::types::Entities;

pub const NUM_TICKETS: &str = "NumTickets";
pub const ORIGIN: &str = "Origin";
pub const DESTINATION: &str = "Destination";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Slots {
    pub num_tickets: String,
    pub origin: String,
    pub destination: String,
}

impl Slots {
    /// First value per key wins. Missing keys stay empty.
    pub fn from_entities(entities: &Entities) -> Self {
        let first = |key: &str| {
            entities
                .first(key)
                .map(|v| v.text.clone())
                .unwrap_or_default()
        };
        Self {
            num_tickets: first(NUM_TICKETS),
            origin: first(ORIGIN),
            destination: first(DESTINATION),
        }
    }
}

/// `Entity: {type}, Score: {score}.` for the first of Origin, Destination,
/// NumTickets that has a value; empty when none do.
pub fn describe_first_entity(entities: &Entities) -> String {
    [ORIGIN, DESTINATION, NUM_TICKETS]
        .iter()
        .find_map(|key| entities.first(key))
        .map(|v| {
            let score = v.score.map(|s| s.to_string()).unwrap_or_default();
            format!("Entity: {}, Score: {}.", v.entity_type, score)
        })
        .unwrap_or_default()
}
