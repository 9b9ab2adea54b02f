//! luisbot-core — single-turn LUIS bot logic, no transport.
//!
//! An inbound [`types::Activity`] goes through [`handler::TurnHandler`], which
//! asks a [`recognizer::Recognizer`] for intents and entities and writes its
//! replies to a [`channel::MessageSink`]. Hosts (the web server, tests) supply
//! the sink and the cancellation token.

pub mod channel;
pub mod config;
pub mod error;
pub mod handler;
pub mod recognizer;
pub mod services;
pub mod slots;
pub mod types;
