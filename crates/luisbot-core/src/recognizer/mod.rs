//! Recognizers turn an inbound activity into intents and entities.

pub mod luis;

use async_trait::async_trait;

use crate::error::RecognizerError;
use crate::types::{Activity, RecognitionResult};

pub use luis::LuisRecognizer;

#[async_trait]
pub trait Recognizer: Send + Sync {
    async fn recognize(&self, activity: &Activity) -> Result<RecognitionResult, RecognizerError>;
}
