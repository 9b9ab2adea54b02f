//! LUIS prediction client over reqwest. Supports the v2 and v3 endpoints and
//! normalizes both into a [`RecognitionResult`].

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, error, info};

use super::Recognizer;
use crate::config::{LuisApiVersion, LuisServiceConfig};
use crate::error::RecognizerError;
use crate::types::{Activity, Entities, EntityValue, Intent, RecognitionResult};

/// Max chars of an error body kept in logs and errors.
const MAX_ERROR_BODY: usize = 500;

pub struct LuisRecognizer {
    config: LuisServiceConfig,
    client: reqwest::Client,
}

impl LuisRecognizer {
    pub fn new(config: LuisServiceConfig) -> Result<Self, RecognizerError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;
        Ok(Self { config, client })
    }

    pub fn app_id(&self) -> &str {
        &self.config.app_id
    }

    /// Prediction URL without query parameters.
    pub fn prediction_url(&self) -> String {
        let base = self.config.endpoint.trim_end_matches('/');
        match self.config.api_version {
            LuisApiVersion::V2 => format!("{}/luis/v2.0/apps/{}", base, self.config.app_id),
            LuisApiVersion::V3 => format!(
                "{}/luis/prediction/v3.0/apps/{}/slots/{}/predict",
                base, self.config.app_id, self.config.slot
            ),
        }
    }

    async fn predict_v2(&self, text: &str) -> Result<RecognitionResult, RecognizerError> {
        let response = self
            .client
            .get(self.prediction_url())
            .query(&[
                ("verbose", "true"),
                ("subscription-key", self.config.subscription_key.as_str()),
                ("q", text),
            ])
            .send()
            .await?;

        let body = read_success_body(response).await?;
        let parsed: V2Response =
            serde_json::from_str(&body).map_err(|e| RecognizerError::Decode(e.to_string()))?;
        Ok(normalize_v2(text, parsed))
    }

    async fn predict_v3(&self, text: &str) -> Result<RecognitionResult, RecognizerError> {
        let response = self
            .client
            .get(self.prediction_url())
            .header("Ocp-Apim-Subscription-Key", &self.config.subscription_key)
            .query(&[
                ("verbose", "true"),
                ("show-all-intents", "true"),
                ("query", text),
            ])
            .send()
            .await?;

        let body = read_success_body(response).await?;
        let parsed: V3Response =
            serde_json::from_str(&body).map_err(|e| RecognizerError::Decode(e.to_string()))?;
        Ok(normalize_v3(text, parsed))
    }
}

#[async_trait]
impl Recognizer for LuisRecognizer {
    async fn recognize(&self, activity: &Activity) -> Result<RecognitionResult, RecognizerError> {
        let text = activity.text();
        if text.trim().is_empty() {
            debug!("Empty utterance, skipping LUIS call");
            return Ok(RecognitionResult::empty(text));
        }

        info!(
            "LUIS predict: app={} api={:?} chars={}",
            self.config.app_id,
            self.config.api_version,
            text.chars().count()
        );

        match self.config.api_version {
            LuisApiVersion::V2 => self.predict_v2(text).await,
            LuisApiVersion::V3 => self.predict_v3(text).await,
        }
    }
}

async fn read_success_body(response: reqwest::Response) -> Result<String, RecognizerError> {
    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        let truncated: String = body.chars().take(MAX_ERROR_BODY).collect();
        error!("LUIS HTTP {}: {}", status, truncated);
        return Err(RecognizerError::Http {
            status: status.as_u16(),
            body: truncated,
        });
    }
    Ok(body)
}

// ── v2 ──

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct V2Response {
    #[serde(default)]
    query: Option<String>,
    #[serde(default)]
    top_scoring_intent: Option<V2Intent>,
    #[serde(default)]
    intents: Vec<V2Intent>,
    #[serde(default)]
    entities: Vec<V2Entity>,
}

#[derive(Debug, Deserialize)]
struct V2Intent {
    intent: String,
    #[serde(default)]
    score: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct V2Entity {
    entity: String,
    #[serde(rename = "type")]
    entity_type: String,
    #[serde(default)]
    role: Option<String>,
    #[serde(default)]
    start_index: Option<usize>,
    #[serde(default)]
    end_index: Option<usize>,
    #[serde(default)]
    score: Option<f64>,
}

fn normalize_v2(text: &str, response: V2Response) -> RecognitionResult {
    let query = response.query.as_deref().unwrap_or(text);

    let mut intents: Vec<Intent> = response
        .intents
        .into_iter()
        .map(|i| Intent {
            name: i.intent,
            score: i.score.unwrap_or_default(),
        })
        .collect();
    if intents.is_empty() {
        // Non-verbose responses only carry the top intent
        intents.extend(response.top_scoring_intent.map(|i| Intent {
            name: i.intent,
            score: i.score.unwrap_or_default(),
        }));
    }

    let mut entities = Entities::new();
    for e in response.entities {
        // Roles (City as Origin / Destination) key the entity when present
        let name = e.role.clone().filter(|r| !r.is_empty()).unwrap_or_else(|| {
            e.entity_type
                .strip_prefix("builtin.")
                .unwrap_or(e.entity_type.as_str())
                .to_string()
        });
        // LUIS lowercases `entity`; the span keeps the user's casing. Indices
        // are UTF-16 units, so a span that disagrees with `entity` is dropped.
        let value = match (e.start_index, e.end_index) {
            (Some(start), Some(end)) => utterance_span(query, start, end),
            _ => None,
        }
        .filter(|span| span.to_lowercase() == e.entity.to_lowercase())
        .unwrap_or(e.entity);
        entities.push(
            name,
            EntityValue {
                text: value,
                entity_type: e.entity_type,
                score: e.score,
            },
        );
    }

    RecognitionResult {
        text: text.to_string(),
        intents,
        entities,
    }
}

/// Inclusive char-index span of `text`, or `None` when out of range.
fn utterance_span(text: &str, start: usize, end: usize) -> Option<String> {
    if end < start {
        return None;
    }
    let len = end - start + 1;
    let span: String = text.chars().skip(start).take(len).collect();
    (span.chars().count() == len).then_some(span)
}

// ── v3 ──

#[derive(Debug, Deserialize)]
struct V3Response {
    prediction: V3Prediction,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct V3Prediction {
    #[serde(default)]
    top_intent: Option<String>,
    #[serde(default)]
    intents: BTreeMap<String, V3IntentScore>,
    #[serde(default)]
    entities: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct V3IntentScore {
    #[serde(default)]
    score: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct V3Instance {
    #[serde(rename = "type", default)]
    entity_type: Option<String>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    score: Option<f64>,
}

fn normalize_v3(text: &str, response: V3Response) -> RecognitionResult {
    let prediction = response.prediction;

    let mut intents: Vec<Intent> = prediction
        .intents
        .into_iter()
        .map(|(name, s)| Intent {
            name,
            score: s.score.unwrap_or_default(),
        })
        .collect();
    // The service's own pick wins score ties
    if let Some(top) = prediction.top_intent.as_deref() {
        if let Some(pos) = intents.iter().position(|i| i.name == top) {
            let intent = intents.remove(pos);
            intents.insert(0, intent);
        }
    }

    RecognitionResult {
        text: text.to_string(),
        intents,
        entities: decode_v3_entities(&prediction.entities),
    }
}

/// Decode the loosely-typed v3 entity object. Values may be strings, numbers,
/// nested lists (list entities) or objects (machine-learned / datetime); the
/// `$instance` sibling carries type, text and score per value index.
/// Values that yield no text are skipped.
fn decode_v3_entities(raw: &Map<String, Value>) -> Entities {
    let mut entities = Entities::new();

    for (name, value) in raw {
        if name == "$instance" {
            continue;
        }
        let metas = instance_meta(raw, name);
        let values: Vec<&Value> = match value {
            Value::Array(items) => items.iter().collect(),
            other => vec![other],
        };

        for (idx, v) in values.into_iter().enumerate() {
            let meta = metas.get(idx);
            let text = value_text(v).or_else(|| meta.and_then(|m| m.text.clone()));
            let Some(text) = text else {
                debug!("Skipping entity value without text: {}[{}]", name, idx);
                continue;
            };
            entities.push(
                name.clone(),
                EntityValue {
                    text,
                    entity_type: meta
                        .and_then(|m| m.entity_type.clone())
                        .unwrap_or_else(|| name.clone()),
                    score: meta.and_then(|m| m.score),
                },
            );
        }
    }

    entities
}

fn instance_meta(raw: &Map<String, Value>, name: &str) -> Vec<V3Instance> {
    raw.get("$instance")
        .and_then(|i| i.get(name))
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .map(|item| serde_json::from_value(item.clone()).unwrap_or_default())
                .collect()
        })
        .unwrap_or_default()
}

fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Array(items) => items.first().and_then(value_text),
        Value::Object(_) | Value::Null => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn service(endpoint: &str, api_version: LuisApiVersion) -> LuisServiceConfig {
        LuisServiceConfig {
            app_id: "app-1".into(),
            subscription_key: "secret".into(),
            endpoint: endpoint.into(),
            api_version,
            slot: "production".into(),
            timeout_seconds: 5,
        }
    }

    /// Serve exactly one HTTP response; yields the raw request head.
    async fn serve_once(
        status_line: &'static str,
        body: String,
    ) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            let mut chunk = [0u8; 1024];
            while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = socket.read(&mut chunk).await.unwrap();
                if n == 0 {
                    break;
                }
                buf.extend_from_slice(&chunk[..n]);
            }
            let response = format!(
                "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status_line,
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
            String::from_utf8_lossy(&buf).to_string()
        });
        (format!("http://{}", addr), handle)
    }

    #[test]
    fn test_prediction_urls() {
        let v2 = LuisRecognizer::new(service("https://westus.example.com/", LuisApiVersion::V2)).unwrap();
        assert_eq!(v2.prediction_url(), "https://westus.example.com/luis/v2.0/apps/app-1");

        let v3 = LuisRecognizer::new(service("https://westus.example.com", LuisApiVersion::V3)).unwrap();
        assert_eq!(
            v3.prediction_url(),
            "https://westus.example.com/luis/prediction/v3.0/apps/app-1/slots/production/predict"
        );
    }

    #[test]
    fn test_normalize_v2_groups_entities_by_type() {
        let text = "Book 2 tickets from Paris to Rome";
        let response: V2Response = serde_json::from_value(json!({
            "query": text,
            "topScoringIntent": {"intent": "Reservation", "score": 0.97},
            "intents": [
                {"intent": "Reservation", "score": 0.97},
                {"intent": "None", "score": 0.02}
            ],
            "entities": [
                {"entity": "paris", "type": "Origin", "startIndex": 20, "endIndex": 24, "score": 0.91},
                {"entity": "rome", "type": "Destination", "startIndex": 29, "endIndex": 32, "score": 0.88},
                {"entity": "2", "type": "builtin.number", "startIndex": 5, "endIndex": 5}
            ]
        }))
        .unwrap();

        let result = normalize_v2(text, response);
        assert_eq!(result.top_intent().unwrap().name, "Reservation");
        assert_eq!(result.intents.len(), 2);

        let origin = result.entities.first("Origin").unwrap();
        assert_eq!(origin.text, "Paris");
        assert_eq!(origin.score, Some(0.91));
        assert_eq!(result.entities.first("Destination").unwrap().text, "Rome");

        let number = result.entities.first("number").unwrap();
        assert_eq!(number.text, "2");
        assert_eq!(number.entity_type, "builtin.number");
        assert_eq!(number.score, None);
    }

    #[test]
    fn test_normalize_v2_top_intent_only() {
        let response: V2Response = serde_json::from_value(json!({
            "query": "hello",
            "topScoringIntent": {"intent": "Greeting", "score": 0.8}
        }))
        .unwrap();

        let result = normalize_v2("hello", response);
        assert_eq!(result.intents.len(), 1);
        assert_eq!(result.top_intent().unwrap().score, 0.8);
        assert!(result.entities.is_empty());
    }

    #[test]
    fn test_normalize_v2_bad_span_falls_back_to_entity() {
        let response: V2Response = serde_json::from_value(json!({
            "entities": [{"entity": "lima", "type": "Origin", "startIndex": 40, "endIndex": 43}]
        }))
        .unwrap();

        let result = normalize_v2("to lima", response);
        assert_eq!(result.entities.first("Origin").unwrap().text, "lima");
    }

    #[test]
    fn test_normalize_v2_groups_by_role() {
        let text = "from Paris to Rome";
        let response: V2Response = serde_json::from_value(json!({
            "query": text,
            "topScoringIntent": {"intent": "Reservation", "score": 0.9},
            "entities": [
                {"entity": "paris", "type": "City", "role": "Origin", "startIndex": 5, "endIndex": 9, "score": 0.8},
                {"entity": "rome", "type": "City", "role": "Destination", "startIndex": 14, "endIndex": 17, "score": 0.7},
                {"entity": "3", "type": "builtin.number", "role": "", "startIndex": 0, "endIndex": 0}
            ]
        }))
        .unwrap();

        let result = normalize_v2(text, response);
        assert!(result.entities.get("City").is_empty());

        let origin = result.entities.first("Origin").unwrap();
        assert_eq!(origin.text, "Paris");
        assert_eq!(origin.entity_type, "City");
        assert_eq!(result.entities.first("Destination").unwrap().text, "Rome");
        assert!(result.entities.first("number").is_some());

        let slots = crate::slots::Slots::from_entities(&result.entities);
        assert_eq!(slots.origin, "Paris");
        assert_eq!(slots.destination, "Rome");
    }

    #[test]
    fn test_normalize_v2_utf16_offsets_fall_back_to_entity() {
        // The emoji is two UTF-16 units, so LUIS reports Paris at 8..=12
        let text = "\u{1F600} from Paris now";
        let response: V2Response = serde_json::from_value(json!({
            "query": text,
            "entities": [
                {"entity": "paris", "type": "Origin", "startIndex": 8, "endIndex": 12}
            ]
        }))
        .unwrap();

        let result = normalize_v2(text, response);
        assert_eq!(result.entities.first("Origin").unwrap().text, "paris");
    }

    #[test]
    fn test_utterance_span_counts_chars() {
        assert_eq!(utterance_span("de Bogotá a Medellín", 3, 8).as_deref(), Some("Bogotá"));
        assert_eq!(utterance_span("abc", 2, 1), None);
        assert_eq!(utterance_span("abc", 1, 5), None);
    }

    #[test]
    fn test_normalize_v3_loose_entities() {
        let response: V3Response = serde_json::from_value(json!({
            "query": "2 tickets from Paris to Rome",
            "prediction": {
                "topIntent": "Reservation",
                "intents": {
                    "None": {"score": 0.01},
                    "Reservation": {"score": 0.95}
                },
                "entities": {
                    "NumTickets": [2],
                    "Origin": [["Paris"]],
                    "Destination": "Rome",
                    "datetimeV2": [{"type": "date", "values": []}],
                    "Broken": [null],
                    "$instance": {
                        "Origin": [{"type": "Origin", "text": "Paris", "score": 0.9}],
                        "datetimeV2": [{"type": "builtin.datetimeV2.date", "text": "tomorrow"}]
                    }
                }
            }
        }))
        .unwrap();

        let result = normalize_v3("2 tickets from Paris to Rome", response);
        assert_eq!(result.intents[0].name, "Reservation");
        assert_eq!(result.top_intent().unwrap().score, 0.95);

        assert_eq!(result.entities.first("NumTickets").unwrap().text, "2");
        assert_eq!(result.entities.first("NumTickets").unwrap().entity_type, "NumTickets");

        let origin = result.entities.first("Origin").unwrap();
        assert_eq!(origin.text, "Paris");
        assert_eq!(origin.score, Some(0.9));

        assert_eq!(result.entities.first("Destination").unwrap().text, "Rome");

        let date = result.entities.first("datetimeV2").unwrap();
        assert_eq!(date.text, "tomorrow");
        assert_eq!(date.entity_type, "builtin.datetimeV2.date");

        assert!(result.entities.get("Broken").is_empty());
    }

    #[tokio::test]
    async fn test_empty_utterance_skips_network() {
        // Nothing listens on port 9; a request would fail
        let recognizer =
            LuisRecognizer::new(service("http://127.0.0.1:9", LuisApiVersion::V2)).unwrap();
        let result = recognizer.recognize(&Activity::message("   ")).await.unwrap();
        assert!(result.top_intent().is_none());
    }

    #[tokio::test]
    async fn test_recognize_v2_over_http() {
        let body = json!({
            "query": "book 2 tickets",
            "topScoringIntent": {"intent": "Reservation", "score": 0.9},
            "entities": []
        })
        .to_string();
        let (url, server) = serve_once("200 OK", body).await;

        let recognizer = LuisRecognizer::new(service(&url, LuisApiVersion::V2)).unwrap();
        let result = recognizer
            .recognize(&Activity::message("book 2 tickets"))
            .await
            .unwrap();
        assert_eq!(result.top_intent().unwrap().name, "Reservation");

        let request = server.await.unwrap();
        assert!(request.starts_with("GET /luis/v2.0/apps/app-1?"));
        assert!(request.contains("subscription-key=secret"));
        assert!(request.contains("q=book+2+tickets"));
    }

    #[tokio::test]
    async fn test_recognize_v3_sends_key_header() {
        let body = json!({"prediction": {"topIntent": "None", "intents": {"None": {"score": 0.7}}, "entities": {}}})
            .to_string();
        let (url, server) = serve_once("200 OK", body).await;

        let recognizer = LuisRecognizer::new(service(&url, LuisApiVersion::V3)).unwrap();
        let result = recognizer.recognize(&Activity::message("hi")).await.unwrap();
        assert_eq!(result.top_intent().unwrap().name, "None");

        let request = server.await.unwrap().to_lowercase();
        assert!(request.contains("ocp-apim-subscription-key: secret"));
        assert!(request.contains("show-all-intents=true"));
    }

    #[tokio::test]
    async fn test_recognize_http_error() {
        let (url, server) = serve_once("401 Unauthorized", "{\"error\":\"bad key\"}".into()).await;

        let recognizer = LuisRecognizer::new(service(&url, LuisApiVersion::V2)).unwrap();
        let err = recognizer.recognize(&Activity::message("hi")).await.unwrap_err();
        match err {
            RecognizerError::Http { status, body } => {
                assert_eq!(status, 401);
                assert!(body.contains("bad key"));
            }
            other => panic!("unexpected error: {other}"),
        }
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_recognize_decode_error() {
        let (url, server) = serve_once("200 OK", "not json".into()).await;

        let recognizer = LuisRecognizer::new(service(&url, LuisApiVersion::V2)).unwrap();
        let err = recognizer.recognize(&Activity::message("hi")).await.unwrap_err();
        assert!(matches!(err, RecognizerError::Decode(_)));
        server.await.unwrap();
    }
}
