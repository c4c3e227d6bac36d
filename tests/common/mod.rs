//! Shared test doubles for integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tarot_adviser::adviser::{AdviseRequest, AdviserOptions, CardInput, RetryPolicy};
use tarot_adviser::client::{ClientError, ClientFactory, TextGenerator};
use tarot_adviser::domain::{BackendPreference, Credentials};
use tarot_adviser::result::Backend;

/// Schema-valid reading for one card
pub fn reading_json(card_name: &str, position: &str) -> String {
    serde_json::json!({
        "summary": format!("Remote reading for {}", card_name),
        "cards": [{
            "cardName": card_name,
            "position": position,
            "meaning": "A new beginning",
            "advice": "Take the first step"
        }]
    })
    .to_string()
}

/// What the scripted client does on one call
pub enum Step {
    Reply(String),
    Fail(ClientError),
    /// Never resolves
    Hang,
    /// Resolves with a valid reading after a delay
    Delay(Duration),
}

pub fn http_error(status: u16) -> ClientError {
    ClientError::Http {
        status,
        body: format!("status {}", status),
    }
}

/// Remote client that plays back a script, then answers with a valid reading
#[derive(Default)]
pub struct ScriptedClient {
    steps: Mutex<VecDeque<Step>>,
    calls: AtomicU32,
}

impl ScriptedClient {
    pub fn new(steps: Vec<Step>) -> Arc<Self> {
        Arc::new(Self {
            steps: Mutex::new(steps.into()),
            calls: AtomicU32::new(0),
        })
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TextGenerator for ScriptedClient {
    async fn generate(&self, _prompt: &str) -> Result<String, ClientError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let step = self.steps.lock().unwrap().pop_front();
        match step {
            None => Ok(reading_json("The Fool", "upright")),
            Some(Step::Reply(text)) => Ok(text),
            Some(Step::Fail(e)) => Err(e),
            Some(Step::Hang) => std::future::pending().await,
            Some(Step::Delay(d)) => {
                tokio::time::sleep(d).await;
                Ok(reading_json("The Fool", "upright"))
            }
        }
    }

    fn backend(&self) -> Backend {
        Backend::Remote
    }
}

/// Factory handing out one shared scripted client
pub struct ScriptedFactory {
    client: Arc<ScriptedClient>,
    seen: Mutex<Vec<(Credentials, String)>>,
}

impl ScriptedFactory {
    pub fn new(client: Arc<ScriptedClient>) -> Arc<Self> {
        Arc::new(Self {
            client,
            seen: Mutex::new(Vec::new()),
        })
    }

    /// Credentials and locale of every `create` call
    pub fn seen(&self) -> Vec<(Credentials, String)> {
        self.seen.lock().unwrap().clone()
    }
}

impl ClientFactory for ScriptedFactory {
    fn create(
        &self,
        credentials: &Credentials,
        locale: &str,
    ) -> Result<Arc<dyn TextGenerator>, ClientError> {
        self.seen
            .lock()
            .unwrap()
            .push((credentials.clone(), locale.to_string()));
        if !credentials.has_key() {
            return Err(ClientError::MissingCredentials);
        }
        Ok(self.client.clone())
    }
}

/// Options with jitter off so backoff timing is exact
pub fn options(max_retries: u32, timeout_ms: u64) -> AdviserOptions {
    AdviserOptions {
        backend: BackendPreference::Auto,
        retry: RetryPolicy::new(max_retries, 500, 2.0)
            .unwrap()
            .with_jitter(false)
            .with_timeout(Duration::from_millis(timeout_ms)),
        ..AdviserOptions::default()
    }
}

/// Request that selects the remote backend under `auto`
pub fn remote_request(question: &str) -> AdviseRequest {
    AdviseRequest {
        question: Some(question.to_string()),
        cards: Some(vec![CardInput::new("The Fool", "upright").with_slot("present")]),
        api_key: Some("sk-test".to_string()),
        locale: Some("en".to_string()),
        ..AdviseRequest::default()
    }
}
