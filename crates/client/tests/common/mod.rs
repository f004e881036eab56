#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use prok_client::{
    ApiRequest, CredentialError, CredentialStore, MemoryCredentialStore, RawResponse,
    StoredCredential, Transport, TransportError,
};
use serde_json::{json, Value};
use tokio::time::Instant;

pub type Reply = Result<RawResponse, TransportError>;

pub fn reply(status: u16, body: Value) -> Reply {
    Ok(RawResponse::json(status, &body))
}

/// Transport that plays back a script. The last entry repeats forever.
pub struct ScriptedTransport {
    script: Mutex<VecDeque<Reply>>,
    latency: Duration,
    calls: Mutex<Vec<Call>>,
}

#[derive(Debug, Clone)]
pub struct Call {
    pub at: Instant,
    pub path: String,
    pub bearer: Option<String>,
}

impl ScriptedTransport {
    pub fn new(script: Vec<Reply>) -> Arc<Self> {
        assert!(!script.is_empty());
        Arc::new(Self {
            script: Mutex::new(script.into()),
            latency: Duration::from_millis(10),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn always(reply: Reply) -> Arc<Self> {
        Self::new(vec![reply])
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(
        &self,
        request: &ApiRequest,
        bearer: Option<&str>,
        _timeout: Duration,
    ) -> Result<RawResponse, TransportError> {
        self.calls.lock().unwrap().push(Call {
            at: Instant::now(),
            path: request.path.clone(),
            bearer: bearer.map(str::to_string),
        });
        tokio::time::sleep(self.latency).await;
        let mut script = self.script.lock().unwrap();
        if script.len() > 1 {
            script.pop_front().unwrap()
        } else {
            script.front().cloned().unwrap()
        }
    }
}

/// In-memory store that counts `clear` calls.
#[derive(Default)]
pub struct CountingStore {
    inner: MemoryCredentialStore,
    pub clears: Arc<AtomicUsize>,
}

impl CountingStore {
    pub fn with_token(token: &str) -> Self {
        Self {
            inner: MemoryCredentialStore::with_credential(credential(token)),
            clears: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl CredentialStore for CountingStore {
    fn load(&self) -> Result<Option<StoredCredential>, CredentialError> {
        self.inner.load()
    }

    fn save(&self, credential: &StoredCredential) -> Result<(), CredentialError> {
        self.inner.save(credential)
    }

    fn clear(&self) -> Result<(), CredentialError> {
        self.clears.fetch_add(1, Ordering::SeqCst);
        self.inner.clear()
    }
}

pub fn credential(token: &str) -> StoredCredential {
    StoredCredential {
        token: token.to_string(),
        user: json!({"email": "ada@example.test", "username": "ada"}),
    }
}

pub fn post(id: u64, category: &str) -> Value {
    json!({
        "id": id,
        "title": format!("post {id}"),
        "content": "hello",
        "category": category,
    })
}
