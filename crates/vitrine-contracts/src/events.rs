use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};

pub type EventPayload = Map<String, Value>;

/// Append-only session event log (`events.jsonl`).
///
/// - default fields are `type`, `session_id`, `ts`
/// - caller payload is merged last and can override defaults
/// - one compact JSON object per line
///
/// A writer built with [`EventWriter::disabled`] still assembles events but
/// never touches the filesystem.
#[derive(Debug, Clone)]
pub struct EventWriter {
    inner: Arc<EventWriterInner>,
}

#[derive(Debug)]
struct EventWriterInner {
    path: Option<PathBuf>,
    session_id: String,
    lock: Mutex<()>,
}

impl EventWriter {
    pub fn new(path: impl Into<PathBuf>, session_id: impl Into<String>) -> Self {
        Self::build(Some(path.into()), session_id.into())
    }

    pub fn disabled(session_id: impl Into<String>) -> Self {
        Self::build(None, session_id.into())
    }

    fn build(path: Option<PathBuf>, session_id: String) -> Self {
        Self {
            inner: Arc::new(EventWriterInner {
                path,
                session_id,
                lock: Mutex::new(()),
            }),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.inner.path.as_deref()
    }

    pub fn session_id(&self) -> &str {
        &self.inner.session_id
    }

    pub fn emit(&self, event_type: &str, payload: EventPayload) -> anyhow::Result<Value> {
        let mut event = Map::new();
        event.insert("type".to_string(), Value::String(event_type.to_string()));
        event.insert(
            "session_id".to_string(),
            Value::String(self.inner.session_id.clone()),
        );
        event.insert("ts".to_string(), Value::String(now_utc_iso()));
        for (key, value) in payload {
            event.insert(key, value);
        }

        let Some(path) = self.inner.path.as_ref() else {
            return Ok(Value::Object(event));
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let line = serde_json::to_string(&event)?;
        let _guard = self
            .inner
            .lock
            .lock()
            .map_err(|_| anyhow::anyhow!("event writer lock poisoned"))?;
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        file.write_all(line.as_bytes())?;
        file.write_all(b"\n")?;

        Ok(Value::Object(event))
    }

    /// Like [`EventWriter::emit`], but a failed write is logged and dropped.
    ///
    /// The event log is diagnostic; it must never fail a user action.
    pub fn record(&self, event_type: &str, payload: EventPayload) {
        if let Err(err) = self.emit(event_type, payload) {
            tracing::warn!(event_type, error = %err, "failed to append session event");
        }
    }
}

/// Converts a `json!({...})` literal into an event payload.
pub fn payload(value: Value) -> EventPayload {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

fn now_utc_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false)
}
