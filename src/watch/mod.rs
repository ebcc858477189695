//! Delivering watch block output to collaborators.
//!
//! A watch block's records never reach the index. After each committed
//! transaction its net output change becomes a [`DiffBatch`], handed to
//! every attached handler and pushed to every open [`DiffStream`].

mod stream;

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam_channel::{bounded, Sender, TrySendError};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::change::TransactionId;
use crate::error::{FlowError, FlowResult, RuntimeError};
use crate::value::RawValue;

pub use stream::DiffStream;

/// A fact as raw values: `[entity, attribute, value]`.
pub type RawEav = (RawValue, RawValue, RawValue);

/// Net change of a watch block's output over one transaction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiffBatch {
    /// The transaction that caused the change.
    pub transaction: TransactionId,
    /// Facts that entered the output.
    pub adds: Vec<RawEav>,
    /// Facts that left the output.
    pub removes: Vec<RawEav>,
}

/// A diff batch grouped by entity and projected onto `T`.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectBatch<T> {
    /// The transaction that caused the change.
    pub transaction: TransactionId,
    /// Added facts, keyed by entity.
    pub adds: BTreeMap<String, T>,
    /// Removed facts, keyed by entity.
    pub removes: BTreeMap<String, T>,
}

impl DiffBatch {
    /// Whether the batch carries no facts.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.adds.is_empty() && self.removes.is_empty()
    }

    /// Group facts by entity into JSON objects and deserialize each one.
    /// Attributes with several values become arrays.
    pub fn objects<T: DeserializeOwned>(&self) -> FlowResult<ObjectBatch<T>> {
        Ok(ObjectBatch {
            transaction: self.transaction,
            adds: project(&self.adds)?,
            removes: project(&self.removes)?,
        })
    }
}

fn project<T: DeserializeOwned>(facts: &[RawEav]) -> FlowResult<BTreeMap<String, T>> {
    let mut objects: BTreeMap<String, serde_json::Map<String, serde_json::Value>> = BTreeMap::new();
    for (e, a, v) in facts {
        let object = objects.entry(e.to_string()).or_default();
        let value = v.to_json();
        match object.get_mut(&a.to_string()) {
            None => {
                object.insert(a.to_string(), value);
            }
            Some(serde_json::Value::Array(values)) => values.push(value),
            Some(existing) => {
                let first = existing.take();
                *existing = serde_json::Value::Array(vec![first, value]);
            }
        }
    }
    objects
        .into_iter()
        .map(|(entity, object)| {
            serde_json::from_value(serde_json::Value::Object(object))
                .map(|projected| (entity.clone(), projected))
                .map_err(|e| FlowError::internal(format!("cannot project entity {entity}: {e}")))
        })
        .collect()
}

/// Callback receiving every non-empty batch of a watch block.
pub type DiffHandler = Box<dyn FnMut(&DiffBatch) + Send>;

struct StreamSink {
    tx: Sender<DiffBatch>,
    dropped: Arc<AtomicU64>,
}

#[derive(Default)]
struct WatchSinks {
    handlers: Vec<DiffHandler>,
    streams: Vec<StreamSink>,
}

/// Handlers and streams of every watch block.
pub(crate) struct Exporter {
    capacity: usize,
    watches: BTreeMap<String, WatchSinks>,
    last: Option<String>,
}

impl std::fmt::Debug for Exporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Exporter")
            .field("capacity", &self.capacity)
            .field("watches", &self.watches.keys().collect::<Vec<_>>())
            .field("last", &self.last)
            .finish()
    }
}

impl Exporter {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            watches: BTreeMap::new(),
            last: None,
        }
    }

    pub(crate) fn declare(&mut self, watch: &str) {
        self.watches.entry(watch.to_string()).or_default();
        self.last = Some(watch.to_string());
    }

    /// The most recently declared watch block.
    pub(crate) fn last(&self) -> Result<&str, RuntimeError> {
        self.last.as_deref().ok_or(RuntimeError::NoWatchBlock)
    }

    pub(crate) fn attach(&mut self, watch: &str, handler: DiffHandler) -> Result<(), RuntimeError> {
        self.sinks(watch)?.handlers.push(handler);
        Ok(())
    }

    pub(crate) fn subscribe(&mut self, watch: &str) -> Result<DiffStream, RuntimeError> {
        let capacity = self.capacity;
        let sinks = self.sinks(watch)?;
        let (tx, rx) = bounded(capacity);
        let dropped = Arc::new(AtomicU64::new(0));
        sinks.streams.push(StreamSink {
            tx,
            dropped: Arc::clone(&dropped),
        });
        Ok(DiffStream::new(watch.to_string(), rx, dropped))
    }

    fn sinks(&mut self, watch: &str) -> Result<&mut WatchSinks, RuntimeError> {
        self.watches
            .get_mut(watch)
            .ok_or_else(|| RuntimeError::UnknownWatch {
                name: watch.to_string(),
            })
    }

    pub(crate) fn deliver(&mut self, watch: &str, batch: &DiffBatch) {
        let Some(sinks) = self.watches.get_mut(watch) else {
            return;
        };
        for handler in &mut sinks.handlers {
            handler(batch);
        }
        sinks.streams.retain(|sink| match sink.tx.try_send(batch.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                sink.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(watch, transaction = batch.transaction, "diff stream full, batch dropped");
                true
            }
            Err(TrySendError::Disconnected(_)) => false,
        });
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    fn fact(e: &str, a: &str, v: impl Into<RawValue>) -> RawEav {
        (e.into(), a.into(), v.into())
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct Person {
        tag: Vec<String>,
        age: f64,
    }

    #[test]
    fn test_objects_group_by_entity() {
        let batch = DiffBatch {
            transaction: 3,
            adds: vec![
                fact("p", "tag", "person"),
                fact("p", "tag", "employee"),
                fact("p", "age", 30),
            ],
            removes: Vec::new(),
        };
        let objects = batch.objects::<Person>().unwrap();
        assert_eq!(
            objects.adds["p"],
            Person {
                tag: vec!["person".into(), "employee".into()],
                age: 30.0,
            }
        );
        assert!(objects.removes.is_empty());
    }

    #[test]
    fn test_objects_reject_mismatched_shape() {
        let batch = DiffBatch {
            transaction: 1,
            adds: vec![fact("p", "age", "old")],
            removes: Vec::new(),
        };
        assert!(batch.objects::<Person>().unwrap_err().is_internal());
    }

    #[test]
    fn test_unknown_watch() {
        let mut exporter = Exporter::new(4);
        assert!(matches!(exporter.last(), Err(RuntimeError::NoWatchBlock)));
        assert!(matches!(
            exporter.subscribe("nope"),
            Err(RuntimeError::UnknownWatch { .. })
        ));
    }

    #[test]
    fn test_full_stream_drops_and_counts() {
        let mut exporter = Exporter::new(1);
        exporter.declare("w");
        let stream = exporter.subscribe("w").unwrap();
        let seen = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&seen);
        exporter
            .attach("w", Box::new(move |_: &DiffBatch| *counter.lock().unwrap() += 1))
            .unwrap();

        let batch = DiffBatch {
            transaction: 1,
            adds: vec![fact("a", "b", "c")],
            removes: Vec::new(),
        };
        exporter.deliver("w", &batch);
        exporter.deliver("w", &batch);
        assert_eq!(*seen.lock().unwrap(), 2);
        assert_eq!(stream.dropped(), 1);
        assert_eq!(stream.drain().len(), 1);
    }

    #[test]
    fn test_dropped_stream_is_detached() {
        let mut exporter = Exporter::new(4);
        exporter.declare("w");
        drop(exporter.subscribe("w").unwrap());
        exporter.deliver("w", &DiffBatch::default());
        assert!(exporter.watches["w"].streams.is_empty());
    }
}
