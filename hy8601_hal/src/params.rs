//! In-memory parameter store.
//!
//! `ParamStore` implements [`ParamSink`]: values are stored per axis and
//! parameter, a set that changes a value marks it pending, and
//! [`ParamSink::call_callbacks`] hands the pending values of one axis to
//! every subscriber.

use hy8601_common::hal::params::{Param, ParamSink};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::io::Write;
use tracing::trace;

/// Stored parameter value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ParamValue {
    /// Set through `set_integer`.
    Integer(i32),
    /// Set through `set_double`.
    Double(f64),
}

impl ParamValue {
    /// Value widened to a double.
    pub fn as_f64(self) -> f64 {
        match self {
            ParamValue::Integer(v) => f64::from(v),
            ParamValue::Double(v) => v,
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Integer(v) => write!(f, "{v}"),
            ParamValue::Double(v) => write!(f, "{v}"),
        }
    }
}

type Subscriber = Box<dyn Fn(usize, Param, ParamValue) + Send + Sync>;

#[derive(Default)]
struct StoreInner {
    values: BTreeMap<(usize, Param), ParamValue>,
    pending: BTreeSet<(usize, Param)>,
    created: BTreeSet<Param>,
}

/// Parameter store with change notification.
#[derive(Default)]
pub struct ParamStore {
    inner: Mutex<StoreInner>,
    subscribers: Mutex<Vec<Subscriber>>,
}

impl ParamStore {
    /// Empty store without subscribers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an observer called with every notified value.
    ///
    /// Subscribers run on the notifying thread, which may hold the device
    /// lock; they must not call back into the controller.
    pub fn subscribe(&self, f: impl Fn(usize, Param, ParamValue) + Send + Sync + 'static) {
        self.subscribers.lock().push(Box::new(f));
    }

    /// Current values of `axis`.
    pub fn snapshot(&self, axis: usize) -> BTreeMap<Param, ParamValue> {
        self.inner
            .lock()
            .values
            .iter()
            .filter(|((a, _), _)| *a == axis)
            .map(|((_, p), v)| (*p, *v))
            .collect()
    }

    /// Write the current values of `axis`, one `NAME = value` line each.
    pub fn write_values(&self, out: &mut impl Write, axis: usize) -> std::io::Result<()> {
        for (param, value) in self.snapshot(axis) {
            writeln!(out, "    {} = {}", param.name(), value)?;
        }
        Ok(())
    }

    /// Whether `param` was registered through `create_param`.
    pub fn is_created(&self, param: Param) -> bool {
        self.inner.lock().created.contains(&param)
    }

    fn set(&self, axis: usize, param: Param, value: ParamValue) {
        let mut inner = self.inner.lock();
        if inner.values.insert((axis, param), value) != Some(value) {
            inner.pending.insert((axis, param));
        }
    }
}

impl ParamSink for ParamStore {
    fn create_param(&self, param: Param) {
        trace!(name = param.name(), "parameter created");
        self.inner.lock().created.insert(param);
    }

    fn set_integer(&self, axis: usize, param: Param, value: i32) {
        self.set(axis, param, ParamValue::Integer(value));
    }

    fn set_double(&self, axis: usize, param: Param, value: f64) {
        self.set(axis, param, ParamValue::Double(value));
    }

    fn get_integer(&self, axis: usize, param: Param) -> Option<i32> {
        match self.inner.lock().values.get(&(axis, param))? {
            ParamValue::Integer(v) => Some(*v),
            ParamValue::Double(v) => Some(*v as i32),
        }
    }

    fn get_double(&self, axis: usize, param: Param) -> Option<f64> {
        self.inner
            .lock()
            .values
            .get(&(axis, param))
            .map(|v| v.as_f64())
    }

    fn call_callbacks(&self, axis: usize) {
        let changed: Vec<(Param, ParamValue)> = {
            let mut inner = self.inner.lock();
            let keys: Vec<_> = inner
                .pending
                .iter()
                .filter(|(a, _)| *a == axis)
                .copied()
                .collect();
            keys.into_iter()
                .filter_map(|key| {
                    inner.pending.remove(&key);
                    inner.values.get(&key).map(|v| (key.1, *v))
                })
                .collect()
        };

        if changed.is_empty() {
            return;
        }
        let subscribers = self.subscribers.lock();
        for (param, value) in changed {
            for subscriber in subscribers.iter() {
                subscriber(axis, param, value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn recording_store() -> (ParamStore, Arc<Mutex<Vec<(usize, Param, ParamValue)>>>) {
        let store = ParamStore::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        store.subscribe(move |axis, param, value| sink.lock().push((axis, param, value)));
        (store, seen)
    }

    #[test]
    fn values_visible_to_observers_after_callbacks() {
        let (store, seen) = recording_store();
        store.set_integer(0, Param::Done, 1);
        assert_eq!(store.get_integer(0, Param::Done), Some(1));
        assert!(seen.lock().is_empty());

        store.call_callbacks(0);
        assert_eq!(
            seen.lock().as_slice(),
            &[(0, Param::Done, ParamValue::Integer(1))]
        );
    }

    #[test]
    fn callbacks_are_per_axis() {
        let (store, seen) = recording_store();
        store.set_double(1, Param::Position, 5.0);
        store.set_double(2, Param::Position, 7.0);
        store.call_callbacks(1);
        assert_eq!(seen.lock().len(), 1);
        store.call_callbacks(2);
        assert_eq!(seen.lock().len(), 2);
    }

    #[test]
    fn unchanged_values_are_not_renotified() {
        let (store, seen) = recording_store();
        store.set_integer(0, Param::HighLimit, 0);
        store.call_callbacks(0);
        store.set_integer(0, Param::HighLimit, 0);
        store.call_callbacks(0);
        assert_eq!(seen.lock().len(), 1);
    }

    #[test]
    fn missing_values_read_as_none() {
        let store = ParamStore::new();
        assert_eq!(store.get_double(3, Param::EncoderPosition), None);
        store.create_param(Param::MoveAll);
        assert!(store.is_created(Param::MoveAll));
        assert!(!store.is_created(Param::PowerControl));
    }

    #[test]
    fn snapshot_collects_one_axis() {
        let store = ParamStore::new();
        store.set_integer(0, Param::Direction, 1);
        store.set_double(0, Param::Position, 12.0);
        store.set_integer(1, Param::Direction, 0);
        let snap = store.snapshot(0);
        assert_eq!(snap.len(), 2);
        assert_eq!(snap[&Param::Position], ParamValue::Double(12.0));
    }

    #[test]
    fn values_are_written_under_registered_names() {
        let store = ParamStore::new();
        store.set_double(1, Param::Position, 12.5);
        store.set_integer(1, Param::Done, 1);
        store.set_integer(0, Param::Done, 0);

        let mut out = Vec::new();
        store.write_values(&mut out, 1).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "    MOTOR_POSITION = 12.5\n    MOTOR_STATUS_DONE = 1\n"
        );
    }
}
