use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use sensorline_core::error::{StoreError, StoreErrorKind};
use sensorline_core::key::SeriesKey;
use sensorline_core::model::sample::Sample;
use sensorline_core::model::series::SeriesSpec;
use sensorline_core::query::StoreStatus;
use sensorline_store::SeriesBackend;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Create,
    Append,
    Range,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    Fail(StoreErrorKind),
    RaceOnCreate,
}

pub struct FaultyBackend {
    inner: Arc<dyn SeriesBackend>,
    faults: Mutex<HashMap<Op, VecDeque<Fault>>>,
    calls: Mutex<HashMap<Op, usize>>,
}

impl FaultyBackend {
    pub fn new(inner: Arc<dyn SeriesBackend>) -> Self {
        Self {
            inner,
            faults: Mutex::new(HashMap::new()),
            calls: Mutex::new(HashMap::new()),
        }
    }

    pub fn inject(&self, op: Op, fault: Fault) -> &Self {
        self.faults
            .lock()
            .unwrap()
            .entry(op)
            .or_default()
            .push_back(fault);
        self
    }

    pub fn calls(&self, op: Op) -> usize {
        self.calls.lock().unwrap().get(&op).copied().unwrap_or(0)
    }

    fn next_fault(&self, op: Op) -> Option<Fault> {
        *self.calls.lock().unwrap().entry(op).or_default() += 1;
        self.faults.lock().unwrap().get_mut(&op)?.pop_front()
    }
}

fn injected(op: Op, kind: StoreErrorKind) -> StoreError {
    StoreError::new(kind, format!("injected {op:?} failure"))
}

impl SeriesBackend for FaultyBackend {
    fn name(&self) -> &'static str {
        "faulty"
    }

    fn create(&self, spec: &SeriesSpec) -> Result<(), StoreError> {
        match self.next_fault(Op::Create) {
            Some(Fault::Fail(kind)) => Err(injected(Op::Create, kind)),
            Some(Fault::RaceOnCreate) => {
                self.inner.create(spec)?;
                Err(StoreError::already_exists(spec.key.as_str()))
            }
            None => self.inner.create(spec),
        }
    }

    fn append(&self, key: &SeriesKey, timestamp_ms: i64, value: f64) -> Result<(), StoreError> {
        match self.next_fault(Op::Append) {
            Some(Fault::Fail(kind)) => Err(injected(Op::Append, kind)),
            _ => self.inner.append(key, timestamp_ms, value),
        }
    }

    fn range(&self, key: &SeriesKey, from_ms: i64, to_ms: i64) -> Result<Vec<Sample>, StoreError> {
        match self.next_fault(Op::Range) {
            Some(Fault::Fail(kind)) => Err(injected(Op::Range, kind)),
            _ => self.inner.range(key, from_ms, to_ms),
        }
    }

    fn prune_expired(&self, now_ms: i64) -> Result<usize, StoreError> {
        self.inner.prune_expired(now_ms)
    }

    fn status(&self) -> Result<StoreStatus, StoreError> {
        self.inner.status()
    }
}
