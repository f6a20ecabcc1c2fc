use crate::{ExecutionId, Value};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;

/// Shared state visible to every node of one run.
///
/// Holds an ephemeral data store (per-node scratch such as timer tick
/// counters) and the run's global variables. Both live behind one mutex.
#[derive(Debug)]
pub struct ExecutionContext {
    execution_id: ExecutionId,
    start_time: DateTime<Utc>,
    stores: Mutex<Stores>,
}

#[derive(Debug, Default)]
struct Stores {
    data: HashMap<String, Value>,
    variables: HashMap<String, Value>,
}

impl ExecutionContext {
    pub fn new(execution_id: ExecutionId) -> Self {
        Self {
            execution_id,
            start_time: Utc::now(),
            stores: Mutex::new(Stores::default()),
        }
    }

    pub fn execution_id(&self) -> ExecutionId {
        self.execution_id
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    pub fn get_data(&self, key: &str) -> Option<Value> {
        self.stores.lock().data.get(key).cloned()
    }

    pub fn set_data(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.stores.lock().data.insert(key.into(), value.into());
    }

    /// Read-modify-write of a data entry under a single lock acquisition.
    pub fn update_data<F>(&self, key: &str, f: F) -> Value
    where
        F: FnOnce(Option<&Value>) -> Value,
    {
        let mut stores = self.stores.lock();
        let next = f(stores.data.get(key));
        stores.data.insert(key.to_string(), next.clone());
        next
    }

    pub fn get_variable(&self, name: &str) -> Option<Value> {
        self.stores.lock().variables.get(name).cloned()
    }

    /// Store a variable, returning the previous value if any.
    pub fn set_variable(&self, name: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.stores.lock().variables.insert(name.into(), value.into())
    }

    pub fn variables(&self) -> HashMap<String, Value> {
        self.stores.lock().variables.clone()
    }
}
