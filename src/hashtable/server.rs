//! Server-per-bucket hash table.
//!
//! Each bucket owns a worker thread and a bounded request channel; the
//! worker is the only thread that ever touches the bucket's map, so there
//! is no shared mutation at all. Callers allocate a one-slot reply channel
//! per request. The design point exists to price message passing against
//! the lock-based baseline; a caller that wants the asynchrony can hold the
//! reply receiver and collect it later.
//!
//! Dropping the table closes the request channels, which is the teardown
//! signal the workers exit on.

use crossbeam_channel::{bounded, Receiver, Sender};
use std::collections::HashMap;
use std::thread::JoinHandle;

use crate::config::SetConfig;
use crate::key::{Key, Val};
use crate::set::ConcurrentSet;
use crate::tracing_helpers::debug_log;

/// Outstanding requests a bucket queues before senders block.
const QUERY_BUFFER: usize = 16;

enum Request {
    Size { reply: Sender<usize> },
    Find { key: Key, reply: Sender<Option<Val>> },
    Insert { key: Key, val: Val, reply: Sender<bool> },
    Delete { key: Key, reply: Sender<Option<Val>> },
}

fn serve(requests: &Receiver<Request>) {
    let mut map: HashMap<Key, Val> = HashMap::new();
    while let Ok(request) = requests.recv() {
        match request {
            Request::Size { reply } => {
                let _ = reply.send(map.len());
            }
            Request::Find { key, reply } => {
                let _ = reply.send(map.get(&key).copied());
            }
            Request::Insert { key, val, reply } => {
                let taken = if map.contains_key(&key) {
                    false
                } else {
                    map.insert(key, val);
                    true
                };
                let _ = reply.send(taken);
            }
            Request::Delete { key, reply } => {
                let _ = reply.send(map.remove(&key));
            }
        }
    }
}

/// Hash table where every bucket is a dedicated worker thread.
pub struct ServerHashTable {
    requests: Vec<Sender<Request>>,
    workers: Vec<JoinHandle<()>>,
}

impl ServerHashTable {
    /// Table with `config.buckets` bucket workers.
    #[must_use]
    pub fn new(config: &SetConfig) -> Self {
        let num_buckets = config.buckets.max(1);
        let mut requests = Vec::with_capacity(num_buckets);
        let mut workers = Vec::with_capacity(num_buckets);
        for i in 0..num_buckets {
            let (tx, rx) = bounded(QUERY_BUFFER);
            requests.push(tx);
            let handle = std::thread::Builder::new()
                .name(format!("bucket-{i}"))
                .spawn(move || serve(&rx));
            match handle {
                Ok(handle) => workers.push(handle),
                Err(e) => panic!("failed to spawn bucket worker {i}: {e}"),
            }
        }
        Self { requests, workers }
    }

    fn bucket(&self, key: Key) -> &Sender<Request> {
        &self.requests[((key as u64) % self.requests.len() as u64) as usize]
    }

    /// Post a lookup and return the reply channel without waiting on it.
    pub fn find_async(&self, key: Key) -> Receiver<Option<Val>> {
        let (reply, response) = bounded(1);
        let _ = self.bucket(key).send(Request::Find { key, reply });
        response
    }

    /// Post an insert and return the reply channel without waiting on it.
    pub fn insert_async(&self, key: Key, val: Val) -> Receiver<bool> {
        let (reply, response) = bounded(1);
        let _ = self.bucket(key).send(Request::Insert { key, val, reply });
        response
    }

    /// Post a delete and return the reply channel without waiting on it.
    pub fn delete_async(&self, key: Key) -> Receiver<Option<Val>> {
        let (reply, response) = bounded(1);
        let _ = self.bucket(key).send(Request::Delete { key, reply });
        response
    }

    /// Query every bucket's count before collecting any, so the counts are
    /// taken close together.
    pub fn size_async(&self) -> Vec<Receiver<usize>> {
        self.requests
            .iter()
            .map(|bucket| {
                let (reply, response) = bounded(1);
                let _ = bucket.send(Request::Size { reply });
                response
            })
            .collect()
    }
}

impl ConcurrentSet for ServerHashTable {
    fn find(&self, key: Key) -> Option<Val> {
        self.find_async(key).recv().unwrap_or(None)
    }

    fn insert(&self, key: Key, val: Val) -> bool {
        self.insert_async(key, val).recv().unwrap_or(false)
    }

    fn delete(&self, key: Key) -> Option<Val> {
        self.delete_async(key).recv().unwrap_or(None)
    }

    fn size(&self) -> usize {
        self.size_async()
            .into_iter()
            .filter_map(|r| r.recv().ok())
            .sum()
    }
}

impl Drop for ServerHashTable {
    fn drop(&mut self) {
        debug_log!(buckets = self.workers.len(), "shutting down bucket workers");
        // Disconnect every request channel; workers exit on recv error.
        self.requests.clear();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}
