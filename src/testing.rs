//! In-memory remote used by unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::sync::{NetworkError, RemoteSource};

/// Replays queued responses in order; an empty queue answers with a transport error.
#[derive(Default)]
pub(crate) struct ScriptedRemote {
    status: Mutex<VecDeque<Result<String, NetworkError>>>,
    version: Mutex<VecDeque<Result<String, NetworkError>>>,
    artifact: Mutex<VecDeque<Result<Vec<u8>, NetworkError>>>,
    status_calls: AtomicUsize,
    artifact_calls: AtomicUsize,
}

impl ScriptedRemote {
    pub(crate) fn push_status(&self, response: Result<String, NetworkError>) {
        self.status.lock().unwrap().push_back(response);
    }

    pub(crate) fn push_version(&self, response: Result<String, NetworkError>) {
        self.version.lock().unwrap().push_back(response);
    }

    pub(crate) fn push_artifact(&self, response: Result<Vec<u8>, NetworkError>) {
        self.artifact.lock().unwrap().push_back(response);
    }

    pub(crate) fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn artifact_calls(&self) -> usize {
        self.artifact_calls.load(Ordering::SeqCst)
    }
}

fn next<T>(queue: &Mutex<VecDeque<Result<T, NetworkError>>>) -> Result<T, NetworkError> {
    queue
        .lock()
        .unwrap()
        .pop_front()
        .unwrap_or_else(|| Err(NetworkError::Transport("no scripted response".into())))
}

#[async_trait]
impl RemoteSource for ScriptedRemote {
    async fn fetch_status(&self) -> Result<String, NetworkError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        next(&self.status)
    }

    async fn fetch_version(&self) -> Result<String, NetworkError> {
        next(&self.version)
    }

    async fn fetch_artifact(&self) -> Result<Vec<u8>, NetworkError> {
        self.artifact_calls.fetch_add(1, Ordering::SeqCst);
        next(&self.artifact)
    }
}
