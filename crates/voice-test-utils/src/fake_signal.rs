//! Signal channel that records what the client emits.

use async_trait::async_trait;
use signaling_protocol::ClientEvent;
use std::sync::Mutex;
use voice_client::errors::SignalError;
use voice_client::signal::SignalChannel;

#[derive(Default)]
pub struct RecordingSignalChannel {
    emitted: Mutex<Vec<ClientEvent>>,
    fail_next: Mutex<usize>,
}

impl RecordingSignalChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next `count` emits fail with `Closed`.
    pub fn fail_next(&self, count: usize) {
        *self.fail_next.lock().unwrap() = count;
    }

    pub fn emitted(&self) -> Vec<ClientEvent> {
        self.emitted.lock().unwrap().clone()
    }

    /// Emitted event names, in order.
    pub fn names(&self) -> Vec<&'static str> {
        self.emitted().iter().map(ClientEvent::name).collect()
    }

    pub fn take(&self) -> Vec<ClientEvent> {
        std::mem::take(&mut *self.emitted.lock().unwrap())
    }
}

#[async_trait]
impl SignalChannel for RecordingSignalChannel {
    async fn emit(&self, event: ClientEvent) -> Result<(), SignalError> {
        {
            let mut failures = self.fail_next.lock().unwrap();
            if *failures > 0 {
                *failures -= 1;
                return Err(SignalError::Closed);
            }
        }
        self.emitted.lock().unwrap().push(event);
        Ok(())
    }
}
