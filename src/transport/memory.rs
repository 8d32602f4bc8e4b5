use anyhow::Result;
use std::sync::{Arc, Mutex, PoisonError};

use super::TransportSink;

/// Sink that records every datagram in memory.
///
/// Clones share the same record, so a test can keep a handle while the
/// encode thread owns the sink.
#[derive(Clone, Debug, Default)]
pub struct MemorySink {
    datagrams: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn datagrams(&self) -> Vec<Vec<u8>> {
        self.datagrams
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.datagrams
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl TransportSink for MemorySink {
    fn send(&mut self, datagram: &[u8]) -> Result<()> {
        self.datagrams
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(datagram.to_vec());
        Ok(())
    }
}
