use crate::adapters::{Adapter, AdapterError};
use crate::core::Reading;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};

/// Hands readings to another thread through a bounded channel.
///
/// Never blocks the scheduling loop: when the channel is full the reading is
/// dropped and a warning logged.
pub struct QueueAdapter {
    sender: SyncSender<Reading>,
    dropped: AtomicU64,
}

impl QueueAdapter {
    /// Adapter plus the receiving end; `capacity` is at least one
    pub fn bounded(capacity: usize) -> (Self, Receiver<Reading>) {
        let (sender, receiver) = mpsc::sync_channel(capacity.max(1));
        let adapter = Self {
            sender,
            dropped: AtomicU64::new(0),
        };
        (adapter, receiver)
    }

    /// Readings discarded because the channel was full
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl Adapter for QueueAdapter {
    fn process_reading(&self, reading: &Reading) -> Result<(), AdapterError> {
        match self.sender.try_send(reading.clone()) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(dropped)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    sensor = %dropped.sensor_name,
                    "Data queue full, dropping reading from {}",
                    dropped.sensor_name
                );
                Ok(())
            }
            Err(TrySendError::Disconnected(_)) => Err(AdapterError::Disconnected),
        }
    }
}
