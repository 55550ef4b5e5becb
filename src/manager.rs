//! Sensor scheduling
//!
//! One OS thread per registered sensor polls it at a fixed interval and hands
//! each reading to that sensor's adapters in order. Stopping is cooperative:
//! the stop signal is only seen between polls, so an in-flight read always
//! finishes first.

use crate::adapters::Adapter;
use crate::sensors::Sensor;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use thiserror::Error;

/// How long `stop_sensor` waits for a loop to exit by default
pub const DEFAULT_JOIN_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ManagerError {
    #[error("sensor '{0}' not found")]
    UnknownSensor(String),

    #[error("sensor '{0}' is running")]
    AlreadyRunning(String),

    /// A previous loop for the sensor missed its join timeout and has not exited yet
    #[error("sensor '{0}' is still stopping")]
    StillStopping(String),

    #[error("failed to spawn loop for sensor '{name}': {details}")]
    Spawn { name: String, details: String },
}

struct Registration {
    sensor: Arc<dyn Sensor>,
    interval: Duration,
    adapters: Arc<[Arc<dyn Adapter>]>,
}

struct RunningLoop {
    stop: Sender<()>,
    done: Receiver<()>,
    handle: JoinHandle<()>,
}

pub struct SensorManager {
    registrations: HashMap<String, Registration>,
    running: HashMap<String, RunningLoop>,
    // Loops that were signalled but missed the join timeout
    stopping: HashMap<String, JoinHandle<()>>,
    join_timeout: Duration,
}

impl SensorManager {
    pub fn new() -> Self {
        Self {
            registrations: HashMap::new(),
            running: HashMap::new(),
            stopping: HashMap::new(),
            join_timeout: DEFAULT_JOIN_TIMEOUT,
        }
    }

    pub fn with_join_timeout(mut self, timeout: Duration) -> Self {
        self.join_timeout = timeout;
        self
    }

    /// Register `sensor` to be polled every `interval`. Nothing starts yet.
    pub fn add_sensor(
        &mut self,
        sensor: Arc<dyn Sensor>,
        interval: Duration,
        adapters: Vec<Arc<dyn Adapter>>,
    ) -> Result<(), ManagerError> {
        let name = sensor.name().to_string();
        if self.is_running(&name) {
            return Err(ManagerError::AlreadyRunning(name));
        }

        tracing::info!(sensor = %name, "Added sensor '{}' with {:?} interval", name, interval);
        self.registrations.insert(
            name,
            Registration {
                sensor,
                interval,
                adapters: adapters.into(),
            },
        );
        Ok(())
    }

    pub fn sensor_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.registrations.keys().cloned().collect();
        names.sort();
        names
    }

    /// True while any loop for `name` is alive, including one still stopping
    pub fn is_running(&self, name: &str) -> bool {
        self.loop_alive(name) || self.still_stopping(name)
    }

    fn loop_alive(&self, name: &str) -> bool {
        self.running
            .get(name)
            .map(|running| !running.handle.is_finished())
            .unwrap_or(false)
    }

    fn still_stopping(&self, name: &str) -> bool {
        self.stopping
            .get(name)
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }

    /// Spawn the polling loop for `name`; a no-op if it is already running
    pub fn start_sensor(&mut self, name: &str) -> Result<(), ManagerError> {
        let registration = self
            .registrations
            .get(name)
            .ok_or_else(|| ManagerError::UnknownSensor(name.to_string()))?;

        if self.loop_alive(name) {
            tracing::warn!(sensor = %name, "Sensor '{}' already running", name);
            return Ok(());
        }
        if self.still_stopping(name) {
            return Err(ManagerError::StillStopping(name.to_string()));
        }
        if let Some(handle) = self.stopping.remove(name) {
            if handle.join().is_err() {
                tracing::error!(sensor = %name, "Sensor loop for '{}' panicked", name);
            }
        }

        let (stop_tx, stop_rx) = mpsc::channel();
        let (done_tx, done_rx) = mpsc::channel();
        let sensor = registration.sensor.clone();
        let adapters = registration.adapters.clone();
        let interval = registration.interval;
        let thread_name = name.to_string();

        let handle = thread::Builder::new()
            .name(format!("sensor-{}", name))
            .spawn(move || {
                // Dropped on exit, which wakes `stop_sensor`
                let _done = done_tx;
                sensor_loop(&thread_name, sensor.as_ref(), interval, &adapters, &stop_rx);
            })
            .map_err(|e| ManagerError::Spawn {
                name: name.to_string(),
                details: e.to_string(),
            })?;

        self.running.insert(
            name.to_string(),
            RunningLoop {
                stop: stop_tx,
                done: done_rx,
                handle,
            },
        );
        tracing::info!(sensor = %name, "Started reading from sensor '{}'", name);
        Ok(())
    }

    pub fn start_all(&mut self) -> Result<(), ManagerError> {
        for name in self.sensor_names() {
            self.start_sensor(&name)?;
        }
        Ok(())
    }

    /// Signal the loop for `name` and wait up to the join timeout for it to exit.
    ///
    /// Unknown or stopped sensors are ignored. A loop that misses the timeout
    /// keeps counting as running until it actually exits.
    pub fn stop_sensor(&mut self, name: &str) {
        let Some(running) = self.running.remove(name) else {
            return;
        };

        // The loop may already have exited; a closed channel is fine
        let _ = running.stop.send(());

        match running.done.recv_timeout(self.join_timeout) {
            Err(RecvTimeoutError::Timeout) => {
                tracing::warn!(
                    sensor = %name,
                    "Sensor '{}' did not stop within {:?}, detaching",
                    name,
                    self.join_timeout
                );
                self.stopping.insert(name.to_string(), running.handle);
            }
            _ => {
                if running.handle.join().is_err() {
                    tracing::error!(sensor = %name, "Sensor loop for '{}' panicked", name);
                }
                tracing::info!(sensor = %name, "Stopped sensor '{}'", name);
            }
        }
    }

    pub fn stop_all(&mut self) {
        let names: Vec<String> = self.running.keys().cloned().collect();
        for name in names {
            self.stop_sensor(&name);
        }
    }

    /// Stop every loop, close every sensor, and forget all registrations
    pub fn cleanup(&mut self) {
        self.stop_all();
        for (name, registration) in self.registrations.drain() {
            registration.sensor.close();
            tracing::debug!(sensor = %name, "Closed sensor '{}'", name);
        }
    }
}

impl Default for SensorManager {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for SensorManager {
    fn drop(&mut self) {
        self.cleanup();
    }
}

fn sensor_loop(
    name: &str,
    sensor: &dyn Sensor,
    interval: Duration,
    adapters: &[Arc<dyn Adapter>],
    stop: &Receiver<()>,
) {
    loop {
        match stop.recv_timeout(interval) {
            Err(RecvTimeoutError::Timeout) => {}
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }

        let reading = match panic::catch_unwind(AssertUnwindSafe(|| sensor.read())) {
            Ok(reading) => reading,
            Err(_) => {
                tracing::error!(sensor = %name, "Sensor reading error for {}: read panicked", name);
                continue;
            }
        };

        for adapter in adapters {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| adapter.process_reading(&reading)));
            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::error!(sensor = %name, "Adapter error for {}: {}", name, e),
                Err(_) => tracing::error!(sensor = %name, "Adapter error for {}: panicked", name),
            }
        }
    }
    tracing::debug!(sensor = %name, "Sensor loop for '{}' exiting", name);
}
