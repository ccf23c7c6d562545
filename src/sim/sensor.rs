//! Accelerometer to gravity mapping and the sensor delivery thread.

use std::sync::{mpsc, Arc};

use glam::Vec2;

use super::{FluidEngine, SimulationGateway};
use crate::error::FluidError;

/// Scale applied to raw accelerometer axes.
pub const STANDARD_GRAVITY: f32 = 9.8;

/// Rotation of the display relative to the device's natural orientation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DisplayRotation {
    /// Natural orientation.
    #[default]
    Deg0,
    /// Rotated a quarter turn.
    Deg90,
    /// Upside down.
    Deg180,
    /// Rotated three quarter turns.
    Deg270,
}

/// Maps accelerometer readings to world gravity for one display rotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GravitySensor {
    rotation: DisplayRotation,
}

impl GravitySensor {
    /// Sensor for a display at `rotation`.
    pub fn new(rotation: DisplayRotation) -> Self {
        Self { rotation }
    }

    /// The display rotation in use.
    pub fn rotation(&self) -> DisplayRotation {
        self.rotation
    }

    /// World gravity for accelerometer axes `(x, y)`. Device axes point
    /// against the felt force, so the natural orientation negates both.
    pub fn gravity_for(&self, x_axis: f32, y_axis: f32) -> Vec2 {
        let g = STANDARD_GRAVITY;
        match self.rotation {
            DisplayRotation::Deg0 => Vec2::new(-g * x_axis, -g * y_axis),
            DisplayRotation::Deg90 => Vec2::new(g * y_axis, -g * x_axis),
            DisplayRotation::Deg180 => Vec2::new(g * x_axis, g * y_axis),
            DisplayRotation::Deg270 => Vec2::new(-g * y_axis, g * x_axis),
        }
    }

    /// Map a reading and apply it to the world under the gateway lock.
    pub fn apply<E: FluidEngine>(
        &self,
        gateway: &SimulationGateway<E>,
        x_axis: f32,
        y_axis: f32,
    ) {
        gateway.set_gravity(self.gravity_for(x_axis, y_axis));
    }
}

enum SensorEvent {
    Reading(f32, f32),
    Rotation(DisplayRotation),
    Shutdown,
}

/// Background thread applying accelerometer readings to the world.
///
/// Readings are queued without blocking the caller. When readings arrive
/// faster than the lock can be taken, only the newest is applied.
pub struct SensorThread {
    events: mpsc::Sender<SensorEvent>,
    thread: Option<std::thread::JoinHandle<()>>,
}

/// Spawn the sensor thread for a display at `rotation`.
///
/// # Errors
///
/// Returns [`FluidError::ThreadSpawn`] if the thread fails to spawn.
pub fn spawn_sensor_thread<E>(
    gateway: Arc<SimulationGateway<E>>,
    rotation: DisplayRotation,
) -> Result<SensorThread, FluidError>
where
    E: FluidEngine + 'static,
{
    let (events, receiver) = mpsc::channel();
    let thread = std::thread::Builder::new()
        .name("gravity-sensor".into())
        .spawn(move || sensor_loop(&gateway, GravitySensor::new(rotation), &receiver))
        .map_err(FluidError::ThreadSpawn)?;
    Ok(SensorThread {
        events,
        thread: Some(thread),
    })
}

fn sensor_loop<E: FluidEngine>(
    gateway: &SimulationGateway<E>,
    mut sensor: GravitySensor,
    receiver: &mpsc::Receiver<SensorEvent>,
) {
    let mut running = true;
    while running {
        let Ok(first) = receiver.recv() else {
            return;
        };
        let mut reading = None;
        for event in std::iter::once(first).chain(receiver.try_iter()) {
            match event {
                SensorEvent::Shutdown => running = false,
                SensorEvent::Rotation(rotation) => {
                    if let Some((x, y)) = reading.take() {
                        sensor.apply(gateway, x, y);
                    }
                    sensor = GravitySensor::new(rotation);
                }
                SensorEvent::Reading(x, y) => reading = Some((x, y)),
            }
        }
        if let Some((x, y)) = reading {
            sensor.apply(gateway, x, y);
        }
    }
}

impl SensorThread {
    /// Queue an accelerometer reading.
    pub fn submit(&self, x_axis: f32, y_axis: f32) {
        let _ = self.events.send(SensorEvent::Reading(x_axis, y_axis));
    }

    /// Change the display rotation used for later readings.
    pub fn set_rotation(&self, rotation: DisplayRotation) {
        let _ = self.events.send(SensorEvent::Rotation(rotation));
    }

    /// Stop the thread after it applies what is already queued, and wait.
    pub fn shutdown(&mut self) {
        let _ = self.events.send(SensorEvent::Shutdown);
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for SensorThread {
    fn drop(&mut self) {
        self.shutdown();
    }
}
