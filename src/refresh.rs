//! Periodic refresh.
//!
//! The [`RefreshDriver`] requests a frame from the acquisition task at a
//! fixed interval and hands it to the registered [`FrameConsumer`]s. It is
//! either idle or armed, as set through a [`RefreshControl`].
//!
//! The driver waits for each capture before arming the next tick, so
//! captures never overlap. Ticks that are missed because a capture took
//! longer than the interval are skipped. A new interval takes effect after
//! the capture in progress, counting from the moment it is processed.

use crate::acquisition::AcquisitionHandle;
use crate::error::Error;
use crate::frame::Frame;
use anyhow::Result;
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::time::{Instant, MissedTickBehavior};

/// Receiver of captured frames.
///
/// Consumers are called from the refresh task, so they should return
/// quickly, well within the refresh interval.
pub trait FrameConsumer: Send + Sync {
    /// Handles a new frame.
    fn on_frame(&self, frame: &Arc<Frame>);
}

impl<F> FrameConsumer for F
where
    F: Fn(&Arc<Frame>) + Send + Sync,
{
    fn on_frame(&self, frame: &Arc<Frame>) {
        self(frame)
    }
}

/// Frame stream consumer.
///
/// Sends each frame, serialized with [`Frame::to_f32_bytes`], into a
/// [`broadcast::Sender`], from which the websocket clients receive.
#[derive(Debug, Clone)]
pub struct FrameStream(broadcast::Sender<Bytes>);

impl FrameStream {
    /// Creates a frame stream consumer.
    pub fn new(sender: broadcast::Sender<Bytes>) -> FrameStream {
        FrameStream(sender)
    }
}

impl FrameConsumer for FrameStream {
    fn on_frame(&self, frame: &Arc<Frame>) {
        if self.0.receiver_count() > 0 {
            // It is ok if send returns Err, because the last receiver might
            // have been dropped in the meantime.
            let _ = self.0.send(frame.to_f32_bytes());
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq)]
struct Schedule {
    interval: Duration,
    running: bool,
}

/// Refresh control.
///
/// Gives shared access to the interval and state of the [`RefreshDriver`].
#[derive(Debug, Clone)]
pub struct RefreshControl(Arc<watch::Sender<Schedule>>);

impl RefreshControl {
    /// Creates a refresh control.
    ///
    /// Fails if `interval` is zero or longer than [`MAX_INTERVAL`].
    pub fn new(interval: Duration, running: bool) -> Result<RefreshControl, Error> {
        check_interval(interval)?;
        Ok(RefreshControl(Arc::new(watch::Sender::new(Schedule {
            interval,
            running,
        }))))
    }

    /// Returns the refresh interval.
    pub fn interval(&self) -> Duration {
        self.0.borrow().interval
    }

    /// Sets the refresh interval.
    ///
    /// Fails if `interval` is zero or longer than [`MAX_INTERVAL`].
    pub fn set_interval(&self, interval: Duration) -> Result<(), Error> {
        check_interval(interval)?;
        self.0.send_if_modified(|schedule| {
            let modified = schedule.interval != interval;
            schedule.interval = interval;
            modified
        });
        Ok(())
    }

    /// Returns `true` if the periodic refresh is armed.
    pub fn is_running(&self) -> bool {
        self.0.borrow().running
    }

    /// Arms the periodic refresh. The first frame is captured immediately.
    pub fn start(&self) {
        self.set_running(true)
    }

    /// Stops the periodic refresh after the capture in progress.
    pub fn stop(&self) {
        self.set_running(false)
    }

    fn set_running(&self, running: bool) {
        self.0.send_if_modified(|schedule| {
            let modified = schedule.running != running;
            schedule.running = running;
            modified
        });
    }
}

/// Longest refresh interval accepted.
pub const MAX_INTERVAL: Duration = Duration::from_secs(3600);

fn check_interval(interval: Duration) -> Result<(), Error> {
    if interval.is_zero() || interval > MAX_INTERVAL {
        return Err(Error::InvalidInterval(interval));
    }
    Ok(())
}

/// Periodic refresh driver.
pub struct RefreshDriver {
    acquisition: AcquisitionHandle,
    schedule: watch::Receiver<Schedule>,
    consumers: Vec<Box<dyn FrameConsumer>>,
}

impl std::fmt::Debug for RefreshDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> Result<(), std::fmt::Error> {
        f.debug_struct("RefreshDriver")
            .field("acquisition", &self.acquisition)
            .field("schedule", &*self.schedule.borrow())
            .field("consumers", &self.consumers.len())
            .finish()
    }
}

impl RefreshDriver {
    /// Creates a refresh driver controlled by `control`.
    pub fn new(acquisition: AcquisitionHandle, control: &RefreshControl) -> RefreshDriver {
        RefreshDriver {
            acquisition,
            schedule: control.0.subscribe(),
            consumers: Vec::new(),
        }
    }

    /// Registers a consumer for the periodically captured frames.
    pub fn add_consumer(&mut self, consumer: impl FrameConsumer + 'static) {
        self.consumers.push(Box::new(consumer));
    }

    /// Runs the refresh driver.
    ///
    /// Only returns when the acquisition task stops or all the
    /// [`RefreshControl`]s are dropped.
    #[tracing::instrument(name = "refresh", skip_all)]
    pub async fn run(mut self) -> Result<()> {
        let mut armed = false;
        loop {
            let schedule = *self.schedule.borrow_and_update();
            if !schedule.running {
                if armed {
                    tracing::info!("periodic refresh stopped");
                }
                armed = false;
                if self.schedule.changed().await.is_err() {
                    return Ok(());
                }
                continue;
            }

            let first_tick = if armed {
                tracing::info!(interval = ?schedule.interval, "refresh interval changed");
                Instant::now().checked_add(schedule.interval)
            } else {
                tracing::info!(interval = ?schedule.interval, "periodic refresh started");
                Some(Instant::now())
            };
            let Some(first_tick) = first_tick else {
                tracing::error!(interval = ?schedule.interval, "refresh interval out of range");
                armed = false;
                if self.schedule.changed().await.is_err() {
                    return Ok(());
                }
                continue;
            };
            armed = true;
            let mut ticker = tokio::time::interval_at(first_tick, schedule.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    biased;
                    changed = self.schedule.changed() => {
                        if changed.is_err() {
                            return Ok(());
                        }
                        break;
                    }
                    _ = ticker.tick() => self.refresh().await?,
                }
            }
        }
    }

    async fn refresh(&self) -> Result<(), Error> {
        match self.acquisition.capture().await {
            Ok(frame) => {
                for consumer in &self.consumers {
                    consumer.on_frame(&frame);
                }
                Ok(())
            }
            Err(Error::AcquisitionStopped) => Err(Error::AcquisitionStopped),
            Err(error) => {
                // the capture has already left the core in reset, so the
                // next tick can try again
                tracing::warn!(%error, "periodic capture failed");
                Ok(())
            }
        }
    }
}
