//! rfsoc-inspector application.
//!
//! This module contains a top-level structure [`App`] that represents the whole
//! rfsoc-inspector application and a structure [`AppState`] that contains the
//! application state.

use crate::{
    acquisition::{Acquisition, AcquisitionHandle},
    args::Args,
    httpd,
    inspector::{Config, HardwareInspector},
    presentation::PresentationConfig,
    refresh::{FrameStream, RefreshControl, RefreshDriver},
    sim::{self, SimulatedDma},
};
use anyhow::{Context, Result};
use futures::future::{BoxFuture, FutureExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

// Transfer latency and buffer capacity of the simulated peripheral.
const SIMULATED_LATENCY: Duration = Duration::from_millis(5);
const SIMULATED_CAPACITY: usize = 1 << 20;

/// rfsoc-inspector application.
///
/// This struct represents the rfsoc-inspector application. It owns the
/// different objects of which the application is formed, and runs them
/// concurrently.
pub struct App {
    httpd: httpd::Server,
    acquisition: BoxFuture<'static, Result<()>>,
    refresh: RefreshDriver,
}

impl std::fmt::Debug for App {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> Result<(), std::fmt::Error> {
        f.debug_struct("App")
            .field("httpd", &self.httpd)
            .field("refresh", &self.refresh)
            .finish_non_exhaustive()
    }
}

impl App {
    /// Creates a new application.
    #[tracing::instrument(name = "App::new", level = "debug")]
    pub async fn new(args: &Args) -> Result<App> {
        let config = Config {
            packet_size: args.packet_size,
            fractional_bits: args.fractional_bits,
            autoscale: args.autoscale,
            ..Default::default()
        };
        let (acquisition, acquisition_handle) = if args.simulate {
            tracing::info!("using simulated peripheral");
            let inspector = sim::inspector(
                SimulatedDma::new(SIMULATED_LATENCY),
                SIMULATED_CAPACITY,
                &config,
            )?;
            let (acquisition, handle) = Acquisition::new(inspector, args.dma_timeout())?;
            (acquisition.run().boxed(), handle)
        } else {
            let inspector =
                HardwareInspector::open(&args.inspector_uio, &args.dma_uio, &args.udmabuf, &config)
                    .await?;
            let (acquisition, handle) = Acquisition::new(inspector, args.dma_timeout())?;
            (acquisition.run().boxed(), handle)
        };

        let interval =
            Duration::try_from_secs_f64(args.plotting_rate).context("invalid plotting rate")?;
        let refresh_control = RefreshControl::new(interval, !args.stopped)?;
        let presentation = PresentationConfig::new(args.sampling_frequency, args.axis_range)?;

        let (frame_sender, _) = broadcast::channel(16);
        let mut refresh = RefreshDriver::new(acquisition_handle.clone(), &refresh_control);
        refresh.add_consumer(FrameStream::new(frame_sender.clone()));

        let state = AppState::new(acquisition_handle, refresh_control, presentation);
        let httpd = httpd::Server::new(&args.listen, state, frame_sender).await?;

        Ok(App {
            httpd,
            acquisition,
            refresh,
        })
    }

    /// Runs the application.
    ///
    /// This only returns if one of the objects that form the application fails.
    #[tracing::instrument(name = "App::run", level = "debug", skip_all)]
    pub async fn run(self) -> Result<()> {
        tokio::select! {
            ret = self.httpd.run() => ret,
            ret = self.acquisition => ret,
            ret = self.refresh.run() => ret,
        }
    }
}

/// Application state.
///
/// This struct contains the application state that needs to be shared between
/// different modules, such as different Axum handlers in the HTTP server. The
/// struct behaves as an `Arc<...>`. It is cheaply clonable and clones represent
/// a reference to a shared object.
#[derive(Debug, Clone)]
pub struct AppState(Arc<State>);

#[derive(Debug)]
struct State {
    acquisition: AcquisitionHandle,
    refresh: RefreshControl,
    presentation: PresentationConfig,
}

impl AppState {
    /// Creates the application state.
    pub fn new(
        acquisition: AcquisitionHandle,
        refresh: RefreshControl,
        presentation: PresentationConfig,
    ) -> AppState {
        AppState(Arc::new(State {
            acquisition,
            refresh,
            presentation,
        }))
    }

    /// Gives access to the acquisition task.
    pub fn acquisition(&self) -> &AcquisitionHandle {
        &self.0.acquisition
    }

    /// Gives access to the periodic refresh settings.
    pub fn refresh(&self) -> &RefreshControl {
        &self.0.refresh
    }

    /// Gives access to the plotting settings.
    pub fn presentation(&self) -> &PresentationConfig {
        &self.0.presentation
    }
}
