//! Resource Streamer
//!
//! A small pool of worker threads that runs texture decode work off the
//! main thread. Requests go in over a channel; completed loads come back
//! over another and are drained once per frame by the texture resource
//! manager's `dispatch` on the GPU-owning thread.
//!
//! When the backend reports
//! [`native_multithreading`](crate::rhi::Capabilities::native_multithreading),
//! workers also build the GPU texture, so dispatch only hands the finished
//! object over; otherwise dispatch performs the upload itself. Either way
//! a committed request always completes or reports failure through the
//! owning resource's loading state; there is no cancellation.

use std::sync::Arc;
use std::thread::JoinHandle;

use crate::asset::{AssetId, AssetProvider};
use crate::errors::{EngineError, Result};
use crate::rhi::{RhiDevice, RhiTexture};
use crate::texture::loader::{
    DecodedTexture, LoadContext, LoaderKind, create_gpu_texture, make_loader,
};
use crate::texture::resource::TextureResourceId;

/// One committed texture load.
#[derive(Debug, Clone)]
pub struct LoadRequest {
    pub asset_id: AssetId,
    pub resource_id: TextureResourceId,
    pub loader_kind: LoaderKind,
    pub srgb: bool,
    pub reload: bool,
    /// Global top-mipmap-stripping policy at commit time.
    pub top_mips_to_remove: u32,
}

/// A finished load, successful or not.
pub(crate) struct LoadResult {
    pub request: LoadRequest,
    pub outcome: Result<CompletedLoad>,
}

/// Payload of a successful load. `gpu` is already populated when the
/// worker was allowed to create resources; otherwise the upload happens
/// at dispatch time from `decoded`.
pub(crate) struct CompletedLoad {
    pub decoded: DecodedTexture,
    pub gpu: Option<RhiTexture>,
}

/// Worker pool accepting texture load requests.
pub struct ResourceStreamer {
    request_tx: Option<flume::Sender<LoadRequest>>,
    result_rx: flume::Receiver<LoadResult>,
    workers: Vec<JoinHandle<()>>,
}

impl ResourceStreamer {
    /// Spawns `worker_count` loader threads.
    #[must_use]
    pub fn new(
        worker_count: usize,
        provider: Arc<dyn AssetProvider>,
        device: Arc<dyn RhiDevice>,
    ) -> Self {
        let (request_tx, request_rx) = flume::unbounded::<LoadRequest>();
        let (result_tx, result_rx) = flume::unbounded::<LoadResult>();

        let worker_count = worker_count.max(1);
        let mut workers = Vec::with_capacity(worker_count);
        for index in 0..worker_count {
            let request_rx = request_rx.clone();
            let result_tx = result_tx.clone();
            let provider = Arc::clone(&provider);
            let device = Arc::clone(&device);
            let handle = std::thread::Builder::new()
                .name(format!("ember-streamer-{index}"))
                .spawn(move || {
                    while let Ok(request) = request_rx.recv() {
                        let result = run_load(&*provider, &*device, request);
                        if result_tx.send(result).is_err() {
                            break;
                        }
                    }
                })
                .expect("failed to spawn streamer worker thread");
            workers.push(handle);
        }

        Self {
            request_tx: Some(request_tx),
            result_rx,
            workers,
        }
    }

    /// Enqueues a load. The request is owned by the streamer until its
    /// result is drained; there is no way to cancel it.
    pub fn commit_load_request(&self, request: LoadRequest) -> Result<()> {
        log::debug!(
            "committing load for {:?} (loader {:?}, reload {})",
            request.asset_id,
            request.loader_kind,
            request.reload
        );
        self.request_tx
            .as_ref()
            .ok_or(EngineError::StreamerShutDown)?
            .send(request)
            .map_err(|_| EngineError::StreamerShutDown)
    }

    /// Drains every finished load without blocking.
    pub(crate) fn drain_results(&self) -> Vec<LoadResult> {
        self.result_rx.try_iter().collect()
    }
}

impl Drop for ResourceStreamer {
    fn drop(&mut self) {
        // Closing the request channel lets the workers run dry and exit.
        self.request_tx = None;
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

fn run_load(provider: &dyn AssetProvider, device: &dyn RhiDevice, request: LoadRequest) -> LoadResult {
    // Loader failures must never cross the thread boundary as unwinds;
    // they surface only through the resource's loading state.
    let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        let bytes = provider.read(request.asset_id)?;
        let mut loader = make_loader(request.loader_kind);
        let ctx = LoadContext {
            asset_id: request.asset_id,
            srgb: request.srgb,
            top_mips_to_remove: request.top_mips_to_remove,
            capabilities: device.capabilities(),
            provider,
        };
        let decoded = loader.decode(&bytes, &ctx)?;
        let gpu = if device.capabilities().native_multithreading {
            Some(create_gpu_texture(device, &decoded)?)
        } else {
            None
        };
        Ok(CompletedLoad { decoded, gpu })
    }))
    .unwrap_or_else(|_| {
        Err(EngineError::TextureDecode {
            asset_id: request.asset_id,
            reason: "loader panicked".into(),
        })
    });

    LoadResult { request, outcome }
}
