//! Mount host: owns a provider, the open-context registry and the request
//! loop serving the driver boundary.
//!
//! Requests arrive over a channel as [`DriverRequest`] values, each carrying
//! a reply slot. The host dispatches every request on its own task, bounded
//! by `thread_count` concurrent workers, and guarantees exclusive ownership
//! of a context for the duration of the operation by taking it out of the
//! registry and putting it back afterwards. Provider errors cross the
//! boundary as negative errno-style statuses; the error enum never leaks
//! through.

mod status;

pub use status::{status_of, STATUS_BAD_HANDLE};

use crate::error::{FileSystemError, FsResult};
use crate::provider::{
    CreationParams, FileContext, FileInfo, FileInfoFlags, FileSystemProvider, VolumeInfo,
    VolumeInfoFlags,
};
use crate::util;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, Notify, Semaphore};

const REQUEST_QUEUE_DEPTH: usize = 128;

/// Mount-time parameters, mirroring what a native volume driver accepts.
#[derive(Debug, Clone)]
pub struct MountConfig {
    pub mount_point: String,
    /// Network redirector name for UNC-style access; empty when unused.
    pub unc_name: String,
    /// Upper bound on concurrently dispatched operations.
    pub thread_count: usize,
    /// Driver interface version reported at mount.
    pub version: u32,
    /// Per-operation deadline reported to the driver; calls are never
    /// interrupted, an overrun is only logged.
    pub timeout: Duration,
    pub debug: bool,
}

impl Default for MountConfig {
    fn default() -> Self {
        MountConfig {
            mount_point: String::new(),
            unc_name: String::new(),
            thread_count: 4,
            version: 100,
            timeout: Duration::from_secs(15),
            debug: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostState {
    Created,
    Running,
    Stopping,
    Stopped,
}

type Reply<T> = oneshot::Sender<Result<T, i32>>;

/// One operation crossing the driver boundary. Paths may use either
/// separator; the host normalizes before they reach the provider.
#[derive(Debug)]
pub enum DriverRequest {
    GetVolumeInfo {
        flags: VolumeInfoFlags,
        reply: Reply<VolumeInfo>,
    },
    Create {
        path: String,
        params: CreationParams,
        reply: Reply<u64>,
    },
    Open {
        path: String,
        params: CreationParams,
        reply: Reply<u64>,
    },
    Read {
        handle: u64,
        len: usize,
        offset: u64,
        reply: Reply<Vec<u8>>,
    },
    Write {
        handle: u64,
        data: Vec<u8>,
        offset: u64,
        write_to_eof: bool,
        reply: Reply<usize>,
    },
    Close {
        handle: u64,
        reply: Reply<()>,
    },
    Delete {
        handle: u64,
        check_only: bool,
        reply: Reply<()>,
    },
    Rename {
        handle: u64,
        new_path: String,
        replace_if_exists: bool,
        reply: Reply<()>,
    },
    GetFileInfo {
        handle: u64,
        reply: Reply<FileInfo>,
    },
    SetFileInfo {
        handle: u64,
        info: FileInfo,
        flags: FileInfoFlags,
        reply: Reply<()>,
    },
    FindFiles {
        handle: u64,
        pattern: String,
        reply: Reply<BTreeMap<String, FileInfo>>,
    },
}

struct Shared {
    provider: Arc<dyn FileSystemProvider>,
    contexts: Mutex<HashMap<u64, FileContext>>,
    opened: AtomicUsize,
}

impl Shared {
    /// Exclusive checkout; concurrent operations on the same handle see it
    /// as absent and fail with a bad-handle status.
    fn take(&self, handle: u64) -> Option<FileContext> {
        self.contexts.lock().unwrap().remove(&handle)
    }

    fn put_back(&self, ctx: FileContext) {
        self.contexts.lock().unwrap().insert(ctx.handle, ctx);
    }
}

pub struct FileSystemHost {
    config: MountConfig,
    shared: Arc<Shared>,
    state: Mutex<HostState>,
    tx: Mutex<Option<mpsc::Sender<DriverRequest>>>,
    rx: Mutex<Option<mpsc::Receiver<DriverRequest>>>,
    shutdown: Notify,
}

impl FileSystemHost {
    pub fn new(provider: impl FileSystemProvider + 'static, config: MountConfig) -> Self {
        let (tx, rx) = mpsc::channel(REQUEST_QUEUE_DEPTH);
        FileSystemHost {
            config,
            shared: Arc::new(Shared {
                provider: Arc::new(provider),
                contexts: Mutex::new(HashMap::new()),
                opened: AtomicUsize::new(0),
            }),
            state: Mutex::new(HostState::Created),
            tx: Mutex::new(Some(tx)),
            rx: Mutex::new(Some(rx)),
            shutdown: Notify::new(),
        }
    }

    pub fn state(&self) -> HostState {
        *self.state.lock().unwrap()
    }

    pub fn is_running(&self) -> bool {
        self.state() == HostState::Running
    }

    pub fn mount_point(&self) -> &str {
        &self.config.mount_point
    }

    pub fn opened_files(&self) -> usize {
        self.shared.opened.load(Ordering::SeqCst)
    }

    /// Handle for submitting requests. Must be obtained before `run`; once
    /// the loop starts, the host no longer hands out connectors.
    pub fn connector(&self) -> FsResult<mpsc::Sender<DriverRequest>> {
        self.tx
            .lock()
            .unwrap()
            .clone()
            .ok_or(FileSystemError::InitFailure)
    }

    fn set_state(&self, state: HostState) {
        *self.state.lock().unwrap() = state;
    }

    /// Serves requests until `stop` is called or every connector is dropped.
    /// Runs at most once per host.
    pub async fn run(&self) -> FsResult<()> {
        let mut rx = {
            let mut slot = self.rx.lock().unwrap();
            match *self.state.lock().unwrap() {
                HostState::Created => {}
                _ => return Err(FileSystemError::InitFailure),
            }
            slot.take().ok_or(FileSystemError::InitFailure)?
        };
        // Dropping our own sender makes connector-drop equivalent to unmount.
        self.tx.lock().unwrap().take();
        self.set_state(HostState::Running);
        let _ = env_logger::Builder::from_default_env().try_init();

        let limit = self.config.thread_count.max(1);
        info!(
            "mounted {:?} (driver v{}, {} workers)",
            self.config.mount_point, self.config.version, limit
        );
        if !self.config.unc_name.is_empty() {
            info!("unc name {:?}", self.config.unc_name);
        }

        let workers = Arc::new(Semaphore::new(limit));
        loop {
            let request = tokio::select! {
                _ = self.shutdown.notified() => break,
                request = rx.recv() => match request {
                    Some(request) => request,
                    None => break,
                },
            };
            if self.config.debug {
                debug!("request {request:?}");
            }
            let permit = workers
                .clone()
                .acquire_owned()
                .await
                .map_err(|_| FileSystemError::GeneralError)?;
            let shared = self.shared.clone();
            let timeout = self.config.timeout;
            tokio::spawn(async move {
                // In-flight operations always run to completion; cancelling
                // mid-dispatch would strand the checked-out context.
                let started = tokio::time::Instant::now();
                dispatch(&shared, request).await;
                let elapsed = started.elapsed();
                if elapsed > timeout {
                    warn!("operation took {elapsed:?}, past the {timeout:?} deadline");
                }
                drop(permit);
            });
        }

        self.set_state(HostState::Stopping);
        // Wait for in-flight operations to finish.
        let _ = workers.acquire_many(limit as u32).await;

        let leftover: Vec<FileContext> = {
            let mut contexts = self.shared.contexts.lock().unwrap();
            contexts.drain().map(|(_, ctx)| ctx).collect()
        };
        for mut ctx in leftover {
            warn!("closing leaked handle {} ({})", ctx.handle, ctx.path);
            if let Err(err) = self.shared.provider.close(&mut ctx).await {
                warn!("close on unmount failed for {}: {err}", ctx.path);
            }
            self.shared.opened.fetch_sub(1, Ordering::SeqCst);
        }

        self.set_state(HostState::Stopped);
        info!("unmounted {:?}", self.config.mount_point);
        Ok(())
    }

    /// Requests shutdown; idempotent, safe before and after `run`.
    pub fn stop(&self) {
        self.shutdown.notify_one();
    }
}

async fn dispatch(shared: &Shared, request: DriverRequest) {
    match request {
        DriverRequest::GetVolumeInfo { flags, reply } => {
            let result = shared.provider.get_volume_info(flags).await;
            let _ = reply.send(result.map_err(status_of));
        }
        DriverRequest::Create {
            path,
            params,
            reply,
        } => {
            let _ = reply.send(enroll(shared, path, params, true).await);
        }
        DriverRequest::Open {
            path,
            params,
            reply,
        } => {
            let _ = reply.send(enroll(shared, path, params, false).await);
        }
        DriverRequest::Read {
            handle,
            len,
            offset,
            reply,
        } => {
            let _ = reply.send(
                with_context(shared, handle, |ctx| async move {
                    let mut buf = vec![0u8; len];
                    let n = shared.provider.read(&ctx, &mut buf, offset).await;
                    let result = n.map(|n| {
                        buf.truncate(n);
                        buf
                    });
                    (ctx, result)
                })
                .await,
            );
        }
        DriverRequest::Write {
            handle,
            data,
            offset,
            write_to_eof,
            reply,
        } => {
            let _ = reply.send(
                with_context(shared, handle, |ctx| async move {
                    let result = shared.provider.write(&ctx, &data, offset, write_to_eof).await;
                    (ctx, result)
                })
                .await,
            );
        }
        DriverRequest::Close { handle, reply } => {
            let Some(mut ctx) = shared.take(handle) else {
                let _ = reply.send(Err(STATUS_BAD_HANDLE));
                return;
            };
            let result = shared.provider.close(&mut ctx).await;
            // Closed contexts never return to the registry, even on error.
            shared.opened.fetch_sub(1, Ordering::SeqCst);
            let _ = reply.send(result.map_err(status_of));
        }
        DriverRequest::Delete {
            handle,
            check_only,
            reply,
        } => {
            let _ = reply.send(
                with_context(shared, handle, |ctx| async move {
                    let result = shared.provider.delete(&ctx, check_only).await;
                    (ctx, result)
                })
                .await,
            );
        }
        DriverRequest::Rename {
            handle,
            new_path,
            replace_if_exists,
            reply,
        } => {
            let _ = reply.send(
                with_context(shared, handle, |mut ctx| async move {
                    let result = shared
                        .provider
                        .rename(&mut ctx, &new_path, replace_if_exists)
                        .await;
                    (ctx, result)
                })
                .await,
            );
        }
        DriverRequest::GetFileInfo { handle, reply } => {
            let _ = reply.send(
                with_context(shared, handle, |ctx| async move {
                    let result = shared.provider.get_file_info(&ctx).await;
                    (ctx, result)
                })
                .await,
            );
        }
        DriverRequest::SetFileInfo {
            handle,
            info,
            flags,
            reply,
        } => {
            let _ = reply.send(
                with_context(shared, handle, |ctx| async move {
                    let result = shared.provider.set_file_info(&ctx, &info, flags).await;
                    (ctx, result)
                })
                .await,
            );
        }
        DriverRequest::FindFiles {
            handle,
            pattern,
            reply,
        } => {
            let _ = reply.send(
                with_context(shared, handle, |ctx| async move {
                    let result = shared.provider.find_files(&ctx, &pattern).await;
                    (ctx, result)
                })
                .await,
            );
        }
    }
}

/// `create`/`open` entry: normalizes the path, registers the resulting
/// context and answers with its handle.
async fn enroll(
    shared: &Shared,
    path: String,
    params: CreationParams,
    create: bool,
) -> Result<u64, i32> {
    let mut ctx = FileContext::new(util::normalize_path(&path), params.directory);
    let result = if create {
        shared.provider.create(&mut ctx, &params).await
    } else {
        shared.provider.open(&mut ctx, &params).await
    };
    result.map_err(status_of)?;
    let handle = ctx.handle;
    shared.opened.fetch_add(1, Ordering::SeqCst);
    shared.put_back(ctx);
    Ok(handle)
}

async fn with_context<T, F, Fut>(shared: &Shared, handle: u64, op: F) -> Result<T, i32>
where
    F: FnOnce(FileContext) -> Fut,
    Fut: std::future::Future<Output = (FileContext, FsResult<T>)>,
{
    let Some(ctx) = shared.take(handle) else {
        return Err(STATUS_BAD_HANDLE);
    };
    let (ctx, result) = op(ctx).await;
    shared.put_back(ctx);
    result.map_err(status_of)
}
