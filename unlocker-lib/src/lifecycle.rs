use std::{
    mem,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
};

use tracing::{error, info};

use crate::{
    address_validator::{validate, MemoryQuery, ValidatedTarget},
    channel_record::Status,
    config::AgentConfig,
    error::{codes, os_code, AgentError, ErrorSink},
    patch_loop::{PatchLoop, PatchReport},
    shared_channel::SharedChannel,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LifecycleState {
    Attaching,
    Validating,
    Running,
    Detaching,
    Failed,
    Stopped,
}

struct Running {
    channel: Arc<SharedChannel>,
    stop: Arc<AtomicBool>,
    worker: JoinHandle<PatchReport>,
    target: ValidatedTarget,
}

/// One attachment of the agent to its host, from opening the channel to the
/// patch loop's exit. Dropping it detaches.
pub struct Lifecycle<Q: MemoryQuery, S: ErrorSink> {
    config: AgentConfig,
    query: Q,
    sink: S,
    state: LifecycleState,
    running: Option<Running>,
}

impl<Q: MemoryQuery, S: ErrorSink> Lifecycle<Q, S> {
    pub fn new(config: AgentConfig, query: Q, sink: S) -> Self {
        Self {
            config,
            query,
            sink,
            state: LifecycleState::Attaching,
            running: None,
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn target(&self) -> Option<ValidatedTarget> {
        self.running.as_ref().map(|running| running.target)
    }

    pub fn query(&self) -> &Q {
        &self.query
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn attach(&mut self) -> Result<(), AgentError> {
        if self.state != LifecycleState::Attaching {
            return Err(AgentError::SystemCallFailed {
                operation: "attach",
                code: codes::BUSY,
            });
        }

        let channel = match SharedChannel::open(&self.config.channel) {
            Ok(channel) => Arc::new(channel),
            Err(err) => return Err(self.fail(None, err)),
        };

        self.state = LifecycleState::Validating;
        let target = match self.handshake(&channel) {
            Ok(target) => target,
            Err(err) => return Err(self.fail(Some(&*channel), err)),
        };

        if !channel.mailbox().advance_status(Status::ClientReady) {
            let err = AgentError::ChannelUnavailable {
                operation: "Handshake",
                code: codes::NOT_READY,
            };
            return Err(self.fail(Some(&*channel), err));
        }
        let stop = Arc::new(AtomicBool::new(false));
        let patch_loop = PatchLoop::new(channel.clone(), target, stop.clone(), &self.config.patch);
        let worker = match thread::Builder::new()
            .name("patch-loop".to_owned())
            .spawn(move || patch_loop.run())
        {
            Ok(worker) => worker,
            Err(err) => {
                let err = AgentError::SystemCallFailed {
                    operation: "CreateThread",
                    code: os_code(&err),
                };
                return Err(self.fail(Some(&*channel), err));
            }
        };

        self.running = Some(Running {
            channel,
            stop,
            worker,
            target,
        });
        self.state = LifecycleState::Running;
        info!("attached");
        Ok(())
    }

    /// Checks the handshake state and captures the target. The address is read
    /// from the channel here and never again.
    fn handshake(&self, channel: &SharedChannel) -> Result<ValidatedTarget, AgentError> {
        let mailbox = channel.mailbox();
        let status = mailbox.status();
        if status != Status::HostAwaiting {
            error!("controller is not awaiting (status {:?})", status);
            return Err(AgentError::ChannelUnavailable {
                operation: "Handshake",
                code: codes::NOT_READY,
            });
        }
        validate(&self.query, mailbox.target_address())
    }

    fn fail(&mut self, channel: Option<&SharedChannel>, err: AgentError) -> AgentError {
        self.state = LifecycleState::Failed;
        if let Some(channel) = channel {
            channel.mailbox().advance_status(Status::Error);
        }
        error!("attach failed: {}", err);
        self.sink.report(err.operation(), err.code());
        err
    }

    /// Stops the patch loop and waits for it to publish its exit. Returns what
    /// the loop did, if it was running.
    pub fn detach(&mut self) -> Option<PatchReport> {
        let Some(running) = self.running.take() else {
            if self.state == LifecycleState::Attaching {
                self.state = LifecycleState::Stopped;
            }
            return None;
        };
        self.state = LifecycleState::Detaching;
        running.stop.store(true, Ordering::Release);
        let report = match running.worker.join() {
            Ok(report) => Some(report),
            Err(_) => {
                error!("patch loop panicked");
                running.channel.mailbox().advance_status(Status::Error);
                None
            }
        };
        self.state = LifecycleState::Stopped;
        info!("detached");
        report
    }

    /// Detach for a terminating process. The patch thread may already have been
    /// killed without leaving a result, so it is asked to stop but never joined,
    /// and its handle and channel are leaked to the exiting process.
    pub fn abandon(&mut self) {
        if let Some(running) = self.running.take() {
            running.stop.store(true, Ordering::Release);
            mem::forget(running);
        }
        self.state = LifecycleState::Stopped;
        info!("abandoned");
    }
}

impl<Q: MemoryQuery, S: ErrorSink> Drop for Lifecycle<Q, S> {
    fn drop(&mut self) {
        self.detach();
    }
}
