//! The per-actor task: init, sequential mailbox drain, bounded terminate.
//!
//! One tokio task per actor is the scheduling unit; a handler runs to
//! completion before the next message is taken, so an actor's observations of
//! its own state never interleave. A watchdog task owns the `JoinHandle` and
//! completes the termination cascade when the cell dies without cleaning up
//! (handler panic, force kill).

// Layer 1: Standard library imports
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

// Layer 2: Third-party crate imports
use chrono::Utc;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::oneshot;
use tokio::time::{timeout, Instant};
use tracing::{debug, warn};

// Layer 3: Internal module imports
use super::mailbox::MailboxMsg;
use super::shared::{CellHandle, SystemShared};
use super::status::ActorStatus;
use crate::actor::{ActorError, Behavior, CallOutcome, CastOutcome, ExitReason};
use crate::events::LifecycleEvent;

/// Spawn the cell and its watchdog; returns the init completion channel.
pub(crate) fn spawn_cell<B: Behavior>(
    shared: &Arc<SystemShared>,
    behavior: Arc<B>,
    handle: Arc<CellHandle>,
    rx: UnboundedReceiver<MailboxMsg>,
    init_timeout: Duration,
    shutdown_timeout: Duration,
) -> oneshot::Receiver<Result<(), ActorError>> {
    let (init_tx, init_rx) = oneshot::channel();

    let cell_shared = Arc::clone(shared);
    let cell_handle = Arc::clone(&handle);
    let join = tokio::spawn(run_cell(
        behavior,
        cell_shared,
        cell_handle,
        rx,
        init_tx,
        init_timeout,
        shutdown_timeout,
    ));
    *handle.abort.lock() = Some(join.abort_handle());

    let dog_shared = Arc::clone(shared);
    let dog_handle = Arc::clone(&handle);
    tokio::spawn(async move {
        let result = join.await;
        if dog_handle.terminated() {
            return;
        }
        let reason = dog_handle.kill_reason.lock().take().unwrap_or_else(|| {
            match &result {
                Err(err) if err.is_panic() => ExitReason::error("handler panicked"),
                _ => ExitReason::error("actor task ended unexpectedly"),
            }
        });
        dog_shared.finish_termination(dog_handle.server.id, reason);
    });

    init_rx
}

async fn run_cell<B: Behavior>(
    behavior: Arc<B>,
    shared: Arc<SystemShared>,
    handle: Arc<CellHandle>,
    mut rx: UnboundedReceiver<MailboxMsg>,
    init_tx: oneshot::Sender<Result<(), ActorError>>,
    init_timeout: Duration,
    shutdown_timeout: Duration,
) {
    let id = handle.server.id;

    // Phase 1: init, bounded. Failure means the actor never ran.
    let state = match timeout(init_timeout, behavior.init()).await {
        Err(_) => {
            let err = ActorError::InitTimeout(init_timeout);
            shared.finish_termination(id, err.start_exit_reason());
            let _ = init_tx.send(Err(err));
            return;
        }
        Ok(Err(cause)) => {
            let err = ActorError::InitFailed(cause.to_string());
            shared.finish_termination(id, err.start_exit_reason());
            let _ = init_tx.send(Err(err));
            return;
        }
        Ok(Ok(state)) => state,
    };

    handle.started.store(true, Ordering::SeqCst);
    handle.status.advance(ActorStatus::Running);
    shared.events.publish(LifecycleEvent::Started {
        server: handle.server.clone(),
        name: handle.name.clone(),
        at: Utc::now(),
    });
    let _ = init_tx.send(Ok(()));

    // Phase 2: sequential mailbox drain.
    let mut state = state;
    let exit_reason = loop {
        let Some(msg) = rx.recv().await else {
            break ExitReason::Normal;
        };
        handle.metrics.on_dequeue();
        match msg {
            MailboxMsg::Call { msg, reply, deadline } => {
                if Instant::now() > deadline {
                    // Caller already timed out; its late reply is discarded.
                    continue;
                }
                match msg.downcast::<B::Call>() {
                    Ok(call) => match behavior.handle_call(*call, state).await {
                        CallOutcome::Reply(result, next) => {
                            // State is assigned before the reply is delivered.
                            state = next;
                            let _ = reply.send(Ok(Box::new(result)));
                        }
                        CallOutcome::Fail(cause, prior) => {
                            state = prior;
                            let _ = reply.send(Err(ActorError::Handler {
                                message: cause.to_string(),
                            }));
                        }
                    },
                    Err(_) => {
                        let _ = reply.send(Err(ActorError::TypeMismatch(id)));
                    }
                }
            }
            MailboxMsg::WireCall { msg, reply, deadline } => {
                if Instant::now() > deadline {
                    continue;
                }
                match serde_json::from_value::<B::Call>(msg) {
                    Err(err) => {
                        let _ = reply.send(Err(ActorError::Serialization(err.to_string())));
                    }
                    Ok(call) => match behavior.handle_call(call, state).await {
                        CallOutcome::Reply(result, next) => {
                            state = next;
                            let encoded = serde_json::to_value(&result)
                                .map_err(|err| ActorError::Serialization(err.to_string()));
                            let _ = reply.send(encoded);
                        }
                        CallOutcome::Fail(cause, prior) => {
                            state = prior;
                            let _ = reply.send(Err(ActorError::Handler {
                                message: cause.to_string(),
                            }));
                        }
                    },
                }
            }
            MailboxMsg::Cast { msg } => match msg.downcast::<B::Cast>() {
                Ok(cast) => match behavior.handle_cast(*cast, state).await {
                    CastOutcome::Next(next) => state = next,
                    CastOutcome::Fail(cause, prior) => {
                        state = prior;
                        shared.events.publish(LifecycleEvent::Crashed {
                            server: handle.server.clone(),
                            error: cause.to_string(),
                            at: Utc::now(),
                        });
                    }
                },
                Err(_) => {
                    debug!(actor = %id, "dropped cast with unexpected payload type");
                }
            },
            MailboxMsg::WireCast { msg } => match serde_json::from_value::<B::Cast>(msg) {
                Ok(cast) => match behavior.handle_cast(cast, state).await {
                    CastOutcome::Next(next) => state = next,
                    CastOutcome::Fail(cause, prior) => {
                        state = prior;
                        shared.events.publish(LifecycleEvent::Crashed {
                            server: handle.server.clone(),
                            error: cause.to_string(),
                            at: Utc::now(),
                        });
                    }
                },
                Err(err) => {
                    debug!(actor = %id, error = %err, "dropped undecodable wire cast");
                }
            },
            MailboxMsg::Info(info) => {
                state = behavior.handle_info(info, state).await;
            }
            MailboxMsg::Stop { reason } => break reason,
        }
    };

    // Phase 3: termination. Reject queued callers, run terminate bounded.
    handle.status.advance(ActorStatus::Stopping);
    rx.close();
    while let Ok(msg) = rx.try_recv() {
        handle.metrics.on_dequeue();
        match msg {
            MailboxMsg::Call { reply, .. } => {
                let _ = reply.send(Err(ActorError::ServerNotRunning));
            }
            MailboxMsg::WireCall { reply, .. } => {
                let _ = reply.send(Err(ActorError::ServerNotRunning));
            }
            _ => {}
        }
    }

    if timeout(shutdown_timeout, behavior.terminate(&exit_reason, state))
        .await
        .is_err()
    {
        warn!(actor = %id, "terminate exceeded its shutdown timeout");
    }

    shared.finish_termination(id, exit_reason);
}
