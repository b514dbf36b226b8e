use std::{future::Future, sync::Arc};

use shared::domain::{ConnectionState, ReactionKind, ServerMessageId, UserId};
use tokio::{
    sync::mpsc,
    task::{AbortHandle, JoinHandle},
    time::{interval, interval_at, sleep, Instant, MissedTickBehavior},
};
use tracing::{debug, info, warn};

use crate::{
    backend::PushEvent,
    room::{PollPath, RoomView},
};

/// Tasks tied to the lifetime of one open room.
#[derive(Default)]
pub(crate) struct RoomTasks {
    handles: Vec<AbortHandle>,
}

impl RoomTasks {
    pub(crate) fn spawn<F>(&mut self, task: F) -> JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(task);
        self.handles.retain(|existing| !existing.is_finished());
        self.handles.push(handle.abort_handle());
        handle
    }

    pub(crate) fn cancel_all(&mut self) {
        for handle in self.handles.drain(..) {
            handle.abort();
        }
    }
}

impl Drop for RoomTasks {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

/// The returned handle resolves once the initial load is done or cancelled.
pub(crate) fn start(view: &Arc<RoomView>, tasks: &mut RoomTasks) -> JoinHandle<()> {
    tasks.spawn(run_push(Arc::clone(view)));
    tasks.spawn(run_primary_poll(Arc::clone(view)));
    tasks.spawn(run_backup_poll(Arc::clone(view)));

    let initial = Arc::clone(view);
    tasks.spawn(async move {
        initial.poll_once(PollPath::Initial).await;
    })
}

#[derive(Debug)]
pub(crate) struct QueuedToggle {
    pub(crate) message_id: ServerMessageId,
    pub(crate) user: UserId,
    pub(crate) kind: ReactionKind,
}

/// Outlives the room's [`RoomTasks`]; ends once the sender is dropped and
/// the queue is drained.
pub(crate) fn spawn_reaction_dispatch(
    view: Arc<RoomView>,
) -> mpsc::UnboundedSender<QueuedToggle> {
    let (tx, mut rx) = mpsc::unbounded_channel::<QueuedToggle>();
    tokio::spawn(async move {
        while let Some(toggle) = rx.recv().await {
            view.sync_reaction(toggle.message_id, toggle.user, toggle.kind)
                .await;
        }
        debug!(room = ?view.topic(), "reaction dispatch drained");
    });
    tx
}

async fn run_push(view: Arc<RoomView>) {
    let mut subscription = match view.backend().subscribe(view.topic()).await {
        Ok(subscription) => subscription,
        Err(err) => {
            warn!(room = ?view.topic(), %err, "push subscribe failed");
            view.report_status(ConnectionState::ChannelError);
            return;
        }
    };
    debug!(room = ?view.topic(), "push subscription registered");

    let ack_deadline = sleep(view.settings().subscribe_timeout);
    tokio::pin!(ack_deadline);

    loop {
        tokio::select! {
            event = subscription.next_event() => match event {
                Some(PushEvent::Message(message)) => view.apply_push(message).await,
                Some(PushEvent::Status(status)) => {
                    view.report_status(status);
                }
                None => {
                    warn!(room = ?view.topic(), "push channel closed");
                    view.report_status(ConnectionState::ChannelError);
                    break;
                }
            },
            () = &mut ack_deadline, if view.connection_state() == ConnectionState::Unknown => {
                warn!(room = ?view.topic(), "push subscription was not acknowledged in time");
                view.report_status(ConnectionState::TimedOut);
            }
        }
    }

    subscription.unsubscribe();
}

/// Sole source of truth once the push channel has failed.
async fn run_primary_poll(view: Arc<RoomView>) {
    let mut status = view.watch_connection();
    let failed = status
        .wait_for(|state| state.is_failed())
        .await
        .map(|state| *state);
    let Ok(state) = failed else {
        return;
    };
    info!(room = ?view.topic(), ?state, "push channel unavailable; primary poll active");

    let mut ticker = interval(view.settings().primary_poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        view.poll_once(PollPath::Primary).await;
    }
}

async fn run_backup_poll(view: Arc<RoomView>) {
    let period = view.settings().backup_poll_interval;
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        if view.connection_state() == ConnectionState::Subscribed {
            continue;
        }
        view.poll_once(PollPath::Backup).await;
    }
}

#[cfg(test)]
#[path = "tests/delivery_tests.rs"]
mod tests;
