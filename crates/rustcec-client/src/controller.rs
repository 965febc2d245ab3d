//! The control-service worker that drives feature actions over a link.
//!
//! One thread owns the link, the message cache, the local device and every
//! running action. Callers talk to it through a [`CecControllerHandle`].

use crate::action::{ControlResult, Effect, PollRequest, RequestToken, TokenSource};
use crate::arc::{ArcConfig, ArcDirection, RequestArcAction};
use crate::cache::MessageCache;
use crate::discovery::{DeviceDiscoveryAction, DiscoveryConfig, HdmiDeviceInfo};
use crate::dispatch::{ActionEnv, ActionId, Dispatcher, TaggedEffects};
use crate::error::ClientError;
use crate::local_device::{LocalDevice, LocalDeviceHandler, SwitchInfo};
use rustcec_core::types::LogicalAddress;
use rustcec_core::CecMessage;
use rustcec_link::{CecLink, LinkError, SendResult};
use std::collections::{HashMap, VecDeque};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;

type ArcReply = oneshot::Sender<Result<oneshot::Receiver<ControlResult>, ClientError>>;

enum Command {
    Discover {
        config: DiscoveryConfig,
        reply: oneshot::Sender<Vec<HdmiDeviceInfo>>,
    },
    RequestArc {
        direction: ArcDirection,
        avr: LogicalAddress,
        config: ArcConfig,
        reply: ArcReply,
    },
    Topology {
        reply: oneshot::Sender<Vec<SwitchInfo>>,
    },
    ArcEnabled {
        reply: oneshot::Sender<bool>,
    },
}

/// Handle to a running controller. Dropping it stops the controller.
#[derive(Debug)]
pub struct CecControllerHandle {
    commands: mpsc::Sender<Command>,
    shutdown: watch::Sender<bool>,
    thread: Option<std::thread::JoinHandle<()>>,
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Discover { config, .. } => {
                f.debug_struct("Discover").field("config", config).finish()
            }
            Self::RequestArc { direction, avr, .. } => f
                .debug_struct("RequestArc")
                .field("direction", direction)
                .field("avr", avr)
                .finish(),
            Self::Topology { .. } => f.write_str("Topology"),
            Self::ArcEnabled { .. } => f.write_str("ArcEnabled"),
        }
    }
}

impl CecControllerHandle {
    /// Runs device discovery, cancelling any discovery already in progress.
    pub async fn discover_devices(
        &self,
        config: DiscoveryConfig,
    ) -> Result<Vec<HdmiDeviceInfo>, ClientError> {
        let (reply, rx) = oneshot::channel();
        self.submit(Command::Discover { config, reply }).await?;
        rx.await.map_err(|_| ClientError::Cancelled)
    }

    /// Asks the audio system at `avr` to open or close the Audio Return
    /// Channel. A pending ARC request in either direction is cancelled.
    pub async fn request_arc(
        &self,
        direction: ArcDirection,
        avr: LogicalAddress,
        config: ArcConfig,
    ) -> Result<ControlResult, ClientError> {
        let (reply, rx) = oneshot::channel();
        self.submit(Command::RequestArc {
            direction,
            avr,
            config,
            reply,
        })
        .await?;
        let result = rx.await.map_err(|_| ClientError::ControllerClosed)??;
        result.await.map_err(|_| ClientError::Cancelled)
    }

    /// Devices whose place in the topology the local device has learned.
    pub async fn topology(&self) -> Result<Vec<SwitchInfo>, ClientError> {
        let (reply, rx) = oneshot::channel();
        self.submit(Command::Topology { reply }).await?;
        rx.await.map_err(|_| ClientError::ControllerClosed)
    }

    pub async fn arc_enabled(&self) -> Result<bool, ClientError> {
        let (reply, rx) = oneshot::channel();
        self.submit(Command::ArcEnabled { reply }).await?;
        rx.await.map_err(|_| ClientError::ControllerClosed)
    }

    /// Stop the controller and wait for its thread to exit.
    pub fn shutdown(mut self) {
        let _ = self.shutdown.send(true);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }

    async fn submit(&self, command: Command) -> Result<(), ClientError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| ClientError::ControllerClosed)
    }
}

impl Drop for CecControllerHandle {
    fn drop(&mut self) {
        let _ = self.shutdown.send(true);
    }
}

/// Builder for a controller and its [`CecControllerHandle`].
pub struct CecControllerBuilder<L: CecLink> {
    link: L,
    local: LocalDevice,
    command_capacity: usize,
}

impl<L: CecLink + 'static> CecControllerBuilder<L> {
    pub fn new(link: L, local: LocalDevice) -> Self {
        Self {
            link,
            local,
            command_capacity: 32,
        }
    }

    pub fn with_command_capacity(mut self, capacity: usize) -> Self {
        self.command_capacity = capacity;
        self
    }

    /// Spawns the controller. Must be called from within a tokio runtime.
    pub fn build(self) -> CecControllerHandle {
        let (commands, command_rx) = mpsc::channel(self.command_capacity.max(1));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let controller = Controller::new(self.link, self.local);
        let runtime_handle = tokio::runtime::Handle::current();

        let thread = std::thread::spawn(move || {
            runtime_handle.block_on(controller.run(command_rx, shutdown_rx));
        });
        CecControllerHandle {
            commands,
            shutdown: shutdown_tx,
            thread: Some(thread),
        }
    }
}

struct Controller<L: CecLink> {
    link: L,
    local: LocalDevice,
    cache: MessageCache,
    tokens: TokenSource,
    dispatcher: Dispatcher,
    handler: LocalDeviceHandler,
    timers: HashMap<ActionId, (RequestToken, Instant)>,
}

impl<L: CecLink> Controller<L> {
    fn new(link: L, local: LocalDevice) -> Self {
        Self {
            link,
            local,
            cache: MessageCache::new(),
            tokens: TokenSource::new(),
            dispatcher: Dispatcher::new(),
            handler: LocalDeviceHandler::new(),
            timers: HashMap::new(),
        }
    }

    fn parts(&mut self) -> (&mut Dispatcher, ActionEnv<'_>) {
        (
            &mut self.dispatcher,
            ActionEnv {
                local: &self.local,
                cache: &self.cache,
                tokens: &mut self.tokens,
            },
        )
    }

    async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        loop {
            let deadline = self.next_deadline();
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                command = commands.recv() => {
                    let Some(command) = command else {
                        break;
                    };
                    self.handle_command(command).await;
                }
                received = self.link.recv() => match received {
                    Ok(message) => {
                        let mut queue = VecDeque::new();
                        self.process_inbound(message, &mut queue).await;
                        self.drain(queue).await;
                    }
                    Err(LinkError::Closed) => {
                        log::warn!("controller: link closed");
                        break;
                    }
                    Err(e) => log::debug!("controller: receive failed: {e}"),
                },
                _ = sleep_until(deadline) => self.fire_due_timers().await,
            }
        }
        // Pending callers see their requests cancelled.
        let (dispatcher, mut env) = self.parts();
        dispatcher.finish_where(|_| true, &mut env);
    }

    async fn handle_command(&mut self, command: Command) {
        let mut queue = VecDeque::new();
        match command {
            Command::Discover { config, reply } => {
                let action = DeviceDiscoveryAction::new(config, move |devices| {
                    let _ = reply.send(devices);
                });
                let (dispatcher, mut env) = self.parts();
                queue.extend(
                    dispatcher.finish_where(|name| name == DeviceDiscoveryAction::NAME, &mut env),
                );
                let (id, effects) = dispatcher.add_and_start(Box::new(action), &mut env);
                queue.extend(effects.into_iter().map(|e| (id, e)));
            }
            Command::RequestArc {
                direction,
                avr,
                config,
                reply,
            } => {
                let (result_tx, result_rx) = oneshot::channel();
                let created = RequestArcAction::new(
                    direction,
                    self.local.logical_address,
                    avr,
                    config,
                    move |result| {
                        let _ = result_tx.send(result);
                    },
                );
                match created {
                    Ok(action) => {
                        let (dispatcher, mut env) = self.parts();
                        queue.extend(
                            dispatcher.finish_where(RequestArcAction::is_arc_action, &mut env),
                        );
                        let (id, effects) = dispatcher.add_and_start(Box::new(action), &mut env);
                        queue.extend(effects.into_iter().map(|e| (id, e)));
                        let _ = reply.send(Ok(result_rx));
                    }
                    Err(e) => {
                        let _ = reply.send(Err(e));
                    }
                }
            }
            Command::Topology { reply } => {
                let _ = reply.send(self.handler.topology());
            }
            Command::ArcEnabled { reply } => {
                let _ = reply.send(self.handler.arc_enabled());
            }
        }
        self.drain(queue).await;
    }

    /// Inbound path: cache, then every action, then the local device for
    /// messages no action consumed.
    async fn process_inbound(
        &mut self,
        message: CecMessage,
        queue: &mut VecDeque<(ActionId, Effect)>,
    ) {
        self.cache.put(&message);
        let deferring = self.dispatcher.is_deferring();
        let (handled, effects) = {
            let (dispatcher, mut env) = self.parts();
            dispatcher.dispatch(&message, &mut env)
        };
        queue.extend(effects);
        if handled {
            return;
        }
        for reply in self.handler.handle_message(&self.local, &message, deferring) {
            if let Err(e) = self.link.send(&reply).await {
                log::debug!("controller: reply {reply} failed: {e}");
            }
        }
    }

    async fn drain(&mut self, mut queue: VecDeque<(ActionId, Effect)>) {
        while let Some((id, effect)) = queue.pop_front() {
            match effect {
                Effect::Send { token, message } => {
                    let outcome = self.link.send(&message).await;
                    if let Err(e) = &outcome {
                        log::debug!("controller: send {message} failed: {e}");
                    }
                    let result = SendResult::from_outcome(&outcome);
                    let (dispatcher, mut env) = self.parts();
                    let effects = dispatcher.send_completed(id, token, result, &mut env);
                    queue.extend(tag(id, effects));
                }
                Effect::ArmTimer { token, delay } => {
                    self.timers.insert(id, (token, Instant::now() + delay));
                }
                Effect::ClearTimer => {
                    self.timers.remove(&id);
                }
                Effect::Poll { token, request } => {
                    let acked = self.poll(&request).await;
                    let (dispatcher, mut env) = self.parts();
                    let effects = dispatcher.poll_completed(id, token, &acked, &mut env);
                    queue.extend(tag(id, effects));
                }
                Effect::Local(event) => {
                    for message in self.handler.apply_event(&self.local, &event) {
                        self.process_inbound(message, &mut queue).await;
                    }
                }
            }
        }
        for id in self.dispatcher.prune_finished() {
            self.timers.remove(&id);
        }
    }

    /// Sends a polling message to each candidate and collects the addresses
    /// that acknowledged, in candidate order.
    async fn poll(&self, request: &PollRequest) -> Vec<LogicalAddress> {
        let mut acked = Vec::new();
        for &candidate in &request.candidates {
            for attempt in 1..=request.attempts {
                match self
                    .link
                    .send(&CecMessage::polling(request.source, candidate))
                    .await
                {
                    Ok(()) => {
                        acked.push(candidate);
                        break;
                    }
                    Err(LinkError::Nack) => {}
                    Err(e) => log::debug!("controller: poll {candidate} attempt {attempt}: {e}"),
                }
            }
        }
        acked
    }

    fn next_deadline(&self) -> Option<Instant> {
        self.timers.values().map(|(_, deadline)| *deadline).min()
    }

    async fn fire_due_timers(&mut self) {
        let now = Instant::now();
        let mut due: Vec<(ActionId, RequestToken)> = self
            .timers
            .iter()
            .filter(|(_, (_, deadline))| *deadline <= now)
            .map(|(id, (token, _))| (*id, *token))
            .collect();
        due.sort();
        let mut queue = VecDeque::new();
        for (id, token) in due {
            self.timers.remove(&id);
            let (dispatcher, mut env) = self.parts();
            let effects = dispatcher.timer_fired(id, token, &mut env);
            queue.extend(tag(id, effects));
        }
        self.drain(queue).await;
    }
}

fn tag(id: ActionId, effects: Vec<Effect>) -> TaggedEffects {
    effects.into_iter().map(|e| (id, e)).collect()
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
