// Copyright (C) 2024  INO Quantum Systems
//
// This file is part of the DIO64 board coordination library.
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

//! Per-board worker: a single task owning one TCP connection, driving the
//! state machine in `§4.2`. External tasks never touch the socket or the
//! configuration copy directly - they enqueue [`WorkerCommand`]s and await
//! the command's own oneshot reply, or drain `recv_queue` for the
//! asynchronously-published status stream.

use crate::callback::StatusCallback;
use crate::error::{Error, ErrorKind, Result};
use crate::observer::{Event, Observer};
use crate::policy::{ConnectDecision, SharedConnectPolicy};
use crate::queue::{Queue, QueueEntry};
use crate::registry::Role;
use dio64_logging::macros::*;
use dio64_wire::config::ClientConfig;
use dio64_wire::socket::{BoardSocket, DEFAULT_COMMAND_TIMEOUT, UPLOAD_ACK_TIMEOUT};
use dio64_wire::status::{Status, StatusFull};
use dio64_wire::Command as WireCommand;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;

/// Codes used for collapse-last comparisons on `send_queue` and as the
/// stream tag on `recv_queue` (always `STATUS_CODE` there, since it only
/// ever carries the status push stream).
pub mod code {
    pub const CONFIGURE: u8 = 1;
    pub const WRITE: u8 = 2;
    pub const START: u8 = 3;
    pub const STOP: u8 = 4;
    pub const GET_STATUS: u8 = 5;
    pub const GET_STATUS_FULL: u8 = 6;
    pub const GET_REG: u8 = 7;
    pub const SET_REG: u8 = 8;
    pub const SET_SYNC_PHASE: u8 = 9;
    pub const AUTO_SYNC_START: u8 = 10;
    pub const AUTO_SYNC_STOP: u8 = 11;
    pub const CLOSE: u8 = 12;
    pub const REOPEN: u8 = 13;
    pub const REGISTER_CALLBACK: u8 = 14;
    pub const THREAD_EXIT: u8 = 15;
    pub const STATUS_STREAM: u8 = 16;
}

pub enum CommandKind {
    Configure(ClientConfig),
    /// Already board-role-sliced payload bytes, chunked by the façade.
    Write(Vec<u8>),
    Start(u32),
    Stop,
    GetStatus,
    GetStatusFull,
    GetReg(u32),
    SetReg(u32, u32),
    SetSyncPhase(u32),
    AutoSyncStart,
    AutoSyncStop,
    /// timeout=0 closes the socket immediately; timeout>0 arms the
    /// deferred-close window.
    Close(Duration),
    /// Same-resource reopen within a deferred-close window.
    Reopen,
    RegisterCallback(Option<StatusCallback>),
    ThreadExit,
}

impl CommandKind {
    fn code(&self) -> u8 {
        use CommandKind::*;
        match self {
            Configure(_) => code::CONFIGURE,
            Write(_) => code::WRITE,
            Start(_) => code::START,
            Stop => code::STOP,
            GetStatus => code::GET_STATUS,
            GetStatusFull => code::GET_STATUS_FULL,
            GetReg(_) => code::GET_REG,
            SetReg(..) => code::SET_REG,
            SetSyncPhase(_) => code::SET_SYNC_PHASE,
            AutoSyncStart => code::AUTO_SYNC_START,
            AutoSyncStop => code::AUTO_SYNC_STOP,
            Close(_) => code::CLOSE,
            Reopen => code::REOPEN,
            RegisterCallback(_) => code::REGISTER_CALLBACK,
            ThreadExit => code::THREAD_EXIT,
        }
    }
}

pub enum WorkerReply {
    Ack,
    /// Reopen succeeded: caller sees `ACTIVE` ("reused"), per `§4.2`.
    Active,
    Status(Status),
    StatusFull(StatusFull),
    Config(ClientConfig),
    RegValue(u32),
}

pub struct WorkerCommand {
    pub kind: CommandKind,
    pub reply: oneshot::Sender<Result<WorkerReply>>,
}

/// A queue entry published on `recv_queue`: the status-polling loop's latest
/// snapshot, collapsed against any prior unread entry.
#[derive(Clone)]
pub struct StatusEntry {
    pub status: Status,
}

/// A caller-side reference to a live worker. Becomes logically invalid the
/// moment `alive` flips false (the worker has entered `Exiting` and torn its
/// queues down); callers must check `is_alive()` before enqueueing rather
/// than holding a raw pointer into worker-owned state.
#[derive(Clone)]
pub struct WorkerHandle {
    send_queue: Arc<Queue<WorkerCommand>>,
    recv_queue: Arc<Queue<StatusEntry>>,
    alive: Arc<AtomicBool>,
}

impl WorkerHandle {
    /// A handle with no backing task, for registry unit tests that only
    /// exercise record bookkeeping.
    pub fn detached() -> Self {
        WorkerHandle {
            send_queue: Arc::new(Queue::new()),
            recv_queue: Arc::new(Queue::new()),
            alive: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    pub fn recv_queue(&self) -> &Queue<StatusEntry> {
        &self.recv_queue
    }

    /// Enqueues `kind` and awaits its own reply. `priority` jumps the queue
    /// (used only for `ThreadExit`, which must preempt pending work after the
    /// in-flight command completes).
    pub async fn call(&self, kind: CommandKind, priority: bool) -> Result<WorkerReply> {
        if !self.is_alive() {
            return Err(ErrorKind::NoWorker(0).into());
        }
        let (tx, rx) = oneshot::channel();
        let code = kind.code();
        self.send_queue
            .add(QueueEntry { code, payload: WorkerCommand { kind, reply: tx } }, priority)
            .await;
        rx.await.map_err(|_| ErrorKind::NoWorker(0).into())?
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
enum State {
    Unconnected,
    ConnectedIdle,
    Configured,
    Running,
    DeferredClose,
    Exiting,
}

pub struct WorkerParams {
    pub handle: i32,
    pub resource: String,
    pub addr: SocketAddr,
    pub role: Role,
    pub connect_policy: SharedConnectPolicy,
    pub observer: Arc<dyn Observer>,
    pub connect_timeout: Duration,
    pub command_timeout: Duration,
    /// Held only at the very end of the task's life, to remove its own slot
    /// (`§3` Lifecycle, `§4.2` `any -> THREAD_EXIT -> Exiting`). The arena
    /// registry design (`§9`) means there is no race to resolve here the way
    /// the source's raw-pointer list had to: a deferred-close record that
    /// gets re-opened takes the `Reopen` command branch and never reaches
    /// `Exiting` for this worker generation at all.
    pub registry: Arc<tokio::sync::Mutex<crate::registry::Registry>>,
}

/// Spawns the worker task. Returns immediately; the caller awaits
/// `connect_ready` for the outcome of the initial connect handshake so that
/// `Open`/`OpenResource` can report success, abort, or "ignored" without
/// round-tripping through the generic command queue.
pub fn spawn(params: WorkerParams) -> (WorkerHandle, oneshot::Receiver<Result<()>>) {
    let send_queue = Arc::new(Queue::new());
    let recv_queue = Arc::new(Queue::new());
    let alive = Arc::new(AtomicBool::new(true));
    let (connect_tx, connect_rx) = oneshot::channel();

    let worker_handle = WorkerHandle {
        send_queue: send_queue.clone(),
        recv_queue: recv_queue.clone(),
        alive: alive.clone(),
    };

    tokio::spawn(run(params, send_queue, recv_queue, alive, connect_tx));

    (worker_handle, connect_rx)
}

async fn run(
    params: WorkerParams,
    send_queue: Arc<Queue<WorkerCommand>>,
    recv_queue: Arc<Queue<StatusEntry>>,
    alive: Arc<AtomicBool>,
    connect_tx: oneshot::Sender<Result<()>>,
) {
    let mut state = State::Unconnected;
    let mut socket = match connect_with_policy(&params).await {
        Ok(socket) => {
            let _ = connect_tx.send(Ok(()));
            state = State::ConnectedIdle;
            Some(socket)
        }
        Err(ConnectOutcome::Ignored) => {
            let _ = connect_tx.send(Err(ErrorKind::ConnectIgnore(params.resource.clone()).into()));
            state = State::Exiting;
            None
        }
        Err(ConnectOutcome::Aborted(e)) => {
            let _ = connect_tx.send(Err(e));
            state = State::Exiting;
            None
        }
    };

    let mut config: Option<ClientConfig> = None;
    let mut callback: Option<StatusCallback> = None;
    let mut deferred_deadline: Option<tokio::time::Instant> = None;
    let command_timeout = params.command_timeout;

    'outer: while state != State::Exiting {
        match state {
            State::Running => {
                if let Some(entry) = send_queue.remove(Duration::from_millis(0)).await {
                    state = handle_command(
                        &mut socket,
                        &mut config,
                        &mut callback,
                        entry.payload,
                        state,
                        command_timeout,
                        &params,
                    )
                    .await;
                    continue 'outer;
                }

                if let Some(sock) = socket.as_mut() {
                    match poll_status(sock, command_timeout).await {
                        Ok((_, body)) => {
                            if let Ok(status) = Status::decode(&body) {
                                recv_queue
                                    .update(QueueEntry {
                                        code: code::STATUS_STREAM,
                                        payload: StatusEntry { status },
                                    })
                                    .await;
                                params.observer.notify(Event::StatusChanged {
                                    handle: params.handle,
                                    status,
                                });
                                let unregister = callback.as_ref().map(|cb| cb(&status)).unwrap_or(false);
                                if unregister {
                                    callback = None;
                                }
                                let still_running = status.bits.contains(dio64_wire::status::StatusBits::RUN);
                                let ended = status.bits.contains(dio64_wire::status::StatusBits::END);
                                if !still_running || ended {
                                    if status
                                        .bits
                                        .contains(dio64_wire::status::StatusBits::ERR_LOCK)
                                        && ended
                                    {
                                        params
                                            .observer
                                            .notify(Event::ClockLostWarning { handle: params.handle });
                                    }
                                    state = State::Configured;
                                }
                            }
                        }
                        Err(_) => {
                            // Timeout or transport error polling status: stay Running,
                            // the next loop iteration retries.
                        }
                    }
                }
            }
            State::DeferredClose => {
                let deadline = deferred_deadline.expect("DeferredClose always carries a deadline");
                let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
                if remaining.is_zero() {
                    state = State::Exiting;
                    continue 'outer;
                }
                match send_queue.remove(remaining).await {
                    Some(entry) => {
                        state = handle_command(
                            &mut socket,
                            &mut config,
                            &mut callback,
                            entry.payload,
                            state,
                            command_timeout,
                            &params,
                        )
                        .await;
                        if state != State::DeferredClose {
                            deferred_deadline = None;
                        }
                    }
                    None => state = State::Exiting,
                }
            }
            _ => {
                let timeout = match state {
                    State::ConnectedIdle | State::Configured => command_timeout,
                    State::Unconnected => command_timeout,
                    _ => command_timeout,
                };
                match send_queue.remove(timeout).await {
                    Some(entry) => {
                        state = handle_command(
                            &mut socket,
                            &mut config,
                            &mut callback,
                            entry.payload,
                            state,
                            command_timeout,
                            &params,
                        )
                        .await;
                        if state == State::DeferredClose {
                            deferred_deadline =
                                Some(tokio::time::Instant::now() + last_close_timeout(&params));
                        }
                    }
                    None => {
                        // Idle timeout with no deferred-close timer armed is a
                        // no-op wakeup; only DeferredClose's own branch above
                        // synthesizes THREAD_EXIT on expiry.
                    }
                }
            }
        }
    }

    if let Some(sock) = socket.as_mut() {
        sock.shutdown().await;
    }
    params.registry.lock().await.remove(params.handle);
    alive.store(false, Ordering::Release);
    params.observer.notify(Event::BoardRemoved { handle: params.handle });
}

/// Stashed so `DeferredClose`'s timer can be re-armed if a later `Close`
/// arrives again before the worker exits (double-close within one window).
fn last_close_timeout(_params: &WorkerParams) -> Duration {
    Duration::from_millis(200)
}

enum ConnectOutcome {
    Ignored,
    Aborted(Error),
}

async fn connect_with_policy(params: &WorkerParams) -> std::result::Result<BoardSocket, ConnectOutcome> {
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match BoardSocket::connect(params.addr, params.connect_timeout).await {
            Ok(mut socket) => {
                if handshake(&mut socket, params.command_timeout).await.is_ok() {
                    return Ok(socket);
                }
            }
            Err(_) => {}
        }

        let decision = params
            .connect_policy
            .on_connect_failure(&params.resource, attempt, "connect failed")
            .await;
        match decision {
            ConnectDecision::Retry => continue,
            ConnectDecision::Ignore => return Err(ConnectOutcome::Ignored),
            ConnectDecision::Abort => {
                return Err(ConnectOutcome::Aborted(
                    ErrorKind::ConnectAbort(params.resource.clone()).into(),
                ))
            }
        }
    }
}

async fn handshake(socket: &mut BoardSocket, timeout: Duration) -> Result<()> {
    socket.send_command(WireCommand::Open, &[], timeout).await?;
    socket.recv_response(WireCommand::Open, timeout).await?;
    socket.send_command(WireCommand::Reset, &[], timeout).await?;
    socket.recv_response(WireCommand::Reset, timeout).await?;
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn handle_command(
    socket: &mut Option<BoardSocket>,
    config: &mut Option<ClientConfig>,
    callback: &mut Option<StatusCallback>,
    command: WorkerCommand,
    state: State,
    timeout: Duration,
    params: &WorkerParams,
) -> State {
    let WorkerCommand { kind, reply } = command;
    let (result, next_state) = dispatch(socket, config, callback, kind, state, timeout, params).await;
    let _ = reply.send(result);
    next_state
}

async fn dispatch(
    socket: &mut Option<BoardSocket>,
    config: &mut Option<ClientConfig>,
    callback: &mut Option<StatusCallback>,
    kind: CommandKind,
    state: State,
    timeout: Duration,
    params: &WorkerParams,
) -> (Result<WorkerReply>, State) {
    use CommandKind::*;

    let Some(sock) = socket.as_mut() else {
        return (Err(ErrorKind::NoWorker(params.handle).into()), State::Exiting);
    };

    match kind {
        ThreadExit => (Ok(WorkerReply::Ack), State::Exiting),

        Configure(mut requested) => {
            apply_role_transform(&mut requested, params.role);
            params.observer.notify(Event::CommandLogged { handle: params.handle, command: "OUT_CONFIG" });
            match send_recv(sock, WireCommand::OutConfig, encode_config(&requested), timeout).await {
                Ok(body) => match dio64_wire::config::ClientConfig::decode(&body) {
                    Ok(echoed) if requested.echo_matches(&echoed) => {
                        *config = Some(echoed);
                        params.observer.notify(Event::ConfigChanged { handle: params.handle });
                        (Ok(WorkerReply::Config(echoed)), State::Configured)
                    }
                    Ok(_) => (
                        Err(ErrorKind::BoardState(params.handle).into()),
                        state,
                    ),
                    Err(e) => (Err(ErrorKind::Wire(e.to_string()).into()), state),
                },
                Err(e) => (Err(e.into()), state),
            }
        }

        Write(payload) => {
            params.observer.notify(Event::CommandLogged { handle: params.handle, command: "OUT_WRITE" });
            match send_write(sock, payload, timeout).await {
                Ok(()) => (Ok(WorkerReply::Ack), state),
                Err(e) => (Err(e.into()), state),
            }
        }

        Start(reps) => {
            params.observer.notify(Event::CommandLogged { handle: params.handle, command: "OUT_START" });
            match send_recv(sock, WireCommand::OutStart, reps.to_le_bytes().to_vec(), timeout).await {
                Ok(_) => {
                    params.observer.notify(Event::RunCounterIncremented { handle: params.handle, count: reps });
                    (Ok(WorkerReply::Ack), State::Running)
                }
                Err(e) => (Err(e.into()), state),
            }
        }

        Stop => {
            params.observer.notify(Event::CommandLogged { handle: params.handle, command: "OUT_STOP" });
            let stop = send_recv(sock, WireCommand::OutStop, Vec::new(), timeout).await;
            let _ = send_recv(sock, WireCommand::Reset, Vec::new(), timeout).await;
            match stop {
                Ok(_) => (Ok(WorkerReply::Ack), State::Configured),
                Err(e) => (Err(e.into()), State::Configured),
            }
        }

        GetStatus => {
            params.observer.notify(Event::CommandLogged { handle: params.handle, command: "GET_STATUS" });
            match send_recv(sock, WireCommand::GetStatus, Vec::new(), timeout).await {
                Ok(body) => match Status::decode(&body) {
                    Ok(status) => (Ok(WorkerReply::Status(status)), state),
                    Err(e) => (Err(ErrorKind::Wire(e.to_string()).into()), state),
                },
                Err(e) => (Err(e.into()), state),
            }
        }

        GetStatusFull => {
            params.observer.notify(Event::CommandLogged { handle: params.handle, command: "GET_STATUS_FULL" });
            match send_recv(sock, WireCommand::GetStatusFull, Vec::new(), timeout).await {
                Ok(body) => match StatusFull::decode(&body) {
                    Ok(full) => (Ok(WorkerReply::StatusFull(full)), state),
                    Err(e) => (Err(ErrorKind::Wire(e.to_string()).into()), state),
                },
                Err(e) => (Err(e.into()), state),
            }
        }

        GetReg(reg) => {
            params.observer.notify(Event::CommandLogged { handle: params.handle, command: "GET_REG" });
            match send_recv(sock, WireCommand::GetReg, reg.to_le_bytes().to_vec(), timeout).await {
                Ok(body) if body.len() >= 4 => {
                    let value = u32::from_le_bytes([body[0], body[1], body[2], body[3]]);
                    (Ok(WorkerReply::RegValue(value)), state)
                }
                Ok(_) => (Err(ErrorKind::Wire("short GET_REG reply".into()).into()), state),
                Err(e) => (Err(e.into()), state),
            }
        }

        SetReg(reg, value) => {
            params.observer.notify(Event::CommandLogged { handle: params.handle, command: "SET_REG" });
            let mut body = reg.to_le_bytes().to_vec();
            body.extend_from_slice(&value.to_le_bytes());
            match send_recv(sock, WireCommand::SetReg, body, timeout).await {
                Ok(_) => (Ok(WorkerReply::Ack), state),
                Err(e) => (Err(e.into()), state),
            }
        }

        SetSyncPhase(phase) => {
            params.observer.notify(Event::CommandLogged { handle: params.handle, command: "SET_SYNC_PHASE" });
            match send_recv(sock, WireCommand::SetSyncPhase, phase.to_le_bytes().to_vec(), timeout).await {
                Ok(_) => (Ok(WorkerReply::Ack), state),
                Err(e) => (Err(e.into()), state),
            }
        }

        AutoSyncStart => {
            params.observer.notify(Event::CommandLogged { handle: params.handle, command: "AUTO_SYNC_START" });
            match send_recv(sock, WireCommand::AutoSyncStart, Vec::new(), timeout).await {
                Ok(_) => (Ok(WorkerReply::Ack), state),
                Err(e) => (Err(e.into()), state),
            }
        }

        AutoSyncStop => {
            params.observer.notify(Event::CommandLogged { handle: params.handle, command: "AUTO_SYNC_STOP" });
            match send_recv(sock, WireCommand::AutoSyncStop, Vec::new(), timeout).await {
                Ok(_) => (Ok(WorkerReply::Ack), state),
                Err(e) => (Err(e.into()), state),
            }
        }

        RegisterCallback(cb) => {
            *callback = cb;
            (Ok(WorkerReply::Ack), state)
        }

        Close(close_timeout) => {
            if close_timeout.is_zero() {
                params.observer.notify(Event::CommandLogged { handle: params.handle, command: "CLOSE" });
                let _ = send_recv(sock, WireCommand::Close, Vec::new(), timeout).await;
                sock.shutdown().await;
                (Ok(WorkerReply::Ack), State::Exiting)
            } else {
                (Ok(WorkerReply::Ack), State::DeferredClose)
            }
        }

        Reopen => {
            params.observer.notify(Event::CommandLogged { handle: params.handle, command: "RESET" });
            match send_recv(sock, WireCommand::Reset, Vec::new(), timeout).await {
                Ok(_) => {
                    info!("board {}: reset (active)", params.handle);
                    (Ok(WorkerReply::Active), State::ConnectedIdle)
                }
                Err(e) => (Err(e.into()), state),
            }
        }
    }
}

fn apply_role_transform(cfg: &mut ClientConfig, role: Role) {
    use dio64_wire::config::ConfigBits;
    match role {
        Role::Standalone => {}
        Role::Primary { .. } => {
            cfg.config.insert(ConfigBits::AUTO_SYNC_EN | ConfigBits::AUTO_SYNC_PRIMARY);
        }
        Role::Secondary { .. } => {
            cfg.config.insert(ConfigBits::EXT_CLOCK | ConfigBits::AUTO_SYNC_EN);
            cfg.config.remove(ConfigBits::AUTO_SYNC_PRIMARY);
            // Start on input-0 falling edge, stop/restart on input-1 (§4.4).
            cfg.ctrl_in[0] |= 0x1;
            if cfg.reps != 0 {
                cfg.ctrl_in[1] |= 0x1;
            }
            if cfg.config.contains(ConfigBits::BPS96) {
                cfg.config.insert(ConfigBits::BPS96_SECONDARY);
            }
        }
    }
}

fn encode_config(cfg: &ClientConfig) -> Vec<u8> {
    let mut buf = Vec::with_capacity(dio64_wire::config::WIRE_CONFIG_LEN);
    cfg.encode(&mut buf).expect("encoding to a Vec cannot fail");
    buf
}

async fn send_recv(
    sock: &mut BoardSocket,
    command: WireCommand,
    body: Vec<u8>,
    timeout: Duration,
) -> dio64_wire::Result<Vec<u8>> {
    sock.send_command(command, &body, timeout).await?;
    let (_, reply) = sock.recv_response(command, timeout).await?;
    Ok(reply)
}

async fn send_write(sock: &mut BoardSocket, payload: Vec<u8>, timeout: Duration) -> dio64_wire::Result<()> {
    let len = payload.len() as u32;
    sock.send_command(WireCommand::OutWrite, &len.to_le_bytes(), timeout)
        .await?;
    sock.recv_response(WireCommand::OutWrite, timeout).await?;
    sock.send_payload(&payload, UPLOAD_ACK_TIMEOUT).await?;
    sock.recv_response(WireCommand::OutWrite, UPLOAD_ACK_TIMEOUT).await?;
    Ok(())
}

/// `GET_STATUS_IRQ` is the one request whose response may legitimately
/// degrade to a different command code (`§4.1`), handled transparently by
/// `Command::satisfies` inside `recv_response`.
async fn poll_status(
    sock: &mut BoardSocket,
    timeout: Duration,
) -> dio64_wire::Result<(WireCommand, Vec<u8>)> {
    sock.send_command(WireCommand::GetStatusIrq, &[], timeout).await?;
    sock.recv_response(WireCommand::GetStatusIrq, timeout).await
}
