// Copyright (C) 2024  INO Quantum Systems
//
// This file is part of the DIO64 board coordination library.
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

//! The public API façade (`§4.4`, `§6`): the sole external entry point,
//! serialized under one process-wide lock, fanning high-level calls out to
//! per-board workers and aggregating their replies.

use crate::callback::StatusCallback;
use crate::config_file::ConfigFile;
use crate::error::{codes, Error, ErrorKind, Result};
use crate::lock::ProcessLock;
use crate::observer::{Event, NullObserver, Observer};
use crate::policy::{RetryWithBackoff, SharedConnectPolicy};
use crate::registry::{Registry, Role};
use crate::slicer::{self, SliceTarget};
use crate::status_agg;
use crate::trigger::{self, TriggerSource, TriggerSpec, TriggerType};
use crate::worker::{self, CommandKind, WorkerHandle, WorkerParams, WorkerReply};
use dio64_wire::config::{ClientConfig, ConfigBits, AUTO};
use dio64_wire::socket::parse_resource_name;
use dio64_wire::status::{Severity, Status, StatusBits};
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// `baseio` sentinel meaning "open a single, standalone board".
pub const BASEIO_SINGLE: u32 = 0;

/// Default resource used by `Open` (as opposed to `OpenResource`, which takes
/// an explicit `"ip:port"`).
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Plausible per-board bus-clock bounds used to validate `scanRate`; the
/// source's concrete bounds are board-model-specific and outside this core's
/// scope, so Out_Config validates against these placeholders (`§9` open
/// question, resolved in DESIGN.md).
pub const SCAN_RATE_MIN_HZ: u32 = 1_000;
pub const SCAN_RATE_MAX_HZ: u32 = 100_000_000;

/// Arguments to `Out_Config`, mirroring the DIO64 contract's field list
/// (`§6`). `mask`/`mask_len` are kept separate (rather than derived from one
/// `Vec`) because the boundary rule under test is specifically about their
/// combination: `mask_len == 0` requires `mask` to be absent.
pub struct OutConfigArgs {
    pub ticks: u32,
    pub mask: Option<Vec<u16>>,
    pub mask_len: usize,
    pub flags: u32,
    pub start: TriggerSpec,
    pub stop: Option<TriggerSpec>,
    pub reps: u32,
    pub scan_rate_hz: u32,
}

pub struct OpenResult {
    pub handle: i32,
    /// A secondary in the linked group was unreachable and the connect
    /// policy returned `Ignore`: the group is usable with that member
    /// silently excluded from every future fan-out (`§8` scenario 4).
    pub ignored_secondary: bool,
}

impl OpenResult {
    /// The stable code the legacy DIO64 integer-return convention would
    /// surface for this outcome: the handle on a clean open, or the
    /// distinguished positive `ERROR_CONNECT_IGNORE` when a secondary was
    /// dropped.
    pub fn legacy_code(&self) -> i32 {
        if self.ignored_secondary {
            codes::ERROR_CONNECT_IGNORE
        } else {
            self.handle
        }
    }
}

pub struct Dio64 {
    lock: ProcessLock,
    registry: Arc<Mutex<Registry>>,
    observer: Arc<dyn Observer>,
    connect_policy: SharedConnectPolicy,
    config_file: Option<ConfigFile>,
    connect_timeout: Duration,
    command_timeout: Duration,
    deferred_close_timeout: Duration,
}

impl Dio64 {
    pub fn new() -> Self {
        Dio64 {
            lock: ProcessLock::new(),
            registry: Arc::new(Mutex::new(Registry::new())),
            observer: Arc::new(NullObserver),
            connect_policy: Arc::new(RetryWithBackoff::default()),
            config_file: None,
            connect_timeout: Duration::from_secs(2),
            command_timeout: dio64_wire::socket::DEFAULT_COMMAND_TIMEOUT,
            deferred_close_timeout: Duration::from_millis(200),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn Observer>) -> Self {
        self.observer = observer;
        self
    }

    pub fn with_connect_policy(mut self, policy: SharedConnectPolicy) -> Self {
        self.connect_policy = policy;
        self
    }

    pub fn with_config_file(mut self, config_file: ConfigFile) -> Self {
        self.config_file = Some(config_file);
        self
    }

    /// `§6` `Open`: a single board at the default resource.
    pub async fn open(&self, board_id: &str, baseio: u32) -> Result<OpenResult> {
        let resource = format!("{DEFAULT_HOST}:{}", dio64_wire::DEFAULT_PORT);
        self.open_resource(&resource, board_id, baseio).await
    }

    /// `§6` `OpenResource` / `§4.4` Open/OpenResource fan-out.
    pub async fn open_resource(&self, resource: &str, board_id: &str, baseio: u32) -> Result<OpenResult> {
        let _guard = self.lock.acquire().await?;
        let group_size = if baseio < 2 { 1 } else { baseio as usize };
        let base_addr = parse_resource_name(resource)?;

        let mut primary_handle: Option<i32> = None;
        let mut ignored_secondary = false;
        let mut opened_this_call: Vec<i32> = Vec::new();

        for index in 0..group_size {
            let addr = offset_addr(base_addr, index)?;
            let resource_i = addr.to_string();
            let role = if group_size == 1 {
                Role::Standalone
            } else if index == 0 {
                Role::Primary { group_size }
            } else {
                Role::Secondary {
                    primary_handle: primary_handle.expect("primary opens before any secondary"),
                    index,
                }
            };

            match self.open_or_reuse_one(&resource_i, addr, role, board_id).await {
                Ok(OneOutcome::Fresh(handle)) => {
                    opened_this_call.push(handle);
                    if index == 0 {
                        primary_handle = Some(handle);
                    }
                }
                Ok(OneOutcome::Reused(handle)) => {
                    if index == 0 {
                        primary_handle = Some(handle);
                    }
                }
                Ok(OneOutcome::Ignored) if index == 0 => {
                    return Err(ErrorKind::ConnectAbort(resource_i).into());
                }
                Ok(OneOutcome::Ignored) => {
                    ignored_secondary = true;
                }
                Err(e) => {
                    self.unwind(&opened_this_call).await;
                    return Err(e);
                }
            }
        }

        Ok(OpenResult {
            handle: primary_handle.expect("group_size is always >= 1"),
            ignored_secondary,
        })
    }

    async fn open_or_reuse_one(
        &self,
        resource: &str,
        addr: SocketAddr,
        role: Role,
        board_id: &str,
    ) -> Result<OneOutcome> {
        let existing = {
            let reg = self.registry.lock().await;
            reg.by_resource(resource).map(|r| (r.handle, r.user_board_id.is_some(), r.worker.clone()))
        };

        if let Some((handle, is_live, worker)) = existing {
            if is_live {
                return Err(ErrorKind::AlreadyOpen(resource.to_string()).into());
            }
            match worker.call(CommandKind::Reopen, false).await? {
                WorkerReply::Active => {
                    let mut reg = self.registry.lock().await;
                    if let Some(rec) = reg.by_handle_mut(handle) {
                        rec.user_board_id = Some(board_id.to_string());
                    }
                    return Ok(OneOutcome::Reused(handle));
                }
                _ => return Err(ErrorKind::NoWorker(handle).into()),
            }
        }

        let handle = self.registry.lock().await.alloc_handle();
        let (worker_handle, connect_rx) = worker::spawn(WorkerParams {
            handle,
            resource: resource.to_string(),
            addr,
            role,
            connect_policy: self.connect_policy.clone(),
            observer: self.observer.clone(),
            connect_timeout: self.connect_timeout,
            command_timeout: self.command_timeout,
            registry: self.registry.clone(),
        });

        match connect_rx.await.map_err(|_| Error::from(ErrorKind::NoWorker(handle)))? {
            Ok(()) => {
                let mut reg = self.registry.lock().await;
                reg.insert(crate::registry::BoardRecord {
                    handle,
                    user_board_id: Some(board_id.to_string()),
                    tab_index: 0,
                    resource: resource.to_string(),
                    port_offset: resource.rfind(':').map(|i| i + 1).unwrap_or(0),
                    role,
                    config: None,
                    sample_bytes: 8,
                    last_status: Status::default(),
                    reps_programmed: 0,
                    reps_actual: 0,
                    ignore: false,
                    running: false,
                    worker: worker_handle,
                })
                .map_err(|_| Error::from(ErrorKind::AlreadyOpen(resource.to_string())))?;
                self.observer.notify(Event::BoardAdded {
                    handle,
                    resource: resource.to_string(),
                });
                Ok(OneOutcome::Fresh(handle))
            }
            Err(e) if e.kind() == &ErrorKind::ConnectIgnore(resource.to_string()) => {
                self.observer.notify(Event::BoardIgnored {
                    handle,
                    resource: resource.to_string(),
                });
                Ok(OneOutcome::Ignored)
            }
            Err(e) => Err(e),
        }
    }

    async fn unwind(&self, handles: &[i32]) {
        let workers: Vec<WorkerHandle> = {
            let reg = self.registry.lock().await;
            handles.iter().filter_map(|h| reg.by_handle(*h).map(|r| r.worker.clone())).collect()
        };
        for w in workers {
            let _ = w.call(CommandKind::ThreadExit, true).await;
        }
    }

    /// `§6` `Close`.
    pub async fn close(&self, handle: i32) -> Result<()> {
        let _guard = self.lock.acquire().await?;
        let workers = {
            let mut reg = self.registry.lock().await;
            let is_live = reg.by_handle(handle).map(|r| r.user_board_id.is_some()).unwrap_or(false);
            if !is_live {
                return Err(ErrorKind::NoWorker(handle).into());
            }
            let members = group_members(&reg, handle);
            let mut workers = Vec::new();
            for h in members {
                if let Some(rec) = reg.by_handle_mut(h) {
                    if rec.ignore {
                        continue;
                    }
                    rec.user_board_id = None;
                    workers.push(rec.worker.clone());
                }
            }
            workers
        };
        for w in workers {
            w.call(CommandKind::Close(self.deferred_close_timeout), false).await?;
        }
        Ok(())
    }

    /// `§6` `Load`: accepted for compatibility with callers that still invoke
    /// it; the sample-file collaborator is out of this core's scope (`§1`).
    pub async fn load(&self, _handle: i32) -> Result<()> {
        Ok(())
    }

    /// `§6` `Out_Config` / `§4.4` Out_Config fan-out.
    pub async fn out_config(&self, handle: i32, args: OutConfigArgs) -> Result<()> {
        let _guard = self.lock.acquire().await?;

        if args.ticks != 0 {
            return Err(ErrorKind::Argument("ticks must be 0".into()).into());
        }
        match (args.mask_len, &args.mask) {
            (0, None) => {}
            (n, Some(m)) if (n == 2 || n == 4) && m.len() == n => {}
            _ => {
                return Err(ErrorKind::Argument(
                    "maskLen must be 0 with no mask, or 2/4 matching the mask length".into(),
                )
                .into())
            }
        }
        if !(SCAN_RATE_MIN_HZ..=SCAN_RATE_MAX_HZ).contains(&args.scan_rate_hz) {
            return Err(ErrorKind::Argument(format!(
                "scan rate {} Hz outside [{}, {}]",
                args.scan_rate_hz, SCAN_RATE_MIN_HZ, SCAN_RATE_MAX_HZ
            ))
            .into());
        }

        let sample_bytes = if args.mask_len == 4 { 12 } else { 8 };
        let (ctrl_in, ctrl_out) = trigger::encode(args.start, args.stop)?;

        let mut config_bits = ConfigBits::from_bits_truncate(args.flags) & ConfigBits::USER_BITS;
        if sample_bytes == 8 {
            config_bits.insert(ConfigBits::BPS96);
        }
        if args.stop.is_some() || args.start.trigger_type == TriggerType::EdgeToEdge {
            config_bits.insert(ConfigBits::RESTART_EN);
        }

        let mut request = ClientConfig {
            bus_clock_hz: 0,
            scan_clock_hz: args.scan_rate_hz,
            config: config_bits,
            ctrl_in,
            ctrl_out,
            reps: args.reps,
            samples: 0,
            strobe_delay: AUTO,
            sync_wait: AUTO,
            sync_phase: AUTO,
        };

        let (members, strobe_default) = {
            let reg = self.registry.lock().await;
            let rec = reg.by_handle(handle).ok_or(ErrorKind::NoWorker(handle))?;
            let members: Vec<(i32, WorkerHandle)> = group_members(&reg, handle)
                .into_iter()
                .filter_map(|h| reg.by_handle(h).filter(|r| !r.ignore).map(|r| (h, r.worker.clone())))
                .collect();
            let strobe = self.config_file.as_ref().and_then(|cf| {
                rec.resource
                    .split(':')
                    .next()
                    .and_then(|ip| cf.rack(ip))
                    .map(|rack| rack.strobe_delay)
            });
            (members, strobe)
        };

        if let Some(strobe) = strobe_default {
            request.strobe_delay = (strobe.r0 << 24) | (strobe.r1 << 16) | (strobe.r2 << 8) | strobe.level;
        }

        for (h, worker) in &members {
            match worker.call(CommandKind::Configure(request), false).await? {
                WorkerReply::Config(echoed) => {
                    let mut reg = self.registry.lock().await;
                    if let Some(rec) = reg.by_handle_mut(*h) {
                        rec.config = Some(echoed);
                        rec.sample_bytes = sample_bytes;
                        rec.reps_programmed = args.reps;
                    }
                }
                _ => return Err(ErrorKind::BoardState(*h).into()),
            }
        }
        Ok(())
    }

    /// `§6` `Out_Status` / `§4.4` severity-ranked aggregation.
    pub async fn out_status(&self, handle: i32) -> Result<(u32, Status)> {
        let _guard = self.lock.acquire().await?;
        let members = {
            let reg = self.registry.lock().await;
            reg.by_handle(handle).ok_or(ErrorKind::NoWorker(handle))?;
            group_members(&reg, handle)
                .into_iter()
                .filter_map(|h| reg.by_handle(h).filter(|r| !r.ignore).map(|r| (h, r.worker.clone())))
                .collect::<Vec<_>>()
        };

        let mut statuses: Vec<(i32, Status)> = Vec::with_capacity(members.len());
        for (h, worker) in &members {
            match worker.call(CommandKind::GetStatus, false).await? {
                WorkerReply::Status(status) => statuses.push((*h, status)),
                _ => return Err(ErrorKind::BoardState(*h).into()),
            }
        }

        let refs: Vec<(i32, &Status)> = statuses.iter().map(|(h, s)| (*h, s)).collect();
        let (origin, status) = status_agg::aggregate(refs).ok_or(ErrorKind::NoWorker(handle))?;

        if status.severity() == Severity::Error {
            let clock_lost_only =
                status.bits.contains(StatusBits::ERR_LOCK) && !status.bits.intersects(StatusBits::ERROR);
            let ignore_clock_loss = self.config_file.as_ref().map(|c| c.ignore_clock_loss).unwrap_or(false);
            if clock_lost_only && ignore_clock_loss {
                self.observer.notify(Event::ClockLostWarning { handle: origin });
            } else {
                return Err(if clock_lost_only {
                    ErrorKind::ClockLost(origin).into()
                } else {
                    ErrorKind::BoardState(origin).into()
                });
            }
        }

        Ok((status.board_samples, status))
    }

    /// `§6` `Out_Write` / `§4.4`, `§4.5` slicing fan-out.
    pub async fn out_write(&self, handle: i32, buffer: &[u8], bufsize_samples: usize) -> Result<()> {
        let _guard = self.lock.acquire().await?;
        if bufsize_samples == 0 {
            return Err(ErrorKind::Argument("Out_Write with zero size is rejected".into()).into());
        }

        let (primary, secondary, sample_bytes) = {
            let reg = self.registry.lock().await;
            let rec = reg.by_handle(handle).ok_or(ErrorKind::NoWorker(handle))?;
            let sample_bytes = rec.sample_bytes;
            let secondaries = reg.secondaries_of(handle);
            let secondary = secondaries.first().filter(|r| !r.ignore).map(|r| r.worker.clone());
            (rec.worker.clone(), secondary, sample_bytes)
        };

        slicer::validate_aligned(buffer.len(), sample_bytes)
            .map_err(|(len, sb)| Error::from(ErrorKind::Argument(format!("{len} bytes is not a multiple of the {sb}-byte sample size"))))?;
        if buffer.len() / sample_bytes != bufsize_samples {
            return Err(ErrorKind::Argument("bufsize_samples does not match buffer length".into()).into());
        }

        if let Some(secondary) = secondary {
            if sample_bytes != 12 {
                return Err(ErrorKind::Argument(
                    "a linked group's 8-byte-on-wire mode requires 12-byte caller samples".into(),
                )
                .into());
            }
            for (start, end) in slicer::chunk_ranges(bufsize_samples) {
                let primary_chunk = slicer::slice_chunk(buffer, start, end, SliceTarget::Primary);
                let secondary_chunk = slicer::slice_chunk(buffer, start, end, SliceTarget::Secondary);
                primary.call(CommandKind::Write(primary_chunk), false).await?;
                secondary.call(CommandKind::Write(secondary_chunk), false).await?;
            }
        } else {
            for (start, end) in slicer::chunk_ranges(bufsize_samples) {
                let chunk = buffer[start * sample_bytes..end * sample_bytes].to_vec();
                primary.call(CommandKind::Write(chunk), false).await?;
            }
        }
        Ok(())
    }

    /// `§6` `Out_Start` / `§4.4`, `§5` secondary-to-primary ordering.
    pub async fn out_start(&self, handle: i32) -> Result<()> {
        let _guard = self.lock.acquire().await?;
        let (primary, secondaries, reps) = {
            let reg = self.registry.lock().await;
            let rec = reg.by_handle(handle).ok_or(ErrorKind::NoWorker(handle))?;
            let secondaries: Vec<WorkerHandle> = reg
                .secondaries_of(handle)
                .into_iter()
                .filter(|r| !r.ignore)
                .map(|r| r.worker.clone())
                .collect();
            (rec.worker.clone(), secondaries, rec.reps_programmed)
        };

        let mut started: Vec<WorkerHandle> = Vec::new();
        let start_order = secondaries.iter().cloned().chain(std::iter::once(primary.clone()));
        for worker in start_order {
            match worker.call(CommandKind::Start(reps), false).await {
                Ok(_) => started.push(worker),
                Err(e) => {
                    for w in started.iter().rev() {
                        let _ = w.call(CommandKind::Stop, false).await;
                    }
                    return Err(e);
                }
            }
        }

        // Drain whatever the status-polling loop already queued while each
        // board settled into RUN, up to 10x the command timeout total
        // (`§4.4` Out_Start fan-out).
        let deadline = tokio::time::Instant::now() + self.command_timeout * 10;
        for worker in started.iter() {
            loop {
                let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
                if remaining.is_zero() {
                    break;
                }
                if worker.recv_queue().remove(remaining.min(Duration::from_millis(1))).await.is_none() {
                    break;
                }
            }
        }
        Ok(())
    }

    /// `§6` `Out_Stop` / `§4.4`, `§5` primary-to-secondary ordering (reverse
    /// of Start).
    pub async fn out_stop(&self, handle: i32) -> Result<()> {
        let _guard = self.lock.acquire().await?;
        let (primary, secondaries) = {
            let reg = self.registry.lock().await;
            let rec = reg.by_handle(handle).ok_or(ErrorKind::NoWorker(handle))?;
            let secondaries: Vec<WorkerHandle> = reg
                .secondaries_of(handle)
                .into_iter()
                .filter(|r| !r.ignore)
                .map(|r| r.worker.clone())
                .collect();
            (rec.worker.clone(), secondaries)
        };

        let stop_order = std::iter::once(primary).chain(secondaries);
        for worker in stop_order {
            worker.call(CommandKind::Stop, false).await?;
            while worker.recv_queue().remove(Duration::from_millis(0)).await.is_some() {}
        }
        Ok(())
    }

    /// `§6` `Out_ForceOutput`: Stop -> Config(reps=1) -> one-sample Write ->
    /// Start -> poll until END/Error -> Stop, preserving the user-visible
    /// repetition counter across the cycle.
    pub async fn out_force_output(&self, handle: i32, buffer: &[u8]) -> Result<()> {
        let saved_reps = {
            let reg = self.registry.lock().await;
            reg.by_handle(handle).ok_or(ErrorKind::NoWorker(handle))?.reps_programmed
        };

        self.out_stop(handle).await.ok();

        let sample_bytes = {
            let reg = self.registry.lock().await;
            let rec = reg.by_handle(handle).ok_or(ErrorKind::NoWorker(handle))?;
            rec.config.ok_or(ErrorKind::BoardState(handle))?;
            rec.sample_bytes
        };
        let start = TriggerSpec {
            trigger_type: TriggerType::LevelHigh,
            source: TriggerSource::Input0,
        };

        self.out_config(
            handle,
            OutConfigArgs {
                ticks: 0,
                mask: None,
                mask_len: 0,
                flags: 0,
                start,
                stop: None,
                reps: 1,
                scan_rate_hz: SCAN_RATE_MIN_HZ,
            },
        )
        .await?;

        self.out_write(handle, &buffer[..sample_bytes], 1).await?;
        self.out_start(handle).await?;

        loop {
            let (_, status) = self.out_status(handle).await?;
            if matches!(status.severity(), Severity::End | Severity::Error) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        self.out_stop(handle).await?;

        let mut reg = self.registry.lock().await;
        if let Some(rec) = reg.by_handle_mut(handle) {
            rec.reps_programmed = saved_reps;
        }
        Ok(())
    }

    /// `§6` `In_*`: input-capture operations are out of scope (`§1`
    /// Non-goals).
    pub async fn in_status(&self) -> Result<()> {
        Err(ErrorKind::NotImplemented.into())
    }

    /// `§6` `register_callback`: `n` selects the nth board within the linked
    /// group (0 = primary).
    pub async fn register_callback(&self, handle: i32, n: usize, callback: Option<StatusCallback>) -> Result<()> {
        let _guard = self.lock.acquire().await?;
        let target = {
            let reg = self.registry.lock().await;
            reg.by_handle(handle).ok_or(ErrorKind::NoWorker(handle))?;
            if n == 0 {
                reg.by_handle(handle).unwrap().worker.clone()
            } else {
                reg.secondaries_of(handle)
                    .get(n - 1)
                    .map(|r| r.worker.clone())
                    .ok_or(ErrorKind::NoWorker(handle))?
            }
        };
        target.call(CommandKind::RegisterCallback(callback), false).await?;
        Ok(())
    }

    /// `§6` `exit_all`: tears down every board (the UI teardown is the
    /// integrator's responsibility, per `§1` Non-goals).
    pub async fn exit_all(&self) -> Result<()> {
        let _guard = self.lock.acquire().await?;
        let workers: Vec<WorkerHandle> = {
            let reg = self.registry.lock().await;
            reg.iter_live().map(|r| r.worker.clone()).collect()
        };
        for w in workers {
            let _ = w.call(CommandKind::ThreadExit, true).await;
        }
        Ok(())
    }
}

impl Default for Dio64 {
    fn default() -> Self {
        Self::new()
    }
}

enum OneOutcome {
    Fresh(i32),
    Reused(i32),
    Ignored,
}

fn group_members(reg: &Registry, primary_handle: i32) -> Vec<i32> {
    let mut members = vec![primary_handle];
    members.extend(reg.secondaries_of(primary_handle).into_iter().map(|r| r.handle));
    members
}

/// Secondary `i` sits at the primary's IPv4 address with the last octet
/// incremented by `i` (`§4.4`, `§6`).
fn offset_addr(base: SocketAddr, index: usize) -> Result<SocketAddr> {
    if index == 0 {
        return Ok(base);
    }
    let SocketAddr::V4(v4) = base else {
        return Err(ErrorKind::Argument("linked groups require an IPv4 resource".into()).into());
    };
    let octets = v4.ip().octets();
    let last = octets[3] as usize + index;
    if last > u8::MAX as usize {
        return Err(ErrorKind::Argument("secondary index overflows the last IPv4 octet".into()).into());
    }
    let ip = Ipv4Addr::new(octets[0], octets[1], octets[2], last as u8);
    Ok(SocketAddr::new(ip.into(), v4.port()))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn offset_addr_increments_the_last_octet() {
        let base: SocketAddr = "192.168.1.120:49701".parse().unwrap();
        let secondary = offset_addr(base, 1).unwrap();
        assert_eq!(secondary.to_string(), "192.168.1.121:49701");
    }

    #[test]
    fn offset_addr_rejects_overflow() {
        let base: SocketAddr = "192.168.1.255:49701".parse().unwrap();
        assert!(offset_addr(base, 1).is_err());
    }

    #[test]
    fn legacy_code_surfaces_the_handle_on_a_clean_open() {
        let result = OpenResult { handle: 42, ignored_secondary: false };
        assert_eq!(result.legacy_code(), 42);
    }

    #[test]
    fn legacy_code_surfaces_connect_ignore_when_a_secondary_was_dropped() {
        let result = OpenResult { handle: 42, ignored_secondary: true };
        assert_eq!(result.legacy_code(), codes::ERROR_CONNECT_IGNORE);
    }
}
