// Copyright (C) 2024  INO Quantum Systems
//
// This file is part of the DIO64 board coordination library.
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

//! Client-side coordination library for DIO64-style FPGA output boards.
//!
//! [`Dio64`] is the sole entry point: one value owns the board registry, the
//! process-wide lock, and every per-board worker task it spawns. The source
//! this library replaces relied on a DLL-attach hook to lazily build a
//! process-global singleton; there is no implicit global state here at all -
//! construction (`Dio64::new`) is the "init" step and dropping (or calling
//! [`Dio64::exit_all`]) is the "shutdown" step, both explicit (`§9`).
//! Cross-process serialization (distinct processes on the same host sharing
//! boards) still goes through the named [`lock::ProcessLock`]; in-process
//! serialization across concurrent callers of one `Dio64` goes through that
//! same lock, acquired internally by every façade method.
//!
//! Module map:
//! - [`facade`]: the public API (`Dio64`, `OutConfigArgs`, `OpenResult`).
//! - [`worker`]: the per-board task and its state machine (`§4.2`).
//! - [`registry`]: the board arena and its handle/resource indices (`§3`).
//! - [`queue`]: the bounded priority/collapse-last queue backing worker
//!   command and status channels (`§4.3`).
//! - [`policy`]: the connect-failure policy callback (`§9`, replacing the
//!   source's interactive Abort/Retry/Ignore prompt).
//! - [`observer`]: the non-blocking dashboard/observer contract (`§6`).
//! - [`callback`]: the per-board status-push callback type (`§4.6`).
//! - [`slicer`]: the 12-byte/8-byte sample data path (`§4.5`).
//! - [`trigger`]: start/stop trigger register encoding (`§4.4`).
//! - [`status_agg`]: linked-group status severity aggregation (`§4.4`).
//! - [`config_file`]: rack/board configuration file loading.
//! - [`lock`]: the cross-process named mutex.
//! - [`error`]: the error taxonomy and legacy numeric code table (`§7`).

pub mod callback;
pub mod config_file;
pub mod error;
pub mod facade;
pub mod lock;
pub mod observer;
pub mod policy;
pub mod queue;
pub mod registry;
pub mod slicer;
pub mod status_agg;
pub mod trigger;
pub mod worker;

pub use config_file::ConfigFile;
pub use error::{Error, ErrorKind, Result};
pub use facade::{Dio64, OpenResult, OutConfigArgs};
pub use observer::{Event, NullObserver, Observer, ThrottlingObserver};
pub use policy::{ConnectDecision, ConnectPolicy, FailFastPolicy, RetryWithBackoff, SharedConnectPolicy};
pub use trigger::{TriggerSource, TriggerSpec, TriggerType};

/// TCP port a board server listens on by default, re-exported for callers
/// building their own resource strings.
pub use dio64_wire::DEFAULT_PORT;
