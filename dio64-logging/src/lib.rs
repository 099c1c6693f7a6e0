// Copyright (C) 2024  INO Quantum Systems
//
// This file is part of the DIO64 board coordination library.
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.

//! Process-wide structured logger shared by every crate in the workspace.
//!
//! Downstream crates do `use dio64_logging::macros::*;` and then call the bare
//! `info!`/`warn!`/`error!` macros, which are bound to the global [`Logger`] drain
//! (terminal output, async-buffered, level filtered from `RUST_LOG`).

use lazy_static::lazy_static;
use slog::Drain;

lazy_static! {
    static ref ROOT_LOGGER: slog::Logger = build_root_logger();
}

fn build_root_logger() -> slog::Logger {
    let decorator = slog_term::TermDecorator::new().build();
    let term_drain = slog_term::FullFormat::new(decorator).build().fuse();
    let env_drain = slog_envlogger::new(term_drain);
    let async_drain = slog_async::Async::new(env_drain).build().fuse();
    slog::Logger::root(async_drain, slog::o!("crate" => "dio64"))
}

/// Returns the process-wide root logger. Prefer the `macros` re-exports in hot paths.
pub fn logger() -> &'static slog::Logger {
    &ROOT_LOGGER
}

/// Re-exports of slog's leveled logging macros, pre-bound to [`logger`].
///
/// Import with `use dio64_logging::macros::*;` to get plain `info!(...)` etc.
pub mod macros {
    #[macro_export]
    macro_rules! trace {
        ($($args:tt)+) => { slog::trace!($crate::logger(), $($args)+) };
    }
    #[macro_export]
    macro_rules! debug {
        ($($args:tt)+) => { slog::debug!($crate::logger(), $($args)+) };
    }
    #[macro_export]
    macro_rules! info {
        ($($args:tt)+) => { slog::info!($crate::logger(), $($args)+) };
    }
    #[macro_export]
    macro_rules! warn {
        ($($args:tt)+) => { slog::warn!($crate::logger(), $($args)+) };
    }
    #[macro_export]
    macro_rules! error {
        ($($args:tt)+) => { slog::error!($crate::logger(), $($args)+) };
    }

    pub use crate::debug;
    pub use crate::error;
    pub use crate::info;
    pub use crate::trace;
    pub use crate::warn;
}
