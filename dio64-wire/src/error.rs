// Copyright (C) 2024  INO Quantum Systems
//
// This file is part of the DIO64 board coordination library.
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

//! Wire-level error kinds: transport failures and protocol mismatches for a single frame.

use failure::{Backtrace, Context, Fail};
use std::fmt::{self, Debug, Display};
use std::io;

pub struct Error {
    inner: Context<ErrorKind>,
}

#[derive(Clone, Eq, PartialEq, Debug, Fail)]
pub enum ErrorKind {
    /// `send()` on the socket failed or the connect handshake did not complete.
    #[fail(display = "transport send: {}", _0)]
    Send(String),

    /// `recv()` on the socket failed outright (not a timeout).
    #[fail(display = "transport recv: {}", _0)]
    Recv(String),

    /// No full frame arrived within the caller's timeout budget.
    #[fail(display = "transport timeout waiting for {:?}", _0)]
    Timeout(crate::command::Command),

    /// A response frame's command code did not match what was sent, and the
    /// command being awaited has no documented degrade path.
    #[fail(display = "protocol mismatch: sent {:?}, got {:?}", sent, got)]
    Protocol {
        sent: crate::command::Command,
        got: crate::command::Command,
    },

    /// The board server returned NACK for the request.
    #[fail(display = "server refused {:?}", _0)]
    Nack(crate::command::Command),

    /// Caller passed a write length that isn't a multiple of the sample size.
    #[fail(display = "write length {} is not a multiple of sample size {}", len, sample_size)]
    Unaligned { len: usize, sample_size: usize },
}

impl Fail for Error {
    fn cause(&self) -> Option<&dyn Fail> {
        self.inner.cause()
    }

    fn backtrace(&self) -> Option<&Backtrace> {
        self.inner.backtrace()
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        Display::fmt(&self.inner, f)
    }
}

impl Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        Debug::fmt(&self.inner, f)
    }
}

impl Error {
    pub fn kind(&self) -> &ErrorKind {
        self.inner.get_context()
    }
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Error {
            inner: Context::new(kind),
        }
    }
}

impl From<Context<ErrorKind>> for Error {
    fn from(inner: Context<ErrorKind>) -> Self {
        Error { inner }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        if e.kind() == io::ErrorKind::WouldBlock || e.kind() == io::ErrorKind::TimedOut {
            ErrorKind::Timeout(crate::command::Command::None).into()
        } else {
            ErrorKind::Recv(e.to_string()).into()
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
