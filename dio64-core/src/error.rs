// Copyright (C) 2024  INO Quantum Systems
//
// This file is part of the DIO64 board coordination library.
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

//! Core error taxonomy and the stable negative return codes the public API
//! surface hands back to callers (`§7`).

use failure::{Backtrace, Context, Fail};
use std::fmt::{self, Debug, Display};

pub struct Error {
    inner: Context<ErrorKind>,
}

#[derive(Clone, Eq, PartialEq, Debug, Fail)]
pub enum ErrorKind {
    #[fail(display = "malformed argument: {}", _0)]
    Argument(String),

    #[fail(display = "could not acquire process-wide lock")]
    Lock,

    #[fail(display = "no board matches handle {}", _0)]
    NoWorker(i32),

    #[fail(display = "wire: {}", _0)]
    Wire(String),

    #[fail(display = "transport send failed: {}", _0)]
    Send(String),

    #[fail(display = "transport recv failed: {}", _0)]
    Recv(String),

    #[fail(display = "timed out waiting for {}", _0)]
    Timeout(String),

    #[fail(display = "server refused {}", _0)]
    Ack(String),

    #[fail(display = "board {} is in error state", _0)]
    BoardState(i32),

    #[fail(display = "external clock lost on board {}", _0)]
    ClockLost(i32),

    #[fail(display = "connect to {} aborted by policy", _0)]
    ConnectAbort(String),

    #[fail(display = "connect to {} ignored by policy", _0)]
    ConnectIgnore(String),

    #[fail(display = "board id {} is already open", _0)]
    AlreadyOpen(String),

    #[fail(display = "allocation failed: {}", _0)]
    Memory(String),

    #[fail(display = "operation not implemented")]
    NotImplemented,
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

    /// The stable negative value the public API hands back for this error,
    /// per the caller's reference table.
    pub fn code(&self) -> i32 {
        match self.kind() {
            ErrorKind::Argument(_) => codes::ERROR_INPUT,
            ErrorKind::Lock => codes::ERROR_LOCK,
            ErrorKind::NoWorker(_) => codes::ERROR_FIND_BOARD,
            ErrorKind::Wire(_) => codes::ERROR_UNEXPECTED,
            ErrorKind::Send(_) => codes::ERROR_SEND,
            ErrorKind::Recv(_) => codes::ERROR_RECV,
            ErrorKind::Timeout(_) => codes::ERROR_TIMEOUT,
            ErrorKind::Ack(_) => codes::ERROR_ACK,
            ErrorKind::BoardState(_) => codes::ERROR_BOARD,
            ErrorKind::ClockLost(_) => codes::ERROR_LOCK_LOST,
            ErrorKind::ConnectAbort(_) => codes::ERROR_CONNECT,
            ErrorKind::ConnectIgnore(_) => codes::ERROR_CONNECT_IGNORE,
            ErrorKind::AlreadyOpen(_) => codes::ERROR_FIND_BOARD,
            ErrorKind::Memory(_) => codes::ERROR_MEM,
            ErrorKind::NotImplemented => codes::ERROR_NOT_IMPLEMENTED,
        }
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

impl From<dio64_wire::Error> for Error {
    fn from(e: dio64_wire::Error) -> Self {
        use dio64_wire::ErrorKind as W;
        match e.kind() {
            W::Send(s) => ErrorKind::Send(s.clone()).into(),
            W::Recv(s) => ErrorKind::Recv(s.clone()).into(),
            W::Timeout(cmd) => ErrorKind::Timeout(format!("{:?}", cmd)).into(),
            W::Nack(cmd) => ErrorKind::Ack(format!("{:?}", cmd)).into(),
            W::Protocol { sent, got } => {
                ErrorKind::Wire(format!("sent {:?}, got {:?}", sent, got)).into()
            }
            W::Unaligned { len, sample_size } => ErrorKind::Argument(format!(
                "write length {len} is not a multiple of sample size {sample_size}"
            ))
            .into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Stable numeric error codes, mirroring the reference table every public
/// entry point promises callers.
pub mod codes {
    pub const ERROR_INPUT: i32 = -10;
    pub const ERROR_LOCK: i32 = -20;
    pub const ERROR_FIND_BOARD: i32 = -40;
    pub const ERROR_MEM: i32 = -50;
    pub const ERROR_CONF: i32 = -60;
    pub const ERROR_NOT_IMPLEMENTED: i32 = -70;
    pub const ERROR_SEND: i32 = -80;
    pub const ERROR_RECV: i32 = -90;
    pub const ERROR_ACK: i32 = -100;
    pub const ERROR_UNEXPECTED: i32 = -110;
    pub const ERROR_TIMEOUT: i32 = -120;
    pub const ERROR_CONNECT: i32 = -130;
    /// Positive on purpose: "open succeeded, with one board silently omitted".
    pub const ERROR_CONNECT_IGNORE: i32 = 130;
    pub const ERROR_IP: i32 = -140;
    pub const ERROR_BOARD: i32 = -150;
    pub const ERROR_LOCK_LOST: i32 = -151;
}
