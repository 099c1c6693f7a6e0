// Copyright (C) 2024  INO Quantum Systems
//
// This file is part of the DIO64 board coordination library.
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

//! The ~20-entry command set spoken with a board server, and the static body
//! lengths that go with each one. A response frame carries the same 6-bit
//! command code as its request (the one documented exception is
//! [`Command::GetStatusIrq`], which may degrade to a [`Command::GetStatus`]
//! response on a server-side timeout).

use std::convert::TryFrom;

/// 6-bit command code carried in every frame header.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
#[repr(u8)]
pub enum Command {
    None = 0x00,
    Ack = 0x01,
    Nack = 0x02,
    Open = 0x03,
    OpenResource = 0x04,
    Close = 0x05,
    Reset = 0x06,
    OutConfig = 0x07,
    GetStatus = 0x08,
    GetStatusIrq = 0x09,
    GetStatusFull = 0x0a,
    OutWrite = 0x0b,
    OutStart = 0x0c,
    OutStop = 0x0d,
    GetReg = 0x0e,
    SetReg = 0x0f,
    SetSyncPhase = 0x10,
    AutoSyncStart = 0x11,
    AutoSyncStop = 0x12,
    Shutdown = 0x13,
}

impl Command {
    pub const MAX_CODE: u8 = 0x3f;

    pub fn code(self) -> u8 {
        self as u8
    }

    /// Body length (bytes, excluding the 2-byte header) of a *request* frame
    /// carrying this command code.
    pub fn request_body_len(self) -> usize {
        use Command::*;
        match self {
            None | Ack | Nack | Open | OpenResource | Close | Reset | GetStatus
            | GetStatusIrq | GetStatusFull | OutStop | AutoSyncStart | AutoSyncStop
            | Shutdown => 0,
            OutConfig => crate::config::WIRE_CONFIG_LEN,
            OutWrite => 4,
            OutStart => 4,
            GetReg => 4,
            SetReg => 8,
            SetSyncPhase => 4,
        }
    }

    /// Body length of a *response* frame carrying this command code. `Ack`/`Nack`
    /// are always bare; everything else that responds is either bare (plain
    /// acknowledgement) or carries the structure documented in `§4.1`.
    pub fn response_body_len(self) -> usize {
        use Command::*;
        match self {
            None | Ack | Nack | Open | OpenResource | Close | Reset | OutWrite | OutStart
            | OutStop | SetReg | SetSyncPhase | AutoSyncStart | AutoSyncStop | Shutdown => 0,
            OutConfig => crate::config::WIRE_CONFIG_LEN,
            GetStatus | GetStatusIrq => crate::status::WIRE_STATUS_LEN,
            GetStatusFull => crate::status::WIRE_STATUS_FULL_LEN,
            GetReg => 4,
        }
    }

    /// Whether this code may legitimately show up where `expected` was
    /// requested. Only the GET_STATUS_IRQ degrade path is non-reflexive.
    pub fn satisfies(self, expected: Command) -> bool {
        self == expected || (expected == Command::GetStatusIrq && self == Command::GetStatus)
    }
}

impl TryFrom<u8> for Command {
    type Error = u8;

    fn try_from(code: u8) -> Result<Self, u8> {
        use Command::*;
        Ok(match code {
            0x00 => None,
            0x01 => Ack,
            0x02 => Nack,
            0x03 => Open,
            0x04 => OpenResource,
            0x05 => Close,
            0x06 => Reset,
            0x07 => OutConfig,
            0x08 => GetStatus,
            0x09 => GetStatusIrq,
            0x0a => GetStatusFull,
            0x0b => OutWrite,
            0x0c => OutStart,
            0x0d => OutStop,
            0x0e => GetReg,
            0x0f => SetReg,
            0x10 => SetSyncPhase,
            0x11 => AutoSyncStart,
            0x12 => AutoSyncStop,
            0x13 => Shutdown,
            other => return Err(other),
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn round_trips_every_code() {
        for code in 0..=0x13u8 {
            let cmd = Command::try_from(code).expect("known code");
            assert_eq!(cmd.code(), code);
        }
    }

    #[test]
    fn unknown_code_is_rejected() {
        assert!(Command::try_from(0x3f).is_err());
    }

    #[test]
    fn status_irq_degrade_is_the_only_exception() {
        assert!(Command::GetStatus.satisfies(Command::GetStatusIrq));
        assert!(!Command::GetStatus.satisfies(Command::OutStart));
        assert!(Command::Ack.satisfies(Command::Ack));
    }
}
