// Copyright (C) 2024  INO Quantum Systems
//
// This file is part of the DIO64 board coordination library.
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

//! Fixed-layout little-endian frame header: 6-bit command code, 10-bit total
//! length (the whole frame, header included).

use crate::command::Command;
use std::convert::TryFrom;

/// Total length of the header itself, in bytes.
pub const HEADER_LEN: usize = 2;

/// Maximum representable frame length (10 bits).
pub const MAX_FRAME_LEN: usize = 0x3ff;

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct Header {
    pub command: Command,
    pub total_len: u16,
}

impl Header {
    pub fn new(command: Command, body_len: usize) -> Self {
        let total_len = (HEADER_LEN + body_len) as u16;
        debug_assert!(total_len as usize <= MAX_FRAME_LEN);
        Header { command, total_len }
    }

    /// `((cmd & 0x3f) << 10) | (total_length & 0x3ff)`, little-endian on the wire.
    pub fn encode(self) -> [u8; HEADER_LEN] {
        let word: u16 = ((self.command.code() as u16 & 0x3f) << 10) | (self.total_len & 0x3ff);
        word.to_le_bytes()
    }

    pub fn decode(bytes: [u8; HEADER_LEN]) -> Result<Self, u8> {
        let word = u16::from_le_bytes(bytes);
        let code = ((word >> 10) & 0x3f) as u8;
        let total_len = word & 0x3ff;
        let command = Command::try_from(code)?;
        Ok(Header { command, total_len })
    }

    pub fn body_len(self) -> usize {
        (self.total_len as usize).saturating_sub(HEADER_LEN)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn header_round_trips() {
        let h = Header::new(Command::OutConfig, crate::config::WIRE_CONFIG_LEN);
        let bytes = h.encode();
        let back = Header::decode(bytes).unwrap();
        assert_eq!(h, back);
    }

    #[test]
    fn bare_frame_is_just_the_header() {
        let h = Header::new(Command::Ack, 0);
        assert_eq!(h.total_len as usize, HEADER_LEN);
        assert_eq!(h.body_len(), 0);
    }

    #[test]
    fn decode_rejects_unknown_command() {
        // code 0x3f (all bits set), length 0
        let word: u16 = (0x3f << 10) | 2;
        assert!(Header::decode(word.to_le_bytes()).is_err());
    }
}
