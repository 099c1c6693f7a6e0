// Copyright (C) 2024  INO Quantum Systems
//
// This file is part of the DIO64 board coordination library.
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

//! Bounded-timeout framed I/O over one board's TCP connection. Partial
//! receives are legal: a read loops until the full expected length has
//! arrived or the timeout elapses, at which point the caller sees
//! [`ErrorKind::Timeout`] and the socket is left open — it is only torn down
//! on explicit `Close` or an outright I/O error.

use crate::command::Command;
use crate::error::{Error, ErrorKind, Result};
use crate::frame::{Header, HEADER_LEN};
use dio64_logging::macros::*;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

/// Default command-plane timeout (connect handshake, control frames).
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_millis(1000);

/// Sample uploads can run tens of seconds; the final post-payload ACK gets a
/// much larger budget than a control-plane ACK.
pub const UPLOAD_ACK_TIMEOUT: Duration = Duration::from_secs(30);

/// Chunk size used when streaming Out_Write payload bytes.
pub const WRITE_CHUNK_BYTES: usize = 1024 * 1024;

pub struct BoardSocket {
    stream: TcpStream,
    peer: SocketAddr,
}

impl BoardSocket {
    pub async fn connect(addr: SocketAddr, connect_timeout: Duration) -> Result<Self> {
        let stream = timeout(connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| ErrorKind::Timeout(Command::None))?
            .map_err(|e| ErrorKind::Send(e.to_string()))?;
        stream
            .set_nodelay(true)
            .map_err(|e| ErrorKind::Send(e.to_string()))?;
        Ok(BoardSocket { stream, peer: addr })
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Sends a bare or payload-carrying command frame.
    pub async fn send_command(
        &mut self,
        command: Command,
        body: &[u8],
        send_timeout: Duration,
    ) -> Result<()> {
        debug_assert_eq!(body.len(), command.request_body_len());
        let header = Header::new(command, body.len());
        let mut buf = Vec::with_capacity(HEADER_LEN + body.len());
        buf.extend_from_slice(&header.encode());
        buf.extend_from_slice(body);
        timeout(send_timeout, self.stream.write_all(&buf))
            .await
            .map_err(|_| ErrorKind::Timeout(command))?
            .map_err(|e| ErrorKind::Send(e.to_string()))?;
        Ok(())
    }

    /// Streams an already-sliced payload in [`WRITE_CHUNK_BYTES`]-bounded
    /// chunks, for the data phase of Out_Write (after the header+bytecount
    /// frame and its ACK).
    pub async fn send_payload(&mut self, mut payload: &[u8], send_timeout: Duration) -> Result<()> {
        while !payload.is_empty() {
            let chunk_len = payload.len().min(WRITE_CHUNK_BYTES);
            let (chunk, rest) = payload.split_at(chunk_len);
            timeout(send_timeout, self.stream.write_all(chunk))
                .await
                .map_err(|_| ErrorKind::Timeout(Command::OutWrite))?
                .map_err(|e| ErrorKind::Send(e.to_string()))?;
            payload = rest;
        }
        Ok(())
    }

    /// Reads one response frame, looping on partial receives until the header's
    /// declared body length has fully arrived or `recv_timeout` elapses.
    ///
    /// `expected` drives which length to wait for (a response reuses the
    /// request's command code, with GET_STATUS_IRQ's documented degrade
    /// exception) and is re-validated against the decoded header.
    pub async fn recv_response(
        &mut self,
        expected: Command,
        recv_timeout: Duration,
    ) -> Result<(Command, Vec<u8>)> {
        let deadline = tokio::time::Instant::now() + recv_timeout;

        let mut header_buf = [0u8; HEADER_LEN];
        self.read_exact_by(&mut header_buf, deadline, expected)
            .await?;
        let header = Header::decode(header_buf).map_err(|code| {
            warn!("unknown command code {:#x} on socket {}", code, self.peer);
            ErrorKind::Protocol {
                sent: expected,
                got: Command::None,
            }
        })?;

        if header.command != Command::Ack
            && header.command != Command::Nack
            && !header.command.satisfies(expected)
        {
            return Err(ErrorKind::Protocol {
                sent: expected,
                got: header.command,
            }
            .into());
        }

        let mut body = vec![0u8; header.body_len()];
        if !body.is_empty() {
            self.read_exact_by(&mut body, deadline, expected).await?;
        }

        if header.command == Command::Nack {
            return Err(ErrorKind::Nack(expected).into());
        }

        Ok((header.command, body))
    }

    async fn read_exact_by(
        &mut self,
        buf: &mut [u8],
        deadline: tokio::time::Instant,
        awaiting: Command,
    ) -> Result<()> {
        let mut filled = 0;
        while filled < buf.len() {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                return Err(ErrorKind::Timeout(awaiting).into());
            }
            let n = timeout(remaining, self.stream.read(&mut buf[filled..]))
                .await
                .map_err(|_| ErrorKind::Timeout(awaiting))?
                .map_err(|e: std::io::Error| ErrorKind::Recv(e.to_string()))?;
            if n == 0 {
                return Err(ErrorKind::Recv(format!(
                    "peer {} closed connection",
                    self.peer
                ))
                .into());
            }
            filled += n;
        }
        Ok(())
    }

    pub async fn shutdown(&mut self) {
        let _ = self.stream.shutdown().await;
    }
}

pub fn parse_resource_name(resource: &str) -> Result<SocketAddr> {
    resource
        .parse()
        .map_err(|_| Error::from(ErrorKind::Send(format!("bad resource name: {resource}"))))
}
