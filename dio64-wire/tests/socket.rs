// Copyright (C) 2024  INO Quantum Systems
//
// This file is part of the DIO64 board coordination library.
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

//! `BoardSocket` exercised against a real loopback TCP connection, rather
//! than only through the frame/command unit tests colocated with the codec.

use dio64_wire::config::{ClientConfig, ConfigBits, AUTO, WIRE_CONFIG_LEN};
use dio64_wire::socket::BoardSocket;
use dio64_wire::{Command, ErrorKind};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

const TIMEOUT: Duration = Duration::from_millis(500);

#[tokio::test]
async fn round_trips_a_bare_ack() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut header = [0u8; 2];
        stream.read_exact(&mut header).await.unwrap();
        let word = u16::from_le_bytes(header);
        assert_eq!(((word >> 10) & 0x3f) as u8, Command::Open.code());
        assert_eq!(word & 0x3ff, 2);
        let reply: u16 = ((Command::Ack.code() as u16) << 10) | 2;
        stream.write_all(&reply.to_le_bytes()).await.unwrap();
    });

    let mut socket = BoardSocket::connect(addr, TIMEOUT).await.unwrap();
    socket.send_command(Command::Open, &[], TIMEOUT).await.unwrap();
    let (command, body) = socket.recv_response(Command::Open, TIMEOUT).await.unwrap();
    assert_eq!(command, Command::Ack);
    assert!(body.is_empty());

    server.await.unwrap();
}

#[tokio::test]
async fn round_trips_out_config_with_auto_fields_replaced() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let request = ClientConfig {
        bus_clock_hz: 0,
        scan_clock_hz: 1_000_000,
        config: ConfigBits::RESTART_EN,
        ctrl_in: [0, 0],
        ctrl_out: [0, 0],
        reps: 1,
        samples: 0,
        strobe_delay: AUTO,
        sync_wait: AUTO,
        sync_phase: AUTO,
    };

    let server = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut header = [0u8; 2];
        stream.read_exact(&mut header).await.unwrap();
        let mut body = vec![0u8; WIRE_CONFIG_LEN];
        stream.read_exact(&mut body).await.unwrap();
        let mut cfg = ClientConfig::decode(&body).unwrap();
        cfg.strobe_delay = 7;
        cfg.sync_wait = 8;
        cfg.sync_phase = 9;
        let mut encoded = Vec::new();
        cfg.encode(&mut encoded).unwrap();
        let reply_header: u16 = ((Command::OutConfig.code() as u16) << 10) | (2 + encoded.len()) as u16;
        let mut out = reply_header.to_le_bytes().to_vec();
        out.extend_from_slice(&encoded);
        stream.write_all(&out).await.unwrap();
    });

    let mut socket = BoardSocket::connect(addr, TIMEOUT).await.unwrap();
    let mut buf = Vec::new();
    request.encode(&mut buf).unwrap();
    socket.send_command(Command::OutConfig, &buf, TIMEOUT).await.unwrap();
    let (command, body) = socket.recv_response(Command::OutConfig, TIMEOUT).await.unwrap();
    assert_eq!(command, Command::OutConfig);
    let echoed = ClientConfig::decode(&body).unwrap();
    assert!(request.echo_matches(&echoed));
    assert_eq!(echoed.strobe_delay, 7);

    server.await.unwrap();
}

#[tokio::test]
async fn nack_surfaces_as_an_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut header = [0u8; 2];
        stream.read_exact(&mut header).await.unwrap();
        let reply: u16 = ((Command::Nack.code() as u16) << 10) | 2;
        stream.write_all(&reply.to_le_bytes()).await.unwrap();
    });

    let mut socket = BoardSocket::connect(addr, TIMEOUT).await.unwrap();
    socket.send_command(Command::Reset, &[], TIMEOUT).await.unwrap();
    let err = socket.recv_response(Command::Reset, TIMEOUT).await.unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::Nack(Command::Reset)));

    server.await.unwrap();
}

#[tokio::test]
async fn response_timeout_leaves_the_socket_usable() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (mut stream, _): (TcpStream, _) = listener.accept().await.unwrap();
        // Read the request but never answer it within the client's timeout,
        // then answer a second one so the caller can prove the socket
        // survived the timeout.
        let mut header = [0u8; 2];
        stream.read_exact(&mut header).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        stream.read_exact(&mut header).await.unwrap();
        let reply: u16 = ((Command::Ack.code() as u16) << 10) | 2;
        stream.write_all(&reply.to_le_bytes()).await.unwrap();
    });

    let mut socket = BoardSocket::connect(addr, TIMEOUT).await.unwrap();
    socket.send_command(Command::Reset, &[], TIMEOUT).await.unwrap();
    let err = socket
        .recv_response(Command::Reset, Duration::from_millis(5))
        .await
        .unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::Timeout(Command::Reset)));

    socket.send_command(Command::Reset, &[], TIMEOUT).await.unwrap();
    let (command, _) = socket.recv_response(Command::Reset, TIMEOUT).await.unwrap();
    assert_eq!(command, Command::Ack);

    server.await.unwrap();
}
