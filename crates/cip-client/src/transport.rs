//! Raw encapsulation and datagram I/O helpers (§4.13).
//!
//! Deliberately thin: framing (encapsulation header + length-prefixed
//! data) lives in `cip-proto`; this module only knows how to get bytes on
//! and off a `TcpStream`/`UdpSocket` with a timeout, mirroring
//! `cip-server::transport`'s `read_encapsulation`/`write_bytes` pair on
//! the client side of the same wire.

use std::time::Duration;

use cip_proto::{Endianness, enip::Encapsulation};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpStream, UdpSocket},
    time::timeout,
};

use crate::error::{ClientError, Result};

/// Read one encapsulation frame off `socket`, bounded by `deadline`.
pub async fn read_encapsulation(
    socket: &mut TcpStream,
    byte_order: Endianness,
    deadline: Duration,
    operation: &'static str,
) -> Result<Encapsulation> {
    let mut header = [0u8; Encapsulation::HEADER_SIZE];
    timeout(deadline, socket.read_exact(&mut header)).await.map_err(|_| ClientError::Timeout {
        operation,
        elapsed_ms: deadline.as_millis() as u64,
    })??;

    let length = byte_order.read_u16(&header[2..4]) as usize;
    let mut data = vec![0u8; length];
    timeout(deadline, socket.read_exact(&mut data)).await.map_err(|_| ClientError::Timeout {
        operation,
        elapsed_ms: deadline.as_millis() as u64,
    })??;

    let mut frame = header.to_vec();
    frame.extend_from_slice(&data);
    Ok(Encapsulation::decode(&frame, byte_order)?)
}

/// Write one encapsulation frame to `socket`.
pub async fn write_encapsulation(socket: &mut TcpStream, enc: &Encapsulation, byte_order: Endianness) -> Result<()> {
    socket.write_all(&enc.encode(byte_order)).await?;
    Ok(())
}

/// Send a UDP datagram and wait up to `deadline` for a reply, matching
/// `cip-server::transport::run_implicit_io`'s bare CPF-item framing (no
/// encapsulation header on connected I/O datagrams).
pub async fn send_and_receive_datagram(
    socket: &UdpSocket,
    payload: &[u8],
    deadline: Duration,
    operation: &'static str,
) -> Result<Vec<u8>> {
    socket.send(payload).await?;
    let mut buf = vec![0u8; 4096];
    let n = timeout(deadline, socket.recv(&mut buf))
        .await
        .map_err(|_| ClientError::Timeout { operation, elapsed_ms: deadline.as_millis() as u64 })??;
    buf.truncate(n);
    Ok(buf)
}
