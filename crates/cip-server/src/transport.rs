//! TCP/UDP transport: binds the three listeners §6 requires and drives
//! each connection/datagram through [`crate::Server`].
//!
//! Mirrors the teacher's accept-loop shape (`loop { match accept().await {
//! ... } }`, one task per connection) but over raw TCP/UDP sockets instead
//! of a QUIC endpoint, since this protocol has no notion of encrypted
//! transport (§1's Non-goals).

use std::{net::SocketAddr, sync::Arc, time::Instant};

use cip_core::validator::Validation;
use cip_proto::{
    Endianness,
    cip::{CipRequest, CipResponse},
    constants::service,
    enip::{Command, Encapsulation, build_send_rr_data, build_send_unit_data, parse_send_rr_data, parse_send_unit_data, status},
};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream, UdpSocket},
    time::sleep,
};
use tracing::{debug, error, info, warn};

use crate::{error::ServerError, fault::chunk_bytes, server::Server};

/// Result alias local to this module.
type Result<T> = std::result::Result<T, ServerError>;

/// Bind and run every listener this server needs, returning only on error
/// (or never, under normal operation - callers typically run this inside
/// `tokio::select!` alongside a shutdown signal).
pub async fn run(server: Arc<Server>) -> Result<()> {
    let explicit = tokio::spawn(run_explicit_messaging(Arc::clone(&server)));
    let discovery = tokio::spawn(run_discovery(Arc::clone(&server)));
    let implicit = tokio::spawn(run_implicit_io(Arc::clone(&server)));

    tokio::select! {
        res = explicit => flatten(res)?,
        res = discovery => flatten(res)?,
        res = implicit => flatten(res)?,
    }
    Ok(())
}

fn flatten(joined: std::result::Result<Result<()>, tokio::task::JoinError>) -> Result<()> {
    match joined {
        Ok(inner) => inner,
        Err(e) => Err(ServerError::Config(format!("listener task panicked: {e}"))),
    }
}

/// TCP listener for `RegisterSession`/`UnregisterSession`/`SendRRData`/
/// `SendUnitData`/the non-session discovery commands (§6).
async fn run_explicit_messaging(server: Arc<Server>) -> Result<()> {
    let addr = server.config.explicit_messaging_addr();
    let listener = TcpListener::bind(addr.as_str()).await?;
    info!(%addr, "explicit messaging listener bound");

    loop {
        match listener.accept().await {
            Ok((socket, peer)) => {
                let server = Arc::clone(&server);
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(server, socket, peer).await {
                        debug!(%peer, error = %e, "connection worker exited");
                    }
                });
            },
            Err(e) => error!(error = %e, "accept failed"),
        }
    }
}

/// One TCP connection's lifetime: read an encapsulation, validate it,
/// route it, apply the fault schedule to the reply, repeat until the
/// peer disconnects, `UnregisterSession` arrives, or a fault closes early.
async fn handle_connection(server: Arc<Server>, mut socket: TcpStream, peer: SocketAddr) -> Result<()> {
    let byte_order = server.profile().enip_byte_order;
    let mut session_id: u32 = 0;

    loop {
        let Some(enc) = read_encapsulation(&mut socket, byte_order).await? else {
            return Ok(());
        };

        let validation = server.validator.validate_encapsulation(&enc, server.profile());
        server.validator.log_rejection("encapsulation", &validation);
        if let Validation::Reject { .. } = validation {
            let resp = error_encapsulation(&enc, status::INCORRECT_DATA);
            write_response(&server, &mut socket, &resp, byte_order).await?;
            continue;
        }

        let Some(command) = Command::from_code(enc.command) else {
            let resp = error_encapsulation(&enc, status::UNSUPPORTED_COMMAND);
            write_response(&server, &mut socket, &resp, byte_order).await?;
            continue;
        };

        match command {
            Command::RegisterSession => {
                #[allow(clippy::expect_used)]
                let mut sessions = server.sessions.lock().expect("session registry mutex poisoned");
                let session = sessions.register(peer.to_string(), enc.sender_context, Instant::now());
                session_id = session.id;
                let resp = Encapsulation {
                    command: enc.command,
                    session_id,
                    status: status::SUCCESS,
                    sender_context: enc.sender_context,
                    options: 0,
                    data: vec![0x01, 0x00, 0x00, 0x00],
                };
                drop(sessions);
                write_response(&server, &mut socket, &resp, byte_order).await?;
            },
            Command::UnregisterSession => {
                #[allow(clippy::expect_used)]
                let mut sessions = server.sessions.lock().expect("session registry mutex poisoned");
                let _ = sessions.unregister(enc.session_id);
                return Ok(());
            },
            Command::ListIdentity => {
                let resp = handle_discovery(&server, &enc, byte_order);
                write_response(&server, &mut socket, &resp, byte_order).await?;
            },
            Command::ListServices | Command::ListInterfaces => {
                // Neither service enumeration nor interface enumeration is
                // in scope (§1's Non-goals name only transport-layer
                // security as excluded, but this harness only ever
                // exposes one "service"/interface, so an empty list is
                // the conformant answer rather than a stand-in).
                let resp = Encapsulation {
                    command: enc.command,
                    session_id: 0,
                    status: status::SUCCESS,
                    sender_context: enc.sender_context,
                    options: 0,
                    data: vec![],
                };
                write_response(&server, &mut socket, &resp, byte_order).await?;
            },
            Command::SendRRData => {
                let resp = handle_send_rr_data(&server, &enc);
                write_response(&server, &mut socket, &resp, byte_order).await?;
            },
            Command::SendUnitData => {
                let resp = handle_send_unit_data(&server, &enc);
                write_response(&server, &mut socket, &resp, byte_order).await?;
            },
        }
    }
}

/// Read one encapsulation frame off `socket`: 24-byte header, then
/// `length` bytes of data, both via `read_exact` so a frame split across
/// TCP segments is reassembled transparently. Returns `None` on clean EOF
/// before a header was read.
async fn read_encapsulation(socket: &mut TcpStream, byte_order: Endianness) -> Result<Option<Encapsulation>> {
    let mut header = [0u8; Encapsulation::HEADER_SIZE];
    match socket.read_exact(&mut header).await {
        Ok(_) => {},
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let length = byte_order.read_u16(&header[2..4]) as usize;
    let mut data = vec![0u8; length];
    socket.read_exact(&mut data).await?;

    let mut frame = header.to_vec();
    frame.extend_from_slice(&data);
    Ok(Some(Encapsulation::decode(&frame, byte_order)?))
}

/// Write `resp`, running it through the fault schedule first (§4.14):
/// delay, then either drop, or write (possibly chunked, possibly
/// duplicated), then optionally close the transport.
async fn write_response(server: &Server, socket: &mut TcpStream, resp: &Encapsulation, byte_order: Endianness) -> Result<()> {
    let decision = server.fault.decide().await;
    if decision.delay > std::time::Duration::ZERO {
        sleep(decision.delay).await;
    }
    if decision.drop {
        return Ok(());
    }

    let bytes = resp.encode(byte_order);
    write_bytes(socket, &bytes, decision.chunk_size).await?;
    if decision.duplicate {
        write_bytes(socket, &bytes, decision.chunk_size).await?;
    }
    if decision.close_after {
        socket.shutdown().await?;
        return Err(ServerError::Transport(std::io::Error::other("closed after write per fault schedule")));
    }
    Ok(())
}

async fn write_bytes(socket: &mut TcpStream, bytes: &[u8], chunk_size: Option<usize>) -> Result<()> {
    match chunk_size {
        Some(size) => {
            for chunk in chunk_bytes(bytes, size) {
                socket.write_all(chunk).await?;
            }
        },
        None => socket.write_all(bytes).await?,
    }
    Ok(())
}

fn error_encapsulation(req: &Encapsulation, status: u32) -> Encapsulation {
    Encapsulation { command: req.command, session_id: req.session_id, status, sender_context: req.sender_context, options: 0, data: vec![] }
}

fn handle_discovery(server: &Server, enc: &Encapsulation, byte_order: Endianness) -> Encapsulation {
    let data = cip_proto::build_list_identity_response(&[server.identity.snapshot()], byte_order);
    Encapsulation { command: enc.command, session_id: 0, status: status::SUCCESS, sender_context: enc.sender_context, options: 0, data }
}

fn handle_send_rr_data(server: &Server, enc: &Encapsulation) -> Encapsulation {
    let profile = server.profile();
    let Ok(cip_bytes) = parse_send_rr_data(&enc.data, profile.use_cpf, profile.enip_byte_order) else {
        return error_encapsulation(enc, status::INCORRECT_DATA);
    };
    let Ok(req) = CipRequest::decode(&cip_bytes, server.cip_codec_options()) else {
        return error_encapsulation(enc, status::INCORRECT_DATA);
    };
    let validation = server.validator.validate_request(&req, server.cip_codec_options());
    server.validator.log_rejection("SendRRData CIP request", &validation);
    if let Validation::Reject { .. } = validation {
        return error_encapsulation(enc, status::INCORRECT_DATA);
    }

    let resp = dispatch_cip_request(server, enc.session_id, &req);
    let resp_bytes = resp.encode(server.cip_codec_options());
    let data = build_send_rr_data(resp_bytes, 0, profile.use_cpf, profile.enip_byte_order);
    Encapsulation { command: enc.command, session_id: enc.session_id, status: status::SUCCESS, sender_context: enc.sender_context, options: 0, data }
}

fn handle_send_unit_data(server: &Server, enc: &Encapsulation) -> Encapsulation {
    let profile = server.profile();
    let Ok((connection_id, cip_bytes)) = parse_send_unit_data(&enc.data, profile.use_cpf, profile.enip_byte_order) else {
        return error_encapsulation(enc, status::INCORRECT_DATA);
    };
    let Ok(req) = CipRequest::decode(&cip_bytes, server.cip_codec_options()) else {
        return error_encapsulation(enc, status::INCORRECT_DATA);
    };
    let validation = server.validator.validate_request(&req, server.cip_codec_options());
    server.validator.log_rejection("SendUnitData CIP request", &validation);
    if let Validation::Reject { .. } = validation {
        return error_encapsulation(enc, status::INCORRECT_DATA);
    }

    let resp = dispatch_cip_request(server, enc.session_id, &req);
    let resp_bytes = resp.encode(server.cip_codec_options());
    let data = build_send_unit_data(connection_id, resp_bytes, profile.use_cpf, profile.enip_byte_order);
    Encapsulation { command: enc.command, session_id: enc.session_id, status: status::SUCCESS, sender_context: enc.sender_context, options: 0, data }
}

/// Route a decoded CIP request to `Forward_Open`/`Forward_Close` (which
/// bypass the handler registry, per `server.rs`'s module doc comment) or
/// to the registry via [`Server::execute`].
fn dispatch_cip_request(server: &Server, session_id: u32, req: &CipRequest) -> CipResponse {
    let target_class = req.path.class().unwrap_or(0);
    if Server::is_connection_management(target_class, req) {
        if req.service == service::FORWARD_CLOSE {
            server.handle_forward_close(req)
        } else {
            server.handle_forward_open(session_id, req)
        }
    } else {
        server.execute(target_class, req)
    }
}

/// UDP listener on port 44818 for `ListIdentity` discovery (§6, §8
/// scenario 1): one encapsulation per datagram, no session, no CPF
/// framing beyond what the identity item itself carries.
async fn run_discovery(server: Arc<Server>) -> Result<()> {
    let addr = server.config.explicit_messaging_addr();
    let socket = UdpSocket::bind(addr.as_str()).await?;
    info!(%addr, "discovery listener bound");
    let byte_order = server.profile().enip_byte_order;

    let mut buf = vec![0u8; 4096];
    loop {
        let (n, peer) = match socket.recv_from(&mut buf).await {
            Ok(pair) => pair,
            Err(e) => {
                error!(error = %e, "discovery recv failed");
                continue;
            },
        };
        let Ok(enc) = Encapsulation::decode(&buf[..n], byte_order) else {
            warn!(%peer, "malformed discovery datagram");
            continue;
        };
        if Command::from_code(enc.command) != Some(Command::ListIdentity) {
            continue;
        }
        let resp = handle_discovery(&server, &enc, byte_order);
        let bytes = resp.encode(byte_order);
        if let Err(e) = socket.send_to(&bytes, peer).await {
            warn!(%peer, error = %e, "discovery reply send failed");
        }
    }
}

/// UDP listener on port 2222 for connected (implicit) I/O (§6): datagrams
/// carry CPF connected-address/connected-data items directly, with no
/// ENIP encapsulation header and no interface-handle/timeout prefix (that
/// prefix is `SendUnitData`-specific, per `cip_proto::enip`'s doc
/// comments).
async fn run_implicit_io(server: Arc<Server>) -> Result<()> {
    let addr = server.config.implicit_io_addr();
    let socket = UdpSocket::bind(addr.as_str()).await?;
    info!(%addr, "implicit I/O listener bound");
    let byte_order = server.profile().cip_byte_order;

    let mut buf = vec![0u8; 4096];
    loop {
        let (n, peer) = match socket.recv_from(&mut buf).await {
            Ok(pair) => pair,
            Err(e) => {
                error!(error = %e, "implicit I/O recv failed");
                continue;
            },
        };
        if let Some((reply_conn_id, reply_bytes)) = handle_implicit_datagram(&server, &buf[..n], byte_order) {
            let items = vec![
                cip_proto::enip::CpfItem::connected_address(reply_conn_id, byte_order),
                cip_proto::enip::CpfItem::connected_data(reply_bytes),
            ];
            let out = cip_proto::enip::encode_cpf(&items, byte_order);
            if let Err(e) = socket.send_to(&out, peer).await {
                warn!(%peer, error = %e, "implicit I/O reply send failed");
            }
        }
    }
}

/// The data attribute assemblies answer Get/Set_Attribute_Single on
/// (§4.10's convention, matched by `personality::adapter`'s own tests).
const ASSEMBLY_DATA_ATTRIBUTE: u16 = 3;

fn handle_implicit_datagram(server: &Server, buf: &[u8], byte_order: Endianness) -> Option<(u32, Vec<u8>)> {
    let (items, _) = cip_proto::enip::decode_cpf(buf, byte_order).ok()?;
    let addr_item = items.iter().find(|i| i.type_id == cip_proto::enip::cpf_item::CONNECTED_ADDRESS)?;
    let data_item = items.iter().find(|i| i.type_id == cip_proto::enip::cpf_item::CONNECTED_DATA)?;
    if addr_item.data.len() < 4 {
        return None;
    }
    let conn_id = byte_order.read_u32(&addr_item.data);

    let now = Instant::now();
    // O->T and T->O ids are allocated as a consecutive pair by
    // `ConnectionRegistry::open` (even id first); toggling the low bit
    // recovers the other half of the pair without extra bookkeeping.
    let reply_conn_id = if conn_id % 2 == 0 { conn_id + 1 } else { conn_id - 1 };
    let connection_path = {
        #[allow(clippy::expect_used)]
        let connections = server.connections.lock().expect("connection registry mutex poisoned");
        if !connections.is_active(conn_id, now) {
            return None;
        }
        connections.get(conn_id)?.params.connection_path.clone()
    };
    let instance = connection_path.instance().unwrap_or(0);

    let application_payload = match server.profile().io_sequence_mode {
        cip_core::profile::IoSequenceMode::Omit => data_item.data.clone(),
        _ if data_item.data.len() >= 2 => data_item.data[2..].to_vec(),
        _ => data_item.data.clone(),
    };

    let set_req = CipRequest {
        service: service::SET_ATTRIBUTE_SINGLE,
        path: cip_proto::epath::EPath::class_instance_attribute(
            cip_proto::constants::class::ASSEMBLY,
            instance,
            ASSEMBLY_DATA_ATTRIBUTE,
        ),
        payload: application_payload,
    };
    let _ = server.adapters.handle_set(&set_req);

    let get_req = CipRequest {
        service: service::GET_ATTRIBUTE_SINGLE,
        path: cip_proto::epath::EPath::class_instance_attribute(
            cip_proto::constants::class::ASSEMBLY,
            instance,
            ASSEMBLY_DATA_ATTRIBUTE,
        ),
        payload: vec![],
    };
    let cip_core::dispatch::HandlerAction::Respond(resp) = server.adapters.handle_get(&get_req) else {
        return None;
    };

    let mut reply = Vec::with_capacity(2 + resp.payload.len());
    if server.profile().io_sequence_mode != cip_core::profile::IoSequenceMode::Omit {
        #[allow(clippy::expect_used)]
        let mut connections = server.connections.lock().expect("connection registry mutex poisoned");
        let seq = connections.touch_and_advance_sequence(reply_conn_id, now).ok()?;
        byte_order.put_u16(&mut reply, seq);
    }
    reply.extend_from_slice(&resp.payload);

    Some((reply_conn_id, reply))
}
