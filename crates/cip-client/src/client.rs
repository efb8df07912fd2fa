//! Client session driver (C13, §4.13).
//!
//! One [`ClientSession`] owns the TCP explicit-messaging/UCMM connection
//! for its lifetime and hands out an [`IoConnectionHandle`] per
//! `Forward_Open`. Unlike the teacher's actor-per-connection
//! `ConnectedClient` (background task + channels), this driver's methods
//! are plain `async fn`s a caller awaits directly - §4.13 describes
//! `Connect`/`InvokeService`/`ForwardOpen`/`SendIOData`/`ReceiveIOData`/
//! `Disconnect` as synchronous steps in a scenario script, not an
//! event stream a UI renders, so there's nothing for a channel/task split
//! to buy here.

use cip_core::{
    profile::{IoSequenceMode, Profile},
    validator::{Validation, ValidationMode, Validator},
};
use cip_proto::{
    cip::{CipCodecOptions, CipRequest, CipResponse},
    constants::{class, service},
    enip::{Command, CpfItem, Encapsulation, build_send_rr_data, build_send_unit_data, cpf_item, decode_cpf, encode_cpf, parse_send_rr_data, parse_send_unit_data, status},
    epath::EPath,
    services::{ForwardCloseParams, ForwardOpenParams, build_forward_close, build_forward_open, parse_forward_open_success},
};
use rand::Rng;
use tokio::net::{TcpStream, UdpSocket};
use tracing::{debug, info, instrument};

use crate::{
    config::{ClientConfig, IoTransport, io_receive_timeout},
    error::{ClientError, Result},
    transport::{read_encapsulation, send_and_receive_datagram, write_encapsulation},
};

/// A connected I/O relationship this client opened via `Forward_Open`
/// (§3's `IoConnection`, client-side view - the client doesn't need a
/// registry, just the handle it was given back).
pub struct IoConnectionHandle {
    /// Server-assigned originator-to-target connection id.
    pub o_to_t_id: u32,
    /// Server-assigned target-to-originator connection id.
    pub t_to_o_id: u32,
    /// This connection's serial number (needed to `Forward_Close` it).
    pub serial: u16,
    /// Negotiated O->T payload size in bytes.
    pub o_to_t_size: u16,
    /// Negotiated T->O payload size in bytes.
    pub t_to_o_size: u16,
    /// Derived receive timeout from the negotiated T->O RPI.
    pub receive_timeout: std::time::Duration,
    transport: IoTransport,
    udp: Option<UdpSocket>,
    sequence: u16,
}

/// Session driver: owns the TCP connection and the server-assigned
/// session id (§3's `Session`, client-side view).
pub struct ClientSession {
    config: ClientConfig,
    stream: TcpStream,
    session_id: u32,
    validator: Validator,
}

fn random_sender_context() -> [u8; 8] {
    let mut ctx = [0u8; 8];
    rand::thread_rng().fill(&mut ctx);
    ctx
}

/// Send a zero-session `ListIdentity` request over UDP and parse the
/// first identity item in the reply (§6, §8 scenario 1). Doesn't require
/// a registered session - this is the discovery path a caller runs
/// before ever calling [`ClientSession::connect`].
pub async fn discover(host: &str, profile: &Profile, timeout: std::time::Duration) -> Result<Vec<cip_proto::IdentityItem>> {
    let addr = format!("{host}:{}", crate::config::EXPLICIT_MESSAGING_PORT);
    let socket = UdpSocket::bind("0.0.0.0:0").await?;
    socket.connect(&addr).await.map_err(|source| ClientError::Connect { addr, source })?;

    let ctx = random_sender_context();
    let req = Encapsulation::list_identity_request(ctx).encode(profile.enip_byte_order);
    let resp_bytes = send_and_receive_datagram(&socket, &req, timeout, "ListIdentity").await?;
    let resp = Encapsulation::decode(&resp_bytes, profile.enip_byte_order)?;
    Ok(cip_proto::identity::parse_list_identity_response(&resp.data, profile.enip_byte_order)?)
}

impl ClientSession {
    /// Dial `config.explicit_messaging_addr()` and run the
    /// `RegisterSession` handshake (§4.13).
    #[instrument(skip(config), fields(host = %config.host))]
    pub async fn connect(config: ClientConfig) -> Result<Self> {
        let addr = config.explicit_messaging_addr();
        let mut stream = TcpStream::connect(&addr).await.map_err(|source| ClientError::Connect { addr, source })?;

        let byte_order = config.profile.enip_byte_order;
        let ctx = random_sender_context();
        write_encapsulation(&mut stream, &Encapsulation::register_session_request(ctx), byte_order).await?;
        let resp = read_encapsulation(&mut stream, byte_order, config.register_timeout, "RegisterSession").await?;

        if Command::from_code(resp.command) != Some(Command::RegisterSession) {
            return Err(ClientError::ContractViolation(format!(
                "expected RegisterSession response, got command {:#06x}",
                resp.command
            )));
        }
        if resp.status != status::SUCCESS {
            return Err(ClientError::ContractViolation(format!("RegisterSession failed with status {:#010x}", resp.status)));
        }
        if resp.session_id == 0 {
            return Err(ClientError::ContractViolation("server assigned session id 0".to_string()));
        }

        info!(session_id = resp.session_id, "session registered");
        Ok(Self { config, stream, session_id: resp.session_id, validator: Validator::new(ValidationMode::Strict) })
    }

    /// This session's server-assigned id.
    #[must_use]
    pub fn session_id(&self) -> u32 {
        self.session_id
    }

    /// This client's codec options, snapshotted from its profile (§5's
    /// per-request snapshot rule).
    fn cip_codec_options(&self) -> CipCodecOptions {
        self.config.profile.cip_codec_options()
    }

    fn profile(&self) -> &Profile {
        &self.config.profile
    }

    /// Invoke a CIP service over UCMM: encode `req`, wrap in
    /// `SendRRData`, send, read a response within `request_timeout`,
    /// unwrap and decode it (§4.13).
    #[instrument(skip(self, req), fields(service = req.service, session_id = self.session_id))]
    pub async fn invoke_service(&mut self, req: &CipRequest) -> Result<CipResponse> {
        let opts = self.cip_codec_options();
        let profile = self.profile().clone();
        let ctx = random_sender_context();
        let data = build_send_rr_data(req.encode(opts), 0, profile.use_cpf, profile.enip_byte_order);
        let enc = Encapsulation {
            command: Command::SendRRData.code(),
            session_id: self.session_id,
            status: status::SUCCESS,
            sender_context: ctx,
            options: 0,
            data,
        };
        write_encapsulation(&mut self.stream, &enc, profile.enip_byte_order).await?;

        let resp_enc =
            read_encapsulation(&mut self.stream, profile.enip_byte_order, self.config.request_timeout, "InvokeService")
                .await?;
        if resp_enc.status != status::SUCCESS {
            return Err(ClientError::ContractViolation(format!("SendRRData failed with status {:#010x}", resp_enc.status)));
        }
        let cip_bytes = parse_send_rr_data(&resp_enc.data, profile.use_cpf, profile.enip_byte_order)?;
        let resp = CipResponse::decode(&cip_bytes, opts)?;
        let validation = self.validator.validate_response(&resp, req.service);
        self.validator.log_rejection("InvokeService CIP response", &validation);
        if let Validation::Reject { reason } = validation {
            return Err(ClientError::ContractViolation(reason));
        }
        Ok(resp)
    }

    /// Run `Forward_Open` (or `Large_Forward_Open` when `params.large`),
    /// then, when `transport == Udp`, bind a dedicated UDP socket to
    /// `ip:2222` for this connection's I/O traffic (§4.13, §6).
    #[instrument(skip(self, params), fields(large = params.large, session_id = self.session_id))]
    pub async fn forward_open(&mut self, params: ForwardOpenParams, transport: IoTransport) -> Result<IoConnectionHandle> {
        let serial: u32 = rand::thread_rng().gen();
        let byte_order = self.profile().cip_byte_order;
        let o_to_t_size = params.o_to_t_size;
        let t_to_o_size = params.t_to_o_size;
        let large = params.large;
        let payload = build_forward_open(&params, serial, byte_order);

        let service_code = if large { service::LARGE_FORWARD_OPEN } else { service::FORWARD_OPEN };
        let req = CipRequest {
            service: service_code,
            path: EPath::class_instance(class::CONNECTION_MANAGER, 1),
            payload,
        };
        let resp = self.invoke_service(&req).await?;
        if resp.general_status != cip_proto::constants::general_status::SUCCESS {
            return Err(ClientError::ContractViolation(format!(
                "Forward_Open failed with general status {:#04x}",
                resp.general_status
            )));
        }
        let success = parse_forward_open_success(&resp.payload, byte_order)?;
        debug!(o_to_t = success.o_to_t_id, t_to_o = success.t_to_o_id, "forward_open succeeded");

        let udp = match transport {
            IoTransport::Udp => {
                let socket = UdpSocket::bind("0.0.0.0:0").await?;
                socket.connect(self.config.implicit_io_addr()).await?;
                Some(socket)
            },
            IoTransport::Tcp => None,
        };

        Ok(IoConnectionHandle {
            o_to_t_id: success.o_to_t_id,
            t_to_o_id: success.t_to_o_id,
            serial: success.serial,
            o_to_t_size,
            t_to_o_size,
            receive_timeout: io_receive_timeout(u64::from(success.t_to_o_rpi_us) / 1000),
            transport,
            udp,
            sequence: 0,
        })
    }

    /// Tear down a connection (§4.13).
    #[instrument(skip(self, handle), fields(serial = handle.serial, session_id = self.session_id))]
    pub async fn forward_close(&mut self, handle: &IoConnectionHandle) -> Result<()> {
        let payload = build_forward_close(
            &ForwardCloseParams {
                priority_tick: 0x03,
                timeout_ticks: 0xFA,
                connection_serial: handle.serial,
                connection_path: EPath::class_instance(class::CONNECTION_MANAGER, 1),
            },
            self.profile().cip_byte_order,
        );
        let req =
            CipRequest { service: service::FORWARD_CLOSE, path: EPath::class_instance(class::CONNECTION_MANAGER, 1), payload };
        let resp = self.invoke_service(&req).await?;
        if resp.general_status != cip_proto::constants::general_status::SUCCESS {
            return Err(ClientError::ContractViolation(format!(
                "Forward_Close failed with general status {:#04x}",
                resp.general_status
            )));
        }
        Ok(())
    }

    /// Send one I/O frame on `handle`'s transport, padding/prepending a
    /// sequence word per `profile.io_sequence_mode` (§4.13).
    pub async fn send_io_data(&mut self, handle: &mut IoConnectionHandle, payload: &[u8]) -> Result<()> {
        let mut body = vec![0u8; handle.o_to_t_size as usize];
        let n = payload.len().min(body.len());
        body[..n].copy_from_slice(&payload[..n]);

        let mut frame = Vec::with_capacity(2 + body.len());
        match self.profile().io_sequence_mode {
            IoSequenceMode::Increment => {
                frame.extend_from_slice(&handle.sequence.to_le_bytes());
                handle.sequence = handle.sequence.wrapping_add(1);
            },
            IoSequenceMode::Random => {
                let seq: u16 = rand::thread_rng().gen();
                frame.extend_from_slice(&seq.to_le_bytes());
            },
            IoSequenceMode::Omit => {},
        }
        frame.extend_from_slice(&body);

        match handle.transport {
            IoTransport::Udp => {
                let socket = handle.udp.as_ref().ok_or_else(|| {
                    ClientError::InvalidState("connection was opened without a UDP I/O socket".to_string())
                })?;
                let items = vec![
                    CpfItem::connected_address(handle.o_to_t_id, self.profile().enip_byte_order),
                    CpfItem::connected_data(frame),
                ];
                let out = encode_cpf(&items, self.profile().enip_byte_order);
                socket.send(&out).await?;
            },
            IoTransport::Tcp => {
                let data = build_send_unit_data(handle.o_to_t_id, frame, self.profile().use_cpf, self.profile().enip_byte_order);
                let ctx = random_sender_context();
                let enc = Encapsulation {
                    command: Command::SendUnitData.code(),
                    session_id: self.session_id,
                    status: status::SUCCESS,
                    sender_context: ctx,
                    options: 0,
                    data,
                };
                write_encapsulation(&mut self.stream, &enc, self.profile().enip_byte_order).await?;
            },
        }
        Ok(())
    }

    /// Receive one I/O frame on `handle`'s transport, stripping the
    /// sequence word if one is in use, and truncating to `t_to_o_size`
    /// (§4.13).
    pub async fn receive_io_data(&mut self, handle: &IoConnectionHandle) -> Result<Vec<u8>> {
        let byte_order = self.profile().enip_byte_order;
        let raw = match handle.transport {
            IoTransport::Udp => {
                let socket = handle.udp.as_ref().ok_or_else(|| {
                    ClientError::InvalidState("connection was opened without a UDP I/O socket".to_string())
                })?;
                let mut buf = vec![0u8; 4096];
                let n = tokio::time::timeout(handle.receive_timeout, socket.recv(&mut buf))
                    .await
                    .map_err(|_| ClientError::Timeout {
                        operation: "ReceiveIOData",
                        elapsed_ms: handle.receive_timeout.as_millis() as u64,
                    })??;
                buf.truncate(n);
                buf
            },
            IoTransport::Tcp => {
                let enc =
                    read_encapsulation(&mut self.stream, byte_order, handle.receive_timeout, "ReceiveIOData").await?;
                let (_, cip_bytes) = parse_send_unit_data(&enc.data, self.profile().use_cpf, byte_order)?;
                cip_bytes
            },
        };

        // Raw UDP/2222 datagrams are always CPF-shaped (connected-address
        // + connected-data items): there's no encapsulation header to hang
        // a `use_cpf` choice off of out there, unlike `SendUnitData` over
        // TCP, which `parse_send_unit_data` already unwrapped above.
        let connected_payload = if handle.transport == IoTransport::Udp {
            let (items, _) = decode_cpf(&raw, byte_order)?;
            items
                .into_iter()
                .find(|i| i.type_id == cpf_item::CONNECTED_DATA)
                .map(|i| i.data)
                .ok_or_else(|| ClientError::ContractViolation("missing connected-data item".to_string()))?
        } else {
            raw
        };

        let application_data = match self.profile().io_sequence_mode {
            IoSequenceMode::Omit => connected_payload,
            _ if connected_payload.len() >= 2 => connected_payload[2..].to_vec(),
            _ => connected_payload,
        };

        let mut out = application_data;
        out.truncate(handle.t_to_o_size as usize);
        Ok(out)
    }

    /// Close every I/O connection, send `UnregisterSession` best-effort,
    /// and drop the transport (§4.13).
    pub async fn disconnect(mut self, handles: &[IoConnectionHandle]) {
        for handle in handles {
            let _ = self.forward_close(handle).await;
        }
        let enc = Encapsulation {
            command: Command::UnregisterSession.code(),
            session_id: self.session_id,
            status: status::SUCCESS,
            sender_context: random_sender_context(),
            options: 0,
            data: vec![],
        };
        let byte_order = self.profile().enip_byte_order;
        let _ = write_encapsulation(&mut self.stream, &enc, byte_order).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_sender_context_is_not_all_zero() {
        // Not a hard guarantee (it's random), but exercises the helper and
        // documents why strict-mode validation would reject an all-zero
        // context (cip_core::validator rejects it).
        let ctx = random_sender_context();
        assert_eq!(ctx.len(), 8);
    }
}
