//! End-to-end scenarios against a live `cip-server` instance: real TCP for
//! explicit messaging, real UDP for discovery and implicit I/O.
//!
//! All scenarios share one server/session, run in sequence inside a single
//! `#[tokio::test]`, rather than one test function per scenario - the
//! explicit-messaging and implicit-I/O ports are fixed by §6, so a second
//! concurrently-running test process would collide on the same bind
//! addresses.

use std::{sync::Arc, time::Duration};

use cip_core::profile::Profile;
use cip_proto::{
    Endianness,
    cip::{CipCodecOptions, CipRequest, CipResponse},
    constants::{class, general_status, service},
    enip::{Command, CpfItem, Encapsulation, build_send_rr_data, cpf_item, decode_cpf, encode_cpf, parse_send_rr_data, status},
    epath::EPath,
    services::{
        ConnectionSizeClass, FORWARD_OPEN_SUCCESS_MIN_LEN, ForwardOpenParams, UnconnectedSendParams,
        build_forward_open, build_unconnected_send,
    },
};
use cip_server::{
    Server, ServerConfig,
    personality::{Assembly, UpdatePattern},
};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpStream, UdpSocket},
    time::sleep,
};

const CTX: [u8; 8] = [1, 2, 3, 4, 5, 6, 7, 8];

async fn spawn_server() -> Arc<Server> {
    let server = Server::new(ServerConfig::default().with_profile(Profile::strict_odva()));
    server.adapters.register(Assembly::new("output", 100, 3, 4, true, UpdatePattern::ReflectInputs));
    let server = Arc::new(server);
    tokio::spawn(cip_server::transport::run(Arc::clone(&server)));
    // give the listeners a moment to bind before the test starts connecting.
    sleep(Duration::from_millis(100)).await;
    server
}

async fn write_frame(socket: &mut TcpStream, enc: &Encapsulation) {
    socket.write_all(&enc.encode(Endianness::Little)).await.unwrap();
}

async fn read_frame(socket: &mut TcpStream) -> Encapsulation {
    let mut header = [0u8; Encapsulation::HEADER_SIZE];
    socket.read_exact(&mut header).await.unwrap();
    let length = Endianness::Little.read_u16(&header[2..4]) as usize;
    let mut data = vec![0u8; length];
    socket.read_exact(&mut data).await.unwrap();
    let mut frame = header.to_vec();
    frame.extend_from_slice(&data);
    Encapsulation::decode(&frame, Endianness::Little).unwrap()
}

async fn register_session(socket: &mut TcpStream) -> u32 {
    write_frame(socket, &Encapsulation::register_session_request(CTX)).await;
    read_frame(socket).await.session_id
}

async fn send_rr(socket: &mut TcpStream, session_id: u32, req: &CipRequest) -> CipResponse {
    let opts = CipCodecOptions::strict_odva();
    let data = build_send_rr_data(req.encode(opts), 0, true, Endianness::Little);
    let enc = Encapsulation {
        command: Command::SendRRData.code(),
        session_id,
        status: status::SUCCESS,
        sender_context: CTX,
        options: 0,
        data,
    };
    write_frame(socket, &enc).await;
    let resp_enc = read_frame(socket).await;
    let resp_bytes = parse_send_rr_data(&resp_enc.data, true, Endianness::Little).unwrap();
    CipResponse::decode(&resp_bytes, opts).unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn scenarios_from_the_walkthrough() {
    spawn_server().await;

    // Scenario 1: ListIdentity discovery over UDP, no session required.
    let discovery = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let req = Encapsulation::list_identity_request(CTX);
    discovery.send_to(&req.encode(Endianness::Little), "127.0.0.1:44818").await.unwrap();
    let mut buf = vec![0u8; 4096];
    let (n, _) = discovery.recv_from(&mut buf).await.unwrap();
    let resp = Encapsulation::decode(&buf[..n], Endianness::Little).unwrap();
    let identities = cip_proto::parse_list_identity_response(&resp.data, Endianness::Little).unwrap();
    assert_eq!(identities.len(), 1);
    assert_eq!(identities[0].vendor_id, 0x0001);
    assert_eq!(identities[0].product_code, 100);
    assert_eq!(identities[0].serial_number, 12345);
    assert_eq!(identities[0].product_name, "Test Device");

    // Everything else shares one session over one TCP connection.
    let mut socket = TcpStream::connect("127.0.0.1:44818").await.unwrap();
    let session_id = register_session(&mut socket).await;
    assert_ne!(session_id, 0);

    // Scenario 2: strict Get_Attribute_Single on the Identity object.
    let vendor_id_req = CipRequest {
        service: service::GET_ATTRIBUTE_SINGLE,
        path: EPath::class_instance_attribute(class::IDENTITY, 1, 1),
        payload: vec![],
    };
    let vendor_id_resp = send_rr(&mut socket, session_id, &vendor_id_req).await;
    assert_eq!(vendor_id_resp.general_status, general_status::SUCCESS);
    assert_eq!(vendor_id_resp.payload, vec![0x01, 0x00]);

    // Scenario 3: adapter write-then-read through explicit messaging.
    let path = EPath::class_instance_attribute(class::ASSEMBLY, 100, 3);
    let set_resp = send_rr(
        &mut socket,
        session_id,
        &CipRequest { service: service::SET_ATTRIBUTE_SINGLE, path: path.clone(), payload: vec![0xDE, 0xAD, 0xBE, 0xEF] },
    )
    .await;
    assert_eq!(set_resp.general_status, general_status::SUCCESS);
    let get_resp =
        send_rr(&mut socket, session_id, &CipRequest { service: service::GET_ATTRIBUTE_SINGLE, path, payload: vec![] }).await;
    assert_eq!(get_resp.payload, vec![0xDE, 0xAD, 0xBE, 0xEF]);

    // Scenario 4: Forward_Open against the same assembly, then real
    // connected I/O over UDP/2222.
    let forward_open_params = ForwardOpenParams {
        priority_tick: 0x03,
        timeout_ticks: 0xFA,
        o_to_t_rpi_us: 20_000,
        t_to_o_rpi_us: 20_000,
        o_to_t_size: 4,
        t_to_o_size: 4,
        size_class: ConnectionSizeClass::Fixed16,
        transport_class_trigger: 0xA3,
        connection_path: EPath::class_instance(class::ASSEMBLY, 100),
        large: false,
    };
    let forward_open_bytes = build_forward_open(&forward_open_params, 0x4242, Endianness::Little);
    let forward_open_resp = send_rr(
        &mut socket,
        session_id,
        &CipRequest { service: service::FORWARD_OPEN, path: EPath::class_instance(class::CONNECTION_MANAGER, 1), payload: forward_open_bytes },
    )
    .await;
    assert_eq!(forward_open_resp.general_status, general_status::SUCCESS);
    assert!(forward_open_resp.payload.len() >= FORWARD_OPEN_SUCCESS_MIN_LEN);
    let o_to_t_id = u32::from_le_bytes(forward_open_resp.payload[0..4].try_into().unwrap());
    let t_to_o_id = u32::from_le_bytes(forward_open_resp.payload[4..8].try_into().unwrap());

    let io_socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let mut io_payload = 1u16.to_le_bytes().to_vec();
    io_payload.extend_from_slice(&[0xAA, 0xBB, 0xCC, 0xDD]);
    let out_items = vec![CpfItem::connected_address(o_to_t_id, Endianness::Little), CpfItem::connected_data(io_payload)];
    io_socket.send_to(&encode_cpf(&out_items, Endianness::Little), "127.0.0.1:2222").await.unwrap();
    let mut io_buf = vec![0u8; 4096];
    let (n, _) = io_socket.recv_from(&mut io_buf).await.unwrap();
    let (reply_items, _) = decode_cpf(&io_buf[..n], Endianness::Little).unwrap();
    let reply_addr = reply_items.iter().find(|i| i.type_id == cpf_item::CONNECTED_ADDRESS).unwrap();
    assert_eq!(Endianness::Little.read_u32(&reply_addr.data), t_to_o_id);
    let reply_data = &reply_items.iter().find(|i| i.type_id == cpf_item::CONNECTED_DATA).unwrap().data;
    assert_eq!(&reply_data[2..], &[0xAA, 0xBB, 0xCC, 0xDD]);

    // Scenario 5: Unconnected_Send wrapping a Get_Attribute_Single.
    let embedded = CipRequest {
        service: service::GET_ATTRIBUTE_SINGLE,
        path: EPath::class_instance_attribute(class::IDENTITY, 1, 1),
        payload: vec![],
    };
    let unconnected_send_params = UnconnectedSendParams {
        priority_tick: 0x05,
        timeout_ticks: 0x0A,
        embedded_message: embedded.encode(CipCodecOptions::strict_odva()),
        route_path: EPath::class_instance(class::CONNECTION_MANAGER, 1),
    };
    let unconnected_resp = send_rr(
        &mut socket,
        session_id,
        &CipRequest {
            service: service::UNCONNECTED_SEND_OR_READ_TAG_FRAGMENTED,
            path: EPath::class_instance(class::CONNECTION_MANAGER, 1),
            payload: build_unconnected_send(&unconnected_send_params),
        },
    )
    .await;
    assert_eq!(unconnected_resp.service, service::response_of(service::UNCONNECTED_SEND_OR_READ_TAG_FRAGMENTED));
    let embedded_len = Endianness::Little.read_u16(&unconnected_resp.payload[0..2]) as usize;
    let inner = CipResponse::decode(&unconnected_resp.payload[2..2 + embedded_len], CipCodecOptions::strict_odva()).unwrap();
    assert_eq!(inner.payload, vec![0x01, 0x00]);

    // Scenario 6: the same Get_Attribute_Single, but written to the socket
    // split across two writes - reassembly must be transparent.
    let split_req = CipRequest {
        service: service::GET_ATTRIBUTE_SINGLE,
        path: EPath::class_instance_attribute(class::IDENTITY, 1, 1),
        payload: vec![],
    };
    let split_data = build_send_rr_data(split_req.encode(CipCodecOptions::strict_odva()), 0, true, Endianness::Little);
    let split_enc = Encapsulation {
        command: Command::SendRRData.code(),
        session_id,
        status: status::SUCCESS,
        sender_context: CTX,
        options: 0,
        data: split_data,
    };
    let full_bytes = split_enc.encode(Endianness::Little);
    let midpoint = 5; // lands inside the 24-byte header
    socket.write_all(&full_bytes[..midpoint]).await.unwrap();
    sleep(Duration::from_millis(50)).await;
    socket.write_all(&full_bytes[midpoint..]).await.unwrap();
    let split_resp_enc = read_frame(&mut socket).await;
    let split_resp_bytes = parse_send_rr_data(&split_resp_enc.data, true, Endianness::Little).unwrap();
    let split_resp = CipResponse::decode(&split_resp_bytes, CipCodecOptions::strict_odva()).unwrap();
    assert_eq!(split_resp.payload, vec![0x01, 0x00]);
}
