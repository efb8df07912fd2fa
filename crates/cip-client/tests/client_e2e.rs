//! End-to-end exercise of [`cip_client::ClientSession`] against a live
//! `cip-server` instance, mirroring `cip-server`'s own
//! `tests/end_to_end.rs` but driven entirely through the client driver
//! instead of hand-rolled socket code.
//!
//! Shares the same fixed-port caveat as the server crate's suite: the
//! explicit-messaging/discovery/implicit-I/O ports are fixed by §6, so
//! this is one `#[tokio::test]` covering the whole walkthrough rather than
//! one test per scenario. It also means this test and `cip-server`'s own
//! `tests/end_to_end.rs` bind the same addresses - they must not run
//! concurrently (workspace CI runs test binaries with `--test-threads=1`
//! or equivalent serialization across crates, same as any other fixture
//! that owns a well-known port).

use std::{sync::Arc, time::Duration};

use cip_core::profile::Profile;
use cip_proto::{
    constants::{class, general_status, service},
    epath::EPath,
    services::{ConnectionSizeClass, ForwardOpenParams},
};
use cip_client::{ClientConfig, ClientSession, IoTransport, discover};
use cip_server::{
    Server, ServerConfig,
    personality::{Assembly, UpdatePattern},
};
use tokio::time::sleep;

async fn spawn_server() -> Arc<Server> {
    let server = Server::new(ServerConfig::default().with_profile(Profile::strict_odva()));
    server.adapters.register(Assembly::new("output", 200, 3, 4, true, UpdatePattern::ReflectInputs));
    let server = Arc::new(server);
    tokio::spawn(cip_server::transport::run(Arc::clone(&server)));
    sleep(Duration::from_millis(100)).await;
    server
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn client_drives_the_full_walkthrough() {
    spawn_server().await;

    // Scenario 1: discovery doesn't need a session.
    let identities = discover("127.0.0.1", &Profile::strict_odva(), Duration::from_secs(2)).await.unwrap();
    assert_eq!(identities.len(), 1);
    assert_eq!(identities[0].vendor_id, 0x0001);

    let mut session = ClientSession::connect(ClientConfig::new("127.0.0.1")).await.unwrap();
    assert_ne!(session.session_id(), 0);

    // Scenario 2: strict Get_Attribute_Single on Identity.
    let resp = session
        .invoke_service(&cip_proto::cip::CipRequest {
            service: service::GET_ATTRIBUTE_SINGLE,
            path: EPath::class_instance_attribute(class::IDENTITY, 1, 1),
            payload: vec![],
        })
        .await
        .unwrap();
    assert_eq!(resp.general_status, general_status::SUCCESS);
    assert_eq!(resp.payload, vec![0x01, 0x00]);

    // Scenario 3: adapter write-then-read.
    let path = EPath::class_instance_attribute(class::ASSEMBLY, 200, 3);
    let set_resp = session
        .invoke_service(&cip_proto::cip::CipRequest {
            service: service::SET_ATTRIBUTE_SINGLE,
            path: path.clone(),
            payload: vec![0xDE, 0xAD, 0xBE, 0xEF],
        })
        .await
        .unwrap();
    assert_eq!(set_resp.general_status, general_status::SUCCESS);
    let get_resp = session
        .invoke_service(&cip_proto::cip::CipRequest { service: service::GET_ATTRIBUTE_SINGLE, path, payload: vec![] })
        .await
        .unwrap();
    assert_eq!(get_resp.payload, vec![0xDE, 0xAD, 0xBE, 0xEF]);

    // Scenario 4: Forward_Open, then real connected I/O over UDP/2222.
    let params = ForwardOpenParams {
        priority_tick: 0x03,
        timeout_ticks: 0xFA,
        o_to_t_rpi_us: 20_000,
        t_to_o_rpi_us: 20_000,
        o_to_t_size: 4,
        t_to_o_size: 4,
        size_class: ConnectionSizeClass::Fixed16,
        transport_class_trigger: 0xA3,
        connection_path: EPath::class_instance(class::ASSEMBLY, 200),
        large: false,
    };
    let mut handle = session.forward_open(params, IoTransport::Udp).await.unwrap();
    assert_ne!(handle.o_to_t_id, handle.t_to_o_id);

    session.send_io_data(&mut handle, &[0xAA, 0xBB, 0xCC, 0xDD]).await.unwrap();
    let reply = session.receive_io_data(&handle).await.unwrap();
    assert_eq!(reply, vec![0xAA, 0xBB, 0xCC, 0xDD]);

    session.forward_close(&handle).await.unwrap();

    session.disconnect(&[]).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn connect_to_nonexistent_port_times_out_or_fails_fast() {
    // TEST-NET-2, guaranteed unreachable - the point of this test is that
    // a dead peer surfaces as an error or a bounded timeout, never a hang.
    let mut config = ClientConfig::new("198.51.100.1");
    config.profile = Profile::strict_odva();
    let result = tokio::time::timeout(Duration::from_secs(2), ClientSession::connect(config)).await;
    assert!(result.is_err() || result.unwrap().is_err());
}
