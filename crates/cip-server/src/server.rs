//! Wires the session/connection registries, the handler registry, and
//! every personality store together behind one [`Server`] (§5).
//!
//! Forward_Open/Forward_Close aren't registered into the
//! [`HandlerRegistry`] like everything else: opening a connection needs
//! the originating session id, which [`cip_core::dispatch::Handler`]
//! deliberately doesn't thread through (handlers only see `(class,
//! request)`, per §4.9's dispatch contract). Those two services are
//! dispatched directly by [`crate::transport`] instead, which already
//! has the session id in hand.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex as StdMutex},
    time::Instant,
};

use cip_core::{
    connection::{ConnectionIdPair, ConnectionParams, ConnectionRegistry},
    dispatch::HandlerRegistry,
    profile::Profile,
    session::SessionRegistry,
    validator::{ValidationMode, Validator},
};
use cip_proto::{
    cip::{CipCodecOptions, CipRequest, CipResponse},
    constants::{class, general_status, service},
    services::{build_forward_open_success, parse_forward_close_serial, parse_forward_open},
};

use crate::{
    config::ServerConfig,
    fault::FaultScheduler,
    personality::{AdapterStore, GenericObjectStore, IdentityStore, TagStore, default_identity},
};

/// Everything a running server needs: registries, personality stores,
/// and the fault schedule. Personality stores are `Arc`-wrapped so the
/// handler closures captured into `registry` can outlive the borrow that
/// built them; `Server` itself is expected to be held behind an `Arc` by
/// its caller once built.
pub struct Server {
    /// Configuration this server was built from.
    pub config: ServerConfig,
    /// Session registry, guarded independently of the connection registry.
    pub sessions: StdMutex<SessionRegistry>,
    /// I/O connection registry.
    pub connections: StdMutex<ConnectionRegistry>,
    /// Structural/contract validator for this server's validation mode.
    pub validator: Validator,
    /// (class, service) keyed handler registry for everything except
    /// Forward_Open/Forward_Close.
    pub registry: HandlerRegistry,
    /// Fault-injection schedule, shared by every connection worker.
    pub fault: FaultScheduler,
    /// Adapter (assembly) personality store.
    pub adapters: Arc<AdapterStore>,
    /// Tag personality store.
    pub tags: Arc<TagStore>,
    /// Generic CIP object store.
    pub generic_objects: Arc<GenericObjectStore>,
    /// Identity object store.
    pub identity: Arc<IdentityStore>,
    /// Pending `Forward_Open` connection-id pairs keyed by the client's
    /// connection serial number, so `Forward_Close` (which only carries
    /// the serial, not a connection id) can find what to close.
    open_serials: StdMutex<HashMap<u16, ConnectionIdPair>>,
}

impl Server {
    /// Build a server from `config`. Personality stores start empty;
    /// callers register fixtures via `server.adapters`/`.tags`/
    /// `.generic_objects` before calling [`crate::transport::run`].
    #[must_use]
    pub fn new(config: ServerConfig) -> Self {
        let byte_order = config.profile.cip_byte_order;
        let adapters = Arc::new(AdapterStore::new(byte_order, config.fault.seed));
        let tags = Arc::new(TagStore::new(byte_order, config.fault.seed));
        let generic_objects = Arc::new(GenericObjectStore::new(config.generic_object_classes.clone(), byte_order));
        let identity = Arc::new(IdentityStore::new(default_identity()));
        let registry = build_registry(&adapters, &tags, &generic_objects, &identity);
        let validator = Validator::new(ValidationMode::Strict);
        let sessions = StdMutex::new(SessionRegistry::new(1, config.session_idle_timeout));
        let connections = StdMutex::new(ConnectionRegistry::new(config.connection_idle_timeout));
        let fault = FaultScheduler::new(config.fault);

        Self {
            config,
            sessions,
            connections,
            validator,
            registry,
            fault,
            adapters,
            tags,
            generic_objects,
            identity,
            open_serials: StdMutex::new(HashMap::new()),
        }
    }

    /// This server's protocol profile.
    #[must_use]
    pub fn profile(&self) -> &Profile {
        &self.config.profile
    }

    /// This server's CIP codec options, snapshotted from the profile
    /// (§5's per-request snapshot rule).
    #[must_use]
    pub fn cip_codec_options(&self) -> CipCodecOptions {
        self.config.profile.cip_codec_options()
    }

    /// Execute a CIP request that isn't Forward_Open/Forward_Close,
    /// expanding Unconnected_Send/Multiple_Service_Packet wrappers first.
    #[must_use]
    pub fn execute(&self, target_class: u16, req: &CipRequest) -> CipResponse {
        cip_core::dispatch::execute(&self.registry, target_class, req, self.cip_codec_options())
    }

    /// True if `req` is a `Forward_Open`/`Large_Forward_Open`/
    /// `Forward_Close` addressed to Connection_Manager - the three
    /// services this server dispatches outside the handler registry.
    #[must_use]
    pub fn is_connection_management(target_class: u16, req: &CipRequest) -> bool {
        target_class == class::CONNECTION_MANAGER
            && matches!(req.service, service::FORWARD_OPEN | service::LARGE_FORWARD_OPEN | service::FORWARD_CLOSE)
    }

    /// Handle `Forward_Open`/`Large_Forward_Open`, allocating a
    /// connection-id pair bound to `session_id`.
    #[must_use]
    pub fn handle_forward_open(&self, session_id: u32, req: &CipRequest) -> CipResponse {
        let large = req.service == service::LARGE_FORWARD_OPEN;
        let byte_order = self.cip_codec_options().byte_order;
        let Ok(parsed) = parse_forward_open(&req.payload, large, byte_order) else {
            return error_response(req.service, general_status::GENERAL_ERROR);
        };

        let params = ConnectionParams {
            o_to_t_rpi_us: parsed.params.o_to_t_rpi_us,
            t_to_o_rpi_us: parsed.params.t_to_o_rpi_us,
            o_to_t_size: parsed.params.o_to_t_size,
            t_to_o_size: parsed.params.t_to_o_size,
            transport_class: parsed.params.transport_class_trigger,
            priority: parsed.params.priority_tick,
            connection_path: parsed.params.connection_path,
        };

        #[allow(clippy::expect_used)]
        let pair = {
            let mut connections = self.connections.lock().expect("connection registry mutex poisoned");
            connections.open(session_id, params, large, Instant::now())
        };

        #[allow(clippy::expect_used)]
        self.open_serials.lock().expect("open-serial map mutex poisoned").insert(parsed.serial, pair);

        CipResponse {
            service: service::response_of(req.service),
            general_status: general_status::SUCCESS,
            extended_status: vec![],
            payload: build_forward_open_success(
                pair.o_to_t,
                pair.t_to_o,
                u32::from(parsed.serial),
                parsed.params.o_to_t_rpi_us,
                parsed.params.t_to_o_rpi_us,
                byte_order,
            ),
        }
    }

    /// Handle `Forward_Close`, looking the connection up by its serial
    /// number (the request doesn't carry a connection id, per §4.6).
    #[must_use]
    pub fn handle_forward_close(&self, req: &CipRequest) -> CipResponse {
        let byte_order = self.cip_codec_options().byte_order;
        let Ok(serial) = parse_forward_close_serial(&req.payload, byte_order) else {
            return error_response(req.service, general_status::GENERAL_ERROR);
        };

        #[allow(clippy::expect_used)]
        let pair = self.open_serials.lock().expect("open-serial map mutex poisoned").remove(&serial);
        let Some(pair) = pair else {
            return error_response(req.service, general_status::GENERAL_ERROR);
        };

        #[allow(clippy::expect_used)]
        let mut connections = self.connections.lock().expect("connection registry mutex poisoned");
        let _ = connections.close(pair.o_to_t);
        let _ = connections.close(pair.t_to_o);

        CipResponse {
            service: service::response_of(req.service),
            general_status: general_status::SUCCESS,
            extended_status: vec![],
            payload: vec![],
        }
    }
}

fn error_response(request_service: u8, status: u8) -> CipResponse {
    CipResponse { service: service::response_of(request_service), general_status: status, extended_status: vec![], payload: vec![] }
}

/// Register every personality's handlers at startup (§4.9, §4.10-4.12).
fn build_registry(
    adapters: &Arc<AdapterStore>,
    tags: &Arc<TagStore>,
    generic_objects: &Arc<GenericObjectStore>,
    identity: &Arc<IdentityStore>,
) -> HandlerRegistry {
    let mut registry = HandlerRegistry::new();

    // Identity object (§6, class 0x01, instance 1).
    let id = Arc::clone(identity);
    registry.register(class::IDENTITY, service::GET_ATTRIBUTE_SINGLE, move |_: u16, req: &CipRequest| {
        id.handle_get_attribute_single(req)
    });
    let id = Arc::clone(identity);
    registry.register(class::IDENTITY, service::GET_ATTRIBUTE_LIST, move |_: u16, req: &CipRequest| {
        id.handle_get_attribute_list(req)
    });

    // Assembly objects (§4.10, class 0x04).
    let store = Arc::clone(adapters);
    registry.register(class::ASSEMBLY, service::GET_ATTRIBUTE_SINGLE, move |_: u16, req: &CipRequest| {
        store.handle_get(req)
    });
    let store = Arc::clone(adapters);
    registry.register(class::ASSEMBLY, service::SET_ATTRIBUTE_SINGLE, move |_: u16, req: &CipRequest| {
        store.handle_set(req)
    });

    // Symbol_Object tag services (§4.11, class 0x6B).
    let store = Arc::clone(tags);
    registry.register(class::SYMBOL_OBJECT, service::READ_TAG, move |_: u16, req: &CipRequest| {
        store.handle_read_tag(req)
    });
    let store = Arc::clone(tags);
    registry.register(
        class::SYMBOL_OBJECT,
        service::UNCONNECTED_SEND_OR_READ_TAG_FRAGMENTED,
        move |_: u16, req: &CipRequest| store.handle_read_tag_fragmented(req),
    );
    let store = Arc::clone(tags);
    registry.register(class::SYMBOL_OBJECT, service::WRITE_TAG, move |_: u16, req: &CipRequest| {
        store.handle_write_tag(req)
    });
    let store = Arc::clone(tags);
    registry.register(class::SYMBOL_OBJECT, service::WRITE_TAG_FRAGMENTED, move |_: u16, req: &CipRequest| {
        store.handle_write_tag_fragmented(req)
    });
    let store = Arc::clone(tags);
    registry.register(
        class::SYMBOL_OBJECT,
        service::GET_INSTANCE_ATTRIBUTE_LIST,
        move |_: u16, req: &CipRequest| store.handle_get_instance_attribute_list(req),
    );

    // Generic profile-selected objects (§4.12): service-wildcard since a
    // request may target any of the enabled class IDs, and each handler
    // self-filters by `ObjectClassSelection` (see `generic_object.rs`).
    let store = Arc::clone(generic_objects);
    registry.register_service_wildcard(service::GET_ATTRIBUTE_SINGLE, move |_: u16, req: &CipRequest| {
        store.handle_get_attribute_single(req)
    });
    let store = Arc::clone(generic_objects);
    registry.register_service_wildcard(service::SET_ATTRIBUTE_SINGLE, move |_: u16, req: &CipRequest| {
        store.handle_set_attribute_single(req)
    });
    let store = Arc::clone(generic_objects);
    registry.register_service_wildcard(service::GET_ATTRIBUTE_LIST, move |_: u16, req: &CipRequest| {
        store.handle_get_attribute_list(req)
    });
    let store = Arc::clone(generic_objects);
    registry.register_service_wildcard(service::EXECUTE_PCCC, move |_: u16, req: &CipRequest| {
        store.handle_energy_alias(req)
    });

    registry
}
