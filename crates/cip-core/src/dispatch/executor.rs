//! Request execution: expands `Unconnected_Send` and
//! `Multiple_Service_Packet` before dispatch, then drives the handler
//! registry (C9, §4.9).

use cip_proto::{
    cip::{CipCodecOptions, CipRequest, CipResponse},
    constants::{class, service},
    services::{
        embed_responses, parse_multiple_service_request, parse_unconnected_send, split_multiple_service_request,
    },
};

use super::registry::HandlerRegistry;

/// Response service code for `Unconnected_Send` (`0x52 | 0x80`).
const UNCONNECTED_SEND_RESPONSE: u8 = service::response_of(service::UNCONNECTED_SEND_OR_READ_TAG_FRAGMENTED);

fn unhandled_response(req: &CipRequest) -> CipResponse {
    CipResponse {
        service: service::response_of(req.service),
        general_status: cip_proto::constants::general_status::SERVICE_NOT_SUPPORTED,
        extended_status: vec![],
        payload: vec![],
    }
}

fn dispatch_one(registry: &HandlerRegistry, req: &CipRequest) -> CipResponse {
    let target_class = req.path.class().unwrap_or(0);
    registry.dispatch(target_class, req).unwrap_or_else(|| unhandled_response(req))
}

/// Execute `req` addressed (at the ENIP/session layer) to `class`,
/// expanding `Unconnected_Send`/`Multiple_Service_Packet` wrappers before
/// handing the innermost request(s) to `registry`.
pub fn execute(registry: &HandlerRegistry, target_class: u16, req: &CipRequest, opts: CipCodecOptions) -> CipResponse {
    if req.service == service::MULTIPLE_SERVICE_PACKET {
        return execute_multiple_service(registry, req, opts);
    }
    if req.service == service::UNCONNECTED_SEND_OR_READ_TAG_FRAGMENTED
        && target_class == class::CONNECTION_MANAGER
    {
        return execute_unconnected_send(registry, req, opts);
    }
    dispatch_one(registry, req)
}

fn execute_multiple_service(registry: &HandlerRegistry, req: &CipRequest, opts: CipCodecOptions) -> CipResponse {
    let Ok(embedded_bytes) = parse_multiple_service_request(&req.payload, opts.byte_order) else {
        return CipResponse {
            service: service::response_of(req.service),
            general_status: cip_proto::constants::general_status::GENERAL_ERROR,
            extended_status: vec![],
            payload: vec![],
        };
    };

    let mut responses = Vec::with_capacity(embedded_bytes.len());
    for bytes in &embedded_bytes {
        let response = match CipRequest::decode(bytes, opts) {
            Ok(embedded_req) => dispatch_one(registry, &embedded_req),
            Err(_) => CipResponse {
                service: 0x80,
                general_status: cip_proto::constants::general_status::GENERAL_ERROR,
                extended_status: vec![],
                payload: vec![],
            },
        };
        responses.push(response.encode(opts));
    }

    CipResponse {
        service: service::response_of(req.service),
        general_status: 0x00,
        extended_status: vec![],
        payload: embed_responses(&responses, opts.byte_order),
    }
}

fn execute_unconnected_send(registry: &HandlerRegistry, req: &CipRequest, opts: CipCodecOptions) -> CipResponse {
    let Ok(parsed) = parse_unconnected_send(&req.payload) else {
        return CipResponse {
            service: UNCONNECTED_SEND_RESPONSE,
            general_status: cip_proto::constants::general_status::GENERAL_ERROR,
            extended_status: vec![],
            payload: vec![],
        };
    };

    let embedded_response = match CipRequest::decode(&parsed.embedded_message, opts) {
        Ok(embedded_req) => dispatch_one(registry, &embedded_req),
        Err(_) => CipResponse {
            service: 0x80,
            general_status: cip_proto::constants::general_status::GENERAL_ERROR,
            extended_status: vec![],
            payload: vec![],
        },
    };
    let inner_bytes = embedded_response.encode(opts);

    let mut payload = Vec::with_capacity(2 + inner_bytes.len());
    opts.byte_order.put_u16(&mut payload, inner_bytes.len() as u16);
    payload.extend_from_slice(&inner_bytes);

    CipResponse { service: UNCONNECTED_SEND_RESPONSE, general_status: 0x00, extended_status: vec![], payload }
}

/// Inverse of [`execute_multiple_service`]'s path for building a request:
/// wraps already-encoded embedded CIP requests into a
/// `Multiple_Service_Packet` request targeting Message_Router instance 1.
#[must_use]
pub fn build_multiple_service_request(embedded: &[Vec<u8>], opts: CipCodecOptions) -> CipRequest {
    CipRequest {
        service: service::MULTIPLE_SERVICE_PACKET,
        path: cip_proto::epath::EPath::class_instance(class::MESSAGE_ROUTER, 1),
        payload: split_multiple_service_request(embedded, opts.byte_order),
    }
}
