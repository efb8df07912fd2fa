//! Structural and contract validation (C7, §4.7).
//!
//! Two modes: [`ValidationMode::Strict`] (default) rejects anything that
//! deviates from the profile's framing rules; [`ValidationMode::Lenient`]
//! only runs the checks that matter for not crashing the rest of the
//! pipeline (length accounting, known command/service) and lets everything
//! else through. Per §7, strict-mode rejections are contract errors
//! surfaced to the caller; lenient-mode rejections are logged but not
//! fatal - callers in lenient mode should treat a `Reject` as advisory.

use cip_proto::{
    cip::{CipCodecOptions, CipRequest, CipResponse},
    enip::{Command, Encapsulation, cpf_item, decode_cpf},
    epath::EPath,
    services::parse_unconnected_send,
};
use tracing::debug;

use crate::profile::Profile;

/// Every service code this harness's CIP object model understands (§6's
/// service table); a request carrying anything outside this set cannot be
/// satisfied by any handler this harness registers.
const KNOWN_SERVICES: &[u8] = &[
    cip_proto::constants::service::GET_ATTRIBUTE_ALL,
    cip_proto::constants::service::SET_ATTRIBUTE_ALL,
    cip_proto::constants::service::GET_ATTRIBUTE_LIST,
    cip_proto::constants::service::SET_ATTRIBUTE_LIST,
    cip_proto::constants::service::RESET,
    cip_proto::constants::service::MULTIPLE_SERVICE_PACKET,
    cip_proto::constants::service::GET_ATTRIBUTE_SINGLE,
    cip_proto::constants::service::SET_ATTRIBUTE_SINGLE,
    cip_proto::constants::service::EXECUTE_PCCC,
    cip_proto::constants::service::READ_TAG,
    cip_proto::constants::service::WRITE_TAG,
    cip_proto::constants::service::FORWARD_CLOSE,
    cip_proto::constants::service::UNCONNECTED_SEND_OR_READ_TAG_FRAGMENTED,
    cip_proto::constants::service::WRITE_TAG_FRAGMENTED,
    cip_proto::constants::service::FORWARD_OPEN,
    cip_proto::constants::service::GET_INSTANCE_ATTRIBUTE_LIST,
    cip_proto::constants::service::LARGE_FORWARD_OPEN,
];

/// True if `path` could plausibly address something: it carries at least
/// one segment, and if it names a class or attribute, neither is the
/// reserved id `0` (§4.1).
fn path_is_non_reserved(path: &EPath) -> bool {
    if path.segments.is_empty() {
        return false;
    }
    if path.class() == Some(0) {
        return false;
    }
    if path.attribute() == Some(0) {
        return false;
    }
    true
}

/// Strict vs. lenient validation mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationMode {
    /// Reject anything that deviates from profile-conformant framing.
    Strict,
    /// Only reject what would break downstream decoding; log the rest.
    Lenient,
}

/// Outcome of a validation check. Deliberately not a `Result` - per §4.15
/// a rejection is a normal, inspectable value, not a fatal condition on
/// its own (the caller decides what "fatal" means based on `mode`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Validation {
    /// The input passed every check this mode runs.
    Accept,
    /// The input failed one check.
    Reject {
        /// Human-readable rejection reason.
        reason: String,
    },
}

impl Validation {
    /// True if this is an `Accept`.
    #[must_use]
    pub fn is_accept(&self) -> bool {
        matches!(self, Self::Accept)
    }

    fn reject(reason: impl Into<String>) -> Self {
        Self::Reject { reason: reason.into() }
    }
}

/// Validates ENIP encapsulations and CIP requests/responses against a
/// profile, in either strict or lenient mode.
#[derive(Debug, Clone, Copy)]
pub struct Validator {
    mode: ValidationMode,
}

impl Validator {
    /// Construct a validator in the given mode.
    #[must_use]
    pub fn new(mode: ValidationMode) -> Self {
        Self { mode }
    }

    fn strict(&self) -> bool {
        self.mode == ValidationMode::Strict
    }

    /// ENIP-level checks (§4.7).
    pub fn validate_encapsulation(&self, enc: &Encapsulation, profile: &Profile) -> Validation {
        let Some(command) = Command::from_code(enc.command) else {
            return Validation::reject(format!("unknown ENIP command {:#06x}", enc.command));
        };
        if enc.length() as usize != enc.data.len() {
            return Validation::reject("length field does not match data length");
        }
        if !matches!(command, Command::RegisterSession | Command::ListIdentity) && enc.session_id == 0 {
            return Validation::reject("session_id is zero for a session-bound command");
        }

        if self.strict() {
            if enc.status != cip_proto::enip::status::SUCCESS {
                return Validation::reject("nonzero status on a request");
            }
            if enc.sender_context == [0u8; 8] {
                return Validation::reject("all-zero sender_context");
            }
            if enc.options != 0 {
                return Validation::reject("nonzero options");
            }
        }

        match command {
            Command::RegisterSession => self.validate_register_session_data(&enc.data),
            Command::SendRRData => self.validate_send_rr_data(&enc.data, profile),
            Command::SendUnitData => self.validate_send_unit_data(&enc.data, profile),
            _ => Validation::Accept,
        }
    }

    fn validate_register_session_data(&self, data: &[u8]) -> Validation {
        if data.len() < 4 {
            return Validation::reject("RegisterSession data shorter than 4 bytes");
        }
        let protocol_version = u16::from_le_bytes([data[0], data[1]]);
        let option_flags = u16::from_le_bytes([data[2], data[3]]);
        if protocol_version != 1 {
            return Validation::reject(format!("unsupported protocol version {protocol_version}"));
        }
        if self.strict() && option_flags != 0 {
            return Validation::reject("nonzero RegisterSession option flags under strict mode");
        }
        Validation::Accept
    }

    fn validate_send_rr_data(&self, data: &[u8], profile: &Profile) -> Validation {
        if data.len() < 6 {
            return Validation::reject("SendRRData shorter than interface_handle+timeout");
        }
        let interface_handle = profile.enip_byte_order.read_u32(&data[0..4]);
        if interface_handle != 0 {
            return Validation::reject("nonzero interface handle");
        }
        if !profile.use_cpf {
            return Validation::Accept;
        }
        let Ok((items, _)) = decode_cpf(&data[6..], profile.enip_byte_order) else {
            return Validation::reject("CPF items failed to parse");
        };
        if !items.iter().any(|i| i.type_id == cpf_item::UNCONNECTED_DATA) {
            return Validation::reject("missing unconnected-data item");
        }
        Validation::Accept
    }

    fn validate_send_unit_data(&self, data: &[u8], profile: &Profile) -> Validation {
        if !profile.use_cpf {
            return Validation::Accept;
        }
        if data.len() < 6 {
            return Validation::reject("SendUnitData shorter than interface_handle+timeout");
        }
        let Ok((items, _)) = decode_cpf(&data[6..], profile.enip_byte_order) else {
            return Validation::reject("CPF items failed to parse");
        };
        let Some(addr_item) = items.iter().find(|i| i.type_id == cpf_item::CONNECTED_ADDRESS) else {
            return Validation::reject("missing connected-address item");
        };
        if addr_item.data.len() < 4 || profile.enip_byte_order.read_u32(&addr_item.data) == 0 {
            return Validation::reject("connected-address item has a zero connection id");
        }
        if !items.iter().any(|i| i.type_id == cpf_item::CONNECTED_DATA) {
            return Validation::reject("missing connected-data item");
        }
        Validation::Accept
    }

    /// CIP-level request checks (§4.7). `opts` is the codec profile this
    /// request was decoded under - needed to recursively decode and
    /// validate an `Unconnected_Send`'s embedded request.
    pub fn validate_request(&self, req: &CipRequest, opts: CipCodecOptions) -> Validation {
        if cip_proto::constants::service::is_response(req.service) {
            return Validation::reject("request carries a response-echo service code");
        }
        if !KNOWN_SERVICES.contains(&req.service) {
            return Validation::reject(format!("service code {:#04x} is not in the known service set", req.service));
        }
        if !path_is_non_reserved(&req.path) {
            return Validation::reject("path is empty or targets a reserved class/attribute id");
        }

        match req.service {
            cip_proto::constants::service::SET_ATTRIBUTE_SINGLE if req.payload.is_empty() => {
                Validation::reject("Set_Attribute_Single requires a payload")
            },
            cip_proto::constants::service::GET_ATTRIBUTE_SINGLE if self.strict() && !req.payload.is_empty() => {
                Validation::reject("Get_Attribute_Single must not carry a payload under strict mode")
            },
            cip_proto::constants::service::MULTIPLE_SERVICE_PACKET => self.validate_multiple_service_target(req),
            cip_proto::constants::service::UNCONNECTED_SEND_OR_READ_TAG_FRAGMENTED
                if req.path.class() == Some(cip_proto::constants::class::CONNECTION_MANAGER) =>
            {
                self.validate_unconnected_send(req, opts)
            },
            cip_proto::constants::service::UNCONNECTED_SEND_OR_READ_TAG_FRAGMENTED if req.payload.len() < 6 => {
                Validation::reject("Read_Tag_Fragmented requires at least 6 bytes (elements + offset)")
            },
            cip_proto::constants::service::WRITE_TAG_FRAGMENTED if req.payload.len() < 8 => {
                Validation::reject("Write_Tag_Fragmented requires at least 8 bytes (type + elements + offset)")
            },
            _ => Validation::Accept,
        }
    }

    /// Decode and recursively validate the request embedded in an
    /// `Unconnected_Send` payload (§4.7): a wrapper that doesn't parse, or
    /// that wraps a request which would itself be rejected, is rejected
    /// the same way.
    fn validate_unconnected_send(&self, req: &CipRequest, opts: CipCodecOptions) -> Validation {
        let Ok(parsed) = parse_unconnected_send(&req.payload) else {
            return Validation::reject("Unconnected_Send payload failed to parse");
        };
        let Ok(embedded) = CipRequest::decode(&parsed.embedded_message, opts) else {
            return Validation::reject("Unconnected_Send embedded request failed to decode");
        };
        self.validate_request(&embedded, opts)
    }

    fn validate_multiple_service_target(&self, req: &CipRequest) -> Validation {
        let class_ok = req.path.class() == Some(cip_proto::constants::class::MESSAGE_ROUTER);
        let instance_ok = req.path.instance() == Some(1);
        if class_ok && instance_ok {
            Validation::Accept
        } else {
            Validation::reject("Multiple_Service_Packet requires class=Message_Router, instance=1")
        }
    }

    /// CIP-level response checks (§4.7): echoed service matches the
    /// originating request, and `Forward_Open` success payloads meet the
    /// minimum length.
    pub fn validate_response(&self, resp: &CipResponse, request_service: u8) -> Validation {
        if resp.service != cip_proto::constants::service::response_of(request_service) {
            return Validation::reject(format!(
                "response service {:#04x} does not echo request {:#04x}",
                resp.service, request_service
            ));
        }
        let is_forward_open = matches!(
            request_service,
            cip_proto::constants::service::FORWARD_OPEN | cip_proto::constants::service::LARGE_FORWARD_OPEN
        );
        if is_forward_open
            && resp.general_status == 0
            && resp.payload.len() < cip_proto::services::forward_open::FORWARD_OPEN_SUCCESS_MIN_LEN
        {
            return Validation::reject("Forward_Open success payload shorter than minimum length");
        }
        Validation::Accept
    }

    /// Log a rejection the way this validator's mode dictates: always at
    /// `debug`, but callers decide whether a lenient rejection should halt
    /// anything.
    pub fn log_rejection(&self, subject: &str, validation: &Validation) {
        if let Validation::Reject { reason } = validation {
            debug!(subject, reason, mode = ?self.mode, "validator rejected input");
        }
    }
}

#[cfg(test)]
mod tests {
    use cip_proto::epath::EPath;

    use super::*;

    #[test]
    fn unknown_command_is_rejected_in_both_modes() {
        let enc = Encapsulation { command: 0xFFFF, session_id: 1, status: 0, sender_context: [1; 8], options: 0, data: vec![] };
        let profile = Profile::strict_odva();
        assert!(!Validator::new(ValidationMode::Strict).validate_encapsulation(&enc, &profile).is_accept());
        assert!(!Validator::new(ValidationMode::Lenient).validate_encapsulation(&enc, &profile).is_accept());
    }

    #[test]
    fn strict_rejects_all_zero_sender_context() {
        let enc = Encapsulation {
            command: Command::RegisterSession.code(),
            session_id: 0,
            status: 0,
            sender_context: [0; 8],
            options: 0,
            data: vec![1, 0, 0, 0],
        };
        let profile = Profile::strict_odva();
        assert!(!Validator::new(ValidationMode::Strict).validate_encapsulation(&enc, &profile).is_accept());
        assert!(Validator::new(ValidationMode::Lenient).validate_encapsulation(&enc, &profile).is_accept());
    }

    #[test]
    fn set_attribute_single_without_payload_is_rejected() {
        let req = CipRequest {
            service: cip_proto::constants::service::SET_ATTRIBUTE_SINGLE,
            path: EPath::class_instance_attribute(0x04, 1, 3),
            payload: vec![],
        };
        assert!(!Validator::new(ValidationMode::Strict).validate_request(&req, CipCodecOptions::strict_odva()).is_accept());
    }

    #[test]
    fn unknown_service_code_is_rejected() {
        let req = CipRequest { service: 0x7E, path: EPath::class_instance(0x04, 1), payload: vec![] };
        assert!(!Validator::new(ValidationMode::Strict).validate_request(&req, CipCodecOptions::strict_odva()).is_accept());
    }

    #[test]
    fn empty_path_is_rejected() {
        let req = CipRequest {
            service: cip_proto::constants::service::GET_ATTRIBUTE_SINGLE,
            path: EPath::default(),
            payload: vec![],
        };
        assert!(!Validator::new(ValidationMode::Strict).validate_request(&req, CipCodecOptions::strict_odva()).is_accept());
    }

    #[test]
    fn reserved_class_zero_is_rejected() {
        let req = CipRequest {
            service: cip_proto::constants::service::GET_ATTRIBUTE_SINGLE,
            path: EPath::class_instance(0x00, 1),
            payload: vec![],
        };
        assert!(!Validator::new(ValidationMode::Strict).validate_request(&req, CipCodecOptions::strict_odva()).is_accept());
    }

    #[test]
    fn read_tag_fragmented_requires_minimum_payload() {
        let req = CipRequest {
            service: cip_proto::constants::service::UNCONNECTED_SEND_OR_READ_TAG_FRAGMENTED,
            path: EPath::class_instance(cip_proto::constants::class::SYMBOL_OBJECT, 1),
            payload: vec![0x00, 0x00],
        };
        assert!(!Validator::new(ValidationMode::Strict).validate_request(&req, CipCodecOptions::strict_odva()).is_accept());
    }

    #[test]
    fn write_tag_fragmented_requires_minimum_payload() {
        let req = CipRequest {
            service: cip_proto::constants::service::WRITE_TAG_FRAGMENTED,
            path: EPath::class_instance(cip_proto::constants::class::SYMBOL_OBJECT, 1),
            payload: vec![0x00; 4],
        };
        assert!(!Validator::new(ValidationMode::Strict).validate_request(&req, CipCodecOptions::strict_odva()).is_accept());
    }

    #[test]
    fn unconnected_send_with_malformed_embedded_request_is_rejected() {
        let opts = CipCodecOptions::strict_odva();
        let inner = CipRequest {
            service: cip_proto::constants::service::SET_ATTRIBUTE_SINGLE,
            path: EPath::class_instance_attribute(0x04, 1, 3),
            payload: vec![], // Set_Attribute_Single with no payload: invalid once unwrapped
        };
        let req = CipRequest {
            service: cip_proto::constants::service::UNCONNECTED_SEND_OR_READ_TAG_FRAGMENTED,
            path: EPath::class_instance(cip_proto::constants::class::CONNECTION_MANAGER, 1),
            payload: cip_proto::services::build_unconnected_send(&cip_proto::services::UnconnectedSendParams {
                priority_tick: 0x05,
                timeout_ticks: 0x0A,
                embedded_message: inner.encode(opts),
                route_path: EPath::class_instance(cip_proto::constants::class::CONNECTION_MANAGER, 1),
            }),
        };
        assert!(!Validator::new(ValidationMode::Strict).validate_request(&req, opts).is_accept());
    }

    #[test]
    fn unconnected_send_with_valid_embedded_request_is_accepted() {
        let opts = CipCodecOptions::strict_odva();
        let inner = CipRequest {
            service: cip_proto::constants::service::GET_ATTRIBUTE_SINGLE,
            path: EPath::class_instance_attribute(0x01, 1, 1),
            payload: vec![],
        };
        let req = CipRequest {
            service: cip_proto::constants::service::UNCONNECTED_SEND_OR_READ_TAG_FRAGMENTED,
            path: EPath::class_instance(cip_proto::constants::class::CONNECTION_MANAGER, 1),
            payload: cip_proto::services::build_unconnected_send(&cip_proto::services::UnconnectedSendParams {
                priority_tick: 0x05,
                timeout_ticks: 0x0A,
                embedded_message: inner.encode(opts),
                route_path: EPath::class_instance(cip_proto::constants::class::CONNECTION_MANAGER, 1),
            }),
        };
        assert!(Validator::new(ValidationMode::Strict).validate_request(&req, opts).is_accept());
    }

    #[test]
    fn response_service_mismatch_is_rejected() {
        let resp = CipResponse { service: 0x90, general_status: 0, extended_status: vec![], payload: vec![] };
        assert!(!Validator::new(ValidationMode::Strict).validate_response(&resp, 0x0E).is_accept());
    }

    #[test]
    fn multiple_service_packet_requires_message_router_instance_one() {
        let bad = CipRequest {
            service: cip_proto::constants::service::MULTIPLE_SERVICE_PACKET,
            path: EPath::class_instance(0x04, 1),
            payload: vec![0, 0],
        };
        assert!(!Validator::new(ValidationMode::Strict).validate_request(&bad, CipCodecOptions::strict_odva()).is_accept());

        let good = CipRequest {
            service: cip_proto::constants::service::MULTIPLE_SERVICE_PACKET,
            path: EPath::class_instance(cip_proto::constants::class::MESSAGE_ROUTER, 1),
            payload: vec![0, 0],
        };
        assert!(Validator::new(ValidationMode::Strict).validate_request(&good, CipCodecOptions::strict_odva()).is_accept());
    }
}
