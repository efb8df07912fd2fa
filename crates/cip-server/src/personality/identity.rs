//! Identity object personality (§6, §8 scenario 1): attribute-single
//! access for the fixed vendor/product fields a real device reports
//! both over the CIP Identity object and the ENIP `ListIdentity`
//! command (the latter is served directly out of [`IdentityStore::snapshot`]
//! by `cip-server`'s transport layer, which isn't CIP-dispatched at all).

use std::sync::Mutex;

use cip_core::dispatch::HandlerAction;
use cip_proto::{
    IdentityItem,
    cip::{CipRequest, CipResponse},
    constants::general_status,
};

/// Identity-object attribute IDs this harness answers (ODVA Vol 1
/// Table 5-2.1, the subset the spec names).
pub mod attribute {
    /// Vendor ID.
    pub const VENDOR_ID: u16 = 1;
    /// Device type.
    pub const DEVICE_TYPE: u16 = 2;
    /// Product code.
    pub const PRODUCT_CODE: u16 = 3;
    /// Revision (major, minor).
    pub const REVISION: u16 = 4;
    /// Status word.
    pub const STATUS: u16 = 5;
    /// Serial number.
    pub const SERIAL_NUMBER: u16 = 6;
    /// Product name (`SHORT_STRING`).
    pub const PRODUCT_NAME: u16 = 7;
    /// Device state.
    pub const STATE: u16 = 8;
}

/// Single-instance Identity object (§3).
pub struct IdentityStore {
    identity: Mutex<IdentityItem>,
}

impl IdentityStore {
    /// Build a store from a starting identity snapshot.
    #[must_use]
    pub fn new(identity: IdentityItem) -> Self {
        Self { identity: Mutex::new(identity) }
    }

    /// Current identity snapshot, for `ListIdentity` and scenario setup.
    #[must_use]
    pub fn snapshot(&self) -> IdentityItem {
        #[allow(clippy::expect_used)]
        self.identity.lock().expect("identity store mutex poisoned").clone()
    }

    fn attribute_bytes(identity: &IdentityItem, attribute: u16) -> Option<Vec<u8>> {
        match attribute {
            attribute::VENDOR_ID => Some(identity.vendor_id.to_le_bytes().to_vec()),
            attribute::DEVICE_TYPE => Some(identity.device_type.to_le_bytes().to_vec()),
            attribute::PRODUCT_CODE => Some(identity.product_code.to_le_bytes().to_vec()),
            attribute::REVISION => Some(vec![identity.revision.0, identity.revision.1]),
            attribute::STATUS => Some(identity.status.to_le_bytes().to_vec()),
            attribute::SERIAL_NUMBER => Some(identity.serial_number.to_le_bytes().to_vec()),
            attribute::PRODUCT_NAME => {
                let mut out = vec![identity.product_name.len() as u8];
                out.extend_from_slice(identity.product_name.as_bytes());
                Some(out)
            },
            attribute::STATE => Some(vec![identity.state]),
            _ => None,
        }
    }

    /// `Get_Attribute_Single` on the Identity object, instance 1.
    #[must_use]
    pub fn handle_get_attribute_single(&self, req: &CipRequest) -> HandlerAction {
        if req.path.instance() != Some(1) {
            return HandlerAction::NotHandled;
        }
        let Some(attr) = req.path.attribute() else { return HandlerAction::NotHandled };
        #[allow(clippy::expect_used)]
        let identity = self.identity.lock().expect("identity store mutex poisoned");
        match Self::attribute_bytes(&identity, attr) {
            Some(payload) => HandlerAction::Respond(CipResponse {
                service: cip_proto::constants::service::response_of(req.service),
                general_status: general_status::SUCCESS,
                extended_status: vec![],
                payload,
            }),
            None => HandlerAction::Respond(CipResponse {
                service: cip_proto::constants::service::response_of(req.service),
                general_status: general_status::ATTRIBUTE_NOT_SUPPORTED,
                extended_status: vec![],
                payload: vec![],
            }),
        }
    }

    /// `Get_Attribute_List` on the Identity object, instance 1.
    #[must_use]
    pub fn handle_get_attribute_list(&self, req: &CipRequest) -> HandlerAction {
        if req.path.instance() != Some(1) || req.payload.len() < 2 {
            return HandlerAction::NotHandled;
        }
        let count = u16::from_le_bytes([req.payload[0], req.payload[1]]) as usize;
        if req.payload.len() < 2 + count * 2 {
            return HandlerAction::NotHandled;
        }
        #[allow(clippy::expect_used)]
        let identity = self.identity.lock().expect("identity store mutex poisoned");
        let mut out = (count as u16).to_le_bytes().to_vec();
        for i in 0..count {
            let attr = u16::from_le_bytes([req.payload[2 + i * 2], req.payload[3 + i * 2]]);
            out.extend_from_slice(&attr.to_le_bytes());
            match Self::attribute_bytes(&identity, attr) {
                Some(bytes) => {
                    out.extend_from_slice(&(general_status::SUCCESS as u16).to_le_bytes());
                    out.extend_from_slice(&bytes);
                },
                None => out.extend_from_slice(&(general_status::ATTRIBUTE_NOT_SUPPORTED as u16).to_le_bytes()),
            }
        }
        HandlerAction::Respond(CipResponse {
            service: cip_proto::constants::service::response_of(req.service),
            general_status: general_status::SUCCESS,
            extended_status: vec![],
            payload: out,
        })
    }
}

/// Default identity snapshot for a freshly configured server (§8
/// scenario 1's vendor_id/product_code/serial/product_name/state).
#[must_use]
pub fn default_identity() -> IdentityItem {
    IdentityItem {
        protocol_version: 1,
        socket_address: cip_proto::SocketAddress { family: 2, port: 44818, address: [0, 0, 0, 0] },
        vendor_id: 0x0001,
        device_type: 0x0C,
        product_code: 100,
        revision: (1, 0),
        status: 0,
        serial_number: 12345,
        product_name: "Test Device".to_string(),
        state: 0,
    }
}

#[cfg(test)]
mod tests {
    use cip_proto::epath::EPath;

    use super::*;

    fn req(service: u8, attribute: u16) -> CipRequest {
        CipRequest { service, path: EPath::class_instance_attribute(0x01, 1, attribute), payload: vec![] }
    }

    #[test]
    fn get_attribute_single_returns_vendor_id() {
        let store = IdentityStore::new(default_identity());
        let HandlerAction::Respond(resp) =
            store.handle_get_attribute_single(&req(cip_proto::constants::service::GET_ATTRIBUTE_SINGLE, attribute::VENDOR_ID))
        else {
            panic!("expected response");
        };
        assert_eq!(resp.payload, vec![0x01, 0x00]);
    }

    #[test]
    fn unknown_attribute_is_attribute_not_supported() {
        let store = IdentityStore::new(default_identity());
        let HandlerAction::Respond(resp) =
            store.handle_get_attribute_single(&req(cip_proto::constants::service::GET_ATTRIBUTE_SINGLE, 99))
        else {
            panic!("expected response");
        };
        assert_eq!(resp.general_status, general_status::ATTRIBUTE_NOT_SUPPORTED);
    }

    #[test]
    fn wrong_instance_is_not_handled() {
        let store = IdentityStore::new(default_identity());
        let req = CipRequest {
            service: cip_proto::constants::service::GET_ATTRIBUTE_SINGLE,
            path: EPath::class_instance_attribute(0x01, 2, attribute::VENDOR_ID),
            payload: vec![],
        };
        assert_eq!(store.handle_get_attribute_single(&req), HandlerAction::NotHandled);
    }
}
