//! Generic CIP object store (C12, §4.12).
//!
//! Backs whichever profile classes a scenario enables with a flat
//! `(class, instance, attribute)` attribute map, plus a couple of
//! class-specific service aliases that exist purely to give the
//! scenario engine something to stimulate - not a real semantic
//! contract for the aliased class.

use std::{collections::HashMap, sync::Mutex};

use cip_core::dispatch::HandlerAction;
use cip_proto::{
    Endianness,
    cip::{CipRequest, CipResponse},
    constants::{general_status, service},
};

/// Vendor-range class IDs this harness assigns its profile classes
/// (spec.md names the classes but not their IDs; ODVA reserves
/// `0x64`-`0xC7` for vendor-specific use - see DESIGN.md).
pub mod class_id {
    /// Energy class.
    pub const ENERGY: u16 = 0x9E;
    /// Safety class.
    pub const SAFETY: u16 = 0x9F;
    /// Motion class.
    pub const MOTION: u16 = 0xA0;
    /// Time-sync class.
    pub const TIME_SYNC: u16 = 0xA1;
    /// Modbus tunnel class.
    pub const MODBUS_TUNNEL: u16 = 0xA2;
}

/// A profile-selectable generic object class (§4.12).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectClass {
    /// Energy metering.
    Energy,
    /// Safety.
    Safety,
    /// Motion.
    Motion,
    /// Time synchronization.
    TimeSync,
    /// Modbus tunnel.
    ModbusTunnel,
}

impl ObjectClass {
    /// The class ID this harness assigns this class.
    #[must_use]
    pub fn class_id(self) -> u16 {
        match self {
            Self::Energy => class_id::ENERGY,
            Self::Safety => class_id::SAFETY,
            Self::Motion => class_id::MOTION,
            Self::TimeSync => class_id::TIME_SYNC,
            Self::ModbusTunnel => class_id::MODBUS_TUNNEL,
        }
    }

    /// Parse a normalized profile-selection name (`"energy"`, `"safety"`,
    /// `"motion"`, `"time-sync"`, `"modbus"`).
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "energy" => Some(Self::Energy),
            "safety" => Some(Self::Safety),
            "motion" => Some(Self::Motion),
            "time-sync" | "time_sync" => Some(Self::TimeSync),
            "modbus" | "modbus-tunnel" => Some(Self::ModbusTunnel),
            _ => None,
        }
    }

    const ALL: [Self; 5] = [Self::Energy, Self::Safety, Self::Motion, Self::TimeSync, Self::ModbusTunnel];
}

/// Which generic-object classes a server exposes (§4.12's `"all"`
/// selection, or a normalized-name subset).
#[derive(Debug, Clone, Default)]
pub struct ObjectClassSelection {
    enabled: Vec<ObjectClass>,
}

impl ObjectClassSelection {
    /// No classes enabled.
    #[must_use]
    pub fn none() -> Self {
        Self { enabled: Vec::new() }
    }

    /// Every known class enabled (the profile's `"all"` selection).
    #[must_use]
    pub fn all() -> Self {
        Self { enabled: ObjectClass::ALL.to_vec() }
    }

    /// Build a selection from normalized profile-class names, ignoring
    /// any name that doesn't match a known class.
    #[must_use]
    pub fn from_names<'a>(names: impl IntoIterator<Item = &'a str>) -> Self {
        Self { enabled: names.into_iter().filter_map(ObjectClass::from_name).collect() }
    }

    /// Whether `class` is enabled in this selection.
    #[must_use]
    pub fn contains(&self, class: ObjectClass) -> bool {
        self.enabled.contains(&class)
    }
}

/// Generic CIP object store (§3, §4.12).
pub struct GenericObjectStore {
    enabled: ObjectClassSelection,
    byte_order: Endianness,
    attributes: Mutex<HashMap<(u16, u16, u16), Vec<u8>>>,
    metering_active: Mutex<bool>,
}

impl GenericObjectStore {
    /// Build a store exposing exactly the classes in `enabled`.
    #[must_use]
    pub fn new(enabled: ObjectClassSelection, byte_order: Endianness) -> Self {
        Self { enabled, byte_order, attributes: Mutex::new(HashMap::new()), metering_active: Mutex::new(false) }
    }

    /// Seed an attribute's value ahead of dispatch.
    pub fn set_attribute(&self, class: u16, instance: u16, attribute: u16, data: Vec<u8>) {
        #[allow(clippy::expect_used)]
        self.attributes.lock().expect("generic object store mutex poisoned").insert((class, instance, attribute), data);
    }

    fn class_enabled(&self, class: u16) -> bool {
        ObjectClass::ALL.iter().any(|c| c.class_id() == class && self.enabled.contains(*c))
    }

    /// `Get_Attribute_Single`.
    #[must_use]
    pub fn handle_get_attribute_single(&self, req: &CipRequest) -> HandlerAction {
        let Some(class) = req.path.class() else { return HandlerAction::NotHandled };
        if !self.class_enabled(class) {
            return HandlerAction::NotHandled;
        }
        let (Some(instance), Some(attribute)) = (req.path.instance(), req.path.attribute()) else {
            return HandlerAction::NotHandled;
        };
        #[allow(clippy::expect_used)]
        let attrs = self.attributes.lock().expect("generic object store mutex poisoned");
        let Some(data) = attrs.get(&(class, instance, attribute)) else {
            return HandlerAction::Respond(CipResponse {
                service: service::response_of(req.service),
                general_status: general_status::ATTRIBUTE_NOT_SUPPORTED,
                extended_status: vec![],
                payload: vec![],
            });
        };
        HandlerAction::Respond(CipResponse {
            service: service::response_of(req.service),
            general_status: general_status::SUCCESS,
            extended_status: vec![],
            payload: data.clone(),
        })
    }

    /// `Set_Attribute_Single`.
    #[must_use]
    pub fn handle_set_attribute_single(&self, req: &CipRequest) -> HandlerAction {
        let Some(class) = req.path.class() else { return HandlerAction::NotHandled };
        if !self.class_enabled(class) {
            return HandlerAction::NotHandled;
        }
        let (Some(instance), Some(attribute)) = (req.path.instance(), req.path.attribute()) else {
            return HandlerAction::NotHandled;
        };
        #[allow(clippy::expect_used)]
        self.attributes.lock().expect("generic object store mutex poisoned").insert((class, instance, attribute), req.payload.clone());
        HandlerAction::Respond(CipResponse {
            service: service::response_of(req.service),
            general_status: general_status::SUCCESS,
            extended_status: vec![],
            payload: vec![],
        })
    }

    /// `Get_Attribute_List`: `u16` count + `u16` attribute IDs in, a
    /// `{attr_id, status, value}` triple out per ID (§4.12).
    #[must_use]
    pub fn handle_get_attribute_list(&self, req: &CipRequest) -> HandlerAction {
        let Some(class) = req.path.class() else { return HandlerAction::NotHandled };
        if !self.class_enabled(class) {
            return HandlerAction::NotHandled;
        }
        let Some(instance) = req.path.instance() else { return HandlerAction::NotHandled };
        if req.payload.len() < 2 {
            return HandlerAction::NotHandled;
        }
        let count = self.byte_order.read_u16(&req.payload[0..2]) as usize;
        if req.payload.len() < 2 + count * 2 {
            return HandlerAction::NotHandled;
        }

        #[allow(clippy::expect_used)]
        let attrs = self.attributes.lock().expect("generic object store mutex poisoned");
        let mut out = Vec::new();
        self.byte_order.put_u16(&mut out, count as u16);
        for i in 0..count {
            let attribute = self.byte_order.read_u16(&req.payload[2 + i * 2..4 + i * 2]);
            self.byte_order.put_u16(&mut out, attribute);
            match attrs.get(&(class, instance, attribute)) {
                Some(data) => {
                    self.byte_order.put_u16(&mut out, general_status::SUCCESS as u16);
                    out.extend_from_slice(data);
                },
                None => self.byte_order.put_u16(&mut out, general_status::ATTRIBUTE_NOT_SUPPORTED as u16),
            }
        }

        HandlerAction::Respond(CipResponse {
            service: service::response_of(req.service),
            general_status: general_status::SUCCESS,
            extended_status: vec![],
            payload: out,
        })
    }

    /// Energy-class aliases (§4.12): `Execute_PCCC` means "start
    /// metering", `Read_Tag` on this class means "stop metering".
    #[must_use]
    pub fn handle_energy_alias(&self, req: &CipRequest) -> HandlerAction {
        let Some(class) = req.path.class() else { return HandlerAction::NotHandled };
        if class != class_id::ENERGY || !self.class_enabled(class) {
            return HandlerAction::NotHandled;
        }
        match req.service {
            service::EXECUTE_PCCC => {
                #[allow(clippy::expect_used)]
                { *self.metering_active.lock().expect("metering flag mutex poisoned") = true; }
                HandlerAction::Respond(CipResponse {
                    service: service::response_of(req.service),
                    general_status: general_status::SUCCESS,
                    extended_status: vec![],
                    payload: vec![],
                })
            },
            service::READ_TAG => {
                #[allow(clippy::expect_used)]
                { *self.metering_active.lock().expect("metering flag mutex poisoned") = false; }
                HandlerAction::Respond(CipResponse {
                    service: service::response_of(req.service),
                    general_status: general_status::SUCCESS,
                    extended_status: vec![],
                    payload: vec![],
                })
            },
            _ => HandlerAction::NotHandled,
        }
    }

    /// Whether the energy-class metering alias is currently "active".
    #[must_use]
    pub fn metering_active(&self) -> bool {
        #[allow(clippy::expect_used)]
        { *self.metering_active.lock().expect("metering flag mutex poisoned") }
    }
}

#[cfg(test)]
mod tests {
    use cip_proto::epath::EPath;

    use super::*;

    fn req(service: u8, class: u16, instance: u16, attribute: u16, payload: Vec<u8>) -> CipRequest {
        CipRequest { service, path: EPath::class_instance_attribute(class, instance, attribute), payload }
    }

    #[test]
    fn disabled_class_is_not_handled() {
        let store = GenericObjectStore::new(ObjectClassSelection::none(), Endianness::Little);
        let resp = store.handle_get_attribute_single(&req(service::GET_ATTRIBUTE_SINGLE, class_id::ENERGY, 1, 1, vec![]));
        assert_eq!(resp, HandlerAction::NotHandled);
    }

    #[test]
    fn set_then_get_round_trips_through_the_attribute_map() {
        let store = GenericObjectStore::new(ObjectClassSelection::all(), Endianness::Little);
        store.handle_set_attribute_single(&req(service::SET_ATTRIBUTE_SINGLE, class_id::MOTION, 1, 5, vec![9, 9]));
        let HandlerAction::Respond(resp) = store.handle_get_attribute_single(&req(service::GET_ATTRIBUTE_SINGLE, class_id::MOTION, 1, 5, vec![])) else {
            panic!("expected response");
        };
        assert_eq!(resp.payload, vec![9, 9]);
    }

    #[test]
    fn execute_pccc_starts_metering_and_read_tag_stops_it() {
        let store = GenericObjectStore::new(ObjectClassSelection::from_names(["energy"]), Endianness::Little);
        store.handle_energy_alias(&req(service::EXECUTE_PCCC, class_id::ENERGY, 1, 0, vec![]));
        assert!(store.metering_active());
        store.handle_energy_alias(&req(service::READ_TAG, class_id::ENERGY, 1, 0, vec![]));
        assert!(!store.metering_active());
    }

    #[test]
    fn get_attribute_list_flags_missing_attributes() {
        let store = GenericObjectStore::new(ObjectClassSelection::all(), Endianness::Little);
        store.set_attribute(class_id::SAFETY, 1, 1, vec![1]);
        let mut payload = vec![0u8; 2];
        payload[0..2].copy_from_slice(&2u16.to_le_bytes());
        payload.extend_from_slice(&1u16.to_le_bytes());
        payload.extend_from_slice(&2u16.to_le_bytes());
        let HandlerAction::Respond(resp) =
            store.handle_get_attribute_list(&req(service::GET_ATTRIBUTE_LIST, class_id::SAFETY, 1, 0, payload))
        else {
            panic!("expected response");
        };
        assert_eq!(resp.general_status, general_status::SUCCESS);
    }
}
