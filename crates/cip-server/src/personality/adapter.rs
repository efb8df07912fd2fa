//! Adapter personality: assembly object model (C10, §3, §4.10).
//!
//! Assemblies recompute lazily: a pattern other than `reflect_inputs` only
//! touches its buffer on read, and only if more than 100 ms have passed
//! since the last recompute. The byte order used to encode the `counter`
//! pattern's u32 is fixed at construction - per §4.2 the profile is a
//! read-mostly resource mutated only at startup, so a handler snapshotting
//! it once at registration time satisfies §5's "snapshot at the start of
//! request processing" rule just as well as doing it per-call.

use std::{
    collections::HashMap,
    sync::Mutex,
    time::{Duration, Instant},
};

use cip_proto::{
    Endianness,
    cip::{CipRequest, CipResponse},
    constants::{general_status, service},
};
use cip_core::dispatch::HandlerAction;
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// How an assembly's data buffer evolves between reads (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdatePattern {
    /// Never changes after creation.
    Static,
    /// A monotonically increasing u32 at offset 0.
    Counter,
    /// The whole buffer is refilled from an RNG on each recompute.
    Random,
    /// Writes store the input verbatim; there is no lazy recompute.
    ReflectInputs,
}

/// Coarsening interval for lazy recompute (§4.10).
const RECOMPUTE_INTERVAL: Duration = Duration::from_millis(100);

/// A single adapter-style assembly (§3).
#[derive(Debug, Clone)]
pub struct Assembly {
    /// Human-readable name, for logging/scenario configuration.
    pub name: String,
    /// CIP instance this assembly answers Get/Set_Attribute_Single on.
    pub instance: u16,
    /// CIP attribute this assembly answers on (commonly `3`, the data attribute).
    pub attribute: u16,
    /// Declared size in bytes; writes and reads are clamped to this.
    pub size_bytes: usize,
    /// Current buffer contents.
    pub data: Vec<u8>,
    /// Whether `Set_Attribute_Single` is accepted.
    pub writable: bool,
    /// Value-generation pattern.
    pub update_pattern: UpdatePattern,
    /// Counter-pattern state.
    pub counter: u32,
    /// Last time this assembly's buffer was recomputed.
    pub last_update: Instant,
}

impl Assembly {
    /// Construct a fresh, zero-filled assembly.
    #[must_use]
    pub fn new(name: impl Into<String>, instance: u16, attribute: u16, size_bytes: usize, writable: bool, update_pattern: UpdatePattern) -> Self {
        Self {
            name: name.into(),
            instance,
            attribute,
            size_bytes,
            data: vec![0u8; size_bytes],
            writable,
            update_pattern,
            counter: 0,
            last_update: Instant::now(),
        }
    }

    fn recompute(&mut self, now: Instant, byte_order: Endianness, rng: &mut ChaCha8Rng) {
        if self.update_pattern == UpdatePattern::ReflectInputs {
            return;
        }
        if now.duration_since(self.last_update) < RECOMPUTE_INTERVAL {
            return;
        }
        match self.update_pattern {
            UpdatePattern::Static => {},
            UpdatePattern::Counter => {
                self.counter = self.counter.wrapping_add(1);
                if self.data.len() >= 4 {
                    byte_order.write_u32(&mut self.data[0..4], self.counter);
                }
            },
            UpdatePattern::Random => rng.fill_bytes(&mut self.data),
            UpdatePattern::ReflectInputs => unreachable!(),
        }
        self.last_update = now;
    }
}

/// Assembly catalog keyed by `(instance, attribute)` (§3).
pub struct AdapterStore {
    assemblies: Mutex<HashMap<(u16, u16), Assembly>>,
    byte_order: Endianness,
    rng: Mutex<ChaCha8Rng>,
}

impl AdapterStore {
    /// Build an empty store. `byte_order` is the profile's CIP byte order,
    /// snapshotted once at construction.
    #[must_use]
    pub fn new(byte_order: Endianness, rng_seed: u64) -> Self {
        Self { assemblies: Mutex::new(HashMap::new()), byte_order, rng: Mutex::new(ChaCha8Rng::seed_from_u64(rng_seed)) }
    }

    /// Register an assembly, replacing any existing one at the same
    /// `(instance, attribute)`.
    pub fn register(&self, assembly: Assembly) {
        #[allow(clippy::expect_used)]
        self.assemblies.lock().expect("adapter store mutex poisoned").insert((assembly.instance, assembly.attribute), assembly);
    }

    /// `Get_Attribute_Single`: recompute lazily, then copy the buffer into
    /// the response (§4.10).
    #[must_use]
    pub fn handle_get(&self, req: &CipRequest) -> HandlerAction {
        let Some(instance) = req.path.instance() else { return HandlerAction::NotHandled };
        let Some(attribute) = req.path.attribute() else { return HandlerAction::NotHandled };
        #[allow(clippy::expect_used)]
        let mut assemblies = self.assemblies.lock().expect("adapter store mutex poisoned");
        let Some(assembly) = assemblies.get_mut(&(instance, attribute)) else { return HandlerAction::NotHandled };

        #[allow(clippy::expect_used)]
        let mut rng = self.rng.lock().expect("adapter rng mutex poisoned");
        assembly.recompute(Instant::now(), self.byte_order, &mut rng);

        HandlerAction::Respond(CipResponse {
            service: service::response_of(req.service),
            general_status: general_status::SUCCESS,
            extended_status: vec![],
            payload: assembly.data.clone(),
        })
    }

    /// `Set_Attribute_Single`: rejected with `0x05` unless `writable`;
    /// payload is truncated to the assembly's declared size (§4.10).
    #[must_use]
    pub fn handle_set(&self, req: &CipRequest) -> HandlerAction {
        let Some(instance) = req.path.instance() else { return HandlerAction::NotHandled };
        let Some(attribute) = req.path.attribute() else { return HandlerAction::NotHandled };
        #[allow(clippy::expect_used)]
        let mut assemblies = self.assemblies.lock().expect("adapter store mutex poisoned");
        let Some(assembly) = assemblies.get_mut(&(instance, attribute)) else { return HandlerAction::NotHandled };

        if !assembly.writable {
            return HandlerAction::Respond(CipResponse {
                service: service::response_of(req.service),
                general_status: general_status::ATTRIBUTE_NOT_SETTABLE,
                extended_status: vec![],
                payload: vec![],
            });
        }

        let take = req.payload.len().min(assembly.size_bytes);
        assembly.data[..take].copy_from_slice(&req.payload[..take]);
        if assembly.update_pattern == UpdatePattern::ReflectInputs {
            assembly.last_update = Instant::now();
        }

        HandlerAction::Respond(CipResponse {
            service: service::response_of(req.service),
            general_status: general_status::SUCCESS,
            extended_status: vec![],
            payload: vec![],
        })
    }
}

#[cfg(test)]
mod tests {
    use cip_proto::epath::EPath;

    use super::*;

    fn req(service: u8, instance: u16, attribute: u16, payload: Vec<u8>) -> CipRequest {
        CipRequest { service, path: EPath::class_instance_attribute(0x04, instance, attribute), payload }
    }

    #[test]
    fn set_on_non_writable_assembly_is_rejected() {
        let store = AdapterStore::new(Endianness::Little, 1);
        store.register(Assembly::new("ro", 0x65, 3, 4, false, UpdatePattern::Static));
        let resp = store.handle_set(&req(service::SET_ATTRIBUTE_SINGLE, 0x65, 3, vec![1, 2, 3, 4]));
        match resp {
            HandlerAction::Respond(r) => assert_eq!(r.general_status, general_status::ATTRIBUTE_NOT_SETTABLE),
            HandlerAction::NotHandled => panic!("expected a response"),
        }
    }

    #[test]
    fn reflect_inputs_stores_payload_verbatim() {
        let store = AdapterStore::new(Endianness::Little, 1);
        store.register(Assembly::new("rw", 0x66, 3, 4, true, UpdatePattern::ReflectInputs));
        store.handle_set(&req(service::SET_ATTRIBUTE_SINGLE, 0x66, 3, vec![9, 8, 7, 6]));
        let HandlerAction::Respond(resp) = store.handle_get(&req(service::GET_ATTRIBUTE_SINGLE, 0x66, 3, vec![])) else {
            panic!("expected a response");
        };
        assert_eq!(resp.payload, vec![9, 8, 7, 6]);
    }

    #[test]
    fn counter_pattern_increases_across_coarsened_reads() {
        let store = AdapterStore::new(Endianness::Little, 1);
        store.register(Assembly::new("ctr", 0x66, 3, 4, false, UpdatePattern::Counter));
        let HandlerAction::Respond(first) = store.handle_get(&req(service::GET_ATTRIBUTE_SINGLE, 0x66, 3, vec![])) else {
            panic!("expected a response");
        };
        std::thread::sleep(Duration::from_millis(150));
        let HandlerAction::Respond(second) = store.handle_get(&req(service::GET_ATTRIBUTE_SINGLE, 0x66, 3, vec![])) else {
            panic!("expected a response");
        };
        let a = u32::from_le_bytes(first.payload[0..4].try_into().unwrap());
        let b = u32::from_le_bytes(second.payload[0..4].try_into().unwrap());
        assert!(b > a);
    }

    #[test]
    fn unknown_instance_is_not_handled() {
        let store = AdapterStore::new(Endianness::Little, 1);
        assert_eq!(store.handle_get(&req(service::GET_ATTRIBUTE_SINGLE, 0x99, 3, vec![])), HandlerAction::NotHandled);
    }
}
