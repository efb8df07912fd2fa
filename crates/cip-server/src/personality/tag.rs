//! Tag (Logix-like) personality: named tag dictionary (C11, §3, §4.11).
//!
//! Byte order for type codes/fragment framing is snapshotted once at
//! construction, for the same reason [`super::adapter::AdapterStore`]
//! does: the profile only changes at process start or documented test
//! boundaries (§4.2), so a handler-lifetime snapshot satisfies §5's
//! per-request snapshot rule.

use std::{
    collections::HashMap,
    sync::Mutex,
    time::{Duration, Instant},
};

use cip_core::dispatch::HandlerAction;
use cip_proto::{
    Endianness,
    cip::{CipRequest, CipResponse},
    constants::{general_status, service},
    services::{ReadTagResponse, TagWriteFragmented, build_read_tag_response, parse_write_tag_fragmented},
};
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Maximum bytes returned per `Read_Tag_Fragmented` response (§4.11).
pub const MAX_FRAGMENT_LEN: usize = 480;

/// Attribute ID `Get_Instance_Attribute_List` treats as the tag's value
/// (spec.md leaves the concrete attribute ID unspecified; `1` is this
/// harness's documented choice - see DESIGN.md).
pub const DATA_ATTRIBUTE_ID: u16 = 1;

const RECOMPUTE_INTERVAL: Duration = Duration::from_millis(100);

/// Value-generation pattern for a tag's backing bytes (§3, §4.11).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagUpdatePattern {
    /// Never changes after creation.
    Static,
    /// A monotonically increasing u32 at offset 0.
    Counter,
    /// A REAL at offset 0, phase advancing by 0.1 per recompute, wrapped.
    Sine,
    /// A u32 at offset 0 cycling 0..100.
    Sawtooth,
    /// The whole buffer is refilled from an RNG each recompute.
    Random,
}

/// A single Logix-like tag (§3).
#[derive(Debug, Clone)]
pub struct Tag {
    /// Dotted tag name, e.g. `"Program:MainProgram.Counter1"`.
    pub name: String,
    /// CIP data-type code (ODVA numbering, see [`cip_proto::cip::CipValue`]).
    pub type_code: u16,
    /// Element count.
    pub elements: u16,
    /// Raw backing bytes, `elements * type_size` long.
    pub data: Vec<u8>,
    /// Update pattern.
    pub update_pattern: TagUpdatePattern,
    /// Counter-pattern state.
    pub counter: u32,
    /// Sine-pattern phase accumulator.
    pub sine_phase: f32,
    /// Last recompute time.
    pub last_update: Instant,
}

impl Tag {
    /// Construct a fresh, zero-filled tag.
    #[must_use]
    pub fn new(name: impl Into<String>, type_code: u16, elements: u16, byte_len: usize, update_pattern: TagUpdatePattern) -> Self {
        Self {
            name: name.into(),
            type_code,
            elements,
            data: vec![0u8; byte_len],
            update_pattern,
            counter: 0,
            sine_phase: 0.0,
            last_update: Instant::now(),
        }
    }

    fn recompute(&mut self, now: Instant, byte_order: Endianness, rng: &mut ChaCha8Rng) {
        if now.duration_since(self.last_update) < RECOMPUTE_INTERVAL {
            return;
        }
        match self.update_pattern {
            TagUpdatePattern::Static => {},
            TagUpdatePattern::Counter => {
                self.counter = self.counter.wrapping_add(1);
                if self.data.len() >= 4 {
                    byte_order.write_u32(&mut self.data[0..4], self.counter);
                }
            },
            TagUpdatePattern::Sine => {
                self.sine_phase += 0.1;
                if self.sine_phase > std::f32::consts::TAU {
                    self.sine_phase -= std::f32::consts::TAU;
                }
                if self.data.len() >= 4 {
                    byte_order.write_f32(&mut self.data[0..4], self.sine_phase.sin());
                }
            },
            TagUpdatePattern::Sawtooth => {
                self.counter = (self.counter + 1) % 100;
                if self.data.len() >= 4 {
                    byte_order.write_u32(&mut self.data[0..4], self.counter);
                }
            },
            TagUpdatePattern::Random => rng.fill_bytes(&mut self.data),
        }
        self.last_update = now;
    }
}

/// Named tag dictionary (§3, §4.11).
pub struct TagStore {
    tags: Mutex<Vec<Tag>>,
    byte_order: Endianness,
    rng: Mutex<ChaCha8Rng>,
}

impl TagStore {
    /// Build an empty store.
    #[must_use]
    pub fn new(byte_order: Endianness, rng_seed: u64) -> Self {
        Self { tags: Mutex::new(Vec::new()), byte_order, rng: Mutex::new(ChaCha8Rng::seed_from_u64(rng_seed)) }
    }

    /// Register a tag.
    pub fn register(&self, tag: Tag) {
        #[allow(clippy::expect_used)]
        self.tags.lock().expect("tag store mutex poisoned").push(tag);
    }

    fn request_name(req: &CipRequest) -> Option<&str> {
        req.path.tag_name()
    }

    /// `Read_Tag`: lookup by path name, falling back to the first
    /// registered tag when the request carries no name (§4.11's "legacy
    /// decoders" fallback).
    #[must_use]
    pub fn handle_read_tag(&self, req: &CipRequest) -> HandlerAction {
        #[allow(clippy::expect_used)]
        let mut tags = self.tags.lock().expect("tag store mutex poisoned");
        if tags.is_empty() {
            return HandlerAction::NotHandled;
        }
        let name = Self::request_name(req);
        let index = match name {
            Some(n) => match tags.iter().position(|t| t.name == n) {
                Some(i) => i,
                None => return HandlerAction::NotHandled,
            },
            None => 0,
        };

        #[allow(clippy::expect_used)]
        let mut rng = self.rng.lock().expect("tag rng mutex poisoned");
        let tag = &mut tags[index];
        tag.recompute(Instant::now(), self.byte_order, &mut rng);

        let payload = build_read_tag_response(
            &ReadTagResponse { type_code: tag.type_code, elements: tag.elements, data: tag.data.clone() },
            self.byte_order,
        );
        HandlerAction::Respond(CipResponse {
            service: service::response_of(req.service),
            general_status: general_status::SUCCESS,
            extended_status: vec![],
            payload,
        })
    }

    /// `Read_Tag_Fragmented`: clamp the requested window to tag bounds,
    /// cap each fragment at [`MAX_FRAGMENT_LEN`] bytes, and report `0x06`
    /// when more data remains beyond this fragment.
    #[must_use]
    pub fn handle_read_tag_fragmented(&self, req: &CipRequest) -> HandlerAction {
        if req.payload.len() < 6 {
            return HandlerAction::NotHandled;
        }
        let offset = self.byte_order.read_u32(&req.payload[2..6]) as usize;

        #[allow(clippy::expect_used)]
        let mut tags = self.tags.lock().expect("tag store mutex poisoned");
        if tags.is_empty() {
            return HandlerAction::NotHandled;
        }
        let name = Self::request_name(req);
        let index = match name {
            Some(n) => match tags.iter().position(|t| t.name == n) {
                Some(i) => i,
                None => return HandlerAction::NotHandled,
            },
            None => 0,
        };

        #[allow(clippy::expect_used)]
        let mut rng = self.rng.lock().expect("tag rng mutex poisoned");
        let tag = &mut tags[index];
        tag.recompute(Instant::now(), self.byte_order, &mut rng);

        let start = offset.min(tag.data.len());
        let remaining = &tag.data[start..];
        let take = remaining.len().min(MAX_FRAGMENT_LEN);
        let chunk = remaining[..take].to_vec();
        let more_remains = remaining.len() > take;

        let payload = build_read_tag_response(
            &ReadTagResponse { type_code: tag.type_code, elements: tag.elements, data: chunk },
            self.byte_order,
        );
        HandlerAction::Respond(CipResponse {
            service: service::response_of(req.service),
            general_status: if more_remains { general_status::REPLY_DATA_TOO_LARGE } else { general_status::SUCCESS },
            extended_status: vec![],
            payload,
        })
    }

    /// `Write_Tag`: requires a minimum 4-byte header (`type u16 |
    /// elements u16`), then copies the remaining bytes verbatim (§4.11 -
    /// unlike the fragmented variant, a type mismatch is not rejected).
    #[must_use]
    pub fn handle_write_tag(&self, req: &CipRequest) -> HandlerAction {
        if req.payload.len() < 4 {
            return HandlerAction::Respond(CipResponse {
                service: service::response_of(req.service),
                general_status: general_status::GENERAL_ERROR,
                extended_status: vec![],
                payload: vec![],
            });
        }
        #[allow(clippy::expect_used)]
        let mut tags = self.tags.lock().expect("tag store mutex poisoned");
        let name = Self::request_name(req);
        let index = match name {
            Some(n) => match tags.iter().position(|t| t.name == n) {
                Some(i) => i,
                None => return HandlerAction::NotHandled,
            },
            None if !tags.is_empty() => 0,
            None => return HandlerAction::NotHandled,
        };

        let tag = &mut tags[index];
        let incoming = &req.payload[4..];
        let take = incoming.len().min(tag.data.len());
        tag.data[..take].copy_from_slice(&incoming[..take]);
        tag.last_update = Instant::now();

        HandlerAction::Respond(CipResponse {
            service: service::response_of(req.service),
            general_status: general_status::SUCCESS,
            extended_status: vec![],
            payload: vec![],
        })
    }

    /// `Write_Tag_Fragmented`: rejects with `0x13` on a declared-type
    /// mismatch against the tag, otherwise writes at the given offset.
    #[must_use]
    pub fn handle_write_tag_fragmented(&self, req: &CipRequest) -> HandlerAction {
        let Ok(parsed) = parse_write_tag_fragmented(&req.payload, self.byte_order) else {
            return HandlerAction::Respond(CipResponse {
                service: service::response_of(req.service),
                general_status: general_status::GENERAL_ERROR,
                extended_status: vec![],
                payload: vec![],
            });
        };

        #[allow(clippy::expect_used)]
        let mut tags = self.tags.lock().expect("tag store mutex poisoned");
        let name = Self::request_name(req);
        let index = match name {
            Some(n) => match tags.iter().position(|t| t.name == n) {
                Some(i) => i,
                None => return HandlerAction::NotHandled,
            },
            None if !tags.is_empty() => 0,
            None => return HandlerAction::NotHandled,
        };

        let tag = &mut tags[index];
        if tag.type_code != parsed.type_code {
            return HandlerAction::Respond(CipResponse {
                service: service::response_of(req.service),
                general_status: general_status::TYPE_MISMATCH,
                extended_status: vec![],
                payload: vec![],
            });
        }

        let start = (parsed.offset as usize).min(tag.data.len());
        let take = parsed.data.len().min(tag.data.len().saturating_sub(start));
        tag.data[start..start + take].copy_from_slice(&parsed.data[..take]);
        tag.last_update = Instant::now();

        HandlerAction::Respond(CipResponse {
            service: service::response_of(req.service),
            general_status: general_status::SUCCESS,
            extended_status: vec![],
            payload: vec![],
        })
    }

    /// `Get_Instance_Attribute_List`: per-attribute `{attr_id u16, status
    /// u16, value}` triples; `0x14` for anything but the data attribute.
    #[must_use]
    pub fn handle_get_instance_attribute_list(&self, req: &CipRequest) -> HandlerAction {
        if req.payload.len() < 2 {
            return HandlerAction::NotHandled;
        }
        let count = self.byte_order.read_u16(&req.payload[0..2]) as usize;
        if req.payload.len() < 2 + count * 2 {
            return HandlerAction::NotHandled;
        }

        #[allow(clippy::expect_used)]
        let mut tags = self.tags.lock().expect("tag store mutex poisoned");
        let name = Self::request_name(req);
        let index = match name {
            Some(n) => match tags.iter().position(|t| t.name == n) {
                Some(i) => i,
                None => return HandlerAction::NotHandled,
            },
            None if !tags.is_empty() => 0,
            None => return HandlerAction::NotHandled,
        };

        #[allow(clippy::expect_used)]
        let mut rng = self.rng.lock().expect("tag rng mutex poisoned");
        let tag = &mut tags[index];
        tag.recompute(Instant::now(), self.byte_order, &mut rng);

        let mut out = Vec::new();
        self.byte_order.put_u16(&mut out, count as u16);
        for i in 0..count {
            let attr_id = self.byte_order.read_u16(&req.payload[2 + i * 2..4 + i * 2]);
            self.byte_order.put_u16(&mut out, attr_id);
            if attr_id == DATA_ATTRIBUTE_ID {
                self.byte_order.put_u16(&mut out, general_status::SUCCESS as u16);
                out.extend_from_slice(&tag.data);
            } else {
                self.byte_order.put_u16(&mut out, general_status::ATTRIBUTE_NOT_SUPPORTED as u16);
            }
        }

        HandlerAction::Respond(CipResponse {
            service: service::response_of(req.service),
            general_status: general_status::SUCCESS,
            extended_status: vec![],
            payload: out,
        })
    }
}

#[cfg(test)]
mod tests {
    use cip_proto::epath::EPath;

    use super::*;

    fn store_with_one_tag() -> TagStore {
        let store = TagStore::new(Endianness::Little, 7);
        store.register(Tag::new("Tag1", 0x00C4, 1, 4, TagUpdatePattern::Static));
        store
    }

    fn req(service: u8, name: &str, payload: Vec<u8>) -> CipRequest {
        CipRequest { service, path: EPath::symbolic(name), payload }
    }

    #[test]
    fn read_tag_returns_type_and_data() {
        let store = store_with_one_tag();
        let HandlerAction::Respond(resp) = store.handle_read_tag(&req(service::READ_TAG, "Tag1", vec![1, 0])) else {
            panic!("expected response");
        };
        let parsed = cip_proto::services::parse_read_tag_response(&resp.payload, Endianness::Little).unwrap();
        assert_eq!(parsed.type_code, 0x00C4);
    }

    #[test]
    fn write_tag_fragmented_rejects_type_mismatch() {
        let store = store_with_one_tag();
        let bad = TagWriteFragmented { type_code: 0x00C3, elements: 1, offset: 0, data: vec![1, 2] };
        let payload = cip_proto::services::build_write_tag_fragmented(&bad, Endianness::Little);
        let resp = store.handle_write_tag_fragmented(&req(service::WRITE_TAG_FRAGMENTED, "Tag1", payload));
        match resp {
            HandlerAction::Respond(r) => assert_eq!(r.general_status, general_status::TYPE_MISMATCH),
            HandlerAction::NotHandled => panic!("expected response"),
        }
    }

    #[test]
    fn read_tag_fragmented_caps_at_480_bytes_and_signals_more() {
        let store = TagStore::new(Endianness::Little, 1);
        store.register(Tag::new("Big", 0x00C2, 600, 600, TagUpdatePattern::Static));
        let mut payload = vec![0u8; 6];
        payload[0..2].copy_from_slice(&100u16.to_le_bytes());
        let resp = store.handle_read_tag_fragmented(&req(service::UNCONNECTED_SEND_OR_READ_TAG_FRAGMENTED, "Big", payload));
        let HandlerAction::Respond(r) = resp else { panic!("expected response") };
        assert_eq!(r.general_status, general_status::REPLY_DATA_TOO_LARGE);
        let parsed = cip_proto::services::parse_read_tag_response(&r.payload, Endianness::Little).unwrap();
        assert_eq!(parsed.data.len(), MAX_FRAGMENT_LEN);
    }

    #[test]
    fn get_instance_attribute_list_flags_unsupported_attributes() {
        let store = store_with_one_tag();
        let mut payload = vec![0u8; 2];
        payload[0..2].copy_from_slice(&2u16.to_le_bytes());
        payload.extend_from_slice(&DATA_ATTRIBUTE_ID.to_le_bytes());
        payload.extend_from_slice(&99u16.to_le_bytes());
        let HandlerAction::Respond(resp) =
            store.handle_get_instance_attribute_list(&req(service::GET_INSTANCE_ATTRIBUTE_LIST, "Tag1", payload))
        else {
            panic!("expected response");
        };
        assert_eq!(resp.general_status, general_status::SUCCESS);
    }
}
