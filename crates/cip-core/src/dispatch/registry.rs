//! Handler registry keyed by (class, service), with wildcard fallback
//! (C9, §4.9, §9's "dynamic dispatch" note).
//!
//! Handlers are modeled as the action pattern: [`Handler::handle`] returns
//! an action describing what happened rather than performing any I/O
//! itself, keeping dispatch synchronous and unit-testable without a live
//! transport - the same shape the teacher's connection/sequencer state
//! machines use.

use cip_proto::cip::{CipRequest, CipResponse};

/// What a handler did with a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandlerAction {
    /// The handler produced a response; dispatch stops here.
    Respond(CipResponse),
    /// The handler doesn't apply to this request; try the next one.
    NotHandled,
}

/// A registered request handler. `Send + Sync` so a registry can be
/// shared across connection workers (§5's per-worker dispatch model).
pub trait Handler: Send + Sync {
    /// Attempt to handle `req` addressed to `class`.
    fn handle(&self, class: u16, req: &CipRequest) -> HandlerAction;
}

impl<F> Handler for F
where
    F: Fn(u16, &CipRequest) -> HandlerAction + Send + Sync,
{
    fn handle(&self, class: u16, req: &CipRequest) -> HandlerAction {
        self(class, req)
    }
}

struct Entry {
    class: Option<u16>,
    service: Option<u8>,
    handler: Box<dyn Handler>,
}

/// (class, service) keyed handler registry with two wildcard axes.
///
/// Resolution order (§4.9): exact match, class-exact/service-wildcard,
/// class-wildcard/service-exact, wildcard/wildcard. Within each bucket,
/// handlers run in registration order; the first that returns
/// [`HandlerAction::Respond`] wins.
#[derive(Default)]
pub struct HandlerRegistry {
    entries: Vec<Entry>,
}

impl HandlerRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    /// Register a handler for an exact `(class, service)` pair.
    pub fn register(&mut self, class: u16, service: u8, handler: impl Handler + 'static) {
        self.entries.push(Entry { class: Some(class), service: Some(service), handler: Box::new(handler) });
    }

    /// Register a handler for any service on `class` (service wildcard).
    pub fn register_class_wildcard(&mut self, class: u16, handler: impl Handler + 'static) {
        self.entries.push(Entry { class: Some(class), service: None, handler: Box::new(handler) });
    }

    /// Register a handler for `service` on any class (class wildcard).
    pub fn register_service_wildcard(&mut self, service: u8, handler: impl Handler + 'static) {
        self.entries.push(Entry { class: None, service: Some(service), handler: Box::new(handler) });
    }

    /// Register a catch-all handler (both axes wildcard).
    pub fn register_catch_all(&mut self, handler: impl Handler + 'static) {
        self.entries.push(Entry { class: None, service: None, handler: Box::new(handler) });
    }

    /// Dispatch `req` addressed to `class`, trying buckets in resolution
    /// order. Returns `None` if no handler in any bucket responded -
    /// callers turn that into the `0x08` service-not-supported response.
    #[must_use]
    pub fn dispatch(&self, class: u16, req: &CipRequest) -> Option<CipResponse> {
        let buckets: [fn(&Entry, u16, u8) -> bool; 4] = [
            |e, c, s| e.class == Some(c) && e.service == Some(s),
            |e, c, _| e.class == Some(c) && e.service.is_none(),
            |e, _, s| e.class.is_none() && e.service == Some(s),
            |e, _, _| e.class.is_none() && e.service.is_none(),
        ];

        for matches_bucket in buckets {
            for entry in &self.entries {
                if !matches_bucket(entry, class, req.service) {
                    continue;
                }
                if let HandlerAction::Respond(resp) = entry.handler.handle(class, req) {
                    return Some(resp);
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use cip_proto::epath::EPath;

    use super::*;

    fn req(service: u8) -> CipRequest {
        CipRequest { service, path: EPath::class_instance(0x04, 1), payload: vec![] }
    }

    fn respond_with(status: u8) -> impl Handler {
        move |_class: u16, r: &CipRequest| {
            HandlerAction::Respond(CipResponse {
                service: r.service | 0x80,
                general_status: status,
                extended_status: vec![],
                payload: vec![],
            })
        }
    }

    #[test]
    fn exact_match_wins_over_wildcards() {
        let mut registry = HandlerRegistry::new();
        registry.register_catch_all(respond_with(0xFF));
        registry.register(0x04, 0x0E, respond_with(0x00));
        let resp = registry.dispatch(0x04, &req(0x0E)).unwrap();
        assert_eq!(resp.general_status, 0x00);
    }

    #[test]
    fn class_wildcard_beats_pure_catch_all() {
        let mut registry = HandlerRegistry::new();
        registry.register_catch_all(respond_with(0xFF));
        registry.register_service_wildcard(0x0E, respond_with(0x01));
        let resp = registry.dispatch(0x99, &req(0x0E)).unwrap();
        assert_eq!(resp.general_status, 0x01);
    }

    #[test]
    fn unhandled_request_returns_none() {
        let registry = HandlerRegistry::new();
        assert!(registry.dispatch(0x04, &req(0x0E)).is_none());
    }

    #[test]
    fn first_handler_in_bucket_wins_when_it_responds() {
        let mut registry = HandlerRegistry::new();
        registry.register(0x04, 0x0E, |_: u16, _: &CipRequest| HandlerAction::NotHandled);
        registry.register(0x04, 0x0E, respond_with(0x00));
        let resp = registry.dispatch(0x04, &req(0x0E)).unwrap();
        assert_eq!(resp.general_status, 0x00);
    }
}
