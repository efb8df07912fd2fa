//! Reference-packet comparison (C15, §4.15).
//!
//! Reference packets are captured-frame byte blobs; the session id a
//! capture was taken under will never match a live re-run's
//! server-allocated session id, so both sides of a comparison have that
//! field (header bytes 4-7, per the encapsulation layout in
//! `cip_proto::enip::Encapsulation`) zeroed before comparing.

/// Zero the session-id field (header bytes 4-7) of an encoded ENIP frame
/// in place. A no-op on anything shorter than 8 bytes - not this
/// function's job to validate frame structure.
pub fn zero_session_id(frame: &mut [u8]) {
    if let Some(field) = frame.get_mut(4..8) {
        field.fill(0);
    }
}

/// True if `candidate` and `reference` are byte-identical once both have
/// their session-id field zeroed (§4.15).
#[must_use]
pub fn frames_match(candidate: &[u8], reference: &[u8]) -> bool {
    first_difference(candidate, reference).is_none()
}

/// The offset of the first byte at which `candidate` and `reference`
/// diverge, after session-id zeroing - `None` if they're identical.
/// When one is a prefix of the other, the divergence point is the
/// shorter one's length.
#[must_use]
pub fn first_difference(candidate: &[u8], reference: &[u8]) -> Option<usize> {
    let mut c = candidate.to_vec();
    let mut r = reference.to_vec();
    zero_session_id(&mut c);
    zero_session_id(&mut r);

    let common = c.len().min(r.len());
    if let Some(offset) = c[..common].iter().zip(&r[..common]).position(|(a, b)| a != b) {
        return Some(offset);
    }
    (c.len() != r.len()).then_some(common)
}
