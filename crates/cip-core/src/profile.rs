//! Protocol profile: process-wide framing policy, carried explicitly.
//!
//! The source this harness is modeled on holds the profile behind a
//! mutex-guarded global. That shape creates a torn-read hazard the moment
//! anything mutates the profile mid-run, and it makes the codec untestable
//! in parallel with more than one profile at a time. Here the profile is a
//! plain value threaded explicitly into every codec call; a
//! [`default_profile`] accessor exists only for the process edges
//! (`cip-server`'s `main.rs`, `cip-client`'s connect helpers) that need a
//! starting point before a caller hands them something else.

use cip_proto::{Endianness, cip::CipCodecOptions};

/// How a connection's I/O sequence word is produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoSequenceMode {
    /// Monotonically increasing per send.
    Increment,
    /// Filled from a random source (nanosecond entropy) each send.
    Random,
    /// No sequence word is prepended.
    Omit,
}

/// Named vendor-variant bodies layered on top of a base profile.
///
/// These are concrete enough to exercise the per-field override resolution
/// rule below, not a full vendor behavior model: each is a small, named
/// diff against `strict_odva`/`legacy_compat`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VendorVariant {
    /// Keeps CPF but omits the CIP response-reserved byte.
    Rockwell,
    /// Flips ENIP byte order to big-endian while keeping CIP payload
    /// little-endian.
    Schneider,
    /// Omits the CIP path-size word like `legacy_compat` but keeps CPF.
    Siemens,
}

/// Process-wide framing policy (§3/§4.2), threaded explicitly rather than
/// held behind a global lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    /// Human-readable name, for logging and scenario configuration.
    pub name: String,
    /// Byte order used for ENIP encapsulation headers and CPF.
    pub enip_byte_order: Endianness,
    /// Byte order used for CIP request/response integer and float fields.
    pub cip_byte_order: Endianness,
    /// Whether CIP requests carry a path-size word before path bytes.
    pub include_cip_path_size: bool,
    /// Whether CIP responses carry a reserved byte after the echoed service.
    pub include_cip_resp_reserved: bool,
    /// Whether SendRRData/SendUnitData wrap their payload in CPF items.
    pub use_cpf: bool,
    /// How connected I/O sequence words are produced.
    pub io_sequence_mode: IoSequenceMode,
}

impl Profile {
    /// Strict ODVA-conformant framing: little-endian throughout, path-size
    /// word present, response-reserved byte present, CPF in use, sequence
    /// numbers increment.
    #[must_use]
    pub fn strict_odva() -> Self {
        Self {
            name: "strict_odva".to_string(),
            enip_byte_order: Endianness::Little,
            cip_byte_order: Endianness::Little,
            include_cip_path_size: true,
            include_cip_resp_reserved: true,
            use_cpf: true,
            io_sequence_mode: IoSequenceMode::Increment,
        }
    }

    /// Legacy-compatible framing: big-endian throughout, no path-size word,
    /// no response-reserved byte, no CPF, no I/O sequence word.
    #[must_use]
    pub fn legacy_compat() -> Self {
        Self {
            name: "legacy_compat".to_string(),
            enip_byte_order: Endianness::Big,
            cip_byte_order: Endianness::Big,
            include_cip_path_size: false,
            include_cip_resp_reserved: false,
            use_cpf: false,
            io_sequence_mode: IoSequenceMode::Omit,
        }
    }

    /// Apply a named vendor variant on top of this profile, per §4.2's
    /// resolution rule (start from a base, apply the variant, then apply
    /// per-field overrides).
    #[must_use]
    pub fn with_vendor_variant(mut self, variant: VendorVariant) -> Self {
        match variant {
            VendorVariant::Rockwell => {
                self.name = format!("{}+rockwell", self.name);
                self.include_cip_resp_reserved = false;
            },
            VendorVariant::Schneider => {
                self.name = format!("{}+schneider", self.name);
                self.enip_byte_order = Endianness::Big;
            },
            VendorVariant::Siemens => {
                self.name = format!("{}+siemens", self.name);
                self.include_cip_path_size = false;
            },
        }
        self
    }

    /// Derive the [`CipCodecOptions`] the wire codec needs from this
    /// profile. Callers snapshot this once per request per §5's
    /// "handlers MUST snapshot the profile at the beginning of request
    /// processing" rule.
    #[must_use]
    pub fn cip_codec_options(&self) -> CipCodecOptions {
        CipCodecOptions {
            byte_order: self.cip_byte_order,
            include_path_size: self.include_cip_path_size,
            include_resp_reserved: self.include_cip_resp_reserved,
        }
    }
}

/// Starting-point profile for process edges that haven't been handed one
/// explicitly (e.g. a binary's default before parsing its own config).
#[must_use]
pub fn default_profile() -> Profile {
    Profile::strict_odva()
}
