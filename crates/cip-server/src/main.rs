//! `cip-server` binary: starts a CIP/ENIP test-harness device under a
//! chosen profile, with a couple of sample fixtures registered so a
//! fresh checkout has something to poke at immediately.
//!
//! Usage: `cip-server [bind-host] [profile]`, where `profile` is one of
//! `strict`, `legacy`, `rockwell`, `schneider`, `siemens` (default `strict`).
//! No flag parser here - two positional arguments is the entire surface,
//! and clap would be overkill for it (§1's ambient-stack note).

use std::sync::Arc;

use cip_core::profile::{Profile, VendorVariant};
use cip_server::{
    Server, ServerConfig,
    personality::{Assembly, Tag, TagUpdatePattern, UpdatePattern},
};

fn profile_from_name(name: &str) -> Profile {
    match name {
        "legacy" => Profile::legacy_compat(),
        "rockwell" => Profile::strict_odva().with_vendor_variant(VendorVariant::Rockwell),
        "schneider" => Profile::strict_odva().with_vendor_variant(VendorVariant::Schneider),
        "siemens" => Profile::strict_odva().with_vendor_variant(VendorVariant::Siemens),
        _ => Profile::strict_odva(),
    }
}

fn register_sample_fixtures(server: &Server) {
    server.adapters.register(Assembly::new("output", 100, 3, 4, true, UpdatePattern::ReflectInputs));
    server.adapters.register(Assembly::new("input", 101, 3, 4, false, UpdatePattern::Counter));
    server.tags.register(Tag::new("Program:MainProgram.Counter1", 0x00C4, 1, 4, TagUpdatePattern::Counter));
    server.tags.register(Tag::new("Program:MainProgram.Temperature", 0x00CA, 1, 4, TagUpdatePattern::Sine));
}

#[tokio::main]
async fn main() -> cip_server::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mut args = std::env::args().skip(1);
    let bind_host = args.next().unwrap_or_else(|| "127.0.0.1".to_string());
    let profile_name = args.next().unwrap_or_else(|| "strict".to_string());

    let config = ServerConfig::default().with_bind_host(bind_host).with_profile(profile_from_name(&profile_name));
    let server = Server::new(config);
    register_sample_fixtures(&server);

    tracing::info!(profile = %server.profile().name, "starting cip-server");
    cip_server::transport::run(Arc::new(server)).await
}
