//! Build script for framepool.
//!
//! Provides build-time notes about enabled features for users integrating
//! framepool into their renderer.

use std::env;

fn main() {
    // Re-run if features change
    println!("cargo:rerun-if-env-changed=CARGO_FEATURE_GPU_VULKAN");
    println!("cargo:rerun-if-env-changed=CARGO_FEATURE_PARKING_LOT");
    println!("cargo:rerun-if-env-changed=CARGO_FEATURE_LOG");
    println!("cargo:rerun-if-env-changed=CARGO_FEATURE_DIAGNOSTICS");

    let vulkan_enabled = env::var("CARGO_FEATURE_GPU_VULKAN").is_ok();
    let log_enabled = env::var("CARGO_FEATURE_LOG").is_ok();
    let diagnostics_enabled = env::var("CARGO_FEATURE_DIAGNOSTICS").is_ok();

    let profile = env::var("PROFILE").unwrap_or_else(|_| "unknown".to_string());
    let is_release = profile == "release";

    // =========================================================================
    // Feature-specific notes
    // =========================================================================

    if vulkan_enabled {
        emit_info("Vulkan backend enabled");
        emit_note("Wrap your device with framepool::gpu::vulkan::AshDevice and pass it to RenderResources::new");
    }

    if is_release && !log_enabled && !diagnostics_enabled {
        emit_warning("Release build without 'log' or 'diagnostics': pool failures will not be reported");
        emit_note("  framepool = { version = \"0.1\", features = [\"log\"] }");
    }

    if log_enabled && diagnostics_enabled {
        emit_note("'log' takes precedence over 'diagnostics'; stderr output is disabled");
    }
}

fn emit_info(msg: &str) {
    println!("cargo:warning=[framepool] {}", msg);
}

fn emit_note(msg: &str) {
    println!("cargo:warning=[framepool]    {}", msg);
}

fn emit_warning(msg: &str) {
    println!("cargo:warning=[framepool] warning: {}", msg);
}
