//! Run this stress test using `cargo run --bin marshal --release -- <num-of-threads>`.
//!
//! Marshals an effect instance around a simulated native call on every
//! iteration and checks at the end that no unmanaged block leaked.

use d3dx9_interop::records::{EffectDefault, EffectInstance};
use d3dx9_interop::{from_native, with_native, SharedAllocator, TrackingAllocator};
use std::hint::black_box;
use tracing::{error, info};
use tracing_subscriber::{prelude::*, EnvFilter};
mod throughput;

fn effect_instance() -> EffectInstance {
    EffectInstance {
        effect_filename: Some("skinned_mesh.fx".to_string()),
        defaults: vec![
            EffectDefault::floats("g_vDiffuse", &[1.0, 0.5, 0.25, 1.0]),
            EffectDefault::dword("g_nBones", 4),
            EffectDefault::floats("g_fSpecularPower", &[32.0]),
        ],
    }
}

fn main() {
    let filter = EnvFilter::new("info");
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_filter(filter))
        .init();

    let tracker = TrackingAllocator::new();
    let allocator: SharedAllocator = tracker.clone();
    let instance = effect_instance();

    println!("Starting stress test for the struct marshaller...");
    throughput::test_throughput(|_| {
        let echoed = with_native(&instance, &allocator, |native| {
            // SAFETY: the native record stays marshalled for the closure.
            unsafe { from_native::<EffectInstance>(native) }
        });
        if let Ok(echoed) = echoed {
            black_box(echoed);
        }
    });

    let live = tracker.live_allocations();
    if live == 0 {
        info!(
            name: "stress.marshal.done",
            allocations = tracker.allocations(),
            releases = tracker.releases()
        );
    } else {
        error!(name: "stress.marshal.leak", live_allocations = live);
    }
    println!("Stress test completed.");
}
