//! Run this stress test using `cargo run --bin intern_cache --release -- <num-of-threads>`.
//!
//! Every worker resolves parameter names through one shared `InternCache`,
//! mostly hitting existing entries, the way a render loop looks up effect
//! parameters each frame.

use d3dx9_interop::{EffectHandle, HeapAllocator, InternCache};
use std::hint::black_box;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{prelude::*, EnvFilter};
mod throughput;

const PARAMETERS: [&str; 8] = [
    "g_mWorld",
    "g_mView",
    "g_mProjection",
    "g_mWorldViewProj",
    "g_vLightDir",
    "g_vEye",
    "g_fTime",
    "g_bFog",
];

fn main() {
    let filter = EnvFilter::new("info");
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_filter(filter))
        .init();

    let allocator = HeapAllocator::shared();
    let cache = Arc::new(InternCache::new(&allocator));

    println!("Starting stress test for InternCache...");
    throughput::test_throughput(|worker| {
        let name = PARAMETERS[worker % PARAMETERS.len()];
        if let Ok(handle) = EffectHandle::interned(name, &cache) {
            black_box(handle.as_raw());
        }
    });
    info!(name: "stress.intern_cache.done", interned = cache.len());
    println!("Stress test completed.");
}
