//! Walks through the marshalling core against the in-memory test doubles.
//!
//! cargo run --example basic --features test-doubles

use std::sync::Arc;

use d3dx9_interop::query::{PipelineTimings, QueryKind};
use d3dx9_interop::records::{EffectDefault, EffectInstance, ShaderMacro, ShaderMacros};
use d3dx9_interop::testing::{MockBuffer, MockEffect, MockQuery};
use d3dx9_interop::{
    from_native, with_native, HResult, HandleFactory, HeapAllocator, InteropConfig, InteropError,
    InternCache, Matrix, ParameterAccessor, QueryReader, Vector4,
};
use tracing::info;
use tracing_subscriber::{filter::Directive, prelude::*, EnvFilter};

const CONFIG: &str = r#"
intern_names: true
shape_validation: strict
"#;

fn main() -> Result<(), InteropError> {
    let directive = "d3dx9-interop=debug"
        .parse::<Directive>()
        .map_err(|e| InteropError::Config(format!("log filter: {e}")))?;
    let filter = EnvFilter::new("info").add_directive(directive);
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(filter)
        .init();

    let config = InteropConfig::from_yaml(CONFIG)?;
    let allocator = HeapAllocator::shared();
    let cache = Arc::new(InternCache::new(&allocator));
    let handles = HandleFactory::new(Arc::clone(&cache), &config);

    // Records are marshalled for the duration of one native call
    let instance = EffectInstance {
        effect_filename: Some("skinned_mesh.fx".to_string()),
        defaults: vec![
            EffectDefault::floats("g_vDiffuse", &[1.0, 0.5, 0.25, 1.0]),
            EffectDefault::dword("g_nBones", 4),
        ],
    };
    let echoed: EffectInstance = with_native(&instance, &allocator, |native| {
        // SAFETY: the guard keeps every pointer in `native` alive here.
        unsafe { from_native(native) }
    })?;
    info!(
        name: "example.effect_instance",
        defaults = echoed.defaults.len(),
        round_trip = echoed == instance
    );

    let macros = ShaderMacros(vec![
        ShaderMacro::new("NUM_LIGHTS", "4"),
        ShaderMacro::flag("USE_FOG"),
    ]);
    let compile: Result<(), InteropError> = with_native(&macros, &allocator, |_list| {
        let diagnostics =
            MockBuffer::from_text("skinned_mesh.fx(12,5): error X3004: undeclared identifier");
        HResult::FAIL.check_with(Some(&diagnostics))
    });
    if let Err(err) = compile {
        info!(name: "example.compile_failed", error = %err);
    }

    // Typed parameter access
    let effect = MockEffect::new();
    effect.declare("g_mWorld", &Matrix::IDENTITY);
    let accessor = ParameterAccessor::new(&effect, &config);

    let world = handles.name("g_mWorld")?;
    accessor.set(&world, &Matrix::translation(0.0, 1.0, 0.0))?;
    let read: Matrix = accessor.get(&world)?;
    info!(name: "example.world", translation = ?read.m[3]);

    if let Err(err) = accessor.get::<Vector4>(&world) {
        info!(name: "example.shape_mismatch", error = %err);
    }

    let lights = handles.name("g_bLights")?;
    accessor.set_bools(&lights, &[true, false, true])?;
    info!(name: "example.lights", lights = ?accessor.get_bools(&lights, 3)?);

    // Asynchronous query polling
    let timings = PipelineTimings {
        vertex_processing_percent: 20.0,
        pixel_processing_percent: 55.0,
        other_gpu_processing_percent: 5.0,
        gpu_idle_percent: 20.0,
    };
    let query = MockQuery::new(QueryKind::PipelineTimings, &timings).ready_after(2);
    let reader = QueryReader::new(&query);
    reader.issue_begin()?;
    reader.issue_end()?;
    let result = loop {
        if let Some(result) = reader.get_data::<PipelineTimings>(true)? {
            break result;
        }
    };
    info!(
        name: "example.pipeline_timings",
        polls = query.polls(),
        pixel_percent = result.pixel_processing_percent
    );

    info!(name: "example.done", interned = cache.len());
    Ok(())
}
