//! Asynchronous query results (`IDirect3DQuery9`).
//!
//! Unlike the generic parameter path, every read here is checked against a
//! table of the result type each query kind produces.

use std::any::type_name;
use std::ffi::c_void;
use std::fmt;
use std::mem::size_of;
use std::ptr;

use bytemuck::{Pod, Zeroable};
use tracing::debug;

use crate::error::{InteropError, Result};
use crate::hresult::HResult;
use crate::math::Bool32;

/// `D3DISSUE_END`
pub const ISSUE_END: u32 = 1 << 0;
/// `D3DISSUE_BEGIN`
pub const ISSUE_BEGIN: u32 = 1 << 1;
/// `D3DGETDATA_FLUSH`
pub const GETDATA_FLUSH: u32 = 1 << 0;

/// `D3DQUERYTYPE`, restricted to the kinds that return data
#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum QueryKind {
    /// Vertex cache layout of the driver
    VCache = 4,
    /// Managed resource statistics
    ResourceManager = 5,
    /// Triangles rendered and clipped
    VertexStats = 6,
    /// Completion of all prior commands
    Event = 8,
    /// Pixels that passed the depth and stencil tests
    Occlusion = 9,
    /// GPU clock value
    Timestamp = 10,
    /// Whether timestamps in the bracket are comparable
    TimestampDisjoint = 11,
    /// Ticks per second of the timestamp clock
    TimestampFrequency = 12,
    /// Share of time spent in each pipeline stage
    PipelineTimings = 13,
    /// Time the application spent waiting on the GPU
    InterfaceTimings = 14,
    /// Vertex shader memory and computation time
    VertexTimings = 15,
    /// Pixel shader memory and computation time
    PixelTimings = 16,
    /// Bandwidth and throughput utilization
    BandwidthTimings = 17,
    /// Texture and vertex cache hit rates
    CacheUtilization = 18,
    /// `D3DQUERYTYPE_MEMORYPRESSURE`, Direct3D 9Ex devices only
    MemoryPressure = 19,
}

impl QueryKind {
    /// Every kind, in native value order
    pub const ALL: [QueryKind; 15] = [
        QueryKind::VCache,
        QueryKind::ResourceManager,
        QueryKind::VertexStats,
        QueryKind::Event,
        QueryKind::Occlusion,
        QueryKind::Timestamp,
        QueryKind::TimestampDisjoint,
        QueryKind::TimestampFrequency,
        QueryKind::PipelineTimings,
        QueryKind::InterfaceTimings,
        QueryKind::VertexTimings,
        QueryKind::PixelTimings,
        QueryKind::BandwidthTimings,
        QueryKind::CacheUtilization,
        QueryKind::MemoryPressure,
    ];

    /// Size in bytes of the result the native side writes for this kind
    pub const fn result_size(self) -> usize {
        match self {
            QueryKind::VCache => size_of::<VCacheInfo>(),
            QueryKind::ResourceManager => size_of::<ResourceManagerInfo>(),
            QueryKind::VertexStats => size_of::<VertexStatsInfo>(),
            QueryKind::Event | QueryKind::TimestampDisjoint => size_of::<Bool32>(),
            QueryKind::Occlusion => size_of::<u32>(),
            QueryKind::Timestamp | QueryKind::TimestampFrequency => size_of::<u64>(),
            QueryKind::PipelineTimings => size_of::<PipelineTimings>(),
            QueryKind::InterfaceTimings => size_of::<InterfaceTimings>(),
            QueryKind::VertexTimings | QueryKind::PixelTimings => size_of::<StageTimings>(),
            QueryKind::BandwidthTimings => size_of::<BandwidthTimings>(),
            QueryKind::CacheUtilization => size_of::<CacheUtilization>(),
            QueryKind::MemoryPressure => size_of::<MemoryPressure>(),
        }
    }

    /// Event, timestamp and device info queries only accept `ISSUE_END`
    pub const fn supports_begin(self) -> bool {
        !matches!(
            self,
            QueryKind::VCache
                | QueryKind::ResourceManager
                | QueryKind::VertexStats
                | QueryKind::Event
                | QueryKind::Timestamp
                | QueryKind::TimestampFrequency
        )
    }
}

impl TryFrom<u32> for QueryKind {
    type Error = InteropError;

    fn try_from(value: u32) -> Result<Self> {
        QueryKind::ALL
            .into_iter()
            .find(|kind| *kind as u32 == value)
            .ok_or_else(|| InteropError::InvalidArgument(format!("unknown query type {value}")))
    }
}

impl fmt::Display for QueryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// `D3DDEVINFO_VCACHE`
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct VCacheInfo {
    /// Bit pattern, `CACH` when the cache is known
    pub pattern: u32,
    /// 0 for longest strips, 1 for vertex cache
    pub opt_method: u32,
    /// Entries in the cache
    pub cache_size: u32,
    /// Restart threshold used by strip optimizers
    pub magic_number: u32,
}

/// `D3DRESOURCESTATS`
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct ResourceStats {
    /// Resources were evicted and reloaded in the same frame
    pub thrashing: Bool32,
    /// Approximate bytes downloaded by the resource manager
    pub approx_bytes_downloaded: u32,
    /// Objects evicted from video memory
    pub num_evicts: u32,
    /// Objects created in video memory
    pub num_vid_creates: u32,
    /// Priority of the last evicted object
    pub last_pri: u32,
    /// Objects set on the device this frame
    pub num_used: u32,
    /// Of those, objects already in video memory
    pub num_used_in_vid_mem: u32,
    /// Objects in video memory
    pub working_set: u32,
    /// Bytes in video memory
    pub working_set_bytes: u32,
    /// Managed objects in total
    pub total_managed: u32,
    /// Managed bytes in total
    pub total_bytes: u32,
}

/// `D3DDEVINFO_RESOURCEMANAGER`, one entry per resource type
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct ResourceManagerInfo {
    /// Indexed by `D3DRESOURCETYPE` minus one
    pub stats: [ResourceStats; 8],
}

/// `D3DDEVINFO_D3DVERTEXSTATS`
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct VertexStatsInfo {
    /// Triangles sent to the rasterizer
    pub num_rendered_triangles: u32,
    /// Extra triangles produced by clipping
    pub num_extra_clipping_triangles: u32,
}

/// `D3DDEVINFO_D3D9PIPELINETIMINGS`
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct PipelineTimings {
    /// Vertex processing
    pub vertex_processing_percent: f32,
    /// Pixel processing
    pub pixel_processing_percent: f32,
    /// Other GPU work
    pub other_gpu_processing_percent: f32,
    /// GPU idle
    pub gpu_idle_percent: f32,
}

/// `D3DDEVINFO_D3D9INTERFACETIMINGS`
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct InterfaceTimings {
    /// Waiting for the GPU to release a resource the application locked
    pub waiting_for_gpu_to_use_application_resource_percent: f32,
    /// Waiting for room in the command buffer
    pub waiting_for_gpu_to_accept_more_commands_percent: f32,
    /// Throttled to keep frame latency bounded
    pub waiting_for_gpu_to_stay_within_latency_percent: f32,
    /// Waiting for a resource the GPU holds exclusively
    pub waiting_for_gpu_exclusive_resource_percent: f32,
    /// Waiting for any other reason
    pub waiting_for_gpu_other_percent: f32,
}

/// `D3DDEVINFO_D3D9STAGETIMINGS`, shared by vertex and pixel timing queries
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct StageTimings {
    /// Memory access
    pub memory_processing_percent: f32,
    /// Shader computation
    pub computation_processing_percent: f32,
}

/// `D3DDEVINFO_D3D9BANDWIDTHTIMINGS`
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct BandwidthTimings {
    /// Peak bandwidth as a fraction of the theoretical maximum
    pub max_bandwidth_utilized: f32,
    /// Front end upload memory in use
    pub front_end_upload_memory_utilized_percent: f32,
    /// Vertex throughput
    pub vertex_rate_utilized_percent: f32,
    /// Triangle setup throughput
    pub triangle_setup_rate_utilized_percent: f32,
    /// Fill rate
    pub fill_rate_utilized_percent: f32,
}

/// `D3DDEVINFO_D3D9CACHEUTILIZATION`
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct CacheUtilization {
    /// Texture cache hit rate
    pub texture_cache_hit_rate: f32,
    /// Post-transform vertex cache hit rate
    pub post_transform_vertex_cache_hit_rate: f32,
}

/// `D3DMEMORYPRESSURE`
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct MemoryPressure {
    /// Bytes evicted from the process since the query began
    pub bytes_evicted_from_process: u64,
    /// Extra bytes spent on allocations that could not be placed efficiently
    pub size_of_inefficient_allocation: u64,
    /// Efficiency of memory usage, in percent
    pub level_of_efficiency: u32,
    _padding: u32,
}

impl MemoryPressure {
    /// Builds a result with the trailing padding zeroed
    pub fn new(
        bytes_evicted_from_process: u64,
        size_of_inefficient_allocation: u64,
        level_of_efficiency: u32,
    ) -> Self {
        MemoryPressure {
            bytes_evicted_from_process,
            size_of_inefficient_allocation,
            level_of_efficiency,
            _padding: 0,
        }
    }
}

/// A value a query can be read into, with the kinds that produce it.
pub trait QueryData: Pod {
    /// Kinds whose result has exactly this layout
    const KINDS: &'static [QueryKind];
}

impl QueryData for Bool32 {
    const KINDS: &'static [QueryKind] = &[QueryKind::Event, QueryKind::TimestampDisjoint];
}

impl QueryData for u32 {
    const KINDS: &'static [QueryKind] = &[QueryKind::Occlusion];
}

impl QueryData for u64 {
    const KINDS: &'static [QueryKind] = &[QueryKind::Timestamp, QueryKind::TimestampFrequency];
}

impl QueryData for VCacheInfo {
    const KINDS: &'static [QueryKind] = &[QueryKind::VCache];
}

impl QueryData for ResourceManagerInfo {
    const KINDS: &'static [QueryKind] = &[QueryKind::ResourceManager];
}

impl QueryData for VertexStatsInfo {
    const KINDS: &'static [QueryKind] = &[QueryKind::VertexStats];
}

impl QueryData for PipelineTimings {
    const KINDS: &'static [QueryKind] = &[QueryKind::PipelineTimings];
}

impl QueryData for InterfaceTimings {
    const KINDS: &'static [QueryKind] = &[QueryKind::InterfaceTimings];
}

impl QueryData for StageTimings {
    const KINDS: &'static [QueryKind] = &[QueryKind::VertexTimings, QueryKind::PixelTimings];
}

impl QueryData for BandwidthTimings {
    const KINDS: &'static [QueryKind] = &[QueryKind::BandwidthTimings];
}

impl QueryData for MemoryPressure {
    const KINDS: &'static [QueryKind] = &[QueryKind::MemoryPressure];
}

impl QueryData for CacheUtilization {
    const KINDS: &'static [QueryKind] = &[QueryKind::CacheUtilization];
}

/// The native query object
pub trait NativeQuery {
    /// `GetType`
    fn kind(&self) -> QueryKind;

    /// `GetDataSize`, in bytes
    fn data_size(&self) -> u32;

    /// `Issue` with `ISSUE_BEGIN` or `ISSUE_END`
    fn issue(&self, flags: u32) -> HResult;

    /// Returns `S_FALSE` while the result is pending. A null `data` with a
    /// zero `size` only polls.
    ///
    /// # Safety
    /// `data` must be null or writable for `size` bytes.
    unsafe fn get_data(&self, data: *mut c_void, size: u32, flags: u32) -> HResult;
}

/// Typed, validated reads from a [`NativeQuery`]
#[derive(Debug)]
pub struct QueryReader<'a, Q: ?Sized> {
    query: &'a Q,
}

impl<'a, Q: NativeQuery + ?Sized> QueryReader<'a, Q> {
    /// Wraps a native query
    pub fn new(query: &'a Q) -> Self {
        QueryReader { query }
    }

    /// Kind reported by the native query
    pub fn kind(&self) -> QueryKind {
        self.query.kind()
    }

    /// `Ok(None)` while the result is still pending.
    pub fn get_data<T: QueryData>(&self, flush: bool) -> Result<Option<T>> {
        let kind = self.query.kind();
        if !T::KINDS.contains(&kind) {
            return Err(InteropError::InvalidArgument(format!(
                "{} cannot hold the result of a {kind} query",
                type_name::<T>()
            )));
        }

        let mut value = T::zeroed();
        // SAFETY: `value` is a live T, and the kind check above guarantees
        // the native result has exactly its size.
        let ready = unsafe {
            self.query.get_data(
                (&mut value as *mut T).cast(),
                size_of::<T>() as u32,
                flags(flush),
            )
        }
        .check_ready()?;

        if !ready {
            debug!(
                name: "query.pending",
                target: "d3dx9-interop",
                kind = %kind
            );
            return Ok(None);
        }
        Ok(Some(value))
    }

    /// Polls without reading the result
    pub fn is_ready(&self, flush: bool) -> Result<bool> {
        // SAFETY: a null destination with size 0 is the documented poll form.
        unsafe { self.query.get_data(ptr::null_mut(), 0, flags(flush)) }.check_ready()
    }

    /// Opens the measured bracket. Fails before the native call for kinds
    /// that accept only `ISSUE_END`.
    pub fn issue_begin(&self) -> Result<()> {
        let kind = self.query.kind();
        if !kind.supports_begin() {
            return Err(InteropError::InvalidArgument(format!(
                "{kind} queries cannot be issued with begin"
            )));
        }
        self.query.issue(ISSUE_BEGIN).check()
    }

    /// Closes the bracket, or signals the query for END-only kinds
    pub fn issue_end(&self) -> Result<()> {
        self.query.issue(ISSUE_END).check()
    }
}

fn flags(flush: bool) -> u32 {
    if flush {
        GETDATA_FLUSH
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockQuery;

    fn table() -> Vec<(&'static [QueryKind], usize)> {
        vec![
            (Bool32::KINDS, size_of::<Bool32>()),
            (u32::KINDS, size_of::<u32>()),
            (u64::KINDS, size_of::<u64>()),
            (VCacheInfo::KINDS, size_of::<VCacheInfo>()),
            (ResourceManagerInfo::KINDS, size_of::<ResourceManagerInfo>()),
            (VertexStatsInfo::KINDS, size_of::<VertexStatsInfo>()),
            (PipelineTimings::KINDS, size_of::<PipelineTimings>()),
            (InterfaceTimings::KINDS, size_of::<InterfaceTimings>()),
            (StageTimings::KINDS, size_of::<StageTimings>()),
            (BandwidthTimings::KINDS, size_of::<BandwidthTimings>()),
            (CacheUtilization::KINDS, size_of::<CacheUtilization>()),
            (MemoryPressure::KINDS, size_of::<MemoryPressure>()),
        ]
    }

    #[test]
    fn test_every_kind_has_exactly_one_result_type() {
        let table = table();
        for kind in QueryKind::ALL {
            let owners: Vec<usize> = table
                .iter()
                .filter(|(kinds, _)| kinds.contains(&kind))
                .map(|(_, size)| *size)
                .collect();
            assert_eq!(owners.len(), 1, "{kind} must map to one result type");
            assert_eq!(owners[0], kind.result_size(), "{kind} result size");
        }
        let mapped: usize = table.iter().map(|(kinds, _)| kinds.len()).sum();
        assert_eq!(mapped, QueryKind::ALL.len());
    }

    #[test]
    fn test_native_result_sizes() {
        assert_eq!(QueryKind::VCache.result_size(), 16);
        assert_eq!(QueryKind::ResourceManager.result_size(), 352);
        assert_eq!(QueryKind::VertexStats.result_size(), 8);
        assert_eq!(QueryKind::TimestampFrequency.result_size(), 8);
        assert_eq!(QueryKind::InterfaceTimings.result_size(), 20);
        assert_eq!(QueryKind::CacheUtilization.result_size(), 8);
        assert_eq!(QueryKind::MemoryPressure.result_size(), 24);
    }

    #[test]
    fn test_kind_from_native_value() {
        assert_eq!(QueryKind::try_from(12).unwrap(), QueryKind::TimestampFrequency);
        assert_eq!(QueryKind::try_from(19).unwrap(), QueryKind::MemoryPressure);
        assert!(QueryKind::try_from(7).is_err());
        assert!(QueryKind::try_from(20).is_err());
        for kind in QueryKind::ALL {
            assert_eq!(QueryKind::try_from(kind as u32).unwrap(), kind);
        }
    }

    #[test]
    fn test_timestamp_frequency_reads_u64() {
        let query = MockQuery::new(QueryKind::TimestampFrequency, &1_000_000_000u64);
        let reader = QueryReader::new(&query);
        assert_eq!(reader.get_data::<u64>(true).unwrap(), Some(1_000_000_000));
    }

    #[test]
    fn test_pending_result_is_not_an_error() {
        let query = MockQuery::new(QueryKind::Occlusion, &1234u32).ready_after(2);
        let reader = QueryReader::new(&query);

        assert_eq!(reader.get_data::<u32>(true).unwrap(), None);
        assert!(!reader.is_ready(true).unwrap());
        assert_eq!(reader.get_data::<u32>(true).unwrap(), Some(1234));
        assert_eq!(query.polls(), 3);
        assert_eq!(query.flags(), vec![GETDATA_FLUSH; 3]);
    }

    #[test]
    fn test_type_mismatch_names_type_and_kind() {
        let query = MockQuery::new(QueryKind::Occlusion, &1u32);
        let reader = QueryReader::new(&query);

        match reader.get_data::<u64>(false) {
            Err(InteropError::InvalidArgument(message)) => {
                assert!(message.contains("u64"));
                assert!(message.contains("Occlusion"));
            }
            other => panic!("Expected a shape error, got {other:?}"),
        }
        assert_eq!(query.polls(), 0);
    }

    #[test]
    fn test_failure_is_surfaced() {
        let query = MockQuery::new(QueryKind::Event, &Bool32::TRUE).failing(HResult::DEVICE_LOST);
        let reader = QueryReader::new(&query);
        let err = reader.get_data::<Bool32>(false).unwrap_err();
        assert_eq!(err.native_code(), Some(HResult::DEVICE_LOST));
    }

    #[test]
    fn test_issue_flags() {
        let occlusion = MockQuery::new(QueryKind::Occlusion, &0u32);
        let reader = QueryReader::new(&occlusion);
        reader.issue_begin().unwrap();
        reader.issue_end().unwrap();
        assert_eq!(occlusion.issued(), vec![ISSUE_BEGIN, ISSUE_END]);

        let event = MockQuery::new(QueryKind::Event, &Bool32::TRUE);
        let reader = QueryReader::new(&event);
        assert!(reader.issue_begin().is_err());
        reader.issue_end().unwrap();
        assert_eq!(event.issued(), vec![ISSUE_END]);

        for kind in [
            QueryKind::VCache,
            QueryKind::ResourceManager,
            QueryKind::VertexStats,
        ] {
            let info = MockQuery::new(kind, &[0u8; 4]);
            let reader = QueryReader::new(&info);
            assert!(reader.issue_begin().is_err(), "{kind} accepts only end");
            reader.issue_end().unwrap();
            assert_eq!(info.issued(), vec![ISSUE_END]);
        }
    }

    #[test]
    fn test_memory_pressure_result() {
        let pressure = MemoryPressure::new(4096, 512, 87);
        let query = MockQuery::new(QueryKind::MemoryPressure, &pressure);
        let reader = QueryReader::new(&query);
        assert!(reader.issue_begin().is_ok());
        assert_eq!(reader.get_data::<MemoryPressure>(true).unwrap(), Some(pressure));
        assert!(reader.get_data::<u64>(true).is_err());
    }

    #[test]
    fn test_structured_result() {
        let timings = StageTimings {
            memory_processing_percent: 40.0,
            computation_processing_percent: 60.0,
        };
        let query = MockQuery::new(QueryKind::PixelTimings, &timings);
        let reader = QueryReader::new(&query);
        assert_eq!(reader.get_data::<StageTimings>(false).unwrap(), Some(timings));
        assert_eq!(query.flags(), vec![0]);
    }
}
