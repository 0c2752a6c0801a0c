/// Data model for decoded telemetry.
///
/// Re-exports the snapshot records for both producer layouts, the
/// diagnostics message type, and disk ownership reconciliation.
pub mod diagnostic;
pub mod disks;
pub mod legacy;
pub mod snapshot;

pub use diagnostic::{DiagnosticSnapshot, FieldOffsets, OffsetMismatch};
pub use disks::reconcile_disk_ownership;
pub use legacy::{
    CpuInfo, GpuRecord, LegacySnapshot, LogicalDiskRecord, MemoryInfo, NetworkAdapterRecord,
    PhysicalDiskRecord, SmartAttribute, TemperatureReading, WireTime,
};
pub use snapshot::{
    BoardIdentity, LayoutRevision, ProducerFlags, SmartDiskScore, SmartGrowth, Snapshot,
    TelemetrySnapshot, TemperatureSensor,
};
