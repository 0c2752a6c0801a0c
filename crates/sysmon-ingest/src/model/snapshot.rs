/// Decoded telemetry records.
///
/// A [`Snapshot`] is built fresh from one raw copy of the shared region and is
/// never mutated afterwards. The two producer layouts decode into distinct
/// record types instead of one struct with optional fields.
use super::legacy::LegacySnapshot;
use serde::Serialize;

/// Which wire layout a snapshot was decoded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LayoutRevision {
    /// The packed, sequence-counted layout (ABI `0x0001_0014` and later minors).
    Current,
    /// The older layout with per-device sub-structures and UTF-16 names.
    Legacy,
}

impl LayoutRevision {
    /// Human-readable label.
    pub fn label(self) -> &'static str {
        match self {
            Self::Current => "current",
            Self::Legacy => "legacy",
        }
    }
}

/// One decoded telemetry record.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "revision", rename_all = "snake_case")]
pub enum Snapshot {
    Current(TelemetrySnapshot),
    Legacy(LegacySnapshot),
}

impl Snapshot {
    pub fn revision(&self) -> LayoutRevision {
        match self {
            Self::Current(_) => LayoutRevision::Current,
            Self::Legacy(_) => LayoutRevision::Legacy,
        }
    }

    /// ABI tag written by the producer. Legacy layouts carry none and report 0.
    pub fn abi_version(&self) -> u32 {
        match self {
            Self::Current(s) => s.abi_version,
            Self::Legacy(_) => 0,
        }
    }

    /// Producer write sequence. Legacy layouts have no counter and report 0.
    pub fn write_sequence(&self) -> u32 {
        match self {
            Self::Current(s) => s.write_sequence,
            Self::Legacy(_) => 0,
        }
    }

    pub fn cpu_logical_cores(&self) -> u32 {
        match self {
            Self::Current(s) => u32::from(s.cpu_logical_cores),
            Self::Legacy(s) => s.cpu.logical_cores,
        }
    }

    pub fn memory_total_bytes(&self) -> u64 {
        match self {
            Self::Current(s) => s.memory_total_bytes,
            Self::Legacy(s) => s.memory.total_bytes,
        }
    }

    pub fn memory_used_bytes(&self) -> u64 {
        match self {
            Self::Current(s) => s.memory_used_bytes,
            Self::Legacy(s) => s.memory.used_bytes,
        }
    }

    /// `true` when the consistency guard ran out of retries while the
    /// producer was still writing. The record may mix two producer writes.
    pub fn is_possibly_torn(&self) -> bool {
        match self {
            Self::Current(s) => s.possibly_torn,
            Self::Legacy(_) => false,
        }
    }

    pub(crate) fn mark_possibly_torn(&mut self) {
        if let Self::Current(s) = self {
            s.possibly_torn = true;
        }
    }

    pub fn as_current(&self) -> Option<&TelemetrySnapshot> {
        match self {
            Self::Current(s) => Some(s),
            Self::Legacy(_) => None,
        }
    }

    pub fn as_legacy(&self) -> Option<&LegacySnapshot> {
        match self {
            Self::Current(_) => None,
            Self::Legacy(s) => Some(s),
        }
    }
}

/// Snapshot decoded from the current packed layout.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TelemetrySnapshot {
    pub abi_version: u32,
    /// Producer-incremented seqlock counter. Even when the record is stable.
    /// Resets when the producer restarts.
    pub write_sequence: u32,
    /// Incremented by the producer on every full refresh.
    pub snapshot_version: u32,
    pub cpu_logical_cores: u16,
    /// Overall CPU usage in percent, `None` when the producer has no sample.
    pub cpu_usage_percent: Option<f64>,
    pub memory_total_bytes: u64,
    pub memory_used_bytes: u64,
    /// At most [`MAX_TEMPERATURE_SENSORS`](crate::layout::canonical::MAX_TEMPERATURE_SENSORS).
    pub temperature_sensors: Vec<TemperatureSensor>,
    /// At most [`MAX_SMART_DISKS`](crate::layout::canonical::MAX_SMART_DISKS).
    pub smart_disks: Vec<SmartDiskScore>,
    pub board: BoardIdentity,
    pub secure_boot_enabled: bool,
    pub tpm_present: bool,
    pub memory_slots_total: u16,
    pub memory_slots_used: u16,
    pub producer_flags: ProducerFlags,
    /// Opaque producer digest; not verified by this layer.
    pub integrity_hash: [u8; 32],
    /// See [`Snapshot::is_possibly_torn`].
    pub possibly_torn: bool,
}

impl TelemetrySnapshot {
    /// Memory not in use, saturating at zero when the producer reports
    /// `used > total`.
    pub fn memory_available_bytes(&self) -> u64 {
        self.memory_total_bytes.saturating_sub(self.memory_used_bytes)
    }

    /// Reading of the first sensor whose name mentions the CPU.
    pub fn cpu_temperature(&self) -> Option<f64> {
        self.first_reading(&["cpu"])
    }

    /// Reading of the first sensor whose name mentions the GPU.
    pub fn gpu_temperature(&self) -> Option<f64> {
        self.first_reading(&["gpu", "graphics"])
    }

    fn first_reading(&self, needles: &[&str]) -> Option<f64> {
        self.temperature_sensors.iter().find_map(|sensor| {
            let name = sensor.name.as_deref()?.to_ascii_lowercase();
            if needles.iter().any(|n| name.contains(n)) {
                sensor.value_celsius
            } else {
                None
            }
        })
    }
}

/// One entry of the temperature sensor table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TemperatureSensor {
    pub name: Option<String>,
    /// `None` when the producer wrote the "unavailable" sentinel.
    pub value_celsius: Option<f64>,
    /// Flags bit 0.
    pub valid: bool,
    /// Flags bit 1: the last sample crossed the urgent threshold.
    pub urgent_last: bool,
}

/// SMART health summary for one disk.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SmartDiskScore {
    pub disk_id: Option<String>,
    /// Health score 0–100.
    pub score: Option<u8>,
    pub hours_on: u32,
    /// Wear 0–100 (SSDs).
    pub wear_percent: Option<u8>,
    pub reallocated: u16,
    pub pending: u16,
    pub uncorrectable: u16,
    pub temperature_celsius: Option<i16>,
    pub growth: SmartGrowth,
}

/// Recent-growth trend flags reported with a SMART score.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SmartGrowth {
    /// Bit 0: reallocated sector count increased.
    pub reallocated_growth: bool,
    /// Bit 1: wear jumped since the previous scan.
    pub wear_spike: bool,
}

impl SmartGrowth {
    pub fn from_bits(bits: u8) -> Self {
        Self {
            reallocated_growth: bits & 0x01 != 0,
            wear_spike: bits & 0x02 != 0,
        }
    }

    pub fn bits(self) -> u8 {
        u8::from(self.reallocated_growth) | (u8::from(self.wear_spike) << 1)
    }
}

/// Baseboard and firmware identity strings. Absent strings are `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BoardIdentity {
    pub manufacturer: Option<String>,
    pub product: Option<String>,
    pub version: Option<String>,
    pub serial: Option<String>,
    pub bios_vendor: Option<String>,
    pub bios_version: Option<String>,
    pub bios_date: Option<String>,
}

/// Producer status bits carried in the first byte of the reserved block.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProducerFlags {
    /// The producer is running with some collectors disabled.
    pub degrade_mode: bool,
    /// The producer's own integrity hash check failed.
    pub hash_mismatch: bool,
    /// The producer noticed its write sequence stalling.
    pub sequence_stall_warn: bool,
}

impl ProducerFlags {
    pub fn from_bits(bits: u8) -> Self {
        Self {
            degrade_mode: bits & 0x01 != 0,
            hash_mismatch: bits & 0x02 != 0,
            sequence_stall_warn: bits & 0x04 != 0,
        }
    }

    pub fn bits(self) -> u8 {
        u8::from(self.degrade_mode)
            | (u8::from(self.hash_mismatch) << 1)
            | (u8::from(self.sequence_stall_warn) << 2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sensor(name: &str, value: Option<f64>) -> TemperatureSensor {
        TemperatureSensor {
            name: Some(name.to_owned()),
            value_celsius: value,
            valid: value.is_some(),
            urgent_last: false,
        }
    }

    fn snapshot_with(sensors: Vec<TemperatureSensor>) -> TelemetrySnapshot {
        TelemetrySnapshot {
            abi_version: 0x0001_0014,
            write_sequence: 2,
            snapshot_version: 1,
            cpu_logical_cores: 8,
            cpu_usage_percent: None,
            memory_total_bytes: 100,
            memory_used_bytes: 140,
            temperature_sensors: sensors,
            smart_disks: Vec::new(),
            board: BoardIdentity::default(),
            secure_boot_enabled: false,
            tpm_present: false,
            memory_slots_total: 0,
            memory_slots_used: 0,
            producer_flags: ProducerFlags::default(),
            integrity_hash: [0; 32],
            possibly_torn: false,
        }
    }

    #[test]
    fn available_memory_saturates() {
        assert_eq!(snapshot_with(Vec::new()).memory_available_bytes(), 0);
    }

    #[test]
    fn cpu_and_gpu_temperatures_come_from_named_sensors() {
        let snap = snapshot_with(vec![
            sensor("Motherboard", Some(30.0)),
            sensor("CPU Package", None),
            sensor("cpu core #1", Some(55.5)),
            sensor("Graphics Core", Some(61.0)),
        ]);
        assert_eq!(snap.cpu_temperature(), Some(55.5));
        assert_eq!(snap.gpu_temperature(), Some(61.0));
    }

    #[test]
    fn flag_bytes_round_trip_through_structs() {
        let flags = ProducerFlags::from_bits(0b101);
        assert!(flags.degrade_mode && !flags.hash_mismatch && flags.sequence_stall_warn);
        assert_eq!(flags.bits(), 0b101);
        assert_eq!(SmartGrowth::from_bits(0b10).bits(), 0b10);
    }

    #[test]
    fn torn_mark_only_applies_to_current_layout() {
        let mut snap = Snapshot::Current(snapshot_with(Vec::new()));
        assert!(!snap.is_possibly_torn());
        snap.mark_possibly_torn();
        assert!(snap.is_possibly_torn());
    }
}
