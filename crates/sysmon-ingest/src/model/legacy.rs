/// Records decoded from the older producer layout.
///
/// This layout predates the sequence counter: it carries explicit GPU,
/// network-adapter, logical-disk and physical-disk sub-structures with
/// UTF-16 names, and floating-point measurements instead of tenths.
use serde::Serialize;

/// Snapshot decoded from the legacy layout.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LegacySnapshot {
    pub cpu: CpuInfo,
    pub memory: MemoryInfo,
    /// Overall CPU temperature reported by the producer, in °C.
    pub cpu_temperature: f64,
    /// Overall GPU temperature reported by the producer, in °C.
    pub gpu_temperature: f64,
    /// Interval of the producer's last CPU usage sample, in milliseconds.
    pub cpu_usage_sample_interval_ms: f64,
    pub gpus: Vec<GpuRecord>,
    pub adapters: Vec<NetworkAdapterRecord>,
    /// Logical volumes. `physical_disk` is resolved against `physical_disks`.
    pub logical_disks: Vec<LogicalDiskRecord>,
    pub physical_disks: Vec<PhysicalDiskRecord>,
    pub temperatures: Vec<TemperatureReading>,
    pub last_update: WireTime,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CpuInfo {
    pub name: Option<String>,
    pub physical_cores: u32,
    pub logical_cores: u32,
    pub performance_cores: u32,
    pub efficiency_cores: u32,
    pub usage_percent: f64,
    pub performance_core_mhz: f64,
    pub efficiency_core_mhz: f64,
    pub hyper_threading: bool,
    pub virtualization: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MemoryInfo {
    pub total_bytes: u64,
    pub used_bytes: u64,
    pub available_bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GpuRecord {
    pub name: Option<String>,
    pub brand: Option<String>,
    pub memory_bytes: u64,
    pub core_clock_mhz: f64,
    pub is_virtual: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NetworkAdapterRecord {
    pub name: Option<String>,
    pub mac: Option<String>,
    pub ip_address: Option<String>,
    pub adapter_type: Option<String>,
    /// Link speed in bits per second.
    pub speed_bps: u64,
}

/// A mounted volume identified by its drive letter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogicalDiskRecord {
    /// Upper-case drive letter, `None` when the producer left it blank.
    pub letter: Option<char>,
    pub label: Option<String>,
    pub file_system: Option<String>,
    pub total_bytes: u64,
    pub used_bytes: u64,
    pub free_bytes: u64,
    /// Index into [`LegacySnapshot::physical_disks`] of the owning disk.
    /// `None` when no physical disk claims this letter.
    pub physical_disk: Option<usize>,
}

/// A physical drive with its SMART data and the letters it hosts.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PhysicalDiskRecord {
    pub model: Option<String>,
    pub serial_number: Option<String>,
    pub firmware_version: Option<String>,
    pub interface_type: Option<String>,
    pub disk_type: Option<String>,
    pub capacity_bytes: u64,
    pub temperature: f64,
    pub health_percent: u8,
    pub is_system_disk: bool,
    pub smart_enabled: bool,
    pub smart_supported: bool,
    pub attributes: Vec<SmartAttribute>,
    pub power_on_hours: u64,
    pub power_cycle_count: u64,
    pub reallocated_sectors: u64,
    pub pending_sectors: u64,
    pub uncorrectable_errors: u64,
    pub wear_leveling: f64,
    pub total_bytes_written: u64,
    pub total_bytes_read: u64,
    /// Upper-case letters of the logical volumes hosted on this disk.
    pub drive_letters: Vec<char>,
    pub last_scan: WireTime,
}

/// One raw SMART attribute.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SmartAttribute {
    pub id: u8,
    pub flags: u8,
    pub current: u8,
    pub worst: u8,
    pub threshold: u8,
    pub raw_value: u64,
    pub name: Option<String>,
    pub description: Option<String>,
    pub is_critical: bool,
    pub physical_value: f64,
    pub units: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TemperatureReading {
    pub sensor_name: Option<String>,
    pub celsius: f64,
}

/// Calendar timestamp as written by the producer (`SYSTEMTIME` shape).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WireTime {
    pub year: u16,
    pub month: u16,
    pub day_of_week: u16,
    pub day: u16,
    pub hour: u16,
    pub minute: u16,
    pub second: u16,
    pub milliseconds: u16,
}

impl WireTime {
    /// Convert to a naive calendar time, `None` for the all-zero "never"
    /// value or any out-of-range component.
    pub fn to_naive(self) -> Option<chrono::NaiveDateTime> {
        chrono::NaiveDate::from_ymd_opt(i32::from(self.year), self.month.into(), self.day.into())?
            .and_hms_milli_opt(
                self.hour.into(),
                self.minute.into(),
                self.second.into(),
                self.milliseconds.into(),
            )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_wire_time_has_no_calendar_value() {
        assert_eq!(WireTime::default().to_naive(), None);
    }

    #[test]
    fn wire_time_converts_to_naive() {
        let t = WireTime {
            year: 2024,
            month: 3,
            day_of_week: 0,
            day: 17,
            hour: 9,
            minute: 30,
            second: 5,
            milliseconds: 250,
        };
        let naive = t.to_naive().unwrap();
        assert_eq!(naive.to_string(), "2024-03-17 09:30:05.250");
    }
}
