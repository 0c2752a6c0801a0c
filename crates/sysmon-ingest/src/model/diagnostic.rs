/// Diagnostics messages received on the out-of-band stream.
///
/// The producer describes the snapshot it last wrote: header counters, its
/// own view of the layout offsets, and any log lines queued since the last
/// message. Every field is optional on the wire.
use crate::layout::canonical;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DiagnosticSnapshot {
    /// Producer wall clock, milliseconds since the Unix epoch.
    pub timestamp: i64,
    pub abi_version: u32,
    pub write_sequence: u32,
    pub snapshot_version: u32,
    pub cpu_logical_cores: u16,
    #[serde(rename = "memoryTotalMB")]
    pub memory_total_mb: u64,
    #[serde(rename = "memoryUsedMB")]
    pub memory_used_mb: u64,
    /// Total block size the producer was compiled with.
    pub expected_size: i32,
    pub offsets: FieldOffsets,
    #[serde(deserialize_with = "log_lines")]
    pub logs: Vec<String>,
}

/// Byte offsets of each field group, as seen by the producer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FieldOffsets {
    pub temp_sensors: i32,
    pub temp_sensor_count: i32,
    pub smart_disks: i32,
    pub smart_disk_count: i32,
    pub future_reserved: i32,
    pub sharedmem_hash: i32,
    pub extension_pad: i32,
    /// Groups this reader has no fixed expectation for (e.g. newer producers).
    #[serde(flatten)]
    pub other: BTreeMap<String, i64>,
}

/// A producer offset that disagrees with the canonical layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OffsetMismatch {
    pub field: &'static str,
    pub expected: i64,
    pub reported: i64,
}

impl DiagnosticSnapshot {
    /// Producer timestamp as a UTC date-time, `None` if out of range.
    pub fn produced_at(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        chrono::DateTime::from_timestamp_millis(self.timestamp)
    }

    /// Compare the producer's reported layout against the canonical one.
    ///
    /// Only meaningful for producers speaking the current ABI major; a
    /// non-empty result means the two sides were built from different
    /// layout definitions. A producer that reports `usbDevices` is checked
    /// against the USB-extended block instead, whose trailing pad and total
    /// size differ from the base layout.
    pub fn layout_mismatches(&self) -> Vec<OffsetMismatch> {
        let o = &self.offsets;
        let usb_devices = o.other.get("usbDevices").copied();
        let (pad, size) = match usb_devices {
            Some(_) => (canonical::OFF_USB_EXTENSION_PAD, canonical::USB_EXTENDED_SIZE),
            None => (canonical::OFF_EXTENSION_PAD, canonical::TOTAL_SIZE),
        };

        let mut reported = vec![
            ("expectedSize", i64::from(self.expected_size), size),
            ("tempSensors", i64::from(o.temp_sensors), canonical::OFF_TEMP_SENSORS),
            ("tempSensorCount", i64::from(o.temp_sensor_count), canonical::OFF_TEMP_SENSOR_COUNT),
            ("smartDisks", i64::from(o.smart_disks), canonical::OFF_SMART_DISKS),
            ("smartDiskCount", i64::from(o.smart_disk_count), canonical::OFF_SMART_DISK_COUNT),
            ("futureReserved", i64::from(o.future_reserved), canonical::OFF_FUTURE_RESERVED),
            ("sharedmemHash", i64::from(o.sharedmem_hash), canonical::OFF_SHAREDMEM_HASH),
            ("extensionPad", i64::from(o.extension_pad), pad),
        ];
        if let Some(devices) = usb_devices {
            let count = o.other.get("usbDeviceCount").copied().unwrap_or_default();
            reported.push(("usbDevices", devices, canonical::OFF_USB_DEVICES));
            reported.push(("usbDeviceCount", count, canonical::OFF_USB_DEVICE_COUNT));
        }

        reported
            .into_iter()
            .filter(|&(_, got, want)| got != want as i64)
            .map(|(field, got, want)| OffsetMismatch {
                field,
                expected: want as i64,
                reported: got,
            })
            .collect()
    }
}

/// Log entries are normally strings; anything else is kept as its JSON text.
fn log_lines<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let values = Option::<Vec<serde_json::Value>>::deserialize(deserializer)?;
    Ok(values
        .unwrap_or_default()
        .into_iter()
        .map(|v| match v {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    const PRODUCER_JSON: &str = r#"{
        "timestamp": 1700000000123,
        "abiVersion": 65556,
        "writeSequence": 42,
        "snapshotVersion": 7,
        "cpuLogicalCores": 16,
        "memoryTotalMB": 32768,
        "memoryUsedMB": 12000,
        "expectedSize": 2653,
        "offsets": {
            "tempSensors": 36, "tempSensorCount": 1156,
            "smartDisks": 1158, "smartDiskCount": 1942,
            "futureReserved": 2429, "sharedmemHash": 2493,
            "extensionPad": 2525
        },
        "logs": ["sensor scan ok", {"code": 3}]
    }"#;

    #[test]
    fn parses_producer_message() {
        let snap: DiagnosticSnapshot = serde_json::from_str(PRODUCER_JSON).unwrap();
        assert_eq!(snap.abi_version, 0x0001_0014);
        assert_eq!(snap.write_sequence, 42);
        assert_eq!(snap.memory_total_mb, 32768);
        assert_eq!(snap.offsets.smart_disk_count, 1942);
        assert_eq!(snap.logs, vec!["sensor scan ok".to_owned(), r#"{"code":3}"#.to_owned()]);
        assert!(snap.layout_mismatches().is_empty());
        assert_eq!(snap.produced_at().unwrap().timestamp_millis(), 1_700_000_000_123);
    }

    #[test]
    fn missing_fields_default() {
        let snap: DiagnosticSnapshot = serde_json::from_str(r#"{"timestamp": 5}"#).unwrap();
        assert_eq!(snap.timestamp, 5);
        assert!(snap.logs.is_empty());
        assert_eq!(snap.offsets, FieldOffsets::default());
    }

    #[test]
    fn unknown_offsets_are_preserved() {
        let snap: DiagnosticSnapshot = serde_json::from_str(
            r#"{"offsets": {"usbDevices": 2525, "usbDeviceCount": 3093}}"#,
        )
        .unwrap();
        assert_eq!(snap.offsets.other.get("usbDevices"), Some(&2525));
        assert_eq!(snap.offsets.other.get("usbDeviceCount"), Some(&3093));
    }

    /// Offsets as published by a producer with the USB extension compiled in.
    #[test]
    fn usb_extended_producer_layout_is_accepted() {
        let snap: DiagnosticSnapshot = serde_json::from_str(
            r#"{
                "expectedSize": 3212,
                "offsets": {
                    "tempSensors": 36, "tempSensorCount": 1156,
                    "smartDisks": 1158, "smartDiskCount": 1942,
                    "futureReserved": 2429, "sharedmemHash": 2493,
                    "usbDevices": 2525, "usbDeviceCount": 3093,
                    "extensionPad": 3094
                }
            }"#,
        )
        .unwrap();
        assert!(snap.layout_mismatches().is_empty());
    }

    #[test]
    fn usb_extended_producer_with_moved_count_is_reported() {
        let mut snap: DiagnosticSnapshot = serde_json::from_str(PRODUCER_JSON).unwrap();
        snap.expected_size = 3212;
        snap.offsets.extension_pad = 3094;
        snap.offsets.other.insert("usbDevices".into(), 2525);
        snap.offsets.other.insert("usbDeviceCount".into(), 3000);
        let mismatches = snap.layout_mismatches();
        assert_eq!(mismatches.len(), 1);
        assert_eq!(mismatches[0].field, "usbDeviceCount");
        assert_eq!(mismatches[0].expected, 3093);
    }

    #[test]
    fn shifted_producer_layout_is_reported() {
        let mut snap: DiagnosticSnapshot = serde_json::from_str(PRODUCER_JSON).unwrap();
        snap.expected_size = 3212;
        snap.offsets.extension_pad = 3094;
        let mismatches = snap.layout_mismatches();
        assert_eq!(mismatches.len(), 2);
        assert_eq!(mismatches[0].field, "expectedSize");
        assert_eq!(mismatches[1].reported, 3094);
    }
}
