/// Structural report on a raw block without decoding every record.
///
/// Used by `sysmon-probe inspect` to explain why a region does or does not
/// decode: which revision matched, how the declared array counts compare to
/// their capacities, and which producer status bits are set.
use super::{canonical, legacy, peek_abi, select, Selection};
use crate::model::{LayoutRevision, ProducerFlags};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LayoutReport {
    /// Matched revision, `None` when no revision applies.
    pub revision: Option<LayoutRevision>,
    pub abi_version: Option<u32>,
    pub region_len: usize,
    /// Size the matched revision requires.
    pub expected_len: Option<usize>,
    pub write_sequence: Option<u32>,
    pub arrays: Vec<ArrayCount>,
    pub producer_flags: Option<ProducerFlags>,
    pub warnings: Vec<String>,
}

/// Declared length of one fixed-capacity array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArrayCount {
    pub name: &'static str,
    pub declared: i64,
    pub capacity: usize,
}

impl ArrayCount {
    /// Number of elements a decoder will actually read.
    pub fn decoded(&self) -> usize {
        usize::try_from(self.declared).unwrap_or(0).min(self.capacity)
    }

    pub fn is_truncated(&self) -> bool {
        self.declared > self.capacity as i64
    }
}

impl LayoutReport {
    /// `true` when the block matched a revision and is large enough for it.
    pub fn is_decodable(&self) -> bool {
        matches!((self.revision, self.expected_len), (Some(_), Some(n)) if self.region_len >= n)
    }
}

/// Build a [`LayoutReport`] for `raw`.
pub fn inspect(raw: &[u8]) -> LayoutReport {
    let abi_version = peek_abi(raw);
    let mut report = LayoutReport {
        revision: None,
        abi_version,
        region_len: raw.len(),
        expected_len: None,
        write_sequence: None,
        arrays: Vec::new(),
        producer_flags: None,
        warnings: Vec::new(),
    };

    let (rev, selection) = match select(raw.len(), abi_version.unwrap_or(0)) {
        Ok(found) => found,
        Err(e) => {
            report.warnings.push(e.to_string());
            return report;
        }
    };
    report.revision = Some(rev.revision);
    report.expected_len = Some(rev.size);

    if selection == Selection::SameMajor {
        report.warnings.push(format!(
            "unknown ABI minor {:#010x}, only the {:#010x} prefix is decoded",
            abi_version.unwrap_or(0),
            rev.abi_version.unwrap_or(0)
        ));
    }
    if raw.len() < rev.size {
        report.warnings.push(format!(
            "region is {} bytes, {} layout needs {}",
            raw.len(),
            rev.revision.label(),
            rev.size
        ));
        return report;
    }

    report.write_sequence = rev.sequence_of(raw);
    if report.write_sequence.is_some_and(|seq| seq % 2 == 1) {
        report.warnings.push("write in progress (odd sequence)".to_owned());
    }

    match rev.revision {
        LayoutRevision::Current => {
            report.arrays = vec![
                ArrayCount {
                    name: "tempSensors",
                    declared: i64::from(le_u16(raw, canonical::OFF_TEMP_SENSOR_COUNT)),
                    capacity: canonical::MAX_TEMPERATURE_SENSORS,
                },
                ArrayCount {
                    name: "smartDisks",
                    declared: i64::from(raw[canonical::OFF_SMART_DISK_COUNT]),
                    capacity: canonical::MAX_SMART_DISKS,
                },
            ];
            let flags = ProducerFlags::from_bits(raw[canonical::OFF_FUTURE_RESERVED]);
            if flags.degrade_mode {
                report.warnings.push("producer is in degrade mode".to_owned());
            }
            if flags.hash_mismatch {
                report.warnings.push("producer reported an integrity hash mismatch".to_owned());
            }
            if flags.sequence_stall_warn {
                report.warnings.push("producer reported a stalled write sequence".to_owned());
            }
            report.producer_flags = Some(flags);
        }
        LayoutRevision::Legacy => {
            report.arrays = [
                ("gpus", legacy::OFF_GPU_COUNT, legacy::MAX_GPUS),
                ("adapters", legacy::OFF_ADAPTER_COUNT, legacy::MAX_ADAPTERS),
                ("logicalDisks", legacy::OFF_LOGICAL_DISK_COUNT, legacy::MAX_LOGICAL_DISKS),
                ("physicalDisks", legacy::OFF_PHYSICAL_DISK_COUNT, legacy::MAX_PHYSICAL_DISKS),
                ("temperatures", legacy::OFF_TEMP_COUNT, legacy::MAX_TEMPERATURES),
            ]
            .into_iter()
            .map(|(name, offset, capacity)| ArrayCount {
                name,
                declared: i64::from(le_i32(raw, offset)),
                capacity,
            })
            .collect();
        }
    }

    for array in report.arrays.iter().filter(|a| a.is_truncated()) {
        report.warnings.push(format!(
            "{} declares {} entries, capacity is {}",
            array.name, array.declared, array.capacity
        ));
    }
    report
}

// Callers have checked `raw.len() >= rev.size`, which covers every offset read here.
fn le_u16(raw: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([raw[offset], raw[offset + 1]])
}

fn le_i32(raw: &[u8], offset: usize) -> i32 {
    i32::from_le_bytes([raw[offset], raw[offset + 1], raw[offset + 2], raw[offset + 3]])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::fields::FieldsMut;

    #[test]
    fn reports_truncated_arrays_and_flags() {
        let mut raw = vec![0u8; canonical::TOTAL_SIZE];
        let mut f = FieldsMut::new(&mut raw);
        f.u32(canonical::OFF_ABI_VERSION, canonical::ABI_VERSION);
        f.u32(canonical::OFF_WRITE_SEQUENCE, 7);
        f.u16(canonical::OFF_TEMP_SENSOR_COUNT, 40);
        f.u8(canonical::OFF_SMART_DISK_COUNT, 2);
        f.u8(canonical::OFF_FUTURE_RESERVED, 0b011);

        let report = inspect(&raw);
        assert!(report.is_decodable());
        assert_eq!(report.revision, Some(LayoutRevision::Current));
        assert_eq!(report.write_sequence, Some(7));
        assert!(report.arrays[0].is_truncated());
        assert_eq!(report.arrays[0].decoded(), 32);
        assert_eq!(report.arrays[1].decoded(), 2);

        let flags = report.producer_flags.unwrap();
        assert!(flags.degrade_mode && flags.hash_mismatch && !flags.sequence_stall_warn);
        // odd sequence, degrade, hash mismatch, truncated sensors
        assert_eq!(report.warnings.len(), 4);
    }

    #[test]
    fn reports_unsupported_block() {
        let report = inspect(&[1, 2, 3]);
        assert_eq!(report.revision, None);
        assert_eq!(report.abi_version, None);
        assert!(!report.is_decodable());
        assert_eq!(report.warnings.len(), 1);
    }

    #[test]
    fn reports_short_tagged_block() {
        let mut raw = vec![0u8; 512];
        FieldsMut::new(&mut raw).u32(0, canonical::ABI_VERSION);
        let report = inspect(&raw);
        assert_eq!(report.revision, Some(LayoutRevision::Current));
        assert!(!report.is_decodable());
        assert!(report.arrays.is_empty());
    }

    #[test]
    fn legacy_counts_are_listed() {
        let mut raw = vec![0u8; legacy::TOTAL_SIZE];
        FieldsMut::new(&mut raw).i32(legacy::OFF_PHYSICAL_DISK_COUNT, 3);
        let report = inspect(&raw);
        assert_eq!(report.revision, Some(LayoutRevision::Legacy));
        assert_eq!(report.write_sequence, None);
        let disks = report.arrays.iter().find(|a| a.name == "physicalDisks").unwrap();
        assert_eq!(disks.declared, 3);
        assert!(report.producer_flags.is_none());
    }
}
