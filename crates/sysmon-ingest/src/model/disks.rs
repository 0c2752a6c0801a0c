/// Physical-to-logical disk ownership.
///
/// The wire format stores no parent pointer on a logical volume. Ownership is
/// derived from the drive-letter list embedded in each physical disk record.
use super::legacy::{LegacySnapshot, LogicalDiskRecord, PhysicalDiskRecord};

/// Resolve `physical_disk` on every logical disk.
///
/// Each logical disk is assigned the index of the physical disk whose letter
/// list contains its letter (ASCII case-insensitive). Disks with no match, or
/// without a letter, are left unowned. If several physical disks claim the
/// same letter, the last one in `physical` wins.
pub fn reconcile_disk_ownership(
    physical: &[PhysicalDiskRecord],
    logical: &mut [LogicalDiskRecord],
) {
    for disk in logical.iter_mut() {
        disk.physical_disk = disk.letter.and_then(|letter| owner_of(physical, letter));
    }
}

fn owner_of(physical: &[PhysicalDiskRecord], letter: char) -> Option<usize> {
    physical
        .iter()
        .rposition(|pd| pd.drive_letters.iter().any(|l| l.eq_ignore_ascii_case(&letter)))
}

impl LegacySnapshot {
    /// Logical disks owned by `physical_disks[physical_index]`.
    pub fn partitions(
        &self,
        physical_index: usize,
    ) -> impl Iterator<Item = &LogicalDiskRecord> + '_ {
        self.logical_disks
            .iter()
            .filter(move |disk| disk.physical_disk == Some(physical_index))
    }
}

/// Parse the raw `char[8]` letter list of a physical disk record.
///
/// Reads at most `min(declared, raw.len())` bytes, stops at the first NUL and
/// keeps only ASCII letters, upper-cased.
pub(crate) fn parse_drive_letters(raw: &[u8], declared: i32) -> Vec<char> {
    let limit = usize::try_from(declared).unwrap_or(0).min(raw.len());
    raw[..limit]
        .iter()
        .take_while(|&&b| b != 0)
        .filter(|b| b.is_ascii_alphabetic())
        .map(|&b| char::from(b.to_ascii_uppercase()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::legacy::WireTime;

    fn physical(letters: &[char]) -> PhysicalDiskRecord {
        PhysicalDiskRecord {
            model: Some("Disk".into()),
            serial_number: None,
            firmware_version: None,
            interface_type: None,
            disk_type: None,
            capacity_bytes: 0,
            temperature: 0.0,
            health_percent: 100,
            is_system_disk: false,
            smart_enabled: true,
            smart_supported: true,
            attributes: Vec::new(),
            power_on_hours: 0,
            power_cycle_count: 0,
            reallocated_sectors: 0,
            pending_sectors: 0,
            uncorrectable_errors: 0,
            wear_leveling: 0.0,
            total_bytes_written: 0,
            total_bytes_read: 0,
            drive_letters: letters.to_vec(),
            last_scan: WireTime::default(),
        }
    }

    fn logical(letter: char) -> LogicalDiskRecord {
        LogicalDiskRecord {
            letter: Some(letter),
            label: None,
            file_system: None,
            total_bytes: 0,
            used_bytes: 0,
            free_bytes: 0,
            physical_disk: None,
        }
    }

    /// Disk A owns C and D; E has no owner and must not default to index 0.
    #[test]
    fn letters_resolve_to_owning_physical_disk() {
        let physical = vec![physical(&['C', 'D'])];
        let mut logical = vec![logical('C'), logical('D'), logical('E')];
        reconcile_disk_ownership(&physical, &mut logical);

        assert_eq!(logical[0].physical_disk, Some(0));
        assert_eq!(logical[1].physical_disk, Some(0));
        assert_eq!(logical[2].physical_disk, None);
    }

    #[test]
    fn letter_match_is_case_insensitive() {
        let physical = vec![physical(&['X']), physical(&['c'])];
        let mut logical = vec![logical('C')];
        reconcile_disk_ownership(&physical, &mut logical);
        assert_eq!(logical[0].physical_disk, Some(1));
    }

    #[test]
    fn drive_letter_list_respects_count_and_nul() {
        assert_eq!(parse_drive_letters(b"cd\0\0\0\0\0\0", 8), vec!['C', 'D']);
        assert_eq!(parse_drive_letters(b"CDEF\0\0\0\0", 2), vec!['C', 'D']);
        assert_eq!(parse_drive_letters(b"C:D\0\0\0\0\0", 99), vec!['C', 'D']);
        assert!(parse_drive_letters(b"CD\0\0\0\0\0\0", -1).is_empty());
    }
}
