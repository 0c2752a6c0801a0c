/// Current producer layout: packed, little-endian, 2653 bytes.
///
/// ```text
/// 0     abiVersion u32          4     writeSequence u32
/// 8     snapshotVersion u32     12    reservedHeader
/// 16    cpuLogicalCores u16     18    cpuUsagePercent_x10 i16
/// 20    memoryTotalMB u64       28    memoryUsedMB u64
/// 36    tempSensors[32] × 35    1156  tempSensorCount u16
/// 1158  smartDisks[16] × 49     1942  smartDiskCount u8
/// 1943  baseboard / BIOS strings (128, 64, 64, 64, 64, 64, 32)
/// 2423  secureBootEnabled u8    2424  tpmPresent u8
/// 2425  memorySlotsTotal u16    2427  memorySlotsUsed u16
/// 2429  futureReserved[64]      2493  sharedmemHash[32]
/// 2525  extensionPad[128]       2653  end
/// ```
use super::fields::{capped_count, tenths, Fields, FieldsMut};
use crate::error::DecodeError;
use crate::model::{
    BoardIdentity, ProducerFlags, SmartDiskScore, SmartGrowth, TelemetrySnapshot,
    TemperatureSensor,
};
use tracing::debug;

/// ABI tag written by producers of this layout.
pub const ABI_VERSION: u32 = 0x0001_0014;

/// Total size of the block.
pub const TOTAL_SIZE: usize = 2653;

pub const MAX_TEMPERATURE_SENSORS: usize = 32;
pub const MAX_SMART_DISKS: usize = 16;

// Header.
pub const OFF_ABI_VERSION: usize = 0;
pub const OFF_WRITE_SEQUENCE: usize = 4;
pub const OFF_SNAPSHOT_VERSION: usize = 8;
pub const OFF_CPU_LOGICAL_CORES: usize = 16;
pub const OFF_CPU_USAGE_X10: usize = 18;
pub const OFF_MEMORY_TOTAL_MB: usize = 20;
pub const OFF_MEMORY_USED_MB: usize = 28;

// Arrays.
pub const OFF_TEMP_SENSORS: usize = 36;
pub const TEMP_SENSOR_STRIDE: usize = 35;
pub const OFF_TEMP_SENSOR_COUNT: usize = 1156;
pub const OFF_SMART_DISKS: usize = 1158;
pub const SMART_DISK_STRIDE: usize = 49;
pub const OFF_SMART_DISK_COUNT: usize = 1942;

// Identity strings.
pub const OFF_BASEBOARD_MANUFACTURER: usize = 1943;
pub const OFF_BASEBOARD_PRODUCT: usize = 2071;
pub const OFF_BASEBOARD_VERSION: usize = 2135;
pub const OFF_BASEBOARD_SERIAL: usize = 2199;
pub const OFF_BIOS_VENDOR: usize = 2263;
pub const OFF_BIOS_VERSION: usize = 2327;
pub const OFF_BIOS_DATE: usize = 2391;

// Platform flags and trailer.
pub const OFF_SECURE_BOOT: usize = 2423;
pub const OFF_TPM_PRESENT: usize = 2424;
pub const OFF_MEMORY_SLOTS_TOTAL: usize = 2425;
pub const OFF_MEMORY_SLOTS_USED: usize = 2427;
pub const OFF_FUTURE_RESERVED: usize = 2429;
pub const OFF_SHAREDMEM_HASH: usize = 2493;
pub const OFF_EXTENSION_PAD: usize = 2525;

// USB extension. Producers that publish removable-drive state place it at the
// start of the extension pad and shrink the pad to 118 bytes, growing the
// block to 3212. Fields before `OFF_EXTENSION_PAD` are unchanged.
pub const OFF_USB_DEVICES: usize = OFF_EXTENSION_PAD;
pub const USB_DEVICE_STRIDE: usize = 71;
pub const MAX_USB_DEVICES: usize = 8;
pub const OFF_USB_DEVICE_COUNT: usize = OFF_USB_DEVICES + MAX_USB_DEVICES * USB_DEVICE_STRIDE;
pub const OFF_USB_EXTENSION_PAD: usize = OFF_USB_DEVICE_COUNT + 1;
pub const USB_EXTENDED_SIZE: usize = OFF_USB_EXTENSION_PAD + 118;

/// Identity string fields: (name, offset, capacity).
const IDENTITY_FIELDS: [(&str, usize, usize); 7] = [
    ("baseboardManufacturer", OFF_BASEBOARD_MANUFACTURER, 128),
    ("baseboardProduct", OFF_BASEBOARD_PRODUCT, 64),
    ("baseboardVersion", OFF_BASEBOARD_VERSION, 64),
    ("baseboardSerial", OFF_BASEBOARD_SERIAL, 64),
    ("biosVendor", OFF_BIOS_VENDOR, 64),
    ("biosVersion", OFF_BIOS_VERSION, 64),
    ("biosDate", OFF_BIOS_DATE, 32),
];

// Temperature sensor record.
const TS_NAME: usize = 0;
const TS_NAME_LEN: usize = 32;
const TS_VALUE_X10: usize = 32;
const TS_FLAGS: usize = 34;

// SMART disk record.
const SD_ID: usize = 0;
const SD_ID_LEN: usize = 32;
const SD_SCORE: usize = 32;
const SD_HOURS_ON: usize = 34;
const SD_WEAR: usize = 38;
const SD_REALLOCATED: usize = 40;
const SD_PENDING: usize = 42;
const SD_UNCORRECTABLE: usize = 44;
const SD_TEMPERATURE: usize = 46;
const SD_GROWTH: usize = 48;

const BYTES_PER_MB: u64 = 1024 * 1024;

/// Decode a block in the current layout.
///
/// `raw` may be longer than [`TOTAL_SIZE`] (page-rounded mappings, newer
/// minors with trailing fields); only the known prefix is read.
pub fn decode(raw: &[u8]) -> Result<TelemetrySnapshot, DecodeError> {
    if raw.len() < TOTAL_SIZE {
        return Err(DecodeError::TooShort {
            expected: TOTAL_SIZE,
            actual: raw.len(),
        });
    }
    let f = Fields::new(raw);

    let temp_count = capped_count(
        "tempSensorCount",
        i64::from(f.u16("tempSensorCount", OFF_TEMP_SENSOR_COUNT)?),
        MAX_TEMPERATURE_SENSORS,
    );
    let temperature_sensors = (0..temp_count)
        .map(|i| decode_sensor(f.element(OFF_TEMP_SENSORS, TEMP_SENSOR_STRIDE, i)))
        .collect::<Result<Vec<_>, _>>()?;

    let disk_count = capped_count(
        "smartDiskCount",
        i64::from(f.u8("smartDiskCount", OFF_SMART_DISK_COUNT)?),
        MAX_SMART_DISKS,
    );
    let smart_disks = (0..disk_count)
        .map(|i| decode_smart_disk(f.element(OFF_SMART_DISKS, SMART_DISK_STRIDE, i)))
        .collect::<Result<Vec<_>, _>>()?;

    let mut identity = Vec::with_capacity(IDENTITY_FIELDS.len());
    for (name, offset, len) in IDENTITY_FIELDS {
        identity.push(f.utf8(name, offset, len)?);
    }
    let mut identity = identity.into_iter();
    let board = BoardIdentity {
        manufacturer: identity.next().flatten(),
        product: identity.next().flatten(),
        version: identity.next().flatten(),
        serial: identity.next().flatten(),
        bios_vendor: identity.next().flatten(),
        bios_version: identity.next().flatten(),
        bios_date: identity.next().flatten(),
    };

    let mut integrity_hash = [0u8; 32];
    integrity_hash.copy_from_slice(f.bytes("sharedmemHash", OFF_SHAREDMEM_HASH, 32)?);

    let memory_total_mb = f.u64("memoryTotalMB", OFF_MEMORY_TOTAL_MB)?;
    let memory_used_mb = f.u64("memoryUsedMB", OFF_MEMORY_USED_MB)?;

    Ok(TelemetrySnapshot {
        abi_version: f.u32("abiVersion", OFF_ABI_VERSION)?,
        write_sequence: f.u32("writeSequence", OFF_WRITE_SEQUENCE)?,
        snapshot_version: f.u32("snapshotVersion", OFF_SNAPSHOT_VERSION)?,
        cpu_logical_cores: f.u16("cpuLogicalCores", OFF_CPU_LOGICAL_CORES)?,
        cpu_usage_percent: tenths(f.i16("cpuUsagePercent_x10", OFF_CPU_USAGE_X10)?),
        memory_total_bytes: mb_to_bytes("memoryTotalMB", memory_total_mb),
        memory_used_bytes: mb_to_bytes("memoryUsedMB", memory_used_mb),
        temperature_sensors,
        smart_disks,
        board,
        secure_boot_enabled: f.flag("secureBootEnabled", OFF_SECURE_BOOT)?,
        tpm_present: f.flag("tpmPresent", OFF_TPM_PRESENT)?,
        memory_slots_total: f.u16("memorySlotsTotal", OFF_MEMORY_SLOTS_TOTAL)?,
        memory_slots_used: f.u16("memorySlotsUsed", OFF_MEMORY_SLOTS_USED)?,
        producer_flags: ProducerFlags::from_bits(f.u8("futureReserved", OFF_FUTURE_RESERVED)?),
        integrity_hash,
        possibly_torn: false,
    })
}

fn decode_sensor(f: Fields<'_>) -> Result<TemperatureSensor, DecodeError> {
    let flags = f.u8("tempSensor.flags", TS_FLAGS)?;
    Ok(TemperatureSensor {
        name: f.utf8("tempSensor.name", TS_NAME, TS_NAME_LEN)?,
        value_celsius: tenths(f.i16("tempSensor.valueC_x10", TS_VALUE_X10)?),
        valid: flags & 0x01 != 0,
        urgent_last: flags & 0x02 != 0,
    })
}

fn decode_smart_disk(f: Fields<'_>) -> Result<SmartDiskScore, DecodeError> {
    let hours = f.i32("smartDisk.hoursOn", SD_HOURS_ON)?;
    let hours_on = u32::try_from(hours).unwrap_or_else(|_| {
        debug!(hours, "negative SMART power-on hours, using 0");
        0
    });
    let temperature = f.i16("smartDisk.temperatureC", SD_TEMPERATURE)?;

    Ok(SmartDiskScore {
        disk_id: f.utf8("smartDisk.diskId", SD_ID, SD_ID_LEN)?,
        score: percent("smartDisk.score", f.i16("smartDisk.score", SD_SCORE)?),
        hours_on,
        wear_percent: percent("smartDisk.wearPercent", f.i16("smartDisk.wearPercent", SD_WEAR)?),
        reallocated: f.u16("smartDisk.reallocated", SD_REALLOCATED)?,
        pending: f.u16("smartDisk.pending", SD_PENDING)?,
        uncorrectable: f.u16("smartDisk.uncorrectable", SD_UNCORRECTABLE)?,
        temperature_celsius: (temperature >= 0).then_some(temperature),
        growth: SmartGrowth::from_bits(f.u8("smartDisk.recentGrowthFlags", SD_GROWTH)?),
    })
}

/// 0–100 value with a negative "unavailable" sentinel. Values above 100 are
/// out of range and degrade to `None`.
fn percent(field: &'static str, raw: i16) -> Option<u8> {
    match raw {
        0..=100 => Some(raw as u8),
        r if r < 0 => None,
        r => {
            debug!(field, value = r, "percentage out of range, treating as unavailable");
            None
        }
    }
}

fn mb_to_bytes(field: &'static str, mb: u64) -> u64 {
    mb.checked_mul(BYTES_PER_MB).unwrap_or_else(|| {
        debug!(field, mb, "memory size overflows u64 bytes, saturating");
        u64::MAX
    })
}

/// Write `snapshot` in the current layout.
///
/// Inverse of [`decode`] within the layout's precision: measurements are
/// rounded to tenths, memory to whole megabytes, strings truncated to their
/// field capacity, and arrays to their fixed capacity. `possibly_torn` is not
/// part of the wire format.
pub fn encode(snapshot: &TelemetrySnapshot) -> Vec<u8> {
    let mut raw = vec![0u8; TOTAL_SIZE];
    let mut f = FieldsMut::new(&mut raw);

    f.u32(OFF_ABI_VERSION, snapshot.abi_version);
    f.u32(OFF_WRITE_SEQUENCE, snapshot.write_sequence);
    f.u32(OFF_SNAPSHOT_VERSION, snapshot.snapshot_version);
    f.u16(OFF_CPU_LOGICAL_CORES, snapshot.cpu_logical_cores);
    f.i16(OFF_CPU_USAGE_X10, to_tenths(snapshot.cpu_usage_percent));
    f.u64(OFF_MEMORY_TOTAL_MB, snapshot.memory_total_bytes / BYTES_PER_MB);
    f.u64(OFF_MEMORY_USED_MB, snapshot.memory_used_bytes / BYTES_PER_MB);

    let sensor_count = snapshot.temperature_sensors.len().min(MAX_TEMPERATURE_SENSORS);
    let sensors = &snapshot.temperature_sensors[..sensor_count];
    for (i, sensor) in sensors.iter().enumerate() {
        let mut e = f.element(OFF_TEMP_SENSORS, TEMP_SENSOR_STRIDE, i);
        e.utf8(TS_NAME, TS_NAME_LEN, sensor.name.as_deref());
        e.i16(TS_VALUE_X10, to_tenths(sensor.value_celsius));
        e.u8(TS_FLAGS, u8::from(sensor.valid) | (u8::from(sensor.urgent_last) << 1));
    }
    f.u16(OFF_TEMP_SENSOR_COUNT, sensors.len() as u16);

    let disks = &snapshot.smart_disks[..snapshot.smart_disks.len().min(MAX_SMART_DISKS)];
    for (i, disk) in disks.iter().enumerate() {
        let mut e = f.element(OFF_SMART_DISKS, SMART_DISK_STRIDE, i);
        e.utf8(SD_ID, SD_ID_LEN, disk.disk_id.as_deref());
        e.i16(SD_SCORE, disk.score.map_or(-1, i16::from));
        e.i32(SD_HOURS_ON, i32::try_from(disk.hours_on).unwrap_or(i32::MAX));
        e.i16(SD_WEAR, disk.wear_percent.map_or(-1, i16::from));
        e.u16(SD_REALLOCATED, disk.reallocated);
        e.u16(SD_PENDING, disk.pending);
        e.u16(SD_UNCORRECTABLE, disk.uncorrectable);
        e.i16(SD_TEMPERATURE, disk.temperature_celsius.unwrap_or(-1));
        e.u8(SD_GROWTH, disk.growth.bits());
    }
    f.u8(OFF_SMART_DISK_COUNT, disks.len() as u8);

    let board = &snapshot.board;
    let identity = [
        &board.manufacturer,
        &board.product,
        &board.version,
        &board.serial,
        &board.bios_vendor,
        &board.bios_version,
        &board.bios_date,
    ];
    for ((_, offset, len), value) in IDENTITY_FIELDS.into_iter().zip(identity) {
        f.utf8(offset, len, value.as_deref());
    }

    f.u8(OFF_SECURE_BOOT, u8::from(snapshot.secure_boot_enabled));
    f.u8(OFF_TPM_PRESENT, u8::from(snapshot.tpm_present));
    f.u16(OFF_MEMORY_SLOTS_TOTAL, snapshot.memory_slots_total);
    f.u16(OFF_MEMORY_SLOTS_USED, snapshot.memory_slots_used);
    f.u8(OFF_FUTURE_RESERVED, snapshot.producer_flags.bits());
    f.put(OFF_SHAREDMEM_HASH, &snapshot.integrity_hash);

    raw
}

fn to_tenths(value: Option<f64>) -> i16 {
    match value {
        Some(v) if v >= 0.0 => (v * 10.0).round().min(f64::from(i16::MAX)) as i16,
        _ => -1,
    }
}
