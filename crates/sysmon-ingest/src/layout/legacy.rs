/// Older producer layout: packed, little-endian, 124 832 bytes.
///
/// There is no ABI tag and no write sequence; the block is recognized by its
/// size alone. Names are fixed-capacity UTF-16LE, measurements are `f64`.
use super::fields::{capped_count, Fields};
use crate::error::DecodeError;
use crate::model::disks::parse_drive_letters;
use crate::model::{
    reconcile_disk_ownership, CpuInfo, GpuRecord, LegacySnapshot, LogicalDiskRecord, MemoryInfo,
    NetworkAdapterRecord, PhysicalDiskRecord, SmartAttribute, TemperatureReading, WireTime,
};
use tracing::debug;

/// Total size of the block.
pub const TOTAL_SIZE: usize = 124_832;

pub const MAX_GPUS: usize = 2;
pub const MAX_ADAPTERS: usize = 4;
pub const MAX_LOGICAL_DISKS: usize = 8;
pub const MAX_PHYSICAL_DISKS: usize = 8;
pub const MAX_SMART_ATTRIBUTES: usize = 32;
pub const MAX_TEMPERATURES: usize = 10;

// CPU and memory.
pub const OFF_CPU_NAME: usize = 0;
pub const OFF_PHYSICAL_CORES: usize = 256;
pub const OFF_LOGICAL_CORES: usize = 260;
pub const OFF_CPU_USAGE: usize = 264;
pub const OFF_PERFORMANCE_CORES: usize = 272;
pub const OFF_EFFICIENCY_CORES: usize = 276;
pub const OFF_PERFORMANCE_CORE_FREQ: usize = 280;
pub const OFF_EFFICIENCY_CORE_FREQ: usize = 288;
pub const OFF_HYPER_THREADING: usize = 296;
pub const OFF_VIRTUALIZATION: usize = 297;
pub const OFF_TOTAL_MEMORY: usize = 298;
pub const OFF_USED_MEMORY: usize = 306;
pub const OFF_AVAILABLE_MEMORY: usize = 314;
pub const OFF_CPU_TEMPERATURE: usize = 322;
pub const OFF_GPU_TEMPERATURE: usize = 330;
pub const OFF_CPU_SAMPLE_INTERVAL: usize = 338;

// Device arrays.
pub const OFF_GPUS: usize = 346;
pub const GPU_STRIDE: usize = 401;
pub const OFF_ADAPTERS: usize = 1148;
pub const ADAPTER_STRIDE: usize = 520;
pub const OFF_LOGICAL_DISKS: usize = 3228;
pub const LOGICAL_DISK_STRIDE: usize = 345;
pub const OFF_PHYSICAL_DISKS: usize = 5988;
pub const PHYSICAL_DISK_STRIDE: usize = 14_676;
pub const OFF_TEMPERATURES: usize = 123_396;
pub const TEMPERATURE_STRIDE: usize = 136;

// Counts and trailer.
pub const OFF_ADAPTER_COUNT: usize = 124_756;
pub const OFF_TEMP_COUNT: usize = 124_760;
pub const OFF_GPU_COUNT: usize = 124_764;
pub const OFF_LOGICAL_DISK_COUNT: usize = 124_768;
pub const OFF_PHYSICAL_DISK_COUNT: usize = 124_772;
pub const OFF_LAST_UPDATE: usize = 124_776;
pub const OFF_LOCK: usize = 124_792;
pub const LOCK_LEN: usize = 40;

// GPU record.
const GPU_NAME: usize = 0;
const GPU_BRAND: usize = 256;
const GPU_MEMORY: usize = 384;
const GPU_CORE_CLOCK: usize = 392;
const GPU_IS_VIRTUAL: usize = 400;

// Network adapter record.
const NET_NAME: usize = 0;
const NET_MAC: usize = 256;
const NET_IP: usize = 320;
const NET_TYPE: usize = 448;
const NET_SPEED: usize = 512;

// Logical disk record.
const LD_LETTER: usize = 0;
const LD_LABEL: usize = 1;
const LD_FILE_SYSTEM: usize = 257;
const LD_TOTAL: usize = 321;
const LD_USED: usize = 329;
const LD_FREE: usize = 337;

// Physical disk record.
const PD_MODEL: usize = 0;
const PD_SERIAL: usize = 256;
const PD_FIRMWARE: usize = 384;
const PD_INTERFACE: usize = 448;
const PD_DISK_TYPE: usize = 512;
const PD_CAPACITY: usize = 544;
const PD_TEMPERATURE: usize = 552;
const PD_HEALTH: usize = 560;
const PD_IS_SYSTEM: usize = 561;
const PD_SMART_ENABLED: usize = 562;
const PD_SMART_SUPPORTED: usize = 563;
const PD_ATTRIBUTES: usize = 564;
const PD_ATTRIBUTE_COUNT: usize = 14_580;
const PD_POWER_ON_HOURS: usize = 14_584;
const PD_POWER_CYCLES: usize = 14_592;
const PD_REALLOCATED: usize = 14_600;
const PD_PENDING: usize = 14_608;
const PD_UNCORRECTABLE: usize = 14_616;
const PD_WEAR_LEVELING: usize = 14_624;
const PD_BYTES_WRITTEN: usize = 14_632;
const PD_BYTES_READ: usize = 14_640;
const PD_DRIVE_LETTERS: usize = 14_648;
const PD_DRIVE_LETTER_COUNT: usize = 14_656;
const PD_LAST_SCAN: usize = 14_660;

// SMART attribute record.
const ATTR_STRIDE: usize = 438;
const ATTR_ID: usize = 0;
const ATTR_FLAGS: usize = 1;
const ATTR_CURRENT: usize = 2;
const ATTR_WORST: usize = 3;
const ATTR_THRESHOLD: usize = 4;
const ATTR_RAW: usize = 5;
const ATTR_NAME: usize = 13;
const ATTR_DESCRIPTION: usize = 141;
const ATTR_IS_CRITICAL: usize = 397;
const ATTR_PHYSICAL_VALUE: usize = 398;
const ATTR_UNITS: usize = 406;

// Temperature record.
const TEMP_NAME: usize = 0;
const TEMP_VALUE: usize = 128;

/// Decode a block in the legacy layout and resolve disk ownership.
pub fn decode(raw: &[u8]) -> Result<LegacySnapshot, DecodeError> {
    if raw.len() < TOTAL_SIZE {
        return Err(DecodeError::TooShort {
            expected: TOTAL_SIZE,
            actual: raw.len(),
        });
    }
    let f = Fields::new(raw);

    let cpu = CpuInfo {
        name: f.utf16("cpuName", OFF_CPU_NAME, 128)?,
        physical_cores: non_negative("physicalCores", f.i32("physicalCores", OFF_PHYSICAL_CORES)?),
        logical_cores: non_negative("logicalCores", f.i32("logicalCores", OFF_LOGICAL_CORES)?),
        performance_cores: non_negative(
            "performanceCores",
            f.i32("performanceCores", OFF_PERFORMANCE_CORES)?,
        ),
        efficiency_cores: non_negative(
            "efficiencyCores",
            f.i32("efficiencyCores", OFF_EFFICIENCY_CORES)?,
        ),
        usage_percent: f.f64("cpuUsage", OFF_CPU_USAGE)?,
        performance_core_mhz: f.f64("performanceCoreFreq", OFF_PERFORMANCE_CORE_FREQ)?,
        efficiency_core_mhz: f.f64("efficiencyCoreFreq", OFF_EFFICIENCY_CORE_FREQ)?,
        hyper_threading: f.flag("hyperThreading", OFF_HYPER_THREADING)?,
        virtualization: f.flag("virtualization", OFF_VIRTUALIZATION)?,
    };
    let memory = MemoryInfo {
        total_bytes: f.u64("totalMemory", OFF_TOTAL_MEMORY)?,
        used_bytes: f.u64("usedMemory", OFF_USED_MEMORY)?,
        available_bytes: f.u64("availableMemory", OFF_AVAILABLE_MEMORY)?,
    };

    let gpus = decode_array(
        &f,
        "gpuCount",
        OFF_GPU_COUNT,
        OFF_GPUS,
        GPU_STRIDE,
        MAX_GPUS,
        decode_gpu,
    )?;
    let adapters = decode_array(
        &f,
        "adapterCount",
        OFF_ADAPTER_COUNT,
        OFF_ADAPTERS,
        ADAPTER_STRIDE,
        MAX_ADAPTERS,
        decode_adapter,
    )?;
    let mut logical_disks = decode_array(
        &f,
        "diskCount",
        OFF_LOGICAL_DISK_COUNT,
        OFF_LOGICAL_DISKS,
        LOGICAL_DISK_STRIDE,
        MAX_LOGICAL_DISKS,
        decode_logical_disk,
    )?;
    let physical_disks = decode_array(
        &f,
        "physicalDiskCount",
        OFF_PHYSICAL_DISK_COUNT,
        OFF_PHYSICAL_DISKS,
        PHYSICAL_DISK_STRIDE,
        MAX_PHYSICAL_DISKS,
        decode_physical_disk,
    )?;
    let temperatures = decode_array(
        &f,
        "tempCount",
        OFF_TEMP_COUNT,
        OFF_TEMPERATURES,
        TEMPERATURE_STRIDE,
        MAX_TEMPERATURES,
        decode_temperature,
    )?;

    reconcile_disk_ownership(&physical_disks, &mut logical_disks);

    Ok(LegacySnapshot {
        cpu,
        memory,
        cpu_temperature: f.f64("cpuTemperature", OFF_CPU_TEMPERATURE)?,
        gpu_temperature: f.f64("gpuTemperature", OFF_GPU_TEMPERATURE)?,
        cpu_usage_sample_interval_ms: f.f64("cpuUsageSampleIntervalMs", OFF_CPU_SAMPLE_INTERVAL)?,
        gpus,
        adapters,
        logical_disks,
        physical_disks,
        temperatures,
        last_update: wire_time(f, OFF_LAST_UPDATE)?,
    })
}

/// Decode `min(count, capacity)` elements of a fixed array whose declared
/// length is an `i32` at `count_offset`.
fn decode_array<'a, T>(
    f: &Fields<'a>,
    count_field: &'static str,
    count_offset: usize,
    offset: usize,
    stride: usize,
    capacity: usize,
    decode_one: fn(Fields<'a>) -> Result<T, DecodeError>,
) -> Result<Vec<T>, DecodeError> {
    let declared = f.i32(count_field, count_offset)?;
    let count = capped_count(count_field, i64::from(declared), capacity);
    (0..count)
        .map(|i| decode_one(f.element(offset, stride, i)))
        .collect()
}

fn decode_gpu(f: Fields<'_>) -> Result<GpuRecord, DecodeError> {
    Ok(GpuRecord {
        name: f.utf16("gpu.name", GPU_NAME, 128)?,
        brand: f.utf16("gpu.brand", GPU_BRAND, 64)?,
        memory_bytes: f.u64("gpu.memory", GPU_MEMORY)?,
        core_clock_mhz: f.f64("gpu.coreClock", GPU_CORE_CLOCK)?,
        is_virtual: f.flag("gpu.isVirtual", GPU_IS_VIRTUAL)?,
    })
}

fn decode_adapter(f: Fields<'_>) -> Result<NetworkAdapterRecord, DecodeError> {
    Ok(NetworkAdapterRecord {
        name: f.utf16("adapter.name", NET_NAME, 128)?,
        mac: f.utf16("adapter.mac", NET_MAC, 32)?,
        ip_address: f.utf16("adapter.ipAddress", NET_IP, 64)?,
        adapter_type: f.utf16("adapter.adapterType", NET_TYPE, 32)?,
        speed_bps: f.u64("adapter.speed", NET_SPEED)?,
    })
}

fn decode_logical_disk(f: Fields<'_>) -> Result<LogicalDiskRecord, DecodeError> {
    let letter = f.u8("disk.letter", LD_LETTER)?;
    Ok(LogicalDiskRecord {
        letter: letter
            .is_ascii_alphabetic()
            .then(|| char::from(letter.to_ascii_uppercase())),
        label: f.utf16("disk.label", LD_LABEL, 128)?,
        file_system: f.utf16("disk.fileSystem", LD_FILE_SYSTEM, 32)?,
        total_bytes: f.u64("disk.totalSize", LD_TOTAL)?,
        used_bytes: f.u64("disk.usedSpace", LD_USED)?,
        free_bytes: f.u64("disk.freeSpace", LD_FREE)?,
        physical_disk: None,
    })
}

fn decode_physical_disk(f: Fields<'_>) -> Result<PhysicalDiskRecord, DecodeError> {
    let declared = f.i32("physicalDisk.attributeCount", PD_ATTRIBUTE_COUNT)?;
    let count = capped_count(
        "physicalDisk.attributeCount",
        i64::from(declared),
        MAX_SMART_ATTRIBUTES,
    );
    let attributes = (0..count)
        .map(|i| decode_attribute(f.element(PD_ATTRIBUTES, ATTR_STRIDE, i)))
        .collect::<Result<Vec<_>, _>>()?;

    let letters = f.bytes("physicalDisk.logicalDriveLetters", PD_DRIVE_LETTERS, 8)?;
    let letter_count = f.i32("physicalDisk.logicalDriveCount", PD_DRIVE_LETTER_COUNT)?;

    Ok(PhysicalDiskRecord {
        model: f.utf16("physicalDisk.model", PD_MODEL, 128)?,
        serial_number: f.utf16("physicalDisk.serialNumber", PD_SERIAL, 64)?,
        firmware_version: f.utf16("physicalDisk.firmwareVersion", PD_FIRMWARE, 32)?,
        interface_type: f.utf16("physicalDisk.interfaceType", PD_INTERFACE, 32)?,
        disk_type: f.utf16("physicalDisk.diskType", PD_DISK_TYPE, 16)?,
        capacity_bytes: f.u64("physicalDisk.capacity", PD_CAPACITY)?,
        temperature: f.f64("physicalDisk.temperature", PD_TEMPERATURE)?,
        health_percent: f.u8("physicalDisk.healthPercentage", PD_HEALTH)?,
        is_system_disk: f.flag("physicalDisk.isSystemDisk", PD_IS_SYSTEM)?,
        smart_enabled: f.flag("physicalDisk.smartEnabled", PD_SMART_ENABLED)?,
        smart_supported: f.flag("physicalDisk.smartSupported", PD_SMART_SUPPORTED)?,
        attributes,
        power_on_hours: f.u64("physicalDisk.powerOnHours", PD_POWER_ON_HOURS)?,
        power_cycle_count: f.u64("physicalDisk.powerCycleCount", PD_POWER_CYCLES)?,
        reallocated_sectors: f.u64("physicalDisk.reallocatedSectorCount", PD_REALLOCATED)?,
        pending_sectors: f.u64("physicalDisk.currentPendingSector", PD_PENDING)?,
        uncorrectable_errors: f.u64("physicalDisk.uncorrectableErrors", PD_UNCORRECTABLE)?,
        wear_leveling: f.f64("physicalDisk.wearLeveling", PD_WEAR_LEVELING)?,
        total_bytes_written: f.u64("physicalDisk.totalBytesWritten", PD_BYTES_WRITTEN)?,
        total_bytes_read: f.u64("physicalDisk.totalBytesRead", PD_BYTES_READ)?,
        drive_letters: parse_drive_letters(letters, letter_count),
        last_scan: wire_time(f, PD_LAST_SCAN)?,
    })
}

fn decode_attribute(f: Fields<'_>) -> Result<SmartAttribute, DecodeError> {
    Ok(SmartAttribute {
        id: f.u8("attribute.id", ATTR_ID)?,
        flags: f.u8("attribute.flags", ATTR_FLAGS)?,
        current: f.u8("attribute.current", ATTR_CURRENT)?,
        worst: f.u8("attribute.worst", ATTR_WORST)?,
        threshold: f.u8("attribute.threshold", ATTR_THRESHOLD)?,
        raw_value: f.u64("attribute.rawValue", ATTR_RAW)?,
        name: f.utf16("attribute.name", ATTR_NAME, 64)?,
        description: f.utf16("attribute.description", ATTR_DESCRIPTION, 128)?,
        is_critical: f.flag("attribute.isCritical", ATTR_IS_CRITICAL)?,
        physical_value: f.f64("attribute.physicalValue", ATTR_PHYSICAL_VALUE)?,
        units: f.utf16("attribute.units", ATTR_UNITS, 16)?,
    })
}

fn decode_temperature(f: Fields<'_>) -> Result<TemperatureReading, DecodeError> {
    Ok(TemperatureReading {
        sensor_name: f.utf16("temperature.sensorName", TEMP_NAME, 64)?,
        celsius: f.f64("temperature.temperature", TEMP_VALUE)?,
    })
}

fn wire_time(f: Fields<'_>, offset: usize) -> Result<WireTime, DecodeError> {
    let part = |i: usize| f.u16("systemTime", offset + i * 2);
    Ok(WireTime {
        year: part(0)?,
        month: part(1)?,
        day_of_week: part(2)?,
        day: part(3)?,
        hour: part(4)?,
        minute: part(5)?,
        second: part(6)?,
        milliseconds: part(7)?,
    })
}

fn non_negative(field: &'static str, value: i32) -> u32 {
    u32::try_from(value).unwrap_or_else(|_| {
        debug!(field, value, "negative count, using 0");
        0
    })
}
