/// Fixed-offset field access over a raw snapshot buffer.
///
/// All layouts are byte-packed little-endian. A [`Fields`] view is anchored
/// at a base offset (the start of the block or of one array element) and
/// reads every field from an explicit `(offset, len)` pair relative to that
/// base. Out-of-bounds access is a [`DecodeError::FieldOutOfRange`], never a
/// panic.
use crate::error::DecodeError;
use std::borrow::Cow;
use tracing::debug;

/// Read-only view over `raw`, with field offsets relative to `base`.
#[derive(Clone, Copy)]
pub(crate) struct Fields<'a> {
    raw: &'a [u8],
    base: usize,
}

impl<'a> Fields<'a> {
    pub(crate) fn new(raw: &'a [u8]) -> Self {
        Self { raw, base: 0 }
    }

    /// View of element `index` of an array starting at `offset` with the
    /// given element `stride`.
    pub(crate) fn element(&self, offset: usize, stride: usize, index: usize) -> Fields<'a> {
        Fields {
            raw: self.raw,
            base: self.base + offset + stride * index,
        }
    }

    pub(crate) fn bytes(
        &self,
        field: &'static str,
        offset: usize,
        len: usize,
    ) -> Result<&'a [u8], DecodeError> {
        let start = self.base + offset;
        self.raw
            .get(start..start + len)
            .ok_or(DecodeError::FieldOutOfRange {
                field,
                offset: start,
                len,
                available: self.raw.len(),
            })
    }

    fn array<const N: usize>(
        &self,
        field: &'static str,
        offset: usize,
    ) -> Result<[u8; N], DecodeError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.bytes(field, offset, N)?);
        Ok(out)
    }

    pub(crate) fn u8(&self, field: &'static str, offset: usize) -> Result<u8, DecodeError> {
        Ok(self.bytes(field, offset, 1)?[0])
    }

    pub(crate) fn flag(&self, field: &'static str, offset: usize) -> Result<bool, DecodeError> {
        Ok(self.u8(field, offset)? != 0)
    }

    pub(crate) fn u16(&self, field: &'static str, offset: usize) -> Result<u16, DecodeError> {
        Ok(u16::from_le_bytes(self.array(field, offset)?))
    }

    pub(crate) fn i16(&self, field: &'static str, offset: usize) -> Result<i16, DecodeError> {
        Ok(i16::from_le_bytes(self.array(field, offset)?))
    }

    pub(crate) fn u32(&self, field: &'static str, offset: usize) -> Result<u32, DecodeError> {
        Ok(u32::from_le_bytes(self.array(field, offset)?))
    }

    pub(crate) fn i32(&self, field: &'static str, offset: usize) -> Result<i32, DecodeError> {
        Ok(i32::from_le_bytes(self.array(field, offset)?))
    }

    pub(crate) fn u64(&self, field: &'static str, offset: usize) -> Result<u64, DecodeError> {
        Ok(u64::from_le_bytes(self.array(field, offset)?))
    }

    pub(crate) fn f64(&self, field: &'static str, offset: usize) -> Result<f64, DecodeError> {
        Ok(f64::from_le_bytes(self.array(field, offset)?))
    }

    /// NUL-terminated UTF-8 text of at most `len` bytes.
    pub(crate) fn utf8(
        &self,
        field: &'static str,
        offset: usize,
        len: usize,
    ) -> Result<Option<String>, DecodeError> {
        Ok(decode_utf8(field, self.bytes(field, offset, len)?))
    }

    /// NUL-terminated UTF-16LE text of at most `units` code units.
    pub(crate) fn utf16(
        &self,
        field: &'static str,
        offset: usize,
        units: usize,
    ) -> Result<Option<String>, DecodeError> {
        Ok(decode_utf16(field, self.bytes(field, offset, units * 2)?))
    }
}

/// Decode a fixed-capacity UTF-8 field.
///
/// Stops at the first NUL or the end of the field. Invalid sequences are
/// replaced with U+FFFD. Empty or all-whitespace text is `None`.
pub(crate) fn decode_utf8(field: &'static str, bytes: &[u8]) -> Option<String> {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    let run = &bytes[..end];
    let text = match std::str::from_utf8(run) {
        Ok(s) => Cow::Borrowed(s),
        Err(e) => {
            debug!(field, error = %e, "invalid UTF-8 in text field, decoding lossily");
            String::from_utf8_lossy(run)
        }
    };
    non_blank(&text)
}

/// Decode a fixed-capacity UTF-16LE field (older producer layouts).
pub(crate) fn decode_utf16(field: &'static str, bytes: &[u8]) -> Option<String> {
    let units = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .take_while(|&unit| unit != 0);

    let mut lossy = false;
    let text: String = char::decode_utf16(units)
        .map(|r| {
            r.unwrap_or_else(|_| {
                lossy = true;
                char::REPLACEMENT_CHARACTER
            })
        })
        .collect();
    if lossy {
        debug!(field, "unpaired surrogate in UTF-16 field, decoding lossily");
    }
    non_blank(&text)
}

fn non_blank(text: &str) -> Option<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_owned())
    }
}

/// Convert a tenths-encoded measurement. Negative values are the producer's
/// "unavailable" sentinel.
pub(crate) fn tenths(raw: i16) -> Option<f64> {
    if raw < 0 {
        None
    } else {
        Some(f64::from(raw) / 10.0)
    }
}

/// Number of array elements to decode: `min(declared, capacity)`, with
/// negative declarations treated as zero.
pub(crate) fn capped_count(field: &'static str, declared: i64, capacity: usize) -> usize {
    if declared <= 0 {
        return 0;
    }
    let declared = declared as u64;
    if declared > capacity as u64 {
        debug!(field, declared, capacity, "declared count exceeds capacity, truncating");
        capacity
    } else {
        declared as usize
    }
}

// ── Encoding helpers ──────────────────────────────────────────────────────────

/// Mutable counterpart of [`Fields`], used to build layout images.
pub(crate) struct FieldsMut<'a> {
    raw: &'a mut [u8],
    base: usize,
}

impl<'a> FieldsMut<'a> {
    pub(crate) fn new(raw: &'a mut [u8]) -> Self {
        Self { raw, base: 0 }
    }

    pub(crate) fn element(&mut self, offset: usize, stride: usize, index: usize) -> FieldsMut<'_> {
        let base = self.base + offset + stride * index;
        FieldsMut {
            raw: &mut *self.raw,
            base,
        }
    }

    pub(crate) fn put(&mut self, offset: usize, bytes: &[u8]) {
        let start = self.base + offset;
        self.raw[start..start + bytes.len()].copy_from_slice(bytes);
    }

    pub(crate) fn u8(&mut self, offset: usize, v: u8) {
        self.put(offset, &[v]);
    }

    pub(crate) fn u16(&mut self, offset: usize, v: u16) {
        self.put(offset, &v.to_le_bytes());
    }

    pub(crate) fn i16(&mut self, offset: usize, v: i16) {
        self.put(offset, &v.to_le_bytes());
    }

    pub(crate) fn u32(&mut self, offset: usize, v: u32) {
        self.put(offset, &v.to_le_bytes());
    }

    pub(crate) fn i32(&mut self, offset: usize, v: i32) {
        self.put(offset, &v.to_le_bytes());
    }

    pub(crate) fn u64(&mut self, offset: usize, v: u64) {
        self.put(offset, &v.to_le_bytes());
    }

    #[cfg(test)]
    pub(crate) fn f64(&mut self, offset: usize, v: f64) {
        self.put(offset, &v.to_le_bytes());
    }

    /// Write `text` truncated to `len` bytes on a character boundary.
    /// The remainder of the field is left zeroed.
    pub(crate) fn utf8(&mut self, offset: usize, len: usize, text: Option<&str>) {
        let Some(text) = text else { return };
        let mut end = text.len().min(len);
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        self.put(offset, &text.as_bytes()[..end]);
    }

    /// Write `text` as UTF-16LE, truncated to `units` code units.
    #[cfg(test)]
    pub(crate) fn utf16(&mut self, offset: usize, units: usize, text: &str) {
        for (i, unit) in text.encode_utf16().take(units).enumerate() {
            self.u16(offset + i * 2, unit);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nul_terminated_text_stops_at_first_nul() {
        let mut field = [0u8; 32];
        field[..4].copy_from_slice(b"CPU0");
        assert_eq!(decode_utf8("name", &field), Some("CPU0".to_owned()));
    }

    #[test]
    fn all_zero_field_is_absent() {
        assert_eq!(decode_utf8("name", &[0u8; 32]), None);
    }

    #[test]
    fn whitespace_only_field_is_absent() {
        let mut field = [0u8; 16];
        field[..3].copy_from_slice(b"   ");
        assert_eq!(decode_utf8("name", &field), None);
    }

    #[test]
    fn unterminated_field_uses_full_capacity() {
        assert_eq!(decode_utf8("name", b"ABCD"), Some("ABCD".to_owned()));
    }

    #[test]
    fn invalid_utf8_degrades_to_replacement_text() {
        let field = [b'A', 0xFF, b'B', 0];
        let text = decode_utf8("name", &field).unwrap();
        assert!(text.starts_with('A'));
        assert!(text.contains(char::REPLACEMENT_CHARACTER));
    }

    #[test]
    fn utf16_field_decodes_until_nul_unit() {
        let mut field = [0u8; 16];
        for (i, unit) in "Disk".encode_utf16().enumerate() {
            field[i * 2..i * 2 + 2].copy_from_slice(&unit.to_le_bytes());
        }
        assert_eq!(decode_utf16("model", &field), Some("Disk".to_owned()));
    }

    #[test]
    fn utf16_unpaired_surrogate_is_replaced() {
        let mut field = [0u8; 8];
        field[..2].copy_from_slice(&0xD800u16.to_le_bytes());
        field[2..4].copy_from_slice(&(b'x' as u16).to_le_bytes());
        let text = decode_utf16("model", &field).unwrap();
        assert_eq!(text, "\u{FFFD}x");
    }

    #[test]
    fn tenths_sentinel_is_none() {
        assert_eq!(tenths(-1), None);
        assert_eq!(tenths(i16::MIN), None);
        assert_eq!(tenths(0), Some(0.0));
        assert_eq!(tenths(456), Some(45.6));
    }

    #[test]
    fn capped_count_never_exceeds_capacity() {
        assert_eq!(capped_count("n", 40, 32), 32);
        assert_eq!(capped_count("n", 5, 32), 5);
        assert_eq!(capped_count("n", -3, 32), 0);
    }

    #[test]
    fn out_of_range_field_is_an_error() {
        let raw = [0u8; 4];
        let fields = Fields::new(&raw);
        assert_eq!(
            fields.u64("memory", 0),
            Err(DecodeError::FieldOutOfRange {
                field: "memory",
                offset: 0,
                len: 8,
                available: 4,
            })
        );
    }

    #[test]
    fn utf8_writer_truncates_on_char_boundary() {
        let mut raw = [0u8; 4];
        FieldsMut::new(&mut raw).utf8(0, 4, Some("abcé"));
        assert_eq!(&raw, b"abc\0");
    }
}
