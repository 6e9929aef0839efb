//! CRC-32 trailer required on Bluetooth output reports. The controller
//! silently drops any report whose trailer does not match.
use crc32fast::Hasher;

/// Bluetooth HID transaction header (DATA | OUTPUT). It is never sent as part
/// of the report buffer but the controller includes it in the checksum.
pub const OUTPUT_CRC32_SEED: u8 = 0xa2;

/// Number of trailing bytes holding the checksum
pub const CRC_SIZE: usize = 4;

/// Compute the checksum for the given report bytes (without the trailer)
pub fn checksum(data: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(&[OUTPUT_CRC32_SEED]);
    hasher.update(data);
    hasher.finalize()
}

/// Compute the checksum over everything but the last four bytes of the
/// buffer and store it little-endian in those bytes.
pub fn append(buf: &mut [u8]) {
    if buf.len() < CRC_SIZE {
        return;
    }
    let len = buf.len();
    let crc = checksum(&buf[..len - CRC_SIZE]);
    buf[len - CRC_SIZE..].copy_from_slice(&crc.to_le_bytes());
}

/// Returns true if the trailing four bytes match the checksum of the rest of
/// the buffer.
pub fn verify(buf: &[u8]) -> bool {
    if buf.len() < CRC_SIZE {
        return false;
    }
    let len = buf.len();
    let mut trailer = [0u8; CRC_SIZE];
    trailer.copy_from_slice(&buf[len - CRC_SIZE..]);
    checksum(&buf[..len - CRC_SIZE]) == u32::from_le_bytes(trailer)
}
