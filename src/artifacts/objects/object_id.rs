//! Object identifiers
//!
//! An id is the 40-hex SHA-1 digest of an object's framed content. Trees,
//! commits, pack entries and the index embed the binary (20-byte) form;
//! the loose store fans the hex form out on its first two characters.

use crate::artifacts::objects::{OBJECT_ID_LENGTH, RAW_OBJECT_ID_LENGTH};
use std::io;
use std::path::PathBuf;

/// Number of hex characters in the abbreviated form
pub const SHORT_OID_LENGTH: usize = 7;

/// Content hash identifying an immutable stored object.
///
/// Always a validated 40-character hexadecimal string; derived from
/// content, never assigned.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct ObjectId(String);

impl ObjectId {
    /// Validate a 40-character hex string as an object id.
    pub fn try_parse(id: String) -> anyhow::Result<Self> {
        if id.len() != OBJECT_ID_LENGTH {
            anyhow::bail!("invalid object id length: {}", id.len());
        }
        if !id.chars().all(|c| c.is_ascii_hexdigit()) {
            anyhow::bail!("invalid object id characters: {}", id);
        }
        Ok(Self(id))
    }

    /// Decode the binary (20-byte) form.
    pub fn from_raw_bytes(bytes: &[u8]) -> anyhow::Result<Self> {
        if bytes.len() != RAW_OBJECT_ID_LENGTH {
            anyhow::bail!("invalid raw object id length: {}", bytes.len());
        }
        let mut hex = String::with_capacity(OBJECT_ID_LENGTH);
        for byte in bytes {
            hex.push_str(&format!("{:02x}", byte));
        }
        Ok(Self(hex))
    }

    /// Write the binary form, as embedded in trees, pack entries and the
    /// index.
    pub fn write_raw_to<W: io::Write>(&self, writer: &mut W) -> anyhow::Result<()> {
        for i in (0..OBJECT_ID_LENGTH).step_by(2) {
            let byte = u8::from_str_radix(&self.0[i..i + 2], 16)
                .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "invalid hex digit"))?;
            writer.write_all(&[byte])?;
        }
        Ok(())
    }

    /// Read the binary form back.
    pub fn read_raw_from<R: io::Read + ?Sized>(reader: &mut R) -> anyhow::Result<Self> {
        let mut raw = [0u8; RAW_OBJECT_ID_LENGTH];
        reader.read_exact(&mut raw)?;
        Self::from_raw_bytes(&raw)
    }

    /// Loose-store path, fanned out as `xx/yyyy…`.
    pub fn to_path(&self) -> PathBuf {
        let (dir, file) = self.0.split_at(2);
        PathBuf::from(dir).join(file)
    }

    /// Abbreviated form (first seven characters).
    pub fn to_short_oid(&self) -> String {
        self.0.split_at(SHORT_OID_LENGTH).0.to_string()
    }
}

impl AsRef<str> for ObjectId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
