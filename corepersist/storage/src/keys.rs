//! Row and column key encoding.
//!
//! Strings are written with a big-endian `u16` length prefix, uuids as their 16 raw bytes and
//! integers big-endian, so fixed-width components keep their natural sort order.

use bytes::{BufMut, Bytes, BytesMut};
use corepersist_common::id::Id;
use corepersist_common::scope::ApplicationScope;
use corepersist_common::version::Version;
use uuid::Uuid;

use crate::error::{StorageError, StorageResult};

#[derive(Debug, Default)]
pub struct KeyBuilder {
    buf: BytesMut,
}

impl KeyBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn str(mut self, value: &str) -> Self {
        self.buf.put_u16(value.len() as u16);
        self.buf.put_slice(value.as_bytes());
        self
    }

    pub fn uuid(mut self, value: Uuid) -> Self {
        self.buf.put_slice(value.as_bytes());
        self
    }

    /// Opaque bytes with a big-endian `u32` length prefix.
    pub fn bytes(mut self, value: &[u8]) -> Self {
        self.buf.put_u32(value.len() as u32);
        self.buf.put_slice(value);
        self
    }

    pub fn u64(mut self, value: u64) -> Self {
        self.buf.put_u64(value);
        self
    }

    pub fn u8(mut self, value: u8) -> Self {
        self.buf.put_u8(value);
        self
    }

    pub fn version(self, version: Version) -> Self {
        self.uuid(version.as_uuid())
    }

    pub fn id(self, id: &Id) -> Self {
        self.str(id.id_type()).uuid(id.uuid())
    }

    pub fn scope(self, scope: &ApplicationScope) -> Self {
        self.id(scope.application())
    }

    pub fn build(self) -> Bytes {
        self.buf.freeze()
    }
}

/// Reads back the components written by [`KeyBuilder`], in order.
#[derive(Debug)]
pub struct KeyReader<'a> {
    buf: &'a [u8],
}

impl<'a> KeyReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    pub fn str(&mut self) -> StorageResult<&'a str> {
        let len = u16::from_be_bytes(self.take_array::<2>()?) as usize;
        let bytes = self.take(len)?;
        std::str::from_utf8(bytes).map_err(|e| StorageError::Corrupted(e.to_string()))
    }

    pub fn bytes(&mut self) -> StorageResult<&'a [u8]> {
        let len = u32::from_be_bytes(self.take_array::<4>()?) as usize;
        self.take(len)
    }

    pub fn uuid(&mut self) -> StorageResult<Uuid> {
        Ok(Uuid::from_bytes(self.take_array::<16>()?))
    }

    pub fn u64(&mut self) -> StorageResult<u64> {
        Ok(u64::from_be_bytes(self.take_array::<8>()?))
    }

    pub fn u8(&mut self) -> StorageResult<u8> {
        Ok(self.take_array::<1>()?[0])
    }

    pub fn version(&mut self) -> StorageResult<Version> {
        self.uuid().map(Version::from_uuid)
    }

    pub fn id(&mut self) -> StorageResult<Id> {
        let id_type = self.str()?;
        let uuid = self.uuid()?;
        Ok(Id::new(id_type, uuid))
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    fn take(&mut self, len: usize) -> StorageResult<&'a [u8]> {
        if self.buf.len() < len {
            return Err(StorageError::Corrupted(format!(
                "key truncated: needed {len} bytes, {} left",
                self.buf.len()
            )));
        }
        let (head, tail) = self.buf.split_at(len);
        self.buf = tail;
        Ok(head)
    }

    fn take_array<const N: usize>(&mut self) -> StorageResult<[u8; N]> {
        let bytes = self.take(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_components_read_back() {
        let id = Id::generate("user");
        let version = Version::from_parts(99, 1);
        let key = KeyBuilder::new()
            .id(&id)
            .str("likes")
            .u64(7)
            .version(version)
            .u8(2)
            .bytes(b"raw")
            .build();

        let mut reader = KeyReader::new(&key);
        assert_eq!(reader.id().unwrap(), id);
        assert_eq!(reader.str().unwrap(), "likes");
        assert_eq!(reader.u64().unwrap(), 7);
        assert_eq!(reader.version().unwrap(), version);
        assert_eq!(reader.u8().unwrap(), 2);
        assert_eq!(reader.bytes().unwrap(), b"raw");
        assert!(reader.is_empty());
        assert!(reader.u8().is_err());
    }

    #[test]
    fn test_version_prefix_sorts_by_version() {
        let older = KeyBuilder::new().version(Version::from_parts(1, 9)).str("z").build();
        let newer = KeyBuilder::new().version(Version::from_parts(2, 0)).str("a").build();
        assert!(older < newer);
    }
}
