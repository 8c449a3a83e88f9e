//! Little-endian byte primitives shared by the value codec and the walker.

use crate::error::{corrupt, GraphError, GraphResult};

pub(crate) const NODE_NULL: u8 = 0;
pub(crate) const NODE_BACK_REF: u8 = 1;
pub(crate) const NODE_FRESH: u8 = 2;

pub(crate) const ROOT_OBJECT: u8 = 0;
pub(crate) const ROOT_LIST: u8 = 1;

#[derive(Debug, Default)]
pub(crate) struct WireWriter {
    buf: Vec<u8>,
}

impl WireWriter {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn into_inner(self) -> Vec<u8> {
        self.buf
    }

    pub(crate) fn put_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    pub(crate) fn put_u16(&mut self, value: u16) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub(crate) fn put_u32(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub(crate) fn put_u64(&mut self, value: u64) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub(crate) fn put_i64(&mut self, value: i64) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub(crate) fn put_f32(&mut self, value: f32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub(crate) fn put_f64(&mut self, value: f64) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    /// Writes a count as u32, rejecting anything the format cannot express.
    pub(crate) fn put_len(&mut self, len: usize) -> GraphResult<()> {
        let len = u32::try_from(len).map_err(|_| {
            GraphError::ResourceLimit(format!("length {len} does not fit the stream format"))
        })?;
        self.put_u32(len);
        Ok(())
    }

    pub(crate) fn put_bytes(&mut self, bytes: &[u8]) -> GraphResult<()> {
        self.put_len(bytes.len())?;
        self.buf.extend_from_slice(bytes);
        Ok(())
    }

    pub(crate) fn put_str(&mut self, value: &str) -> GraphResult<()> {
        self.put_bytes(value.as_bytes())
    }
}

#[derive(Debug)]
pub(crate) struct WireReader<'a> {
    input: &'a [u8],
    pos: usize,
}

impl<'a> WireReader<'a> {
    pub(crate) fn new(input: &'a [u8]) -> Self {
        Self { input, pos: 0 }
    }

    pub(crate) fn remaining(&self) -> usize {
        self.input.len() - self.pos
    }

    pub(crate) fn position(&self) -> usize {
        self.pos
    }

    fn take(&mut self, count: usize) -> GraphResult<&'a [u8]> {
        let end = self
            .pos
            .checked_add(count)
            .filter(|end| *end <= self.input.len())
            .ok_or_else(|| {
                corrupt(format!(
                    "unexpected end of stream at byte {} (needed {count} more)",
                    self.pos
                ))
            })?;
        let slice = &self.input[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn take_array<const N: usize>(&mut self) -> GraphResult<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub(crate) fn u8(&mut self) -> GraphResult<u8> {
        Ok(self.take_array::<1>()?[0])
    }

    pub(crate) fn u16(&mut self) -> GraphResult<u16> {
        Ok(u16::from_le_bytes(self.take_array()?))
    }

    pub(crate) fn u32(&mut self) -> GraphResult<u32> {
        Ok(u32::from_le_bytes(self.take_array()?))
    }

    pub(crate) fn u64(&mut self) -> GraphResult<u64> {
        Ok(u64::from_le_bytes(self.take_array()?))
    }

    pub(crate) fn i64(&mut self) -> GraphResult<i64> {
        Ok(i64::from_le_bytes(self.take_array()?))
    }

    pub(crate) fn f32(&mut self) -> GraphResult<f32> {
        Ok(f32::from_le_bytes(self.take_array()?))
    }

    pub(crate) fn f64(&mut self) -> GraphResult<f64> {
        Ok(f64::from_le_bytes(self.take_array()?))
    }

    /// Reads a u32 count and checks it against `max` before anything is
    /// allocated for it.
    pub(crate) fn len(&mut self, max: usize, what: &str) -> GraphResult<usize> {
        let len = self.u32()? as usize;
        if len > max {
            return Err(GraphError::ResourceLimit(format!(
                "{what} length {len} exceeds limit {max}"
            )));
        }
        Ok(len)
    }

    pub(crate) fn bytes(&mut self, max: usize) -> GraphResult<&'a [u8]> {
        let len = self.len(max, "byte buffer")?;
        self.take(len)
    }

    pub(crate) fn string(&mut self, max: usize) -> GraphResult<String> {
        let bytes = self.bytes(max)?;
        std::str::from_utf8(bytes)
            .map(str::to_owned)
            .map_err(|err| corrupt(format!("invalid utf-8 string: {err}")))
    }
}
