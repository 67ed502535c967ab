//! Attribute blob codec (panic-free).
//!
//! Layout, little-endian, no padding:
//! - object head: `{u32 attrs_size; u32 attrs_count}` then `attrs_size` bytes
//! - attribute record: `{u32 id; u32 size}` then `size` bytes
//!
//! Parsing rules:
//! - Never index (`buf[0]`), always go through `Buf` and `remaining()` checks.
//! - Input is untrusted. Every length is checked against what is left.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{P11Error, Result};

/// Encoded size of the object head.
pub const OBJECT_HEAD_SIZE: usize = 8;
/// Encoded size of an attribute record header.
pub const RECORD_HEAD_SIZE: usize = 8;

/// Decoded object head.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectHead {
    /// Byte length of the attribute region.
    pub attrs_size: u32,
    /// Number of records in the attribute region.
    pub attrs_count: u32,
}

/// One attribute record, borrowed from the input buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttrRecord<'a> {
    pub id: u32,
    pub value: &'a [u8],
}

impl AttrRecord<'_> {
    /// Encoded length of this record.
    pub fn encoded_len(&self) -> usize {
        RECORD_HEAD_SIZE + self.value.len()
    }
}

/// Split a serialized object into its head and attribute region.
///
/// Bytes past `head + attrs_size` are ignored.
pub fn decode_object(buf: &[u8]) -> Result<(ObjectHead, &[u8])> {
    let mut cur = buf;
    if cur.remaining() < OBJECT_HEAD_SIZE {
        return Err(P11Error::BadParameters("object head truncated".into()));
    }
    let head = ObjectHead {
        attrs_size: cur.get_u32_le(),
        attrs_count: cur.get_u32_le(),
    };

    let region = cur
        .get(..head.attrs_size as usize)
        .ok_or_else(|| P11Error::BadParameters("attribute region exceeds buffer".into()))?;

    Ok((head, region))
}

/// Checked cursor over an attribute region.
#[derive(Debug, Clone)]
pub struct RecordReader<'a> {
    cur: &'a [u8],
    failed: bool,
}

impl<'a> RecordReader<'a> {
    pub fn new(region: &'a [u8]) -> Self {
        Self {
            cur: region,
            failed: false,
        }
    }

    fn next_record(&mut self) -> Result<AttrRecord<'a>> {
        if self.cur.remaining() < RECORD_HEAD_SIZE {
            return Err(P11Error::BadParameters(
                "attribute header overruns region".into(),
            ));
        }
        let id = self.cur.get_u32_le();
        let size = self.cur.get_u32_le() as usize;

        let rest: &'a [u8] = self.cur;
        let value = rest.get(..size).ok_or_else(|| {
            P11Error::BadParameters(format!("attribute {id:#x} value overruns region"))
        })?;
        self.cur.advance(size);

        Ok(AttrRecord { id, value })
    }
}

impl<'a> Iterator for RecordReader<'a> {
    type Item = Result<AttrRecord<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || !self.cur.has_remaining() {
            return None;
        }
        let res = self.next_record();
        self.failed = res.is_err();
        Some(res)
    }
}

/// Decode a full object into records, checking the declared count.
pub fn decode_records(buf: &[u8]) -> Result<Vec<AttrRecord<'_>>> {
    let (head, region) = decode_object(buf)?;
    let records = RecordReader::new(region).collect::<Result<Vec<_>>>()?;
    if records.len() != head.attrs_count as usize {
        return Err(P11Error::BadParameters(format!(
            "attribute count {} does not match {} records",
            head.attrs_count,
            records.len()
        )));
    }
    Ok(records)
}

fn len_u32(len: usize) -> Result<u32> {
    u32::try_from(len).map_err(|_| P11Error::BadParameters("length exceeds u32".into()))
}

/// Record head for a value of `len` bytes; `out` is untouched on error.
fn put_record_head(out: &mut BytesMut, id: u32, len: usize) -> Result<()> {
    let size = len_u32(len)?;
    out.reserve(RECORD_HEAD_SIZE + len);
    out.put_u32_le(id);
    out.put_u32_le(size);
    Ok(())
}

/// Append one attribute record. Nothing is written if the value is too long.
pub fn put_record(out: &mut BytesMut, id: u32, value: &[u8]) -> Result<()> {
    put_record_head(out, id, value.len())?;
    out.put_slice(value);
    Ok(())
}

/// Encode records into the object-head layout.
pub fn encode_object<'a, I>(records: I) -> Result<Bytes>
where
    I: IntoIterator<Item = AttrRecord<'a>>,
{
    let mut body = BytesMut::new();
    let mut count: u32 = 0;
    for r in records {
        put_record(&mut body, r.id, r.value)?;
        count = count
            .checked_add(1)
            .ok_or_else(|| P11Error::BadParameters("too many attributes".into()))?;
    }

    let mut out = BytesMut::with_capacity(OBJECT_HEAD_SIZE + body.len());
    out.put_u32_le(len_u32(body.len())?);
    out.put_u32_le(count);
    out.extend_from_slice(&body);
    Ok(out.freeze())
}
