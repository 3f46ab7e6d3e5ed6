use bytes::{BufMut, BytesMut};

use crate::error::{CodecError, Result};

const MAX_SOURCE_OR_SYSTEM: usize = 0x1FF;
const MAX_VECTOR: usize = 0xFFFF;
const MAX_ASYNC: usize = 0x7FFF;

/// Context association lists: the streams a context packet is linked to.
///
/// ```text
/// word 1: 31..25 reserved | 24..16 source count | 15..9 reserved | 8..0 system count
/// word 2: 31..16 vector count | 15 A (tags present) | 14..0 async channel count
/// then: source ids, system ids, vector ids, async ids, async tags (if A)
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ContextAssocLists {
    pub source: Vec<u32>,
    pub system: Vec<u32>,
    pub vector: Vec<u32>,
    pub async_channel: Vec<u32>,
    /// One tag per asynchronous channel id, when present.
    pub async_tags: Option<Vec<u32>>,
}

impl ContextAssocLists {
    /// Total field size implied by the two leading words in `buf`.
    pub fn field_len(buf: &[u8]) -> Result<usize> {
        if buf.len() < 8 {
            return Err(CodecError::Truncated {
                needed: 8,
                available: buf.len(),
            });
        }
        let first = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]);
        let second = u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]);
        let (source, system, vector, async_count, tags) = counts(first, second);
        let words = source + system + vector + async_count + if tags { async_count } else { 0 };
        Ok(8 + words * 4)
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        let len = Self::field_len(buf)?;
        if buf.len() < len {
            return Err(CodecError::Truncated {
                needed: len,
                available: buf.len(),
            });
        }
        let first = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]);
        let second = u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]);
        let (source, system, vector, async_count, tags) = counts(first, second);

        let mut ids = buf[8..len]
            .chunks_exact(4)
            .map(|c| u32::from_be_bytes([c[0], c[1], c[2], c[3]]));
        let mut take = |n: usize| ids.by_ref().take(n).collect::<Vec<u32>>();

        let source = take(source);
        let system = take(system);
        let vector = take(vector);
        let async_channel = take(async_count);
        let async_tags = tags.then(|| take(async_count));

        Ok(Self {
            source,
            system,
            vector,
            async_channel,
            async_tags,
        })
    }

    pub fn wire_len(&self) -> usize {
        let tags = self.async_tags.as_ref().map_or(0, Vec::len);
        8 + 4 * (self.source.len()
            + self.system.len()
            + self.vector.len()
            + self.async_channel.len()
            + tags)
    }

    pub fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        check_len("source", self.source.len(), MAX_SOURCE_OR_SYSTEM)?;
        check_len("system", self.system.len(), MAX_SOURCE_OR_SYSTEM)?;
        check_len("vector", self.vector.len(), MAX_VECTOR)?;
        check_len("async channel", self.async_channel.len(), MAX_ASYNC)?;
        if let Some(tags) = &self.async_tags {
            if tags.len() != self.async_channel.len() {
                return Err(CodecError::InvalidField(format!(
                    "{} async tags for {} async channels",
                    tags.len(),
                    self.async_channel.len()
                )));
            }
        }

        dst.reserve(self.wire_len());
        dst.put_u32(((self.source.len() as u32) << 16) | self.system.len() as u32);
        let mut second = ((self.vector.len() as u32) << 16) | self.async_channel.len() as u32;
        if self.async_tags.is_some() {
            second |= 0x8000;
        }
        dst.put_u32(second);

        let tags = self.async_tags.iter().flatten();
        for id in self
            .source
            .iter()
            .chain(&self.system)
            .chain(&self.vector)
            .chain(&self.async_channel)
            .chain(tags)
        {
            dst.put_u32(*id);
        }
        Ok(())
    }

    /// Source and system stream ids: the links followed when collecting
    /// initial context.
    pub fn linked_stream_ids(&self) -> impl Iterator<Item = u32> + '_ {
        self.source.iter().chain(&self.system).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.source.is_empty()
            && self.system.is_empty()
            && self.vector.is_empty()
            && self.async_channel.is_empty()
    }
}

fn counts(first: u32, second: u32) -> (usize, usize, usize, usize, bool) {
    (
        ((first >> 16) & 0x1FF) as usize,
        (first & 0x1FF) as usize,
        (second >> 16) as usize,
        (second & 0x7FFF) as usize,
        second & 0x8000 != 0,
    )
}

fn check_len(name: &str, len: usize, max: usize) -> Result<()> {
    if len > max {
        return Err(CodecError::InvalidField(format!(
            "{name} association list has {len} entries (max {max})"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_all_lists() {
        let lists = ContextAssocLists {
            source: vec![9, 10],
            system: vec![11],
            vector: vec![],
            async_channel: vec![20, 21],
            async_tags: Some(vec![1, 2]),
        };
        let mut buf = BytesMut::new();
        lists.encode(&mut buf).unwrap();
        assert_eq!(buf.len(), lists.wire_len());
        assert_eq!(ContextAssocLists::field_len(&buf).unwrap(), buf.len());
        assert_eq!(ContextAssocLists::decode(&buf).unwrap(), lists);
        assert_eq!(lists.linked_stream_ids().collect::<Vec<_>>(), vec![9, 10, 11]);
    }

    #[test]
    fn header_word_layout() {
        let lists = ContextAssocLists {
            source: vec![1],
            system: vec![2, 3],
            ..Default::default()
        };
        let mut buf = BytesMut::new();
        lists.encode(&mut buf).unwrap();
        assert_eq!(&buf[..8], &[0x00, 0x01, 0x00, 0x02, 0, 0, 0, 0]);
    }

    #[test]
    fn mismatched_tags_rejected() {
        let lists = ContextAssocLists {
            async_channel: vec![1, 2],
            async_tags: Some(vec![1]),
            ..Default::default()
        };
        assert!(lists.encode(&mut BytesMut::new()).is_err());
    }

    #[test]
    fn truncated_lists() {
        let buf = [0x00, 0x02, 0x00, 0x00, 0, 0, 0, 0, 0, 0, 0, 9];
        assert!(matches!(
            ContextAssocLists::decode(&buf),
            Err(CodecError::Truncated { needed: 16, .. })
        ));
    }
}
