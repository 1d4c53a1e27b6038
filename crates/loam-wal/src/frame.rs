//! WAL frame format.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use loam_common::layout::{PAGE_REF_SIZE, PAGE_SIZE};
use loam_common::{Error, PageNum, Result};

/// Number of bytes used to store a frame type tag.
pub const FRAME_TYPE_SIZE: usize = 2;

/// Types of WAL frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i16)]
pub enum FrameType {
    /// Durability marker: every PUT frame before it becomes committed.
    Commit = 1,
    /// Full-page write.
    Put = 2,
}

impl TryFrom<i16> for FrameType {
    type Error = Error;

    fn try_from(value: i16) -> Result<Self> {
        match value {
            1 => Ok(FrameType::Commit),
            2 => Ok(FrameType::Put),
            other => Err(Error::InvalidFrameType(other)),
        }
    }
}

/// A single WAL frame.
///
/// On-disk layout:
/// - COMMIT: `frame_type (2)`
/// - PUT: `frame_type (2) | page_num (8) | page_data (4096)`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Commit,
    Put { page_num: PageNum, data: Bytes },
}

impl Frame {
    /// Total size of a COMMIT frame on disk.
    pub const COMMIT_SIZE: usize = FRAME_TYPE_SIZE;

    /// Total size of a PUT frame on disk.
    pub const PUT_SIZE: usize = FRAME_TYPE_SIZE + PAGE_REF_SIZE + PAGE_SIZE;

    /// Size of this frame on disk.
    pub fn size_on_disk(&self) -> usize {
        match self {
            Frame::Commit => Self::COMMIT_SIZE,
            Frame::Put { .. } => Self::PUT_SIZE,
        }
    }

    /// Serializes this frame to bytes.
    pub fn encode(&self) -> Result<Bytes> {
        match self {
            Frame::Commit => {
                let mut buf = BytesMut::with_capacity(Self::COMMIT_SIZE);
                buf.put_i16_le(FrameType::Commit as i16);
                Ok(buf.freeze())
            }
            Frame::Put { page_num, data } => {
                if data.len() != PAGE_SIZE {
                    return Err(Error::PageSizeMismatch {
                        expected: PAGE_SIZE,
                        actual: data.len(),
                    });
                }
                let mut buf = BytesMut::with_capacity(Self::PUT_SIZE);
                buf.put_i16_le(FrameType::Put as i16);
                buf.put_i64_le(*page_num);
                buf.put_slice(data);
                Ok(buf.freeze())
            }
        }
    }

    /// Deserializes one frame from the front of `data`, returning the frame
    /// and the number of bytes it occupied.
    pub fn decode(data: &[u8]) -> Result<(Self, usize)> {
        if data.len() < FRAME_TYPE_SIZE {
            return Err(Error::WalCorrupted {
                offset: 0,
                reason: "frame shorter than its type tag".to_string(),
            });
        }
        let mut buf = data;
        let frame_type = FrameType::try_from(buf.get_i16_le())?;
        match frame_type {
            FrameType::Commit => Ok((Frame::Commit, Self::COMMIT_SIZE)),
            FrameType::Put => {
                if data.len() < Self::PUT_SIZE {
                    return Err(Error::WalCorrupted {
                        offset: 0,
                        reason: "truncated PUT frame".to_string(),
                    });
                }
                let page_num = buf.get_i64_le();
                let page_data = Bytes::copy_from_slice(&buf[..PAGE_SIZE]);
                Ok((
                    Frame::Put {
                        page_num,
                        data: page_data,
                    },
                    Self::PUT_SIZE,
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_type_conversion() {
        assert_eq!(FrameType::try_from(1).unwrap(), FrameType::Commit);
        assert_eq!(FrameType::try_from(2).unwrap(), FrameType::Put);
        assert!(FrameType::try_from(0).is_err());
        assert!(FrameType::try_from(3).is_err());
    }

    #[test]
    fn test_commit_frame_roundtrip() {
        let encoded = Frame::Commit.encode().unwrap();
        assert_eq!(encoded.len(), Frame::COMMIT_SIZE);
        assert_eq!(encoded.len(), 2);

        let (decoded, consumed) = Frame::decode(&encoded).unwrap();
        assert_eq!(decoded, Frame::Commit);
        assert_eq!(consumed, Frame::COMMIT_SIZE);
    }

    #[test]
    fn test_put_frame_roundtrip() {
        let frame = Frame::Put {
            page_num: 7,
            data: Bytes::from(vec![0xCD; PAGE_SIZE]),
        };
        let encoded = frame.encode().unwrap();
        assert_eq!(encoded.len(), Frame::PUT_SIZE);
        assert_eq!(encoded.len(), 4106);

        let (decoded, consumed) = Frame::decode(&encoded).unwrap();
        assert_eq!(decoded, frame);
        assert_eq!(consumed, Frame::PUT_SIZE);
    }

    #[test]
    fn test_put_frame_rejects_short_page() {
        let frame = Frame::Put {
            page_num: 1,
            data: Bytes::from_static(b"short"),
        };
        assert!(matches!(
            frame.encode(),
            Err(Error::PageSizeMismatch { .. })
        ));
    }

    #[test]
    fn test_decode_truncated_put() {
        let frame = Frame::Put {
            page_num: 1,
            data: Bytes::from(vec![0; PAGE_SIZE]),
        };
        let encoded = frame.encode().unwrap();
        assert!(Frame::decode(&encoded[..100]).is_err());
    }

    #[test]
    fn test_decode_unknown_type() {
        let bytes = 9i16.to_le_bytes();
        assert!(matches!(
            Frame::decode(&bytes),
            Err(Error::InvalidFrameType(9))
        ));
    }

    #[test]
    fn test_size_on_disk() {
        assert_eq!(Frame::Commit.size_on_disk(), 2);
        let frame = Frame::Put {
            page_num: 0,
            data: Bytes::from(vec![0; PAGE_SIZE]),
        };
        assert_eq!(frame.size_on_disk(), 4106);
    }
}
