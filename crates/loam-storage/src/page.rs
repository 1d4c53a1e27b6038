//! On-disk page codec.
//!
//! Four page shapes, all little-endian, all padded with zeros to
//! [`PAGE_SIZE`]:
//!
//! - Metadata (page 0): `root_page_num (8) | free_list_head (8)`
//! - Internal: `page_type=1 (2) | num_keys (2) | keys (num_keys * 8) |
//!   children ((num_keys + 1) * 8)`
//! - Leaf: `page_type=2 (2) | num_keys (2) | keys (num_keys * 8) |
//!   values (num_keys * 8)`
//! - Free: `page_type=3 (2) | next_free_page (8)`
//!
//! Keys and values are fixed 8-byte fields, NUL-padded on encode and cut at
//! the first NUL on decode.

use crate::node::Node;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use loam_common::layout::{
    KEY_COUNT_SIZE, KEY_SIZE, PAGE_REF_SIZE, PAGE_SIZE, PAGE_TYPE_SIZE, VALUE_SIZE,
};
use loam_common::{Error, PageNum, PageType, Result};

/// Contents of the metadata page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Metadata {
    /// Page number of the tree root.
    pub root_page_num: PageNum,
    /// Head of the free-page list; `NO_PAGE` (or any value ≤ 0) when empty.
    pub free_list_head: PageNum,
}

/// Encodes the metadata page.
pub fn encode_metadata(meta: &Metadata) -> Bytes {
    let mut buf = BytesMut::with_capacity(PAGE_SIZE);
    buf.put_i64_le(meta.root_page_num);
    buf.put_i64_le(meta.free_list_head);
    buf.resize(PAGE_SIZE, 0);
    buf.freeze()
}

/// Decodes the metadata page.
pub fn decode_metadata(data: &[u8]) -> Result<Metadata> {
    check_page_len(data)?;
    let mut buf = data;
    Ok(Metadata {
        root_page_num: buf.get_i64_le(),
        free_list_head: buf.get_i64_le(),
    })
}

/// Encodes a free page pointing at the next entry of the free list.
pub fn encode_free(next_free_page: PageNum) -> Bytes {
    let mut buf = BytesMut::with_capacity(PAGE_SIZE);
    buf.put_i16_le(PageType::Free as i16);
    buf.put_i64_le(next_free_page);
    buf.resize(PAGE_SIZE, 0);
    buf.freeze()
}

/// Decodes a free page, returning the next free page number.
///
/// A non-free type tag means the free list points at a live page, which is
/// on-disk corruption.
pub fn decode_free(page_num: PageNum, data: &[u8]) -> Result<PageNum> {
    check_page_len(data)?;
    let mut buf = data;
    let tag = buf.get_i16_le();
    match PageType::try_from(tag) {
        Ok(PageType::Free) => Ok(buf.get_i64_le()),
        Ok(other) => Err(Error::PageCorrupted {
            page_num,
            reason: format!("free list points at a {:?} page", other),
        }),
        Err(_) => Err(Error::PageCorrupted {
            page_num,
            reason: format!("unrecognized page type {}", tag),
        }),
    }
}

/// Encodes an internal or leaf node into a page image.
///
/// Fails if a key or value exceeds its fixed field width or the node holds
/// more keys than a page can carry.
pub fn encode_node(node: &Node) -> Result<Bytes> {
    let mut buf = BytesMut::with_capacity(PAGE_SIZE);
    let page_type = if node.is_leaf {
        PageType::Leaf
    } else {
        PageType::Internal
    };
    buf.put_i16_le(page_type as i16);
    buf.put_i16_le(node.keys.len() as i16);
    for key in &node.keys {
        if key.len() > KEY_SIZE {
            return Err(Error::KeyTooLarge {
                len: key.len(),
                max: KEY_SIZE,
            });
        }
        put_padded(&mut buf, key, KEY_SIZE);
    }
    if node.is_leaf {
        for value in &node.values {
            if value.len() > VALUE_SIZE {
                return Err(Error::ValueTooLarge {
                    len: value.len(),
                    max: VALUE_SIZE,
                });
            }
            put_padded(&mut buf, value, VALUE_SIZE);
        }
    } else {
        for &child in &node.children {
            buf.put_i64_le(child);
        }
    }
    if buf.len() > PAGE_SIZE {
        return Err(Error::PageCorrupted {
            page_num: node.page_num,
            reason: format!("node with {} keys does not fit in a page", node.keys.len()),
        });
    }
    buf.resize(PAGE_SIZE, 0);
    Ok(buf.freeze())
}

/// Decodes an internal or leaf page into a node.
pub fn decode_node(page_num: PageNum, data: &[u8]) -> Result<Node> {
    check_page_len(data)?;
    let mut buf = data;
    let tag = buf.get_i16_le();
    let page_type = PageType::try_from(tag).map_err(|_| Error::PageCorrupted {
        page_num,
        reason: format!("unrecognized page type {}", tag),
    })?;
    if page_type == PageType::Free {
        return Err(Error::PageCorrupted {
            page_num,
            reason: "expected a node page, found a free page".to_string(),
        });
    }

    let num_keys = buf.get_i16_le();
    if num_keys < 0 {
        return Err(Error::PageCorrupted {
            page_num,
            reason: format!("negative key count {}", num_keys),
        });
    }
    let num_keys = num_keys as usize;
    let body = match page_type {
        PageType::Leaf => num_keys * (KEY_SIZE + VALUE_SIZE),
        _ => num_keys * KEY_SIZE + (num_keys + 1) * PAGE_REF_SIZE,
    };
    if PAGE_TYPE_SIZE + KEY_COUNT_SIZE + body > PAGE_SIZE {
        return Err(Error::PageCorrupted {
            page_num,
            reason: format!("key count {} does not fit in a page", num_keys),
        });
    }

    let mut keys = Vec::with_capacity(num_keys);
    for _ in 0..num_keys {
        keys.push(get_padded(&mut buf, KEY_SIZE, page_num)?);
    }

    if page_type == PageType::Leaf {
        let mut values = Vec::with_capacity(num_keys);
        for _ in 0..num_keys {
            values.push(get_padded(&mut buf, VALUE_SIZE, page_num)?);
        }
        Ok(Node {
            is_leaf: true,
            page_num,
            keys,
            values,
            children: Vec::new(),
        })
    } else {
        let mut children = Vec::with_capacity(num_keys + 1);
        for _ in 0..=num_keys {
            children.push(buf.get_i64_le());
        }
        Ok(Node {
            is_leaf: false,
            page_num,
            keys,
            values: Vec::new(),
            children,
        })
    }
}

fn check_page_len(data: &[u8]) -> Result<()> {
    if data.len() != PAGE_SIZE {
        return Err(Error::PageSizeMismatch {
            expected: PAGE_SIZE,
            actual: data.len(),
        });
    }
    Ok(())
}

/// Writes `s` as a fixed-width field, NUL-padded to `width`.
fn put_padded(buf: &mut BytesMut, s: &str, width: usize) {
    buf.put_slice(s.as_bytes());
    buf.put_bytes(0, width - s.len());
}

/// Reads a fixed-width field, cutting at the first NUL.
fn get_padded(buf: &mut &[u8], width: usize, page_num: PageNum) -> Result<String> {
    let field = &buf[..width];
    let end = field.iter().position(|&b| b == 0).unwrap_or(width);
    let s = std::str::from_utf8(&field[..end])
        .map_err(|_| Error::PageCorrupted {
            page_num,
            reason: "fixed-width field is not valid UTF-8".to_string(),
        })?
        .to_string();
    buf.advance(width);
    Ok(s)
}
