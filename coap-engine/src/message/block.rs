// SPDX-License-Identifier: BSD-2-Clause
/*
 * Copyright © The coap-engine Contributors, all rights reserved.
 * This file is part of the coap-engine project, see the README file for
 * general information on this project and the NOTICE.md and LICENSE files
 * for information regarding copyright ownership and terms of use.
 *
 * message/block.rs - Block-wise transfer helpers.
 */

//! Block-wise transfer helpers ([RFC 7959](https://datatracker.ietf.org/doc/html/rfc7959)).

use std::io;

use crate::{error::OptionValueError, protocol::Block};

/// Largest block number that fits into a three byte block option.
const MAX_BLOCK_NUM: u32 = (1 << 20) - 1;

/// Decoded value of a Block1 or Block2 option.
///
/// # Examples
/// ```
/// use coap_engine::message::CoapBlockOption;
///
/// let block = CoapBlockOption::new(3, true, 64)?;
/// assert_eq!(block.to_raw(), (3 << 4) | 0x08 | 2);
/// assert_eq!(block.offset(), 192);
/// # Result::<(), coap_engine::error::OptionValueError>::Ok(())
/// ```
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct CoapBlockOption {
    num: u32,
    more: bool,
    szx: u8,
}

impl CoapBlockOption {
    /// Creates a block option for block `num` with the given block size.
    ///
    /// `size` must be a power of two between 16 and 1024.
    pub fn new(num: u32, more: bool, size: u16) -> Result<CoapBlockOption, OptionValueError> {
        let szx = szx_for_size(size).ok_or(OptionValueError::IllegalValue)?;
        if num > MAX_BLOCK_NUM {
            return Err(OptionValueError::TooLong);
        }
        Ok(CoapBlockOption { num, more, szx })
    }

    /// Decodes the raw option value.
    ///
    /// The reserved size exponent 7 is treated as 1024 byte blocks.
    pub fn from_raw(value: Block) -> CoapBlockOption {
        CoapBlockOption {
            num: value >> 4,
            more: value & 0x08 != 0,
            szx: ((value & 0x07) as u8).min(6),
        }
    }

    pub fn to_raw(self) -> Block {
        (self.num << 4) | (u32::from(self.more) << 3) | u32::from(self.szx)
    }

    pub fn num(self) -> u32 {
        self.num
    }

    /// Returns whether further blocks follow this one.
    pub fn more(self) -> bool {
        self.more
    }

    pub fn szx(self) -> u8 {
        self.szx
    }

    /// Block size in bytes.
    pub fn size(self) -> u16 {
        1 << (self.szx + 4)
    }

    /// Byte offset of this block within the full representation.
    pub fn offset(self) -> u32 {
        self.num * u32::from(self.size())
    }
}

/// Returns the size exponent for a block size, if it is a power of two in 16..=1024.
pub fn szx_for_size(size: u16) -> Option<u8> {
    if !(16..=1024).contains(&size) || !size.is_power_of_two() {
        return None;
    }
    Some(size.trailing_zeros() as u8 - 4)
}

/// Bounded output buffer handed to resource handlers.
///
/// The cursor carries the byte offset of the requested block within the full representation.
/// A handler that produces a representation larger than one block writes the part starting at
/// [offset()](BlockCursor::offset()) and announces where the next block starts with
/// [set_next_offset()](BlockCursor::set_next_offset()). Writes past the capacity are truncated.
#[derive(Debug)]
pub struct BlockCursor<'a> {
    buffer: &'a mut [u8],
    written: usize,
    offset: u32,
    next_offset: Option<u32>,
    chunked: bool,
}

impl<'a> BlockCursor<'a> {
    pub fn new(buffer: &'a mut [u8], offset: u32) -> BlockCursor<'a> {
        BlockCursor {
            buffer,
            written: 0,
            offset,
            next_offset: None,
            chunked: false,
        }
    }

    /// Preferred size of the block, i.e. the total capacity of the buffer.
    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    pub fn remaining(&self) -> usize {
        self.buffer.len() - self.written
    }

    /// Offset of the requested block within the full representation.
    pub fn offset(&self) -> u32 {
        self.offset
    }

    /// Appends as much of `data` as fits and returns the number of bytes written.
    pub fn write_bytes(&mut self, data: &[u8]) -> usize {
        let len = data.len().min(self.remaining());
        self.buffer[self.written..self.written + len].copy_from_slice(&data[..len]);
        self.written += len;
        len
    }

    /// Writes the slice of `representation` that belongs to the requested block and sets the
    /// next offset if the representation continues beyond it.
    pub fn write_block_of(&mut self, representation: &[u8]) -> usize {
        let start = (self.offset as usize).min(representation.len());
        let written = self.write_bytes(&representation[start..]);
        let end = start + written;
        self.set_next_offset(if end < representation.len() {
            Some(end as u32)
        } else {
            None
        });
        written
    }

    /// Returns the bytes written so far.
    pub fn data(&self) -> &[u8] {
        &self.buffer[..self.written]
    }

    pub fn len(&self) -> usize {
        self.written
    }

    pub fn is_empty(&self) -> bool {
        self.written == 0
    }

    /// Marks that the representation continues at `next_offset`, or is complete for `None`.
    pub fn set_next_offset(&mut self, next_offset: Option<u32>) {
        self.next_offset = next_offset;
        self.chunked = true;
    }

    /// Returns whether the handler produced the requested block itself, i.e. called
    /// [set_next_offset()](BlockCursor::set_next_offset()) or
    /// [write_block_of()](BlockCursor::write_block_of()). Otherwise, the written data is the
    /// start of the full representation.
    pub fn is_chunked(&self) -> bool {
        self.chunked
    }

    pub fn next_offset(&self) -> Option<u32> {
        self.next_offset
    }
}

impl io::Write for BlockCursor<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Ok(self.write_bytes(buf))
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
