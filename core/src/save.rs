//! Save-state serialization: a block-tagged container plus little-endian
//! read/write cursors for per-component state.
//!
//! The container is framed as magic `SMS3`, a 32-bit version, a 64-bit
//! total length, then a sequence of blocks (4-byte ASCII tag, 32-bit body
//! length, body) until end of file. Each subsystem owns its block's layout;
//! a missing block on load is tolerated (the subsystem resets and a warning
//! is logged), which keeps old states partially usable.

use std::io::{self, Read, Write};

use thiserror::Error;

pub const STATE_MAGIC: [u8; 4] = *b"SMS3";
pub const STATE_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum StateError {
    #[error("not a save-state file (bad magic)")]
    BadMagic,
    #[error("unsupported save-state version {0} (expected {STATE_VERSION})")]
    BadVersion(u32),
    #[error("truncated save-state file")]
    Truncated,
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// In-memory collection of tagged state blocks.
#[derive(Default)]
pub struct BlockFile {
    blocks: Vec<([u8; 4], Vec<u8>)>,
}

impl BlockFile {
    pub fn new() -> Self {
        BlockFile::default()
    }

    /// Start a new block with the given 4-character tag and return a writer
    /// for its body. Tags shorter than 4 bytes are space padded by their
    /// definitions (`b"PPC "`), matching the on-disk format.
    pub fn new_block(&mut self, tag: &[u8; 4]) -> BlockWriter<'_> {
        self.blocks.push((*tag, Vec::new()));
        let body = &mut self.blocks.last_mut().unwrap().1;
        BlockWriter { body }
    }

    /// Find a block by tag. Components treat `None` as "reset and warn".
    pub fn find(&self, tag: &[u8; 4]) -> Option<BlockReader<'_>> {
        self.blocks
            .iter()
            .find(|(t, _)| t == tag)
            .map(|(_, body)| BlockReader { body, pos: 0 })
    }

    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        let body_len: u64 = self
            .blocks
            .iter()
            .map(|(_, b)| 8 + b.len() as u64)
            .sum();
        w.write_all(&STATE_MAGIC)?;
        w.write_all(&STATE_VERSION.to_le_bytes())?;
        w.write_all(&(16 + body_len).to_le_bytes())?;
        for (tag, body) in &self.blocks {
            w.write_all(tag)?;
            w.write_all(&(body.len() as u32).to_le_bytes())?;
            w.write_all(body)?;
        }
        Ok(())
    }

    pub fn read_from<R: Read>(r: &mut R) -> Result<Self, StateError> {
        let mut magic = [0u8; 4];
        r.read_exact(&mut magic).map_err(eof_as_truncated)?;
        if magic != STATE_MAGIC {
            return Err(StateError::BadMagic);
        }
        let mut word = [0u8; 4];
        r.read_exact(&mut word).map_err(eof_as_truncated)?;
        let version = u32::from_le_bytes(word);
        if version != STATE_VERSION {
            return Err(StateError::BadVersion(version));
        }
        let mut qword = [0u8; 8];
        r.read_exact(&mut qword).map_err(eof_as_truncated)?;

        let mut blocks = Vec::new();
        loop {
            let mut tag = [0u8; 4];
            match r.read_exact(&mut tag) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e.into()),
            }
            r.read_exact(&mut word).map_err(eof_as_truncated)?;
            let len = u32::from_le_bytes(word) as usize;
            let mut body = vec![0u8; len];
            r.read_exact(&mut body).map_err(eof_as_truncated)?;
            blocks.push((tag, body));
        }
        Ok(BlockFile { blocks })
    }
}

fn eof_as_truncated(e: io::Error) -> StateError {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        StateError::Truncated
    } else {
        StateError::Io(e)
    }
}

/// Append-only little-endian cursor over one block body.
pub struct BlockWriter<'a> {
    body: &'a mut Vec<u8>,
}

impl BlockWriter<'_> {
    pub fn put_u8(&mut self, v: u8) {
        self.body.push(v);
    }
    pub fn put_u16(&mut self, v: u16) {
        self.body.extend_from_slice(&v.to_le_bytes());
    }
    pub fn put_u32(&mut self, v: u32) {
        self.body.extend_from_slice(&v.to_le_bytes());
    }
    pub fn put_u64(&mut self, v: u64) {
        self.body.extend_from_slice(&v.to_le_bytes());
    }
    pub fn put_i32(&mut self, v: i32) {
        self.put_u32(v as u32);
    }
    pub fn put_f32(&mut self, v: f32) {
        self.put_u32(v.to_bits());
    }
    pub fn put_f64(&mut self, v: f64) {
        self.put_u64(v.to_bits());
    }
    pub fn put_bool(&mut self, v: bool) {
        self.put_u8(v as u8);
    }
    pub fn put_bytes(&mut self, v: &[u8]) {
        self.body.extend_from_slice(v);
    }
}

/// Little-endian read cursor over one block body. Reads past the end
/// return zeros rather than panicking: a short block from an older state
/// degrades to power-on defaults for the missing tail.
pub struct BlockReader<'a> {
    body: &'a [u8],
    pos: usize,
}

impl BlockReader<'_> {
    fn take<const N: usize>(&mut self) -> [u8; N] {
        let mut out = [0u8; N];
        let avail = self.body.len().saturating_sub(self.pos).min(N);
        out[..avail].copy_from_slice(&self.body[self.pos..self.pos + avail]);
        self.pos += avail;
        out
    }

    pub fn get_u8(&mut self) -> u8 {
        self.take::<1>()[0]
    }
    pub fn get_u16(&mut self) -> u16 {
        u16::from_le_bytes(self.take())
    }
    pub fn get_u32(&mut self) -> u32 {
        u32::from_le_bytes(self.take())
    }
    pub fn get_u64(&mut self) -> u64 {
        u64::from_le_bytes(self.take())
    }
    pub fn get_i32(&mut self) -> i32 {
        self.get_u32() as i32
    }
    pub fn get_f32(&mut self) -> f32 {
        f32::from_bits(self.get_u32())
    }
    pub fn get_f64(&mut self) -> f64 {
        f64::from_bits(self.get_u64())
    }
    pub fn get_bool(&mut self) -> bool {
        self.get_u8() != 0
    }
    pub fn get_bytes(&mut self, out: &mut [u8]) {
        let avail = self.body.len().saturating_sub(self.pos).min(out.len());
        out[..avail].copy_from_slice(&self.body[self.pos..self.pos + avail]);
        for b in &mut out[avail..] {
            *b = 0;
        }
        self.pos += avail;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn container_round_trip() {
        let mut file = BlockFile::new();
        {
            let mut b = file.new_block(b"PPC ");
            b.put_u32(0xDEAD_BEEF);
            b.put_u8(7);
        }
        {
            let mut b = file.new_block(b"M68K");
            b.put_u16(0x2700);
        }

        let mut bytes = Vec::new();
        file.write_to(&mut bytes).unwrap();
        assert_eq!(&bytes[0..4], b"SMS3");

        let loaded = BlockFile::read_from(&mut bytes.as_slice()).unwrap();
        let mut b = loaded.find(b"PPC ").unwrap();
        assert_eq!(b.get_u32(), 0xDEAD_BEEF);
        assert_eq!(b.get_u8(), 7);
        let mut b = loaded.find(b"M68K").unwrap();
        assert_eq!(b.get_u16(), 0x2700);
        assert!(loaded.find(b"DSB1").is_none());
    }

    #[test]
    fn bad_magic_rejected() {
        let bytes = b"XXXX\x01\x00\x00\x00\x10\x00\x00\x00\x00\x00\x00\x00";
        assert!(matches!(
            BlockFile::read_from(&mut bytes.as_slice()),
            Err(StateError::BadMagic)
        ));
    }

    #[test]
    fn short_block_reads_as_zero() {
        let mut file = BlockFile::new();
        file.new_block(b"Z80 ").put_u8(0xAA);
        let mut r = file.find(b"Z80 ").unwrap();
        assert_eq!(r.get_u8(), 0xAA);
        assert_eq!(r.get_u32(), 0);
    }
}
