//! Minimal script construction and push decoding.
//!
//! Only what a coinbase needs: minimally encoded number and data pushes, plus
//! a reader that walks pushes back out again.

use thiserror::Error;

pub const OP_0: u8 = 0x00;
pub const OP_PUSHDATA1: u8 = 0x4c;
pub const OP_PUSHDATA2: u8 = 0x4d;
pub const OP_PUSHDATA4: u8 = 0x4e;
pub const OP_1NEGATE: u8 = 0x4f;
pub const OP_1: u8 = 0x51;
pub const OP_16: u8 = 0x60;
pub const OP_RETURN: u8 = 0x6a;
pub const OP_DUP: u8 = 0x76;
pub const OP_EQUAL: u8 = 0x87;
pub const OP_EQUALVERIFY: u8 = 0x88;
pub const OP_HASH160: u8 = 0xa9;
pub const OP_CHECKSIG: u8 = 0xac;

/// Largest single push the interpreter accepts.
pub const MAX_SCRIPT_ELEMENT_SIZE: usize = 520;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScriptError {
    #[error("push of {0} bytes exceeds the 520 byte element limit")]
    PushTooLarge(usize),
    #[error("script ends inside a push")]
    Truncated,
}

/// Appends opcodes and pushes to a script.
#[derive(Debug, Clone, Default)]
pub struct ScriptBuilder {
    script: Vec<u8>,
    error: Option<ScriptError>,
}

impl ScriptBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_opcode(mut self, opcode: u8) -> Self {
        self.script.push(opcode);
        self
    }

    /// Push a signed number, using OP_0, OP_1NEGATE and OP_1..OP_16 where they apply.
    pub fn push_int(self, value: i64) -> Self {
        match value {
            0 => self.push_opcode(OP_0),
            -1 => self.push_opcode(OP_1NEGATE),
            1..=16 => self.push_opcode(OP_1 + (value as u8 - 1)),
            _ => {
                let bytes = encode_script_num(value.unsigned_abs(), value < 0);
                self.push_raw_data(&bytes)
            }
        }
    }

    /// Push an unsigned 64-bit number. Values above `i64::MAX` still encode as
    /// positive script numbers (nine bytes).
    pub fn push_uint(self, value: u64) -> Self {
        match value {
            0..=16 => self.push_int(value as i64),
            _ => {
                let bytes = encode_script_num(value, false);
                self.push_raw_data(&bytes)
            }
        }
    }

    /// Push arbitrary data with the smallest push opcode that fits.
    pub fn push_slice(self, data: &[u8]) -> Self {
        match *data {
            [] | [0] => self.push_opcode(OP_0),
            [n @ 1..=16] => self.push_opcode(OP_1 + (n - 1)),
            [0x81] => self.push_opcode(OP_1NEGATE),
            _ => self.push_raw_data(data),
        }
    }

    fn push_raw_data(mut self, data: &[u8]) -> Self {
        if data.len() > MAX_SCRIPT_ELEMENT_SIZE {
            self.error.get_or_insert(ScriptError::PushTooLarge(data.len()));
            return self;
        }
        let len = data.len();
        if len < OP_PUSHDATA1 as usize {
            self.script.push(len as u8);
        } else if len <= 0xff {
            self.script.push(OP_PUSHDATA1);
            self.script.push(len as u8);
        } else {
            self.script.push(OP_PUSHDATA2);
            self.script.extend_from_slice(&(len as u16).to_le_bytes());
        }
        self.script.extend_from_slice(data);
        self
    }

    /// Finish the script, reporting the first push that failed.
    pub fn into_script(self) -> Result<Vec<u8>, ScriptError> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.script),
        }
    }
}

/// Minimal little-endian script number encoding with a sign bit.
fn encode_script_num(mut magnitude: u64, negative: bool) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(9);
    while magnitude > 0 {
        bytes.push((magnitude & 0xff) as u8);
        magnitude >>= 8;
    }
    if let Some(last) = bytes.last_mut() {
        if *last & 0x80 != 0 {
            bytes.push(if negative { 0x80 } else { 0x00 });
        } else if negative {
            *last |= 0x80;
        }
    }
    bytes
}

/// Decode a script number of up to eight bytes.
pub fn decode_script_num(bytes: &[u8]) -> Option<i64> {
    if bytes.is_empty() {
        return Some(0);
    }
    if bytes.len() > 8 {
        return None;
    }
    let mut magnitude: u64 = 0;
    for (i, byte) in bytes.iter().enumerate() {
        magnitude |= (*byte as u64) << (8 * i);
    }
    let sign_mask = 0x80u64 << (8 * (bytes.len() - 1));
    if magnitude & sign_mask != 0 {
        Some(-((magnitude & !sign_mask) as i64))
    } else {
        Some(magnitude as i64)
    }
}

/// One element of a script as the reader sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instruction<'a> {
    Push(&'a [u8]),
    Op(u8),
}

impl Instruction<'_> {
    /// Read this instruction as a number push, if it is one.
    pub fn as_int(&self) -> Option<i64> {
        match *self {
            Instruction::Op(OP_0) => Some(0),
            Instruction::Op(OP_1NEGATE) => Some(-1),
            Instruction::Op(op @ OP_1..=OP_16) => Some((op - OP_1 + 1) as i64),
            Instruction::Push(bytes) => decode_script_num(bytes),
            Instruction::Op(_) => None,
        }
    }
}

/// Iterates over the instructions of a script.
pub struct Instructions<'a> {
    script: &'a [u8],
}

pub fn instructions(script: &[u8]) -> Instructions<'_> {
    Instructions { script }
}

impl<'a> Iterator for Instructions<'a> {
    type Item = Result<Instruction<'a>, ScriptError>;

    fn next(&mut self) -> Option<Self::Item> {
        let script = self.script;
        let (&opcode, rest) = script.split_first()?;
        let (len, rest) = match opcode {
            0x01..=0x4b => (opcode as usize, rest),
            OP_PUSHDATA1 => match rest.split_first() {
                Some((&n, rest)) => (n as usize, rest),
                None => return self.fail(),
            },
            OP_PUSHDATA2 if rest.len() >= 2 => {
                (u16::from_le_bytes([rest[0], rest[1]]) as usize, &rest[2..])
            }
            OP_PUSHDATA4 if rest.len() >= 4 => (
                u32::from_le_bytes([rest[0], rest[1], rest[2], rest[3]]) as usize,
                &rest[4..],
            ),
            OP_PUSHDATA2 | OP_PUSHDATA4 => return self.fail(),
            _ => {
                self.script = rest;
                return Some(Ok(Instruction::Op(opcode)));
            }
        };
        if rest.len() < len {
            return self.fail();
        }
        let (data, rest) = rest.split_at(len);
        self.script = rest;
        Some(Ok(Instruction::Push(data)))
    }
}

impl Instructions<'_> {
    fn fail<T>(&mut self) -> Option<Result<T, ScriptError>> {
        self.script = &[];
        Some(Err(ScriptError::Truncated))
    }
}
