use braid_core::ScriptError;
use braid_crypto::{hash160, sighash_digest, verify_ecdsa};
use once_cell::sync::Lazy;

use crate::interpreter::ScriptContext;
use crate::stack::StackItem;

// ── Byte values ──────────────────────────────────────────────────────────────

/// Largest length encoded directly in the opcode byte.
pub const MAX_DIRECT_PUSH: u8 = 75;
pub const OP_PUSHDATA1: u8 = 0x4C;
pub const OP_GREATERTHAN_TIMESTAMP: u8 = 0x6F;
pub const OP_DUP: u8 = 0x76;
pub const OP_EQUAL: u8 = 0x87;
pub const OP_EQUALVERIFY: u8 = 0x88;
pub const OP_HASH160: u8 = 0xA9;
pub const OP_CHECKSIG: u8 = 0xAC;

/// Closed set of instructions understood by the interpreter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Opcode {
    /// `PUSHDATA(n)`, 1 ≤ n ≤ 75: the opcode byte is the length.
    PushBytes,
    PushData1,
    Dup,
    Equal,
    EqualVerify,
    Hash160,
    CheckSig,
    GreaterThanTimestamp,
}

impl Opcode {
    pub fn name(self) -> &'static str {
        match self {
            Opcode::PushBytes => "OP_PUSHDATA",
            Opcode::PushData1 => "OP_PUSHDATA1",
            Opcode::Dup => "OP_DUP",
            Opcode::Equal => "OP_EQUAL",
            Opcode::EqualVerify => "OP_EQUALVERIFY",
            Opcode::Hash160 => "OP_HASH160",
            Opcode::CheckSig => "OP_CHECKSIG",
            Opcode::GreaterThanTimestamp => "OP_GREATERTHAN_TIMESTAMP",
        }
    }

    pub fn from_byte(byte: u8) -> Option<Opcode> {
        OPCODE_TABLE[byte as usize].map(|entry| entry.opcode)
    }

    fn handler(self) -> Handler {
        match self {
            Opcode::PushBytes => op_pushdata,
            Opcode::PushData1 => op_pushdata1,
            Opcode::Dup => op_dup,
            Opcode::Equal => op_equal,
            Opcode::EqualVerify => op_equalverify,
            Opcode::Hash160 => op_hash160,
            Opcode::CheckSig => op_checksig,
            Opcode::GreaterThanTimestamp => op_greaterthan_timestamp,
        }
    }
}

// ── Dispatch table ───────────────────────────────────────────────────────────

pub type Handler = fn(&mut ScriptContext<'_>) -> Result<(), ScriptError>;

#[derive(Clone, Copy)]
pub struct OpEntry {
    pub opcode: Opcode,
    pub handler: Handler,
}

/// Byte → handler, built once. Unassigned bytes are `None`.
pub static OPCODE_TABLE: Lazy<[Option<OpEntry>; 256]> = Lazy::new(|| {
    let mut table: [Option<OpEntry>; 256] = [None; 256];
    let mut assign = |byte: u8, opcode: Opcode| {
        table[byte as usize] = Some(OpEntry {
            opcode,
            handler: opcode.handler(),
        });
    };
    for n in 1..=MAX_DIRECT_PUSH {
        assign(n, Opcode::PushBytes);
    }
    assign(OP_PUSHDATA1, Opcode::PushData1);
    assign(OP_DUP, Opcode::Dup);
    assign(OP_EQUAL, Opcode::Equal);
    assign(OP_EQUALVERIFY, Opcode::EqualVerify);
    assign(OP_HASH160, Opcode::Hash160);
    assign(OP_CHECKSIG, Opcode::CheckSig);
    assign(OP_GREATERTHAN_TIMESTAMP, Opcode::GreaterThanTimestamp);
    table
});

// ── Handlers ─────────────────────────────────────────────────────────────────

pub(crate) fn op_pushdata(ctx: &mut ScriptContext<'_>) -> Result<(), ScriptError> {
    let len = ctx.opcode_byte() as usize;
    let data = ctx.read(len)?.to_vec();
    ctx.stack.push(data)
}

pub(crate) fn op_pushdata1(ctx: &mut ScriptContext<'_>) -> Result<(), ScriptError> {
    let len = ctx.read(1)?[0] as usize;
    let data = ctx.read(len)?.to_vec();
    ctx.stack.push(data)
}

pub(crate) fn op_dup(ctx: &mut ScriptContext<'_>) -> Result<(), ScriptError> {
    let top = ctx
        .stack
        .top()
        .cloned()
        .ok_or(ScriptError::MissingStackItems {
            opcode: "OP_DUP",
            need: 1,
            have: 0,
        })?;
    ctx.stack.push(top)
}

pub(crate) fn op_equal(ctx: &mut ScriptContext<'_>) -> Result<(), ScriptError> {
    ctx.stack.require("OP_EQUAL", 2)?;
    let a = ctx.stack.pop_bytes("OP_EQUAL")?;
    let b = ctx.stack.pop_bytes("OP_EQUAL")?;
    ctx.stack.push(a == b)
}

pub(crate) fn op_equalverify(ctx: &mut ScriptContext<'_>) -> Result<(), ScriptError> {
    ctx.stack.require("OP_EQUALVERIFY", 2)?;
    let a = ctx.stack.pop_bytes("OP_EQUALVERIFY")?;
    let b = ctx.stack.pop_bytes("OP_EQUALVERIFY")?;
    if a != b {
        return Err(ScriptError::EqualVerifyFailed);
    }
    Ok(())
}

pub(crate) fn op_hash160(ctx: &mut ScriptContext<'_>) -> Result<(), ScriptError> {
    let item = ctx.stack.pop_bytes("OP_HASH160")?;
    ctx.stack.push(hash160(&item).to_vec())
}

/// Pops a public key, then a signature. Never fails on a bad signature:
/// pushes `false` instead.
pub(crate) fn op_checksig(ctx: &mut ScriptContext<'_>) -> Result<(), ScriptError> {
    ctx.stack.require("OP_CHECKSIG", 2)?;
    let pubkey = ctx.stack.pop_bytes("OP_CHECKSIG")?;
    let signature = ctx.stack.pop_bytes("OP_CHECKSIG")?;
    let digest = sighash_digest(ctx.extras().tx);
    let ok = verify_ecdsa(&pubkey, &signature, &digest);
    ctx.stack.push(StackItem::Bool(ok))
}

/// Pops a 4-byte big-endian lock time; the transaction must be strictly
/// later.
pub(crate) fn op_greaterthan_timestamp(ctx: &mut ScriptContext<'_>) -> Result<(), ScriptError> {
    let raw = ctx.stack.pop_bytes("OP_GREATERTHAN_TIMESTAMP")?;
    let bytes: [u8; 4] = raw
        .as_slice()
        .try_into()
        .map_err(|_| ScriptError::InvalidStackItem {
            opcode: "OP_GREATERTHAN_TIMESTAMP",
            reason: "expected a 4-byte timestamp",
        })?;
    let lock = u32::from_be_bytes(bytes);
    let timestamp = ctx.extras().tx.timestamp;
    if timestamp <= i64::from(lock) {
        return Err(ScriptError::TimeLocked { lock, timestamp });
    }
    Ok(())
}
