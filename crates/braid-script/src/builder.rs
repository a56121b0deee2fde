use braid_core::ScriptError;

use crate::opcode::*;

/// Incremental script assembler.
#[derive(Clone, Debug, Default)]
pub struct ScriptBuilder {
    bytes: Vec<u8>,
}

impl ScriptBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push `data` with the shortest encoding: the length as the opcode for
    /// up to 75 bytes, `OP_PUSHDATA1` up to 255. Empty pushes are not
    /// representable.
    pub fn push_data(mut self, data: &[u8]) -> Result<Self, ScriptError> {
        match data.len() {
            0 => {
                return Err(ScriptError::InvalidStackItem {
                    opcode: "OP_PUSHDATA",
                    reason: "empty push",
                })
            }
            n if n <= MAX_DIRECT_PUSH as usize => self.bytes.push(n as u8),
            n if n <= u8::MAX as usize => {
                self.bytes.push(OP_PUSHDATA1);
                self.bytes.push(n as u8);
            }
            n => {
                return Err(ScriptError::ScriptTooLarge {
                    max: u8::MAX as usize,
                    got: n,
                })
            }
        }
        self.bytes.extend_from_slice(data);
        Ok(self)
    }

    pub fn op(mut self, opcode: u8) -> Self {
        self.bytes.push(opcode);
        self
    }

    pub fn build(self) -> Vec<u8> {
        self.bytes
    }
}

// ── Standard scripts ─────────────────────────────────────────────────────────

/// `OP_DUP OP_HASH160 <pubkey_hash> OP_EQUALVERIFY OP_CHECKSIG`
pub fn p2pkh(pubkey_hash: &[u8; 20]) -> Vec<u8> {
    let mut s = vec![OP_DUP, OP_HASH160, 20];
    s.extend_from_slice(pubkey_hash);
    s.push(OP_EQUALVERIFY);
    s.push(OP_CHECKSIG);
    s
}

/// `<lock> OP_GREATERTHAN_TIMESTAMP` followed by a P2PKH script. Spendable
/// only by transactions timestamped strictly after `lock`.
pub fn timelocked_p2pkh(pubkey_hash: &[u8; 20], lock: u32) -> Vec<u8> {
    let mut s = vec![4];
    s.extend_from_slice(&lock.to_be_bytes());
    s.push(OP_GREATERTHAN_TIMESTAMP);
    s.extend(p2pkh(pubkey_hash));
    s
}

/// `<signature> <pubkey>`
pub fn p2pkh_unlock(signature: &[u8], pubkey: &[u8]) -> Result<Vec<u8>, ScriptError> {
    Ok(ScriptBuilder::new()
        .push_data(signature)?
        .push_data(pubkey)?
        .build())
}

/// Fields recovered from a recognised pay-to-public-key-hash script.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct P2pkhScript {
    pub pubkey_hash: [u8; 20],
    pub timelock: Option<u32>,
}

/// Recognise the two standard locking scripts produced above.
pub fn parse_p2pkh(script: &[u8]) -> Option<P2pkhScript> {
    let (timelock, rest) = match script {
        [4, a, b, c, d, OP_GREATERTHAN_TIMESTAMP, rest @ ..] => {
            (Some(u32::from_be_bytes([*a, *b, *c, *d])), rest)
        }
        _ => (None, script),
    };
    match rest {
        [OP_DUP, OP_HASH160, 20, body @ ..] if body.len() == 22 => {
            if body[20] != OP_EQUALVERIFY || body[21] != OP_CHECKSIG {
                return None;
            }
            let mut pubkey_hash = [0u8; 20];
            pubkey_hash.copy_from_slice(&body[..20]);
            Some(P2pkhScript {
                pubkey_hash,
                timelock,
            })
        }
        _ => None,
    }
}

// ── Disassembly ──────────────────────────────────────────────────────────────

/// Render a script as `OP_* <hex>` tokens for logs. Never fails: truncated
/// pushes and unknown bytes are rendered in place.
pub fn disassemble(script: &[u8]) -> String {
    let mut out: Vec<String> = Vec::new();
    let mut pc = 0;
    while pc < script.len() {
        let byte = script[pc];
        pc += 1;
        match Opcode::from_byte(byte) {
            Some(Opcode::PushBytes) | Some(Opcode::PushData1) => {
                let len = if byte == OP_PUSHDATA1 {
                    match script.get(pc) {
                        Some(&n) => {
                            pc += 1;
                            n as usize
                        }
                        None => {
                            out.push("OP_PUSHDATA1 <truncated>".to_string());
                            break;
                        }
                    }
                } else {
                    byte as usize
                };
                match script.get(pc..pc + len) {
                    Some(data) => out.push(format!("<{}>", hex::encode(data))),
                    None => {
                        out.push(format!("<truncated:{len}>"));
                        break;
                    }
                }
                pc += len;
            }
            Some(op) => out.push(op.name().to_string()),
            None => out.push(format!("OP_UNKNOWN(0x{byte:02x})")),
        }
    }
    out.join(" ")
}
