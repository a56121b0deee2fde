use braid_core::{ScriptError, Vertex, MAX_SCRIPT_SIZE};
use tracing::trace;

use crate::opcode::OPCODE_TABLE;
use crate::stack::{Stack, StackItem};

/// Validation-time context for one input. Never persisted.
#[derive(Clone, Copy, Debug)]
pub struct ScriptExtras<'a> {
    /// The spending transaction.
    pub tx: &'a Vertex,
    /// Index of the input being checked.
    pub input_index: usize,
    /// The vertex whose output this input spends.
    pub spent_vertex: &'a Vertex,
}

/// Interpreter state handed to every opcode handler.
pub struct ScriptContext<'a> {
    pub stack: Stack,
    script: &'a [u8],
    pc: usize,
    opcode_byte: u8,
    extras: &'a ScriptExtras<'a>,
}

impl<'a> ScriptContext<'a> {
    pub fn new(script: &'a [u8], extras: &'a ScriptExtras<'a>) -> Self {
        Self {
            stack: Stack::new(),
            script,
            pc: 0,
            opcode_byte: 0,
            extras,
        }
    }

    /// Byte of the instruction currently executing.
    pub fn opcode_byte(&self) -> u8 {
        self.opcode_byte
    }

    pub fn extras(&self) -> &'a ScriptExtras<'a> {
        self.extras
    }

    /// Consume `n` bytes of inline data following the current instruction.
    pub fn read(&mut self, n: usize) -> Result<&'a [u8], ScriptError> {
        let remaining = self.script.len() - self.pc;
        if n > remaining {
            return Err(ScriptError::OutOfData {
                offset: self.pc,
                need: n,
                remaining,
            });
        }
        let data = &self.script[self.pc..self.pc + n];
        self.pc += n;
        Ok(data)
    }

    /// Run every instruction left to right.
    pub fn run(&mut self) -> Result<(), ScriptError> {
        while self.pc < self.script.len() {
            let byte = self.script[self.pc];
            self.pc += 1;
            let entry = OPCODE_TABLE[byte as usize].ok_or(ScriptError::InvalidOpcode(byte))?;
            self.opcode_byte = byte;
            trace!(
                opcode = entry.opcode.name(),
                pc = self.pc - 1,
                depth = self.stack.len(),
                "script step"
            );
            (entry.handler)(self)?;
        }
        Ok(())
    }
}

/// Execute `script` and return the final stack without judging it.
pub fn evaluate(script: &[u8], extras: &ScriptExtras<'_>) -> Result<Stack, ScriptError> {
    let mut ctx = ScriptContext::new(script, extras);
    ctx.run()?;
    Ok(ctx.stack)
}

/// Authorize one input: run `unlocking || locking` and require a truthy top.
///
/// A falsy signature result left on top is reported as `InvalidSignature`;
/// any other empty or falsy final stack as `FinalStackInvalid`.
pub fn verify_input(
    unlocking: &[u8],
    locking: &[u8],
    extras: &ScriptExtras<'_>,
) -> Result<(), ScriptError> {
    for script in [unlocking, locking] {
        if script.len() > MAX_SCRIPT_SIZE {
            return Err(ScriptError::ScriptTooLarge {
                max: MAX_SCRIPT_SIZE,
                got: script.len(),
            });
        }
    }
    let mut program = Vec::with_capacity(unlocking.len() + locking.len());
    program.extend_from_slice(unlocking);
    program.extend_from_slice(locking);

    let stack = evaluate(&program, extras)?;
    match stack.top() {
        None => Err(ScriptError::FinalStackInvalid),
        Some(StackItem::Bool(false)) => Err(ScriptError::InvalidSignature),
        Some(item) if !item.is_truthy() => Err(ScriptError::FinalStackInvalid),
        Some(_) => Ok(()),
    }
}
