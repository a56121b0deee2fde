//! Stack-machine script engine authorizing spends of earlier outputs.

pub mod builder;
pub mod interpreter;
pub mod opcode;
pub mod stack;

pub use builder::{
    disassemble, p2pkh, p2pkh_unlock, parse_p2pkh, timelocked_p2pkh, P2pkhScript, ScriptBuilder,
};
pub use interpreter::{evaluate, verify_input, ScriptContext, ScriptExtras};
pub use opcode::Opcode;
pub use stack::{Stack, StackItem};
