use thiserror::Error;

/// Failures raised while evaluating a script.
///
/// `InvalidSignature` is never raised by `CHECKSIG` itself; it is reported
/// only when a falsy signature result is what is left on top of the stack
/// after the whole script ran.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScriptError {
    #[error("out of data: push at offset {offset} needs {need} bytes, {remaining} remaining")]
    OutOfData {
        offset: usize,
        need: usize,
        remaining: usize,
    },

    #[error("missing stack items: {opcode} needs {need}, stack has {have}")]
    MissingStackItems {
        opcode: &'static str,
        need: usize,
        have: usize,
    },

    #[error("OP_EQUALVERIFY failed: operands differ")]
    EqualVerifyFailed,

    #[error("time-locked: transaction timestamp {timestamp} is not after {lock}")]
    TimeLocked { lock: u32, timestamp: i64 },

    #[error("signature verification failed")]
    InvalidSignature,

    #[error("final stack is empty or falsy")]
    FinalStackInvalid,

    #[error("invalid opcode 0x{0:02x}")]
    InvalidOpcode(u8),

    #[error("invalid stack item for {opcode}: {reason}")]
    InvalidStackItem {
        opcode: &'static str,
        reason: &'static str,
    },

    #[error("stack overflow: depth limit is {max}")]
    StackOverflow { max: usize },

    #[error("script too large: max {max} bytes, got {got}")]
    ScriptTooLarge { max: usize, got: usize },
}

#[derive(Debug, Error)]
pub enum BraidError {
    // ── Structural ───────────────────────────────────────────────────────────
    #[error("vertex hash mismatch: declared {declared}, computed {computed}")]
    HashMismatch { declared: String, computed: String },

    #[error("unknown parent vertex: {0}")]
    UnknownParent(String),

    #[error("invalid parents: {0}")]
    InvalidParents(String),

    #[error("output index {index} out of range for vertex {vertex}")]
    InvalidOutputIndex { vertex: String, index: u32 },

    #[error("timestamp {timestamp} is earlier than parent {parent} ({parent_timestamp})")]
    TimestampBeforeParent {
        timestamp: i64,
        parent: String,
        parent_timestamp: i64,
    },

    #[error("timestamp {timestamp} is too far in the future (now {now})")]
    TimestampInFuture { timestamp: i64, now: i64 },

    #[error("malformed vertex: {0}")]
    Malformed(String),

    // ── Scripts ──────────────────────────────────────────────────────────────
    #[error("input {input} script failed: {source}")]
    Script {
        input: usize,
        #[source]
        source: ScriptError,
    },

    // ── Consensus ────────────────────────────────────────────────────────────
    #[error("inputs ({inputs}) and outputs ({outputs}) do not balance")]
    InputOutputMismatch { inputs: u64, outputs: u64 },

    #[error("block outputs {outputs} exceed reward {reward}")]
    RewardExceeded { outputs: u64, reward: u64 },

    #[error("output {outpoint} already spent by {spender}")]
    DoubleSpend { outpoint: String, spender: String },

    #[error("weight too low: need at least {min}, got {got}")]
    WeightTooLow { min: f64, got: f64 },

    #[error("invalid proof-of-work")]
    InvalidPoW,

    #[error("conflict: {0}")]
    Conflict(String),

    // ── Networking ───────────────────────────────────────────────────────────
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("peer timed out: {0}")]
    PeerTimeout(String),

    #[error("io error: {0}")]
    Io(String),

    // ── Serialization / storage ──────────────────────────────────────────────
    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("{0}")]
    Other(String),
}

impl BraidError {
    /// Missing dependencies are recoverable: the vertex can be retried once
    /// its parents or spent vertices are fetched.
    pub fn is_unknown_parent(&self) -> bool {
        matches!(self, BraidError::UnknownParent(_))
    }

    /// Errors that must close the connection they arrived on.
    pub fn is_fatal_to_connection(&self) -> bool {
        matches!(
            self,
            BraidError::ProtocolViolation(_) | BraidError::PeerTimeout(_) | BraidError::Io(_)
        )
    }
}
