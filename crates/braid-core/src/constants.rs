/// ─── Braid Protocol Constants ───────────────────────────────────────────────
///
/// Values every node on a network must agree on. Tunables that may differ
/// between networks live in `braid_genesis::NetworkParams` instead.

// ── Wire protocol ────────────────────────────────────────────────────────────

/// Sync protocol version advertised in HELLO. Peers must match exactly.
pub const PROTOCOL_VERSION: u32 = 1;

/// Upper bound on a single encoded wire message (bytes).
pub const MAX_MESSAGE_SIZE: usize = 4 * 1024 * 1024;

/// Maximum number of block ids a single BLOCKS reply may carry.
pub const MAX_BLOCKS_PER_BATCH: u32 = 256;

/// Maximum number of tip ids a single TIPS message may advertise per kind.
pub const MAX_TIPS_ADVERTISED: usize = 1024;

// ── DAG shape ────────────────────────────────────────────────────────────────

/// Every non-genesis vertex references exactly this many transaction parents.
pub const TX_PARENTS: usize = 2;

/// Minimum number of block parents of a non-genesis block.
pub const MIN_BLOCK_PARENTS: usize = 1;

/// Maximum number of block parents of a non-genesis block.
pub const MAX_BLOCK_PARENTS: usize = 2;

// ── Vertex limits ────────────────────────────────────────────────────────────

pub const MAX_INPUTS: usize = 255;
pub const MAX_OUTPUTS: usize = 255;

/// Maximum size of a single locking or unlocking script (bytes).
pub const MAX_SCRIPT_SIZE: usize = 1024;

/// Maximum size of the auxiliary data carried by a block (bytes).
pub const MAX_BLOCK_DATA: usize = 100;

// ── Script engine ────────────────────────────────────────────────────────────

/// Maximum operand stack depth during script evaluation.
pub const MAX_STACK_DEPTH: usize = 256;
