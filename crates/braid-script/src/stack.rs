use braid_core::{ScriptError, MAX_STACK_DEPTH};

/// One operand of the script machine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StackItem {
    Bytes(Vec<u8>),
    /// Result of a signature or equality check.
    Bool(bool),
}

impl StackItem {
    /// Byte view used for comparisons and hashing: `true` is `[1]`,
    /// `false` is the empty string.
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            StackItem::Bytes(b) => b.clone(),
            StackItem::Bool(true) => vec![1],
            StackItem::Bool(false) => Vec::new(),
        }
    }

    /// A byte string is truthy when it has at least one non-zero byte.
    pub fn is_truthy(&self) -> bool {
        match self {
            StackItem::Bytes(b) => b.iter().any(|&x| x != 0),
            StackItem::Bool(v) => *v,
        }
    }
}

impl From<Vec<u8>> for StackItem {
    fn from(b: Vec<u8>) -> Self {
        StackItem::Bytes(b)
    }
}

impl From<&[u8]> for StackItem {
    fn from(b: &[u8]) -> Self {
        StackItem::Bytes(b.to_vec())
    }
}

impl From<bool> for StackItem {
    fn from(v: bool) -> Self {
        StackItem::Bool(v)
    }
}

/// Bounded operand stack.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Stack {
    items: Vec<StackItem>,
}

impl Stack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn push(&mut self, item: impl Into<StackItem>) -> Result<(), ScriptError> {
        if self.items.len() >= MAX_STACK_DEPTH {
            return Err(ScriptError::StackOverflow {
                max: MAX_STACK_DEPTH,
            });
        }
        self.items.push(item.into());
        Ok(())
    }

    /// Fail with `MissingStackItems` unless at least `need` items are present.
    pub fn require(&self, opcode: &'static str, need: usize) -> Result<(), ScriptError> {
        if self.items.len() < need {
            return Err(ScriptError::MissingStackItems {
                opcode,
                need,
                have: self.items.len(),
            });
        }
        Ok(())
    }

    pub fn pop(&mut self, opcode: &'static str) -> Result<StackItem, ScriptError> {
        self.require(opcode, 1)?;
        self.items.pop().ok_or(ScriptError::MissingStackItems {
            opcode,
            need: 1,
            have: 0,
        })
    }

    pub fn pop_bytes(&mut self, opcode: &'static str) -> Result<Vec<u8>, ScriptError> {
        Ok(self.pop(opcode)?.to_bytes())
    }

    pub fn top(&self) -> Option<&StackItem> {
        self.items.last()
    }

    pub fn items(&self) -> &[StackItem] {
        &self.items
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bool_byte_views() {
        assert_eq!(StackItem::Bool(true).to_bytes(), vec![1]);
        assert!(StackItem::Bool(false).to_bytes().is_empty());
        assert!(!StackItem::Bytes(vec![0, 0]).is_truthy());
        assert!(StackItem::Bytes(vec![0, 2]).is_truthy());
    }

    #[test]
    fn pop_on_empty_reports_missing_items() {
        let mut stack = Stack::new();
        assert_eq!(
            stack.pop("OP_DUP"),
            Err(ScriptError::MissingStackItems {
                opcode: "OP_DUP",
                need: 1,
                have: 0
            })
        );
    }

    #[test]
    fn push_is_bounded() {
        let mut stack = Stack::new();
        for _ in 0..MAX_STACK_DEPTH {
            stack.push(vec![1u8]).unwrap();
        }
        assert_eq!(
            stack.push(vec![1u8]),
            Err(ScriptError::StackOverflow {
                max: MAX_STACK_DEPTH
            })
        );
    }
}
