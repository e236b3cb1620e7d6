//! The mailbox/label registry and its two-phase allocation protocol.
//!
//! Allocation functions never mutate the registry directly. They return a
//! [`MemoryOp`] describing the boxes and labels the caller *would* need;
//! nothing becomes part of the program until the operation's new entries
//! are committed (see [`Program::add_memory_op`]). Code generators can
//! therefore work out all the storage an instruction needs and still fail
//! without leaving half-registered state behind.
//!
//! [`Program::add_memory_op`]: super::program::Program::add_memory_op

use std::rc::Rc;

use hashbrown::HashMap;

use super::instr::DataInstr;
use super::mailbox::{encode_identifier, Label, Mailbox};
use super::{Address, MachineError, MachineResult, Value};

/// One proposed mailbox: the box, whether committing it must register it,
/// and its initial value when it is new.
#[derive(Debug, Clone)]
pub struct BoxOp {
    pub mailbox: Rc<Mailbox>,
    pub is_new: bool,
    pub value: Value,
}

/// One proposed label.
#[derive(Debug, Clone)]
pub struct LabelOp {
    pub label: Rc<Label>,
    pub is_new: bool,
}

/// A pending memory operation: the transactional result of an
/// allocate-or-fetch call.
#[derive(Debug, Clone, Default)]
pub struct MemoryOp {
    pub boxes: Vec<BoxOp>,
    pub labels: Vec<LabelOp>,
}

impl MemoryOp {
    pub fn of_box(mailbox: Rc<Mailbox>, is_new: bool) -> Self {
        Self {
            boxes: vec![BoxOp {
                mailbox,
                is_new,
                value: 0,
            }],
            labels: Vec::new(),
        }
    }

    pub fn of_label(label: Rc<Label>, is_new: bool) -> Self {
        Self {
            boxes: Vec::new(),
            labels: vec![LabelOp { label, is_new }],
        }
    }

    /// First proposed mailbox. Allocation calls that return boxes always
    /// put the principal one first.
    pub fn mailbox(&self) -> Rc<Mailbox> {
        self.boxes[0].mailbox.clone()
    }

    /// First proposed label.
    pub fn label(&self) -> Rc<Label> {
        self.labels[0].label.clone()
    }

    pub fn new_boxes(&self) -> impl Iterator<Item = &BoxOp> {
        self.boxes.iter().filter(|b| b.is_new)
    }

    pub fn new_labels(&self) -> impl Iterator<Item = &LabelOp> {
        self.labels.iter().filter(|l| l.is_new)
    }

    /// Data declarations implied by the new boxes of this operation.
    pub fn defs(&self) -> Vec<DataInstr> {
        self.new_boxes()
            .map(|b| DataInstr::new(b.value, b.mailbox.clone()))
            .collect()
    }
}

/// The per-compilation registry of mailboxes, labels, and the cache that
/// gives each constant literal exactly one backing mailbox.
#[derive(Debug, Default)]
pub struct Memory {
    mailboxes: Vec<Rc<Mailbox>>,
    labels: Vec<Rc<Label>>,
    constants: HashMap<Value, Rc<Mailbox>>,
}

impl Memory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mailboxes(&self) -> &[Rc<Mailbox>] {
        &self.mailboxes
    }

    pub fn labels(&self) -> &[Rc<Label>] {
        &self.labels
    }

    /// Looks up the mailbox registered at `address`. Negative addresses
    /// are compiler-internal and never resolvable by address.
    pub fn mailbox_at(&self, address: Address) -> Option<Rc<Mailbox>> {
        if address < 0 {
            return None;
        }

        self.mailboxes
            .iter()
            .find(|m| m.address() == address)
            .cloned()
    }

    pub fn mailbox_named(&self, identifier: &str) -> Option<Rc<Mailbox>> {
        self.mailboxes
            .iter()
            .find(|m| m.identifier() == identifier)
            .cloned()
    }

    pub fn label_named(&self, identifier: &str) -> Option<Rc<Label>> {
        self.labels
            .iter()
            .find(|l| l.identifier() == identifier)
            .cloned()
    }

    /// Registers a mailbox. Fails without inserting when the address
    /// (non-negative) or the identifier is already taken.
    pub fn add_mailbox(&mut self, mailbox: Rc<Mailbox>) -> MachineResult<()> {
        if mailbox.address() >= 0 && self.mailbox_at(mailbox.address()).is_some() {
            return Err(MachineError::MailboxAddressInUse {
                address: mailbox.address(),
            });
        }

        if self.mailbox_named(mailbox.identifier()).is_some() {
            return Err(MachineError::MailboxIdentifierInUse {
                identifier: mailbox.identifier().to_string(),
            });
        }

        self.mailboxes.push(mailbox);
        Ok(())
    }

    /// Registers a label. Fails when the identifier is already taken.
    pub fn add_label(&mut self, label: Rc<Label>) -> MachineResult<()> {
        if self.label_named(label.identifier()).is_some() {
            return Err(MachineError::LabelIdentifierInUse {
                identifier: label.identifier().to_string(),
            });
        }

        self.labels.push(label);
        Ok(())
    }

    /// Drops every registered mailbox with the given identifier. Returns
    /// whether anything was removed.
    pub fn remove_mailbox_named(&mut self, identifier: &str) -> bool {
        let before = self.mailboxes.len();
        self.mailboxes.retain(|m| m.identifier() != identifier);
        self.mailboxes.len() != before
    }

    /// Proposes a new mailbox. With no identifier given, one is generated
    /// from the address (callers creating negative-address boxes must
    /// name them).
    pub fn new_mailbox(&self, address: Address, identifier: Option<&str>) -> MemoryOp {
        let identifier = match identifier {
            Some(id) => id.to_string(),
            None => encode_identifier(address as usize),
        };

        MemoryOp::of_box(Rc::new(Mailbox::new(address, identifier)), true)
    }

    /// Proposes a new label, generating `l_`-prefixed identifiers from
    /// the label count.
    pub fn new_label(&self, identifier: Option<&str>) -> MemoryOp {
        let identifier = match identifier {
            Some(id) => id.to_string(),
            None => format!("l_{}", encode_identifier(self.labels.len())),
        };

        MemoryOp::of_label(Rc::new(Label::new(identifier)), true)
    }

    /// Fetches the mailbox backing a constant literal, proposing a new
    /// `c_`-prefixed box at address `-1` on first sight of the value.
    pub fn constant(&mut self, value: Value) -> MemoryOp {
        if let Some(existing) = self.constants.get(&value) {
            return MemoryOp::of_box(existing.clone(), false);
        }

        let identifier = format!("c_{}", encode_identifier(self.constants.len()));
        let mut op = self.new_mailbox(-1, Some(&identifier));
        op.boxes[0].value = value;
        self.constants.insert(value, op.mailbox());

        op
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_address_is_rejected_without_partial_insert() {
        let mut memory = Memory::new();
        memory
            .add_mailbox(Rc::new(Mailbox::new(4, "A")))
            .unwrap();

        let err = memory.add_mailbox(Rc::new(Mailbox::new(4, "B")));
        assert!(matches!(
            err,
            Err(MachineError::MailboxAddressInUse { address: 4 })
        ));
        assert_eq!(memory.mailboxes().len(), 1);
        assert!(memory.mailbox_named("B").is_none());
    }

    #[test]
    fn duplicate_identifier_is_rejected() {
        let mut memory = Memory::new();
        memory
            .add_mailbox(Rc::new(Mailbox::new(0, "A")))
            .unwrap();

        let err = memory.add_mailbox(Rc::new(Mailbox::new(1, "A")));
        assert!(matches!(
            err,
            Err(MachineError::MailboxIdentifierInUse { .. })
        ));
        assert_eq!(memory.mailboxes().len(), 1);
    }

    #[test]
    fn negative_addresses_may_be_shared_but_never_resolved() {
        let mut memory = Memory::new();
        memory
            .add_mailbox(Rc::new(Mailbox::new(-1, "_TEMP")))
            .unwrap();
        memory
            .add_mailbox(Rc::new(Mailbox::new(-1, "c_A")))
            .unwrap();

        assert!(memory.mailbox_at(-1).is_none());
        assert!(memory.mailbox_named("c_A").is_some());
    }

    #[test]
    fn constants_are_cached_per_value() {
        let mut memory = Memory::new();

        let first = memory.constant(7);
        assert!(first.boxes[0].is_new);
        assert_eq!(first.boxes[0].value, 7);

        let second = memory.constant(7);
        assert!(!second.boxes[0].is_new);
        assert_eq!(first.mailbox().identifier(), second.mailbox().identifier());

        let other = memory.constant(8);
        assert_ne!(first.mailbox().identifier(), other.mailbox().identifier());
    }

    #[test]
    fn proposing_does_not_register() {
        let memory = Memory::new();
        let op = memory.new_mailbox(3, None);

        assert!(op.boxes[0].is_new);
        assert!(memory.mailbox_at(3).is_none());
    }

    #[test]
    fn defs_cover_only_new_boxes() {
        let mut memory = Memory::new();
        let op = memory.constant(9);
        assert_eq!(op.defs().len(), 1);
        assert_eq!(op.defs()[0].value, 9);

        let cached = memory.constant(9);
        assert!(cached.defs().is_empty());
    }

    #[test]
    fn generated_identifiers_follow_the_address() {
        let memory = Memory::new();
        assert_eq!(memory.new_mailbox(0, None).mailbox().identifier(), "A");
        assert_eq!(memory.new_mailbox(25, None).mailbox().identifier(), "BB");
    }
}
