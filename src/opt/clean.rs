//! Dead-box cleanup.
//!
//! Two stages: drop every declared mailbox no executable instruction
//! references (its `DAT` line and its registry entry), then collapse
//! duplicate declarations for the same slot, keeping the first.

use hashbrown::{HashMap, HashSet};

use crate::machine::{Address, MachineResult, Program};

pub fn run(program: &mut Program) -> MachineResult<()> {
    remove_dead_boxes(program)?;
    collapse_duplicate_data(program);
    Ok(())
}

fn remove_dead_boxes(program: &mut Program) -> MachineResult<()> {
    let mut used: HashMap<String, usize> = HashMap::new();

    for def in &program.instructions.data {
        used.insert(def.mailbox.identifier().to_string(), 0);
    }

    for instr in &program.instructions.instructions {
        for mailbox in instr.mailboxes() {
            if let Some(count) = used.get_mut(mailbox.identifier()) {
                *count += 1;
            }
        }
    }

    let dead: Vec<String> = used
        .into_iter()
        .filter(|(_, count)| *count == 0)
        .map(|(identifier, _)| identifier)
        .collect();

    for identifier in dead {
        program.instructions.remove_data(&identifier)?;
        program.memory.remove_mailbox_named(&identifier);
    }

    Ok(())
}

/// Key under which declarations are considered duplicates: address for
/// source-owned boxes; compiler-internal boxes share negative addresses
/// by convention and are only ever duplicated per identifier.
#[derive(PartialEq, Eq, Hash)]
enum DeclKey {
    Address(Address),
    Identifier(String),
}

fn collapse_duplicate_data(program: &mut Program) {
    let mut seen: HashSet<DeclKey> = HashSet::new();

    program.instructions.data.retain(|def| {
        let key = if def.mailbox.address() >= 0 {
            DeclKey::Address(def.mailbox.address())
        } else {
            DeclKey::Identifier(def.mailbox.identifier().to_string())
        };
        seen.insert(key)
    });
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use crate::machine::{DataInstr, Instruction, Mailbox};

    use super::*;

    #[test]
    fn unreferenced_declarations_are_removed() {
        let mut program = Program::new();
        let live = program.new_mailbox(0, None).unwrap();
        program.new_mailbox(1, None).unwrap();

        program.add_instructions([Instruction::Load(live)], []);

        run(&mut program).unwrap();

        assert_eq!(program.instructions.data.len(), 1);
        assert!(program.memory.mailbox_at(0).is_some());
        assert!(program.memory.mailbox_at(1).is_none());
    }

    #[test]
    fn references_inside_labels_keep_boxes_alive() {
        let mut program = Program::new();
        let a = program.new_mailbox(0, None).unwrap();
        let label = program.new_label(None).unwrap();

        program.add_instructions(
            [Instruction::Labelled(
                label,
                Box::new(Instruction::Store(a)),
            )],
            [],
        );

        run(&mut program).unwrap();
        assert_eq!(program.instructions.data.len(), 1);
    }

    #[test]
    fn duplicate_declarations_for_one_slot_keep_the_first() {
        let mut program = Program::new();
        let a = program.new_mailbox(0, None).unwrap();

        // A second, conflicting declaration for the same slot, both
        // referenced so neither is dead.
        let shadow = Rc::new(Mailbox::new(0, "A2"));
        program
            .instructions
            .push_data(DataInstr::new(9, shadow.clone()));
        program.add_instructions(
            [Instruction::Load(a), Instruction::Store(shadow)],
            [],
        );

        run(&mut program).unwrap();

        assert_eq!(program.instructions.data.len(), 1);
        assert_eq!(program.instructions.data[0].value, 0);
    }

    #[test]
    fn compiler_internal_boxes_do_not_collide_by_address() {
        let mut program = Program::new();
        let one = program.constant(1).unwrap();
        let two = program.constant(2).unwrap();

        program.add_instructions(
            [Instruction::Add(one), Instruction::Sub(two)],
            [],
        );

        run(&mut program).unwrap();

        // Both constants share address -1 yet keep their declarations.
        assert_eq!(program.instructions.data.len(), 2);
    }

    #[test]
    fn cleanup_is_idempotent() {
        let mut program = Program::new();
        let live = program.new_mailbox(0, None).unwrap();
        program.new_mailbox(1, None).unwrap();
        program.constant(3).unwrap();
        program.add_instructions([Instruction::Load(live)], []);

        run(&mut program).unwrap();
        let after_once = (
            program.instructions.instructions.len(),
            program.instructions.data.len(),
            program.memory.mailboxes().len(),
        );

        run(&mut program).unwrap();
        let after_twice = (
            program.instructions.instructions.len(),
            program.instructions.data.len(),
            program.memory.mailboxes().len(),
        );

        assert_eq!(after_once, after_twice);
    }
}
