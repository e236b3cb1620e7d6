//! Redundant load/store ("thrashing") elimination.
//!
//! When two load/store references to the same mailbox appear with no
//! accumulator-mutating instruction strictly between them, the
//! accumulator already holds that mailbox's value at the second
//! reference, so the second reference goes. A load or store that is the
//! very last instruction of the list has no observer and goes too.
//!
//! Decisions are taken over an immutable snapshot and applied in one
//! filtering pass, so earlier deletions never shift later indices.
//! Labelled instructions are never candidates: they carry jump targets.

use crate::machine::{Instruction, MachineResult, Program};

pub fn eliminate(program: &mut Program) -> MachineResult<()> {
    let instrs = &program.instructions.instructions;
    let len = instrs.len();
    let mut drop = vec![false; len];
    let mut previous: Option<usize> = None;

    for i in 0..len {
        let Some(identifier) = reference_identifier(&instrs[i]) else {
            continue;
        };

        if let Some(p) = previous {
            if reference_identifier(&instrs[p]) != Some(identifier) {
                previous = None;
            }
        }

        if i == len - 1 {
            drop[i] = true;
            break;
        }

        match previous {
            None => previous = Some(i),
            Some(p) => {
                let clobbered = instrs[p + 1..i].iter().any(Instruction::mutates_acc);
                if clobbered {
                    previous = Some(i);
                } else {
                    drop[i] = true;
                }
            }
        }
    }

    let mut index = 0;
    program.instructions.instructions.retain(|_| {
        let keep = !drop[index];
        index += 1;
        keep
    });

    Ok(())
}

/// The mailbox a bare load/store references; `None` for everything else,
/// including labelled wrappers. Identified by name: the registry keeps
/// one identifier per slot, while every compiler-internal box shares a
/// negative address and must never compare equal by it.
fn reference_identifier(instr: &Instruction) -> Option<&str> {
    match instr {
        Instruction::Load(m) | Instruction::Store(m) => Some(m.identifier()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use crate::machine::Instruction;

    use super::*;

    fn program_with(build: impl FnOnce(&mut Program)) -> Program {
        let mut program = Program::new();
        build(&mut program);
        program
    }

    #[test]
    fn removes_a_store_straight_after_a_load_of_the_same_box() {
        let mut program = program_with(|p| {
            let a = p.new_mailbox(0, None).unwrap();
            p.add_instructions(
                [
                    Instruction::Load(a.clone()),
                    Instruction::Store(a),
                    Instruction::Halt,
                ],
                [],
            );
        });

        eliminate(&mut program).unwrap();

        assert_eq!(program.instructions.instructions.len(), 2);
        assert!(matches!(
            program.instructions.instructions[0],
            Instruction::Load(_)
        ));
    }

    #[test]
    fn an_accumulator_mutation_blocks_the_removal() {
        let mut program = program_with(|p| {
            let a = p.new_mailbox(0, None).unwrap();
            let b = p.new_mailbox(1, None).unwrap();
            p.add_instructions(
                [
                    Instruction::Load(a.clone()),
                    Instruction::Add(b),
                    Instruction::Store(a),
                    Instruction::Halt,
                ],
                [],
            );
        });

        eliminate(&mut program).unwrap();
        assert_eq!(program.instructions.instructions.len(), 4);
    }

    #[test]
    fn different_addresses_are_not_a_pair() {
        let mut program = program_with(|p| {
            let a = p.new_mailbox(0, None).unwrap();
            let b = p.new_mailbox(1, None).unwrap();
            p.add_instructions(
                [
                    Instruction::Load(a),
                    Instruction::Store(b),
                    Instruction::Halt,
                ],
                [],
            );
        });

        eliminate(&mut program).unwrap();
        assert_eq!(program.instructions.instructions.len(), 3);
    }

    #[test]
    fn a_trailing_reference_is_dropped() {
        let mut program = program_with(|p| {
            let a = p.new_mailbox(0, None).unwrap();
            let b = p.new_mailbox(1, None).unwrap();
            p.add_instructions(
                [Instruction::Load(a), Instruction::Store(b)],
                [],
            );
        });

        eliminate(&mut program).unwrap();

        assert_eq!(program.instructions.instructions.len(), 1);
        assert!(matches!(
            program.instructions.instructions[0],
            Instruction::Load(_)
        ));
    }

    #[test]
    fn chained_redundancy_collapses_in_one_pass() {
        let mut program = program_with(|p| {
            let a = p.new_mailbox(0, None).unwrap();
            p.add_instructions(
                [
                    Instruction::Load(a.clone()),
                    Instruction::Store(a.clone()),
                    Instruction::Load(a),
                    Instruction::Output,
                ],
                [],
            );
        });

        eliminate(&mut program).unwrap();

        // Both the store and the re-load are redundant.
        assert_eq!(program.instructions.instructions.len(), 2);
    }

    #[test]
    fn internal_boxes_sharing_an_address_are_not_a_pair() {
        // Constants and the scratch box all sit at address -1; a loop
        // preamble like `LDA c_A; STA _TEMP` must survive.
        let mut program = program_with(|p| {
            let c = p.constant(3).unwrap();
            let temp = p.new_mailbox(-1, Some("_TEMP")).unwrap();
            p.add_instructions(
                [
                    Instruction::Load(c),
                    Instruction::Store(temp),
                    Instruction::Halt,
                ],
                [],
            );
        });

        eliminate(&mut program).unwrap();
        assert_eq!(program.instructions.instructions.len(), 3);
    }

    #[test]
    fn labelled_references_are_left_alone() {
        let mut program = program_with(|p| {
            let a = p.new_mailbox(0, None).unwrap();
            let label = p.new_label(None).unwrap();
            p.add_instructions(
                [
                    Instruction::Load(a.clone()),
                    Instruction::Labelled(label, Box::new(Instruction::Store(a))),
                    Instruction::Halt,
                ],
                [],
            );
        });

        eliminate(&mut program).unwrap();
        assert_eq!(program.instructions.instructions.len(), 3);
    }

    #[test]
    fn never_increases_the_instruction_count() {
        let mut program = program_with(|p| {
            let a = p.new_mailbox(0, None).unwrap();
            let b = p.new_mailbox(1, None).unwrap();
            p.add_instructions(
                [
                    Instruction::Load(a.clone()),
                    Instruction::Store(b.clone()),
                    Instruction::Load(b),
                    Instruction::Store(a),
                    Instruction::Halt,
                ],
                [],
            );
        });

        let before = program.instructions.instructions.len();
        eliminate(&mut program).unwrap();
        assert!(program.instructions.instructions.len() <= before);
    }
}
