//! Box-copy propagation.
//!
//! A store whose accumulator value was established by a plain load (and
//! nothing accumulator-mutating since) makes the stored-to box a pure
//! alias of the loaded box; a store fed the same way by an input makes
//! it an alias of "externally supplied, no upstream box". Alias chains
//! form a forest, an arena of index-addressed nodes rooted at a
//! synthetic external node, and every reference to a non-root alias is
//! rewritten to its chain root throughout the instruction list. A second,
//! narrower pass then drops a load immediately following a store to the
//! same box, a leftover the rewrite alone does not catch.
//!
//! A box only qualifies as an alias when *every* store to it is a pure
//! copy from one and the same source; conflicting sources, impure
//! stores, self-copies and alias cycles disqualify it.

use std::rc::Rc;

use hashbrown::{HashMap, HashSet};

use crate::machine::{Instruction, MachineResult, Mailbox, Program};

pub fn propagate(program: &mut Program) -> MachineResult<()> {
    rewrite_aliases(program);
    remove_load_after_store(program);
    Ok(())
}

/// What established the accumulator's value just before a store.
#[derive(Clone, PartialEq)]
enum AliasSource {
    Box(Rc<Mailbox>),
    External,
}

struct AliasNode {
    mailbox: Option<Rc<Mailbox>>,
    children: Vec<usize>,
}

fn rewrite_aliases(program: &mut Program) {
    let instrs = &program.instructions.instructions;

    // Source of every store, keyed by stored-to identifier. `None` marks
    // a box disqualified by an impure or conflicting store.
    let mut sources: HashMap<String, Option<AliasSource>> = HashMap::new();

    for (i, instr) in instrs.iter().enumerate() {
        let Instruction::Store(dst) = instr.unwrapped() else {
            continue;
        };

        let mut source = establishing_source(&instrs[..i]);

        // A copy of a box onto itself carries no aliasing information.
        if let Some(AliasSource::Box(src)) = &source {
            if src.identifier() == dst.identifier() {
                source = None;
            }
        }

        sources
            .entry(dst.identifier().to_string())
            .and_modify(|existing| {
                if *existing != source {
                    *existing = None;
                }
            })
            .or_insert(source);
    }

    // Arena forest: node 0 is the synthetic external root.
    let mut arena: Vec<AliasNode> = vec![AliasNode {
        mailbox: None,
        children: Vec::new(),
    }];
    let mut index_of: HashMap<String, usize> = HashMap::new();

    let mut node_for = |arena: &mut Vec<AliasNode>, mailbox: &Rc<Mailbox>| -> usize {
        *index_of
            .entry(mailbox.identifier().to_string())
            .or_insert_with(|| {
                arena.push(AliasNode {
                    mailbox: Some(mailbox.clone()),
                    children: Vec::new(),
                });
                arena.len() - 1
            })
    };

    let mut has_parent: HashSet<usize> = HashSet::new();

    for instr in instrs {
        for mailbox in instr.mailboxes() {
            if let Some(Some(source)) = sources.get(mailbox.identifier()) {
                let child = node_for(&mut arena, mailbox);
                if has_parent.contains(&child) {
                    continue;
                }

                let parent = match source {
                    AliasSource::Box(src) => node_for(&mut arena, src),
                    AliasSource::External => 0,
                };

                arena[parent].children.push(child);
                has_parent.insert(child);
            }
        }
    }

    // Walk each tree; everything below a root rewrites to that root's
    // mailbox. For chains hanging off the external node the root is the
    // topmost real box. Cyclic nodes are reachable from no root and are
    // left untouched.
    let mut root_of: HashMap<String, Rc<Mailbox>> = HashMap::new();

    let roots: Vec<usize> = arena[0]
        .children
        .iter()
        .copied()
        .chain((1..arena.len()).filter(|n| !has_parent.contains(n)))
        .collect();

    for root in roots {
        let mailbox = arena[root]
            .mailbox
            .clone()
            .expect("only the external node lacks a mailbox");

        let mut stack = arena[root].children.clone();
        let mut visited: HashSet<usize> = HashSet::new();

        while let Some(node) = stack.pop() {
            if !visited.insert(node) {
                continue;
            }

            if let Some(alias) = &arena[node].mailbox {
                root_of.insert(alias.identifier().to_string(), mailbox.clone());
            }
            stack.extend(arena[node].children.iter().copied());
        }
    }

    for instr in &mut program.instructions.instructions {
        for mailbox in instr.mailboxes_mut() {
            if let Some(root) = root_of.get(mailbox.identifier()) {
                *mailbox = root.clone();
            }
        }
    }
}

/// Scans backwards over `prefix` for the instruction that established
/// the current accumulator value: a load gives the loaded box, an input
/// gives the external source, any other accumulator-mutating instruction
/// means the value is impure.
fn establishing_source(prefix: &[Instruction]) -> Option<AliasSource> {
    for instr in prefix.iter().rev() {
        match instr.unwrapped() {
            Instruction::Load(m) => return Some(AliasSource::Box(m.clone())),
            Instruction::Input => return Some(AliasSource::External),
            other if other.mutates_acc() => return None,
            _ => {}
        }
    }

    None
}

/// Drops a bare load immediately following a bare store to the same box;
/// the accumulator still holds exactly that value.
fn remove_load_after_store(program: &mut Program) {
    let instrs = &program.instructions.instructions;
    let mut drop = vec![false; instrs.len()];

    for i in 1..instrs.len() {
        let (Instruction::Store(prev), Instruction::Load(cur)) = (&instrs[i - 1], &instrs[i])
        else {
            continue;
        };

        if prev.identifier() == cur.identifier() {
            drop[i] = true;
        }
    }

    let mut index = 0;
    program.instructions.instructions.retain(|_| {
        let keep = !drop[index];
        index += 1;
        keep
    });
}
