//! Per-opcode lowering rules.
//!
//! Every generator resolves its operands first, proposes whatever new
//! storage it needs as pending memory operations, and only then builds
//! the target instruction template. Nothing touches the program until
//! the whole unit commits, so a failing generator contributes nothing.
//!
//! The target machine has no multiply or divide; those synthesize
//! counting loops around `ADD`/`SUB` with a trailing correction for the
//! one extra iteration their branch-after-decrement shape runs.

use crate::ir::{Inst, InstId, InstKind, Operand, Predicate, Ty, PRAGMA_CALLEE};
use crate::machine::{BranchKind, Instruction};

use super::builtin::{self, BuiltinCall};
use super::error::{CompileError, CompileResult, Warning};
use super::pattern::{Compiled, Unit};
use super::Compiler;

/// The comparison method encoding. Odd methods are the "less" family
/// (operands swap); methods 0 and 1 are the inclusive family (result
/// biased by one).
fn icmp_method(pred: Predicate) -> CompileResult<u8> {
    match pred {
        Predicate::Sge => Ok(0),
        Predicate::Sle => Ok(1),
        Predicate::Sgt => Ok(2),
        Predicate::Slt => Ok(3),
        Predicate::Eq => Ok(4),
        Predicate::Ne => Ok(6),
        _ => Err(CompileError::Unsupported {
            feature: format!("unsigned integer comparison `{}`", pred.name()),
        }),
    }
}

impl Compiler<'_> {
    /// Dispatches one instruction to its generator. Exhaustive over the
    /// source opcode set.
    pub(crate) fn lower_single(&mut self, inst: &Inst) -> CompileResult<Compiled> {
        match &inst.kind {
            InstKind::Add { x, y } => self.lower_binary(false, x, y, inst.id),
            InstKind::Sub { x, y } => self.lower_binary(true, x, y, inst.id),
            InstKind::Mul { x, y } => self.lower_mul(x, y, inst.id),
            InstKind::SDiv { x, y } => self.lower_div(x, y, inst.id),
            InstKind::SRem { x, y } => self.lower_rem(x, y, inst.id),
            InstKind::Alloca => self.lower_alloca(inst.id),
            InstKind::Load { src } => self.lower_copy(src, inst.id),
            InstKind::Store { src, dst } => self.lower_store(src, dst),
            InstKind::ICmp { pred, x, y } => self.lower_icmp(*pred, x, y, inst.id),
            InstKind::ZExt { from, .. } => self.lower_copy(from, inst.id),
            InstKind::Bitcast {
                from,
                from_ty,
                to_ty,
            } => self.lower_bitcast(from, from_ty, to_ty, inst.id),
            InstKind::Call { callee, args } => self.lower_call(callee, args),
        }
    }

    /// `LDA x; ADD|SUB y; STA dst`.
    fn lower_binary(
        &mut self,
        subtract: bool,
        x: &Operand,
        y: &Operand,
        dst: InstId,
    ) -> CompileResult<Compiled> {
        let x_op = self.resolve_operand(x)?;
        let y_op = self.resolve_operand(y)?;
        let dst_op = self.destination_box(dst);

        let middle = if subtract {
            Instruction::Sub(y_op.mailbox())
        } else {
            Instruction::Add(y_op.mailbox())
        };

        Ok(Compiled::of(Unit {
            instructions: vec![
                Instruction::Load(x_op.mailbox()),
                middle,
                Instruction::Store(dst_op.mailbox()),
            ],
            ops: vec![x_op, y_op, dst_op],
        }))
    }

    /// Multiplication as a counting loop: the scratch box counts down
    /// from `x` while the destination accumulates `y`. The branch tests
    /// after the decrement, so the body runs `x + 1` times and the
    /// trailing `SUB y` cancels the extra iteration.
    fn lower_mul(&mut self, x: &Operand, y: &Operand, dst: InstId) -> CompileResult<Compiled> {
        let x_op = self.resolve_operand(x)?;
        let y_op = self.resolve_operand(y)?;
        let dst_op = self.destination_box(dst);
        let counter_op = self.scratch_box();
        let one_op = self.program.memory.constant(1);
        let label_op = self.program.memory.new_label(None);

        let (xb, yb) = (x_op.mailbox(), y_op.mailbox());
        let db = dst_op.mailbox();
        let counter = counter_op.mailbox();
        let one = one_op.mailbox();
        let head = label_op.label();

        Ok(Compiled::of(Unit {
            instructions: vec![
                Instruction::Load(xb),
                Instruction::Store(counter.clone()),
                Instruction::Labelled(head.clone(), Box::new(Instruction::Load(db.clone()))),
                Instruction::Add(yb.clone()),
                Instruction::Store(db.clone()),
                Instruction::Load(counter.clone()),
                Instruction::Sub(one),
                Instruction::Store(counter),
                Instruction::Branch(BranchKind::IfPositive, head),
                Instruction::Load(db.clone()),
                Instruction::Sub(yb),
                Instruction::Store(db),
            ],
            ops: vec![x_op, y_op, dst_op, counter_op, one_op, label_op],
        }))
    }

    /// Division as the symmetric loop: the scratch box counts `x` down
    /// by `y` while the destination counts iterations; the trailing
    /// `SUB` of one cancels the iteration that overshot.
    fn lower_div(&mut self, x: &Operand, y: &Operand, dst: InstId) -> CompileResult<Compiled> {
        let x_op = self.resolve_operand(x)?;
        let y_op = self.resolve_operand(y)?;
        let dst_op = self.destination_box(dst);
        let remainder_op = self.scratch_box();
        let one_op = self.program.memory.constant(1);
        let label_op = self.program.memory.new_label(None);

        let (xb, yb) = (x_op.mailbox(), y_op.mailbox());
        let db = dst_op.mailbox();
        let remainder = remainder_op.mailbox();
        let one = one_op.mailbox();
        let head = label_op.label();

        Ok(Compiled::of(Unit {
            instructions: vec![
                Instruction::Load(xb),
                Instruction::Store(remainder.clone()),
                Instruction::Labelled(head.clone(), Box::new(Instruction::Load(db.clone()))),
                Instruction::Add(one.clone()),
                Instruction::Store(db.clone()),
                Instruction::Load(remainder.clone()),
                Instruction::Sub(yb),
                Instruction::Store(remainder),
                Instruction::Branch(BranchKind::IfPositive, head),
                Instruction::Load(db.clone()),
                Instruction::Sub(one),
                Instruction::Store(db),
            ],
            ops: vec![x_op, y_op, dst_op, remainder_op, one_op, label_op],
        }))
    }

    /// Remainder reuses the division shape directly on the destination:
    /// subtract `y` until no longer positive, then add the one `y` that
    /// overshot back on.
    fn lower_rem(&mut self, x: &Operand, y: &Operand, dst: InstId) -> CompileResult<Compiled> {
        let x_op = self.resolve_operand(x)?;
        let y_op = self.resolve_operand(y)?;
        let dst_op = self.destination_box(dst);
        let label_op = self.program.memory.new_label(None);

        let (xb, yb) = (x_op.mailbox(), y_op.mailbox());
        let db = dst_op.mailbox();
        let head = label_op.label();

        Ok(Compiled::of(Unit {
            instructions: vec![
                Instruction::Load(xb),
                Instruction::Store(db.clone()),
                Instruction::Labelled(head.clone(), Box::new(Instruction::Load(db.clone()))),
                Instruction::Sub(yb.clone()),
                Instruction::Store(db.clone()),
                Instruction::Branch(BranchKind::IfPositive, head),
                Instruction::Load(db.clone()),
                Instruction::Add(yb),
                Instruction::Store(db),
            ],
            ops: vec![x_op, y_op, dst_op, label_op],
        }))
    }

    /// Alloca reserves the destination mailbox and emits nothing.
    fn lower_alloca(&mut self, dst: InstId) -> CompileResult<Compiled> {
        let op = self.program.memory.new_mailbox(dst, None);

        Ok(Compiled::of(Unit {
            instructions: Vec::new(),
            ops: vec![op],
        }))
    }

    /// IR-level load and zero-extension: a storage-level copy.
    fn lower_copy(&mut self, src: &Operand, dst: InstId) -> CompileResult<Compiled> {
        let src_op = self.resolve_operand(src)?;
        let dst_op = self.destination_box(dst);

        Ok(Compiled::of(Unit {
            instructions: vec![
                Instruction::Load(src_op.mailbox()),
                Instruction::Store(dst_op.mailbox()),
            ],
            ops: vec![src_op, dst_op],
        }))
    }

    /// IR-level store: both operands resolve as values; the destination
    /// must already be compiled.
    fn lower_store(&mut self, src: &Operand, dst: &Operand) -> CompileResult<Compiled> {
        let src_op = self.resolve_operand(src)?;
        let dst_op = self.resolve_operand(dst)?;

        Ok(Compiled::of(Unit {
            instructions: vec![
                Instruction::Load(src_op.mailbox()),
                Instruction::Store(dst_op.mailbox()),
            ],
            ops: vec![src_op, dst_op],
        }))
    }

    /// A reinterpretation is a storage-level copy here; the machine has
    /// no type system to check it against, hence the diagnostic.
    fn lower_bitcast(
        &mut self,
        from: &Operand,
        from_ty: &Ty,
        to_ty: &Ty,
        dst: InstId,
    ) -> CompileResult<Compiled> {
        if !from_ty.is_int_like() || !to_ty.is_int_like() {
            return Err(CompileError::InvalidOperandType {
                detail: format!("bitcast between `{from_ty}` and `{to_ty}`"),
            });
        }

        let mut compiled = self.lower_copy(from, dst)?;
        compiled.warnings.push(Warning::bitcast(from_ty, to_ty));
        Ok(compiled)
    }

    /// Comparison: a sign-bearing difference in the destination box.
    /// The "less" family swaps operands; the inclusive family biases
    /// the difference by one so a strictly-positive test reads `>=`.
    pub(crate) fn lower_icmp(
        &mut self,
        pred: Predicate,
        x: &Operand,
        y: &Operand,
        dst: InstId,
    ) -> CompileResult<Compiled> {
        let method = icmp_method(pred)?;

        let x_op = self.resolve_operand(x)?;
        let y_op = self.resolve_operand(y)?;
        let dst_op = self.destination_box(dst);

        let (first, second) = if method & 1 == 1 {
            (y_op.mailbox(), x_op.mailbox())
        } else {
            (x_op.mailbox(), y_op.mailbox())
        };

        let mut instructions = vec![Instruction::Load(first), Instruction::Sub(second)];
        let mut ops = vec![x_op, y_op];

        if method <= 1 {
            let one_op = self.program.memory.constant(1);
            instructions.push(Instruction::Add(one_op.mailbox()));
            ops.push(one_op);
        }

        instructions.push(Instruction::Store(dst_op.mailbox()));
        ops.push(dst_op);

        Ok(Compiled::of(Unit { instructions, ops }))
    }

    /// Calls are builtin expansions; there are no real functions on
    /// this machine.
    fn lower_call(&mut self, callee: &str, args: &[Operand]) -> CompileResult<Compiled> {
        if callee == PRAGMA_CALLEE {
            // The pragma pattern outranks the call pattern; reaching
            // here means the engine's priorities were bypassed.
            return Err(CompileError::InvalidPragma {
                reason: "matched as a plain builtin call, not as pragma syntax".to_string(),
            });
        }

        let mut ops = Vec::new();
        let mut params = Vec::new();

        for arg in args {
            let op = self.resolve_operand(arg)?;
            params.push(op.mailbox());
            ops.push(op);
        }

        let builtin = builtin::lookup(callee).ok_or_else(|| CompileError::UnknownBuiltin {
            name: callee.to_string(),
            arity: args.len(),
        })?;

        let mut call = BuiltinCall::new(builtin, params);
        call.invoke()?;

        Ok(Compiled::of(Unit {
            instructions: call.instructions().to_vec(),
            ops,
        }))
    }

    /// The in-source configuration pragma: two arguments, a global
    /// string key and a literal integer value, applied to the options
    /// surface. Produces no code.
    pub(crate) fn lower_pragma(&mut self, inst: &Inst) -> CompileResult<Compiled> {
        let InstKind::Call { args, .. } = &inst.kind else {
            return Err(CompileError::MissingProperty {
                property: "call body on a pragma instruction",
            });
        };

        if args.len() != 2 {
            return Err(CompileError::InvalidPragma {
                reason: format!("expected 2 args, got {}", args.len()),
            });
        }

        let value = match &args[1] {
            Operand::Literal(value) => *value,
            other => {
                return Err(CompileError::IncorrectType {
                    value: "pragma value argument",
                    got: other.kind_name().to_string(),
                    expected: "integer literal",
                })
            }
        };

        let key = match &args[0] {
            Operand::Global(name) => {
                self.module()
                    .global(name)
                    .map(|g| g.value.clone())
                    .ok_or_else(|| CompileError::InvalidPragma {
                        reason: format!("could not find global string `@{name}`"),
                    })?
            }
            other => {
                return Err(CompileError::IncorrectType {
                    value: "pragma key argument",
                    got: other.kind_name().to_string(),
                    expected: "global string reference",
                })
            }
        };

        let mut compiled = Compiled::of(Unit::empty());
        if !self.options_mut().set(&key, value) {
            compiled.warnings.push(Warning::unknown_option(&key, value));
        }

        Ok(compiled)
    }
}
