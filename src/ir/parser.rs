//! A minimal reader for the textual IR form.
//!
//! This is a convenience for the driver binary and the test suite, not a
//! real frontend: one instruction per line, `;` comments, `@name = "…"`
//! string globals, `func @name { … }` bodies with optional `label:` block
//! headers. Example:
//!
//! ```text
//! ; doubles its input
//! func @_lmc {
//! entry:
//!     %cell = alloca
//!     call @input(%cell)
//!     %v = load %cell
//!     %twice = mul %v, 2
//!     call @output(%twice)
//!     call @_hlt()
//! }
//! ```

use hashbrown::HashMap;
use thiserror::Error;

use super::{
    Block, Function, Global, Inst, InstId, InstKind, Module, Operand, Predicate, Ty,
};

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("line {line}: expected {expected}")]
    Expected { line: usize, expected: String },

    #[error("line {line}: unknown opcode `{opcode}`")]
    UnknownOpcode { line: usize, opcode: String },

    #[error("line {line}: unknown value `%{name}`")]
    UnknownValue { line: usize, name: String },

    #[error("line {line}: unknown predicate `{predicate}`")]
    UnknownPredicate { line: usize, predicate: String },

    #[error("line {line}: `{text}` is not a valid operand")]
    BadOperand { line: usize, text: String },

    #[error("line {line}: duplicate value name `%{name}`")]
    DuplicateValue { line: usize, name: String },

    #[error("line {line}: statement outside a function body")]
    OutsideFunction { line: usize },

    #[error("unterminated function `{name}`")]
    Unterminated { name: String },
}

/// Parses a whole textual module.
pub fn parse_module(text: &str) -> Result<Module, ParseError> {
    Parser::default().parse(text)
}

#[derive(Default)]
struct Parser {
    module: Module,
    next_id: InstId,
    // Result-name bindings of the function being parsed.
    values: HashMap<String, (InstId, Ty)>,
}

struct OpenFunction {
    function: Function,
    block: Block,
}

impl Parser {
    fn parse(mut self, text: &str) -> Result<Module, ParseError> {
        let mut open: Option<OpenFunction> = None;

        for (index, raw) in text.lines().enumerate() {
            let line = index + 1;
            let stmt = match raw.split(';').next().map(str::trim) {
                None | Some("") => continue,
                Some(stmt) => stmt,
            };

            if let Some(rest) = stmt.strip_prefix("func ") {
                if let Some(f) = open.take() {
                    return Err(ParseError::Unterminated {
                        name: f.function.name,
                    });
                }
                open = Some(self.begin_function(line, rest)?);
            } else if stmt == "}" {
                let f = open.take().ok_or(ParseError::OutsideFunction { line })?;
                self.module.functions.push(finish(f));
            } else if let Some(f) = open.as_mut() {
                if let Some(label) = stmt.strip_suffix(':') {
                    // A new block header; an empty running block at the
                    // function head is replaced rather than kept.
                    if !f.block.insts.is_empty() || !f.function.blocks.is_empty() {
                        let done = std::mem::replace(
                            &mut f.block,
                            Block {
                                label: label.to_string(),
                                insts: Vec::new(),
                            },
                        );
                        f.function.blocks.push(done);
                    } else {
                        f.block.label = label.to_string();
                    }
                } else {
                    let inst = self.parse_statement(line, stmt)?;
                    f.block.insts.push(inst);
                }
            } else if stmt.starts_with('@') {
                self.parse_global(line, stmt)?;
            } else {
                return Err(ParseError::OutsideFunction { line });
            }
        }

        if let Some(f) = open {
            return Err(ParseError::Unterminated {
                name: f.function.name,
            });
        }

        Ok(self.module)
    }

    fn parse_global(&mut self, line: usize, stmt: &str) -> Result<(), ParseError> {
        // @name = "value"
        let expected = || ParseError::Expected {
            line,
            expected: "`@name = \"value\"`".to_string(),
        };

        let (name, rest) = stmt[1..].split_once('=').ok_or_else(expected)?;
        let value = rest
            .trim()
            .strip_prefix('"')
            .and_then(|v| v.strip_suffix('"'))
            .ok_or_else(expected)?;

        self.module.globals.push(Global {
            name: name.trim().to_string(),
            value: value.to_string(),
        });
        Ok(())
    }

    fn begin_function(&mut self, line: usize, rest: &str) -> Result<OpenFunction, ParseError> {
        let rest = rest.trim();
        let name = rest
            .strip_prefix('@')
            .and_then(|r| r.strip_suffix('{'))
            .map(str::trim)
            .ok_or_else(|| ParseError::Expected {
                line,
                expected: "`func @name {`".to_string(),
            })?;

        self.values.clear();

        Ok(OpenFunction {
            function: Function {
                name: name.trim_end_matches("()").to_string(),
                blocks: Vec::new(),
            },
            block: Block {
                label: "entry".to_string(),
                insts: Vec::new(),
            },
        })
    }

    fn parse_statement(&mut self, line: usize, stmt: &str) -> Result<Inst, ParseError> {
        let id = self.next_id;
        self.next_id += 1;

        if let Some((lhs, rhs)) = stmt.split_once('=') {
            let name = lhs
                .trim()
                .strip_prefix('%')
                .ok_or_else(|| ParseError::Expected {
                    line,
                    expected: "`%name =` before an instruction".to_string(),
                })?
                .to_string();

            let (kind, ty) = self.parse_instruction(line, rhs.trim())?;

            if self.values.insert(name.clone(), (id, ty)).is_some() {
                return Err(ParseError::DuplicateValue { line, name });
            }

            Ok(Inst::new(id, kind))
        } else {
            let (kind, _) = self.parse_instruction(line, stmt)?;
            Ok(Inst::new(id, kind))
        }
    }

    /// Parses the instruction text after any `%name =` binding; returns
    /// the kind and the type of the produced value.
    fn parse_instruction(&mut self, line: usize, text: &str) -> Result<(InstKind, Ty), ParseError> {
        let (opcode, rest) = match text.split_once(char::is_whitespace) {
            Some((op, rest)) => (op, rest.trim()),
            None => (text, ""),
        };

        match opcode {
            "add" | "sub" | "mul" | "sdiv" | "srem" => {
                let (x, y) = self.parse_operand_pair(line, rest)?;
                let kind = match opcode {
                    "add" => InstKind::Add { x, y },
                    "sub" => InstKind::Sub { x, y },
                    "mul" => InstKind::Mul { x, y },
                    "sdiv" => InstKind::SDiv { x, y },
                    _ => InstKind::SRem { x, y },
                };
                Ok((kind, Ty::Int(32)))
            }
            "alloca" => Ok((InstKind::Alloca, Ty::Ptr(Box::new(Ty::Int(32))))),
            "load" => {
                let src = self.parse_operand(line, rest)?;
                Ok((InstKind::Load { src }, Ty::Int(32)))
            }
            "store" => {
                let (src, dst) = self.parse_operand_pair(line, rest)?;
                Ok((InstKind::Store { src, dst }, Ty::Void))
            }
            "icmp" => {
                let (pred_text, rest) =
                    rest.split_once(char::is_whitespace)
                        .ok_or_else(|| ParseError::Expected {
                            line,
                            expected: "`icmp <predicate> x, y`".to_string(),
                        })?;
                let pred = parse_predicate(line, pred_text)?;
                let (x, y) = self.parse_operand_pair(line, rest.trim())?;
                Ok((InstKind::ICmp { pred, x, y }, Ty::Int(1)))
            }
            "zext" => {
                let from = self.parse_operand(line, rest)?;
                let from_ty = self.operand_ty(&from);
                Ok((
                    InstKind::ZExt {
                        from,
                        from_ty,
                        to_ty: Ty::Int(32),
                    },
                    Ty::Int(32),
                ))
            }
            "bitcast" => {
                let from = self.parse_operand(line, rest)?;
                let from_ty = self.operand_ty(&from);
                Ok((
                    InstKind::Bitcast {
                        from,
                        from_ty,
                        to_ty: Ty::Int(32),
                    },
                    Ty::Int(32),
                ))
            }
            "call" => {
                let open = rest.find('(').ok_or_else(|| ParseError::Expected {
                    line,
                    expected: "`call @name(args…)`".to_string(),
                })?;
                let callee = rest[..open]
                    .trim()
                    .strip_prefix('@')
                    .ok_or_else(|| ParseError::Expected {
                        line,
                        expected: "`@` before the callee name".to_string(),
                    })?
                    .to_string();
                let args_text = rest[open + 1..]
                    .trim()
                    .strip_suffix(')')
                    .ok_or_else(|| ParseError::Expected {
                        line,
                        expected: "`)` closing the call".to_string(),
                    })?;

                let mut args = Vec::new();
                if !args_text.trim().is_empty() {
                    for piece in args_text.split(',') {
                        args.push(self.parse_operand(line, piece.trim())?);
                    }
                }

                Ok((InstKind::Call { callee, args }, Ty::Void))
            }
            other => Err(ParseError::UnknownOpcode {
                line,
                opcode: other.to_string(),
            }),
        }
    }

    fn parse_operand_pair(
        &mut self,
        line: usize,
        text: &str,
    ) -> Result<(Operand, Operand), ParseError> {
        let (a, b) = text.split_once(',').ok_or_else(|| ParseError::Expected {
            line,
            expected: "two comma-separated operands".to_string(),
        })?;

        Ok((
            self.parse_operand(line, a.trim())?,
            self.parse_operand(line, b.trim())?,
        ))
    }

    fn parse_operand(&mut self, line: usize, text: &str) -> Result<Operand, ParseError> {
        if text == "null" {
            return Ok(Operand::Null);
        }

        if let Some(name) = text.strip_prefix('%') {
            let (id, ty) = self
                .values
                .get(name)
                .cloned()
                .ok_or_else(|| ParseError::UnknownValue {
                    line,
                    name: name.to_string(),
                })?;
            return Ok(Operand::Inst { id, ty });
        }

        if let Some(name) = text.strip_prefix('@') {
            return Ok(Operand::Global(name.to_string()));
        }

        text.parse::<i64>()
            .map(Operand::Literal)
            .map_err(|_| ParseError::BadOperand {
                line,
                text: text.to_string(),
            })
    }

    fn operand_ty(&self, operand: &Operand) -> Ty {
        match operand {
            Operand::Inst { ty, .. } => ty.clone(),
            _ => Ty::Int(32),
        }
    }
}

fn finish(mut open: OpenFunction) -> Function {
    open.function.blocks.push(open.block);
    open.function
}

fn parse_predicate(line: usize, text: &str) -> Result<Predicate, ParseError> {
    Ok(match text {
        "eq" => Predicate::Eq,
        "ne" => Predicate::Ne,
        "sgt" => Predicate::Sgt,
        "sge" => Predicate::Sge,
        "slt" => Predicate::Slt,
        "sle" => Predicate::Sle,
        "ugt" => Predicate::Ugt,
        "uge" => Predicate::Uge,
        "ult" => Predicate::Ult,
        "ule" => Predicate::Ule,
        other => {
            return Err(ParseError::UnknownPredicate {
                line,
                predicate: other.to_string(),
            })
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_small_module() {
        let module = parse_module(
            r#"
            ; configuration string
            @OPT = "OPT"

            func @_lmc {
            entry:
                %cell = alloca
                store 5, %cell
                %v = load %cell
                %sum = add %v, 3
                call @output(%sum)
            }
            "#,
        )
        .unwrap();

        assert_eq!(module.globals.len(), 1);
        assert_eq!(module.globals[0].value, "OPT");

        let entry = module.entry().expect("entry function");
        assert_eq!(entry.blocks.len(), 1);
        assert_eq!(entry.blocks[0].label, "entry");
        assert_eq!(entry.blocks[0].insts.len(), 5);

        // Identities are assigned in order, and references resolve to them.
        let load = &entry.blocks[0].insts[2];
        match &load.kind {
            InstKind::Load { src: Operand::Inst { id, ty } } => {
                assert_eq!(*id, entry.blocks[0].insts[0].id);
                assert_eq!(*ty, Ty::Ptr(Box::new(Ty::Int(32))));
            }
            other => panic!("unexpected load shape: {other:?}"),
        }
    }

    #[test]
    fn splits_blocks_on_labels() {
        let module = parse_module(
            "func @_lmc {\n%a = alloca\nsecond:\n%b = alloca\n}\n",
        )
        .unwrap();

        let f = module.entry().unwrap();
        assert_eq!(f.blocks.len(), 2);
        assert_eq!(f.blocks[0].label, "entry");
        assert_eq!(f.blocks[1].label, "second");
        assert_eq!(f.blocks[0].insts.len(), 1);
        assert_eq!(f.blocks[1].insts.len(), 1);
    }

    #[test]
    fn rejects_references_to_unknown_values() {
        let err = parse_module("func @_lmc {\n%a = add %ghost, 1\n}\n");
        assert!(matches!(err, Err(ParseError::UnknownValue { .. })));
    }

    #[test]
    fn rejects_unknown_opcodes() {
        let err = parse_module("func @_lmc {\n%a = frobnicate 1, 2\n}\n");
        assert!(matches!(err, Err(ParseError::UnknownOpcode { .. })));
    }

    #[test]
    fn rejects_instructions_outside_functions() {
        let err = parse_module("%a = alloca\n");
        assert!(matches!(err, Err(ParseError::OutsideFunction { .. })));
    }

    #[test]
    fn parses_calls_with_mixed_operands() {
        let module = parse_module(
            "func @_lmc {\ncall @__lmc_option__(@WLEVEL, 2)\ncall @_hlt()\n}\n",
        )
        .unwrap();

        let insts = &module.entry().unwrap().blocks[0].insts;
        match &insts[0].kind {
            InstKind::Call { callee, args } => {
                assert_eq!(callee, "__lmc_option__");
                assert_eq!(args[0], Operand::Global("WLEVEL".to_string()));
                assert_eq!(args[1], Operand::Literal(2));
            }
            other => panic!("unexpected call shape: {other:?}"),
        }
        match &insts[1].kind {
            InstKind::Call { callee, args } => {
                assert_eq!(callee, "_hlt");
                assert!(args.is_empty());
            }
            other => panic!("unexpected call shape: {other:?}"),
        }
    }
}
