use std::rc::Rc;

use anyhow::Result;

use crate::bytecode::{Instruction, Opcode, Stub};
use crate::op::{AssignOp, Operator};
use crate::val::{FunctionFacet, Key, TypeRef, Value};

use super::access::Accessor;
use super::frame::{Capture, RestartCondition};
use super::{FatalError, Vm};

enum Flow {
    Next,
    Return(Value),
}

impl Vm {
    /// Run the frame at `index` until it returns. Falling off the end consults
    /// the frame's restart condition.
    pub(crate) fn execute(&mut self, index: usize) -> Result<Value> {
        let stub = self.frames[index].stub.clone();
        loop {
            let pc = self.frames[index].pc;
            let Some(ins) = stub.instructions.get(pc).copied() else {
                if self.restart(index)? {
                    let frame = &mut self.frames[index];
                    frame.pc = 0;
                    frame.stack.clear();
                    continue;
                }
                return Ok(Value::Empty);
            };
            self.frames[index].pc = pc + 1;
            if let Flow::Return(value) = self.step(index, &stub, ins)? {
                return Ok(value);
            }
        }
    }

    fn step(&mut self, index: usize, stub: &Stub, ins: Instruction) -> Result<Flow> {
        let Some(opcode) = Opcode::from_u8(ins.opcode) else {
            return Err(self.raise_message(format!("Unknown opcode {:#04x}", ins.opcode)));
        };
        let operand = ins.operand.as_f64();
        match opcode {
            Opcode::Nop => {}
            Opcode::Prf => {
                let value = self.read_referrable(index, operand as usize)?;
                self.push(index, value);
            }
            Opcode::Nem => self.push(index, Value::Empty),
            Opcode::Nnm => self.push(index, Value::Number(operand)),
            Opcode::Nbl => self.push(index, Value::Boolean(operand != 0.0)),
            Opcode::Nst => {
                let Some(text) = stub.strings.get(operand as usize).cloned() else {
                    return Err(self.raise_message(format!("String pool index {} out of range", operand)));
                };
                self.push(index, Value::String(text));
            }
            Opcode::Nob => {
                let obj = self.new_object();
                self.push(index, Value::Object(obj));
            }
            Opcode::Nfn => {
                let closure = self.make_closure(index, operand as u32, None)?;
                self.push(index, closure);
            }
            Opcode::Nsf => {
                let Some(target) = self.stub(stub.file_id, operand as u32) else {
                    return Err(self.raise_message(format!("Unknown function stub {}", operand)));
                };
                let raw = self.pop_n(index, target.arg_count() + 1)?;
                let mut types: Vec<TypeRef> = Vec::with_capacity(raw.len());
                for value in raw {
                    match value {
                        Value::Type(ty) => types.push(ty),
                        other => {
                            return Err(self.raise_message(format!(
                                "Function signature expects Type values, got {}",
                                other.kind_name()
                            )));
                        }
                    }
                }
                let closure = self.make_closure(index, operand as u32, Some(Rc::from(types)))?;
                self.push(index, closure);
            }
            Opcode::Caa => {
                let values = self.pop_n(index, operand as usize)?;
                let obj = self.new_index_object(values);
                self.push(index, obj);
            }
            Opcode::Cas => {
                let flat = self.pop_n(index, operand as usize * 2)?;
                let obj = self.new_object();
                for pair in flat.chunks_exact(2) {
                    let key = Key::from_value(&pair[0]).map_err(|e| self.raise_message(e))?;
                    let stored = obj.borrow_mut().try_set(key, pair[1].clone());
                    stored.map_err(|e| self.raise_message(e))?;
                }
                self.push(index, Value::Object(obj));
            }
            Opcode::Pto => {
                let Some(ty) = self.types.builtin_by_id(operand as u32) else {
                    return Err(self.raise_message(format!("Unknown builtin type {}", operand)));
                };
                self.push(index, Value::Type(ty));
            }
            Opcode::Cal => {
                let flat = self.pop_n(index, operand as usize * 2)?;
                let func = self.pop(index)?;
                let mut args: Vec<(Rc<str>, Value)> = Vec::with_capacity(flat.len() / 2);
                let mut flat = flat.into_iter();
                while let (Some(name), Some(value)) = (flat.next(), flat.next()) {
                    match name {
                        Value::String(name) => args.push((name, value)),
                        other => {
                            return Err(self.raise_message(format!(
                                "Argument names must be strings, got {}",
                                other.kind_name()
                            )));
                        }
                    }
                }
                let result = self.call_inner(&func, &args, None)?;
                self.push(index, result);
            }
            Opcode::Arf => {
                let raw = operand as u64;
                let slot = (raw & 0xFFFF_FFFF) as usize;
                let assign = self.assign_op((raw >> 32) as u8)?;
                let value = self.pop(index)?;
                let stored = if assign == AssignOp::Set {
                    value
                } else {
                    let current = self.read_referrable(index, slot)?;
                    match self.compound_assign(assign, &current, &value)? {
                        Some(next) => next,
                        None => {
                            self.push(index, current);
                            return Ok(Flow::Next);
                        }
                    }
                };
                self.write_referrable(index, slot, stored.clone())?;
                self.push(index, stored);
            }
            Opcode::Osn => {
                let raw = operand as u64;
                let assign = self.assign_op((raw & 0xFF) as u8)?;
                let accessor = Accessor::from_u8(((raw >> 8) & 0xFF) as u8);
                let value = self.pop(index)?;
                let key = self.pop(index)?;
                let target = self.pop(index)?;
                let stored = if assign == AssignOp::Set {
                    value
                } else {
                    let current = self.get_member(&target, &key, accessor)?;
                    match self.compound_assign(assign, &current, &value)? {
                        Some(next) => next,
                        None => {
                            self.push(index, current);
                            return Ok(Flow::Next);
                        }
                    }
                };
                let stored = self.set_member(&target, &key, stored, accessor)?;
                self.push(index, stored);
            }
            Opcode::Olk => {
                let key = self.pop(index)?;
                let target = self.pop(index)?;
                let value = self.get_member(&target, &key, Accessor::from_u8(operand as u8))?;
                self.push(index, value);
            }
            Opcode::Opr => {
                let Some(op) = Operator::from_u8(operand as u8) else {
                    return Err(self.raise_message(format!("Unknown operator {}", operand)));
                };
                let result = if op.is_unary() {
                    let value = self.pop(index)?;
                    self.unary_op(op, &value)?
                } else {
                    let rhs = self.pop(index)?;
                    let lhs = self.pop(index)?;
                    self.binary_op(op, &lhs, &rhs)?
                };
                self.push(index, result);
            }
            Opcode::Ext => {
                let native = self.native_value(operand as u32)?;
                self.push(index, native);
            }
            Opcode::Pop => {
                self.pop_n(index, operand as usize)?;
            }
            Opcode::Cpy => {
                let top = self.peek(index)?;
                self.push(index, top);
            }
            Opcode::Ret => {
                let value = self.frames[index].stack.pop().unwrap_or_default();
                return Ok(Flow::Return(value));
            }
            Opcode::Skp => self.skip(index, operand),
            Opcode::Skf => {
                let cond = self.pop(index)?;
                if !self.as_boolean(&cond)? {
                    self.skip(index, operand);
                }
            }
            Opcode::Sca | Opcode::Sco => {
                let cond = self.peek(index)?;
                let skip_when = opcode == Opcode::Sco;
                if self.as_boolean(&cond)? == skip_when {
                    self.skip(index, operand);
                } else {
                    self.pop(index)?;
                }
            }
            Opcode::Lop => {
                let func = self.pop(index)?;
                let to = self.pop(index)?;
                let from = self.pop(index)?;
                let from = self.as_number(&from)?;
                let to = self.as_number(&to)?;
                let result = self.count_loop(from, to, &func)?;
                self.push(index, result);
            }
            Opcode::Fvr => {
                let func = self.pop(index)?;
                let result = self.forever_loop(&func)?;
                self.push(index, result);
            }
            Opcode::Fch => {
                let func = self.pop(index)?;
                let target = self.pop(index)?;
                let result = self.foreach_loop(&target, &func)?;
                self.push(index, result);
            }
            Opcode::Qry => {
                let base = self.pop(index)?;
                let result = self.query(&base, operand as u32)?;
                self.push(index, result);
            }
            Opcode::Lst => {
                let response = self.pop(index)?;
                let func = self.pop(index)?;
                let result = self.listen(&func, &response)?;
                self.push(index, result);
            }
        }
        Ok(Flow::Next)
    }

    fn assign_op(&mut self, raw: u8) -> Result<AssignOp> {
        AssignOp::from_u8(raw).ok_or_else(|| self.raise_message(format!("Unknown assignment operator {}", raw)))
    }

    #[inline]
    fn push(&mut self, index: usize, value: Value) {
        self.frames[index].stack.push(value);
    }

    fn pop(&mut self, index: usize) -> Result<Value> {
        match self.frames[index].stack.pop() {
            Some(value) => Ok(value),
            None => Err(self.raise_message("Value stack underflow")),
        }
    }

    fn peek(&mut self, index: usize) -> Result<Value> {
        match self.frames[index].stack.last() {
            Some(value) => Ok(value.clone()),
            None => Err(self.raise_message("Value stack underflow")),
        }
    }

    /// Pop `n` values, returned in push order.
    fn pop_n(&mut self, index: usize, n: usize) -> Result<Vec<Value>> {
        let len = self.frames[index].stack.len();
        if n > len {
            return Err(self.raise_message("Value stack underflow"));
        }
        Ok(self.frames[index].stack.split_off(len - n))
    }

    #[inline]
    fn skip(&mut self, index: usize, count: f64) {
        let frame = &mut self.frames[index];
        frame.pc = frame.pc.saturating_add(count as usize);
    }

    /// Own slots first, then captures.
    pub(crate) fn read_referrable(&mut self, index: usize, slot: usize) -> Result<Value> {
        let frame = &self.frames[index];
        let own = frame.stub.referrable_count();
        let found = if slot < own {
            frame.referrables().borrow().get(slot).cloned()
        } else {
            frame.captures.get(slot - own).map(Capture::get)
        };
        match found {
            Some(value) => Ok(value),
            None => Err(self.raise_message(format!("Referrable {} out of range", slot))),
        }
    }

    pub(crate) fn write_referrable(&mut self, index: usize, slot: usize, value: Value) -> Result<()> {
        let frame = &self.frames[index];
        let own = frame.stub.referrable_count();
        let written = if slot < own {
            match frame.referrables().borrow_mut().get_mut(slot) {
                Some(cell) => {
                    *cell = value;
                    true
                }
                None => false,
            }
        } else {
            frame.captures.get(slot - own).is_some_and(|capture| capture.set(value))
        };
        if written {
            Ok(())
        } else {
            Err(self.raise_message(format!("Referrable {} out of range", slot)))
        }
    }

    /// Closure over stub `stub_id` of the current file, capturing from the
    /// executing frame's scope chain.
    fn make_closure(&mut self, index: usize, stub_id: u32, types: Option<Rc<[TypeRef]>>) -> Result<Value> {
        let (file_id, scope) = {
            let frame = &self.frames[index];
            (frame.stub.file_id, frame.scope.clone())
        };
        let Some(target) = self.stub(file_id, stub_id) else {
            return Err(self.raise_message(format!("Unknown function stub {}", stub_id)));
        };
        let mut captures = Vec::with_capacity(target.captures.len());
        for desc in &target.captures {
            let Some(owner) = scope.find(file_id, desc.stub_id) else {
                return Err(FatalError::new(format!(
                    "stub {} captures slot {} of stub {}, which is not on the scope chain",
                    stub_id, desc.slot, desc.stub_id
                ))
                .into());
            };
            let owned = owner.referrables.borrow().len();
            if desc.slot as usize >= owned {
                return Err(FatalError::new(format!(
                    "stub {} captures slot {} of stub {}, which has only {} referrables",
                    stub_id, desc.slot, desc.stub_id, owned
                ))
                .into());
            }
            captures.push(Capture {
                referrables: owner.referrables.clone(),
                index: desc.slot as usize,
            });
        }
        let facet = FunctionFacet {
            stub: target,
            captures: Rc::from(captures),
            types,
            origin: Some(scope),
            bound_base: None,
        };
        Ok(Value::Object(self.new_function(facet)))
    }

    /// Advance the frame's restart condition. True re-enters the frame at pc 0.
    fn restart(&mut self, index: usize) -> Result<bool> {
        let Some(mut cond) = self.frames[index].restart.take() else {
            return Ok(false);
        };
        let again = match &mut cond {
            RestartCondition::Count {
                current,
                end,
                step,
                binds_counter,
            } => {
                if *binds_counter {
                    let counter = self.read_referrable(index, 0)?;
                    *current = self.as_number(&counter)?;
                }
                *current += *step;
                let more = if *step > 0.0 { *current < *end } else { *current > *end };
                if more && *binds_counter {
                    self.write_referrable(index, 0, Value::Number(*current))?;
                }
                more
            }
            RestartCondition::Forever => true,
            RestartCondition::Foreach { keys, values, index: at } => {
                *at += 1;
                match (keys.get(*at), values.get(*at)) {
                    (Some(key), Some(value)) => {
                        let arg_count = self.frames[index].stub.arg_count();
                        let bindings = [key.clone(), value.clone()];
                        for (slot, value) in bindings.into_iter().enumerate().take(arg_count) {
                            self.write_referrable(index, slot, value)?;
                        }
                        true
                    }
                    _ => false,
                }
            }
        };
        if again {
            self.frames[index].restart = Some(cond);
        }
        Ok(again)
    }
}
