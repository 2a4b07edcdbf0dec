//! Bytecode VM executing analyzed MIR at compile time.
//!
//! Memory is byte-addressed and little-endian. Frames are bump-allocated in
//! a stack segment and released on return; globals are copied into a data
//! segment the first time they are touched, so writes to them stay private
//! to one `Vm`. Instruction results live in a per-frame register file.
//! Calls push explicit frames; the host stack never grows with user
//! recursion.

use std::collections::HashMap;

use thiserror::Error;

use crate::arena::Idx;
use crate::fold;
use crate::mir::{BlockId, Bound, Callee, FnId, FnState, GlobalId, InstrId, InstrKind, Mir, MirFn};
use crate::native::NativeBridge;
use crate::span::Span;
use crate::types::{LayoutError, TypeId, TypeKind, TypeTable, align_to};
use crate::value::ConstValue;

/// Addresses below this are treated as null.
const STACK_BASE: u64 = 0x1000;
const DATA_BASE: u64 = 1 << 40;
const FRAME_ALIGN: u64 = 16;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmConfig {
    /// Size of the stack segment in bytes.
    pub stack_size: usize,
    /// Maximum call depth.
    pub max_frames: usize,
    /// Size of the data segment holding globals, in bytes.
    pub max_data_size: usize,
}

impl Default for VmConfig {
    fn default() -> Self {
        VmConfig {
            stack_size: 1 << 20,
            max_frames: 1024,
            max_data_size: 1 << 24,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TrapKind {
    #[error("division by zero")]
    DivideByZero,
    #[error("null pointer dereference")]
    NullDereference,
    #[error("index {index} out of bounds for length {len}")]
    OutOfBounds { index: i64, len: u64 },
    #[error("invalid memory access at 0x{0:x}")]
    InvalidAddress(u64),
    #[error("assertion failed: {0}")]
    AssertionFailed(String),
    #[error("reached unreachable code")]
    Unreachable,
    #[error("stack overflow")]
    StackOverflow,
    #[error("out of memory")]
    OutOfMemory,
    #[error("native call failed: {0}")]
    Native(String),
    #[error("function `{0}` cannot be executed")]
    IncompleteFunction(String),
    #[error("invalid operation: {0}")]
    InvalidOperation(String),
}

/// A fault raised while executing, with the span of the faulting instruction.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} at {span}")]
pub struct Trap {
    pub kind: TrapKind,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VmState {
    Ready,
    Running,
    Returned,
    Trapped,
    StackOverflow,
}

/// Result of [`Vm::run`].
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Returned(ConstValue),
    Trapped(Trap),
    /// Execution reached a function whose body is not analyzed yet.
    Postponed(FnId),
}

enum Stop {
    Trap(Trap),
    Postponed(FnId),
}

fn trap(kind: TrapKind, span: Span) -> Stop {
    Stop::Trap(Trap { kind, span })
}

fn layout_trap(err: LayoutError, span: Span) -> Stop {
    trap(TrapKind::InvalidOperation(format!("no memory layout: {err:?}")), span)
}

#[derive(Debug)]
struct Frame<'a> {
    func: &'a MirFn,
    block: BlockId,
    pos: usize,
    prev: Option<BlockId>,
    regs: Vec<ConstValue>,
    /// Absolute address of the frame's locals.
    base: u64,
    /// Stack pointer to restore on return.
    saved_sp: u64,
    /// Caller register receiving the return value.
    ret_to: Option<InstrId>,
}

#[derive(Debug, Default)]
struct Memory {
    stack: Vec<u8>,
    data: Vec<u8>,
}

impl Memory {
    fn region(&self, addr: u64, len: u64) -> Result<(bool, usize), TrapKind> {
        if addr < STACK_BASE {
            return Err(TrapKind::NullDereference);
        }
        let (is_data, offset, size) = if addr >= DATA_BASE {
            (true, addr - DATA_BASE, self.data.len() as u64)
        } else {
            (false, addr - STACK_BASE, self.stack.len() as u64)
        };
        match offset.checked_add(len) {
            Some(end) if end <= size => Ok((is_data, offset as usize)),
            _ => Err(TrapKind::InvalidAddress(addr)),
        }
    }

    fn bytes(&self, addr: u64, len: u64) -> Result<&[u8], TrapKind> {
        let (is_data, offset) = self.region(addr, len)?;
        let segment = if is_data { &self.data } else { &self.stack };
        Ok(&segment[offset..offset + len as usize])
    }

    fn bytes_mut(&mut self, addr: u64, len: u64) -> Result<&mut [u8], TrapKind> {
        let (is_data, offset) = self.region(addr, len)?;
        let segment = if is_data { &mut self.data } else { &mut self.stack };
        Ok(&mut segment[offset..offset + len as usize])
    }
}

pub struct Vm<'a> {
    config: VmConfig,
    mir: &'a Mir,
    types: &'a TypeTable,
    natives: &'a dyn NativeBridge,
    memory: Memory,
    /// Offset of the first free stack byte.
    sp: u64,
    globals: HashMap<GlobalId, u64>,
    frames: Vec<Frame<'a>>,
    state: VmState,
}

impl<'a> Vm<'a> {
    pub fn new(config: VmConfig, mir: &'a Mir, types: &'a TypeTable, natives: &'a dyn NativeBridge) -> Self {
        Vm {
            config,
            mir,
            types,
            natives,
            memory: Memory::default(),
            sp: 0,
            globals: HashMap::new(),
            frames: Vec::new(),
            state: VmState::Ready,
        }
    }

    pub fn state(&self) -> VmState {
        self.state
    }

    /// Execute an analyzed function to completion.
    pub fn execute(&mut self, func: FnId, args: &[ConstValue]) -> Result<ConstValue, Trap> {
        match self.run(func, args) {
            Outcome::Returned(value) => Ok(value),
            Outcome::Trapped(trap) => Err(trap),
            Outcome::Postponed(pending) => {
                let pending = self.mir.function(pending);
                Err(Trap {
                    kind: TrapKind::IncompleteFunction(pending.name.clone()),
                    span: pending.span,
                })
            }
        }
    }

    pub fn run(&mut self, func: FnId, args: &[ConstValue]) -> Outcome {
        match self.callable(func, self.mir.function(func).span) {
            Ok(callee) => self.run_fn(callee, args),
            Err(stop) => self.finish(Err(stop)),
        }
    }

    /// Execute a function that is not (yet) part of the MIR, such as the
    /// wrapper the builder creates around a comptime expression.
    pub fn run_fn(&mut self, func: &'a MirFn, args: &[ConstValue]) -> Outcome {
        self.state = VmState::Running;
        self.frames.clear();
        self.sp = 0;
        log::trace!("vm: run `{}`", func.name);

        let result = self.check_args(func, args).and_then(|()| match func.native.as_deref() {
            Some(name) => self.call_native(func, name, args, func.span),
            None => self.push_frame(func, args, None, func.span).and_then(|()| self.run_loop()),
        });
        self.finish(result)
    }

    /// Entry arguments come from the host and are checked against the
    /// signature; calls inside MIR were type checked by the builder.
    fn check_args(&self, func: &MirFn, args: &[ConstValue]) -> Result<(), Stop> {
        if args.len() != func.params.len() {
            let message = format!("`{}` takes {} argument(s), {} given", func.name, func.params.len(), args.len());
            return Err(trap(TrapKind::InvalidOperation(message), func.span));
        }
        for (i, (arg, &ty)) in args.iter().zip(&func.params).enumerate() {
            if !arg.matches(self.types, ty) {
                let message = format!(
                    "argument {} of `{}` is {arg}, expected a value of type `{}`",
                    i + 1,
                    func.name,
                    self.types.display(ty)
                );
                return Err(trap(TrapKind::InvalidOperation(message), func.span));
            }
        }
        Ok(())
    }

    fn call_native(&self, func: &MirFn, name: &str, args: &[ConstValue], span: Span) -> Result<ConstValue, Stop> {
        log::trace!("vm: native `{name}`");
        let value = self.natives.call(name, args).map_err(|msg| trap(TrapKind::Native(msg), span))?;
        if !value.matches(self.types, func.ret) {
            let message = format!("`{name}` returned {value}, expected a value of type `{}`", self.types.display(func.ret));
            return Err(trap(TrapKind::Native(message), span));
        }
        Ok(value)
    }

    fn finish(&mut self, result: Result<ConstValue, Stop>) -> Outcome {
        self.frames.clear();
        self.sp = 0;
        match result {
            Ok(value) => {
                self.state = VmState::Returned;
                Outcome::Returned(value)
            }
            Err(Stop::Trap(trap)) => {
                self.state = if trap.kind == TrapKind::StackOverflow {
                    VmState::StackOverflow
                } else {
                    VmState::Trapped
                };
                log::trace!("vm: trapped: {trap}");
                Outcome::Trapped(trap)
            }
            Err(Stop::Postponed(func)) => {
                self.state = VmState::Ready;
                Outcome::Postponed(func)
            }
        }
    }

    fn run_loop(&mut self) -> Result<ConstValue, Stop> {
        loop {
            if let Some(value) = self.step()? {
                return Ok(value);
            }
        }
    }

    fn callable(&self, id: FnId, span: Span) -> Result<&'a MirFn, Stop> {
        let mir: &'a Mir = self.mir;
        let func = mir.function(id);
        if func.native.is_some() {
            return Ok(func);
        }
        match func.state {
            FnState::Analyzed => Ok(func),
            FnState::Pending | FnState::Analyzing => Err(Stop::Postponed(id)),
            FnState::Failed => Err(trap(TrapKind::IncompleteFunction(func.name.clone()), span)),
        }
    }

    fn push_frame(
        &mut self,
        func: &'a MirFn,
        args: &[ConstValue],
        ret_to: Option<InstrId>,
        span: Span,
    ) -> Result<(), Stop> {
        if self.frames.len() >= self.config.max_frames {
            return Err(trap(TrapKind::StackOverflow, span));
        }
        let start = align_to(self.sp, FRAME_ALIGN);
        let end = start
            .checked_add(func.frame_size)
            .filter(|&end| end <= self.config.stack_size as u64)
            .ok_or_else(|| trap(TrapKind::StackOverflow, span))?;
        if self.memory.stack.len() < end as usize {
            self.memory.stack.resize(end as usize, 0);
        }
        self.memory.stack[start as usize..end as usize].fill(0);

        let base = STACK_BASE + start;
        for (local, arg) in func.param_locals.iter().zip(args) {
            let local = &func.locals[*local];
            self.store(base + local.offset, local.ty, arg, span)?;
        }
        log::trace!("vm: call `{}` depth={}", func.name, self.frames.len() + 1);
        self.frames.push(Frame {
            func,
            block: func.entry(),
            pos: 0,
            prev: None,
            regs: vec![ConstValue::Void; func.instrs.len()],
            base,
            saved_sp: self.sp,
            ret_to,
        });
        self.sp = end;
        Ok(())
    }

    fn frame(&self) -> &Frame<'a> {
        // `step` only runs while a frame is live.
        &self.frames[self.frames.len() - 1]
    }

    fn reg(&self, id: InstrId) -> &ConstValue {
        &self.frame().regs[id.index()]
    }

    fn set(&mut self, id: InstrId, value: ConstValue) {
        let last = self.frames.len() - 1;
        self.frames[last].regs[id.index()] = value;
    }

    fn jump(&mut self, target: BlockId) {
        let last = self.frames.len() - 1;
        let frame = &mut self.frames[last];
        frame.prev = Some(frame.block);
        frame.block = target;
        frame.pos = 0;
    }

    fn addr(&self, id: InstrId, span: Span) -> Result<u64, Stop> {
        match self.reg(id) {
            ConstValue::Ptr(addr) => Ok(*addr),
            other => Err(trap(TrapKind::InvalidOperation(format!("expected pointer, found {other}")), span)),
        }
    }

    fn load(&self, addr: u64, ty: TypeId, span: Span) -> Result<ConstValue, Stop> {
        let size = self.types.layout(ty).map_err(|e| layout_trap(e, span))?.size;
        let bytes = self.memory.bytes(addr, size).map_err(|k| trap(k, span))?;
        ConstValue::decode(self.types, ty, bytes).map_err(|e| layout_trap(e, span))
    }

    fn store(&mut self, addr: u64, ty: TypeId, value: &ConstValue, span: Span) -> Result<(), Stop> {
        let types = self.types;
        let size = types.layout(ty).map_err(|e| layout_trap(e, span))?.size;
        let out = self.memory.bytes_mut(addr, size).map_err(|k| trap(k, span))?;
        value.encode(types, ty, out).map_err(|e| layout_trap(e, span))
    }

    fn global_addr(&mut self, id: GlobalId, span: Span) -> Result<u64, Stop> {
        if let Some(&addr) = self.globals.get(&id) {
            return Ok(addr);
        }
        let mir: &'a Mir = self.mir;
        let global = mir.global(id);
        let layout = self.types.layout(global.ty).map_err(|e| layout_trap(e, span))?;
        let offset = align_to(self.memory.data.len() as u64, layout.align.max(1));
        let end = offset
            .checked_add(layout.size)
            .filter(|&end| end <= self.config.max_data_size as u64)
            .ok_or_else(|| trap(TrapKind::OutOfMemory, span))?;
        self.memory.data.resize(end as usize, 0);
        let addr = DATA_BASE + offset;
        self.store(addr, global.ty, &global.value, span)?;
        self.globals.insert(id, addr);
        Ok(addr)
    }

    fn index_value(&self, id: InstrId, span: Span) -> Result<i64, Stop> {
        self.reg(id)
            .as_i64()
            .ok_or_else(|| trap(TrapKind::InvalidOperation("non-integer index".into()), span))
    }

    /// Execute one instruction; `Some` once the outermost frame returned.
    fn step(&mut self) -> Result<Option<ConstValue>, Stop> {
        let frame = self.frame();
        let func = frame.func;
        let Some(&id) = func.blocks[frame.block].instrs.get(frame.pos) else {
            return Err(trap(TrapKind::InvalidOperation("block without terminator".into()), func.span));
        };
        let last = self.frames.len() - 1;
        self.frames[last].pos += 1;

        let instr = &func.instrs[id];
        let span = instr.span;
        let types = self.types;
        let fold_err = |kind: TrapKind| trap(kind, span);

        match &instr.kind {
            InstrKind::Const(value) => self.set(id, value.clone()),
            InstrKind::VarPtr(local) => {
                let addr = self.frame().base + func.locals[*local].offset;
                self.set(id, ConstValue::Ptr(addr));
            }
            InstrKind::GlobalPtr(global) => {
                let addr = self.global_addr(*global, span)?;
                self.set(id, ConstValue::Ptr(addr));
            }
            InstrKind::Load(ptr) => {
                let addr = self.addr(*ptr, span)?;
                let value = self.load(addr, instr.ty, span)?;
                self.set(id, value);
            }
            InstrKind::Store { ptr, value } => {
                let addr = self.addr(*ptr, span)?;
                let ty = func.instrs[*value].ty;
                let value = self.reg(*value).clone();
                self.store(addr, ty, &value, span)?;
            }
            InstrKind::ElemPtr { base, index, bound } => {
                let elem = types
                    .pointee(instr.ty)
                    .ok_or_else(|| fold_err(TrapKind::InvalidOperation("element pointer of non-pointer".into())))?;
                let stride = types.elem_stride(elem).map_err(|e| layout_trap(e, span))?;
                let index = self.index_value(*index, span)?;
                let (start, len) = match bound {
                    Bound::Array(len) => (self.addr(*base, span)?, Some(*len)),
                    Bound::Slice => {
                        let slice = self.addr(*base, span)?;
                        let len = self.load(slice, TypeId::U64, span)?.as_bits().unwrap_or(0);
                        let ptr = self.load(slice + 8, TypeId::U64, span)?.as_bits().unwrap_or(0);
                        (ptr, Some(len))
                    }
                    Bound::Unchecked => (self.addr(*base, span)?, None),
                };
                if let Some(len) = len {
                    if index < 0 || index as u64 >= len {
                        return Err(fold_err(TrapKind::OutOfBounds { index, len }));
                    }
                }
                if start == 0 {
                    return Err(fold_err(TrapKind::NullDereference));
                }
                let addr = start.wrapping_add((index as u64).wrapping_mul(stride));
                self.set(id, ConstValue::Ptr(addr));
            }
            InstrKind::MemberPtr { base, index } => {
                let base_ty = func.instrs[*base].ty;
                let offset = match types.pointee(base_ty).map(|t| types.kind(t)) {
                    Some(TypeKind::Struct(sid)) => {
                        let offsets = types.member_offsets(*sid).map_err(|e| layout_trap(e, span))?;
                        offsets.get(*index as usize).copied().unwrap_or(0)
                    }
                    Some(TypeKind::Slice(_)) => u64::from(*index) * 8,
                    _ => return Err(fold_err(TrapKind::InvalidOperation("member of non-aggregate".into()))),
                };
                let addr = self.addr(*base, span)?;
                if addr == 0 {
                    return Err(fold_err(TrapKind::NullDereference));
                }
                self.set(id, ConstValue::Ptr(addr + offset));
            }
            InstrKind::Binop { op, lhs, rhs } => {
                let ty = func.instrs[*lhs].ty;
                let value = fold::binop(types, *op, ty, self.reg(*lhs), self.reg(*rhs)).map_err(fold_err)?;
                self.set(id, value);
            }
            InstrKind::Unop { op, operand } => {
                let ty = func.instrs[*operand].ty;
                let value = fold::unop(types, *op, ty, self.reg(*operand)).map_err(fold_err)?;
                self.set(id, value);
            }
            InstrKind::Cast { op, operand } => {
                let value = fold::cast(types, *op, instr.ty, self.reg(*operand)).map_err(fold_err)?;
                self.set(id, value);
            }
            InstrKind::Compound(values) => {
                let items = values.iter().map(|v| self.reg(*v).clone()).collect();
                self.set(id, ConstValue::Aggregate(items));
            }
            InstrKind::Call { callee, args } => {
                let target = match callee {
                    Callee::Direct(f) => *f,
                    Callee::Indirect(value) => match self.reg(*value) {
                        ConstValue::Fn(f) => *f,
                        ConstValue::Ptr(0) => return Err(fold_err(TrapKind::NullDereference)),
                        other => {
                            return Err(fold_err(TrapKind::InvalidOperation(format!("call of non-function {other}"))));
                        }
                    },
                };
                let callee = self.callable(target, span)?;
                let args: Vec<ConstValue> = args.iter().map(|a| self.reg(*a).clone()).collect();
                match callee.native.as_deref() {
                    Some(name) => {
                        let value = self.call_native(callee, name, &args, span)?;
                        self.set(id, value);
                    }
                    None => self.push_frame(callee, &args, Some(id), span)?,
                }
            }
            InstrKind::Br(target) => self.jump(*target),
            InstrKind::CondBr { cond, then_block, else_block } => {
                let taken = match self.reg(*cond) {
                    ConstValue::Bool(true) => *then_block,
                    ConstValue::Bool(false) => *else_block,
                    other => return Err(fold_err(TrapKind::InvalidOperation(format!("branch on {other}")))),
                };
                self.jump(taken);
            }
            InstrKind::Switch { value, cases, default } => {
                let Some(bits) = self.reg(*value).as_bits() else {
                    return Err(fold_err(TrapKind::InvalidOperation(format!("switch on {}", self.reg(*value)))));
                };
                let target = cases.iter().find(|(case, _)| *case == bits).map_or(*default, |(_, block)| *block);
                self.jump(target);
            }
            InstrKind::Phi(incoming) => {
                let prev = self.frame().prev;
                let value = incoming
                    .iter()
                    .find(|(block, _)| Some(*block) == prev)
                    .map(|(_, value)| self.reg(*value).clone())
                    .ok_or_else(|| fold_err(TrapKind::InvalidOperation("phi without matching predecessor".into())))?;
                self.set(id, value);
            }
            InstrKind::Ret(value) => {
                let value = value.map(|v| self.reg(v).clone()).unwrap_or(ConstValue::Void);
                let Some(frame) = self.frames.pop() else {
                    return Ok(Some(value));
                };
                log::trace!("vm: return from `{}`", frame.func.name);
                self.sp = frame.saved_sp;
                match (self.frames.last_mut(), frame.ret_to) {
                    (Some(caller), Some(dest)) => caller.regs[dest.index()] = value,
                    _ => return Ok(Some(value)),
                }
            }
            InstrKind::Unreachable => return Err(fold_err(TrapKind::Unreachable)),
            InstrKind::Assert { cond, message } => {
                if self.reg(*cond) != &ConstValue::Bool(true) {
                    return Err(fold_err(TrapKind::AssertionFailed(message.clone())));
                }
            }
        }
        Ok(None)
    }
}
