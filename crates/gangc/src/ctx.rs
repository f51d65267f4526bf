//! The function emit context: the IR-builder facade the statement core
//! drives.
//!
//! Besides plain block/instruction bookkeeping, the context owns the two
//! execution-mask registers:
//!
//! - `internal_mask` tracks divergence introduced by varying control flow
//!   inside the current function;
//! - `function_mask` is the mask the function was entered with;
//! - their conjunction, the *full mask*, gates every observable effect.
//!
//! Control-flow regions (`start_uniform_if` / `start_varying_if` /
//! `start_loop`) are kept on a stack so that structured jumps know their
//! targets and mask restoration on region exit can subtract the lanes
//! that left early via `break`, `continue` or `return`.
//!
//! Every emission helper is a silent no-op when there is no current
//! basic block: a preceding `return` or `break` ended the block, and
//! statement emission simply stops producing code until a successor
//! block is installed.

use crate::diagnostics;
use crate::expr::Expr;
use crate::ir::{self, BinOp, BlockId, CmpOp, Constant, GlobalId, Inst, IrType, Terminator, ValueId};
use crate::pos::SourcePos;
use crate::CompileContext;

/// One entry of the control-flow region stack.
enum CFInfo {
    UniformIf,
    VaryingIf {
        saved_mask: ValueId,
    },
    Loop {
        break_target: BlockId,
        continue_target: BlockId,
        uniform: bool,
        saved_mask: ValueId,
        /// Accumulator of lanes that executed `break` (varying loops only).
        break_lanes: Option<ValueId>,
        /// Accumulator of lanes that executed `continue`.
        continue_lanes: Option<ValueId>,
        /// Mask the loop body was entered with this iteration.
        loop_mask: Option<ValueId>,
    },
}

/// IR-builder facade for emitting one function.
pub struct FunctionEmitContext<'a> {
    g: &'a CompileContext,
    module: &'a mut ir::Module,
    func: ir::Function,
    cur: Option<BlockId>,
    internal_mask: ValueId,
    function_mask: ValueId,
    cf_stack: Vec<CFInfo>,
    scope_depth: usize,
    debug_pos: SourcePos,
    return_block: BlockId,
    return_slot: Option<ValueId>,
    returned_lanes_ptr: ValueId,
    /// Set once any lanes return under varying control flow; region
    /// restores then subtract the returned lanes.
    has_varying_return: bool,
}

impl<'a> FunctionEmitContext<'a> {
    pub fn new(
        g: &'a CompileContext,
        module: &'a mut ir::Module,
        name: &str,
        return_type: IrType,
    ) -> FunctionEmitContext<'a> {
        let mut func = ir::Function::new(name, return_type.clone());
        let entry = func.add_block("entry");
        let return_block = func.add_block("return");

        let all_on = func.add_constant(Constant::MaskAllOn, IrType::Mask);
        let all_off = func.add_constant(Constant::MaskAllOff, IrType::Mask);

        let returned_lanes_ptr = func.add_inst(
            entry,
            Inst::Alloca {
                ty: IrType::Mask,
                name: "returned_lanes".to_string(),
            },
            IrType::Ptr,
        );
        func.add_inst(
            entry,
            Inst::Store {
                value: all_off,
                ptr: returned_lanes_ptr,
            },
            IrType::Void,
        );

        let return_slot = if return_type == IrType::Void {
            None
        } else {
            Some(func.add_inst(
                entry,
                Inst::Alloca {
                    ty: return_type,
                    name: "return_value".to_string(),
                },
                IrType::Ptr,
            ))
        };

        FunctionEmitContext {
            g,
            module,
            func,
            cur: Some(entry),
            internal_mask: all_on,
            function_mask: all_on,
            cf_stack: Vec::new(),
            scope_depth: 0,
            debug_pos: SourcePos::unknown(),
            return_block,
            return_slot,
            returned_lanes_ptr,
            has_varying_return: false,
        }
    }

    pub fn g(&self) -> &CompileContext {
        self.g
    }

    /// Seal the function: fall-through jumps to the epilogue, which loads
    /// the return slot (if any) and returns; the finished function is
    /// installed in the module.
    pub fn finish(mut self) {
        if let Some(cur) = self.cur {
            self.func.block_mut(cur).term = Some(Terminator::Br(self.return_block));
        }
        self.cur = Some(self.return_block);
        let term = match self.return_slot {
            None => Terminator::Ret(None),
            Some(slot) => {
                let ty = self.func.return_type.clone();
                match self.load(slot, ty) {
                    Some(v) => Terminator::Ret(Some(v)),
                    None => Terminator::Ret(None),
                }
            }
        };
        self.func.block_mut(self.return_block).term = Some(term);
        self.module.add_function(self.func);
    }

    // -------------------------------------------------------------------
    // Blocks and branches

    pub fn create_basic_block(&mut self, name: &str) -> BlockId {
        self.func.add_block(name)
    }

    pub fn current_basic_block(&self) -> Option<BlockId> {
        self.cur
    }

    pub fn set_current_basic_block(&mut self, block: BlockId) {
        self.cur = Some(block);
    }

    /// Unconditional branch; terminates the current block.
    pub fn branch(&mut self, to: BlockId) {
        if let Some(cur) = self.cur {
            self.func.block_mut(cur).term = Some(Terminator::Br(to));
            self.cur = None;
        }
    }

    /// Conditional branch on a uniform boolean; terminates the current
    /// block.
    pub fn cond_branch(&mut self, on_true: BlockId, on_false: BlockId, cond: ValueId) {
        if let Some(cur) = self.cur {
            self.func.block_mut(cur).term = Some(Terminator::CondBr {
                cond,
                on_true,
                on_false,
            });
            self.cur = None;
        }
    }

    pub fn branch_if_mask_all(&mut self, on_all: BlockId, on_not_all: BlockId) {
        let full = self.get_full_mask();
        if let Some(cond) = self.all(full) {
            self.cond_branch(on_all, on_not_all, cond);
        }
    }

    pub fn branch_if_mask_any(&mut self, on_any: BlockId, on_none: BlockId) {
        let full = self.get_full_mask();
        if let Some(cond) = self.any(full) {
            self.cond_branch(on_any, on_none, cond);
        }
    }

    // -------------------------------------------------------------------
    // Masks

    pub fn get_internal_mask(&self) -> ValueId {
        self.internal_mask
    }

    pub fn get_function_mask(&self) -> ValueId {
        self.function_mask
    }

    /// The conjunction of the internal and function masks, folding
    /// statically-all-on operands away.
    pub fn get_full_mask(&mut self) -> ValueId {
        if self.is_mask_all_on(self.internal_mask) {
            return self.function_mask;
        }
        if self.is_mask_all_on(self.function_mask) {
            return self.internal_mask;
        }
        self.binary(BinOp::And, self.internal_mask, self.function_mask)
            .unwrap_or(self.internal_mask)
    }

    pub fn set_internal_mask(&mut self, mask: ValueId) {
        self.internal_mask = mask;
    }

    pub fn set_internal_mask_and(&mut self, a: ValueId, b: ValueId) {
        if let Some(m) = self.binary(BinOp::And, a, b) {
            self.internal_mask = m;
        }
    }

    pub fn set_internal_mask_and_not(&mut self, a: ValueId, b: ValueId) {
        if let Some(not_b) = self.not(b) {
            if let Some(m) = self.binary(BinOp::And, a, not_b) {
                self.internal_mask = m;
            }
        }
    }

    pub fn set_function_mask(&mut self, mask: ValueId) {
        self.function_mask = mask;
    }

    pub fn mask_all_on(&mut self) -> ValueId {
        self.constant(Constant::MaskAllOn, IrType::Mask)
    }

    pub fn mask_all_off(&mut self) -> ValueId {
        self.constant(Constant::MaskAllOff, IrType::Mask)
    }

    /// Is `v` statically known to be the all-on mask?
    pub fn is_mask_all_on(&self, v: ValueId) -> bool {
        matches!(self.func.constant_of(v), Some(Constant::MaskAllOn))
    }

    /// Uniform true iff every lane of `mask` is on.
    pub fn all(&mut self, mask: ValueId) -> Option<ValueId> {
        self.push(Inst::All { mask }, IrType::Bool)
    }

    /// Uniform true iff any lane of `mask` is on.
    pub fn any(&mut self, mask: ValueId) -> Option<ValueId> {
        self.push(Inst::Any { mask }, IrType::Bool)
    }

    /// The mask rendered as an integer bitmap, one bit per lane.
    pub fn lane_mask(&mut self, mask: ValueId) -> Option<ValueId> {
        self.push(Inst::LaneMask { mask }, IrType::I64)
    }

    // -------------------------------------------------------------------
    // Scopes, positions, instrumentation

    pub fn start_scope(&mut self) {
        self.scope_depth += 1;
    }

    pub fn end_scope(&mut self) {
        if self.scope_depth == 0 {
            diagnostics::fatal("unbalanced end_scope");
        }
        self.scope_depth -= 1;
    }

    pub fn set_debug_pos(&mut self, pos: &SourcePos) {
        self.debug_pos = pos.clone();
    }

    pub fn debug_pos(&self) -> &SourcePos {
        &self.debug_pos
    }

    /// Emit an instrumentation marker when instrumentation is enabled.
    pub fn add_instrumentation_point(&mut self, note: &str) {
        if !self.g.opt.instrument {
            return;
        }
        let s = self.string_ptr(note);
        self.call("__instrument", vec![s], IrType::Void);
    }

    // -------------------------------------------------------------------
    // Control-flow regions

    /// Depth of enclosing varying control flow (varying ifs and varying
    /// loops).
    pub fn varying_cf_depth(&self) -> usize {
        self.cf_stack
            .iter()
            .filter(|ci| {
                matches!(
                    ci,
                    CFInfo::VaryingIf { .. } | CFInfo::Loop { uniform: false, .. }
                )
            })
            .count()
    }

    pub fn start_uniform_if(&mut self) {
        self.cf_stack.push(CFInfo::UniformIf);
    }

    pub fn start_varying_if(&mut self, old_mask: ValueId) {
        self.cf_stack.push(CFInfo::VaryingIf {
            saved_mask: old_mask,
        });
    }

    /// Close an `if` region. For varying ifs the internal mask is
    /// restored to the saved mask minus any lanes that left the region
    /// through `break`, `continue` or `return`.
    pub fn end_if(&mut self) {
        match self.cf_stack.pop() {
            Some(CFInfo::UniformIf) => {}
            Some(CFInfo::VaryingIf { saved_mask }) => {
                let mut mask = saved_mask;
                if self.cur.is_some() {
                    if let Some(gone) = self.lanes_gone_in_loop() {
                        mask = self.and_not(mask, gone).unwrap_or(mask);
                    }
                    if self.has_varying_return {
                        if let Some(ret) = self.load(self.returned_lanes_ptr, IrType::Mask) {
                            mask = self.and_not(mask, ret).unwrap_or(mask);
                        }
                    }
                }
                self.set_internal_mask(mask);
            }
            _ => diagnostics::fatal("unbalanced end_if"),
        }
    }

    pub fn start_loop(&mut self, break_target: BlockId, continue_target: BlockId, uniform: bool) {
        let saved_mask = self.internal_mask;
        let (break_lanes, continue_lanes) = if uniform {
            (None, None)
        } else {
            let off = self.mask_all_off();
            let bp = self.alloca(IrType::Mask, "break_lanes");
            let cp = self.alloca(IrType::Mask, "continue_lanes");
            if let Some(bp) = bp {
                self.store(off, bp);
            }
            if let Some(cp) = cp {
                self.store(off, cp);
            }
            (bp, cp)
        };
        self.cf_stack.push(CFInfo::Loop {
            break_target,
            continue_target,
            uniform,
            saved_mask,
            break_lanes,
            continue_lanes,
            loop_mask: None,
        });
    }

    pub fn end_loop(&mut self) {
        match self.cf_stack.pop() {
            Some(CFInfo::Loop {
                uniform,
                saved_mask,
                ..
            }) => {
                if !uniform {
                    let mut mask = saved_mask;
                    if self.has_varying_return && self.cur.is_some() {
                        if let Some(ret) = self.load(self.returned_lanes_ptr, IrType::Mask) {
                            mask = self.and_not(mask, ret).unwrap_or(mask);
                        }
                    }
                    self.set_internal_mask(mask);
                }
            }
            _ => diagnostics::fatal("unbalanced end_loop"),
        }
    }

    /// Record the mask the innermost loop's body runs under this
    /// iteration.
    pub fn set_loop_mask(&mut self, mask: ValueId) {
        match self.innermost_loop_index() {
            Some(i) => {
                if let CFInfo::Loop { loop_mask, .. } = &mut self.cf_stack[i] {
                    *loop_mask = Some(mask);
                }
            }
            None => diagnostics::fatal("set_loop_mask outside of a loop"),
        }
    }

    /// Re-enable the lanes that executed `continue` during the current
    /// iteration of the innermost loop, clearing the accumulator.
    pub fn restore_continued_lanes(&mut self) {
        if self.cur.is_none() {
            return;
        }
        let Some(i) = self.innermost_loop_index() else {
            return;
        };
        let cp = match &self.cf_stack[i] {
            CFInfo::Loop { continue_lanes, .. } => *continue_lanes,
            _ => None,
        };
        let Some(cp) = cp else { return };
        if let Some(continued) = self.load(cp, IrType::Mask) {
            if let Some(mask) = self.binary(BinOp::Or, self.internal_mask, continued) {
                self.set_internal_mask(mask);
            }
            let off = self.mask_all_off();
            self.store(off, cp);
        }
    }

    // -------------------------------------------------------------------
    // Structured jumps

    /// Lower a `break` of the innermost loop.
    ///
    /// When the loop and every `if` inside it are uniform, all running
    /// lanes break together and a direct branch suffices. Otherwise the
    /// breaking lanes are accumulated, the internal mask is cleared, and
    /// a coherent break additionally probes whether any lane of the loop
    /// is still live, branching straight to the exit when none is.
    pub fn break_lanes(&mut self, coherent: bool) {
        if self.cur.is_none() {
            return;
        }
        let Some(i) = self.innermost_loop_index() else {
            diagnostics::error(&self.debug_pos.clone(), "\"break\" used outside of a loop");
            return;
        };
        let (target, break_ptr, continue_ptr, loop_mask, saved_mask) = match &self.cf_stack[i] {
            CFInfo::Loop {
                break_target,
                break_lanes,
                continue_lanes,
                loop_mask,
                saved_mask,
                ..
            } => (
                *break_target,
                *break_lanes,
                *continue_lanes,
                *loop_mask,
                *saved_mask,
            ),
            _ => unreachable!(),
        };

        let break_ptr = match break_ptr {
            None => {
                self.branch(target);
                return;
            }
            Some(p) if self.ifs_uniform_above(i) => {
                // varying loop, but all control flow inside it is
                // uniform: the running lanes jump together
                let _ = p;
                self.branch(target);
                return;
            }
            Some(p) => p,
        };

        let full = self.get_full_mask();
        let Some(old) = self.load(break_ptr, IrType::Mask) else {
            return;
        };
        if let Some(new) = self.binary(BinOp::Or, old, full) {
            self.store(new, break_ptr);
        }
        // every lane running here has now broken out
        let off = self.mask_all_off();
        self.set_internal_mask(off);

        if coherent {
            self.jump_if_all_loop_lanes_done(target, break_ptr, continue_ptr, loop_mask, saved_mask);
        }
    }

    /// Lower a `continue` of the innermost loop; mirrors [`Self::break_lanes`]
    /// with the continued-lane accumulator and the step/test target.
    pub fn continue_lanes(&mut self, coherent: bool) {
        if self.cur.is_none() {
            return;
        }
        let Some(i) = self.innermost_loop_index() else {
            diagnostics::error(&self.debug_pos.clone(), "\"continue\" used outside of a loop");
            return;
        };
        let (target, break_ptr, continue_ptr, loop_mask, saved_mask) = match &self.cf_stack[i] {
            CFInfo::Loop {
                continue_target,
                break_lanes,
                continue_lanes,
                loop_mask,
                saved_mask,
                ..
            } => (
                *continue_target,
                *break_lanes,
                *continue_lanes,
                *loop_mask,
                *saved_mask,
            ),
            _ => unreachable!(),
        };

        let continue_ptr = match continue_ptr {
            None => {
                self.branch(target);
                return;
            }
            Some(p) if self.ifs_uniform_above(i) => {
                let _ = p;
                self.branch(target);
                return;
            }
            Some(p) => p,
        };

        let full = self.get_full_mask();
        let Some(old) = self.load(continue_ptr, IrType::Mask) else {
            return;
        };
        if let Some(new) = self.binary(BinOp::Or, old, full) {
            self.store(new, continue_ptr);
        }
        let off = self.mask_all_off();
        self.set_internal_mask(off);

        if coherent {
            self.jump_if_all_loop_lanes_done(
                target,
                break_ptr.unwrap_or(continue_ptr),
                Some(continue_ptr),
                loop_mask,
                saved_mask,
            );
        }
    }

    /// Record that the currently-running lanes return `value`.
    ///
    /// Outside varying control flow every lane is running, so this jumps
    /// straight to the function epilogue. Under varying control flow the
    /// value is blended into the return slot, the lanes are accumulated,
    /// and a coherent return probes whether the whole gang has now
    /// returned.
    pub fn current_lanes_returned(&mut self, value: Option<&Expr>, coherent: bool) {
        if self.cur.is_none() {
            return;
        }
        if let Some(e) = value {
            if let Some(v) = e.get_value(self) {
                if let Some(slot) = self.return_slot {
                    let ty = self.value_type(v);
                    self.masked_store(v, slot, ty);
                }
            }
        }

        if self.varying_cf_depth() == 0 {
            self.branch(self.return_block);
            return;
        }

        self.has_varying_return = true;
        let full = self.get_full_mask();
        let Some(old) = self.load(self.returned_lanes_ptr, IrType::Mask) else {
            return;
        };
        let Some(new) = self.binary(BinOp::Or, old, full) else {
            return;
        };
        self.store(new, self.returned_lanes_ptr);

        if coherent {
            // the whole gang may have returned by now
            if let Some(done) = self.compare(CmpOp::Eq, new, self.function_mask) {
                let b_some_left = self.create_basic_block("not_all_returned");
                self.cond_branch(self.return_block, b_some_left, done);
                self.set_current_basic_block(b_some_left);
            }
        }

        let off = self.mask_all_off();
        self.set_internal_mask(off);
    }

    fn jump_if_all_loop_lanes_done(
        &mut self,
        target: BlockId,
        break_ptr: ValueId,
        continue_ptr: Option<ValueId>,
        loop_mask: Option<ValueId>,
        saved_mask: ValueId,
    ) {
        let Some(mut done) = self.load(break_ptr, IrType::Mask) else {
            return;
        };
        if let Some(cp) = continue_ptr {
            if cp != break_ptr {
                if let Some(continued) = self.load(cp, IrType::Mask) {
                    if let Some(both) = self.binary(BinOp::Or, done, continued) {
                        done = both;
                    }
                }
            }
        }
        let base = loop_mask.unwrap_or(saved_mask);
        let Some(live) = self.and_not(base, done) else {
            return;
        };
        let Some(any_live) = self.any(live) else {
            return;
        };
        let b_continue = self.create_basic_block("coherent_jump_not_done");
        self.cond_branch(b_continue, target, any_live);
        self.set_current_basic_block(b_continue);
    }

    fn innermost_loop_index(&self) -> Option<usize> {
        self.cf_stack
            .iter()
            .rposition(|ci| matches!(ci, CFInfo::Loop { .. }))
    }

    /// Are all region entries above stack index `i` uniform ifs?
    fn ifs_uniform_above(&self, i: usize) -> bool {
        self.cf_stack[i + 1..]
            .iter()
            .all(|ci| !matches!(ci, CFInfo::VaryingIf { .. }))
    }

    /// Mask of lanes that already left the innermost varying loop via
    /// break or continue, if we are inside one.
    fn lanes_gone_in_loop(&mut self) -> Option<ValueId> {
        let i = self.innermost_loop_index()?;
        let (bp, cp) = match &self.cf_stack[i] {
            CFInfo::Loop {
                break_lanes,
                continue_lanes,
                ..
            } => (*break_lanes, *continue_lanes),
            _ => return None,
        };
        let bp = bp?;
        let broken = self.load(bp, IrType::Mask)?;
        match cp {
            Some(cp) => {
                let continued = self.load(cp, IrType::Mask)?;
                self.binary(BinOp::Or, broken, continued)
            }
            None => Some(broken),
        }
    }

    // -------------------------------------------------------------------
    // Values and storage

    fn push(&mut self, inst: Inst, ty: IrType) -> Option<ValueId> {
        let cur = self.cur?;
        Some(self.func.add_inst(cur, inst, ty))
    }

    /// Register a constant value (valid regardless of the current block).
    pub fn constant(&mut self, c: Constant, ty: IrType) -> ValueId {
        self.func.add_constant(c, ty)
    }

    /// Address of an interned string literal.
    pub fn string_ptr(&mut self, s: &str) -> ValueId {
        self.constant(Constant::Str(s.to_string()), IrType::Ptr)
    }

    pub fn value_type(&self, v: ValueId) -> IrType {
        self.func.value_type(v).clone()
    }

    pub fn binary(&mut self, op: BinOp, a: ValueId, b: ValueId) -> Option<ValueId> {
        let ty = self.value_type(a);
        self.push(Inst::Bin { op, a, b }, ty)
    }

    pub fn not(&mut self, v: ValueId) -> Option<ValueId> {
        let ty = self.value_type(v);
        self.push(Inst::Not { value: v }, ty)
    }

    fn and_not(&mut self, a: ValueId, b: ValueId) -> Option<ValueId> {
        let not_b = self.not(b)?;
        self.binary(BinOp::And, a, not_b)
    }

    /// Compare two values. Lanewise comparison of vectors yields a mask;
    /// scalar (and whole-mask) comparison yields a uniform boolean.
    pub fn compare(&mut self, op: CmpOp, a: ValueId, b: ValueId) -> Option<ValueId> {
        let ty = match self.value_type(a) {
            IrType::Vector(..) => IrType::Mask,
            _ => IrType::Bool,
        };
        self.push(Inst::Cmp { op, a, b }, ty)
    }

    pub fn select(&mut self, cond: ValueId, on_true: ValueId, on_false: ValueId) -> Option<ValueId> {
        let ty = self.value_type(on_true);
        self.push(
            Inst::Select {
                cond,
                on_true,
                on_false,
            },
            ty,
        )
    }

    pub fn alloca(&mut self, ty: IrType, name: &str) -> Option<ValueId> {
        self.push(
            Inst::Alloca {
                ty,
                name: name.to_string(),
            },
            IrType::Ptr,
        )
    }

    pub fn store(&mut self, value: ValueId, ptr: ValueId) {
        self.push(Inst::Store { value, ptr }, IrType::Void);
    }

    /// Store `value` to `ptr`, blending with the old contents under the
    /// full mask unless the mask is statically all on.
    pub fn masked_store(&mut self, value: ValueId, ptr: ValueId, ty: IrType) {
        let full = self.get_full_mask();
        if self.is_mask_all_on(full) {
            self.store(value, ptr);
            return;
        }
        let Some(old) = self.load(ptr, ty) else {
            return;
        };
        if let Some(blended) = self.select(full, value, old) {
            self.store(blended, ptr);
        }
    }

    pub fn load(&mut self, ptr: ValueId, ty: IrType) -> Option<ValueId> {
        self.push(Inst::Load { ptr }, ty)
    }

    pub fn element_ptr(&mut self, base: ValueId, index: usize, name: &str) -> Option<ValueId> {
        self.push(
            Inst::ElementPtr {
                base,
                index,
                name: name.to_string(),
            },
            IrType::Ptr,
        )
    }

    pub fn element_ptr_dyn(&mut self, base: ValueId, index: ValueId, name: &str) -> Option<ValueId> {
        self.push(
            Inst::ElementPtrDyn {
                base,
                index,
                name: name.to_string(),
            },
            IrType::Ptr,
        )
    }

    pub fn bitcast(&mut self, value: ValueId, ty: IrType) -> Option<ValueId> {
        self.push(Inst::Bitcast { value, ty: ty.clone() }, ty)
    }

    pub fn convert(&mut self, value: ValueId, ty: IrType) -> Option<ValueId> {
        self.push(Inst::Convert { value, ty: ty.clone() }, ty)
    }

    pub fn call(&mut self, callee: &str, args: Vec<ValueId>, ret: IrType) -> Option<ValueId> {
        self.push(
            Inst::Call {
                callee: callee.to_string(),
                args,
            },
            ret,
        )
    }

    // -------------------------------------------------------------------
    // Module access

    pub fn add_global(&mut self, global: ir::Global) -> GlobalId {
        self.module.add_global(global)
    }

    pub fn global_addr(&mut self, global: GlobalId) -> Option<ValueId> {
        self.push(Inst::GlobalAddr { global }, IrType::Ptr)
    }
}
