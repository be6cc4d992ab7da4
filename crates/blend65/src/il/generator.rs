//! AST → IL lowering.
//!
//! Expressions lower accumulator-first: the left operand lands in the
//! accumulator and the operator folds the right operand in as an immediate
//! or memory fetch, spilling to the target's zero-page scratch when the
//! right side is itself compound. Control flow becomes explicit blocks;
//! `break`/`continue` jump to the loop labels carried on a stack during
//! lowering. `sizeof` and `length` never reach this stage as calls; the
//! type checker folded them, so they lower as immediates.

use indexmap::IndexMap;

use super::{BlockId, Cond, FunctionBuilder, GlobalData, IlModule, IlProgram, Op, Place, Terminator, Value, Width};
use crate::ast::{
    AnalysisStore, BinaryOp, DeclKind, Expr, ExprKind, FunctionDecl, Program, Stmt, StmtKind, StorageClass, UnaryOp,
};
use crate::frames::{Frame, FrameMap};
use crate::layout::MemoryLayout;
use crate::options::CompileOptions;
use crate::scope::{ScopeId, Symbol, SymbolKind, SymbolTable};
use crate::target::TargetDescriptor;
use crate::types::TypeInfo;

/// Everything the generator needs from one analyzed module.
#[derive(Debug, Clone, Copy)]
pub struct ModuleLowerInput<'a> {
    pub program: &'a Program,
    pub table: &'a SymbolTable,
    pub store: &'a AnalysisStore,
}

/// Lowers every module into one IL program.
///
/// Deterministic by construction: modules, functions, and data entries are
/// visited in the deterministic orders the earlier passes established, and
/// nothing here consults a hash map's iteration order.
pub fn generate_il(
    modules: &IndexMap<String, ModuleLowerInput<'_>>,
    layout: &MemoryLayout,
    frames: &FrameMap,
    target: &TargetDescriptor,
    options: &CompileOptions,
) -> IlProgram {
    let mut program = IlProgram::default();
    for (module_name, input) in modules {
        let mut il_module = IlModule {
            name: module_name.clone(),
            functions: IndexMap::new(),
        };
        let mut strings = StringPool {
            module: module_name.clone(),
            entries: Vec::new(),
        };

        // Module-level data objects.
        for decl in &input.program.decls {
            let DeclKind::Variable(var) = &decl.kind else { continue };
            if var.storage == StorageClass::ZeroPage {
                continue;
            }
            let ty = input.store.type_of(decl.id);
            let size = ty.size().max(1);
            let bytes = var
                .initializer
                .as_ref()
                .and_then(|init| const_bytes(init, &ty, input.store));
            program.global_data.push(GlobalData {
                name: format!("{module_name}::{}", var.name),
                size,
                bytes,
            });
        }

        for decl in &input.program.decls {
            let DeclKind::Function(function) = &decl.kind else { continue };
            let qualified = format!("{module_name}::{}", function.name);
            let Some(frame) = frames.frame(&qualified) else { continue };
            let Some(scope) = input.table.scope_for_node(decl.id) else { continue };
            let mut lowering = FnLowering {
                builder: FunctionBuilder::new(qualified.clone(), frame.base_address),
                module: module_name,
                table: input.table,
                store: input.store,
                frames,
                frame,
                layout,
                target,
                options,
                scope,
                loop_stack: Vec::new(),
                scratch_depth: 0,
                strings: &mut strings,
            };
            lowering.lower_function(function);
            il_module.functions.insert(function.name.clone(), lowering.builder.finish());
        }

        program.global_data.extend(strings.entries);
        program.modules.insert(module_name.clone(), il_module);
    }
    program
}

/// Constant initializer bytes for the data section, little-endian.
fn const_bytes(init: &Expr, ty: &TypeInfo, store: &AnalysisStore) -> Option<Vec<u8>> {
    match (&init.kind, ty) {
        (ExprKind::ArrayLiteral(items), TypeInfo::Array { element, .. }) => {
            let mut bytes = Vec::with_capacity(items.len() * element.size());
            for item in items {
                bytes.extend(const_bytes(item, element, store)?);
            }
            Some(bytes)
        }
        (ExprKind::Str(text), _) => {
            let mut bytes = text.as_bytes().to_vec();
            bytes.push(0);
            Some(bytes)
        }
        _ => {
            let value = store.const_value(init.id)?;
            let value = u16::try_from(value).ok()?;
            match ty.size() {
                1 => Some(vec![value.to_le_bytes()[0]]),
                2 => Some(value.to_le_bytes().to_vec()),
                _ => None,
            }
        }
    }
}

/// String literal pool for one module.
#[derive(Debug)]
struct StringPool {
    module: String,
    entries: Vec<GlobalData>,
}

impl StringPool {
    /// Returns the label of the pooled string, adding it on first use.
    fn intern(&mut self, text: &str) -> String {
        let mut bytes = text.as_bytes().to_vec();
        bytes.push(0);
        if let Some(existing) = self.entries.iter().find(|e| e.bytes.as_deref() == Some(bytes.as_slice())) {
            return existing.name.clone();
        }
        let label = format!("{}::__str{}", self.module, self.entries.len());
        self.entries.push(GlobalData {
            name: label.clone(),
            size: bytes.len(),
            bytes: Some(bytes),
        });
        label
    }
}

struct FnLowering<'a> {
    builder: FunctionBuilder,
    module: &'a str,
    table: &'a SymbolTable,
    store: &'a AnalysisStore,
    frames: &'a FrameMap,
    frame: &'a Frame,
    layout: &'a MemoryLayout,
    target: &'a TargetDescriptor,
    options: &'a CompileOptions,
    scope: ScopeId,
    /// (continue target, break target) per enclosing loop.
    loop_stack: Vec<(BlockId, BlockId)>,
    scratch_depth: usize,
    strings: &'a mut StringPool,
}

impl FnLowering<'_> {
    fn lower_function(&mut self, function: &FunctionDecl) {
        // Prologue is a no-op: the frame is statically allocated.
        self.lower_stmts_in_scope(&function.body, self.scope);
        self.builder.terminate(Terminator::Ret);
    }

    // --- plumbing ---

    fn set_location(&mut self, expr_or_stmt: Option<crate::source::SourceSpan>) {
        if self.options.emit_source_maps {
            self.builder.set_location(expr_or_stmt);
        }
    }

    fn width_of_node(&self, node: crate::ast::NodeId) -> Width {
        if self.store.type_of(node).size() >= 2 { Width::Word } else { Width::Byte }
    }

    /// A fresh zero-page scratch pair, released by `release_scratch`.
    fn claim_scratch(&mut self) -> Place {
        let step = 2;
        let base = usize::from(self.target.scratch.start) + step * self.scratch_depth;
        let clamped = base.min(usize::from(self.target.scratch.end).saturating_sub(1));
        self.scratch_depth += 1;
        Place::Abs {
            address: u16::try_from(clamped).unwrap_or(u16::MAX),
        }
    }

    fn release_scratch(&mut self) {
        self.scratch_depth = self.scratch_depth.saturating_sub(1);
    }

    /// Storage place for a resolved symbol, or `None` for functions and
    /// unresolvable names.
    fn place_for_symbol(&self, symbol: &Symbol) -> Option<Place> {
        if symbol.scope == self.table.root() {
            match symbol.kind {
                SymbolKind::ImportedSymbol => {
                    let module = symbol.source_module.as_deref()?;
                    let original = symbol.original_name.as_deref()?;
                    if let Some(address) = self
                        .layout
                        .zp_address(module, original)
                        .or_else(|| self.layout.map_address(module, original))
                    {
                        return Some(Place::Abs { address });
                    }
                    Some(Place::Global(format!("{module}::{original}")))
                }
                SymbolKind::Variable | SymbolKind::Constant => {
                    if let Some(address) = self
                        .layout
                        .map_address(self.module, &symbol.name)
                        .or_else(|| self.layout.zp_address(self.module, &symbol.name))
                    {
                        return Some(Place::Abs { address });
                    }
                    Some(Place::Global(format!("{}::{}", self.module, symbol.name)))
                }
                _ => None,
            }
        } else {
            self.frame
                .slot_address(symbol.id)
                .map(|address| Place::Slot { address })
        }
    }

    fn place_for_name(&self, name: &str) -> Option<Place> {
        let symbol = self.table.lookup_in_chain(self.scope, name)?;
        self.place_for_symbol(self.table.symbol(symbol))
    }

    /// Immediate or single-place operand, avoiding a scratch spill.
    fn simple_value(&self, expr: &Expr) -> Option<Value> {
        if let Some(value) = self.store.const_value(expr.id) {
            return Some(Value::Imm(u16::try_from(value).unwrap_or(u16::MAX)));
        }
        match &expr.kind {
            ExprKind::Bool(b) => Some(Value::Imm(u16::from(*b))),
            ExprKind::Identifier(name) => self.place_for_name(name).map(Value::Place),
            _ => None,
        }
    }

    // --- expressions ---

    /// Lowers `expr`, leaving its value in the accumulator.
    fn lower_expr(&mut self, expr: &Expr) {
        self.set_location(Some(expr.location));
        self.builder.set_width(self.width_of_node(expr.id));
        if let Some(value) = self.store.const_value(expr.id) {
            self.builder.emit(Op::LoadImm(u16::try_from(value).unwrap_or(u16::MAX)));
            return;
        }
        match &expr.kind {
            ExprKind::Number(value) => {
                self.builder.emit(Op::LoadImm(u16::try_from(*value).unwrap_or(u16::MAX)));
            }
            ExprKind::Bool(value) => self.builder.emit(Op::LoadImm(u16::from(*value))),
            ExprKind::Str(text) => {
                let label = self.strings.intern(text);
                self.builder.set_width(Width::Word);
                self.builder.emit(Op::Lea(Place::Global(label)));
            }
            ExprKind::ArrayLiteral(_) => {
                // Array literals only appear as initializers; a bare array
                // expression has no accumulator value.
                self.builder.emit(Op::LoadImm(0));
            }
            ExprKind::Identifier(name) => match self.place_for_name(name) {
                Some(place) => self.builder.emit(Op::Load(place)),
                None => self.builder.emit(Op::LoadImm(0)),
            },
            ExprKind::Member { object, property } => {
                // Enum members folded above; what remains is a qualified
                // module reference.
                let place = object
                    .as_identifier()
                    .map(|module| {
                        self.layout
                            .zp_address(module, property)
                            .or_else(|| self.layout.map_address(module, property))
                            .map_or_else(
                                || Place::Global(format!("{module}::{property}")),
                                |address| Place::Abs { address },
                            )
                    })
                    .unwrap_or(Place::Global(format!("{}::{property}", self.module)));
                self.builder.emit(Op::Load(place));
            }
            ExprKind::Unary { op, operand } => self.lower_unary(expr, *op, operand),
            ExprKind::Binary { op, lhs, rhs } => self.lower_binary(expr, *op, lhs, rhs),
            ExprKind::Assign { target, value } => self.lower_assign(target, value),
            ExprKind::Call { callee, args } => self.lower_call(expr, callee, args, true),
            ExprKind::Index { target, index } => self.lower_index_read(expr, target, index),
        }
    }

    fn lower_unary(&mut self, expr: &Expr, op: UnaryOp, operand: &Expr) {
        match op {
            UnaryOp::Not => {
                self.lower_expr(operand);
                self.builder.set_width(Width::Byte);
                self.builder.emit(Op::Not);
            }
            UnaryOp::Negate => {
                self.lower_expr(operand);
                self.builder.set_width(self.width_of_node(expr.id));
                self.builder.emit(Op::Neg);
            }
            UnaryOp::BitNot => {
                self.lower_expr(operand);
                let width = self.width_of_node(expr.id);
                self.builder.set_width(width);
                let mask = if width == Width::Word { 0xFFFF } else { 0x00FF };
                self.builder.emit(Op::BitXor(Value::Imm(mask)));
            }
            UnaryOp::AddressOf => {
                let place = operand
                    .as_identifier()
                    .and_then(|name| self.place_for_name(name));
                self.builder.set_width(Width::Word);
                match place {
                    Some(place) => self.builder.emit(Op::Lea(place)),
                    None => self.builder.emit(Op::LoadImm(0)),
                }
            }
        }
    }

    fn lower_binary(&mut self, expr: &Expr, op: BinaryOp, lhs: &Expr, rhs: &Expr) {
        if op.is_logical() {
            // Short-circuit, then join on a materialized 0/1.
            let true_block = self.builder.new_block("true");
            let false_block = self.builder.new_block("false");
            let end_block = self.builder.new_block("end");
            self.lower_condition(expr, true_block, false_block);
            self.builder.switch_to(true_block);
            self.builder.set_width(Width::Byte);
            self.builder.emit(Op::LoadImm(1));
            self.builder.terminate(Terminator::Jump(end_block));
            self.builder.switch_to(false_block);
            self.builder.emit(Op::LoadImm(0));
            self.builder.terminate(Terminator::Jump(end_block));
            self.builder.switch_to(end_block);
            return;
        }
        if op.is_comparison() {
            let cond = comparison_cond(op);
            self.lower_acc_and_operand(lhs, rhs, |value| Op::Cmp(value));
            self.builder.set_width(Width::Byte);
            self.builder.emit(Op::SetIf(cond));
            return;
        }
        let make = arithmetic_op(op);
        self.lower_acc_and_operand(lhs, rhs, make);
        self.builder.set_width(self.width_of_node(expr.id));
    }

    /// Accumulator-first operand discipline: evaluate the left side into
    /// the accumulator, feed the right side to `make` as an immediate or
    /// memory operand, spilling compound right sides to scratch first.
    fn lower_acc_and_operand(&mut self, lhs: &Expr, rhs: &Expr, make: impl Fn(Value) -> Op) {
        if let Some(value) = self.simple_value(rhs) {
            self.lower_expr(lhs);
            self.builder.set_width(self.width_of_node(lhs.id).max_with(self.width_of_node(rhs.id)));
            self.builder.emit(make(value));
            return;
        }
        let scratch = self.claim_scratch();
        self.lower_expr(rhs);
        self.builder.emit(Op::Store(scratch.clone()));
        self.lower_expr(lhs);
        self.builder.set_width(self.width_of_node(lhs.id).max_with(self.width_of_node(rhs.id)));
        self.builder.emit(make(Value::Place(scratch)));
        self.release_scratch();
    }

    fn lower_assign(&mut self, target: &Expr, value: &Expr) {
        match &target.kind {
            ExprKind::Identifier(name) => {
                let place = self.place_for_name(name);
                self.lower_expr(value);
                if let Some(place) = place {
                    self.builder.set_width(self.width_of_node(target.id));
                    self.builder.emit(Op::Store(place));
                }
            }
            ExprKind::Index { target: array, index } => {
                self.lower_index_write(array, index, value);
            }
            ExprKind::Member { object, property } => {
                let place = object
                    .as_identifier()
                    .map_or(Place::Global(format!("{}::{property}", self.module)), |module| {
                        Place::Global(format!("{module}::{property}"))
                    });
                self.lower_expr(value);
                self.builder.emit(Op::Store(place));
            }
            _ => self.lower_expr(value),
        }
    }

    /// Element place for a constant index into a directly addressed array,
    /// when that shortcut applies.
    fn direct_element_place(&self, array: &Expr, index: &Expr) -> Option<Place> {
        let offset = self.store.const_value(index.id)?;
        let element_size = self.element_size(array);
        let offset = u16::try_from(offset).ok()?.checked_mul(element_size)?;
        let base = array.as_identifier().and_then(|name| self.place_for_name(name))?;
        match base {
            Place::Slot { address } => Some(Place::Slot {
                address: address.checked_add(offset)?,
            }),
            Place::Abs { address } => Some(Place::Abs {
                address: address.checked_add(offset)?,
            }),
            Place::Global(_) => None,
        }
    }

    fn element_size(&self, array: &Expr) -> u16 {
        match self.store.type_of(array.id) {
            TypeInfo::Array { element, .. } => u16::try_from(element.size().max(1)).unwrap_or(1),
            _ => 1,
        }
    }

    fn element_width(&self, array: &Expr) -> Width {
        if self.element_size(array) >= 2 { Width::Word } else { Width::Byte }
    }

    /// Leaves the element address in a scratch pair and returns it.
    fn lower_element_pointer(&mut self, array: &Expr, index: &Expr) -> Place {
        let scratch = self.claim_scratch();
        let base = array.as_identifier().and_then(|name| self.place_for_name(name));
        self.builder.set_width(Width::Word);
        match base {
            Some(place) => self.builder.emit(Op::Lea(place)),
            None => {
                // Array expression without a simple base: its value is a
                // pointer already (dynamic array).
                self.lower_expr(array);
            }
        }
        self.builder.set_width(Width::Word);
        self.builder.emit(Op::Store(scratch.clone()));
        self.lower_expr(index);
        let element_size = self.element_size(array);
        self.builder.set_width(Width::Word);
        if element_size > 1 {
            self.builder.emit(Op::Mul(Value::Imm(element_size)));
        }
        self.builder.emit(Op::Add(Value::Place(scratch.clone())));
        self.builder.emit(Op::Store(scratch.clone()));
        scratch
    }

    fn lower_index_read(&mut self, expr: &Expr, array: &Expr, index: &Expr) {
        if let Some(place) = self.direct_element_place(array, index) {
            self.builder.set_width(self.width_of_node(expr.id));
            self.builder.emit(Op::Load(place));
            return;
        }
        let pointer = self.lower_element_pointer(array, index);
        self.builder.set_width(self.element_width(array));
        self.builder.emit(Op::LoadInd(pointer));
        self.release_scratch();
    }

    fn lower_index_write(&mut self, array: &Expr, index: &Expr, value: &Expr) {
        if let Some(place) = self.direct_element_place(array, index) {
            self.lower_expr(value);
            self.builder.set_width(self.element_width(array));
            self.builder.emit(Op::Store(place));
            return;
        }
        let pointer = self.lower_element_pointer(array, index);
        self.lower_expr(value);
        self.builder.set_width(self.element_width(array));
        self.builder.emit(Op::StoreInd(pointer));
        self.release_scratch();
    }

    fn lower_call(&mut self, expr: &Expr, callee: &Expr, args: &[Expr], want_result: bool) {
        // Runtime intrinsics; `sizeof`/`length` folded before this point.
        if let Some(name) = callee.as_identifier() {
            if let Some(symbol) = self.table.lookup_in_chain(self.scope, name) {
                if self.table.symbol(symbol).kind == SymbolKind::Intrinsic {
                    match name {
                        "peek" => return self.lower_peek(args),
                        "poke" => return self.lower_poke(args),
                        _ => {}
                    }
                }
            }
        }

        let Some(qualified) = self.qualified_callee(callee) else {
            // Unresolvable callee: the type checker reported it; keep the
            // accumulator defined.
            self.builder.emit(Op::LoadImm(0));
            return;
        };
        let callee_frame = self.frames.frame(&qualified);
        if let Some(frame) = callee_frame {
            let param_addresses: Vec<(u16, usize)> = frame
                .slots
                .iter()
                .filter(|slot| slot.kind == crate::frames::SlotKind::Param)
                .map(|slot| (frame.base_address + u16::try_from(slot.offset).unwrap_or(u16::MAX), slot.size))
                .collect();
            for (arg, (address, size)) in args.iter().zip(&param_addresses) {
                self.lower_expr(arg);
                self.builder
                    .set_width(if *size >= 2 { Width::Word } else { Width::Byte });
                self.builder.emit(Op::Store(Place::Slot { address: *address }));
            }
        }
        self.set_location(Some(expr.location));
        self.builder.emit(Op::Call(qualified.clone()));
        if want_result {
            if let Some(address) = callee_frame.and_then(Frame::return_slot_address) {
                self.builder.set_width(self.width_of_node(expr.id));
                self.builder.emit(Op::Load(Place::Slot { address }));
            }
        }
    }

    fn qualified_callee(&self, callee: &Expr) -> Option<String> {
        match &callee.kind {
            ExprKind::Identifier(name) => {
                let symbol = self.table.lookup_in_chain(self.scope, name)?;
                let symbol = self.table.symbol(symbol);
                match symbol.kind {
                    SymbolKind::Function => Some(format!("{}::{name}", self.module)),
                    SymbolKind::ImportedSymbol => {
                        let module = symbol.source_module.as_deref()?;
                        let original = symbol.original_name.as_deref()?;
                        Some(format!("{module}::{original}"))
                    }
                    _ => None,
                }
            }
            ExprKind::Member { object, property } => {
                object.as_identifier().map(|module| format!("{module}::{property}"))
            }
            _ => None,
        }
    }

    fn lower_peek(&mut self, args: &[Expr]) {
        let Some(address_expr) = args.first() else { return };
        if let Some(address) = self.store.const_value(address_expr.id) {
            self.builder.set_width(Width::Byte);
            self.builder.emit(Op::Load(Place::Abs {
                address: u16::try_from(address).unwrap_or(u16::MAX),
            }));
            return;
        }
        let scratch = self.claim_scratch();
        self.lower_expr(address_expr);
        self.builder.set_width(Width::Word);
        self.builder.emit(Op::Store(scratch.clone()));
        self.builder.set_width(Width::Byte);
        self.builder.emit(Op::LoadInd(scratch));
        self.release_scratch();
    }

    fn lower_poke(&mut self, args: &[Expr]) {
        let (Some(address_expr), Some(value_expr)) = (args.first(), args.get(1)) else {
            return;
        };
        if let Some(address) = self.store.const_value(address_expr.id) {
            self.lower_expr(value_expr);
            self.builder.set_width(Width::Byte);
            self.builder.emit(Op::Store(Place::Abs {
                address: u16::try_from(address).unwrap_or(u16::MAX),
            }));
            return;
        }
        let scratch = self.claim_scratch();
        self.lower_expr(address_expr);
        self.builder.set_width(Width::Word);
        self.builder.emit(Op::Store(scratch.clone()));
        self.lower_expr(value_expr);
        self.builder.set_width(Width::Byte);
        self.builder.emit(Op::StoreInd(scratch));
        self.release_scratch();
    }

    // --- conditions ---

    /// Lowers a boolean expression directly into control flow, without
    /// materializing a 0/1 value.
    fn lower_condition(&mut self, expr: &Expr, then_to: BlockId, else_to: BlockId) {
        match &expr.kind {
            ExprKind::Bool(true) => self.builder.terminate(Terminator::Jump(then_to)),
            ExprKind::Bool(false) => self.builder.terminate(Terminator::Jump(else_to)),
            ExprKind::Unary {
                op: UnaryOp::Not,
                operand,
            } => self.lower_condition(operand, else_to, then_to),
            ExprKind::Binary { op, lhs, rhs } if op.is_comparison() => {
                self.lower_acc_and_operand(lhs, rhs, Op::Cmp);
                self.builder.terminate(Terminator::Branch {
                    cond: comparison_cond(*op),
                    then_to,
                    else_to,
                });
            }
            ExprKind::Binary {
                op: BinaryOp::And,
                lhs,
                rhs,
            } => {
                let mid = self.builder.new_block("and");
                self.lower_condition(lhs, mid, else_to);
                self.builder.switch_to(mid);
                self.lower_condition(rhs, then_to, else_to);
            }
            ExprKind::Binary {
                op: BinaryOp::Or,
                lhs,
                rhs,
            } => {
                let mid = self.builder.new_block("or");
                self.lower_condition(lhs, then_to, mid);
                self.builder.switch_to(mid);
                self.lower_condition(rhs, then_to, else_to);
            }
            _ => {
                self.lower_expr(expr);
                self.builder.set_width(Width::Byte);
                self.builder.emit(Op::Cmp(Value::Imm(0)));
                self.builder.terminate(Terminator::Branch {
                    cond: Cond::Ne,
                    then_to,
                    else_to,
                });
            }
        }
    }

    // --- statements ---

    fn lower_stmts_in_scope(&mut self, stmts: &[Stmt], scope: ScopeId) {
        let previous = self.scope;
        self.scope = scope;
        for stmt in stmts {
            if self.builder.is_terminated() {
                // Everything past an unconditional exit was already flagged
                // as unreachable by the CFG pass.
                break;
            }
            self.lower_stmt(stmt);
        }
        self.scope = previous;
    }

    fn branch_scope(&self, stmt: &Stmt, branch: u8) -> ScopeId {
        self.table.scope_for_branch(stmt.id, branch).unwrap_or(self.scope)
    }

    fn lower_stmt(&mut self, stmt: &Stmt) {
        self.set_location(Some(stmt.location));
        match &stmt.kind {
            StmtKind::Expr(expr) => {
                // Statement-position calls skip the result load.
                if let ExprKind::Call { callee, args } = &expr.kind {
                    if self.store.const_value(expr.id).is_none() {
                        self.lower_call(expr, callee, args, false);
                        return;
                    }
                }
                self.lower_expr(expr);
            }
            StmtKind::Let(var) => self.lower_let(stmt, var),
            StmtKind::Block(body) => self.lower_stmts_in_scope(body, self.branch_scope(stmt, 0)),
            StmtKind::If {
                condition,
                then_branch,
                else_branch,
            } => {
                let then_block = self.builder.new_block("then");
                let end_block = self.builder.new_block("end");
                let else_block = match else_branch {
                    Some(_) => self.builder.new_block("else"),
                    None => end_block,
                };
                self.lower_condition(condition, then_block, else_block);
                self.builder.switch_to(then_block);
                self.lower_stmts_in_scope(then_branch, self.branch_scope(stmt, 0));
                self.builder.terminate(Terminator::Jump(end_block));
                if let Some(else_branch) = else_branch {
                    self.builder.switch_to(else_block);
                    self.lower_stmts_in_scope(else_branch, self.branch_scope(stmt, 1));
                    self.builder.terminate(Terminator::Jump(end_block));
                }
                self.builder.switch_to(end_block);
            }
            StmtKind::While { condition, body } => {
                let header = self.builder.new_block("while_head");
                let body_block = self.builder.new_block("while_body");
                let exit = self.builder.new_block("while_end");
                self.builder.terminate(Terminator::Jump(header));
                self.builder.switch_to(header);
                self.lower_condition(condition, body_block, exit);
                self.builder.switch_to(body_block);
                self.loop_stack.push((header, exit));
                self.lower_stmts_in_scope(body, self.branch_scope(stmt, 0));
                self.loop_stack.pop();
                self.builder.terminate(Terminator::Jump(header));
                self.builder.switch_to(exit);
            }
            StmtKind::DoWhile { body, condition } => {
                let body_block = self.builder.new_block("do_body");
                let check = self.builder.new_block("do_check");
                let exit = self.builder.new_block("do_end");
                self.builder.terminate(Terminator::Jump(body_block));
                self.builder.switch_to(body_block);
                self.loop_stack.push((check, exit));
                let scope = self.branch_scope(stmt, 0);
                self.lower_stmts_in_scope(body, scope);
                self.loop_stack.pop();
                self.builder.terminate(Terminator::Jump(check));
                self.builder.switch_to(check);
                // The condition sees the body scope's declarations.
                let previous = self.scope;
                self.scope = scope;
                self.lower_condition(condition, body_block, exit);
                self.scope = previous;
                self.builder.switch_to(exit);
            }
            StmtKind::For {
                init,
                condition,
                update,
                body,
            } => {
                let scope = self.branch_scope(stmt, 0);
                let previous = self.scope;
                self.scope = scope;
                if let Some(init) = init {
                    self.lower_stmt(init);
                }
                let header = self.builder.new_block("for_head");
                let body_block = self.builder.new_block("for_body");
                let step = self.builder.new_block("for_step");
                let exit = self.builder.new_block("for_end");
                self.builder.terminate(Terminator::Jump(header));
                self.builder.switch_to(header);
                match condition {
                    Some(condition) => self.lower_condition(condition, body_block, exit),
                    None => self.builder.terminate(Terminator::Jump(body_block)),
                }
                self.builder.switch_to(body_block);
                self.loop_stack.push((step, exit));
                self.lower_stmts_in_scope(body, scope);
                self.loop_stack.pop();
                self.builder.terminate(Terminator::Jump(step));
                self.builder.switch_to(step);
                if let Some(update) = update {
                    self.lower_expr(update);
                }
                self.builder.terminate(Terminator::Jump(header));
                self.builder.switch_to(exit);
                self.scope = previous;
            }
            StmtKind::Loop { body } => {
                let body_block = self.builder.new_block("loop_body");
                let exit = self.builder.new_block("loop_end");
                self.builder.terminate(Terminator::Jump(body_block));
                self.builder.switch_to(body_block);
                self.loop_stack.push((body_block, exit));
                self.lower_stmts_in_scope(body, self.branch_scope(stmt, 0));
                self.loop_stack.pop();
                self.builder.terminate(Terminator::Jump(body_block));
                self.builder.switch_to(exit);
            }
            StmtKind::Match {
                scrutinee,
                arms,
                default,
            } => self.lower_match(stmt, scrutinee, arms, default.as_deref()),
            StmtKind::Return(value) => {
                if let Some(value) = value {
                    self.lower_expr(value);
                    if let Some(address) = self.frame.return_slot_address() {
                        self.builder.emit(Op::Store(Place::Slot { address }));
                    }
                }
                self.builder.terminate(Terminator::Ret);
            }
            StmtKind::Break => {
                if let Some(&(_, exit)) = self.loop_stack.last() {
                    self.builder.terminate(Terminator::Jump(exit));
                }
            }
            StmtKind::Continue => {
                if let Some(&(header, _)) = self.loop_stack.last() {
                    self.builder.terminate(Terminator::Jump(header));
                }
            }
        }
    }

    fn lower_let(&mut self, stmt: &Stmt, var: &crate::ast::VariableDecl) {
        let Some(init) = &var.initializer else { return };
        let Some(symbol) = self.table.symbol_for_node(stmt.id) else { return };
        let Some(place) = self.place_for_symbol(self.table.symbol(symbol)) else {
            return;
        };
        // Element-wise stores for local array literals; scalars store the
        // accumulator.
        if let (ExprKind::ArrayLiteral(items), Place::Slot { address }) = (&init.kind, &place) {
            let element_size = self.element_size(init);
            for (offset, item) in items.iter().enumerate() {
                self.lower_expr(item);
                let address = address + u16::try_from(offset).unwrap_or(u16::MAX) * element_size;
                self.builder
                    .set_width(if element_size >= 2 { Width::Word } else { Width::Byte });
                self.builder.emit(Op::Store(Place::Slot { address }));
            }
            return;
        }
        self.lower_expr(init);
        self.builder.set_width(self.width_of_node(stmt.id));
        self.builder.emit(Op::Store(place));
    }

    fn lower_match(
        &mut self,
        stmt: &Stmt,
        scrutinee: &Expr,
        arms: &[crate::ast::MatchArm],
        default: Option<&[Stmt]>,
    ) {
        let scratch = self.claim_scratch();
        self.lower_expr(scrutinee);
        self.builder.emit(Op::Store(scratch.clone()));
        let end_block = self.builder.new_block("match_end");

        let arm_blocks: Vec<BlockId> = (0..arms.len()).map(|_| self.builder.new_block("case")).collect();
        let default_block = match default {
            Some(_) => self.builder.new_block("default"),
            None => end_block,
        };

        for (index, arm) in arms.iter().enumerate() {
            let next_test = if index + 1 < arms.len() {
                self.builder.new_block("test")
            } else {
                default_block
            };
            let pattern = self
                .simple_value(&arm.pattern)
                .unwrap_or(Value::Imm(0));
            self.builder.set_width(self.width_of_node(scrutinee.id));
            self.builder.emit(Op::Load(scratch.clone()));
            self.builder.emit(Op::Cmp(pattern));
            self.builder.terminate(Terminator::Branch {
                cond: Cond::Eq,
                then_to: arm_blocks[index],
                else_to: next_test,
            });
            if index + 1 < arms.len() {
                self.builder.switch_to(next_test);
            }
        }
        if arms.is_empty() {
            self.builder.terminate(Terminator::Jump(default_block));
        }

        for (index, arm) in arms.iter().enumerate() {
            self.builder.switch_to(arm_blocks[index]);
            let scope = self
                .table
                .scope_for_branch(stmt.id, u8::try_from(index).unwrap_or(u8::MAX))
                .unwrap_or(self.scope);
            self.lower_stmts_in_scope(&arm.body, scope);
            self.builder.terminate(Terminator::Jump(end_block));
        }
        if let Some(default) = default {
            self.builder.switch_to(default_block);
            let scope = self
                .table
                .scope_for_branch(stmt.id, u8::try_from(arms.len()).unwrap_or(u8::MAX))
                .unwrap_or(self.scope);
            self.lower_stmts_in_scope(default, scope);
            self.builder.terminate(Terminator::Jump(end_block));
        }
        self.builder.switch_to(end_block);
        self.release_scratch();
    }
}

impl Width {
    fn max_with(self, other: Self) -> Self {
        if self == Self::Word || other == Self::Word {
            Self::Word
        } else {
            Self::Byte
        }
    }
}

fn comparison_cond(op: BinaryOp) -> Cond {
    match op {
        BinaryOp::Eq => Cond::Eq,
        BinaryOp::Ne => Cond::Ne,
        BinaryOp::Lt => Cond::Lt,
        BinaryOp::Le => Cond::Le,
        BinaryOp::Gt => Cond::Gt,
        _ => Cond::Ge,
    }
}

fn arithmetic_op(op: BinaryOp) -> fn(Value) -> Op {
    match op {
        BinaryOp::Add => Op::Add,
        BinaryOp::Sub => Op::Sub,
        BinaryOp::Mul => Op::Mul,
        BinaryOp::Div => Op::Div,
        BinaryOp::Mod => Op::Mod,
        BinaryOp::BitAnd => Op::BitAnd,
        BinaryOp::BitOr => Op::BitOr,
        BinaryOp::BitXor => Op::BitXor,
        BinaryOp::Shl => Op::Shl,
        _ => Op::Shr,
    }
}
