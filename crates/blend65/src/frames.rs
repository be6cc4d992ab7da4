//! Static frame allocation.
//!
//! Every function's parameters, locals, and return slot live at fixed
//! addresses inside the target's frame region; there is no runtime stack.
//! Two functions may share the same base address only when the call graph
//! proves neither can be live while the other runs: neither transitively
//! calls the other, and neither participates in recursion. Allocation is a
//! greedy coloring over that exclusion relation, visiting functions in
//! deterministic registration order.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use strum::Display;

use crate::ast::{DeclKind, Program};
use crate::callgraph::CallGraph;
use crate::diagnostics::{Diagnostic, DiagnosticBag, DiagnosticCode};
use crate::scope::{ScopeKind, SymbolId, SymbolKind, SymbolTable};
use crate::source::SourceSpan;
use crate::target::{AddressRange, TargetDescriptor};
use crate::types::TypeInfo;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
pub enum SlotKind {
    Return,
    Param,
    Local,
}

/// One fixed-offset slot inside a frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameSlot {
    pub name: String,
    /// Symbol backing the slot; the return slot has none.
    pub symbol: Option<SymbolId>,
    pub ty: TypeInfo,
    pub offset: usize,
    pub size: usize,
    pub kind: SlotKind,
}

/// One function's frame: base address plus ordered slots.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Frame {
    /// Qualified `module::function` name.
    pub function: String,
    pub base_address: u16,
    pub size: usize,
    pub slots: Vec<FrameSlot>,
    pub location: SourceSpan,
}

impl Frame {
    /// Absolute address of a slot by backing symbol.
    #[must_use]
    pub fn slot_address(&self, symbol: SymbolId) -> Option<u16> {
        self.slots
            .iter()
            .find(|slot| slot.symbol == Some(symbol))
            .map(|slot| self.base_address + u16::try_from(slot.offset).unwrap_or(u16::MAX))
    }

    /// Absolute address of the return slot, if the function returns a value.
    #[must_use]
    pub fn return_slot_address(&self) -> Option<u16> {
        self.slots
            .iter()
            .find(|slot| slot.kind == SlotKind::Return)
            .map(|slot| self.base_address + u16::try_from(slot.offset).unwrap_or(u16::MAX))
    }

    /// Absolute addresses of the parameter slots, in declaration order.
    pub fn param_addresses(&self) -> impl Iterator<Item = u16> + '_ {
        self.slots
            .iter()
            .filter(|slot| slot.kind == SlotKind::Param)
            .map(|slot| self.base_address + u16::try_from(slot.offset).unwrap_or(u16::MAX))
    }
}

/// The whole program's frame plan.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FrameMap {
    frames: IndexMap<String, Frame>,
    pub region: AddressRange,
}

impl FrameMap {
    #[must_use]
    pub fn frame(&self, qualified: &str) -> Option<&Frame> {
        self.frames.get(qualified)
    }

    pub fn frames(&self) -> impl Iterator<Item = &Frame> {
        self.frames.values()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

/// Lays out every function's frame and assigns shared base addresses.
pub fn allocate_frames(
    modules: &IndexMap<String, (&Program, &SymbolTable)>,
    call_graph: &CallGraph,
    target: &TargetDescriptor,
    diagnostics: &mut DiagnosticBag,
) -> FrameMap {
    let mut frames: Vec<Frame> = Vec::new();
    for (module_name, (program, table)) in modules {
        for decl in &program.decls {
            let DeclKind::Function(function) = &decl.kind else { continue };
            let qualified = format!("{module_name}::{}", function.name);
            frames.push(build_frame(qualified, decl.location, decl.id, table));
        }
    }

    // Greedy coloring: a function joins the first group whose members it
    // can never be live with.
    let mut groups: Vec<Vec<usize>> = Vec::new();
    for (index, frame) in frames.iter().enumerate() {
        let recursive = call_graph.is_recursive(&frame.function);
        let group = if recursive {
            // Recursive frames are never shared.
            None
        } else {
            groups.iter().position(|members| {
                members.iter().all(|&other| {
                    let other = &frames[other].function;
                    !call_graph.is_recursive(other)
                        && !call_graph.reaches(&frame.function, other)
                        && !call_graph.reaches(other, &frame.function)
                })
            })
        };
        match group {
            Some(group) => groups[group].push(index),
            None => groups.push(vec![index]),
        }
    }

    // Base addresses: one region slice per group, sized by its widest
    // member.
    let mut cursor = usize::from(target.frame_region.start);
    let limit = usize::from(target.frame_region.end);
    let mut overflowed = false;
    for members in &groups {
        let group_size = members.iter().map(|&i| frames[i].size).max().unwrap_or(0);
        if group_size > 0 && cursor + group_size - 1 > limit {
            overflowed = true;
        }
        for &member in members {
            frames[member].base_address = u16::try_from(cursor.min(limit)).unwrap_or(u16::MAX);
        }
        cursor += group_size;
    }

    if overflowed {
        let mut largest: Vec<(&str, usize)> = frames.iter().map(|f| (f.function.as_str(), f.size)).collect();
        largest.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        let listing: Vec<String> = largest
            .iter()
            .take(3)
            .map(|(name, size)| format!("{name} ({size} bytes)"))
            .collect();
        let total = cursor - usize::from(target.frame_region.start);
        diagnostics.push(
            Diagnostic::new(
                DiagnosticCode::FrameOverflow,
                format!(
                    "static frames need {total} bytes but the frame region {} holds {}; largest frames: {}",
                    target.frame_region,
                    target.frame_capacity(),
                    listing.join(", "),
                ),
                SourceSpan::synthetic(),
            )
            .with_suggestion("reduce locals in the largest functions or widen the frame region"),
        );
    }

    let mut map = FrameMap {
        frames: IndexMap::new(),
        region: target.frame_region,
    };
    for frame in frames {
        map.frames.insert(frame.function.clone(), frame);
    }
    map
}

/// Return slot, then parameters in declaration order, then locals in
/// lexical order.
fn build_frame(qualified: String, location: SourceSpan, decl: crate::ast::NodeId, table: &SymbolTable) -> Frame {
    let mut slots = Vec::new();
    let mut offset = 0usize;
    let mut push = |slots: &mut Vec<FrameSlot>, name: String, symbol: Option<SymbolId>, ty: TypeInfo, kind: SlotKind| {
        let size = ty.size().max(1);
        slots.push(FrameSlot {
            name,
            symbol,
            ty,
            offset,
            size,
            kind,
        });
        offset += size;
    };

    let function_symbol = table.symbol_for_node(decl);
    let return_ty = function_symbol.and_then(|id| match &table.symbol(id).ty {
        Some(TypeInfo::Function { ret, .. }) => Some(ret.as_ref().clone()),
        _ => None,
    });
    if let Some(ret) = return_ty {
        if !ret.is_void() {
            push(&mut slots, "return".to_owned(), None, ret, SlotKind::Return);
        }
    }

    let Some(body_scope) = table.scope_for_node(decl) else {
        return Frame {
            function: qualified,
            base_address: 0,
            size: offset,
            slots,
            location,
        };
    };
    for symbol in table.symbols_in(body_scope) {
        if symbol.kind == SymbolKind::Parameter {
            push(
                &mut slots,
                symbol.name.clone(),
                Some(symbol.id),
                symbol.ty.clone().unwrap_or(TypeInfo::Unknown),
                SlotKind::Param,
            );
        }
    }
    // Locals from every scope belonging to this function, in scope creation
    // order (lexical).
    let function_symbol = table.scope(body_scope).function;
    for scope in table.scopes() {
        if scope.function != function_symbol || function_symbol.is_none() {
            continue;
        }
        if scope.kind == ScopeKind::Module {
            continue;
        }
        for symbol in table.symbols_in(scope.id) {
            if matches!(symbol.kind, SymbolKind::Variable | SymbolKind::Constant) {
                push(
                    &mut slots,
                    symbol.name.clone(),
                    Some(symbol.id),
                    symbol.ty.clone().unwrap_or(TypeInfo::Unknown),
                    SlotKind::Local,
                );
            }
        }
    }

    Frame {
        function: qualified,
        base_address: 0,
        size: offset,
        slots,
        location,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::build::AstBuilder;
    use crate::callgraph::CallGraphBuilder;
    use crate::registry::{ImportResolver, ModuleRegistry};
    use crate::symtab::{DepTypes, build_symbol_table};
    use crate::typecheck::{DepValues, TypeChecker};

    fn prepare(program: Program) -> (Program, SymbolTable, CallGraph) {
        let mut registry = ModuleRegistry::new();
        registry.register(program.clone());
        let mut resolver = ImportResolver::new();
        let mut diags = DiagnosticBag::new();
        let mut built = build_symbol_table(&program, &mut resolver, &registry, &DepTypes::default(), &mut diags);
        let globals = crate::globals::GlobalSymbolTable::new();
        let mut store = crate::ast::AnalysisStore::new();
        TypeChecker::new(
            &program,
            &mut built.table,
            &mut built.types,
            &mut store,
            &globals,
            &DepValues::default(),
            &mut diags,
        )
        .check();
        assert!(!diags.has_errors(), "{:?}", diags.iter().collect::<Vec<_>>());
        let mut cg = CallGraphBuilder::new();
        cg.add_module(&program, &built.table);
        (program, built.table, cg.finish())
    }

    /// top calls helper; sibling is unrelated to both.
    fn three_functions() -> Program {
        let mut b = AstBuilder::new();
        let helper = {
            let x = b.ident("x");
            let param = b.param("x", b.ty("byte"));
            b.function("helper", vec![param], Some(b.ty("byte")), vec![b.ret(Some(x))])
        };
        let top = {
            let arg = b.number(1);
            let call = b.call_named("helper", vec![arg]);
            let local = b.let_local("t", Some(b.ty("word")), None);
            b.function("top", vec![], Some(b.ty("byte")), vec![local, b.ret(Some(call))])
        };
        let sibling = {
            let two = b.number(2);
            b.function("sibling", vec![], Some(b.ty("byte")), vec![b.ret(Some(two))])
        };
        b.program("main", vec![helper, top, sibling])
    }

    #[test]
    fn slots_are_ordered_return_params_locals() {
        let (program, table, graph) = prepare(three_functions());
        let mut modules = IndexMap::new();
        modules.insert("main".to_owned(), (&program, &table));
        let mut diags = DiagnosticBag::new();
        let map = allocate_frames(&modules, &graph, &TargetDescriptor::c64(), &mut diags);

        let helper = map.frame("main::helper").unwrap();
        let kinds: Vec<SlotKind> = helper.slots.iter().map(|s| s.kind).collect();
        assert_eq!(kinds, vec![SlotKind::Return, SlotKind::Param]);
        assert_eq!(helper.slots[0].offset, 0);
        assert_eq!(helper.slots[1].offset, 1);
        assert_eq!(helper.size, 2);

        let top = map.frame("main::top").unwrap();
        // return byte + local word.
        assert_eq!(top.size, 3);
    }

    #[test]
    fn callers_and_callees_never_share_a_base() {
        let (program, table, graph) = prepare(three_functions());
        let mut modules = IndexMap::new();
        modules.insert("main".to_owned(), (&program, &table));
        let mut diags = DiagnosticBag::new();
        let map = allocate_frames(&modules, &graph, &TargetDescriptor::c64(), &mut diags);

        let helper = map.frame("main::helper").unwrap();
        let top = map.frame("main::top").unwrap();
        let sibling = map.frame("main::sibling").unwrap();
        assert_ne!(helper.base_address, top.base_address);
        // sibling is mutually exclusive with helper (neither calls the
        // other): the first compatible group wins.
        assert_eq!(sibling.base_address, helper.base_address);
        assert!(diags.is_empty());
    }

    #[test]
    fn frame_overflow_lists_the_largest_frames() {
        let mut b = AstBuilder::new();
        // One function with a local array far larger than the region.
        let f = {
            let local = b.let_local("buffer", Some(b.ty_array(b.ty("byte"), Some(2000))), None);
            b.function("huge", vec![], None, vec![local])
        };
        let (program, table, graph) = prepare(b.program("main", vec![f]));
        let mut modules = IndexMap::new();
        modules.insert("main".to_owned(), (&program, &table));
        let mut diags = DiagnosticBag::new();
        allocate_frames(&modules, &graph, &TargetDescriptor::c64(), &mut diags);
        let errors: Vec<_> = diags.with_code(DiagnosticCode::FrameOverflow).collect();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("main::huge"));
    }
}
