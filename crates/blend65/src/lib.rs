//! Blend65 middle-end: semantic analysis and IL generation.
//!
//! This crate sits between the parser and the 6502 emitter. It takes a set
//! of parsed modules and produces everything the backend needs: resolved
//! symbol tables, type annotations, per-function control-flow graphs, a
//! whole-program call graph, loop/alias analyses with 6502 optimization
//! hints, a deterministic global memory layout, statically allocated
//! function frames, and a linear accumulator-centric IL.
//!
//! The defining architectural choice is **static frame allocation**: every
//! function's parameters and locals live at compile-time-known addresses,
//! with frames shared only between functions the call graph proves can
//! never be live at the same time. There is no runtime stack for locals;
//! recursion is legal but flagged, since its stack usage cannot be bounded
//! statically.

mod alias;
mod ast;
mod callgraph;
mod cfg;
mod compile;
mod diagnostics;
mod frames;
mod globals;
mod hints;
mod il;
mod layout;
mod loops;
mod options;
mod registry;
mod scope;
mod source;
mod symtab;
mod target;
mod tracer;
mod typecheck;
mod types;

pub use crate::{
    alias::AliasAnalysis,
    ast::{
        AnalysisStore, BinaryOp, Decl, DeclKind, EnumDecl, EnumMember, Expr, ExprKind, FunctionDecl, ImportDecl,
        ImportList, ImportName, MapDecl, MapForm, MatchArm, MetaKey, MetaValue, NodeId, Param, Program, Stmt,
        StmtKind, StorageClass, TypeAliasDecl, TypeExpr, TypeExprKind, UnaryOp, VariableDecl, build::AstBuilder,
    },
    callgraph::{CallGraph, CallGraphBuilder, CallGraphNode},
    cfg::{CfgNode, CfgNodeId, CfgNodeKind, ControlFlowGraph},
    compile::{CompileOutput, CompileStatistics, Compiler, ModuleAnalysis},
    diagnostics::{Diagnostic, DiagnosticBag, DiagnosticCode, Severity},
    frames::{Frame, FrameMap, FrameSlot, SlotKind},
    globals::{GlobalSymbol, GlobalSymbolTable, SimpleLookup},
    hints::{AccessCounts, Hint, HintKind, HintPriority},
    il::{
        Block, BlockId, Cond, GlobalData, IlFunction, IlModule, IlProgram, Instruction, Op, Place, Terminator, Value,
        Width,
    },
    layout::{MapEntry, MapEntryForm, MemoryLayout, MemoryStatistics, ZeroPageEntry},
    loops::{InductionKind, InductionVariable, LoopId, LoopInfo, LoopKind},
    options::{CompileOptions, OptLevel},
    registry::{ExportKind, ImportResolver, Module, ModuleRegistry, ResolvedImport},
    scope::{Scope, ScopeId, ScopeKind, Symbol, SymbolId, SymbolKind, SymbolSeed, SymbolTable},
    source::{SourceId, SourcePos, SourceRegistry, SourceSpan},
    target::{AddressRange, MemoryRegion, TargetDescriptor},
    tracer::{NoopTracer, PassTracer, RecordingTracer, StderrTracer, TraceEvent},
    types::{Compatibility, TypeInfo, TypeSystem},
};
