//! Symbol-table construction.
//!
//! One walk over a module's AST: top-level names first (so forward
//! references between functions work without declaration order games), then
//! function bodies, creating block and loop scopes as it descends. Enum and
//! alias types are registered here because later declarations may reference
//! them in annotations.

use ahash::AHashMap;
use indexmap::IndexMap;

use crate::ast::{
    Decl, DeclKind, EnumDecl, Program, Stmt, StmtKind, VariableDecl,
};
use crate::diagnostics::{DiagnosticBag, DiagnosticCode};
use crate::registry::{ExportKind, ImportResolver, ModuleRegistry, ResolvedImport};
use crate::scope::{ScopeId, ScopeKind, SymbolId, SymbolKind, SymbolSeed, SymbolTable};
use crate::source::SourceSpan;
use crate::types::{TypeInfo, TypeSystem};

/// Exported enum/alias types of already-built modules, consulted when this
/// module imports a type. Keyed module → type name.
pub type DepTypes = AHashMap<String, AHashMap<String, TypeInfo>>;

/// Output of the symbol-table pass for one module.
#[derive(Debug)]
pub struct SymbolTableBuild {
    pub table: SymbolTable,
    pub types: TypeSystem,
}

/// Builds the scope tree and symbol records for one module.
pub fn build_symbol_table(
    program: &Program,
    resolver: &mut ImportResolver,
    registry: &ModuleRegistry,
    dep_types: &DepTypes,
    diagnostics: &mut DiagnosticBag,
) -> SymbolTableBuild {
    let mut builder = Builder {
        table: SymbolTable::new(&program.name),
        types: TypeSystem::new(),
        diagnostics,
    };
    builder.seed_intrinsics();

    let root = builder.table.root();
    // Top-level names first: bodies may reference functions declared later.
    for decl in &program.decls {
        builder.declare_top_level(decl, root, resolver, registry, dep_types);
    }
    for decl in &program.decls {
        if let DeclKind::Function(function) = &decl.kind {
            builder.build_function_body(decl, function, root);
        }
    }

    SymbolTableBuild {
        table: builder.table,
        types: builder.types,
    }
}

struct Builder<'a> {
    table: SymbolTable,
    types: TypeSystem,
    diagnostics: &'a mut DiagnosticBag,
}

impl Builder<'_> {
    /// Seeds `peek`, `poke`, `sizeof`, and `length` into the module scope.
    ///
    /// `sizeof` and `length` take pseudo-parameters; the type checker and
    /// the IL generator treat them specially (compile-time folding).
    fn seed_intrinsics(&mut self) {
        let root = self.table.root();
        let intrinsics: [(&str, TypeInfo); 4] = [
            ("peek", TypeInfo::function(vec![TypeInfo::Word], TypeInfo::Byte)),
            ("poke", TypeInfo::function(vec![TypeInfo::Word, TypeInfo::Byte], TypeInfo::Void)),
            ("sizeof", TypeInfo::function(vec![TypeInfo::Unknown], TypeInfo::Word)),
            ("length", TypeInfo::function(vec![TypeInfo::Unknown], TypeInfo::Word)),
        ];
        for (name, ty) in intrinsics {
            let seed = SymbolSeed::new(name, SymbolKind::Intrinsic, SourceSpan::synthetic()).ty(ty);
            self.table
                .declare(root, seed)
                .expect("intrinsic names are unique");
        }
    }

    /// Declares a symbol, reporting `DUPLICATE_DECLARATION` (or
    /// `IMPORT_CONFLICT` when two imports collide) instead of failing.
    fn declare_or_report(&mut self, scope: ScopeId, seed: SymbolSeed) -> Option<SymbolId> {
        let name = seed.name.clone();
        let location = seed.location;
        let is_import = seed.kind == SymbolKind::ImportedSymbol;
        match self.table.declare(scope, seed) {
            Ok(id) => Some(id),
            Err(duplicate) => {
                let existing = self.table.symbol(duplicate.existing);
                if is_import && existing.kind == SymbolKind::ImportedSymbol {
                    let from = existing.source_module.as_deref().unwrap_or("?");
                    self.diagnostics.report(
                        DiagnosticCode::ImportConflict,
                        format!("'{name}' is already imported from module '{from}'"),
                        location,
                    );
                } else {
                    self.diagnostics.push(
                        crate::diagnostics::Diagnostic::new(
                            DiagnosticCode::DuplicateDeclaration,
                            format!("'{name}' is already declared in this scope at {}", existing.location),
                            location,
                        )
                        .with_suggestion("rename one of the declarations"),
                    );
                }
                None
            }
        }
    }

    fn declare_top_level(
        &mut self,
        decl: &Decl,
        root: ScopeId,
        resolver: &mut ImportResolver,
        registry: &ModuleRegistry,
        dep_types: &DepTypes,
    ) {
        match &decl.kind {
            DeclKind::Import(import) => {
                for resolved in resolver.resolve(import, decl.location, registry, self.diagnostics) {
                    self.declare_import(root, &resolved, dep_types);
                }
            }
            DeclKind::Function(function) => {
                let seed = SymbolSeed::new(&function.name, SymbolKind::Function, decl.location)
                    .exported(function.is_exported)
                    .node(decl.id);
                self.declare_or_report(root, seed);
            }
            DeclKind::Variable(var) => {
                self.declare_variable(root, var, decl.location, decl.id);
            }
            DeclKind::Enum(decl_enum) => {
                self.declare_enum(root, decl_enum, decl.location, decl.id);
            }
            DeclKind::TypeAlias(alias) => {
                match self.types.resolve(&alias.ty) {
                    Some(ty) => self.types.define(&alias.name, ty),
                    None => self.diagnostics.report(
                        DiagnosticCode::UnknownType,
                        format!("unknown type in alias '{}'", alias.name),
                        alias.ty.location,
                    ),
                }
            }
            DeclKind::Map(map) => {
                let seed = SymbolSeed::new(&map.name, SymbolKind::Variable, decl.location)
                    .exported(map.is_exported)
                    .node(decl.id);
                self.declare_or_report(root, seed);
            }
        }
    }

    fn declare_import(&mut self, root: ScopeId, resolved: &ResolvedImport, dep_types: &DepTypes) {
        // Imported enum/alias types become visible to this module's
        // annotations; enums additionally get a value symbol so member
        // access (`Color.Red`) resolves.
        let mirrored = dep_types
            .get(&resolved.source_module)
            .and_then(|types| types.get(&resolved.original_name))
            .cloned();
        match resolved.kind {
            ExportKind::TypeAlias => {
                if let Some(ty) = mirrored {
                    self.types.define(&resolved.name, ty);
                }
                return;
            }
            ExportKind::Enum => {
                if let Some(ty) = &mirrored {
                    self.types.define(&resolved.name, ty.clone());
                }
            }
            _ => {}
        }
        let mut seed = SymbolSeed::new(&resolved.name, SymbolKind::ImportedSymbol, resolved.location)
            .imported_from(&resolved.source_module, &resolved.original_name)
            .constant(matches!(resolved.kind, ExportKind::Constant | ExportKind::Enum));
        if let Some(ty) = mirrored {
            seed = seed.ty(ty);
        }
        self.declare_or_report(root, seed);
    }

    fn declare_variable(&mut self, scope: ScopeId, var: &VariableDecl, location: SourceSpan, node: crate::ast::NodeId) {
        let kind = if var.is_const { SymbolKind::Constant } else { SymbolKind::Variable };
        let seed = SymbolSeed::new(&var.name, kind, location)
            .constant(var.is_const)
            .exported(var.is_exported)
            .storage(var.storage)
            .node(node);
        self.declare_or_report(scope, seed);
    }

    fn declare_enum(&mut self, root: ScopeId, decl: &EnumDecl, location: SourceSpan, node: crate::ast::NodeId) {
        // Member values default to previous + 1, starting at 0. Byte-range
        // validation happens in the type checker, which re-reads the decl.
        let mut members = IndexMap::new();
        let mut next = 0u32;
        for member in &decl.members {
            let value = member.value.unwrap_or(next);
            next = value.saturating_add(1);
            members.insert(member.name.clone(), value);
        }
        let ty = TypeInfo::Enum {
            name: decl.name.clone(),
            members,
        };
        self.types.define(&decl.name, ty.clone());

        let seed = SymbolSeed::new(&decl.name, SymbolKind::Constant, location)
            .ty(ty.clone())
            .constant(true)
            .exported(decl.is_exported)
            .node(node);
        self.declare_or_report(root, seed);

        for member in &decl.members {
            let seed = SymbolSeed::new(&member.name, SymbolKind::EnumMember, member.location)
                .ty(ty.clone())
                .constant(true);
            self.declare_or_report(root, seed);
        }
    }

    fn build_function_body(&mut self, decl: &Decl, function: &crate::ast::FunctionDecl, root: ScopeId) {
        let Some(symbol) = self.table.symbol_for_node(decl.id) else {
            // Declaration collided; the body is unreachable for analysis.
            return;
        };
        let body_scope = self
            .table
            .create_scope(ScopeKind::Function, root, Some(decl.id), Some(symbol));
        for param in &function.params {
            let seed = SymbolSeed::new(&param.name, SymbolKind::Parameter, param.location).node(param.id);
            self.declare_or_report(body_scope, seed);
        }
        self.walk_stmts(&function.body, body_scope);
    }

    fn walk_stmts(&mut self, stmts: &[Stmt], scope: ScopeId) {
        for stmt in stmts {
            self.walk_stmt(stmt, scope);
        }
    }

    fn walk_stmt(&mut self, stmt: &Stmt, scope: ScopeId) {
        match &stmt.kind {
            StmtKind::Let(var) => self.declare_variable(scope, var, stmt.location, stmt.id),
            StmtKind::Block(body) => {
                let inner = self.table.create_branch_scope(ScopeKind::Block, scope, stmt.id, 0);
                self.walk_stmts(body, inner);
            }
            StmtKind::If {
                then_branch,
                else_branch,
                ..
            } => {
                let then_scope = self.table.create_branch_scope(ScopeKind::Block, scope, stmt.id, 0);
                self.walk_stmts(then_branch, then_scope);
                if let Some(else_branch) = else_branch {
                    let else_scope = self.table.create_branch_scope(ScopeKind::Block, scope, stmt.id, 1);
                    self.walk_stmts(else_branch, else_scope);
                }
            }
            StmtKind::While { body, .. } | StmtKind::DoWhile { body, .. } | StmtKind::Loop { body } => {
                let loop_scope = self.table.create_branch_scope(ScopeKind::Loop, scope, stmt.id, 0);
                self.walk_stmts(body, loop_scope);
            }
            StmtKind::For { init, body, .. } => {
                // The induction variable declared in `init` belongs to the
                // loop scope, alongside the body.
                let loop_scope = self.table.create_branch_scope(ScopeKind::Loop, scope, stmt.id, 0);
                if let Some(init) = init {
                    self.walk_stmt(init, loop_scope);
                }
                self.walk_stmts(body, loop_scope);
            }
            StmtKind::Match { arms, default, .. } => {
                for (index, arm) in arms.iter().enumerate() {
                    let arm_scope =
                        self.table
                            .create_branch_scope(ScopeKind::Block, scope, stmt.id, u8::try_from(index).unwrap_or(u8::MAX));
                    self.walk_stmts(&arm.body, arm_scope);
                }
                if let Some(default) = default {
                    let default_scope = self.table.create_branch_scope(
                        ScopeKind::Block,
                        scope,
                        stmt.id,
                        u8::try_from(arms.len()).unwrap_or(u8::MAX),
                    );
                    self.walk_stmts(default, default_scope);
                }
            }
            StmtKind::Expr(_) | StmtKind::Return(_) | StmtKind::Break | StmtKind::Continue => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::build::AstBuilder;

    fn build(program: &Program) -> (SymbolTableBuild, DiagnosticBag) {
        let mut registry = ModuleRegistry::new();
        registry.register(program.clone());
        let mut resolver = ImportResolver::new();
        let mut diags = DiagnosticBag::new();
        let built = build_symbol_table(program, &mut resolver, &registry, &DepTypes::default(), &mut diags);
        (built, diags)
    }

    #[test]
    fn functions_are_visible_before_their_declaration() {
        let mut b = AstBuilder::new();
        let caller = {
            let call = b.call_named("later", vec![]);
            let body = vec![b.ret(Some(call))];
            b.function("early", vec![], Some(b.ty("byte")), body)
        };
        let callee = {
            let one = b.number(1);
            let body = vec![b.ret(Some(one))];
            b.function("later", vec![], Some(b.ty("byte")), body)
        };
        let program = b.program("main", vec![caller, callee]);
        let (built, diags) = build(&program);
        assert!(!diags.has_errors(), "{:?}", diags.iter().collect::<Vec<_>>());
        let root = built.table.root();
        assert!(built.table.lookup_local(root, "early").is_some());
        assert!(built.table.lookup_local(root, "later").is_some());
    }

    #[test]
    fn enum_members_become_constants_of_the_enum_type() {
        let mut b = AstBuilder::new();
        let decl = b.enum_decl("Color", &[("Red", None), ("Green", None), ("Blue", Some(14))]);
        let program = b.program("main", vec![decl]);
        let (built, diags) = build(&program);
        assert!(!diags.has_errors());

        let root = built.table.root();
        let member = built.table.lookup_local(root, "Green").unwrap();
        assert_eq!(built.table.symbol(member).kind, SymbolKind::EnumMember);
        let TypeInfo::Enum { members, .. } = built.types.lookup("Color").unwrap() else {
            panic!("Color should resolve to an enum type");
        };
        assert_eq!(members.get("Red"), Some(&0));
        assert_eq!(members.get("Green"), Some(&1));
        assert_eq!(members.get("Blue"), Some(&14));
    }

    #[test]
    fn duplicate_top_level_names_are_reported() {
        let mut b = AstBuilder::new();
        let first = b.global_var("x", crate::ast::StorageClass::Auto, Some(b.ty("byte")), None);
        let second = b.global_var("x", crate::ast::StorageClass::Auto, Some(b.ty("word")), None);
        let program = b.program("main", vec![first, second]);
        let (_, diags) = build(&program);
        assert_eq!(diags.with_code(DiagnosticCode::DuplicateDeclaration).count(), 1);
    }

    #[test]
    fn loop_scopes_nest_with_increasing_depth() {
        let mut b = AstBuilder::new();
        let decl = {
            let inner_body = {
                let one = b.number(1);
                vec![b.expr_stmt(one)]
            };
            let cond_inner = b.boolean(true);
            let inner = b.while_stmt(cond_inner, inner_body);
            let cond_outer = b.boolean(true);
            let outer = b.while_stmt(cond_outer, vec![inner]);
            b.function("f", vec![], None, vec![outer])
        };
        let program = b.program("main", vec![decl]);
        let (built, _) = build(&program);
        let depths: Vec<u32> = built
            .table
            .scopes()
            .filter(|s| s.kind == ScopeKind::Loop)
            .map(|s| s.loop_depth)
            .collect();
        assert_eq!(depths, vec![1, 2]);
    }

    #[test]
    fn intrinsics_are_seeded_into_every_module_scope() {
        let b = AstBuilder::new();
        let program = b.program("main", vec![]);
        let (built, _) = build(&program);
        let root = built.table.root();
        for name in ["peek", "poke", "sizeof", "length"] {
            let id = built.table.lookup_local(root, name).unwrap();
            assert_eq!(built.table.symbol(id).kind, SymbolKind::Intrinsic);
        }
    }
}
