//! Scope and symbol behavior observed through the full pipeline.

use blend65::{
    AstBuilder, CompileOptions, CompileOutput, Compiler, DiagnosticCode, Program, ScopeKind, SourceRegistry,
    SymbolKind, TargetDescriptor, TypeInfo,
};

fn compile(programs: Vec<Program>) -> CompileOutput {
    let mut compiler = Compiler::new(TargetDescriptor::c64(), CompileOptions::default());
    compiler.compile(programs, vec![], SourceRegistry::new())
}

#[test]
fn same_scope_redeclaration_fails_but_shadowing_succeeds() {
    let mut b = AstBuilder::new();
    let f = {
        let one = b.number(1);
        let outer = b.let_local("x", Some(b.ty("byte")), Some(one));
        let two = b.number(2);
        let inner = b.let_local("x", Some(b.ty("word")), Some(two));
        let block = b.block(vec![inner]);
        b.function("f", vec![], None, vec![outer, block])
    };
    let g = {
        let one = b.number(1);
        let first = b.let_local("y", Some(b.ty("byte")), Some(one));
        let two = b.number(2);
        let second = b.let_local("y", Some(b.ty("byte")), Some(two));
        b.function("g", vec![], None, vec![first, second])
    };
    let output = compile(vec![b.program("main", vec![f, g])]);
    // Only g's same-scope redeclaration is an error.
    let duplicates: Vec<_> = output.diagnostics_with(DiagnosticCode::DuplicateDeclaration).collect();
    assert_eq!(duplicates.len(), 1);
    assert!(duplicates[0].message.contains('y'));
}

#[test]
fn parameters_may_not_collide_with_each_other() {
    let mut b = AstBuilder::new();
    let f = {
        let p1 = b.param("n", b.ty("byte"));
        let p2 = b.param("n", b.ty("byte"));
        b.function("f", vec![p1, p2], None, vec![])
    };
    let output = compile(vec![b.program("main", vec![f])]);
    assert_eq!(output.diagnostics_with(DiagnosticCode::DuplicateDeclaration).count(), 1);
}

#[test]
fn locals_shadow_globals_with_their_own_type() {
    let mut b = AstBuilder::new();
    let global = b.global_var("value", blend65::StorageClass::Auto, Some(b.ty("word")), None);
    let f = {
        let seven = b.number(7);
        let local = b.let_local("value", Some(b.ty("byte")), Some(seven));
        // Assigning a byte literal to the shadowing local is fine even
        // though the global is a word.
        let v = b.ident("value");
        let nine = b.number(9);
        let assign = b.assign(v, nine);
        let stmt = b.expr_stmt(assign);
        b.function("f", vec![], None, vec![local, stmt])
    };
    let output = compile(vec![b.program("main", vec![global, f])]);
    assert!(output.success, "{:?}", output.diagnostics);

    let module = &output.modules["main"];
    // The innermost binding won: a local symbol of byte type exists.
    let local = module
        .table
        .symbols()
        .find(|s| s.name == "value" && s.kind == SymbolKind::Variable && s.scope != module.table.root())
        .expect("shadowing local");
    assert_eq!(local.ty, Some(TypeInfo::Byte));
}

#[test]
fn loop_scopes_report_inside_loop_and_function_backlink() {
    let mut b = AstBuilder::new();
    let f = {
        let cond = b.boolean(true);
        let zero = b.number(0);
        let decl = b.let_local("i", Some(b.ty("byte")), Some(zero));
        let body = vec![decl];
        let while_stmt = b.while_stmt(cond, body);
        b.function("f", vec![], None, vec![while_stmt])
    };
    let output = compile(vec![b.program("main", vec![f])]);
    let table = &output.modules["main"].table;
    let loop_scope = table.scopes().find(|s| s.kind == ScopeKind::Loop).unwrap();
    assert!(table.is_inside_loop(loop_scope.id));
    assert!(loop_scope.function.is_some());
    // The loop body's local lives in the loop scope, in declaration order.
    let names: Vec<_> = loop_scope.names().collect();
    assert_eq!(names, vec!["i"]);
}

#[test]
fn unknown_annotation_types_are_reported_and_recovered() {
    let mut b = AstBuilder::new();
    let f = {
        let decl = b.let_local("s", Some(b.ty("Sprite")), None);
        b.function("f", vec![], None, vec![decl])
    };
    let output = compile(vec![b.program("main", vec![f])]);
    assert_eq!(output.diagnostics_with(DiagnosticCode::UnknownType).count(), 1);
}

#[test]
fn type_aliases_resolve_through_annotations() {
    let mut b = AstBuilder::new();
    let alias = b.type_alias("Sprite", b.ty_array(b.ty("byte"), Some(64)));
    let var = b.global_var("player", blend65::StorageClass::Auto, Some(b.ty("Sprite")), None);
    let output = compile(vec![b.program("main", vec![alias, var])]);
    assert!(output.success, "{:?}", output.diagnostics);
    let module = &output.modules["main"];
    let root = module.table.root();
    let player = module.table.lookup_local(root, "player").unwrap();
    assert_eq!(
        module.table.symbol(player).ty,
        Some(TypeInfo::array(TypeInfo::Byte, Some(64)))
    );
}

#[test]
fn unresolved_names_suggest_imports_when_another_module_exports_them() {
    let mut a = AstBuilder::new();
    let exported = {
        let one = a.number(1);
        let ret_ty = a.ty("byte");
        let ret_stmt = a.ret(Some(one));
        let decl = a.function("helper", vec![], Some(ret_ty), vec![ret_stmt]);
        AstBuilder::export(decl)
    };
    let module_a = a.program("A", vec![exported]);

    let mut b = AstBuilder::new();
    let f = {
        // No import: the reference does not resolve.
        let call = b.call_named("helper", vec![]);
        let ret_ty = b.ty("byte");
        let ret_stmt = b.ret(Some(call));
        b.function("main", vec![], Some(ret_ty), vec![ret_stmt])
    };
    let output = compile(vec![module_a, b.program("B", vec![f])]);
    assert!(!output.success);
    let missing: Vec<_> = output.diagnostics_with(DiagnosticCode::SymbolNotFound).collect();
    assert_eq!(missing.len(), 1);
    let suggestion = missing[0].suggestion.as_deref().unwrap_or_default();
    assert!(suggestion.contains("import"), "{suggestion}");
}
