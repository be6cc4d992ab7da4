//! Type checker diagnostics through the public pipeline.

use blend65::{
    AstBuilder, BinaryOp, CompileOptions, CompileOutput, Compiler, DiagnosticCode, Program, SourceRegistry,
    TargetDescriptor, TypeInfo, UnaryOp,
};

fn compile(programs: Vec<Program>) -> CompileOutput {
    let mut compiler = Compiler::new(TargetDescriptor::c64(), CompileOptions::default());
    compiler.compile(programs, vec![], SourceRegistry::new())
}

fn compile_one(program: Program) -> CompileOutput {
    compile(vec![program])
}

#[test]
fn const_reassignment_is_an_error_at_the_assignment() {
    let mut b = AstBuilder::new();
    let f = {
        b.at(1, 25);
        let five = b.number(5);
        let decl = b.const_local("x", Some(b.ty("byte")), Some(five));
        b.at(1, 40);
        let x = b.ident("x");
        let ten = b.number(10);
        let assign = b.assign(x, ten);
        let stmt = b.expr_stmt(assign);
        b.function("f", vec![], None, vec![decl, stmt])
    };
    let output = compile_one(b.program("main", vec![f]));

    assert!(!output.success);
    let errors: Vec<_> = output.diagnostics_with(DiagnosticCode::ConstReassignment).collect();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].message.contains("const") || errors[0].message.contains("immutable"));
    assert_eq!(errors[0].location.start.column, 40);
}

#[test]
fn const_without_initializer_is_rejected() {
    let mut b = AstBuilder::new();
    let f = {
        let decl = b.const_local("x", Some(b.ty("byte")), None);
        b.function("f", vec![], None, vec![decl])
    };
    let output = compile_one(b.program("main", vec![f]));
    assert_eq!(output.diagnostics_with(DiagnosticCode::ConstRequiresInitializer).count(), 1);
}

#[test]
fn missing_annotation_and_initializer_is_rejected() {
    let mut b = AstBuilder::new();
    let f = {
        let decl = b.let_local("x", None, None);
        b.function("f", vec![], None, vec![decl])
    };
    let output = compile_one(b.program("main", vec![f]));
    assert_eq!(output.diagnostics_with(DiagnosticCode::MissingTypeAnnotation).count(), 1);
}

#[test]
fn byte_literal_overflow_against_declared_type() {
    let mut b = AstBuilder::new();
    let f = {
        let too_big = b.number(300);
        let decl = b.let_local("x", Some(b.ty("byte")), Some(too_big));
        b.function("f", vec![], None, vec![decl])
    };
    let output = compile_one(b.program("main", vec![f]));
    assert!(!output.success);
    assert_eq!(output.diagnostics_with(DiagnosticCode::NumericOverflow).count(), 1);
}

#[test]
fn integers_are_not_truthy() {
    let mut b = AstBuilder::new();
    let f = {
        let one = b.number(1);
        let body = vec![];
        let if_stmt = b.if_stmt(one, body, None);
        b.function("f", vec![], None, vec![if_stmt])
    };
    let output = compile_one(b.program("main", vec![f]));
    let mismatches: Vec<_> = output.diagnostics_with(DiagnosticCode::TypeMismatch).collect();
    assert_eq!(mismatches.len(), 1);
    assert!(mismatches[0].message.contains("truthy"));
}

#[test]
fn word_narrows_only_with_explicit_conversion() {
    let mut b = AstBuilder::new();
    let wide = b.global_var("wide", blend65::StorageClass::Auto, Some(b.ty("word")), None);
    let f = {
        let w = b.ident("wide");
        let decl = b.let_local("n", Some(b.ty("byte")), Some(w));
        b.function("f", vec![], None, vec![decl])
    };
    let output = compile_one(b.program("main", vec![wide, f]));
    assert_eq!(output.diagnostics_with(DiagnosticCode::TypeMismatch).count(), 1);
}

#[test]
fn widening_byte_to_word_is_silent() {
    let mut b = AstBuilder::new();
    let narrow = b.global_var("narrow", blend65::StorageClass::Auto, Some(b.ty("byte")), None);
    let f = {
        let n = b.ident("narrow");
        let decl = b.let_local("w", Some(b.ty("word")), Some(n));
        b.function("f", vec![], None, vec![decl])
    };
    let output = compile_one(b.program("main", vec![narrow, f]));
    assert!(output.success, "{:?}", output.diagnostics);
}

#[test]
fn argument_count_and_type_are_checked() {
    let mut b = AstBuilder::new();
    let callee = {
        let x = b.ident("x");
        let param = b.param("x", b.ty("byte"));
        let ret_ty = b.ty("byte");
        let ret_stmt = b.ret(Some(x));
        b.function("take_byte", vec![param], Some(ret_ty), vec![ret_stmt])
    };
    let caller = {
        let no_args = b.call_named("take_byte", vec![]);
        let first = b.expr_stmt(no_args);
        let truth = b.boolean(true);
        let wrong_type = b.call_named("take_byte", vec![truth]);
        let second = b.expr_stmt(wrong_type);
        b.function("caller", vec![], None, vec![first, second])
    };
    let output = compile_one(b.program("main", vec![callee, caller]));
    assert_eq!(output.diagnostics_with(DiagnosticCode::ArgumentCountMismatch).count(), 1);
    assert_eq!(output.diagnostics_with(DiagnosticCode::ArgumentTypeMismatch).count(), 1);
}

#[test]
fn calling_a_variable_is_not_callable() {
    let mut b = AstBuilder::new();
    let var = b.global_var("n", blend65::StorageClass::Auto, Some(b.ty("byte")), None);
    let f = {
        let call = b.call_named("n", vec![]);
        let stmt = b.expr_stmt(call);
        b.function("f", vec![], None, vec![stmt])
    };
    let output = compile_one(b.program("main", vec![var, f]));
    assert_eq!(output.diagnostics_with(DiagnosticCode::NotCallable).count(), 1);
}

#[test]
fn return_rules_follow_the_signature() {
    let mut b = AstBuilder::new();
    let void_returns_value = {
        let one = b.number(1);
        let ret = b.ret(Some(one));
        b.function("v", vec![], None, vec![ret])
    };
    let byte_returns_nothing = {
        let ret = b.ret(None);
        b.function("n", vec![], Some(b.ty("byte")), vec![ret])
    };
    let byte_returns_bool = {
        let truth = b.boolean(true);
        let ret = b.ret(Some(truth));
        b.function("w", vec![], Some(b.ty("byte")), vec![ret])
    };
    let output = compile_one(b.program(
        "main",
        vec![void_returns_value, byte_returns_nothing, byte_returns_bool],
    ));
    assert_eq!(output.diagnostics_with(DiagnosticCode::UnexpectedReturnValue).count(), 1);
    assert_eq!(output.diagnostics_with(DiagnosticCode::MissingReturnValue).count(), 1);
    assert_eq!(output.diagnostics_with(DiagnosticCode::ReturnTypeMismatch).count(), 1);
}

#[test]
fn break_outside_a_loop_is_reported() {
    let mut b = AstBuilder::new();
    let f = {
        let brk = b.brk();
        b.function("f", vec![], None, vec![brk])
    };
    let output = compile_one(b.program("main", vec![f]));
    assert_eq!(output.diagnostics_with(DiagnosticCode::ControlFlowOutsideLoop).count(), 1);
}

#[test]
fn assignment_target_must_be_an_lvalue() {
    let mut b = AstBuilder::new();
    let f = {
        let one = b.number(1);
        let two = b.number(2);
        let sum = b.binary(BinaryOp::Add, one, two);
        let three = b.number(3);
        let assign = b.assign(sum, three);
        let stmt = b.expr_stmt(assign);
        b.function("f", vec![], None, vec![stmt])
    };
    let output = compile_one(b.program("main", vec![f]));
    assert_eq!(output.diagnostics_with(DiagnosticCode::InvalidLValue).count(), 1);
}

#[test]
fn sizeof_and_length_fold_to_the_documented_values() {
    let mut b = AstBuilder::new();
    let table = b.global_var(
        "table",
        blend65::StorageClass::Auto,
        Some(b.ty_array(b.ty("word"), Some(10))),
        None,
    );
    let f = {
        let ty_ref = b.ident("word");
        let size_call = b.call_named("sizeof", vec![ty_ref]);
        let size_decl = b.let_local("s", Some(b.ty("word")), Some(size_call));
        let arr = b.ident("table");
        let len_call = b.call_named("length", vec![arr]);
        let len_decl = b.let_local("l", Some(b.ty("word")), Some(len_call));
        b.function("f", vec![], None, vec![size_decl, len_decl])
    };
    let output = compile_one(b.program("main", vec![table, f]));
    assert!(output.success, "{:?}", output.diagnostics);
    // Both fold to constants; the declarations typecheck as word.
    let module = &output.modules["main"];
    let root = module.table.root();
    let s = module.table.lookup_local(root, "table").unwrap();
    assert_eq!(
        module.table.symbol(s).ty,
        Some(TypeInfo::array(TypeInfo::Word, Some(10)))
    );
}

#[test]
fn enum_members_type_as_their_enum_and_reject_byte_mixing() {
    let mut b = AstBuilder::new();
    let colors = b.enum_decl("Color", &[("Red", None), ("Green", None)]);
    let f = {
        let color = b.ident("Color");
        let red = b.member(color, "Red");
        let decl = b.let_local("c", Some(b.ty("Color")), Some(red));
        // Enum values are not numbers: adding a byte is invalid.
        let c = b.ident("c");
        let one = b.number(1);
        let mix = b.binary(BinaryOp::Add, c, one);
        let stmt = b.expr_stmt(mix);
        b.function("f", vec![], None, vec![decl, stmt])
    };
    let output = compile_one(b.program("main", vec![colors, f]));
    assert_eq!(output.diagnostics_with(DiagnosticCode::InvalidOperator).count(), 1);
}

#[test]
fn address_of_requires_an_lvalue_and_yields_word() {
    let mut b = AstBuilder::new();
    let target = b.global_var("x", blend65::StorageClass::Auto, Some(b.ty("byte")), None);
    let f = {
        let x = b.ident("x");
        let addr = b.unary(UnaryOp::AddressOf, x);
        let good = b.let_local("p", Some(b.ty("word")), Some(addr));
        let one = b.number(1);
        let two = b.number(2);
        let sum = b.binary(BinaryOp::Add, one, two);
        let bad_addr = b.unary(UnaryOp::AddressOf, sum);
        let bad = b.let_local("q", Some(b.ty("word")), Some(bad_addr));
        b.function("f", vec![], None, vec![good, bad])
    };
    let output = compile_one(b.program("main", vec![target, f]));
    assert_eq!(output.diagnostics_with(DiagnosticCode::InvalidLValue).count(), 1);
}
