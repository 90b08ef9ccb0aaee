//! Shared helpers for integration tests
// Not every test target uses every helper.
#![allow(dead_code)]

use pytype_vm::bytecode::{CodeBuilder, ConstValue, OrderedCode};
use pytype_vm::errors::Diagnostic;
use pytype_vm::{check_types, infer_types, Options, VirtualMachine};
use pytype_vm_pytd::{print_unit, TypeDeclUnit};

/// `def name(params): return <const>`
pub fn returning(name: &str, params: &[&str], value: ConstValue) -> OrderedCode {
    CodeBuilder::function(name)
        .params(params)
        .load_const(value)
        .op(pytype_vm::bytecode::Opcode::ReturnValue)
        .build()
}

/// Infer a module, panicking on fatal errors.
pub fn infer(code: OrderedCode) -> (TypeDeclUnit, Vec<Diagnostic>) {
    infer_types(code, Options::default()).unwrap_or_else(|e| panic!("analysis failed: {}", e))
}

/// The printed stub of a module.
pub fn stub(code: OrderedCode) -> String {
    let (unit, _) = infer(code);
    print_unit(&unit)
}

/// Findings for a module, panicking on fatal errors.
pub fn check(code: OrderedCode) -> Vec<Diagnostic> {
    check_types(code, Options::default()).unwrap_or_else(|e| panic!("analysis failed: {}", e))
}

/// A machine that has run `code` and analyzed its definitions.
pub fn analyzed(code: OrderedCode) -> VirtualMachine {
    let mut vm = VirtualMachine::new(Options::default());
    vm.run_module(code)
        .unwrap_or_else(|e| panic!("module run failed: {}", e));
    vm.analyze_all_defs()
        .unwrap_or_else(|e| panic!("definition analysis failed: {}", e));
    vm
}

/// Short identifiers of the findings, in order.
pub fn names(diagnostics: &[Diagnostic]) -> Vec<&'static str> {
    diagnostics.iter().map(Diagnostic::name).collect()
}
