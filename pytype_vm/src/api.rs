//! Entry points for whole-module analysis.

use crate::bytecode::{JsonCodeProvider, OrderedCode};
use crate::config::Options;
use crate::error::AnalysisResult;
use crate::errors::Diagnostic;
use crate::vm::VirtualMachine;
use pytype_vm_pytd::TypeDeclUnit;

/// Infer declarations for a module, together with the findings recorded
/// while analyzing it.
pub fn infer_types(
    code: OrderedCode,
    options: Options,
) -> AnalysisResult<(TypeDeclUnit, Vec<Diagnostic>)> {
    let mut vm = VirtualMachine::new(options);
    vm.run_module(code)?;
    vm.analyze_all_defs()?;
    let unit = vm.infer_stub()?;
    let diagnostics = vm.context_mut().errorlog.take();
    Ok((unit, diagnostics))
}

/// Analyze a module for findings only.
pub fn check_types(code: OrderedCode, options: Options) -> AnalysisResult<Vec<Diagnostic>> {
    let mut vm = VirtualMachine::new(options);
    vm.run_module(code)?;
    vm.analyze_all_defs()?;
    Ok(vm.context_mut().errorlog.take())
}

/// [`infer_types`] on a code object serialized as JSON.
pub fn infer_types_from_json(
    src: &str,
    options: Options,
) -> AnalysisResult<(TypeDeclUnit, Vec<Diagnostic>)> {
    let mut vm = VirtualMachine::from_source(&JsonCodeProvider, src, options)?;
    vm.analyze_all_defs()?;
    let unit = vm.infer_stub()?;
    let diagnostics = vm.context_mut().errorlog.take();
    Ok((unit, diagnostics))
}
