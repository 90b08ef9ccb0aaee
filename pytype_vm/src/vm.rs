//! The analysis scheduler.
//!
//! A [`VirtualMachine`] runs a module once, then walks every function and
//! class the run discovered, analyzing each with unknown arguments. Frames
//! produced along the way are walked in turn, so definitions nested at any
//! depth are reached. [`VirtualMachine::infer_stub`] runs the module again
//! in a fresh frame and exports its final locals as a declaration unit.

use crate::bytecode::{BytecodeProvider, OrderedCode};
use crate::calls;
use crate::config::Options;
use crate::context::Context;
use crate::convert::{to_pytd_def, to_pytd_type, ConvertError};
use crate::error::{AnalysisError, AnalysisResult};
use crate::frame::Frame;
use crate::heap::{ClassId, FrameId, Heap};
use crate::values::{bind_to, Value};
use indexmap::{IndexMap, IndexSet};
use pytype_vm_pytd::{wrap_type_decl_unit, Constant, Definition, TypeDeclUnit};
use std::collections::VecDeque;
use std::rc::Rc;
use tracing::{debug, debug_span, info};

/// Where a [`VirtualMachine`] is in its lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VmState {
    Idle,
    /// The module body has run.
    ModuleRun,
    DefAnalysis,
    /// Every discovered definition has been analyzed.
    Done,
}

#[derive(Debug)]
pub struct VirtualMachine {
    ctx: Context,
    state: VmState,
    code: Option<Rc<OrderedCode>>,
    module_frame: Option<FrameId>,
    initial_globals: IndexMap<String, Value>,
    analysis_order: Vec<FrameId>,
}

impl VirtualMachine {
    pub fn new(options: Options) -> Self {
        let ctx = Context::new(options);
        let initial_globals = ctx.get_module_globals();
        Self {
            ctx,
            state: VmState::Idle,
            code: None,
            module_frame: None,
            initial_globals,
            analysis_order: Vec::new(),
        }
    }

    /// A machine that has already run the module compiled from `src`.
    pub fn from_source(
        provider: &dyn BytecodeProvider,
        src: &str,
        options: Options,
    ) -> AnalysisResult<Self> {
        let mut vm = Self::new(options);
        let code = {
            let options = &vm.ctx.options;
            provider.compile(
                src,
                options.python_version,
                options.python_exe.as_deref(),
                options.input.as_deref(),
            )?
        };
        vm.run_module(code)?;
        Ok(vm)
    }

    pub fn context(&self) -> &Context {
        &self.ctx
    }

    pub fn context_mut(&mut self) -> &mut Context {
        &mut self.ctx
    }

    pub fn state(&self) -> VmState {
        self.state
    }

    pub fn module_frame(&self) -> Option<&Frame> {
        self.module_frame.map(|id| self.ctx.heap.frame(id))
    }

    /// Frames in the order [`Self::analyze_all_defs`] visited them, the
    /// module frame first.
    pub fn analysis_order(&self) -> &[FrameId] {
        &self.analysis_order
    }

    /// Run the module body. A machine runs exactly one module.
    pub fn run_module(&mut self, code: OrderedCode) -> AnalysisResult<FrameId> {
        if self.state != VmState::Idle {
            return Err(AnalysisError::InternalConsistency(format!(
                "module already run (state {:?})",
                self.state
            )));
        }
        let span = debug_span!("run_module", code = %code.qualname());
        let _enter = span.enter();

        let code = Rc::new(code);
        let mut frame = Frame::make_module_frame(&self.ctx, Rc::clone(&code));
        frame.run(&mut self.ctx)?;
        let id = self.ctx.heap.add_frame(frame);
        self.code = Some(code);
        self.module_frame = Some(id);
        self.state = VmState::ModuleRun;
        Ok(id)
    }

    /// Analyze every function and class reachable from the module.
    ///
    /// Functions are analyzed unbound. Each class is instantiated once and
    /// its functions analyzed bound to that instance. Frames are visited
    /// breadth-first.
    pub fn analyze_all_defs(&mut self) -> AnalysisResult<()> {
        let module = match (self.state, self.module_frame) {
            (VmState::ModuleRun, Some(module)) => module,
            (state, _) => {
                return Err(AnalysisError::InternalConsistency(format!(
                    "cannot analyze definitions in state {:?}",
                    state
                )))
            }
        };
        self.state = VmState::DefAnalysis;
        let span = debug_span!("analyze_all_defs");
        let _enter = span.enter();

        let mut queue = VecDeque::from([module]);
        let mut seen_classes: IndexSet<ClassId> = IndexSet::new();
        while let Some(frame_id) = queue.pop_front() {
            self.analysis_order.push(frame_id);
            let frame = self.ctx.heap.frame(frame_id);
            let functions = frame.functions().to_vec();
            let classes = collect_classes(&self.ctx.heap, frame.classes());

            for function in functions {
                let frames = calls::analyze_function(&mut self.ctx, &Value::Function(function))?;
                queue.extend(frames);
            }
            for cls in classes {
                if !seen_classes.insert(cls) {
                    continue;
                }
                debug!(class = %self.ctx.heap.class(cls).full_name(), "analyzing class");
                let instance = self.ctx.heap.instantiate(cls);
                for function in self.ctx.heap.class(cls).functions().to_vec() {
                    let method = bind_to(function, instance.clone());
                    let frames = calls::analyze_function(&mut self.ctx, &method)?;
                    queue.extend(frames);
                }
            }
        }
        info!(
            frames = self.analysis_order.len(),
            classes = seen_classes.len(),
            diagnostics = self.ctx.errorlog.len(),
            "analysis finished"
        );
        self.state = VmState::Done;
        Ok(())
    }

    /// Export the module's top-level names.
    ///
    /// The module body runs again in a fresh frame, independent of
    /// [`Self::analyze_all_defs`]. Names still bound to their initial module
    /// global are left out. Functions and classes become declarations;
    /// everything else, and any definition reached through a different
    /// name, becomes a constant.
    pub fn infer_stub(&mut self) -> AnalysisResult<TypeDeclUnit> {
        let code = self.code.clone().ok_or_else(|| {
            AnalysisError::InternalConsistency("no module has been run".to_string())
        })?;
        let span = debug_span!("infer_stub");
        let _enter = span.enter();

        let mut frame = Frame::make_module_frame(&self.ctx, code);
        frame.run(&mut self.ctx)?;
        let locals = frame.final_locals().clone();
        let mut defs = Vec::new();
        for (name, var) in &locals {
            let value = var.joined_value();
            if self.initial_globals.get(name) == Some(&value) {
                continue;
            }
            // Only a name bound to one definition on every path is declared
            // as that definition.
            if !var.is_atomic() {
                defs.push(constant_def(&self.ctx.heap, name, &value));
                continue;
            }
            let def = match to_pytd_def(&mut self.ctx, &value) {
                Ok(def) if def.name() == name.as_str() => def,
                Ok(_) | Err(ConvertError::NotImplemented(_)) => {
                    constant_def(&self.ctx.heap, name, &value)
                }
                Err(ConvertError::Analysis(err)) => return Err(err),
            };
            defs.push(def);
        }
        Ok(wrap_type_decl_unit(&self.ctx.options.module_name, defs)?)
    }
}

fn constant_def(heap: &Heap, name: &str, value: &Value) -> Definition {
    Definition::Constant(Constant::new(name, to_pytd_type(heap, value)))
}

/// `classes` and every class nested in them, outermost first.
fn collect_classes(heap: &Heap, classes: &[ClassId]) -> Vec<ClassId> {
    let mut found: IndexSet<ClassId> = IndexSet::new();
    let mut queue: VecDeque<ClassId> = classes.iter().copied().collect();
    while let Some(cls) = queue.pop_front() {
        if found.insert(cls) {
            queue.extend(heap.class(cls).classes().iter().copied());
        }
    }
    found.into_iter().collect()
}
