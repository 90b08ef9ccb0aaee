use super::base::Value;
use super::containers::{FunctionArgDict, FunctionArgTuple};
use crate::bytecode::OrderedCode;
use crate::context::Context;
use crate::error::AnalysisResult;
use crate::flow::Variable;
use crate::frame::FrameRef;
use indexmap::IndexMap;
use std::fmt;
use std::rc::Rc;

/// Normalized arguments of one call.
#[derive(Clone, Debug, Default)]
pub struct Args {
    pub posargs: Vec<Variable>,
    pub kwargs: IndexMap<String, Variable>,
    /// Positional arguments of unknown count.
    pub starargs: Option<Variable>,
    /// Keyword arguments with unknown names.
    pub starstarargs: Option<Variable>,
    /// The frame the call was made from.
    pub frame: Option<FrameRef>,
}

impl Args {
    pub fn positional(posargs: Vec<Variable>) -> Self {
        Self {
            posargs,
            ..Self::default()
        }
    }
}

/// Why a call does not fit a signature.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ArgError {
    TooManyPositional { expected: usize, got: usize },
    MissingParameter(String),
    UnexpectedKeyword(String),
    DuplicateKeyword(String),
}

impl fmt::Display for ArgError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgError::TooManyPositional { expected, got } => write!(
                f,
                "expected {} positional argument(s), got {}",
                expected, got
            ),
            ArgError::MissingParameter(name) => write!(f, "missing parameter '{}'", name),
            ArgError::UnexpectedKeyword(name) => write!(f, "unexpected keyword argument '{}'", name),
            ArgError::DuplicateKeyword(name) => {
                write!(f, "multiple values for argument '{}'", name)
            }
        }
    }
}

/// Parameter bindings produced by [`Signature::map_args`].
#[derive(Clone, Debug, Default)]
pub struct MappedArgs {
    pub argdict: IndexMap<String, Variable>,
    pub errors: Vec<ArgError>,
}

/// Parameter layout of a function.
#[derive(Clone, Debug, PartialEq)]
pub struct Signature {
    pub name: String,
    /// Positional parameters, positional-only ones first.
    pub param_names: Vec<String>,
    pub posonly_count: usize,
    pub kwonly_params: Vec<String>,
    pub varargs: Option<String>,
    pub kwargs: Option<String>,
    pub defaults: IndexMap<String, Variable>,
}

impl Signature {
    /// Signature of a compiled function. `defaults` align with the last
    /// positional parameters.
    pub fn from_code(
        code: &OrderedCode,
        defaults: Vec<Variable>,
        kw_defaults: IndexMap<String, Variable>,
    ) -> Self {
        let param_names = code.positional_params().to_vec();
        let mut all_defaults = IndexMap::new();
        let first_default = param_names.len().saturating_sub(defaults.len());
        for (name, default) in param_names[first_default..].iter().zip(defaults) {
            all_defaults.insert(name.clone(), default);
        }
        all_defaults.extend(kw_defaults);
        Self {
            name: code.name.clone(),
            posonly_count: code.posonlyargcount.min(param_names.len()),
            param_names,
            kwonly_params: code.kwonly_params().to_vec(),
            varargs: code.varargs_name().map(str::to_string),
            kwargs: code.varkeywords_name().map(str::to_string),
            defaults: all_defaults,
        }
    }

    /// Signature with plain positional parameters.
    pub fn from_params(name: &str, params: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            param_names: params.iter().map(|p| p.to_string()).collect(),
            posonly_count: 0,
            kwonly_params: Vec::new(),
            varargs: None,
            kwargs: None,
            defaults: IndexMap::new(),
        }
    }

    /// Every named parameter, in declaration order.
    pub fn named_params(&self) -> impl Iterator<Item = &String> {
        self.param_names.iter().chain(self.kwonly_params.iter())
    }

    /// Bind call arguments to parameters.
    ///
    /// Unfillable parameters are bound to `Any` and reported in
    /// [`MappedArgs::errors`]. Unknown-count `*args` or `**kwargs` fill every
    /// parameter they could reach with `Any`.
    pub fn map_args(&self, args: &Args) -> MappedArgs {
        let mut bound: IndexMap<String, Variable> = IndexMap::new();
        let mut errors = Vec::new();

        for (name, var) in self.param_names.iter().zip(&args.posargs) {
            bound.insert(name.clone(), var.clone());
        }
        let mut extra_positional = None;
        if args.posargs.len() > self.param_names.len() {
            let extra = args.posargs[self.param_names.len()..].to_vec();
            if self.varargs.is_some() {
                extra_positional = Some(extra);
            } else {
                errors.push(ArgError::TooManyPositional {
                    expected: self.param_names.len(),
                    got: args.posargs.len(),
                });
            }
        }

        let mut extra_keywords = IndexMap::new();
        for (name, var) in &args.kwargs {
            let keyword_param = match self.param_names.iter().position(|p| p == name) {
                Some(index) => index >= self.posonly_count,
                None => self.kwonly_params.contains(name),
            };
            if keyword_param {
                if bound.contains_key(name) {
                    errors.push(ArgError::DuplicateKeyword(name.clone()));
                } else {
                    bound.insert(name.clone(), var.clone());
                }
            } else if self.kwargs.is_some() {
                extra_keywords.insert(name.clone(), var.clone());
            } else {
                errors.push(ArgError::UnexpectedKeyword(name.clone()));
            }
        }

        if args.starargs.is_some() {
            for name in &self.param_names {
                bound
                    .entry(name.clone())
                    .or_insert_with(|| Value::Any.to_variable());
            }
        }
        if args.starstarargs.is_some() {
            let keyword_reachable = self.param_names[self.posonly_count..]
                .iter()
                .chain(&self.kwonly_params);
            for name in keyword_reachable {
                bound
                    .entry(name.clone())
                    .or_insert_with(|| Value::Any.to_variable());
            }
        }

        let mut argdict = IndexMap::new();
        for name in self.named_params() {
            let var = match bound.shift_remove(name) {
                Some(var) => var,
                None => match self.defaults.get(name) {
                    Some(default) => default.clone(),
                    None => {
                        errors.push(ArgError::MissingParameter(name.clone()));
                        Value::Any.to_variable()
                    }
                },
            };
            argdict.insert(name.clone(), var);
        }

        if let Some(varargs) = &self.varargs {
            let value = match (extra_positional, &args.starargs) {
                (_, Some(_)) => Value::FunctionArgTuple(FunctionArgTuple::indefinite()),
                (Some(extra), None) => Value::FunctionArgTuple(FunctionArgTuple::new(extra)),
                (None, None) => Value::FunctionArgTuple(FunctionArgTuple::new(Vec::new())),
            };
            argdict.insert(varargs.clone(), value.to_variable());
        }
        if let Some(kwargs) = &self.kwargs {
            let value = if args.starstarargs.is_some() {
                Value::FunctionArgDict(FunctionArgDict::indefinite())
            } else {
                Value::FunctionArgDict(FunctionArgDict::new(extra_keywords))
            };
            argdict.insert(kwargs.clone(), value.to_variable());
        }

        MappedArgs { argdict, errors }
    }

    /// Placeholder arguments for analyzing the body on its own.
    ///
    /// Every parameter is `Any` except the first, which is `receiver` when
    /// given. Variadic parameters receive indefinite containers.
    pub fn make_fake_args(&self, receiver: Option<Value>) -> IndexMap<String, Variable> {
        let mut argdict = IndexMap::new();
        let mut receiver = receiver;
        for name in self.named_params() {
            let value = receiver.take().unwrap_or(Value::Any);
            argdict.insert(name.clone(), value.to_variable());
        }
        if let Some(varargs) = &self.varargs {
            argdict.insert(
                varargs.clone(),
                Value::FunctionArgTuple(FunctionArgTuple::indefinite()).to_variable(),
            );
        }
        if let Some(kwargs) = &self.kwargs {
            argdict.insert(
                kwargs.clone(),
                Value::FunctionArgDict(FunctionArgDict::indefinite()).to_variable(),
            );
        }
        argdict
    }
}

/// A function compiled from analyzed code.
#[derive(Clone, Debug)]
pub struct InterpreterFunction {
    pub name: String,
    pub qualname: String,
    pub code: Rc<OrderedCode>,
    pub signature: Signature,
    /// Scopes visible where the function was created.
    pub enclosing: FrameRef,
}

/// Hand-written behavior of a declared function.
pub type OverlayCall = fn(&mut Context, &IndexMap<String, Variable>) -> AnalysisResult<Variable>;

/// Declared functions whose calls need more than a canned return value.
#[derive(Clone, Copy, Debug)]
pub enum SpecialBehavior {
    /// `builtins.__build_class__`
    BuildClass,
    /// `builtins.type.__new__`
    TypeNew,
    Overlay(OverlayCall),
}

/// A function declared by the loader.
#[derive(Clone, Debug)]
pub struct PytdFunction {
    pub module: String,
    pub name: String,
    pub signature: Signature,
    /// Value returned by calls without special behavior.
    pub return_value: Value,
    pub special: Option<SpecialBehavior>,
}

impl PytdFunction {
    pub fn new(module: &str, name: &str, params: &[&str], return_value: Value) -> Self {
        Self {
            module: module.to_string(),
            name: name.to_string(),
            signature: Signature::from_params(name, params),
            return_value,
            special: None,
        }
    }

    pub fn with_special(mut self, special: SpecialBehavior) -> Self {
        self.special = Some(special);
        self
    }
}

/// A function stored in the heap.
#[derive(Clone, Debug)]
pub enum FunctionData {
    Interpreter(InterpreterFunction),
    Pytd(PytdFunction),
}

impl FunctionData {
    pub fn name(&self) -> &str {
        match self {
            FunctionData::Interpreter(f) => &f.name,
            FunctionData::Pytd(f) => &f.name,
        }
    }

    /// Qualified name for interpreter functions, `module.name` for declared
    /// ones.
    pub fn full_name(&self) -> String {
        match self {
            FunctionData::Interpreter(f) => f.qualname.clone(),
            FunctionData::Pytd(f) => format!("{}.{}", f.module, f.name),
        }
    }

    pub fn signature(&self) -> &Signature {
        match self {
            FunctionData::Interpreter(f) => &f.signature,
            FunctionData::Pytd(f) => &f.signature,
        }
    }

    pub fn as_interpreter(&self) -> Option<&InterpreterFunction> {
        match self {
            FunctionData::Interpreter(f) => Some(f),
            FunctionData::Pytd(_) => None,
        }
    }

    /// Whether this is `type.__new__`, the class hook every metaclass
    /// inherits.
    pub fn is_default_class_hook(&self) -> bool {
        matches!(self, FunctionData::Pytd(f) if f.module == "builtins.type" && f.name == "__new__")
    }

    pub fn special(&self) -> Option<SpecialBehavior> {
        match self {
            FunctionData::Interpreter(_) => None,
            FunctionData::Pytd(f) => f.special,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::CodeBuilder;
    use pretty_assertions::assert_eq;

    fn var(i: i64) -> Variable {
        Value::constant(i).to_variable()
    }

    fn signature(builder: CodeBuilder) -> Signature {
        Signature::from_code(&builder.return_none().build(), vec![], IndexMap::new())
    }

    #[test]
    fn test_map_positional_and_keyword() {
        let sig = signature(CodeBuilder::function("f").params(&["a", "b", "c"]));
        let mut args = Args::positional(vec![var(1), var(2)]);
        args.kwargs.insert("c".into(), var(3));
        let mapped = sig.map_args(&args);
        assert!(mapped.errors.is_empty());
        let names: Vec<&str> = mapped.argdict.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
        assert_eq!(mapped.argdict["c"], var(3));
    }

    #[test]
    fn test_map_extra_positional_into_varargs() {
        let sig = signature(CodeBuilder::function("f").params(&["a"]).varargs("rest"));
        let mapped = sig.map_args(&Args::positional(vec![var(1), var(2), var(3)]));
        assert!(mapped.errors.is_empty());
        let rest = mapped.argdict["rest"].get_atomic_value().unwrap();
        assert_eq!(
            *rest,
            Value::FunctionArgTuple(FunctionArgTuple::new(vec![var(2), var(3)]))
        );
    }

    #[test]
    fn test_map_extra_keywords_into_kwargs() {
        let sig = signature(CodeBuilder::function("f").params(&["a"]).varkeywords("kw"));
        let mut args = Args::positional(vec![var(1)]);
        args.kwargs.insert("z".into(), var(9));
        let mapped = sig.map_args(&args);
        assert!(mapped.errors.is_empty());
        let Value::FunctionArgDict(kw) = mapped.argdict["kw"].get_atomic_value().unwrap() else {
            panic!("expected a keyword dict");
        };
        assert_eq!(kw.entries().unwrap()["z"], var(9));
    }

    #[test]
    fn test_map_reports_arity_problems() {
        let sig = signature(CodeBuilder::function("f").params(&["a", "b"]));
        let mapped = sig.map_args(&Args::positional(vec![var(1)]));
        assert_eq!(mapped.errors, vec![ArgError::MissingParameter("b".into())]);
        assert_eq!(mapped.argdict["b"], Value::Any.to_variable());

        let mapped = sig.map_args(&Args::positional(vec![var(1), var(2), var(3)]));
        assert_eq!(
            mapped.errors,
            vec![ArgError::TooManyPositional {
                expected: 2,
                got: 3
            }]
        );
    }

    #[test]
    fn test_map_positional_only_rejects_keyword() {
        let sig = signature(CodeBuilder::function("f").params(&["a"]).posonly(1));
        let mut args = Args::default();
        args.kwargs.insert("a".into(), var(1));
        let mapped = sig.map_args(&args);
        assert_eq!(
            mapped.errors,
            vec![
                ArgError::UnexpectedKeyword("a".into()),
                ArgError::MissingParameter("a".into())
            ]
        );
    }

    #[test]
    fn test_map_uses_defaults() {
        let code = CodeBuilder::function("f")
            .params(&["a", "b"])
            .kwonly(&["c"])
            .return_none()
            .build();
        let mut kw_defaults = IndexMap::new();
        kw_defaults.insert("c".to_string(), var(30));
        let sig = Signature::from_code(&code, vec![var(20)], kw_defaults);
        let mapped = sig.map_args(&Args::positional(vec![var(1)]));
        assert!(mapped.errors.is_empty());
        assert_eq!(mapped.argdict["b"], var(20));
        assert_eq!(mapped.argdict["c"], var(30));
    }

    #[test]
    fn test_map_indefinite_starargs_fill_with_any() {
        let sig = signature(CodeBuilder::function("f").params(&["a", "b"]).varargs("rest"));
        let args = Args {
            posargs: vec![var(1)],
            starargs: Some(Value::Any.to_variable()),
            ..Args::default()
        };
        let mapped = sig.map_args(&args);
        assert!(mapped.errors.is_empty());
        assert_eq!(mapped.argdict["a"], var(1));
        assert_eq!(mapped.argdict["b"], Value::Any.to_variable());
        assert_eq!(
            mapped.argdict["rest"],
            Value::FunctionArgTuple(FunctionArgTuple::indefinite()).to_variable()
        );
    }

    #[test]
    fn test_fake_args_bind_receiver_first() {
        let sig = signature(
            CodeBuilder::function("m")
                .params(&["self", "x"])
                .varargs("args")
                .varkeywords("kw"),
        );
        let receiver = Value::constant("me");
        let fake = sig.make_fake_args(Some(receiver.clone()));
        assert_eq!(fake["self"], receiver.to_variable());
        assert_eq!(fake["x"], Value::Any.to_variable());
        assert_eq!(
            fake["args"],
            Value::FunctionArgTuple(FunctionArgTuple::indefinite()).to_variable()
        );
        assert_eq!(
            fake["kw"],
            Value::FunctionArgDict(FunctionArgDict::indefinite()).to_variable()
        );
    }
}
