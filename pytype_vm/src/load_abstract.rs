//! The builtins module.
//!
//! Declares the classes and functions every module can see. Declared
//! functions return a canned value unless an overlay provides behavior.

use crate::heap::{ClassId, Heap};
use crate::overlays;
use crate::values::{ClassData, Constant, FunctionData, PytdFunction, SpecialBehavior, Value};
use indexmap::IndexMap;
use tracing::debug;

const BUILTINS: &str = "builtins";

/// What a declared function returns.
#[derive(Clone, Copy)]
enum Returns {
    Any,
    None,
    Instance(&'static str),
}

const CLASSES: &[&str] = &[
    "type",
    "int",
    "float",
    "complex",
    "str",
    "bytes",
    "bool",
    "NoneType",
    "ellipsis",
    "tuple",
    "list",
    "dict",
    "set",
    "function",
    "module",
    "staticmethod",
    "classmethod",
    "property",
    "BaseException",
    "Exception",
];

const FUNCTIONS: &[(&str, &[&str], Returns)] = &[
    ("len", &["obj"], Returns::Instance("int")),
    ("print", &[], Returns::None),
    ("isinstance", &["obj", "class_or_tuple"], Returns::Instance("bool")),
    ("issubclass", &["cls", "class_or_tuple"], Returns::Instance("bool")),
    ("repr", &["obj"], Returns::Instance("str")),
    ("hash", &["obj"], Returns::Instance("int")),
    ("id", &["obj"], Returns::Instance("int")),
    ("callable", &["obj"], Returns::Instance("bool")),
    ("getattr", &[], Returns::Any),
    ("setattr", &["obj", "name", "value"], Returns::None),
    ("super", &[], Returns::Any),
    ("assert_type", &["val", "typ"], Returns::None),
    ("reveal_type", &["obj"], Returns::Any),
];

/// Handles to the builtins module's contents.
#[derive(Debug, Clone)]
pub struct Builtins {
    pub members: IndexMap<String, Value>,
    pub object: ClassId,
    pub type_: ClassId,
    pub int: ClassId,
    pub float: ClassId,
    pub complex: ClassId,
    pub str_: ClassId,
    pub bytes: ClassId,
    pub bool_: ClassId,
    pub none_type: ClassId,
    pub ellipsis: ClassId,
    pub tuple: ClassId,
    pub list: ClassId,
    pub dict: ClassId,
    pub function: ClassId,
}

impl Builtins {
    pub fn lookup(&self, name: &str) -> Option<&Value> {
        self.members.get(name)
    }

    /// The builtin class of a literal.
    pub fn class_of_constant(&self, constant: &Constant) -> ClassId {
        match constant {
            Constant::None => self.none_type,
            Constant::Bool(_) => self.bool_,
            Constant::Int(_) => self.int,
            Constant::Float(_) => self.float,
            Constant::Str(_) => self.str_,
            Constant::Bytes(_) => self.bytes,
            Constant::Ellipsis => self.ellipsis,
            Constant::Tuple(_) => self.tuple,
            Constant::Code(_) => self.object,
        }
    }

    /// Globals a module starts with.
    pub fn module_globals(&self) -> IndexMap<String, Value> {
        let mut globals = IndexMap::new();
        globals.insert("__name__".to_string(), Value::FrozenInstance(self.str_));
        globals.insert("__file__".to_string(), Value::FrozenInstance(self.str_));
        globals.insert("__doc__".to_string(), Value::none());
        globals
    }
}

/// Populate `heap` with the builtins module.
pub fn load_builtins(heap: &mut Heap) -> Builtins {
    let mut members = IndexMap::new();
    let object = heap.add_class(ClassData::simple(BUILTINS, "object", vec![]));
    members.insert("object".to_string(), Value::Class(object));

    let mut classes: IndexMap<&str, ClassId> = IndexMap::new();
    classes.insert("object", object);
    for &name in CLASSES {
        let bases = match name {
            "bool" => vec![classes["int"]],
            "Exception" => vec![classes["BaseException"]],
            _ => vec![object],
        };
        let id = heap.add_class(ClassData::simple(BUILTINS, name, bases));
        classes.insert(name, id);
        members.insert(name.to_string(), Value::Class(id));
    }

    let object_init = heap.add_function(FunctionData::Pytd(PytdFunction::new(
        BUILTINS,
        "object.__init__",
        &["self"],
        Value::none(),
    )));
    heap.class_mut(object)
        .members
        .insert("__init__".to_string(), Value::Function(object_init));

    let type_new = heap.add_function(FunctionData::Pytd(
        PytdFunction::new(
            "builtins.type",
            "__new__",
            &["mcs", "name", "bases", "namespace"],
            Value::Any,
        )
        .with_special(SpecialBehavior::TypeNew),
    ));
    heap.class_mut(classes["type"])
        .members
        .insert("__new__".to_string(), Value::Function(type_new));

    let build_class = heap.add_function(FunctionData::Pytd(
        PytdFunction::new(BUILTINS, "__build_class__", &["func", "name"], Value::Any)
            .with_special(SpecialBehavior::BuildClass),
    ));
    members.insert("__build_class__".to_string(), Value::Function(build_class));

    for &(name, params, returns) in FUNCTIONS {
        let function = match overlays::lookup(BUILTINS, name) {
            Some(builder) => builder(BUILTINS, name),
            None => {
                let return_value = match returns {
                    Returns::Any => Value::Any,
                    Returns::None => Value::none(),
                    Returns::Instance(class) => Value::FrozenInstance(classes[class]),
                };
                PytdFunction::new(BUILTINS, name, params, return_value)
            }
        };
        let id = heap.add_function(FunctionData::Pytd(function));
        members.insert(name.to_string(), Value::Function(id));
    }

    members.insert("None".to_string(), Value::none());
    members.insert("True".to_string(), Value::constant(true));
    members.insert("False".to_string(), Value::constant(false));
    members.insert("Ellipsis".to_string(), Value::Constant(Constant::Ellipsis));

    debug!(
        classes = heap.class_count(),
        functions = heap.function_count(),
        "loaded builtins"
    );

    Builtins {
        members,
        object,
        type_: classes["type"],
        int: classes["int"],
        float: classes["float"],
        complex: classes["complex"],
        str_: classes["str"],
        bytes: classes["bytes"],
        bool_: classes["bool"],
        none_type: classes["NoneType"],
        ellipsis: classes["ellipsis"],
        tuple: classes["tuple"],
        list: classes["list"],
        dict: classes["dict"],
        function: classes["function"],
    }
}
