//! `.pyi` stub rendering.
//!
//! Names from `builtins` are printed bare, names from `typing` are printed
//! bare and collected into a `from typing import ...` header.

use crate::nodes::{
    Class, Constant, Function, Parameter, ParameterKind, Signature, Type, TypeDeclUnit, NONE_TYPE,
};
use std::collections::BTreeSet;
use std::fmt;

const INDENT: &str = "    ";

/// Render a unit as stub text.
pub fn print_unit(unit: &TypeDeclUnit) -> String {
    let mut printer = Printer::default();
    let body = printer.unit_body(unit);
    let mut out = String::new();
    if !printer.typing_imports.is_empty() {
        let names: Vec<&str> = printer.typing_imports.iter().map(String::as_str).collect();
        out.push_str(&format!("from typing import {}\n", names.join(", ")));
        if !body.is_empty() {
            out.push('\n');
        }
    }
    out.push_str(&body);
    out
}

/// Render a single type, without import bookkeeping.
pub fn print_type(ty: &Type) -> String {
    Printer::default().type_expr(ty)
}

impl fmt::Display for TypeDeclUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&print_unit(self))
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&print_type(self))
    }
}

#[derive(Default)]
struct Printer {
    typing_imports: BTreeSet<String>,
}

impl Printer {
    fn unit_body(&mut self, unit: &TypeDeclUnit) -> String {
        let mut sections: Vec<String> = Vec::new();

        if !unit.constants.is_empty() {
            let mut section = String::new();
            for constant in &unit.constants {
                section.push_str(&self.constant(constant, ""));
            }
            sections.push(section);
        }

        if !unit.functions.is_empty() {
            let mut section = String::new();
            for function in &unit.functions {
                section.push_str(&self.function(function, ""));
            }
            sections.push(section);
        }

        for class in &unit.classes {
            sections.push(self.class(class, ""));
        }

        sections.join("\n")
    }

    fn constant(&mut self, constant: &Constant, indent: &str) -> String {
        format!(
            "{}{}: {}\n",
            indent,
            constant.name,
            self.type_expr(&constant.ty)
        )
    }

    fn function(&mut self, function: &Function, indent: &str) -> String {
        let overloaded = function.signatures.len() > 1;
        if overloaded {
            self.typing_imports.insert("overload".to_string());
        }
        let mut out = String::new();
        for sig in &function.signatures {
            if overloaded {
                out.push_str(indent);
                out.push_str("@overload\n");
            }
            let params = self.params(sig);
            let ret = self.type_expr(&sig.return_type);
            out.push_str(&format!(
                "{}def {}({}) -> {}: ...\n",
                indent, function.name, params, ret
            ));
        }
        out
    }

    fn params(&mut self, sig: &Signature) -> String {
        let mut parts: Vec<String> = Vec::new();
        let mut in_posonly = false;
        let mut star_emitted = false;

        for param in &sig.params {
            if in_posonly && param.kind != ParameterKind::PositionalOnly {
                parts.push("/".to_string());
                in_posonly = false;
            }
            if param.kind == ParameterKind::PositionalOnly {
                in_posonly = true;
            }
            if param.kind == ParameterKind::KeywordOnly && !star_emitted {
                match &sig.starargs {
                    Some(starargs) => {
                        let rendered = self.param(starargs);
                        parts.push(format!("*{}", rendered));
                    }
                    None => parts.push("*".to_string()),
                }
                star_emitted = true;
            }
            let rendered = self.param(param);
            parts.push(rendered);
        }
        if in_posonly {
            parts.push("/".to_string());
        }
        if !star_emitted {
            if let Some(starargs) = &sig.starargs {
                let rendered = self.param(starargs);
                parts.push(format!("*{}", rendered));
            }
        }
        if let Some(starstarargs) = &sig.starstarargs {
            let rendered = self.param(starstarargs);
            parts.push(format!("**{}", rendered));
        }
        parts.join(", ")
    }

    fn param(&mut self, param: &Parameter) -> String {
        let annotated = param.ty != Type::Anything;
        let mut out = param.name.clone();
        if annotated {
            out.push_str(": ");
            out.push_str(&self.type_expr(&param.ty));
        }
        if param.optional {
            out.push_str(if annotated { " = ..." } else { "=..." });
        }
        out
    }

    fn class(&mut self, class: &Class, indent: &str) -> String {
        let mut header_parts: Vec<String> = Vec::new();
        for base in &class.bases {
            if *base == Type::builtin("object") {
                continue;
            }
            header_parts.push(self.type_expr(base));
        }
        for (name, value) in &class.keywords {
            header_parts.push(format!("{}={}", name, self.type_expr(value)));
        }
        let header = if header_parts.is_empty() {
            format!("{}class {}", indent, class.name)
        } else {
            format!("{}class {}({})", indent, class.name, header_parts.join(", "))
        };

        if class.constants.is_empty() && class.methods.is_empty() && class.classes.is_empty() {
            return format!("{}: ...\n", header);
        }

        let inner = format!("{}{}", indent, INDENT);
        let mut out = format!("{}:\n", header);
        for constant in &class.constants {
            out.push_str(&self.constant(constant, &inner));
        }
        for method in &class.methods {
            out.push_str(&self.function(method, &inner));
        }
        for nested in &class.classes {
            out.push_str(&self.class(nested, &inner));
        }
        out
    }

    fn class_name(&mut self, name: &str) -> String {
        if name == NONE_TYPE {
            return "None".to_string();
        }
        if let Some(short) = name.strip_prefix("builtins.") {
            return short.to_string();
        }
        if let Some(short) = name.strip_prefix("typing.") {
            self.typing_imports.insert(short.to_string());
            return short.to_string();
        }
        name.to_string()
    }

    fn type_expr(&mut self, ty: &Type) -> String {
        match ty {
            Type::Anything => {
                self.typing_imports.insert("Any".to_string());
                "Any".to_string()
            }
            Type::Nothing => {
                self.typing_imports.insert("NoReturn".to_string());
                "NoReturn".to_string()
            }
            Type::Class(name) => self.class_name(name),
            Type::Generic { base, parameters } => {
                let base = self.class_name(base);
                let params: Vec<String> = parameters.iter().map(|p| self.type_expr(p)).collect();
                format!("{}[{}]", base, params.join(", "))
            }
            Type::Callable(ret) => {
                self.typing_imports.insert("Callable".to_string());
                format!("Callable[..., {}]", self.type_expr(ret))
            }
            Type::Union(members) => {
                let parts: Vec<String> = members.iter().map(|m| self.type_expr(m)).collect();
                parts.join(" | ")
            }
        }
    }
}
