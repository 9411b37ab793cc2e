//! Source-text emission from the reconstructed AST.
//!
//! The printer walks the tree recursively; embedded code-object constants
//! re-enter the builder, so nesting depth equals lexical nesting. All
//! rendering state (indent, print-chain flag, pending `global` emission,
//! fault flag) lives on the printer rather than in process globals.

use std::fmt::Write;

use crate::ast::{BinOp, Block, BlockKind, CmpOp, Node, ReturnKind, UnaryOp};
use crate::builder::{build_code, clean_tree};
use crate::object::{Code, Module, Object, Version};
use crate::opcode::{Bytecode, Opcode};
use crate::DecompileOutput;

pub fn print_module(module: &Module) -> DecompileOutput {
    let mut printer = Printer::new(module.version);
    printer.decompile_code(&module.code);
    DecompileOutput {
        text: printer.out,
        clean: printer.overall_clean,
        warnings: printer.warnings,
        version: module.version,
    }
}

struct Printer {
    version: Version,
    out: String,
    indent: i32,
    in_print: bool,
    print_globals: bool,
    overall_clean: bool,
    warnings: Vec<String>,
}

impl Printer {
    fn new(version: Version) -> Self {
        Self {
            version,
            out: String::new(),
            indent: -1,
            in_print: false,
            print_globals: false,
            overall_clean: true,
            warnings: Vec::new(),
        }
    }

    fn start_line(&mut self, indent: i32) {
        if self.in_print {
            return;
        }
        for _ in 0..indent.max(0) {
            self.out.push_str("    ");
        }
    }

    fn end_line(&mut self) {
        if self.in_print {
            return;
        }
        self.out.push('\n');
    }

    /// Builds and prints one code unit: `global` declarations first (they
    /// are discovered during the build pass), then the cleaned body, then
    /// the incompleteness marker when the scan faulted.
    fn decompile_code(&mut self, code: &Code) {
        let mut result = build_code(code, self.version);
        clean_tree(&mut result);
        self.warnings.append(&mut result.warnings);
        if !result.clean {
            self.overall_clean = false;
        }

        if self.print_globals {
            let globals = code.global_names();
            if !globals.is_empty() {
                self.start_line(self.indent + 1);
                self.out.push_str("global ");
                self.out.push_str(&globals.join(", "));
                self.out.push('\n');
                self.print_globals = false;
            }
        }

        self.in_print = false;
        self.print_node(&result.tree);

        if !result.clean {
            self.start_line(self.indent);
            self.out.push_str("# WARNING: Decompyle incomplete\n");
        }
    }

    fn print_node(&mut self, node: &Node) {
        match node {
            Node::Null => self.out.push_str("None"),
            Node::Locals => self.out.push_str("locals()"),
            Node::Binary { left, right, op, inplace } => {
                self.print_ordered(node, left);
                self.out.push_str(op.symbol(*inplace));
                self.print_ordered(node, right);
            }
            Node::Compare { left, right, op } => {
                self.print_ordered(node, left);
                self.out.push_str(op.symbol());
                self.print_ordered(node, right);
            }
            Node::Unary { operand, op } => {
                self.out.push_str(op.symbol());
                self.print_ordered(node, operand);
            }
            Node::Call { func, pparams, kwparams, var, kw } => {
                self.print_node(func);
                self.out.push('(');
                let mut first = true;
                for param in pparams {
                    if !first {
                        self.out.push_str(", ");
                    }
                    self.print_node(param);
                    first = false;
                }
                for (key, value) in kwparams {
                    if !first {
                        self.out.push_str(", ");
                    }
                    self.print_kw_key(key);
                    self.out.push_str(" = ");
                    self.print_node(value);
                    first = false;
                }
                if let Some(var) = var {
                    if !first {
                        self.out.push_str(", ");
                    }
                    self.out.push('*');
                    self.print_node(var);
                    first = false;
                }
                if kw.is_some() {
                    if !first {
                        self.out.push_str(", ");
                    }
                    // Longstanding quirk: the variadic-positional slot is
                    // rendered here as well.
                    self.out.push_str("**");
                    match var {
                        Some(var) => self.print_node(var),
                        None => self.out.push_str("None"),
                    }
                }
                self.out.push(')');
            }
            Node::Name(name) => self.out.push_str(name),
            Node::Object(obj) => match obj {
                Object::Code(code) => {
                    let code = code.clone();
                    self.decompile_code(&code);
                }
                other => self.print_const(other),
            },
            Node::List(values) => {
                self.out.push('[');
                self.indent += 1;
                let mut first = true;
                for value in values {
                    self.out.push_str(if first { "\n" } else { ",\n" });
                    let indent = self.indent;
                    self.start_line(indent);
                    self.print_node(value);
                    first = false;
                }
                self.indent -= 1;
                self.out.push(']');
            }
            Node::Tuple(values) => {
                self.out.push('(');
                let mut first = true;
                for value in values {
                    if !first {
                        self.out.push_str(", ");
                    }
                    self.print_node(value);
                    first = false;
                }
                if values.len() == 1 {
                    self.out.push_str(",)");
                } else {
                    self.out.push(')');
                }
            }
            Node::Map(entries) => {
                self.out.push('{');
                self.indent += 1;
                let mut first = true;
                for (key, value) in entries {
                    self.out.push_str(if first { "\n" } else { ",\n" });
                    let indent = self.indent;
                    self.start_line(indent);
                    self.print_node(key);
                    self.out.push_str(": ");
                    self.print_node(value);
                    first = false;
                }
                self.indent -= 1;
                self.out.push_str(" }");
            }
            Node::Subscr { src, key } => {
                self.print_node(src);
                self.out.push('[');
                self.print_node(key);
                self.out.push(']');
            }
            Node::Slice { kind, left, right } => {
                if kind.has_left() {
                    self.print_node(left);
                }
                self.out.push(':');
                if kind.has_right() {
                    self.print_node(right);
                }
            }
            Node::Store { .. } => self.print_store(node),
            Node::Delete(value) => {
                self.out.push_str("del ");
                self.print_node(value);
            }
            Node::Return { value, kind } => {
                match kind {
                    ReturnKind::Return => self.out.push_str("return "),
                    ReturnKind::Yield => self.out.push_str("yield "),
                }
                self.print_node(value);
            }
            Node::Raise(params) => {
                self.out.push_str("raise ");
                let mut first = true;
                for param in params {
                    if !first {
                        self.out.push_str(", ");
                    }
                    self.print_node(param);
                    first = false;
                }
            }
            Node::Import { .. } => self.print_import(node),
            Node::Print { value, stream } => self.print_print(value, stream),
            Node::Exec { stmt, globals, locals } => {
                self.out.push_str("exec ");
                self.print_node(stmt);
                if !globals.is_null() {
                    self.out.push_str(" in ");
                    self.print_node(globals);
                    if !locals.is_null() && locals != globals {
                        self.out.push_str(", ");
                        self.print_node(locals);
                    }
                }
            }
            Node::Function { code, defargs } => {
                // A function consumed as a bare value is a lambda; named
                // defs go through the store path.
                self.out.push_str("lambda ");
                self.out.push('(');
                self.print_arglist(code, defargs);
                self.out.push_str("): ");
                self.print_lambda_body(code);
            }
            Node::Class { .. } => {
                // Reached only for anonymous class values; named classes
                // print through the store path.
                self.out.push_str("<class>");
            }
            Node::Keyword(kw) => self.out.push_str(kw.word()),
            Node::Convert(value) => {
                self.out.push('`');
                self.print_node(value);
                self.out.push('`');
            }
            Node::Comprehension { result, generators } => {
                self.out.push_str("[ ");
                self.print_node(result);
                for generator in generators {
                    self.out.push_str(" for ");
                    self.print_node(&generator.index);
                    self.out.push_str(" in ");
                    self.print_node(&generator.iter);
                }
                self.out.push_str(" ]");
            }
            Node::NodeList(nodes) => {
                self.indent += 1;
                for line in nodes {
                    if !matches!(line, Node::NodeList(_)) {
                        let indent = self.indent;
                        self.start_line(indent);
                    }
                    self.print_node(line);
                    self.end_line();
                }
                self.indent -= 1;
            }
            Node::Block(blk) => self.print_block_node(blk),
        }
    }

    fn print_block_node(&mut self, blk: &Block) {
        if blk.kind == BlockKind::Else && blk.nodes.is_empty() {
            return;
        }

        if blk.kind == BlockKind::Container {
            self.end_line();
            self.print_block_body(blk);
            self.end_line();
            return;
        }

        self.in_print = false;

        self.out.push_str(blk.keyword());
        match blk.kind {
            BlockKind::If | BlockKind::Elif | BlockKind::While => {
                self.out.push_str(if blk.negative { " not " } else { " " });
                self.print_node(&blk.cond);
            }
            BlockKind::For => {
                self.out.push(' ');
                self.print_node(&blk.index);
                self.out.push_str(" in ");
                self.print_node(&blk.iter);
            }
            BlockKind::Except if !blk.cond.is_null() => {
                self.out.push(' ');
                self.print_node(&blk.cond);
            }
            _ => {}
        }
        self.out.push_str(":\n");

        self.indent += 1;
        self.print_block_body(blk);
        if self.in_print {
            self.out.push(',');
        }
        self.indent -= 1;
        self.in_print = false;
    }

    fn print_block_body(&mut self, blk: &Block) {
        if blk.nodes.is_empty() {
            let indent = self.indent;
            self.start_line(indent);
            self.out.push_str("pass");
            return;
        }

        let mut iter = blk.nodes.iter().peekable();
        while let Some(line) = iter.next() {
            if !matches!(line, Node::NodeList(_)) {
                let indent = self.indent;
                self.start_line(indent);
            }
            self.print_node(line);
            if iter.peek().is_some() {
                self.end_line();
            }
        }
    }

    fn print_print(&mut self, value: &Node, stream: &Node) {
        if value.is_null() {
            if !self.in_print {
                self.out.push_str("print ");
                if !stream.is_null() {
                    self.out.push_str(">>");
                    self.print_node(stream);
                }
            }
            self.in_print = false;
        } else if !self.in_print {
            self.out.push_str("print ");
            if !stream.is_null() {
                self.out.push_str(">>");
                self.print_node(stream);
                self.out.push_str(", ");
            }
            self.print_node(value);
            self.in_print = true;
        } else {
            self.out.push_str(", ");
            self.print_node(value);
        }
    }

    fn print_store(&mut self, node: &Node) {
        let Node::Store { src, dest } = node else {
            return;
        };

        match &**src {
            Node::Function { code, defargs } => {
                self.out.push('\n');
                let indent = self.indent;
                self.start_line(indent);
                self.out.push_str("def ");
                self.print_node(dest);
                self.out.push('(');
                self.print_arglist(code, defargs);
                self.out.push_str("):\n");
                self.print_globals = true;
                self.print_node(code);
            }
            Node::Class { code, bases, .. } => {
                self.out.push('\n');
                let indent = self.indent;
                self.start_line(indent);
                self.out.push_str("class ");
                self.print_node(dest);
                if let Node::Tuple(bases) = &**bases {
                    if !bases.is_empty() {
                        self.out.push('(');
                        let mut first = true;
                        for base in bases {
                            if !first {
                                self.out.push_str(", ");
                            }
                            self.print_node(base);
                            first = false;
                        }
                        self.out.push(')');
                    }
                }
                self.out.push_str(":\n");

                // The class body hides behind the call that builds the
                // class dictionary.
                if let Node::Call { func, .. } = &**code {
                    if let Node::Function { code, .. } = &**func {
                        self.print_node(code);
                        return;
                    }
                }
                self.print_node(code);
            }
            Node::Import { name, fromlist, .. } => {
                let from_names = match &**fromlist {
                    Node::Object(Object::Tuple(items)) => {
                        let names: Vec<String> =
                            items.iter().filter_map(|o| o.as_ident()).collect();
                        Some(names)
                    }
                    Node::Object(Object::Str(b)) => {
                        Some(vec![String::from_utf8_lossy(b).into_owned()])
                    }
                    _ => None,
                };
                match from_names {
                    Some(names) => {
                        self.out.push_str("from ");
                        self.print_import_target(name);
                        self.out.push_str(" import ");
                        self.out.push_str(&names.join(", "));
                    }
                    None => {
                        self.out.push_str("import ");
                        self.print_node(name);
                    }
                }
            }
            Node::Binary { inplace: true, .. } => {
                // Augmented assignment carries its own target.
                self.print_node(src);
            }
            Node::Object(obj)
                if matches!(&**dest, Node::Name(n) if n == "__doc__")
                    && matches!(obj, Object::Str(_) | Object::Unicode(_)) =>
            {
                self.print_const(obj);
            }
            _ => {
                self.print_node(dest);
                self.out.push_str(" = ");
                self.print_node(src);
            }
        }
    }

    fn print_import(&mut self, node: &Node) {
        let Node::Import { name, stores, .. } = node else {
            return;
        };

        if !stores.is_empty() {
            self.out.push_str("from ");
            self.print_import_target(name);
            self.out.push_str(" import ");

            let mut first = true;
            for (src, dest) in stores {
                if !first {
                    self.out.push_str(", ");
                }
                self.print_node(src);
                first = false;

                let renamed = match (src, dest) {
                    (Node::Name(a), Node::Name(b)) => a != b,
                    _ => false,
                };
                if renamed {
                    self.out.push_str(" as ");
                    self.print_node(dest);
                }
            }
        } else {
            self.out.push_str("import ");
            self.print_node(name);
        }
    }

    fn print_import_target(&mut self, name: &Node) {
        match name {
            Node::Import { name, .. } => self.print_node(name),
            other => self.print_node(other),
        }
    }

    /// Formal parameter list of a function object: named arguments with
    /// trailing defaults, then `*args`/`**kwargs` slots from the flags.
    fn print_arglist(&mut self, code: &Node, defargs: &[Node]) {
        let Node::Object(Object::Code(code)) = code else {
            return;
        };
        let code = code.clone();

        let arg_count = code.arg_count as usize;
        let mut defarg_iter = defargs.iter();
        let mut first = true;
        for i in 0..arg_count {
            if !first {
                self.out.push_str(", ");
            }
            self.out.push_str(code.get_var_name(i));
            if arg_count - i <= defargs.len() {
                if let Some(defarg) = defarg_iter.next() {
                    self.out.push_str(" = ");
                    self.print_node(defarg);
                }
            }
            first = false;
        }
        if code.flags & Code::CO_VARARGS != 0 {
            if !first {
                self.out.push_str(", ");
            }
            let _ = write!(self.out, "*{}", code.get_var_name(arg_count));
            first = false;
        }
        if code.flags & Code::CO_VARKEYWORDS != 0 {
            if !first {
                self.out.push_str(", ");
            }
            let mut idx = arg_count;
            if code.flags & Code::CO_VARARGS != 0 {
                idx += 1;
            }
            let _ = write!(self.out, "**{}", code.get_var_name(idx));
        }
    }

    /// A lambda body compiles to a single return; show just the returned
    /// expression.
    fn print_lambda_body(&mut self, code: &Node) {
        let Node::Object(Object::Code(code)) = code else {
            self.print_node(code);
            return;
        };
        let code = code.clone();

        let mut result = build_code(&code, self.version);
        self.warnings.append(&mut result.warnings);
        if !result.clean {
            self.overall_clean = false;
        }
        if let Node::NodeList(nodes) = &result.tree {
            if let Some(Node::Return { value, .. }) = nodes.first() {
                self.print_node(value);
                return;
            }
        }
        self.print_node(&result.tree);
    }

    fn print_kw_key(&mut self, key: &Node) {
        match key {
            Node::Object(Object::Str(b)) => {
                let name = String::from_utf8_lossy(b).into_owned();
                self.out.push_str(&name);
            }
            Node::Object(Object::Unicode(s)) => self.out.push_str(s),
            other => self.print_node(other),
        }
    }

    fn print_ordered(&mut self, parent: &Node, child: &Node) {
        match child {
            Node::Binary { .. } | Node::Compare { .. } | Node::Unary { .. } => {
                if cmp_prec(parent, child) > 0 {
                    self.out.push('(');
                    self.print_node(child);
                    self.out.push(')');
                } else {
                    self.print_node(child);
                }
            }
            _ => self.print_node(child),
        }
    }

    fn print_const(&mut self, obj: &Object) {
        match obj {
            Object::Null | Object::None => self.out.push_str("None"),
            Object::StopIteration => self.out.push_str("StopIteration"),
            Object::Ellipsis => self.out.push_str("Ellipsis"),
            Object::Bool(true) => self.out.push_str("True"),
            Object::Bool(false) => self.out.push_str("False"),
            Object::Int(v) => {
                let _ = write!(self.out, "{}", v);
            }
            Object::Int64(v) => {
                let _ = write!(self.out, "{}", v);
            }
            Object::Long(v) => {
                let _ = write!(self.out, "{}L", v);
            }
            Object::Float(v) => self.out.push_str(&format_float(*v)),
            Object::Complex(real, imag) => {
                if *real == 0.0 {
                    let _ = write!(self.out, "{}j", format_float(*imag));
                } else if *imag < 0.0 {
                    let _ = write!(
                        self.out,
                        "({}-{}j)",
                        format_float(*real),
                        format_float(-*imag)
                    );
                } else {
                    let _ = write!(
                        self.out,
                        "({}+{}j)",
                        format_float(*real),
                        format_float(*imag)
                    );
                }
            }
            Object::Str(bytes) => {
                if self.version.major >= 3 {
                    self.out.push('b');
                }
                self.out.push_str(&quote_bytes(bytes));
            }
            Object::Unicode(s) => {
                if self.version.major < 3 {
                    self.out.push('u');
                }
                self.out.push_str(&quote_bytes(s.as_bytes()));
            }
            Object::Tuple(items) => {
                self.out.push('(');
                let mut first = true;
                for item in items {
                    if !first {
                        self.out.push_str(", ");
                    }
                    self.print_const(item);
                    first = false;
                }
                if items.len() == 1 {
                    self.out.push_str(",)");
                } else {
                    self.out.push(')');
                }
            }
            Object::List(items) => {
                self.out.push('[');
                let mut first = true;
                for item in items {
                    if !first {
                        self.out.push_str(", ");
                    }
                    self.print_const(item);
                    first = false;
                }
                self.out.push(']');
            }
            Object::Dict(entries) => {
                self.out.push('{');
                let mut first = true;
                for (key, value) in entries {
                    if !first {
                        self.out.push_str(", ");
                    }
                    self.print_const(key);
                    self.out.push_str(": ");
                    self.print_const(value);
                    first = false;
                }
                self.out.push('}');
            }
            Object::Set(items) => {
                self.out.push_str("set([");
                let mut first = true;
                for item in items {
                    if !first {
                        self.out.push_str(", ");
                    }
                    self.print_const(item);
                    first = false;
                }
                self.out.push_str("])");
            }
            Object::Code(code) => {
                let _ = write!(self.out, "<code object {}>", code.name);
            }
        }
    }
}

/// Positive when the child binds looser than its parent and needs parens.
/// Mixed node kinds follow the surface-language precedence: comparisons
/// sit between arithmetic and the boolean connectives, `not` is looser
/// than both.
fn cmp_prec(parent: &Node, child: &Node) -> i32 {
    if matches!(parent, Node::Unary { op: UnaryOp::Not, .. }) {
        return 1;
    }

    match child {
        Node::Binary { op: child_op, .. } => match parent {
            Node::Binary { op: parent_op, .. } => {
                child_op.precedence() - parent_op.precedence()
            }
            Node::Compare { .. } => {
                if matches!(child_op, BinOp::LogAnd | BinOp::LogOr) {
                    1
                } else {
                    -1
                }
            }
            Node::Unary { .. } => {
                if *child_op == BinOp::Power {
                    -1
                } else {
                    1
                }
            }
            _ => -1,
        },
        Node::Unary { op: child_op, .. } => match parent {
            Node::Binary { op: parent_op, .. } => {
                if matches!(parent_op, BinOp::LogAnd | BinOp::LogOr) {
                    -1
                } else if *child_op == UnaryOp::Not {
                    1
                } else if *parent_op == BinOp::Power {
                    1
                } else {
                    -1
                }
            }
            Node::Compare { .. } => {
                if *child_op == UnaryOp::Not {
                    1
                } else {
                    -1
                }
            }
            Node::Unary { op: parent_op, .. } => {
                child_op.precedence() - parent_op.precedence()
            }
            _ => -1,
        },
        Node::Compare { op: child_op, .. } => match parent {
            Node::Binary { op: parent_op, .. } => {
                if matches!(parent_op, BinOp::LogAnd | BinOp::LogOr) {
                    -1
                } else {
                    1
                }
            }
            Node::Compare { op: parent_op, .. } => {
                child_op.precedence() - parent_op.precedence()
            }
            Node::Unary { op: parent_op, .. } => {
                if *parent_op == UnaryOp::Not {
                    -1
                } else {
                    1
                }
            }
            _ => -1,
        },
        _ => -1,
    }
}

fn format_float(v: f64) -> String {
    if v.is_finite() && v == v.trunc() {
        format!("{:.1}", v)
    } else {
        format!("{}", v)
    }
}

/// Single-quoted literal with the classic escape set; anything outside
/// printable ASCII renders as `\xNN`.
fn quote_bytes(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() + 2);
    out.push('\'');
    for &b in bytes {
        match b {
            b'\\' => out.push_str("\\\\"),
            b'\'' => out.push_str("\\'"),
            b'\n' => out.push_str("\\n"),
            b'\r' => out.push_str("\\r"),
            b'\t' => out.push_str("\\t"),
            0x20..=0x7E => out.push(b as char),
            other => {
                let _ = write!(out, "\\x{:02x}", other);
            }
        }
    }
    out.push('\'');
    out
}

// ---- disassembly -------------------------------------------------------

pub fn disassemble_module(module: &Module) -> DecompileOutput {
    let mut out = String::new();
    disassemble_code(&mut out, &module.code, module.version);
    DecompileOutput {
        text: out,
        clean: true,
        warnings: Vec::new(),
        version: module.version,
    }
}

fn disassemble_code(out: &mut String, code: &Code, version: Version) {
    let _ = writeln!(
        out,
        "code {} (file={:?}, args={}, locals={}, stacksize={}, flags=0x{:04x})",
        code.name, code.filename, code.arg_count, code.num_locals, code.stack_size, code.flags
    );
    out.push_str("bytecode:\n");

    let mut bc = Bytecode::new(&code.code, version);
    while let Some(instr) = bc.next() {
        let _ = write!(out, "{:05} {:<20}", instr.start, instr.opcode.name());
        let operand = instr.operand as usize;
        match instr.opcode {
            Opcode::LoadConst => {
                let _ = write!(out, " {:<7}; {}", operand, describe_const(code, operand, version));
            }
            Opcode::LoadFast | Opcode::StoreFast | Opcode::DeleteFast => {
                let _ = write!(out, " {:<7}; {}", operand, code.get_var_name(operand));
            }
            Opcode::LoadName
            | Opcode::StoreName
            | Opcode::DeleteName
            | Opcode::LoadGlobal
            | Opcode::StoreGlobal
            | Opcode::DeleteGlobal
            | Opcode::LoadAttr
            | Opcode::StoreAttr
            | Opcode::DeleteAttr
            | Opcode::ImportName
            | Opcode::ImportFrom => {
                let _ = write!(out, " {:<7}; {}", operand, code.get_name(operand));
            }
            Opcode::CompareOp => {
                let cmp = CmpOp::from_operand(instr.operand)
                    .map(|op| op.symbol().trim().to_string())
                    .unwrap_or_else(|| "?".to_string());
                let _ = write!(out, " {:<7}; {}", operand, cmp);
            }
            Opcode::JumpForward
            | Opcode::JumpIfFalse
            | Opcode::JumpIfTrue
            | Opcode::SetupLoop
            | Opcode::SetupExcept
            | Opcode::SetupFinally
            | Opcode::SetupWith
            | Opcode::ForIter
            | Opcode::ForLoop => {
                let _ = write!(out, " {:<7}; -> {}", operand, bc.offset() + operand);
            }
            opcode if takes_operand(opcode, instr.start, code) => {
                let _ = write!(out, " {}", operand);
            }
            _ => {}
        }
        out.push('\n');
    }

    for constant in &code.consts {
        if let Object::Code(child) = constant {
            out.push('\n');
            disassemble_code(out, child, version);
        }
    }
}

fn takes_operand(_opcode: Opcode, start: usize, code: &Code) -> bool {
    code.code
        .get(start)
        .map(|&b| b >= crate::opcode::HAVE_ARGUMENT)
        .unwrap_or(false)
}

fn describe_const(code: &Code, idx: usize, version: Version) -> String {
    match code.consts.get(idx) {
        Some(Object::Code(child)) => format!("<code object {}>", child.name),
        Some(obj) => {
            let mut printer = Printer::new(version);
            printer.print_const(obj);
            printer.out
        }
        None => format!("<const {}>", idx),
    }
}
