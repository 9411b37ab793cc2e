//! Stack-machine-to-AST reconstruction.
//!
//! One linear pass over the instruction stream, dispatching on opcode. The
//! builder keeps three coupled structures in lockstep: the operand stack of
//! AST nodes, a history of operand-stack snapshots saved at branch
//! introductions, and the stack of open structural blocks. Control-flow
//! recovery reads jump targets and `SETUP_*` offsets to decide when blocks
//! open, merge, or close; everything else is ordinary stack simulation.
//!
//! Faults never abort: an unsupported opcode stops the scan and yields the
//! partial tree with `clean` cleared, and structural anomalies are reported
//! as warnings while the scan continues.

use crate::ast::{
    BinOp, Block, BlockKind, CmpOp, InitState, KeywordKind, Node, ReturnKind, SliceKind, UnaryOp,
};
use crate::object::{Code, Object, Version};
use crate::opcode::{Bytecode, Instr, Opcode};

const NULL: Node = Node::Null;

/// Outcome of one build pass: the translated body plus fault state.
#[derive(Debug, Clone)]
pub struct BuildResult {
    pub tree: Node,
    pub clean: bool,
    pub warnings: Vec<String>,
}

/// Translates one code object into a `Node::NodeList` body. Nested code
/// objects stay embedded as constants; the printer re-enters on them.
pub fn build_code(code: &Code, version: Version) -> BuildResult {
    SourceBuilder::new(code, version).build()
}

struct SourceBuilder<'a> {
    code: &'a Code,
    version: Version,
    bc: Bytecode<'a>,
    stack: Vec<Node>,
    stack_hist: Vec<Vec<Node>>,
    blocks: Vec<Block>,
    unpack: i32,
    else_pop: bool,
    need_try: bool,
    clean: bool,
    warnings: Vec<String>,
}

impl<'a> SourceBuilder<'a> {
    fn new(code: &'a Code, version: Version) -> Self {
        Self {
            code,
            version,
            bc: Bytecode::new(&code.code, version),
            stack: Vec::new(),
            stack_hist: Vec::new(),
            blocks: vec![Block::main()],
            unpack: 0,
            else_pop: false,
            need_try: false,
            clean: true,
            warnings: Vec::new(),
        }
    }

    fn warn(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    // ---- operand stack -------------------------------------------------

    fn push(&mut self, node: Node) {
        self.stack.push(node);
    }

    fn pop(&mut self) -> Node {
        self.stack.pop().unwrap_or(Node::Null)
    }

    fn top(&self) -> Node {
        self.stack.last().cloned().unwrap_or(Node::Null)
    }

    fn push_hist(&mut self) {
        self.stack_hist.push(self.stack.clone());
    }

    /// Restores the most recent snapshot as the live stack.
    fn restore_hist(&mut self) {
        match self.stack_hist.pop() {
            Some(saved) => self.stack = saved,
            None => self.warn("Warning: stack history underflow!"),
        }
    }

    /// Drops the most recent snapshot, keeping the live stack.
    fn drop_hist(&mut self) {
        if self.stack_hist.pop().is_none() {
            self.warn("Warning: stack history underflow!");
        }
    }

    // ---- block stack ---------------------------------------------------

    fn cur(&mut self) -> &mut Block {
        if self.blocks.is_empty() {
            self.blocks.push(Block::main());
        }
        let last = self.blocks.len() - 1;
        &mut self.blocks[last]
    }

    fn cur_ref(&self) -> &Block {
        match self.blocks.last() {
            Some(blk) => blk,
            None => unreachable!("block stack bottom is always the main block"),
        }
    }

    fn push_block(&mut self, block: Block) {
        self.blocks.push(block);
    }

    fn pop_block(&mut self) -> Block {
        if self.blocks.len() > 1 {
            if let Some(blk) = self.blocks.pop() {
                return blk;
            }
        }
        self.warn("Warning: block stack underflow!");
        Block::new(BlockKind::Else, 0)
    }

    fn close_into_parent(&mut self, block: Block) {
        self.cur().append(Node::Block(Box::new(block)));
    }

    // ---- names ---------------------------------------------------------

    /// `*_FAST` opcodes addressed the plain name table before release 1.3.
    fn fast_name(&self, idx: usize) -> String {
        if self.version.major == 1 && self.version.minor < 3 {
            self.code.get_name(idx).to_string()
        } else {
            self.code.get_var_name(idx).to_string()
        }
    }

    /// List-comprehension accumulators are compiler temporaries named
    /// `_[N]`; stores and deletes of them never reach the output.
    fn is_hidden_name(name: &str) -> bool {
        name.starts_with("_[")
    }

    // ---- main loop -----------------------------------------------------

    fn build(mut self) -> BuildResult {
        while !self.bc.at_eof() {
            let instr = match self.bc.next() {
                Some(instr) => instr,
                None => break,
            };
            let curpos = instr.start;
            let pos = self.bc.offset();

            self.pre_dispatch(instr.opcode, pos);

            if !self.dispatch(instr, curpos, pos) {
                return self.finish(false);
            }

            let pos = self.bc.offset();
            let (kind, end) = {
                let cur = self.cur_ref();
                (cur.kind, cur.end)
            };
            self.else_pop = matches!(kind, BlockKind::Else | BlockKind::If | BlockKind::Elif)
                && end == pos;
        }
        self.finish(true)
    }

    /// Hooks that run before the per-opcode dispatch: `need_try`
    /// synthesizes the implicit try-block of a bare `try/finally`, and
    /// `else_pop` closes dangling conditional arms whose end offset has
    /// passed.
    fn pre_dispatch(&mut self, opcode: Opcode, pos: usize) {
        if self.need_try && opcode != Opcode::SetupExcept {
            self.need_try = false;

            // Save the stack for the finally statement(s)
            self.push_hist();
            let end = self.cur_ref().end;
            self.push_block(Block::try_block(end));
        } else if self.else_pop
            && !matches!(
                opcode,
                Opcode::JumpForward
                    | Opcode::JumpIfFalse
                    | Opcode::JumpIfFalseOrPop
                    | Opcode::PopJumpIfFalse
                    | Opcode::JumpIfTrue
                    | Opcode::JumpIfTrueOrPop
                    | Opcode::PopJumpIfTrue
                    | Opcode::PopBlock
            )
        {
            self.else_pop = false;

            loop {
                let prev = self.cur_ref();
                if prev.end >= pos || prev.kind == BlockKind::Main {
                    break;
                }
                if prev.kind != BlockKind::Container {
                    if prev.end == 0 {
                        break;
                    }
                    // Keep the stack, drop one level of history.
                    self.drop_hist();
                }
                let closed = self.pop_block();
                self.close_into_parent(closed);
            }
        }
    }

    fn finish(mut self, reached_eof: bool) -> BuildResult {
        if reached_eof {
            if !self.stack_hist.is_empty() {
                self.warn("Warning: stack history is not empty!");
                self.stack_hist.clear();
            }
            if self.blocks.len() > 1 {
                self.warn("Warning: block stack is not empty!");
                while self.blocks.len() > 1 {
                    let tmp = self.pop_block();
                    self.close_into_parent(tmp);
                }
            }
        }
        let body = match self.blocks.first_mut() {
            Some(main) => std::mem::take(&mut main.nodes),
            None => Vec::new(),
        };
        BuildResult {
            tree: Node::NodeList(body),
            clean: self.clean,
            warnings: self.warnings,
        }
    }

    // ---- dispatch ------------------------------------------------------

    /// Returns false when the scan must stop (unsupported opcode).
    fn dispatch(&mut self, instr: Instr, curpos: usize, pos: usize) -> bool {
        use Opcode::*;

        let opcode = instr.opcode;
        let operand = instr.operand as usize;

        match opcode {
            BinaryAdd | BinaryAnd | BinaryDivide | BinaryTrueDivide | BinaryFloorDivide
            | BinaryLshift | BinaryModulo | BinaryMultiply | BinaryOr | BinaryPower
            | BinaryRshift | BinarySubtract | BinaryXor | InplaceAdd | InplaceAnd
            | InplaceDivide | InplaceTrueDivide | InplaceFloorDivide | InplaceLshift
            | InplaceModulo | InplaceMultiply | InplaceOr | InplacePower | InplaceRshift
            | InplaceSubtract | InplaceXor => {
                let right = self.pop();
                let left = self.pop();
                let (op, inplace) = binary_op_of(opcode);
                let node = if inplace {
                    Node::binary_inplace(left, right, op)
                } else {
                    Node::binary(left, right, op)
                };
                self.push(node);
            }
            BinarySubscr => {
                let key = self.pop();
                let src = self.pop();
                self.push(Node::subscr(src, key));
            }
            CompareOp => {
                let op = match CmpOp::from_operand(instr.operand) {
                    Some(op) => op,
                    None => return self.unsupported(opcode),
                };
                let right = self.pop();
                let left = self.pop();
                self.push(Node::compare(left, right, op));
            }
            UnaryPositive | UnaryNegative | UnaryNot | UnaryInvert => {
                let arg = self.pop();
                let op = match opcode {
                    UnaryPositive => UnaryOp::Positive,
                    UnaryNegative => UnaryOp::Negative,
                    UnaryNot => UnaryOp::Not,
                    _ => UnaryOp::Invert,
                };
                self.push(Node::unary(arg, op));
            }
            UnaryConvert => {
                let arg = self.pop();
                self.push(Node::Convert(Box::new(arg)));
            }
            UnaryCall => {
                let func = self.pop();
                self.push(Node::Call {
                    func: Box::new(func),
                    pparams: Vec::new(),
                    kwparams: Vec::new(),
                    var: None,
                    kw: None,
                });
            }

            // -- stack shuffling --
            PopTop => self.handle_pop_top(),
            RotTwo => {
                let one = self.pop();
                let two = self.pop();
                self.push(one);
                self.push(two);
            }
            RotThree => {
                let one = self.pop();
                let two = self.pop();
                let three = self.pop();
                self.push(one);
                self.push(three);
                self.push(two);
            }
            RotFour => {
                let one = self.pop();
                let two = self.pop();
                let three = self.pop();
                let four = self.pop();
                self.push(one);
                self.push(four);
                self.push(three);
                self.push(two);
            }
            DupTop => {
                let top = self.top();
                self.push(top);
            }
            DupTopTwo => {
                let first = self.pop();
                let second = self.top();
                self.push(first.clone());
                self.push(second);
                self.push(first);
            }
            DupTopx => {
                let mut copied = Vec::with_capacity(operand);
                for _ in 0..operand {
                    copied.insert(0, self.pop());
                }
                for node in &copied {
                    self.push(node.clone());
                }
                for node in copied {
                    self.push(node);
                }
            }

            // -- loads --
            LoadConst => {
                // Downcast at load time so emitters can cheaply test for
                // "no value".
                match self.code.get_const(operand) {
                    Object::Tuple(v) if v.is_empty() => self.push(Node::Tuple(Vec::new())),
                    Object::None => self.push(Node::Null),
                    obj => self.push(Node::Object(obj)),
                }
            }
            LoadFast => {
                let name = self.fast_name(operand);
                self.push(Node::Name(name));
            }
            LoadGlobal | LoadName => {
                self.push(Node::name(self.code.get_name(operand)));
            }
            LoadLocals => self.push(Node::Locals),
            LoadAttr => {
                if matches!(self.stack.last(), Some(Node::Import { .. })) {
                    // Dotted import chains keep the import node intact.
                    return true;
                }
                let name = self.pop();
                let attr = Node::name(self.code.get_name(operand));
                self.push(Node::binary(name, attr, BinOp::Attr));
            }

            // -- composites --
            BuildList => {
                let mut values = Vec::with_capacity(operand);
                for _ in 0..operand {
                    let v = self.pop();
                    values.insert(0, v);
                }
                self.push(Node::List(values));
            }
            BuildTuple => {
                let mut values = Vec::with_capacity(operand);
                for _ in 0..operand {
                    let v = self.pop();
                    values.insert(0, v);
                }
                self.push(Node::Tuple(values));
            }
            BuildMap => self.push(Node::Map(Vec::new())),
            BuildSlice => self.handle_build_slice(operand),

            // -- calls and definitions --
            CallFunction => self.build_call(instr.operand, None, None),
            CallFunctionVar => {
                let var = self.pop();
                self.build_call(instr.operand, Some(var), None);
            }
            CallFunctionKw => {
                let kw = self.pop();
                self.build_call(instr.operand, None, Some(kw));
            }
            CallFunctionVarKw => {
                let kw = self.pop();
                let var = self.pop();
                self.build_call(instr.operand, Some(var), Some(kw));
            }
            MakeFunction => {
                let code = self.pop();
                let mut defargs = Vec::with_capacity(operand);
                for _ in 0..operand {
                    let arg = self.pop();
                    defargs.insert(0, arg);
                }
                self.push(Node::Function { code: Box::new(code), defargs });
            }
            BuildFunction => {
                let code = self.pop();
                self.push(Node::Function { code: Box::new(code), defargs: Vec::new() });
            }
            BuildClass => {
                let code = self.pop();
                let bases = self.pop();
                let name = self.pop();
                self.push(Node::Class {
                    code: Box::new(code),
                    bases: Box::new(bases),
                    name: Box::new(name),
                });
            }

            // -- subscripts and slices --
            Slice0 => {
                let name = self.pop();
                self.push(Node::subscr(name, Node::slice(SliceKind::Empty, NULL, NULL)));
            }
            Slice1 => {
                let lower = self.pop();
                let name = self.pop();
                self.push(Node::subscr(name, Node::slice(SliceKind::Left, lower, NULL)));
            }
            Slice2 => {
                let upper = self.pop();
                let name = self.pop();
                self.push(Node::subscr(name, Node::slice(SliceKind::Right, NULL, upper)));
            }
            Slice3 => {
                let upper = self.pop();
                let lower = self.pop();
                let name = self.pop();
                self.push(Node::subscr(name, Node::slice(SliceKind::Both, lower, upper)));
            }

            // -- statements --
            ReturnValue => {
                let value = self.pop();
                self.cur().append(Node::Return {
                    value: Box::new(value),
                    kind: ReturnKind::Return,
                });
                self.collapse_terminal_branch();
            }
            YieldValue => {
                let value = self.pop();
                self.cur().append(Node::Return {
                    value: Box::new(value),
                    kind: ReturnKind::Yield,
                });
            }
            RaiseVarargs => {
                let mut params = Vec::with_capacity(operand);
                for _ in 0..operand {
                    let p = self.pop();
                    params.insert(0, p);
                }
                self.cur().append(Node::Raise(params));
                self.collapse_terminal_branch();
            }
            ExecStmt => {
                let locals = self.pop();
                let globals = self.pop();
                let stmt = self.pop();
                self.cur().append(Node::Exec {
                    stmt: Box::new(stmt),
                    globals: Box::new(globals),
                    locals: Box::new(locals),
                });
            }
            PrintItem => {
                let value = self.pop();
                self.cur().append(Node::Print {
                    value: Box::new(value),
                    stream: Box::new(Node::Null),
                });
            }
            PrintItemTo => {
                let stream = self.pop();
                let value = self.pop();
                self.cur().append(Node::Print {
                    value: Box::new(value),
                    stream: Box::new(stream),
                });
            }
            PrintNewline => {
                self.cur().append(Node::Print {
                    value: Box::new(Node::Null),
                    stream: Box::new(Node::Null),
                });
            }
            PrintNewlineTo => {
                let stream = self.pop();
                self.cur().append(Node::Print {
                    value: Box::new(Node::Null),
                    stream: Box::new(stream),
                });
            }

            // -- stores --
            StoreName => {
                if self.unpack > 0 {
                    let name = Node::name(self.code.get_name(operand));
                    self.unpack_store(name);
                } else {
                    let value = self.pop();
                    let varname = self.code.get_name(operand).to_string();
                    if Self::is_hidden_name(&varname) {
                        return true;
                    }
                    let name = Node::Name(varname);
                    if self.cur_ref().kind == BlockKind::For && !self.cur_ref().inited() {
                        self.cur().set_index(name);
                    } else if matches!(self.stack.last(), Some(Node::Import { .. })) {
                        if let Some(Node::Import { stores, .. }) = self.stack.last_mut() {
                            stores.push((value, name));
                        }
                    } else {
                        self.cur().append(Node::store(value, name));
                    }
                }
            }
            StoreFast => {
                if self.unpack > 0 {
                    let name = Node::Name(self.fast_name(operand));
                    self.unpack_store(name);
                } else {
                    let value = self.pop();
                    let varname = self.fast_name(operand);
                    if Self::is_hidden_name(&varname) {
                        return true;
                    }
                    let name = Node::Name(varname);
                    if self.cur_ref().kind == BlockKind::For && !self.cur_ref().inited() {
                        self.cur().set_index(name);
                    } else {
                        self.cur().append(Node::store(value, name));
                    }
                }
            }
            StoreGlobal => {
                let value = self.pop();
                let varname = self.code.get_name(operand).to_string();
                self.cur().append(Node::store(value, Node::Name(varname.clone())));

                // The printer wants a `global` declaration for this.
                self.code.mark_global(&varname);
            }
            StoreAttr => {
                let name = self.pop();
                let value = self.pop();
                let attr = Node::binary(name, Node::name(self.code.get_name(operand)), BinOp::Attr);
                self.cur().append(Node::store(value, attr));
            }
            StoreSubscr => {
                let key = self.pop();
                let dest = self.pop();
                let src = self.pop();
                if matches!(dest, Node::Map(_)) {
                    // A map literal under construction was duplicated on the
                    // stack; grow the copy that is still parked there.
                    if let Some(Node::Map(entries)) = self.stack.last_mut() {
                        entries.push((key, src));
                    } else {
                        self.cur().append(Node::store(src, Node::subscr(dest, key)));
                    }
                } else {
                    self.cur().append(Node::store(src, Node::subscr(dest, key)));
                }
            }
            StoreSlice0 => {
                let dest = self.pop();
                let value = self.pop();
                self.cur().append(Node::store(
                    value,
                    Node::subscr(dest, Node::slice(SliceKind::Empty, NULL, NULL)),
                ));
            }
            StoreSlice1 => {
                let upper = self.pop();
                let dest = self.pop();
                let value = self.pop();
                self.cur().append(Node::store(
                    value,
                    Node::subscr(dest, Node::slice(SliceKind::Left, upper, NULL)),
                ));
            }
            StoreSlice2 => {
                let lower = self.pop();
                let dest = self.pop();
                let value = self.pop();
                self.cur().append(Node::store(
                    value,
                    Node::subscr(dest, Node::slice(SliceKind::Right, NULL, lower)),
                ));
            }
            StoreSlice3 => {
                let lower = self.pop();
                let upper = self.pop();
                let dest = self.pop();
                let value = self.pop();
                self.cur().append(Node::store(
                    value,
                    Node::subscr(dest, Node::slice(SliceKind::Both, upper, lower)),
                ));
            }

            // -- deletes --
            DeleteName | DeleteGlobal => {
                let varname = self.code.get_name(operand).to_string();
                if Self::is_hidden_name(&varname) {
                    return true;
                }
                self.cur().append(Node::Delete(Box::new(Node::Name(varname))));
            }
            DeleteFast => {
                let varname = self.fast_name(operand);
                if Self::is_hidden_name(&varname) {
                    return true;
                }
                self.cur().append(Node::Delete(Box::new(Node::Name(varname))));
            }
            DeleteAttr => {
                let name = self.pop();
                let attr = Node::binary(name, Node::name(self.code.get_name(operand)), BinOp::Attr);
                self.cur().append(Node::Delete(Box::new(attr)));
            }
            DeleteSubscr => {
                let key = self.pop();
                let name = self.pop();
                self.cur().append(Node::Delete(Box::new(Node::subscr(name, key))));
            }
            DeleteSlice0 => {
                let name = self.pop();
                self.cur().append(Node::Delete(Box::new(Node::subscr(
                    name,
                    Node::slice(SliceKind::Empty, NULL, NULL),
                ))));
            }
            DeleteSlice1 => {
                let upper = self.pop();
                let name = self.pop();
                self.cur().append(Node::Delete(Box::new(Node::subscr(
                    name,
                    Node::slice(SliceKind::Left, upper, NULL),
                ))));
            }
            DeleteSlice2 => {
                let lower = self.pop();
                let name = self.pop();
                self.cur().append(Node::Delete(Box::new(Node::subscr(
                    name,
                    Node::slice(SliceKind::Right, NULL, lower),
                ))));
            }
            DeleteSlice3 => {
                let lower = self.pop();
                let upper = self.pop();
                let name = self.pop();
                self.cur().append(Node::Delete(Box::new(Node::subscr(
                    name,
                    Node::slice(SliceKind::Both, upper, lower),
                ))));
            }

            // -- imports --
            ImportName => {
                if self.version.major == 1 {
                    self.push(Node::Import {
                        name: Box::new(Node::name(self.code.get_name(operand))),
                        fromlist: Box::new(Node::Null),
                        stores: Vec::new(),
                    });
                } else {
                    let fromlist = self.pop();
                    if self.version.at_least(2, 5) {
                        // Relative-import level, which we don't care about.
                        self.pop();
                    }
                    self.push(Node::Import {
                        name: Box::new(Node::name(self.code.get_name(operand))),
                        fromlist: Box::new(fromlist),
                        stores: Vec::new(),
                    });
                }
            }
            ImportFrom => {
                self.push(Node::name(self.code.get_name(operand)));
            }
            ImportStar => {
                let import = self.pop();
                self.cur().append(Node::store(import, Node::Null));
            }

            // -- unpacking --
            UnpackSequence | UnpackTuple | UnpackList => {
                self.unpack = instr.operand as i32;
                self.push(Node::Tuple(Vec::new()));
            }

            // -- control flow --
            SetupLoop => {
                self.push_block(Block::cond_block(
                    BlockKind::While,
                    pos + operand,
                    Node::Null,
                    false,
                ));
            }
            SetupExcept => {
                if self.cur_ref().kind == BlockKind::Container {
                    self.cur().except = pos + operand;
                } else {
                    self.push_block(Block::container(0, pos + operand));
                }

                // Save the stack for the except/finally statement(s)
                self.push_hist();
                self.push_block(Block::try_block(pos + operand));
                self.need_try = false;
            }
            SetupFinally => {
                self.push_block(Block::container(pos + operand, 0));
                self.need_try = true;
            }
            PopBlock => self.handle_pop_block(pos),
            EndFinally => self.handle_end_finally(pos),
            BreakLoop => self.cur().append(Node::Keyword(KeywordKind::Break)),
            ContinueLoop => self.cur().append(Node::Keyword(KeywordKind::Continue)),
            JumpIfFalse | JumpIfTrue | JumpIfFalseOrPop | JumpIfTrueOrPop | PopJumpIfFalse
            | PopJumpIfTrue => self.handle_cond_jump(opcode, operand, curpos, pos),
            JumpAbsolute => self.handle_jump_absolute(operand, pos),
            JumpForward => self.handle_jump_forward(operand, pos),
            ForIter => self.handle_for_iter(false),
            ForLoop => self.handle_for_iter(true),
            ListAppend => {
                let value = self.pop();
                let list = self.top();
                if self.cur_ref().kind == BlockKind::For && self.cur_ref().comprehension {
                    self.push(Node::Comprehension {
                        result: Box::new(value),
                        generators: Vec::new(),
                    });
                } else {
                    // Total hack; a conforming compiler never leaves this
                    // on the stack where the printer would find it.
                    self.push(Node::subscr(list, value));
                }
            }

            // -- ignored --
            GetIter | SetLineno | PopExcept | ReserveFast => {}

            other => return self.unsupported(other),
        }
        true
    }

    fn unsupported(&mut self, opcode: Opcode) -> bool {
        self.warn(format!("Unsupported opcode: {}", opcode.name()));
        self.clean = false;
        false
    }

    // ---- grouped handlers ----------------------------------------------

    fn build_call(&mut self, operand: u32, var: Option<Node>, kw: Option<Node>) {
        let kwparam_count = ((operand & 0xFF00) >> 8) as usize;
        let pparam_count = (operand & 0xFF) as usize;

        let mut kwparams = Vec::with_capacity(kwparam_count);
        for _ in 0..kwparam_count {
            let value = self.pop();
            let key = self.pop();
            kwparams.insert(0, (key, value));
        }
        let mut pparams = Vec::with_capacity(pparam_count);
        for _ in 0..pparam_count {
            let param = self.pop();
            pparams.insert(0, param);
        }
        let func = self.pop();
        self.push(Node::Call {
            func: Box::new(func),
            pparams,
            kwparams,
            var: var.map(Box::new),
            kw: kw.map(Box::new),
        });
    }

    fn handle_pop_top(&mut self) {
        let value = self.pop();
        if !self.cur_ref().inited() {
            self.cur().init();
            return;
        }
        if value.is_silent_discard() {
            return;
        }

        // In a comprehension the only expression statement is the append
        // call; its argument becomes the comprehension result.
        let comp_result = if self.cur_ref().kind == BlockKind::For && self.cur_ref().comprehension
        {
            match &value {
                Node::Call { pparams, .. } => pparams.first().cloned(),
                _ => None,
            }
        } else {
            None
        };

        self.cur().append(value);

        if let Some(result) = comp_result {
            self.push(Node::Comprehension {
                result: Box::new(result),
                generators: Vec::new(),
            });
        }
    }

    fn handle_build_slice(&mut self, operand: usize) {
        if operand == 2 {
            let end = none_to_null(self.pop());
            let start = none_to_null(self.pop());

            let slice = match (start.is_null(), end.is_null()) {
                (true, true) => Node::slice(SliceKind::Empty, NULL, NULL),
                (true, false) => Node::slice(SliceKind::Right, start, end),
                (false, true) => Node::slice(SliceKind::Left, start, end),
                (false, false) => Node::slice(SliceKind::Both, start, end),
            };
            self.push(slice);
        } else if operand == 3 {
            let step = none_to_null(self.pop());
            let end = none_to_null(self.pop());
            let start = none_to_null(self.pop());

            // Rendered as a slice whose left side is another slice: [[a:b]:c]
            let inner = match (start.is_null(), end.is_null()) {
                (true, true) => Node::slice(SliceKind::Empty, NULL, NULL),
                (true, false) => Node::slice(SliceKind::Right, start, end),
                (false, true) => Node::slice(SliceKind::Left, start, end),
                (false, false) => Node::slice(SliceKind::Both, start, end),
            };
            let slice = if step.is_null() {
                Node::slice(SliceKind::Left, inner, step)
            } else {
                Node::slice(SliceKind::Both, inner, step)
            };
            self.push(slice);
        }
    }

    fn unpack_store(&mut self, name: Node) {
        match self.stack.last_mut() {
            Some(Node::Tuple(values)) => values.push(name),
            _ => self.warn("Something TERRIBLE happened!"),
        }

        self.unpack -= 1;
        if self.unpack <= 0 {
            self.unpack = 0;
            let tup = self.pop();
            let seq = self.pop();

            if self.cur_ref().kind == BlockKind::For && !self.cur_ref().inited() {
                self.cur().set_index(tup);
            } else {
                self.cur().append(Node::store(seq, tup));
            }
        }
    }

    /// Shared by `FOR_ITER` and the legacy `FOR_LOOP`. When the block on
    /// top is the `While` a `SETUP_LOOP` just opened, this is an ordinary
    /// `for`; otherwise the iteration belongs to a comprehension.
    fn handle_for_iter(&mut self, legacy: bool) {
        let curidx = if legacy { Some(self.pop()) } else { None };
        let iter = self.pop();

        let (end, comprehension) = if self.cur_ref().kind == BlockKind::While {
            let replaced = self.pop_block();
            (replaced.end, false)
        } else {
            (self.cur_ref().end, true)
        };

        let mut forblk = Block::iter_block(end, iter.clone());
        forblk.comprehension = comprehension;
        self.push_block(forblk);

        if let Some(curidx) = curidx {
            // The old protocol keeps the sequence and counter live.
            self.push(iter);
            self.push(curidx);
        }
        // Sentinel consumed by the upcoming store of the loop variable.
        self.push(Node::Null);
    }

    fn handle_cond_jump(&mut self, opcode: Opcode, operand: usize, curpos: usize, pos: usize) {
        use Opcode::*;

        let cond = self.top();
        let mut popped = InitState::Uninited;

        if matches!(opcode, PopJumpIfFalse | PopJumpIfTrue) {
            // Condition is consumed before the jump
            self.pop();
            popped = InitState::PrePopped;
        }

        // Save the stack for the else statement(s)
        self.push_hist();

        if matches!(opcode, JumpIfFalseOrPop | JumpIfTrueOrPop) {
            // Condition is consumed only on the taken branch
            self.pop();
            popped = InitState::Popped;
        }

        // "Jump if true" means "jump if not false"
        let neg = matches!(opcode, JumpIfTrue | JumpIfTrueOrPop | PopJumpIfTrue);

        let offs = if matches!(opcode, JumpIfFalse | JumpIfTrue) {
            pos + operand
        } else {
            operand
        };

        let mut ifblk;
        if let Node::Compare { op: CmpOp::Exception, right, .. } = &cond {
            // The exception-type test of an except arm.
            let exc_type = (**right).clone();
            if self.cur_ref().kind == BlockKind::Except && self.cur_ref().cond.is_null() {
                self.pop_block();
                self.drop_hist();
            }
            ifblk = Block::cond_block(BlockKind::Except, offs, exc_type, false);
        } else if self.cur_ref().kind == BlockKind::Else && self.cur_ref().size() == 0 {
            // Collapse into an elif arm.
            self.pop_block();
            self.restore_hist();
            ifblk = Block::cond_block(BlockKind::Elif, offs, cond, neg);
        } else if self.cur_ref().size() == 0
            && !self.cur_ref().inited()
            && self.cur_ref().kind == BlockKind::While
        {
            // The condition test of the enclosing loop.
            let top = self.pop_block();
            ifblk = Block::cond_block(top.kind, offs, cond, neg);

            // Loops don't keep a snapshot; drop the one just pushed.
            self.drop_hist();
        } else if self.cur_ref().size() == 0
            && self.cur_ref().end <= offs
            && matches!(
                self.cur_ref().kind,
                BlockKind::If | BlockKind::Elif | BlockKind::While
            )
        {
            // Short-circuit continuation of the existing condition.
            let top = self.pop_block();
            let prior = top.cond.clone();

            if top.kind == BlockKind::While {
                self.drop_hist();
            } else {
                // Replace the snapshot beneath the one just pushed.
                let keep = self.stack_hist.pop();
                self.stack_hist.pop();
                if let Some(keep) = keep {
                    self.stack_hist.push(keep);
                }
            }

            let newcond = if top.end == offs || (top.end == curpos && !top.negative) {
                Node::binary(prior, cond, BinOp::LogAnd)
            } else {
                Node::binary(prior, cond, BinOp::LogOr)
            };
            ifblk = Block::cond_block(top.kind, offs, newcond, neg);
        } else {
            // Plain old if statement
            ifblk = Block::cond_block(BlockKind::If, offs, cond, neg);
        }

        if popped != InitState::Uninited {
            ifblk.init = popped;
        }
        self.push_block(ifblk);
    }

    fn handle_jump_absolute(&mut self, operand: usize, pos: usize) {
        if operand < pos {
            // Backward jump: the end of a loop iteration.
            if self.cur_ref().kind == BlockKind::For && self.cur_ref().comprehension {
                let forblk = self.pop_block();
                if let Some(Node::Comprehension { generators, .. }) = self.stack.last_mut() {
                    generators.push(forblk);
                }
            } else {
                self.cur().append(Node::Keyword(KeywordKind::Continue));
            }
            return;
        }

        if self.cur_ref().kind == BlockKind::Container {
            if self.cur_ref().has_except() && pos < self.cur_ref().except {
                let mut except = Block::cond_block(BlockKind::Except, 0, Node::Null, false);
                except.init = InitState::Inited;
                self.push_block(except);
            }
            return;
        }

        self.restore_hist();
        self.close_branch_walk(None, 0);
    }

    fn handle_jump_forward(&mut self, operand: usize, pos: usize) {
        if self.cur_ref().kind == BlockKind::Container {
            if self.cur_ref().has_except() {
                self.push_hist();

                self.cur().end = pos + operand;
                let mut except =
                    Block::cond_block(BlockKind::Except, pos + operand, Node::Null, false);
                except.init = InitState::Inited;
                self.push_block(except);
            }
            return;
        }

        if self.cur_ref().kind == BlockKind::While && !self.cur_ref().inited() {
            // Infinite loop: the compiler jumped straight into the body.
            self.push(Node::Object(Object::Int(1)));
            return;
        }

        self.restore_hist();
        self.close_branch_walk(Some(pos + operand), operand);

        if self.cur_ref().kind == BlockKind::Except {
            self.cur().end = pos + operand;
        }
    }

    /// The close-and-mirror walk shared by forward jumps: each closed
    /// `If`/`Elif` opens an `Else`, each closed `Except` opens the next
    /// arm, a closed `Else` merges upward, anything else stops the walk.
    /// `target` carries the alternate arm's end offset for `JUMP_FORWARD`;
    /// absolute jumps inherit the parent block's end instead.
    fn close_branch_walk(&mut self, target: Option<usize>, operand: usize) {
        let mut push = true;
        loop {
            let prev = self.pop_block();
            let prev_kind = prev.kind;
            let prev_init = prev.init;
            self.close_into_parent(prev);

            match prev_kind {
                BlockKind::If | BlockKind::Elif => {
                    if target.is_some() && operand == 0 {
                        break;
                    }
                    if push {
                        self.push_hist();
                    }
                    let end = target.unwrap_or(self.cur_ref().end);
                    let mut next = Block::new(BlockKind::Else, end);
                    if prev_init == InitState::PrePopped {
                        next.init = InitState::PrePopped;
                    }
                    self.push_block(next);
                    break;
                }
                BlockKind::Except => {
                    if target.is_some() && operand == 0 {
                        break;
                    }
                    if push {
                        self.push_hist();
                    }
                    let end = target.unwrap_or(self.cur_ref().end);
                    let mut next = Block::cond_block(BlockKind::Except, end, Node::Null, false);
                    next.init = InitState::Inited;
                    self.push_block(next);
                    break;
                }
                BlockKind::Else => {
                    if !push {
                        self.restore_hist();
                    }
                    push = false;
                    // Keep walking upward.
                }
                _ => break,
            }
        }
    }

    fn handle_pop_block(&mut self, pos: usize) {
        if matches!(self.cur_ref().kind, BlockKind::Container | BlockKind::Finally) {
            // These are only closed by an END_FINALLY.
            return;
        }

        // A loop-closing jump right before the block end reads as a
        // redundant continue; drop it.
        if matches!(self.cur_ref().nodes.last(), Some(Node::Keyword(_))) {
            self.cur().nodes.pop();
        }

        if matches!(
            self.cur_ref().kind,
            BlockKind::If
                | BlockKind::Elif
                | BlockKind::Else
                | BlockKind::Try
                | BlockKind::Except
                | BlockKind::Finally
        ) {
            self.restore_hist();
        }

        let tmp = self.pop_block();
        let mut closed_kind = tmp.kind;
        let closed_end = tmp.end;
        if !(tmp.kind == BlockKind::Else && tmp.nodes.is_empty()) {
            self.close_into_parent(tmp);
        }

        if closed_kind == BlockKind::For && closed_end > pos {
            // The loop has an else clause. Unlike a conditional else there
            // is no dangling condition value to swallow, so it starts
            // initialized.
            self.push_hist();
            let mut blkelse = Block::new(BlockKind::Else, closed_end);
            blkelse.init = InitState::Inited;
            self.push_block(blkelse);
        }

        if self.cur_ref().kind == BlockKind::Try
            && closed_kind != BlockKind::For
            && closed_kind != BlockKind::While
        {
            // The try body is complete; it closes along with its child.
            self.restore_hist();

            let tmp = self.pop_block();
            closed_kind = tmp.kind;
            if !(tmp.kind == BlockKind::Else && tmp.nodes.is_empty()) {
                self.close_into_parent(tmp);
            }
        }

        if self.cur_ref().kind == BlockKind::Container {
            let has_finally = self.cur_ref().has_finally();
            let has_except = self.cur_ref().has_except();

            if closed_kind == BlockKind::Else && !has_finally {
                let cont = self.pop_block();
                self.close_into_parent(cont);
            } else if (closed_kind == BlockKind::Else && has_finally)
                || (closed_kind == BlockKind::Try && !has_except)
            {
                self.push_hist();
                self.push_block(Block::finally_block());
            }
        }
    }

    fn handle_end_finally(&mut self, pos: usize) {
        let mut is_finally = false;

        if self.cur_ref().kind == BlockKind::Finally {
            let finblk = self.pop_block();
            self.restore_hist();
            self.close_into_parent(finblk);
            is_finally = true;
        } else if self.cur_ref().kind == BlockKind::Except {
            let prev = self.pop_block();
            let prev_end = prev.end;
            if prev.size() != 0 {
                self.close_into_parent(prev);
            }

            if self.cur_ref().end != pos || self.cur_ref().has_finally() {
                // The composite continues; host its else clause.
                let mut elseblk = Block::new(BlockKind::Else, prev_end);
                elseblk.init = InitState::Inited;
                self.push_block(elseblk);
            } else {
                self.restore_hist();
            }
        }

        if self.cur_ref().kind == BlockKind::Container
            && (!self.cur_ref().has_finally() || is_finally)
        {
            let cont = self.pop_block();
            self.close_into_parent(cont);
        }
    }

    /// A terminal `return`/`raise` inside a conditional arm ends that arm;
    /// from release 2.6 the compiler still emits the now-unreachable jump
    /// over the alternate arm, which must be swallowed so the jump handler
    /// does not reopen the branch.
    fn collapse_terminal_branch(&mut self) {
        if !matches!(self.cur_ref().kind, BlockKind::If | BlockKind::Else) {
            return;
        }
        if self.stack_hist.is_empty() || self.version.before(2, 6) {
            return;
        }

        self.restore_hist();
        let prev = self.pop_block();
        self.close_into_parent(prev);

        if matches!(
            self.bc.peek().map(|i| i.opcode),
            Some(Opcode::JumpForward) | Some(Opcode::JumpAbsolute)
        ) {
            self.bc.next();
        }
    }
}

fn binary_op_of(opcode: Opcode) -> (BinOp, bool) {
    use Opcode::*;
    match opcode {
        BinaryAdd => (BinOp::Add, false),
        BinaryAnd => (BinOp::And, false),
        BinaryDivide | BinaryTrueDivide => (BinOp::Divide, false),
        BinaryFloorDivide => (BinOp::FloorDivide, false),
        BinaryLshift => (BinOp::Lshift, false),
        BinaryModulo => (BinOp::Modulo, false),
        BinaryMultiply => (BinOp::Multiply, false),
        BinaryOr => (BinOp::Or, false),
        BinaryPower => (BinOp::Power, false),
        BinaryRshift => (BinOp::Rshift, false),
        BinarySubtract => (BinOp::Subtract, false),
        BinaryXor => (BinOp::Xor, false),
        InplaceAdd => (BinOp::Add, true),
        InplaceAnd => (BinOp::And, true),
        InplaceDivide | InplaceTrueDivide => (BinOp::Divide, true),
        InplaceFloorDivide => (BinOp::FloorDivide, true),
        InplaceLshift => (BinOp::Lshift, true),
        InplaceModulo => (BinOp::Modulo, true),
        InplaceMultiply => (BinOp::Multiply, true),
        InplaceOr => (BinOp::Or, true),
        InplacePower => (BinOp::Power, true),
        InplaceRshift => (BinOp::Rshift, true),
        InplaceSubtract => (BinOp::Subtract, true),
        InplaceXor => (BinOp::Xor, true),
        _ => (BinOp::Add, false),
    }
}

/// A `None` constant in a slice position means "side not present".
fn none_to_null(node: Node) -> Node {
    match node {
        Node::Object(Object::None) => Node::Null,
        other => other,
    }
}

/// Post-pass cleanup: drop the compiler's module scaffolding and the
/// implicit terminal return, then make sure an empty body still renders.
pub fn clean_tree(result: &mut BuildResult) {
    let Node::NodeList(body) = &mut result.tree else {
        return;
    };

    if result.clean {
        let leading_module_store = matches!(
            body.first(),
            Some(Node::Store { src, dest })
                if matches!(&**src, Node::Name(n) if n == "__name__")
                    && matches!(&**dest, Node::Name(n) if n == "__module__")
        );
        if leading_module_store {
            body.remove(0);
        }

        let trailing_implicit_return = matches!(
            body.last(),
            Some(Node::Return { value, .. })
                if matches!(&**value, Node::Null | Node::Locals)
        );
        if trailing_implicit_return {
            body.pop();
        }
    }

    if body.is_empty() {
        body.push(Node::Keyword(KeywordKind::Pass));
    }
}
