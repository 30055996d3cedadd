//! JavaScript interpreter.
//!
//! Tree-walking interpreter for JavaScript AST. An [`Interpreter`] is one
//! realm: a global object, the intrinsic prototypes and the global
//! environment. The call stack, limits and interrupt flag live in the
//! shared [`Agent`], so several realms can take turns on one agent.

use alloc::format;
use alloc::rc::{Rc, Weak};
use alloc::string::{String, ToString};
use alloc::vec::Vec;
use core::cell::RefCell;

use libm::{fmod, pow};

use crate::agent::{Agent, Location, Script};
use crate::ast::*;
use crate::builtin;
use crate::error::{JsError, JsResult, ParseError};
use crate::json;
use crate::object::{
    Attributes, Callable, Environment, HostFn, HostFunction, JsObject, NativeFn, NativeFunction,
    PropertyKey, UserFunction,
};
use crate::parser::parse;
use crate::value::{number_to_i32, number_to_string, number_to_u32, Completion, Value};

/// Shared, mutable object reference.
pub type ObjectRef = Rc<RefCell<JsObject>>;

type EnvRef = Rc<RefCell<Environment>>;

/// Names of the native error constructors besides `Error`.
pub const NATIVE_ERRORS: [&str; 6] = [
    "TypeError",
    "ReferenceError",
    "SyntaxError",
    "RangeError",
    "EvalError",
    "URIError",
];

/// Preferred type for ToPrimitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hint {
    Default,
    Number,
    String,
}

/// Intrinsic prototypes of a realm.
pub struct Intrinsics {
    pub object_prototype: ObjectRef,
    pub function_prototype: ObjectRef,
    pub array_prototype: ObjectRef,
    pub string_prototype: ObjectRef,
    pub number_prototype: ObjectRef,
    pub boolean_prototype: ObjectRef,
    pub error_prototype: ObjectRef,
    pub array_buffer_prototype: ObjectRef,
    native_errors: Vec<(&'static str, ObjectRef)>,
}

fn derived(prototype: &ObjectRef) -> ObjectRef {
    Rc::new(RefCell::new(JsObject::with_prototype(Some(Rc::clone(prototype)))))
}

impl Intrinsics {
    fn new() -> Self {
        let object_prototype = Rc::new(RefCell::new(JsObject::new()));
        let error_prototype = derived(&object_prototype);
        {
            let mut proto = error_prototype.borrow_mut();
            proto.define_property(PropertyKey::string("name"), Value::string("Error"), Attributes::HIDDEN);
            proto.define_property(PropertyKey::string("message"), Value::string(""), Attributes::HIDDEN);
        }

        let native_errors = NATIVE_ERRORS
            .iter()
            .map(|&name| {
                let proto = derived(&error_prototype);
                {
                    let mut p = proto.borrow_mut();
                    p.define_property(PropertyKey::string("name"), Value::string(name), Attributes::HIDDEN);
                    p.define_property(PropertyKey::string("message"), Value::string(""), Attributes::HIDDEN);
                }
                (name, proto)
            })
            .collect();

        Intrinsics {
            function_prototype: derived(&object_prototype),
            array_prototype: derived(&object_prototype),
            string_prototype: derived(&object_prototype),
            number_prototype: derived(&object_prototype),
            boolean_prototype: derived(&object_prototype),
            array_buffer_prototype: derived(&object_prototype),
            error_prototype,
            native_errors,
            object_prototype,
        }
    }

    /// Prototype for error objects named `name`, if it is a known error type.
    pub fn error_prototype_for(&self, name: &str) -> Option<&ObjectRef> {
        if name == "Error" {
            return Some(&self.error_prototype);
        }
        self.native_errors
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, proto)| proto)
    }

    /// Native error subclass prototypes, by name.
    pub fn native_errors(&self) -> impl Iterator<Item = (&'static str, &ObjectRef)> {
        self.native_errors.iter().map(|(name, proto)| (*name, proto))
    }

    fn clear(&self) {
        let all = [
            &self.object_prototype,
            &self.function_prototype,
            &self.array_prototype,
            &self.string_prototype,
            &self.number_prototype,
            &self.boolean_prototype,
            &self.error_prototype,
            &self.array_buffer_prototype,
        ];
        for proto in all {
            proto.borrow_mut().clear();
        }
        for (_, proto) in &self.native_errors {
            proto.borrow_mut().clear();
        }
    }
}

/// Evaluation result of an assignable expression.
enum Reference {
    Binding(String),
    Property(Value, PropertyKey),
}

/// The JavaScript interpreter.
pub struct Interpreter {
    agent: Rc<Agent>,
    global_object: ObjectRef,
    global_env: EnvRef,
    intrinsics: Intrinsics,
    /// Script functions created in this realm, severed on teardown.
    closures: RefCell<Vec<Weak<RefCell<JsObject>>>>,
}

impl Interpreter {
    /// Create a new realm on `agent` with the standard builtins installed.
    pub fn new(agent: Rc<Agent>) -> Self {
        let intrinsics = Intrinsics::new();
        let global_object = Rc::new(RefCell::new(JsObject::with_prototype(Some(Rc::clone(
            &intrinsics.object_prototype,
        )))));
        let global_env = Rc::new(RefCell::new(Environment::global(Rc::clone(&global_object))));

        let interp = Interpreter {
            agent,
            global_object,
            global_env,
            intrinsics,
            closures: RefCell::new(Vec::new()),
        };

        builtin::init(&interp);

        interp
    }

    pub fn agent(&self) -> &Rc<Agent> {
        &self.agent
    }

    /// Get the global object.
    pub fn global_object(&self) -> &ObjectRef {
        &self.global_object
    }

    pub fn intrinsics(&self) -> &Intrinsics {
        &self.intrinsics
    }

    /// Define a non-enumerable global.
    pub fn define_global(&self, name: &str, value: Value) {
        self.global_object
            .borrow_mut()
            .define_property(PropertyKey::string(name), value, Attributes::HIDDEN);
    }

    // ---- object creation ----

    pub(crate) fn make_function(&self, callable: Callable, constructable: bool) -> ObjectRef {
        let mut obj = JsObject::function(callable, constructable);
        obj.set_prototype(Some(Rc::clone(&self.intrinsics.function_prototype)));
        Rc::new(RefCell::new(obj))
    }

    /// Create a builtin function.
    pub fn create_native_function(&self, name: &str, length: usize, func: NativeFn) -> Value {
        let callable = Callable::Native(NativeFunction {
            name: String::from(name),
            length,
            func,
        });
        Value::Object(self.make_function(callable, false))
    }

    /// Create a function backed by an embedder closure.
    pub fn create_host_function(&self, name: &str, length: usize, func: HostFn) -> Value {
        let callable = Callable::Host(HostFunction {
            name: String::from(name),
            length,
            func,
        });
        Value::Object(self.make_function(callable, false))
    }

    /// Install a builtin method on `target`.
    pub fn define_native_function(&self, target: &ObjectRef, name: &str, length: usize, func: NativeFn) {
        let function = self.create_native_function(name, length, func);
        target
            .borrow_mut()
            .define_property(PropertyKey::string(name), function, Attributes::HIDDEN);
    }

    /// Create a builtin constructor linked both ways with `prototype`.
    pub fn create_constructor(
        &self,
        name: &str,
        length: usize,
        func: NativeFn,
        prototype: &ObjectRef,
    ) -> ObjectRef {
        let callable = Callable::Native(NativeFunction {
            name: String::from(name),
            length,
            func,
        });
        let ctor = self.make_function(callable, true);
        ctor.borrow_mut().define_property(
            PropertyKey::string("prototype"),
            Value::Object(Rc::clone(prototype)),
            Attributes::READ_ONLY,
        );
        prototype.borrow_mut().define_property(
            PropertyKey::string("constructor"),
            Value::Object(Rc::clone(&ctor)),
            Attributes::HIDDEN,
        );
        ctor
    }

    /// Create an empty ordinary object.
    pub fn new_object(&self) -> ObjectRef {
        derived(&self.intrinsics.object_prototype)
    }

    /// Create an array holding `values`.
    pub fn new_array(&self, values: Vec<Value>) -> ObjectRef {
        let mut array = JsObject::array(values.into_iter().map(Some).collect());
        array.set_prototype(Some(Rc::clone(&self.intrinsics.array_prototype)));
        Rc::new(RefCell::new(array))
    }

    /// Create an error object of type `name` whose `stack` records the
    /// current call stack.
    pub fn create_error(&self, name: &str, message: &str) -> Value {
        let known = self.intrinsics.error_prototype_for(name);
        let prototype = Rc::clone(known.unwrap_or(&self.intrinsics.error_prototype));

        let mut error = JsObject::error();
        error.set_prototype(Some(prototype));
        if known.is_none() {
            error.define_property(PropertyKey::string("name"), Value::string(name), Attributes::HIDDEN);
        }
        error.define_property(PropertyKey::string("message"), Value::string(message), Attributes::HIDDEN);

        let mut stack = if message.is_empty() {
            String::from(name)
        } else {
            format!("{}: {}", name, message)
        };
        stack.push_str(&self.agent.stack_trace());
        error.define_property(PropertyKey::string("stack"), Value::String(stack), Attributes::HIDDEN);

        Value::object(error)
    }

    /// Create a script function closing over `env`.
    fn create_function(&self, func: &Rc<Function>, env: &EnvRef, name: &str) -> Value {
        let script = self
            .agent
            .current_script()
            .unwrap_or_else(|| Script::new("", ""));
        let callable = Callable::UserDefined(UserFunction {
            name: String::from(name),
            func: Rc::clone(func),
            environment: Rc::clone(env),
            script,
        });
        let obj = self.make_function(callable, !func.is_arrow);

        if !func.is_arrow {
            let prototype = self.new_object();
            prototype.borrow_mut().define_property(
                PropertyKey::string("constructor"),
                Value::Object(Rc::clone(&obj)),
                Attributes::HIDDEN,
            );
            obj.borrow_mut().define_property(
                PropertyKey::string("prototype"),
                Value::Object(prototype),
                Attributes {
                    writable: true,
                    enumerable: false,
                    configurable: false,
                },
            );
        }

        self.track_closure(&obj);
        Value::Object(obj)
    }

    fn track_closure(&self, obj: &ObjectRef) {
        let mut closures = self.closures.borrow_mut();
        if closures.len() == closures.capacity() && closures.len() >= 64 {
            closures.retain(|weak| weak.strong_count() > 0);
        }
        closures.push(Rc::downgrade(obj));
    }

    // ---- entry points ----

    /// Parse and run `script` in this realm, returning the completion value.
    ///
    /// Syntax errors surface as thrown `SyntaxError` objects located at the
    /// offending token.
    pub fn eval_script(&self, script: Rc<Script>) -> JsResult<Value> {
        let program = match parse(&script.source) {
            Ok(program) => program,
            Err(err) => return Err(self.syntax_error(&script, err)),
        };
        self.run_program(&script, &program)
    }

    fn syntax_error(&self, script: &Rc<Script>, err: ParseError) -> JsError {
        let error = self.create_error("SyntaxError", &err.message);
        if let Value::Object(obj) = &error {
            obj.borrow_mut().define_property(
                PropertyKey::string("stack"),
                Value::String(format!("SyntaxError: {}", err.message)),
                Attributes::HIDDEN,
            );
        }
        JsError::thrown(
            error,
            Some(Location {
                script: Rc::clone(script),
                span: err.span,
            }),
        )
    }

    /// Run an already parsed program of `script`.
    pub fn run_program(&self, script: &Rc<Script>, program: &Program) -> JsResult<Value> {
        self.agent
            .push_frame("", script, program.span)
            .map_err(|e| self.materialize(e))?;
        let result = self.execute_program(program);
        self.agent.pop_frame();
        result
    }

    fn execute_program(&self, program: &Program) -> JsResult<Value> {
        let env = &self.global_env;
        for name in &program.var_names {
            env.borrow_mut().declare_var(name);
        }
        self.hoist_declarations(&program.body, env)
            .map_err(|e| self.materialize(e))?;
        self.execute_statements(&program.body, env)
            .map(Completion::value)
    }

    /// Turn engine-raised errors into thrown error objects located at the
    /// current position. Thrown values and termination pass through.
    pub fn materialize(&self, err: JsError) -> JsError {
        match err {
            JsError::Thrown(_) | JsError::Terminated => err,
            native => {
                let value = self.create_error(native.name(), native.message());
                JsError::thrown(value, self.agent.current_location())
            }
        }
    }

    fn exception_value(&self, err: JsError) -> Value {
        match self.materialize(err) {
            JsError::Thrown(thrown) => thrown.value,
            other => self.create_error(other.name(), other.message()),
        }
    }

    fn throw(&self, value: Value) -> JsError {
        JsError::thrown(value, self.agent.current_location())
    }

    // ---- declarations ----

    /// Instantiate function declarations and reserve lexical bindings of a
    /// statement list.
    fn hoist_declarations(&self, body: &[Statement], env: &EnvRef) -> JsResult<()> {
        for stmt in body {
            match stmt {
                Statement::Function(func) => {
                    let value = self.create_function(func, env, func.name());
                    env.borrow_mut().initialize(func.name(), value);
                }
                Statement::Variable(decl) if decl.kind != VariableKind::Var => {
                    self.agent.set_position(decl.span);
                    for declarator in &decl.declarations {
                        env.borrow_mut()
                            .declare(&declarator.id.name, decl.kind == VariableKind::Let)?;
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    // ---- statements ----

    /// Run a statement list. The completion value is that of the last
    /// value-producing statement.
    fn execute_statements(&self, body: &[Statement], env: &EnvRef) -> JsResult<Completion> {
        let mut last = Value::Undefined;
        for stmt in body {
            match self.execute_statement(stmt, env)? {
                Completion::Normal(value) => {
                    if !matches!(
                        stmt,
                        Statement::Variable(_) | Statement::Function(_) | Statement::Empty(_)
                    ) {
                        last = value;
                    }
                }
                abrupt => return Ok(abrupt),
            }
        }
        Ok(Completion::Normal(last))
    }

    /// Execute a statement.
    fn execute_statement(&self, stmt: &Statement, env: &EnvRef) -> JsResult<Completion> {
        self.agent.set_position(stmt.span());
        self.execute_statement_inner(stmt, env)
            .map_err(|e| self.materialize(e))
    }

    fn execute_statement_inner(&self, stmt: &Statement, env: &EnvRef) -> JsResult<Completion> {
        match stmt {
            Statement::Empty(_) | Statement::Function(_) => Ok(Completion::empty()),
            Statement::Expression(expr) => {
                let value = self.evaluate(&expr.expression, env)?;
                Ok(Completion::Normal(value))
            }
            Statement::Block(block) => self.execute_block(block, env),
            Statement::Variable(decl) => self.execute_variable_declaration(decl, env),
            Statement::If(if_stmt) => {
                let test = self.evaluate(&if_stmt.test, env)?;
                if test.to_boolean() {
                    self.execute_statement(&if_stmt.consequent, env)
                } else if let Some(alt) = &if_stmt.alternate {
                    self.execute_statement(alt, env)
                } else {
                    Ok(Completion::empty())
                }
            }
            Statement::For(for_stmt) => self.execute_for(for_stmt, env),
            Statement::ForIn(for_in) => self.execute_for_in(for_in, env),
            Statement::ForOf(for_of) => self.execute_for_of(for_of, env),
            Statement::While(while_stmt) => self.execute_while(while_stmt, env),
            Statement::DoWhile(do_while) => self.execute_do_while(do_while, env),
            Statement::Switch(switch) => self.execute_switch(switch, env),
            Statement::Break(_) => Ok(Completion::Break),
            Statement::Continue(_) => Ok(Completion::Continue),
            Statement::Return(ret) => {
                let value = match &ret.argument {
                    Some(arg) => self.evaluate(arg, env)?,
                    None => Value::Undefined,
                };
                Ok(Completion::Return(value))
            }
            Statement::Throw(throw) => {
                let value = self.evaluate(&throw.argument, env)?;
                Err(self.throw(value))
            }
            Statement::Try(try_stmt) => self.execute_try(try_stmt, env),
        }
    }

    /// Execute a block in a fresh lexical scope.
    fn execute_block(&self, block: &BlockStmt, env: &EnvRef) -> JsResult<Completion> {
        let block_env = Rc::new(RefCell::new(Environment::child(Rc::clone(env))));
        self.hoist_declarations(&block.body, &block_env)?;
        self.execute_statements(&block.body, &block_env)
    }

    /// Execute variable declaration.
    fn execute_variable_declaration(&self, decl: &VariableDecl, env: &EnvRef) -> JsResult<Completion> {
        for declarator in &decl.declarations {
            let name = &declarator.id.name;
            match decl.kind {
                VariableKind::Var => {
                    if let Some(init) = &declarator.init {
                        let value = self.evaluate_named(init, name, env)?;
                        env.borrow_mut().set(name, value)?;
                    }
                }
                VariableKind::Let | VariableKind::Const => {
                    let value = match &declarator.init {
                        Some(init) => self.evaluate_named(init, name, env)?,
                        None => Value::Undefined,
                    };
                    env.borrow_mut().initialize(name, value);
                }
            }
        }
        Ok(Completion::empty())
    }

    /// Run one loop iteration body. `Some` ends the loop with that
    /// completion.
    fn loop_body(&self, body: &Statement, env: &EnvRef, last: &mut Value) -> JsResult<Option<Completion>> {
        match self.execute_statement(body, env)? {
            Completion::Normal(value) => {
                *last = value;
                Ok(None)
            }
            Completion::Continue => Ok(None),
            Completion::Break => Ok(Some(Completion::Normal(last.clone()))),
            Completion::Return(value) => Ok(Some(Completion::Return(value))),
        }
    }

    /// Execute for loop. `let` bindings of the initializer are copied into
    /// a fresh scope for every iteration so closures see per-iteration
    /// values.
    fn execute_for(&self, for_stmt: &ForStmt, env: &EnvRef) -> JsResult<Completion> {
        let loop_env = Rc::new(RefCell::new(Environment::child(Rc::clone(env))));
        let mut lexical: Vec<(&str, bool)> = Vec::new();

        match &for_stmt.init {
            Some(ForInit::Variable(decl)) => {
                if decl.kind != VariableKind::Var {
                    let mutable = decl.kind == VariableKind::Let;
                    for declarator in &decl.declarations {
                        loop_env.borrow_mut().declare(&declarator.id.name, mutable)?;
                        lexical.push((declarator.id.name.as_str(), mutable));
                    }
                }
                self.execute_variable_declaration(decl, &loop_env)?;
            }
            Some(ForInit::Expression(expr)) => {
                self.evaluate(expr, &loop_env)?;
            }
            None => {}
        }

        let mut current = loop_env;
        let mut last = Value::Undefined;

        loop {
            self.agent.check_interrupt()?;

            if let Some(test) = &for_stmt.test {
                if !self.evaluate(test, &current)?.to_boolean() {
                    break;
                }
            }

            if let Some(done) = self.loop_body(&for_stmt.body, &current, &mut last)? {
                return Ok(done);
            }

            if !lexical.is_empty() {
                let next = Rc::new(RefCell::new(Environment::child(Rc::clone(env))));
                for &(name, mutable) in &lexical {
                    let value = current.borrow().get(name)?;
                    let mut scope = next.borrow_mut();
                    scope.declare(name, mutable)?;
                    scope.initialize(name, value);
                }
                current = next;
            }

            if let Some(update) = &for_stmt.update {
                self.evaluate(update, &current)?;
            }
        }

        Ok(Completion::Normal(last))
    }

    /// Bind the loop variable of a for-in/for-of iteration, returning the
    /// scope the body runs in.
    fn bind_for_target(&self, left: &ForInLeft, value: Value, env: &EnvRef) -> JsResult<EnvRef> {
        match left {
            ForInLeft::Declaration(VariableKind::Var, id) => {
                env.borrow_mut().set(&id.name, value)?;
                Ok(Rc::clone(env))
            }
            ForInLeft::Declaration(kind, id) => {
                let scope = Rc::new(RefCell::new(Environment::child(Rc::clone(env))));
                {
                    let mut s = scope.borrow_mut();
                    s.declare(&id.name, *kind == VariableKind::Let)?;
                    s.initialize(&id.name, value);
                }
                Ok(scope)
            }
            ForInLeft::Target(target) => {
                let reference = self.evaluate_reference(target, env)?;
                self.put_reference(&reference, value, env)?;
                Ok(Rc::clone(env))
            }
        }
    }

    /// Execute for-in loop over enumerable keys, own and inherited.
    fn execute_for_in(&self, for_in: &ForInStmt, env: &EnvRef) -> JsResult<Completion> {
        let right = self.evaluate(&for_in.right, env)?;

        let keys: Vec<PropertyKey> = match &right {
            Value::Object(obj) => {
                let mut keys: Vec<PropertyKey> = Vec::new();
                let mut seen: Vec<PropertyKey> = Vec::new();
                let mut next = Some(Rc::clone(obj));
                while let Some(current) = next {
                    let o = current.borrow();
                    let enumerable = o.own_enumerable_keys();
                    for key in o.own_keys() {
                        if seen.contains(&key) {
                            continue;
                        }
                        if enumerable.contains(&key) {
                            keys.push(key.clone());
                        }
                        seen.push(key);
                    }
                    next = o.prototype().cloned();
                }
                keys
            }
            Value::String(s) => (0..s.chars().count() as u32).map(PropertyKey::Index).collect(),
            _ => Vec::new(),
        };

        let mut last = Value::Undefined;
        for key in keys {
            self.agent.check_interrupt()?;
            let scope = self.bind_for_target(&for_in.left, Value::String(key.to_string()), env)?;
            if let Some(done) = self.loop_body(&for_in.body, &scope, &mut last)? {
                return Ok(done);
            }
        }
        Ok(Completion::Normal(last))
    }

    /// Execute for-of loop over arrays (live length) and strings.
    fn execute_for_of(&self, for_of: &ForInStmt, env: &EnvRef) -> JsResult<Completion> {
        let iterable = self.evaluate(&for_of.right, env)?;
        let mut last = Value::Undefined;

        match &iterable {
            Value::Object(obj) if obj.borrow().is_array() => {
                let mut index = 0usize;
                loop {
                    self.agent.check_interrupt()?;
                    let item = {
                        let array = obj.borrow();
                        if index >= array.array_length() {
                            break;
                        }
                        array.get(&PropertyKey::Index(index as u32))
                    };
                    let scope = self.bind_for_target(&for_of.left, item, env)?;
                    if let Some(done) = self.loop_body(&for_of.body, &scope, &mut last)? {
                        return Ok(done);
                    }
                    index += 1;
                }
            }
            Value::String(s) => {
                for ch in s.chars() {
                    self.agent.check_interrupt()?;
                    let scope = self.bind_for_target(&for_of.left, Value::String(ch.to_string()), env)?;
                    if let Some(done) = self.loop_body(&for_of.body, &scope, &mut last)? {
                        return Ok(done);
                    }
                }
            }
            other => {
                return Err(JsError::type_error(format!(
                    "{} is not iterable",
                    describe_expression(&for_of.right, other)
                )));
            }
        }

        Ok(Completion::Normal(last))
    }

    /// Execute while loop.
    fn execute_while(&self, while_stmt: &WhileStmt, env: &EnvRef) -> JsResult<Completion> {
        let mut last = Value::Undefined;
        loop {
            self.agent.check_interrupt()?;
            if !self.evaluate(&while_stmt.test, env)?.to_boolean() {
                break;
            }
            if let Some(done) = self.loop_body(&while_stmt.body, env, &mut last)? {
                return Ok(done);
            }
        }
        Ok(Completion::Normal(last))
    }

    /// Execute do-while loop.
    fn execute_do_while(&self, do_while: &WhileStmt, env: &EnvRef) -> JsResult<Completion> {
        let mut last = Value::Undefined;
        loop {
            self.agent.check_interrupt()?;
            if let Some(done) = self.loop_body(&do_while.body, env, &mut last)? {
                return Ok(done);
            }
            if !self.evaluate(&do_while.test, env)?.to_boolean() {
                break;
            }
        }
        Ok(Completion::Normal(last))
    }

    /// Execute switch statement: strict-equality match, then fall through.
    fn execute_switch(&self, switch: &SwitchStmt, env: &EnvRef) -> JsResult<Completion> {
        let discriminant = self.evaluate(&switch.discriminant, env)?;
        let case_env = Rc::new(RefCell::new(Environment::child(Rc::clone(env))));
        for case in &switch.cases {
            self.hoist_declarations(&case.consequent, &case_env)?;
        }

        let mut matched = None;
        for (i, case) in switch.cases.iter().enumerate() {
            if let Some(test) = &case.test {
                if discriminant.strict_equals(&self.evaluate(test, &case_env)?) {
                    matched = Some(i);
                    break;
                }
            }
        }
        let start = matched.or_else(|| switch.cases.iter().position(|c| c.test.is_none()));

        let mut last = Value::Undefined;
        if let Some(start) = start {
            for case in &switch.cases[start..] {
                match self.execute_statements(&case.consequent, &case_env)? {
                    Completion::Normal(value) => {
                        if !case.consequent.is_empty() {
                            last = value;
                        }
                    }
                    Completion::Break => break,
                    abrupt => return Ok(abrupt),
                }
            }
        }
        Ok(Completion::Normal(last))
    }

    /// Execute try statement. Termination skips both `catch` and `finally`.
    fn execute_try(&self, try_stmt: &TryStmt, env: &EnvRef) -> JsResult<Completion> {
        let mut result = self.execute_block(&try_stmt.block, env);

        if let Some(handler) = &try_stmt.handler {
            if let Err(err) = result {
                if !err.is_catchable() {
                    return Err(err);
                }
                let value = self.exception_value(err);
                let catch_env = Rc::new(RefCell::new(Environment::child(Rc::clone(env))));
                if let Some(param) = &handler.param {
                    let mut scope = catch_env.borrow_mut();
                    scope.declare(&param.name, true)?;
                    scope.initialize(&param.name, value);
                }
                result = self.execute_block(&handler.body, &catch_env);
            }
        }

        if let Some(finalizer) = &try_stmt.finalizer {
            if matches!(result, Err(JsError::Terminated)) {
                return result;
            }
            let completion = self.execute_block(finalizer, env)?;
            if !completion.is_normal() {
                return Ok(completion);
            }
        }

        result
    }

    // ---- expressions ----

    /// Evaluate an expression.
    pub fn evaluate(&self, expr: &Expression, env: &EnvRef) -> JsResult<Value> {
        match expr {
            Expression::Identifier(id) => env.borrow().get(&id.name),
            Expression::Literal(lit) => Ok(match lit {
                Literal::Null(_) => Value::Null,
                Literal::Boolean(b, _) => Value::Boolean(*b),
                Literal::Number(n, _) => Value::Number(*n),
                Literal::String(s, _) => Value::String(s.clone()),
            }),
            Expression::This(_) => Ok(env.borrow().get_this()),
            Expression::Array(array) => self.evaluate_array(array, env),
            Expression::Object(object) => self.evaluate_object(object, env),
            Expression::Function(func) => Ok(self.evaluate_function_expression(func, "", env)),
            Expression::Template(template) => {
                let mut out = String::new();
                for (i, quasi) in template.quasis.iter().enumerate() {
                    out.push_str(quasi);
                    if let Some(expr) = template.expressions.get(i) {
                        let value = self.evaluate(expr, env)?;
                        out.push_str(&self.to_string(&value)?);
                    }
                }
                Ok(Value::String(out))
            }
            Expression::Member(member) => Ok(self
                .evaluate_member(member, env)?
                .map(|(_, value)| value)
                .unwrap_or_default()),
            Expression::Call(call) => Ok(self.evaluate_call(call, env)?.unwrap_or_default()),
            Expression::New(call) => self.evaluate_new(call, env),
            Expression::Update(update) => self.evaluate_update(update, env),
            Expression::Unary(unary) => self.evaluate_unary(unary, env),
            Expression::Binary(binary) => {
                let left = self.evaluate(&binary.left, env)?;
                let right = self.evaluate(&binary.right, env)?;
                self.binary_op(binary.operator, &left, &right)
            }
            Expression::Logical(logical) => {
                let left = self.evaluate(&logical.left, env)?;
                let short_circuit = match logical.operator {
                    LogicalOp::And => !left.to_boolean(),
                    LogicalOp::Or => left.to_boolean(),
                    LogicalOp::Nullish => !left.is_nullish(),
                };
                if short_circuit {
                    Ok(left)
                } else {
                    self.evaluate(&logical.right, env)
                }
            }
            Expression::Conditional(cond) => {
                if self.evaluate(&cond.test, env)?.to_boolean() {
                    self.evaluate(&cond.consequent, env)
                } else {
                    self.evaluate(&cond.alternate, env)
                }
            }
            Expression::Assignment(assign) => self.evaluate_assignment(assign, env),
            Expression::Sequence(seq) => {
                let mut last = Value::Undefined;
                for expr in &seq.expressions {
                    last = self.evaluate(expr, env)?;
                }
                Ok(last)
            }
            Expression::Spread(_) => Err(JsError::syntax("Unexpected token '...'")),
        }
    }

    /// Evaluate `expr`, naming it `name` if it is an anonymous function.
    fn evaluate_named(&self, expr: &Expression, name: &str, env: &EnvRef) -> JsResult<Value> {
        match expr {
            Expression::Function(func) if func.id.is_none() => {
                Ok(self.evaluate_function_expression(func, name, env))
            }
            _ => self.evaluate(expr, env),
        }
    }

    fn evaluate_function_expression(&self, func: &Rc<Function>, inferred: &str, env: &EnvRef) -> Value {
        match &func.id {
            Some(id) => {
                // The name of a named function expression is bound inside it.
                let scope = Rc::new(RefCell::new(Environment::child(Rc::clone(env))));
                let value = self.create_function(func, &scope, &id.name);
                scope.borrow_mut().initialize(&id.name, value.clone());
                value
            }
            None => self.create_function(func, env, inferred),
        }
    }

    /// Collect spread or plain arguments.
    fn evaluate_arguments(&self, args: &[Expression], env: &EnvRef) -> JsResult<Vec<Value>> {
        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            match arg {
                Expression::Spread(spread) => {
                    let value = self.evaluate(&spread.argument, env)?;
                    values.extend(self.spread_values(&spread.argument, &value)?);
                }
                _ => values.push(self.evaluate(arg, env)?),
            }
        }
        Ok(values)
    }

    fn spread_values(&self, expr: &Expression, value: &Value) -> JsResult<Vec<Value>> {
        match value {
            Value::Object(obj) if obj.borrow().is_array() => {
                let array = obj.borrow();
                Ok((0..array.array_length())
                    .map(|i| array.get(&PropertyKey::Index(i as u32)))
                    .collect())
            }
            Value::String(s) => Ok(s.chars().map(|c| Value::String(c.to_string())).collect()),
            other => Err(JsError::type_error(format!(
                "{} is not iterable",
                describe_expression(expr, other)
            ))),
        }
    }

    fn evaluate_array(&self, array: &ArrayExpr, env: &EnvRef) -> JsResult<Value> {
        let mut elements = Vec::with_capacity(array.elements.len());
        for element in &array.elements {
            match element {
                None => elements.push(None),
                Some(Expression::Spread(spread)) => {
                    let value = self.evaluate(&spread.argument, env)?;
                    elements.extend(self.spread_values(&spread.argument, &value)?.into_iter().map(Some));
                }
                Some(expr) => elements.push(Some(self.evaluate(expr, env)?)),
            }
        }
        let mut obj = JsObject::array(elements);
        obj.set_prototype(Some(Rc::clone(&self.intrinsics.array_prototype)));
        Ok(Value::object(obj))
    }

    fn evaluate_object(&self, object: &ObjectExpr, env: &EnvRef) -> JsResult<Value> {
        let obj = self.new_object();
        for prop in &object.properties {
            match prop {
                ObjectProperty::Property { key, value } => {
                    let key = match key {
                        PropertyName::Static(name) => PropertyKey::from(name.as_str()),
                        PropertyName::Computed(expr) => {
                            let k = self.evaluate(expr, env)?;
                            self.to_property_key(&k)?
                        }
                    };
                    let value = self.evaluate_named(value, &key.to_string(), env)?;
                    obj.borrow_mut().define_property(key, value, Attributes::DEFAULT);
                }
                ObjectProperty::Spread(expr) => {
                    let source = self.evaluate(expr, env)?;
                    let entries = match &source {
                        Value::Object(src) => self.own_enumerable_entries(src),
                        Value::String(s) => s
                            .chars()
                            .enumerate()
                            .map(|(i, c)| (PropertyKey::Index(i as u32), Value::String(c.to_string())))
                            .collect(),
                        _ => Vec::new(),
                    };
                    let mut target = obj.borrow_mut();
                    for (key, value) in entries {
                        target.define_property(key, value, Attributes::DEFAULT);
                    }
                }
            }
        }
        Ok(Value::Object(obj))
    }

    fn member_key(&self, property: &MemberProperty, env: &EnvRef) -> JsResult<PropertyKey> {
        match property {
            MemberProperty::Static(name) => Ok(PropertyKey::from(name.as_str())),
            MemberProperty::Computed(expr) => {
                let key = self.evaluate(expr, env)?;
                self.to_property_key(&key)
            }
        }
    }

    /// Evaluate a member expression to `(base, value)`; `None` when an
    /// optional link short-circuits the chain.
    fn evaluate_member(&self, member: &MemberExpr, env: &EnvRef) -> JsResult<Option<(Value, Value)>> {
        let base = match self.evaluate_chain_link(&member.object, env)? {
            Some(base) => base,
            None => return Ok(None),
        };
        if member.optional && base.is_nullish() {
            return Ok(None);
        }
        let key = self.member_key(&member.property, env)?;
        let value = self.get_property(&base, &key)?;
        Ok(Some((base, value)))
    }

    fn evaluate_chain_link(&self, expr: &Expression, env: &EnvRef) -> JsResult<Option<Value>> {
        match expr {
            Expression::Member(member) => Ok(self.evaluate_member(member, env)?.map(|(_, v)| v)),
            Expression::Call(call) => self.evaluate_call(call, env),
            _ => self.evaluate(expr, env).map(Some),
        }
    }

    /// Evaluate a call; `None` when an optional link short-circuits.
    fn evaluate_call(&self, call: &CallExpr, env: &EnvRef) -> JsResult<Option<Value>> {
        let (this, func) = match call.callee.as_ref() {
            Expression::Member(member) => match self.evaluate_member(member, env)? {
                Some(pair) => pair,
                None => return Ok(None),
            },
            callee => match self.evaluate_chain_link(callee, env)? {
                Some(func) => (Value::Undefined, func),
                None => return Ok(None),
            },
        };
        if call.optional && func.is_nullish() {
            return Ok(None);
        }

        let args = self.evaluate_arguments(&call.arguments, env)?;

        self.agent.set_position(call.span);
        if !func.is_function() {
            return Err(JsError::type_error(format!(
                "{} is not a function",
                callee_text(&call.callee)
            )));
        }
        self.call(&func, &this, &args).map(Some)
    }

    fn evaluate_new(&self, call: &CallExpr, env: &EnvRef) -> JsResult<Value> {
        let func = self.evaluate(&call.callee, env)?;
        let args = self.evaluate_arguments(&call.arguments, env)?;

        self.agent.set_position(call.span);
        let constructable = match &func {
            Value::Object(obj) => obj.borrow().is_constructable(),
            _ => false,
        };
        if !constructable {
            return Err(JsError::type_error(format!(
                "{} is not a constructor",
                callee_text(&call.callee)
            )));
        }
        self.construct(&func, &args)
    }

    fn evaluate_reference(&self, expr: &Expression, env: &EnvRef) -> JsResult<Reference> {
        match expr {
            Expression::Identifier(id) => Ok(Reference::Binding(id.name.clone())),
            Expression::Member(member) => {
                let base = self.evaluate(&member.object, env)?;
                let key = self.member_key(&member.property, env)?;
                Ok(Reference::Property(base, key))
            }
            _ => Err(JsError::syntax("Invalid left-hand side in assignment")),
        }
    }

    fn get_reference(&self, reference: &Reference, env: &EnvRef) -> JsResult<Value> {
        match reference {
            Reference::Binding(name) => env.borrow().get(name),
            Reference::Property(base, key) => self.get_property(base, key),
        }
    }

    fn put_reference(&self, reference: &Reference, value: Value, env: &EnvRef) -> JsResult<()> {
        match reference {
            Reference::Binding(name) => env.borrow_mut().set(name, value),
            Reference::Property(base, key) => self.set_property(base, key.clone(), value).map(|_| ()),
        }
    }

    fn evaluate_assignment(&self, assign: &AssignmentExpr, env: &EnvRef) -> JsResult<Value> {
        let reference = self.evaluate_reference(&assign.left, env)?;
        let name = match assign.left.as_ref() {
            Expression::Identifier(id) => id.name.as_str(),
            _ => "",
        };

        let value = match assign.operator {
            AssignmentOp::Assign => self.evaluate_named(&assign.right, name, env)?,
            op => {
                let current = self.get_reference(&reference, env)?;
                match op.binary_op() {
                    Some(binary) => {
                        let right = self.evaluate(&assign.right, env)?;
                        self.binary_op(binary, &current, &right)?
                    }
                    None => {
                        let keep = match op {
                            AssignmentOp::AndAssign => !current.to_boolean(),
                            AssignmentOp::OrAssign => current.to_boolean(),
                            _ => !current.is_nullish(),
                        };
                        if keep {
                            return Ok(current);
                        }
                        self.evaluate_named(&assign.right, name, env)?
                    }
                }
            }
        };

        self.put_reference(&reference, value.clone(), env)?;
        Ok(value)
    }

    fn evaluate_update(&self, update: &UpdateExpr, env: &EnvRef) -> JsResult<Value> {
        let reference = self.evaluate_reference(&update.argument, env)?;
        let old = self.get_reference(&reference, env)?;
        let old = self.to_number(&old)?;
        let new = match update.operator {
            UpdateOp::Increment => old + 1.0,
            UpdateOp::Decrement => old - 1.0,
        };
        self.put_reference(&reference, Value::Number(new), env)?;
        Ok(Value::Number(if update.prefix { new } else { old }))
    }

    fn evaluate_unary(&self, unary: &UnaryExpr, env: &EnvRef) -> JsResult<Value> {
        match unary.operator {
            UnaryOp::Typeof => {
                if let Expression::Identifier(id) = unary.argument.as_ref() {
                    let value = env.borrow().lookup(&id.name)?;
                    return Ok(Value::string(value.unwrap_or_default().type_of()));
                }
                let value = self.evaluate(&unary.argument, env)?;
                Ok(Value::string(value.type_of()))
            }
            UnaryOp::Delete => match unary.argument.as_ref() {
                Expression::Member(member) => {
                    let base = self.evaluate(&member.object, env)?;
                    let key = self.member_key(&member.property, env)?;
                    match &base {
                        Value::Object(obj) => Ok(Value::Boolean(obj.borrow_mut().delete(&key))),
                        Value::Undefined | Value::Null => Err(JsError::type_error(
                            "Cannot convert undefined or null to object",
                        )),
                        _ => Ok(Value::Boolean(true)),
                    }
                }
                Expression::Identifier(_) => Ok(Value::Boolean(false)),
                other => {
                    self.evaluate(other, env)?;
                    Ok(Value::Boolean(true))
                }
            },
            op => {
                let value = self.evaluate(&unary.argument, env)?;
                Ok(match op {
                    UnaryOp::Minus => Value::Number(-self.to_number(&value)?),
                    UnaryOp::Plus => Value::Number(self.to_number(&value)?),
                    UnaryOp::Not => Value::Boolean(!value.to_boolean()),
                    UnaryOp::BitNot => Value::Number(!number_to_i32(self.to_number(&value)?) as f64),
                    _ => Value::Undefined,
                })
            }
        }
    }

    /// Apply a binary operator to two evaluated operands.
    pub fn binary_op(&self, op: BinaryOp, left: &Value, right: &Value) -> JsResult<Value> {
        let value = match op {
            BinaryOp::Add => {
                let l = self.to_primitive(left, Hint::Default)?;
                let r = self.to_primitive(right, Hint::Default)?;
                if l.is_string() || r.is_string() {
                    let mut s = l.to_display_string();
                    s.push_str(&r.to_display_string());
                    Value::String(s)
                } else {
                    Value::Number(l.to_number() + r.to_number())
                }
            }
            BinaryOp::Sub => Value::Number(self.to_number(left)? - self.to_number(right)?),
            BinaryOp::Mul => Value::Number(self.to_number(left)? * self.to_number(right)?),
            BinaryOp::Div => Value::Number(self.to_number(left)? / self.to_number(right)?),
            BinaryOp::Mod => Value::Number(fmod(self.to_number(left)?, self.to_number(right)?)),
            BinaryOp::Exp => Value::Number(pow(self.to_number(left)?, self.to_number(right)?)),
            BinaryOp::Equal => Value::Boolean(self.loose_equals(left, right)?),
            BinaryOp::NotEqual => Value::Boolean(!self.loose_equals(left, right)?),
            BinaryOp::StrictEqual => Value::Boolean(left.strict_equals(right)),
            BinaryOp::StrictNotEqual => Value::Boolean(!left.strict_equals(right)),
            BinaryOp::LessThan => Value::Boolean(self.less_than(left, right)? == Some(true)),
            BinaryOp::GreaterThan => Value::Boolean(self.less_than(right, left)? == Some(true)),
            BinaryOp::LessEqual => Value::Boolean(self.less_than(right, left)? == Some(false)),
            BinaryOp::GreaterEqual => Value::Boolean(self.less_than(left, right)? == Some(false)),
            BinaryOp::LeftShift => {
                let l = number_to_i32(self.to_number(left)?);
                let r = number_to_u32(self.to_number(right)?);
                Value::Number(l.wrapping_shl(r & 31) as f64)
            }
            BinaryOp::RightShift => {
                let l = number_to_i32(self.to_number(left)?);
                let r = number_to_u32(self.to_number(right)?);
                Value::Number((l >> (r & 31)) as f64)
            }
            BinaryOp::UnsignedRightShift => {
                let l = number_to_u32(self.to_number(left)?);
                let r = number_to_u32(self.to_number(right)?);
                Value::Number((l >> (r & 31)) as f64)
            }
            BinaryOp::BitAnd => Value::Number(
                (number_to_i32(self.to_number(left)?) & number_to_i32(self.to_number(right)?)) as f64,
            ),
            BinaryOp::BitOr => Value::Number(
                (number_to_i32(self.to_number(left)?) | number_to_i32(self.to_number(right)?)) as f64,
            ),
            BinaryOp::BitXor => Value::Number(
                (number_to_i32(self.to_number(left)?) ^ number_to_i32(self.to_number(right)?)) as f64,
            ),
            BinaryOp::In => match right {
                Value::Object(obj) => {
                    let key = self.to_property_key(left)?;
                    Value::Boolean(obj.borrow().has(&key))
                }
                other => {
                    return Err(JsError::type_error(format!(
                        "Cannot use 'in' operator to search for '{}' in {}",
                        self.to_string(left)?,
                        other.to_display_string()
                    )))
                }
            },
            BinaryOp::Instanceof => Value::Boolean(self.instance_of(left, right)?),
        };
        Ok(value)
    }

    /// Abstract relational comparison; `None` when either side is `NaN`.
    fn less_than(&self, left: &Value, right: &Value) -> JsResult<Option<bool>> {
        let l = self.to_primitive(left, Hint::Number)?;
        let r = self.to_primitive(right, Hint::Number)?;
        if let (Value::String(a), Value::String(b)) = (&l, &r) {
            return Ok(Some(a < b));
        }
        let (a, b) = (l.to_number(), r.to_number());
        if a.is_nan() || b.is_nan() {
            Ok(None)
        } else {
            Ok(Some(a < b))
        }
    }

    /// Abstract equality (==).
    pub fn loose_equals(&self, left: &Value, right: &Value) -> JsResult<bool> {
        Ok(match (left, right) {
            (Value::Undefined | Value::Null, Value::Undefined | Value::Null) => true,
            (Value::Undefined | Value::Null, _) | (_, Value::Undefined | Value::Null) => false,
            (Value::Object(_), Value::Object(_)) => left.strict_equals(right),
            (Value::Object(_), _) => {
                let prim = self.to_primitive(left, Hint::Default)?;
                return self.loose_equals(&prim, right);
            }
            (_, Value::Object(_)) => {
                let prim = self.to_primitive(right, Hint::Default)?;
                return self.loose_equals(left, &prim);
            }
            (Value::Boolean(_), _)
            | (_, Value::Boolean(_))
            | (Value::Number(_), Value::String(_))
            | (Value::String(_), Value::Number(_)) => left.to_number() == right.to_number(),
            _ => left.strict_equals(right),
        })
    }

    fn instance_of(&self, value: &Value, ctor: &Value) -> JsResult<bool> {
        let ctor_obj = match ctor {
            Value::Object(obj) if obj.borrow().is_callable() => Rc::clone(obj),
            _ => {
                return Err(JsError::type_error(
                    "Right-hand side of 'instanceof' is not callable",
                ))
            }
        };
        let bound_target = match ctor_obj.borrow().callable() {
            Some(Callable::Bound(bound)) => Some(bound.target.clone()),
            _ => None,
        };
        if let Some(target) = bound_target {
            return self.instance_of(value, &target);
        }

        let prototype = match ctor_obj.borrow().get(&PropertyKey::string("prototype")) {
            Value::Object(proto) => proto,
            _ => {
                return Err(JsError::type_error(
                    "Function has non-object prototype in instanceof check",
                ))
            }
        };

        let mut next = match value {
            Value::Object(obj) => obj.borrow().prototype().cloned(),
            _ => return Ok(false),
        };
        while let Some(proto) = next {
            if Rc::ptr_eq(&proto, &prototype) {
                return Ok(true);
            }
            next = proto.borrow().prototype().cloned();
        }
        Ok(false)
    }

    // ---- calls ----

    /// Call `func` with `this` and `args`.
    pub fn call(&self, func: &Value, this: &Value, args: &[Value]) -> JsResult<Value> {
        let callable = match func {
            Value::Object(obj) => obj.borrow().callable().cloned(),
            _ => None,
        };
        match callable {
            Some(callable) => self.call_callable(&callable, this, args),
            None => Err(JsError::type_error(format!(
                "{} is not a function",
                describe_value(func)
            ))),
        }
    }

    fn call_callable(&self, callable: &Callable, this: &Value, args: &[Value]) -> JsResult<Value> {
        match callable {
            Callable::Native(native) => {
                self.agent.enter_native()?;
                let result = (native.func)(self, this, args);
                self.agent.leave_native();
                result
            }
            Callable::Host(host) => {
                self.agent.enter_native()?;
                let result = (host.func)(self, this, args);
                self.agent.leave_native();
                result
            }
            Callable::UserDefined(func) => self.call_user_function(func, this, args),
            Callable::Bound(bound) => {
                let mut full = bound.bound_args.clone();
                full.extend_from_slice(args);
                self.call(&bound.target, &bound.bound_this, &full)
            }
        }
    }

    fn call_user_function(&self, func: &UserFunction, this: &Value, args: &[Value]) -> JsResult<Value> {
        self.agent.push_frame(&func.name, &func.script, func.func.span)?;
        let result = self.invoke(func, this, args).map_err(|e| self.materialize(e));
        self.agent.pop_frame();
        result
    }

    /// Bind parameters and run a script function body.
    fn invoke(&self, func: &UserFunction, this: &Value, args: &[Value]) -> JsResult<Value> {
        let f = &func.func;
        let this_binding = if f.is_arrow {
            None
        } else if this.is_nullish() {
            Some(Value::Object(Rc::clone(&self.global_object)))
        } else {
            Some(this.clone())
        };
        let env = Rc::new(RefCell::new(Environment::function(
            Rc::clone(&func.environment),
            this_binding,
        )));

        if !f.is_arrow {
            let arguments = self.new_array(args.to_vec());
            env.borrow_mut().initialize("arguments", Value::Object(arguments));
        }

        for (i, param) in f.params.iter().enumerate() {
            let value = match param {
                Pattern::Identifier(_) => args.get(i).cloned().unwrap_or_default(),
                Pattern::Assignment(id, default) => match args.get(i) {
                    Some(arg) if !arg.is_undefined() => arg.clone(),
                    _ => self.evaluate_named(default, &id.name, &env)?,
                },
                Pattern::Rest(_) => {
                    let rest = args.get(i..).map(<[Value]>::to_vec).unwrap_or_default();
                    Value::Object(self.new_array(rest))
                }
            };
            env.borrow_mut().initialize(&param.identifier().name, value);
        }

        for name in &f.var_names {
            env.borrow_mut().declare_var(name);
        }

        match &f.body {
            FunctionBody::Block(block) => {
                self.hoist_declarations(&block.body, &env)?;
                match self.execute_statements(&block.body, &env)? {
                    Completion::Return(value) => Ok(value),
                    _ => Ok(Value::Undefined),
                }
            }
            FunctionBody::Expression(expr) => self.evaluate(expr, &env),
        }
    }

    /// `new func(...args)`.
    pub fn construct(&self, func: &Value, args: &[Value]) -> JsResult<Value> {
        let callable = match func {
            Value::Object(obj) => {
                let obj = obj.borrow();
                if obj.is_constructable() {
                    obj.callable().cloned()
                } else {
                    None
                }
            }
            _ => None,
        };
        let callable = callable.ok_or_else(|| {
            JsError::type_error(format!("{} is not a constructor", describe_value(func)))
        })?;

        match &callable {
            Callable::UserDefined(user) => {
                let prototype = match self.get_property(func, &PropertyKey::string("prototype"))? {
                    Value::Object(proto) => proto,
                    _ => Rc::clone(&self.intrinsics.object_prototype),
                };
                let this = Value::object(JsObject::with_prototype(Some(prototype)));
                let result = self.call_user_function(user, &this, args)?;
                Ok(if result.is_object() { result } else { this })
            }
            Callable::Bound(bound) => {
                let mut full = bound.bound_args.clone();
                full.extend_from_slice(args);
                self.construct(&bound.target, &full)
            }
            native => self.call_callable(native, &Value::Undefined, args),
        }
    }

    // ---- property access ----

    /// Read `target[key]`. Primitives read through their prototypes.
    pub fn get_property(&self, target: &Value, key: &PropertyKey) -> JsResult<Value> {
        let proto = match target {
            Value::Object(obj) => return Ok(obj.borrow().get(key)),
            Value::String(s) => {
                if key.is("length") {
                    return Ok(Value::Number(s.chars().count() as f64));
                }
                if let Some(i) = key.as_index() {
                    if let Some(ch) = s.chars().nth(i as usize) {
                        return Ok(Value::String(ch.to_string()));
                    }
                }
                &self.intrinsics.string_prototype
            }
            Value::Number(_) => &self.intrinsics.number_prototype,
            Value::Boolean(_) => &self.intrinsics.boolean_prototype,
            Value::Undefined | Value::Null => {
                return Err(JsError::type_error(format!(
                    "Cannot read property '{}' of {}",
                    key, target
                )))
            }
        };
        Ok(proto.borrow().get(key))
    }

    /// Write `target[key] = value`. Returns `false` when the write was
    /// rejected (read-only property, non-extensible object, primitive).
    pub fn set_property(&self, target: &Value, key: PropertyKey, value: Value) -> JsResult<bool> {
        match target {
            Value::Object(obj) => Ok(obj.borrow_mut().set(key, value)),
            Value::Undefined | Value::Null => Err(JsError::type_error(format!(
                "Cannot set property '{}' of {}",
                key, target
            ))),
            _ => Ok(false),
        }
    }

    /// Own enumerable `(key, value)` pairs in enumeration order.
    pub fn own_enumerable_entries(&self, obj: &ObjectRef) -> Vec<(PropertyKey, Value)> {
        let obj = obj.borrow();
        obj.own_enumerable_keys()
            .into_iter()
            .filter_map(|key| obj.get_own(&key).map(|value| (key, value)))
            .collect()
    }

    // ---- conversions ----

    /// ToPrimitive: `valueOf` then `toString`, or the reverse for a string
    /// hint.
    pub fn to_primitive(&self, value: &Value, hint: Hint) -> JsResult<Value> {
        if !value.is_object() {
            return Ok(value.clone());
        }
        let order = if hint == Hint::String {
            ["toString", "valueOf"]
        } else {
            ["valueOf", "toString"]
        };
        for name in order {
            let method = self.get_property(value, &PropertyKey::string(name))?;
            if method.is_function() {
                let result = self.call(&method, value, &[])?;
                if !result.is_object() {
                    return Ok(result);
                }
            }
        }
        Err(JsError::type_error("Cannot convert object to primitive value"))
    }

    /// ToString.
    pub fn to_string(&self, value: &Value) -> JsResult<String> {
        match value {
            Value::Object(_) => {
                let prim = self.to_primitive(value, Hint::String)?;
                Ok(prim.to_display_string())
            }
            _ => Ok(value.to_display_string()),
        }
    }

    /// ToNumber.
    pub fn to_number(&self, value: &Value) -> JsResult<f64> {
        match value {
            Value::Object(_) => Ok(self.to_primitive(value, Hint::Number)?.to_number()),
            _ => Ok(value.to_number()),
        }
    }

    /// ToPropertyKey.
    pub fn to_property_key(&self, value: &Value) -> JsResult<PropertyKey> {
        match value {
            Value::Number(n) if *n >= 0.0 && *n < u32::MAX as f64 && libm::trunc(*n) == *n => {
                Ok(PropertyKey::Index(*n as u32))
            }
            Value::Number(n) => Ok(PropertyKey::from(number_to_string(*n))),
            Value::String(s) => Ok(PropertyKey::from(s.as_str())),
            other => Ok(PropertyKey::from(self.to_string(other)?)),
        }
    }

    // ---- JSON ----

    /// `JSON.stringify(value)`; `None` for values with no JSON form.
    pub fn json_stringify(&self, value: &Value) -> JsResult<Option<String>> {
        json::stringify(self, value)
    }

    /// `JSON.parse(text)`.
    pub fn json_parse(&self, text: &str) -> JsResult<Value> {
        json::parse(self, text)
    }
}

impl Drop for Interpreter {
    fn drop(&mut self) {
        for closure in self.closures.borrow().iter() {
            if let Some(func) = closure.upgrade() {
                if let Ok(mut func) = func.try_borrow_mut() {
                    func.clear();
                }
            }
        }
        self.global_env.borrow_mut().clear();
        self.global_object.borrow_mut().clear();
        self.intrinsics.clear();
    }
}

/// Source-like text for a callee in "is not a function" messages.
fn callee_text(expr: &Expression) -> String {
    match expr {
        Expression::Identifier(id) => id.name.clone(),
        Expression::This(_) => String::from("this"),
        Expression::Member(member) => {
            let object = callee_text(&member.object);
            match &member.property {
                MemberProperty::Static(name) => format!("{}.{}", object, name),
                MemberProperty::Computed(_) => format!("{}[...]", object),
            }
        }
        Expression::Call(call) => format!("{}(...)", callee_text(&call.callee)),
        _ => String::from("expression"),
    }
}

pub(crate) fn describe_value(value: &Value) -> String {
    match value {
        Value::Object(obj) if obj.borrow().is_array() => String::from("#<Array>"),
        Value::Object(_) => String::from("#<Object>"),
        Value::String(s) => format!("\"{}\"", s),
        other => other.to_display_string(),
    }
}

fn describe_expression(expr: &Expression, value: &Value) -> String {
    match expr {
        Expression::Identifier(_) | Expression::Member(_) | Expression::This(_) => callee_text(expr),
        _ => describe_value(value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::AgentConfig;

    fn realm() -> Interpreter {
        Interpreter::new(Rc::new(Agent::default()))
    }

    fn eval(interp: &Interpreter, source: &str) -> JsResult<Value> {
        interp.eval_script(Script::new("test.js", source))
    }

    fn eval_str(source: &str) -> String {
        let interp = realm();
        let value = eval(&interp, source).unwrap();
        interp.to_string(&value).unwrap()
    }

    fn thrown_message(err: JsError) -> (String, String) {
        match err {
            JsError::Thrown(thrown) => {
                let obj = thrown.value;
                let name = obj.as_object().unwrap().borrow().get(&PropertyKey::string("name"));
                let msg = obj.as_object().unwrap().borrow().get(&PropertyKey::string("message"));
                (name.to_display_string(), msg.to_display_string())
            }
            other => panic!("expected a thrown error, got {:?}", other),
        }
    }

    #[test]
    fn arithmetic_and_strings() {
        assert_eq!(eval_str("1 + 2 * 3"), "7");
        assert_eq!(eval_str("'a' + 1 + 2"), "a12");
        assert_eq!(eval_str("7 % 3 + 2 ** 10"), "1025");
        assert_eq!(eval_str("`x=${1 + 1}!`"), "x=2!");
        assert_eq!(eval_str("-1 >>> 28"), "15");
        assert_eq!(eval_str("'5' * '2'"), "10");
    }

    #[test]
    fn equality_and_comparison() {
        assert_eq!(eval_str("null == undefined"), "true");
        assert_eq!(eval_str("'1' == 1"), "true");
        assert_eq!(eval_str("'1' === 1"), "false");
        assert_eq!(eval_str("NaN <= NaN"), "false");
        assert_eq!(eval_str("'b' > 'a'"), "true");
    }

    #[test]
    fn closures_capture_per_iteration_bindings() {
        let src = "var fs = []; for (let i = 0; i < 3; i++) { fs.push(() => i); } fs.map(f => f()).join(',')";
        assert_eq!(eval_str(src), "0,1,2");
    }

    #[test]
    fn hoisting_and_completion_value() {
        assert_eq!(eval_str("f(); function f() { return 4; }"), "4");
        assert_eq!(eval_str("1; var x = 2;"), "1");
        assert_eq!(eval_str("typeof notDeclared"), "undefined");
    }

    #[test]
    fn try_catch_finally() {
        assert_eq!(eval_str("var r; try { throw 'x'; } catch (e) { r = e + 'y'; } r"), "xy");
        assert_eq!(eval_str("(function() { try { return 1; } finally { return 2; } })()"), "2");
        assert_eq!(
            eval_str("try { null.x; } catch (e) { e instanceof TypeError && e.message }"),
            "Cannot read property 'x' of null"
        );
    }

    #[test]
    fn uncaught_reference_error_has_stack() {
        let interp = realm();
        let err = eval(&interp, "\nfunction f() {\n  return dne;\n}\nf();").unwrap_err();
        let JsError::Thrown(thrown) = err else {
            panic!("expected thrown");
        };
        let location = thrown.location.unwrap();
        assert_eq!(location.line(), 3);
        let stack = thrown.value.as_object().unwrap().borrow().get(&PropertyKey::string("stack"));
        assert_eq!(
            stack.to_display_string(),
            "ReferenceError: dne is not defined\n    at f (test.js:3:3)\n    at test.js:5:1"
        );
    }

    #[test]
    fn syntax_errors_are_thrown_objects() {
        let interp = realm();
        let err = eval(&interp, "var x = ;").unwrap_err();
        let (name, message) = thrown_message(err);
        assert_eq!(name, "SyntaxError");
        assert_eq!(message, "Unexpected token ;");
    }

    #[test]
    fn calling_a_non_function() {
        let interp = realm();
        let (name, message) = thrown_message(eval(&interp, "var o = {}; o.missing()").unwrap_err());
        assert_eq!(name, "TypeError");
        assert_eq!(message, "o.missing is not a function");
    }

    #[test]
    fn constructors_and_prototypes() {
        let src = "function P(x) { this.x = x; } P.prototype.get = function() { return this.x; }; new P(9).get()";
        assert_eq!(eval_str(src), "9");
        assert_eq!(eval_str("var f = function() {}; f.name"), "f");
    }

    #[test]
    fn optional_chaining_short_circuits() {
        assert_eq!(eval_str("var o; o?.a.b.c"), "undefined");
        assert_eq!(eval_str("var o = {a: {b: 1}}; o?.a?.b"), "1");
    }

    #[test]
    fn call_depth_limit_is_catchable() {
        let agent = Rc::new(Agent::new(AgentConfig {
            max_call_depth: 32,
            ..AgentConfig::default()
        }));
        let interp = Interpreter::new(agent);
        let value = eval(
            &interp,
            "function r() { return r(); } try { r(); } catch (e) { e.message }",
        )
        .unwrap();
        assert_eq!(value.to_display_string(), "Maximum call stack size exceeded");
        assert_eq!(interp.agent().depth(), 0);
    }

    #[test]
    fn builtin_recursion_is_bounded() {
        let agent = Rc::new(Agent::new(AgentConfig {
            max_call_depth: 32,
            ..AgentConfig::default()
        }));
        let interp = Interpreter::new(agent);
        let value = eval(
            &interp,
            "var a = []; a.push(a); try { String(a); } catch (e) { e.name + ': ' + e.message }",
        )
        .unwrap();
        assert_eq!(
            value.to_display_string(),
            "RangeError: Maximum call stack size exceeded"
        );
        assert_eq!(eval(&interp, "[1, [2, 3]].join()").unwrap().to_display_string(), "1,2,3");
    }

    #[test]
    fn interrupt_terminates_and_skips_finally() {
        let interp = realm();
        eval(&interp, "var ran = false;").unwrap();
        interp.agent().interrupt_handle().store(true, core::sync::atomic::Ordering::SeqCst);
        let err = eval(&interp, "try { while (true) {} } finally { ran = true; }").unwrap_err();
        assert!(matches!(err, JsError::Terminated));
        interp.agent().clear_interrupt();
        assert_eq!(eval(&interp, "ran").unwrap().to_display_string(), "false");
    }

    #[test]
    fn for_in_and_for_of() {
        assert_eq!(
            eval_str("var out = ''; for (var k in {a: 1, b: 2}) out += k; out"),
            "ab"
        );
        assert_eq!(
            eval_str("var sum = 0; for (const v of [1, 2, 3]) sum += v; sum"),
            "6"
        );
    }

    #[test]
    fn const_assignment_fails() {
        let interp = realm();
        let (name, message) = thrown_message(eval(&interp, "const c = 1; c = 2;").unwrap_err());
        assert_eq!(name, "TypeError");
        assert_eq!(message, "Assignment to constant variable.");
    }
}
