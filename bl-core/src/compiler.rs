//! Session orchestration.
//!
//! A [`Session`] owns every table of one compilation. Units are registered
//! with [`Session::add_unit`], which only declares their top-level symbols;
//! [`Session::analyze`] then drives the scheduler until every task resolved
//! or failed. Analysis never stops at the first error: failures are recorded
//! as diagnostics and only the tasks depending on a failed one are dropped.

use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant};

use crate::ast::{Ast, AstId, Unit};
use crate::builder::{Builder, Halt};
use crate::diagnostic::{Diagnostic, ErrorKind};
use crate::error::CoreError;
use crate::mir::{FnFlavor, FnId, FnState, Mir, MirFn};
use crate::native::{NativeBridge, NoNatives};
use crate::scheduler::{TaskId, TaskKind, TaskState};
use crate::scope::SymbolValue;
use crate::types::TypeTable;
use crate::value::ConstValue;
use crate::vm::{Trap, Vm, VmConfig};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Fold operators on constant operands while building MIR. Turning this
    /// off routes every compile-time computation through the VM.
    pub fold_constants: bool,
    pub vm: VmConfig,
    /// Upper bound on how often a single task may be re-run.
    pub max_task_runs: usize,
    /// Largest value, in bytes or scalar cells, the builder will create
    /// as a compile-time constant or stack variable.
    pub max_value_size: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            fold_constants: true,
            vm: VmConfig::default(),
            max_task_runs: 10_000,
            max_value_size: 1 << 20,
        }
    }
}

impl SessionConfig {
    pub fn with_fold_constants(mut self, fold: bool) -> Self {
        self.fold_constants = fold;
        self
    }

    pub fn with_vm(mut self, vm: VmConfig) -> Self {
        self.vm = vm;
        self
    }

    pub fn with_max_task_runs(mut self, runs: usize) -> Self {
        self.max_task_runs = runs;
        self
    }

    pub fn with_max_value_size(mut self, bytes: u64) -> Self {
        self.max_value_size = bytes;
        self
    }
}

pub struct Session {
    builder: Builder,
    eval_traps: HashMap<TaskId, Trap>,
}

impl Session {
    pub fn new(config: SessionConfig, ast: Ast) -> Self {
        Session {
            builder: Builder::new(config, ast, Box::new(NoNatives)),
            eval_traps: HashMap::new(),
        }
    }

    /// Use `natives` for external functions called at compile time.
    pub fn with_natives(mut self, natives: impl NativeBridge + 'static) -> Self {
        self.builder.natives = Box::new(natives);
        self
    }

    pub fn ast(&self) -> &Ast {
        &self.builder.ast
    }

    /// Nodes may be added at any time; nodes already referenced by analysis
    /// must not change.
    pub fn ast_mut(&mut self) -> &mut Ast {
        &mut self.builder.ast
    }

    /// Declare the top-level items of `unit` in the global scope.
    pub fn add_unit(&mut self, unit: &Unit) -> Result<(), CoreError> {
        log::debug!("adding unit with {} item(s) from file #{}", unit.items.len(), unit.file.0);
        let global = self.builder.global_scope;
        self.builder.register_items(global, &unit.items)
    }

    /// Analyze everything submitted so far.
    pub fn analyze(&mut self) -> Result<(), CoreError> {
        self.drive()?;
        let errors = self.builder.diagnostics.error_count();
        log::info!(
            "analysis finished: {} task(s), {} function(s), {} error(s)",
            self.builder.scheduler.len(),
            self.builder.mir.fns.len(),
            errors
        );
        if errors > 0 {
            return Err(CoreError::CompilationFailed(self.builder.diagnostics.to_vec()));
        }
        Ok(())
    }

    /// Evaluate a free-standing expression at compile time in the global scope.
    pub fn eval_comptime(&mut self, expr: AstId) -> Result<ConstValue, CoreError> {
        let task = self.builder.scheduler.submit(TaskKind::Eval(expr));
        self.drive()?;
        if let Some(value) = self.builder.eval_results.get(&task) {
            return Ok(value.clone());
        }
        if let Some(trap) = self.eval_traps.get(&task) {
            return Err(CoreError::Trap(trap.clone()));
        }
        Err(CoreError::CompilationFailed(self.builder.diagnostics.to_vec()))
    }

    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        self.builder.diagnostics.to_vec()
    }

    pub fn types(&self) -> &TypeTable {
        &self.builder.types
    }

    pub fn mir(&self) -> &Mir {
        &self.builder.mir
    }

    /// Resolved value of a global symbol; `path` may name members of
    /// scopes, as in `math.pi`.
    pub fn symbol_value(&self, path: &str) -> Option<&SymbolValue> {
        let scopes = &self.builder.scopes;
        let mut scope = self.builder.global_scope;
        let mut segments = path.split('.').peekable();
        let mut first = true;
        while let Some(segment) = segments.next() {
            let name = self.builder.ast.interner.get(segment)?;
            let found = scopes.lookup(scope, name, !first)?;
            let value = scopes.symbol(found.symbol).value()?;
            if segments.peek().is_none() {
                return Some(value);
            }
            let SymbolValue::Scope(inner) = value else {
                return None;
            };
            scope = *inner;
            first = false;
        }
        None
    }

    /// Compile-time value of a constant or the initial value of a global.
    pub fn const_value(&self, path: &str) -> Option<ConstValue> {
        match self.symbol_value(path)? {
            SymbolValue::Const { value, .. } => Some(value.clone()),
            SymbolValue::Global(global) => Some(self.builder.mir.global(*global).value.clone()),
            SymbolValue::Fn(func) => Some(ConstValue::Fn(*func)),
            SymbolValue::Type(ty) => Some(ConstValue::Type(*ty)),
            _ => None,
        }
    }

    /// Analyze and hand the result over to a backend.
    pub fn finish(mut self) -> Result<Program, CoreError> {
        self.analyze()?;
        let Builder {
            mir,
            types,
            natives,
            config,
            diagnostics,
            ..
        } = self.builder;
        Ok(Program {
            mir,
            types,
            natives,
            vm: config.vm,
            warnings: diagnostics.into_vec(),
        })
    }

    // -----------------------------------------------------------------
    // Driver
    // -----------------------------------------------------------------

    fn drive(&mut self) -> Result<(), CoreError> {
        loop {
            while let Some(task) = self.builder.scheduler.next() {
                let runs = self.builder.scheduler.runs(task);
                if runs > self.builder.config.max_task_runs {
                    return Err(CoreError::Internal(format!(
                        "{task} did not settle after {runs} runs"
                    )));
                }
                log::trace!("run {task} (attempt {runs})");
                let result = self.builder.run_task(task);
                self.settle(task, result)?;
            }
            if self.builder.scheduler.is_idle() {
                return Ok(());
            }
            match self.builder.scheduler.detect_cycle() {
                Some(cycle) => self.report_cycle(&cycle),
                None => {
                    return Err(CoreError::Internal(format!(
                        "{} task(s) wait without a dependency cycle",
                        self.builder.scheduler.pending_count()
                    )));
                }
            }
        }
    }

    fn settle(&mut self, task: TaskId, result: Result<(), Halt>) -> Result<(), CoreError> {
        match result {
            Ok(()) => {
                log::trace!("{task} resolved");
                self.builder.scheduler.resolve(task);
            }
            Err(Halt::Postpone(blocker)) => {
                self.builder.on_postpone(task);
                if self.builder.scheduler.state(blocker) == TaskState::Failed {
                    self.fail(task);
                } else {
                    self.builder.scheduler.mark_dependency(task, blocker);
                }
            }
            Err(Halt::Error(diag)) => {
                self.builder.diagnostics.emit(diag);
                self.fail(task);
            }
            Err(Halt::Trap(trap)) => {
                let diag = Diagnostic::error(ErrorKind::Trap(trap.kind.clone()), trap.kind.to_string()).with_span(trap.span);
                self.builder.diagnostics.emit(diag);
                if matches!(self.builder.scheduler.kind(task), TaskKind::Eval(_)) {
                    self.eval_traps.insert(task, trap);
                }
                self.fail(task);
            }
            Err(Halt::Silent) => self.fail(task),
            Err(Halt::Fatal(err)) => return Err(err),
        }
        Ok(())
    }

    /// Fail `task` and everything waiting for it.
    fn fail(&mut self, task: TaskId) {
        let dependents = self.builder.scheduler.fail(task);
        self.builder.mark_failed(task);
        for dependent in dependents {
            log::debug!("{dependent} dropped, it depends on failed {task}");
            self.builder.mark_failed(dependent);
        }
    }

    fn report_cycle(&mut self, cycle: &[TaskId]) {
        let labels: Vec<_> = cycle.iter().map(|task| self.builder.task_label(*task)).collect();
        let names: Vec<&str> = labels.iter().map(|(name, _)| name.as_str()).collect();
        let mut diag = Diagnostic::error(
            ErrorKind::Dependency,
            format!("circular dependency between {}", names.join(", ")),
        );
        if let Some((_, span)) = labels.first() {
            diag = diag.with_span(*span);
        }
        for (name, span) in &labels {
            diag = diag.with_note(format!("{name} is part of the cycle"), Some(*span));
        }
        self.builder.diagnostics.emit(diag);
        for &task in cycle {
            self.fail(task);
        }
    }
}

/// Analyzed program ready for a backend.
pub struct Program {
    pub mir: Mir,
    pub types: TypeTable,
    natives: Box<dyn NativeBridge>,
    vm: VmConfig,
    /// Non-error diagnostics produced during analysis.
    pub warnings: Vec<Diagnostic>,
}

impl Program {
    /// Runtime functions with a finished body, in declaration order.
    pub fn functions(&self) -> impl Iterator<Item = (FnId, &MirFn)> {
        self.mir
            .fns
            .iter_enumerated()
            .filter(|(_, f)| f.flavor == FnFlavor::Runtime && f.state == FnState::Analyzed)
    }

    pub fn function(&self, name: &str) -> Option<FnId> {
        self.mir.find_fn(name)
    }

    /// Run every `#test` case in declaration order, each in a fresh VM.
    pub fn run_tests(&self) -> TestReport {
        let cases: Vec<TestCase> = self
            .mir
            .fns
            .iter_enumerated()
            .filter(|(_, f)| f.test)
            .map(|(id, func)| {
                let started = Instant::now();
                let mut vm = Vm::new(self.vm.clone(), &self.mir, &self.types, self.natives.as_ref());
                let result = vm.execute(id, &[]).map(drop);
                let case = TestCase {
                    name: func.name.clone(),
                    result,
                    duration: started.elapsed(),
                };
                match &case.result {
                    Ok(()) => log::info!("test `{}` passed", case.name),
                    Err(trap) => log::warn!("test `{}` failed: {trap}", case.name),
                }
                case
            })
            .collect();
        let report = TestReport { cases };
        log::info!("executed {} test case(s), {} failed", report.cases.len(), report.failed_count());
        report
    }

    /// Execute a function of the program in a fresh VM.
    pub fn execute(&self, name: &str, args: &[ConstValue]) -> Result<ConstValue, CoreError> {
        let func = self
            .function(name)
            .ok_or_else(|| CoreError::Internal(format!("no function named `{name}`")))?;
        let mut vm = Vm::new(self.vm.clone(), &self.mir, &self.types, self.natives.as_ref());
        vm.execute(func, args).map_err(CoreError::Trap)
    }
}

/// Result of one `#test` case.
#[derive(Debug, Clone, PartialEq)]
pub struct TestCase {
    pub name: String,
    pub result: Result<(), Trap>,
    pub duration: Duration,
}

impl TestCase {
    pub fn passed(&self) -> bool {
        self.result.is_ok()
    }
}

/// Results of [`Program::run_tests`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TestReport {
    pub cases: Vec<TestCase>,
}

impl TestReport {
    pub fn failed(&self) -> impl Iterator<Item = &TestCase> {
        self.cases.iter().filter(|case| !case.passed())
    }

    pub fn failed_count(&self) -> usize {
        self.failed().count()
    }

    /// Percentage of passing cases; an empty run counts as fully passing.
    pub fn pass_rate(&self) -> f64 {
        if self.cases.is_empty() {
            return 100.0;
        }
        let passed = self.cases.len() - self.failed_count();
        passed as f64 * 100.0 / self.cases.len() as f64
    }

    pub fn is_success(&self) -> bool {
        self.failed_count() == 0
    }
}

impl fmt::Display for TestReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "testing {} case(s)", self.cases.len())?;
        for case in &self.cases {
            let status = if case.passed() { "PASS" } else { "FAIL" };
            writeln!(f, "[ {status} ] {} ({:.3} ms)", case.name, case.duration.as_secs_f64() * 1000.0)?;
        }
        if !self.is_success() {
            writeln!(f, "failed:")?;
            for case in self.failed() {
                if let Err(trap) = &case.result {
                    writeln!(f, "  {}: {trap}", case.name)?;
                }
            }
        }
        write!(f, "executed {}, passed {:.0}%", self.cases.len(), self.pass_rate())
    }
}

impl std::fmt::Debug for Program {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Program")
            .field("functions", &self.mir.fns.len())
            .field("globals", &self.mir.globals.len())
            .field("warnings", &self.warnings.len())
            .finish()
    }
}
