//! Foreign-call bridge used by the VM for external functions.

use std::collections::HashMap;
use std::fmt;

use crate::value::ConstValue;

/// Executes external functions on behalf of the VM.
///
/// Arguments arrive as VM values in declaration order; the returned value
/// must match the declared return type of the external function.
pub trait NativeBridge {
    fn call(&self, name: &str, args: &[ConstValue]) -> Result<ConstValue, String>;
}

/// Bridge for sessions that link no native code.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoNatives;

impl NativeBridge for NoNatives {
    fn call(&self, name: &str, _args: &[ConstValue]) -> Result<ConstValue, String> {
        Err(format!("external function `{name}` is not available at compile time"))
    }
}

pub type NativeFn = Box<dyn Fn(&[ConstValue]) -> Result<ConstValue, String> + Send + Sync>;

/// Name-keyed table of host functions.
#[derive(Default)]
pub struct NativeRegistry {
    fns: HashMap<String, NativeFn>,
}

impl NativeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, name: impl Into<String>, f: F) -> &mut Self
    where
        F: Fn(&[ConstValue]) -> Result<ConstValue, String> + Send + Sync + 'static,
    {
        self.fns.insert(name.into(), Box::new(f));
        self
    }

    pub fn with<F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&[ConstValue]) -> Result<ConstValue, String> + Send + Sync + 'static,
    {
        self.register(name, f);
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fns.contains_key(name)
    }
}

impl fmt::Debug for NativeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.fns.keys().collect();
        names.sort();
        f.debug_struct("NativeRegistry").field("fns", &names).finish()
    }
}

impl NativeBridge for NativeRegistry {
    fn call(&self, name: &str, args: &[ConstValue]) -> Result<ConstValue, String> {
        let f = self
            .fns
            .get(name)
            .ok_or_else(|| format!("unknown external function `{name}`"))?;
        f(args)
    }
}
