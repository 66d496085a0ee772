//! Context records passed to handlers at invocation time

use serde_json::Value;

use super::types::{Request, Response, Spec, Store};

/// Context for spec handlers, which shape the spec in place
#[derive(Debug)]
pub struct SpecHandlerContext<'a> {
    pub spec: &'a mut Spec,
    pub data: Option<Value>,
}

/// Context for state handlers. The spec is absent when the state is set
/// outside of a running spec.
#[derive(Debug)]
pub struct StateHandlerContext<'a> {
    pub spec: Option<&'a mut Spec>,
    pub data: Option<Value>,
}

#[derive(Debug, Clone, Copy)]
pub struct RequestResponseContext<'a> {
    pub req: &'a Request,
    pub res: &'a Response,
}

#[derive(Debug, Clone, Copy)]
pub struct CaptureContext<'a> {
    pub req: &'a Request,
    pub res: &'a Response,
    pub store: Option<&'a Store>,
}

#[derive(Debug, Clone, Copy)]
pub struct ExpectHandlerContext<'a> {
    pub req: &'a Request,
    pub res: &'a Response,
    pub data: Option<&'a Value>,
}

#[derive(Debug, Clone, Default)]
pub struct DataHandlerContext {
    pub args: Option<Vec<String>>,
}

impl DataHandlerContext {
    pub fn arg(&self, index: usize) -> Option<&str> {
        self.args.as_ref()?.get(index).map(String::as_str)
    }
}

#[derive(Debug, Clone)]
pub struct AssertionContext<'a> {
    pub data: &'a Value,
    pub args: Option<Vec<String>>,
}

impl AssertionContext<'_> {
    pub fn arg(&self, index: usize) -> Option<&str> {
        self.args.as_ref()?.get(index).map(String::as_str)
    }
}

#[derive(Debug, Clone, Default)]
pub struct InteractionContext {
    pub data: Option<Value>,
}

/// Wait handlers run asynchronously, so their context is owned
#[derive(Debug, Clone)]
pub struct WaitHandlerContext {
    pub req: Request,
    pub res: Response,
    pub data: Option<Value>,
    /// Data of the enclosing spec step
    pub root_data: Option<Value>,
}
