//! Names are resolved and every expression is typed here. The result is a
//! [`program::ProgramUnit`] that backends walk with a [`scan::TreeScanner`].

pub mod builtins;
pub mod program;
pub mod resolve;
pub mod scan;
pub mod ty;
pub mod variable;
