//! Compiler for pixel effect programs
//!
//! An effect program is parsed, resolved into a [`middle::program::ProgramUnit`],
//! lowered to scalar C and generated into a [`GenCode`] pair: a Java peer
//! class and the JNI kernel it calls. Each [`compile`] owns all of its state,
//! so compiles may run concurrently.

pub mod backend;
pub mod context;
pub mod error;
pub mod frontend;
pub mod middle;

pub use backend::{CompileOptions, GenCode};
pub use error::{CompileError, CompileResult, Stage};
pub use frontend::{SourceFile, SourceFileOrigin};

use crate::{
    backend::{CodeGenerator, Target},
    context::CompileContext,
    frontend::parser::Parser,
    middle::resolve::SymbolResolver,
};

/// Runs the whole pipeline on one effect program
pub fn compile(source: &SourceFile, options: &CompileOptions) -> CompileResult<GenCode> {
    let module = Parser::parse_module(source)?;
    let mut context = CompileContext::new();
    let program = SymbolResolver::resolve(&module, &mut context)?;

    let code = Target::Software
        .code_generator()
        .generate(&program, &mut context, options)?;

    tracing::info!(
        peer = %options.peer_name,
        glue_bytes = code.glue.len(),
        native_bytes = code.native.len(),
        "compiled effect"
    );

    Ok(code)
}

/// [`compile`] for source text that did not come from a file
pub fn compile_str(text: &str, options: &CompileOptions) -> CompileResult<GenCode> {
    compile(&SourceFile::from_memory(text), options)
}
