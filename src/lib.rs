//! talc compiles attribute-directive markup templates into plain PHP
//! source text. Directives come in two overlapping dialects (path
//! expressions and reactive bindings) plus an opt-in generic scripting
//! dialect; the compiled blob is executed elsewhere, against a data
//! context, with the small runtime support library in [`SUPPORT_LIB`].

mod cache;
mod compiler;
mod directives;
mod error;
mod expr;
mod generic;
mod lexer;
mod markup;
mod path;
mod reactive;
mod runtime;
mod tree;

// Public exports.
pub use cache::ExprCache;
pub use compiler::{CompileOptions, Compiler, Dialect};
pub use error::{
    DirectiveError, DirectiveErrorKind, MarkupError, MarkupErrorKind, SyntaxError,
    SyntaxErrorKind, TalcError, TalcResult,
};
pub use expr::ExprCompiler;
pub use markup::parse as parse_markup;
pub use runtime::SUPPORT_LIB;
pub use tree::{Attr, AttrValue, Element, NodeId, NodeKind, Tree};
