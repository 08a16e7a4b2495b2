//! Core console types.
//!
//! This module provides the fundamental building blocks:
//! - [`parse`] - Query parser producing an immutable [`Query`]
//! - [`Console`] - Context owning variables, commands, aliases and binds,
//!   and evaluating queries against them
//! - [`ConVar`] - Console variables with typed values and constraints
//! - [`ConCommand`] - Console commands with handlers
//! - [`VariableStore`], [`CommandRegistry`], [`AliasRegistry`], [`BindTable`]
//! - Messages for communication with the host app

mod ast;
mod binds;
mod concommand;
mod console;
mod convar;
mod error;
mod evaluator;
mod events;
mod parser;
mod registry;
mod resolve;
mod store;

pub use ast::{
    ArgPart, Argument, ChainNode, ChainingOp, Clause, Invocation, NodeId, PartKind, Query,
    escape_literal, quote,
};
pub use binds::BindTable;
pub use concommand::{CommandArgs, CommandHandler, CommandResult, ConCommand};
pub use console::{Console, ConsoleSettings};
pub use convar::{Caster, ConVar, ConVarDyn, ConVarFlags, ConVarValue};
pub use error::{
    CommandError, InvocationError, QueryError, ReferenceError, RegistryError, StoreError,
    SyntaxError,
};
pub use events::{
    ConVarChangedEvent, ConsoleEventsPlugin, ConsoleInputEvent, ConsoleKeyEvent,
    ConsoleOutputEvent, ConsoleOutputLevel,
};
pub use parser::{QueryCache, is_valid_name, is_valid_paired_name, parse};
pub use registry::{AliasRegistry, CommandRegistry};
pub use resolve::{ResolvedArgs, resolve_argument, resolve_arguments};
pub use store::{ChangeListener, ConVarMeta, PersistHook, SetOutcome, USER_PREFIX, VariableStore};
