//! Single-pass parser for console queries.
//!
//! # Syntax
//!
//! - Clauses are separated by `;` (always), `&` (if the previous clause
//!   passed) or `|` (if it failed)
//! - A clause is `name arg*` or a parenthesized sub-query `( … )`
//! - Arguments are separated by whitespace; double quotes preserve it
//! - Inside quotes, `\` escapes the next character
//! - `{name}` is replaced by the value of variable `name` when the query runs
//! - `#` starts a comment that runs to the end of the line
//!
//! The scanner walks the input once, character by character. There is no
//! separate token stream.

use std::collections::HashMap;
use std::sync::Arc;

use bevy::log::debug;

use super::ast::{ArgPart, Argument, ChainNode, ChainingOp, Clause, Invocation, NodeId, Query};
use super::error::SyntaxError;

/// Parse a query string.
///
/// # Examples
///
/// ```
/// use bevy_console_script::core::{parse, ChainingOp};
///
/// let query = parse(r#"sv_gravity 400 & echo "gravity is {sv_gravity}""#).unwrap();
/// let spine: Vec<_> = query.spine().collect();
/// assert_eq!(spine.len(), 2);
/// assert_eq!(spine[1].1.op, ChainingOp::IfPass);
/// ```
pub fn parse(input: &str) -> Result<Query, SyntaxError> {
    Parser::new().run(input)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    ReadingName,
    ReadingArgs,
}

/// An open scope: the top level, or a group awaiting its `)`.
#[derive(Debug)]
struct Scope {
    /// Offset of the `(`; `None` for the top level.
    open: Option<usize>,
    /// Operator connecting the group to the enclosing chain.
    op: ChainingOp,
    head: Option<NodeId>,
    tail: Option<NodeId>,
}

impl Scope {
    fn new(open: Option<usize>, op: ChainingOp) -> Self {
        Self {
            open,
            op,
            head: None,
            tail: None,
        }
    }
}

struct Parser {
    nodes: Vec<ChainNode>,
    scopes: Vec<Scope>,
    mode: Mode,

    in_string: bool,
    string_start: usize,
    escaping: bool,
    escape_offset: usize,
    in_reference: bool,
    reference_start: usize,
    in_comment: bool,
    /// A `)` was just consumed; only an operator, another `)` or the end
    /// of input may follow.
    group_closed: bool,
    /// Operator in front of the clause being read.
    pending_op: ChainingOp,

    // Clause being read.
    clause_offset: Option<usize>,
    name: String,
    args: Vec<Argument>,

    // Argument being read.
    arg_offset: Option<usize>,
    parts: Vec<ArgPart>,
    part: String,
    part_offset: usize,
}

impl Parser {
    fn new() -> Self {
        Self {
            nodes: Vec::new(),
            scopes: vec![Scope::new(None, ChainingOp::Unconditional)],
            mode: Mode::ReadingName,
            in_string: false,
            string_start: 0,
            escaping: false,
            escape_offset: 0,
            in_reference: false,
            reference_start: 0,
            in_comment: false,
            group_closed: false,
            pending_op: ChainingOp::Unconditional,
            clause_offset: None,
            name: String::new(),
            args: Vec::new(),
            arg_offset: None,
            parts: Vec::new(),
            part: String::new(),
            part_offset: 0,
        }
    }

    fn run(mut self, input: &str) -> Result<Query, SyntaxError> {
        let mut len = 0;
        for (i, c) in input.chars().enumerate() {
            len = i + 1;
            self.step(i, c)?;
        }
        self.finish(len)
    }

    fn step(&mut self, i: usize, c: char) -> Result<(), SyntaxError> {
        if self.in_comment {
            if c != '\n' {
                return Ok(());
            }
            self.in_comment = false;
        }

        if self.in_string {
            return self.string_char(i, c);
        }

        if self.in_reference {
            return self.reference_char(i, c);
        }

        match c {
            '#' => {
                self.in_comment = true;
                Ok(())
            }
            c if c.is_whitespace() => {
                match self.mode {
                    Mode::ReadingName => {
                        if !self.name.is_empty() {
                            self.mode = Mode::ReadingArgs;
                        }
                    }
                    Mode::ReadingArgs => self.finish_arg(),
                }
                Ok(())
            }
            ';' | '&' | '|' => {
                let op = ChainingOp::from_char(c).unwrap_or_default();
                self.operator(i, c, op)
            }
            '(' => self.open_group(i),
            ')' => self.close_group(i),
            '"' => {
                self.expect_open_clause(i, c)?;
                // A quote before any name still parses: the clause gets an
                // empty name and the string becomes its first argument.
                self.mode = Mode::ReadingArgs;
                self.begin_arg(i);
                self.in_string = true;
                self.string_start = i;
                Ok(())
            }
            '{' => {
                self.expect_open_clause(i, c)?;
                if self.mode == Mode::ReadingName {
                    return Err(SyntaxError::new(
                        "variable references are only allowed in arguments",
                        i,
                        1,
                    ));
                }
                self.begin_reference(i);
                Ok(())
            }
            '\\' => Err(SyntaxError::new("unexpected '\\' outside of a string", i, 1)),
            _ => {
                self.expect_open_clause(i, c)?;
                match self.mode {
                    Mode::ReadingName => {
                        if self.name.is_empty() {
                            self.clause_offset = Some(i);
                        }
                        self.name.push(c);
                    }
                    Mode::ReadingArgs => {
                        self.begin_arg(i);
                        self.push_literal(i, c);
                    }
                }
                Ok(())
            }
        }
    }

    fn string_char(&mut self, i: usize, c: char) -> Result<(), SyntaxError> {
        if self.escaping {
            self.escaping = false;
            self.push_literal(i, c);
            return Ok(());
        }

        if self.in_reference {
            return self.reference_char(i, c);
        }

        match c {
            '\\' => {
                self.escaping = true;
                self.escape_offset = i;
            }
            '"' => self.in_string = false,
            '{' => self.begin_reference(i),
            _ => self.push_literal(i, c),
        }
        Ok(())
    }

    fn reference_char(&mut self, i: usize, c: char) -> Result<(), SyntaxError> {
        match c {
            '}' => {
                if self.part.is_empty() {
                    return Err(SyntaxError::new(
                        "empty variable reference",
                        self.reference_start,
                        i - self.reference_start + 1,
                    ));
                }
                let name = std::mem::take(&mut self.part);
                self.parts.push(ArgPart::reference(name, self.reference_start));
                self.in_reference = false;
                Ok(())
            }
            '{' => Err(SyntaxError::new("nested '{' in variable reference", i, 1)),
            c if is_name_char(c) => {
                self.part.push(c);
                Ok(())
            }
            '"' if self.in_string => Err(SyntaxError::new(
                "unterminated variable reference",
                self.reference_start,
                i - self.reference_start,
            )),
            c => Err(SyntaxError::new(
                format!("invalid character '{}' in variable reference", c.escape_default()),
                i,
                1,
            )),
        }
    }

    fn operator(&mut self, i: usize, c: char, op: ChainingOp) -> Result<(), SyntaxError> {
        self.finish_arg();
        if self.group_closed {
            self.group_closed = false;
        } else if self.clause_is_empty() {
            return Err(SyntaxError::new(
                format!("expected a command before '{}'", c),
                i,
                1,
            ));
        } else {
            self.finish_clause();
        }
        self.pending_op = op;
        self.mode = Mode::ReadingName;
        Ok(())
    }

    fn open_group(&mut self, i: usize) -> Result<(), SyntaxError> {
        if self.group_closed || self.mode == Mode::ReadingArgs || !self.name.is_empty() {
            return Err(SyntaxError::new("unexpected '('", i, 1));
        }
        let op = std::mem::take(&mut self.pending_op);
        self.scopes.push(Scope::new(Some(i), op));
        Ok(())
    }

    fn close_group(&mut self, i: usize) -> Result<(), SyntaxError> {
        self.finish_arg();

        let open = match self.scopes.last().and_then(|scope| scope.open) {
            Some(open) => open,
            None => return Err(SyntaxError::new("unmatched ')'", i, 1)),
        };

        if self.group_closed {
            // `))`: the inner group is already linked into this scope.
        } else if self.clause_is_empty() {
            let has_members = self.scopes.last().is_some_and(|scope| scope.head.is_some());
            return Err(if has_members {
                SyntaxError::new("expected a command before ')'", i, 1)
            } else {
                SyntaxError::new("empty group", open, i - open + 1)
            });
        } else {
            self.finish_clause();
        }

        let Some(scope) = self.scopes.pop() else {
            return Err(SyntaxError::new("unmatched ')'", i, 1));
        };
        let Some(subchain) = scope.head else {
            return Err(SyntaxError::new("empty group", open, i - open + 1));
        };

        self.pending_op = scope.op;
        self.append(Clause::Group { subchain }, open);
        self.group_closed = true;
        self.mode = Mode::ReadingName;
        Ok(())
    }

    fn expect_open_clause(&self, i: usize, c: char) -> Result<(), SyntaxError> {
        if self.group_closed {
            return Err(SyntaxError::new(
                format!("expected ';', '&', '|' or ')' after group, found '{}'", c),
                i,
                1,
            ));
        }
        Ok(())
    }

    fn begin_arg(&mut self, i: usize) {
        if self.arg_offset.is_none() {
            self.arg_offset = Some(i);
            self.clause_offset.get_or_insert(i);
        }
    }

    fn begin_reference(&mut self, i: usize) {
        self.begin_arg(i);
        self.flush_literal();
        self.in_reference = true;
        self.reference_start = i;
    }

    fn push_literal(&mut self, i: usize, c: char) {
        if self.part.is_empty() {
            self.part_offset = i;
        }
        self.part.push(c);
    }

    fn flush_literal(&mut self) {
        if !self.part.is_empty() {
            let text = std::mem::take(&mut self.part);
            self.parts.push(ArgPart::literal(text, self.part_offset));
        }
    }

    fn finish_arg(&mut self) {
        let Some(offset) = self.arg_offset.take() else {
            return;
        };
        self.flush_literal();
        if self.parts.is_empty() {
            // `""`
            self.parts.push(ArgPart::literal("", offset));
        }
        let parts = std::mem::take(&mut self.parts);
        self.args.push(Argument { parts, offset });
    }

    fn clause_is_empty(&self) -> bool {
        self.name.is_empty() && self.args.is_empty()
    }

    fn finish_clause(&mut self) {
        let offset = self.clause_offset.take().unwrap_or_default();
        let invocation = Invocation {
            name: std::mem::take(&mut self.name),
            offset,
            args: std::mem::take(&mut self.args),
        };
        self.append(Clause::Command(invocation), offset);
    }

    /// Link a new node at the end of the innermost scope.
    fn append(&mut self, clause: Clause, offset: usize) {
        let id = NodeId(self.nodes.len());
        let op = std::mem::take(&mut self.pending_op);
        let Some(scope) = self.scopes.last_mut() else {
            return;
        };

        let op = if scope.head.is_none() {
            ChainingOp::Unconditional
        } else {
            op
        };
        self.nodes.push(ChainNode {
            clause,
            offset,
            op,
            next: None,
        });

        match scope.tail {
            Some(tail) => self.nodes[tail.0].next = Some(id),
            None => scope.head = Some(id),
        }
        scope.tail = Some(id);
    }

    fn finish(mut self, len: usize) -> Result<Query, SyntaxError> {
        if self.in_string {
            return Err(if self.escaping {
                SyntaxError::new("unterminated escape sequence", self.escape_offset, 1)
            } else {
                SyntaxError::new("unterminated string", self.string_start, len - self.string_start)
            });
        }
        if self.in_reference {
            return Err(SyntaxError::new(
                "unterminated variable reference",
                self.reference_start,
                len - self.reference_start,
            ));
        }

        self.finish_arg();

        if let Some(open) = self.scopes.last().and_then(|scope| scope.open) {
            return Err(SyntaxError::new("unclosed group", open, 1));
        }

        // A trailing operator leaves an empty clause behind; drop it.
        if !self.group_closed && !self.clause_is_empty() {
            self.finish_clause();
        }

        if self.scopes[0].head.is_none() {
            self.append(Clause::Command(Invocation::default()), 0);
        }

        let root = self.scopes[0].head.unwrap_or(NodeId(0));
        Ok(Query {
            nodes: self.nodes,
            root,
        })
    }
}

/// Characters allowed in command, alias and variable names.
#[inline]
pub fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Check a name against `[A-Za-z0-9_]+`.
pub fn is_valid_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(is_name_char)
}

/// Like [`is_valid_name`], but allows a leading `+` or `-`.
pub fn is_valid_paired_name(name: &str) -> bool {
    let rest = name.strip_prefix(['+', '-']).unwrap_or(name);
    is_valid_name(rest)
}

/// Cache of parsed queries keyed by their exact source text.
///
/// Parsed queries never change after construction, so a cached [`Query`]
/// can be shared freely. The cache is flushed when it reaches capacity.
#[derive(Debug)]
pub struct QueryCache {
    entries: HashMap<Box<str>, Arc<Query>>,
    capacity: usize,
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::with_capacity(256)
    }
}

impl QueryCache {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            capacity,
        }
    }

    /// Return the cached parse of `source`, parsing it on a miss.
    ///
    /// Syntax errors are not cached.
    pub fn get_or_parse(&mut self, source: &str) -> Result<Arc<Query>, SyntaxError> {
        if let Some(query) = self.entries.get(source) {
            return Ok(Arc::clone(query));
        }

        let query = Arc::new(parse(source)?);
        if self.capacity == 0 {
            return Ok(query);
        }
        if self.entries.len() >= self.capacity {
            debug!("Console: query cache full ({} entries), flushing", self.entries.len());
            self.entries.clear();
        }
        self.entries.insert(source.into(), Arc::clone(&query));
        Ok(query)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
