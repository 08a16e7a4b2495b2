//! Parse tree for console queries.
//!
//! A [`Query`] is an arena of [`ChainNode`]s addressed by [`NodeId`]. Each
//! scope (the top level, or the inside of a group) is a singly-linked chain
//! through [`ChainNode::next`]. A group is itself a node in its enclosing
//! chain; its `subchain` points at the first node of its body and its `next`
//! is the continuation resumed once the body is done.
//!
//! ```text
//! a & (b; c); d
//!
//!   [a] --&--> [group] --;--> [d]
//!                 |
//!                [b] --;--> [c]
//! ```

use std::fmt;

/// Index of a node inside a [`Query`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    #[inline]
    pub fn index(self) -> usize {
        self.0
    }
}

/// The connective between two clauses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ChainingOp {
    /// `;` - always continue.
    #[default]
    Unconditional,
    /// `&` - continue only if the previous invocation passed.
    IfPass,
    /// `|` - continue only if the previous invocation failed.
    IfFail,
}

impl ChainingOp {
    /// Map a structural character to its operator.
    pub fn from_char(c: char) -> Option<Self> {
        match c {
            ';' => Some(ChainingOp::Unconditional),
            '&' => Some(ChainingOp::IfPass),
            '|' => Some(ChainingOp::IfFail),
            _ => None,
        }
    }

    /// Whether evaluation may step onto a node carrying this operator.
    #[inline]
    pub fn allows(self, error: bool) -> bool {
        match self {
            ChainingOp::Unconditional => true,
            ChainingOp::IfPass => !error,
            ChainingOp::IfFail => error,
        }
    }

    pub fn symbol(self) -> char {
        match self {
            ChainingOp::Unconditional => ';',
            ChainingOp::IfPass => '&',
            ChainingOp::IfFail => '|',
        }
    }
}

/// Kind of an argument fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PartKind {
    Literal,
    /// `{name}`, substituted with a variable's value at resolution time.
    Reference,
}

/// One fragment of an argument.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArgPart {
    pub kind: PartKind,
    pub text: String,
    pub offset: usize,
}

impl ArgPart {
    pub fn literal(text: impl Into<String>, offset: usize) -> Self {
        Self {
            kind: PartKind::Literal,
            text: text.into(),
            offset,
        }
    }

    pub fn reference(name: impl Into<String>, offset: usize) -> Self {
        Self {
            kind: PartKind::Reference,
            text: name.into(),
            offset,
        }
    }

    #[inline]
    pub fn is_reference(&self) -> bool {
        self.kind == PartKind::Reference
    }
}

/// A single argument: a non-empty sequence of parts.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Argument {
    pub parts: Vec<ArgPart>,
    pub offset: usize,
}

impl Argument {
    /// Whether the argument contains no variable references.
    pub fn is_constant(&self) -> bool {
        !self.parts.iter().any(ArgPart::is_reference)
    }
}

/// A command clause: `name arg*`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Invocation {
    pub name: String,
    pub offset: usize,
    pub args: Vec<Argument>,
}

impl Invocation {
    /// The empty query parses to a single invocation with no name.
    #[inline]
    pub fn is_noop(&self) -> bool {
        self.name.is_empty() && self.args.is_empty()
    }
}

/// What a node runs when it is visited.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Clause {
    Command(Invocation),
    /// A parenthesized group; holds the id of its first node.
    Group { subchain: NodeId },
}

/// A node in a query chain.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChainNode {
    pub clause: Clause,
    pub offset: usize,
    /// Connective to the previous node in the same scope. Always
    /// `Unconditional` on the first node of a scope.
    pub op: ChainingOp,
    /// Next node in the same scope. For a group this is its continuation.
    pub next: Option<NodeId>,
}

impl ChainNode {
    /// The invocation of a command clause.
    pub fn invocation(&self) -> Option<&Invocation> {
        match &self.clause {
            Clause::Command(invocation) => Some(invocation),
            Clause::Group { .. } => None,
        }
    }

    /// The first node of a group's body.
    pub fn subchain(&self) -> Option<NodeId> {
        match self.clause {
            Clause::Group { subchain } => Some(subchain),
            Clause::Command(_) => None,
        }
    }
}

/// An immutable parsed query.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Query {
    pub(crate) nodes: Vec<ChainNode>,
    pub(crate) root: NodeId,
}

impl Query {
    /// First node of the top-level chain.
    #[inline]
    pub fn root(&self) -> NodeId {
        self.root
    }

    #[inline]
    pub fn node(&self, id: NodeId) -> &ChainNode {
        &self.nodes[id.0]
    }

    /// Number of nodes in the arena (groups included).
    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Iterate the chain starting at `start`, following `next` only.
    pub fn chain(&self, start: NodeId) -> impl Iterator<Item = (NodeId, &ChainNode)> {
        std::iter::successors(Some(start), |id| self.node(*id).next).map(|id| (id, self.node(id)))
    }

    /// The top-level chain.
    pub fn spine(&self) -> impl Iterator<Item = (NodeId, &ChainNode)> {
        self.chain(self.root)
    }

    /// The query is a single `+name` invocation with no arguments.
    pub(crate) fn single_press(&self) -> Option<&str> {
        let root = self.node(self.root);
        if root.next.is_some() {
            return None;
        }
        let invocation = root.invocation()?;
        if invocation.args.is_empty() && invocation.name.starts_with('+') {
            Some(&invocation.name)
        } else {
            None
        }
    }
}

impl fmt::Display for Query {
    /// Canonical form of the query: `a & (b; c); d`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_chain(self, self.root, f)
    }
}

fn write_chain(query: &Query, start: NodeId, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    for (i, (_, node)) in query.chain(start).enumerate() {
        if i > 0 {
            match node.op {
                ChainingOp::Unconditional => write!(f, "; ")?,
                op => write!(f, " {} ", op.symbol())?,
            }
        }
        match &node.clause {
            Clause::Command(invocation) => {
                write!(f, "{}", invocation.name)?;
                for arg in &invocation.args {
                    write!(f, " ")?;
                    write_argument(arg, f)?;
                }
            }
            Clause::Group { subchain } => {
                write!(f, "(")?;
                write_chain(query, *subchain, f)?;
                write!(f, ")")?;
            }
        }
    }
    Ok(())
}

fn write_argument(arg: &Argument, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "\"")?;
    for part in &arg.parts {
        match part.kind {
            PartKind::Literal => write!(f, "{}", escape_literal(&part.text))?,
            PartKind::Reference => write!(f, "{{{}}}", part.text)?,
        }
    }
    write!(f, "\"")
}

/// Escape text so it survives as literal data inside a quoted argument.
pub fn escape_literal(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '"' | '\\' | '{') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Wrap text in quotes, escaped so the parser reads it back verbatim.
pub fn quote(text: &str) -> String {
    format!("\"{}\"", escape_literal(text))
}
