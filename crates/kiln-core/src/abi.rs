//! Contract interface descriptors
//!
//! The model follows the Ethereum JSON ABI that both solc and vyper emit, so a
//! descriptor can be written back to disk in the same shape it was read.
//!
//! # Example
//!
//! ```json
//! [
//!   {
//!     "type": "function",
//!     "name": "balanceOf",
//!     "inputs": [{ "name": "addr", "type": "address" }],
//!     "outputs": [{ "name": "", "type": "uint256" }],
//!     "stateMutability": "view"
//!   }
//! ]
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, Result};

/// A typed parameter of a function, event or error
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Param {
    /// Parameter name (may be empty)
    #[serde(default)]
    pub name: String,

    /// ABI type, e.g. `uint256`, `address[]`, `tuple[2]`
    #[serde(rename = "type")]
    pub ty: String,

    /// Source-level type name reported by newer compilers
    #[serde(rename = "internalType", default, skip_serializing_if = "Option::is_none")]
    pub internal_type: Option<String>,

    /// Tuple members, present when `ty` starts with `tuple`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub components: Option<Vec<Param>>,

    /// Whether an event parameter is indexed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub indexed: Option<bool>,
}

impl Param {
    /// Create an unnamed-component parameter
    pub fn new(name: impl Into<String>, ty: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ty: ty.into(),
            internal_type: None,
            components: None,
            indexed: None,
        }
    }

    /// Create a tuple parameter with the given members
    pub fn tuple(name: impl Into<String>, suffix: &str, components: Vec<Param>) -> Self {
        Self {
            components: Some(components),
            ..Self::new(name, format!("tuple{}", suffix))
        }
    }

    /// Canonical type string with tuples expanded, e.g. `(address,uint256)[]`
    pub fn canonical_type(&self) -> String {
        match (self.ty.strip_prefix("tuple"), &self.components) {
            (Some(suffix), Some(components)) => {
                let inner: Vec<String> = components.iter().map(Param::canonical_type).collect();
                format!("({}){}", inner.join(","), suffix)
            }
            _ => self.ty.clone(),
        }
    }
}

/// Function state mutability
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum StateMutability {
    /// Does not read state
    Pure,
    /// Reads but does not modify state
    View,
    /// Modifies state, rejects value
    #[default]
    Nonpayable,
    /// Modifies state, accepts value
    Payable,
}

impl StateMutability {
    /// Whether calls can be answered without a transaction
    pub fn is_read_only(&self) -> bool {
        matches!(self, StateMutability::Pure | StateMutability::View)
    }

    /// Lowercase ABI spelling
    pub fn as_str(&self) -> &'static str {
        match self {
            StateMutability::Pure => "pure",
            StateMutability::View => "view",
            StateMutability::Nonpayable => "nonpayable",
            StateMutability::Payable => "payable",
        }
    }
}

/// A callable function
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Function {
    /// Function name
    pub name: String,
    /// Ordered inputs
    #[serde(default)]
    pub inputs: Vec<Param>,
    /// Ordered outputs
    #[serde(default)]
    pub outputs: Vec<Param>,
    /// Mutability
    #[serde(rename = "stateMutability", default)]
    pub state_mutability: StateMutability,
    /// Gas estimate (vyper only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gas: Option<u64>,
}

/// An event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Event name
    pub name: String,
    /// Ordered inputs (with `indexed` flags)
    #[serde(default)]
    pub inputs: Vec<Param>,
    /// Anonymous events carry no topic for their signature
    #[serde(default)]
    pub anonymous: bool,
}

/// A custom error
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomError {
    /// Error name
    pub name: String,
    /// Ordered inputs
    #[serde(default)]
    pub inputs: Vec<Param>,
}

/// Constructor entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Constructor {
    /// Ordered inputs
    #[serde(default)]
    pub inputs: Vec<Param>,
    /// Mutability
    #[serde(rename = "stateMutability", default)]
    pub state_mutability: StateMutability,
}

/// Fallback or receive entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Special {
    /// Mutability
    #[serde(rename = "stateMutability", default)]
    pub state_mutability: StateMutability,
}

/// One entry of a JSON ABI
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum AbiItem {
    /// `function`
    Function(Function),
    /// `event`
    Event(Event),
    /// `error`
    Error(CustomError),
    /// `constructor`
    Constructor(Constructor),
    /// `fallback`
    Fallback(Special),
    /// `receive`
    Receive(Special),
}

/// Kind of an ABI symbol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SymbolKind {
    /// Function
    Function,
    /// Event
    Event,
    /// Custom error
    Error,
    /// Constructor
    Constructor,
    /// Fallback
    Fallback,
    /// Receive
    Receive,
}

/// Identity of an ABI symbol: overloads of one function share a symbol
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Symbol {
    /// Kind of entry
    pub kind: SymbolKind,
    /// Name (empty for constructor, fallback and receive)
    pub name: String,
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            SymbolKind::Function => write!(f, "function {}", self.name),
            SymbolKind::Event => write!(f, "event {}", self.name),
            SymbolKind::Error => write!(f, "error {}", self.name),
            SymbolKind::Constructor => f.write_str("constructor"),
            SymbolKind::Fallback => f.write_str("fallback"),
            SymbolKind::Receive => f.write_str("receive"),
        }
    }
}

/// The semantic shape of an entry: what two entries must share to be the same
///
/// Parameter names and gas estimates are not part of the shape.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Shape {
    /// Canonical input types
    pub inputs: Vec<String>,
    /// Canonical output types
    pub outputs: Vec<String>,
    /// Indexed flags (events)
    pub indexed: Vec<bool>,
    /// Mutability, where applicable
    pub mutability: Option<StateMutability>,
    /// Anonymous flag (events)
    pub anonymous: bool,
}

fn canonical(params: &[Param]) -> Vec<String> {
    params.iter().map(Param::canonical_type).collect()
}

impl AbiItem {
    /// Symbol this entry belongs to
    pub fn symbol(&self) -> Symbol {
        let (kind, name) = match self {
            AbiItem::Function(f) => (SymbolKind::Function, f.name.as_str()),
            AbiItem::Event(e) => (SymbolKind::Event, e.name.as_str()),
            AbiItem::Error(e) => (SymbolKind::Error, e.name.as_str()),
            AbiItem::Constructor(_) => (SymbolKind::Constructor, ""),
            AbiItem::Fallback(_) => (SymbolKind::Fallback, ""),
            AbiItem::Receive(_) => (SymbolKind::Receive, ""),
        };
        Symbol {
            kind,
            name: name.to_string(),
        }
    }

    /// Inputs of the entry (empty for fallback and receive)
    pub fn inputs(&self) -> &[Param] {
        match self {
            AbiItem::Function(f) => &f.inputs,
            AbiItem::Event(e) => &e.inputs,
            AbiItem::Error(e) => &e.inputs,
            AbiItem::Constructor(c) => &c.inputs,
            AbiItem::Fallback(_) | AbiItem::Receive(_) => &[],
        }
    }

    /// Semantic shape used for deduplication
    pub fn shape(&self) -> Shape {
        let mut shape = Shape {
            inputs: canonical(self.inputs()),
            outputs: vec![],
            indexed: vec![],
            mutability: None,
            anonymous: false,
        };
        match self {
            AbiItem::Function(f) => {
                shape.outputs = canonical(&f.outputs);
                shape.mutability = Some(f.state_mutability);
            }
            AbiItem::Event(e) => {
                shape.indexed = e.inputs.iter().map(|p| p.indexed.unwrap_or(false)).collect();
                shape.anonymous = e.anonymous;
            }
            AbiItem::Constructor(c) => shape.mutability = Some(c.state_mutability),
            AbiItem::Fallback(s) | AbiItem::Receive(s) => shape.mutability = Some(s.state_mutability),
            AbiItem::Error(_) => {}
        }
        shape
    }

    /// Human-readable signature, e.g. `transfer(address,uint256)`
    pub fn signature(&self) -> String {
        let name = match self {
            AbiItem::Function(f) => f.name.as_str(),
            AbiItem::Event(e) => e.name.as_str(),
            AbiItem::Error(e) => e.name.as_str(),
            AbiItem::Constructor(_) => "constructor",
            AbiItem::Fallback(_) => "fallback",
            AbiItem::Receive(_) => "receive",
        };
        format!("{}({})", name, canonical(self.inputs()).join(","))
    }
}

/// The public interface of one artifact (or of a flattened set of artifacts)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceDescriptor {
    /// Artifact name, or the merged name under flattening
    pub name: String,

    /// Entries in declaration order
    pub items: Vec<AbiItem>,
}

impl InterfaceDescriptor {
    /// Create a descriptor
    pub fn new(name: impl Into<String>, items: Vec<AbiItem>) -> Self {
        Self {
            name: name.into(),
            items,
        }
    }

    /// Parse a descriptor from JSON text
    ///
    /// Accepts a bare ABI array or an artifact object carrying an `abi` field.
    pub fn from_json(name: impl Into<String>, json: &str) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_str(json)?;
        Self::from_value(name, value)
    }

    /// Parse a descriptor from a JSON value (see [`InterfaceDescriptor::from_json`])
    pub fn from_value(name: impl Into<String>, value: serde_json::Value) -> Result<Self> {
        let abi = match value {
            serde_json::Value::Array(_) => value,
            serde_json::Value::Object(mut obj) => obj
                .remove("abi")
                .ok_or_else(|| Error::invalid("descriptor object has no `abi` field"))?,
            _ => return Err(Error::invalid("descriptor must be an array or an object")),
        };
        let items: Vec<AbiItem> = serde_json::from_value(abi)?;
        Ok(Self::new(name, items))
    }

    /// Serialize the entries as a JSON array indented by `spacing` spaces
    ///
    /// A spacing of zero produces compact output. The result ends with a newline.
    pub fn to_json(&self, spacing: usize) -> Result<String> {
        let mut buf = Vec::new();
        if spacing == 0 {
            serde_json::to_writer(&mut buf, &self.items)?;
        } else {
            let indent = " ".repeat(spacing);
            let formatter = serde_json::ser::PrettyFormatter::with_indent(indent.as_bytes());
            let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
            self.items.serialize(&mut ser)?;
        }
        buf.push(b'\n');
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }

    /// Functions, in declaration order
    pub fn functions(&self) -> impl Iterator<Item = &Function> {
        self.items.iter().filter_map(|item| match item {
            AbiItem::Function(f) => Some(f),
            _ => None,
        })
    }

    /// Events, in declaration order
    pub fn events(&self) -> impl Iterator<Item = &Event> {
        self.items.iter().filter_map(|item| match item {
            AbiItem::Event(e) => Some(e),
            _ => None,
        })
    }

    /// Entries grouped by symbol, in order of first declaration
    pub fn grouped(&self) -> Vec<(Symbol, Vec<&AbiItem>)> {
        let mut groups: Vec<(Symbol, Vec<&AbiItem>)> = Vec::new();
        for item in &self.items {
            let symbol = item.symbol();
            match groups.iter_mut().find(|(s, _)| *s == symbol) {
                Some((_, members)) => members.push(item),
                None => groups.push((symbol, vec![item])),
            }
        }
        groups
    }
}
