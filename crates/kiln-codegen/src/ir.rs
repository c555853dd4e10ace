//! Intermediate Representation for bindings
//!
//! The IR is a dialect-independent view of one interface descriptor: ABI type
//! strings are lowered into a closed [`TypeIR`] and the overload plan is fixed,
//! so every target renders from the same decisions.

use kiln_core::abi::{AbiItem, Param, SymbolKind};
use kiln_core::{InterfaceDescriptor, StateMutability};

use crate::error::{Error, Result};

/// Intermediate representation of a complete binding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingIR {
    /// Descriptor name (the binding's type name)
    pub name: String,

    /// Callable entries, in declaration order
    pub functions: Vec<FunctionIR>,

    /// Event entries, in declaration order
    pub events: Vec<EventIR>,

    /// Compact JSON of the descriptor, embedded in the binding
    pub abi_json: String,
}

/// One callable entry of a binding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionIR {
    /// ABI function name
    pub name: String,

    /// Key the entry is exposed under: the bare name or the full signature
    pub key: String,

    /// Canonical signature, e.g. `claim_rewards(address)`
    pub signature: String,

    /// Whether the function's name is shared by several signatures
    pub overloaded: bool,

    /// Position among the signatures sharing this name
    pub ordinal: usize,

    /// Ordered inputs
    pub inputs: Vec<ParamIR>,

    /// Ordered outputs
    pub outputs: Vec<ParamIR>,

    /// Mutability
    pub mutability: StateMutability,
}

impl FunctionIR {
    /// Whether the entry is keyed by its full signature
    pub fn is_signature_key(&self) -> bool {
        self.key == self.signature
    }
}

/// One event entry of a binding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventIR {
    /// ABI event name
    pub name: String,

    /// Key the entry is exposed under: the name, or the signature when overloaded
    pub key: String,

    /// Canonical signature
    pub signature: String,

    /// Ordered inputs
    pub inputs: Vec<ParamIR>,

    /// Anonymous events have no signature topic
    pub anonymous: bool,
}

/// A typed parameter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamIR {
    /// Parameter name as declared (may be empty)
    pub name: String,

    /// Lowered type
    pub ty: TypeIR,

    /// Indexed event parameter
    pub indexed: bool,
}

/// Closed set of ABI types that every dialect can represent
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeIR {
    /// 20-byte address
    Address,
    /// Boolean
    Bool,
    /// UTF-8 string
    String,
    /// Dynamic byte string
    Bytes,
    /// `bytesN`, 1 to 32
    FixedBytes(usize),
    /// `uintN`, 8 to 256 in steps of 8
    Uint(usize),
    /// `intN`, 8 to 256 in steps of 8
    Int(usize),
    /// `T[]`
    Array(Box<TypeIR>),
    /// `T[N]`
    FixedArray(Box<TypeIR>, usize),
    /// `tuple` with named members
    Tuple(Vec<ParamIR>),
}

impl TypeIR {
    /// Lower an ABI parameter, or return the offending type string
    pub fn lower(param: &Param) -> std::result::Result<Self, String> {
        lower_type(&param.ty, param.components.as_deref())
    }
}

fn lower_type(ty: &str, components: Option<&[Param]>) -> std::result::Result<TypeIR, String> {
    let unmappable = || ty.to_string();

    if let Some(inner) = ty.strip_suffix("[]") {
        return Ok(TypeIR::Array(Box::new(lower_type(inner, components)?)));
    }
    if let Some(open) = ty.rfind('[')
        && ty.ends_with(']')
    {
        let len: usize = ty[open + 1..ty.len() - 1].parse().map_err(|_| unmappable())?;
        if len == 0 {
            return Err(unmappable());
        }
        let inner = lower_type(&ty[..open], components)?;
        return Ok(TypeIR::FixedArray(Box::new(inner), len));
    }

    match ty {
        "address" => Ok(TypeIR::Address),
        "bool" => Ok(TypeIR::Bool),
        "string" => Ok(TypeIR::String),
        "bytes" => Ok(TypeIR::Bytes),
        "uint" => Ok(TypeIR::Uint(256)),
        "int" => Ok(TypeIR::Int(256)),
        "tuple" => {
            let members = components.ok_or_else(unmappable)?;
            let lowered = lower_params(members)?;
            Ok(TypeIR::Tuple(lowered))
        }
        _ => {
            if let Some(width) = ty.strip_prefix("bytes") {
                let n = width.parse().map_err(|_| unmappable())?;
                return if (1..=32).contains(&n) {
                    Ok(TypeIR::FixedBytes(n))
                } else {
                    Err(unmappable())
                };
            }
            let (signed, width) = match (ty.strip_prefix("uint"), ty.strip_prefix("int")) {
                (Some(width), _) => (false, width),
                (None, Some(width)) => (true, width),
                _ => return Err(unmappable()),
            };
            let bits: usize = width.parse().map_err(|_| unmappable())?;
            if bits == 0 || bits > 256 || bits % 8 != 0 {
                return Err(unmappable());
            }
            Ok(if signed {
                TypeIR::Int(bits)
            } else {
                TypeIR::Uint(bits)
            })
        }
    }
}

fn lower_params(params: &[Param]) -> std::result::Result<Vec<ParamIR>, String> {
    params
        .iter()
        .map(|p| {
            Ok(ParamIR {
                name: p.name.clone(),
                ty: TypeIR::lower(p)?,
                indexed: p.indexed.unwrap_or(false),
            })
        })
        .collect()
}

impl BindingIR {
    /// Lower a descriptor
    ///
    /// With `always_generate_overloads`, every signature of an overloaded
    /// function gets its own signature-keyed entry, and a unique function gets
    /// both its bare-name entry and its signature entry. Otherwise each
    /// function name gets one entry bound to its first declared signature.
    pub fn lower(descriptor: &InterfaceDescriptor, always_generate_overloads: bool) -> Result<Self> {
        let mut functions = Vec::new();
        let mut events = Vec::new();

        for (symbol, items) in descriptor.grouped() {
            let unmappable = |ty: String| Error::UnmappableType {
                descriptor: descriptor.name.clone(),
                symbol: symbol.to_string(),
                ty,
            };

            match symbol.kind {
                SymbolKind::Function => {
                    let overloaded = items.len() > 1;
                    let chosen = if always_generate_overloads {
                        items.as_slice()
                    } else {
                        &items[..1]
                    };
                    for (ordinal, item) in chosen.iter().enumerate() {
                        let AbiItem::Function(f) = item else { continue };
                        let base = FunctionIR {
                            name: f.name.clone(),
                            key: f.name.clone(),
                            signature: item.signature(),
                            overloaded,
                            ordinal,
                            inputs: lower_params(&f.inputs).map_err(unmappable)?,
                            outputs: lower_params(&f.outputs).map_err(unmappable)?,
                            mutability: f.state_mutability,
                        };
                        if !always_generate_overloads {
                            functions.push(base);
                            continue;
                        }
                        let by_signature = FunctionIR {
                            key: base.signature.clone(),
                            ..base.clone()
                        };
                        if !overloaded {
                            functions.push(base);
                        }
                        functions.push(by_signature);
                    }
                }
                SymbolKind::Event => {
                    let overloaded = items.len() > 1;
                    for item in &items {
                        let AbiItem::Event(e) = item else { continue };
                        let signature = item.signature();
                        events.push(EventIR {
                            name: e.name.clone(),
                            key: if overloaded {
                                signature.clone()
                            } else {
                                e.name.clone()
                            },
                            signature,
                            inputs: lower_params(&e.inputs).map_err(unmappable)?,
                            anonymous: e.anonymous,
                        });
                    }
                }
                // Not part of the call surface, but still must be representable
                SymbolKind::Error | SymbolKind::Constructor => {
                    for item in &items {
                        lower_params(item.inputs()).map_err(unmappable)?;
                    }
                }
                SymbolKind::Fallback | SymbolKind::Receive => {}
            }
        }

        Ok(Self {
            name: descriptor.name.clone(),
            functions,
            events,
            abi_json: serde_json::to_string(&descriptor.items)?,
        })
    }

    /// Functions exposed under their bare name
    pub fn named_functions(&self) -> impl Iterator<Item = &FunctionIR> {
        self.functions.iter().filter(|f| !f.is_signature_key())
    }
}
