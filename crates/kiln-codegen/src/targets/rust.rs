//! Rust bindings over alloy primitives
//!
//! Each binding is a module with one call struct per function entry, a
//! return alias per call, one struct per event and an enum over all calls.

use proc_macro2::{Ident, Literal, Span, TokenStream};
use quote::{format_ident, quote};
use std::collections::HashSet;

use kiln_core::config::Dialect;

use super::{BindingTarget, GENERATED_HEADER, identifier, pascal_case, snake_case, unique};
use crate::error::Result;
use crate::ir::{BindingIR, EventIR, FunctionIR, ParamIR, TypeIR};

/// Words that need a raw identifier
const KEYWORDS: &[&str] = &[
    "as", "async", "await", "break", "const", "continue", "dyn", "else", "enum", "extern", "false",
    "fn", "for", "if", "impl", "in", "let", "loop", "match", "mod", "move", "mut", "pub", "ref",
    "return", "static", "struct", "trait", "true", "type", "unsafe", "use", "where", "while",
    "abstract", "become", "box", "do", "final", "gen", "macro", "override", "priv", "try",
    "typeof", "unsized", "virtual", "yield",
];

/// Words that cannot be raw identifiers either
const RESERVED: &[&str] = &["crate", "self", "super", "Self", "_"];

/// Rust module bindings
#[derive(Debug, Clone, Copy, Default)]
pub struct RustTarget;

const INDEX_STEM: &str = "mod";

impl BindingTarget for RustTarget {
    fn dialect(&self) -> Dialect {
        Dialect::Rust
    }

    fn extension(&self) -> &'static str {
        "rs"
    }

    fn file_stem(&self, name: &str) -> String {
        module_name(name)
    }

    fn index_stem(&self) -> &'static str {
        INDEX_STEM
    }

    fn render(&self, ir: &BindingIR) -> Result<String> {
        let mut call_names = HashSet::new();
        let mut event_names = HashSet::new();
        let mut sections: Vec<TokenStream> = Vec::new();

        let abi = Literal::string(&ir.abi_json);
        sections.push(quote! {
            #[doc = "JSON ABI of the contract"]
            pub const ABI: &str = #abi;
        });

        let mut variants = Vec::new();
        for function in rendered_functions(ir) {
            let base = match (function.overloaded, function.is_signature_key()) {
                (true, true) => format!("{}{}", pascal_case(&function.name), function.ordinal),
                _ => pascal_case(&function.name),
            };
            let base = unique(type_base(&base), &mut call_names);
            sections.push(call_struct(function, &base));
            variants.push((format_ident!("{}", base), format_ident!("{}Call", base)));
        }

        for event in &ir.events {
            let base = unique(type_base(&pascal_case(&event.name)), &mut event_names);
            sections.push(event_struct(event, &base));
        }

        let calls = format_ident!("{}Calls", type_base(&pascal_case(&ir.name)));
        let names: Vec<&Ident> = variants.iter().map(|(variant, _)| variant).collect();
        let structs: Vec<&Ident> = variants.iter().map(|(_, call)| call).collect();
        sections.push(quote! {
            #[doc = "Every call of the contract"]
            #[derive(Debug, Clone, PartialEq, Eq)]
            pub enum #calls {
                #( #names(#structs), )*
            }

            impl #calls {
                #[doc = "Signature of the wrapped call"]
                pub fn signature(&self) -> &'static str {
                    match *self {
                        #( Self::#names(_) => #structs::SIGNATURE, )*
                    }
                }
            }
        });

        let mut out = format!("// {}\n// Bindings for `{}`.\n\n", GENERATED_HEADER, ir.name);
        let prelude = quote! {
            #[allow(unused_imports)]
            use alloy_primitives::{Address, I256, U256};
        };
        out.push_str(&prelude.to_string());
        out.push('\n');
        for section in sections {
            out.push('\n');
            out.push_str(&section.to_string());
            out.push('\n');
        }
        Ok(out)
    }

    fn render_index(&self, names: &[String]) -> Result<String> {
        let mut out = format!("// {}\n\n", GENERATED_HEADER);
        for name in names {
            let module = ident(&module_name(name));
            out.push_str(&quote! { pub mod #module; }.to_string());
            out.push('\n');
        }
        Ok(out)
    }
}

/// Entries that get their own struct: signature aliases of unique
/// functions duplicate their bare-name entry and are skipped
fn rendered_functions(ir: &BindingIR) -> impl Iterator<Item = &FunctionIR> {
    ir.functions
        .iter()
        .filter(|f| f.overloaded || !f.is_signature_key())
}

fn type_base(name: &str) -> String {
    match identifier(name, || "Unnamed".to_string()) {
        base if base == "Self" => "Self_".to_string(),
        base => base,
    }
}

/// Module file stem; never the index stem
fn module_name(name: &str) -> String {
    match identifier(&snake_case(name), || "binding".to_string()) {
        module if module == INDEX_STEM || RESERVED.contains(&module.as_str()) => {
            format!("{}_", module)
        }
        module => module,
    }
}

/// Identifier, raw when it collides with a keyword
fn ident(name: &str) -> Ident {
    if RESERVED.contains(&name) {
        format_ident!("{}_", name)
    } else if KEYWORDS.contains(&name) {
        Ident::new_raw(name, Span::call_site())
    } else {
        Ident::new(name, Span::call_site())
    }
}

fn fields(params: &[ParamIR]) -> (Vec<Ident>, Vec<TokenStream>) {
    let mut seen = HashSet::new();
    params
        .iter()
        .enumerate()
        .map(|(i, p)| {
            let name = unique(
                identifier(&snake_case(&p.name), || format!("arg{}", i)),
                &mut seen,
            );
            (ident(&name), rust_type(&p.ty))
        })
        .unzip()
}

fn call_struct(function: &FunctionIR, base: &str) -> TokenStream {
    let call = format_ident!("{}Call", base);
    let ret = format_ident!("{}Return", base);
    let signature = Literal::string(&function.signature);
    let mutability = Literal::string(function.mutability.as_str());
    let doc = format!("Call `{}`", function.signature);
    let (names, types) = fields(&function.inputs);

    let outputs: Vec<TokenStream> = function.outputs.iter().map(|p| rust_type(&p.ty)).collect();
    let ret_ty = match outputs.as_slice() {
        [single] => single.clone(),
        many => quote! { ( #( #many, )* ) },
    };

    quote! {
        #[doc = #doc]
        #[derive(Debug, Clone, PartialEq, Eq)]
        pub struct #call {
            #( pub #names: #types, )*
        }

        impl #call {
            #[doc = "Canonical signature"]
            pub const SIGNATURE: &'static str = #signature;
            #[doc = "State mutability"]
            pub const MUTABILITY: &'static str = #mutability;
        }

        #[doc = "Decoded outputs of the call"]
        pub type #ret = #ret_ty;
    }
}

fn event_struct(event: &EventIR, base: &str) -> TokenStream {
    let name = format_ident!("{}Event", base);
    let signature = Literal::string(&event.signature);
    let anonymous = event.anonymous;
    let doc = format!("Event `{}`", event.signature);
    let (names, types) = fields(&event.inputs);
    let indexed: Vec<Literal> = event
        .inputs
        .iter()
        .map(|p| Literal::string(if p.indexed { "indexed" } else { "data" }))
        .collect();

    quote! {
        #[doc = #doc]
        #[derive(Debug, Clone, PartialEq, Eq)]
        pub struct #name {
            #( #[doc = #indexed] pub #names: #types, )*
        }

        impl #name {
            #[doc = "Canonical signature"]
            pub const SIGNATURE: &'static str = #signature;
            #[doc = "Whether the event omits its signature topic"]
            pub const ANONYMOUS: bool = #anonymous;
        }
    }
}

fn rust_type(ty: &TypeIR) -> TokenStream {
    match ty {
        TypeIR::Address => quote! { Address },
        TypeIR::Bool => quote! { bool },
        TypeIR::String => quote! { String },
        TypeIR::Bytes => quote! { Vec<u8> },
        TypeIR::FixedBytes(n) => {
            let n = Literal::usize_unsuffixed(*n);
            quote! { [u8; #n] }
        }
        TypeIR::Uint(bits) => match bits {
            0..=8 => quote! { u8 },
            9..=16 => quote! { u16 },
            17..=32 => quote! { u32 },
            33..=64 => quote! { u64 },
            65..=128 => quote! { u128 },
            _ => quote! { U256 },
        },
        TypeIR::Int(bits) => match bits {
            0..=8 => quote! { i8 },
            9..=16 => quote! { i16 },
            17..=32 => quote! { i32 },
            33..=64 => quote! { i64 },
            65..=128 => quote! { i128 },
            _ => quote! { I256 },
        },
        TypeIR::Array(inner) => {
            let inner = rust_type(inner);
            quote! { Vec<#inner> }
        }
        TypeIR::FixedArray(inner, n) => {
            let inner = rust_type(inner);
            let n = Literal::usize_unsuffixed(*n);
            quote! { [#inner; #n] }
        }
        TypeIR::Tuple(members) => {
            let members: Vec<TokenStream> = members.iter().map(|m| rust_type(&m.ty)).collect();
            quote! { ( #( #members, )* ) }
        }
    }
}
