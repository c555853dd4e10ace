//! ethers v5 TypeScript bindings
//!
//! Type strings are prepared in Rust; the templates only lay them out.

use minijinja::{AutoEscape, Environment, context};
use serde::Serialize;

use kiln_core::StateMutability;
use kiln_core::config::Dialect;

use super::{BindingTarget, GENERATED_HEADER, identifier};
use crate::error::Result;
use crate::ir::{BindingIR, EventIR, FunctionIR, ParamIR, TypeIR};

const BINDING_TEMPLATE: &str = r#"/* {{ header }} */
/* eslint-disable */
import type {
  BaseContract,
  BigNumber,
  BigNumberish,
  BytesLike,
  CallOverrides,
  ContractTransaction,
  EventFilter,
  Overrides,
  PayableOverrides,
  Signer,
  providers,
  utils,
} from "ethers";
import { Contract } from "ethers";

export interface {{ name }}Interface extends utils.Interface {
  functions: {
{% for f in fragments %}
    "{{ f }}": utils.FunctionFragment;
{% endfor %}
  };
}

export interface {{ name }} extends BaseContract {
  interface: {{ name }}Interface;

  connect(signerOrProvider: Signer | providers.Provider | string): this;
  attach(addressOrName: string): this;
  deployed(): Promise<this>;

  functions: {
{% for f in functions %}
    {{ f.key }}({{ f.params }}): Promise<{{ f.wrapped }}>;
{% endfor %}
  };

{% for f in functions %}
  {{ f.key }}({{ f.params }}): Promise<{{ f.direct }}>;
{% endfor %}

  filters: {
{% for e in events %}
    {{ e.key }}({{ e.params }}): EventFilter;
{% endfor %}
  };
}

export const {{ name }}__abi = {{ abi }} as const;

export function connect{{ name }}(
  address: string,
  signerOrProvider: Signer | providers.Provider
): {{ name }} {
  return new Contract(address, {{ name }}__abi, signerOrProvider) as unknown as {{ name }};
}
"#;

const INDEX_TEMPLATE: &str = r#"/* {{ header }} */
/* eslint-disable */
{% for entry in entries %}
export type { {{ entry.name }} } from "./{{ entry.file }}";
export { connect{{ entry.name }}, {{ entry.name }}__abi } from "./{{ entry.file }}";
{% endfor %}
"#;

/// Identifiers TypeScript does not accept as parameter names
const RESERVED: &[&str] = &[
    "break", "case", "catch", "class", "const", "continue", "debugger", "default", "delete", "do",
    "else", "enum", "export", "extends", "false", "finally", "for", "function", "if", "import",
    "in", "instanceof", "new", "null", "return", "super", "switch", "this", "throw", "true", "try",
    "typeof", "var", "void", "while", "with", "overrides",
];

/// Output integers up to this width fit a JS `number`
const NUMBER_MAX_BITS: usize = 48;

#[derive(Serialize)]
struct FunctionView {
    key: String,
    params: String,
    wrapped: String,
    direct: String,
}

#[derive(Serialize)]
struct IndexEntry {
    name: String,
    file: String,
}

#[derive(Serialize)]
struct EventView {
    key: String,
    params: String,
}

/// TypeScript bindings for ethers v5
pub struct EthersV5Target {
    env: Environment<'static>,
}

impl EthersV5Target {
    /// Create the target, compiling its templates
    pub fn new() -> Result<Self> {
        let mut env = Environment::new();
        env.set_trim_blocks(true);
        env.set_lstrip_blocks(true);
        env.set_keep_trailing_newline(true);
        env.set_auto_escape_callback(|_| AutoEscape::None);
        env.add_template("binding.ts", BINDING_TEMPLATE)?;
        env.add_template("index.ts", INDEX_TEMPLATE)?;
        Ok(Self { env })
    }
}

impl BindingTarget for EthersV5Target {
    fn dialect(&self) -> Dialect {
        Dialect::EthersV5
    }

    fn extension(&self) -> &'static str {
        "ts"
    }

    fn index_stem(&self) -> &'static str {
        "index"
    }

    fn render(&self, ir: &BindingIR) -> Result<String> {
        let mut fragments: Vec<&str> = Vec::new();
        for f in &ir.functions {
            if !fragments.contains(&f.signature.as_str()) {
                fragments.push(&f.signature);
            }
        }

        let functions: Vec<FunctionView> = ir.functions.iter().map(function_view).collect();
        let events: Vec<EventView> = ir.events.iter().map(event_view).collect();

        let template = self.env.get_template("binding.ts")?;
        Ok(template.render(context! {
            header => GENERATED_HEADER,
            name => type_name(&ir.name),
            fragments => fragments,
            functions => functions,
            events => events,
            abi => ir.abi_json,
        })?)
    }

    fn render_index(&self, names: &[String]) -> Result<String> {
        let entries: Vec<IndexEntry> = names
            .iter()
            .map(|name| IndexEntry {
                name: type_name(name),
                file: self.file_stem(name),
            })
            .collect();
        let template = self.env.get_template("index.ts")?;
        Ok(template.render(context! {
            header => GENERATED_HEADER,
            entries => entries,
        })?)
    }
}

/// Descriptor name as a TypeScript type identifier; the file keeps the raw name
fn type_name(name: &str) -> String {
    identifier(name, || "Contract".to_string())
}

fn property_key(key: &str) -> String {
    if key.contains('(') {
        format!("\"{}\"", key)
    } else {
        key.to_string()
    }
}

fn param_name(param: &ParamIR, index: usize) -> String {
    let name = identifier(&param.name, || format!("arg{}", index));
    if RESERVED.contains(&name.as_str()) {
        format!("{}_", name)
    } else {
        name
    }
}

fn function_view(f: &FunctionIR) -> FunctionView {
    let mut params: Vec<String> = f
        .inputs
        .iter()
        .enumerate()
        .map(|(i, p)| format!("{}: {}", param_name(p, i), input_type(&p.ty)))
        .collect();
    let overrides = match f.mutability {
        StateMutability::Pure | StateMutability::View => "CallOverrides",
        StateMutability::Payable => "PayableOverrides & { from?: string }",
        StateMutability::Nonpayable => "Overrides & { from?: string }",
    };
    params.push(format!("overrides?: {}", overrides));

    let outputs: Vec<String> = f.outputs.iter().map(|p| output_type(&p.ty)).collect();
    let (wrapped, direct) = if f.mutability.is_read_only() {
        let direct = match outputs.as_slice() {
            [] => "void".to_string(),
            [single] => single.clone(),
            many => format!("[{}]", many.join(", ")),
        };
        (format!("[{}]", outputs.join(", ")), direct)
    } else {
        (
            "ContractTransaction".to_string(),
            "ContractTransaction".to_string(),
        )
    };

    FunctionView {
        key: property_key(&f.key),
        params: params.join(", "),
        wrapped,
        direct,
    }
}

fn event_view(e: &EventIR) -> EventView {
    let params: Vec<String> = e
        .inputs
        .iter()
        .enumerate()
        .filter(|(_, p)| p.indexed)
        .map(|(i, p)| format!("{}?: {} | null", param_name(p, i), input_type(&p.ty)))
        .collect();
    EventView {
        key: property_key(&e.key),
        params: params.join(", "),
    }
}

fn input_type(ty: &TypeIR) -> String {
    match ty {
        TypeIR::Address | TypeIR::String => "string".to_string(),
        TypeIR::Bool => "boolean".to_string(),
        TypeIR::Bytes | TypeIR::FixedBytes(_) => "BytesLike".to_string(),
        TypeIR::Uint(_) | TypeIR::Int(_) => "BigNumberish".to_string(),
        TypeIR::Array(inner) | TypeIR::FixedArray(inner, _) => format!("({})[]", input_type(inner)),
        TypeIR::Tuple(members) => {
            let fields: Vec<String> = members
                .iter()
                .enumerate()
                .map(|(i, m)| format!("{}: {}", param_name(m, i), input_type(&m.ty)))
                .collect();
            format!("{{ {} }}", fields.join("; "))
        }
    }
}

fn output_type(ty: &TypeIR) -> String {
    match ty {
        TypeIR::Address | TypeIR::String | TypeIR::Bytes | TypeIR::FixedBytes(_) => {
            "string".to_string()
        }
        TypeIR::Bool => "boolean".to_string(),
        TypeIR::Uint(bits) | TypeIR::Int(bits) if *bits <= NUMBER_MAX_BITS => "number".to_string(),
        TypeIR::Uint(_) | TypeIR::Int(_) => "BigNumber".to_string(),
        TypeIR::Array(inner) | TypeIR::FixedArray(inner, _) => {
            format!("({})[]", output_type(inner))
        }
        TypeIR::Tuple(members) => {
            let positional: Vec<String> = members.iter().map(|m| output_type(&m.ty)).collect();
            let named: Vec<String> = members
                .iter()
                .enumerate()
                .map(|(i, m)| format!("{}: {}", param_name(m, i), output_type(&m.ty)))
                .collect();
            format!("[{}] & {{ {} }}", positional.join(", "), named.join("; "))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_core::InterfaceDescriptor;

    const ESCROW: &str = r#"[
        {"type":"function","name":"locked__end","inputs":[{"name":"_addr","type":"address"}],
         "outputs":[{"name":"","type":"uint256"}],"stateMutability":"view"},
        {"type":"function","name":"decimals","inputs":[],"outputs":[{"name":"","type":"uint8"}],"stateMutability":"view"},
        {"type":"function","name":"deposit_for","inputs":[{"name":"_addr","type":"address"},{"name":"_value","type":"uint256"}],
         "outputs":[],"stateMutability":"nonpayable"},
        {"type":"function","name":"deposit_for","inputs":[{"name":"_addr","type":"address"}],
         "outputs":[],"stateMutability":"payable"},
        {"type":"event","name":"Deposit","inputs":[{"name":"provider","type":"address","indexed":true},
         {"name":"value","type":"uint256","indexed":false}],"anonymous":false}
    ]"#;

    fn render(always_generate_overloads: bool) -> String {
        let desc = InterfaceDescriptor::from_json("VotingEscrow", ESCROW).unwrap();
        let ir = BindingIR::lower(&desc, always_generate_overloads).unwrap();
        EthersV5Target::new().unwrap().render(&ir).unwrap()
    }

    #[test]
    fn test_render_read_only_function() {
        let ts = render(false);
        assert!(ts.contains("export interface VotingEscrow extends BaseContract {"));
        assert!(ts.contains(
            "  locked__end(_addr: string, overrides?: CallOverrides): Promise<BigNumber>;"
        ));
        assert!(ts.contains("  decimals(overrides?: CallOverrides): Promise<number>;"));
        assert!(ts.contains("    locked__end(_addr: string, overrides?: CallOverrides): Promise<[BigNumber]>;"));
    }

    #[test]
    fn test_render_overloads_by_signature() {
        let ts = render(true);
        assert!(ts.contains(
            "  \"deposit_for(address,uint256)\"(_addr: string, _value: BigNumberish, overrides?: Overrides & { from?: string }): Promise<ContractTransaction>;"
        ));
        assert!(ts.contains(
            "  \"deposit_for(address)\"(_addr: string, overrides?: PayableOverrides & { from?: string }): Promise<ContractTransaction>;"
        ));
        assert!(!ts.contains("  deposit_for("));
        assert!(ts.contains("  \"locked__end(address)\"("));
    }

    #[test]
    fn test_render_without_overloads_uses_first_signature() {
        let ts = render(false);
        assert!(ts.contains("  deposit_for(_addr: string, _value: BigNumberish, overrides?: Overrides"));
        assert!(!ts.contains("\"deposit_for(address)\"("));
    }

    #[test]
    fn test_render_event_filter_and_abi() {
        let ts = render(false);
        assert!(ts.contains("    Deposit(provider?: string | null): EventFilter;"));
        assert!(ts.contains("export const VotingEscrow__abi = [{\"type\":\"function\""));
        assert!(ts.contains("    \"deposit_for(address,uint256)\": utils.FunctionFragment;"));
        assert!(!ts.contains("\"deposit_for(address)\": utils.FunctionFragment;"));
    }

    #[test]
    fn test_render_is_byte_identical() {
        assert_eq!(render(true), render(true));
    }

    #[test]
    fn test_render_index() {
        let target = EthersV5Target::new().unwrap();
        let index = target
            .render_index(&["RewardDripper".to_string(), "VotingEscrow".to_string()])
            .unwrap();
        assert!(index.contains("export type { RewardDripper } from \"./RewardDripper\";\n"));
        assert!(index.contains("export { connectVotingEscrow, VotingEscrow__abi } from \"./VotingEscrow\";\n"));
    }

    #[test]
    fn test_render_sanitizes_contract_name() {
        let desc = InterfaceDescriptor::from_json("my-token", "[]").unwrap();
        let ir = BindingIR::lower(&desc, false).unwrap();
        let target = EthersV5Target::new().unwrap();
        let ts = target.render(&ir).unwrap();
        assert!(ts.contains("export interface my_tokenInterface extends utils.Interface {"));
        assert!(ts.contains("export const my_token__abi = [] as const;"));
        assert!(ts.contains("export function connectmy_token("));
        assert!(!ts.contains("my-token"));

        assert_eq!(target.file_stem("my-token"), "my-token");
        let index = target.render_index(&["my-token".to_string()]).unwrap();
        assert!(index.contains("export type { my_token } from \"./my-token\";\n"));
        assert!(index.contains("export { connectmy_token, my_token__abi } from \"./my-token\";\n"));
    }

    #[test]
    fn test_output_types() {
        assert_eq!(output_type(&TypeIR::Uint(48)), "number");
        assert_eq!(output_type(&TypeIR::Int(64)), "BigNumber");
        assert_eq!(output_type(&TypeIR::FixedBytes(32)), "string");
        assert_eq!(
            output_type(&TypeIR::Array(Box::new(TypeIR::Address))),
            "(string)[]"
        );
        assert_eq!(input_type(&TypeIR::Bytes), "BytesLike");
    }
}
