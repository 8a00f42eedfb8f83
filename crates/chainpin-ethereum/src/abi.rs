//! Solidity ABI entries and their conversion to and from FFI definitions.
//!
//! FFI params carry a JSON schema whose `details` block holds the ABI type:
//!
//! ```json
//! { "type": "integer", "details": { "type": "uint256", "internalType": "uint256" } }
//! ```
//!
//! Tuple members are schema `properties`, each with a `details.index` giving
//! its position in the tuple.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use chainpin_core::ffi::{
    Ffi, FfiEvent, FfiEventDefinition, FfiGenerationRequest, FfiMethod, FfiParam,
    FfiParamValidator,
};
use chainpin_core::{JsonObject, PluginError};

pub const BATCH_PIN_EVENT: &str = "BatchPin";

const INTEGER_DESCRIPTION: &str = "An integer. You are recommended to use a JSON string. \
A JSON number can be used for values up to the safe maximum.";

fn is_false(b: &bool) -> bool {
    !*b
}

/// One input/output/component of an ABI entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AbiParameter {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default)]
    pub param_type: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub internal_type: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub components: Vec<AbiParameter>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub indexed: bool,
}

impl AbiParameter {
    /// A parameter whose internal type equals its ABI type.
    pub fn new(name: &str, param_type: &str) -> Self {
        Self {
            name: name.to_string(),
            param_type: param_type.to_string(),
            internal_type: param_type.to_string(),
            ..Default::default()
        }
    }

    fn signature_type(&self) -> String {
        match self.param_type.strip_prefix("tuple") {
            Some(array_suffix) => {
                let inner: Vec<String> = self.components.iter().map(Self::signature_type).collect();
                format!("({}){array_suffix}", inner.join(","))
            }
            None => self.param_type.clone(),
        }
    }
}

/// A function or event in a contract ABI.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AbiEntry {
    #[serde(rename = "type", default, skip_serializing_if = "String::is_empty")]
    pub entry_type: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default)]
    pub inputs: Vec<AbiParameter>,
    #[serde(default)]
    pub outputs: Vec<AbiParameter>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub state_mutability: String,
    #[serde(default, skip_serializing_if = "is_false")]
    pub payable: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub constant: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub anonymous: bool,
}

impl AbiEntry {
    pub fn function(name: &str, inputs: Vec<AbiParameter>, outputs: Vec<AbiParameter>) -> Self {
        Self {
            entry_type: "function".into(),
            name: name.to_string(),
            inputs,
            outputs,
            ..Default::default()
        }
    }

    pub fn event(name: &str, inputs: Vec<AbiParameter>) -> Self {
        Self {
            entry_type: "event".into(),
            name: name.to_string(),
            inputs,
            ..Default::default()
        }
    }

    /// Canonical signature, e.g. `Changed(uint256,(uint256,uint256))`.
    pub fn signature(&self) -> String {
        let types: Vec<String> = self.inputs.iter().map(AbiParameter::signature_type).collect();
        format!("{}({})", self.name, types.join(","))
    }
}

// ─── FireFly contract ABI ────────────────────────────────────────────────────

/// `pinBatch(string,bytes32,bytes32,string,bytes32[])`.
pub fn pin_batch_method() -> AbiEntry {
    AbiEntry::function(
        "pinBatch",
        vec![
            AbiParameter::new("namespace", "string"),
            AbiParameter::new("uuids", "bytes32"),
            AbiParameter::new("batchHash", "bytes32"),
            AbiParameter::new("payloadRef", "string"),
            AbiParameter::new("contexts", "bytes32[]"),
        ],
        vec![],
    )
}

/// `networkVersion() pure returns (uint8)`.
pub fn network_version_method() -> AbiEntry {
    AbiEntry {
        state_mutability: "pure".into(),
        ..AbiEntry::function("networkVersion", vec![], vec![AbiParameter::new("", "uint8")])
    }
}

/// `BatchPin(address,uint256,string,bytes32,bytes32,string,bytes32[])`.
pub fn batch_pin_event() -> AbiEntry {
    AbiEntry::event(
        BATCH_PIN_EVENT,
        vec![
            AbiParameter::new("author", "address"),
            AbiParameter::new("timestamp", "uint256"),
            AbiParameter::new("namespace", "string"),
            AbiParameter::new("uuids", "bytes32"),
            AbiParameter::new("batchHash", "bytes32"),
            AbiParameter::new("payloadRef", "string"),
            AbiParameter::new("contexts", "bytes32[]"),
        ],
    )
}

// ─── FFI → ABI ───────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ParamDetails {
    #[serde(rename = "type", default)]
    param_type: String,
    #[serde(default)]
    internal_type: String,
    #[serde(default)]
    indexed: bool,
    #[serde(default)]
    index: Option<usize>,
}

fn invalid_details(param: &str, reason: impl Into<String>) -> PluginError {
    PluginError::InvalidParamDetails {
        param: param.to_string(),
        reason: reason.into(),
    }
}

fn schema_object<'a>(param: &str, schema: &'a Value) -> Result<&'a JsonObject, PluginError> {
    schema
        .as_object()
        .ok_or_else(|| invalid_details(param, "schema is not a JSON object"))
}

fn param_details(param: &str, schema: &JsonObject) -> Result<ParamDetails, PluginError> {
    let raw = schema
        .get("details")
        .ok_or_else(|| invalid_details(param, "'details' not set"))?;
    let details: ParamDetails =
        serde_json::from_value(raw.clone()).map_err(|e| invalid_details(param, e.to_string()))?;
    if details.param_type.is_empty() {
        return Err(invalid_details(param, "'details.type' not set"));
    }
    Ok(details)
}

fn field_to_abi(name: &str, schema: &Value) -> Result<AbiParameter, PluginError> {
    let schema = schema_object(name, schema)?;
    let details = param_details(name, schema)?;
    let components = if details.param_type.starts_with("tuple") {
        tuple_components(name, schema)?
    } else {
        Vec::new()
    };
    Ok(AbiParameter {
        name: name.to_string(),
        param_type: details.param_type,
        internal_type: details.internal_type,
        components,
        indexed: details.indexed,
    })
}

/// Walks through `items` of (nested) arrays down to the tuple's `properties`.
fn tuple_components(name: &str, schema: &JsonObject) -> Result<Vec<AbiParameter>, PluginError> {
    if schema.get("type").and_then(Value::as_str) == Some("array") {
        let items = schema
            .get("items")
            .ok_or_else(|| invalid_details(name, "array schema has no 'items'"))?;
        return tuple_components(name, schema_object(name, items)?);
    }
    let properties = schema
        .get("properties")
        .and_then(Value::as_object)
        .ok_or_else(|| invalid_details(name, "tuple schema has no 'properties'"))?;

    let mut members = Vec::with_capacity(properties.len());
    for (prop_name, prop_schema) in properties {
        let index = param_details(prop_name, schema_object(prop_name, prop_schema)?)?
            .index
            .ok_or_else(|| invalid_details(prop_name, "'details.index' not set"))?;
        members.push((index, field_to_abi(prop_name, prop_schema)?));
    }
    members.sort_by_key(|(index, _)| *index);
    Ok(members.into_iter().map(|(_, param)| param).collect())
}

fn params_to_abi(params: &[FfiParam]) -> Result<Vec<AbiParameter>, PluginError> {
    params
        .iter()
        .map(|p| field_to_abi(&p.name, &p.schema))
        .collect()
}

fn flag(details: &JsonObject, key: &str) -> bool {
    details.get(key).and_then(Value::as_bool).unwrap_or(false)
}

pub fn ffi_method_to_abi(method: &FfiMethod) -> Result<AbiEntry, PluginError> {
    Ok(AbiEntry {
        state_mutability: method
            .details
            .get("stateMutability")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        payable: flag(&method.details, "payable"),
        constant: flag(&method.details, "constant"),
        ..AbiEntry::function(
            &method.name,
            params_to_abi(&method.params)?,
            params_to_abi(&method.returns)?,
        )
    })
}

pub fn ffi_event_to_abi(event: &FfiEventDefinition) -> Result<AbiEntry, PluginError> {
    Ok(AbiEntry {
        anonymous: flag(&event.details, "anonymous"),
        ..AbiEntry::event(&event.name, params_to_abi(&event.params)?)
    })
}

/// Signature of an FFI event, or `""` when its params do not convert.
pub fn event_signature(event: &FfiEventDefinition) -> String {
    match ffi_event_to_abi(event) {
        Ok(abi) => abi.signature(),
        Err(e) => {
            tracing::debug!(event = %event.name, error = %e, "cannot build event signature");
            String::new()
        }
    }
}

// ─── ABI → FFI ───────────────────────────────────────────────────────────────

enum FfiType {
    String,
    Boolean,
    Integer,
    Object,
}

fn ffi_type(solidity_type: &str) -> Option<FfiType> {
    match solidity_type {
        "string" | "address" => Some(FfiType::String),
        "bool" => Some(FfiType::Boolean),
        "tuple" => Some(FfiType::Object),
        t if t.contains("byte") => Some(FfiType::String),
        t if t.contains("int") => Some(FfiType::Integer),
        _ => None,
    }
}

/// `uint256[3][]` → `uint256[3]`.
fn array_element(solidity_type: &str) -> Option<&str> {
    if solidity_type.ends_with(']') {
        solidity_type.rfind('[').map(|i| &solidity_type[..i])
    } else {
        None
    }
}

fn details_value(param: &AbiParameter, index: Option<usize>) -> Value {
    let mut details = JsonObject::new();
    details.insert("type".into(), json!(param.param_type));
    if !param.internal_type.is_empty() {
        details.insert("internalType".into(), json!(param.internal_type));
    }
    if param.indexed {
        details.insert("indexed".into(), json!(true));
    }
    if let Some(index) = index {
        details.insert("index".into(), json!(index));
    }
    Value::Object(details)
}

fn type_schema(
    param: &AbiParameter,
    solidity_type: &str,
    details: Option<Value>,
) -> Result<Value, PluginError> {
    let mut schema = JsonObject::new();
    if let Some(element) = array_element(solidity_type) {
        schema.insert("type".into(), json!("array"));
        schema.insert("items".into(), type_schema(param, element, None)?);
    } else {
        match ffi_type(solidity_type) {
            Some(FfiType::Integer) => {
                schema.insert("oneOf".into(), json!([{"type": "string"}, {"type": "integer"}]));
                schema.insert("description".into(), json!(INTEGER_DESCRIPTION));
            }
            Some(FfiType::Object) => {
                let mut properties = JsonObject::new();
                for (i, component) in param.components.iter().enumerate() {
                    let member = type_schema(
                        component,
                        &component.param_type,
                        Some(details_value(component, Some(i))),
                    )?;
                    properties.insert(component.name.clone(), member);
                }
                schema.insert("type".into(), json!("object"));
                schema.insert("properties".into(), Value::Object(properties));
            }
            Some(FfiType::String) => {
                schema.insert("type".into(), json!("string"));
            }
            Some(FfiType::Boolean) => {
                schema.insert("type".into(), json!("boolean"));
            }
            None => return Err(PluginError::UnsupportedAbiType(solidity_type.to_string())),
        }
    }
    if let Some(details) = details {
        schema.insert("details".into(), details);
    }
    Ok(Value::Object(schema))
}

fn params_to_ffi(params: &[AbiParameter]) -> Result<Vec<FfiParam>, PluginError> {
    params
        .iter()
        .map(|p| {
            Ok(FfiParam {
                name: p.name.clone(),
                schema: type_schema(p, &p.param_type, Some(details_value(p, None)))?,
            })
        })
        .collect()
}

pub fn abi_function_to_ffi(entry: &AbiEntry) -> Result<FfiMethod, PluginError> {
    let mut details = JsonObject::new();
    if !entry.state_mutability.is_empty() {
        details.insert("stateMutability".into(), json!(entry.state_mutability));
    }
    if entry.payable {
        details.insert("payable".into(), json!(true));
    }
    if entry.constant {
        details.insert("constant".into(), json!(true));
    }
    Ok(FfiMethod {
        name: entry.name.clone(),
        description: String::new(),
        params: params_to_ffi(&entry.inputs)?,
        returns: params_to_ffi(&entry.outputs)?,
        details,
    })
}

pub fn abi_event_to_ffi(entry: &AbiEntry) -> Result<FfiEvent, PluginError> {
    let mut details = JsonObject::new();
    if entry.anonymous {
        details.insert("anonymous".into(), json!(true));
    }
    Ok(FfiEvent {
        definition: FfiEventDefinition {
            name: entry.name.clone(),
            description: String::new(),
            params: params_to_ffi(&entry.inputs)?,
            details,
        },
    })
}

/// Builds an FFI from the functions and events of `abi`. Other entry types are ignored.
pub fn abi_to_ffi(
    namespace: &str,
    name: &str,
    version: &str,
    description: &str,
    abi: &[AbiEntry],
) -> Result<Ffi, PluginError> {
    let mut ffi = Ffi {
        namespace: namespace.to_string(),
        name: name.to_string(),
        version: version.to_string(),
        description: description.to_string(),
        methods: Vec::new(),
        events: Vec::new(),
    };
    for entry in abi {
        match entry.entry_type.as_str() {
            "function" => ffi.methods.push(abi_function_to_ffi(entry)?),
            "event" => ffi.events.push(abi_event_to_ffi(entry)?),
            _ => {}
        }
    }
    Ok(ffi)
}

/// Handles an FFI generation request whose input is `{"abi": [...]}`.
pub fn generate_ffi(request: &FfiGenerationRequest) -> Result<Ffi, PluginError> {
    let abi: Vec<AbiEntry> = request
        .input
        .get("abi")
        .cloned()
        .ok_or_else(|| PluginError::FfiGenerationFailed("unable to deserialize JSON as ABI".into()))
        .and_then(|v| {
            serde_json::from_value(v).map_err(|_| {
                PluginError::FfiGenerationFailed("unable to deserialize JSON as ABI".into())
            })
        })?;
    if abi.is_empty() {
        return Err(PluginError::FfiGenerationFailed("ABI is empty".into()));
    }
    abi_to_ffi(
        &request.namespace,
        &request.name,
        &request.version,
        &request.description,
        &abi,
    )
}

/// Requires each FFI param schema to name its ABI type in `details.type`.
#[derive(Debug, Default, Clone, Copy)]
pub struct EthereumFfiParamValidator;

impl FfiParamValidator for EthereumFfiParamValidator {
    fn extension_name(&self) -> &str {
        "details"
    }

    fn validate_param(&self, param: &FfiParam) -> Result<(), PluginError> {
        param_details(&param.name, schema_object(&param.name, &param.schema)?).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn param(name: &str, schema: Value) -> FfiParam {
        FfiParam {
            name: name.into(),
            schema,
        }
    }

    fn uint_schema(index: Option<usize>) -> Value {
        let mut details = json!({"type": "uint256", "internalType": "uint256"});
        if let Some(i) = index {
            details["index"] = json!(i);
        }
        json!({
            "oneOf": [{"type": "string"}, {"type": "integer"}],
            "details": details,
            "description": INTEGER_DESCRIPTION,
        })
    }

    fn changed_event() -> FfiEventDefinition {
        FfiEventDefinition {
            name: "Changed".into(),
            description: String::new(),
            params: vec![
                param("x", json!({"type": "integer", "details": {"type": "uint256"}})),
                param("y", json!({"type": "integer", "details": {"type": "uint256"}})),
                param(
                    "z",
                    json!({
                        "type": "object",
                        "details": {"type": "tuple"},
                        "properties": {
                            "b": {"type": "integer", "details": {"type": "uint256", "index": 1}},
                            "a": {"type": "integer", "details": {"type": "uint256", "index": 0}}
                        }
                    }),
                ),
            ],
            details: JsonObject::new(),
        }
    }

    #[test]
    fn tuple_components_follow_details_index() {
        let abi = ffi_event_to_abi(&changed_event()).unwrap();
        let z = &abi.inputs[2];
        assert_eq!(z.param_type, "tuple");
        assert_eq!(z.components[0].name, "a");
        assert_eq!(z.components[1].name, "b");
    }

    #[test]
    fn signature_renders_tuples_in_parens() {
        assert_eq!(
            event_signature(&changed_event()),
            "Changed(uint256,uint256,(uint256,uint256))"
        );
    }

    #[test]
    fn signature_keeps_tuple_array_suffix() {
        let event = FfiEventDefinition {
            name: "Set".into(),
            params: vec![param(
                "items",
                json!({
                    "type": "array",
                    "details": {"type": "tuple[]"},
                    "items": {
                        "type": "object",
                        "properties": {
                            "id": {"type": "string", "details": {"type": "bytes32", "index": 0}},
                            "on": {"type": "boolean", "details": {"type": "bool", "index": 1}}
                        }
                    }
                }),
            )],
            ..Default::default()
        };
        assert_eq!(event_signature(&event), "Set((bytes32,bool)[])");
    }

    #[test]
    fn signature_empty_for_bad_schema() {
        let event = FfiEventDefinition {
            name: "Changed".into(),
            params: vec![param("x", json!({"type": "integer", "detailz": {"type": "uint256"}}))],
            ..Default::default()
        };
        assert_eq!(event_signature(&event), "");
    }

    #[test]
    fn method_to_abi_reads_details() {
        let method = FfiMethod {
            name: "set".into(),
            params: vec![param(
                "newValue",
                json!({"type": "integer", "details": {"type": "uint256", "internalType": "uint256"}}),
            )],
            returns: vec![],
            details: serde_json::from_value(json!({"stateMutability": "payable", "payable": true}))
                .unwrap(),
            ..Default::default()
        };
        let abi = ffi_method_to_abi(&method).unwrap();
        assert_eq!(abi.entry_type, "function");
        assert_eq!(abi.state_mutability, "payable");
        assert!(abi.payable);
        assert!(!abi.constant);
        assert_eq!(abi.inputs[0], AbiParameter::new("newValue", "uint256"));
    }

    #[test]
    fn missing_details_is_rejected() {
        let method = FfiMethod {
            name: "set".into(),
            params: vec![param("x", json!({"type": "integer", "detailz": {"type": "uint256"}}))],
            ..Default::default()
        };
        assert!(matches!(
            ffi_method_to_abi(&method),
            Err(PluginError::InvalidParamDetails { .. })
        ));
    }

    #[test]
    fn tuple_member_without_index_is_rejected() {
        let event = FfiEventDefinition {
            name: "E".into(),
            params: vec![param(
                "z",
                json!({
                    "type": "object",
                    "details": {"type": "tuple"},
                    "properties": { "a": {"type": "integer", "details": {"type": "uint256"}} }
                }),
            )],
            ..Default::default()
        };
        assert!(ffi_event_to_abi(&event).is_err());
    }

    #[test]
    fn abi_function_to_ffi_schemas() {
        let entry = AbiEntry {
            constant: true,
            state_mutability: "view".into(),
            ..AbiEntry::function(
                "get",
                vec![
                    AbiParameter::new("owner", "address"),
                    AbiParameter::new("flag", "bool"),
                    AbiParameter::new("data", "bytes"),
                    AbiParameter::new("grid", "uint256[][]"),
                ],
                vec![AbiParameter::new("out", "uint256")],
            )
        };
        let method = abi_function_to_ffi(&entry).unwrap();

        assert_eq!(
            method.params[0].schema,
            json!({"type": "string", "details": {"type": "address", "internalType": "address"}})
        );
        assert_eq!(
            method.params[1].schema,
            json!({"type": "boolean", "details": {"type": "bool", "internalType": "bool"}})
        );
        assert_eq!(method.params[2].schema["type"], "string");
        assert_eq!(
            method.params[3].schema,
            json!({
                "type": "array",
                "details": {"type": "uint256[][]", "internalType": "uint256[][]"},
                "items": {
                    "type": "array",
                    "items": {
                        "oneOf": [{"type": "string"}, {"type": "integer"}],
                        "description": INTEGER_DESCRIPTION
                    }
                }
            })
        );
        assert_eq!(method.returns[0].schema, uint_schema(None));
        assert_eq!(
            Value::Object(method.details),
            json!({"stateMutability": "view", "constant": true})
        );
    }

    #[test]
    fn abi_tuple_to_ffi_object() {
        let entry = AbiEntry::function(
            "set",
            vec![AbiParameter {
                name: "widget".into(),
                param_type: "tuple".into(),
                internal_type: "struct WidgetContract.Widget".into(),
                components: vec![
                    AbiParameter::new("a", "uint256"),
                    AbiParameter::new("b", "uint256"),
                ],
                indexed: false,
            }],
            vec![],
        );
        let method = abi_function_to_ffi(&entry).unwrap();
        assert_eq!(
            method.params[0].schema,
            json!({
                "type": "object",
                "details": {"type": "tuple", "internalType": "struct WidgetContract.Widget"},
                "properties": {
                    "a": uint_schema(Some(0)),
                    "b": uint_schema(Some(1)),
                }
            })
        );
    }

    #[test]
    fn unsupported_types_fail_everywhere() {
        let bad = vec![AbiParameter::new("x", "foobar")];
        assert!(matches!(
            abi_function_to_ffi(&AbiEntry::function("f", bad.clone(), vec![])),
            Err(PluginError::UnsupportedAbiType(t)) if t == "foobar"
        ));
        assert!(abi_function_to_ffi(&AbiEntry::function("f", vec![], bad.clone())).is_err());
        assert!(abi_event_to_ffi(&AbiEntry::event("E", bad)).is_err());
    }

    #[test]
    fn anonymous_event_converts_back() {
        let entry = AbiEntry {
            anonymous: true,
            ..AbiEntry::event(
                "Updated",
                vec![
                    AbiParameter {
                        indexed: true,
                        ..AbiParameter::new("who", "address")
                    },
                    AbiParameter {
                        name: "items".into(),
                        param_type: "tuple[]".into(),
                        internal_type: "struct Store.Item[]".into(),
                        components: vec![
                            AbiParameter::new("id", "bytes32"),
                            AbiParameter::new("qty", "uint64"),
                        ],
                        indexed: false,
                    },
                ],
            )
        };
        let ffi = abi_event_to_ffi(&entry).unwrap();
        assert_eq!(ffi.definition.details.get("anonymous"), Some(&json!(true)));
        assert_eq!(ffi_event_to_abi(&ffi.definition).unwrap(), entry);
    }

    #[test]
    fn generate_ffi_from_abi_input() {
        let request = FfiGenerationRequest {
            namespace: "ns1".into(),
            name: "Simple".into(),
            version: "v1".into(),
            description: String::new(),
            input: json!({"abi": [
                {"type": "function", "name": "get", "inputs": [], "outputs": [{"name": "", "type": "uint256"}]},
                {"type": "event", "name": "Changed", "inputs": [{"name": "v", "type": "uint256"}]},
                {"type": "constructor", "inputs": []}
            ]}),
        };
        let ffi = generate_ffi(&request).unwrap();
        assert_eq!(ffi.namespace, "ns1");
        assert_eq!(ffi.methods.len(), 1);
        assert_eq!(ffi.events.len(), 1);

        let empty_entry = FfiGenerationRequest {
            input: json!({"abi": [{}]}),
            ..request.clone()
        };
        assert_eq!(generate_ffi(&empty_entry).unwrap().namespace, "ns1");
    }

    #[test]
    fn generate_ffi_rejects_bad_input() {
        for input in [json!({"abi": []}), json!({"abi": "nope"}), json!({})] {
            let request = FfiGenerationRequest {
                input,
                ..Default::default()
            };
            assert!(matches!(
                generate_ffi(&request),
                Err(PluginError::FfiGenerationFailed(_))
            ));
        }
    }

    #[test]
    fn validator_requires_details_type() {
        let v = EthereumFfiParamValidator;
        assert_eq!(v.extension_name(), "details");
        assert!(v
            .validate_param(&param("x", json!({"type": "integer", "details": {"type": "uint256"}})))
            .is_ok());
        assert!(v
            .validate_param(&param("x", json!({"type": "integer", "details": {"type": ""}})))
            .is_err());
        assert!(v.validate_param(&param("x", json!({"type": "integer"}))).is_err());
    }

    #[test]
    fn firefly_contract_signatures() {
        assert_eq!(
            batch_pin_event().signature(),
            "BatchPin(address,uint256,string,bytes32,bytes32,string,bytes32[])"
        );
        assert_eq!(
            pin_batch_method().signature(),
            "pinBatch(string,bytes32,bytes32,string,bytes32[])"
        );
        assert_eq!(network_version_method().state_mutability, "pure");
    }
}
