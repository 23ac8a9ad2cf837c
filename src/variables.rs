//! C5: lazy expansion of RP remote objects into DP variables.
//!
//! Grounded on `albertleigh-boa`'s `eval_context.rs` (lazy variable
//! reference allocation keyed by an opaque id) generalised from a single
//! object-inspection container to the full polymorphic variant set the
//! design notes call for (§9: "replace a class hierarchy with a tagged
//! sum").

use std::collections::HashMap;

use crate::dp::{Variable, VariablePresentationHint, VariablesFilter};
use crate::error::{AdapterError, AdapterResult};
use crate::ids::{IdGenerator, VariablesReference};
use crate::rp::runtime::{CallArgument, PropertyDescriptor, RemoteObject};
use crate::rp::{Call, CallResult, RuntimeAgent};

const VARIABLES_REFERENCE_MODULUS: i64 = 0x7fff_fffe;
const ARRAY_PAGING_THRESHOLD: usize = 100;

/// One child entry a container can present to DP.
#[derive(Debug, Clone)]
pub struct ChildVariable {
    pub name: String,
    pub value: String,
    pub type_: Option<String>,
    pub evaluate_name: Option<String>,
    pub child: Option<VariablesReference>,
    pub lazy: bool,
    pub memory_reference: Option<String>,
    pub indexed_variables: Option<i64>,
}

impl ChildVariable {
    fn into_dp(self) -> Variable {
        Variable {
            name: self.name,
            value: self.value,
            type_: self.type_,
            presentation_hint: self.lazy.then(|| VariablePresentationHint {
                kind: Some("property".into()),
                attributes: vec!["hasSideEffects".into()],
                lazy: true,
            }),
            evaluate_name: self.evaluate_name,
            variables_reference: self.child.unwrap_or(VariablesReference::from_raw(0)),
            named_variables: None,
            indexed_variables: self.indexed_variables,
            memory_reference: self.memory_reference,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ObjectVariable {
    pub session_id: String,
    pub object_id: String,
    pub class_name: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ArrayVariable {
    pub session_id: String,
    pub object_id: String,
    pub length: usize,
}

#[derive(Debug, Clone)]
pub struct GetterVariable {
    pub session_id: String,
    pub owner_object_id: String,
    pub getter_object_id: String,
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct SetterOnlyVariable;

#[derive(Debug, Clone)]
pub struct FunctionLocationVariable {
    pub script_id: String,
    pub line: i64,
    pub column: i64,
}

#[derive(Debug, Clone)]
pub struct ErrorVariable {
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct OutputVariable {
    pub args: Vec<RemoteObject>,
    pub stack_trace_entry: Option<VariablesReference>,
}

#[derive(Debug, Clone)]
pub struct StackTraceOutputVariable {
    pub formatted: String,
}

#[derive(Debug, Clone)]
pub struct ScopeVariable {
    pub session_id: String,
    pub object_id: String,
    /// `this` / return value, shown only for the innermost local scope.
    pub extra_properties: Vec<ChildVariable>,
}

#[derive(Debug, Clone)]
pub enum VariableContainer {
    Object(ObjectVariable),
    Array(ArrayVariable),
    Getter(GetterVariable),
    SetterOnly(SetterOnlyVariable),
    FunctionLocation(FunctionLocationVariable),
    Error(ErrorVariable),
    Output(OutputVariable),
    StackTraceOutput(StackTraceOutputVariable),
    Scope(ScopeVariable),
}

pub struct VariableStore {
    ids: IdGenerator,
    containers: HashMap<VariablesReference, VariableContainer>,
}

impl VariableStore {
    pub fn new() -> Self {
        Self {
            ids: IdGenerator::with_modulus(VARIABLES_REFERENCE_MODULUS),
            containers: HashMap::new(),
        }
    }

    pub fn register(&mut self, container: VariableContainer) -> VariablesReference {
        let id = self.ids.mint_variables_reference();
        self.containers.insert(id, container);
        id
    }

    /// Discards every container. Called on `resumed`/pause end: ids from
    /// the prior pause must resolve to nothing afterwards.
    pub fn clear(&mut self) {
        self.containers.clear();
    }

    /// Resolves a `memoryReference` (the decimal container id a
    /// memory-backed variable was given) back to the session and RP
    /// `object_id` `readMemory`/`writeMemory` actually call into.
    pub fn resolve_memory_reference(&self, reference: VariablesReference) -> Option<(String, String)> {
        match self.containers.get(&reference)? {
            VariableContainer::Object(o) => Some((o.session_id.clone(), o.object_id.clone())),
            _ => None,
        }
    }

    /// Returns `[]` for unknown ids, per the contract no failed lookup is
    /// ever an error the client sees.
    pub fn get_children(
        &mut self,
        id: VariablesReference,
        filter: Option<VariablesFilter>,
        start: Option<i64>,
        count: Option<i64>,
        agent: &mut dyn RuntimeAgent,
    ) -> Vec<Variable> {
        let Some(container) = self.containers.get(&id).cloned() else {
            return Vec::new();
        };

        let children = match container {
            VariableContainer::Object(o) => self.object_children(&o, agent),
            VariableContainer::Array(a) => self.array_children(&a, filter, start, count, agent),
            VariableContainer::Getter(g) => self.getter_children(&g, agent),
            VariableContainer::SetterOnly(_) => Vec::new(),
            VariableContainer::FunctionLocation(_) => Vec::new(),
            VariableContainer::Error(_) => Vec::new(),
            VariableContainer::Output(o) => self.output_children(&o),
            VariableContainer::StackTraceOutput(_) => Vec::new(),
            VariableContainer::Scope(s) => self.scope_children(&s, agent),
        };
        children.into_iter().map(ChildVariable::into_dp).collect()
    }

    fn object_children(
        &mut self,
        object: &ObjectVariable,
        agent: &mut dyn RuntimeAgent,
    ) -> Vec<ChildVariable> {
        let own = self.fetch_properties(&object.session_id, &object.object_id, false, agent);
        let accessors_only =
            self.fetch_properties(&object.session_id, &object.object_id, true, agent);

        let mut seen: std::collections::HashSet<String> =
            own.iter().map(|p| p.name.clone()).collect();
        let mut out = Vec::new();
        for prop in own {
            out.push(self.describe_property(&object.session_id, &object.object_id, prop));
        }
        for prop in accessors_only {
            if seen.insert(prop.name.clone()) {
                out.push(self.describe_property(&object.session_id, &object.object_id, prop));
            }
        }
        out
    }

    fn fetch_properties(
        &mut self,
        session_id: &str,
        object_id: &str,
        accessor_properties_only: bool,
        agent: &mut dyn RuntimeAgent,
    ) -> Vec<PropertyDescriptor> {
        let call = Call::GetProperties(crate::rp::runtime::GetPropertiesParams {
            object_id: object_id.to_string(),
            own_properties: true,
            accessor_properties_only,
            generate_preview: false,
        });
        match agent.call(session_id, call) {
            Ok(CallResult::GetProperties(result)) => result.result,
            _ => Vec::new(),
        }
    }

    fn describe_property(
        &mut self,
        session_id: &str,
        owner_object_id: &str,
        prop: PropertyDescriptor,
    ) -> ChildVariable {
        if prop.get.is_some() && prop.value.is_none() {
            let getter_object_id = prop
                .get
                .and_then(|g| g.object_id)
                .unwrap_or_default();
            let child = self.register(VariableContainer::Getter(GetterVariable {
                session_id: session_id.to_string(),
                owner_object_id: owner_object_id.to_string(),
                getter_object_id,
                name: prop.name.clone(),
            }));
            return ChildVariable {
                name: prop.name,
                value: "".into(),
                type_: None,
                evaluate_name: None,
                child: Some(child),
                lazy: true,
                memory_reference: None,
                indexed_variables: None,
            };
        }

        if prop.value.is_none() && prop.set.is_some() {
            let child = self.register(VariableContainer::SetterOnly(SetterOnlyVariable));
            return ChildVariable {
                name: prop.name,
                value: "(setter)".into(),
                type_: None,
                evaluate_name: None,
                child: Some(child),
                lazy: false,
                memory_reference: None,
                indexed_variables: None,
            };
        }

        let object = prop.value.unwrap_or(RemoteObject {
            type_: crate::rp::runtime::RemoteObjectType::Undefined,
            subtype: None,
            class_name: None,
            value: None,
            unserializable_value: None,
            description: None,
            object_id: None,
            preview: None,
        });
        self.describe_remote_object(session_id, prop.name, object)
    }

    fn describe_remote_object(
        &mut self,
        session_id: &str,
        name: String,
        object: RemoteObject,
    ) -> ChildVariable {
        let display = render_value(&object);
        let type_ = Some(object.type_.to_string());
        let memory_backed = is_memory_backed(&object);

        let mut indexed_variables = None;
        let child = match (&object.object_id, object.subtype.as_deref()) {
            (Some(object_id), Some("array")) => {
                let length = array_length_hint(&object);
                if length > ARRAY_PAGING_THRESHOLD {
                    indexed_variables = Some(length as i64);
                }
                Some(self.register(VariableContainer::Array(ArrayVariable {
                    session_id: session_id.to_string(),
                    object_id: object_id.clone(),
                    length,
                })))
            }
            (Some(object_id), _) => Some(self.register(VariableContainer::Object(ObjectVariable {
                session_id: session_id.to_string(),
                object_id: object_id.clone(),
                class_name: object.class_name.clone(),
            }))),
            (None, _) => None,
        };

        // The DP `memoryReference` is the decimal container id, not the RP
        // object id: `readMemory`/`writeMemory` resolve it back through the
        // variable store to the live `object_id`, keeping it stable across
        // whatever RP id churn a reconnect causes.
        let memory_reference = if memory_backed { child.map(|c| c.to_string()) } else { None };

        ChildVariable {
            name,
            value: display,
            type_,
            evaluate_name: None,
            child,
            lazy: false,
            memory_reference,
            indexed_variables,
        }
    }

    fn array_children(
        &mut self,
        array: &ArrayVariable,
        filter: Option<VariablesFilter>,
        start: Option<i64>,
        count: Option<i64>,
        agent: &mut dyn RuntimeAgent,
    ) -> Vec<ChildVariable> {
        match filter {
            Some(VariablesFilter::Indexed) => {
                let start = start.unwrap_or(0).max(0) as usize;
                let count = count.unwrap_or(array.length as i64).max(0) as usize;
                let call = Call::CallFunctionOn(crate::rp::runtime::CallFunctionOnParams {
                    function_declaration: ARRAY_SLOT_TEMPLATE.to_string(),
                    object_id: Some(array.object_id.clone()),
                    arguments: vec![
                        CallArgument {
                            value: Some(serde_json::json!(start)),
                            object_id: None,
                        },
                        CallArgument {
                            value: Some(serde_json::json!(count)),
                            object_id: None,
                        },
                    ],
                    silent: true,
                    generate_preview: false,
                    execution_context_id: None,
                    throw_on_side_effect: false,
                });
                match agent.call(&array.session_id, call) {
                    Ok(CallResult::CallFunctionOn(result)) => {
                        self.array_slots_from_result(result.result, start)
                    }
                    _ => Vec::new(),
                }
            }
            _ => {
                let props = self.fetch_properties(&array.session_id, &array.object_id, false, agent);
                props
                    .into_iter()
                    .filter(|p| p.name.parse::<usize>().is_err())
                    .map(|p| self.describe_property(&array.session_id, &array.object_id, p))
                    .collect()
            }
        }
    }

    fn array_slots_from_result(
        &mut self,
        result: RemoteObject,
        start: usize,
    ) -> Vec<ChildVariable> {
        let Some(values) = result.value.as_ref().and_then(|v| v.as_array()) else {
            return Vec::new();
        };
        values
            .iter()
            .enumerate()
            .map(|(i, v)| ChildVariable {
                name: (start + i).to_string(),
                value: v.to_string(),
                type_: None,
                evaluate_name: None,
                child: None,
                lazy: false,
                memory_reference: None,
                indexed_variables: None,
            })
            .collect()
    }

    fn getter_children(
        &mut self,
        getter: &GetterVariable,
        agent: &mut dyn RuntimeAgent,
    ) -> Vec<ChildVariable> {
        let call = Call::CallFunctionOn(crate::rp::runtime::CallFunctionOnParams {
            function_declaration: "function() { return this; }".to_string(),
            object_id: Some(getter.getter_object_id.clone()),
            arguments: Vec::new(),
            silent: true,
            generate_preview: false,
            execution_context_id: None,
            throw_on_side_effect: false,
        });
        match agent.call(&getter.session_id, call) {
            Ok(CallResult::CallFunctionOn(result)) if result.exception_details.is_none() => {
                vec![self.describe_remote_object(&getter.session_id, getter.name.clone(), result.result)]
            }
            Ok(CallResult::CallFunctionOn(result)) => {
                let message = result
                    .exception_details
                    .map(|d| d.text)
                    .unwrap_or_else(|| "getter threw".to_string());
                let child = self.register(VariableContainer::Error(ErrorVariable { message: message.clone() }));
                vec![ChildVariable {
                    name: getter.name.clone(),
                    value: message,
                    type_: None,
                    evaluate_name: None,
                    child: Some(child),
                    lazy: false,
                    memory_reference: None,
                    indexed_variables: None,
                }]
            }
            Err(_) => vec![ChildVariable {
                name: getter.name.clone(),
                value: "<getter failed>".into(),
                type_: None,
                evaluate_name: None,
                child: None,
                lazy: false,
                memory_reference: None,
                indexed_variables: None,
            }],
        }
    }

    fn output_children(&mut self, output: &OutputVariable) -> Vec<ChildVariable> {
        let mut children: Vec<ChildVariable> = output
            .args
            .iter()
            .enumerate()
            .map(|(i, obj)| self.describe_remote_object_ref(i.to_string(), obj))
            .collect();
        if let Some(stack) = output.stack_trace_entry {
            children.push(ChildVariable {
                name: "stack".into(),
                value: "".into(),
                type_: None,
                evaluate_name: None,
                child: Some(stack),
                lazy: false,
                memory_reference: None,
                indexed_variables: None,
            });
        }
        children
    }

    fn describe_remote_object_ref(&self, name: String, object: &RemoteObject) -> ChildVariable {
        ChildVariable {
            name,
            value: render_value(object),
            type_: Some(object.type_.to_string()),
            evaluate_name: None,
            child: None,
            lazy: false,
            memory_reference: None,
            indexed_variables: None,
        }
    }

    fn scope_children(
        &mut self,
        scope: &ScopeVariable,
        agent: &mut dyn RuntimeAgent,
    ) -> Vec<ChildVariable> {
        let mut props = self.fetch_properties(&scope.session_id, &scope.object_id, false, agent);
        let mut out: Vec<ChildVariable> = Vec::new();
        for prop in props.drain(..) {
            out.push(self.describe_property(&scope.session_id, &scope.object_id, prop));
        }
        out.extend(scope.extra_properties.iter().cloned());
        out
    }

    /// Registers a bare RP result (from `evaluate`/`evaluateOnCallFrame`) the
    /// same way an object property would be described, returning the
    /// display value, type name, and the reference to expand it (zero for a
    /// primitive with nothing to expand).
    pub fn register_evaluation_result(
        &mut self,
        session_id: &str,
        object: RemoteObject,
    ) -> (String, Option<String>, VariablesReference) {
        let child = self.describe_remote_object(session_id, String::new(), object);
        (child.value, child.type_, child.child.unwrap_or(VariablesReference::from_raw(0)))
    }

    /// `setVariable`: evaluates `expression`, then assigns it via the
    /// scope's `setVariableValue` or `callFunctionOn(this[name]=val)` on
    /// the owning object. Empty expressions are user errors.
    pub fn set_variable(
        &mut self,
        id: VariablesReference,
        name: &str,
        expression: &str,
        agent: &mut dyn RuntimeAgent,
    ) -> AdapterResult<Variable> {
        if expression.trim().is_empty() {
            return Err(AdapterError::user("Cannot set an empty value"));
        }
        let Some(container) = self.containers.get(&id).cloned() else {
            return Err(AdapterError::silent("unknown variables reference"));
        };
        let (session_id, object_id) = match &container {
            VariableContainer::Object(o) => (o.session_id.clone(), o.object_id.clone()),
            VariableContainer::Scope(s) => (s.session_id.clone(), s.object_id.clone()),
            _ => return Err(AdapterError::user("Cannot set a value on this variable")),
        };

        let assignment = format!("function(v) {{ this[{name:?}] = v; return this[{name:?}]; }}");
        let call = Call::Evaluate(crate::rp::runtime::EvaluateParams {
            expression: expression.to_string(),
            context_id: None,
            silent: true,
            throw_on_side_effect: false,
            generate_preview: false,
        });
        let value = match agent.call(&session_id, call)? {
            CallResult::Evaluate(r) if r.exception_details.is_none() => r.result,
            CallResult::Evaluate(r) => {
                let text = r
                    .exception_details
                    .map(|d| d.text)
                    .unwrap_or_else(|| "evaluation failed".to_string());
                return Err(AdapterError::user(text));
            }
            _ => return Err(AdapterError::silent("unexpected runtime response")),
        };

        let assign_call = Call::CallFunctionOn(crate::rp::runtime::CallFunctionOnParams {
            function_declaration: assignment,
            object_id: Some(object_id),
            arguments: vec![CallArgument {
                value: value.value.clone(),
                object_id: value.object_id.clone(),
            }],
            silent: true,
            generate_preview: false,
            execution_context_id: None,
            throw_on_side_effect: false,
        });
        match agent.call(&session_id, assign_call)? {
            CallResult::CallFunctionOn(r) if r.exception_details.is_none() => {
                let described = self.describe_remote_object(&session_id, name.to_string(), r.result);
                Ok(described.into_dp())
            }
            CallResult::CallFunctionOn(r) => {
                let text = r
                    .exception_details
                    .map(|d| d.text)
                    .unwrap_or_else(|| "assignment failed".to_string());
                Err(AdapterError::user(text))
            }
            _ => Err(AdapterError::silent("unexpected runtime response")),
        }
    }
}

impl Default for VariableStore {
    fn default() -> Self {
        Self::new()
    }
}

const ARRAY_SLOT_TEMPLATE: &str = "function(start, count) { \
    const out = []; \
    for (let i = start; i < start + count && i < this.length; i++) out.push(this[i]); \
    return out; \
}";

fn is_memory_backed(object: &RemoteObject) -> bool {
    matches!(
        object.subtype.as_deref(),
        Some("typedarray") | Some("dataview") | Some("arraybuffer") | Some("webassemblymemory")
    )
}

fn array_length_hint(object: &RemoteObject) -> usize {
    object
        .description
        .as_deref()
        .and_then(|d| d.rsplit_once('(').map(|(_, tail)| tail))
        .and_then(|tail| tail.trim_end_matches(')').parse().ok())
        .unwrap_or(0)
}

fn render_value(object: &RemoteObject) -> String {
    if let Some(description) = &object.description {
        return description.clone();
    }
    match &object.value {
        Some(value) => value.to_string(),
        None => object.type_.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rp::runtime::RemoteObjectType;

    struct NoopAgent;
    impl RuntimeAgent for NoopAgent {
        fn call(&mut self, _session_id: &str, _call: Call) -> AdapterResult<CallResult> {
            Err(AdapterError::silent("no runtime in this test"))
        }
    }

    #[test]
    fn unknown_reference_returns_no_children() {
        let mut store = VariableStore::new();
        let mut agent = NoopAgent;
        assert!(store
            .get_children(VariablesReference::from_raw(999), None, None, None, &mut agent)
            .is_empty());
    }

    #[test]
    fn ids_are_never_reused_within_a_session() {
        let mut store = VariableStore::new();
        let a = store.register(VariableContainer::Error(ErrorVariable {
            message: "x".into(),
        }));
        let b = store.register(VariableContainer::Error(ErrorVariable {
            message: "y".into(),
        }));
        assert_ne!(a.get(), b.get());
    }

    #[test]
    fn clear_drops_every_container() {
        let mut store = VariableStore::new();
        let id = store.register(VariableContainer::Error(ErrorVariable {
            message: "x".into(),
        }));
        store.clear();
        let mut agent = NoopAgent;
        assert!(store
            .get_children(id, None, None, None, &mut agent)
            .is_empty());
    }

    #[test]
    fn empty_set_variable_expression_is_a_user_error() {
        let mut store = VariableStore::new();
        let id = store.register(VariableContainer::Object(ObjectVariable {
            session_id: "s".into(),
            object_id: "o".into(),
            class_name: None,
        }));
        let mut agent = NoopAgent;
        let err = store.set_variable(id, "x", "   ", &mut agent).unwrap_err();
        assert!(matches!(err, AdapterError::User(_)));
    }

    #[test]
    fn memory_backed_object_exposes_its_container_id_as_the_memory_reference() {
        let mut store = VariableStore::new();
        let object = RemoteObject {
            type_: RemoteObjectType::Object,
            subtype: Some("typedarray".into()),
            class_name: Some("Uint8Array".into()),
            value: None,
            unserializable_value: None,
            description: Some("Uint8Array(4)".into()),
            object_id: Some("rp-obj-1".into()),
            preview: None,
        };
        let child = store.describe_remote_object("session-1", "buf".into(), object);
        let reference = child.child.expect("memory-backed objects are registered as containers");
        assert_eq!(child.memory_reference.as_deref(), Some(reference.to_string().as_str()));

        let (session_id, object_id) = store.resolve_memory_reference(reference).expect("container resolves back");
        assert_eq!(session_id, "session-1");
        assert_eq!(object_id, "rp-obj-1");
    }

    #[test]
    fn render_value_prefers_description_over_raw_value() {
        let object = RemoteObject {
            type_: RemoteObjectType::Object,
            subtype: None,
            class_name: Some("Point".into()),
            value: None,
            unserializable_value: None,
            description: Some("Point {x: 1, y: 2}".into()),
            object_id: Some("1".into()),
            preview: None,
        };
        assert_eq!(render_value(&object), "Point {x: 1, y: 2}");
    }
}
