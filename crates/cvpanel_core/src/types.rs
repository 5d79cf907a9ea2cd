//! Core types shared by the engine: signals, module traits and the
//! JSON-facing patch graph representation.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};

use crate::error::{Error, Result};
use crate::patch::Patch;
use crate::poly::PolyBus;

/// A value feeding a module input: a fixed voltage, a cable to another
/// module's output port, or nothing.
///
/// Cables are stored by module id and resolved to weak references when the
/// patch is connected; a dangling cable reads as a disconnected bus rather
/// than an error.
#[derive(Clone, Debug, Default)]
pub enum Signal {
    /// Fixed voltage value(s) - mono is just channels=1
    Volts(PolyBus),
    /// Cable connection to another module's output
    Cable {
        module: String,
        module_ptr: Weak<Box<dyn Sampleable>>,
        port: String,
    },
    #[default]
    Disconnected,
}

impl Signal {
    /// Resolve to the full polyphonic bus this signal currently carries.
    pub fn resolve(&self) -> PolyBus {
        match self {
            Signal::Volts(bus) => *bus,
            Signal::Cable {
                module_ptr, port, ..
            } => match module_ptr.upgrade() {
                Some(module) => module.get_poly_sample(port).unwrap_or_default(),
                None => PolyBus::default(),
            },
            Signal::Disconnected => PolyBus::default(),
        }
    }

    pub fn is_disconnected(&self) -> bool {
        matches!(self, Signal::Disconnected)
    }
}

// Serde shapes accepted for a signal:
// - 2.5                                     -> Volts, mono
// - [0.0, 1.0, 2.0]                         -> Volts, one channel per element
// - {"type": "cable", "module": "a", "port": "output"}
// - {"type": "disconnected"}
//
// Serialization produces the same shapes, so patch snapshots round-trip.
impl<'de> Deserialize<'de> for Signal {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum SignalDe {
            Number(f64),
            NumberArray(Vec<f64>),
            Tagged(SignalTagged),
        }

        #[derive(Deserialize)]
        #[serde(
            tag = "type",
            rename_all = "camelCase",
            rename_all_fields = "camelCase"
        )]
        enum SignalTagged {
            Cable { module: String, port: String },
            Disconnected,
        }

        match SignalDe::deserialize(deserializer)? {
            SignalDe::Number(value) => Ok(Signal::Volts(PolyBus::mono(value as f32))),
            SignalDe::NumberArray(values) => {
                let voltages: Vec<f32> = values.into_iter().map(|v| v as f32).collect();
                Ok(Signal::Volts(PolyBus::poly(&voltages)))
            }
            SignalDe::Tagged(tagged) => Ok(match tagged {
                SignalTagged::Cable { module, port } => Signal::Cable {
                    module,
                    module_ptr: Weak::new(),
                    port,
                },
                SignalTagged::Disconnected => Signal::Disconnected,
            }),
        }
    }
}

impl Serialize for Signal {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        #[derive(Serialize)]
        #[serde(
            tag = "type",
            rename_all = "camelCase",
            rename_all_fields = "camelCase"
        )]
        enum SignalTagged<'a> {
            Cable { module: &'a str, port: &'a str },
            Disconnected,
        }

        match self {
            Signal::Volts(bus) if bus.channels() == 1 => serializer.serialize_f32(bus.get(0)),
            Signal::Volts(bus) if bus.channels() == 0 => {
                SignalTagged::Disconnected.serialize(serializer)
            }
            Signal::Volts(bus) => bus.active().serialize(serializer),
            Signal::Cable { module, port, .. } => SignalTagged::Cable { module, port }.serialize(serializer),
            Signal::Disconnected => SignalTagged::Disconnected.serialize(serializer),
        }
    }
}

/// Re-resolve cable references against the modules in a patch.
pub trait Connect {
    fn connect(&mut self, patch: &Patch);
}

impl Connect for Signal {
    fn connect(&mut self, patch: &Patch) {
        if let Signal::Cable {
            module, module_ptr, ..
        } = self
        {
            if let Some(sampleable) = patch.sampleables.get(module) {
                *module_ptr = Arc::downgrade(sampleable);
            }
        }
    }
}

/// A module instance living in a patch: ticked once per host frame,
/// queried for output voltages by whoever holds a cable to it.
pub trait Sampleable: Send + Sync {
    fn get_id(&self) -> &str;
    /// Mark the frame boundary; the next `update` recomputes outputs.
    fn tick(&self);
    /// Recompute outputs for the current frame (idempotent within a frame).
    fn update(&self);
    /// Polyphonic sample output for a port.
    fn get_poly_sample(&self, port: &str) -> Result<PolyBus>;
    fn get_module_type(&self) -> &'static str;
    /// Replace the module's params from their JSON representation.
    fn try_update_params(&self, params: serde_json::Value) -> Result<()>;
    /// Current params as JSON, for patch snapshots.
    fn save_params(&self) -> Result<serde_json::Value>;
    /// Resolve cable references in this module's params.
    fn connect(&self, patch: &Patch);
    /// Runtime state a frontend may want to render. None for most modules.
    fn get_state(&self) -> Option<serde_json::Value> {
        None
    }
}

pub type SampleableMap = HashMap<String, Arc<Box<dyn Sampleable>>>;

pub type SampleableConstructor = fn(&str, f32) -> Arc<Box<dyn Sampleable>>;

/// Function that checks a JSON params object against a module's concrete
/// params type, for patch validation before anything is instantiated.
pub type ParamsValidator = fn(&serde_json::Value) -> std::result::Result<(), serde_json::Error>;

/// Attempt to parse a JSON params object as `P`.
pub fn validate_params<P: DeserializeOwned>(
    params: &serde_json::Value,
) -> std::result::Result<(), serde_json::Error> {
    serde_json::from_value::<P>(params.clone()).map(|_| ())
}

/// The fixed output buffer of a module type.
pub trait OutputStruct: Default + Send + Sync + 'static {
    fn copy_from(&mut self, other: &Self);
    /// Polyphonic sample output for a port, None if the port doesn't exist.
    fn get_poly_sample(&self, port: &str) -> Option<PolyBus>;
    fn schemas() -> Vec<OutputSchema>
    where
        Self: Sized;
}

/// The single-threaded interior of a module: params in, outputs out.
///
/// Implementors hold no locks and do no I/O; [`ModuleHost`] wraps them with
/// the shared-access machinery every module needs.
pub trait ModuleCore: Default + Send + 'static {
    type Params: Serialize + DeserializeOwned + Connect + Send;
    type Outputs: OutputStruct;

    const MODULE_TYPE: &'static str;

    /// Advance one frame, reading params and writing outputs.
    fn update(&mut self, sample_rate: f32);

    fn outputs(&self) -> &Self::Outputs;
    fn params(&self) -> &Self::Params;
    fn params_mut(&mut self) -> &mut Self::Params;

    /// Runtime state a frontend may want to render.
    fn state(&self) -> Option<serde_json::Value> {
        None
    }
}

/// Shared-access wrapper turning a [`ModuleCore`] into a [`Sampleable`].
///
/// Output reads are memoized per frame through the `processed` flag, so a
/// module updates exactly once per frame no matter how many cables pull from
/// it, and cable cycles read the previous frame's value instead of
/// recursing.
pub struct ModuleHost<M: ModuleCore> {
    id: String,
    outputs: RwLock<M::Outputs>,
    module: Mutex<M>,
    processed: AtomicBool,
    sample_rate: f32,
}

impl<M: ModuleCore> ModuleHost<M> {
    pub fn create(id: &str, sample_rate: f32) -> Arc<Box<dyn Sampleable>> {
        Arc::new(Box::new(Self {
            id: id.to_string(),
            outputs: RwLock::new(M::Outputs::default()),
            module: Mutex::new(M::default()),
            processed: AtomicBool::new(false),
            sample_rate,
        }))
    }
}

impl<M: ModuleCore> Sampleable for ModuleHost<M> {
    fn get_id(&self) -> &str {
        &self.id
    }

    fn tick(&self) {
        self.processed.store(false, Ordering::Release);
    }

    fn update(&self) {
        if self
            .processed
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
        {
            let mut module = self.module.lock();
            module.update(self.sample_rate);
            let mut outputs = self.outputs.write();
            outputs.copy_from(module.outputs());
        }
    }

    fn get_poly_sample(&self, port: &str) -> Result<PolyBus> {
        self.update();
        let outputs = self.outputs.read();
        outputs
            .get_poly_sample(port)
            .ok_or_else(|| Error::UnknownPort {
                module: self.id.clone(),
                port: port.to_string(),
            })
    }

    fn get_module_type(&self) -> &'static str {
        M::MODULE_TYPE
    }

    fn try_update_params(&self, params: serde_json::Value) -> Result<()> {
        let parsed: M::Params = serde_json::from_value(params).map_err(|e| Error::BadParams {
            module: self.id.clone(),
            source: e,
        })?;
        *self.module.lock().params_mut() = parsed;
        Ok(())
    }

    fn save_params(&self) -> Result<serde_json::Value> {
        serde_json::to_value(self.module.lock().params()).map_err(|e| Error::SerializeParams {
            module: self.id.clone(),
            source: e,
        })
    }

    fn connect(&self, patch: &Patch) {
        self.module.lock().params_mut().connect(patch);
    }

    fn get_state(&self) -> Option<serde_json::Value> {
        self.module.lock().state()
    }
}

/// Registration hooks and self-description for a module type.
pub trait Module {
    fn install_constructor(map: &mut HashMap<String, SampleableConstructor>);
    fn install_params_validator(map: &mut HashMap<String, ParamsValidator>);
    fn schema() -> ModuleSchema;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParamSchema {
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputSchema {
    pub name: String,
    pub description: String,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub default: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleSchema {
    pub name: String,
    pub description: String,
    pub params: Vec<ParamSchema>,
    pub outputs: Vec<OutputSchema>,
}

fn empty_params() -> serde_json::Value {
    serde_json::json!({})
}

/// One module in a serialized patch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleState {
    pub id: String,
    pub module_type: String,
    #[serde(default = "empty_params")]
    pub params: serde_json::Value,
}

/// The serialized form of a whole patch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchGraph {
    pub modules: Vec<ModuleState>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{from_str, from_value, json, to_value};

    #[test]
    fn signal_deserialize_number() {
        let s: Signal = from_str("2.5").unwrap();
        match s {
            Signal::Volts(bus) => {
                assert_eq!(bus.channels(), 1);
                assert_eq!(bus.get(0), 2.5);
            }
            _ => panic!("expected Volts"),
        }
    }

    #[test]
    fn signal_deserialize_array() {
        let s: Signal = from_str("[1.0, 2.0, 3.0]").unwrap();
        match s {
            Signal::Volts(bus) => {
                assert_eq!(bus.channels(), 3);
                assert_eq!(bus.get(2), 3.0);
            }
            _ => panic!("expected Volts"),
        }
    }

    #[test]
    fn signal_deserialize_cable() {
        let s: Signal = from_value(json!({
            "type": "cable",
            "module": "knobs",
            "port": "output",
        }))
        .unwrap();
        match s {
            Signal::Cable { module, port, .. } => {
                assert_eq!(module, "knobs");
                assert_eq!(port, "output");
            }
            _ => panic!("expected Cable"),
        }
    }

    #[test]
    fn signal_deserialize_disconnected() {
        let s: Signal = from_value(json!({ "type": "disconnected" })).unwrap();
        assert!(s.is_disconnected());
    }

    #[test]
    fn signal_serialize_round_trip() {
        for input in [json!(2.5), json!([1.0, 2.0]), json!({"type": "disconnected"})] {
            let signal: Signal = from_value(input.clone()).unwrap();
            assert_eq!(to_value(&signal).unwrap(), input);
        }

        let cable = json!({"type": "cable", "module": "a", "port": "output"});
        let signal: Signal = from_value(cable.clone()).unwrap();
        assert_eq!(to_value(&signal).unwrap(), cable);
    }

    #[test]
    fn dangling_cable_resolves_to_silence() {
        let s = Signal::Cable {
            module: "missing".to_string(),
            module_ptr: Weak::new(),
            port: "output".to_string(),
        };
        let bus = s.resolve();
        assert!(!bus.is_connected());
        assert_eq!(bus.get(0), 0.0);
    }

    #[test]
    fn module_state_params_default_to_empty_object() {
        let state: ModuleState =
            from_value(json!({ "id": "a", "moduleType": "panel" })).unwrap();
        assert_eq!(state.params, json!({}));
    }
}
