//! Source module - a configurable voltage source.
//!
//! Feeds constants (or a cable) onto a polyphonic bus. Patches use it to
//! drive a panel's input bus without any external hardware.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::patch::Patch;
use crate::poly::PolyBus;
use crate::types::{
    Connect, Module, ModuleCore, ModuleHost, ModuleSchema, OutputSchema, OutputStruct, ParamSchema,
    ParamsValidator, SampleableConstructor, Signal, validate_params,
};

#[derive(Serialize, Deserialize, Default)]
#[serde(default)]
pub(crate) struct SourceParams {
    /// Voltage(s) to emit, or a cable to follow
    source: Signal,
}

impl Connect for SourceParams {
    fn connect(&mut self, patch: &Patch) {
        self.source.connect(patch);
    }
}

#[derive(Default)]
pub(crate) struct SourceOutputs {
    sample: PolyBus,
}

impl OutputStruct for SourceOutputs {
    fn copy_from(&mut self, other: &Self) {
        self.sample = other.sample;
    }

    fn get_poly_sample(&self, port: &str) -> Option<PolyBus> {
        match port {
            "output" => Some(self.sample),
            _ => None,
        }
    }

    fn schemas() -> Vec<OutputSchema> {
        vec![OutputSchema {
            name: "output".to_string(),
            description: "the configured voltage(s)".to_string(),
            default: true,
        }]
    }
}

#[derive(Default)]
pub struct Source {
    outputs: SourceOutputs,
    params: SourceParams,
}

impl ModuleCore for Source {
    type Params = SourceParams;
    type Outputs = SourceOutputs;

    const MODULE_TYPE: &'static str = "source";

    fn update(&mut self, _sample_rate: f32) {
        self.outputs.sample = self.params.source.resolve();
    }

    fn outputs(&self) -> &SourceOutputs {
        &self.outputs
    }

    fn params(&self) -> &SourceParams {
        &self.params
    }

    fn params_mut(&mut self) -> &mut SourceParams {
        &mut self.params
    }
}

impl Module for Source {
    fn install_constructor(map: &mut HashMap<String, SampleableConstructor>) {
        map.insert(Self::MODULE_TYPE.to_string(), ModuleHost::<Source>::create);
    }

    fn install_params_validator(map: &mut HashMap<String, ParamsValidator>) {
        map.insert(
            Self::MODULE_TYPE.to_string(),
            validate_params::<SourceParams>,
        );
    }

    fn schema() -> ModuleSchema {
        ModuleSchema {
            name: Self::MODULE_TYPE.to_string(),
            description: "a configurable voltage source".to_string(),
            params: vec![ParamSchema {
                name: "source".to_string(),
                description: "voltage(s) to emit, or a cable to follow".to_string(),
            }],
            outputs: SourceOutputs::schemas(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emits_configured_voltages() {
        let mut source = Source {
            params: SourceParams {
                source: Signal::Volts(PolyBus::poly(&[1.0, -2.0, 3.5])),
            },
            ..Default::default()
        };
        source.update(48000.0);
        assert_eq!(source.outputs.sample.channels(), 3);
        assert_eq!(source.outputs.sample.get(1), -2.0);
    }

    #[test]
    fn disconnected_source_is_silent() {
        let mut source = Source::default();
        source.update(48000.0);
        assert!(!source.outputs.sample.is_connected());
        assert_eq!(source.outputs.sample.get(0), 0.0);
    }
}
