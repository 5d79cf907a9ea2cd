//! Panel module - a 16-knob control-voltage panel with a polyphonic
//! follow input.
//!
//! Each of the 16 knobs drives its own output jack. When a cable is present
//! on the input bus the panel passes the incoming channel voltages through
//! to the outputs instead, and can optionally move the knobs to match
//! (`moveKnobs`), so the stored knob positions follow whatever the bus
//! carries. Routing runs at control rate, once every
//! [`CONTROL_RATE_DIVISION`] frames.

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;

use crate::dsp::utils::ClockDivider;
use crate::patch::Patch;
use crate::poly::{MAX_CHANNELS, PolyBus};
use crate::types::{
    Connect, Module, ModuleCore, ModuleHost, ModuleSchema, OutputSchema, OutputStruct, ParamSchema,
    ParamsValidator, SampleableConstructor, Signal, validate_params,
};

/// Frames between routing passes. Control voltages change far slower than
/// the audio rate, so the panel only runs its body on every Nth frame.
pub const CONTROL_RATE_DIVISION: u32 = 512;

/// LEDs in one display column.
pub const NUM_LIGHTS: usize = 11;

const KNOB_MIN: f32 = 0.0;
const KNOB_MAX: f32 = 10.0;

#[derive(Serialize, Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
pub(crate) struct PanelParams {
    /// Polyphonic input bus; when patched it overrides the knobs
    input: Signal,
    /// Manual knob positions, 0..10 V
    knobs: [f32; MAX_CHANNELS],
    /// Move the knobs to show the incoming voltages
    move_knobs: bool,
    /// User label strips persisted with the patch
    labels: Vec<String>,
}

impl Connect for PanelParams {
    fn connect(&mut self, patch: &Patch) {
        self.input.connect(patch);
    }
}

#[derive(Default)]
pub(crate) struct PanelOutputs {
    outs: [f32; MAX_CHANNELS],
}

impl OutputStruct for PanelOutputs {
    fn copy_from(&mut self, other: &Self) {
        self.outs = other.outs;
    }

    fn get_poly_sample(&self, port: &str) -> Option<PolyBus> {
        let digits = port.strip_prefix("out")?;
        if digits.len() > 1 && digits.starts_with('0') {
            return None;
        }
        let channel: usize = digits.parse().ok()?;
        if channel >= MAX_CHANNELS {
            return None;
        }
        Some(PolyBus::mono(self.outs[channel]))
    }

    fn schemas() -> Vec<OutputSchema> {
        (0..MAX_CHANNELS)
            .map(|channel| OutputSchema {
                name: format!("out{channel}"),
                description: format!("channel {channel} voltage"),
                default: channel == 0,
            })
            .collect()
    }
}

/// Color band of a display LED: the column runs green into amber into red
/// from the bottom up.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum LightBand {
    Green,
    Amber,
    Red,
}

/// Color band for an LED index within a column.
pub fn light_band(light: usize) -> LightBand {
    if light < 4 {
        LightBand::Green
    } else if light < 7 {
        LightBand::Amber
    } else {
        LightBand::Red
    }
}

/// Number of lit LEDs in a column for a voltage. LED `k` lights once the
/// voltage reaches `k` volts; nothing lights at or below zero.
pub fn lit_lights(voltage: f32) -> usize {
    if voltage <= 0.0 {
        return 0;
    }
    voltage.min((NUM_LIGHTS - 1) as f32) as usize + 1
}

pub struct Panel {
    outputs: PanelOutputs,
    params: PanelParams,
    divider: ClockDivider,
    /// Last voltage routed per channel, for the display state.
    voltages: [f32; MAX_CHANNELS],
}

impl Default for Panel {
    fn default() -> Self {
        Self {
            outputs: PanelOutputs::default(),
            params: PanelParams::default(),
            divider: ClockDivider::new(CONTROL_RATE_DIVISION),
            voltages: [0.0; MAX_CHANNELS],
        }
    }
}

impl ModuleCore for Panel {
    type Params = PanelParams;
    type Outputs = PanelOutputs;

    const MODULE_TYPE: &'static str = "panel";

    fn update(&mut self, _sample_rate: f32) {
        if !self.divider.process() {
            return;
        }

        let bus = self.params.input.resolve();
        if bus.is_connected() {
            // Pass the bus through. Channels beyond the bus's count read
            // 0.0, and voltages are not clamped on the way to the outputs;
            // only the knobs themselves are bounded.
            for channel in 0..MAX_CHANNELS {
                let v = bus.get(channel);
                if self.params.move_knobs {
                    self.params.knobs[channel] = v.clamp(KNOB_MIN, KNOB_MAX);
                }
                self.voltages[channel] = v;
                self.outputs.outs[channel] = v;
            }
        } else {
            // No cable: the knobs are the voltages.
            for channel in 0..MAX_CHANNELS {
                let v = self.params.knobs[channel];
                self.voltages[channel] = v;
                self.outputs.outs[channel] = v;
            }
        }
    }

    fn outputs(&self) -> &PanelOutputs {
        &self.outputs
    }

    fn params(&self) -> &PanelParams {
        &self.params
    }

    fn params_mut(&mut self) -> &mut PanelParams {
        &mut self.params
    }

    fn state(&self) -> Option<serde_json::Value> {
        let lights: Vec<usize> = self.voltages.iter().map(|&v| lit_lights(v)).collect();
        let bands: Vec<LightBand> = (0..NUM_LIGHTS).map(light_band).collect();
        Some(json!({
            "voltages": self.voltages,
            "lights": lights,
            "bands": bands,
        }))
    }
}

impl Module for Panel {
    fn install_constructor(map: &mut HashMap<String, SampleableConstructor>) {
        map.insert(Self::MODULE_TYPE.to_string(), ModuleHost::<Panel>::create);
    }

    fn install_params_validator(map: &mut HashMap<String, ParamsValidator>) {
        map.insert(
            Self::MODULE_TYPE.to_string(),
            validate_params::<PanelParams>,
        );
    }

    fn schema() -> ModuleSchema {
        ModuleSchema {
            name: Self::MODULE_TYPE.to_string(),
            description: "16-knob control-voltage panel with polyphonic follow input".to_string(),
            params: vec![
                ParamSchema {
                    name: "input".to_string(),
                    description: "polyphonic input bus; overrides the knobs when patched"
                        .to_string(),
                },
                ParamSchema {
                    name: "knobs".to_string(),
                    description: "manual knob positions, 0..10 V".to_string(),
                },
                ParamSchema {
                    name: "moveKnobs".to_string(),
                    description: "move the knobs to show the incoming voltages".to_string(),
                },
                ParamSchema {
                    name: "labels".to_string(),
                    description: "user label strips persisted with the patch".to_string(),
                },
            ],
            outputs: PanelOutputs::schemas(),
        }
    }
}
